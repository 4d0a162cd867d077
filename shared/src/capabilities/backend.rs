//! Backend address and the `/get-sar-image` wire contract.
//!
//! Shared by every transport: the Crux app builds requests for the shell's
//! HTTP capability from it, and the reqwest client uses it directly.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::warn;
use url::Url;

use super::{ConversionError, ConversionOutcome};
use crate::event::Coordinate;
use crate::model::ResultImageRef;
use crate::{AppError, ErrorKind, CONVERSION_ENDPOINT, CONVERSION_TIMEOUT, DEFAULT_BACKEND_URL};

pub const ENV_BACKEND_URL: &str = "SAR_BACKEND_URL";
pub const ENV_REQUEST_TIMEOUT_SECS: &str = "SAR_REQUEST_TIMEOUT_SECS";
pub const REQUEST_ID_HEADER: &str = "X-Request-Id";
pub const MAX_TIMEOUT: Duration = Duration::from_secs(300);

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Always ends in `/`, so the endpoint lands under any path prefix.
    pub base_url: Url,
    pub endpoint_path: String,
    pub timeout: Duration,
}

impl ClientConfig {
    /// The development backend on `localhost:5000`.
    pub fn local() -> Result<Self, AppError> {
        Self::with_base_url(DEFAULT_BACKEND_URL)
    }

    pub fn with_base_url(base_url: &str) -> Result<Self, AppError> {
        Ok(Self {
            base_url: parse_base_url(base_url)?,
            endpoint_path: CONVERSION_ENDPOINT.to_owned(),
            timeout: CONVERSION_TIMEOUT,
        })
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Result<Self, AppError> {
        if timeout.is_zero() || timeout > MAX_TIMEOUT {
            return Err(AppError::new(
                ErrorKind::Configuration,
                format!(
                    "request timeout must be between 1ms and {}s",
                    MAX_TIMEOUT.as_secs()
                ),
            ));
        }
        self.timeout = timeout;
        Ok(self)
    }

    /// Defaults overridden by `SAR_BACKEND_URL` and `SAR_REQUEST_TIMEOUT_SECS`.
    pub fn from_env() -> Result<Self, AppError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same rules as [`ClientConfig::from_env`] over any key source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, AppError> {
        let read = |key: &str| {
            lookup(key)
                .map(|value| value.trim().to_owned())
                .filter(|value| !value.is_empty())
        };

        let mut config = match read(ENV_BACKEND_URL) {
            Some(base_url) => Self::with_base_url(&base_url)?,
            None => Self::local()?,
        };

        if let Some(raw) = read(ENV_REQUEST_TIMEOUT_SECS) {
            let secs = raw.parse::<u64>().map_err(|_| {
                AppError::new(
                    ErrorKind::Configuration,
                    "SAR_REQUEST_TIMEOUT_SECS must be a positive integer.",
                )
                .with_context("value", raw.clone())
            })?;
            config = config.with_timeout(Duration::from_secs(secs))?;
        }

        Ok(config)
    }

    pub fn endpoint(&self) -> Result<Url, AppError> {
        self.base_url
            .join(self.endpoint_path.trim_start_matches('/'))
            .map_err(|e| {
                AppError::new(ErrorKind::Configuration, "invalid conversion endpoint")
                    .with_internal(e.to_string())
                    .with_context("endpoint_path", self.endpoint_path.clone())
            })
    }

    /// The backend may answer with an absolute URL or a path on itself.
    pub fn resolve_result_url(&self, image_url: &str) -> Result<String, ConversionError> {
        self.base_url
            .join(image_url.trim())
            .map(String::from)
            .map_err(|e| ConversionError::MalformedBody {
                detail: format!("invalid image_url '{image_url}': {e}"),
            })
    }

    pub(crate) fn timeout_ms(&self) -> u64 {
        u64::try_from(self.timeout.as_millis()).unwrap_or(u64::MAX)
    }
}

fn parse_base_url(raw: &str) -> Result<Url, AppError> {
    let mut url = Url::parse(raw).map_err(|e| {
        AppError::new(ErrorKind::Configuration, "invalid SAR backend URL")
            .with_internal(e.to_string())
            .with_context("url", raw)
    })?;
    match url.scheme() {
        "http" | "https" if url.host_str().is_some() => {}
        scheme => {
            return Err(AppError::new(
                ErrorKind::Configuration,
                format!("SAR backend URL must be http(s) with a host, got scheme '{scheme}'"),
            )
            .with_context("url", raw))
        }
    }
    if url.query().is_some() || url.fragment().is_some() {
        return Err(AppError::new(
            ErrorKind::Configuration,
            "SAR backend URL must not carry a query or fragment",
        )
        .with_context("url", raw));
    }
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    Ok(url)
}

// --- Wire bodies ---

#[derive(Debug, Serialize)]
pub(crate) struct ConversionRequestBody {
    latitude: f64,
    longitude: f64,
}

impl From<Coordinate> for ConversionRequestBody {
    fn from(coordinate: Coordinate) -> Self {
        Self {
            latitude: coordinate.latitude,
            longitude: coordinate.longitude,
        }
    }
}

/// Only `image_url` matters; the backend also sends `message`, `shape`
/// and `metadata`, which are ignored.
#[derive(Debug, Deserialize)]
struct ConversionResponseBody {
    #[serde(default)]
    image_url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ErrorResponseBody {
    #[serde(default)]
    error: Option<String>,
}

pub(crate) fn encode_request(coordinate: Coordinate) -> Result<Vec<u8>, ConversionError> {
    serde_json::to_vec(&ConversionRequestBody::from(coordinate)).map_err(|e| {
        ConversionError::Configuration {
            detail: format!("request encoding failed: {e}"),
        }
    })
}

fn parse_success_body(bytes: &[u8]) -> Result<String, ConversionError> {
    let body: ConversionResponseBody =
        serde_json::from_slice(bytes).map_err(|e| ConversionError::MalformedBody {
            detail: e.to_string(),
        })?;
    body.image_url
        .filter(|url| !url.trim().is_empty())
        .ok_or(ConversionError::MissingResultReference)
}

fn parse_error_body(bytes: &[u8]) -> Option<String> {
    serde_json::from_slice::<ErrorResponseBody>(bytes)
        .ok()
        .and_then(|body| body.error)
        .filter(|message| !message.trim().is_empty())
}

/// Maps a completed exchange to an outcome, whichever transport ran it.
pub(crate) fn interpret_response(
    config: &ClientConfig,
    status: u16,
    body: &[u8],
    correlation_id: &str,
) -> ConversionOutcome {
    if !(200..300).contains(&status) {
        let server_message = parse_error_body(body);
        warn!(
            status,
            correlation_id,
            server_message = server_message.as_deref().unwrap_or(""),
            "SAR backend rejected the request"
        );
        return Err(ConversionError::Status {
            status,
            server_message,
        });
    }

    let image_url = parse_success_body(body)?;
    let url = config.resolve_result_url(&image_url)?;
    Ok(ResultImageRef::Remote { url })
}
