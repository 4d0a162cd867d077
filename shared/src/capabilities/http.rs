//! reqwest transport for native shells and tests.
//!
//! Crux shells execute HTTP themselves through the app's `Http` capability
//! and never construct this client.

use std::sync::Arc;
use tracing::{debug, instrument};
use url::Url;
use uuid::Uuid;

use super::backend::{encode_request, interpret_response, ClientConfig, REQUEST_ID_HEADER};
use super::{
    ConversionClient, ConversionError, ConversionOutcome, EchoImageConversion, ImageConversion,
};
use crate::event::Coordinate;
use crate::model::ConversionInput;
use crate::{AppError, ErrorKind};

pub struct HttpConversionClient {
    http: reqwest::Client,
    config: ClientConfig,
    endpoint: Url,
    images: Arc<dyn ImageConversion>,
}

impl HttpConversionClient {
    /// Uploads go through [`EchoImageConversion`] until replaced with
    /// [`HttpConversionClient::with_image_conversion`].
    pub fn new(config: ClientConfig) -> Result<Self, AppError> {
        let endpoint = config.endpoint()?;
        let http = reqwest::Client::builder().build().map_err(|e| {
            AppError::new(ErrorKind::Configuration, "failed to build HTTP client")
                .with_internal(e.to_string())
        })?;

        Ok(Self {
            http,
            config,
            endpoint,
            images: Arc::new(EchoImageConversion::default()),
        })
    }

    #[must_use]
    pub fn with_image_conversion(mut self, images: Arc<dyn ImageConversion>) -> Self {
        self.images = images;
        self
    }

    #[must_use]
    pub const fn config(&self) -> &ClientConfig {
        &self.config
    }

    #[must_use]
    pub const fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    async fn convert_coordinate(&self, coordinate: Coordinate) -> ConversionOutcome {
        let correlation_id = Uuid::new_v4().to_string();
        let response = self
            .http
            .post(self.endpoint.clone())
            .header(REQUEST_ID_HEADER, correlation_id.as_str())
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .body(encode_request(coordinate)?)
            .send()
            .await
            .map_err(|e| ConversionError::Network {
                detail: e.to_string(),
            })?;

        let status = response.status();
        let body = response
            .bytes()
            .await
            .map_err(|e| ConversionError::Network {
                detail: format!("response read failed: {e}"),
            })?;

        let outcome = interpret_response(&self.config, status.as_u16(), &body, &correlation_id);
        if let Ok(result) = &outcome {
            debug!(correlation_id = %correlation_id, ?result, "SAR image ready");
        }
        outcome
    }
}

#[async_trait::async_trait]
impl ConversionClient for HttpConversionClient {
    #[instrument(skip(self, input), fields(input = input.kind_label()))]
    async fn convert(&self, input: &ConversionInput) -> ConversionOutcome {
        match input {
            ConversionInput::Coordinate(coordinate) => {
                let call = self.convert_coordinate(*coordinate);
                match tokio::time::timeout(self.config.timeout, call).await {
                    Ok(outcome) => outcome,
                    Err(_) => Err(ConversionError::Timeout {
                        timeout_ms: self.config.timeout_ms(),
                    }),
                }
            }
            ConversionInput::Image(image) => {
                if !self.images.is_real_conversion() {
                    debug!("upload pathway is a placeholder, no backend call");
                }
                self.images.convert(image).await
            }
        }
    }
}
