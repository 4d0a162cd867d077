//! Side-effecting seams of the core.
//!
//! The controller never talks to the network itself. In a Crux shell the
//! app turns its commands into requests on the [`Http`] capability; native
//! screens hand them to a [`ConversionClient`] instead. Both speak the
//! contract in [`ClientConfig`] and its wire helpers.

mod backend;
#[cfg(feature = "http")]
mod http;
mod upload;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::{ConversionInput, ResultImageRef};
use crate::ErrorKind;

pub use crux_core::render::Render;
pub use crux_http::Http;

pub use self::backend::{
    ClientConfig, ENV_BACKEND_URL, ENV_REQUEST_TIMEOUT_SECS, MAX_TIMEOUT, REQUEST_ID_HEADER,
};
pub(crate) use self::backend::{encode_request, interpret_response};
#[cfg(feature = "http")]
pub use self::http::HttpConversionClient;
pub use self::upload::{EchoImageConversion, ImageConversion, ORIGINAL_ECHO_DELAY};

use crate::event::Event;

pub type AppHttp = Http<Event>;
pub type AppRender = Render<Event>;

pub type ConversionOutcome = Result<ResultImageRef, ConversionError>;

#[derive(Debug, Clone, Error, Serialize, Deserialize, PartialEq, Eq)]
pub enum ConversionError {
    #[error("network error: {detail}")]
    Network { detail: String },

    #[error("timeout after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    #[error("HTTP error {status}")]
    Status {
        status: u16,
        server_message: Option<String>,
    },

    #[error("malformed response body: {detail}")]
    MalformedBody { detail: String },

    #[error("response did not contain image_url")]
    MissingResultReference,

    #[error("backend configuration error: {detail}")]
    Configuration { detail: String },
}

impl ConversionError {
    /// Timeouts fold into `Network`; everything after a response arrived is `BadResponse`.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::Network { .. } | Self::Timeout { .. } => ErrorKind::Network,
            Self::Status { .. } | Self::MalformedBody { .. } | Self::MissingResultReference => {
                ErrorKind::BadResponse
            }
            Self::Configuration { .. } => ErrorKind::Configuration,
        }
    }
}

/// One call per conversion request. Implementations never retry.
#[async_trait::async_trait]
pub trait ConversionClient: Send + Sync {
    async fn convert(&self, input: &ConversionInput) -> ConversionOutcome;
}
