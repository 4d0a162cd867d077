//! Shell-agnostic core for the SAR image generator front-end.
//!
//! Crux shells drive the upload and location screens through [`App`]: they
//! send [`Event`]s, render the [`ConversionView`] and execute the HTTP and
//! render effects. Native shells can run the same controller on tokio with
//! a [`ConversionScreen`] and a [`capabilities::ConversionClient`]. The live
//! feed is a [`StreamSimulationLoop`] in both cases.

#![forbid(unsafe_code)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::too_many_lines)]

pub mod app;
pub mod capabilities;
pub mod controller;
pub mod event;
pub mod model;
pub mod screen;
pub mod stream;
pub mod view;

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::ops::RangeInclusive;
use std::time::Duration;

pub use app::{App, Capabilities, Effect, Model};
pub use capabilities::{
    ClientConfig, ConversionClient, ConversionError, ConversionOutcome, EchoImageConversion,
    ImageConversion,
};
pub use controller::{ConversionCommand, ConversionController, ResultDisposition};
pub use event::{Coordinate, Event, ImageId, RequestId, ValidationError};
pub use model::{
    ConversionInput, FrameCapture, ImageHandle, ProcessingQuality, RequestState, Resolution,
    ResultImageRef, StreamSession, StreamSettings, TriggerPolicy,
};
pub use screen::{ConversionScreen, SupersedePolicy};
pub use stream::{FrameMetrics, MetricsSampler, StreamConfig, StreamSimulationLoop};
pub use view::{ConversionPhase, ConversionView, ErrorView, ResultView, StreamView};

#[cfg(feature = "http")]
pub use capabilities::HttpConversionClient;

pub const DEFAULT_BACKEND_URL: &str = "http://localhost:5000";
pub const CONVERSION_ENDPOINT: &str = "/get-sar-image";
pub const CONVERSION_TIMEOUT: Duration = Duration::from_secs(30);
pub const MAX_IMAGE_BYTES: usize = 10 * 1024 * 1024;
pub const STREAM_TICK_PERIOD: Duration = Duration::from_secs(1);
pub const STREAM_FPS_RANGE: RangeInclusive<u32> = 12..=19;
pub const STREAM_PROCESSING_TIME_RANGE_MS: RangeInclusive<u32> = 40..=74;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    Network,
    BadResponse,
    InvalidInput,
    InvalidState,
    Configuration,
}

impl ErrorKind {
    #[must_use]
    pub const fn code(self) -> &'static str {
        match self {
            Self::Network => "NETWORK_ERROR",
            Self::BadResponse => "BAD_RESPONSE",
            Self::InvalidInput => "INVALID_INPUT",
            Self::InvalidState => "INVALID_STATE",
            Self::Configuration => "CONFIG_ERROR",
        }
    }

    /// Whether the user can sensibly press the button again.
    ///
    /// Nothing is retried automatically; this only drives the view.
    #[must_use]
    pub const fn is_retryable(self) -> bool {
        matches!(self, Self::Network | Self::BadResponse)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AppError {
    pub kind: ErrorKind,
    pub message: String,
    pub internal_message: Option<String>,
    pub context: HashMap<String, String>,
}

impl AppError {
    #[must_use]
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            internal_message: None,
            context: HashMap::new(),
        }
    }

    #[must_use]
    pub fn with_internal(mut self, internal: impl Into<String>) -> Self {
        self.internal_message = Some(internal.into());
        self
    }

    #[must_use]
    pub fn with_context(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.context.insert(key.into(), value.into());
        self
    }

    #[must_use]
    pub const fn code(&self) -> &'static str {
        self.kind.code()
    }

    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        self.kind.is_retryable()
    }

    #[must_use]
    pub fn user_facing_message(&self) -> String {
        match self.kind {
            ErrorKind::Network => {
                "Unable to reach the SAR service. Please check your connection and try again."
                    .into()
            }
            ErrorKind::BadResponse => match self.context.get("server_error") {
                Some(reason) => format!("The SAR service could not generate an image: {reason}"),
                None => "Failed to fetch SAR image. Please try again.".into(),
            },
            ErrorKind::InvalidInput | ErrorKind::InvalidState => self.message.clone(),
            ErrorKind::Configuration => {
                "The SAR service is not configured correctly. Please contact support.".into()
            }
        }
    }
}

impl std::fmt::Display for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}", self.code(), self.message)?;
        if let Some(internal) = &self.internal_message {
            write!(f, " (internal: {internal})")?;
        }
        Ok(())
    }
}

impl std::error::Error for AppError {}

impl From<ValidationError> for AppError {
    fn from(e: ValidationError) -> Self {
        AppError::new(ErrorKind::InvalidInput, e.to_string())
    }
}

impl From<ConversionError> for AppError {
    fn from(e: ConversionError) -> Self {
        let error = AppError::new(e.kind(), e.to_string());
        match e {
            ConversionError::Status {
                status,
                server_message,
            } => {
                let error = error.with_context("http_status", status.to_string());
                match server_message {
                    Some(reason) => error.with_context("server_error", reason),
                    None => error,
                }
            }
            ConversionError::Timeout { timeout_ms } => {
                error.with_context("timeout_ms", timeout_ms.to_string())
            }
            _ => error,
        }
    }
}

pub type AppResult<T> = Result<T, AppError>;
