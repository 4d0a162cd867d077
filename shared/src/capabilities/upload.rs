//! Conversion pathway for uploaded images.

use std::time::Duration;

use tracing::{debug, instrument};

use super::ConversionOutcome;
use crate::model::{ImageHandle, ResultImageRef};

/// Delay the upload page used to fake processing.
pub const ORIGINAL_ECHO_DELAY: Duration = Duration::from_millis(2_500);

/// Pathway for `ConversionInput::Image`.
///
/// There is no backend contract for uploads yet, so this stays pluggable
/// until one exists.
#[async_trait::async_trait]
pub trait ImageConversion: Send + Sync {
    /// False for stand-ins that do not actually produce SAR imagery.
    fn is_real_conversion(&self) -> bool;

    async fn convert(&self, image: &ImageHandle) -> ConversionOutcome;
}

/// Echoes the uploaded image back as a [`ResultImageRef::Placeholder`].
#[derive(Debug, Clone, Default)]
pub struct EchoImageConversion {
    delay: Duration,
}

impl EchoImageConversion {
    #[must_use]
    pub const fn with_delay(delay: Duration) -> Self {
        Self { delay }
    }

    #[must_use]
    pub const fn delay(&self) -> Duration {
        self.delay
    }
}

#[async_trait::async_trait]
impl ImageConversion for EchoImageConversion {
    fn is_real_conversion(&self) -> bool {
        false
    }

    #[instrument(skip(self, image), fields(image_id = %image.id(), size_bytes = image.len()))]
    async fn convert(&self, image: &ImageHandle) -> ConversionOutcome {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        debug!("echoing upload as placeholder result");
        Ok(ResultImageRef::Placeholder {
            image: image.clone(),
        })
    }
}
