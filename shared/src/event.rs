//! Shell-facing events and the identifiers they carry.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::capabilities::ConversionOutcome;
use crate::model::{ImageHandle, TriggerPolicy};

// --- Typed IDs ---

/// Sequence number for one dispatched conversion.
///
/// Allocated per controller, strictly increasing, starting at 1.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RequestId(pub u64);

impl RequestId {
    #[must_use]
    pub const fn next(self) -> Self {
        Self(self.0 + 1)
    }

    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "req-{}", self.0)
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ImageId(pub Uuid);

impl ImageId {
    #[must_use]
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for ImageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

// --- Validation ---

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ValidationError {
    #[error("Coordinate value is not finite (NaN or Infinity)")]
    NonFiniteCoordinate,
    #[error("Latitude {0} is out of valid range [-90, 90]")]
    LatitudeOutOfRange(f64),
    #[error("Longitude {0} is out of valid range [-180, 180]")]
    LongitudeOutOfRange(f64),
    #[error("The selected image is empty")]
    EmptyImage,
    #[error("The selected image is too large ({size} bytes, maximum {max})")]
    ImageTooLarge { size: usize, max: usize },
    #[error("'{file_name}' is not a supported image. Please use JPEG, PNG, WebP, GIF, BMP or TIFF.")]
    UnsupportedImageFormat { file_name: String },
}

// --- Coordinate ---

/// A map point as delivered by the location picker.
///
/// Construction through [`Coordinate::new`] validates; the picker callback
/// path builds raw values and the controller validates on selection.
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Coordinate {
    pub latitude: f64,
    pub longitude: f64,
}

impl Coordinate {
    pub fn new(latitude: f64, longitude: f64) -> Result<Self, ValidationError> {
        let coordinate = Self::unchecked(latitude, longitude);
        coordinate.validate()?;
        Ok(coordinate)
    }

    #[must_use]
    pub const fn unchecked(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if !self.latitude.is_finite() || !self.longitude.is_finite() {
            return Err(ValidationError::NonFiniteCoordinate);
        }
        if !(-90.0..=90.0).contains(&self.latitude) {
            return Err(ValidationError::LatitudeOutOfRange(self.latitude));
        }
        if !(-180.0..=180.0).contains(&self.longitude) {
            return Err(ValidationError::LongitudeOutOfRange(self.longitude));
        }
        Ok(())
    }
}

impl fmt::Display for Coordinate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.4}, {:.4}", self.latitude, self.longitude)
    }
}

// --- Event enum: shell-facing inputs, large variants boxed ---

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub enum Event {
    // Navigation and setup
    ScreenOpened {
        policy: TriggerPolicy,
    },
    BackendConfigured {
        base_url: String,
    },

    // Upload flow
    ImageSelected {
        image: ImageHandle,
    },

    // Location flow (map widget callback)
    LocationSelected {
        latitude: f64,
        longitude: f64,
    },

    ConvertRequested,
    ClearRequested,

    // Transport responses
    ConversionCompleted {
        request_id: RequestId,
        outcome: Box<ConversionOutcome>,
    },
}

impl Event {
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::ScreenOpened { .. } => "screen_opened",
            Self::BackendConfigured { .. } => "backend_configured",
            Self::ImageSelected { .. } => "image_selected",
            Self::LocationSelected { .. } => "location_selected",
            Self::ConvertRequested => "convert_requested",
            Self::ClearRequested => "clear_requested",
            Self::ConversionCompleted { .. } => "conversion_completed",
        }
    }

    #[must_use]
    pub const fn is_user_initiated(&self) -> bool {
        !matches!(
            self,
            Self::ConversionCompleted { .. } | Self::BackendConfigured { .. }
        )
    }
}
