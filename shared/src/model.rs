//! Core domain state: selected inputs, request lifecycle and live feed
//! session data.
//!
//! Values here are plain data. Transitions live in the controller and the
//! stream loop.

use bytes::Bytes;
use image::ImageFormat;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::event::{Coordinate, ImageId, RequestId, ValidationError};
use crate::{ErrorKind, MAX_IMAGE_BYTES};

/// Formats the upload page accepts; anything else is rejected on selection.
const SUPPORTED_FORMATS: &[ImageFormat] = &[
    ImageFormat::Png,
    ImageFormat::Jpeg,
    ImageFormat::WebP,
    ImageFormat::Gif,
    ImageFormat::Bmp,
    ImageFormat::Tiff,
];

/// Locally selected image. Holds the bytes behind a cheap-to-clone `Bytes`.
#[derive(Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ImageHandle {
    id: ImageId,
    file_name: String,
    bytes: Bytes,
}

impl ImageHandle {
    pub fn new(file_name: impl Into<String>, bytes: impl Into<Bytes>) -> Self {
        Self {
            id: ImageId::generate(),
            file_name: file_name.into(),
            bytes: bytes.into(),
        }
    }

    #[must_use]
    pub const fn id(&self) -> ImageId {
        self.id
    }

    #[must_use]
    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    #[must_use]
    pub const fn bytes(&self) -> &Bytes {
        &self.bytes
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Sniffed from the magic bytes; the file extension is not trusted.
    #[must_use]
    pub fn format(&self) -> Option<ImageFormat> {
        image::guess_format(&self.bytes).ok()
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.bytes.is_empty() {
            return Err(ValidationError::EmptyImage);
        }
        if self.bytes.len() > MAX_IMAGE_BYTES {
            return Err(ValidationError::ImageTooLarge {
                size: self.bytes.len(),
                max: MAX_IMAGE_BYTES,
            });
        }
        match self.format() {
            Some(format) if SUPPORTED_FORMATS.contains(&format) => Ok(()),
            _ => Err(ValidationError::UnsupportedImageFormat {
                file_name: self.file_name.clone(),
            }),
        }
    }
}

// Keep image bytes out of logs.
impl fmt::Debug for ImageHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ImageHandle")
            .field("id", &self.id)
            .field("file_name", &self.file_name)
            .field("size_bytes", &self.bytes.len())
            .finish()
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum ConversionInput {
    Image(ImageHandle),
    Coordinate(Coordinate),
}

impl ConversionInput {
    #[must_use]
    pub fn image(file_name: impl Into<String>, bytes: impl Into<Bytes>) -> Self {
        Self::Image(ImageHandle::new(file_name, bytes))
    }

    #[must_use]
    pub const fn coordinate(latitude: f64, longitude: f64) -> Self {
        Self::Coordinate(Coordinate::unchecked(latitude, longitude))
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        match self {
            Self::Image(image) => image.validate(),
            Self::Coordinate(coordinate) => coordinate.validate(),
        }
    }

    #[must_use]
    pub const fn kind_label(&self) -> &'static str {
        match self {
            Self::Image(_) => "image",
            Self::Coordinate(_) => "coordinate",
        }
    }

    /// What the screen shows next to the result: file name or "lat, lng".
    #[must_use]
    pub fn display_label(&self) -> String {
        match self {
            Self::Image(image) => image.file_name().to_owned(),
            Self::Coordinate(coordinate) => coordinate.to_string(),
        }
    }
}

/// Output of a successful conversion. Replaced wholesale, never mutated.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum ResultImageRef {
    /// Rendered by the backend and served from `url`.
    Remote { url: String },
    /// Stand-in for the upload flow: the uploaded image echoed back.
    /// No conversion has happened.
    Placeholder { image: ImageHandle },
}

impl ResultImageRef {
    #[must_use]
    pub fn as_url(&self) -> Option<&str> {
        match self {
            Self::Remote { url } => Some(url),
            Self::Placeholder { .. } => None,
        }
    }

    #[must_use]
    pub const fn is_placeholder(&self) -> bool {
        matches!(self, Self::Placeholder { .. })
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub enum RequestState {
    #[default]
    Idle,
    Pending {
        request_id: RequestId,
    },
    Succeeded {
        request_id: RequestId,
        result: ResultImageRef,
    },
    Failed {
        request_id: RequestId,
        kind: ErrorKind,
        message: String,
    },
}

impl RequestState {
    #[must_use]
    pub const fn request_id(&self) -> Option<RequestId> {
        match self {
            Self::Idle => None,
            Self::Pending { request_id }
            | Self::Succeeded { request_id, .. }
            | Self::Failed { request_id, .. } => Some(*request_id),
        }
    }

    #[must_use]
    pub const fn is_idle(&self) -> bool {
        matches!(self, Self::Idle)
    }

    #[must_use]
    pub const fn is_pending(&self) -> bool {
        matches!(self, Self::Pending { .. })
    }

    #[must_use]
    pub const fn is_pending_on(&self, id: RequestId) -> bool {
        matches!(self, Self::Pending { request_id } if request_id.0 == id.0)
    }

    #[must_use]
    pub const fn result(&self) -> Option<&ResultImageRef> {
        match self {
            Self::Succeeded { result, .. } => Some(result),
            _ => None,
        }
    }

    #[must_use]
    pub fn error_message(&self) -> Option<&str> {
        match self {
            Self::Failed { message, .. } => Some(message),
            _ => None,
        }
    }

    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Pending { .. } => "pending",
            Self::Succeeded { .. } => "succeeded",
            Self::Failed { .. } => "failed",
        }
    }
}

/// Whether choosing an input also starts a conversion.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum TriggerPolicy {
    /// Upload flow: the user presses "Convert to SAR".
    #[default]
    Manual,
    /// Location flow: every map click converts immediately.
    AutoTrigger,
}

// --- Live feed ---

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamSession {
    pub active: bool,
    pub frame_count: u64,
    pub fps: u32,
    pub processing_time_ms: u32,
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Resolution {
    #[default]
    Full1080p,
    Hd720p,
    Sd480p,
}

impl Resolution {
    #[must_use]
    pub const fn dimensions(self) -> (u32, u32) {
        match self {
            Self::Full1080p => (1920, 1080),
            Self::Hd720p => (1280, 720),
            Self::Sd480p => (854, 480),
        }
    }

    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Full1080p => "1080p (1920x1080)",
            Self::Hd720p => "720p (1280x720)",
            Self::Sd480p => "480p (854x480)",
        }
    }
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProcessingQuality {
    High,
    #[default]
    Balanced,
    Fast,
}

impl ProcessingQuality {
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::High => "High (Slower)",
            Self::Balanced => "Balanced",
            Self::Fast => "Fast (Lower quality)",
        }
    }
}

/// Live-feed output settings. Shown to the user, not fed into the metrics.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamSettings {
    pub resolution: Resolution,
    pub quality: ProcessingQuality,
}

/// Snapshot taken by "Save Current Frame".
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrameCapture {
    pub frame_index: u64,
    pub fps: u32,
    pub processing_time_ms: u32,
    pub settings: StreamSettings,
}


#[cfg(test)]
mod tests {
    use super::fixtures::PNG_MAGIC;
    use super::*;

    #[test]
    fn image_handle_accepts_png() {
        let image = ImageHandle::new("harbor.png", PNG_MAGIC);
        assert_eq!(image.format(), Some(ImageFormat::Png));
        assert!(image.validate().is_ok());
    }

    #[test]
    fn image_handle_rejects_empty_and_non_images() {
        assert_eq!(
            ImageHandle::new("empty.png", Vec::<u8>::new()).validate(),
            Err(ValidationError::EmptyImage)
        );
        assert!(matches!(
            ImageHandle::new("notes.txt", &b"plain text, not pixels"[..]).validate(),
            Err(ValidationError::UnsupportedImageFormat { file_name }) if file_name == "notes.txt"
        ));
    }

    #[test]
    fn image_handle_rejects_oversized() {
        let mut bytes = PNG_MAGIC.to_vec();
        bytes.resize(MAX_IMAGE_BYTES + 1, 0);
        assert!(matches!(
            ImageHandle::new("huge.png", bytes).validate(),
            Err(ValidationError::ImageTooLarge { .. })
        ));
    }

    #[test]
    fn image_handle_debug_hides_bytes() {
        let image = ImageHandle::new("harbor.png", PNG_MAGIC);
        let debug = format!("{image:?}");
        assert!(debug.contains("size_bytes: 12"));
        assert!(!debug.contains("bytes: b"));
    }

    #[test]
    fn placeholder_is_distinguishable_from_remote() {
        let remote = ResultImageRef::Remote {
            url: "https://x/y.png".into(),
        };
        let echo = ResultImageRef::Placeholder {
            image: ImageHandle::new("harbor.png", PNG_MAGIC),
        };
        assert!(!remote.is_placeholder());
        assert_eq!(remote.as_url(), Some("https://x/y.png"));
        assert!(echo.is_placeholder());
        assert_eq!(echo.as_url(), None);
    }

    #[test]
    fn request_state_accessors() {
        let pending = RequestState::Pending {
            request_id: RequestId(3),
        };
        assert!(pending.is_pending_on(RequestId(3)));
        assert!(!pending.is_pending_on(RequestId(2)));
        assert_eq!(pending.request_id(), Some(RequestId(3)));
        assert_eq!(RequestState::Idle.request_id(), None);

        let failed = RequestState::Failed {
            request_id: RequestId(4),
            kind: ErrorKind::Network,
            message: "offline".into(),
        };
        assert_eq!(failed.error_message(), Some("offline"));
        assert!(failed.result().is_none());
    }

    #[test]
    fn coordinate_inputs_label_with_four_decimals() {
        assert_eq!(
            ConversionInput::coordinate(12.97, 77.59).display_label(),
            "12.9700, 77.5900"
        );
    }

    #[test]
    fn stream_settings_default_to_balanced_1080p() {
        let settings = StreamSettings::default();
        assert_eq!(settings.resolution.dimensions(), (1920, 1080));
        assert_eq!(settings.quality.label(), "Balanced");
    }
}
