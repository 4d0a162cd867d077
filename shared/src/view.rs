//! Read-only projections the shell renders.
//!
//! Everything here is derived from controller or stream state on demand
//! and never fed back into the core.

use serde::{Deserialize, Serialize};

use crate::event::ImageId;
use crate::model::{
    ConversionInput, RequestState, ResultImageRef, StreamSession, StreamSettings, TriggerPolicy,
};
use crate::{AppError, ErrorKind};

pub const CONVERT_LABEL: &str = "Convert to SAR";
pub const PROCESSING_LABEL: &str = "Processing...";
pub const REGENERATE_LABEL: &str = "Generate New SAR Image";
pub const START_STREAM_LABEL: &str = "Start Stream";
pub const PAUSE_STREAM_LABEL: &str = "Pause Stream";

#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConversionPhase {
    Idle,
    Processing,
    Ready,
    Failed,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ResultView {
    Remote { url: String },
    /// Echo of the upload; shells should badge it as not converted.
    Placeholder { image_id: ImageId, file_name: String },
}

impl From<&ResultImageRef> for ResultView {
    fn from(result: &ResultImageRef) -> Self {
        match result {
            ResultImageRef::Remote { url } => Self::Remote { url: url.clone() },
            ResultImageRef::Placeholder { image } => Self::Placeholder {
                image_id: image.id(),
                file_name: image.file_name().to_owned(),
            },
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorView {
    pub message: String,
    pub error_code: String,
    pub is_retryable: bool,
}

impl From<&AppError> for ErrorView {
    fn from(error: &AppError) -> Self {
        Self {
            message: error.user_facing_message(),
            error_code: error.code().to_owned(),
            is_retryable: error.is_retryable(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversionView {
    pub phase: ConversionPhase,
    pub input_label: Option<String>,
    pub convert_label: String,
    pub convert_enabled: bool,
    pub can_clear: bool,
    /// Shown in the result pane when there is nothing else to show.
    pub hint: Option<String>,
    pub result: Option<ResultView>,
    pub error: Option<ErrorView>,
}

impl ConversionView {
    #[must_use]
    pub fn project(
        policy: TriggerPolicy,
        input: Option<&ConversionInput>,
        state: &RequestState,
    ) -> Self {
        let phase = match state {
            RequestState::Idle => ConversionPhase::Idle,
            RequestState::Pending { .. } => ConversionPhase::Processing,
            RequestState::Succeeded { .. } => ConversionPhase::Ready,
            RequestState::Failed { .. } => ConversionPhase::Failed,
        };

        let convert_label = match phase {
            ConversionPhase::Processing => PROCESSING_LABEL,
            ConversionPhase::Ready => REGENERATE_LABEL,
            ConversionPhase::Idle | ConversionPhase::Failed => CONVERT_LABEL,
        };

        let hint = match (phase, input, policy) {
            (ConversionPhase::Idle, None, TriggerPolicy::Manual) => {
                Some("Select an image to convert".to_owned())
            }
            (ConversionPhase::Idle, None, TriggerPolicy::AutoTrigger) => {
                Some("Click on the map to choose a location".to_owned())
            }
            (ConversionPhase::Idle, Some(_), _) => {
                Some(format!("Click \"{CONVERT_LABEL}\" to generate"))
            }
            _ => None,
        };

        let error = match state {
            RequestState::Failed { kind, message, .. } => Some(error_view(*kind, message)),
            _ => None,
        };

        Self {
            phase,
            input_label: input.map(ConversionInput::display_label),
            convert_label: convert_label.to_owned(),
            convert_enabled: input.is_some() && phase != ConversionPhase::Processing,
            can_clear: input.is_some() || !state.is_idle(),
            hint,
            result: state.result().map(ResultView::from),
            error,
        }
    }
}

fn error_view(kind: ErrorKind, message: &str) -> ErrorView {
    ErrorView {
        message: message.to_owned(),
        error_code: kind.code().to_owned(),
        is_retryable: kind.is_retryable(),
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamView {
    pub streaming: bool,
    pub status_label: String,
    pub frame_count: u64,
    /// `None` renders as "-" while paused.
    pub fps: Option<u32>,
    pub processing_time_ms: Option<u32>,
    pub toggle_label: String,
    pub can_save_frame: bool,
    pub resolution_label: String,
    pub quality_label: String,
}

impl StreamView {
    #[must_use]
    pub fn project(session: &StreamSession, settings: &StreamSettings) -> Self {
        let streaming = session.active;
        Self {
            streaming,
            status_label: if streaming { "Stream active" } else { "Stream inactive" }.to_owned(),
            frame_count: session.frame_count,
            fps: streaming.then_some(session.fps),
            processing_time_ms: streaming.then_some(session.processing_time_ms),
            toggle_label: if streaming { PAUSE_STREAM_LABEL } else { START_STREAM_LABEL }
                .to_owned(),
            can_save_frame: streaming,
            resolution_label: settings.resolution.label().to_owned(),
            quality_label: settings.quality.label().to_owned(),
        }
    }
}
