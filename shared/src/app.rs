//! Crux app behind the upload and location screens.
//!
//! The shell forwards [`Event`]s, renders the [`ConversionView`] and executes
//! whatever the [`Effect`]s ask for. Coordinates become a request on the
//! `Http` capability whose response is folded into
//! [`Event::ConversionCompleted`] before it re-enters the core, so the
//! controller's staleness check sees every answer. Uploads have no backend
//! route and are echoed back as a placeholder without leaving the core.

use tracing::{debug, warn};
use uuid::Uuid;

use crate::capabilities::{
    encode_request, interpret_response, ClientConfig, ConversionError,
    ConversionOutcome, REQUEST_ID_HEADER,
};
use crate::controller::{ConversionCommand, ConversionController};
use crate::event::{Coordinate, Event, RequestId};
use crate::model::{ConversionInput, ResultImageRef};
use crate::view::{ConversionView, ErrorView};
use crate::{AppError, AppResult};

#[derive(crux_core::macros::Effect)]
pub struct Capabilities {
    pub http: crux_http::Http<Event>,
    pub render: crux_core::render::Render<Event>,
}

#[derive(Debug, Default)]
pub struct Model {
    pub controller: ConversionController,
    /// `None` targets the local development backend.
    pub backend: Option<ClientConfig>,
    /// Why the last user action was refused. Cleared by the next accepted one.
    pub notice: Option<AppError>,
}

impl Model {
    pub fn backend(&self) -> AppResult<ClientConfig> {
        match &self.backend {
            Some(config) => Ok(config.clone()),
            None => ClientConfig::local(),
        }
    }
}

#[derive(Default)]
pub struct App;

impl crux_core::App for App {
    type Event = Event;
    type Model = Model;
    type ViewModel = ConversionView;
    type Capabilities = Capabilities;

    fn update(&self, event: Event, model: &mut Model, caps: &Capabilities) {
        let name = event.name();
        let user_initiated = event.is_user_initiated();
        debug!(event = name, "handling event");

        match Self::apply(event, model, caps) {
            Ok(()) if user_initiated => model.notice = None,
            Ok(()) => {}
            Err(error) => {
                warn!(event = name, code = error.code(), error = %error, "event rejected");
                model.notice = Some(error);
            }
        }

        caps.render.render();
    }

    fn view(&self, model: &Model) -> ConversionView {
        let mut view = model.controller.view();
        if view.error.is_none() {
            view.error = model.notice.as_ref().map(ErrorView::from);
        }
        view
    }
}

impl App {
    fn apply(event: Event, model: &mut Model, caps: &Capabilities) -> AppResult<()> {
        match event {
            Event::ScreenOpened { policy } => model.controller.reset(policy),
            Event::BackendConfigured { base_url } => {
                model.backend = Some(ClientConfig::with_base_url(&base_url)?);
            }
            Event::ImageSelected { image } => {
                Self::select(ConversionInput::Image(image), model, caps)?;
            }
            Event::LocationSelected {
                latitude,
                longitude,
            } => {
                let coordinate = Coordinate::unchecked(latitude, longitude);
                Self::select(ConversionInput::Coordinate(coordinate), model, caps)?;
            }
            Event::ConvertRequested => {
                let command = model.controller.start_conversion()?;
                Self::dispatch(command, model, caps);
            }
            Event::ClearRequested => model.controller.clear(),
            Event::ConversionCompleted {
                request_id,
                outcome,
            } => {
                model.controller.on_result(request_id, *outcome);
            }
        }
        Ok(())
    }

    fn select(input: ConversionInput, model: &mut Model, caps: &Capabilities) -> AppResult<()> {
        if let Some(command) = model.controller.select_input(input)? {
            Self::dispatch(command, model, caps);
        }
        Ok(())
    }

    fn dispatch(command: ConversionCommand, model: &mut Model, caps: &Capabilities) {
        let ConversionCommand { request_id, input } = command;
        match input {
            ConversionInput::Image(image) => {
                debug!(%request_id, "upload pathway is a placeholder, no backend call");
                model
                    .controller
                    .on_result(request_id, Ok(ResultImageRef::Placeholder { image }));
            }
            ConversionInput::Coordinate(coordinate) => {
                if let Err(error) = Self::send_conversion(request_id, coordinate, model, caps) {
                    model.controller.on_result(request_id, Err(error));
                }
            }
        }
    }

    fn send_conversion(
        request_id: RequestId,
        coordinate: Coordinate,
        model: &Model,
        caps: &Capabilities,
    ) -> Result<(), ConversionError> {
        let config = model.backend().map_err(configuration_error)?;
        let endpoint = config.endpoint().map_err(configuration_error)?;
        let body = encode_request(coordinate)?;
        let correlation_id = Uuid::new_v4().to_string();
        debug!(%request_id, %correlation_id, %endpoint, "requesting SAR image");

        caps.http
            .post(endpoint.as_str())
            .header("Content-Type", "application/json")
            .header(REQUEST_ID_HEADER, correlation_id.clone())
            .body(body)
            .send(move |result| Event::ConversionCompleted {
                request_id,
                outcome: Box::new(read_response(&config, result, &correlation_id)),
            });
        Ok(())
    }
}

fn configuration_error(error: AppError) -> ConversionError {
    ConversionError::Configuration {
        detail: error.to_string(),
    }
}

fn read_response(
    config: &ClientConfig,
    result: crux_http::Result<crux_http::Response<Vec<u8>>>,
    correlation_id: &str,
) -> ConversionOutcome {
    let mut response = result.map_err(|e| ConversionError::Network {
        detail: e.to_string(),
    })?;
    let status = u16::from(response.status());
    let body = response.take_body().unwrap_or_default();
    interpret_response(config, status, &body, correlation_id)
}
