//! Runtime half of a conversion screen.
//!
//! A [`ConversionScreen`] owns one [`ConversionController`] and executes the
//! commands it yields on the ambient tokio runtime. Completions come back
//! over a channel and are applied with [`ConversionScreen::next_completion`].

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::runtime::Handle;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info_span, warn, Instrument};

use crate::capabilities::{ConversionClient, ConversionError, ConversionOutcome};
use crate::controller::{ConversionCommand, ConversionController, ResultDisposition};
use crate::event::{Coordinate, Event, RequestId};
use crate::model::{ConversionInput, RequestState, TriggerPolicy};
use crate::view::ConversionView;
use crate::{AppError, AppResult, ErrorKind};

/// What happens to an in-flight request once a newer one supersedes it.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum SupersedePolicy {
    /// Abort the older task. Its result is never produced.
    #[default]
    AbortSuperseded,
    /// Let it finish; the staleness check drops the result.
    DiscardStale,
}

pub struct ConversionScreen {
    controller: ConversionController,
    client: Arc<dyn ConversionClient>,
    supersede: SupersedePolicy,
    completions_tx: mpsc::UnboundedSender<Event>,
    completions_rx: mpsc::UnboundedReceiver<Event>,
    in_flight: Vec<(RequestId, JoinHandle<()>)>,
}

impl ConversionScreen {
    pub fn new(client: Arc<dyn ConversionClient>, policy: TriggerPolicy) -> Self {
        let (completions_tx, completions_rx) = mpsc::unbounded_channel();
        Self {
            controller: ConversionController::new(policy),
            client,
            supersede: SupersedePolicy::default(),
            completions_tx,
            completions_rx,
            in_flight: Vec::new(),
        }
    }

    /// Image upload page: the user presses convert.
    pub fn upload(client: Arc<dyn ConversionClient>) -> Self {
        Self::new(client, TriggerPolicy::Manual)
    }

    /// Map page: every picked location converts immediately.
    pub fn location(client: Arc<dyn ConversionClient>) -> Self {
        Self::new(client, TriggerPolicy::AutoTrigger)
    }

    #[must_use]
    pub fn with_supersede_policy(mut self, supersede: SupersedePolicy) -> Self {
        self.supersede = supersede;
        self
    }

    #[must_use]
    pub const fn supersede_policy(&self) -> SupersedePolicy {
        self.supersede
    }

    #[must_use]
    pub const fn controller(&self) -> &ConversionController {
        &self.controller
    }

    /// Single entry point for shell events.
    pub fn handle(&mut self, event: Event) -> AppResult<()> {
        debug!(event = event.name(), "handling event");
        match event {
            Event::ScreenOpened { policy } => {
                self.reset(policy);
                Ok(())
            }
            Event::BackendConfigured { .. } => Err(AppError::new(
                ErrorKind::InvalidState,
                "This screen's backend is fixed by its client.",
            )),
            Event::ImageSelected { image } => self.select_input(ConversionInput::Image(image)),
            Event::LocationSelected {
                latitude,
                longitude,
            } => self.on_location_selected(latitude, longitude),
            Event::ConvertRequested => self.start_conversion().map(|_| ()),
            Event::ClearRequested => {
                self.clear();
                Ok(())
            }
            Event::ConversionCompleted {
                request_id,
                outcome,
            } => {
                self.complete(request_id, *outcome);
                Ok(())
            }
        }
    }

    pub fn select_input(&mut self, input: ConversionInput) -> AppResult<()> {
        let command = self.controller.select_input(input)?;
        if self.supersede == SupersedePolicy::AbortSuperseded {
            self.abort_in_flight();
        }
        if let Some(command) = command {
            self.dispatch(command);
        }
        Ok(())
    }

    /// Map widget callback.
    pub fn on_location_selected(&mut self, latitude: f64, longitude: f64) -> AppResult<()> {
        self.select_input(ConversionInput::Coordinate(Coordinate::unchecked(
            latitude, longitude,
        )))
    }

    pub fn start_conversion(&mut self) -> AppResult<RequestId> {
        let command = self.controller.start_conversion()?;
        let request_id = command.request_id;
        self.dispatch(command);
        Ok(request_id)
    }

    /// Reopens the screen under `policy`. In-flight work is aborted.
    pub fn reset(&mut self, policy: TriggerPolicy) {
        self.abort_in_flight();
        self.controller.reset(policy);
    }

    pub fn clear(&mut self) {
        self.controller.clear();
        if self.supersede == SupersedePolicy::AbortSuperseded {
            self.abort_in_flight();
        }
    }

    /// Applies the next completion, waiting for one if a request is still
    /// running. `None` once nothing is in flight.
    pub async fn next_completion(&mut self) -> Option<ResultDisposition> {
        self.in_flight.retain(|(_, handle)| !handle.is_finished());
        let event = match self.completions_rx.try_recv() {
            Ok(event) => event,
            Err(_) if self.in_flight.is_empty() => return None,
            Err(_) => self.completions_rx.recv().await?,
        };

        match event {
            Event::ConversionCompleted {
                request_id,
                outcome,
            } => Some(self.complete(request_id, *outcome)),
            other => {
                warn!(event = other.name(), "unexpected event on completion channel");
                None
            }
        }
    }

    /// Applies completions until the controller stops waiting.
    pub async fn settle(&mut self) {
        while self.controller.state().is_pending() {
            if self.next_completion().await.is_none() {
                break;
            }
        }
    }

    #[must_use]
    pub fn state(&self) -> RequestState {
        self.controller.state()
    }

    pub fn subscribe(&self) -> watch::Receiver<RequestState> {
        self.controller.subscribe()
    }

    #[must_use]
    pub fn view(&self) -> ConversionView {
        self.controller.view()
    }

    #[must_use]
    pub fn in_flight_count(&self) -> usize {
        self.in_flight
            .iter()
            .filter(|(_, handle)| !handle.is_finished())
            .count()
    }

    fn complete(&mut self, request_id: RequestId, outcome: ConversionOutcome) -> ResultDisposition {
        self.in_flight.retain(|(id, _)| *id != request_id);
        self.controller.on_result(request_id, outcome)
    }

    fn dispatch(&mut self, command: ConversionCommand) {
        match self.supersede {
            SupersedePolicy::AbortSuperseded => self.abort_in_flight(),
            SupersedePolicy::DiscardStale => {
                self.in_flight.retain(|(_, handle)| !handle.is_finished());
            }
        }

        let ConversionCommand { request_id, input } = command;
        let Ok(runtime) = Handle::try_current() else {
            warn!(%request_id, "no tokio runtime, failing conversion");
            self.controller.on_result(
                request_id,
                Err(ConversionError::Network {
                    detail: "tokio runtime is not active".into(),
                }),
            );
            return;
        };

        let client = Arc::clone(&self.client);
        let completions = self.completions_tx.clone();
        let span = info_span!("conversion", %request_id, input = input.kind_label());
        let task = runtime.spawn(
            async move {
                let outcome = client.convert(&input).await;
                let completed = Event::ConversionCompleted {
                    request_id,
                    outcome: Box::new(outcome),
                };
                if completions.send(completed).is_err() {
                    debug!("screen gone before completion");
                }
            }
            .instrument(span),
        );
        self.in_flight.push((request_id, task));
    }

    fn abort_in_flight(&mut self) {
        for (request_id, task) in self.in_flight.drain(..) {
            if !task.is_finished() {
                debug!(%request_id, "aborting superseded conversion");
                task.abort();
            }
        }
    }
}

impl Drop for ConversionScreen {
    fn drop(&mut self) {
        for (_, task) in self.in_flight.drain(..) {
            task.abort();
        }
    }
}
