//! Per-screen conversion request state machine.
//!
//! The controller never performs I/O. Starting a conversion yields a
//! [`ConversionCommand`] for the owning screen to execute; the outcome comes
//! back through [`ConversionController::on_result`], which applies it only
//! when it belongs to the latest issued request.

use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::capabilities::ConversionOutcome;
use crate::event::RequestId;
use crate::model::{ConversionInput, RequestState, TriggerPolicy};
use crate::view::ConversionView;
use crate::{AppError, ErrorKind};

/// One conversion to run. Executing it must produce exactly one client call.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ConversionCommand {
    pub request_id: RequestId,
    pub input: ConversionInput,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ResultDisposition {
    Applied,
    Stale,
}

#[derive(Debug)]
pub struct ConversionController {
    policy: TriggerPolicy,
    input: Option<ConversionInput>,
    last_issued: RequestId,
    state: watch::Sender<RequestState>,
}

impl Default for ConversionController {
    fn default() -> Self {
        Self::new(TriggerPolicy::default())
    }
}

impl ConversionController {
    #[must_use]
    pub fn new(policy: TriggerPolicy) -> Self {
        let (state, _) = watch::channel(RequestState::Idle);
        Self {
            policy,
            input: None,
            last_issued: RequestId::default(),
            state,
        }
    }

    #[must_use]
    pub const fn policy(&self) -> TriggerPolicy {
        self.policy
    }

    #[must_use]
    pub const fn input(&self) -> Option<&ConversionInput> {
        self.input.as_ref()
    }

    #[must_use]
    pub fn state(&self) -> RequestState {
        self.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<RequestState> {
        self.state.subscribe()
    }

    /// `None` until the first conversion starts.
    #[must_use]
    pub fn latest_request_id(&self) -> Option<RequestId> {
        (self.last_issued != RequestId::default()).then_some(self.last_issued)
    }

    pub fn select_input(
        &mut self,
        input: ConversionInput,
    ) -> Result<Option<ConversionCommand>, AppError> {
        input
            .validate()
            .map_err(|e| AppError::from(e).with_context("input", input.kind_label()))?;

        debug!(input = input.kind_label(), "input selected");
        self.input = Some(input);
        self.transition(RequestState::Idle);

        match self.policy {
            TriggerPolicy::AutoTrigger => self.start_conversion().map(Some),
            TriggerPolicy::Manual => Ok(None),
        }
    }

    pub fn start_conversion(&mut self) -> Result<ConversionCommand, AppError> {
        let Some(input) = self.input.clone() else {
            return Err(AppError::new(
                ErrorKind::InvalidState,
                "Select an input before converting.",
            ));
        };

        self.last_issued = self.last_issued.next();
        let request_id = self.last_issued;
        self.transition(RequestState::Pending { request_id });
        debug!(%request_id, input = input.kind_label(), "conversion started");

        Ok(ConversionCommand { request_id, input })
    }

    pub fn on_result(
        &mut self,
        request_id: RequestId,
        outcome: ConversionOutcome,
    ) -> ResultDisposition {
        if request_id != self.last_issued || !self.state.borrow().is_pending_on(request_id) {
            warn!(
                %request_id,
                latest = %self.last_issued,
                state = self.state.borrow().name(),
                "discarding stale conversion result"
            );
            return ResultDisposition::Stale;
        }

        let next = match outcome {
            Ok(result) => {
                info!(%request_id, placeholder = result.is_placeholder(), "conversion succeeded");
                RequestState::Succeeded { request_id, result }
            }
            Err(error) => {
                let kind = error.kind();
                let error = AppError::from(error);
                warn!(%request_id, code = error.code(), error = %error, "conversion failed");
                RequestState::Failed {
                    request_id,
                    kind,
                    message: error.user_facing_message(),
                }
            }
        };
        self.transition(next);
        ResultDisposition::Applied
    }

    /// Starts over under `policy`, as when a screen is (re)opened. Request
    /// ids keep counting, so answers to earlier requests stay stale.
    pub fn reset(&mut self, policy: TriggerPolicy) {
        debug!(?policy, "controller reset");
        self.policy = policy;
        self.input = None;
        self.transition(RequestState::Idle);
    }

    /// Drops the input and any result. In-flight requests are left to the
    /// staleness check.
    pub fn clear(&mut self) {
        if self.input.is_none() && self.state.borrow().is_idle() {
            return;
        }
        self.input = None;
        self.transition(RequestState::Idle);
        debug!("conversion cleared");
    }

    #[must_use]
    pub fn view(&self) -> ConversionView {
        ConversionView::project(self.policy, self.input.as_ref(), &self.state.borrow())
    }

    fn transition(&self, next: RequestState) {
        let previous = self.state.send_replace(next);
        debug!(
            from = previous.name(),
            to = self.state.borrow().name(),
            "request state changed"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capabilities::testing::remote;
    use crate::capabilities::ConversionError;
    use crate::model::fixtures::PNG_MAGIC;
    use crate::model::ResultImageRef;
    use assert_matches::assert_matches;
    use proptest::prelude::*;

    fn coordinate(lat: f64, lng: f64) -> ConversionInput {
        ConversionInput::coordinate(lat, lng)
    }

    fn url_for(id: RequestId) -> String {
        format!("https://x/{}.png", id.get())
    }

    #[test]
    fn manual_selection_waits_for_convert() {
        let mut controller = ConversionController::new(TriggerPolicy::Manual);
        let command = controller
            .select_input(ConversionInput::image("harbor.png", PNG_MAGIC))
            .unwrap();
        assert!(command.is_none());
        assert!(controller.state().is_idle());
        assert_eq!(controller.latest_request_id(), None);

        let command = controller.start_conversion().unwrap();
        assert_eq!(command.request_id, RequestId(1));
        assert_eq!(
            controller.state(),
            RequestState::Pending {
                request_id: RequestId(1)
            }
        );
    }

    #[test]
    fn auto_trigger_dispatches_on_selection() {
        let mut controller = ConversionController::new(TriggerPolicy::AutoTrigger);
        let command = controller.select_input(coordinate(12.97, 77.59)).unwrap().unwrap();
        assert_eq!(command.input, coordinate(12.97, 77.59));
        assert!(controller.state().is_pending_on(command.request_id));
    }

    #[test]
    fn convert_without_input_is_invalid_state() {
        let mut controller = ConversionController::default();
        let error = controller.start_conversion().unwrap_err();
        assert_eq!(error.kind, ErrorKind::InvalidState);
        assert!(controller.state().is_idle());
    }

    #[test]
    fn reset_switches_policy_and_keeps_ids_monotonic() {
        let mut controller = ConversionController::new(TriggerPolicy::AutoTrigger);
        let first = controller.select_input(coordinate(3.0, 4.0)).unwrap().unwrap();

        controller.reset(TriggerPolicy::Manual);
        assert_eq!(controller.policy(), TriggerPolicy::Manual);
        assert_eq!(controller.input(), None);
        assert!(controller.state().is_idle());
        assert_eq!(
            controller.on_result(first.request_id, remote("https://x/late.png")),
            ResultDisposition::Stale
        );

        assert!(controller.select_input(coordinate(5.0, 6.0)).unwrap().is_none());
        let next = controller.start_conversion().unwrap();
        assert!(next.request_id > first.request_id);
    }

    #[test]
    fn invalid_input_leaves_controller_untouched() {
        let mut controller = ConversionController::new(TriggerPolicy::AutoTrigger);
        let first = controller.select_input(coordinate(1.0, 1.0)).unwrap().unwrap();

        let error = controller.select_input(coordinate(95.0, 0.0)).unwrap_err();
        assert_eq!(error.kind, ErrorKind::InvalidInput);
        assert_eq!(error.context.get("input").map(String::as_str), Some("coordinate"));
        assert_eq!(controller.input(), Some(&coordinate(1.0, 1.0)));
        assert!(controller.state().is_pending_on(first.request_id));

        let error = controller
            .select_input(ConversionInput::image("notes.txt", &b"not an image"[..]))
            .unwrap_err();
        assert_eq!(error.kind, ErrorKind::InvalidInput);
        assert!(controller.state().is_pending_on(first.request_id));
    }

    #[test]
    fn later_request_wins_when_results_arrive_in_order() {
        let mut controller = ConversionController::new(TriggerPolicy::AutoTrigger);
        let r1 = controller.select_input(coordinate(1.0, 1.0)).unwrap().unwrap();
        let r2 = controller.select_input(coordinate(2.0, 2.0)).unwrap().unwrap();

        assert_eq!(
            controller.on_result(r1.request_id, remote("https://x/1.png")),
            ResultDisposition::Stale
        );
        assert!(controller.state().is_pending_on(r2.request_id));
        assert_eq!(
            controller.on_result(r2.request_id, remote("https://x/2.png")),
            ResultDisposition::Applied
        );
        assert_eq!(
            controller.state().result(),
            Some(&ResultImageRef::Remote {
                url: "https://x/2.png".into()
            })
        );
    }

    #[test]
    fn later_request_wins_when_results_arrive_reversed() {
        let mut controller = ConversionController::new(TriggerPolicy::AutoTrigger);
        let r1 = controller.select_input(coordinate(1.0, 1.0)).unwrap().unwrap();
        let r2 = controller.select_input(coordinate(2.0, 2.0)).unwrap().unwrap();

        assert_eq!(
            controller.on_result(r2.request_id, remote("https://x/2.png")),
            ResultDisposition::Applied
        );
        assert_eq!(
            controller.on_result(r1.request_id, remote("https://x/1.png")),
            ResultDisposition::Stale
        );
        assert_eq!(
            controller.state().result().and_then(ResultImageRef::as_url),
            Some("https://x/2.png")
        );
    }

    #[test]
    fn restarting_same_input_issues_a_new_id() {
        let mut controller = ConversionController::new(TriggerPolicy::Manual);
        controller.select_input(coordinate(1.0, 1.0)).unwrap();
        let first = controller.start_conversion().unwrap();
        let second = controller.start_conversion().unwrap();
        assert_ne!(first.request_id, second.request_id);
        assert!(second.request_id > first.request_id);
        assert_eq!(first.input, second.input);
    }

    #[test]
    fn failures_are_recorded_and_recoverable() {
        let mut controller = ConversionController::new(TriggerPolicy::AutoTrigger);
        let r1 = controller.select_input(coordinate(1.0, 1.0)).unwrap().unwrap();
        controller.on_result(r1.request_id, Err(ConversionError::MissingResultReference));

        assert_matches!(
            controller.state(),
            RequestState::Failed { kind: ErrorKind::BadResponse, ref message, .. }
                if message == "Failed to fetch SAR image. Please try again."
        );

        let r2 = controller.select_input(coordinate(2.0, 2.0)).unwrap().unwrap();
        assert!(controller.state().is_pending_on(r2.request_id));
        controller.on_result(r2.request_id, remote("https://x/2.png"));
        assert!(controller.state().result().is_some());
    }

    #[test]
    fn late_result_after_clear_is_stale() {
        let mut controller = ConversionController::new(TriggerPolicy::AutoTrigger);
        let r1 = controller.select_input(coordinate(1.0, 1.0)).unwrap().unwrap();
        controller.clear();

        assert_eq!(
            controller.on_result(r1.request_id, remote("https://x/1.png")),
            ResultDisposition::Stale
        );
        assert!(controller.state().is_idle());
        assert!(controller.input().is_none());
    }

    #[test]
    fn late_result_after_reselect_is_stale() {
        let mut controller = ConversionController::new(TriggerPolicy::Manual);
        controller.select_input(coordinate(1.0, 1.0)).unwrap();
        let r1 = controller.start_conversion().unwrap();
        controller.select_input(coordinate(2.0, 2.0)).unwrap();

        assert_eq!(
            controller.on_result(r1.request_id, remote("https://x/1.png")),
            ResultDisposition::Stale
        );
        assert!(controller.state().is_idle());
    }

    #[test]
    fn duplicate_result_is_stale() {
        let mut controller = ConversionController::new(TriggerPolicy::AutoTrigger);
        let r1 = controller.select_input(coordinate(1.0, 1.0)).unwrap().unwrap();
        assert_eq!(
            controller.on_result(r1.request_id, remote("https://x/1.png")),
            ResultDisposition::Applied
        );
        assert_eq!(
            controller.on_result(r1.request_id, remote("https://x/other.png")),
            ResultDisposition::Stale
        );
        assert_eq!(
            controller.state().result().and_then(ResultImageRef::as_url),
            Some("https://x/1.png")
        );
    }

    #[test]
    fn clear_on_idle_does_not_notify() {
        let mut controller = ConversionController::default();
        let mut observer = controller.subscribe();
        observer.mark_unchanged();

        controller.clear();
        controller.clear();

        assert!(!observer.has_changed().unwrap());
        assert!(controller.state().is_idle());
    }

    #[test]
    fn clear_resets_success_and_notifies() {
        let mut controller = ConversionController::new(TriggerPolicy::AutoTrigger);
        let r1 = controller.select_input(coordinate(1.0, 1.0)).unwrap().unwrap();
        controller.on_result(r1.request_id, remote("https://x/1.png"));

        let mut observer = controller.subscribe();
        observer.mark_unchanged();
        controller.clear();

        assert!(observer.has_changed().unwrap());
        assert_eq!(*observer.borrow_and_update(), RequestState::Idle);
        assert!(controller.view().result.is_none());
    }

    proptest! {
        #[test]
        fn only_latest_result_applies_in_any_order(
            order in Just(vec![0usize, 1, 2]).prop_shuffle(),
            failures in any::<[bool; 3]>(),
        ) {
            let mut controller = ConversionController::new(TriggerPolicy::AutoTrigger);
            let commands: Vec<ConversionCommand> = (0..3u8)
                .map(|i| {
                    let lat = f64::from(i);
                    controller.select_input(coordinate(lat, lat)).unwrap().unwrap()
                })
                .collect();
            let latest = commands[2].request_id;

            for index in order {
                let id = commands[index].request_id;
                let outcome = if failures[index] {
                    Err(ConversionError::Network { detail: "offline".into() })
                } else {
                    remote(&url_for(id))
                };
                let disposition = controller.on_result(id, outcome);
                prop_assert_eq!(
                    disposition == ResultDisposition::Applied,
                    id == latest
                );
            }

            let state = controller.state();
            prop_assert_eq!(state.request_id(), Some(latest));
            if failures[2] {
                prop_assert!(
                    matches!(state, RequestState::Failed { kind: ErrorKind::Network, .. }),
                    "expected network failure, got {:?}",
                    state
                );
            } else {
                let expected = url_for(latest);
                prop_assert_eq!(
                    state.result().and_then(ResultImageRef::as_url),
                    Some(expected.as_str())
                );
            }
        }
    }
}
