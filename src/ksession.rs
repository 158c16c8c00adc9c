use log::{error, info, warn};
use openxr as xr;

use crate::kruntime::{SessionEvent, XrRuntime};

/// The runtime connection plus everything the state machine tracks about it.
///
/// Only `poll_events` changes `state`, `running` and `should_exit`.
pub struct SessionContext<R: XrRuntime> {
    runtime: R,
    view_type: xr::ViewConfigurationType,
    blend_mode: xr::EnvironmentBlendMode,
    state: xr::SessionState,
    running: bool,
    should_exit: bool,
}

impl<R: XrRuntime> SessionContext<R> {
    pub fn new(
        runtime: R,
        view_type: xr::ViewConfigurationType,
        blend_mode: xr::EnvironmentBlendMode,
    ) -> Self {
        Self {
            runtime,
            view_type,
            blend_mode,
            state: xr::SessionState::UNKNOWN,
            running: false,
            should_exit: false,
        }
    }

    pub fn runtime(&self) -> &R {
        &self.runtime
    }

    pub fn runtime_mut(&mut self) -> &mut R {
        &mut self.runtime
    }

    pub fn state(&self) -> xr::SessionState {
        self.state
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    /// Raised once the runtime reports `EXITING`, `LOSS_PENDING` or instance
    /// loss. Never cleared.
    pub fn should_exit(&self) -> bool {
        self.should_exit
    }

    pub fn blend_mode(&self) -> xr::EnvironmentBlendMode {
        self.blend_mode
    }

    pub fn view_type(&self) -> xr::ViewConfigurationType {
        self.view_type
    }

    /// Drains every pending runtime event without blocking.
    pub fn poll_events(&mut self) {
        loop {
            let event = match self.runtime.poll_event() {
                Ok(Some(event)) => event,
                Ok(None) => break,
                Err(e) => {
                    error!("{}", e);
                    break;
                }
            };

            match event {
                SessionEvent::StateChanged(state) => self.on_state_changed(state),
                SessionEvent::InstanceLossPending => {
                    warn!("instance loss pending");
                    self.should_exit = true;
                }
                SessionEvent::EventsLost(count) => warn!("lost {} events", count),
                SessionEvent::Other => {}
            }
        }
    }

    fn on_state_changed(&mut self, state: xr::SessionState) {
        info!("entered state {:?}", state);
        self.state = state;

        match state {
            xr::SessionState::READY => {
                if self.running {
                    return;
                }
                // `running` follows the intent even when the call fails.
                if let Err(e) = self.runtime.begin_session(self.view_type) {
                    error!("{}", e);
                }
                self.running = true;
            }
            xr::SessionState::STOPPING => {
                if !self.running {
                    return;
                }
                self.running = false;
                if let Err(e) = self.runtime.end_session() {
                    error!("{}", e);
                }
            }
            xr::SessionState::EXITING | xr::SessionState::LOSS_PENDING => {
                self.should_exit = true;
            }
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::knull::{NullCall, NullRuntime};

    fn session(events: &[SessionEvent]) -> SessionContext<NullRuntime> {
        let runtime = NullRuntime::new().with_events(events.iter().copied());
        SessionContext::new(
            runtime,
            xr::ViewConfigurationType::PRIMARY_STEREO,
            xr::EnvironmentBlendMode::OPAQUE,
        )
    }

    fn count(session: &SessionContext<NullRuntime>, call: NullCall) -> usize {
        session
            .runtime()
            .calls()
            .iter()
            .filter(|c| **c == call)
            .count()
    }

    #[test]
    fn starts_unknown_and_stopped() {
        let s = session(&[]);
        assert_eq!(s.state(), xr::SessionState::UNKNOWN);
        assert!(!s.is_running());
        assert!(!s.should_exit());
    }

    #[test]
    fn ready_begins_once_and_stopping_ends_once() {
        let mut s = session(&[SessionEvent::StateChanged(xr::SessionState::READY)]);
        s.poll_events();
        assert!(s.is_running());
        assert_eq!(count(&s, NullCall::BeginSession), 1);

        s.runtime_mut()
            .push_event(SessionEvent::StateChanged(xr::SessionState::STOPPING));
        s.poll_events();
        assert!(!s.is_running());
        assert_eq!(count(&s, NullCall::EndSession), 1);

        s.runtime_mut()
            .push_event(SessionEvent::StateChanged(xr::SessionState::STOPPING));
        s.poll_events();
        assert!(!s.is_running());
        assert_eq!(count(&s, NullCall::EndSession), 1);
        assert_eq!(s.state(), xr::SessionState::STOPPING);
    }

    #[test]
    fn repeated_ready_while_running_is_a_no_op() {
        let ready = SessionEvent::StateChanged(xr::SessionState::READY);
        let mut s = session(&[ready, ready]);
        s.poll_events();
        assert!(s.is_running());
        assert_eq!(count(&s, NullCall::BeginSession), 1);
    }

    #[test]
    fn begin_passes_the_negotiated_view_type() {
        let mut s = session(&[SessionEvent::StateChanged(xr::SessionState::READY)]);
        s.poll_events();
        assert_eq!(s.view_type(), xr::ViewConfigurationType::PRIMARY_STEREO);
        assert_eq!(s.runtime().begun_with(), Some(s.view_type()));
    }

    #[test]
    fn drains_every_pending_event_in_one_poll() {
        let mut s = session(&[
            SessionEvent::StateChanged(xr::SessionState::IDLE),
            SessionEvent::StateChanged(xr::SessionState::READY),
            SessionEvent::StateChanged(xr::SessionState::SYNCHRONIZED),
            SessionEvent::StateChanged(xr::SessionState::VISIBLE),
            SessionEvent::StateChanged(xr::SessionState::FOCUSED),
        ]);
        s.poll_events();
        assert_eq!(s.state(), xr::SessionState::FOCUSED);
        assert!(s.is_running());
        assert_eq!(s.runtime().pending_events(), 0);
    }

    #[test]
    fn failed_begin_still_marks_running() {
        let runtime = NullRuntime::new()
            .with_events([SessionEvent::StateChanged(xr::SessionState::READY)])
            .failing(NullCall::BeginSession);
        let mut s = SessionContext::new(
            runtime,
            xr::ViewConfigurationType::PRIMARY_STEREO,
            xr::EnvironmentBlendMode::OPAQUE,
        );
        s.poll_events();
        assert!(s.is_running());
    }

    #[test]
    fn failed_end_still_marks_stopped() {
        let runtime = NullRuntime::new()
            .with_events([
                SessionEvent::StateChanged(xr::SessionState::READY),
                SessionEvent::StateChanged(xr::SessionState::STOPPING),
            ])
            .failing(NullCall::EndSession);
        let mut s = SessionContext::new(
            runtime,
            xr::ViewConfigurationType::PRIMARY_STEREO,
            xr::EnvironmentBlendMode::OPAQUE,
        );
        s.poll_events();
        assert!(!s.is_running());
    }

    #[test]
    fn exiting_and_loss_pending_raise_should_exit() {
        for state in [xr::SessionState::EXITING, xr::SessionState::LOSS_PENDING] {
            let mut s = session(&[SessionEvent::StateChanged(state)]);
            s.poll_events();
            assert!(s.should_exit(), "{state:?}");
            assert_eq!(count(&s, NullCall::BeginSession), 0);
            assert_eq!(count(&s, NullCall::EndSession), 0);
        }

        let mut s = session(&[SessionEvent::InstanceLossPending]);
        s.poll_events();
        assert!(s.should_exit());
    }

    #[test]
    fn lost_and_unrelated_events_change_nothing() {
        let mut s = session(&[SessionEvent::EventsLost(3), SessionEvent::Other]);
        s.poll_events();
        assert_eq!(s.state(), xr::SessionState::UNKNOWN);
        assert!(!s.is_running());
        assert!(!s.should_exit());
    }
}
