use proctor_storage::{EventContext, EventKind, SecurityEvent, SessionState, SessionStatus};

use crate::environment::EnvironmentSnapshot;
use crate::monitor::{InputAction, RawSignal};

/// Classification result with the strike decision
#[derive(Debug, Clone)]
pub struct Classification {
    pub event: SecurityEvent,
    /// Whether the supervisor should record a violation for this event
    pub counts_as_violation: bool,
}

/// Maps detector signals onto security events for one attempt
#[derive(Debug, Clone)]
pub struct Classifier {
    session_ref: String,
}

impl Classifier {
    #[must_use]
    pub fn new(session_ref: impl Into<String>) -> Self {
        Self {
            session_ref: session_ref.into(),
        }
    }

    #[must_use]
    pub fn session_ref(&self) -> &str {
        &self.session_ref
    }

    /// Event kind a detector signal is recorded as
    #[must_use]
    pub const fn kind_for(signal: RawSignal) -> EventKind {
        match signal {
            RawSignal::VisibilityHidden => EventKind::TabSwitch,
            RawSignal::WindowBlur => EventKind::WindowBlur,
            RawSignal::WindowFocus => EventKind::FocusReturn,
            RawSignal::FullscreenExit => EventKind::FullscreenExit,
            // Cut is treated the same as copy
            RawSignal::BlockedInput(InputAction::Copy | InputAction::Cut) => {
                EventKind::CopyAttempt
            }
            RawSignal::BlockedInput(InputAction::Paste) => EventKind::PasteAttempt,
            RawSignal::BlockedInput(InputAction::ContextMenu) => EventKind::RightClickBlocked,
            RawSignal::DevToolsOpened => EventKind::DevToolsOpen,
        }
    }

    /// Classify a detector signal against the current session state.
    ///
    /// Only tab switches, window blurs and fullscreen exits can count as
    /// violations, and only while the session is active. Everything else,
    /// including eligible signals outside `Active`, is advisory.
    #[must_use]
    pub fn classify(
        &self,
        signal: RawSignal,
        state: &SessionState,
        snapshot: &EnvironmentSnapshot,
    ) -> Classification {
        let kind = Self::kind_for(signal);
        let counts_as_violation =
            kind.is_violation_eligible() && state.status == SessionStatus::Active;

        if kind.is_violation_eligible() && !counts_as_violation {
            log::debug!("{kind} while {:?} recorded as advisory", state.status);
        }

        Classification {
            event: self.stamp(kind, state, snapshot),
            counts_as_violation,
        }
    }

    /// Build a lifecycle event (timer start/tick/end, submission)
    #[must_use]
    pub fn lifecycle(
        &self,
        kind: EventKind,
        state: &SessionState,
        snapshot: &EnvironmentSnapshot,
    ) -> SecurityEvent {
        debug_assert!(kind.is_lifecycle(), "{kind} is not a lifecycle event");
        self.stamp(kind, state, snapshot)
    }

    fn stamp(
        &self,
        kind: EventKind,
        state: &SessionState,
        snapshot: &EnvironmentSnapshot,
    ) -> SecurityEvent {
        SecurityEvent::new(
            kind,
            self.session_ref.clone(),
            EventContext {
                visibility: snapshot.visibility,
                has_focus: snapshot.has_focus,
                online: snapshot.online,
                display: snapshot.display,
                user_agent: snapshot.user_agent.clone(),
                violation_count: state.violation_count,
            },
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proctor_storage::{DisplayMetrics, Visibility};

    fn snapshot() -> EnvironmentSnapshot {
        EnvironmentSnapshot {
            visibility: Visibility::Hidden,
            has_focus: false,
            online: true,
            display: DisplayMetrics::new(1920, 1080),
            user_agent: String::from("Mozilla/5.0 (test)"),
        }
    }

    fn state(status: SessionStatus, violation_count: u32) -> SessionState {
        SessionState {
            status,
            violation_count,
            remaining_seconds: 100,
            started_at: None,
        }
    }

    #[test]
    fn test_eligible_signals_count_while_active() {
        let classifier = Classifier::new("attempt-1");
        let active = state(SessionStatus::Active, 2);

        for (signal, kind) in [
            (RawSignal::VisibilityHidden, EventKind::TabSwitch),
            (RawSignal::WindowBlur, EventKind::WindowBlur),
            (RawSignal::FullscreenExit, EventKind::FullscreenExit),
        ] {
            let result = classifier.classify(signal, &active, &snapshot());
            assert!(result.counts_as_violation, "{signal:?}");
            assert_eq!(result.event.kind, kind);
        }
    }

    #[test]
    fn test_advisory_signals_never_count() {
        let classifier = Classifier::new("attempt-1");
        let active = state(SessionStatus::Active, 0);

        for (signal, kind) in [
            (RawSignal::WindowFocus, EventKind::FocusReturn),
            (
                RawSignal::BlockedInput(InputAction::Copy),
                EventKind::CopyAttempt,
            ),
            (
                RawSignal::BlockedInput(InputAction::Cut),
                EventKind::CopyAttempt,
            ),
            (
                RawSignal::BlockedInput(InputAction::Paste),
                EventKind::PasteAttempt,
            ),
            (
                RawSignal::BlockedInput(InputAction::ContextMenu),
                EventKind::RightClickBlocked,
            ),
            (RawSignal::DevToolsOpened, EventKind::DevToolsOpen),
        ] {
            let result = classifier.classify(signal, &active, &snapshot());
            assert!(!result.counts_as_violation, "{signal:?}");
            assert_eq!(result.event.kind, kind);
        }
    }

    #[test]
    fn test_blur_before_start_is_advisory() {
        let classifier = Classifier::new("attempt-1");
        let result = classifier.classify(
            RawSignal::WindowBlur,
            &state(SessionStatus::NotStarted, 0),
            &snapshot(),
        );
        assert!(!result.counts_as_violation);
        assert_eq!(result.event.kind, EventKind::WindowBlur);
    }

    #[test]
    fn test_no_strikes_once_terminal() {
        let classifier = Classifier::new("attempt-1");
        for status in [SessionStatus::Locked, SessionStatus::Submitted] {
            let result =
                classifier.classify(RawSignal::VisibilityHidden, &state(status, 7), &snapshot());
            assert!(!result.counts_as_violation);
        }
    }

    #[test]
    fn test_context_captures_snapshot_and_observed_count() {
        let classifier = Classifier::new("attempt-42");
        let result = classifier.classify(
            RawSignal::VisibilityHidden,
            &state(SessionStatus::Active, 3),
            &snapshot(),
        );

        let event = result.event;
        assert_eq!(event.session_ref, "attempt-42");
        assert_eq!(event.context.violation_count, 3);
        assert_eq!(event.context.visibility, Visibility::Hidden);
        assert!(!event.context.has_focus);
        assert!(event.context.online);
        assert_eq!(event.context.display.to_string(), "1920x1080");
        assert_eq!(event.context.user_agent, "Mozilla/5.0 (test)");
    }

    #[test]
    fn test_events_get_unique_ids() {
        let classifier = Classifier::new("attempt-1");
        let active = state(SessionStatus::Active, 0);
        let a = classifier.classify(RawSignal::WindowBlur, &active, &snapshot());
        let b = classifier.classify(RawSignal::WindowBlur, &active, &snapshot());
        assert_ne!(a.event.id, b.event.id);
    }

    #[test]
    fn test_lifecycle_event() {
        let classifier = Classifier::new("attempt-1");
        let event = classifier.lifecycle(
            EventKind::TimerStart,
            &state(SessionStatus::Active, 0),
            &snapshot(),
        );
        assert_eq!(event.kind, EventKind::TimerStart);
        assert_eq!(event.session_ref, "attempt-1");
    }
}
