use chrono::{DateTime, Utc};
use proctor_storage::{SessionState, SessionStatus};

/// Default violation ceiling before a session locks
pub const MAX_VIOLATIONS: u32 = 7;

/// Remaining strikes at or below which warnings become critical
pub const WARNING_THRESHOLD: u32 = 2;

/// Requests accepted by the supervisor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionAction {
    Start { duration_secs: u32 },
    RecordViolation,
    Tick,
    Submit,
    /// Administrative unlock, never exposed to the examinee
    AdminResume,
}

/// Effect of applying a [`SessionAction`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// Action does not apply in the current status
    Ignored,
    Started,
    ViolationRecorded { count: u32 },
    Locked { count: u32 },
    Ticked { remaining: u32 },
    /// Time ran out and the session was submitted
    Expired,
    Submitted,
    Resumed,
}

impl Transition {
    #[must_use]
    pub const fn is_applied(&self) -> bool {
        !matches!(self, Self::Ignored)
    }

    /// Whether this transition moved the session into `Submitted`
    #[must_use]
    pub const fn submits(&self) -> bool {
        matches!(self, Self::Expired | Self::Submitted)
    }
}

/// Session lifecycle state machine.
///
/// Every path to a terminal state goes through [`Supervisor::apply`],
/// which checks the current status before touching any counter, so a
/// session expires or locks exactly once.
#[derive(Debug, Clone)]
pub struct Supervisor {
    state: SessionState,
    max_violations: u32,
}

impl Default for Supervisor {
    fn default() -> Self {
        Self::new()
    }
}

impl Supervisor {
    #[must_use]
    pub fn new() -> Self {
        Self::with_max_violations(MAX_VIOLATIONS)
    }

    /// Create a supervisor with a custom violation ceiling (minimum 1)
    #[must_use]
    pub fn with_max_violations(max_violations: u32) -> Self {
        Self {
            state: SessionState::default(),
            max_violations: max_violations.max(1),
        }
    }

    #[must_use]
    pub const fn state(&self) -> &SessionState {
        &self.state
    }

    #[must_use]
    pub const fn status(&self) -> SessionStatus {
        self.state.status
    }

    #[must_use]
    pub const fn max_violations(&self) -> u32 {
        self.max_violations
    }

    /// Strikes left before the session locks
    #[must_use]
    pub const fn violations_remaining(&self) -> u32 {
        self.state.violations_remaining(self.max_violations)
    }

    /// Active with at most [`WARNING_THRESHOLD`] strikes left
    #[must_use]
    pub const fn is_critical(&self) -> bool {
        matches!(self.state.status, SessionStatus::Active)
            && self.violations_remaining() <= WARNING_THRESHOLD
    }

    /// Apply `action` at the current wall-clock time
    pub fn apply(&mut self, action: SessionAction) -> Transition {
        self.apply_at(action, Utc::now())
    }

    /// Apply `action`, using `now` as the start time if it starts the session
    pub fn apply_at(&mut self, action: SessionAction, now: DateTime<Utc>) -> Transition {
        let status = self.state.status;
        let transition = match (status, action) {
            (SessionStatus::NotStarted, SessionAction::Start { duration_secs }) => {
                self.state.status = SessionStatus::Active;
                self.state.started_at = Some(now);
                self.state.remaining_seconds = duration_secs;
                if duration_secs == 0 {
                    self.state.status = SessionStatus::Submitted;
                    Transition::Expired
                } else {
                    Transition::Started
                }
            }
            (SessionStatus::Active, SessionAction::RecordViolation) => {
                let count = self.state.violation_count.saturating_add(1);
                self.state.violation_count = count;
                if count >= self.max_violations {
                    self.state.status = SessionStatus::Locked;
                    Transition::Locked { count }
                } else {
                    Transition::ViolationRecorded { count }
                }
            }
            (SessionStatus::Active, SessionAction::Tick) => {
                let remaining = self.state.remaining_seconds.saturating_sub(1);
                self.state.remaining_seconds = remaining;
                if remaining == 0 {
                    self.state.status = SessionStatus::Submitted;
                    Transition::Expired
                } else {
                    Transition::Ticked { remaining }
                }
            }
            (SessionStatus::Active, SessionAction::Submit) => {
                self.state.status = SessionStatus::Submitted;
                Transition::Submitted
            }
            (SessionStatus::Locked, SessionAction::AdminResume) => {
                self.state.status = SessionStatus::Active;
                Transition::Resumed
            }
            _ => Transition::Ignored,
        };

        match transition {
            Transition::Ignored => {
                log::debug!("Ignored {action:?} while {status:?}");
            }
            Transition::Ticked { .. } => {}
            Transition::Locked { count } => {
                log::warn!("Session locked after {count} violations");
            }
            other => {
                log::info!("Session transition {status:?} -> {:?}: {other:?}", self.state.status);
            }
        }

        transition
    }

    pub fn start(&mut self, duration_secs: u32) -> Transition {
        self.apply(SessionAction::Start { duration_secs })
    }

    pub fn record_violation(&mut self) -> Transition {
        self.apply(SessionAction::RecordViolation)
    }

    pub fn tick(&mut self) -> Transition {
        self.apply(SessionAction::Tick)
    }

    pub fn submit(&mut self) -> Transition {
        self.apply(SessionAction::Submit)
    }

    pub fn admin_resume(&mut self) -> Transition {
        self.apply(SessionAction::AdminResume)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn active(duration: u32) -> Supervisor {
        let mut supervisor = Supervisor::new();
        assert_eq!(supervisor.start(duration), Transition::Started);
        supervisor
    }

    #[test]
    fn test_start_sets_timer_and_start_time() {
        let mut supervisor = Supervisor::new();
        let now = Utc.with_ymd_and_hms(2024, 1, 1, 9, 0, 0).unwrap();

        let transition = supervisor.apply_at(SessionAction::Start { duration_secs: 3600 }, now);

        assert_eq!(transition, Transition::Started);
        assert_eq!(supervisor.status(), SessionStatus::Active);
        assert_eq!(supervisor.state().remaining_seconds, 3600);
        assert_eq!(supervisor.state().started_at, Some(now));
    }

    #[test]
    fn test_start_only_from_not_started() {
        let mut supervisor = active(60);
        let started_at = supervisor.state().started_at;

        assert_eq!(supervisor.start(10), Transition::Ignored);
        assert_eq!(supervisor.state().remaining_seconds, 60);
        assert_eq!(supervisor.state().started_at, started_at);
    }

    #[test]
    fn test_violations_lock_exactly_at_ceiling() {
        for n in 1..=10 {
            let mut supervisor = active(600);
            for _ in 0..n {
                supervisor.record_violation();
            }
            let expected_count = n.min(MAX_VIOLATIONS);
            assert_eq!(supervisor.state().violation_count, expected_count);
            assert_eq!(
                supervisor.status() == SessionStatus::Locked,
                n >= MAX_VIOLATIONS,
                "after {n} violations"
            );
        }
    }

    #[test]
    fn test_seven_violations_lock() {
        let mut supervisor = active(600);
        for i in 1..MAX_VIOLATIONS {
            assert_eq!(
                supervisor.record_violation(),
                Transition::ViolationRecorded { count: i }
            );
        }
        assert_eq!(
            supervisor.record_violation(),
            Transition::Locked { count: 7 }
        );
        assert_eq!(supervisor.status(), SessionStatus::Locked);
        assert_eq!(supervisor.state().violation_count, 7);
        assert_eq!(supervisor.violations_remaining(), 0);
    }

    #[test]
    fn test_ticks_expire_session() {
        let mut supervisor = active(5);
        for remaining in (1..5).rev() {
            assert_eq!(supervisor.tick(), Transition::Ticked { remaining });
        }
        assert_eq!(supervisor.tick(), Transition::Expired);
        assert_eq!(supervisor.status(), SessionStatus::Submitted);
        assert_eq!(supervisor.state().remaining_seconds, 0);

        assert_eq!(supervisor.tick(), Transition::Ignored);
        assert_eq!(supervisor.state().remaining_seconds, 0);
    }

    #[test]
    fn test_terminal_states_freeze_counters() {
        let mut locked = active(100);
        for _ in 0..MAX_VIOLATIONS {
            locked.record_violation();
        }
        let mut submitted = active(100);
        submitted.record_violation();
        assert_eq!(submitted.submit(), Transition::Submitted);

        for supervisor in [&mut locked, &mut submitted] {
            let before = supervisor.state().clone();
            assert_eq!(supervisor.record_violation(), Transition::Ignored);
            assert_eq!(supervisor.tick(), Transition::Ignored);
            assert_eq!(supervisor.submit(), Transition::Ignored);
            assert_eq!(supervisor.start(10), Transition::Ignored);
            assert_eq!(supervisor.state(), &before);
        }
    }

    #[test]
    fn test_actions_before_start_are_ignored() {
        let mut supervisor = Supervisor::new();
        assert_eq!(supervisor.record_violation(), Transition::Ignored);
        assert_eq!(supervisor.tick(), Transition::Ignored);
        assert_eq!(supervisor.submit(), Transition::Ignored);
        assert_eq!(supervisor.admin_resume(), Transition::Ignored);
        assert_eq!(supervisor.state(), &SessionState::default());
    }

    #[test]
    fn test_admin_resume_preserves_counters() {
        let mut supervisor = active(300);
        supervisor.tick();
        for _ in 0..MAX_VIOLATIONS {
            supervisor.record_violation();
        }
        assert_eq!(supervisor.status(), SessionStatus::Locked);

        assert_eq!(supervisor.admin_resume(), Transition::Resumed);
        assert_eq!(supervisor.status(), SessionStatus::Active);
        assert_eq!(supervisor.state().violation_count, MAX_VIOLATIONS);
        assert_eq!(supervisor.state().remaining_seconds, 299);

        // Still at the ceiling, so the next strike re-locks
        assert_eq!(
            supervisor.record_violation(),
            Transition::Locked { count: 8 }
        );
    }

    #[test]
    fn test_admin_resume_does_not_reopen_submitted() {
        let mut supervisor = active(10);
        supervisor.submit();
        assert_eq!(supervisor.admin_resume(), Transition::Ignored);
        assert_eq!(supervisor.status(), SessionStatus::Submitted);
    }

    #[test]
    fn test_zero_duration_expires_immediately() {
        let mut supervisor = Supervisor::new();
        assert_eq!(supervisor.start(0), Transition::Expired);
        assert_eq!(supervisor.status(), SessionStatus::Submitted);
        assert!(supervisor.state().started_at.is_some());
    }

    #[test]
    fn test_custom_ceiling() {
        let mut supervisor = Supervisor::with_max_violations(2);
        supervisor.start(100);
        supervisor.record_violation();
        assert_eq!(supervisor.violations_remaining(), 1);
        assert_eq!(
            supervisor.record_violation(),
            Transition::Locked { count: 2 }
        );

        assert_eq!(Supervisor::with_max_violations(0).max_violations(), 1);
    }

    #[test]
    fn test_warning_turns_critical_near_ceiling() {
        let mut supervisor = active(600);
        for _ in 0..4 {
            supervisor.record_violation();
        }
        assert_eq!(supervisor.violations_remaining(), 3);
        assert!(!supervisor.is_critical());

        supervisor.record_violation();
        assert_eq!(supervisor.violations_remaining(), WARNING_THRESHOLD);
        assert!(supervisor.is_critical());

        supervisor.record_violation();
        supervisor.record_violation();
        assert_eq!(supervisor.status(), SessionStatus::Locked);
        assert!(!supervisor.is_critical());
    }
}
