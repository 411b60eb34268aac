use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Kind of security event. The serialized names are a storage and wire
/// contract shared with log consumers and must not change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventKind {
    TabSwitch,
    WindowBlur,
    FocusReturn,
    FullscreenExit,
    CopyAttempt,
    PasteAttempt,
    RightClickBlocked,
    DevToolsOpen,
    TimerStart,
    TimerTick,
    TimerEnd,
    ExamSubmit,
}

impl EventKind {
    pub const ALL: [Self; 12] = [
        Self::TabSwitch,
        Self::WindowBlur,
        Self::FocusReturn,
        Self::FullscreenExit,
        Self::CopyAttempt,
        Self::PasteAttempt,
        Self::RightClickBlocked,
        Self::DevToolsOpen,
        Self::TimerStart,
        Self::TimerTick,
        Self::TimerEnd,
        Self::ExamSubmit,
    ];

    /// Wire name of the kind
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::TabSwitch => "TAB_SWITCH",
            Self::WindowBlur => "WINDOW_BLUR",
            Self::FocusReturn => "FOCUS_RETURN",
            Self::FullscreenExit => "FULLSCREEN_EXIT",
            Self::CopyAttempt => "COPY_ATTEMPT",
            Self::PasteAttempt => "PASTE_ATTEMPT",
            Self::RightClickBlocked => "RIGHT_CLICK_BLOCKED",
            Self::DevToolsOpen => "DEV_TOOLS_OPEN",
            Self::TimerStart => "TIMER_START",
            Self::TimerTick => "TIMER_TICK",
            Self::TimerEnd => "TIMER_END",
            Self::ExamSubmit => "EXAM_SUBMIT",
        }
    }

    /// Kinds that may consume a strike when the session is active
    #[must_use]
    pub const fn is_violation_eligible(self) -> bool {
        matches!(
            self,
            Self::TabSwitch | Self::WindowBlur | Self::FullscreenExit
        )
    }

    /// Kinds emitted by the session lifecycle rather than by a detector
    #[must_use]
    pub const fn is_lifecycle(self) -> bool {
        matches!(
            self,
            Self::TimerStart | Self::TimerTick | Self::TimerEnd | Self::ExamSubmit
        )
    }
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for EventKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| format!("Unknown event kind: {s}"))
    }
}

/// Document visibility as reported by the host page
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Visibility {
    #[default]
    Visible,
    Hidden,
}

impl Visibility {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Visible => "visible",
            Self::Hidden => "hidden",
        }
    }
}

/// Screen size, serialized as `WIDTHxHEIGHT`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DisplayMetrics {
    pub width: u32,
    pub height: u32,
}

impl DisplayMetrics {
    #[must_use]
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }
}

impl std::fmt::Display for DisplayMetrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

impl std::str::FromStr for DisplayMetrics {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (w, h) = s
            .split_once('x')
            .ok_or_else(|| format!("Invalid display metrics: {s}"))?;
        let width = w.trim().parse().map_err(|_| format!("Invalid width: {w}"))?;
        let height = h.trim().parse().map_err(|_| format!("Invalid height: {h}"))?;
        Ok(Self { width, height })
    }
}

impl Serialize for DisplayMetrics {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for DisplayMetrics {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// Environment snapshot captured when an event is classified
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventContext {
    pub visibility: Visibility,
    pub has_focus: bool,
    pub online: bool,
    pub display: DisplayMetrics,
    pub user_agent: String,
    /// Violation count as observed at classification time, before this
    /// event's own strike is applied: the first strike is logged with 0
    pub violation_count: u32,
}

/// Immutable record of something that happened during an attempt
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecurityEvent {
    pub id: Uuid,
    pub kind: EventKind,
    pub timestamp: DateTime<Utc>,
    pub session_ref: String,
    pub context: EventContext,
}

impl SecurityEvent {
    #[must_use]
    pub fn new(kind: EventKind, session_ref: impl Into<String>, context: EventContext) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind,
            timestamp: Utc::now(),
            session_ref: session_ref.into(),
            context,
        }
    }
}

/// Lifecycle status of an assessment session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SessionStatus {
    #[default]
    NotStarted,
    Active,
    Locked,
    Submitted,
}

impl SessionStatus {
    /// `Locked` and `Submitted` freeze the counters
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Locked | Self::Submitted)
    }

    #[must_use]
    pub const fn description(self) -> &'static str {
        match self {
            Self::NotStarted => "Not started",
            Self::Active => "In progress",
            Self::Locked => "Locked",
            Self::Submitted => "Submitted",
        }
    }
}

/// Session counters, owned by the supervisor
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct SessionState {
    pub status: SessionStatus,
    pub violation_count: u32,
    pub remaining_seconds: u32,
    pub started_at: Option<DateTime<Utc>>,
}

impl SessionState {
    /// Strikes left before a session with this ceiling locks
    #[must_use]
    pub const fn violations_remaining(&self, max_violations: u32) -> u32 {
        max_violations.saturating_sub(self.violation_count)
    }

    /// Format the remaining time as `HH:MM:SS`
    #[must_use]
    pub fn remaining_hms(&self) -> String {
        let h = self.remaining_seconds / 3600;
        let m = (self.remaining_seconds % 3600) / 60;
        let s = self.remaining_seconds % 60;
        format!("{h:02}:{m:02}:{s:02}")
    }
}
