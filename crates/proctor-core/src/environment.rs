//! Read-only views of the host environment.

use proctor_storage::{DisplayMetrics, Visibility};
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};

/// Point-in-time view of the page environment
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnvironmentSnapshot {
    pub visibility: Visibility,
    pub has_focus: bool,
    pub online: bool,
    pub display: DisplayMetrics,
    pub user_agent: String,
}

/// Source of environment snapshots, queried at classification time
pub trait EnvironmentProbe: Send + Sync {
    fn snapshot(&self) -> EnvironmentSnapshot;
}

/// Connectivity oracle consulted before each scheduled flush
pub trait Connectivity: Send + Sync {
    fn is_online(&self) -> bool;
}

/// Environment state kept in sync by whoever owns the signal source.
///
/// The interactive CLI and the tests update it as they feed changes in;
/// the orchestrator only reads it.
#[derive(Debug)]
pub struct SharedEnvironment {
    visibility: AtomicU8,
    has_focus: AtomicBool,
    online: AtomicBool,
    display: DisplayMetrics,
    user_agent: String,
}

const VISIBLE: u8 = 0;
const HIDDEN: u8 = 1;

impl SharedEnvironment {
    #[must_use]
    pub fn new(display: DisplayMetrics, user_agent: impl Into<String>) -> Self {
        Self {
            visibility: AtomicU8::new(VISIBLE),
            has_focus: AtomicBool::new(true),
            online: AtomicBool::new(true),
            display,
            user_agent: user_agent.into(),
        }
    }

    pub fn set_visibility(&self, visibility: Visibility) {
        let raw = match visibility {
            Visibility::Visible => VISIBLE,
            Visibility::Hidden => HIDDEN,
        };
        self.visibility.store(raw, Ordering::SeqCst);
    }

    pub fn set_focus(&self, has_focus: bool) {
        self.has_focus.store(has_focus, Ordering::SeqCst);
    }

    pub fn set_online(&self, online: bool) {
        self.online.store(online, Ordering::SeqCst);
    }
}

impl EnvironmentProbe for SharedEnvironment {
    fn snapshot(&self) -> EnvironmentSnapshot {
        let visibility = if self.visibility.load(Ordering::SeqCst) == HIDDEN {
            Visibility::Hidden
        } else {
            Visibility::Visible
        };
        EnvironmentSnapshot {
            visibility,
            has_focus: self.has_focus.load(Ordering::SeqCst),
            online: self.online.load(Ordering::SeqCst),
            display: self.display,
            user_agent: self.user_agent.clone(),
        }
    }
}

impl Connectivity for SharedEnvironment {
    fn is_online(&self) -> bool {
        self.online.load(Ordering::SeqCst)
    }
}
