//! Signal detectors.
//!
//! Each detector watches one environment channel and turns raw change
//! notifications into at most one [`RawSignal`] per observed transition.
//! Detectors are registered on a [`SignalSource`] through a [`DetectorSet`]
//! and stop emitting as soon as their subscriptions are detached.

pub mod manual;

use proctor_storage::Visibility;
use tokio::sync::mpsc::UnboundedSender;

pub use manual::ManualSource;

/// Clipboard and pointer actions intercepted on the assessment surface
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputAction {
    ContextMenu,
    Copy,
    Paste,
    Cut,
}

/// Signal emitted by a detector
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RawSignal {
    VisibilityHidden,
    WindowBlur,
    WindowFocus,
    FullscreenExit,
    BlockedInput(InputAction),
    DevToolsOpened,
}

/// Raw notification delivered by the host page
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnvironmentChange {
    Visibility(Visibility),
    Focus(bool),
    Fullscreen(bool),
    Intercepted(InputAction),
    DevTools,
}

impl EnvironmentChange {
    #[must_use]
    pub const fn channel(&self) -> Channel {
        match self {
            Self::Visibility(_) => Channel::Visibility,
            Self::Focus(_) => Channel::Focus,
            Self::Fullscreen(_) => Channel::Fullscreen,
            Self::Intercepted(_) => Channel::Input,
            Self::DevTools => Channel::DevTools,
        }
    }
}

/// Environment channel a listener subscribes to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Channel {
    Visibility,
    Focus,
    Fullscreen,
    Input,
    DevTools,
}

/// What a listener asks the source to do with the host's default action
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Response {
    pub prevent_default: bool,
}

pub type Listener = Box<dyn FnMut(&EnvironmentChange) -> Response + Send>;

/// Handle returned by [`SignalSource::subscribe`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

impl SubscriptionId {
    #[must_use]
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }
}

/// Host-side event registry (visibility, focus, fullscreen, clipboard)
pub trait SignalSource {
    fn subscribe(&mut self, channel: Channel, listener: Listener) -> SubscriptionId;

    /// Returns `false` when `id` was not registered
    fn unsubscribe(&mut self, id: SubscriptionId) -> bool;
}

/// Observer for one environment channel
pub trait Detector: Send {
    fn name(&self) -> &'static str;

    fn channel(&self) -> Channel;

    fn observe(&mut self, change: &EnvironmentChange) -> Option<RawSignal>;

    /// Whether the host's default action should be suppressed
    fn prevents_default(&self) -> bool {
        false
    }
}

/// Emits `VisibilityHidden` when the document goes from visible to hidden
#[derive(Debug, Default)]
pub struct VisibilityDetector {
    hidden: bool,
}

impl Detector for VisibilityDetector {
    fn name(&self) -> &'static str {
        "visibility"
    }

    fn channel(&self) -> Channel {
        Channel::Visibility
    }

    fn observe(&mut self, change: &EnvironmentChange) -> Option<RawSignal> {
        let EnvironmentChange::Visibility(visibility) = *change else {
            return None;
        };
        let hidden = visibility == Visibility::Hidden;
        let became_hidden = hidden && !self.hidden;
        self.hidden = hidden;
        became_hidden.then_some(RawSignal::VisibilityHidden)
    }
}

/// Emits `WindowBlur` and `WindowFocus` on focus transitions
#[derive(Debug)]
pub struct FocusDetector {
    focused: bool,
}

impl Default for FocusDetector {
    fn default() -> Self {
        Self { focused: true }
    }
}

impl Detector for FocusDetector {
    fn name(&self) -> &'static str {
        "focus"
    }

    fn channel(&self) -> Channel {
        Channel::Focus
    }

    fn observe(&mut self, change: &EnvironmentChange) -> Option<RawSignal> {
        let EnvironmentChange::Focus(focused) = *change else {
            return None;
        };
        if focused == self.focused {
            return None;
        }
        self.focused = focused;
        Some(if focused {
            RawSignal::WindowFocus
        } else {
            RawSignal::WindowBlur
        })
    }
}

/// Emits `FullscreenExit` when the page leaves fullscreen
#[derive(Debug, Default)]
pub struct FullscreenDetector {
    fullscreen: bool,
}

impl Detector for FullscreenDetector {
    fn name(&self) -> &'static str {
        "fullscreen"
    }

    fn channel(&self) -> Channel {
        Channel::Fullscreen
    }

    fn observe(&mut self, change: &EnvironmentChange) -> Option<RawSignal> {
        let EnvironmentChange::Fullscreen(fullscreen) = *change else {
            return None;
        };
        let exited = self.fullscreen && !fullscreen;
        self.fullscreen = fullscreen;
        exited.then_some(RawSignal::FullscreenExit)
    }
}

/// Blocks clipboard and context-menu actions and reports each attempt
#[derive(Debug, Default)]
pub struct InputBlocker;

impl Detector for InputBlocker {
    fn name(&self) -> &'static str {
        "input"
    }

    fn channel(&self) -> Channel {
        Channel::Input
    }

    fn observe(&mut self, change: &EnvironmentChange) -> Option<RawSignal> {
        match *change {
            EnvironmentChange::Intercepted(action) => Some(RawSignal::BlockedInput(action)),
            _ => None,
        }
    }

    fn prevents_default(&self) -> bool {
        true
    }
}

/// Reports dev-tools notifications from the host as advisory signals
#[derive(Debug, Default)]
pub struct DevToolsDetector;

impl Detector for DevToolsDetector {
    fn name(&self) -> &'static str {
        "devtools"
    }

    fn channel(&self) -> Channel {
        Channel::DevTools
    }

    fn observe(&mut self, change: &EnvironmentChange) -> Option<RawSignal> {
        matches!(change, EnvironmentChange::DevTools).then_some(RawSignal::DevToolsOpened)
    }
}

/// Detectors waiting to be registered on a source
pub struct DetectorSet {
    detectors: Vec<Box<dyn Detector>>,
}

impl DetectorSet {
    /// One detector per channel
    #[must_use]
    pub fn standard() -> Self {
        Self {
            detectors: vec![
                Box::new(VisibilityDetector::default()),
                Box::new(FocusDetector::default()),
                Box::new(FullscreenDetector::default()),
                Box::new(InputBlocker),
                Box::new(DevToolsDetector),
            ],
        }
    }

    /// Register every detector on `source`, forwarding signals to `signals`.
    ///
    /// The channel item only has to be buildable from a [`RawSignal`], so
    /// detectors can share one ordered channel with other inputs.
    pub fn attach<S, T>(self, source: &mut S, signals: &UnboundedSender<T>) -> Subscriptions
    where
        S: SignalSource + ?Sized,
        T: From<RawSignal> + Send + 'static,
    {
        let ids = self
            .detectors
            .into_iter()
            .map(|mut detector| {
                let channel = detector.channel();
                let tx = signals.clone();
                let listener: Listener = Box::new(move |change: &EnvironmentChange| {
                    if let Some(signal) = detector.observe(change) {
                        log::debug!("{} detector emitted {signal:?}", detector.name());
                        if tx.send(T::from(signal)).is_err() {
                            log::debug!("Signal receiver closed, dropping {signal:?}");
                        }
                    }
                    Response {
                        prevent_default: detector.prevents_default(),
                    }
                });
                source.subscribe(channel, listener)
            })
            .collect::<Vec<_>>();

        log::info!("Attached {} detectors", ids.len());
        Subscriptions { ids }
    }
}

/// Registrations created by [`DetectorSet::attach`]
#[derive(Debug)]
#[must_use = "detectors keep emitting until detached"]
pub struct Subscriptions {
    ids: Vec<SubscriptionId>,
}

impl Subscriptions {
    #[must_use]
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Unregister every detector; returns how many were still registered
    pub fn detach<S>(self, source: &mut S) -> usize
    where
        S: SignalSource + ?Sized,
    {
        let removed = self
            .ids
            .into_iter()
            .filter(|id| source.unsubscribe(*id))
            .count();
        log::info!("Detached {removed} detectors");
        removed
    }
}
