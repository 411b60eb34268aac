use proctor_storage::Visibility;
use std::sync::Arc;

use super::{Channel, EnvironmentChange, Listener, Response, SignalSource, SubscriptionId};
use crate::environment::SharedEnvironment;

/// In-process signal source driven by explicit [`ManualSource::emit`] calls.
///
/// When an environment is attached, visibility and focus changes are
/// mirrored into it before listeners run, the same order a browser updates
/// `document.visibilityState` before dispatching `visibilitychange`.
#[derive(Default)]
pub struct ManualSource {
    next_id: u64,
    listeners: Vec<(SubscriptionId, Channel, Listener)>,
    environment: Option<Arc<SharedEnvironment>>,
}

impl ManualSource {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_environment(environment: Arc<SharedEnvironment>) -> Self {
        Self {
            environment: Some(environment),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn listener_count(&self) -> usize {
        self.listeners.len()
    }

    /// Dispatch `change` to every listener on its channel
    pub fn emit(&mut self, change: EnvironmentChange) -> Response {
        if let Some(env) = &self.environment {
            match change {
                EnvironmentChange::Visibility(visibility) => env.set_visibility(visibility),
                EnvironmentChange::Focus(focused) => env.set_focus(focused),
                _ => {}
            }
        }

        let channel = change.channel();
        let mut response = Response::default();
        for (_, _, listener) in self
            .listeners
            .iter_mut()
            .filter(|(_, listening, _)| *listening == channel)
        {
            response.prevent_default |= listener(&change).prevent_default;
        }
        response
    }

    /// Convenience for hiding or showing the document
    pub fn set_visibility(&mut self, visibility: Visibility) -> Response {
        self.emit(EnvironmentChange::Visibility(visibility))
    }
}

impl SignalSource for ManualSource {
    fn subscribe(&mut self, channel: Channel, listener: Listener) -> SubscriptionId {
        self.next_id += 1;
        let id = SubscriptionId::new(self.next_id);
        self.listeners.push((id, channel, listener));
        id
    }

    fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        let before = self.listeners.len();
        self.listeners.retain(|(registered, _, _)| *registered != id);
        self.listeners.len() != before
    }
}
