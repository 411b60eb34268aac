//! Buffered, durable security-event log.
//!
//! Events move from `pending` to `in_flight` when a flush starts and are
//! discarded once the sink confirms the batch. A failed batch goes back to
//! the front of `pending` in its original order. The durable snapshot always
//! holds in-flight events followed by pending ones, so a crash mid-flush
//! loses nothing.

use proctor_storage::{DurableStore, SecurityEvent, StorageKey};
use std::collections::VecDeque;
use std::sync::Arc;

use crate::error::{SinkError, SnapshotError};
use crate::sink::LogSink;

/// Pending and in-flight partitions of the log
#[derive(Debug, Default)]
pub struct LogQueue {
    pending: VecDeque<SecurityEvent>,
    in_flight: Vec<SecurityEvent>,
}

impl LogQueue {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, event: SecurityEvent) {
        self.pending.push_back(event);
    }

    /// Put recovered events ahead of everything already pending
    pub fn restore(&mut self, recovered: Vec<SecurityEvent>) {
        for event in recovered.into_iter().rev() {
            self.pending.push_front(event);
        }
    }

    #[must_use]
    pub fn is_flushing(&self) -> bool {
        !self.in_flight.is_empty()
    }

    /// Move every pending event into flight and return a copy of the batch.
    ///
    /// Returns `None` when nothing is pending or a batch is already in flight.
    pub fn take_batch(&mut self) -> Option<Vec<SecurityEvent>> {
        if self.is_flushing() || self.pending.is_empty() {
            return None;
        }
        self.in_flight = self.pending.drain(..).collect();
        Some(self.in_flight.clone())
    }

    /// Drop the confirmed batch; returns its size
    pub fn acknowledge(&mut self) -> usize {
        let delivered = self.in_flight.len();
        self.in_flight.clear();
        delivered
    }

    /// Return the in-flight batch to the front of pending; returns its size
    pub fn requeue(&mut self) -> usize {
        let returned = std::mem::take(&mut self.in_flight);
        let count = returned.len();
        self.restore(returned);
        count
    }

    pub fn pending(&self) -> impl Iterator<Item = &SecurityEvent> + '_ {
        self.pending.iter()
    }

    #[must_use]
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    #[must_use]
    pub fn in_flight_len(&self) -> usize {
        self.in_flight.len()
    }

    /// Everything not yet confirmed, oldest first
    #[must_use]
    pub fn unconfirmed(&self) -> Vec<&SecurityEvent> {
        self.in_flight.iter().chain(self.pending.iter()).collect()
    }
}

/// Result of a flush attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushOutcome {
    /// Nothing was pending
    Idle,
    /// A previous batch is still in flight
    Skipped,
    Delivered(usize),
    Requeued(usize),
}

/// Event log with durable pending queue and append-only history
pub struct LogPipeline {
    queue: LogQueue,
    history: Vec<SecurityEvent>,
    store: Arc<dyn DurableStore>,
}

impl LogPipeline {
    /// Open the pipeline, recovering any pending events and history left
    /// by a previous run
    #[must_use]
    pub fn open(store: Arc<dyn DurableStore>) -> Self {
        let recovered = load_events(store.as_ref(), StorageKey::PendingQueue);
        let history = load_events(store.as_ref(), StorageKey::SessionHistory);

        if !recovered.is_empty() {
            log::info!(
                "Recovered {} unsent events from a previous run",
                recovered.len()
            );
        }

        let mut queue = LogQueue::new();
        queue.restore(recovered);

        Self {
            queue,
            history,
            store,
        }
    }

    /// Append an event. Persistence failures are logged and the in-memory
    /// queue stays authoritative.
    pub fn record(&mut self, event: SecurityEvent) {
        log::debug!("Recording {} ({})", event.kind, event.id);
        self.queue.push(event.clone());
        self.persist_queue();
        self.history.push(event);
        self.persist_history();
    }

    /// Start a flush, returning the batch to hand to the sink
    pub fn begin_flush(&mut self) -> Option<Vec<SecurityEvent>> {
        if self.queue.is_flushing() {
            log::debug!(
                "Flush skipped, {} events still in flight",
                self.queue.in_flight_len()
            );
            return None;
        }
        let batch = self.queue.take_batch()?;
        log::debug!("Flushing {} events", batch.len());
        Some(batch)
    }

    /// Resolve the in-flight batch with the sink's answer
    pub fn complete_flush(&mut self, result: Result<(), SinkError>) -> FlushOutcome {
        let outcome = match result {
            Ok(()) => {
                let delivered = self.queue.acknowledge();
                log::info!("Delivered {delivered} security events");
                FlushOutcome::Delivered(delivered)
            }
            Err(e) => {
                let returned = self.queue.requeue();
                log::warn!("Log delivery failed, requeued {returned} events: {e}");
                FlushOutcome::Requeued(returned)
            }
        };
        self.persist_queue();
        outcome
    }

    /// Deliver everything pending to `sink` and wait for the answer
    pub async fn flush(&mut self, sink: &dyn LogSink) -> FlushOutcome {
        if self.queue.is_flushing() {
            return FlushOutcome::Skipped;
        }
        let Some(batch) = self.begin_flush() else {
            return FlushOutcome::Idle;
        };
        let result = sink.deliver(&batch).await;
        self.complete_flush(result)
    }

    #[must_use]
    pub fn is_flushing(&self) -> bool {
        self.queue.is_flushing()
    }

    /// Every event recorded so far, oldest first
    #[must_use]
    pub fn history(&self) -> &[SecurityEvent] {
        &self.history
    }

    pub fn pending(&self) -> impl Iterator<Item = &SecurityEvent> + '_ {
        self.queue.pending()
    }

    #[must_use]
    pub fn pending_len(&self) -> usize {
        self.queue.pending_len()
    }

    #[must_use]
    pub fn in_flight_len(&self) -> usize {
        self.queue.in_flight_len()
    }

    fn persist_queue(&self) {
        self.persist(StorageKey::PendingQueue, &self.queue.unconfirmed());
    }

    fn persist_history(&self) {
        self.persist(StorageKey::SessionHistory, &self.history);
    }

    fn persist<T: serde::Serialize + ?Sized>(&self, key: StorageKey, value: &T) {
        let encoded = match serde_json::to_string(value) {
            Ok(encoded) => encoded,
            Err(e) => {
                log::warn!("Failed to encode {key}: {e}");
                return;
            }
        };
        if let Err(e) = self.store.save(key, &encoded) {
            log::warn!("Failed to persist {key}, keeping it in memory: {e:#}");
        }
    }
}

/// Read an event list from the store; unreadable or corrupt data is
/// logged and treated as empty
fn load_events(store: &dyn DurableStore, key: StorageKey) -> Vec<SecurityEvent> {
    let raw = match store.load(key) {
        Ok(Some(raw)) => raw,
        Ok(None) => return Vec::new(),
        Err(e) => {
            log::warn!("Failed to read {key}: {e:#}");
            return Vec::new();
        }
    };

    match decode_events(key, &raw) {
        Ok(events) => events,
        Err(e) => {
            log::warn!("{e}; starting with an empty {key}");
            Vec::new()
        }
    }
}

fn decode_events(key: StorageKey, raw: &str) -> Result<Vec<SecurityEvent>, SnapshotError> {
    serde_json::from_str(raw).map_err(|source| SnapshotError::Corrupt { key, source })
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use proctor_storage::{DisplayMetrics, EventContext, EventKind, MemoryStore, Visibility};
    use std::sync::Mutex;
    use uuid::Uuid;

    fn event(kind: EventKind) -> SecurityEvent {
        SecurityEvent::new(
            kind,
            "attempt-1",
            EventContext {
                visibility: Visibility::Visible,
                has_focus: true,
                online: true,
                display: DisplayMetrics::new(1920, 1080),
                user_agent: String::from("agent"),
                violation_count: 0,
            },
        )
    }

    fn ids<'a>(events: impl IntoIterator<Item = &'a SecurityEvent>) -> Vec<Uuid> {
        events.into_iter().map(|e| e.id).collect()
    }

    /// Sink that fails the first `failures` deliveries
    struct FlakySink {
        failures: Mutex<u32>,
        received: Mutex<Vec<Uuid>>,
    }

    impl FlakySink {
        fn failing(failures: u32) -> Self {
            Self {
                failures: Mutex::new(failures),
                received: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl LogSink for FlakySink {
        async fn deliver(&self, batch: &[SecurityEvent]) -> Result<(), SinkError> {
            let mut failures = self.failures.lock().unwrap();
            if *failures > 0 {
                *failures -= 1;
                return Err(SinkError::Unreachable(String::from("offline")));
            }
            self.received.lock().unwrap().extend(ids(batch));
            Ok(())
        }

        fn name(&self) -> &'static str {
            "flaky"
        }
    }

    /// Store whose writes always fail
    struct BrokenStore;

    impl DurableStore for BrokenStore {
        fn load(&self, _key: StorageKey) -> anyhow::Result<Option<String>> {
            anyhow::bail!("storage unavailable")
        }

        fn save(&self, _key: StorageKey, _value: &str) -> anyhow::Result<()> {
            anyhow::bail!("quota exceeded")
        }
    }

    fn stored(store: &MemoryStore, key: StorageKey) -> Vec<SecurityEvent> {
        serde_json::from_str(&store.load(key).unwrap().unwrap()).unwrap()
    }

    #[test]
    fn test_record_persists_queue_and_history() {
        let store = Arc::new(MemoryStore::new());
        let mut pipeline = LogPipeline::open(store.clone());
        let e = event(EventKind::TabSwitch);

        pipeline.record(e.clone());

        assert_eq!(stored(&store, StorageKey::PendingQueue), vec![e.clone()]);
        assert_eq!(stored(&store, StorageKey::SessionHistory), vec![e]);
        assert_eq!(pipeline.pending_len(), 1);
    }

    #[test]
    fn test_restart_recovers_pending_exactly_once() {
        let store = Arc::new(MemoryStore::new());
        let e = event(EventKind::WindowBlur);
        {
            let mut pipeline = LogPipeline::open(store.clone());
            pipeline.record(e.clone());
        }

        let reopened = LogPipeline::open(store);
        assert_eq!(ids(reopened.pending()), vec![e.id]);
        assert_eq!(ids(reopened.history()), vec![e.id]);
    }

    #[tokio::test]
    async fn test_failed_flush_leaves_pending_unchanged() {
        let mut pipeline = LogPipeline::open(Arc::new(MemoryStore::new()));
        for kind in [
            EventKind::TabSwitch,
            EventKind::CopyAttempt,
            EventKind::FocusReturn,
        ] {
            pipeline.record(event(kind));
        }
        let before = ids(pipeline.pending());

        let sink = FlakySink::failing(1);
        assert_eq!(pipeline.flush(&sink).await, FlushOutcome::Requeued(3));

        assert_eq!(ids(pipeline.pending()), before);
        assert_eq!(pipeline.in_flight_len(), 0);
    }

    #[tokio::test]
    async fn test_retry_after_single_failure_drains_queue() {
        let store = Arc::new(MemoryStore::new());
        let mut pipeline = LogPipeline::open(store.clone());
        let events: Vec<_> = [
            EventKind::TimerStart,
            EventKind::TabSwitch,
            EventKind::PasteAttempt,
        ]
        .into_iter()
        .map(event)
        .collect();
        for e in &events {
            pipeline.record(e.clone());
        }

        let sink = FlakySink::failing(1);
        assert_eq!(pipeline.flush(&sink).await, FlushOutcome::Requeued(3));
        assert_eq!(pipeline.flush(&sink).await, FlushOutcome::Delivered(3));

        assert_eq!(pipeline.pending_len(), 0);
        assert_eq!(ids(pipeline.history()), ids(&events));
        assert_eq!(*sink.received.lock().unwrap(), ids(&events));
        assert!(stored(&store, StorageKey::PendingQueue).is_empty());
        assert_eq!(stored(&store, StorageKey::SessionHistory).len(), 3);
    }

    #[tokio::test]
    async fn test_empty_flush_is_idle() {
        let mut pipeline = LogPipeline::open(Arc::new(MemoryStore::new()));
        let sink = FlakySink::failing(0);
        assert_eq!(pipeline.flush(&sink).await, FlushOutcome::Idle);
        assert!(sink.received.lock().unwrap().is_empty());
    }

    #[test]
    fn test_only_one_batch_in_flight() {
        let mut pipeline = LogPipeline::open(Arc::new(MemoryStore::new()));
        pipeline.record(event(EventKind::TabSwitch));

        let batch = pipeline.begin_flush().unwrap();
        assert_eq!(batch.len(), 1);
        assert!(pipeline.is_flushing());

        pipeline.record(event(EventKind::WindowBlur));
        assert!(pipeline.begin_flush().is_none());
        assert_eq!(pipeline.pending_len(), 1);
        assert_eq!(pipeline.in_flight_len(), 1);
    }

    #[tokio::test]
    async fn test_flush_while_in_flight_is_skipped() {
        let mut pipeline = LogPipeline::open(Arc::new(MemoryStore::new()));
        pipeline.record(event(EventKind::TabSwitch));
        let _batch = pipeline.begin_flush().unwrap();

        let sink = FlakySink::failing(0);
        assert_eq!(pipeline.flush(&sink).await, FlushOutcome::Skipped);
        assert!(sink.received.lock().unwrap().is_empty());
    }

    #[test]
    fn test_events_recorded_mid_flush_stay_behind_requeued_batch() {
        let mut pipeline = LogPipeline::open(Arc::new(MemoryStore::new()));
        let first = event(EventKind::TabSwitch);
        let second = event(EventKind::WindowBlur);
        let late = event(EventKind::FocusReturn);
        pipeline.record(first.clone());
        pipeline.record(second.clone());

        let batch = pipeline.begin_flush().unwrap();
        assert_eq!(ids(&batch), vec![first.id, second.id]);

        pipeline.record(late.clone());
        let outcome =
            pipeline.complete_flush(Err(SinkError::Unreachable(String::from("timeout"))));

        assert_eq!(outcome, FlushOutcome::Requeued(2));
        assert_eq!(ids(pipeline.pending()), vec![first.id, second.id, late.id]);
    }

    #[test]
    fn test_events_recorded_mid_flush_survive_success() {
        let mut pipeline = LogPipeline::open(Arc::new(MemoryStore::new()));
        pipeline.record(event(EventKind::TabSwitch));
        let _batch = pipeline.begin_flush().unwrap();
        let late = event(EventKind::CopyAttempt);
        pipeline.record(late.clone());

        assert_eq!(pipeline.complete_flush(Ok(())), FlushOutcome::Delivered(1));
        assert_eq!(ids(pipeline.pending()), vec![late.id]);
    }

    #[test]
    fn test_in_flight_batch_survives_crash() {
        let store = Arc::new(MemoryStore::new());
        let e = event(EventKind::FullscreenExit);
        {
            let mut pipeline = LogPipeline::open(store.clone());
            pipeline.record(e.clone());
            let _batch = pipeline.begin_flush().unwrap();
            // Dropped without completing the flush
        }

        let reopened = LogPipeline::open(store);
        assert_eq!(ids(reopened.pending()), vec![e.id]);
    }

    #[test]
    fn test_recovered_events_come_before_new_ones() {
        let store = Arc::new(MemoryStore::new());
        let old = event(EventKind::TabSwitch);
        LogPipeline::open(store.clone()).record(old.clone());

        let mut reopened = LogPipeline::open(store);
        let new = event(EventKind::WindowBlur);
        reopened.record(new.clone());

        assert_eq!(ids(reopened.pending()), vec![old.id, new.id]);
        assert_eq!(ids(reopened.begin_flush().unwrap().iter()), vec![old.id, new.id]);
    }

    #[test]
    fn test_persistence_failure_is_not_fatal() {
        let mut pipeline = LogPipeline::open(Arc::new(BrokenStore));
        pipeline.record(event(EventKind::TabSwitch));
        pipeline.record(event(EventKind::PasteAttempt));

        assert_eq!(pipeline.pending_len(), 2);
        assert_eq!(pipeline.history().len(), 2);
    }

    #[test]
    fn test_corrupt_snapshot_treated_as_empty() {
        let store = Arc::new(MemoryStore::new());
        store.save(StorageKey::PendingQueue, "{not json").unwrap();
        store.save(StorageKey::SessionHistory, "[1, 2]").unwrap();

        let pipeline = LogPipeline::open(store);
        assert_eq!(pipeline.pending_len(), 0);
        assert!(pipeline.history().is_empty());
    }

    #[test]
    fn test_history_is_never_replayed_into_pending() {
        let store = Arc::new(MemoryStore::new());
        let e = event(EventKind::TabSwitch);
        store
            .save(
                StorageKey::SessionHistory,
                &serde_json::to_string(&vec![e.clone()]).unwrap(),
            )
            .unwrap();

        let pipeline = LogPipeline::open(store);
        assert_eq!(pipeline.pending_len(), 0);
        assert_eq!(ids(pipeline.history()), vec![e.id]);
    }
}
