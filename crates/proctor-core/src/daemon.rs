use anyhow::Result;
use proctor_storage::{DurableStore, EventKind, SessionState, StorageKey};
use std::{sync::Arc, time::Duration};
use tokio::{
    sync::{
        mpsc::{self, UnboundedReceiver, UnboundedSender},
        watch,
    },
    task::JoinHandle,
    time::{interval_at, Instant, MissedTickBehavior},
};

use crate::{
    classifier::Classifier,
    config::ProctorConfig,
    environment::{Connectivity, EnvironmentProbe},
    error::SinkError,
    monitor::RawSignal,
    pipeline::{FlushOutcome, LogPipeline},
    sink::LogSink,
    supervisor::{SessionAction, Supervisor, Transition},
    timer::SessionTimer,
};

/// Operator requests delivered to a running [`Proctor`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProctorCommand {
    Start { duration_secs: u32 },
    Submit,
    AdminResume,
    Shutdown,
}

/// Everything a [`Proctor`] reacts to, delivered on one ordered channel
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProctorInput {
    Signal(RawSignal),
    Command(ProctorCommand),
}

impl From<RawSignal> for ProctorInput {
    fn from(signal: RawSignal) -> Self {
        Self::Signal(signal)
    }
}

impl From<ProctorCommand> for ProctorInput {
    fn from(command: ProctorCommand) -> Self {
        Self::Command(command)
    }
}

/// Cloneable handle for feeding a running [`Proctor`]
#[derive(Debug, Clone)]
pub struct ProctorHandle {
    inputs: UnboundedSender<ProctorInput>,
}

impl ProctorHandle {
    /// Returns `false` once the proctor has gone away
    pub fn send(&self, command: ProctorCommand) -> bool {
        self.inputs.send(command.into()).is_ok()
    }

    /// Queue a detector signal behind everything sent so far
    pub fn signal(&self, signal: RawSignal) -> bool {
        self.inputs.send(signal.into()).is_ok()
    }

    pub fn start(&self, duration_secs: u32) -> bool {
        self.send(ProctorCommand::Start { duration_secs })
    }

    pub fn submit(&self) -> bool {
        self.send(ProctorCommand::Submit)
    }

    pub fn admin_resume(&self) -> bool {
        self.send(ProctorCommand::AdminResume)
    }

    pub fn shutdown(&self) -> bool {
        self.send(ProctorCommand::Shutdown)
    }
}

/// External collaborators the proctor talks to
pub struct Collaborators {
    pub store: Arc<dyn DurableStore>,
    pub sink: Arc<dyn LogSink>,
    pub probe: Arc<dyn EnvironmentProbe>,
    pub connectivity: Arc<dyn Connectivity>,
}

type Delivery = JoinHandle<Result<(), SinkError>>;

/// Single-owner event loop tying detectors, classifier, supervisor, timer
/// and log pipeline together
pub struct Proctor {
    supervisor: Supervisor,
    classifier: Classifier,
    pipeline: LogPipeline,
    timer: SessionTimer,
    store: Arc<dyn DurableStore>,
    sink: Arc<dyn LogSink>,
    probe: Arc<dyn EnvironmentProbe>,
    connectivity: Arc<dyn Connectivity>,
    flush_interval: Duration,
    log_timer_ticks: bool,
    delivery: Option<Delivery>,
    input_tx: UnboundedSender<ProctorInput>,
    inputs: UnboundedReceiver<ProctorInput>,
    state_tx: watch::Sender<SessionState>,
}

impl Proctor {
    /// Build a proctor. Pending events from a previous run are recovered
    /// from `collaborators.store` before anything else happens.
    #[must_use]
    pub fn new(config: &ProctorConfig, collaborators: Collaborators) -> Self {
        let (input_tx, inputs) = mpsc::unbounded_channel();
        let (state_tx, _) = watch::channel(SessionState::default());
        let Collaborators {
            store,
            sink,
            probe,
            connectivity,
        } = collaborators;

        Self {
            supervisor: Supervisor::with_max_violations(config.max_violations),
            classifier: Classifier::new(config.attempt_id.clone()),
            pipeline: LogPipeline::open(store.clone()),
            timer: SessionTimer::new(config.tick_interval()),
            store,
            sink,
            probe,
            connectivity,
            flush_interval: config.flush_interval(),
            log_timer_ticks: config.log_timer_ticks,
            delivery: None,
            input_tx,
            inputs,
            state_tx,
        }
    }

    /// Sender detectors forward their signals to. It shares one channel
    /// with [`ProctorHandle`], so signals and commands are handled in the
    /// order they were sent.
    #[must_use]
    pub fn signal_sender(&self) -> UnboundedSender<ProctorInput> {
        self.input_tx.clone()
    }

    #[must_use]
    pub fn handle(&self) -> ProctorHandle {
        ProctorHandle {
            inputs: self.input_tx.clone(),
        }
    }

    /// Follow the session state as transitions are applied
    #[must_use]
    pub fn watch_state(&self) -> watch::Receiver<SessionState> {
        self.state_tx.subscribe()
    }

    #[must_use]
    pub const fn state(&self) -> &SessionState {
        self.supervisor.state()
    }

    #[must_use]
    pub const fn supervisor(&self) -> &Supervisor {
        &self.supervisor
    }

    #[must_use]
    pub const fn pipeline(&self) -> &LogPipeline {
        &self.pipeline
    }

    #[must_use]
    pub const fn is_delivering(&self) -> bool {
        self.delivery.is_some()
    }

    /// Run until a `Shutdown` command or Ctrl-C
    ///
    /// # Errors
    ///
    /// Currently always succeeds; failures inside the loop are logged
    pub async fn run(&mut self) -> Result<()> {
        let mut flush_ticker =
            interval_at(Instant::now() + self.flush_interval, self.flush_interval);
        flush_ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        self.timer.sync(self.supervisor.status());

        log::info!(
            "Proctor started for {} ({} unsent events)",
            self.classifier.session_ref(),
            self.pipeline.pending_len()
        );

        loop {
            tokio::select! {
                Some(input) = self.inputs.recv() => {
                    if !self.handle_input(input) {
                        break;
                    }
                }
                () = self.timer.tick() => {
                    self.on_timer_tick();
                }
                _ = flush_ticker.tick() => {
                    self.on_flush_tick();
                }
                result = wait_for_delivery(&mut self.delivery) => {
                    self.on_delivery_complete(result);
                }
                _ = tokio::signal::ctrl_c() => {
                    log::info!("Received Ctrl-C, shutting down...");
                    break;
                }
            }
        }

        self.shutdown();
        Ok(())
    }

    /// Dispatch one queued input; returns `false` on shutdown
    pub fn handle_input(&mut self, input: ProctorInput) -> bool {
        match input {
            ProctorInput::Signal(signal) => {
                self.handle_signal(signal);
                true
            }
            ProctorInput::Command(command) => self.handle_command(command),
        }
    }

    /// Classify a detector signal, log it, and record a strike if eligible
    pub fn handle_signal(&mut self, signal: RawSignal) {
        let snapshot = self.probe.snapshot();
        let classification = self
            .classifier
            .classify(signal, self.supervisor.state(), &snapshot);
        let kind = classification.event.kind;
        self.pipeline.record(classification.event);

        if classification.counts_as_violation {
            if let Transition::ViolationRecorded { count } =
                self.transition(SessionAction::RecordViolation)
            {
                let max = self.supervisor.max_violations();
                if self.supervisor.is_critical() {
                    log::warn!(
                        "Violation {count}/{max} ({kind}), {} left before the session locks",
                        self.supervisor.violations_remaining()
                    );
                } else {
                    log::info!("Violation {count}/{max} ({kind})");
                }
            }
        }
    }

    /// Apply an operator command; returns `false` on shutdown
    pub fn handle_command(&mut self, command: ProctorCommand) -> bool {
        let action = match command {
            ProctorCommand::Start { duration_secs } => SessionAction::Start { duration_secs },
            ProctorCommand::Submit => SessionAction::Submit,
            ProctorCommand::AdminResume => SessionAction::AdminResume,
            ProctorCommand::Shutdown => return false,
        };
        self.transition(action);
        true
    }

    /// One countdown step
    pub fn on_timer_tick(&mut self) {
        let transition = self.transition(SessionAction::Tick);
        if self.log_timer_ticks && matches!(transition, Transition::Ticked { .. }) {
            self.record_lifecycle(EventKind::TimerTick);
        }
    }

    /// Scheduled flush: skipped while offline or while a batch is in flight
    pub fn on_flush_tick(&mut self) {
        if self.delivery.is_some() {
            log::debug!("Previous delivery unresolved, skipping scheduled flush");
            return;
        }
        if !self.connectivity.is_online() {
            log::debug!(
                "Offline, skipping scheduled flush ({} pending)",
                self.pipeline.pending_len()
            );
            return;
        }
        let Some(batch) = self.pipeline.begin_flush() else {
            return;
        };

        let sink = self.sink.clone();
        log::debug!("Delivering {} events to {} sink", batch.len(), sink.name());
        self.delivery = Some(tokio::spawn(async move { sink.deliver(&batch).await }));
    }

    fn on_delivery_complete(&mut self, result: Result<(), SinkError>) -> FlushOutcome {
        self.delivery = None;
        self.pipeline.complete_flush(result)
    }

    fn transition(&mut self, action: SessionAction) -> Transition {
        let transition = self.supervisor.apply(action);
        if !transition.is_applied() {
            return transition;
        }

        self.timer.sync(self.supervisor.status());
        self.persist_state();
        self.state_tx.send_replace(self.supervisor.state().clone());

        if matches!(action, SessionAction::Start { .. }) {
            self.record_lifecycle(EventKind::TimerStart);
        }
        if transition == Transition::Expired {
            self.record_lifecycle(EventKind::TimerEnd);
        }
        if transition.submits() {
            self.record_lifecycle(EventKind::ExamSubmit);
        }
        transition
    }

    fn record_lifecycle(&mut self, kind: EventKind) {
        let snapshot = self.probe.snapshot();
        let event = self
            .classifier
            .lifecycle(kind, self.supervisor.state(), &snapshot);
        self.pipeline.record(event);
    }

    fn persist_state(&self) {
        let result = serde_json::to_string(self.supervisor.state())
            .map_err(anyhow::Error::from)
            .and_then(|encoded| self.store.save(StorageKey::SessionState, &encoded));
        if let Err(e) = result {
            log::warn!("Failed to persist session state: {e:#}");
        }
    }

    /// Record signals still queued when the loop stops. Commands are
    /// dropped: the session is being torn down.
    fn drain_inputs(&mut self) {
        while let Ok(input) = self.inputs.try_recv() {
            match input {
                ProctorInput::Signal(signal) => self.handle_signal(signal),
                ProctorInput::Command(command) => {
                    log::debug!("Dropping {command:?} received during shutdown");
                }
            }
        }
    }

    fn shutdown(&mut self) {
        self.drain_inputs();
        self.timer.cancel();
        if let Some(delivery) = self.delivery.take() {
            delivery.abort();
            self.pipeline.complete_flush(Err(SinkError::Aborted(String::from(
                "proctor shut down",
            ))));
        }
        self.persist_state();
        log::info!(
            "Proctor shut down ({:?}, {} violations, {} unsent events)",
            self.supervisor.status(),
            self.supervisor.state().violation_count,
            self.pipeline.pending_len()
        );
    }
}

/// Resolve the in-flight delivery; pending forever when there is none
async fn wait_for_delivery(delivery: &mut Option<Delivery>) -> Result<(), SinkError> {
    match delivery.as_mut() {
        Some(handle) => handle
            .await
            .unwrap_or_else(|e| Err(SinkError::Aborted(e.to_string()))),
        None => std::future::pending().await,
    }
}
