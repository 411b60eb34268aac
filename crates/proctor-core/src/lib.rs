pub mod classifier;
pub mod config;
pub mod daemon;
pub mod environment;
pub mod error;
pub mod monitor;
pub mod pipeline;
pub mod sink;
pub mod supervisor;
pub mod timer;

pub use classifier::{Classification, Classifier};
pub use config::ProctorConfig;
pub use daemon::{Collaborators, Proctor, ProctorCommand, ProctorHandle, ProctorInput};
pub use environment::{Connectivity, EnvironmentProbe, EnvironmentSnapshot, SharedEnvironment};
pub use error::{SinkError, SnapshotError};
pub use monitor::{DetectorSet, EnvironmentChange, InputAction, ManualSource, RawSignal};
pub use pipeline::{FlushOutcome, LogPipeline, LogQueue};
pub use sink::{FileSink, LogSink};
pub use supervisor::{SessionAction, Supervisor, Transition, MAX_VIOLATIONS, WARNING_THRESHOLD};
pub use timer::SessionTimer;
