pub mod db;
pub mod memory;
pub mod migrations;
pub mod models;
pub mod store;

pub use db::Database;
pub use memory::MemoryStore;
pub use models::{
    DisplayMetrics, EventContext, EventKind, SecurityEvent, SessionState, SessionStatus,
    Visibility,
};
pub use store::{DurableStore, StorageKey};
