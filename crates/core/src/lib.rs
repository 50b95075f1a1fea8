// crates/core/src/lib.rs
pub mod artifact;
pub mod backup;
pub mod config;
pub mod engine;
pub mod error;
pub mod layout;
pub mod paths;
pub mod poller;
pub mod sink;
pub mod store;
pub mod types;

pub use backup::{BackupSink, DirectoryStorage, RemoteStorage};
pub use config::{AppConfig, EngineConfig, ServerConfig};
pub use engine::JobEngine;
pub use error::*;
pub use poller::{JobEndpoint, PollError, PollEvent, Poller, PollerConfig};
pub use sink::{BatchSink, BatchTx, CarryOver, HandlerSet, UnitReport, UnitResult};
pub use store::{Acquire, StatusStore};
pub use types::*;
