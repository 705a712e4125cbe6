//! recaudit-core: batch orchestration for video-platform recommendation
//! audits.
//!
//! An experiment is a named batch of [`model::ExperimentTask`]s. The
//! [`engine::BatchRunner`] executes them with bounded parallelism and
//! retries, driving a browser through the [`driver::PlatformDriver`] seam,
//! mirroring progress into a [`status::StatusTracker`] and persisting
//! results through [`storage::StorageBackend`]s plus a SQLite history
//! [`storage::Store`].

pub mod config;
pub mod driver;
pub mod engine;
pub mod errors;
pub mod fingerprint;
pub mod model;
pub mod queue;
pub mod report;
pub mod status;
pub mod storage;

pub use config::{load_config, ExperimentConfig, Settings};
pub use engine::{Auditor, BatchRunner};
pub use model::{AuditReport, ExperimentTask, PlayerMode, TaskResultRow, TaskStatus, WatchTime};
pub use status::StatusTracker;
pub use storage::{FileStorage, Store};
