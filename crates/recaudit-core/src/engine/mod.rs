//! Orchestration engine: the per-task [`Auditor`] and the batch
//! [`BatchRunner`].

pub mod auditor;
pub mod runner;

pub use auditor::Auditor;
pub use runner::BatchRunner;

use std::sync::Arc;

/// Progress events emitted while a task runs. The runner maps these onto
/// the status tracker; other consumers can subscribe for custom telemetry.
#[derive(Debug, Clone)]
pub enum AuditEvent {
    TrainingProgress {
        current: u64,
        total: u64,
        video_id: String,
    },
    CollectionProgress {
        current: u64,
        total: u64,
    },
    Restricted {
        url: String,
        reason: String,
    },
}

pub type AuditCallback = Arc<dyn Fn(AuditEvent) + Send + Sync>;

#[must_use]
pub fn noop_callback() -> AuditCallback {
    Arc::new(|_| {})
}
