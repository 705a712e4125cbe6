//! Progress reporting for batch runs. The runner emits done/total in
//! completion order; the console layer consumes via a sink.

use std::sync::Arc;

/// One progress update: how many tasks are done and the total count.
#[derive(Debug, Clone, Copy)]
pub struct ProgressEvent {
    pub done: usize,
    pub total: usize,
}

/// Sink for progress events. The runner calls this each time a task
/// completes. Implementations may throttle.
pub type ProgressSink = Arc<dyn Fn(ProgressEvent) + Send + Sync>;
