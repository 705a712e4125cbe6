use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use crate::model::{TaskResultRow, TaskStatus};
use crate::report::progress::{ProgressEvent, ProgressSink};

/// Format a single progress line for display. Deterministic, unit-testable.
#[must_use]
pub fn format_progress_line(done: usize, total: usize) -> String {
    format!("Running task {}/{}...", done, total)
}

/// Minimum interval between progress updates to avoid log spam.
const PROGRESS_MIN_INTERVAL_MS: u64 = 200;

/// For large batches, emit at most every this many tasks (10% step).
#[must_use]
pub(crate) fn progress_step(total: usize) -> usize {
    if total <= 10 {
        1
    } else {
        std::cmp::max(1, total / 10)
    }
}

struct ThrottleState {
    last_emit: Option<Instant>,
}

/// Returns a progress sink that throttles updates and prints to stderr.
/// Suppressed entirely for single-task runs; always emits the final event.
#[must_use]
pub fn default_progress_sink(total: usize) -> Option<ProgressSink> {
    if total <= 1 {
        return None;
    }
    let step = progress_step(total);
    let state = Arc::new(Mutex::new(ThrottleState { last_emit: None }));
    Some(Arc::new(move |ev: ProgressEvent| {
        if ev.total == 0 {
            return;
        }
        let now = Instant::now();
        let should_emit = {
            let mut g = state.lock().expect("progress throttle lock");
            let emit_final = ev.done == ev.total;
            let emit_step = ev.done % step == 0 || ev.done == 1;
            let interval_ok = g
                .last_emit
                .map(|t| {
                    now.saturating_duration_since(t)
                        >= Duration::from_millis(PROGRESS_MIN_INTERVAL_MS)
                })
                .unwrap_or(true);
            let ok = emit_final || (emit_step && interval_ok);
            if ok {
                g.last_emit = Some(now);
            }
            ok
        };
        if should_emit {
            eprintln!("{}", format_progress_line(ev.done, ev.total));
        }
    }))
}

/// Per-status counts over a result set.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatusCounts {
    pub completed: usize,
    pub flaky: usize,
    pub failed: usize,
    pub errors: usize,
    pub skipped: usize,
}

#[must_use]
pub fn count_statuses(rows: &[TaskResultRow]) -> StatusCounts {
    let mut counts = StatusCounts::default();
    for row in rows {
        match row.status {
            TaskStatus::Completed => counts.completed += 1,
            TaskStatus::Flaky => counts.flaky += 1,
            TaskStatus::Failed => counts.failed += 1,
            TaskStatus::Error => counts.errors += 1,
            TaskStatus::Skipped => counts.skipped += 1,
        }
    }
    counts
}

/// Print the per-task table and totals to stderr.
pub fn print_summary(rows: &[TaskResultRow]) {
    for row in rows {
        let mark = if row.status.is_passing() { "ok" } else { "FAIL" };
        eprintln!(
            "  [{mark}] {} {}: {}",
            row.task_id, row.status, row.message
        );
    }
    let c = count_statuses(rows);
    eprintln!(
        "{} completed, {} flaky, {} failed, {} errors, {} skipped ({} total)",
        c.completed,
        c.flaky,
        c.failed,
        c.errors,
        c.skipped,
        rows.len()
    );
}

/// Echo the order seed so a run can be reproduced from CI logs.
pub fn print_run_footer(order_seed: Option<u64>) {
    if let Some(seed) = order_seed {
        eprintln!("Order seed: {seed}");
    }
}
