//! Batch orchestration: bounded parallelism, per-task retries, pacing,
//! incremental skip, status tracking and result persistence.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use crate::config::ExperimentConfig;
use crate::driver::{DriverError, DriverFactory};
use crate::fingerprint;
use crate::model::{
    task_id, AttemptRow, AuditReport, ExperimentTask, PlayerMode, TaskPhase, TaskResultRow,
    TaskStatus,
};
use crate::queue::MetadataQueue;
use crate::report::progress::{ProgressEvent, ProgressSink};
use crate::report::RunArtifacts;
use crate::status::{Counter, HealthMetric, StatusTracker, TaskProgress};
use crate::storage::{ResultMeta, StorageBackend, Store};

use super::auditor::Auditor;
use super::{AuditCallback, AuditEvent};

/// Map a driver failure to the task status it ends the attempt with.
/// Restrictions are audit-level failures; everything else is infra.
pub(crate) fn classify_driver_failure(e: &DriverError) -> TaskStatus {
    match e {
        DriverError::Restricted { .. } => TaskStatus::Failed,
        _ => TaskStatus::Error,
    }
}

#[derive(Clone)]
pub struct BatchRunner {
    config: Arc<ExperimentConfig>,
    store: Store,
    storage: Arc<dyn StorageBackend>,
    status: Arc<StatusTracker>,
    drivers: DriverFactory,
    queue: Option<Arc<MetadataQueue>>,
}

impl BatchRunner {
    #[must_use]
    pub fn new(
        config: Arc<ExperimentConfig>,
        store: Store,
        storage: Arc<dyn StorageBackend>,
        status: Arc<StatusTracker>,
        drivers: DriverFactory,
    ) -> Self {
        Self {
            config,
            store,
            storage,
            status,
            drivers,
            queue: None,
        }
    }

    /// Shard collected video ids into a metadata queue after the run.
    #[must_use]
    pub fn with_queue(mut self, queue: Arc<MetadataQueue>) -> Self {
        self.queue = Some(queue);
        self
    }

    /// Run the batch; rows are collected in completion order internally but
    /// returned sorted by task id for deterministic artifacts. If
    /// `progress` is set, it is called after each task completes.
    pub async fn run(&self, progress: Option<ProgressSink>) -> anyhow::Result<RunArtifacts> {
        let cfg = &self.config;
        let run_id = self.store.create_run(cfg)?;
        let total = cfg.tasks.len();
        self.status.start(total as u64)?;
        tracing::info!(experiment = %cfg.name, total, "batch started");

        let mut order: Vec<usize> = (0..total).collect();
        if let Some(seed) = cfg.settings.seed {
            use rand::seq::SliceRandom;
            use rand::SeedableRng;
            let mut rng = rand::rngs::StdRng::seed_from_u64(seed);
            order.shuffle(&mut rng);
        }

        let parallel = cfg.settings.parallel.max(1);
        let sem = Arc::new(Semaphore::new(parallel));
        let mut join_set = JoinSet::new();

        for (launch_pos, task_idx) in order.into_iter().enumerate() {
            let permit = sem.clone().acquire_owned().await?;
            let this = self.clone();
            let task = cfg.tasks[task_idx].clone();
            let tid = task_id(task_idx);
            join_set.spawn(async move {
                let _permit = permit;
                this.pacing_delay(launch_pos).await;
                this.run_task_with_retry(run_id, task_idx, &tid, &task).await
            });
        }

        let mut rows = Vec::new();
        let mut any_fail = false;
        while let Some(res) = join_set.join_next().await {
            let row = match res {
                Ok(row) => row,
                Err(e) => TaskResultRow {
                    task_id: "unknown".into(),
                    status: TaskStatus::Error,
                    message: format!("join error: {e}"),
                    duration_ms: None,
                    fingerprint: None,
                    skip_reason: None,
                    attempts: None,
                    details: serde_json::json!({}),
                },
            };
            any_fail = any_fail || row.status.is_blocking();
            rows.push(row);
            if total > 0 {
                if let Some(sink) = &progress {
                    sink(ProgressEvent {
                        done: rows.len(),
                        total,
                    });
                }
            }
        }

        rows.sort_by(|a, b| a.task_id.cmp(&b.task_id));

        self.store
            .finalize_run(run_id, if any_fail { "failed" } else { "passed" })?;
        self.status.complete()?;

        if let Some(queue) = &self.queue {
            let written = queue.flush_to(&cfg.experiment_dir())?;
            if written > 0 {
                tracing::info!(written, "metadata queue flushed");
            }
        }

        tracing::info!(experiment = %cfg.name, "batch finished");
        Ok(RunArtifacts {
            run_id,
            experiment: cfg.name.clone(),
            results: rows,
            order_seed: cfg.settings.seed,
        })
    }

    /// Random sleep between task launches. The first `parallel` slots start
    /// immediately; everything after pauses to stay under platform rate
    /// limits.
    async fn pacing_delay(&self, launch_pos: usize) {
        let s = &self.config.settings;
        let (min, max) = s.sleep_range;
        if max == 0 || min > max || launch_pos < s.parallel.max(1) {
            return;
        }
        let secs = {
            use rand::Rng;
            rand::thread_rng().gen_range(min..=max)
        };
        tracing::debug!(secs, "pacing before next task");
        tokio::time::sleep(Duration::from_secs(secs)).await;
    }

    async fn run_task_with_retry(
        &self,
        run_id: i64,
        task_idx: usize,
        tid: &str,
        task: &ExperimentTask,
    ) -> TaskResultRow {
        let settings = &self.config.settings;
        let fp = fingerprint::compute(fingerprint::Context {
            experiment: &self.config.name,
            task_id: tid,
            mode: task.mode,
            seed_ids: &task.video_ids,
            hops: settings.hops,
            watch_time: settings.watch_time,
        });

        if settings.cache {
            match self.store.last_passing_fingerprint(&fp.hex) {
                Ok(Some(prev_run)) => {
                    tracing::info!(task_id = tid, prev_run, "skipping: fingerprint match");
                    let row = TaskResultRow {
                        task_id: tid.to_string(),
                        status: TaskStatus::Skipped,
                        message: "skipped: fingerprint match".into(),
                        duration_ms: Some(0),
                        fingerprint: Some(fp.hex),
                        skip_reason: Some("fingerprint_match".into()),
                        attempts: None,
                        details: serde_json::json!({
                            "skip": {
                                "reason": "fingerprint_match",
                                "previous_run_id": prev_run,
                            }
                        }),
                    };
                    if let Err(e) = self.status.increment_completed() {
                        tracing::warn!(error = %e, "status update failed");
                    }
                    self.record_row(run_id, &row);
                    return row;
                }
                Ok(None) => {}
                Err(e) => tracing::warn!(error = %e, "fingerprint lookup failed"),
            }
        }

        let max_attempts = settings.retries.max(1);
        let mut attempts: Vec<AttemptRow> = Vec::new();
        let mut report: Option<AuditReport> = None;
        let mut last_status = TaskStatus::Error;
        let mut last_error = String::new();

        for attempt_no in 1..=max_attempts {
            if attempt_no > 1 {
                if let Err(e) = self.status.increment_health(HealthMetric::Retries) {
                    tracing::warn!(error = %e, "status update failed");
                }
                tracing::info!(task_id = tid, attempt_no, max_attempts, "retrying task");
            }
            let started = Instant::now();
            match self.execute_task(task_idx, tid, task).await {
                Ok(r) => {
                    attempts.push(AttemptRow {
                        attempt_no,
                        status: TaskStatus::Completed,
                        message: "ok".into(),
                        duration_ms: Some(started.elapsed().as_millis() as u64),
                    });
                    report = Some(r);
                    break;
                }
                Err(e) => {
                    let status = classify_driver_failure(&e);
                    let msg = e.to_string();
                    tracing::warn!(task_id = tid, attempt_no, error = %msg, "task attempt failed");
                    attempts.push(AttemptRow {
                        attempt_no,
                        status,
                        message: msg.clone(),
                        duration_ms: Some(started.elapsed().as_millis() as u64),
                    });
                    if let Err(e) = self.status.increment_health(HealthMetric::FailedRuns) {
                        tracing::warn!(error = %e, "status update failed");
                    }
                    last_status = status;
                    last_error = msg;
                }
            }
        }

        let total_ms: u64 = attempts.iter().filter_map(|a| a.duration_ms).sum();
        let row = if let Some(report) = report {
            let (mut status, mut message) = if attempts.len() > 1 {
                (TaskStatus::Flaky, "completed after retry".to_string())
            } else {
                (TaskStatus::Completed, "ok".to_string())
            };
            match self.persist_result(task_idx, tid, task, &report).await {
                Ok(()) => {
                    if let Err(e) = self.status.increment_completed() {
                        tracing::warn!(error = %e, "status update failed");
                    }
                    if let Err(e) = self.status.increment_health(HealthMetric::SuccessfulRuns) {
                        tracing::warn!(error = %e, "status update failed");
                    }
                }
                Err(e) => {
                    status = TaskStatus::Error;
                    message = format!("failed to save result: {e}");
                    tracing::error!(task_id = tid, error = %e, "result persistence failed");
                }
            }
            TaskResultRow {
                task_id: tid.to_string(),
                status,
                message,
                duration_ms: Some(total_ms),
                fingerprint: Some(fp.hex),
                skip_reason: None,
                attempts: Some(attempts),
                details: serde_json::json!({
                    "autoplay": report.recommendations.autoplay.len(),
                    "sidebar": report.recommendations.sidebar_count(),
                    "preload": report.recommendations.preload_count(),
                    "restricted": report.recommendations.restricted.len(),
                }),
            }
        } else {
            if let Err(e) = self.status.increment_failed() {
                tracing::warn!(error = %e, "status update failed");
            }
            TaskResultRow {
                task_id: tid.to_string(),
                status: last_status,
                message: format!("{} attempts failed: {last_error}", attempts.len()),
                duration_ms: Some(total_ms),
                fingerprint: Some(fp.hex),
                skip_reason: None,
                attempts: Some(attempts),
                details: serde_json::json!({}),
            }
        };

        if let Err(e) = self.status.finish_task(tid) {
            tracing::warn!(error = %e, "status update failed");
        }
        self.record_row(run_id, &row);
        row
    }

    /// One browser session from launch to report.
    async fn execute_task(
        &self,
        task_idx: usize,
        tid: &str,
        task: &ExperimentTask,
    ) -> Result<AuditReport, DriverError> {
        let settings = &self.config.settings;

        let progress = TaskProgress {
            video_id: task.seed().unwrap_or_default().to_string(),
            mode: task.mode,
            phase: TaskPhase::Pending,
            training_progress: Counter {
                current: 0,
                total: task.video_ids.len() as u64,
            },
            collection_progress: Counter {
                current: 0,
                total: u64::from(settings.hops),
            },
            status: "running".into(),
            error: None,
        };
        if let Err(e) = self
            .status
            .update_current_task(task_idx as i64, tid, progress)
        {
            tracing::warn!(error = %e, "status update failed");
        }

        let callback = self.status_callback(tid.to_string(), task.mode);
        let mut auditor = Auditor::new(
            (self.drivers)(),
            task.mode,
            settings.watch_time,
            callback,
        );

        if let Err(e) = auditor.start().await {
            let _ = auditor.shutdown().await;
            return Err(e);
        }

        let outcome = async {
            if let Some(account) = &settings.account {
                auditor.login(&account.username, &account.password).await?;
            }
            auditor.train(&task.video_ids).await?;
            auditor.collect(settings.hops).await
        }
        .await;

        if let Err(e) = auditor.shutdown().await {
            tracing::warn!(task_id = tid, error = %e, "driver shutdown failed");
        }
        outcome?;

        Ok(auditor.report())
    }

    async fn persist_result(
        &self,
        task_idx: usize,
        tid: &str,
        task: &ExperimentTask,
        report: &AuditReport,
    ) -> anyhow::Result<()> {
        let meta = ResultMeta {
            experiment_id: self.config.name.clone(),
            task_index: task_idx,
            mode: task.mode.as_str().to_string(),
            seed_ids: task.video_ids.clone(),
        };
        self.storage.save(tid, report, Some(meta)).await?;

        if let Some(queue) = &self.queue {
            queue.enqueue_report(report);
        }

        let recs = &report.recommendations;
        if let Err(e) = self.status.add_data_collected(
            recs.autoplay.len() as u64,
            recs.sidebar_count() as u64,
            recs.preload_count() as u64,
        ) {
            tracing::warn!(error = %e, "status update failed");
        }
        Ok(())
    }

    fn record_row(&self, run_id: i64, row: &TaskResultRow) {
        if let Err(e) = self.store.insert_result(run_id, row) {
            tracing::error!(task_id = %row.task_id, error = %e, "result row insert failed");
        }
    }

    fn status_callback(&self, tid: String, mode: PlayerMode) -> AuditCallback {
        let status = self.status.clone();
        Arc::new(move |ev| {
            let res = match ev {
                AuditEvent::TrainingProgress { current, total, .. } => {
                    status.update_task_progress(&tid, mode, TaskPhase::Training, current, total)
                }
                AuditEvent::CollectionProgress { current, total } => {
                    status.update_task_progress(&tid, mode, TaskPhase::Collection, current, total)
                }
                AuditEvent::Restricted { .. } => {
                    status.increment_health(HealthMetric::RestrictedVideos)
                }
            };
            if let Err(e) = res {
                tracing::warn!(error = %e, "status update failed");
            }
        })
    }
}
