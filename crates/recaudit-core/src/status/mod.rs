//! Status tracking layer. Mirrors batch state into an atomically written
//! `status.json` so run progress is observable without parsing logs.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::model::{PlayerMode, TaskPhase};

/// Progress of one mode of the task currently being processed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskProgress {
    pub video_id: String,
    pub mode: PlayerMode,
    pub phase: TaskPhase,
    pub training_progress: Counter,
    pub collection_progress: Counter,
    pub status: String,
    #[serde(default)]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Counter {
    pub current: u64,
    pub total: u64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchProgress {
    pub total_tasks: u64,
    pub completed_tasks: u64,
    pub failed_tasks: u64,
    /// Index of the most recently started task, -1 before the first.
    pub current_task_index: i64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Health {
    pub successful_runs: u64,
    pub failed_runs: u64,
    pub retries: u64,
    pub restricted_videos: u64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataCollected {
    pub autoplay_paths: u64,
    pub sidebar_recs: u64,
    pub preload_recs: u64,
}

/// The full state document written to `status.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusState {
    pub experiment_id: String,
    pub status: String,
    pub started_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub elapsed_seconds: u64,
    pub batch_progress: BatchProgress,
    /// Per-mode progress of in-flight tasks, keyed by task id.
    pub current_tasks: BTreeMap<String, BTreeMap<String, TaskProgress>>,
    pub health: Health,
    pub data_collected: DataCollected,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl StatusState {
    fn new(experiment_id: &str) -> Self {
        Self {
            experiment_id: experiment_id.to_string(),
            status: "pending".to_string(),
            started_at: None,
            updated_at: Utc::now(),
            completed_at: None,
            elapsed_seconds: 0,
            batch_progress: BatchProgress {
                current_task_index: -1,
                ..Default::default()
            },
            current_tasks: BTreeMap::new(),
            health: Health::default(),
            data_collected: DataCollected::default(),
            error: None,
        }
    }
}

/// Thread-safe tracker behind the runner. Every mutation rewrites the
/// status file through a temp file + rename, so readers never observe a
/// half-written document.
pub struct StatusTracker {
    path: PathBuf,
    state: Mutex<StatusState>,
}

impl StatusTracker {
    pub fn new(experiment_id: &str, experiment_dir: &Path) -> std::io::Result<Self> {
        std::fs::create_dir_all(experiment_dir)?;
        Ok(Self {
            path: experiment_dir.join("status.json"),
            state: Mutex::new(StatusState::new(experiment_id)),
        })
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read a status file written by another process.
    pub fn load(path: &Path) -> anyhow::Result<StatusState> {
        let text = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&text)?)
    }

    /// Resume from an existing status file, if one is present.
    pub fn load_existing(&self) -> anyhow::Result<bool> {
        if !self.path.exists() {
            return Ok(false);
        }
        let loaded = Self::load(&self.path)?;
        *self.lock() = loaded;
        Ok(true)
    }

    pub fn start(&self, total_tasks: u64) -> anyhow::Result<()> {
        {
            let mut s = self.lock();
            s.status = "running".into();
            s.started_at = Some(Utc::now());
            s.batch_progress.total_tasks = total_tasks;
        }
        self.write()
    }

    pub fn complete(&self) -> anyhow::Result<()> {
        {
            let mut s = self.lock();
            s.status = "completed".into();
            s.completed_at = Some(Utc::now());
            s.current_tasks.clear();
        }
        self.write()
    }

    pub fn fail(&self, error: &str) -> anyhow::Result<()> {
        {
            let mut s = self.lock();
            s.status = "failed".into();
            s.error = Some(error.to_string());
            s.completed_at = Some(Utc::now());
        }
        self.write()
    }

    pub fn update_current_task(
        &self,
        task_index: i64,
        task_id: &str,
        progress: TaskProgress,
    ) -> anyhow::Result<()> {
        {
            let mut s = self.lock();
            s.batch_progress.current_task_index = task_index;
            let modes = s.current_tasks.entry(task_id.to_string()).or_default();
            modes.insert(progress.mode.as_str().to_string(), progress);
        }
        self.write()
    }

    pub fn update_task_progress(
        &self,
        task_id: &str,
        mode: PlayerMode,
        phase: TaskPhase,
        current: u64,
        total: u64,
    ) -> anyhow::Result<()> {
        {
            let mut s = self.lock();
            if let Some(progress) = s
                .current_tasks
                .get_mut(task_id)
                .and_then(|m| m.get_mut(mode.as_str()))
            {
                progress.phase = phase;
                let counter = Counter { current, total };
                match phase {
                    TaskPhase::Training => progress.training_progress = counter,
                    TaskPhase::Collection => progress.collection_progress = counter,
                    _ => {}
                }
            }
        }
        self.write()
    }

    pub fn finish_task(&self, task_id: &str) -> anyhow::Result<()> {
        {
            let mut s = self.lock();
            s.current_tasks.remove(task_id);
        }
        self.write()
    }

    pub fn increment_completed(&self) -> anyhow::Result<()> {
        self.lock().batch_progress.completed_tasks += 1;
        self.write()
    }

    pub fn increment_failed(&self) -> anyhow::Result<()> {
        self.lock().batch_progress.failed_tasks += 1;
        self.write()
    }

    pub fn increment_health(&self, metric: HealthMetric) -> anyhow::Result<()> {
        {
            let mut s = self.lock();
            match metric {
                HealthMetric::SuccessfulRuns => s.health.successful_runs += 1,
                HealthMetric::FailedRuns => s.health.failed_runs += 1,
                HealthMetric::Retries => s.health.retries += 1,
                HealthMetric::RestrictedVideos => s.health.restricted_videos += 1,
            }
        }
        self.write()
    }

    pub fn add_data_collected(
        &self,
        autoplay: u64,
        sidebar: u64,
        preload: u64,
    ) -> anyhow::Result<()> {
        {
            let mut s = self.lock();
            s.data_collected.autoplay_paths += autoplay;
            s.data_collected.sidebar_recs += sidebar;
            s.data_collected.preload_recs += preload;
        }
        self.write()
    }

    #[must_use]
    pub fn snapshot(&self) -> StatusState {
        self.lock().clone()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, StatusState> {
        self.state.lock().expect("status tracker mutex poisoned")
    }

    fn write(&self) -> anyhow::Result<()> {
        let json = {
            let mut s = self.lock();
            s.updated_at = Utc::now();
            if let Some(started) = s.started_at {
                s.elapsed_seconds = (Utc::now() - started).num_seconds().max(0) as u64;
            }
            serde_json::to_string_pretty(&*s)?
        };
        let dir = self.path.parent().unwrap_or_else(|| Path::new("."));
        let tmp = tempfile::NamedTempFile::new_in(dir)?;
        std::fs::write(tmp.path(), json)?;
        tmp.persist(&self.path)?;
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HealthMetric {
    SuccessfulRuns,
    FailedRuns,
    Retries,
    RestrictedVideos,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tracker(dir: &Path) -> StatusTracker {
        StatusTracker::new("exp-1", dir).unwrap()
    }

    #[test]
    fn lifecycle_writes_parseable_file() {
        let dir = tempfile::tempdir().unwrap();
        let t = tracker(dir.path());
        t.start(4).unwrap();

        let state = StatusTracker::load(t.path()).unwrap();
        assert_eq!(state.status, "running");
        assert_eq!(state.batch_progress.total_tasks, 4);
        assert!(state.started_at.is_some());

        t.increment_completed().unwrap();
        t.complete().unwrap();
        let state = StatusTracker::load(t.path()).unwrap();
        assert_eq!(state.status, "completed");
        assert_eq!(state.batch_progress.completed_tasks, 1);
        assert!(state.completed_at.is_some());
        assert!(state.current_tasks.is_empty());
    }

    #[test]
    fn task_progress_updates_by_mode_and_phase() {
        let dir = tempfile::tempdir().unwrap();
        let t = tracker(dir.path());
        t.start(1).unwrap();
        t.update_current_task(
            0,
            "task_0000",
            TaskProgress {
                video_id: "abc".into(),
                mode: PlayerMode::Long,
                phase: TaskPhase::Pending,
                training_progress: Counter {
                    current: 0,
                    total: 2,
                },
                collection_progress: Counter {
                    current: 0,
                    total: 15,
                },
                status: "running".into(),
                error: None,
            },
        )
        .unwrap();
        t.update_task_progress("task_0000", PlayerMode::Long, TaskPhase::Collection, 7, 15)
            .unwrap();

        let state = StatusTracker::load(t.path()).unwrap();
        let p = &state.current_tasks["task_0000"]["long"];
        assert_eq!(p.phase, TaskPhase::Collection);
        assert_eq!(p.collection_progress.current, 7);
        // training counter untouched by collection updates
        assert_eq!(p.training_progress.total, 2);

        t.finish_task("task_0000").unwrap();
        let state = StatusTracker::load(t.path()).unwrap();
        assert!(state.current_tasks.is_empty());
    }

    #[test]
    fn health_and_data_counters_accumulate() {
        let dir = tempfile::tempdir().unwrap();
        let t = tracker(dir.path());
        t.start(1).unwrap();
        t.increment_health(HealthMetric::Retries).unwrap();
        t.increment_health(HealthMetric::Retries).unwrap();
        t.increment_health(HealthMetric::RestrictedVideos).unwrap();
        t.add_data_collected(15, 120, 0).unwrap();
        t.add_data_collected(15, 0, 60).unwrap();

        let s = t.snapshot();
        assert_eq!(s.health.retries, 2);
        assert_eq!(s.health.restricted_videos, 1);
        assert_eq!(s.data_collected.autoplay_paths, 30);
        assert_eq!(s.data_collected.sidebar_recs, 120);
        assert_eq!(s.data_collected.preload_recs, 60);
    }

    #[test]
    fn no_temp_files_left_behind() {
        let dir = tempfile::tempdir().unwrap();
        let t = tracker(dir.path());
        t.start(1).unwrap();
        t.increment_completed().unwrap();
        let entries: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name())
            .collect();
        assert_eq!(entries, vec![std::ffi::OsString::from("status.json")]);
    }

    #[test]
    fn load_existing_resumes_prior_state() {
        let dir = tempfile::tempdir().unwrap();
        {
            let t = tracker(dir.path());
            t.start(9).unwrap();
        }
        let t2 = tracker(dir.path());
        assert!(t2.load_existing().unwrap());
        assert_eq!(t2.snapshot().batch_progress.total_tasks, 9);

        let empty = tempfile::tempdir().unwrap();
        let t3 = tracker(empty.path());
        assert!(!t3.load_existing().unwrap());
    }
}
