//! Core data model: player modes, watch-time semantics, task and result rows.

use serde::{Deserialize, Serialize};

/// Which player surface a task audits: regular watch pages or the
/// short-form reel player. The two differ in navigation keys, DOM layout
/// and recommendation surfaces.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlayerMode {
    #[default]
    Long,
    Short,
}

impl PlayerMode {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            PlayerMode::Long => "long",
            PlayerMode::Short => "short",
        }
    }
}

impl std::fmt::Display for PlayerMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How long to watch each video. An integer is absolute seconds, capped at
/// the video length; a fraction is a share of the video length.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum WatchTime {
    Seconds(u64),
    Fraction(f64),
}

impl Default for WatchTime {
    fn default() -> Self {
        WatchTime::Seconds(10)
    }
}

/// Fallback video length when the player reports none (seconds).
pub const DEFAULT_VIDEO_LEN_SECS: f64 = 180.0;

impl WatchTime {
    /// Effective dwell time for a video of `video_len` seconds.
    ///
    /// Absolute watch times back off one second from the cap so the player
    /// never reaches the end card before we read recommendations.
    /// Non-finite or zero lengths fall back to [`DEFAULT_VIDEO_LEN_SECS`].
    #[must_use]
    pub fn effective_secs(&self, video_len: f64) -> u64 {
        let len = if video_len.is_finite() && video_len > 0.0 {
            video_len
        } else {
            DEFAULT_VIDEO_LEN_SECS
        };
        match *self {
            WatchTime::Seconds(s) => (len as u64).min(s).saturating_sub(1),
            WatchTime::Fraction(f) => {
                if f.is_finite() && f > 0.0 {
                    (len * f) as u64
                } else {
                    0
                }
            }
        }
    }
}

/// One unit of experiment work: a training seed sequence and a player mode.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExperimentTask {
    /// Training seed video ids, watched in order. The last one is the seed
    /// the collection phase starts from.
    pub video_ids: Vec<String>,
    pub mode: PlayerMode,
    /// Explicit seed id override; defaults to the last training id.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seed_id: Option<String>,
}

impl ExperimentTask {
    #[must_use]
    pub fn seed(&self) -> Option<&str> {
        self.seed_id
            .as_deref()
            .or_else(|| self.video_ids.last().map(String::as_str))
    }
}

/// Lifecycle phase of a task while it is in flight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskPhase {
    Pending,
    Training,
    Collection,
    Complete,
    Failed,
}

/// Final status of one task after retries and classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Completed,
    /// A retry succeeded after at least one failed attempt.
    Flaky,
    /// All attempts failed at the audit level (e.g. restricted seed).
    Failed,
    /// All attempts failed with infrastructure errors (driver, network).
    Error,
    /// Not executed: a passing result with the same fingerprint exists.
    Skipped,
}

impl TaskStatus {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Completed => "completed",
            TaskStatus::Flaky => "flaky",
            TaskStatus::Failed => "failed",
            TaskStatus::Error => "error",
            TaskStatus::Skipped => "skipped",
        }
    }

    #[must_use]
    pub fn parse(s: &str) -> TaskStatus {
        match s {
            "completed" => TaskStatus::Completed,
            "flaky" => TaskStatus::Flaky,
            "failed" => TaskStatus::Failed,
            "skipped" => TaskStatus::Skipped,
            _ => TaskStatus::Error,
        }
    }

    #[must_use]
    pub fn is_passing(&self) -> bool {
        matches!(
            self,
            TaskStatus::Completed | TaskStatus::Flaky | TaskStatus::Skipped
        )
    }

    #[must_use]
    pub fn is_blocking(&self) -> bool {
        matches!(self, TaskStatus::Failed | TaskStatus::Error)
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One execution attempt of a task.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttemptRow {
    pub attempt_no: u32,
    pub status: TaskStatus,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
}

/// Final per-task row as stored and reported.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskResultRow {
    pub task_id: String,
    pub status: TaskStatus,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fingerprint: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub skip_reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attempts: Option<Vec<AttemptRow>>,
    #[serde(default)]
    pub details: serde_json::Value,
}

/// A video the platform refused to play, with the surfaced reason.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RestrictedVideo {
    pub url: String,
    pub reason: String,
}

/// Everything harvested during the collection phase.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Recommendations {
    /// One URL per autoplay hop, in visit order.
    pub autoplay: Vec<String>,
    /// Sidebar recommendation URLs per hop (long mode only).
    pub sidebar: Vec<Vec<String>>,
    /// Preloaded reel URLs per hop (short mode only).
    pub preload: Vec<Vec<String>>,
    pub restricted: Vec<RestrictedVideo>,
}

impl Recommendations {
    #[must_use]
    pub fn sidebar_count(&self) -> usize {
        self.sidebar.iter().map(Vec::len).sum()
    }

    #[must_use]
    pub fn preload_count(&self) -> usize {
        self.preload.iter().map(Vec::len).sum()
    }
}

/// The per-task result document persisted by storage backends.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditReport {
    /// All training seeds except the last.
    pub training_ids: Vec<String>,
    /// The final seed the collection started from.
    pub seed_id: Option<String>,
    pub player_mode: PlayerMode,
    pub watch_time: WatchTime,
    pub recommendations: Recommendations,
}

impl AuditReport {
    /// Split a seed sequence into (training ids, seed id) the way reports
    /// record them: the last id is the seed, the rest are training.
    #[must_use]
    pub fn split_seeds(seed_ids: &[String]) -> (Vec<String>, Option<String>) {
        match seed_ids.split_last() {
            Some((seed, training)) => (training.to_vec(), Some(seed.clone())),
            None => (Vec::new(), None),
        }
    }
}

/// Stable task id for the `idx`-th task of a batch.
#[must_use]
pub fn task_id(idx: usize) -> String {
    format!("task_{idx:04}")
}
