//! Legacy pair-list import. Historical experiments were driven by JSON
//! files of long/short video pairs, grouped so each group trains one
//! profile. Each pair expands to tasks according to the chosen mode.

use std::path::Path;

use serde::Deserialize;

use crate::errors::RunError;
use crate::model::{ExperimentTask, PlayerMode};

use super::ExperimentConfig;

/// Which side(s) of each pair to turn into tasks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PairMode {
    Paired,
    Long,
    Short,
}

impl std::str::FromStr for PairMode {
    type Err = RunError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "paired" => Ok(PairMode::Paired),
            "long" => Ok(PairMode::Long),
            "short" => Ok(PairMode::Short),
            other => Err(RunError::invalid_args(format!(
                "unknown pair mode '{other}', expected paired|long|short"
            ))),
        }
    }
}

/// One entry of a pair group. Values are full watch URLs or bare ids.
#[derive(Debug, Deserialize)]
struct PairEntry {
    #[serde(default)]
    long: Option<String>,
    #[serde(default)]
    short: Option<String>,
}

/// Recover a video id from a watch URL, a shorts URL, or a bare id.
///
/// Watch URLs keep everything between `watch?v=` and the next `&`; other
/// forms take the last path segment. Empty results map to `None`.
#[must_use]
pub fn video_id_from_url(input: &str) -> Option<String> {
    let id = if let Some(rest) = input.split("watch?v=").nth(1) {
        rest.split('&').next().unwrap_or_default()
    } else {
        input.rsplit('/').next().unwrap_or_default()
    };
    let id = id.trim();
    if id.is_empty() {
        None
    } else {
        Some(id.to_string())
    }
}

impl ExperimentConfig {
    /// Build a config from a legacy pair-list JSON file.
    ///
    /// The file holds groups of `{"long": ..., "short": ...}` entries; all
    /// long ids of a group form one long task's training sequence, likewise
    /// for short. The experiment name defaults to the file stem.
    pub fn from_pairs_json(path: &Path, mode: PairMode) -> anyhow::Result<ExperimentConfig> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            anyhow::Error::new(RunError::missing_config(
                path.display().to_string(),
                e.to_string(),
            ))
        })?;
        let groups: Vec<Vec<PairEntry>> = serde_json::from_str(&text).map_err(|e| {
            anyhow::Error::new(RunError::config_parse(
                Some(path.display().to_string()),
                format!("invalid pair list: {e}"),
            ))
        })?;

        let mut tasks = Vec::new();
        for group in &groups {
            let long_ids: Vec<String> = group
                .iter()
                .filter_map(|e| e.long.as_deref())
                .filter_map(video_id_from_url)
                .collect();
            let short_ids: Vec<String> = group
                .iter()
                .filter_map(|e| e.short.as_deref())
                .filter_map(video_id_from_url)
                .collect();

            if matches!(mode, PairMode::Paired | PairMode::Long) && !long_ids.is_empty() {
                tasks.push(ExperimentTask {
                    video_ids: long_ids,
                    mode: PlayerMode::Long,
                    seed_id: None,
                });
            }
            if matches!(mode, PairMode::Paired | PairMode::Short) && !short_ids.is_empty() {
                tasks.push(ExperimentTask {
                    video_ids: short_ids,
                    mode: PlayerMode::Short,
                    seed_id: None,
                });
            }
        }

        let name = path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("imported")
            .to_string();

        Ok(ExperimentConfig {
            name,
            tasks,
            settings: Default::default(),
        })
    }
}
