//! Experiment configuration: YAML loading, defaults, validation, and the
//! on-disk experiment directory layout.

pub mod pairs;

pub use pairs::{video_id_from_url, PairMode};

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::errors::diagnostic::{codes, Diagnostic};
use crate::errors::RunError;
use crate::model::{ExperimentTask, WatchTime};

/// Ad blocking for driver sessions. `false` disables it, `true` loads the
/// bundled extension directory, a string loads an unpacked extension from
/// that path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AdblockSetting {
    Flag(bool),
    Extension(PathBuf),
}

impl Default for AdblockSetting {
    fn default() -> Self {
        AdblockSetting::Flag(false)
    }
}

impl AdblockSetting {
    /// Path of the unpacked extension to load, if ad blocking is on.
    #[must_use]
    pub fn extension_path(&self) -> Option<PathBuf> {
        match self {
            AdblockSetting::Flag(false) => None,
            AdblockSetting::Flag(true) => Some(PathBuf::from("adblock_extension")),
            AdblockSetting::Extension(p) => Some(p.clone()),
        }
    }
}

/// Platform account for logged-in audits.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub watch_time: WatchTime,
    pub hops: u32,
    pub parallel: usize,
    /// Random pacing sleep (min, max) seconds between task launches.
    pub sleep_range: (u64, u64),
    /// Total attempts per task, including the first.
    pub retries: u32,
    pub headless: bool,
    pub incognito: bool,
    pub adblock: AdblockSetting,
    pub output_dir: PathBuf,
    pub webdriver_url: String,
    /// Per driver call timeout.
    pub timeout_seconds: u64,
    /// Seed for deterministic task order shuffling. None keeps config order.
    pub seed: Option<u64>,
    /// Incremental skip of tasks with a passing fingerprint match.
    pub cache: bool,
    pub account: Option<Account>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            watch_time: WatchTime::default(),
            hops: 15,
            parallel: 2,
            sleep_range: (300, 900),
            retries: 3,
            headless: true,
            incognito: false,
            adblock: AdblockSetting::default(),
            output_dir: PathBuf::from("experiments"),
            webdriver_url: "http://localhost:9515".to_string(),
            timeout_seconds: 30,
            seed: None,
            cache: true,
            account: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExperimentConfig {
    pub name: String,
    #[serde(default)]
    pub tasks: Vec<ExperimentTask>,
    #[serde(default)]
    pub settings: Settings,
}

impl ExperimentConfig {
    /// Directory all artifacts of this experiment live under.
    #[must_use]
    pub fn experiment_dir(&self) -> PathBuf {
        self.settings.output_dir.join(&self.name)
    }

    #[must_use]
    pub fn status_path(&self) -> PathBuf {
        self.experiment_dir().join("status.json")
    }

    /// Create the experiment directory and its `results/` subdirectory.
    pub fn ensure_layout(&self) -> std::io::Result<PathBuf> {
        let dir = self.experiment_dir();
        std::fs::create_dir_all(dir.join("results"))?;
        Ok(dir)
    }

    pub fn to_yaml(&self, path: &Path) -> anyhow::Result<()> {
        let text = serde_yaml::to_string(self)?;
        std::fs::write(path, text)?;
        Ok(())
    }

    /// Structural validation. Parse errors are reported by [`load_config`];
    /// this checks the values a well-formed file can still get wrong.
    #[must_use]
    pub fn validate(&self) -> Vec<Diagnostic> {
        let mut diags = Vec::new();

        if self.name.trim().is_empty() {
            diags.push(
                Diagnostic::error(codes::E_CFG_INVALID, "experiment name must not be empty")
                    .with_fix_step("set a non-empty `name` in the config"),
            );
        }
        if self.tasks.is_empty() {
            diags.push(
                Diagnostic::error(codes::E_CFG_INVALID, "no tasks defined")
                    .with_fix_step("add at least one entry under `tasks`"),
            );
        }
        for (idx, task) in self.tasks.iter().enumerate() {
            if task.video_ids.is_empty() {
                diags.push(
                    Diagnostic::error(
                        codes::E_CFG_INVALID,
                        format!("task {idx} has no training video ids"),
                    )
                    .with_context(serde_json::json!({ "task_index": idx })),
                );
            }
            if task.video_ids.iter().any(|id| id.trim().is_empty()) {
                diags.push(
                    Diagnostic::error(
                        codes::E_CFG_INVALID,
                        format!("task {idx} contains an empty video id"),
                    )
                    .with_context(serde_json::json!({ "task_index": idx })),
                );
            }
        }

        let s = &self.settings;
        if s.parallel == 0 {
            diags.push(
                Diagnostic::error(codes::E_CFG_INVALID, "settings.parallel must be at least 1")
                    .with_fix_step("set `settings.parallel` to 1 or more"),
            );
        }
        if s.retries == 0 {
            diags.push(
                Diagnostic::error(codes::E_CFG_INVALID, "settings.retries must be at least 1")
                    .with_fix_step("retries counts total attempts; 1 means no re-runs"),
            );
        }
        if s.hops == 0 {
            diags.push(Diagnostic::error(
                codes::E_CFG_INVALID,
                "settings.hops must be at least 1",
            ));
        }
        if s.sleep_range.0 > s.sleep_range.1 {
            diags.push(Diagnostic::error(
                codes::E_CFG_INVALID,
                format!(
                    "settings.sleep_range min {} exceeds max {}",
                    s.sleep_range.0, s.sleep_range.1
                ),
            ));
        }
        if let WatchTime::Fraction(f) = s.watch_time {
            if !(f.is_finite() && f > 0.0 && f <= 1.0) {
                diags.push(
                    Diagnostic::error(
                        codes::E_CFG_INVALID,
                        format!("fractional watch_time must be in (0, 1], got {f}"),
                    )
                    .with_fix_step("use an integer for absolute seconds"),
                );
            }
        }
        if s.sleep_range.1 == 0 {
            diags.push(Diagnostic::warning(
                codes::W_CFG_SUSPECT_VALUE,
                "pacing is disabled (sleep_range is 0); the platform may rate limit the batch",
            ));
        }

        diags
    }
}

/// Load and parse an experiment config from YAML.
pub fn load_config(path: &Path) -> anyhow::Result<ExperimentConfig> {
    let text = std::fs::read_to_string(path).map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            anyhow::Error::new(RunError::missing_config(
                path.display().to_string(),
                e.to_string(),
            ))
        } else {
            anyhow::Error::new(e)
        }
    })?;
    let cfg: ExperimentConfig = serde_yaml::from_str(&text).map_err(|e| {
        anyhow::Error::new(RunError::config_parse(
            Some(path.display().to_string()),
            format!("invalid config: {e}"),
        ))
    })?;
    Ok(cfg)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::RunErrorKind;
    use crate::model::PlayerMode;

    fn minimal_yaml() -> &'static str {
        r#"
name: pilot
tasks:
  - video_ids: ["abc123"]
    mode: long
  - video_ids: ["xyz789"]
    mode: short
"#
    }

    #[test]
    fn parses_minimal_config_with_defaults() {
        let cfg: ExperimentConfig = serde_yaml::from_str(minimal_yaml()).unwrap();
        assert_eq!(cfg.name, "pilot");
        assert_eq!(cfg.tasks.len(), 2);
        assert_eq!(cfg.tasks[0].mode, PlayerMode::Long);
        assert_eq!(cfg.settings.hops, 15);
        assert_eq!(cfg.settings.parallel, 2);
        assert_eq!(cfg.settings.sleep_range, (300, 900));
        assert!(cfg.settings.headless);
        assert!(cfg.settings.cache);
        assert_eq!(cfg.settings.adblock, AdblockSetting::Flag(false));
        assert!(cfg.validate().iter().all(|d| !d.is_error()));
    }

    #[test]
    fn parses_settings_overrides() {
        let yaml = r#"
name: pilot
tasks:
  - video_ids: ["abc123"]
    mode: long
settings:
  watch_time: 0.5
  hops: 3
  parallel: 4
  sleep_range: [1, 2]
  adblock: "ublock/unpacked"
  account:
    username: probe@example.com
    password: hunter2
"#;
        let cfg: ExperimentConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(cfg.settings.watch_time, WatchTime::Fraction(0.5));
        assert_eq!(cfg.settings.hops, 3);
        assert_eq!(
            cfg.settings.adblock.extension_path(),
            Some(PathBuf::from("ublock/unpacked"))
        );
        assert_eq!(
            cfg.settings.account.as_ref().map(|a| a.username.as_str()),
            Some("probe@example.com")
        );
    }

    #[test]
    fn validate_flags_bad_values() {
        let mut cfg: ExperimentConfig = serde_yaml::from_str(minimal_yaml()).unwrap();
        cfg.name = " ".into();
        cfg.tasks[0].video_ids.clear();
        cfg.settings.parallel = 0;
        cfg.settings.sleep_range = (10, 1);
        cfg.settings.watch_time = WatchTime::Fraction(1.5);
        let diags = cfg.validate();
        let errors: Vec<_> = diags.iter().filter(|d| d.is_error()).collect();
        assert_eq!(errors.len(), 5);
    }

    #[test]
    fn experiment_dir_joins_output_dir_and_name() {
        let cfg: ExperimentConfig = serde_yaml::from_str(minimal_yaml()).unwrap();
        assert_eq!(cfg.experiment_dir(), PathBuf::from("experiments/pilot"));
        assert_eq!(
            cfg.status_path(),
            PathBuf::from("experiments/pilot/status.json")
        );
    }

    #[test]
    fn load_config_maps_missing_file() {
        let err = load_config(Path::new("/nonexistent/recaudit.yaml")).unwrap_err();
        let run = RunError::from_anyhow(&err);
        assert_eq!(run.kind, RunErrorKind::MissingConfig);
    }

    #[test]
    fn load_config_maps_parse_errors() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.yaml");
        std::fs::write(&path, "name: [unclosed").unwrap();
        let err = load_config(&path).unwrap_err();
        let run = RunError::from_anyhow(&err);
        assert_eq!(run.kind, RunErrorKind::ConfigParse);
    }

    #[test]
    fn yaml_roundtrip_preserves_tasks() {
        let dir = tempfile::tempdir().unwrap();
        let cfg: ExperimentConfig = serde_yaml::from_str(minimal_yaml()).unwrap();
        let path = dir.path().join("out.yaml");
        cfg.to_yaml(&path).unwrap();
        let back = load_config(&path).unwrap();
        assert_eq!(back, cfg);
    }
}
