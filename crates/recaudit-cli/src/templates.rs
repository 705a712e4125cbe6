//! Starter config scaffold written by `recaudit init`.

pub const STARTER_CONFIG: &str = r#"# recaudit experiment configuration
name: my-experiment

# Each task trains a fresh browser profile on its seed videos, then follows
# the autoplay chain and collects recommendations at every hop.
tasks:
  - video_ids: ["dQw4w9WgXcQ"]
    mode: long
  - video_ids: ["dQw4w9WgXcQ"]
    mode: short

settings:
  # Integer = seconds per video (capped at video length).
  # Fraction in (0, 1] = share of each video's length.
  watch_time: 10
  hops: 15
  parallel: 2
  # Random pause (seconds) between task launches.
  sleep_range: [300, 900]
  # Total attempts per task, including the first.
  retries: 3
  headless: true
  incognito: false
  # false | true (bundled extension dir) | path to an unpacked extension
  adblock: false
  output_dir: experiments
  webdriver_url: http://localhost:9515
  timeout_seconds: 30
  # Skip tasks whose fingerprint already has a passing result.
  cache: true
"#;

#[cfg(test)]
mod tests {
    use recaudit_core::ExperimentConfig;

    #[test]
    fn starter_config_parses_and_validates() {
        let cfg: ExperimentConfig = serde_yaml::from_str(super::STARTER_CONFIG).unwrap();
        assert_eq!(cfg.tasks.len(), 2);
        assert!(cfg.validate().iter().all(|d| !d.is_error()));
    }
}
