//! End-to-end batch run over scripted drivers: config in, artifacts,
//! status file, result documents, history rows and queue files out.

use std::sync::Arc;

use recaudit_core::driver::fake::FakeDriver;
use recaudit_core::driver::{DriverFactory, PlatformDriver};
use recaudit_core::engine::BatchRunner;
use recaudit_core::model::{PlayerMode, TaskStatus};
use recaudit_core::queue::MetadataQueue;
use recaudit_core::status::StatusTracker;
use recaudit_core::storage::{FileStorage, StorageBackend, Store};
use recaudit_core::ExperimentConfig;

fn factory() -> DriverFactory {
    Arc::new(|| {
        Box::new(
            FakeDriver::new()
                .with_sidebar(vec![
                    "https://www.youtube.com/watch?v=side1".to_string(),
                    "https://www.youtube.com/watch?v=side2".to_string(),
                ])
                .with_preload(vec!["https://www.youtube.com/shorts/pre1".to_string()]),
        ) as Box<dyn PlatformDriver>
    })
}

fn config(dir: &std::path::Path) -> ExperimentConfig {
    let mut cfg: ExperimentConfig = serde_yaml::from_str(
        r#"
name: integration
tasks:
  - video_ids: ["longseed1", "longseed2"]
    mode: long
  - video_ids: ["shortseed"]
    mode: short
settings:
  hops: 3
  parallel: 2
  sleep_range: [0, 0]
  retries: 1
  cache: false
"#,
    )
    .unwrap();
    cfg.settings.output_dir = dir.to_path_buf();
    cfg
}

#[tokio::test]
async fn full_batch_produces_all_artifacts() {
    let dir = tempfile::tempdir().unwrap();
    let cfg = config(dir.path());
    let exp_dir = cfg.ensure_layout().unwrap();

    let store = Store::open(&dir.path().join("history.db")).unwrap();
    let status = Arc::new(StatusTracker::new(&cfg.name, &exp_dir).unwrap());
    let storage = Arc::new(FileStorage::new(&exp_dir).unwrap());
    let queue = Arc::new(MetadataQueue::new(4));

    let runner = BatchRunner::new(
        Arc::new(cfg.clone()),
        store.clone(),
        storage.clone(),
        status,
        factory(),
    )
    .with_queue(queue);

    let artifacts = runner.run(None).await.unwrap();

    // rows: both tasks completed, deterministic order
    assert_eq!(artifacts.results.len(), 2);
    assert!(artifacts
        .results
        .iter()
        .all(|r| r.status == TaskStatus::Completed));
    assert_eq!(artifacts.results[0].task_id, "task_0000");
    assert_eq!(artifacts.results[1].task_id, "task_0001");

    // result documents: mode-specific surfaces collected per hop
    let long_report = storage.load("task_0000").await.unwrap().unwrap();
    assert_eq!(long_report.player_mode, PlayerMode::Long);
    assert_eq!(long_report.training_ids, vec!["longseed1".to_string()]);
    assert_eq!(long_report.seed_id.as_deref(), Some("longseed2"));
    assert_eq!(long_report.recommendations.autoplay.len(), 3);
    assert_eq!(long_report.recommendations.sidebar.len(), 3);
    assert!(long_report.recommendations.preload.is_empty());

    let short_report = storage.load("task_0001").await.unwrap().unwrap();
    assert_eq!(short_report.player_mode, PlayerMode::Short);
    assert_eq!(short_report.recommendations.preload.len(), 3);
    assert!(short_report.recommendations.sidebar.is_empty());

    // status file: completed with counters
    let state = StatusTracker::load(&exp_dir.join("status.json")).unwrap();
    assert_eq!(state.status, "completed");
    assert_eq!(state.batch_progress.total_tasks, 2);
    assert_eq!(state.batch_progress.completed_tasks, 2);
    assert_eq!(state.health.successful_runs, 2);
    // 3 autoplay hops per task
    assert_eq!(state.data_collected.autoplay_paths, 6);
    assert_eq!(state.data_collected.sidebar_recs, 6);
    assert_eq!(state.data_collected.preload_recs, 3);

    // history store: run finalized as passed with both rows
    let runs = store.recent_runs(5).unwrap();
    assert_eq!(runs.len(), 1);
    assert_eq!(runs[0].status, "passed");
    let summary = store.run_summary(artifacts.run_id).unwrap();
    assert_eq!(summary.passing, 2);
    assert_eq!(summary.blocking, 0);

    // metadata queue flushed under the experiment dir
    let queue_dir = exp_dir.join("queue");
    assert!(queue_dir.exists());
    let files: Vec<_> = std::fs::read_dir(&queue_dir)
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    assert!(!files.is_empty());
    assert!(files.iter().any(|f| f.starts_with("long_")));
}

#[tokio::test]
async fn failed_batch_finalizes_as_failed() {
    let dir = tempfile::tempdir().unwrap();
    let mut cfg = config(dir.path());
    cfg.settings.retries = 1;
    let exp_dir = cfg.ensure_layout().unwrap();

    let store = Store::memory().unwrap();
    let status = Arc::new(StatusTracker::new(&cfg.name, &exp_dir).unwrap());
    let storage = Arc::new(FileStorage::new(&exp_dir).unwrap());
    let failing: DriverFactory = Arc::new(|| {
        Box::new(FakeDriver::new().with_signin_restriction()) as Box<dyn PlatformDriver>
    });

    let runner = BatchRunner::new(Arc::new(cfg), store.clone(), storage, status, failing);
    let artifacts = runner.run(None).await.unwrap();

    assert!(artifacts
        .results
        .iter()
        .all(|r| r.status == TaskStatus::Failed));
    let runs = store.recent_runs(1).unwrap();
    assert_eq!(runs[0].status, "failed");
}
