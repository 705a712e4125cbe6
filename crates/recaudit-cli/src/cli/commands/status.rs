use recaudit_core::status::{StatusState, StatusTracker};
use recaudit_core::storage::Store;

use crate::cli::args::{OutputFormat, StatusArgs};
use crate::exit_codes::{ReasonCode, SUCCESS};

/// Human view of a status file. Pure, so the watch loop reuses it.
pub(crate) fn render_status(state: &StatusState) -> String {
    let mut out = String::new();
    let bp = &state.batch_progress;
    out.push_str(&format!(
        "experiment: {}\nstatus: {} ({}s elapsed)\nprogress: {}/{} completed, {} failed\n",
        state.experiment_id,
        state.status,
        state.elapsed_seconds,
        bp.completed_tasks,
        bp.total_tasks,
        bp.failed_tasks,
    ));
    out.push_str(&format!(
        "health: {} ok, {} failed, {} retries, {} restricted\n",
        state.health.successful_runs,
        state.health.failed_runs,
        state.health.retries,
        state.health.restricted_videos,
    ));
    out.push_str(&format!(
        "collected: {} autoplay, {} sidebar, {} preload\n",
        state.data_collected.autoplay_paths,
        state.data_collected.sidebar_recs,
        state.data_collected.preload_recs,
    ));
    for (task_id, modes) in &state.current_tasks {
        for (mode, p) in modes {
            let (cur, tot) = match p.phase {
                recaudit_core::model::TaskPhase::Collection => {
                    (p.collection_progress.current, p.collection_progress.total)
                }
                _ => (p.training_progress.current, p.training_progress.total),
            };
            out.push_str(&format!(
                "  {task_id} [{mode}] {:?} {}/{} ({})\n",
                p.phase, cur, tot, p.video_id
            ));
        }
    }
    if let Some(err) = &state.error {
        out.push_str(&format!("error: {err}\n"));
    }
    out
}

pub(crate) fn run(args: StatusArgs) -> anyhow::Result<i32> {
    let status_path = args.experiment_dir.join("status.json");
    let mut found = false;

    if status_path.exists() {
        found = true;
        let state = StatusTracker::load(&status_path)?;
        match args.format {
            OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&state)?),
            OutputFormat::Text => print!("{}", render_status(&state)),
        }
    } else {
        eprintln!("no status file at {}", status_path.display());
    }

    if let Some(db) = &args.db {
        if db.exists() {
            found = true;
            let store = Store::open(db)?;
            let runs = store.recent_runs(10)?;
            if !runs.is_empty() && args.format == OutputFormat::Text {
                eprintln!("recent runs:");
                for run in runs {
                    let summary = store.run_summary(run.id)?;
                    eprintln!(
                        "  #{} {} {}: {} passing, {} blocking ({})",
                        run.id,
                        run.experiment,
                        run.status,
                        summary.passing,
                        summary.blocking,
                        run.started_at,
                    );
                }
            }
        }
    }

    if found {
        Ok(SUCCESS)
    } else {
        Ok(ReasonCode::ECfgNotFound.exit_code())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use recaudit_core::model::{PlayerMode, TaskPhase};
    use recaudit_core::status::{Counter, StatusTracker, TaskProgress};

    #[test]
    fn render_includes_progress_and_current_tasks() {
        let dir = tempfile::tempdir().unwrap();
        let tracker = StatusTracker::new("render-test", dir.path()).unwrap();
        tracker.start(3).unwrap();
        tracker
            .update_current_task(
                0,
                "task_0000",
                TaskProgress {
                    video_id: "abc".into(),
                    mode: PlayerMode::Long,
                    phase: TaskPhase::Training,
                    training_progress: Counter {
                        current: 1,
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

        let rendered = render_status(&tracker.snapshot());
        assert!(rendered.contains("experiment: render-test"));
        assert!(rendered.contains("status: running"));
        assert!(rendered.contains("0/3 completed"));
        assert!(rendered.contains("task_0000 [long]"));
        assert!(rendered.contains("1/2"));
        assert!(rendered.contains("(abc)"));
    }
}
