use std::path::{Path, PathBuf};
use std::sync::Arc;

use recaudit_core::driver::{chrome_factory, SessionOptions};
use recaudit_core::engine::BatchRunner;
use recaudit_core::errors::RunError;
use recaudit_core::model::task_id;
use recaudit_core::queue::MetadataQueue;
use recaudit_core::report::console::{default_progress_sink, print_run_footer, print_summary};
use recaudit_core::report::json::write_run_json;
use recaudit_core::report::summary::{write_summary, Summary};
use recaudit_core::status::StatusTracker;
use recaudit_core::storage::{FileStorage, Store};
use recaudit_core::{load_config, ExperimentConfig};

use crate::cli::args::RunArgs;
use crate::exit_codes::{decide_run_outcome, ReasonCode, RunOutcome, SUCCESS};

fn write_error_artifacts(reason: ReasonCode, msg: String) -> anyhow::Result<i32> {
    let outcome = RunOutcome::from_reason(reason, Some(msg.clone()));
    eprintln!("error: {msg}");
    let summary = Summary::new(
        outcome.exit_code,
        outcome.reason.as_str(),
        outcome.message.clone(),
    );
    if let Err(e) = write_summary(&summary, Path::new("summary.json")) {
        eprintln!("WARNING: failed to write summary.json: {e}");
    }
    Ok(outcome.exit_code)
}

fn apply_overrides(cfg: &mut ExperimentConfig, args: &RunArgs) {
    if let Some(dir) = &args.output_dir {
        cfg.settings.output_dir = dir.clone();
    }
    if let Some(retries) = args.retries {
        cfg.settings.retries = retries;
    }
    if args.no_cache {
        cfg.settings.cache = false;
    }
    if let Some(url) = &args.webdriver_url {
        cfg.settings.webdriver_url = url.clone();
    }
}

pub(crate) async fn run(args: RunArgs) -> anyhow::Result<i32> {
    let run_json_path = PathBuf::from("run.json");

    let mut cfg = match load_config(&args.config) {
        Ok(c) => c,
        Err(e) => {
            let run_err = RunError::from_anyhow(&e);
            return write_error_artifacts(ReasonCode::from_run_error(&run_err), run_err.message);
        }
    };
    apply_overrides(&mut cfg, &args);

    let diags = cfg.validate();
    for d in &diags {
        eprintln!("{d}");
    }
    if diags.iter().any(|d| d.is_error()) {
        return write_error_artifacts(ReasonCode::ECfgParse, "config validation failed".into());
    }

    if args.dry_run {
        println!("experiment: {}", cfg.name);
        println!("tasks: {}", cfg.tasks.len());
        for (idx, task) in cfg.tasks.iter().enumerate() {
            println!(
                "  {} mode={} seeds={}",
                task_id(idx),
                task.mode,
                task.video_ids.join(",")
            );
        }
        return Ok(SUCCESS);
    }

    let exp_dir = match cfg.ensure_layout() {
        Ok(d) => d,
        Err(e) => {
            return write_error_artifacts(
                ReasonCode::EInfra,
                format!("failed to create experiment directory: {e}"),
            )
        }
    };

    let store = match Store::open(&args.db) {
        Ok(s) => s,
        Err(e) => {
            return write_error_artifacts(ReasonCode::EInfra, format!("failed to open db: {e}"))
        }
    };
    let status = Arc::new(StatusTracker::new(&cfg.name, &exp_dir)?);
    let storage = Arc::new(FileStorage::new(&exp_dir)?);
    let drivers = chrome_factory(SessionOptions::from_settings(&cfg.settings));

    let mut runner = BatchRunner::new(
        Arc::new(cfg.clone()),
        store,
        storage,
        status.clone(),
        drivers,
    );
    if args.shards > 0 {
        runner = runner.with_queue(Arc::new(MetadataQueue::new(args.shards)));
    }

    let total = cfg.tasks.len();
    if total > 0 {
        eprintln!("Running {total} tasks...");
    }
    let progress = default_progress_sink(total);
    let artifacts = match runner.run(progress).await {
        Ok(a) => a,
        Err(e) => {
            let msg = format!("batch run failed: {e}");
            if let Err(se) = status.fail(&msg) {
                tracing::warn!(error = %se, "status update failed");
            }
            return write_error_artifacts(ReasonCode::EInfra, msg);
        }
    };

    let outcome = decide_run_outcome(&artifacts.results, args.strict);
    write_run_json(
        &artifacts,
        outcome.exit_code,
        outcome.reason.as_str(),
        &run_json_path,
    )?;

    let passed = artifacts
        .results
        .iter()
        .filter(|r| r.status.is_passing())
        .count();
    let failed = artifacts
        .results
        .iter()
        .filter(|r| r.status.is_blocking())
        .count();
    let summary = Summary::new(
        outcome.exit_code,
        outcome.reason.as_str(),
        outcome.message.clone(),
    )
    .with_results(passed, failed, artifacts.results.len())
    .with_order_seed(artifacts.order_seed);
    write_summary(&summary, Path::new("summary.json"))?;

    print_summary(&artifacts.results);
    print_run_footer(artifacts.order_seed);

    Ok(outcome.exit_code)
}
