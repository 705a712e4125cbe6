//! `run.json`: the full per-run artifact with every task row.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::model::TaskResultRow;
use crate::report::RunArtifacts;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunDocument {
    pub run_id: i64,
    pub experiment: String,
    pub exit_code: i32,
    pub reason_code: String,
    #[serde(default)]
    pub order_seed: Option<u64>,
    pub results: Vec<TaskResultRow>,
}

pub fn write_run_json(
    artifacts: &RunArtifacts,
    exit_code: i32,
    reason_code: &str,
    path: &Path,
) -> anyhow::Result<()> {
    let doc = RunDocument {
        run_id: artifacts.run_id,
        experiment: artifacts.experiment.clone(),
        exit_code,
        reason_code: reason_code.to_string(),
        order_seed: artifacts.order_seed,
        results: artifacts.results.clone(),
    };
    let json = serde_json::to_string_pretty(&doc)?;
    std::fs::write(path, json)?;
    Ok(())
}
