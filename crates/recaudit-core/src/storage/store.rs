//! SQLite-backed run/result history. Powers `recaudit status` history and
//! the incremental fingerprint skip.

use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

use std::collections::HashSet;

use anyhow::Context as _;
use rusqlite::{params, Connection};

use crate::config::ExperimentConfig;
use crate::model::{TaskResultRow, TaskStatus};

fn now_rfc3339() -> String {
    chrono::Utc::now().to_rfc3339()
}

fn get_columns(conn: &Connection, table: &str) -> anyhow::Result<HashSet<String>> {
    let mut stmt = conn
        .prepare(&format!("PRAGMA table_info({table})"))
        .context("prepare pragma table_info")?;
    let rows = stmt.query_map([], |row| row.get::<_, String>(1))?;
    let mut out = HashSet::new();
    for r in rows {
        out.insert(r?);
    }
    Ok(out)
}

fn add_column_if_missing(
    conn: &Connection,
    cols: &HashSet<String>,
    table: &str,
    col: &str,
    ty: &str,
) -> anyhow::Result<()> {
    if !cols.contains(col) {
        conn.execute(&format!("ALTER TABLE {table} ADD COLUMN {col} {ty}"), [])
            .context("alter table add column")?;
    }
    Ok(())
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunRow {
    pub id: i64,
    pub experiment: String,
    pub started_at: String,
    pub status: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub passing: u64,
    pub blocking: u64,
    pub total: u64,
}

/// Cheaply cloneable handle; runner tasks share one connection behind a
/// mutex (writes are short and row-sized).
#[derive(Clone)]
pub struct Store {
    conn: Arc<Mutex<Connection>>,
}

impl Store {
    pub fn open(path: &Path) -> anyhow::Result<Self> {
        let conn = Connection::open(path)?;
        let store = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        store.init_schema()?;
        Ok(store)
    }

    pub fn memory() -> anyhow::Result<Self> {
        let conn = Connection::open_in_memory()?;
        let store = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        store.init_schema()?;
        Ok(store)
    }

    fn lock(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().expect("store mutex poisoned")
    }

    pub fn init_schema(&self) -> anyhow::Result<()> {
        let conn = self.lock();
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS runs (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                experiment TEXT NOT NULL,
                started_at TEXT NOT NULL,
                finished_at TEXT,
                status TEXT NOT NULL,
                config_json TEXT
            );
            CREATE TABLE IF NOT EXISTS results (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                run_id INTEGER NOT NULL REFERENCES runs(id),
                task_id TEXT NOT NULL,
                outcome TEXT NOT NULL,
                message TEXT NOT NULL,
                duration_ms INTEGER,
                fingerprint TEXT,
                skip_reason TEXT,
                attempts_json TEXT,
                created_at TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_results_fingerprint
                ON results(fingerprint);",
        )?;
        // Databases created before these columns existed migrate in place.
        let cols = get_columns(&conn, "results")?;
        add_column_if_missing(&conn, &cols, "results", "skip_reason", "TEXT")?;
        add_column_if_missing(&conn, &cols, "results", "attempts_json", "TEXT")?;
        Ok(())
    }

    pub fn create_run(&self, cfg: &ExperimentConfig) -> anyhow::Result<i64> {
        let config_json = serde_json::to_string(cfg)?;
        let conn = self.lock();
        conn.execute(
            "INSERT INTO runs(experiment, started_at, status, config_json)
             VALUES (?1, ?2, 'running', ?3)",
            params![cfg.name, now_rfc3339(), config_json],
        )?;
        Ok(conn.last_insert_rowid())
    }

    pub fn finalize_run(&self, run_id: i64, status: &str) -> anyhow::Result<()> {
        let conn = self.lock();
        conn.execute(
            "UPDATE runs SET status = ?1, finished_at = ?2 WHERE id = ?3",
            params![status, now_rfc3339(), run_id],
        )?;
        Ok(())
    }

    pub fn insert_result(&self, run_id: i64, row: &TaskResultRow) -> anyhow::Result<()> {
        let attempts_json = row
            .attempts
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;
        let conn = self.lock();
        conn.execute(
            "INSERT INTO results(run_id, task_id, outcome, message, duration_ms,
                                 fingerprint, skip_reason, attempts_json, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                run_id,
                row.task_id,
                row.status.as_str(),
                row.message,
                row.duration_ms.map(|d| d as i64),
                row.fingerprint,
                row.skip_reason,
                attempts_json,
                now_rfc3339(),
            ],
        )?;
        Ok(())
    }

    /// Most recent passing (non-skipped) result with this fingerprint, if
    /// any. Skipped rows are excluded so a chain of skips always points
    /// back at a run that actually collected data.
    pub fn last_passing_fingerprint(&self, fingerprint: &str) -> anyhow::Result<Option<i64>> {
        let conn = self.lock();
        let mut stmt = conn.prepare(
            "SELECT run_id FROM results
             WHERE fingerprint = ?1 AND outcome IN ('completed', 'flaky')
             ORDER BY id DESC LIMIT 1",
        )?;
        let mut rows = stmt.query(params![fingerprint])?;
        match rows.next()? {
            Some(row) => Ok(Some(row.get(0)?)),
            None => Ok(None),
        }
    }

    pub fn run_summary(&self, run_id: i64) -> anyhow::Result<RunSummary> {
        let conn = self.lock();
        let mut stmt =
            conn.prepare("SELECT outcome, COUNT(*) FROM results WHERE run_id = ?1 GROUP BY outcome")?;
        let rows = stmt.query_map(params![run_id], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
        })?;
        let mut summary = RunSummary::default();
        for row in rows {
            let (outcome, count) = row?;
            let count = count.max(0) as u64;
            let status = TaskStatus::parse(&outcome);
            if status.is_passing() {
                summary.passing += count;
            } else {
                summary.blocking += count;
            }
            summary.total += count;
        }
        Ok(summary)
    }

    pub fn recent_runs(&self, limit: u32) -> anyhow::Result<Vec<RunRow>> {
        let conn = self.lock();
        let mut stmt = conn.prepare(
            "SELECT id, experiment, started_at, status FROM runs
             ORDER BY id DESC LIMIT ?1",
        )?;
        let rows = stmt.query_map(params![limit], |row| {
            Ok(RunRow {
                id: row.get(0)?,
                experiment: row.get(1)?,
                started_at: row.get(2)?,
                status: row.get(3)?,
            })
        })?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::AttemptRow;

    fn config() -> ExperimentConfig {
        serde_yaml::from_str(
            r#"
name: store-test
tasks:
  - video_ids: ["abc"]
    mode: long
"#,
        )
        .unwrap()
    }

    fn row(task_id: &str, status: TaskStatus, fingerprint: Option<&str>) -> TaskResultRow {
        TaskResultRow {
            task_id: task_id.to_string(),
            status,
            message: "ok".into(),
            duration_ms: Some(12),
            fingerprint: fingerprint.map(str::to_string),
            skip_reason: None,
            attempts: Some(vec![AttemptRow {
                attempt_no: 1,
                status,
                message: "ok".into(),
                duration_ms: Some(12),
            }]),
            details: serde_json::json!({}),
        }
    }

    #[test]
    fn run_lifecycle_and_summary() {
        let store = Store::memory().unwrap();
        let run_id = store.create_run(&config()).unwrap();

        store
            .insert_result(run_id, &row("task_0000", TaskStatus::Completed, None))
            .unwrap();
        store
            .insert_result(run_id, &row("task_0001", TaskStatus::Failed, None))
            .unwrap();
        store
            .insert_result(run_id, &row("task_0002", TaskStatus::Skipped, None))
            .unwrap();
        store.finalize_run(run_id, "failed").unwrap();

        let summary = store.run_summary(run_id).unwrap();
        assert_eq!(summary.passing, 2);
        assert_eq!(summary.blocking, 1);
        assert_eq!(summary.total, 3);

        let runs = store.recent_runs(10).unwrap();
        assert_eq!(runs.len(), 1);
        assert_eq!(runs[0].experiment, "store-test");
        assert_eq!(runs[0].status, "failed");
    }

    #[test]
    fn fingerprint_lookup_ignores_skipped_and_failed() {
        let store = Store::memory().unwrap();
        let run_id = store.create_run(&config()).unwrap();

        store
            .insert_result(run_id, &row("t", TaskStatus::Failed, Some("fp1")))
            .unwrap();
        assert!(store.last_passing_fingerprint("fp1").unwrap().is_none());

        store
            .insert_result(run_id, &row("t", TaskStatus::Skipped, Some("fp1")))
            .unwrap();
        assert!(store.last_passing_fingerprint("fp1").unwrap().is_none());

        store
            .insert_result(run_id, &row("t", TaskStatus::Flaky, Some("fp1")))
            .unwrap();
        assert_eq!(store.last_passing_fingerprint("fp1").unwrap(), Some(run_id));
        assert!(store.last_passing_fingerprint("fp2").unwrap().is_none());
    }

    #[test]
    fn init_schema_is_idempotent() {
        let store = Store::memory().unwrap();
        store.init_schema().unwrap();
        store.init_schema().unwrap();
    }

    #[test]
    fn init_schema_migrates_old_result_tables() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("old.db");
        {
            let conn = Connection::open(&path).unwrap();
            conn.execute_batch(
                "CREATE TABLE runs (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    experiment TEXT NOT NULL,
                    started_at TEXT NOT NULL,
                    finished_at TEXT,
                    status TEXT NOT NULL,
                    config_json TEXT
                );
                CREATE TABLE results (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    run_id INTEGER NOT NULL,
                    task_id TEXT NOT NULL,
                    outcome TEXT NOT NULL,
                    message TEXT NOT NULL,
                    duration_ms INTEGER,
                    fingerprint TEXT,
                    created_at TEXT NOT NULL
                );",
            )
            .unwrap();
        }
        let store = Store::open(&path).unwrap();
        let run_id = store.create_run(&config()).unwrap();
        store
            .insert_result(run_id, &row("t", TaskStatus::Completed, Some("fp")))
            .unwrap();
        assert_eq!(store.last_passing_fingerprint("fp").unwrap(), Some(run_id));
    }

    #[test]
    fn open_persists_across_handles() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("history.db");
        {
            let store = Store::open(&path).unwrap();
            let run_id = store.create_run(&config()).unwrap();
            store.finalize_run(run_id, "passed").unwrap();
        }
        let store = Store::open(&path).unwrap();
        assert_eq!(store.recent_runs(10).unwrap().len(), 1);
    }
}
