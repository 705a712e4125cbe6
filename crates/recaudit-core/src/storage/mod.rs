//! Result persistence: pluggable document backends plus a SQLite history
//! store used for run bookkeeping and incremental skip.

pub mod store;

pub use store::Store;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::model::AuditReport;

/// Metadata saved alongside each result document.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResultMeta {
    pub experiment_id: String,
    pub task_index: usize,
    pub mode: String,
    pub seed_ids: Vec<String>,
}

#[derive(Debug, Serialize, Deserialize)]
struct ResultEnvelope {
    task_id: String,
    result: AuditReport,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    metadata: Option<ResultMeta>,
}

/// Destination for finished audit reports. Remote backends (object stores,
/// realtime databases) plug in here.
#[async_trait]
pub trait StorageBackend: Send + Sync {
    async fn save(
        &self,
        task_id: &str,
        report: &AuditReport,
        meta: Option<ResultMeta>,
    ) -> anyhow::Result<()>;

    async fn load(&self, task_id: &str) -> anyhow::Result<Option<AuditReport>>;

    async fn list(&self) -> anyhow::Result<Vec<String>>;
}

/// Default backend: one JSON document per task under `results/`.
pub struct FileStorage {
    results_dir: PathBuf,
}

impl FileStorage {
    pub fn new(experiment_dir: &Path) -> std::io::Result<Self> {
        let results_dir = experiment_dir.join("results");
        std::fs::create_dir_all(&results_dir)?;
        Ok(Self { results_dir })
    }

    fn path_for(&self, task_id: &str) -> PathBuf {
        self.results_dir.join(format!("{task_id}.json"))
    }
}

#[async_trait]
impl StorageBackend for FileStorage {
    async fn save(
        &self,
        task_id: &str,
        report: &AuditReport,
        meta: Option<ResultMeta>,
    ) -> anyhow::Result<()> {
        let envelope = ResultEnvelope {
            task_id: task_id.to_string(),
            result: report.clone(),
            metadata: meta,
        };
        let json = serde_json::to_string_pretty(&envelope)?;
        tokio::fs::write(self.path_for(task_id), json).await?;
        Ok(())
    }

    async fn load(&self, task_id: &str) -> anyhow::Result<Option<AuditReport>> {
        let path = self.path_for(task_id);
        let text = match tokio::fs::read_to_string(&path).await {
            Ok(t) => t,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let envelope: ResultEnvelope = serde_json::from_str(&text)?;
        Ok(Some(envelope.result))
    }

    async fn list(&self) -> anyhow::Result<Vec<String>> {
        let mut out = Vec::new();
        let mut entries = tokio::fs::read_dir(&self.results_dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) == Some("json") {
                if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                    out.push(stem.to_string());
                }
            }
        }
        out.sort();
        Ok(out)
    }
}

/// Fan-out to several backends; reads hit the first backend that answers.
pub struct CompositeStorage {
    backends: Vec<Arc<dyn StorageBackend>>,
}

impl CompositeStorage {
    #[must_use]
    pub fn new(backends: Vec<Arc<dyn StorageBackend>>) -> Self {
        Self { backends }
    }
}

#[async_trait]
impl StorageBackend for CompositeStorage {
    async fn save(
        &self,
        task_id: &str,
        report: &AuditReport,
        meta: Option<ResultMeta>,
    ) -> anyhow::Result<()> {
        for backend in &self.backends {
            backend.save(task_id, report, meta.clone()).await?;
        }
        Ok(())
    }

    async fn load(&self, task_id: &str) -> anyhow::Result<Option<AuditReport>> {
        for backend in &self.backends {
            if let Some(report) = backend.load(task_id).await? {
                return Ok(Some(report));
            }
        }
        Ok(None)
    }

    async fn list(&self) -> anyhow::Result<Vec<String>> {
        match self.backends.first() {
            Some(b) => b.list().await,
            None => Ok(Vec::new()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{PlayerMode, Recommendations, WatchTime};

    fn report() -> AuditReport {
        AuditReport {
            training_ids: vec!["a".into()],
            seed_id: Some("b".into()),
            player_mode: PlayerMode::Long,
            watch_time: WatchTime::Seconds(10),
            recommendations: Recommendations {
                autoplay: vec!["https://www.youtube.com/watch?v=c".into()],
                sidebar: vec![vec!["https://www.youtube.com/watch?v=d".into()]],
                preload: vec![],
                restricted: vec![],
            },
        }
    }

    #[tokio::test]
    async fn file_storage_roundtrip_and_listing() {
        let dir = tempfile::tempdir().unwrap();
        let storage = FileStorage::new(dir.path()).unwrap();

        storage.save("task_0001", &report(), None).await.unwrap();
        storage
            .save(
                "task_0000",
                &report(),
                Some(ResultMeta {
                    experiment_id: "exp".into(),
                    task_index: 0,
                    mode: "long".into(),
                    seed_ids: vec!["a".into(), "b".into()],
                }),
            )
            .await
            .unwrap();

        let listed = storage.list().await.unwrap();
        assert_eq!(listed, vec!["task_0000", "task_0001"]);

        let loaded = storage.load("task_0000").await.unwrap().unwrap();
        assert_eq!(loaded.seed_id.as_deref(), Some("b"));
        assert!(storage.load("task_9999").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn composite_storage_writes_everywhere_reads_first_hit() {
        let dir_a = tempfile::tempdir().unwrap();
        let dir_b = tempfile::tempdir().unwrap();
        let a = Arc::new(FileStorage::new(dir_a.path()).unwrap());
        let b = Arc::new(FileStorage::new(dir_b.path()).unwrap());
        let composite = CompositeStorage::new(vec![
            a.clone() as Arc<dyn StorageBackend>,
            b.clone() as Arc<dyn StorageBackend>,
        ]);

        composite.save("task_0000", &report(), None).await.unwrap();
        assert!(a.load("task_0000").await.unwrap().is_some());
        assert!(b.load("task_0000").await.unwrap().is_some());

        // present only in the second backend
        b.save("task_0001", &report(), None).await.unwrap();
        assert!(composite.load("task_0001").await.unwrap().is_some());
    }
}
