//! Queue of collected video ids awaiting metadata harvesting. Ids are
//! sharded across a fixed number of processor buckets so parallel
//! harvesters never contend on the same keys.

use std::collections::BTreeSet;
use std::path::Path;
use std::sync::Mutex;

use crate::config::video_id_from_url;
use crate::model::{AuditReport, PlayerMode};

const LONG_URL_PREFIX: &str = "https://www.youtube.com/watch?v=";
const SHORT_URL_PREFIX: &str = "https://www.youtube.com/shorts/";

/// Bucket for `video_id` among `shards` processors.
///
/// The id bytes are read as a big-endian integer modulo the shard count,
/// computed with a rolling modulus. Stable across releases: harvesters own
/// fixed key ranges.
#[must_use]
pub fn shard_index(video_id: &str, shards: usize) -> usize {
    if shards == 0 {
        return 0;
    }
    let m = shards as u64;
    let mut acc: u64 = 0;
    for b in video_id.as_bytes() {
        acc = (acc * 256 + u64::from(*b)) % m;
    }
    acc as usize
}

#[derive(Debug, Default)]
struct Buckets {
    long: Vec<BTreeSet<String>>,
    short: Vec<BTreeSet<String>>,
}

/// Accumulates ids across tasks; flushed once per run.
pub struct MetadataQueue {
    shards: usize,
    buckets: Mutex<Buckets>,
}

impl MetadataQueue {
    #[must_use]
    pub fn new(shards: usize) -> Self {
        Self {
            shards,
            buckets: Mutex::new(Buckets {
                long: vec![BTreeSet::new(); shards],
                short: vec![BTreeSet::new(); shards],
            }),
        }
    }

    /// Extract every recommendation URL from a report and enqueue its id.
    pub fn enqueue_report(&self, report: &AuditReport) {
        if self.shards == 0 {
            return;
        }
        let recs = &report.recommendations;
        let urls = recs
            .autoplay
            .iter()
            .chain(recs.sidebar.iter().flatten())
            .chain(recs.preload.iter().flatten());

        let mut buckets = self.lock();
        for url in urls {
            let (mode, id) = if url.starts_with(SHORT_URL_PREFIX) {
                (PlayerMode::Short, video_id_from_url(url))
            } else if url.starts_with(LONG_URL_PREFIX) {
                (PlayerMode::Long, video_id_from_url(url))
            } else {
                continue;
            };
            let Some(id) = id else { continue };
            let shard = shard_index(&id, self.shards);
            match mode {
                PlayerMode::Long => buckets.long[shard].insert(id),
                PlayerMode::Short => buckets.short[shard].insert(id),
            };
        }
    }

    /// Pending ids per (shard, mode). Empty buckets are omitted.
    #[must_use]
    pub fn pending(&self) -> Vec<(usize, PlayerMode, Vec<String>)> {
        let buckets = self.lock();
        let mut out = Vec::new();
        for (idx, ids) in buckets.long.iter().enumerate() {
            if !ids.is_empty() {
                out.push((idx, PlayerMode::Long, ids.iter().cloned().collect()));
            }
        }
        for (idx, ids) in buckets.short.iter().enumerate() {
            if !ids.is_empty() {
                out.push((idx, PlayerMode::Short, ids.iter().cloned().collect()));
            }
        }
        out
    }

    /// Write one JSON file per non-empty bucket under `dir/queue/`.
    pub fn flush_to(&self, dir: &Path) -> anyhow::Result<usize> {
        let queue_dir = dir.join("queue");
        let pending = self.pending();
        if pending.is_empty() {
            return Ok(0);
        }
        std::fs::create_dir_all(&queue_dir)?;
        let mut written = 0;
        for (shard, mode, ids) in pending {
            let path = queue_dir.join(format!("{mode}_{shard}.json"));
            std::fs::write(&path, serde_json::to_string_pretty(&ids)?)?;
            written += 1;
        }
        Ok(written)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Buckets> {
        self.buckets.lock().expect("metadata queue mutex poisoned")
    }
}
