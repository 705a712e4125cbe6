//! Single-task audit lifecycle: train the profile on seed videos, then
//! follow the autoplay chain and harvest recommendations at each hop.

use crate::driver::{DriverError, PlatformDriver};
use crate::model::{AuditReport, PlayerMode, Recommendations, WatchTime};

use super::{AuditCallback, AuditEvent};

pub struct Auditor {
    driver: Box<dyn PlatformDriver>,
    mode: PlayerMode,
    watch_time: WatchTime,
    seed_ids: Vec<String>,
    recommendations: Recommendations,
    on_event: AuditCallback,
    /// Retry budget shared across the whole collection loop.
    err_attempts: u32,
}

impl Auditor {
    #[must_use]
    pub fn new(
        driver: Box<dyn PlatformDriver>,
        mode: PlayerMode,
        watch_time: WatchTime,
        on_event: AuditCallback,
    ) -> Self {
        Self {
            driver,
            mode,
            watch_time,
            seed_ids: Vec::new(),
            recommendations: Recommendations::default(),
            on_event,
            err_attempts: 5,
        }
    }

    pub async fn start(&mut self) -> Result<(), DriverError> {
        self.driver.start(self.mode, self.watch_time).await
    }

    pub async fn login(&mut self, username: &str, password: &str) -> Result<(), DriverError> {
        self.driver.login(username, password).await
    }

    /// Watch each seed in order. A seed that cannot be watched aborts the
    /// task; a partially trained profile would skew the collected chain.
    pub async fn train(&mut self, seed_ids: &[String]) -> Result<(), DriverError> {
        self.seed_ids = seed_ids.to_vec();
        let total = seed_ids.len() as u64;
        tracing::info!(total, mode = %self.mode, "training started");
        for (idx, vid) in seed_ids.iter().enumerate() {
            (self.on_event)(AuditEvent::TrainingProgress {
                current: idx as u64 + 1,
                total,
                video_id: vid.clone(),
            });
            self.driver.watch(vid).await?;
        }
        tracing::info!(total, "training done");
        Ok(())
    }

    /// Follow the autoplay chain for `hops` videos, harvesting the mode's
    /// recommendation surface at each hop.
    pub async fn collect(&mut self, hops: u32) -> Result<(), DriverError> {
        let mut remaining = hops;
        let mut budget = self.err_attempts;
        tracing::info!(hops, mode = %self.mode, "collection started");

        while remaining > 0 {
            (self.on_event)(AuditEvent::CollectionProgress {
                current: u64::from(hops - remaining + 1),
                total: u64::from(hops),
            });

            let url = match self.driver.advance().await {
                Ok(url) => url,
                Err(DriverError::Timeout(..)) if budget > 1 => {
                    budget -= 1;
                    tracing::warn!(budget, "autoplay did not advance, retrying");
                    continue;
                }
                Err(e) => return Err(e),
            };

            if let Some(restricted) = self.driver.check_restricted().await? {
                (self.on_event)(AuditEvent::Restricted {
                    url: restricted.url.clone(),
                    reason: restricted.reason.clone(),
                });
                self.recommendations.restricted.push(restricted);
            }

            match self.mode {
                PlayerMode::Long => {
                    let sidebar = self.driver.collect_sidebar().await?;
                    self.recommendations.sidebar.push(sidebar);
                }
                PlayerMode::Short => {
                    let preload = self.driver.collect_preload().await?;
                    self.recommendations.preload.push(preload);
                }
            }

            self.recommendations.autoplay.push(url);
            remaining -= 1;

            self.driver.dwell().await?;
        }

        tracing::info!(collected = self.recommendations.autoplay.len(), "collection done");
        Ok(())
    }

    #[must_use]
    pub fn report(&self) -> AuditReport {
        let (training_ids, seed_id) = AuditReport::split_seeds(&self.seed_ids);
        AuditReport {
            training_ids,
            seed_id,
            player_mode: self.mode,
            watch_time: self.watch_time,
            recommendations: self.recommendations.clone(),
        }
    }

    pub async fn shutdown(&mut self) -> Result<(), DriverError> {
        self.driver.shutdown().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::fake::FakeDriver;
    use crate::engine::noop_callback;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    #[tokio::test]
    async fn train_then_collect_builds_aligned_report() {
        let driver = FakeDriver::new()
            .with_sidebar(vec!["https://www.youtube.com/watch?v=rec1".into()]);
        let watched = driver.watched_log();
        let mut auditor = Auditor::new(
            Box::new(driver),
            PlayerMode::Long,
            WatchTime::Seconds(10),
            noop_callback(),
        );
        auditor.start().await.unwrap();
        auditor
            .train(&["a".to_string(), "b".to_string()])
            .await
            .unwrap();
        auditor.collect(3).await.unwrap();
        auditor.shutdown().await.unwrap();

        assert_eq!(
            *watched.lock().unwrap(),
            vec!["a".to_string(), "b".to_string()]
        );

        let report = auditor.report();
        assert_eq!(report.training_ids, vec!["a".to_string()]);
        assert_eq!(report.seed_id.as_deref(), Some("b"));
        assert_eq!(report.recommendations.autoplay.len(), 3);
        assert_eq!(report.recommendations.sidebar.len(), 3);
        assert!(report.recommendations.preload.is_empty());
    }

    #[tokio::test]
    async fn short_mode_collects_preload_not_sidebar() {
        let driver = FakeDriver::new()
            .with_mode(PlayerMode::Short)
            .with_preload(vec!["https://www.youtube.com/shorts/p1".into()]);
        let mut auditor = Auditor::new(
            Box::new(driver),
            PlayerMode::Short,
            WatchTime::Seconds(5),
            noop_callback(),
        );
        auditor.start().await.unwrap();
        auditor.train(&["s".to_string()]).await.unwrap();
        auditor.collect(2).await.unwrap();

        let report = auditor.report();
        assert_eq!(report.recommendations.preload.len(), 2);
        assert!(report.recommendations.sidebar.is_empty());
    }

    #[tokio::test]
    async fn training_failure_propagates() {
        let failures = Arc::new(AtomicUsize::new(1));
        let driver = FakeDriver::new().with_watch_failures(failures);
        let mut auditor = Auditor::new(
            Box::new(driver),
            PlayerMode::Long,
            WatchTime::Seconds(10),
            noop_callback(),
        );
        auditor.start().await.unwrap();
        assert!(auditor.train(&["a".to_string()]).await.is_err());
    }

    #[tokio::test]
    async fn restricted_hops_are_recorded_and_reported() {
        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = {
            let events = events.clone();
            Arc::new(move |ev: AuditEvent| {
                events.lock().unwrap().push(ev);
            }) as AuditCallback
        };
        let driver = FakeDriver::new().with_restricted_hop(2);
        let mut auditor =
            Auditor::new(Box::new(driver), PlayerMode::Long, WatchTime::Seconds(1), sink);
        auditor.start().await.unwrap();
        auditor.train(&["a".to_string()]).await.unwrap();
        auditor.collect(3).await.unwrap();

        let report = auditor.report();
        assert_eq!(report.recommendations.restricted.len(), 1);
        let restricted_events = events
            .lock()
            .unwrap()
            .iter()
            .filter(|e| matches!(e, AuditEvent::Restricted { .. }))
            .count();
        assert_eq!(restricted_events, 1);
    }

    #[tokio::test]
    async fn signin_restriction_aborts_collection() {
        let driver = FakeDriver::new().with_signin_restriction();
        let mut auditor = Auditor::new(
            Box::new(driver),
            PlayerMode::Long,
            WatchTime::Seconds(1),
            noop_callback(),
        );
        auditor.start().await.unwrap();
        auditor.train(&["a".to_string()]).await.unwrap();
        let err = auditor.collect(3).await.unwrap_err();
        assert!(matches!(err, DriverError::Restricted { .. }));
    }

    #[tokio::test]
    async fn training_progress_events_count_up() {
        let count = Arc::new(AtomicUsize::new(0));
        let sink = {
            let count = count.clone();
            Arc::new(move |ev: AuditEvent| {
                if matches!(ev, AuditEvent::TrainingProgress { .. }) {
                    count.fetch_add(1, Ordering::SeqCst);
                }
            }) as AuditCallback
        };
        let mut auditor = Auditor::new(
            Box::new(FakeDriver::new()),
            PlayerMode::Long,
            WatchTime::Seconds(1),
            sink,
        );
        auditor.start().await.unwrap();
        auditor
            .train(&["a".to_string(), "b".to_string(), "c".to_string()])
            .await
            .unwrap();
        assert_eq!(count.load(Ordering::SeqCst), 3);
    }
}
