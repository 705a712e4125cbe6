//! Scripted in-memory driver for engine tests. No browser, no network;
//! failures and restrictions are programmed up front.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use crate::model::{PlayerMode, RestrictedVideo, WatchTime};

use super::chrome::video_url;
use super::{DriverError, PlatformDriver};

#[derive(Default)]
pub struct FakeDriver {
    mode: PlayerMode,
    started: bool,
    hop: usize,
    sidebar: Vec<String>,
    preload: Vec<String>,
    /// Shared countdown of watch calls that should fail. Shared so a
    /// factory can hand fresh drivers the same script across attempts.
    watch_failures: Option<Arc<AtomicUsize>>,
    signin_restricted: bool,
    restricted_hops: Vec<usize>,
    watched: Arc<Mutex<Vec<String>>>,
}

impl FakeDriver {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_mode(mut self, mode: PlayerMode) -> Self {
        self.mode = mode;
        self
    }

    #[must_use]
    pub fn with_sidebar(mut self, sidebar: Vec<String>) -> Self {
        self.sidebar = sidebar;
        self
    }

    #[must_use]
    pub fn with_preload(mut self, preload: Vec<String>) -> Self {
        self.preload = preload;
        self
    }

    /// Fail the next N watch calls, counting down through the shared cell.
    #[must_use]
    pub fn with_watch_failures(mut self, failures: Arc<AtomicUsize>) -> Self {
        self.watch_failures = Some(failures);
        self
    }

    /// Every hop reports a sign-in-gated restriction (fatal).
    #[must_use]
    pub fn with_signin_restriction(mut self) -> Self {
        self.signin_restricted = true;
        self
    }

    /// Report a dismissable restriction at the given hop (1-based).
    #[must_use]
    pub fn with_restricted_hop(mut self, hop: usize) -> Self {
        self.restricted_hops.push(hop);
        self
    }

    /// Observe watched video ids from outside (shared with clones).
    #[must_use]
    pub fn watched_log(&self) -> Arc<Mutex<Vec<String>>> {
        self.watched.clone()
    }
}

#[async_trait]
impl PlatformDriver for FakeDriver {
    async fn start(&mut self, mode: PlayerMode, _watch_time: WatchTime) -> Result<(), DriverError> {
        self.mode = mode;
        self.started = true;
        Ok(())
    }

    async fn login(&mut self, _username: &str, _password: &str) -> Result<(), DriverError> {
        Ok(())
    }

    async fn watch(&mut self, video_id: &str) -> Result<(), DriverError> {
        if let Some(failures) = &self.watch_failures {
            if failures
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok()
            {
                return Err(DriverError::Session("scripted watch failure".into()));
            }
        }
        self.watched
            .lock()
            .expect("fake driver watched log poisoned")
            .push(video_id.to_string());
        Ok(())
    }

    async fn advance(&mut self) -> Result<String, DriverError> {
        self.hop += 1;
        Ok(video_url(self.mode, &format!("hop{}", self.hop)))
    }

    async fn check_restricted(&mut self) -> Result<Option<RestrictedVideo>, DriverError> {
        if self.signin_restricted {
            return Err(DriverError::Restricted {
                reason: "Sign in to confirm your age".into(),
            });
        }
        if self.restricted_hops.contains(&self.hop) {
            return Ok(Some(RestrictedVideo {
                url: video_url(self.mode, &format!("hop{}", self.hop)),
                reason: "Content warning".into(),
            }));
        }
        Ok(None)
    }

    async fn collect_sidebar(&mut self) -> Result<Vec<String>, DriverError> {
        Ok(self.sidebar.clone())
    }

    async fn collect_preload(&mut self) -> Result<Vec<String>, DriverError> {
        Ok(self.preload.clone())
    }

    async fn dwell(&mut self) -> Result<(), DriverError> {
        Ok(())
    }

    async fn shutdown(&mut self) -> Result<(), DriverError> {
        self.started = false;
        Ok(())
    }
}
