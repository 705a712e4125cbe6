//! Platform driver layer. The engine talks to a [`PlatformDriver`]; the
//! shipped implementation controls Chrome over the W3C WebDriver wire
//! protocol (chromedriver compatible).

pub mod chrome;
pub mod fake;
pub mod wire;

pub use chrome::ChromeSession;
pub use wire::WebDriverClient;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::config::Settings;
use crate::model::{PlayerMode, RestrictedVideo, WatchTime};

#[derive(Debug, thiserror::Error)]
pub enum DriverError {
    #[error("webdriver session error: {0}")]
    Session(String),

    #[error("webdriver request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("webdriver protocol error '{error}': {message}")]
    Protocol { error: String, message: String },

    #[error("timed out after {0:?} waiting for {1}")]
    Timeout(Duration, String),

    #[error("element not found: {0}")]
    ElementNotFound(String),

    #[error("restricted video requires sign-in: {reason}")]
    Restricted { reason: String },
}

/// Options for launching one browser session.
#[derive(Debug, Clone)]
pub struct SessionOptions {
    pub webdriver_url: String,
    pub headless: bool,
    pub incognito: bool,
    pub adblock_extension: Option<PathBuf>,
    pub custom_args: Vec<String>,
    pub timeout: Duration,
    /// Retry budget for flaky page interactions.
    pub err_attempts: u32,
}

impl SessionOptions {
    #[must_use]
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            webdriver_url: settings.webdriver_url.clone(),
            headless: settings.headless,
            incognito: settings.incognito,
            adblock_extension: settings.adblock.extension_path(),
            custom_args: Vec::new(),
            timeout: Duration::from_secs(settings.timeout_seconds),
            err_attempts: 5,
        }
    }

    /// Chrome command-line arguments for this session.
    #[must_use]
    pub fn chrome_args(&self) -> Vec<String> {
        let mut args = vec![
            "--disable-blink-features=AutomationControlled".to_string(),
            "--disable-gpu".to_string(),
        ];
        if self.headless {
            args.push("--headless=new".to_string());
        }
        if self.incognito {
            args.push("--incognito".to_string());
        }
        if let Some(path) = &self.adblock_extension {
            args.push(format!("--load-extension={}", path.display()));
        }
        args.extend(self.custom_args.iter().cloned());
        args
    }

    /// W3C `capabilities` payload for session creation.
    #[must_use]
    pub fn capabilities(&self) -> serde_json::Value {
        serde_json::json!({
            "capabilities": {
                "alwaysMatch": {
                    "browserName": "chrome",
                    "goog:chromeOptions": { "args": self.chrome_args() }
                }
            }
        })
    }
}

/// What the engine needs from a browser, independent of the wire protocol.
/// One instance drives one task; the runner creates a fresh driver per
/// attempt so browser state never leaks between tasks.
#[async_trait]
pub trait PlatformDriver: Send {
    /// Launch the browser session for `mode`.
    async fn start(&mut self, mode: PlayerMode, watch_time: WatchTime) -> Result<(), DriverError>;

    /// Sign in before training, for logged-in audits.
    async fn login(&mut self, username: &str, password: &str) -> Result<(), DriverError>;

    /// Navigate to a video and watch it for the configured time.
    async fn watch(&mut self, video_id: &str) -> Result<(), DriverError>;

    /// Advance to the next autoplay video; returns the new URL.
    async fn advance(&mut self) -> Result<String, DriverError>;

    /// Detect the playability-error surface. `Ok(Some)` means a restriction
    /// was recorded and dismissed; sign-in-gated videos are fatal.
    async fn check_restricted(&mut self) -> Result<Option<RestrictedVideo>, DriverError>;

    /// Sidebar recommendation URLs for the current watch page (long mode).
    async fn collect_sidebar(&mut self) -> Result<Vec<String>, DriverError>;

    /// Preloaded reel URLs around the active reel (short mode).
    async fn collect_preload(&mut self) -> Result<Vec<String>, DriverError>;

    /// Watch the current video in place, without navigating.
    async fn dwell(&mut self) -> Result<(), DriverError>;

    /// Tear the browser session down. Idempotent.
    async fn shutdown(&mut self) -> Result<(), DriverError>;
}

/// Creates a fresh, unstarted driver per task attempt.
pub type DriverFactory = Arc<dyn Fn() -> Box<dyn PlatformDriver> + Send + Sync>;

/// Factory for real Chrome sessions with the given options.
#[must_use]
pub fn chrome_factory(opts: SessionOptions) -> DriverFactory {
    Arc::new(move || Box::new(ChromeSession::new(opts.clone())) as Box<dyn PlatformDriver>)
}
