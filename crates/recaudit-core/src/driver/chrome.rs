//! Chrome audit session: the platform-specific flows (watch, autoplay
//! advance, restriction handling, recommendation harvesting) on top of the
//! WebDriver wire client.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::time::{sleep, Instant};

use crate::model::{PlayerMode, RestrictedVideo, WatchTime, DEFAULT_VIDEO_LEN_SECS};

use super::wire::{ElementRef, WebDriverClient, KEY_ARROW_DOWN, KEY_SHIFT};
use super::{DriverError, PlatformDriver, SessionOptions};

pub const VIDEO_URL_PREFIX_LONG: &str = "https://www.youtube.com/watch?v=";
pub const VIDEO_URL_PREFIX_SHORT: &str = "https://www.youtube.com/shorts/";

const XPATH_SIDEBAR_THUMBS: &str =
    "//ytd-watch-next-secondary-results-renderer//a[@id='thumbnail']";
const XPATH_PRELOAD_PLAYERS: &str =
    "//ytd-reel-video-renderer[not(@is-active)]//div[@id='player-container']";
const XPATH_ERROR_LONG: &str = "//div[@id='player']/yt-playability-error-supported-renderers";
const XPATH_ERROR_SHORT: &str =
    "//ytd-reel-video-renderer[@is-active]//yt-playability-error-supported-renderers";
const XPATH_ERROR_REASON_LONG: &str =
    "//yt-playability-error-supported-renderers//div[@id='info']";

const POLL_INTERVAL: Duration = Duration::from_millis(500);
const PLAYBACK_RETRY_SLEEP: Duration = Duration::from_secs(2);
const COLLECT_RETRY_SLEEP: Duration = Duration::from_secs(1);

/// Probe script: playback state and duration of the active video element.
fn probe_script(mode: PlayerMode) -> &'static str {
    match mode {
        PlayerMode::Long => {
            "const v = document.querySelector('video'); \
             if (!v) { return null; } \
             return {paused: v.paused, duration: Number.isFinite(v.duration) ? v.duration : null};"
        }
        PlayerMode::Short => {
            "const v = document.querySelector('ytd-reel-video-renderer[is-active] video'); \
             if (!v) { return null; } \
             return {paused: v.paused, duration: Number.isFinite(v.duration) ? v.duration : null};"
        }
    }
}

/// Parsed probe result: (paused, duration).
fn parse_probe(value: &Value) -> Option<(bool, Option<f64>)> {
    let obj = value.as_object()?;
    let paused = obj.get("paused")?.as_bool()?;
    let duration = obj.get("duration").and_then(Value::as_f64);
    Some((paused, duration))
}

/// Recover a short URL from a reel player's thumbnail background style
/// (`...url("https://i.ytimg.com/vi/<id>/...")...`).
pub(crate) fn preload_url_from_style(style: &str) -> Option<String> {
    let id = style.split("vi/").nth(1)?.split('/').next()?;
    if id.is_empty() {
        None
    } else {
        Some(format!("{VIDEO_URL_PREFIX_SHORT}{id}"))
    }
}

#[must_use]
pub fn video_url(mode: PlayerMode, video_id: &str) -> String {
    match mode {
        PlayerMode::Long => format!("{VIDEO_URL_PREFIX_LONG}{video_id}"),
        PlayerMode::Short => format!("{VIDEO_URL_PREFIX_SHORT}{video_id}"),
    }
}

pub struct ChromeSession {
    opts: SessionOptions,
    client: Option<WebDriverClient>,
    mode: PlayerMode,
    watch_time: WatchTime,
}

impl ChromeSession {
    #[must_use]
    pub fn new(opts: SessionOptions) -> Self {
        Self {
            opts,
            client: None,
            mode: PlayerMode::Long,
            watch_time: WatchTime::default(),
        }
    }

    fn client(&self) -> Result<&WebDriverClient, DriverError> {
        self.client
            .as_ref()
            .ok_or_else(|| DriverError::Session("driver not started".into()))
    }

    async fn wait_for_url_contains(&self, needle: &str) -> Result<String, DriverError> {
        let client = self.client()?;
        let deadline = Instant::now() + self.opts.timeout;
        loop {
            let url = client.current_url().await?;
            if url.contains(needle) {
                return Ok(url);
            }
            if Instant::now() >= deadline {
                return Err(DriverError::Timeout(
                    self.opts.timeout,
                    format!("url containing '{needle}'"),
                ));
            }
            sleep(POLL_INTERVAL).await;
        }
    }

    async fn wait_for_element(
        &self,
        using: &str,
        value: &str,
        what: &str,
    ) -> Result<ElementRef, DriverError> {
        let client = self.client()?;
        let deadline = Instant::now() + self.opts.timeout;
        loop {
            match client.find_element(using, value).await {
                Ok(el) => return Ok(el),
                Err(DriverError::ElementNotFound(_)) => {
                    if Instant::now() >= deadline {
                        return Err(DriverError::Timeout(self.opts.timeout, what.to_string()));
                    }
                    sleep(POLL_INTERVAL).await;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Wait until the active video is playing; returns its duration.
    /// Retries with a page refresh, the player sometimes wedges on load.
    async fn wait_for_playback(&self) -> Result<f64, DriverError> {
        let client = self.client()?;
        let script = probe_script(self.mode);
        for attempt in 0..self.opts.err_attempts {
            let deadline = Instant::now() + self.opts.timeout;
            loop {
                let value = client.execute(script, json!([])).await?;
                if let Some((paused, duration)) = parse_probe(&value) {
                    if !paused {
                        return Ok(duration.unwrap_or(DEFAULT_VIDEO_LEN_SECS));
                    }
                }
                if Instant::now() >= deadline {
                    break;
                }
                sleep(POLL_INTERVAL).await;
            }
            tracing::warn!(
                attempt = attempt + 1,
                attempts = self.opts.err_attempts,
                "video not playing, refreshing"
            );
            client.refresh().await?;
            sleep(PLAYBACK_RETRY_SLEEP).await;
        }
        Err(DriverError::Timeout(
            self.opts.timeout,
            "video playback".into(),
        ))
    }

    async fn sleep_watch(&self, video_len: f64) {
        let secs = self.watch_time.effective_secs(video_len);
        tracing::debug!(secs, "watching video");
        sleep(Duration::from_secs(secs)).await;
    }

    async fn restricted_reason(&self, handle: &ElementRef) -> String {
        let client = match self.client() {
            Ok(c) => c,
            Err(_) => return "unknown(error)".into(),
        };
        let reason = match self.mode {
            PlayerMode::Long => match client.find_element("xpath", XPATH_ERROR_REASON_LONG).await {
                Ok(el) => client.element_text(&el).await.ok(),
                Err(_) => None,
            },
            PlayerMode::Short => match client
                .find_element_from(handle, "xpath", ".//div[@id='container']")
                .await
            {
                Ok(el) => client.element_text(&el).await.ok(),
                Err(_) => None,
            },
        };
        reason
            .filter(|r| !r.trim().is_empty())
            .unwrap_or_else(|| "unknown(error)".into())
    }
}

#[async_trait]
impl PlatformDriver for ChromeSession {
    async fn start(&mut self, mode: PlayerMode, watch_time: WatchTime) -> Result<(), DriverError> {
        if self.client.as_ref().is_some_and(WebDriverClient::has_session) {
            return Err(DriverError::Session(
                "driver already started, call shutdown first".into(),
            ));
        }
        self.mode = mode;
        self.watch_time = watch_time;
        let mut client = WebDriverClient::new(&self.opts.webdriver_url, self.opts.timeout)?;
        client.create_session(&self.opts.capabilities()).await?;
        tracing::info!(%mode, "driver session started");
        self.client = Some(client);
        Ok(())
    }

    async fn login(&mut self, username: &str, password: &str) -> Result<(), DriverError> {
        let client = self.client()?;
        tracing::debug!(username, "logging in");
        client.navigate("https://www.youtube.com/").await?;

        let sign_in = self
            .wait_for_element("xpath", "//a[@aria-label='Sign in']", "sign-in link")
            .await?;
        self.client()?.element_click(&sign_in).await?;

        let email = self
            .wait_for_element("xpath", "//input[@id='identifierId']", "email field")
            .await?;
        self.client()?.element_send_keys(&email, username).await?;
        let next = self
            .wait_for_element("xpath", "//div[@id='identifierNext']", "email next")
            .await?;
        self.client()?.element_click(&next).await?;

        let pass = self
            .wait_for_element("xpath", "//input[@name='Passwd']", "password field")
            .await?;
        self.client()?.element_send_keys(&pass, password).await?;
        let next = self
            .wait_for_element("xpath", "//div[@id='passwordNext']", "password next")
            .await?;
        self.client()?.element_click(&next).await?;

        self.wait_for_element("xpath", "//a[@title='YouTube Home']", "home page")
            .await?;
        tracing::info!(username, "login successful");
        Ok(())
    }

    async fn watch(&mut self, video_id: &str) -> Result<(), DriverError> {
        let url = video_url(self.mode, video_id);
        self.client()?.navigate(&url).await?;
        self.wait_for_url_contains(video_id).await?;
        let video_len = self.wait_for_playback().await?;
        tracing::info!(video_id, video_len, "watching");
        self.sleep_watch(video_len).await;
        Ok(())
    }

    async fn advance(&mut self) -> Result<String, DriverError> {
        let client = self.client()?;
        let before = client.current_url().await?;
        match self.mode {
            PlayerMode::Long => client.key_chord(&[KEY_SHIFT, 'n']).await?,
            PlayerMode::Short => client.key_chord(&[KEY_ARROW_DOWN]).await?,
        }
        let deadline = Instant::now() + self.opts.timeout;
        loop {
            let url = client.current_url().await?;
            if url != before {
                return Ok(url);
            }
            if Instant::now() >= deadline {
                return Err(DriverError::Timeout(
                    self.opts.timeout,
                    "autoplay url change".into(),
                ));
            }
            sleep(POLL_INTERVAL).await;
        }
    }

    async fn check_restricted(&mut self) -> Result<Option<RestrictedVideo>, DriverError> {
        let client = self.client()?;
        let xpath = match self.mode {
            PlayerMode::Long => XPATH_ERROR_LONG,
            PlayerMode::Short => XPATH_ERROR_SHORT,
        };
        let handle = match client.find_element("xpath", xpath).await {
            Ok(el) => el,
            Err(DriverError::ElementNotFound(_)) => return Ok(None),
            Err(e) => return Err(e),
        };
        // The error renderer is always mounted; `hidden` marks the benign case.
        if client.element_attr(&handle, "hidden").await?.is_some() {
            return Ok(None);
        }

        let url = client.current_url().await?;
        let reason = self.restricted_reason(&handle).await;
        tracing::info!(%url, %reason, "restricted video encountered");

        if reason.to_lowercase().contains("sign in") {
            return Err(DriverError::Restricted { reason });
        }

        let button_xpath = match self.mode {
            PlayerMode::Long => ".//button",
            PlayerMode::Short => ".//button-view-model",
        };
        let client = self.client()?;
        match client.find_element_from(&handle, "xpath", button_xpath).await {
            Ok(button) => client.element_click(&button).await?,
            Err(e) => tracing::warn!(%url, error = %e, "could not dismiss restriction notice"),
        }
        Ok(Some(RestrictedVideo { url, reason }))
    }

    async fn collect_sidebar(&mut self) -> Result<Vec<String>, DriverError> {
        let client = self.client()?;
        for attempt in 0..self.opts.err_attempts {
            match client.find_elements("xpath", XPATH_SIDEBAR_THUMBS).await {
                Ok(thumbs) => {
                    let mut links = Vec::new();
                    for thumb in &thumbs {
                        if let Some(href) = client.element_attr(thumb, "href").await? {
                            links.push(href);
                        }
                    }
                    return Ok(links);
                }
                Err(e) => {
                    tracing::warn!(
                        attempt = attempt + 1,
                        attempts = self.opts.err_attempts,
                        error = %e,
                        "sidebar collection failed"
                    );
                    sleep(COLLECT_RETRY_SLEEP).await;
                }
            }
        }
        Ok(Vec::new())
    }

    async fn collect_preload(&mut self) -> Result<Vec<String>, DriverError> {
        let client = self.client()?;
        for attempt in 0..self.opts.err_attempts {
            match client.find_elements("xpath", XPATH_PRELOAD_PLAYERS).await {
                Ok(players) => {
                    let mut urls = Vec::new();
                    for player in &players {
                        if let Some(style) = client.element_attr(player, "style").await? {
                            if let Some(url) = preload_url_from_style(&style) {
                                urls.push(url);
                            }
                        }
                    }
                    return Ok(urls);
                }
                Err(e) => {
                    tracing::warn!(
                        attempt = attempt + 1,
                        attempts = self.opts.err_attempts,
                        error = %e,
                        "preload collection failed"
                    );
                    sleep(COLLECT_RETRY_SLEEP).await;
                }
            }
        }
        Ok(Vec::new())
    }

    async fn dwell(&mut self) -> Result<(), DriverError> {
        let client = self.client()?;
        let value = client.execute(probe_script(self.mode), json!([])).await?;
        let video_len = parse_probe(&value)
            .and_then(|(_, d)| d)
            .unwrap_or(DEFAULT_VIDEO_LEN_SECS);
        self.sleep_watch(video_len).await;
        Ok(())
    }

    async fn shutdown(&mut self) -> Result<(), DriverError> {
        if let Some(client) = self.client.as_mut() {
            if let Err(e) = client.end_session().await {
                tracing::warn!(error = %e, "session teardown failed");
            }
        }
        self.client = None;
        Ok(())
    }
}
