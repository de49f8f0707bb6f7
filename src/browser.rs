use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::emulation::SetUserAgentOverrideParams;
use chromiumoxide::cdp::browser_protocol::fetch::{
    EnableParams, EventRequestPaused, FailRequestParams, RequestPattern, RequestStage,
};
use chromiumoxide::cdp::browser_protocol::network::{ErrorReason, ResourceType};
use chromiumoxide::cdp::browser_protocol::page::{EventDomContentEventFired, NavigateParams};
use chromiumoxide::Page;
use futures::{Stream, StreamExt};
use rand::Rng;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tempfile::TempDir;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::error::BrowserError;

/// User agents for rotation
const USER_AGENTS: &[&str] = &[
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36",
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/123.0.0.0 Safari/537.36 Edg/123.0.0.0",
];

/// Resource types that are never needed to read a result list.
const BLOCKED_RESOURCES: [ResourceType; 3] =
    [ResourceType::Image, ResourceType::Media, ResourceType::Font];

pub const DEFAULT_NAV_TIMEOUT: Duration = Duration::from_secs(15);
pub const DEFAULT_SETTLE: Duration = Duration::from_millis(2500);
/// Grace period for closing a browser before its process is killed.
pub const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

/// Loads a page and hands back its rendered markup.
///
/// Implementations must not share browser state between calls: each call owns
/// its session from launch to close.
#[async_trait]
pub trait PageRenderer: Send + Sync {
    async fn render(&self, url: &str) -> Result<String, BrowserError>;
}

#[derive(Debug, Clone)]
pub struct BrowserSettings {
    pub executable: Option<PathBuf>,
    pub navigation_timeout: Duration,
    pub settle: Duration,
}

impl Default for BrowserSettings {
    fn default() -> Self {
        Self {
            executable: None,
            navigation_timeout: DEFAULT_NAV_TIMEOUT,
            settle: DEFAULT_SETTLE,
        }
    }
}

/// Headless Chromium, one fresh browser per render.
#[derive(Debug, Clone)]
pub struct ChromiumRenderer {
    settings: BrowserSettings,
}

impl ChromiumRenderer {
    pub fn new(settings: BrowserSettings) -> Self {
        Self { settings }
    }

    fn random_user_agent(&self) -> &'static str {
        let index = rand::thread_rng().gen_range(0..USER_AGENTS.len());
        USER_AGENTS[index]
    }

    async fn launch(&self, profile: &Path) -> Result<(Browser, JoinHandle<usize>), BrowserError> {
        let mut builder = BrowserConfig::builder()
            .no_sandbox()
            .user_data_dir(profile)
            .arg("--disable-gpu")
            .arg("--disable-dev-shm-usage")
            .arg("--no-first-run")
            .window_size(1366, 900);
        if let Some(path) = &self.settings.executable {
            builder = builder.chrome_executable(path);
        }
        let config = builder.build().map_err(BrowserError::Launch)?;

        let (browser, handler) = Browser::launch(config)
            .await
            .map_err(|e| BrowserError::Launch(e.to_string()))?;

        // The handler drives the CDP connection and must be polled for the browser's lifetime.
        let driver = tokio::spawn(drive_handler(handler));

        Ok((browser, driver))
    }

    async fn load(&self, browser: &Browser, url: &str) -> Result<String, BrowserError> {
        let page = browser
            .new_page("about:blank")
            .await
            .map_err(|e| BrowserError::Protocol(e.to_string()))?;

        page.execute(SetUserAgentOverrideParams::new(self.random_user_agent()))
            .await
            .map_err(|e| BrowserError::Protocol(e.to_string()))?;

        let blocker = block_heavy_resources(&page).await?;

        let outcome = self.navigate_and_snapshot(&page, url).await;
        blocker.abort();
        if let Err(e) = page.close().await {
            debug!("page close failed: {}", e);
        }
        outcome
    }

    async fn navigate_and_snapshot(&self, page: &Page, url: &str) -> Result<String, BrowserError> {
        // Subscribe before navigating so the event cannot be missed.
        let content_loaded = page
            .event_listener::<EventDomContentEventFired>()
            .await
            .map_err(|e| BrowserError::Protocol(e.to_string()))?;

        let navigate = async {
            let response = page
                .execute(NavigateParams::new(url))
                .await
                .map_err(|e| BrowserError::Navigation {
                    url: url.to_string(),
                    message: e.to_string(),
                })?;
            match response.result.error_text {
                Some(message) => Err(BrowserError::Navigation {
                    url: url.to_string(),
                    message,
                }),
                None => Ok(()),
            }
        };
        wait_until_ready(url, self.settings.navigation_timeout, navigate, content_loaded).await?;

        // Result lists are rendered client-side after the document loads.
        tokio::time::sleep(self.settings.settle).await;

        page.content()
            .await
            .map_err(|e| BrowserError::Protocol(e.to_string()))
    }
}

#[async_trait]
impl PageRenderer for ChromiumRenderer {
    async fn render(&self, url: &str) -> Result<String, BrowserError> {
        let profile = fresh_profile()?;
        info!(url, profile = %profile.path().display(), "opening browser session");
        let (browser, driver) = self.launch(profile.path()).await?;

        let outcome = self.load(&browser, url).await;

        shutdown(browser, driver).await;
        if let Err(e) = profile.close() {
            debug!("profile cleanup failed: {}", e);
        }

        outcome
    }
}

/// Scratch profile directory for one browser. Chrome locks its profile, so
/// concurrent sessions sharing one would hand off to each other.
fn fresh_profile() -> Result<TempDir, BrowserError> {
    tempfile::Builder::new()
        .prefix("product-mcp-profile-")
        .tempdir()
        .map_err(|e| BrowserError::Launch(format!("failed to create profile directory: {}", e)))
}

/// Polls the CDP handler until the connection ends and returns how many
/// events failed. Chrome emits messages chromiumoxide cannot decode; those
/// are skipped rather than ending the connection.
async fn drive_handler<S, E>(mut handler: S) -> usize
where
    S: Stream<Item = Result<(), E>> + Unpin,
    E: std::fmt::Display,
{
    let mut failed = 0;
    while let Some(event) = handler.next().await {
        if let Err(e) = event {
            failed += 1;
            debug!("CDP handler error (continuing): {}", e);
        }
    }
    failed
}

/// Resolves once `navigate` succeeds and the first readiness event arrives,
/// both within `timeout`.
async fn wait_until_ready<N, S>(
    url: &str,
    timeout: Duration,
    navigate: N,
    ready: S,
) -> Result<(), BrowserError>
where
    N: Future<Output = Result<(), BrowserError>>,
    S: Stream,
{
    let loaded = async {
        navigate.await?;
        let mut ready = std::pin::pin!(ready);
        match ready.next().await {
            Some(_) => Ok(()),
            None => Err(BrowserError::Navigation {
                url: url.to_string(),
                message: "page went away before content loaded".to_string(),
            }),
        }
    };
    match tokio::time::timeout(timeout, loaded).await {
        Ok(result) => result,
        Err(_) => Err(BrowserError::NavigationTimeout {
            url: url.to_string(),
            timeout,
        }),
    }
}

/// Closes the browser and reaps the process, killing it if that stalls.
async fn shutdown(mut browser: Browser, driver: JoinHandle<usize>) {
    let graceful = tokio::time::timeout(SHUTDOWN_TIMEOUT, async {
        if let Err(e) = browser.close().await {
            warn!("browser close failed: {}", e);
        }
        browser.wait().await
    })
    .await;

    match graceful {
        Ok(Ok(_)) => {}
        Ok(Err(e)) => warn!("browser process wait failed: {}", e),
        Err(_) => {
            warn!("browser did not exit within {:?}, killing it", SHUTDOWN_TIMEOUT);
            if let Some(Err(e)) = browser.kill().await {
                warn!("browser kill failed: {}", e);
            }
        }
    }
    driver.abort();
}

/// Fails image, media and font requests at the request stage.
async fn block_heavy_resources(page: &Page) -> Result<JoinHandle<()>, BrowserError> {
    let patterns: Vec<RequestPattern> = BLOCKED_RESOURCES
        .iter()
        .map(|kind| {
            RequestPattern::builder()
                .url_pattern("*")
                .resource_type(kind.clone())
                .request_stage(RequestStage::Request)
                .build()
        })
        .collect();

    let mut paused = page
        .event_listener::<EventRequestPaused>()
        .await
        .map_err(|e| BrowserError::Protocol(e.to_string()))?;

    page.execute(EnableParams::builder().patterns(patterns).build())
        .await
        .map_err(|e| BrowserError::Protocol(e.to_string()))?;

    let page = page.clone();
    Ok(tokio::spawn(async move {
        while let Some(event) = paused.next().await {
            let fail = FailRequestParams::new(event.request_id.clone(), ErrorReason::BlockedByClient);
            if let Err(e) = page.execute(fail).await {
                debug!("failed to abort blocked request: {}", e);
            }
        }
    }))
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// Serves canned markup (or a failure) and counts render calls.
    pub struct StaticRenderer {
        html: Option<String>,
        delay: Duration,
        calls: AtomicUsize,
        urls: Mutex<Vec<String>>,
    }

    impl StaticRenderer {
        pub fn serving(html: impl Into<String>) -> Self {
            Self {
                html: Some(html.into()),
                delay: Duration::ZERO,
                calls: AtomicUsize::new(0),
                urls: Mutex::new(Vec::new()),
            }
        }

        pub fn unreachable() -> Self {
            Self {
                html: None,
                delay: Duration::ZERO,
                calls: AtomicUsize::new(0),
                urls: Mutex::new(Vec::new()),
            }
        }

        /// Holds every render for `delay`, so concurrent callers overlap.
        pub fn delayed(mut self, delay: Duration) -> Self {
            self.delay = delay;
            self
        }

        pub fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }

        pub fn urls(&self) -> Vec<String> {
            self.urls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl PageRenderer for StaticRenderer {
        async fn render(&self, url: &str) -> Result<String, BrowserError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.urls.lock().unwrap().push(url.to_string());
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            match &self.html {
                Some(html) => Ok(html.clone()),
                None => Err(BrowserError::NavigationTimeout {
                    url: url.to_string(),
                    timeout: DEFAULT_NAV_TIMEOUT,
                }),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_random_user_agent_is_from_list() {
        let renderer = ChromiumRenderer::new(BrowserSettings::default());
        for _ in 0..10 {
            assert!(USER_AGENTS.contains(&renderer.random_user_agent()));
        }
    }

    #[test]
    fn test_default_settings() {
        let settings = BrowserSettings::default();
        assert_eq!(settings.navigation_timeout, Duration::from_secs(15));
        assert_eq!(settings.settle, Duration::from_millis(2500));
        assert!(settings.executable.is_none());
    }

    #[test]
    fn test_each_session_gets_its_own_profile() {
        let first = fresh_profile().unwrap();
        let second = fresh_profile().unwrap();
        assert_ne!(first.path(), second.path());
        assert!(first.path().is_dir());
        assert!(second.path().is_dir());

        let path = first.path().to_path_buf();
        first.close().unwrap();
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn test_handler_keeps_polling_after_errors() {
        let events = futures::stream::iter(vec![
            Ok(()),
            Err("data did not match any variant of untagged enum Message"),
            Ok(()),
            Err("unknown event"),
            Ok(()),
        ]);
        assert_eq!(drive_handler(events).await, 2);
    }

    #[tokio::test]
    async fn test_ready_after_navigation_and_first_event() {
        let ready = futures::stream::iter(vec![()]);
        let result = wait_until_ready("https://shop.test/s", DEFAULT_NAV_TIMEOUT, async { Ok(()) }, ready).await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn test_missing_readiness_event_times_out() {
        let ready = futures::stream::pending::<()>();
        let result = wait_until_ready(
            "https://shop.test/s",
            Duration::from_millis(20),
            async { Ok(()) },
            ready,
        )
        .await;
        assert!(matches!(result, Err(BrowserError::NavigationTimeout { .. })));
    }

    #[tokio::test]
    async fn test_navigation_error_wins_over_readiness() {
        let ready = futures::stream::iter(vec![()]);
        let navigate = async {
            Err(BrowserError::Navigation {
                url: "https://shop.test/s".to_string(),
                message: "net::ERR_NAME_NOT_RESOLVED".to_string(),
            })
        };
        let result = wait_until_ready("https://shop.test/s", DEFAULT_NAV_TIMEOUT, navigate, ready).await;
        match result {
            Err(BrowserError::Navigation { message, .. }) => {
                assert_eq!(message, "net::ERR_NAME_NOT_RESOLVED")
            }
            other => panic!("expected navigation error, got {:?}", other),
        }
    }
}
