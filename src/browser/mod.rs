//! Chromium-backed page driving for live listings.
//!
//! Uses chromiumoxide (CDP) to load a listing page, intercept its
//! pagination responses and scroll it.

mod cookies;
mod intercept;
mod page;

pub use intercept::spawn_interceptor;
pub use page::{BrowserDriver, ListingPage, PageGate};

use std::time::Duration;

use anyhow::{Context, Result};
use chromiumoxide::cdp::browser_protocol::network::SetUserAgentOverrideParams;
use chromiumoxide::cdp::browser_protocol::page::NavigateParams;
use chromiumoxide::{Browser, BrowserConfig, Page};
use futures::StreamExt;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::{BrowserSettings, ReadinessSettings};
use crate::harvest::{response_channel, HarvestSession, ListingReport, ListingRun};
use crate::models::{ListingContext, ListingIdentity};

const USER_AGENT: &str = "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

/// Intercepted responses buffered between the page and the correlator.
const FEED_CAPACITY: usize = 64;

/// A launched or connected browser.
pub struct BrowserSession {
    settings: BrowserSettings,
    readiness: ReadinessSettings,
    browser: Option<Browser>,
    handler: Option<JoinHandle<()>>,
}

impl BrowserSession {
    /// Common Chrome executable paths to check.
    const CHROME_PATHS: &'static [&'static str] = &[
        "/usr/bin/google-chrome",
        "/usr/bin/google-chrome-stable",
        "/usr/bin/chromium",
        "/usr/bin/chromium-browser",
        "/snap/bin/chromium",
        "/Applications/Google Chrome.app/Contents/MacOS/Google Chrome",
        "/Applications/Chromium.app/Contents/MacOS/Chromium",
        "/opt/google/chrome/google-chrome",
    ];

    pub fn new(settings: BrowserSettings, readiness: ReadinessSettings) -> Self {
        Self {
            settings,
            readiness,
            browser: None,
            handler: None,
        }
    }

    fn find_chrome() -> Result<std::path::PathBuf> {
        for path in Self::CHROME_PATHS {
            let p = std::path::Path::new(path);
            if p.exists() {
                info!("Found Chrome at: {}", path);
                return Ok(p.to_path_buf());
            }
        }

        for cmd in &[
            "google-chrome",
            "google-chrome-stable",
            "chromium",
            "chromium-browser",
        ] {
            if let Ok(output) = std::process::Command::new("which").arg(cmd).output() {
                if output.status.success() {
                    let path = String::from_utf8_lossy(&output.stdout).trim().to_string();
                    if !path.is_empty() {
                        info!("Found Chrome in PATH: {}", path);
                        return Ok(std::path::PathBuf::from(path));
                    }
                }
            }
        }

        Err(anyhow::anyhow!(
            "Chrome/Chromium not found. Install it or set BROWSER_URL to a running instance"
        ))
    }

    /// Launch or connect to the browser if not already running.
    pub async fn ensure_browser(&mut self) -> Result<&Browser> {
        if self.browser.is_none() {
            let (browser, mut handler) = match self.settings.remote_url.clone() {
                Some(remote_url) => self.connect_remote(&remote_url).await?,
                None => self.launch().await?,
            };

            self.handler = Some(tokio::spawn(async move {
                while let Some(h) = handler.next().await {
                    if h.is_err() {
                        break;
                    }
                }
            }));
            self.browser = Some(browser);
        }

        self.browser
            .as_ref()
            .ok_or_else(|| anyhow::anyhow!("Browser not available"))
    }

    async fn launch(&self) -> Result<(Browser, chromiumoxide::Handler)> {
        info!("Launching browser (headless={})", self.settings.headless);

        let mut builder = BrowserConfig::builder().chrome_executable(Self::find_chrome()?);
        if !self.settings.headless {
            builder = builder.with_head();
        }
        if let Some(ref proxy) = self.settings.proxy {
            builder = builder.arg(format!("--proxy-server={}", proxy));
        }
        builder = builder
            .arg("--disable-blink-features=AutomationControlled")
            .arg("--disable-infobars")
            .arg("--disable-dev-shm-usage")
            .arg("--no-first-run")
            .arg("--no-default-browser-check")
            .arg("--no-sandbox")
            .arg("--disable-gpu");
        for arg in &self.settings.chrome_args {
            builder = builder.arg(arg);
        }

        let config = builder
            .build()
            .map_err(|e| anyhow::anyhow!("Failed to build browser config: {}", e))?;

        Browser::launch(config)
            .await
            .context("Failed to launch browser")
    }

    async fn connect_remote(&self, url: &str) -> Result<(Browser, chromiumoxide::Handler)> {
        info!(
            "Connecting to remote browser at {} (timeout: {}s)",
            url, self.settings.timeout_secs
        );

        let http_url = url
            .replace("ws://", "http://")
            .replace("wss://", "https://");
        let version_url = format!("{}/json/version", http_url.trim_end_matches('/'));

        let resp: serde_json::Value = reqwest::Client::new()
            .get(&version_url)
            .send()
            .await
            .context("Failed to connect to remote browser")?
            .json()
            .await
            .context("Failed to parse browser version info")?;

        let ws_url = resp
            .get("webSocketDebuggerUrl")
            .and_then(|v| v.as_str())
            .ok_or_else(|| anyhow::anyhow!("No webSocketDebuggerUrl in response"))?;
        debug!("Connecting to WebSocket: {}", ws_url);

        let handler_config = chromiumoxide::handler::HandlerConfig {
            request_timeout: Duration::from_secs(self.settings.timeout_secs),
            ..Default::default()
        };

        Browser::connect_with_config(ws_url, handler_config)
            .await
            .context("Failed to connect to remote browser")
    }

    /// Open a blank page with the user agent and login cookies applied.
    async fn new_page(&mut self) -> Result<Page> {
        let cookies_file = self.settings.cookies_file.clone();
        let browser = self.ensure_browser().await?;
        let page = browser.new_page("about:blank").await?;

        page.execute(SetUserAgentOverrideParams::new(USER_AGENT.to_string()))
            .await?;

        if let Some(path) = cookies_file {
            if path.exists() {
                cookies::load_cookies(&page, &path).await?;
            } else {
                warn!("Cookies file not found: {}", path.display());
            }
        }
        Ok(page)
    }

    /// Load `url` and harvest one listing from it.
    ///
    /// Returns `Ok(None)` when the page turned out to be a private profile.
    /// Readiness failures come back as [`crate::HarvestError::PageNotReady`]
    /// inside the error chain; the caller decides whether to reload.
    pub async fn harvest(
        &mut self,
        session: &HarvestSession,
        identity: ListingIdentity,
        context: ListingContext,
        url: &str,
    ) -> Result<Option<ListingReport>> {
        let page = self.new_page().await?;
        let (tx, feed) = response_channel(FEED_CAPACITY);
        let interceptor = spawn_interceptor(&page, identity.kind, tx).await?;

        let result = self
            .harvest_on_page(&page, session, identity, context, url, feed)
            .await;

        interceptor.abort();
        let _ = page.close().await;
        result
    }

    async fn harvest_on_page(
        &self,
        page: &Page,
        session: &HarvestSession,
        identity: ListingIdentity,
        context: ListingContext,
        url: &str,
        feed: crate::harvest::ResponseFeed,
    ) -> Result<Option<ListingReport>> {
        info!("[{}] Navigating to {}", identity, url);
        let nav_params = NavigateParams::builder()
            .url(url)
            .build()
            .map_err(|e| anyhow::anyhow!("Invalid URL: {}", e))?;
        page.execute(nav_params).await?;

        let listing_page = ListingPage::new(page.clone(), identity.clone());
        let gate = listing_page
            .check_entry(&self.readiness, self.settings.is_logged_in())
            .await?;
        let mode = match gate {
            PageGate::Private => return Ok(None),
            PageGate::Open(mode) => mode,
        };

        let mut run = ListingRun::new(identity)
            .with_context(ListingContext {
                url: context.url.clone().or_else(|| Some(url.to_string())),
                ..context
            })
            .with_mode(mode);
        if let Some(embedded) = listing_page.embedded_data().await? {
            run = run.with_embedded(embedded);
        }

        let mut driver = BrowserDriver::new(page.clone());
        let report = session.run_listing(run, &mut driver, feed).await?;
        Ok(Some(report))
    }

    /// Close the browser.
    pub async fn close(&mut self) {
        if let Some(mut browser) = self.browser.take() {
            let _ = browser.close().await;
        }
        if let Some(handler) = self.handler.take() {
            handler.abort();
        }
    }
}
