//! A loaded listing page: embedded data, entry gating and scrolling.

use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use chromiumoxide::Page;
use tracing::{debug, warn};

use crate::config::ReadinessSettings;
use crate::error::HarvestError;
use crate::harvest::{EntryMode, PageDriver};
use crate::models::{EmbeddedData, ListingIdentity, ListingKind};

const EMBEDDED_DATA_SCRIPT: &str = r#"
(() => {
    const shared = window._sharedData;
    const additional = window.__additionalData;
    const firstAdditional = additional ? Object.values(additional)[0] : null;
    return {
        entryData: (shared && shared.entry_data) || null,
        additionalData: (firstAdditional && firstAdditional.data) || null,
    };
})()
"#;

const MOST_RECENT_SCRIPT: &str = r#"
(() => {
    const heading = document.querySelector('article > h2');
    return heading !== null && heading.textContent === 'Most recent';
})()
"#;

const SCROLL_TO_BOTTOM: &str = "window.scrollTo({ top: document.body.scrollHeight })";
const SCROLL_BACK: &str = "window.scrollTo({ top: document.body.scrollHeight * 0.70 })";

/// Outcome of entry gating.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageGate {
    Open(EntryMode),
    /// Private profile; nothing to harvest.
    Private,
}

pub struct ListingPage {
    page: Page,
    identity: ListingIdentity,
}

impl ListingPage {
    pub fn new(page: Page, identity: ListingIdentity) -> Self {
        Self { page, identity }
    }

    /// Wait for the kind's readiness selector, then apply the per-kind
    /// entry rules.
    pub async fn check_entry(
        &self,
        readiness: &ReadinessSettings,
        logged_in: bool,
    ) -> Result<PageGate> {
        let probe = readiness.probe_for(self.identity.kind);
        let found = tokio::time::timeout(probe.timeout(), self.page.find_element(&probe.selector))
            .await
            .map(|r| r.is_ok())
            .unwrap_or(false);
        if !found {
            warn!(
                "[{}] Page didn't load properly, trying again...",
                self.identity
            );
            return Err(HarvestError::PageNotReady {
                listing: self.identity.to_string(),
                selector: probe.selector.clone(),
                timeout: probe.timeout(),
            }
            .into());
        }

        match self.identity.kind {
            ListingKind::ProfilePosts => {
                if self.page.find_element(&readiness.private_selector).await.is_ok() {
                    warn!("[{}] Profile is private, exiting", self.identity);
                    return Ok(PageGate::Private);
                }
            }
            ListingKind::PlacePosts if !logged_in => {
                warn!(
                    "[{}] Place pages allow scrolling only under login, collecting initial posts and finishing",
                    self.identity
                );
                return Ok(PageGate::Open(EntryMode::InitialOnly));
            }
            ListingKind::HashtagPosts => {
                // The heading renders a moment after the grid.
                tokio::time::sleep(Duration::from_millis(500)).await;
                let has_most_recent = self
                    .page
                    .evaluate(MOST_RECENT_SCRIPT.to_string())
                    .await
                    .ok()
                    .and_then(|r| r.into_value::<bool>().ok())
                    .unwrap_or(false);
                if !has_most_recent {
                    warn!(
                        "[{}] No \"Most recent\" section, collecting initial posts only",
                        self.identity
                    );
                    return Ok(PageGate::Open(EntryMode::InitialOnly));
                }
            }
            _ => {}
        }

        Ok(PageGate::Open(EntryMode::Drive))
    }

    /// Data embedded in the page at load time, if any.
    pub async fn embedded_data(&self) -> Result<Option<EmbeddedData>> {
        let evaluated = self.page.evaluate(EMBEDDED_DATA_SCRIPT.to_string()).await;
        let embedded: EmbeddedData = match evaluated {
            Ok(result) => result.into_value()?,
            Err(e) => {
                debug!("[{}] No embedded data: {}", self.identity, e);
                return Ok(None);
            }
        };

        if embedded.entry_data.is_null() && embedded.additional_data.is_none() {
            return Ok(None);
        }
        Ok(Some(embedded))
    }
}

/// Scrolls the page to the bottom on each drive step, and back up to 70%
/// after settling so the loader triggers again.
pub struct BrowserDriver {
    page: Page,
}

impl BrowserDriver {
    pub fn new(page: Page) -> Self {
        Self { page }
    }

    async fn scroll(&self, script: &str) -> crate::error::Result<()> {
        self.page
            .evaluate(script.to_string())
            .await
            .map(|_| ())
            .map_err(|e| HarvestError::Driver(e.to_string()))
    }
}

#[async_trait]
impl PageDriver for BrowserDriver {
    async fn advance(&mut self) -> crate::error::Result<()> {
        self.scroll(SCROLL_TO_BOTTOM).await
    }

    async fn settle(&mut self, delay: Duration) {
        tokio::time::sleep(delay).await;
        if let Err(e) = self.scroll(SCROLL_BACK).await {
            debug!("Scroll back failed: {}", e);
        }
    }
}
