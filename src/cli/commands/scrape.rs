//! Live scrape command.

use std::sync::Arc;

use anyhow::Context;
use console::style;
use tracing::warn;

use crate::browser::BrowserSession;
use crate::config::Settings;
use crate::error::HarvestError;
use crate::harvest::{HarvestSession, MemoryTaskQueue};
use crate::models::{ListingContext, ListingIdentity, ListingKind};

use super::helpers::{open_sink, parse_cutoff, print_report, write_enqueued};
use super::OutputArgs;

pub struct ScrapeArgs {
    pub url: String,
    pub kind: ListingKind,
    pub owner: String,
    pub limit: Option<usize>,
    pub scroll_wait_ms: Option<u64>,
    pub newer_than: Option<String>,
    pub username: Option<String>,
    pub location_name: Option<String>,
    pub user_data: Option<String>,
    pub retries: u32,
}

impl ScrapeArgs {
    fn identity(&self, settings: &Settings) -> anyhow::Result<ListingIdentity> {
        let limit = self.limit.unwrap_or(settings.harvest.default_limit);
        let mut identity = ListingIdentity::new(self.kind, self.owner.clone(), limit);
        if let Some(ms) = self.scroll_wait_ms {
            identity = identity.with_scroll_wait_ms(ms);
        }
        if let Some(ref cutoff) = self.newer_than {
            identity = identity.with_newer_than(parse_cutoff(cutoff)?);
        }
        Ok(identity)
    }

    fn context(&self) -> anyhow::Result<ListingContext> {
        let user_data = match self.user_data {
            Some(ref raw) => match serde_json::from_str(raw).context("--user-data must be JSON")? {
                serde_json::Value::Object(map) => map,
                _ => anyhow::bail!("--user-data must be a JSON object"),
            },
            None => Default::default(),
        };

        Ok(ListingContext {
            url: Some(self.url.clone()),
            tag_name: (self.kind == ListingKind::HashtagPosts).then(|| self.owner.clone()),
            user_username: self.username.clone(),
            location_name: self.location_name.clone(),
            user_data,
        })
    }
}

/// Load the page and harvest it, reloading when it fails to render.
pub async fn cmd_scrape(
    settings: &Settings,
    args: ScrapeArgs,
    output: &OutputArgs,
) -> anyhow::Result<()> {
    url::Url::parse(&args.url).with_context(|| format!("Invalid URL: {}", args.url))?;
    let identity = args.identity(settings)?;
    let context = args.context()?;

    let sink = open_sink(output, identity.limit).await?;
    let progress = sink.progress();
    let queue = MemoryTaskQueue::new();
    let session = HarvestSession::new(
        settings.harvest.clone(),
        sink,
        Some(Arc::new(queue.clone())),
    );
    let mut browser = BrowserSession::new(settings.browser.clone(), settings.readiness.clone());

    let attempts = args.retries.max(1);
    let mut attempt = 0;
    let outcome = loop {
        attempt += 1;
        let result = browser
            .harvest(&session, identity.clone(), context.clone(), &args.url)
            .await;

        match result {
            Err(e) if attempt < attempts && is_recoverable(&e) => {
                warn!("[{}] Attempt {}/{} failed: {}", identity, attempt, attempts, e);
            }
            other => break other,
        }
    };
    browser.close().await;
    progress.finish_and_clear();

    if let Some(ref path) = output.enqueue_output {
        write_enqueued(&queue, path).await?;
    }

    match outcome? {
        Some(report) => print_report(&report, &queue).await,
        None => eprintln!(
            "{} {}: profile is private, nothing harvested",
            style("!").yellow(),
            identity
        ),
    }
    Ok(())
}

fn is_recoverable(e: &anyhow::Error) -> bool {
    e.downcast_ref::<HarvestError>()
        .map(HarvestError::is_recoverable)
        .unwrap_or(false)
}
