//! Shared helper functions for CLI commands.

use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use console::style;
use indicatif::{ProgressBar, ProgressStyle};

use crate::error::Result;
use crate::harvest::{JsonLinesSink, ListingReport, MemoryTaskQueue, OutputSink};
use crate::models::{BatchMeta, FormattedRecord};

use super::OutputArgs;

/// Advances a progress bar for every record passed to the inner sink.
pub struct ProgressSink {
    inner: JsonLinesSink,
    progress: ProgressBar,
}

impl ProgressSink {
    pub fn new(inner: JsonLinesSink, limit: usize, quiet: bool) -> Self {
        let progress = if quiet {
            ProgressBar::hidden()
        } else {
            ProgressBar::new(limit as u64)
        };
        if let Ok(template) =
            ProgressStyle::default_bar().template("{spinner:.green} [{bar:30.cyan/blue}] {pos}/{len} {wide_msg}")
        {
            progress.set_style(template.progress_chars("=> "));
        }
        Self { inner, progress }
    }

    pub fn progress(&self) -> ProgressBar {
        self.progress.clone()
    }
}

#[async_trait]
impl OutputSink for ProgressSink {
    async fn emit(&self, records: Vec<FormattedRecord>, meta: BatchMeta) -> Result<()> {
        let count = records.len() as u64;
        self.progress.set_message(format!("{} ({}s)", meta.listing, meta.label));
        self.inner.emit(records, meta).await?;
        self.progress.inc(count);
        Ok(())
    }
}

/// Open the record sink for `output`, wrapped with a progress bar.
pub async fn open_sink(output: &OutputArgs, limit: usize) -> anyhow::Result<Arc<ProgressSink>> {
    let sink = match output.output {
        Some(ref path) => JsonLinesSink::create(path).await?,
        None => JsonLinesSink::stdout(),
    };
    Ok(Arc::new(ProgressSink::new(sink, limit, output.quiet)))
}

/// Write enqueued URLs, one per line.
pub async fn write_enqueued(queue: &MemoryTaskQueue, path: &Path) -> anyhow::Result<()> {
    let mut contents = queue.urls().await.join("\n");
    if !contents.is_empty() {
        contents.push('\n');
    }
    tokio::fs::write(path, contents)
        .await
        .with_context(|| format!("Failed to write {}", path.display()))
}

pub async fn print_report(report: &ListingReport, queue: &MemoryTaskQueue) {
    let total = report
        .total_count_hint
        .map(|t| t.to_string())
        .unwrap_or_else(|| "?".to_string());
    eprintln!(
        "{} {}: {}/{} harvested, {} ({} scrolls)",
        style("✓").green(),
        report.listing,
        report.emitted,
        total,
        report.stop_reason,
        report.drive_steps
    );

    let enqueued = queue.len().await;
    if enqueued > 0 {
        eprintln!(
            "  {} {} detail pages enqueued",
            style("→").cyan(),
            enqueued
        );
    }
}

/// Parse a cutoff date: RFC 3339, or a bare `YYYY-MM-DD` taken as UTC midnight.
pub fn parse_cutoff(s: &str) -> anyhow::Result<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Ok(dt.with_timezone(&Utc));
    }
    let date = NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .with_context(|| format!("Invalid date '{}': expected RFC 3339 or YYYY-MM-DD", s))?;
    date.and_hms_opt(0, 0, 0)
        .map(|naive| naive.and_utc())
        .ok_or_else(|| anyhow::anyhow!("Invalid date '{}'", s))
}
