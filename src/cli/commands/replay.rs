//! Offline replay command.

use std::path::Path;
use std::sync::Arc;

use anyhow::Context;

use crate::config::Settings;
use crate::harvest::{HarvestSession, MemoryTaskQueue, RecordedSession};

use super::helpers::{open_sink, print_report, write_enqueued};
use super::OutputArgs;

/// Replay a recorded session through the harvest pipeline.
pub async fn cmd_replay(
    settings: &Settings,
    session_path: &Path,
    settle_ms: u64,
    output: &OutputArgs,
) -> anyhow::Result<()> {
    let recording = RecordedSession::load(session_path)
        .await
        .with_context(|| format!("Failed to load recorded session {}", session_path.display()))?;
    let (run, mut driver, feed) = recording.into_parts();

    let mut harvest = settings.harvest.clone();
    harvest.settle_delay_ms = settle_ms;

    let sink = open_sink(output, run.identity.limit).await?;
    let progress = sink.progress();
    let queue = MemoryTaskQueue::new();
    let session = HarvestSession::new(harvest, sink, Some(Arc::new(queue.clone())));

    let report = session.run_listing(run, &mut driver, feed).await?;
    progress.finish_and_clear();

    if let Some(ref path) = output.enqueue_output {
        write_enqueued(&queue, path).await?;
    }
    print_report(&report, &queue).await;
    Ok(())
}
