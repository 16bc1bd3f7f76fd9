//! Network response interception.
//!
//! Responses are pre-filtered by URL signature when their headers arrive;
//! the body is fetched once loading finishes and pushed onto the feed.

use std::collections::HashMap;

use anyhow::{Context, Result};
use chromiumoxide::cdp::browser_protocol::network::{
    EnableParams, EventLoadingFinished, EventResponseReceived, GetResponseBodyParams, RequestId,
};
use chromiumoxide::Page;
use futures::StreamExt;
use tokio::task::JoinHandle;
use tracing::debug;

use crate::harvest::{matches_signature, InterceptedResponse, ResponseSender};
use crate::models::ListingKind;

/// Start forwarding `kind`'s pagination responses from `page` into `tx`.
///
/// Must be called before navigation so the initial requests are seen.
pub async fn spawn_interceptor(
    page: &Page,
    kind: ListingKind,
    tx: ResponseSender,
) -> Result<JoinHandle<()>> {
    page.execute(EnableParams::default())
        .await
        .context("Failed to enable network events")?;

    let mut responses = page.event_listener::<EventResponseReceived>().await?;
    let mut finished = page.event_listener::<EventLoadingFinished>().await?;
    let page = page.clone();

    Ok(tokio::spawn(async move {
        let mut pending: HashMap<RequestId, (String, u16)> = HashMap::new();

        loop {
            tokio::select! {
                Some(event) = responses.next() => {
                    let url = &event.response.url;
                    if matches_signature(kind, url) {
                        let status = u16::try_from(event.response.status).unwrap_or(0);
                        pending.insert(event.request_id.clone(), (url.clone(), status));
                    }
                }
                Some(event) = finished.next() => {
                    let Some((url, status)) = pending.remove(&event.request_id) else {
                        continue;
                    };
                    let body = match page
                        .execute(GetResponseBodyParams::new(event.request_id.clone()))
                        .await
                    {
                        Ok(resp) if !resp.result.base64_encoded => resp.result.body.clone(),
                        Ok(_) => {
                            debug!("Skipping binary response body: {}", url);
                            continue;
                        }
                        Err(e) => {
                            debug!("Failed to read response body for {}: {}", url, e);
                            continue;
                        }
                    };
                    if tx.send(InterceptedResponse::new(url, status, body)).await.is_err() {
                        break;
                    }
                }
                else => break,
            }
        }
    }))
}
