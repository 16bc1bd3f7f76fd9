//! Drive primitive and response feed.

use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::error::Result;

/// Something that can provoke a page into loading more data.
#[async_trait]
pub trait PageDriver: Send {
    /// Perform one drive step (typically a scroll).
    async fn advance(&mut self) -> Result<()>;

    /// Wait for the page to react to the last drive step.
    async fn settle(&mut self, delay: Duration) {
        tokio::time::sleep(delay).await;
    }
}

/// A network response observed while the page was being driven.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InterceptedResponse {
    pub url: String,
    pub status: u16,
    pub body: String,
}

impl InterceptedResponse {
    pub fn new(url: impl Into<String>, status: u16, body: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            status,
            body: body.into(),
        }
    }
}

pub type ResponseFeed = mpsc::Receiver<InterceptedResponse>;
pub type ResponseSender = mpsc::Sender<InterceptedResponse>;

pub fn response_channel(capacity: usize) -> (ResponseSender, ResponseFeed) {
    mpsc::channel(capacity)
}
