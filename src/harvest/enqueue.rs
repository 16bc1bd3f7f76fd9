//! Task enqueueing for listings whose items are scraped as separate pages.

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::error::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EnqueueOutcome {
    pub was_already_present: bool,
}

/// Accepts detail-page URLs for later scraping.
#[async_trait]
pub trait TaskEnqueuer: Send + Sync {
    async fn enqueue(&self, url: &str) -> Result<EnqueueOutcome>;
}

/// In-memory queue that remembers insertion order and drops repeats.
#[derive(Debug, Clone, Default)]
pub struct MemoryTaskQueue {
    inner: Arc<Mutex<QueueInner>>,
}

#[derive(Debug, Default)]
struct QueueInner {
    seen: HashSet<String>,
    urls: Vec<String>,
}

impl MemoryTaskQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// URLs in the order they were first enqueued.
    pub async fn urls(&self) -> Vec<String> {
        self.inner.lock().await.urls.clone()
    }

    pub async fn len(&self) -> usize {
        self.inner.lock().await.urls.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.lock().await.urls.is_empty()
    }
}

#[async_trait]
impl TaskEnqueuer for MemoryTaskQueue {
    async fn enqueue(&self, url: &str) -> Result<EnqueueOutcome> {
        let mut inner = self.inner.lock().await;
        let was_already_present = !inner.seen.insert(url.to_string());
        if !was_already_present {
            inner.urls.push(url.to_string());
        }
        Ok(EnqueueOutcome {
            was_already_present,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_repeat_enqueue_is_reported() {
        let queue = MemoryTaskQueue::new();
        let first = queue.enqueue("https://www.instagram.com/p/A").await.unwrap();
        let second = queue.enqueue("https://www.instagram.com/p/A").await.unwrap();
        queue.enqueue("https://www.instagram.com/p/B").await.unwrap();

        assert!(!first.was_already_present);
        assert!(second.was_already_present);
        assert_eq!(
            queue.urls().await,
            vec![
                "https://www.instagram.com/p/A".to_string(),
                "https://www.instagram.com/p/B".to_string()
            ]
        );
    }
}
