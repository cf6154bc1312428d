use crate::types::{NewsletterItem, Result};
use async_trait::async_trait;

/// Trait for pulling newsletter items from a source (RSS feed, fixtures, ...)
#[async_trait]
pub trait NewsletterSource: Send + Sync {
    /// Human-readable name for this source
    fn source_name(&self) -> String;

    /// Fetch the items currently listed by the source.
    /// Deduplication against earlier runs happens downstream.
    async fn pull(&mut self) -> Result<Vec<NewsletterItem>>;
}
