use crate::traits::NewsletterSource;
use crate::types::{NewsletterItem, PublisherError, Result};
use async_trait::async_trait;
use tracing::debug;

/// In-memory source that returns a fixed list of items.
/// Used for tests and for replaying saved feeds.
#[derive(Debug, Clone, Default)]
pub struct StaticSource {
    name: String,
    items: Vec<NewsletterItem>,
    failure: Option<String>,
    pulls: usize,
}

impl StaticSource {
    pub fn new(name: impl Into<String>, items: Vec<NewsletterItem>) -> Self {
        Self {
            name: name.into(),
            items,
            failure: None,
            pulls: 0,
        }
    }

    /// A source whose every pull fails like an unreachable feed.
    pub fn failing(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            items: Vec::new(),
            failure: Some(message.into()),
            pulls: 0,
        }
    }

    pub fn set_items(&mut self, items: Vec<NewsletterItem>) {
        self.items = items;
    }

    pub fn pulls(&self) -> usize {
        self.pulls
    }
}

#[async_trait]
impl NewsletterSource for StaticSource {
    fn source_name(&self) -> String {
        self.name.clone()
    }

    async fn pull(&mut self) -> Result<Vec<NewsletterItem>> {
        self.pulls += 1;
        if let Some(message) = &self.failure {
            return Err(PublisherError::Fetch(message.clone()));
        }
        debug!("Static source {} returning {} items", self.name, self.items.len());
        Ok(self.items.clone())
    }
}
