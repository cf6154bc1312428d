use crate::traits::NewsletterSource;
use crate::types::{FetchConfig, NewsletterItem, PublisherError, Result};
use crate::{FeedParser, Fetcher};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::{error, info, warn};

/// Newsletter delivered as an RSS or Atom feed
pub struct RssFeedSource {
    pub url: String,
    pub title: Option<String>,
    fetcher: Fetcher,
    parser: FeedParser,
    last_fetch: Option<DateTime<Utc>>,
    last_etag: Option<String>,
    last_modified: Option<String>,
}

impl RssFeedSource {
    pub fn new(url: String, fetch_config: FetchConfig) -> Result<Self> {
        Ok(Self {
            url,
            title: None,
            fetcher: Fetcher::new(fetch_config)?,
            parser: FeedParser::new(),
            last_fetch: None,
            last_etag: None,
            last_modified: None,
        })
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn last_fetch(&self) -> Option<DateTime<Utc>> {
        self.last_fetch
    }
}

#[async_trait]
impl NewsletterSource for RssFeedSource {
    fn source_name(&self) -> String {
        self.title.clone().unwrap_or_else(|| {
            // Extract domain name from URL as fallback
            if let Ok(parsed) = url::Url::parse(&self.url) {
                if let Some(domain) = parsed.domain() {
                    return format!("RSS Feed ({})", domain);
                }
            }
            "RSS Feed".to_string()
        })
    }

    async fn pull(&mut self) -> Result<Vec<NewsletterItem>> {
        info!("Pulling RSS feed: {}", self.url);

        let fetch_result = self
            .fetcher
            .fetch_feed(
                &self.url,
                self.last_etag.as_deref(),
                self.last_modified.as_deref(),
            )
            .await?;

        if !fetch_result.success {
            let error_msg = fetch_result
                .error
                .unwrap_or_else(|| "Fetch failed".to_string());
            error!("Failed to fetch RSS feed {}: {}", self.url, error_msg);
            return Err(PublisherError::Fetch(error_msg));
        }

        self.last_fetch = Some(fetch_result.fetch_time);
        self.last_etag = fetch_result.etag.clone();
        self.last_modified = fetch_result.last_modified.clone();

        let content = match fetch_result.content {
            Some(content) => content,
            None => {
                warn!("No content returned for RSS feed {}", self.url);
                return Ok(Vec::new());
            }
        };

        let content = FeedParser::normalize_encoding(&content)?;
        if !FeedParser::is_valid_feed_content(&content) {
            return Err(PublisherError::Parse(format!(
                "{} did not return an RSS or Atom document",
                self.url
            )));
        }

        let parsed_feed = self.parser.parse_feed(&content)?;
        if self.title.is_none() {
            self.title = parsed_feed.title.clone();
        }

        let items = FeedParser::into_items(parsed_feed, fetch_result.fetch_time);
        info!("Successfully pulled {} items from RSS feed {}", items.len(), self.url);
        Ok(items)
    }
}
