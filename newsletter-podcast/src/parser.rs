use crate::types::{NewsletterItem, ParsedEntry, ParsedFeed, PublisherError, Result};
use chrono::{DateTime, Utc};
use feed_rs::parser;
use std::collections::HashSet;
use tracing::{debug, info};

#[derive(Debug, Default)]
pub struct FeedParser;

impl FeedParser {
    pub fn new() -> Self {
        Self
    }

    /// Parses an RSS or Atom document. Entries repeated within the document
    /// are collapsed to their first occurrence.
    pub fn parse_feed(&self, content: &str) -> Result<ParsedFeed> {
        debug!("Parsing feed content ({} bytes)", content.len());

        // Entries without an id stay without one, so the link becomes their key
        let feed = parser::Builder::new()
            .id_generator(|_links, _title, _uri| String::new())
            .build()
            .parse(content.as_bytes())
            .map_err(|e| PublisherError::Parse(format!("Failed to parse feed: {}", e)))?;

        let title = feed.title.map(|t| t.content);
        let description = feed.description.map(|d| d.content);

        let mut seen_guids = HashSet::new();
        let mut seen_urls = HashSet::new();
        let mut entries = Vec::new();

        for entry in feed.entries {
            let Some(parsed) = Self::parse_entry(entry) else {
                continue;
            };

            if let Some(guid) = &parsed.guid {
                if !seen_guids.insert(guid.clone()) {
                    debug!("Skipping duplicate entry with GUID: {}", guid);
                    continue;
                }
            } else if !seen_urls.insert(parsed.url.clone()) {
                debug!("Skipping duplicate entry with URL: {}", parsed.url);
                continue;
            }
            entries.push(parsed);
        }

        info!("Parsed feed with {} entries", entries.len());

        Ok(ParsedFeed {
            title,
            description,
            entries,
        })
    }

    fn parse_entry(entry: feed_rs::model::Entry) -> Option<ParsedEntry> {
        let title = entry
            .title
            .map(|t| t.content.trim().to_string())
            .filter(|t| !t.is_empty())
            .unwrap_or_else(|| "Untitled".to_string());

        let url = entry
            .links
            .first()
            .map(|link| link.href.trim().to_string())
            .unwrap_or_default();

        let guid = Some(entry.id.trim().to_string()).filter(|id| !id.is_empty());

        // Without either identity the item could never be deduplicated
        if guid.is_none() && url.is_empty() {
            debug!("Skipping entry without guid or link: {}", title);
            return None;
        }

        // Prefer full content over summary
        let content = entry
            .content
            .and_then(|c| c.body)
            .or_else(|| entry.summary.map(|s| s.content));

        let author = entry
            .authors
            .first()
            .map(|a| a.name.trim().to_string())
            .filter(|a| !a.is_empty());

        let published_at = entry
            .published
            .or(entry.updated)
            .map(|dt| dt.with_timezone(&Utc));

        Some(ParsedEntry {
            guid,
            url,
            title,
            content,
            author,
            published_at,
        })
    }

    /// Converts parsed entries into newsletter items. Entries without a date
    /// take the fetch time.
    pub fn into_items(parsed_feed: ParsedFeed, fetch_time: DateTime<Utc>) -> Vec<NewsletterItem> {
        parsed_feed
            .entries
            .into_iter()
            .map(|entry| NewsletterItem {
                guid: entry.guid,
                link: entry.url,
                title: entry.title,
                author: entry.author,
                raw_content: entry.content.unwrap_or_default(),
                published_at: entry.published_at.unwrap_or(fetch_time),
            })
            .collect()
    }

    pub fn is_valid_feed_content(content: &str) -> bool {
        let content_lower = content.to_lowercase();

        let has_rss_indicators = content_lower.contains("<rss")
            || content_lower.contains("<feed")
            || content_lower.contains("xmlns=\"http://www.w3.org/2005/atom\"")
            || content_lower.contains("xmlns:atom")
            || content_lower.contains("<channel");

        let has_xml_declaration = content.trim_start().starts_with("<?xml");

        has_rss_indicators && (has_xml_declaration || content_lower.contains('<'))
    }

    pub fn normalize_encoding(content: &str) -> Result<String> {
        let normalized = content
            .trim_start_matches('\u{feff}')
            .replace("\r\n", "\n")
            .replace('\r', "\n")
            .trim()
            .to_string();

        if normalized.is_empty() {
            return Err(PublisherError::Parse(
                "Empty content after normalization".to_string(),
            ));
        }

        Ok(normalized)
    }
}
