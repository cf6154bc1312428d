use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// Use the interfaces crate for the data shared with collaborators
pub use interfaces::defs::{AudioArtifact, EpisodeMode, NewsletterItem};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FetchConfig {
    pub user_agent: String,
    pub timeout_seconds: u64,
    pub max_retries: u32,
    pub retry_delay_seconds: u64,
    pub max_feed_size_mb: usize,
    pub max_redirects: usize,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            user_agent: "Newsletter-Podcast/1.0".to_string(),
            timeout_seconds: 30,
            max_retries: 3,
            retry_delay_seconds: 5,
            max_feed_size_mb: 10,
            max_redirects: 5,
        }
    }
}

#[derive(Debug, Clone)]
pub struct FetchResult {
    pub success: bool,
    pub error: Option<String>,
    pub fetch_time: DateTime<Utc>,
    pub response_time_ms: u64,
    pub http_status: Option<u16>,
    pub etag: Option<String>,
    pub last_modified: Option<String>,
    pub content: Option<String>, // RSS/XML content
}

#[derive(Debug)]
pub struct ParsedFeed {
    pub title: Option<String>,
    pub description: Option<String>,
    pub entries: Vec<ParsedEntry>,
}

#[derive(Debug)]
pub struct ParsedEntry {
    pub guid: Option<String>,
    pub url: String,
    pub title: String,
    pub content: Option<String>,
    pub author: Option<String>,
    pub published_at: Option<DateTime<Utc>>,
}

/// Speakable text plus the HTML used for episode descriptions.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CleanedContent {
    pub text: String,
    pub description_html: String,
}

/// A fetched item after normalization, keyed for deduplication.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceItem {
    pub item: NewsletterItem,
    pub key: String,
    pub fingerprint: String,
    pub content: CleanedContent,
}

/// Items grouped for one episode, waiting for synthesis.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EpisodeDraft {
    pub episode_id: String,
    pub mode: EpisodeMode,
    pub source_items: Vec<SourceItem>,
    pub title: String,
    pub text: String,
    pub description_html: String,
    pub published_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    /// File stem for the audio and transcript artifacts.
    pub slug: String,
}

impl EpisodeDraft {
    pub fn link(&self) -> String {
        self.source_items
            .iter()
            .map(|source| source.item.link.as_str())
            .find(|link| !link.is_empty())
            .unwrap_or_default()
            .to_string()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AudioRef {
    pub uri: String,
    pub duration_seconds: u64,
    pub byte_size: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum EpisodeStatus {
    Synthesized,
    TextOnly { failure_reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EpisodeComponent {
    pub title: String,
    pub link: String,
}

/// A published feed entry. Never rewritten once it is in the feed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Episode {
    pub episode_id: String,
    pub mode: EpisodeMode,
    pub title: String,
    pub link: String,
    pub description: String,
    pub published_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audio: Option<AudioRef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transcript_uri: Option<String>,
    #[serde(default)]
    pub components: Vec<EpisodeComponent>,
    pub status: EpisodeStatus,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FeedMetadata {
    pub title: String,
    pub link: String,
    pub description: String,
    pub language: String,
    pub author: String,
    pub owner_name: String,
    pub owner_email: String,
    pub image_url: String,
}

/// Feed-level metadata plus every published episode, newest first.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PodcastFeedState {
    #[serde(default)]
    pub metadata: FeedMetadata,
    #[serde(default)]
    pub episodes: Vec<Episode>,
}

impl PodcastFeedState {
    pub fn contains(&self, episode_id: &str) -> bool {
        self.episodes.iter().any(|ep| ep.episode_id == episode_id)
    }

    /// Adds an episode unless one with the same id is already published.
    /// Returns whether the feed changed.
    pub fn insert_episode(&mut self, episode: Episode) -> bool {
        if self.contains(&episode.episode_id) {
            return false;
        }
        self.episodes.push(episode);
        self.sort_episodes();
        true
    }

    fn sort_episodes(&mut self) {
        self.episodes.sort_by(|a, b| {
            b.published_at
                .cmp(&a.published_at)
                .then_with(|| a.episode_id.cmp(&b.episode_id))
        });
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SynthesisError {
    #[error("{provider} rate limit or quota exceeded: {detail}")]
    RateLimited { provider: String, detail: String },

    #[error("{provider} provider error{}: {detail}", status.map(|s| format!(" (HTTP {s})")).unwrap_or_default())]
    Provider {
        provider: String,
        status: Option<u16>,
        detail: String,
    },

    #[error("network failure talking to {provider}: {detail}")]
    Network { provider: String, detail: String },

    #[error("synthesis timed out after {seconds}s")]
    Timeout { seconds: u64 },

    #[error("{provider} returned no audio")]
    EmptyAudio { provider: String },

    #[error("speech synthesis is disabled")]
    Disabled,
}

impl SynthesisError {
    /// Human-readable reason used in episode descriptions and logs.
    pub fn reason(&self) -> String {
        self.to_string()
    }

    pub fn is_retryable(&self) -> bool {
        match self {
            SynthesisError::RateLimited { .. }
            | SynthesisError::Network { .. }
            | SynthesisError::EmptyAudio { .. } => true,
            SynthesisError::Provider { status, .. } => status.map_or(true, |s| s >= 500),
            SynthesisError::Timeout { .. } | SynthesisError::Disabled => false,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum PublisherError {
    #[error("Fetch error: {0}")]
    Fetch(String),

    #[error("Feed parse error: {0}")]
    Parse(String),

    #[error("Persistence error at {path}: {reason}")]
    Persistence { path: String, reason: String },

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Render error: {0}")]
    Render(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("General error: {0}")]
    General(String),
}

impl PublisherError {
    pub fn persistence(path: &std::path::Path, reason: impl std::fmt::Display) -> Self {
        PublisherError::Persistence {
            path: path.display().to_string(),
            reason: reason.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, PublisherError>;
