use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A newsletter entry as handed over by a feed source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewsletterItem {
    pub guid: Option<String>,
    pub link: String,
    pub title: String,
    pub author: Option<String>,
    /// Raw HTML (or plain text) body as published.
    pub raw_content: String,
    pub published_at: DateTime<Utc>,
}

impl NewsletterItem {
    /// Identity used for deduplication: the guid, or the link when the feed
    /// does not provide one.
    pub fn item_key(&self) -> &str {
        match self.guid.as_deref().map(str::trim) {
            Some(guid) if !guid.is_empty() => guid,
            _ => self.link.trim(),
        }
    }
}

/// How the new items of a run are grouped into episodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EpisodeMode {
    /// All new items of the run become one episode.
    #[default]
    Compilation,
    /// Every new item becomes its own episode.
    Separate,
}

impl EpisodeMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            EpisodeMode::Compilation => "compilation",
            EpisodeMode::Separate => "separate",
        }
    }
}

impl fmt::Display for EpisodeMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Encoded audio produced by a speech synthesizer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioArtifact {
    pub bytes: Vec<u8>,
    pub duration_seconds: u64,
    pub mime_type: String,
}

impl AudioArtifact {
    /// Wraps MP3 bytes, estimating the duration from a constant bitrate.
    pub fn mp3(bytes: Vec<u8>, bitrate_kbps: u32) -> Self {
        let bits = bytes.len() as u64 * 8;
        let bits_per_second = u64::from(bitrate_kbps.max(1)) * 1000;
        let duration_seconds = if bytes.is_empty() {
            0
        } else {
            bits.div_ceil(bits_per_second)
        };
        Self {
            bytes,
            duration_seconds,
            mime_type: "audio/mpeg".to_owned(),
        }
    }

    pub fn byte_size(&self) -> u64 {
        self.bytes.len() as u64
    }
}

// Object style note:
// Everything here is consumed by a short lived batch process. Sources,
// synthesizers and rewriters are collaborators behind narrow traits in the
// publisher crate; this crate only fixes the data they exchange.

#[cfg(test)]
mod tests {
    use super::*;

    fn item(guid: Option<&str>, link: &str) -> NewsletterItem {
        NewsletterItem {
            guid: guid.map(str::to_owned),
            link: link.to_owned(),
            title: "Title".to_owned(),
            author: None,
            raw_content: String::new(),
            published_at: Utc::now(),
        }
    }

    #[test]
    fn item_key_prefers_guid_then_link() {
        assert_eq!(item(Some("guid-1"), "https://a/1").item_key(), "guid-1");
        assert_eq!(item(None, "https://a/1").item_key(), "https://a/1");
        assert_eq!(item(Some("   "), "https://a/2").item_key(), "https://a/2");
    }

    #[test]
    fn mp3_duration_is_estimated_from_bitrate() {
        let audio = AudioArtifact::mp3(vec![0u8; 32_000], 128);
        assert_eq!(audio.duration_seconds, 2);
        assert_eq!(audio.byte_size(), 32_000);
        assert_eq!(AudioArtifact::mp3(Vec::new(), 128).duration_seconds, 0);
    }

    #[test]
    fn mode_serializes_snake_case() {
        assert_eq!(EpisodeMode::Separate.to_string(), "separate");
        assert_eq!(EpisodeMode::default(), EpisodeMode::Compilation);
    }
}
