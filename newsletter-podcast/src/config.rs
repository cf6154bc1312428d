use crate::types::{EpisodeMode, FeedMetadata, FetchConfig, PublisherError, Result};
use crate::utils::url::is_valid_feed_url;
use serde::{Deserialize, Serialize};
use std::env;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Top-level YAML configuration. Every section is optional.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub site: SiteConfig,
    pub feed: FeedSettings,
    pub output: OutputConfig,
    pub mode: EpisodeMode,
    pub tts: TtsConfig,
    pub clean: CleanConfig,
    pub llm: LlmConfig,
    pub logging: LoggingConfig,
    pub state_path: PathBuf,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            site: SiteConfig::default(),
            feed: FeedSettings::default(),
            output: OutputConfig::default(),
            mode: EpisodeMode::default(),
            tts: TtsConfig::default(),
            clean: CleanConfig::default(),
            llm: LlmConfig::default(),
            logging: LoggingConfig::default(),
            state_path: PathBuf::from("data/state.json"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SiteConfig {
    pub title: String,
    /// Public base URL the output directory is served from.
    pub link: String,
    pub description: String,
    pub language: String,
    pub image_url: String,
    pub author: String,
    pub owner: OwnerConfig,
}

impl Default for SiteConfig {
    fn default() -> Self {
        Self {
            title: "Newsletter Podcast".to_string(),
            link: "http://localhost/".to_string(),
            description: "Auto podcast feed".to_string(),
            language: "en-us".to_string(),
            image_url: String::new(),
            author: String::new(),
            owner: OwnerConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct OwnerConfig {
    pub name: String,
    pub email: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FeedSettings {
    pub name: String,
    pub url: String,
    pub fetch: FetchConfig,
}

impl Default for FeedSettings {
    fn default() -> Self {
        Self {
            name: "Axios".to_string(),
            url: "https://www.axios.com/feeds/feed.rss".to_string(),
            fetch: FetchConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    pub root_dir: PathBuf,
    pub audio_dir: String,
    pub feed_filename: String,
    pub index_filename: String,
    /// Caps the number of items rendered into the feed document.
    pub max_feed_episodes: usize,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            root_dir: PathBuf::from("docs"),
            audio_dir: "audio".to_string(),
            feed_filename: "feed.xml".to_string(),
            index_filename: "index.html".to_string(),
            max_feed_episodes: 200,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TtsProvider {
    #[default]
    Google,
    OpenAi,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TtsConfig {
    pub enabled: bool,
    pub provider: TtsProvider,
    pub language_code: String,
    pub voice_name: String,
    pub speaking_rate: f64,
    pub pitch: f64,
    pub volume_gain_db: f64,
    pub openai_model: String,
    pub openai_voice: String,
    pub max_chars_per_chunk: usize,
    pub max_retries: u32,
    pub initial_retry_delay_secs: f64,
    /// Upper bound for one draft's synthesis, enforced by the publisher.
    pub timeout_secs: u64,
    pub concurrency: usize,
    pub google_api_key_env: String,
    pub openai_api_key_env: String,
    pub google_base_url: Option<String>,
    pub openai_base_url: Option<String>,
}

impl Default for TtsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            provider: TtsProvider::Google,
            language_code: "en-US".to_string(),
            voice_name: "en-US-Standard-C".to_string(),
            speaking_rate: 1.0,
            pitch: 0.0,
            volume_gain_db: 0.0,
            openai_model: "gpt-4o-mini-tts".to_string(),
            openai_voice: "alloy".to_string(),
            max_chars_per_chunk: 4500,
            max_retries: 3,
            initial_retry_delay_secs: 2.0,
            timeout_secs: 600,
            concurrency: 1,
            google_api_key_env: "GOOGLE_TTS_API_KEY".to_string(),
            openai_api_key_env: "OPENAI_API_KEY".to_string(),
            google_base_url: None,
            openai_base_url: None,
        }
    }
}

impl TtsConfig {
    pub fn api_key_env(&self) -> &str {
        match self.provider {
            TtsProvider::Google => &self.google_api_key_env,
            TtsProvider::OpenAi => &self.openai_api_key_env,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CleanConfig {
    pub remove_emoji: bool,
    pub remove_ads: bool,
    pub ad_keywords: Vec<String>,
}

impl Default for CleanConfig {
    fn default() -> Self {
        Self {
            remove_emoji: true,
            remove_ads: true,
            ad_keywords: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    pub rewrite_enabled: bool,
    pub model: String,
    pub api_key_env: String,
    pub base_url: Option<String>,
    pub max_chunk_chars: usize,
    pub timeout_secs: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            rewrite_enabled: false,
            model: "gpt-4o-mini".to_string(),
            api_key_env: "OPENAI_API_KEY".to_string(),
            base_url: None,
            max_chunk_chars: 3200,
            timeout_secs: 120,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl AppConfig {
    pub fn load(path: &Path) -> Result<Self> {
        debug!("Loading configuration from {}", path.display());
        let raw = std::fs::read_to_string(path).map_err(|e| {
            PublisherError::Configuration(format!("cannot read {}: {}", path.display(), e))
        })?;
        Self::from_yaml_str(&raw)
    }

    pub fn from_yaml_str(raw: &str) -> Result<Self> {
        // An empty document deserializes to unit, not to an empty mapping
        if raw.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(raw)
            .map_err(|e| PublisherError::Configuration(format!("invalid configuration: {}", e)))
    }

    /// Structural checks that must pass before anything is fetched.
    pub fn validate(&self) -> Result<()> {
        if !is_valid_feed_url(&self.feed.url) {
            return Err(PublisherError::Configuration(format!(
                "feed.url must be an http(s) URL, got '{}'",
                self.feed.url
            )));
        }
        if url::Url::parse(&self.site.link).is_err() {
            return Err(PublisherError::Configuration(format!(
                "site.link is not a valid URL: '{}'",
                self.site.link
            )));
        }
        if self.tts.max_chars_per_chunk == 0 {
            return Err(PublisherError::Configuration(
                "tts.max_chars_per_chunk must be greater than zero".to_string(),
            ));
        }
        if self.tts.concurrency == 0 {
            return Err(PublisherError::Configuration(
                "tts.concurrency must be at least 1".to_string(),
            ));
        }
        if self.tts.timeout_secs == 0 {
            return Err(PublisherError::Configuration(
                "tts.timeout_secs must be greater than zero".to_string(),
            ));
        }
        if !self.tts.initial_retry_delay_secs.is_finite() || self.tts.initial_retry_delay_secs < 0.0 {
            return Err(PublisherError::Configuration(
                "tts.initial_retry_delay_secs must be a non-negative number".to_string(),
            ));
        }
        if self.output.max_feed_episodes == 0 {
            return Err(PublisherError::Configuration(
                "output.max_feed_episodes must be greater than zero".to_string(),
            ));
        }
        if self.llm.rewrite_enabled && self.llm.max_chunk_chars == 0 {
            return Err(PublisherError::Configuration(
                "llm.max_chunk_chars must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    /// Checks that every enabled provider has its credential in the
    /// environment. Missing credentials are fatal.
    pub fn require_credentials(&self) -> Result<()> {
        if self.tts.enabled {
            read_secret(self.tts.api_key_env())?;
        }
        if self.llm.rewrite_enabled {
            read_secret(&self.llm.api_key_env)?;
        }
        Ok(())
    }

    /// Soft problems worth logging that do not stop a run.
    pub fn warnings(&self) -> Vec<String> {
        let mut warnings = Vec::new();
        if self.site.owner.email.trim().is_empty() {
            warnings.push("site.owner.email is empty; some podcast directories require it".to_string());
        }
        if self.site.image_url.trim().is_empty() {
            warnings.push("site.image_url is empty; the feed will have no artwork".to_string());
        }
        if self.site.link.contains("localhost") {
            warnings.push(format!(
                "site.link points at {}; enclosure URLs will not be reachable publicly",
                self.site.link
            ));
        }
        if !self.tts.enabled {
            warnings.push("tts.enabled is false; every episode will be text-only".to_string());
        }
        warnings
    }

    pub fn feed_metadata(&self) -> FeedMetadata {
        FeedMetadata {
            title: self.site.title.clone(),
            link: self.site.link.clone(),
            description: self.site.description.clone(),
            language: self.site.language.clone(),
            author: self.site.author.clone(),
            owner_name: self.site.owner.name.clone(),
            owner_email: self.site.owner.email.clone(),
            image_url: self.site.image_url.clone(),
        }
    }
}

/// Reads a credential from the environment variable named in the config.
pub fn read_secret(env_name: &str) -> Result<String> {
    match env::var(env_name) {
        Ok(value) if !value.trim().is_empty() => Ok(value.trim().to_string()),
        _ => Err(PublisherError::Configuration(format!(
            "missing credential: environment variable {} is not set",
            env_name
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_fill_missing_sections() {
        let config = AppConfig::from_yaml_str("mode: separate\nsite:\n  title: Daily\n").unwrap();
        assert_eq!(config.mode, EpisodeMode::Separate);
        assert_eq!(config.site.title, "Daily");
        assert_eq!(config.site.language, "en-us");
        assert_eq!(config.feed.name, "Axios");
        assert_eq!(config.tts.max_chars_per_chunk, 4500);
        assert_eq!(config.output.max_feed_episodes, 200);
        assert_eq!(config.state_path, PathBuf::from("data/state.json"));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn empty_document_uses_defaults() {
        let config = AppConfig::from_yaml_str("").unwrap();
        assert_eq!(config.mode, EpisodeMode::Compilation);
        assert_eq!(config.tts.provider, TtsProvider::Google);
    }

    #[test]
    fn unknown_mode_is_a_configuration_error() {
        let err = AppConfig::from_yaml_str("mode: weekly\n").unwrap_err();
        assert!(matches!(err, PublisherError::Configuration(_)));
    }

    #[test]
    fn invalid_values_fail_validation() {
        let mut config = AppConfig::default();
        config.tts.max_chars_per_chunk = 0;
        assert!(matches!(config.validate(), Err(PublisherError::Configuration(_))));

        let mut config = AppConfig::default();
        config.feed.url = "file:///tmp/feed.xml".to_string();
        assert!(matches!(config.validate(), Err(PublisherError::Configuration(_))));
    }

    #[test]
    fn missing_credential_is_fatal() {
        let mut config = AppConfig::default();
        config.tts.provider = TtsProvider::OpenAi;
        config.tts.openai_api_key_env = "NEWSLETTER_PODCAST_TEST_MISSING_KEY".to_string();
        let err = config.require_credentials().unwrap_err();
        assert!(err.to_string().contains("NEWSLETTER_PODCAST_TEST_MISSING_KEY"));

        config.tts.enabled = false;
        assert!(config.require_credentials().is_ok());
    }

    #[test]
    fn warnings_flag_incomplete_metadata() {
        let config = AppConfig::default();
        let warnings = config.warnings();
        assert!(warnings.iter().any(|w| w.contains("owner.email")));
        assert!(warnings.iter().any(|w| w.contains("image_url")));
    }

    #[test]
    fn provider_names_parse() {
        let config = AppConfig::from_yaml_str("tts:\n  provider: openai\n").unwrap();
        assert_eq!(config.tts.provider, TtsProvider::OpenAi);
        assert_eq!(config.tts.api_key_env(), "OPENAI_API_KEY");
    }
}
