#![allow(dead_code)]

use chrono::{DateTime, TimeZone, Utc};
use newsletter_podcast::llm_adapter::PassthroughRewriter;
use newsletter_podcast::tts::MockSynthesizer;
use newsletter_podcast::{AppConfig, EpisodeMode, NewsletterItem, Pipeline};
use std::path::Path;
use std::sync::{Arc, Once};

static INIT: Once = Once::new();

pub fn init_tracing() {
    INIT.call_once(|| {
        tracing_subscriber::fmt()
            .with_max_level(tracing::Level::DEBUG)
            .with_test_writer()
            .try_init()
            .ok();
    });
}

pub fn at(day: u32, hour: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 10, day, hour, 0, 0).unwrap()
}

pub fn item(guid: &str, title: &str, body: &str, published_at: DateTime<Utc>) -> NewsletterItem {
    NewsletterItem {
        guid: Some(guid.to_string()),
        link: format!("https://www.axios.com/newsletters/{}", guid),
        title: title.to_string(),
        author: Some("Mike Allen".to_string()),
        raw_content: format!("<p>{}</p><p>Go deeper.</p>", body),
        published_at,
    }
}

pub fn config(root: &Path, mode: EpisodeMode) -> AppConfig {
    let mut config = AppConfig::default();
    config.mode = mode;
    config.site.title = "Axios Audio".to_string();
    config.site.link = "https://example.github.io/axios-pod/".to_string();
    config.site.owner.email = "owner@example.com".to_string();
    config.output.root_dir = root.join("docs");
    config.state_path = root.join("data/state.json");
    config
}

pub fn pipeline(config: AppConfig, synthesizer: Arc<MockSynthesizer>) -> Pipeline {
    Pipeline::with_components(config, synthesizer, Arc::new(PassthroughRewriter))
}
