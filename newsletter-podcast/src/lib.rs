pub mod config;
pub mod dedup;
pub mod episode;
pub mod fetcher;
pub mod llm_adapter;
pub mod normalize;
pub mod parser;
pub mod pipeline;
pub mod publisher;
pub mod render;
pub mod sources;
pub mod state;
pub mod traits;
pub mod tts;
pub mod types;
pub mod utils;

pub use config::AppConfig;
pub use dedup::{DedupRecord, DedupStore};
pub use episode::EpisodeBuilder;
pub use fetcher::Fetcher;
pub use normalize::ContentNormalizer;
pub use parser::FeedParser;
pub use pipeline::{Pipeline, RunReport};
pub use publisher::FeedPublisher;
pub use state::{PersistedState, StateManager};
pub use traits::NewsletterSource;
pub use tts::SpeechSynthesizer;
pub use types::*;
