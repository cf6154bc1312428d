use crate::config::AppConfig;
use crate::dedup::fingerprint;
use crate::episode::EpisodeBuilder;
use crate::llm_adapter::{build_rewriter, rewrite_or_keep, TextRewriter};
use crate::normalize::ContentNormalizer;
use crate::publisher::{FeedPublisher, PublishSettings};
use crate::state::{PersistedState, StateManager};
use crate::traits::NewsletterSource;
use crate::tts::{build_synthesizer, SpeechSynthesizer};
use crate::types::{NewsletterItem, Result, SourceItem};
use chrono::{DateTime, Utc};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Counters describing one run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunReport {
    pub fetched: usize,
    pub new_items: usize,
    pub episodes_created: usize,
    pub text_only: usize,
    pub committed: bool,
}

/// One batch pass: load state, pull the source, publish new items, commit.
pub struct Pipeline {
    config: AppConfig,
    normalizer: ContentNormalizer,
    builder: EpisodeBuilder,
    rewriter: Arc<dyn TextRewriter>,
    publisher: FeedPublisher,
    state_manager: StateManager,
}

impl Pipeline {
    /// Validates the configuration and builds the configured providers.
    pub fn from_config(config: AppConfig) -> Result<Self> {
        config.validate()?;
        config.require_credentials()?;
        let synthesizer = build_synthesizer(&config.tts)?;
        let rewriter = build_rewriter(&config.llm)?;
        Ok(Self::with_components(config, synthesizer, rewriter))
    }

    pub fn with_components(
        config: AppConfig,
        synthesizer: Arc<dyn SpeechSynthesizer>,
        rewriter: Arc<dyn TextRewriter>,
    ) -> Self {
        Self {
            normalizer: ContentNormalizer::new(&config.clean),
            builder: EpisodeBuilder::new(config.mode, config.feed.name.clone())
                .with_default_author(config.site.author.clone()),
            publisher: FeedPublisher::new(synthesizer, PublishSettings::from_config(&config)),
            state_manager: StateManager::new(config.state_path.clone()),
            rewriter,
            config,
        }
    }

    pub fn state_manager(&self) -> &StateManager {
        &self.state_manager
    }

    pub fn publisher(&self) -> &FeedPublisher {
        &self.publisher
    }

    pub async fn run(&self, source: &mut dyn NewsletterSource) -> Result<RunReport> {
        self.run_at(source, Utc::now()).await
    }

    /// Same as [`Pipeline::run`] with an explicit clock.
    ///
    /// Nothing is written when the source fails or yields no new items.
    /// Otherwise the state is committed once, after every draft reached a
    /// terminal state, and the feed artifacts are rendered from it. Media
    /// files of a run whose commit fails stay unreferenced and are
    /// overwritten when the rerun rebuilds the same episodes.
    pub async fn run_at(
        &self,
        source: &mut dyn NewsletterSource,
        now: DateTime<Utc>,
    ) -> Result<RunReport> {
        info!(
            "Starting {} run for {}",
            self.builder.mode(),
            source.source_name()
        );
        let mut state = self.state_manager.load()?;
        let items = source.pull().await?;

        let mut report = self.process(&mut state, items, now).await?;
        if report.new_items == 0 {
            info!("No new items; leaving state and feed untouched");
            return Ok(report);
        }

        // The feed only ever lists committed episodes
        self.state_manager.commit(&state)?;
        report.committed = true;
        self.publisher.write_feed_artifacts(&state.feed)?;

        info!(
            "Run finished: {} fetched, {} new, {} episode(s) created, {} text-only",
            report.fetched, report.new_items, report.episodes_created, report.text_only
        );
        Ok(report)
    }

    /// Filters, groups and publishes `items` into the in-memory `state`.
    pub async fn process(
        &self,
        state: &mut PersistedState,
        items: Vec<NewsletterItem>,
        now: DateTime<Utc>,
    ) -> Result<RunReport> {
        let mut report = RunReport {
            fetched: items.len(),
            ..Default::default()
        };

        let fresh = self.select_new(state, items);
        report.new_items = fresh.len();
        if fresh.is_empty() {
            return Ok(report);
        }

        state.feed.metadata = self.config.feed_metadata();

        let mut drafts = self.builder.build(fresh, now);
        for draft in &mut drafts {
            // Fingerprints are already fixed, so rewrite output never affects dedup
            let text = std::mem::take(&mut draft.text);
            draft.text = rewrite_or_keep(self.rewriter.as_ref(), text).await;
        }

        let emitted = self.publisher.emit(drafts, state, now).await?;
        report.episodes_created = emitted.episodes_created;
        report.text_only = emitted.text_only;
        Ok(report)
    }

    fn select_new(&self, state: &PersistedState, items: Vec<NewsletterItem>) -> Vec<SourceItem> {
        let mut seen = HashSet::new();
        let mut fresh = Vec::new();

        for item in items {
            let key = item.item_key().to_string();
            if key.is_empty() {
                warn!("Skipping item without guid or link: {}", item.title);
                continue;
            }
            let content = self.normalizer.clean(&item.raw_content);
            let fp = fingerprint(&content.text);

            if !seen.insert((key.clone(), fp.clone())) {
                debug!("Skipping repeated item in this fetch: {}", key);
                continue;
            }
            if !state.dedup.is_new(&key, &fp) {
                debug!("Already processed: {}", key);
                continue;
            }
            fresh.push(SourceItem {
                item,
                key,
                fingerprint: fp,
                content,
            });
        }

        info!("{} new item(s) to publish", fresh.len());
        fresh
    }
}
