use crate::config::AppConfig;
use crate::render::{render_index_html, render_rss};
use crate::state::{write_atomic, PersistedState};
use crate::tts::{SpeechSynthesizer, SynthesisResult};
use crate::types::{
    AudioArtifact, AudioRef, Episode, EpisodeComponent, EpisodeDraft, EpisodeStatus,
    PodcastFeedState, Result, SynthesisError,
};
use crate::utils::{ci, url::build_public_url};
use chrono::{DateTime, Datelike, Utc};
use futures::stream::{self, StreamExt};
use id3::frame::Content;
use id3::{Frame, Tag, TagLike, Timestamp, Version};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Where artifacts go and how synthesis is bounded.
#[derive(Debug, Clone)]
pub struct PublishSettings {
    pub output_root: PathBuf,
    pub audio_dir: String,
    pub site_link: String,
    /// ID3 artist of every episode.
    pub artist: String,
    pub feed_filename: String,
    pub index_filename: String,
    pub max_feed_episodes: usize,
    pub synthesis_timeout: Duration,
    pub concurrency: usize,
}

impl PublishSettings {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            output_root: config.output.root_dir.clone(),
            audio_dir: config.output.audio_dir.trim_matches('/').to_string(),
            site_link: config.site.link.clone(),
            artist: if config.site.author.trim().is_empty() {
                config.site.title.clone()
            } else {
                config.site.author.clone()
            },
            feed_filename: config.output.feed_filename.clone(),
            index_filename: config.output.index_filename.clone(),
            max_feed_episodes: config.output.max_feed_episodes,
            synthesis_timeout: Duration::from_secs(config.tts.timeout_secs.max(1)),
            concurrency: config.tts.concurrency.max(1),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EmitReport {
    pub episodes_created: usize,
    pub text_only: usize,
    pub already_published: usize,
}

/// Turns drafts into published episodes. Synthesis failures never abort:
/// the draft is published as a text-only episode instead.
pub struct FeedPublisher {
    synthesizer: Arc<dyn SpeechSynthesizer>,
    settings: PublishSettings,
}

impl FeedPublisher {
    pub fn new(synthesizer: Arc<dyn SpeechSynthesizer>, settings: PublishSettings) -> Self {
        Self {
            synthesizer,
            settings,
        }
    }

    pub fn feed_url(&self) -> String {
        build_public_url(&self.settings.site_link, &self.settings.feed_filename)
    }

    /// Synthesizes every draft, then merges the results into `state` in draft
    /// order and records each source item as processed.
    pub async fn emit(
        &self,
        drafts: Vec<EpisodeDraft>,
        state: &mut PersistedState,
        now: DateTime<Utc>,
    ) -> Result<EmitReport> {
        let mut report = EmitReport::default();

        let (published, pending): (Vec<_>, Vec<_>) = drafts
            .into_iter()
            .partition(|draft| state.feed.contains(&draft.episode_id));
        for draft in &published {
            info!("Episode {} already published, recording its items", draft.episode_id);
            record_items(state, draft, now);
            report.already_published += 1;
        }

        let outcomes: Vec<SynthesisResult<AudioArtifact>> = stream::iter(pending.iter())
            .map(|draft| self.attempt(draft))
            .buffered(self.settings.concurrency)
            .collect()
            .await;

        for (draft, outcome) in pending.into_iter().zip(outcomes) {
            let episode = self.finalize(&draft, outcome)?;
            if matches!(episode.status, EpisodeStatus::TextOnly { .. }) {
                report.text_only += 1;
            }
            if state.feed.insert_episode(episode) {
                report.episodes_created += 1;
            } else {
                report.already_published += 1;
            }
            record_items(state, &draft, now);
        }

        Ok(report)
    }

    async fn attempt(&self, draft: &EpisodeDraft) -> SynthesisResult<AudioArtifact> {
        debug!(
            "Synthesizing {} ({} chars) with {}",
            draft.episode_id,
            draft.text.len(),
            self.synthesizer.provider_name()
        );
        let timeout = self.settings.synthesis_timeout;
        match tokio::time::timeout(timeout, self.synthesizer.synthesize(&draft.text)).await {
            Ok(result) => result,
            Err(_) => Err(SynthesisError::Timeout {
                seconds: timeout.as_secs(),
            }),
        }
    }

    /// Writes artifacts for one draft and builds its episode. Only a failed
    /// transcript write is fatal; audio problems downgrade to text-only.
    fn finalize(
        &self,
        draft: &EpisodeDraft,
        outcome: SynthesisResult<AudioArtifact>,
    ) -> Result<Episode> {
        let rel_dir = format!(
            "{}/{}",
            self.settings.audio_dir,
            draft.published_at.format("%Y/%m")
        );

        let disabled = matches!(outcome, Err(SynthesisError::Disabled));
        let audio = match outcome {
            Ok(artifact) => self.store_audio(draft, &rel_dir, &artifact),
            Err(e) => Err(e.reason()),
        };

        let transcript_rel = format!("{}/{}.txt", rel_dir, draft.slug);
        write_atomic(
            &self.settings.output_root.join(&transcript_rel),
            draft.text.as_bytes(),
        )?;

        let mut description = draft.description_html.clone();
        let status = match &audio {
            Ok(audio) => {
                info!(
                    "Synthesized episode {} ({}s, {} bytes)",
                    draft.episode_id, audio.duration_seconds, audio.byte_size
                );
                EpisodeStatus::Synthesized
            }
            Err(reason) if disabled => {
                debug!("Episode {} published without audio: {}", draft.episode_id, reason);
                EpisodeStatus::TextOnly {
                    failure_reason: reason.clone(),
                }
            }
            Err(reason) => {
                warn!("Episode {} published without audio: {}", draft.episode_id, reason);
                ci::notice_error(&format!("TTS failed for {}: {}", draft.title, reason));
                description.push_str(&format!(
                    "<p><em>Audio unavailable: {}</em></p>",
                    html_escape::encode_text(reason)
                ));
                EpisodeStatus::TextOnly {
                    failure_reason: reason.clone(),
                }
            }
        };

        Ok(Episode {
            episode_id: draft.episode_id.clone(),
            mode: draft.mode,
            title: draft.title.clone(),
            link: draft.link(),
            description,
            published_at: draft.published_at,
            created_at: draft.created_at,
            audio: audio.ok(),
            transcript_uri: Some(build_public_url(&self.settings.site_link, &transcript_rel)),
            components: draft
                .source_items
                .iter()
                .map(|source| EpisodeComponent {
                    title: source.item.title.clone(),
                    link: source.item.link.clone(),
                })
                .collect(),
            status,
        })
    }

    fn store_audio(
        &self,
        draft: &EpisodeDraft,
        rel_dir: &str,
        artifact: &AudioArtifact,
    ) -> std::result::Result<AudioRef, String> {
        if artifact.bytes.is_empty() {
            return Err(SynthesisError::EmptyAudio {
                provider: self.synthesizer.provider_name().to_string(),
            }
            .reason());
        }
        let rel_path = format!("{}/{}.mp3", rel_dir, draft.slug);
        let bytes = match self.id3_tag(draft).map(|header| [header, artifact.bytes.clone()].concat()) {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!("Could not tag {}: {}; storing untagged audio", draft.episode_id, e);
                artifact.bytes.clone()
            }
        };
        write_atomic(&self.settings.output_root.join(&rel_path), &bytes)
            .map_err(|e| format!("failed to store audio: {}", e))?;
        Ok(AudioRef {
            uri: build_public_url(&self.settings.site_link, &rel_path),
            duration_seconds: artifact.duration_seconds,
            byte_size: bytes.len() as u64,
        })
    }

    /// ID3v2.4 header with title, artist, recording date and source link.
    fn id3_tag(&self, draft: &EpisodeDraft) -> std::result::Result<Vec<u8>, id3::Error> {
        let mut tag = Tag::new();
        tag.set_title(draft.title.as_str());
        tag.set_artist(self.settings.artist.as_str());
        let date = draft.published_at.date_naive();
        tag.set_date_recorded(Timestamp {
            year: date.year(),
            month: Some(date.month() as u8),
            day: Some(date.day() as u8),
            hour: None,
            minute: None,
            second: None,
        });
        let link = draft.link();
        if !link.is_empty() {
            tag.add_frame(Frame::with_content("WOAF", Content::Link(link)));
        }

        let mut header = Vec::new();
        tag.write_to(&mut header, Version::Id3v24)?;
        Ok(header)
    }

    /// Rewrites the feed document and landing page from the given state.
    pub fn write_feed_artifacts(&self, feed: &PodcastFeedState) -> Result<()> {
        let feed_url = self.feed_url();
        let xml = render_rss(feed, &feed_url, self.settings.max_feed_episodes)?;
        let feed_path = self.settings.output_root.join(&self.settings.feed_filename);
        write_atomic(&feed_path, xml.as_bytes())?;

        let html = render_index_html(feed, &feed_url, self.settings.max_feed_episodes);
        let index_path = self.settings.output_root.join(&self.settings.index_filename);
        write_atomic(&index_path, html.as_bytes())?;

        info!("Wrote {} and {}", feed_path.display(), index_path.display());
        Ok(())
    }
}

fn record_items(state: &mut PersistedState, draft: &EpisodeDraft, now: DateTime<Utc>) {
    for source in &draft.source_items {
        state
            .dedup
            .record_processed(&source.key, &source.fingerprint, now);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dedup::fingerprint;
    use crate::tts::MockSynthesizer;
    use crate::types::{CleanedContent, EpisodeMode, NewsletterItem, SourceItem};
    use chrono::TimeZone;

    fn settings(root: &std::path::Path) -> PublishSettings {
        PublishSettings {
            output_root: root.to_path_buf(),
            audio_dir: "audio".to_string(),
            site_link: "https://example.github.io/pod/".to_string(),
            artist: "Axios Audio".to_string(),
            feed_filename: "feed.xml".to_string(),
            index_filename: "index.html".to_string(),
            max_feed_episodes: 200,
            synthesis_timeout: Duration::from_secs(5),
            concurrency: 1,
        }
    }

    fn draft(key: &str) -> EpisodeDraft {
        let at = Utc.with_ymd_and_hms(2025, 10, 15, 9, 0, 0).unwrap();
        let text = format!("Story {}.", key);
        EpisodeDraft {
            episode_id: format!("separate-{}", key),
            mode: EpisodeMode::Separate,
            source_items: vec![SourceItem {
                item: NewsletterItem {
                    guid: Some(key.to_string()),
                    link: format!("https://www.axios.com/{}", key),
                    title: format!("Story {}", key),
                    author: None,
                    raw_content: text.clone(),
                    published_at: at,
                },
                key: key.to_string(),
                fingerprint: fingerprint(&text),
                content: CleanedContent {
                    text: text.clone(),
                    description_html: format!("<p>{}</p>", text),
                },
            }],
            title: format!("Axios: 2025-10-15 — Story {}", key),
            text,
            description_html: format!("<p>Story {}.</p>", key),
            published_at: at,
            created_at: at,
            slug: format!("2025-10-15-story-{}", key),
        }
    }

    #[tokio::test]
    async fn successful_synthesis_writes_audio_and_transcript() {
        let dir = tempfile::tempdir().unwrap();
        let publisher = FeedPublisher::new(Arc::new(MockSynthesizer::succeeding()), settings(dir.path()));
        let mut state = PersistedState::new();

        let report = publisher.emit(vec![draft("a")], &mut state, Utc::now()).await.unwrap();
        assert_eq!(report.episodes_created, 1);
        assert_eq!(report.text_only, 0);

        let episode = &state.feed.episodes[0];
        assert_eq!(episode.status, EpisodeStatus::Synthesized);
        let audio = episode.audio.as_ref().unwrap();
        assert_eq!(
            audio.uri,
            "https://example.github.io/pod/audio/2025/10/2025-10-15-story-a.mp3"
        );
        assert!(dir.path().join("audio/2025/10/2025-10-15-story-a.mp3").exists());
        assert_eq!(
            std::fs::read_to_string(dir.path().join("audio/2025/10/2025-10-15-story-a.txt")).unwrap(),
            "Story a."
        );
        assert!(!state.dedup.is_new("a", &fingerprint("Story a.")));
    }

    #[tokio::test]
    async fn stored_audio_carries_id3_metadata() {
        let dir = tempfile::tempdir().unwrap();
        let publisher = FeedPublisher::new(Arc::new(MockSynthesizer::succeeding()), settings(dir.path()));
        let mut state = PersistedState::new();
        publisher.emit(vec![draft("a")], &mut state, Utc::now()).await.unwrap();

        let path = dir.path().join("audio/2025/10/2025-10-15-story-a.mp3");
        let tag = Tag::read_from_path(&path).unwrap();
        assert_eq!(tag.title(), Some("Axios: 2025-10-15 — Story a"));
        assert_eq!(tag.artist(), Some("Axios Audio"));
        assert_eq!(tag.date_recorded().map(|d| (d.year, d.month, d.day)), Some((2025, Some(10), Some(15))));
        assert!(tag
            .frames()
            .any(|f| f.id() == "WOAF" && f.content().link() == Some("https://www.axios.com/a")));

        let bytes = std::fs::read(&path).unwrap();
        assert!(bytes.ends_with(b"MOCK-MP3:Story a."));
        let audio = state.feed.episodes[0].audio.as_ref().unwrap();
        assert_eq!(audio.byte_size, bytes.len() as u64);
    }

    #[tokio::test]
    async fn failed_synthesis_publishes_text_only() {
        let dir = tempfile::tempdir().unwrap();
        let synth = MockSynthesizer::failing(SynthesisError::RateLimited {
            provider: "mock".into(),
            detail: "quota <exceeded>".into(),
        });
        let publisher = FeedPublisher::new(Arc::new(synth), settings(dir.path()));
        let mut state = PersistedState::new();

        let report = publisher.emit(vec![draft("a")], &mut state, Utc::now()).await.unwrap();
        assert_eq!(report.episodes_created, 1);
        assert_eq!(report.text_only, 1);

        let episode = &state.feed.episodes[0];
        assert!(episode.audio.is_none());
        assert!(episode.transcript_uri.is_some());
        assert!(episode
            .description
            .contains("<p><em>Audio unavailable: mock rate limit or quota exceeded: quota &lt;exceeded&gt;</em></p>"));
        assert!(!dir.path().join("audio/2025/10/2025-10-15-story-a.mp3").exists());
        assert_eq!(state.dedup.len(), 1);
    }

    #[tokio::test]
    async fn disabled_synthesis_adds_no_failure_note() {
        let dir = tempfile::tempdir().unwrap();
        let publisher = FeedPublisher::new(
            Arc::new(MockSynthesizer::failing(SynthesisError::Disabled)),
            settings(dir.path()),
        );
        let mut state = PersistedState::new();

        let report = publisher.emit(vec![draft("a")], &mut state, Utc::now()).await.unwrap();
        assert_eq!(report.text_only, 1);
        let episode = &state.feed.episodes[0];
        assert!(episode.audio.is_none());
        assert_eq!(episode.description, "<p>Story a.</p>");
        assert!(matches!(episode.status, EpisodeStatus::TextOnly { .. }));
    }

    #[tokio::test]
    async fn slow_synthesis_times_out() {
        let dir = tempfile::tempdir().unwrap();
        let synth = MockSynthesizer::succeeding().with_delay(Duration::from_secs(30));
        let mut settings = settings(dir.path());
        settings.synthesis_timeout = Duration::from_millis(20);
        let publisher = FeedPublisher::new(Arc::new(synth), settings);
        let mut state = PersistedState::new();

        publisher.emit(vec![draft("a")], &mut state, Utc::now()).await.unwrap();
        assert!(matches!(
            &state.feed.episodes[0].status,
            EpisodeStatus::TextOnly { failure_reason } if failure_reason.contains("timed out")
        ));
    }

    #[tokio::test]
    async fn published_drafts_are_not_synthesized_again() {
        let dir = tempfile::tempdir().unwrap();
        let synth = Arc::new(MockSynthesizer::succeeding());
        let publisher = FeedPublisher::new(synth.clone(), settings(dir.path()));
        let mut state = PersistedState::new();

        publisher.emit(vec![draft("a")], &mut state, Utc::now()).await.unwrap();
        let report = publisher.emit(vec![draft("a")], &mut state, Utc::now()).await.unwrap();
        assert_eq!(report.already_published, 1);
        assert_eq!(report.episodes_created, 0);
        assert_eq!(synth.calls(), 1);
        assert_eq!(state.feed.episodes.len(), 1);
    }

    #[tokio::test]
    async fn concurrent_synthesis_keeps_draft_order() {
        let dir = tempfile::tempdir().unwrap();
        let synth = MockSynthesizer::scripted(vec![
            Ok(()),
            Err(SynthesisError::Network {
                provider: "mock".into(),
                detail: "reset".into(),
            }),
            Ok(()),
        ]);
        let mut settings = settings(dir.path());
        settings.concurrency = 3;
        let publisher = FeedPublisher::new(Arc::new(synth), settings);
        let mut state = PersistedState::new();

        let report = publisher
            .emit(vec![draft("a"), draft("b"), draft("c")], &mut state, Utc::now())
            .await
            .unwrap();
        assert_eq!(report.episodes_created, 3);
        assert_eq!(report.text_only, 1);
        let dedup_keys: Vec<_> = state.dedup.records().iter().map(|r| r.item_key.as_str()).collect();
        assert_eq!(dedup_keys, vec!["a", "b", "c"]);
    }

    #[tokio::test]
    async fn feed_artifacts_are_written() {
        let dir = tempfile::tempdir().unwrap();
        let publisher = FeedPublisher::new(Arc::new(MockSynthesizer::succeeding()), settings(dir.path()));
        let mut state = PersistedState::new();
        publisher.emit(vec![draft("a")], &mut state, Utc::now()).await.unwrap();

        publisher.write_feed_artifacts(&state.feed).unwrap();
        let xml = std::fs::read_to_string(dir.path().join("feed.xml")).unwrap();
        assert!(xml.contains("<enclosure"));
        assert!(xml.contains("https://example.github.io/pod/feed.xml"));
        assert!(dir.path().join("index.html").exists());
    }
}
