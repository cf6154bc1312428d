use crate::config::{read_secret, TtsConfig, TtsProvider};
use crate::types::{AudioArtifact, Result, SynthesisError};
use crate::utils::text::split_into_chunks;
use async_trait::async_trait;
use backoff::backoff::Backoff;
use backoff::ExponentialBackoff;
use base64::Engine;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::json;
use std::collections::VecDeque;
use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{debug, info, warn};

pub type SynthesisResult<T> = std::result::Result<T, SynthesisError>;

/// Bitrate used to estimate episode duration from MP3 size.
pub const MP3_BITRATE_KBPS: u32 = 128;

const GOOGLE_BASE_URL: &str = "https://texttospeech.googleapis.com";
const OPENAI_BASE_URL: &str = "https://api.openai.com";

/// Turns episode text into audio
#[async_trait]
pub trait SpeechSynthesizer: Send + Sync {
    fn provider_name(&self) -> &str;

    async fn synthesize(&self, text: &str) -> SynthesisResult<AudioArtifact>;
}

/// Chunking and per-chunk retry settings shared by the HTTP providers.
#[derive(Debug, Clone)]
pub struct ChunkPolicy {
    pub max_chars_per_chunk: usize,
    /// Attempts per chunk, including the first one.
    pub max_attempts: u32,
    pub initial_retry_delay: Duration,
}

impl ChunkPolicy {
    pub fn from_config(config: &TtsConfig) -> Self {
        Self {
            max_chars_per_chunk: config.max_chars_per_chunk.max(1),
            max_attempts: config.max_retries.max(1),
            initial_retry_delay: Duration::try_from_secs_f64(config.initial_retry_delay_secs)
                .unwrap_or(Duration::ZERO),
        }
    }

    fn backoff(&self) -> ExponentialBackoff {
        ExponentialBackoff {
            current_interval: self.initial_retry_delay,
            initial_interval: self.initial_retry_delay,
            max_interval: self.initial_retry_delay * 32,
            multiplier: 2.0,
            randomization_factor: 0.0,
            max_elapsed_time: None,
            ..Default::default()
        }
    }
}

/// Splits `text` into chunks, synthesizes each with retries and concatenates
/// the MP3 frames.
async fn synthesize_chunked<F, Fut>(
    provider: &str,
    text: &str,
    policy: &ChunkPolicy,
    mut call: F,
) -> SynthesisResult<Vec<u8>>
where
    F: FnMut(String) -> Fut,
    Fut: Future<Output = SynthesisResult<Vec<u8>>>,
{
    let chunks = split_into_chunks(text, policy.max_chars_per_chunk);
    if chunks.is_empty() {
        return Err(SynthesisError::EmptyAudio {
            provider: provider.to_string(),
        });
    }
    info!("Synthesizing {} chunk(s) with {}", chunks.len(), provider);

    let mut audio = Vec::new();
    for (idx, chunk) in chunks.into_iter().enumerate() {
        let mut backoff = policy.backoff();
        let mut attempt = 0;
        loop {
            attempt += 1;
            let result = match call(chunk.clone()).await {
                Ok(bytes) if bytes.is_empty() => Err(SynthesisError::EmptyAudio {
                    provider: provider.to_string(),
                }),
                other => other,
            };
            match result {
                Ok(bytes) => {
                    debug!("Chunk {} synthesized ({} bytes)", idx, bytes.len());
                    audio.extend_from_slice(&bytes);
                    break;
                }
                Err(e) if e.is_retryable() && attempt < policy.max_attempts => {
                    let delay = backoff.next_backoff().unwrap_or(policy.initial_retry_delay);
                    warn!(
                        "Chunk {} attempt {} failed with {}: {}, retrying in {:?}",
                        idx, attempt, provider, e, delay
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) => {
                    warn!("Chunk {} failed with {} after {} attempt(s): {}", idx, provider, attempt, e);
                    return Err(e);
                }
            }
        }
    }
    Ok(audio)
}

fn network_error(provider: &str, err: reqwest::Error) -> SynthesisError {
    SynthesisError::Network {
        provider: provider.to_string(),
        detail: err.to_string(),
    }
}

async fn status_error(provider: &str, response: reqwest::Response) -> SynthesisError {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    let detail: String = body.trim().chars().take(300).collect();
    if status == StatusCode::TOO_MANY_REQUESTS || body.contains("RESOURCE_EXHAUSTED") {
        SynthesisError::RateLimited {
            provider: provider.to_string(),
            detail,
        }
    } else {
        SynthesisError::Provider {
            provider: provider.to_string(),
            status: Some(status.as_u16()),
            detail,
        }
    }
}

/// Google Cloud Text-to-Speech over its REST API.
pub struct GoogleTtsSynthesizer {
    client: Client,
    api_key: String,
    base_url: String,
    language_code: String,
    voice_name: String,
    speaking_rate: f64,
    pitch: f64,
    volume_gain_db: f64,
    policy: ChunkPolicy,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct GoogleSynthesizeResponse {
    #[serde(default)]
    audio_content: String,
}

impl GoogleTtsSynthesizer {
    pub fn new(client: Client, api_key: String, config: &TtsConfig) -> Self {
        Self {
            client,
            api_key,
            base_url: config
                .google_base_url
                .clone()
                .unwrap_or_else(|| GOOGLE_BASE_URL.to_string()),
            language_code: config.language_code.clone(),
            voice_name: config.voice_name.clone(),
            speaking_rate: config.speaking_rate,
            pitch: config.pitch,
            volume_gain_db: config.volume_gain_db,
            policy: ChunkPolicy::from_config(config),
        }
    }

    async fn synthesize_chunk(&self, chunk: String) -> SynthesisResult<Vec<u8>> {
        let provider = self.provider_name();
        let url = format!("{}/v1/text:synthesize", self.base_url.trim_end_matches('/'));
        let body = json!({
            "input": { "text": chunk },
            "voice": { "languageCode": self.language_code, "name": self.voice_name },
            "audioConfig": {
                "audioEncoding": "MP3",
                "speakingRate": self.speaking_rate,
                "pitch": self.pitch,
                "volumeGainDb": self.volume_gain_db,
            },
        });

        let response = self
            .client
            .post(&url)
            .query(&[("key", self.api_key.as_str())])
            .json(&body)
            .send()
            .await
            .map_err(|e| network_error(provider, e))?;
        if !response.status().is_success() {
            return Err(status_error(provider, response).await);
        }

        let payload: GoogleSynthesizeResponse =
            response.json().await.map_err(|e| SynthesisError::Provider {
                provider: provider.to_string(),
                status: None,
                detail: format!("unreadable response: {}", e),
            })?;
        base64::engine::general_purpose::STANDARD
            .decode(payload.audio_content.as_bytes())
            .map_err(|e| SynthesisError::Provider {
                provider: provider.to_string(),
                status: None,
                detail: format!("invalid audio payload: {}", e),
            })
    }
}

#[async_trait]
impl SpeechSynthesizer for GoogleTtsSynthesizer {
    fn provider_name(&self) -> &str {
        "google"
    }

    async fn synthesize(&self, text: &str) -> SynthesisResult<AudioArtifact> {
        let bytes = synthesize_chunked(self.provider_name(), text, &self.policy, |chunk| {
            self.synthesize_chunk(chunk)
        })
        .await?;
        Ok(AudioArtifact::mp3(bytes, MP3_BITRATE_KBPS))
    }
}

/// OpenAI `/v1/audio/speech`.
pub struct OpenAiTtsSynthesizer {
    client: Client,
    api_key: String,
    base_url: String,
    model: String,
    voice: String,
    policy: ChunkPolicy,
}

impl OpenAiTtsSynthesizer {
    pub fn new(client: Client, api_key: String, config: &TtsConfig) -> Self {
        Self {
            client,
            api_key,
            base_url: config
                .openai_base_url
                .clone()
                .unwrap_or_else(|| OPENAI_BASE_URL.to_string()),
            model: config.openai_model.clone(),
            voice: config.openai_voice.clone(),
            policy: ChunkPolicy::from_config(config),
        }
    }

    async fn synthesize_chunk(&self, chunk: String) -> SynthesisResult<Vec<u8>> {
        let provider = self.provider_name();
        let url = format!("{}/v1/audio/speech", self.base_url.trim_end_matches('/'));
        let body = json!({
            "model": self.model,
            "voice": self.voice,
            "input": chunk,
            "response_format": "mp3",
        });

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| network_error(provider, e))?;
        if !response.status().is_success() {
            return Err(status_error(provider, response).await);
        }
        let bytes = response.bytes().await.map_err(|e| network_error(provider, e))?;
        Ok(bytes.to_vec())
    }
}

#[async_trait]
impl SpeechSynthesizer for OpenAiTtsSynthesizer {
    fn provider_name(&self) -> &str {
        "openai"
    }

    async fn synthesize(&self, text: &str) -> SynthesisResult<AudioArtifact> {
        let bytes = synthesize_chunked(self.provider_name(), text, &self.policy, |chunk| {
            self.synthesize_chunk(chunk)
        })
        .await?;
        Ok(AudioArtifact::mp3(bytes, MP3_BITRATE_KBPS))
    }
}

/// Used when synthesis is turned off; every episode becomes text-only.
#[derive(Debug, Default)]
pub struct DisabledSynthesizer;

#[async_trait]
impl SpeechSynthesizer for DisabledSynthesizer {
    fn provider_name(&self) -> &str {
        "disabled"
    }

    async fn synthesize(&self, _text: &str) -> SynthesisResult<AudioArtifact> {
        Err(SynthesisError::Disabled)
    }
}

/// Builds the configured provider once per run.
pub fn build_synthesizer(config: &TtsConfig) -> Result<Arc<dyn SpeechSynthesizer>> {
    if !config.enabled {
        info!("Speech synthesis disabled");
        return Ok(Arc::new(DisabledSynthesizer));
    }
    let api_key = read_secret(config.api_key_env())?;
    // Per-request bound; the publisher enforces the per-episode timeout
    let client = Client::builder()
        .timeout(Duration::from_secs(config.timeout_secs.max(1)))
        .build()?;

    let synthesizer: Arc<dyn SpeechSynthesizer> = match config.provider {
        TtsProvider::Google => Arc::new(GoogleTtsSynthesizer::new(client, api_key, config)),
        TtsProvider::OpenAi => Arc::new(OpenAiTtsSynthesizer::new(client, api_key, config)),
    };
    info!("Using {} speech synthesis", synthesizer.provider_name());
    Ok(synthesizer)
}

#[derive(Debug, Clone)]
enum MockFallback {
    Succeed,
    Fail(SynthesisError),
}

/// Mock synthesizer for development and testing
pub struct MockSynthesizer {
    script: Mutex<VecDeque<SynthesisResult<()>>>,
    fallback: MockFallback,
    delay: Option<Duration>,
    calls: AtomicUsize,
    inputs: Mutex<Vec<String>>,
}

impl MockSynthesizer {
    fn with_fallback(fallback: MockFallback) -> Self {
        Self {
            script: Mutex::new(VecDeque::new()),
            fallback,
            delay: None,
            calls: AtomicUsize::new(0),
            inputs: Mutex::new(Vec::new()),
        }
    }

    /// Every call returns audio derived from the input text.
    pub fn succeeding() -> Self {
        Self::with_fallback(MockFallback::Succeed)
    }

    /// Every call fails with `error`.
    pub fn failing(error: SynthesisError) -> Self {
        Self::with_fallback(MockFallback::Fail(error))
    }

    /// Calls consume `outcomes` in order, then succeed.
    pub fn scripted(outcomes: Vec<SynthesisResult<()>>) -> Self {
        let mut mock = Self::succeeding();
        mock.script = Mutex::new(outcomes.into());
        mock
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Texts received so far, in call order.
    pub fn inputs(&self) -> Vec<String> {
        self.inputs.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

#[async_trait]
impl SpeechSynthesizer for MockSynthesizer {
    fn provider_name(&self) -> &str {
        "mock"
    }

    async fn synthesize(&self, text: &str) -> SynthesisResult<AudioArtifact> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.inputs
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(text.to_string());
        let scripted = self
            .script
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .pop_front();

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        let outcome = match scripted {
            Some(outcome) => outcome,
            None => match &self.fallback {
                MockFallback::Succeed => Ok(()),
                MockFallback::Fail(e) => Err(e.clone()),
            },
        };
        outcome.map(|()| AudioArtifact::mp3(format!("MOCK-MP3:{}", text).into_bytes(), MP3_BITRATE_KBPS))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy(max_chars: usize, attempts: u32) -> ChunkPolicy {
        ChunkPolicy {
            max_chars_per_chunk: max_chars,
            max_attempts: attempts,
            initial_retry_delay: Duration::ZERO,
        }
    }

    #[tokio::test]
    async fn chunks_are_concatenated_in_order() {
        let bytes = synthesize_chunked("test", "One. Two.", &policy(4, 3), |chunk| async move {
            Ok(chunk.into_bytes())
        })
        .await
        .unwrap();
        assert_eq!(bytes, b"One.Two.");
    }

    #[tokio::test]
    async fn retryable_failures_are_retried() {
        let calls = AtomicUsize::new(0);
        let bytes = synthesize_chunked("test", "Hello.", &policy(100, 3), |chunk| {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n == 0 {
                    Err(SynthesisError::RateLimited {
                        provider: "test".into(),
                        detail: "slow down".into(),
                    })
                } else {
                    Ok(chunk.into_bytes())
                }
            }
        })
        .await
        .unwrap();
        assert_eq!(bytes, b"Hello.");
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn retries_stop_after_max_attempts() {
        let calls = AtomicUsize::new(0);
        let err = synthesize_chunked("test", "Hello.", &policy(100, 3), |_chunk| {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Ok(Vec::new()) }
        })
        .await
        .unwrap_err();
        assert_eq!(err, SynthesisError::EmptyAudio { provider: "test".into() });
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn client_errors_are_not_retried() {
        let calls = AtomicUsize::new(0);
        let err = synthesize_chunked("test", "Hello.", &policy(100, 5), |_chunk| {
            calls.fetch_add(1, Ordering::SeqCst);
            async {
                Err(SynthesisError::Provider {
                    provider: "test".into(),
                    status: Some(400),
                    detail: "bad request".into(),
                })
            }
        })
        .await
        .unwrap_err();
        assert!(matches!(err, SynthesisError::Provider { status: Some(400), .. }));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn disabled_synthesizer_always_fails() {
        let err = DisabledSynthesizer.synthesize("text").await.unwrap_err();
        assert_eq!(err, SynthesisError::Disabled);
    }

    #[tokio::test]
    async fn mock_follows_its_script() {
        let mock = MockSynthesizer::scripted(vec![Err(SynthesisError::Timeout { seconds: 1 })]);
        assert!(mock.synthesize("a").await.is_err());
        let audio = mock.synthesize("b").await.unwrap();
        assert_eq!(audio.mime_type, "audio/mpeg");
        assert_eq!(mock.calls(), 2);
        assert_eq!(mock.inputs(), vec!["a".to_string(), "b".to_string()]);
    }

    #[test]
    fn disabled_config_needs_no_credentials() {
        let config = TtsConfig {
            enabled: false,
            ..TtsConfig::default()
        };
        let synth = build_synthesizer(&config).unwrap();
        assert_eq!(synth.provider_name(), "disabled");
    }
}
