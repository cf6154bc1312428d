use crate::config::{read_secret, LlmConfig};
use crate::types::{PublisherError, Result};
use crate::utils::text::chunk_paragraphs;
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

const OPENAI_BASE_URL: &str = "https://api.openai.com";

const REWRITE_SYSTEM_PROMPT: &str = "You are a professional audio editor. \
Rewrite the newsletter text so it sounds natural when read aloud: clear, \
conversational and concise. Keep the original tone and facts, drop visual-only \
references such as 'see chart below', and return plain text only without \
adding commentary.";

/// Trait for LLM adapters that adapt written text for listening
#[async_trait]
pub trait TextRewriter: Send + Sync {
    fn adapter_name(&self) -> String;

    async fn rewrite(&self, text: &str) -> Result<String>;
}

/// Returns the text unchanged. Used when rewriting is disabled.
#[derive(Debug, Default)]
pub struct PassthroughRewriter;

#[async_trait]
impl TextRewriter for PassthroughRewriter {
    fn adapter_name(&self) -> String {
        "passthrough".to_string()
    }

    async fn rewrite(&self, text: &str) -> Result<String> {
        Ok(text.to_string())
    }
}

#[derive(Deserialize)]
struct ChatCompletion {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Deserialize)]
struct ChatMessage {
    #[serde(default)]
    content: Option<String>,
}

/// Rewrites text through OpenAI chat completions, one paragraph group at a time.
pub struct OpenAiRewriter {
    client: Client,
    api_key: String,
    base_url: String,
    model: String,
    max_chunk_chars: usize,
}

impl OpenAiRewriter {
    pub fn new(client: Client, api_key: String, config: &LlmConfig) -> Self {
        Self {
            client,
            api_key,
            base_url: config
                .base_url
                .clone()
                .unwrap_or_else(|| OPENAI_BASE_URL.to_string()),
            model: config.model.clone(),
            max_chunk_chars: config.max_chunk_chars.max(1),
        }
    }

    async fn rewrite_chunk(&self, chunk: &str) -> Result<String> {
        let url = format!("{}/v1/chat/completions", self.base_url.trim_end_matches('/'));
        let body = json!({
            "model": self.model,
            "temperature": 0.4,
            "messages": [
                { "role": "system", "content": REWRITE_SYSTEM_PROMPT },
                { "role": "user", "content": chunk },
            ],
        });

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            return Err(PublisherError::General(format!(
                "LLM rewrite failed: HTTP {}",
                status
            )));
        }

        let completion: ChatCompletion = response.json().await?;
        completion
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .map(|content| content.trim().to_string())
            .filter(|content| !content.is_empty())
            .ok_or_else(|| PublisherError::General("LLM rewrite returned no text".to_string()))
    }
}

#[async_trait]
impl TextRewriter for OpenAiRewriter {
    fn adapter_name(&self) -> String {
        format!("OpenAI rewriter ({})", self.model)
    }

    async fn rewrite(&self, text: &str) -> Result<String> {
        let chunks = chunk_paragraphs(text, self.max_chunk_chars);
        let mut parts = Vec::with_capacity(chunks.len());
        for (idx, chunk) in chunks.iter().enumerate() {
            match self.rewrite_chunk(chunk).await {
                Ok(rewritten) => parts.push(rewritten),
                Err(e) => {
                    warn!("Rewrite of chunk {} failed, keeping original: {}", idx, e);
                    parts.push(chunk.clone());
                }
            }
        }
        let result = parts.join("\n\n");
        info!(
            "LLM rewrite done: {} chunk(s), {} -> {} chars",
            chunks.len(),
            text.len(),
            result.len()
        );
        Ok(result)
    }
}

/// Mock rewriter for development and testing
pub struct MockRewriter {
    prefix: String,
    fail: bool,
}

impl MockRewriter {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            fail: false,
        }
    }

    pub fn failing() -> Self {
        Self {
            prefix: String::new(),
            fail: true,
        }
    }
}

#[async_trait]
impl TextRewriter for MockRewriter {
    fn adapter_name(&self) -> String {
        "Mock rewriter".to_string()
    }

    async fn rewrite(&self, text: &str) -> Result<String> {
        if self.fail {
            return Err(PublisherError::General("mock rewrite failure".to_string()));
        }
        Ok(format!("{}{}", self.prefix, text))
    }
}

/// Applies the rewriter, falling back to the original text on failure.
pub async fn rewrite_or_keep(rewriter: &dyn TextRewriter, text: String) -> String {
    match rewriter.rewrite(&text).await {
        Ok(rewritten) if !rewritten.trim().is_empty() => rewritten,
        Ok(_) => {
            warn!("{} returned empty text, keeping original", rewriter.adapter_name());
            text
        }
        Err(e) => {
            warn!("{} failed, keeping original text: {}", rewriter.adapter_name(), e);
            text
        }
    }
}

pub fn build_rewriter(config: &LlmConfig) -> Result<Arc<dyn TextRewriter>> {
    if !config.rewrite_enabled {
        debug!("LLM rewrite disabled");
        return Ok(Arc::new(PassthroughRewriter));
    }
    let api_key = read_secret(&config.api_key_env)?;
    let client = Client::builder()
        .timeout(Duration::from_secs(config.timeout_secs.max(1)))
        .build()?;
    Ok(Arc::new(OpenAiRewriter::new(client, api_key, config)))
}
