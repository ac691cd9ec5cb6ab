//! OpenAI-compatible chat-completions client.

use std::time::Duration;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use tracing::debug;

use crate::ports::LlmPort;

const DEFAULT_TIMEOUT_SECS: u64 = 120;

pub struct OpenAiClient {
    base_url: String,
    api_key: String,
    model: String,
    http: reqwest::Client,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    content: String,
}

impl OpenAiClient {
    pub fn new(base_url: &str, api_key: &str, model: &str) -> Self {
        let http = reqwest::Client::builder()
            .user_agent("wp-draftbot/0.1")
            .timeout(Duration::from_secs(DEFAULT_TIMEOUT_SECS))
            .build()
            .expect("reqwest client");
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            model: model.to_string(),
            http,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.http = reqwest::Client::builder()
            .user_agent("wp-draftbot/0.1")
            .timeout(timeout)
            .build()
            .expect("reqwest client");
        self
    }
}

#[async_trait]
impl LlmPort for OpenAiClient {
    async fn complete(
        &self,
        prompt: &str,
        temperature: f32,
        max_tokens: Option<u32>,
    ) -> Result<String> {
        let mut body = json!({
            "model": self.model,
            "messages": [{"role": "user", "content": prompt}],
            "temperature": temperature,
        });
        if let Some(limit) = max_tokens {
            body["max_tokens"] = json!(limit);
        }

        let url = format!("{}/chat/completions", self.base_url);
        debug!(model = %self.model, temperature, prompt_len = prompt.len(), "LLM call");
        let response = self
            .http
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .context("LLM request failed")?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            bail!("LLM returned HTTP {}: {}", status.as_u16(), text);
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .context("LLM response is not a chat completion")?;
        let choice = parsed
            .choices
            .into_iter()
            .next()
            .context("LLM response has no choices")?;
        Ok(choice.message.content.trim().to_string())
    }
}
