use std::time::Duration;

use anyhow::{Context, anyhow};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use crate::config::LlmConfig;
use crate::runtime::{CompletionRequest, LlmBackend};
use crate::{SecretValue, VerifactError};

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    temperature: f32,
    messages: Vec<ChatMessage<'a>>,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatResponseMessage,
}

#[derive(Deserialize)]
struct ChatResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

/// Client for OpenAI-compatible `/chat/completions` endpoints.
pub struct OpenAiBackend {
    client: reqwest::Client,
    endpoint: String,
    model: String,
    temperature: f32,
    api_key: SecretValue,
}

impl OpenAiBackend {
    pub fn new(config: &LlmConfig, api_key: SecretValue) -> Result<Self, VerifactError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|err| {
                VerifactError::InvalidConfiguration(format!("failed to create HTTP client: {err}"))
            })?;

        let endpoint = format!("{}/chat/completions", config.base_url.trim_end_matches('/'));
        debug!(%endpoint, model = %config.model, credential = %api_key, "chat backend configured");

        Ok(Self {
            client,
            endpoint,
            model: config.model.clone(),
            temperature: config.temperature,
            api_key,
        })
    }
}

#[async_trait]
impl LlmBackend for OpenAiBackend {
    #[instrument(name = "llm.complete", skip_all, fields(agent = %request.agent, task = %request.task))]
    async fn complete(&self, request: &CompletionRequest) -> anyhow::Result<String> {
        let body = ChatRequest {
            model: &self.model,
            temperature: self.temperature,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: &request.system,
                },
                ChatMessage {
                    role: "user",
                    content: &request.prompt,
                },
            ],
        };

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(self.api_key.expose())
            .json(&body)
            .send()
            .await
            .map_err(|err| {
                if err.is_timeout() {
                    anyhow!("LLM request timed out")
                } else {
                    anyhow!("failed to call LLM endpoint: {err}")
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(anyhow!("LLM endpoint returned {status}: {detail}"));
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .context("failed to parse LLM response")?;

        let content = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .filter(|content| !content.trim().is_empty())
            .ok_or_else(|| anyhow!("LLM response contained no content"))?;

        debug!(chars = content.len(), "llm completion received");
        Ok(content)
    }

    fn name(&self) -> &str {
        &self.model
    }
}
