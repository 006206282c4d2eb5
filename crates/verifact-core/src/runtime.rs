//! Seams between the crew executor and the services it calls.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::{LlmProvider, SearchProvider, Settings};
use crate::llm::OpenAiBackend;
use crate::search::SerperSearch;
use crate::VerifactError;

/// Prompt handed to a language model for one task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletionRequest {
    pub agent: String,
    pub task: String,
    pub system: String,
    pub prompt: String,
}

#[async_trait]
pub trait LlmBackend: Send + Sync {
    async fn complete(&self, request: &CompletionRequest) -> anyhow::Result<String>;

    fn name(&self) -> &str;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchHit {
    pub title: String,
    pub link: String,
    #[serde(default)]
    pub snippet: String,
}

#[async_trait]
pub trait SearchTool: Send + Sync {
    async fn search(&self, query: &str) -> anyhow::Result<Vec<SearchHit>>;
}

/// Services shared by every task of a crew run.
#[derive(Clone)]
pub struct AgentRuntime {
    pub llm: Arc<dyn LlmBackend>,
    pub search: Option<Arc<dyn SearchTool>>,
}

impl AgentRuntime {
    pub fn new(llm: Arc<dyn LlmBackend>) -> Self {
        Self { llm, search: None }
    }

    pub fn with_search(mut self, search: Arc<dyn SearchTool>) -> Self {
        self.search = Some(search);
        self
    }

    /// Construct the configured backends, reading secrets from the environment.
    pub fn from_settings(settings: &Settings) -> Result<Self, VerifactError> {
        let llm: Arc<dyn LlmBackend> = match settings.llm.provider {
            LlmProvider::OpenAi => Arc::new(OpenAiBackend::new(
                &settings.llm,
                settings.llm_api_key()?,
            )?),
            LlmProvider::Offline => Arc::new(OfflineBackend),
        };

        let search: Option<Arc<dyn SearchTool>> = match settings.search.provider {
            SearchProvider::Serper => Some(Arc::new(SerperSearch::new(
                &settings.search,
                settings.search_api_key()?,
            )?)),
            SearchProvider::None => None,
        };

        Ok(Self { llm, search })
    }
}

/// Deterministic backend that never leaves the process.
#[derive(Debug, Default, Clone, Copy)]
pub struct OfflineBackend;

#[async_trait]
impl LlmBackend for OfflineBackend {
    async fn complete(&self, request: &CompletionRequest) -> anyhow::Result<String> {
        let headline = request
            .prompt
            .lines()
            .find_map(|line| line.strip_prefix("Current Task: "))
            .unwrap_or(request.task.as_str());

        Ok(format!(
            "Report from {} on `{}`\nTask: {}\nNo external sources were consulted (offline mode).\nVerdict: Unverified",
            request.agent, request.task, headline
        ))
    }

    fn name(&self) -> &str {
        "offline"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn offline_backend_reports_no_verdict() {
        let request = CompletionRequest {
            agent: "fact_checker".into(),
            task: "fact_check_claim".into(),
            system: String::new(),
            prompt: "Current Task: Verify the claim\n".into(),
        };
        let output = OfflineBackend.complete(&request).await.unwrap();
        assert!(output.contains("Verify the claim"));
        assert_eq!(crate::classify_verdict(&output), crate::Verdict::Unknown);
    }

    #[test]
    fn offline_settings_need_no_secrets() {
        let settings = Settings::offline("agents.yaml", "tasks.yaml");
        let runtime = AgentRuntime::from_settings(&settings).unwrap();
        assert_eq!(runtime.llm.name(), "offline");
        assert!(runtime.search.is_none());
    }
}
