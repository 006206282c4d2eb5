use std::time::Duration;

use anyhow::{Context, anyhow};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use crate::config::SearchConfig;
use crate::runtime::{SearchHit, SearchTool};
use crate::{SecretValue, VerifactError};

const SEARCH_TIMEOUT_SECS: u64 = 30;

#[derive(Serialize)]
struct SerperRequest<'a> {
    q: &'a str,
    num: usize,
}

#[derive(Deserialize)]
struct SerperResponse {
    #[serde(default)]
    organic: Vec<SearchHit>,
}

/// Web search through the Serper Google search API.
pub struct SerperSearch {
    client: reqwest::Client,
    endpoint: String,
    max_results: usize,
    api_key: SecretValue,
}

impl SerperSearch {
    pub fn new(config: &SearchConfig, api_key: SecretValue) -> Result<Self, VerifactError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(SEARCH_TIMEOUT_SECS))
            .build()
            .map_err(|err| {
                VerifactError::InvalidConfiguration(format!("failed to create HTTP client: {err}"))
            })?;

        Ok(Self {
            client,
            endpoint: config.endpoint.clone(),
            max_results: config.max_results.max(1),
            api_key,
        })
    }
}

#[async_trait]
impl SearchTool for SerperSearch {
    #[instrument(name = "search.serper", skip(self))]
    async fn search(&self, query: &str) -> anyhow::Result<Vec<SearchHit>> {
        let response = self
            .client
            .post(&self.endpoint)
            .header("X-API-KEY", self.api_key.expose())
            .json(&SerperRequest {
                q: query,
                num: self.max_results,
            })
            .send()
            .await
            .map_err(|err| anyhow!("failed to call search endpoint: {err}"))?;

        let status = response.status();
        if !status.is_success() {
            return Err(anyhow!("search endpoint returned {status}"));
        }

        let parsed: SerperResponse = response
            .json()
            .await
            .context("failed to parse search response")?;

        let mut hits = parsed.organic;
        hits.truncate(self.max_results);
        debug!(hits = hits.len(), "search completed");
        Ok(hits)
    }
}
