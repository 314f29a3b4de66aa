use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use serde_json::Value;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RequestMessage {
    pub role: String,
    pub content: String,
}

/// Chat-completion request body
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CompletionRequest {
    pub model: String,
    pub messages: Vec<RequestMessage>,
    pub max_tokens: u32,
}

impl CompletionRequest {
    /// Single-turn request carrying only the latest user message
    pub fn user(model: &str, content: &str, max_tokens: u32) -> Self {
        Self {
            model: model.to_string(),
            messages: vec![RequestMessage {
                role: "user".to_string(),
                content: content.to_string(),
            }],
            max_tokens,
        }
    }
}

/// Something that can answer a chat-completion request with a JSON body.
#[async_trait]
pub trait CompletionClient: Send + Sync {
    async fn complete(&self, request: &CompletionRequest) -> Result<Value>;
}

#[derive(Clone)]
pub struct HttpCompletionClient {
    client: Client,
    endpoint: String,
    api_key: String,
}

impl HttpCompletionClient {
    pub fn new(endpoint: &str, api_key: &str) -> Self {
        Self {
            client: Client::new(),
            endpoint: endpoint.to_string(),
            api_key: api_key.to_string(),
        }
    }

    pub fn with_timeout(endpoint: &str, api_key: &str, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .context("failed to build HTTP client")?;

        Ok(Self {
            client,
            endpoint: endpoint.to_string(),
            api_key: api_key.to_string(),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl CompletionClient for HttpCompletionClient {
    async fn complete(&self, request: &CompletionRequest) -> Result<Value> {
        let response = self.client
            .post(&self.endpoint)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(request)
            .send()
            .await?;

        // Error statuses are rendered like any other body as long as it is JSON.
        let status = response.status();
        if !status.is_success() {
            tracing::warn!(%status, endpoint = %self.endpoint, "completion endpoint returned error status");
        }

        let body: Value = response.json().await?;
        Ok(body)
    }
}
