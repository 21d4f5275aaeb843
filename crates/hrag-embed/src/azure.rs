//! Azure OpenAI client for chat completions and embeddings.
//!
//! Endpoint, key and deployment names come from an explicit
//! `ModelSettings` + `ApiCredentials` pair; the client reads no
//! environment state of its own.

use async_trait::async_trait;
use reqwest::header::RETRY_AFTER;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::debug;

use hrag_core::config::{ApiCredentials, ModelSettings};
use hrag_core::traits::{ChatModel, Embedder};
use hrag_core::{Error, Result, ServiceError};

/// Retry-after used when a 429 carries no header.
const DEFAULT_RETRY_AFTER_SECS: u64 = 5;

pub struct AzureOpenAi {
    client: Client,
    endpoint: String,
    api_key: String,
    api_version: String,
    chat_deployment: String,
    embedding_deployment: String,
    embedding_dim: usize,
    timeout_secs: u64,
    chat_id: String,
    embedding_id: String,
}

impl AzureOpenAi {
    pub fn new(models: &ModelSettings, credentials: ApiCredentials) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(models.request_timeout_secs))
            .build()
            .map_err(|e| Error::config(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            client,
            chat_id: format!("azure:{}", models.chat_deployment),
            embedding_id: format!("azure:{}:d{}", models.embedding_deployment, models.embedding_dim),
            endpoint: credentials.endpoint,
            api_key: credentials.api_key,
            api_version: models.api_version.clone(),
            chat_deployment: models.chat_deployment.clone(),
            embedding_deployment: models.embedding_deployment.clone(),
            embedding_dim: models.embedding_dim,
            timeout_secs: models.request_timeout_secs,
        })
    }

    fn url(&self, deployment: &str, operation: &str) -> String {
        deployment_url(&self.endpoint, deployment, operation, &self.api_version)
    }

    async fn post(&self, url: &str, body: &Value) -> std::result::Result<Value, ServiceError> {
        debug!(url, "azure request");
        let resp = self
            .client
            .post(url)
            .header("api-key", &self.api_key)
            .json(body)
            .send()
            .await
            .map_err(|e| self.transport_error(&e))?;
        let status = resp.status();
        if !status.is_success() {
            let retry_after = resp
                .headers()
                .get(RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|s| s.trim().parse::<u64>().ok());
            let text = resp.text().await.unwrap_or_default();
            return Err(classify_status(status.as_u16(), retry_after, &text));
        }
        resp.json::<Value>()
            .await
            .map_err(|e| ServiceError::InvalidResponse { message: format!("response body is not JSON: {e}") })
    }

    fn transport_error(&self, e: &reqwest::Error) -> ServiceError {
        if e.is_timeout() {
            ServiceError::Timeout { timeout_secs: self.timeout_secs }
        } else {
            ServiceError::Connection { message: e.to_string() }
        }
    }
}

pub fn deployment_url(endpoint: &str, deployment: &str, operation: &str, api_version: &str) -> String {
    format!(
        "{}/openai/deployments/{}/{}?api-version={}",
        endpoint.trim_end_matches('/'),
        deployment,
        operation,
        api_version
    )
}

/// Map a non-success HTTP status to a `ServiceError`.
pub fn classify_status(status: u16, retry_after: Option<u64>, body: &str) -> ServiceError {
    let message = error_message(body);
    match status {
        401 | 403 => ServiceError::Auth { message },
        408 => ServiceError::Timeout { timeout_secs: 0 },
        429 => ServiceError::RateLimited { retry_after_secs: retry_after.unwrap_or(DEFAULT_RETRY_AFTER_SECS) },
        _ => ServiceError::Http { status, message },
    }
}

fn error_message(body: &str) -> String {
    serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|v| v["error"]["message"].as_str().map(str::to_string))
        .unwrap_or_else(|| body.chars().take(300).collect())
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    index: usize,
    embedding: Vec<f32>,
}

/// Parse an embeddings response, restoring input order and checking shape.
pub fn parse_embeddings(body: Value, expected: usize, dim: usize) -> std::result::Result<Vec<Vec<f32>>, ServiceError> {
    let mut parsed: EmbeddingResponse = serde_json::from_value(body)
        .map_err(|e| ServiceError::InvalidResponse { message: format!("bad embeddings payload: {e}") })?;
    if parsed.data.len() != expected {
        return Err(ServiceError::InvalidResponse {
            message: format!("expected {} embeddings, got {}", expected, parsed.data.len()),
        });
    }
    parsed.data.sort_by_key(|d| d.index);
    let mut out = Vec::with_capacity(expected);
    for d in parsed.data {
        if d.embedding.len() != dim {
            return Err(ServiceError::DimensionMismatch { expected: dim, got: d.embedding.len() });
        }
        out.push(d.embedding);
    }
    Ok(out)
}

pub fn parse_chat(body: &Value) -> std::result::Result<String, ServiceError> {
    body["choices"][0]["message"]["content"]
        .as_str()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .ok_or_else(|| ServiceError::InvalidResponse { message: "no message content in choices".to_string() })
}

#[async_trait]
impl Embedder for AzureOpenAi {
    fn model_id(&self) -> &str {
        &self.embedding_id
    }

    fn dim(&self) -> usize {
        self.embedding_dim
    }

    async fn embed_batch(&self, texts: &[String]) -> std::result::Result<Vec<Vec<f32>>, ServiceError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        let url = self.url(&self.embedding_deployment, "embeddings");
        let body = self.post(&url, &json!({ "input": texts })).await?;
        parse_embeddings(body, texts.len(), self.embedding_dim)
    }
}

#[async_trait]
impl ChatModel for AzureOpenAi {
    fn model_id(&self) -> &str {
        &self.chat_id
    }

    async fn complete(&self, system: &str, prompt: &str) -> std::result::Result<String, ServiceError> {
        let url = self.url(&self.chat_deployment, "chat/completions");
        let body = json!({
            "messages": [
                { "role": "system", "content": system },
                { "role": "user", "content": prompt },
            ],
            "temperature": 0.0,
        });
        let resp = self.post(&url, &body).await?;
        parse_chat(&resp)
    }
}
