use async_trait::async_trait;
use std::sync::Arc;

use hrag_core::traits::{ChatModel, Embedder, Summarizer};
use hrag_core::{Error, Result, ServiceError};

use crate::gate::CallGate;
use crate::retry::{with_retry, RetryPolicy};

/// Wraps a model client with admission control and retries.
///
/// The `try_*` methods report the attempt count through
/// `Error::ExternalService`; the trait impls return only the terminal
/// `ServiceError` so the wrapper can stand in wherever a plain client fits.
pub struct Resilient<T: ?Sized> {
    inner: Arc<T>,
    gate: CallGate,
    policy: RetryPolicy,
}

impl<T: ?Sized> Clone for Resilient<T> {
    fn clone(&self) -> Self {
        Self { inner: Arc::clone(&self.inner), gate: self.gate.clone(), policy: self.policy }
    }
}

impl<T: ?Sized> Resilient<T> {
    pub fn new(inner: Arc<T>, gate: CallGate, policy: RetryPolicy) -> Self {
        Self { inner, gate, policy }
    }

    pub fn gate(&self) -> &CallGate {
        &self.gate
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }
}

/// Reject a reply whose vector count or width does not match the request.
fn check_shape(vectors: Vec<Vec<f32>>, count: usize, dim: usize) -> std::result::Result<Vec<Vec<f32>>, ServiceError> {
    if vectors.len() != count {
        return Err(ServiceError::InvalidResponse { message: format!("expected {count} vectors, got {}", vectors.len()) });
    }
    if let Some(bad) = vectors.iter().find(|v| v.len() != dim) {
        return Err(ServiceError::DimensionMismatch { expected: dim, got: bad.len() });
    }
    Ok(vectors)
}

impl<T: Embedder + ?Sized> Resilient<T> {
    pub async fn try_embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let expected = self.inner.dim();
        with_retry(&self.policy, &self.gate, "embed", || async {
            let vectors = self.inner.embed_batch(texts).await?;
            check_shape(vectors, texts.len(), expected)
        })
        .await
    }

    pub async fn try_embed(&self, text: &str) -> Result<Vec<f32>> {
        let texts = [text.to_string()];
        let expected = self.inner.dim();
        with_retry(&self.policy, &self.gate, "embed", || async {
            let vectors = self.inner.embed_batch(&texts).await?;
            check_shape(vectors, 1, expected)?
                .pop()
                .ok_or_else(|| ServiceError::InvalidResponse { message: "embedding response was empty".to_string() })
        })
        .await
    }
}

impl<T: Summarizer + ?Sized> Resilient<T> {
    pub async fn try_summarize(&self, text: &str) -> Result<String> {
        with_retry(&self.policy, &self.gate, "summarize", || self.inner.summarize(text)).await
    }
}

impl<T: ChatModel + ?Sized> Resilient<T> {
    pub async fn try_complete(&self, system: &str, prompt: &str) -> Result<String> {
        with_retry(&self.policy, &self.gate, "complete", || self.inner.complete(system, prompt)).await
    }
}

fn into_service_error(err: Error) -> ServiceError {
    match err {
        Error::ExternalService { source, .. } => source,
        Error::Cancelled => ServiceError::Cancelled,
        other => ServiceError::InvalidResponse { message: other.to_string() },
    }
}

#[async_trait]
impl<T: Embedder + ?Sized> Embedder for Resilient<T> {
    fn model_id(&self) -> &str {
        self.inner.model_id()
    }

    fn dim(&self) -> usize {
        self.inner.dim()
    }

    async fn embed_batch(&self, texts: &[String]) -> std::result::Result<Vec<Vec<f32>>, ServiceError> {
        self.try_embed_batch(texts).await.map_err(into_service_error)
    }
}

#[async_trait]
impl<T: Summarizer + ?Sized> Summarizer for Resilient<T> {
    fn model_id(&self) -> &str {
        self.inner.model_id()
    }

    async fn summarize(&self, text: &str) -> std::result::Result<String, ServiceError> {
        self.try_summarize(text).await.map_err(into_service_error)
    }
}

#[async_trait]
impl<T: ChatModel + ?Sized> ChatModel for Resilient<T> {
    fn model_id(&self) -> &str {
        self.inner.model_id()
    }

    async fn complete(&self, system: &str, prompt: &str) -> std::result::Result<String, ServiceError> {
        self.try_complete(system, prompt).await.map_err(into_service_error)
    }
}
