use async_trait::async_trait;

use crate::error::ServiceError;

/// Maps text to fixed-length vectors.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Stable identifier of the model/deployment (used in cache keys).
    fn model_id(&self) -> &str;
    fn dim(&self) -> usize;
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ServiceError>;

    async fn embed(&self, text: &str) -> Result<Vec<f32>, ServiceError> {
        let mut out = self.embed_batch(&[text.to_string()]).await?;
        out.pop().ok_or_else(|| ServiceError::InvalidResponse {
            message: "embedding response was empty".to_string(),
        })
    }
}

/// Single-turn text completion.
#[async_trait]
pub trait ChatModel: Send + Sync {
    fn model_id(&self) -> &str;
    async fn complete(&self, system: &str, prompt: &str) -> Result<String, ServiceError>;
}

#[async_trait]
pub trait Summarizer: Send + Sync {
    fn model_id(&self) -> &str;
    async fn summarize(&self, text: &str) -> Result<String, ServiceError>;
}
