//! Model clients: the hosted Azure OpenAI deployments, deterministic
//! offline stand-ins, and the retry/admission layer that wraps both.

pub mod azure;
pub mod gate;
pub mod offline;
pub mod prompts;
pub mod resilient;
pub mod retry;
pub mod summarize;

use std::sync::Arc;
use tracing::info;

use hrag_core::config::{ApiCredentials, ProviderKind, Settings};
use hrag_core::traits::{ChatModel, Embedder, Summarizer};
use hrag_core::Result;

pub use azure::AzureOpenAi;
pub use gate::CallGate;
pub use offline::{ExtractiveChat, HashEmbedder};
pub use resilient::Resilient;
pub use retry::{with_retry, RetryPolicy};
pub use summarize::PromptSummarizer;

/// The three model roles plus the gate and retry policy every call
/// through `Models` is subject to.
#[derive(Clone)]
pub struct Models {
    pub embedder: Arc<dyn Embedder>,
    pub chat: Arc<dyn ChatModel>,
    pub summarizer: Arc<dyn Summarizer>,
    pub gate: CallGate,
    pub policy: RetryPolicy,
}

impl Models {
    pub fn new(
        embedder: Arc<dyn Embedder>,
        chat: Arc<dyn ChatModel>,
        summarizer: Arc<dyn Summarizer>,
        gate: CallGate,
        policy: RetryPolicy,
    ) -> Self {
        Self { embedder, chat, summarizer, gate, policy }
    }

    /// Offline models with a summarizer driven through the extractive chat.
    pub fn offline(dim: usize, summary_words: usize, gate: CallGate, policy: RetryPolicy) -> Self {
        let chat = Arc::new(ExtractiveChat::new(summary_words));
        let summarizer = Arc::new(PromptSummarizer::new(chat.clone(), summary_words));
        Self::new(Arc::new(HashEmbedder::new(dim)), chat, summarizer, gate, policy)
    }

    pub fn embedder(&self) -> Resilient<dyn Embedder> {
        Resilient::new(self.embedder.clone(), self.gate.clone(), self.policy)
    }

    pub fn chat(&self) -> Resilient<dyn ChatModel> {
        Resilient::new(self.chat.clone(), self.gate.clone(), self.policy)
    }

    pub fn summarizer(&self) -> Resilient<dyn Summarizer> {
        Resilient::new(self.summarizer.clone(), self.gate.clone(), self.policy)
    }
}

/// Build the configured provider. Missing credentials are a configuration
/// error raised here, before any work starts.
pub fn build_models(settings: &Settings) -> Result<Models> {
    let gate = CallGate::new(settings.orchestrator.concurrency);
    let policy = RetryPolicy::from_settings(&settings.orchestrator);
    let models = &settings.models;
    match models.provider {
        ProviderKind::Offline => {
            info!(dim = models.embedding_dim, "using offline models");
            Ok(Models::offline(models.embedding_dim, models.summary_max_words, gate, policy))
        }
        ProviderKind::Azure => {
            let credentials = ApiCredentials::resolve(models)?;
            info!(endpoint = %credentials.endpoint, chat = %models.chat_deployment, embedding = %models.embedding_deployment, "using azure openai");
            let client = Arc::new(AzureOpenAi::new(models, credentials)?);
            let summarizer = Arc::new(PromptSummarizer::new(client.clone(), models.summary_max_words));
            Ok(Models::new(client.clone(), client, summarizer, gate, policy))
        }
    }
}
