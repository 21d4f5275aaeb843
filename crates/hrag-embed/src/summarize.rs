use async_trait::async_trait;
use std::sync::Arc;

use hrag_core::traits::{ChatModel, Summarizer};
use hrag_core::ServiceError;

use crate::prompts;

/// Summarizer backed by a chat model.
pub struct PromptSummarizer<C: ?Sized> {
    chat: Arc<C>,
    max_words: usize,
    id: String,
}

impl<C: ChatModel + ?Sized> PromptSummarizer<C> {
    pub fn new(chat: Arc<C>, max_words: usize) -> Self {
        let id = format!("summary:{}:w{}", chat.model_id(), max_words);
        Self { chat, max_words: max_words.max(1), id }
    }
}

#[async_trait]
impl<C: ChatModel + ?Sized> Summarizer for PromptSummarizer<C> {
    fn model_id(&self) -> &str {
        &self.id
    }

    async fn summarize(&self, text: &str) -> Result<String, ServiceError> {
        let prompt = prompts::summary_prompt(text, self.max_words);
        let summary = self.chat.complete(prompts::SUMMARY_SYSTEM, &prompt).await?;
        let summary = summary.trim();
        if summary.is_empty() {
            return Err(ServiceError::InvalidResponse { message: "empty summary".to_string() });
        }
        Ok(summary.to_string())
    }
}
