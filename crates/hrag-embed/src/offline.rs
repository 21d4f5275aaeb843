//! Deterministic stand-ins for the hosted models. Used by tests and by
//! `provider = "offline"` runs that must not touch the network.

use async_trait::async_trait;
use serde_json::json;
use std::hash::{Hash, Hasher};
use twox_hash::XxHash64;

use hrag_core::traits::{ChatModel, Embedder};
use hrag_core::ServiceError;

use crate::prompts;

/// Bag-of-words hashing embedder. Texts sharing words get similar vectors.
#[derive(Debug, Clone)]
pub struct HashEmbedder {
    dim: usize,
    id: String,
}

impl HashEmbedder {
    pub fn new(dim: usize) -> Self {
        let dim = dim.max(1);
        Self { dim, id: format!("offline-hash:d{dim}") }
    }

    pub fn embed_sync(&self, text: &str) -> Vec<f32> {
        let mut v = vec![0f32; self.dim];
        for token in tokens(text) {
            let mut hasher = XxHash64::with_seed(0);
            token.hash(&mut hasher);
            let h = hasher.finish();
            let idx = (h as usize) % self.dim;
            let sign = if h >> 63 == 0 { 1.0 } else { -1.0 };
            v[idx] += sign * (0.5 + ((h >> 32) as u32) as f32 / u32::MAX as f32);
        }
        let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt().max(1e-6);
        for x in &mut v {
            *x /= norm;
        }
        v
    }
}

/// Lowercased alphanumeric words.
pub fn tokens(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split(|c: char| !c.is_alphanumeric()).filter(|t| !t.is_empty()).map(str::to_lowercase)
}

#[async_trait]
impl Embedder for HashEmbedder {
    fn model_id(&self) -> &str {
        &self.id
    }

    fn dim(&self) -> usize {
        self.dim
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ServiceError> {
        Ok(texts.iter().map(|t| self.embed_sync(t)).collect())
    }
}

/// Chat model that answers by extracting from the prompt.
#[derive(Debug, Clone)]
pub struct ExtractiveChat {
    summary_words: usize,
}

impl ExtractiveChat {
    pub fn new(summary_words: usize) -> Self {
        Self { summary_words: summary_words.max(1) }
    }
}

impl Default for ExtractiveChat {
    fn default() -> Self {
        Self::new(40)
    }
}

pub fn first_sentence(text: &str) -> &str {
    let text = text.trim();
    let mut chars = text.char_indices().peekable();
    while let Some((i, c)) = chars.next() {
        if matches!(c, '.' | '!' | '?') && chars.peek().map_or(true, |(_, n)| n.is_whitespace()) {
            return &text[..i + c.len_utf8()];
        }
    }
    text
}

#[async_trait]
impl ChatModel for ExtractiveChat {
    fn model_id(&self) -> &str {
        "offline-extractive"
    }

    async fn complete(&self, system: &str, prompt: &str) -> Result<String, ServiceError> {
        let reply = match system {
            prompts::SUMMARY_SYSTEM => {
                let words: Vec<&str> = prompts::body_of(prompt).split_whitespace().take(self.summary_words).collect();
                words.join(" ")
            }
            prompts::TESTSET_SYSTEM => {
                let sentence = first_sentence(prompts::body_of(prompt));
                let topic: Vec<&str> = sentence.split_whitespace().take(6).collect();
                json!({
                    "question": format!("What does the text say about {}?", topic.join(" ").trim_end_matches(['.', '!', '?'])),
                    "ground_truth": sentence,
                })
                .to_string()
            }
            prompts::ANSWER_SYSTEM => {
                let (contexts, _) = prompts::split_answer_prompt(prompt);
                let first = contexts.split(prompts::CONTEXT_SEPARATOR).map(str::trim).find(|c| !c.is_empty());
                match first {
                    Some(ctx) => first_sentence(ctx).to_string(),
                    None => "The context does not contain an answer.".to_string(),
                }
            }
            _ => first_sentence(prompts::body_of(prompt)).to_string(),
        };
        if reply.trim().is_empty() {
            return Err(ServiceError::InvalidResponse { message: "nothing to extract".to_string() });
        }
        Ok(reply)
    }
}
