// Deterministic stand-ins for the remote providers
// Compiled for unit tests and, behind `test-support`, for the integration tests

use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;

use crate::embeddings::Embedder;
use crate::llm::{ChatMessage, LanguageModel};
use crate::{RagError, Result};

pub const TEST_DIMENSION: usize = 64;

/// Bag-of-words embedder: texts sharing words get similar vectors
#[derive(Debug, Default)]
pub struct FakeEmbedder {
    pub calls: AtomicUsize,
}

impl FakeEmbedder {
    #[inline]
    pub fn vector_for(text: &str) -> Vec<f32> {
        let mut vector = vec![0.01; TEST_DIMENSION];
        for word in text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
        {
            let bucket = word
                .to_lowercase()
                .bytes()
                .fold(0usize, |acc, b| acc.wrapping_mul(31).wrapping_add(b as usize));
            vector[bucket % TEST_DIMENSION] += 1.0;
        }
        vector
    }
}

#[async_trait]
impl Embedder for FakeEmbedder {
    fn dimension(&self) -> usize {
        TEST_DIMENSION
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(texts.iter().map(|t| Self::vector_for(t)).collect())
    }
}

/// Embedder whose provider is always down
#[derive(Debug, Default)]
pub struct FailingEmbedder;

#[async_trait]
impl Embedder for FailingEmbedder {
    fn dimension(&self) -> usize {
        TEST_DIMENSION
    }

    async fn embed(&self, _texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Err(RagError::EmbeddingProvider("provider unavailable".to_string()))
    }
}

/// Language model that answers with a fixed reply and remembers its prompts
#[derive(Debug)]
pub struct FakeModel {
    pub reply: String,
    pub fail: bool,
    pub prompts: Mutex<Vec<Vec<ChatMessage>>>,
}

impl FakeModel {
    #[inline]
    pub fn answering(reply: &str) -> Self {
        Self {
            reply: reply.to_string(),
            fail: false,
            prompts: Mutex::new(Vec::new()),
        }
    }

    #[inline]
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::answering("")
        }
    }

    #[inline]
    pub fn last_prompt(&self) -> Option<Vec<ChatMessage>> {
        self.prompts.lock().ok()?.last().cloned()
    }
}

#[async_trait]
impl LanguageModel for FakeModel {
    async fn complete(&self, messages: &[ChatMessage]) -> Result<String> {
        if let Ok(mut prompts) = self.prompts.lock() {
            prompts.push(messages.to_vec());
        }
        if self.fail {
            return Err(RagError::LanguageModel("model unavailable".to_string()));
        }
        Ok(self.reply.clone())
    }
}
