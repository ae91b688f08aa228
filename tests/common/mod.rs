// Shared fixtures for the integration tests

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use rag_app::Result;
use rag_app::database::{Distance, VectorStore};
use rag_app::embeddings::Embedder;
use rag_app::llm::{ChatMessage, LanguageModel};

pub use rag_app::testing::{FakeEmbedder, TEST_DIMENSION};

/// Answers with the first retrieved context line
pub struct EchoModel;

#[async_trait]
impl LanguageModel for EchoModel {
    async fn complete(&self, messages: &[ChatMessage]) -> Result<String> {
        let prompt = messages.last().map(|m| m.content.as_str()).unwrap_or_default();
        let answer = prompt
            .lines()
            .find_map(|line| line.strip_prefix("- "))
            .unwrap_or("I don't know.");
        Ok(format!("  {}\n", answer))
    }
}

pub fn embedder() -> Arc<dyn Embedder> {
    Arc::new(FakeEmbedder::default())
}

pub fn model() -> Arc<dyn LanguageModel> {
    Arc::new(EchoModel)
}

pub async fn open_store(dir: &Path) -> VectorStore {
    VectorStore::open(
        &dir.join("vectors").to_string_lossy(),
        "docs",
        TEST_DIMENSION,
        Distance::Cosine,
    )
    .await
    .expect("should open vector store")
}

pub fn write_document(dir: &Path, name: &str, contents: &str) -> String {
    let path = dir.join(name);
    std::fs::write(&path, contents).expect("should write document");
    path.to_string_lossy().into_owned()
}
