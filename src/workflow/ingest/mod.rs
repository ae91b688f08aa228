// Ingestion workflow
// document -> chunks -> vectors -> stored points

#[cfg(test)]
mod tests;

use std::path::PathBuf;
use std::future::Future;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use uuid::Uuid;

use super::limits::{RateLimiter, Throttle};
use super::runner::StepRunner;
use crate::config::Config;
use crate::database::{PointPayload, VectorStore};
use crate::documents::{TextEncoding, load_document};
use crate::embeddings::{ChunkingConfig, Embedder};
use crate::{RagError, Result};

/// Request to ingest one document
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngestRequest {
    #[serde(alias = "pdf_path")]
    pub document_path: String,
    /// Identifier the stored points are attributed to, the path when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_id: Option<String>,
}

impl IngestRequest {
    #[inline]
    pub fn new(document_path: impl Into<String>) -> Self {
        Self {
            document_path: document_path.into(),
            source_id: None,
        }
    }

    #[inline]
    #[must_use]
    pub fn with_source_id(mut self, source_id: impl Into<String>) -> Self {
        self.source_id = Some(source_id.into());
        self
    }

    /// The source id the document's points are stored under
    #[inline]
    pub fn resolved_source_id(&self) -> &str {
        self.source_id
            .as_deref()
            .filter(|id| !id.is_empty())
            .unwrap_or(&self.document_path)
    }
}

/// Outcome of an ingestion run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngestResult {
    pub ingested: usize,
}

/// Chunk texts bound to the source they came from
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunksAndSource {
    pub chunks: Vec<String>,
    pub source_id: String,
}

/// Deterministic id of the chunk at `index` of `source_id`.
///
/// Re-ingesting a source yields the same ids, so its points are overwritten
/// rather than duplicated.
#[inline]
pub fn point_id(source_id: &str, index: usize) -> String {
    Uuid::new_v5(&Uuid::NAMESPACE_URL, format!("{}:{}", source_id, index).as_bytes()).to_string()
}

/// Turns documents into searchable points
pub struct IngestWorkflow {
    embedder: Arc<dyn Embedder>,
    store: VectorStore,
    chunking: ChunkingConfig,
    encodings: Vec<TextEncoding>,
    throttle: Option<Arc<Throttle>>,
    rate_limiter: Option<Arc<RateLimiter>>,
}

impl IngestWorkflow {
    /// Create a workflow without admission limits
    #[inline]
    pub fn new(
        embedder: Arc<dyn Embedder>,
        store: VectorStore,
        chunking: ChunkingConfig,
        encodings: Vec<TextEncoding>,
    ) -> Self {
        Self {
            embedder,
            store,
            chunking,
            encodings,
            throttle: None,
            rate_limiter: None,
        }
    }

    /// Create a workflow with the throttle and per-source rate limit from
    /// the configuration
    #[inline]
    pub fn from_config(config: &Config, embedder: Arc<dyn Embedder>, store: VectorStore) -> Self {
        Self::new(
            embedder,
            store,
            config.chunking.clone(),
            config.documents.encodings.clone(),
        )
        .with_limits(
            Arc::new(Throttle::from_config(&config.workflow)),
            Arc::new(RateLimiter::from_config(&config.workflow)),
        )
    }

    #[inline]
    #[must_use]
    pub fn with_limits(mut self, throttle: Arc<Throttle>, rate_limiter: Arc<RateLimiter>) -> Self {
        self.throttle = Some(throttle);
        self.rate_limiter = Some(rate_limiter);
        self
    }

    /// Ingest a document as two checkpointed steps
    #[inline]
    pub fn run<'a, R: StepRunner>(
        &'a self,
        runner: &'a R,
        request: &'a IngestRequest,
    ) -> impl Future<Output = Result<IngestResult>> + Send + 'a {
        async move {
            let source_id = request.resolved_source_id();

            if let Some(limiter) = &self.rate_limiter {
                limiter.try_acquire(source_id)?;
            }
            if let Some(throttle) = &self.throttle {
                throttle.acquire().await;
            }

            info!("Ingesting {} as {}", request.document_path, source_id);

            let loaded: ChunksAndSource = runner
                .run_step("load-and-chunk", || {
                    self.load_and_chunk(&request.document_path, source_id)
                })
                .await?;

            let ingested: IngestResult = runner
                .run_step("embed-and-upsert", || self.embed_and_upsert(&loaded))
                .await?;

            info!("Ingested {} chunks from {}", ingested.ingested, source_id);
            Ok(ingested)
        }
    }

    /// Read the document and split it into chunks
    #[inline]
    pub async fn load_and_chunk(&self, document_path: &str, source_id: &str) -> Result<ChunksAndSource> {
        let path = PathBuf::from(document_path);
        let encodings = self.encodings.clone();
        let document = tokio::task::spawn_blocking(move || load_document(&path, &encodings))
            .await
            .map_err(|e| RagError::Other(anyhow::anyhow!("Document loading task failed: {}", e)))??;

        let chunks = self.chunking.chunk_text(&document.text);
        debug!("Loaded {} chunks from {}", chunks.len(), document_path);

        Ok(ChunksAndSource {
            chunks,
            source_id: source_id.to_string(),
        })
    }

    /// Embed all chunks in one call and upsert them under deterministic ids
    #[inline]
    pub async fn embed_and_upsert(&self, data: &ChunksAndSource) -> Result<IngestResult> {
        if data.chunks.is_empty() {
            info!("No text to ingest for {}", data.source_id);
            return Ok(IngestResult { ingested: 0 });
        }

        let vectors = self.embedder.embed(&data.chunks).await?;
        if vectors.len() != data.chunks.len() {
            return Err(RagError::EmbeddingProvider(format!(
                "Expected {} embeddings, got {}",
                data.chunks.len(),
                vectors.len()
            )));
        }

        let ids: Vec<String> = (0..data.chunks.len())
            .map(|i| point_id(&data.source_id, i))
            .collect();
        let payloads: Vec<PointPayload> = data
            .chunks
            .iter()
            .map(|text| PointPayload {
                source: data.source_id.clone(),
                text: text.clone(),
            })
            .collect();

        self.store.upsert(&ids, &vectors, &payloads).await?;

        Ok(IngestResult {
            ingested: data.chunks.len(),
        })
    }
}
