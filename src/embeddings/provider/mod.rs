
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info};

use crate::config::Config;
use crate::http::{ProviderHttp, endpoint};
use crate::{RagError, Result};

/// Converts batches of text into fixed-dimension vectors.
///
/// Output order and length match the input exactly.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Dimension of every vector this embedder returns
    fn dimension(&self) -> usize;

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;

    /// Embed a single text, e.g. a question
    async fn embed_query(&self, text: &str) -> Result<Vec<f32>> {
        let mut vectors = self.embed(&[text.to_string()]).await?;
        vectors.pop().ok_or_else(|| {
            RagError::EmbeddingProvider("Provider returned no embedding for query".to_string())
        })
    }
}

/// Client for an OpenAI-compatible `/embeddings` endpoint
#[derive(Debug, Clone)]
pub struct EmbeddingClient {
    base_url: String,
    model: String,
    dimension: usize,
    http: ProviderHttp,
}

#[derive(Debug, Serialize)]
struct EmbedRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Debug, Deserialize)]
struct EmbedResponse {
    data: Vec<EmbeddingItem>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingItem {
    #[serde(default)]
    index: Option<usize>,
    embedding: Vec<f32>,
}

impl EmbeddingClient {
    #[inline]
    pub fn new(config: &Config) -> Result<Self> {
        let embedding = &config.embedding;
        embedding.validate()?;

        let http = ProviderHttp::new(
            Duration::from_secs(embedding.timeout_seconds),
            &embedding.api_key,
            &config.llm.site_url,
            &config.llm.app_name,
        );

        Ok(Self {
            base_url: embedding.base_url.clone(),
            model: embedding.model.clone(),
            dimension: embedding.dimension,
            http,
        })
    }

    /// Check that the provider is reachable
    #[inline]
    pub fn health_check(&self) -> Result<()> {
        let url = endpoint(&self.base_url, "models");
        debug!("Performing health check for embedding provider at {}", url);

        self.http
            .get(&url)
            .map_err(|e| RagError::EmbeddingProvider(format!("Health check failed: {}", e)))?;

        info!("Embedding provider at {} is reachable", self.base_url);
        Ok(())
    }

    /// Blocking batch embedding call; one request per invocation
    #[inline]
    pub fn embed_blocking(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        debug!(
            "Generating embeddings for {} texts with {}",
            texts.len(),
            self.model
        );

        let request = EmbedRequest {
            model: &self.model,
            input: texts,
        };
        let request_json = serde_json::to_string(&request).map_err(|e| {
            RagError::EmbeddingProvider(format!("Failed to serialize embedding request: {}", e))
        })?;

        let url = endpoint(&self.base_url, "embeddings");
        let response_text = self.http.post_json(&url, &request_json).map_err(|e| {
            error!("Embedding request failed: {}", e);
            RagError::EmbeddingProvider(format!("Failed to generate embeddings: {}", e))
        })?;

        let response: EmbedResponse = serde_json::from_str(&response_text).map_err(|e| {
            RagError::EmbeddingProvider(format!("Failed to parse embedding response: {}", e))
        })?;

        let vectors = order_embeddings(response.data, texts.len())?;
        self.check_dimensions(&vectors)?;

        debug!(
            "Generated {} embeddings with {} dimensions",
            vectors.len(),
            self.dimension
        );
        Ok(vectors)
    }

    fn check_dimensions(&self, vectors: &[Vec<f32>]) -> Result<()> {
        if let Some(bad) = vectors.iter().find(|v| v.len() != self.dimension) {
            return Err(RagError::Config(format!(
                "Embedding model {} returned {} dimensions but {} are configured",
                self.model,
                bad.len(),
                self.dimension
            )));
        }
        Ok(())
    }
}

/// Put provider items back into request order
fn order_embeddings(mut items: Vec<EmbeddingItem>, expected: usize) -> Result<Vec<Vec<f32>>> {
    if items.len() != expected {
        return Err(RagError::EmbeddingProvider(format!(
            "Mismatch between request and response counts: {} vs {}",
            expected,
            items.len()
        )));
    }

    if items.iter().all(|item| item.index.is_some()) {
        items.sort_by_key(|item| item.index);
        let in_range = items
            .iter()
            .enumerate()
            .all(|(position, item)| item.index == Some(position));
        if !in_range {
            return Err(RagError::EmbeddingProvider(
                "Embedding response indices do not match the request".to_string(),
            ));
        }
    }

    Ok(items.into_iter().map(|item| item.embedding).collect())
}

#[async_trait]
impl Embedder for EmbeddingClient {
    fn dimension(&self) -> usize {
        self.dimension
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let client = self.clone();
        let texts = texts.to_vec();
        tokio::task::spawn_blocking(move || client.embed_blocking(&texts))
            .await
            .map_err(|e| RagError::EmbeddingProvider(format!("Embedding task failed: {}", e)))?
    }
}
