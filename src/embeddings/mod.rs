// Embeddings module
// Text chunking and the embedding provider client

pub mod chunking;
pub mod provider;

pub use chunking::{ChunkingConfig, Chunks, chunk, reconstruct};
pub use provider::{Embedder, EmbeddingClient};
