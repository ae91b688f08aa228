// LanceDB vector database module
// Handles point storage and similarity search for chunk embeddings

#[cfg(test)]
mod tests;

pub mod vector_store;

use std::fmt;

use itertools::Itertools;
use serde::{Deserialize, Serialize};

pub use vector_store::VectorStore;

/// Similarity metric a collection is searched with
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Distance {
    #[default]
    Cosine,
    L2,
    Dot,
}

impl Distance {
    #[inline]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Cosine => "cosine",
            Self::L2 => "l2",
            Self::Dot => "dot",
        }
    }

    #[inline]
    pub fn to_lance(self) -> ::lancedb::DistanceType {
        match self {
            Self::Cosine => ::lancedb::DistanceType::Cosine,
            Self::L2 => ::lancedb::DistanceType::L2,
            Self::Dot => ::lancedb::DistanceType::Dot,
        }
    }
}

impl fmt::Display for Distance {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Payload stored with every point
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PointPayload {
    /// Identifier of the document the chunk came from
    pub source: String,
    /// The chunk text
    pub text: String,
}

/// A stored point returned by a similarity search
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredPoint {
    pub id: String,
    pub payload: PointPayload,
    /// Raw distance reported by the engine (lower is closer)
    pub distance: f32,
    /// `1 - distance`; the cosine similarity for cosine collections
    pub score: f32,
}

/// Retrieved chunk texts and the distinct documents they came from
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchResult {
    pub contexts: Vec<String>,
    pub sources: Vec<String>,
}

impl SearchResult {
    /// Keep non-empty chunk texts in rank order; sources are deduplicated
    /// in order of first appearance
    #[inline]
    pub fn from_points(points: &[ScoredPoint]) -> Self {
        let with_text = || points.iter().filter(|p| !p.payload.text.is_empty());

        let contexts = with_text().map(|p| p.payload.text.clone()).collect();
        let sources = with_text()
            .map(|p| p.payload.source.as_str())
            .filter(|source| !source.is_empty())
            .unique()
            .map(str::to_owned)
            .collect();

        Self { contexts, sources }
    }
}
