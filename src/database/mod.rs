// Database module
// Vector storage backed by LanceDB

pub mod lancedb;

pub use lancedb::{Distance, PointPayload, ScoredPoint, SearchResult, VectorStore};
