// Workflow module
// Checkpointed multi-step execution of ingestion and query runs

pub mod ingest;
pub mod limits;
pub mod query;
pub mod runner;
pub mod runs;

pub use ingest::{ChunksAndSource, IngestRequest, IngestResult, IngestWorkflow, point_id};
pub use limits::{RateLimiter, Throttle};
pub use query::{ChatRequest, ChatResponse, QueryRequest, QueryResult, QueryWorkflow};
pub use runner::{LocalRunner, RetryPolicy, StepRunner};
pub use runs::{DEFAULT_RUN_RETENTION, RunRecord, RunRegistry, RunStatus};

/// Event that triggers a document ingestion run
pub const INGEST_EVENT: &str = "rag/ingest_document";
/// Event that triggers a question answering run
pub const QUERY_EVENT: &str = "rag/query_pdf_ai";
