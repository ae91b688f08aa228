#![expect(
    clippy::tests_outside_test_module,
    reason = "integration tests are only compiled in test mode"
)]

mod common;

use std::time::Duration;

use rag_app::RagError;
use rag_app::config::QueryConfig;
use rag_app::documents::TextEncoding;
use rag_app::embeddings::ChunkingConfig;
use rag_app::workflow::{
    IngestRequest, IngestWorkflow, LocalRunner, QueryRequest, QueryWorkflow, RetryPolicy,
    point_id,
};
use tempfile::TempDir;

fn runner() -> LocalRunner {
    LocalRunner::new(RetryPolicy {
        max_attempts: 1,
        base_delay: Duration::from_millis(1),
    })
}

fn ingest_workflow(store: rag_app::database::VectorStore, max_chunk_size: usize) -> IngestWorkflow {
    IngestWorkflow::new(
        common::embedder(),
        store,
        ChunkingConfig {
            max_chunk_size,
            overlap_size: 10,
        },
        TextEncoding::DEFAULT_CHAIN.to_vec(),
    )
}

#[tokio::test]
async fn short_document_becomes_one_point() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let store = common::open_store(temp_dir.path()).await;
    let path = common::write_document(
        temp_dir.path(),
        "a.txt",
        "\n  The cat sat. The dog ran. The bird flew.  \n",
    );

    let workflow = ingest_workflow(store.clone(), 1000);
    let loaded = workflow
        .load_and_chunk(&path, "a.txt")
        .await
        .expect("should load document");
    assert_eq!(loaded.chunks, ["The cat sat. The dog ran. The bird flew."]);

    let result = workflow
        .run(&runner(), &IngestRequest::new(path).with_source_id("a.txt"))
        .await
        .expect("should ingest");
    assert_eq!(result.ingested, 1);
    assert_eq!(store.count().await.expect("should count"), 1);
}

#[tokio::test]
async fn question_is_answered_from_stored_chunk() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let store = common::open_store(temp_dir.path()).await;
    let path = common::write_document(temp_dir.path(), "a.txt", "The cat sat.");

    ingest_workflow(store.clone(), 1000)
        .run(&runner(), &IngestRequest::new(path).with_source_id("a.txt"))
        .await
        .expect("should ingest");

    let found = store
        .search_contexts(&common::FakeEmbedder::vector_for("What did the cat do?"), 5)
        .await
        .expect("should search");
    assert!(found.contexts.contains(&"The cat sat.".to_string()));
    assert!(found.sources.contains(&"a.txt".to_string()));

    let query = QueryWorkflow::new(common::embedder(), store, common::model(), QueryConfig::default());
    let result = query
        .run(&runner(), &QueryRequest::new("What did the cat do?"))
        .await
        .expect("should answer");

    assert!(!result.answer.is_empty());
    assert_eq!(result.answer, "The cat sat.");
    assert_eq!(result.sources, ["a.txt"]);
    assert_eq!(result.num_contexts, 1);
}

#[tokio::test]
async fn unsupported_extension_is_rejected() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let store = common::open_store(temp_dir.path()).await;
    let path = common::write_document(temp_dir.path(), "report.docx", "not really a docx");

    let result = ingest_workflow(store.clone(), 1000)
        .run(&runner(), &IngestRequest::new(path))
        .await;

    assert!(matches!(
        result,
        Err(RagError::UnsupportedFileType { ref extension }) if extension == ".docx"
    ));
    assert_eq!(store.count().await.expect("should count"), 0);
}

#[tokio::test]
async fn reset_empties_collection() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let store = common::open_store(temp_dir.path()).await;
    let path = common::write_document(temp_dir.path(), "a.txt", "The cat sat.");

    ingest_workflow(store.clone(), 1000)
        .run(&runner(), &IngestRequest::new(path))
        .await
        .expect("should ingest");
    assert_eq!(store.count().await.expect("should count"), 1);

    assert!(store.reset_collection().await);
    assert_eq!(store.count().await.expect("should count"), 0);
}

#[tokio::test]
async fn reingestion_is_idempotent() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let store = common::open_store(temp_dir.path()).await;
    let text = "Chunked documents keep their order. Every chunk gets an id from its \
                source and position. Re-ingesting a document replaces its points.";
    let path = common::write_document(temp_dir.path(), "long.txt", text);

    let workflow = ingest_workflow(store.clone(), 40);
    let request = IngestRequest::new(path).with_source_id("long");

    let first = workflow.run(&runner(), &request).await.expect("should ingest");
    let count = store.count().await.expect("should count");
    assert!(first.ingested > 1);
    assert_eq!(count, first.ingested as u64);

    let second = workflow.run(&runner(), &request).await.expect("should ingest again");
    assert_eq!(second.ingested, first.ingested);
    assert_eq!(store.count().await.expect("should count"), count);

    let ids: Vec<String> = store
        .search(&common::FakeEmbedder::vector_for(text), first.ingested)
        .await
        .expect("should search")
        .into_iter()
        .map(|p| p.id)
        .collect();
    for i in 0..first.ingested {
        assert!(ids.contains(&point_id("long", i)));
    }
}
