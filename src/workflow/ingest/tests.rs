use std::sync::atomic::Ordering;
use std::time::Duration;

use super::*;
use crate::database::Distance;
use crate::testing::{FailingEmbedder, FakeEmbedder, TEST_DIMENSION};
use crate::workflow::runner::{LocalRunner, RetryPolicy};
use tempfile::TempDir;

async fn create_store(temp_dir: &TempDir) -> VectorStore {
    let uri = temp_dir.path().join("vectors");
    VectorStore::open(&uri.to_string_lossy(), "docs", TEST_DIMENSION, Distance::Cosine)
        .await
        .expect("should open store")
}

fn workflow(embedder: Arc<dyn Embedder>, store: VectorStore, max_chunk_size: usize) -> IngestWorkflow {
    IngestWorkflow::new(
        embedder,
        store,
        ChunkingConfig {
            max_chunk_size,
            overlap_size: 5,
        },
        TextEncoding::DEFAULT_CHAIN.to_vec(),
    )
}

fn runner() -> LocalRunner {
    LocalRunner::new(RetryPolicy {
        max_attempts: 2,
        base_delay: Duration::from_millis(1),
    })
}

fn write_file(temp_dir: &TempDir, name: &str, contents: &[u8]) -> String {
    let path = temp_dir.path().join(name);
    std::fs::write(&path, contents).expect("should write document");
    path.to_string_lossy().into_owned()
}

#[test]
fn point_ids_are_deterministic() {
    assert_eq!(point_id("a.txt", 0), point_id("a.txt", 0));
    assert_ne!(point_id("a.txt", 0), point_id("a.txt", 1));
    assert_ne!(point_id("a.txt", 0), point_id("b.txt", 0));

    let expected = Uuid::new_v5(&Uuid::NAMESPACE_URL, b"a.txt:0").to_string();
    assert_eq!(point_id("a.txt", 0), expected);
}

#[test]
fn request_source_id_defaults_to_path() {
    let request = IngestRequest::new("/tmp/notes.txt");
    assert_eq!(request.resolved_source_id(), "/tmp/notes.txt");

    let request = request.with_source_id("notes");
    assert_eq!(request.resolved_source_id(), "notes");

    let empty: IngestRequest =
        serde_json::from_str(r#"{"document_path": "/tmp/a.txt", "source_id": ""}"#)
            .expect("should parse");
    assert_eq!(empty.resolved_source_id(), "/tmp/a.txt");
}

#[test]
fn request_accepts_legacy_pdf_path() {
    let request: IngestRequest =
        serde_json::from_str(r#"{"pdf_path": "/tmp/a.pdf"}"#).expect("should parse");
    assert_eq!(request.document_path, "/tmp/a.pdf");
    assert_eq!(request.source_id, None);
}

#[tokio::test]
async fn short_document_is_single_point() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let store = create_store(&temp_dir).await;
    let path = write_file(&temp_dir, "a.txt", b"  The cat sat. The dog ran. The bird flew.\n");

    let workflow = workflow(Arc::new(FakeEmbedder::default()), store.clone(), 1000);
    let request = IngestRequest::new(path).with_source_id("a.txt");
    let result = workflow.run(&runner(), &request).await.expect("should ingest");

    assert_eq!(result.ingested, 1);
    assert_eq!(store.count().await.expect("should count"), 1);

    let found = store
        .search(&FakeEmbedder::vector_for("cat"), 5)
        .await
        .expect("should search");
    assert_eq!(found[0].id, point_id("a.txt", 0));
    assert_eq!(found[0].payload.text, "The cat sat. The dog ran. The bird flew.");
    assert_eq!(found[0].payload.source, "a.txt");
}

#[tokio::test]
async fn reingesting_overwrites_points() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let store = create_store(&temp_dir).await;
    let path = write_file(&temp_dir, "notes.txt", b"First version of the notes.");

    let workflow = workflow(Arc::new(FakeEmbedder::default()), store.clone(), 1000);
    let request = IngestRequest::new(path.clone()).with_source_id("notes");
    workflow.run(&runner(), &request).await.expect("should ingest");

    std::fs::write(&path, b"Second version of the notes.").expect("should rewrite document");
    workflow.run(&runner(), &request).await.expect("should ingest again");

    assert_eq!(store.count().await.expect("should count"), 1);
    let found = store
        .search(&FakeEmbedder::vector_for("notes"), 5)
        .await
        .expect("should search");
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].id, point_id("notes", 0));
    assert_eq!(found[0].payload.text, "Second version of the notes.");
}

#[tokio::test]
async fn identical_text_from_distinct_sources_does_not_collide() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let store = create_store(&temp_dir).await;
    let first = write_file(&temp_dir, "one.txt", b"Shared text.");
    let second = write_file(&temp_dir, "two.txt", b"Shared text.");

    let workflow = workflow(Arc::new(FakeEmbedder::default()), store.clone(), 1000);
    workflow
        .run(&runner(), &IngestRequest::new(first).with_source_id("one"))
        .await
        .expect("should ingest first");
    workflow
        .run(&runner(), &IngestRequest::new(second).with_source_id("two"))
        .await
        .expect("should ingest second");

    assert_eq!(store.count().await.expect("should count"), 2);
}

#[tokio::test]
async fn long_document_is_chunked_in_order() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let store = create_store(&temp_dir).await;
    let text = "Sentence number one. Sentence number two. Sentence number three. Sentence number four.";
    let path = write_file(&temp_dir, "long.txt", text.as_bytes());

    let workflow = workflow(Arc::new(FakeEmbedder::default()), store.clone(), 30);
    let loaded = workflow
        .load_and_chunk(&path, "long")
        .await
        .expect("should load");
    assert!(loaded.chunks.len() > 1);
    assert_eq!(crate::embeddings::reconstruct(&loaded.chunks, 5), text);

    let result = workflow
        .embed_and_upsert(&loaded)
        .await
        .expect("should upsert");
    assert_eq!(result.ingested, loaded.chunks.len());
    assert_eq!(
        store.count().await.expect("should count"),
        loaded.chunks.len() as u64
    );
}

#[tokio::test]
async fn unsupported_extension_writes_nothing() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let store = create_store(&temp_dir).await;
    let path = write_file(&temp_dir, "report.docx", b"binary");

    let embedder = Arc::new(FakeEmbedder::default());
    let workflow = workflow(Arc::clone(&embedder) as Arc<dyn Embedder>, store.clone(), 1000);
    let result = workflow.run(&runner(), &IngestRequest::new(path)).await;

    assert!(
        matches!(&result, Err(RagError::UnsupportedFileType { extension }) if extension == ".docx")
    );
    assert_eq!(embedder.calls.load(Ordering::SeqCst), 0);
    assert_eq!(store.count().await.expect("should count"), 0);
}

#[tokio::test]
async fn non_utf8_text_is_still_ingested() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let store = create_store(&temp_dir).await;
    let path = write_file(&temp_dir, "odd.txt", b"caf\xe9 \x81 menu");

    let workflow = workflow(Arc::new(FakeEmbedder::default()), store.clone(), 1000);
    let result = workflow
        .run(&runner(), &IngestRequest::new(path))
        .await
        .expect("encoding problems must not fail ingestion");

    assert_eq!(result.ingested, 1);
}

#[tokio::test]
async fn empty_document_ingests_nothing() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let store = create_store(&temp_dir).await;
    let path = write_file(&temp_dir, "empty.txt", b"   \n");

    let embedder = Arc::new(FakeEmbedder::default());
    let workflow = workflow(Arc::clone(&embedder) as Arc<dyn Embedder>, store.clone(), 1000);
    let result = workflow
        .run(&runner(), &IngestRequest::new(path))
        .await
        .expect("should succeed");

    assert_eq!(result.ingested, 0);
    assert_eq!(embedder.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn embedding_failure_aborts_without_points() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let store = create_store(&temp_dir).await;
    let path = write_file(&temp_dir, "a.txt", b"The cat sat.");

    let workflow = workflow(Arc::new(FailingEmbedder), store.clone(), 1000);
    let runner = runner();
    let result = workflow.run(&runner, &IngestRequest::new(path)).await;

    assert!(matches!(result, Err(RagError::EmbeddingProvider(_))));
    assert_eq!(runner.completed_steps(), ["load-and-chunk"]);
    assert_eq!(store.count().await.expect("should count"), 0);
}

#[tokio::test]
async fn rerun_reuses_completed_steps() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let store = create_store(&temp_dir).await;
    let path = write_file(&temp_dir, "a.txt", b"The cat sat.");

    let embedder = Arc::new(FakeEmbedder::default());
    let workflow = workflow(Arc::clone(&embedder) as Arc<dyn Embedder>, store.clone(), 1000);
    let runner = runner();
    let request = IngestRequest::new(path.clone());

    workflow.run(&runner, &request).await.expect("should ingest");
    // The document is gone, but its chunks were checkpointed
    std::fs::remove_file(&path).expect("should remove document");
    let replayed = workflow.run(&runner, &request).await.expect("should replay");

    assert_eq!(replayed.ingested, 1);
    assert_eq!(embedder.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn rate_limit_rejects_repeated_source() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let store = create_store(&temp_dir).await;
    let path = write_file(&temp_dir, "a.txt", b"The cat sat.");

    let workflow = workflow(Arc::new(FakeEmbedder::default()), store.clone(), 1000).with_limits(
        Arc::new(Throttle::new(2, Duration::from_secs(60))),
        Arc::new(RateLimiter::new(1, Duration::from_secs(4 * 60 * 60))),
    );
    let request = IngestRequest::new(path).with_source_id("a.txt");

    workflow.run(&runner(), &request).await.expect("first run allowed");
    let second = workflow.run(&runner(), &request).await;
    assert!(matches!(second, Err(RagError::RateLimited { .. })));
}
