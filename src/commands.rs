use anyhow::{Context, Result};
use console::style;
use dialoguer::Confirm;
use indicatif::{ProgressBar, ProgressStyle};
use serde_json::json;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use crate::RagError;
use crate::client::RunClient;
use crate::config::Config;
use crate::database::VectorStore;
use crate::embeddings::{Embedder, EmbeddingClient};
use crate::llm::ChatClient;
use crate::workflow::{
    INGEST_EVENT, IngestRequest, IngestWorkflow, LocalRunner, QUERY_EVENT, QueryRequest,
    QueryResult, QueryWorkflow, RetryPolicy,
};

/// Interval between polls for a run's output
const POLL_INTERVAL: Duration = Duration::from_millis(500);

fn spinner(message: &str) -> ProgressBar {
    let bar = if console::user_attended_stderr() {
        ProgressBar::new_spinner().with_style(
            ProgressStyle::with_template("{spinner} {msg} ({elapsed})")
                .unwrap_or_else(|_| ProgressStyle::default_spinner()),
        )
    } else {
        ProgressBar::hidden()
    };
    bar.set_message(message.to_string());
    bar.enable_steady_tick(Duration::from_millis(100));
    bar
}

fn print_answer(answer: &str, sources: &[String]) {
    println!("{}", answer);
    println!();
    if sources.is_empty() {
        println!("{}", style("No sources").dim());
    } else {
        println!("{}", style("Sources:").bold());
        for source in sources {
            println!("  - {}", source);
        }
    }
}

/// Probe both providers and warn about the ones that are unreachable.
///
/// The server still starts, so a provider that comes up later is picked up
/// by the next request.
async fn check_providers(config: &Config) {
    let embedding = EmbeddingClient::new(config);
    let chat = ChatClient::new(config);

    let checked = tokio::task::spawn_blocking(move || {
        (
            embedding.and_then(|client| client.health_check()),
            chat.and_then(|client| client.health_check()),
        )
    })
    .await;

    match checked {
        Ok((embedding, chat)) => {
            if let Err(e) = embedding {
                warn!("Embedding provider is unhealthy: {}", e);
            }
            if let Err(e) = chat {
                warn!("Language model provider is unhealthy: {}", e);
            }
        }
        Err(e) => warn!("Provider health check did not finish: {}", e),
    }
}

/// Start the HTTP API
#[inline]
pub async fn serve(config: &Config) -> Result<()> {
    check_providers(config).await;
    info!("Starting server on {}", config.server.base_url());
    crate::server::serve(config)
        .await
        .context("Server terminated with an error")
}

/// Ingest a document in-process
#[inline]
pub async fn ingest_document(config: &Config, path: &Path, source_id: Option<String>) -> Result<()> {
    let embedder: Arc<dyn Embedder> =
        Arc::new(EmbeddingClient::new(config).context("Failed to create embedding client")?);
    let store = VectorStore::new(config)
        .await
        .context("Failed to open vector store")?;
    let workflow = IngestWorkflow::from_config(config, embedder, store);

    let mut request = IngestRequest::new(path.display().to_string());
    request.source_id = source_id;

    let bar = spinner(&format!("Ingesting {}", path.display()));
    let runner = LocalRunner::new(RetryPolicy::from_config(&config.workflow));
    let result = workflow.run(&runner, &request).await;
    bar.finish_and_clear();

    let result = result.with_context(|| format!("Failed to ingest {}", path.display()))?;
    println!(
        "{} Ingested {} chunks from {}",
        style("✓").green(),
        result.ingested,
        request.resolved_source_id()
    );
    Ok(())
}

/// Answer a question in-process
#[inline]
pub async fn query_documents(config: &Config, question: &str, top_k: Option<usize>) -> Result<()> {
    let embedder: Arc<dyn Embedder> =
        Arc::new(EmbeddingClient::new(config).context("Failed to create embedding client")?);
    let model = Arc::new(ChatClient::new(config).context("Failed to create chat client")?);
    let store = VectorStore::new(config)
        .await
        .context("Failed to open vector store")?;
    let workflow = QueryWorkflow::new(embedder, store, model, config.query.clone());

    let request = QueryRequest {
        question: question.to_string(),
        top_k,
    };

    let bar = spinner("Thinking");
    let runner = LocalRunner::new(RetryPolicy::from_config(&config.workflow));
    let result = workflow.run(&runner, &request).await;
    bar.finish_and_clear();

    let result = result.context("Failed to answer the question")?;
    print_answer(&result.answer, &result.sources);
    Ok(())
}

/// Ask a running server through the event API and wait for the answer
#[inline]
pub async fn ask(
    server_url: &str,
    question: &str,
    top_k: Option<usize>,
    timeout: Duration,
) -> Result<()> {
    let client = RunClient::new(server_url, Duration::from_secs(30));
    let mut data = json!({ "question": question });
    if let Some(top_k) = top_k {
        data["top_k"] = json!(top_k);
    }

    let event_id = client
        .send_event(QUERY_EVENT, data)
        .await
        .context("Failed to send question")?;

    let bar = spinner("Waiting for answer");
    let output = client
        .wait_for_run_output(&event_id, timeout, POLL_INTERVAL)
        .await;
    bar.finish_and_clear();

    match output {
        Ok(output) => {
            let result: QueryResult =
                serde_json::from_value(output).context("Unexpected run output")?;
            print_answer(&result.answer, &result.sources);
            Ok(())
        }
        Err(RagError::Timeout { waited, .. }) => {
            eprintln!(
                "{} No answer after {}s. The run may still finish; event id: {}",
                style("⚠").yellow(),
                waited.as_secs(),
                event_id
            );
            Err(anyhow::anyhow!("Timed out waiting for an answer"))
        }
        Err(e) => Err(e).context("Question failed"),
    }
}

/// Copy a document into the uploads directory and request its ingestion
#[inline]
pub async fn upload(config: &Config, server_url: &str, path: &Path) -> Result<()> {
    let file_name = path
        .file_name()
        .and_then(|name| name.to_str())
        .with_context(|| format!("Not a file path: {}", path.display()))?
        .to_string();

    let uploads_dir = config.uploads_dir();
    std::fs::create_dir_all(&uploads_dir).with_context(|| {
        format!(
            "Failed to create uploads directory: {}",
            uploads_dir.display()
        )
    })?;

    let destination: PathBuf = uploads_dir.join(&file_name);
    std::fs::copy(path, &destination)
        .with_context(|| format!("Failed to copy {} to uploads", path.display()))?;
    let destination = destination.canonicalize().unwrap_or(destination);

    let client = RunClient::new(server_url, Duration::from_secs(30));
    let event_id = client
        .send_event(
            INGEST_EVENT,
            json!({
                "document_path": destination.display().to_string(),
                "source_id": file_name,
            }),
        )
        .await
        .context("Failed to request ingestion")?;

    println!(
        "{} Uploaded {} (event {})",
        style("✓").green(),
        file_name,
        event_id
    );
    Ok(())
}

/// Print the number of stored points
#[inline]
pub async fn show_count(config: &Config) -> Result<()> {
    let store = VectorStore::new(config)
        .await
        .context("Failed to open vector store")?;
    let count = store.count().await.context("Failed to count points")?;
    println!(
        "Collection {}: {} points",
        style(store.collection()).cyan(),
        count
    );
    Ok(())
}

/// Drop every stored point after confirmation
#[inline]
pub async fn reset_collection(config: &Config, assume_yes: bool) -> Result<()> {
    let store = VectorStore::new(config)
        .await
        .context("Failed to open vector store")?;

    if !assume_yes
        && !Confirm::new()
            .with_prompt(format!(
                "Delete all points in collection {}? This cannot be undone.",
                store.collection()
            ))
            .default(false)
            .interact()?
    {
        println!("Reset cancelled.");
        return Ok(());
    }

    if store.reset_collection().await {
        println!("{} Collection {} reset", style("✓").green(), store.collection());
        Ok(())
    } else {
        warn!("Reset of {} failed", store.collection());
        Err(anyhow::anyhow!(
            "Failed to reset collection {}",
            store.collection()
        ))
    }
}

/// Write the effective configuration to the config file
#[inline]
pub fn write_config(config: &Config) -> Result<()> {
    config.save().context("Failed to save configuration")?;
    eprintln!(
        "{} Configuration saved to: {}",
        style("✓").green(),
        style(config.config_file_path().display()).cyan()
    );
    Ok(())
}
