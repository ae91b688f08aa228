// HTTP server
// Exposes ingestion, question answering, chat and event-triggered runs


use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Path, State},
    http::{HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::net::TcpListener;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

use crate::config::Config;
use crate::database::VectorStore;
use crate::embeddings::{Embedder, EmbeddingClient};
use crate::llm::ChatClient;
use crate::workflow::{
    ChatRequest, ChatResponse, INGEST_EVENT, IngestRequest, IngestResult, IngestWorkflow,
    LocalRunner, QUERY_EVENT, QueryRequest, QueryResult, QueryWorkflow, RetryPolicy, RunRecord,
    RunRegistry,
};
use crate::{RagError, Result};

/// Services shared by every request
pub struct AppState {
    pub ingest: Arc<IngestWorkflow>,
    pub query: Arc<QueryWorkflow>,
    pub store: VectorStore,
    pub runs: Arc<RunRegistry>,
    pub retry: RetryPolicy,
}

pub type SharedState = Arc<AppState>;

impl AppState {
    /// Construct the provider clients and the vector store described by the
    /// configuration
    #[inline]
    pub async fn from_config(config: &Config) -> Result<Self> {
        let embedder: Arc<dyn Embedder> = Arc::new(EmbeddingClient::new(config)?);
        let model = Arc::new(ChatClient::new(config)?);
        let store = VectorStore::new(config).await?;

        let ingest = IngestWorkflow::from_config(config, Arc::clone(&embedder), store.clone());
        let query = QueryWorkflow::new(embedder, store.clone(), model, config.query.clone());

        Ok(Self {
            ingest: Arc::new(ingest),
            query: Arc::new(query),
            store,
            runs: Arc::new(RunRegistry::from_config(&config.workflow)),
            retry: RetryPolicy::from_config(&config.workflow),
        })
    }

    fn runner(&self) -> LocalRunner {
        LocalRunner::new(self.retry)
    }
}

/// Error body returned by every failing route
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
}

#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn status_for(err: &RagError) -> StatusCode {
        match err {
            RagError::InvalidRequest(_)
            | RagError::UnsupportedFileType { .. }
            | RagError::Document { .. } => StatusCode::BAD_REQUEST,
            RagError::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            RagError::StoreUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            RagError::EmbeddingProvider(_) | RagError::LanguageModel(_) => StatusCode::BAD_GATEWAY,
            RagError::Timeout { .. } => StatusCode::GATEWAY_TIMEOUT,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Hide server-side failure details behind `message`; client errors keep
    /// their own description
    fn generic(err: &RagError, message: &str) -> Self {
        let status = Self::status_for(err);
        error!("{}: {}", message, err);
        let message = if status.is_client_error() {
            err.to_string()
        } else {
            message.to_string()
        };
        Self { status, message }
    }

    fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }
}

impl From<RagError> for ApiError {
    #[inline]
    fn from(err: RagError) -> Self {
        let status = Self::status_for(&err);
        if status.is_server_error() {
            error!("Request failed: {}", err);
        }
        Self {
            status,
            message: err.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    #[inline]
    fn into_response(self) -> Response {
        (
            self.status,
            Json(ErrorBody {
                error: self.message,
            }),
        )
            .into_response()
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct EventRequest {
    pub name: String,
    #[serde(default)]
    pub data: Value,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct EventResponse {
    pub ids: Vec<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RunsResponse {
    pub data: Vec<RunRecord>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CountResponse {
    pub count: u64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ResetResponse {
    pub success: bool,
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let allowed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(e) => {
                warn!("Ignoring invalid CORS origin {}: {}", origin, e);
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(allowed))
        .allow_methods(Any)
        .allow_headers(Any)
}

/// Build the application router
#[inline]
pub fn router(state: SharedState, cors_origins: &[String]) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/ingest", post(ingest))
        .route("/query", post(query))
        .route("/chat", post(chat))
        .route("/events", post(send_event))
        .route("/events/{event_id}/runs", get(event_runs))
        .route("/collection/count", get(collection_count))
        .route("/collection/reset", post(collection_reset))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(cors_layer(cors_origins))
}

/// Serve the API on the configured address until interrupted
#[inline]
pub async fn serve(config: &Config) -> Result<()> {
    let state = Arc::new(AppState::from_config(config).await?);
    let app = router(state, &config.server.cors_origins);

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port)
        .parse()
        .map_err(|e| RagError::Config(format!("Invalid server address: {}", e)))?;
    let listener = TcpListener::bind(addr).await?;
    info!("Listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
}

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
    })
}

async fn ingest(
    State(state): State<SharedState>,
    Json(request): Json<IngestRequest>,
) -> std::result::Result<Json<IngestResult>, ApiError> {
    let result = state.ingest.run(&state.runner(), &request).await?;
    Ok(Json(result))
}

async fn query(
    State(state): State<SharedState>,
    Json(request): Json<QueryRequest>,
) -> std::result::Result<Json<QueryResult>, ApiError> {
    state
        .query
        .run(&state.runner(), &request)
        .await
        .map(Json)
        .map_err(|e| ApiError::generic(&e, "Failed to answer the question"))
}

async fn chat(
    State(state): State<SharedState>,
    Json(request): Json<ChatRequest>,
) -> std::result::Result<Json<ChatResponse>, ApiError> {
    state
        .query
        .chat(&state.runner(), &request)
        .await
        .map(Json)
        .map_err(|e| ApiError::generic(&e, "Failed to answer the message"))
}

fn to_output<T: Serialize>(value: &T) -> Result<Value> {
    serde_json::to_value(value).map_err(|e| RagError::Other(e.into()))
}

async fn send_event(
    State(state): State<SharedState>,
    Json(event): Json<EventRequest>,
) -> std::result::Result<Json<EventResponse>, ApiError> {
    let event_id = match event.name.as_str() {
        INGEST_EVENT => {
            let request: IngestRequest = serde_json::from_value(event.data)
                .map_err(|e| ApiError::bad_request(format!("Invalid ingest event: {}", e)))?;
            let task_state = Arc::clone(&state);
            state.runs.spawn(INGEST_EVENT, async move {
                let result = task_state
                    .ingest
                    .run(&task_state.runner(), &request)
                    .await?;
                to_output(&result)
            })
        }
        QUERY_EVENT => {
            let request: QueryRequest = serde_json::from_value(event.data)
                .map_err(|e| ApiError::bad_request(format!("Invalid query event: {}", e)))?;
            let task_state = Arc::clone(&state);
            state.runs.spawn(QUERY_EVENT, async move {
                let result = task_state.query.run(&task_state.runner(), &request).await?;
                to_output(&result)
            })
        }
        other => {
            return Err(ApiError::bad_request(format!("Unknown event: {}", other)));
        }
    };

    Ok(Json(EventResponse {
        ids: vec![event_id],
    }))
}

async fn event_runs(
    State(state): State<SharedState>,
    Path(event_id): Path<String>,
) -> Json<RunsResponse> {
    Json(RunsResponse {
        data: state.runs.runs_for(&event_id),
    })
}

async fn collection_count(
    State(state): State<SharedState>,
) -> std::result::Result<Json<CountResponse>, ApiError> {
    let count = state.store.count().await?;
    Ok(Json(CountResponse { count }))
}

async fn collection_reset(State(state): State<SharedState>) -> Json<ResetResponse> {
    Json(ResetResponse {
        success: state.store.reset_collection().await,
    })
}
