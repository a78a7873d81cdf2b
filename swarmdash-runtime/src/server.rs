//! Dashboard-facing HTTP and WebSocket surface.
use crate::bus::EventBus;
use crate::coordinator::Coordinator;
use crate::error::CoordinatorError;
use crate::store::{RunStore, StoreError};
use crate::upstream::{LoadEngine, MetricsProxy, UpstreamError};
use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Json, Path, Query, State,
    },
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};
use futures_util::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::sync::Arc;
use swarmdash_core::{Run, StatsSnapshot};
use thiserror::Error;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;
use tracing::{debug, instrument};

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("Address Parsing Error")]
    AddrParse(#[from] std::net::AddrParseError),

    #[error("IO Error")]
    Io(#[from] std::io::Error),
}

pub struct AppState {
    pub coordinator: Coordinator,
    pub store: RunStore,
    pub engine: Arc<dyn LoadEngine>,
    pub metrics: MetricsProxy,
    pub bus: EventBus,
}

pub async fn server_task(port: u16, state: Arc<AppState>) -> Result<(), ServerError> {
    let socket_addr: SocketAddr = format!("0.0.0.0:{port}").parse()?;
    let listener = tokio::net::TcpListener::bind(socket_addr).await?;
    debug!("Axum server starting up...");
    axum::serve(listener, router(state)).await?;
    Ok(())
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/api/tests/start", post(start_test))
        .route("/api/tests/stop", post(stop_test))
        .route("/api/tests/current", get(current_test))
        .route("/api/tests/history", get(history))
        .route("/api/tests/:id", get(test_by_id))
        .route("/api/metrics/query", get(metrics_query))
        .route("/ws", get(ws))
        .with_state(state)
        .layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()))
}

#[derive(Debug, Error)]
enum HandlerError {
    #[error(transparent)]
    Coordinator(#[from] CoordinatorError),

    #[error("query parameter is missing")]
    MissingQuery,

    #[error("test not found")]
    TestNotFound,

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Upstream(#[from] UpstreamError),
}

impl IntoResponse for HandlerError {
    fn into_response(self) -> Response {
        let status = match &self {
            HandlerError::Coordinator(CoordinatorError::Validation(_))
            | HandlerError::MissingQuery => StatusCode::BAD_REQUEST,
            HandlerError::Coordinator(CoordinatorError::TestAlreadyRunning) => {
                StatusCode::CONFLICT
            }
            HandlerError::Coordinator(CoordinatorError::NoActiveTest)
            | HandlerError::TestNotFound => StatusCode::NOT_FOUND,
            HandlerError::Coordinator(CoordinatorError::Upstream(_))
            | HandlerError::Upstream(_) => StatusCode::BAD_GATEWAY,
            HandlerError::Coordinator(CoordinatorError::Persistence(_))
            | HandlerError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        let body = Json(json!({ "success": false, "message": self.to_string() }));
        (status, body).into_response()
    }
}

#[derive(Serialize)]
struct StartResponse {
    success: bool,
    #[serde(rename = "testId")]
    test_id: i64,
}

#[instrument(skip(state, config), fields(name = %config.name))]
async fn start_test(
    State(state): State<Arc<AppState>>,
    Json(config): Json<swarmdash_core::RunConfig>,
) -> Result<Json<StartResponse>, HandlerError> {
    let test_id = state.coordinator.start(config).await?;
    Ok(Json(StartResponse {
        success: true,
        test_id,
    }))
}

#[instrument(skip(state))]
async fn stop_test(State(state): State<Arc<AppState>>) -> Result<Json<Value>, HandlerError> {
    state.coordinator.stop().await?;
    Ok(Json(json!({ "success": true })))
}

#[derive(Serialize)]
struct CurrentResponse {
    running: bool,
    #[serde(rename = "testId", skip_serializing_if = "Option::is_none")]
    test_id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    name: Option<String>,
    /// Live snapshot, best effort: null when the engine cannot be reached.
    #[serde(skip_serializing_if = "Option::is_none")]
    stats: Option<Option<StatsSnapshot>>,
}

#[instrument(skip(state))]
async fn current_test(
    State(state): State<Arc<AppState>>,
) -> Result<Json<CurrentResponse>, HandlerError> {
    let Some(test_id) = state.coordinator.active_run_id() else {
        return Ok(Json(CurrentResponse {
            running: false,
            test_id: None,
            name: None,
            stats: None,
        }));
    };

    let name = state
        .store
        .get_by_id(test_id)
        .await?
        .map(|run| run.config.name);
    let stats = state.engine.fetch_stats().await.ok();

    Ok(Json(CurrentResponse {
        running: true,
        test_id: Some(test_id),
        name,
        stats: Some(stats),
    }))
}

#[instrument(skip(state))]
async fn history(State(state): State<Arc<AppState>>) -> Result<Json<Vec<Run>>, HandlerError> {
    Ok(Json(state.store.list_all().await?))
}

#[instrument(skip(state))]
async fn test_by_id(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<Json<Run>, HandlerError> {
    let run = state
        .store
        .get_by_id(id)
        .await?
        .ok_or(HandlerError::TestNotFound)?;
    Ok(Json(run))
}

#[derive(Debug, Deserialize)]
struct MetricsQueryParams {
    query: Option<String>,
}

#[instrument(skip(state))]
async fn metrics_query(
    State(state): State<Arc<AppState>>,
    Query(params): Query<MetricsQueryParams>,
) -> Result<Json<Value>, HandlerError> {
    let expression = params.query.ok_or(HandlerError::MissingQuery)?;
    let payload = state.metrics.query(&expression).await?;
    Ok(Json(payload))
}

async fn ws(State(state): State<Arc<AppState>>, ws: WebSocketUpgrade) -> Response {
    ws.on_upgrade(move |socket| handle_ws(socket, state))
}

/// Bridge one WebSocket connection to a bus subscription. The socket only
/// ever receives; inbound frames are drained so closes are noticed.
async fn handle_ws(socket: WebSocket, state: Arc<AppState>) {
    let (id, mut events) = state.bus.subscribe();
    let (mut sink, mut stream) = socket.split();

    loop {
        tokio::select! {
            event = events.recv() => {
                let Some(payload) = event else { break };
                if sink.send(Message::Text(payload)).await.is_err() {
                    break;
                }
            }
            incoming = stream.next() => {
                match incoming {
                    Some(Ok(_)) => {}
                    Some(Err(_)) | None => break,
                }
            }
        }
    }

    state.bus.unsubscribe(id);
    debug!(subscriber = %id, "websocket closed");
}
