//! In-process stand-in for the Locust web API.
//!
//! Serves the three control endpoints the dashboard talks to (`/swarm`,
//! `/stop`, `/stats/requests`) with scripted behavior: tests can pin the
//! reported state, inject failures, and inspect how often each endpoint
//! was hit.
use axum::extract::{Form, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use tracing::debug;

#[derive(Debug)]
struct Inner {
    state: String,
    user_count: u32,
    host: Option<String>,
    total_requests: u64,
    num_failures: u64,
    avg_response_time: f64,
    total_rps: f64,
    swarm_calls: u64,
    stop_calls: u64,
    stats_calls: u64,
    fail_swarm: bool,
    fail_stats: bool,
    /// When set, `/stop` is acknowledged but the reported state never
    /// leaves `running` (an engine that refuses to wind down).
    hold_running: bool,
}

impl Default for Inner {
    fn default() -> Self {
        Inner {
            state: "ready".to_string(),
            user_count: 0,
            host: None,
            total_requests: 0,
            num_failures: 0,
            avg_response_time: 0.0,
            total_rps: 0.0,
            swarm_calls: 0,
            stop_calls: 0,
            stats_calls: 0,
            fail_swarm: false,
            fail_stats: false,
            hold_running: false,
        }
    }
}

#[derive(Clone, Default)]
pub struct MockLocust {
    inner: Arc<Mutex<Inner>>,
}

impl MockLocust {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn router(&self) -> Router {
        Router::new()
            .route("/swarm", post(swarm))
            .route("/stop", get(stop))
            .route("/stats/requests", get(stats))
            .with_state(self.inner.clone())
    }

    /// Bind an ephemeral port and serve in the background.
    pub async fn spawn(&self) -> std::io::Result<SocketAddr> {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        let app = self.router();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        Ok(addr)
    }

    pub fn set_state(&self, state: &str) {
        self.lock().state = state.to_string();
    }

    pub fn set_aggregated(
        &self,
        total_requests: u64,
        num_failures: u64,
        avg_response_time: f64,
        total_rps: f64,
    ) {
        let mut inner = self.lock();
        inner.total_requests = total_requests;
        inner.num_failures = num_failures;
        inner.avg_response_time = avg_response_time;
        inner.total_rps = total_rps;
    }

    pub fn fail_swarm(&self, fail: bool) {
        self.lock().fail_swarm = fail;
    }

    pub fn fail_stats(&self, fail: bool) {
        self.lock().fail_stats = fail;
    }

    pub fn hold_running(&self, hold: bool) {
        self.lock().hold_running = hold;
    }

    pub fn swarm_calls(&self) -> u64 {
        self.lock().swarm_calls
    }

    pub fn stop_calls(&self) -> u64 {
        self.lock().stop_calls
    }

    pub fn stats_calls(&self) -> u64 {
        self.lock().stats_calls
    }

    pub fn host(&self) -> Option<String> {
        self.lock().host.clone()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().unwrap()
    }
}

#[derive(Debug, Deserialize)]
struct SwarmRequest {
    user_count: u32,
    spawn_rate: f64,
    host: String,
}

async fn swarm(
    State(state): State<Arc<Mutex<Inner>>>,
    Form(request): Form<SwarmRequest>,
) -> Result<Json<Value>, StatusCode> {
    let mut inner = state.lock().unwrap();
    inner.swarm_calls += 1;
    if inner.fail_swarm {
        return Err(StatusCode::INTERNAL_SERVER_ERROR);
    }
    debug!(
        host = %request.host,
        users = request.user_count,
        spawn_rate = request.spawn_rate,
        "swarm started"
    );
    inner.state = "running".to_string();
    inner.user_count = request.user_count;
    inner.host = Some(request.host);
    Ok(Json(json!({ "success": true, "message": "Swarming started" })))
}

async fn stop(State(state): State<Arc<Mutex<Inner>>>) -> Json<Value> {
    let mut inner = state.lock().unwrap();
    inner.stop_calls += 1;
    if !inner.hold_running {
        inner.state = "stopped".to_string();
    }
    Json(json!({ "success": true, "message": "Test stopped" }))
}

async fn stats(State(state): State<Arc<Mutex<Inner>>>) -> Result<Json<Value>, StatusCode> {
    let mut inner = state.lock().unwrap();
    inner.stats_calls += 1;
    if inner.fail_stats {
        return Err(StatusCode::INTERNAL_SERVER_ERROR);
    }

    Ok(Json(json!({
        "state": inner.state,
        "user_count": inner.user_count,
        "errors": [],
        "stats": [
            {
                "name": "/",
                "method": "GET",
                "avg_response_time": inner.avg_response_time,
                "total_rps": inner.total_rps,
                "total_requests": inner.total_requests,
                "num_failures": inner.num_failures
            },
            {
                "name": "Aggregated",
                "method": null,
                "avg_response_time": inner.avg_response_time,
                "total_rps": inner.total_rps,
                "total_requests": inner.total_requests,
                "num_failures": inner.num_failures
            }
        ]
    })))
}
