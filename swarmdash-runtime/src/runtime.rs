//! Default swarmdash runtime.
//!
//! Wires the run store, event bus, upstream clients, and lifecycle
//! coordinator together and serves the dashboard API.
use crate::bus::EventBus;
use crate::coordinator::Coordinator;
use crate::error::RuntimeError;
use crate::server::{server_task, AppState};
use crate::store::RunStore;
use crate::upstream::{LocustClient, MetricsProxy};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use url::Url;

const DEFAULT_PORT: u16 = 3001;
const DEFAULT_LOCUST_URL: &str = "http://localhost:8089";
const DEFAULT_PROMETHEUS_URL: &str = "http://localhost:9090";
const DEFAULT_DB_FILE: &str = "loadtest_history.db";

#[derive(Parser, Debug)]
#[command(version)]
struct DashboardCli {
    #[arg(short, long, default_value_t = DEFAULT_PORT)]
    port: u16,

    /// Base URL of the load engine's web API.
    #[arg(long, default_value = DEFAULT_LOCUST_URL)]
    locust_url: Url,

    /// Base URL of the metrics backend.
    #[arg(long, default_value = DEFAULT_PROMETHEUS_URL)]
    prometheus_url: Url,

    /// SQLite file holding the run history.
    #[arg(long, default_value = DEFAULT_DB_FILE)]
    db: PathBuf,
}

/// Builder for the dashboard service.
///
/// # Example
///
/// ```ignore
/// use swarmdash_runtime::DashboardRuntime;
///
/// #[tokio::main]
/// async fn main() {
///     DashboardRuntime::new()
///         .with_args()
///         .run()
///         .await
///         .unwrap();
/// }
/// ```
pub struct DashboardRuntime {
    port: u16,
    locust_url: Url,
    prometheus_url: Url,
    db: PathBuf,
    poll_interval: Option<Duration>,
}

impl Default for DashboardRuntime {
    fn default() -> Self {
        Self::new()
    }
}

impl DashboardRuntime {
    pub fn new() -> Self {
        // The defaults are compile-time constants and always parse.
        DashboardRuntime {
            port: DEFAULT_PORT,
            locust_url: DEFAULT_LOCUST_URL.parse().unwrap(),
            prometheus_url: DEFAULT_PROMETHEUS_URL.parse().unwrap(),
            db: PathBuf::from(DEFAULT_DB_FILE),
            poll_interval: None,
        }
    }

    /// Use the default CLI arguments for swarmdash.
    ///
    /// `-p`, `--port` for the API/WebSocket port (default `3001`)
    ///
    /// `--locust-url`, `--prometheus-url`, `--db` for the collaborators.
    pub fn with_args(mut self) -> Self {
        let args = DashboardCli::parse();
        self.port = args.port;
        self.locust_url = args.locust_url;
        self.prometheus_url = args.prometheus_url;
        self.db = args.db;
        self
    }

    pub fn port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn locust_url(mut self, url: Url) -> Self {
        self.locust_url = url;
        self
    }

    pub fn prometheus_url(mut self, url: Url) -> Self {
        self.prometheus_url = url;
        self
    }

    pub fn db(mut self, path: PathBuf) -> Self {
        self.db = path;
        self
    }

    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = Some(interval);
        self
    }

    pub async fn run(self) -> Result<(), RuntimeError> {
        let store = RunStore::open(&self.db).await?;
        let bus = EventBus::new();
        let engine = Arc::new(LocustClient::new(self.locust_url));
        let metrics = MetricsProxy::new(self.prometheus_url);

        let mut coordinator = Coordinator::new(store.clone(), engine.clone(), bus.clone());
        if let Some(interval) = self.poll_interval {
            coordinator = coordinator.poll_interval(interval);
        }

        let state = Arc::new(AppState {
            coordinator,
            store,
            engine,
            metrics,
            bus,
        });

        info!(port = self.port, "swarmdash starting");
        server_task(self.port, state).await?;
        Ok(())
    }
}
