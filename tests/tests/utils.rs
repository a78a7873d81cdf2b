use mock_locust::MockLocust;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use swarmdash_core::{Event, RunConfig};
use swarmdash_runtime::server::{router, AppState};
use swarmdash_runtime::{Coordinator, EventBus, LocustClient, MetricsProxy, RunStore};
use tokio::sync::mpsc::UnboundedReceiver;
use url::Url;

/// Tight poll period so lifecycle tests finish in well under a second per
/// tick instead of the production two seconds.
#[allow(unused)]
pub const FAST_POLL: Duration = Duration::from_millis(100);

#[allow(unused)]
pub const EVENT_TIMEOUT: Duration = Duration::from_secs(5);

/// A coordinator wired to a real in-memory store and a mock engine served
/// over HTTP, the way production wires a real Locust.
#[allow(unused)]
pub struct Harness {
    pub coordinator: Coordinator,
    pub store: RunStore,
    pub bus: EventBus,
    pub locust: MockLocust,
}

#[allow(unused)]
pub fn init() {
    use std::sync::OnceLock;
    static ONCE_LOCK: OnceLock<()> = OnceLock::new();

    ONCE_LOCK.get_or_init(|| {
        tracing_subscriber::fmt()
            .with_max_level(tracing::Level::DEBUG)
            .with_test_writer()
            .init();
    });
}

#[allow(unused)]
pub async fn harness() -> Harness {
    init();
    let locust = MockLocust::new();
    let addr = locust.spawn().await.unwrap();
    let store = RunStore::open_in_memory().await.unwrap();
    let bus = EventBus::new();
    let engine = Arc::new(LocustClient::new(base_url(addr)));
    let coordinator =
        Coordinator::new(store.clone(), engine, bus.clone()).poll_interval(FAST_POLL);

    Harness {
        coordinator,
        store,
        bus,
        locust,
    }
}

/// The full dashboard service on an ephemeral port, for driving the HTTP
/// and WebSocket surface end to end.
#[allow(unused)]
pub struct TestApp {
    pub addr: SocketAddr,
    pub locust: MockLocust,
    pub store: RunStore,
}

#[allow(unused)]
pub async fn spawn_app(prometheus: Url) -> TestApp {
    init();
    let locust = MockLocust::new();
    let locust_addr = locust.spawn().await.unwrap();
    let store = RunStore::open_in_memory().await.unwrap();
    let bus = EventBus::new();
    let engine = Arc::new(LocustClient::new(base_url(locust_addr)));
    let coordinator =
        Coordinator::new(store.clone(), engine.clone(), bus.clone()).poll_interval(FAST_POLL);

    let state = Arc::new(AppState {
        coordinator,
        store: store.clone(),
        engine,
        metrics: MetricsProxy::new(prometheus),
        bus,
    });

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router(state)).await.unwrap();
    });

    TestApp {
        addr,
        locust,
        store,
    }
}

/// A metrics backend that answers every query with a success envelope.
#[allow(unused)]
pub async fn spawn_prometheus() -> SocketAddr {
    use axum::extract::Query;
    use axum::routing::get;
    use axum::{Json, Router};
    use std::collections::HashMap;

    let app = Router::new().route(
        "/api/v1/query",
        get(|Query(params): Query<HashMap<String, String>>| async move {
            Json(serde_json::json!({
                "status": "success",
                "data": { "resultType": "vector", "result": [] },
                "query": params.get("query"),
            }))
        }),
    );

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

#[allow(unused)]
pub fn base_url(addr: SocketAddr) -> Url {
    Url::parse(&format!("http://{addr}")).unwrap()
}

#[allow(unused)]
pub fn config(name: &str, duration: u64) -> RunConfig {
    RunConfig {
        name: name.to_string(),
        target_url: "http://system-under-test:8080".to_string(),
        users: 25,
        spawn_rate: 5.0,
        duration,
    }
}

#[allow(unused)]
pub async fn next_event(rx: &mut UnboundedReceiver<String>) -> Event {
    let payload = tokio::time::timeout(EVENT_TIMEOUT, rx.recv())
        .await
        .expect("timed out waiting for an event")
        .expect("event bus closed");
    serde_json::from_str(&payload).unwrap()
}

/// Next event that is not a `stats_update`.
#[allow(unused)]
pub async fn next_lifecycle_event(rx: &mut UnboundedReceiver<String>) -> Event {
    loop {
        match next_event(rx).await {
            Event::StatsUpdate { .. } => continue,
            other => return other,
        }
    }
}

/// Drain events until a terminal one arrives, returning everything seen
/// including the terminal event itself.
#[allow(unused)]
pub async fn events_until_terminal(rx: &mut UnboundedReceiver<String>) -> Vec<Event> {
    let mut events = Vec::new();
    loop {
        let event = next_event(rx).await;
        let terminal = matches!(
            event,
            Event::TestCompleted { .. } | Event::TestStopped { .. }
        );
        events.push(event);
        if terminal {
            return events;
        }
    }
}
