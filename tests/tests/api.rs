//! End-to-end coverage of the HTTP and WebSocket surface.
mod utils;
#[allow(unused)]
use utils::*;

use futures_util::StreamExt;
use serde_json::{json, Value};
use std::time::Duration;
use swarmdash_core::Event;
use tokio_tungstenite::tungstenite::Message;
use url::Url;

async fn ws_client(
    addr: std::net::SocketAddr,
) -> tokio_tungstenite::WebSocketStream<
    tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
> {
    let url = Url::parse(&format!("ws://{addr}/ws")).unwrap();
    let (stream, _) = tokio_tungstenite::connect_async(url).await.unwrap();
    stream
}

async fn next_ws_event(
    stream: &mut (impl StreamExt<Item = Result<Message, tokio_tungstenite::tungstenite::Error>>
              + Unpin),
) -> Event {
    loop {
        let message = tokio::time::timeout(EVENT_TIMEOUT, stream.next())
            .await
            .expect("timed out waiting for a websocket frame")
            .expect("websocket closed")
            .unwrap();
        if let Message::Text(payload) = message {
            return serde_json::from_str(&payload).unwrap();
        }
    }
}

#[tokio::test]
async fn full_cycle_over_http_and_websocket() {
    let prometheus = spawn_prometheus().await;
    let app = spawn_app(base_url(prometheus)).await;
    app.locust.set_aggregated(200, 7, 12.5, 90.0);

    let client = reqwest::Client::new();
    let base = format!("http://{}", app.addr);
    let mut ws = ws_client(app.addr).await;

    let response = client
        .post(format!("{base}/api/tests/start"))
        .json(&json!({
            "name": "checkout-soak",
            "targetUrl": "http://system-under-test:8080",
            "users": 25,
            "spawnRate": 5.0,
            "duration": 0
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["success"], true);
    let test_id = body["testId"].as_i64().unwrap();

    assert_eq!(
        next_ws_event(&mut ws).await,
        Event::TestStarted {
            test_id,
            name: "checkout-soak".to_string()
        }
    );

    let current: Value = client
        .get(format!("{base}/api/tests/current"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(current["running"], true);
    assert_eq!(current["testId"].as_i64(), Some(test_id));
    assert_eq!(current["name"], "checkout-soak");
    assert!(current["stats"].is_object());

    let response = client
        .post(format!("{base}/api/tests/stop"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);

    loop {
        match next_ws_event(&mut ws).await {
            Event::StatsUpdate { .. } => continue,
            event => {
                assert_eq!(event, Event::TestStopped { test_id });
                break;
            }
        }
    }

    let run: Value = client
        .get(format!("{base}/api/tests/{test_id}"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(run["status"], "stopped");
    assert_eq!(run["error_rate"].as_f64(), Some(3.5));

    let history: Value = client
        .get(format!("{base}/api/tests/history"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(history.as_array().unwrap().len(), 1);

    let current: Value = client
        .get(format!("{base}/api/tests/current"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(current, json!({ "running": false }));
}

#[tokio::test]
async fn command_failures_map_to_status_codes() {
    let prometheus = spawn_prometheus().await;
    let app = spawn_app(base_url(prometheus)).await;
    let client = reqwest::Client::new();
    let base = format!("http://{}", app.addr);

    // Validation failure: empty name.
    let response = client
        .post(format!("{base}/api/tests/start"))
        .json(&json!({
            "name": "",
            "targetUrl": "http://system-under-test:8080",
            "users": 25,
            "spawnRate": 5.0
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 400);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["success"], false);

    // No active run to stop.
    let response = client
        .post(format!("{base}/api/tests/stop"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 404);

    // Unknown run id.
    let response = client
        .get(format!("{base}/api/tests/999"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 404);

    // Conflicting second start.
    let start = |name: &str| {
        client
            .post(format!("{base}/api/tests/start"))
            .json(&json!({
                "name": name,
                "targetUrl": "http://system-under-test:8080",
                "users": 25,
                "spawnRate": 5.0
            }))
            .send()
    };
    assert_eq!(start("one").await.unwrap().status(), 200);
    assert_eq!(start("two").await.unwrap().status(), 409);

    // Engine down: stop the run first, then point a failing engine at it.
    client
        .post(format!("{base}/api/tests/stop"))
        .send()
        .await
        .unwrap();
    app.locust.fail_swarm(true);
    assert_eq!(start("refused").await.unwrap().status(), 502);
}

#[tokio::test]
async fn metrics_query_proxies_verbatim() {
    let prometheus = spawn_prometheus().await;
    let app = spawn_app(base_url(prometheus)).await;
    let client = reqwest::Client::new();
    let base = format!("http://{}", app.addr);

    let response = client
        .get(format!("{base}/api/metrics/query"))
        .query(&[("query", "up")])
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["status"], "success");
    assert_eq!(body["query"], "up");
}

#[tokio::test]
async fn metrics_query_requires_a_query() {
    let prometheus = spawn_prometheus().await;
    let app = spawn_app(base_url(prometheus)).await;

    let response = reqwest::get(format!("http://{}/api/metrics/query", app.addr))
        .await
        .unwrap();
    assert_eq!(response.status(), 400);
}

#[tokio::test]
async fn unreachable_metrics_backend_is_a_bad_gateway() {
    // Point the proxy at a port nothing listens on.
    let dead = Url::parse("http://127.0.0.1:9").unwrap();
    let app = spawn_app(dead).await;

    let response = reqwest::get(format!(
        "http://{}/api/metrics/query?query=up",
        app.addr
    ))
    .await
    .unwrap();
    assert_eq!(response.status(), 502);
}

#[tokio::test]
async fn vanished_subscribers_do_not_break_delivery() {
    let prometheus = spawn_prometheus().await;
    let app = spawn_app(base_url(prometheus)).await;
    let client = reqwest::Client::new();
    let base = format!("http://{}", app.addr);

    // One subscriber drops abruptly, one stays.
    let short_lived = ws_client(app.addr).await;
    let mut survivor = ws_client(app.addr).await;
    drop(short_lived);
    tokio::time::sleep(Duration::from_millis(100)).await;

    client
        .post(format!("{base}/api/tests/start"))
        .json(&json!({
            "name": "fanout",
            "targetUrl": "http://system-under-test:8080",
            "users": 5,
            "spawnRate": 1.0
        }))
        .send()
        .await
        .unwrap();

    assert!(matches!(
        next_ws_event(&mut survivor).await,
        Event::TestStarted { .. }
    ));

    client
        .post(format!("{base}/api/tests/stop"))
        .send()
        .await
        .unwrap();
}
