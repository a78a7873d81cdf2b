use mock_locust::MockLocust;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let mock = MockLocust::new();
    let listener = tokio::net::TcpListener::bind("0.0.0.0:8089").await?;
    println!("mock locust listening on {}", listener.local_addr()?);
    axum::serve(listener, mock.router()).await?;
    Ok(())
}
