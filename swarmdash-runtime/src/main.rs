use swarmdash_runtime::DashboardRuntime;
use tracing::error;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    if let Err(err) = DashboardRuntime::new().with_args().run().await {
        error!("Failure in critical service. Shutting down: {err}");
        std::process::exit(1);
    }
}
