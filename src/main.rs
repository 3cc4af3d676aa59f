use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Init logging
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("info"))
        .unwrap();
    fmt().with_env_filter(filter).init();

    // Startup banner at info level so something always prints at default verbosity
    let rust_log = std::env::var("RUST_LOG").unwrap_or_else(|_| "<unset>".to_string());
    let port = std::env::var("FERRY_PORT").unwrap_or_else(|_| "5001".to_string());
    let storage = std::env::var("FERRY_STORAGE").unwrap_or_else(|_| "local".to_string());
    let bucket = std::env::var("FERRY_BUCKET").unwrap_or_else(|_| "<unset>".to_string());
    info!(
        target: "ferry",
        "ferry starting: RUST_LOG='{}', port={}, storage={}, bucket='{}'",
        rust_log, port, storage, bucket
    );

    ferry::server::run().await
}
