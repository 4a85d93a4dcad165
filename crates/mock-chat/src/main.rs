//! Development server for the mock SerenAI chat backend.
//!
//! | Variable         | Default | Description      |
//! |------------------|---------|------------------|
//! | `MOCK_CHAT_PORT` | `8000`  | HTTP listen port |

use anyhow::Context;
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let port: u16 = std::env::var("MOCK_CHAT_PORT")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(8000);

    let addr = format!("0.0.0.0:{port}");
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;

    info!(address = %addr, "mock chat backend listening");
    axum::serve(listener, mock_chat::router())
        .await
        .context("server error")
}
