//! Liveness endpoint for hosts that expect the process to serve HTTP.

use anyhow::{Context, Result};
use axum::{routing::get, Router};
use tokio::net::TcpListener;
use tracing::{error, info};

async fn alive() -> &'static str {
    "Bot is alive!"
}

pub fn router() -> Router {
    Router::new().route("/", get(alive))
}

/// Binds the listener up front so a bad address fails startup, then serves
/// on a background task.
pub async fn spawn(bind: &str) -> Result<()> {
    let listener = TcpListener::bind(bind)
        .await
        .with_context(|| format!("Failed to bind keep-alive server to {bind}"))?;
    let addr = listener.local_addr()?;

    tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, router()).await {
            error!("Keep-alive server error: {}", e);
        }
    });

    info!("Keep-alive server listening on http://{}", addr);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_root_reports_alive() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router()).await.unwrap();
        });

        let response = reqwest::get(format!("http://{addr}/")).await.unwrap();
        assert!(response.status().is_success());
        assert_eq!(response.text().await.unwrap(), "Bot is alive!");
    }

    #[tokio::test]
    async fn test_spawn_rejects_bad_address() {
        assert!(spawn("not-an-address").await.is_err());
    }
}
