//! Listener: HTTPS via rustls when a certificate is configured, plain HTTP otherwise.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use axum_server::{tls_rustls::RustlsConfig, Handle};
use tracing::{info, warn};

use crate::{webhook_router, WebhookState};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TlsFiles {
    pub cert: PathBuf,
    pub key: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    pub addr: SocketAddr,
    pub tls: Option<TlsFiles>,
    pub shutdown_grace: Duration,
}

/// Serve the webhook until Ctrl-C/SIGTERM, then drain in-flight reviews.
pub async fn serve(config: ServerConfig, state: Arc<WebhookState>) -> Result<()> {
    let app = webhook_router(state);
    let handle = Handle::new();
    tokio::spawn(shutdown_on_signal(handle.clone(), config.shutdown_grace));

    match &config.tls {
        Some(tls) => {
            let tls_config = RustlsConfig::from_pem_file(&tls.cert, &tls.key)
                .await
                .with_context(|| format!("loading TLS cert {} / key {}", tls.cert.display(), tls.key.display()))?;
            info!(addr = %config.addr, "webhook listening (https)");
            axum_server::bind_rustls(config.addr, tls_config)
                .handle(handle)
                .serve(app.into_make_service())
                .await
                .context("webhook server failed")?;
        }
        None => {
            warn!(addr = %config.addr, "no TLS certificate configured; serving plain http");
            axum_server::bind(config.addr)
                .handle(handle)
                .serve(app.into_make_service())
                .await
                .context("webhook server failed")?;
        }
    }
    info!("webhook server stopped");
    Ok(())
}

async fn shutdown_on_signal(handle: Handle, grace: Duration) {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut term) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {}
                    _ = term.recv() => {}
                }
            }
            Err(e) => {
                warn!(error = %e, "cannot install SIGTERM handler; waiting for Ctrl-C only");
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
    info!(grace_secs = grace.as_secs(), "shutdown signal received; draining");
    handle.graceful_shutdown(Some(grace));
}
