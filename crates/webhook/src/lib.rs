//! navhook admission webhook.
//!
//! Reacts to Prometheus create/delete admission reviews by creating or
//! removing the companion NavLinks that expose Prometheus, Alertmanager and
//! Grafana in the management UI. The webhook fails open: only an
//! undecodable review is denied.
//!
//! Routes:
//! - POST /validate - admission reviews
//! - GET /metrics - Prometheus exposition
//! - GET /healthz - liveness

#![forbid(unsafe_code)]

pub mod classify;
pub mod reconcile;
pub mod respond;
pub mod server;

use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::Bytes,
    extract::{DefaultBodyLimit, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use metrics_exporter_prometheus::PrometheusHandle;
use navhook_kubehub::NavLinkStore;
use tracing::warn;

pub use classify::{classify, ClassifyError, Event, EventKind, MonitoredKind};
pub use reconcile::{CallError, Reconciler};
pub use respond::{compose, ReviewResponse, Verdict};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WebhookConfig {
    /// Total time a review may take; admission callers time out at 10s by default.
    pub request_budget: Duration,
    /// Upper bound for any single store call.
    pub store_timeout: Duration,
    pub monitored: MonitoredKind,
}

impl Default for WebhookConfig {
    fn default() -> Self {
        Self {
            request_budget: Duration::from_millis(8000),
            store_timeout: Duration::from_millis(2000),
            monitored: MonitoredKind::default(),
        }
    }
}

/// Shared state for webhook handlers
pub struct WebhookState {
    pub reconciler: Reconciler,
    pub metrics: Option<PrometheusHandle>,
}

impl WebhookState {
    pub fn new(store: Arc<dyn NavLinkStore>, config: WebhookConfig, metrics: Option<PrometheusHandle>) -> Self {
        Self { reconciler: Reconciler::new(store, config), metrics }
    }
}

/// Largest review accepted on `/validate`. The API server caps each object at
/// 3 MiB and an UPDATE carries two of them plus the envelope.
pub const MAX_REVIEW_BYTES: usize = 8 * 1024 * 1024;

pub fn webhook_router(state: Arc<WebhookState>) -> Router {
    Router::new()
        .route("/validate", post(validate_handler).layer(DefaultBodyLimit::max(MAX_REVIEW_BYTES)))
        .route("/metrics", get(metrics_handler))
        .route("/healthz", get(|| async { "ok" }))
        .with_state(state)
}

async fn validate_handler(State(state): State<Arc<WebhookState>>, body: Bytes) -> Response {
    if body.is_empty() {
        warn!("empty admission body");
        return (StatusCode::BAD_REQUEST, "empty body").into_response();
    }
    let verdict = state.reconciler.review(&body).await;
    Json(verdict.into_review()).into_response()
}

async fn metrics_handler(State(state): State<Arc<WebhookState>>) -> String {
    state.metrics.as_ref().map(|h| h.render()).unwrap_or_default()
}
