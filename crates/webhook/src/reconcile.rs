//! Reconciler: drive one classified event through the companion catalog.
//!
//! The three companion NavLinks are applied concurrently and joined before
//! aggregation. A failure on one never stops the others, and every store call
//! is bounded by the remaining request budget. Outcomes only ever change the
//! response message: classified events are always allowed.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use metrics::{counter, histogram};
use navhook_core::{catalog, Action, CatalogEntry, CompanionOutcome, Outcome, Reconciliation};
use navhook_kubehub::{ListFilter, NavLinkStore, StoreError};
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::classify::{classify, ClassifyError, Event};
use crate::respond::Verdict;
use crate::WebhookConfig;

#[derive(Debug, thiserror::Error)]
pub enum CallError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("deadline exceeded after {0:?}")]
    Deadline(Duration),
}

pub struct Reconciler {
    store: Arc<dyn NavLinkStore>,
    config: WebhookConfig,
}

impl Reconciler {
    pub fn new(store: Arc<dyn NavLinkStore>, config: WebhookConfig) -> Self { Self { store, config } }

    pub fn config(&self) -> &WebhookConfig { &self.config }

    /// Classify, reconcile and decide for one raw review body.
    pub async fn review(&self, body: &[u8]) -> Verdict {
        let started = Instant::now();
        let deadline = started + self.config.request_budget;
        let verdict = self.review_until(body, deadline).await;
        histogram!("navhook_reconcile_latency_ms").record(started.elapsed().as_secs_f64() * 1000.0);
        counter!("navhook_admission_decisions_total", "decision" => verdict.decision.as_str()).increment(1);
        verdict
    }

    async fn review_until(&self, body: &[u8], deadline: Instant) -> Verdict {
        let event = match classify(body, &self.config.monitored) {
            Ok(ev) => ev,
            Err(e @ ClassifyError::MalformedPayload { .. }) => {
                warn!(uid = %e.uid(), error = %e, "rejecting undecodable admission review");
                counter!("navhook_admission_requests_total", "operation" => "malformed").increment(1);
                return Verdict::deny(e.uid(), format!("Deserializing failed: {e}"));
            }
            Err(e @ ClassifyError::MissingNamespace { .. }) => {
                info!(uid = %e.uid(), error = %e, "no namespace; skipping navlinks");
                counter!("navhook_admission_requests_total", "operation" => "missing_namespace").increment(1);
                return Verdict::allow(e.uid(), format!("Navlinks skipped: {e}"));
            }
        };
        counter!("navhook_admission_requests_total", "operation" => event.operation.clone()).increment(1);

        let action = match event.kind.action() {
            Some(a) => a,
            None => {
                debug!(uid = %event.uid, operation = %event.operation, "operation not handled; allowing");
                return Verdict::allow(event.uid, format!("Operation {} not handled, skipped", event.operation));
            }
        };

        // NavLink kind must be served before anything is attempted, for create and delete alike.
        if let Err(e) = self.bounded(deadline, self.store.list(&event.namespace, &ListFilter::probe())).await {
            error!(uid = %event.uid, ns = %event.namespace, error = %e, "navlink resource not available; skipping all");
            counter!("navhook_store_unavailable_total").increment(1);
            return Verdict::allow(event.uid, format!("Navlinks {action} skipped: navlink resource not available ({e})"));
        }

        let rec = self.reconcile(action, &event, deadline).await;
        if rec.failed() > 0 {
            warn!(uid = %event.uid, ns = %event.namespace, failed = rec.failed(), "navlinks partially reconciled");
        } else {
            info!(uid = %event.uid, ns = %event.namespace, action = %action, "navlinks reconciled");
        }
        Verdict { uid: event.uid, decision: rec.decision(), message: rec.summary() }
    }

    /// Apply `action` to every catalog entry for the event's namespace.
    pub async fn reconcile(&self, action: Action, event: &Event, deadline: Instant) -> Reconciliation {
        let outcomes = join_all(catalog().iter().map(|entry| self.apply_one(action, event, entry, deadline))).await;
        let mut rec = Reconciliation::new(action);
        for o in outcomes { rec.push(o); }
        rec
    }

    async fn apply_one(&self, action: Action, event: &Event, entry: &CatalogEntry, deadline: Instant) -> CompanionOutcome {
        let ns = event.namespace.as_str();
        let navlink = match entry.build(ns, &event.owner) {
            Ok(nl) => nl,
            Err(e) => {
                return CompanionOutcome {
                    service: entry.service.to_string(),
                    name: navhook_core::navlink_name(ns, entry.service),
                    outcome: Outcome::Failed(e.to_string()),
                }
            }
        };
        let name = navlink.metadata.name.clone().unwrap_or_default();
        let res = match action {
            Action::Create => self.bounded(deadline, self.store.create(ns, &navlink)).await,
            Action::Delete => self.bounded(deadline, self.store.delete(ns, &name)).await,
        };
        let outcome = match res {
            Ok(()) => {
                info!(uid = %event.uid, navlink = %name, action = %action, "navlink applied");
                Outcome::Applied
            }
            Err(CallError::Store(e)) if action == Action::Create && e.is_already_exists() => {
                debug!(uid = %event.uid, navlink = %name, "navlink already exists");
                Outcome::AlreadySatisfied
            }
            Err(CallError::Store(e)) if action == Action::Delete && e.is_not_found() => {
                debug!(uid = %event.uid, navlink = %name, "navlink already gone");
                Outcome::AlreadySatisfied
            }
            Err(e) => {
                warn!(uid = %event.uid, navlink = %name, action = %action, error = %e, "navlink apply failed");
                Outcome::Failed(e.to_string())
            }
        };
        counter!("navhook_navlink_outcomes_total", "action" => action.as_str(), "outcome" => outcome.label()).increment(1);
        CompanionOutcome { service: entry.service.to_string(), name, outcome }
    }

    /// Run a store call within `min(store_timeout, time left until deadline)`.
    /// Once the budget is spent the call is not started at all.
    async fn bounded<T, F>(&self, deadline: Instant, call: F) -> Result<T, CallError>
    where
        F: Future<Output = Result<T, StoreError>>,
    {
        let remaining = deadline.saturating_duration_since(Instant::now());
        let limit = remaining.min(self.config.store_timeout);
        if limit.is_zero() {
            return Err(CallError::Deadline(Duration::ZERO));
        }
        match tokio::time::timeout(limit, call).await {
            Ok(res) => res.map_err(CallError::from),
            Err(_) => Err(CallError::Deadline(limit)),
        }
    }
}
