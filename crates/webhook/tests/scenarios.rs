#![forbid(unsafe_code)]

use std::sync::Arc;
use std::time::Duration;

use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;
use navhook_core::{build_navlink, Action, Decision, Outcome, OwnerIdentity};
use navhook_store::{Fault, MemoryStore, Op};
use navhook_webhook::{classify, MonitoredKind, Reconciler, WebhookConfig};
use serde_json::json;

const SERVICES: [&str; 3] = ["prometheus-operated", "alertmanager-operated", "project-monitoring-grafana"];

fn review(uid: &str, op: &str, ns: Option<&str>) -> Vec<u8> {
    let mut meta = json!({"name": "k8s", "uid": "prom-uid"});
    if let Some(ns) = ns { meta["namespace"] = json!(ns); }
    let obj = json!({"apiVersion": "monitoring.coreos.com/v1", "kind": "Prometheus", "metadata": meta, "spec": {}});
    let mut req = json!({
        "uid": uid,
        "kind": {"group": "monitoring.coreos.com", "version": "v1", "kind": "Prometheus"},
        "resource": {"group": "monitoring.coreos.com", "version": "v1", "resource": "prometheuses"},
        "name": "k8s",
        "operation": op,
        "userInfo": {"username": "admin"},
    });
    if let Some(ns) = ns { req["namespace"] = json!(ns); }
    match op {
        "DELETE" => req["oldObject"] = obj,
        _ => req["object"] = obj,
    }
    serde_json::to_vec(&json!({"apiVersion": "admission.k8s.io/v1", "kind": "AdmissionReview", "request": req})).unwrap()
}

fn reconciler(store: Arc<MemoryStore>) -> Reconciler {
    Reconciler::new(store, WebhookConfig::default())
}

fn companion(ns: &str, svc: &str) -> navhook_core::NavLink {
    build_navlink(ns, svc, IntOrString::Int(80), &OwnerIdentity::new("k8s", "prom-uid"), "").unwrap()
}

#[tokio::test]
async fn create_applies_three_companions() {
    let store = Arc::new(MemoryStore::new());
    let verdict = reconciler(store.clone()).review(&review("abc-123", "CREATE", Some("team-a"))).await;

    assert_eq!(verdict.decision, Decision::Allow);
    assert_eq!(verdict.uid, "abc-123");
    assert!(verdict.message.contains("create"), "message={}", verdict.message);

    let creates: Vec<String> = store.calls_of(Op::Create).into_iter().map(|c| c.name).collect();
    assert_eq!(creates.len(), 3);
    for svc in SERVICES {
        assert!(creates.contains(&format!("monitoring-team-a-{svc}")), "missing create for {svc}");
    }
    assert_eq!(store.calls_of(Op::List).len(), 1);

    let review = verdict.into_review();
    assert!(review.response.allowed);
    assert_eq!(review.response.status.code, 200);

    let stored = store.get("team-a", "monitoring-team-a-prometheus-operated").unwrap();
    let owner = &stored.metadata.owner_references.unwrap()[0];
    assert_eq!(owner.uid, "prom-uid");
    assert_eq!(owner.block_owner_deletion, Some(true));
}

#[tokio::test]
async fn repeated_create_is_already_satisfied() {
    let store = Arc::new(MemoryStore::new());
    let r = reconciler(store.clone());
    let body = review("abc-123", "CREATE", Some("team-a"));
    let event = classify(&body, &MonitoredKind::default()).unwrap();
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);

    let first = r.reconcile(Action::Create, &event, deadline).await;
    let second = r.reconcile(Action::Create, &event, deadline).await;
    assert!(first.outcomes.iter().all(|o| o.outcome == Outcome::Applied));
    assert!(second.outcomes.iter().all(|o| o.outcome == Outcome::AlreadySatisfied));
    assert_eq!(store.names("team-a").len(), 3);
}

#[tokio::test]
async fn one_failure_does_not_stop_the_others() {
    let store = Arc::new(MemoryStore::new());
    store.inject("monitoring-team-a-alertmanager-operated", Fault::Api(500));
    let verdict = reconciler(store.clone()).review(&review("abc-123", "CREATE", Some("team-a"))).await;

    assert_eq!(verdict.decision, Decision::Allow);
    assert_eq!(store.calls_of(Op::Create).len(), 3);
    assert!(store.contains("team-a", "monitoring-team-a-prometheus-operated"));
    assert!(store.contains("team-a", "monitoring-team-a-project-monitoring-grafana"));
    assert!(!store.contains("team-a", "monitoring-team-a-alertmanager-operated"));
    assert!(verdict.message.contains("failed [alertmanager-operated"), "message={}", verdict.message);
}

#[tokio::test]
async fn transport_failure_is_reported_not_denied() {
    let store = Arc::new(MemoryStore::new());
    store.inject("monitoring-team-a-prometheus-operated", Fault::Transport);
    let verdict = reconciler(store.clone()).review(&review("abc-123", "CREATE", Some("team-a"))).await;
    assert_eq!(verdict.decision, Decision::Allow);
    assert!(verdict.message.contains("applied [alertmanager-operated, project-monitoring-grafana]"), "message={}", verdict.message);
}

#[tokio::test]
async fn missing_namespace_skips_without_store_calls() {
    let store = Arc::new(MemoryStore::new());
    let verdict = reconciler(store.clone()).review(&review("abc-123", "CREATE", None)).await;
    assert_eq!(verdict.decision, Decision::Allow);
    assert!(verdict.message.contains("skipped"), "message={}", verdict.message);
    assert!(store.calls().is_empty());
}

#[tokio::test]
async fn correlation_uid_is_echoed() {
    for uid in ["", "abc-123", "705ab4f5-6393-11e8-b7cc-42010a800002"] {
        let store = Arc::new(MemoryStore::new());
        let verdict = reconciler(store).review(&review(uid, "CREATE", Some("team-a"))).await;
        assert_eq!(verdict.into_review().response.uid, uid);
    }
}

#[tokio::test]
async fn malformed_payload_is_denied_without_store_calls() {
    let store = Arc::new(MemoryStore::new());
    let r = reconciler(store.clone());

    let verdict = r.review(br#"{"apiVersion": "admission.k8s.io/v1", "kind": "AdmissionReview", "request": {"uid": "bad-1"}}"#).await;
    assert_eq!(verdict.decision, Decision::Deny);
    assert_eq!(verdict.uid, "bad-1");

    let verdict = r.review(b"{{{").await;
    assert_eq!(verdict.decision, Decision::Deny);
    assert!(!verdict.into_review().response.allowed);
    assert!(store.calls().is_empty());
}

#[tokio::test]
async fn delete_with_partial_prior_state() {
    let store = Arc::new(MemoryStore::new());
    store.seed(companion("team-a", "project-monitoring-grafana"));
    let r = reconciler(store.clone());
    let body = review("del-1", "DELETE", Some("team-a"));
    let event = classify(&body, &MonitoredKind::default()).unwrap();

    let rec = r.reconcile(Action::Delete, &event, tokio::time::Instant::now() + Duration::from_secs(5)).await;
    let outcomes: Vec<_> = rec.outcomes.iter().map(|o| o.outcome.clone()).collect();
    assert_eq!(outcomes, vec![Outcome::AlreadySatisfied, Outcome::AlreadySatisfied, Outcome::Applied]);
    assert!(store.names("team-a").is_empty());

    let verdict = r.review(&body).await;
    assert_eq!(verdict.decision, Decision::Allow);
    assert!(verdict.message.contains("delete"));
}

#[tokio::test]
async fn store_not_installed_skips_everything() {
    for op in ["CREATE", "DELETE"] {
        let store = Arc::new(MemoryStore::not_installed());
        let verdict = reconciler(store.clone()).review(&review("abc-123", op, Some("team-a"))).await;
        assert_eq!(verdict.decision, Decision::Allow, "op={op}");
        assert!(verdict.message.contains("skipped"), "message={}", verdict.message);
        let calls = store.calls();
        assert_eq!(calls.len(), 1, "op={op}");
        assert_eq!(calls[0].op, Op::List);
    }
}

#[tokio::test]
async fn update_is_allowed_without_side_effects() {
    let store = Arc::new(MemoryStore::new());
    let verdict = reconciler(store.clone()).review(&review("upd-1", "UPDATE", Some("team-a"))).await;
    assert_eq!(verdict.decision, Decision::Allow);
    assert_eq!(verdict.uid, "upd-1");
    assert!(store.calls().is_empty());
}

#[tokio::test]
async fn hung_call_times_out_and_others_still_apply() {
    let store = Arc::new(MemoryStore::new());
    store.inject("monitoring-team-a-prometheus-operated", Fault::Hang);
    let config = WebhookConfig { store_timeout: Duration::from_millis(50), ..WebhookConfig::default() };
    let r = Reconciler::new(store.clone(), config);

    let started = std::time::Instant::now();
    let verdict = r.review(&review("abc-123", "CREATE", Some("team-a"))).await;
    assert!(started.elapsed() < Duration::from_secs(2));
    assert_eq!(verdict.decision, Decision::Allow);
    assert!(verdict.message.contains("failed [prometheus-operated: deadline exceeded"), "message={}", verdict.message);
    assert!(store.contains("team-a", "monitoring-team-a-alertmanager-operated"));
    assert!(store.contains("team-a", "monitoring-team-a-project-monitoring-grafana"));
}

#[tokio::test]
async fn spent_budget_makes_no_calls() {
    let store = Arc::new(MemoryStore::new());
    let config = WebhookConfig { request_budget: Duration::ZERO, ..WebhookConfig::default() };
    let verdict = Reconciler::new(store.clone(), config).review(&review("abc-123", "CREATE", Some("team-a"))).await;
    assert_eq!(verdict.decision, Decision::Allow);
    assert!(verdict.message.contains("skipped"));
    assert!(store.calls().is_empty());
}

#[tokio::test]
async fn one_delete_failure_does_not_stop_the_others() {
    let store = Arc::new(MemoryStore::new());
    for svc in SERVICES { store.seed(companion("team-a", svc)); }
    store.inject("monitoring-team-a-alertmanager-operated", Fault::Api(500));
    let verdict = reconciler(store.clone()).review(&review("del-2", "DELETE", Some("team-a"))).await;

    assert_eq!(verdict.decision, Decision::Allow);
    assert_eq!(verdict.uid, "del-2");
    assert_eq!(store.calls_of(Op::Delete).len(), 3);
    assert_eq!(store.names("team-a"), vec!["monitoring-team-a-alertmanager-operated"]);
    assert!(verdict.message.contains("failed [alertmanager-operated"), "message={}", verdict.message);
}
