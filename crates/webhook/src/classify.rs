//! Event classification: raw AdmissionReview bytes to a typed companion event.

use kube::core::{
    admission::{AdmissionRequest, AdmissionReview, Operation},
    DynamicObject,
};
use navhook_core::{Action, OwnerIdentity};
use tracing::warn;

/// Group/kind of the monitored resource this webhook manages companions for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MonitoredKind {
    pub group: String,
    pub kind: String,
}

impl Default for MonitoredKind {
    fn default() -> Self {
        Self { group: "monitoring.coreos.com".to_string(), kind: "Prometheus".to_string() }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    Create,
    Delete,
    Unsupported,
}

impl EventKind {
    pub fn action(&self) -> Option<Action> {
        match self {
            EventKind::Create => Some(Action::Create),
            EventKind::Delete => Some(Action::Delete),
            EventKind::Unsupported => None,
        }
    }
}

/// A classified admission event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Event {
    /// Correlation UID of the review, echoed back unchanged.
    pub uid: String,
    pub kind: EventKind,
    /// Raw operation name, kept for logs.
    pub operation: String,
    pub namespace: String,
    pub owner: OwnerIdentity,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ClassifyError {
    #[error("malformed admission review: {reason}")]
    MalformedPayload { uid: String, reason: String },
    /// Recoverable: the reconciler skips and allows.
    #[error("{operation} of {name} carries no namespace")]
    MissingNamespace { uid: String, name: String, operation: String },
}

impl ClassifyError {
    pub fn uid(&self) -> &str {
        match self {
            ClassifyError::MalformedPayload { uid, .. } | ClassifyError::MissingNamespace { uid, .. } => uid,
        }
    }
}

/// Classify one review envelope.
pub fn classify(body: &[u8], monitored: &MonitoredKind) -> Result<Event, ClassifyError> {
    let review: AdmissionReview<DynamicObject> = serde_json::from_slice(body).map_err(|e| malformed(body, e.to_string()))?;
    let converted: Result<AdmissionRequest<DynamicObject>, _> = review.try_into();
    let req = converted.map_err(|e| malformed(body, e.to_string()))?;
    let operation = operation_name(&req.operation).to_string();

    let kind = match req.operation {
        Operation::Create => EventKind::Create,
        Operation::Delete => EventKind::Delete,
        _ => EventKind::Unsupported,
    };
    let managed = req.kind.group == monitored.group && req.kind.kind == monitored.kind;
    if kind == EventKind::Unsupported || !managed {
        return Ok(Event {
            uid: req.uid.clone(),
            kind: EventKind::Unsupported,
            operation,
            namespace: req.namespace.clone().unwrap_or_default(),
            owner: OwnerIdentity::new(req.name.clone(), req.uid.clone()),
        });
    }

    // Create carries the new object; Delete only the old one (if any).
    let trigger = match kind {
        EventKind::Create => match req.object.as_ref() {
            Some(obj) => Some(obj),
            None => {
                return Err(ClassifyError::MalformedPayload {
                    uid: req.uid.clone(),
                    reason: "create request carries no object".to_string(),
                })
            }
        },
        _ => req.old_object.as_ref(),
    };

    let namespace = trigger
        .and_then(|o| o.metadata.namespace.clone())
        .filter(|ns| !ns.is_empty())
        .or_else(|| req.namespace.clone())
        .unwrap_or_default();
    let name = trigger.and_then(|o| o.metadata.name.clone()).filter(|n| !n.is_empty()).unwrap_or_else(|| req.name.clone());
    if namespace.is_empty() {
        return Err(ClassifyError::MissingNamespace { uid: req.uid.clone(), name, operation });
    }
    let owner_uid = match trigger.and_then(|o| o.metadata.uid.clone()).filter(|u| !u.is_empty()) {
        Some(uid) => uid,
        None => {
            warn!(uid = %req.uid, name = %name, ns = %namespace, "object carries no metadata.uid; owner reference uses the review uid");
            req.uid.clone()
        }
    };

    Ok(Event { uid: req.uid.clone(), kind, operation, namespace, owner: OwnerIdentity::new(name, owner_uid) })
}

fn operation_name(op: &Operation) -> &'static str {
    match op {
        Operation::Create => "CREATE",
        Operation::Update => "UPDATE",
        Operation::Delete => "DELETE",
        Operation::Connect => "CONNECT",
    }
}

/// Best-effort recovery of `request.uid` so even a rejected review echoes it.
fn malformed(body: &[u8], reason: String) -> ClassifyError {
    let uid = serde_json::from_slice::<serde_json::Value>(body)
        .ok()
        .and_then(|v| v.pointer("/request/uid").and_then(|u| u.as_str()).map(str::to_string))
        .unwrap_or_default();
    ClassifyError::MalformedPayload { uid, reason }
}
