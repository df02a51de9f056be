//! Response composition: one well-formed AdmissionReview response per request.

use navhook_core::Decision;
use serde::{Deserialize, Serialize};

pub const ADMISSION_API_VERSION: &str = "admission.k8s.io/v1";
pub const ADMISSION_KIND: &str = "AdmissionReview";

/// Final verdict for one review, before rendering.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Verdict {
    pub uid: String,
    pub decision: Decision,
    pub message: String,
}

impl Verdict {
    pub fn allow(uid: impl Into<String>, message: impl Into<String>) -> Self {
        Self { uid: uid.into(), decision: Decision::Allow, message: message.into() }
    }

    pub fn deny(uid: impl Into<String>, message: impl Into<String>) -> Self {
        Self { uid: uid.into(), decision: Decision::Deny, message: message.into() }
    }

    pub fn into_review(self) -> ReviewResponse { compose(&self.uid, self.decision, &self.message) }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReviewResponse {
    pub api_version: String,
    pub kind: String,
    pub response: ResponseBody,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResponseBody {
    pub uid: String,
    pub allowed: bool,
    pub status: ResponseStatus,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResponseStatus {
    pub code: u16,
    pub status: String,
    pub message: String,
}

/// Render a decision. `uid` is echoed unchanged, code is always 200: the
/// decision travels in `allowed`, not in the transport status.
pub fn compose(uid: &str, decision: Decision, message: &str) -> ReviewResponse {
    let status = if decision.allowed() { "Success" } else { "Failure" };
    ReviewResponse {
        api_version: ADMISSION_API_VERSION.to_string(),
        kind: ADMISSION_KIND.to_string(),
        response: ResponseBody {
            uid: uid.to_string(),
            allowed: decision.allowed(),
            status: ResponseStatus { code: 200, status: status.to_string(), message: message.to_string() },
        },
    }
}
