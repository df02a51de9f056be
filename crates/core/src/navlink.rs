//! NavLink companion resources and the descriptor builder.
//!
//! A NavLink (`ui.cattle.io/v1`) tells the management UI to render a link to
//! an in-cluster service. Every field of a built NavLink is derived from its
//! inputs, so building twice yields the same object; the name doubles as the
//! idempotency key against the resource store.

#![forbid(unsafe_code)]

use k8s_openapi::apimachinery::pkg::apis::meta::v1::{ObjectMeta, OwnerReference};
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;
use kube::CustomResource;
use serde::{Deserialize, Serialize};

use crate::BuildError;

/// Name prefix shared by every companion NavLink and its UI group.
pub const NAME_PREFIX: &str = "monitoring-";

/// Owner kind written into companion owner references.
pub const OWNER_API_VERSION: &str = "monitoring.coreos.com/v1";
pub const OWNER_KIND: &str = "Prometheus";

#[derive(CustomResource, Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
#[kube(
    group = "ui.cattle.io",
    version = "v1",
    kind = "NavLink",
    plural = "navlinks",
    schema = "disabled",
    derive = "PartialEq"
)]
#[serde(rename_all = "camelCase")]
pub struct NavLinkSpec {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub label: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub side_label: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub icon_src: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub group: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub target: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub to_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub to_service: Option<NavLinkTargetService>,
}

/// Backing service a NavLink proxies to.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct NavLinkTargetService {
    pub namespace: String,
    pub name: String,
    pub scheme: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<IntOrString>,
    #[serde(default)]
    pub path: String,
}

/// Identity of the monitored resource that owns a companion set.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OwnerIdentity {
    pub name: String,
    pub uid: String,
}

impl OwnerIdentity {
    pub fn new(name: impl Into<String>, uid: impl Into<String>) -> Self {
        Self { name: name.into(), uid: uid.into() }
    }

    /// Owner reference with controller and cascade-blocking set, so the
    /// garbage collector removes the NavLink once the owner is gone.
    pub fn owner_reference(&self) -> OwnerReference {
        OwnerReference {
            api_version: OWNER_API_VERSION.to_string(),
            kind: OWNER_KIND.to_string(),
            name: self.name.clone(),
            uid: self.uid.clone(),
            controller: Some(true),
            block_owner_deletion: Some(true),
        }
    }
}

/// Deterministic NavLink name for a namespace/service pair.
pub fn navlink_name(namespace: &str, service: &str) -> String {
    format!("{NAME_PREFIX}{namespace}-{service}")
}

/// UI group all companions of one namespace are listed under.
pub fn navlink_group(namespace: &str) -> String {
    format!("{NAME_PREFIX}{namespace}")
}

/// Build the companion NavLink exposing `service` in `namespace`.
pub fn build_navlink(
    namespace: &str,
    service: &str,
    port: IntOrString,
    owner: &OwnerIdentity,
    icon: &str,
) -> Result<NavLink, BuildError> {
    if namespace.is_empty() {
        return Err(BuildError::EmptyNamespace);
    }
    if service.is_empty() {
        return Err(BuildError::EmptyService);
    }
    let spec = NavLinkSpec {
        target: "_blank".to_string(),
        group: navlink_group(namespace),
        to_service: Some(NavLinkTargetService {
            namespace: namespace.to_string(),
            name: service.to_string(),
            scheme: "http".to_string(),
            port: Some(port),
            path: String::new(),
        }),
        icon_src: icon.to_string(),
        ..Default::default()
    };
    Ok(NavLink {
        metadata: ObjectMeta {
            name: Some(navlink_name(namespace, service)),
            namespace: Some(namespace.to_string()),
            owner_references: Some(vec![owner.owner_reference()]),
            ..Default::default()
        },
        spec,
    })
}
