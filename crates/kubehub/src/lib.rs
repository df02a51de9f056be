//! navhook kubehub: the NavLink store contract and its kube-backed adapter.
//!
//! The webhook only ever needs three verbs against the NavLink kind: create,
//! delete and a cheap list used to probe whether the kind is served at all.
//! Outcomes the reconciler treats as steady state (`AlreadyExists`,
//! `NotFound`) are surfaced as distinct [`StoreError`] variants so callers
//! never have to inspect HTTP codes.

#![forbid(unsafe_code)]

use anyhow::{Context, Result};
use kube::{
    api::{Api, DeleteParams, ListParams, PostParams},
    core::{ApiResource, DynamicObject},
    Client,
};
use metrics::counter;
use navhook_core::NavLink;
use tracing::debug;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("navlink {0} already exists")]
    AlreadyExists(String),
    #[error("navlink {0} not found")]
    NotFound(String),
    #[error("api error {code} ({reason}): {message}")]
    Api { code: u16, reason: String, message: String },
    #[error("transport: {0}")]
    Transport(String),
    #[error("encoding navlink: {0}")]
    Encode(#[from] serde_json::Error),
}

impl StoreError {
    pub fn is_already_exists(&self) -> bool { matches!(self, StoreError::AlreadyExists(_)) }
    pub fn is_not_found(&self) -> bool { matches!(self, StoreError::NotFound(_)) }

    /// Map a kube client error for the object `name`.
    pub fn from_kube(err: kube::Error, name: &str) -> Self {
        match err {
            kube::Error::Api(ae) if ae.code == 404 => StoreError::NotFound(name.to_string()),
            kube::Error::Api(ae) if ae.code == 409 && ae.reason == "AlreadyExists" => {
                StoreError::AlreadyExists(name.to_string())
            }
            kube::Error::Api(ae) => StoreError::Api { code: ae.code, reason: ae.reason, message: ae.message },
            other => StoreError::Transport(other.to_string()),
        }
    }
}

/// Filter for [`NavLinkStore::list`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListFilter {
    pub label_selector: Option<String>,
    pub limit: Option<u32>,
}

impl ListFilter {
    /// Smallest possible list, used to check the kind is installed.
    pub fn probe() -> Self { Self { label_selector: None, limit: Some(1) } }
}

/// Idempotency-aware access to NavLink objects.
#[async_trait::async_trait]
pub trait NavLinkStore: Send + Sync {
    async fn create(&self, namespace: &str, navlink: &NavLink) -> Result<(), StoreError>;
    async fn delete(&self, namespace: &str, name: &str) -> Result<(), StoreError>;
    /// Names of the NavLinks matching `filter`.
    async fn list(&self, namespace: &str, filter: &ListFilter) -> Result<Vec<String>, StoreError>;
}

/// Connect using in-cluster config, falling back to the local kubeconfig.
pub async fn get_kube_client() -> Result<Client> {
    Client::try_default().await.context("building kube client (in-cluster or kubeconfig)")
}

/// NavLink store backed by the cluster API server.
///
/// The upstream NavLink CRD is cluster-scoped; `namespaced` switches to
/// namespaced calls for installations that serve it per namespace.
#[derive(Clone)]
pub struct KubeStore {
    client: Client,
    resource: ApiResource,
    namespaced: bool,
}

impl KubeStore {
    pub fn new(client: Client, namespaced: bool) -> Self {
        Self { client, resource: ApiResource::erase::<NavLink>(&()), namespaced }
    }

    fn api(&self, namespace: &str) -> Api<DynamicObject> {
        if self.namespaced {
            Api::namespaced_with(self.client.clone(), namespace, &self.resource)
        } else {
            Api::all_with(self.client.clone(), &self.resource)
        }
    }
}

/// Re-shape a typed NavLink into the dynamic form the API client sends.
pub fn to_dynamic(navlink: &NavLink, resource: &ApiResource) -> Result<DynamicObject, StoreError> {
    let name = navlink.metadata.name.clone().unwrap_or_default();
    let mut obj = DynamicObject::new(&name, resource);
    obj.metadata = navlink.metadata.clone();
    obj.data = serde_json::json!({ "spec": serde_json::to_value(&navlink.spec)? });
    Ok(obj)
}

#[async_trait::async_trait]
impl NavLinkStore for KubeStore {
    async fn create(&self, namespace: &str, navlink: &NavLink) -> Result<(), StoreError> {
        let name = navlink.metadata.name.clone().unwrap_or_default();
        let mut obj = to_dynamic(navlink, &self.resource)?;
        if !self.namespaced { obj.metadata.namespace = None; }
        let res = self.api(namespace).create(&PostParams::default(), &obj).await;
        record("create", &res);
        match res {
            Ok(_) => {
                debug!(navlink = %name, ns = %namespace, "navlink created");
                Ok(())
            }
            Err(e) => Err(StoreError::from_kube(e, &name)),
        }
    }

    async fn delete(&self, namespace: &str, name: &str) -> Result<(), StoreError> {
        let res = self.api(namespace).delete(name, &DeleteParams::default()).await;
        record("delete", &res);
        match res {
            Ok(_) => {
                debug!(navlink = %name, ns = %namespace, "navlink deleted");
                Ok(())
            }
            Err(e) => Err(StoreError::from_kube(e, name)),
        }
    }

    async fn list(&self, namespace: &str, filter: &ListFilter) -> Result<Vec<String>, StoreError> {
        let mut lp = ListParams::default();
        if let Some(sel) = filter.label_selector.as_deref() { lp = lp.labels(sel); }
        if let Some(limit) = filter.limit { lp = lp.limit(limit); }
        let res = self.api(namespace).list(&lp).await;
        record("list", &res);
        let list = res.map_err(|e| StoreError::from_kube(e, "navlinks"))?;
        Ok(list.items.into_iter().filter_map(|o| o.metadata.name).collect())
    }
}

fn record<T>(op: &'static str, res: &std::result::Result<T, kube::Error>) {
    let result = if res.is_ok() { "ok" } else { "err" };
    counter!("navhook_store_calls_total", "op" => op, "result" => result).increment(1);
}
