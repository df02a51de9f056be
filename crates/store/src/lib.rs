//! navhook store: in-RAM NavLink store with fault injection.
//!
//! Mirrors the API server's create/delete semantics (409 on duplicate
//! create, 404 on missing delete) so the reconciler can be driven offline by
//! `navhookd replay` and by tests. Every call is recorded in order.

#![forbid(unsafe_code)]

use std::sync::Mutex;

use navhook_core::NavLink;
use navhook_kubehub::{ListFilter, NavLinkStore, StoreError};
use rustc_hash::FxHashMap;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Op {
    Create,
    Delete,
    List,
}

/// One recorded store call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Call {
    pub op: Op,
    pub namespace: String,
    pub name: String,
}

/// Failure injected for a given NavLink name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Fault {
    /// Respond with an API error of this code.
    Api(u16),
    /// Respond with a transport-level error.
    Transport,
    /// Never respond.
    Hang,
}

type Key = (String, String);

pub struct MemoryStore {
    items: Mutex<FxHashMap<Key, NavLink>>,
    faults: Mutex<FxHashMap<String, Fault>>,
    calls: Mutex<Vec<Call>>,
    installed: bool,
}

impl Default for MemoryStore {
    fn default() -> Self { Self::new() }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            items: Mutex::new(FxHashMap::default()),
            faults: Mutex::new(FxHashMap::default()),
            calls: Mutex::new(Vec::new()),
            installed: true,
        }
    }

    /// A store where the NavLink kind is not served; every call fails with 404.
    pub fn not_installed() -> Self { Self { installed: false, ..Self::new() } }

    /// Insert an object without recording a call.
    pub fn seed(&self, navlink: NavLink) {
        let key = key_of(&navlink);
        lock(&self.items).insert(key, navlink);
    }

    pub fn inject(&self, name: &str, fault: Fault) { lock(&self.faults).insert(name.to_string(), fault); }

    pub fn calls(&self) -> Vec<Call> { lock(&self.calls).clone() }

    pub fn calls_of(&self, op: Op) -> Vec<Call> { self.calls().into_iter().filter(|c| c.op == op).collect() }

    pub fn contains(&self, namespace: &str, name: &str) -> bool {
        lock(&self.items).contains_key(&(namespace.to_string(), name.to_string()))
    }

    pub fn get(&self, namespace: &str, name: &str) -> Option<NavLink> {
        lock(&self.items).get(&(namespace.to_string(), name.to_string())).cloned()
    }

    /// Sorted names stored in `namespace`.
    pub fn names(&self, namespace: &str) -> Vec<String> {
        let mut out: Vec<String> = lock(&self.items).keys().filter(|(ns, _)| ns == namespace).map(|(_, n)| n.clone()).collect();
        out.sort_unstable();
        out
    }

    fn record(&self, op: Op, namespace: &str, name: &str) {
        lock(&self.calls).push(Call { op, namespace: namespace.to_string(), name: name.to_string() });
    }

    async fn check(&self, name: &str) -> Result<(), StoreError> {
        if !self.installed {
            return Err(StoreError::Api {
                code: 404,
                reason: "NotFound".into(),
                message: "the server could not find the requested resource".into(),
            });
        }
        let fault = lock(&self.faults).get(name).cloned();
        match fault {
            None => Ok(()),
            Some(Fault::Api(code)) => Err(StoreError::Api { code, reason: "Injected".into(), message: format!("injected failure for {name}") }),
            Some(Fault::Transport) => Err(StoreError::Transport(format!("connection reset while handling {name}"))),
            Some(Fault::Hang) => {
                std::future::pending::<()>().await;
                Ok(())
            }
        }
    }
}

fn key_of(navlink: &NavLink) -> Key {
    (
        navlink.metadata.namespace.clone().unwrap_or_default(),
        navlink.metadata.name.clone().unwrap_or_default(),
    )
}

// Poisoned locks are recovered; the guarded maps have no cross-field invariants.
fn lock<T>(m: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|e| e.into_inner())
}

#[async_trait::async_trait]
impl NavLinkStore for MemoryStore {
    async fn create(&self, namespace: &str, navlink: &NavLink) -> Result<(), StoreError> {
        let name = navlink.metadata.name.clone().unwrap_or_default();
        self.record(Op::Create, namespace, &name);
        self.check(&name).await?;
        let key = (namespace.to_string(), name.clone());
        let mut items = lock(&self.items);
        if items.contains_key(&key) {
            return Err(StoreError::AlreadyExists(name));
        }
        let mut stored = navlink.clone();
        stored.metadata.namespace = Some(namespace.to_string());
        items.insert(key, stored);
        debug!(navlink = %name, ns = %namespace, "memory store: created");
        Ok(())
    }

    async fn delete(&self, namespace: &str, name: &str) -> Result<(), StoreError> {
        self.record(Op::Delete, namespace, name);
        self.check(name).await?;
        match lock(&self.items).remove(&(namespace.to_string(), name.to_string())) {
            Some(_) => Ok(()),
            None => Err(StoreError::NotFound(name.to_string())),
        }
    }

    async fn list(&self, namespace: &str, filter: &ListFilter) -> Result<Vec<String>, StoreError> {
        self.record(Op::List, namespace, "");
        self.check("").await?;
        let items = lock(&self.items);
        let mut names: Vec<String> = items
            .iter()
            .filter(|((ns, _), _)| ns == namespace)
            .filter(|(_, nl)| matches_selector(nl, filter.label_selector.as_deref()))
            .map(|((_, n), _)| n.clone())
            .collect();
        names.sort_unstable();
        if let Some(limit) = filter.limit { names.truncate(limit as usize); }
        Ok(names)
    }
}

/// Equality selectors only (`k=v,k2=v2`).
fn matches_selector(navlink: &NavLink, selector: Option<&str>) -> bool {
    let Some(sel) = selector else { return true };
    let labels = navlink.metadata.labels.clone().unwrap_or_default();
    sel.split(',').map(str::trim).filter(|t| !t.is_empty()).all(|term| match term.split_once('=') {
        Some((k, v)) => labels.get(k.trim()).map(|x| x == v.trim()).unwrap_or(false),
        None => labels.contains_key(term),
    })
}
