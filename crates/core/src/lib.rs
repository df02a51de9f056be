//! navhook core types: companion NavLinks, the catalog, and reconcile outcomes.

#![forbid(unsafe_code)]

use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

pub mod catalog;
pub mod navlink;

pub use catalog::{catalog, companion_set, CatalogEntry, CATALOG};
pub use navlink::{build_navlink, navlink_name, NavLink, NavLinkSpec, NavLinkTargetService, OwnerIdentity};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BuildError {
    #[error("companion namespace must not be empty")]
    EmptyNamespace,
    #[error("companion service name must not be empty")]
    EmptyService,
}

/// What a reconcile pass does to the companion set.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    Create,
    Delete,
}

impl Action {
    pub fn as_str(&self) -> &'static str {
        match self {
            Action::Create => "create",
            Action::Delete => "delete",
        }
    }
}

impl std::fmt::Display for Action {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result { f.write_str(self.as_str()) }
}

/// Result of applying one companion NavLink.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum Outcome {
    Applied,
    /// Store already matched the target (exists on create, absent on delete).
    AlreadySatisfied,
    Failed(String),
}

impl Outcome {
    pub fn label(&self) -> &'static str {
        match self {
            Outcome::Applied => "applied",
            Outcome::AlreadySatisfied => "already_satisfied",
            Outcome::Failed(_) => "failed",
        }
    }

    pub fn is_failed(&self) -> bool { matches!(self, Outcome::Failed(_)) }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CompanionOutcome {
    pub service: String,
    pub name: String,
    pub outcome: Outcome,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum Decision {
    Allow,
    Deny,
}

impl Decision {
    pub fn allowed(&self) -> bool { matches!(self, Decision::Allow) }

    pub fn as_str(&self) -> &'static str {
        match self {
            Decision::Allow => "allow",
            Decision::Deny => "deny",
        }
    }
}

/// Aggregated outcome of one reconcile pass over the companion set.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Reconciliation {
    pub action: Action,
    pub outcomes: SmallVec<[CompanionOutcome; 3]>,
}

impl Reconciliation {
    pub fn new(action: Action) -> Self { Self { action, outcomes: SmallVec::new() } }

    pub fn push(&mut self, outcome: CompanionOutcome) { self.outcomes.push(outcome); }

    pub fn failed(&self) -> usize { self.outcomes.iter().filter(|o| o.outcome.is_failed()).count() }

    /// Companion bookkeeping never blocks the monitored resource.
    pub fn decision(&self) -> Decision { Decision::Allow }

    /// Human readable summary, e.g.
    /// `Navlinks create: applied [prometheus-operated], already satisfied [alertmanager-operated], failed [project-monitoring-grafana: timed out]`.
    pub fn summary(&self) -> String {
        let mut applied = Vec::new();
        let mut satisfied = Vec::new();
        let mut failed = Vec::new();
        for o in self.outcomes.iter() {
            match &o.outcome {
                Outcome::Applied => applied.push(o.service.clone()),
                Outcome::AlreadySatisfied => satisfied.push(o.service.clone()),
                Outcome::Failed(cause) => failed.push(format!("{}: {}", o.service, cause)),
            }
        }
        let mut parts = Vec::with_capacity(3);
        if !applied.is_empty() { parts.push(format!("applied [{}]", applied.join(", "))); }
        if !satisfied.is_empty() { parts.push(format!("already satisfied [{}]", satisfied.join(", "))); }
        if !failed.is_empty() { parts.push(format!("failed [{}]", failed.join(", "))); }
        if parts.is_empty() {
            format!("Navlinks {}", self.action)
        } else {
            format!("Navlinks {}: {}", self.action, parts.join(", "))
        }
    }
}
