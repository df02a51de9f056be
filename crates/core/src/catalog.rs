//! Companion catalog: which backing services get a NavLink per monitored namespace.

#![forbid(unsafe_code)]

use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;
use smallvec::SmallVec;

use crate::navlink::{build_navlink, NavLink, OwnerIdentity};
use crate::BuildError;

// Icons
pub const ICON_PROMETHEUS: &str =
    "https://raw.githubusercontent.com/cncf/artwork/main/projects/prometheus/icon/color/prometheus-icon-color.svg";
pub const ICON_ALERTMANAGER: &str =
    "https://raw.githubusercontent.com/cncf/artwork/main/projects/prometheus/icon/black/prometheus-icon-black.svg";
pub const ICON_GRAFANA: &str =
    "https://raw.githubusercontent.com/grafana/grafana/main/public/img/grafana_icon.svg";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CatalogEntry {
    pub service: &'static str,
    pub port: i32,
    pub icon: &'static str,
}

impl CatalogEntry {
    pub fn port(&self) -> IntOrString { IntOrString::Int(self.port) }

    pub fn build(&self, namespace: &str, owner: &OwnerIdentity) -> Result<NavLink, BuildError> {
        build_navlink(namespace, self.service, self.port(), owner, self.icon)
    }
}

/// Metrics engine, alert router, dashboard. Order only matters for logs and tests.
pub const CATALOG: [CatalogEntry; 3] = [
    CatalogEntry { service: "prometheus-operated", port: 9090, icon: ICON_PROMETHEUS },
    CatalogEntry { service: "alertmanager-operated", port: 9093, icon: ICON_ALERTMANAGER },
    CatalogEntry { service: "project-monitoring-grafana", port: 80, icon: ICON_GRAFANA },
];

pub fn catalog() -> &'static [CatalogEntry] { &CATALOG }

/// The full companion set for one monitored resource, in catalog order.
pub fn companion_set(namespace: &str, owner: &OwnerIdentity) -> Result<SmallVec<[(CatalogEntry, NavLink); 3]>, BuildError> {
    catalog().iter().map(|e| e.build(namespace, owner).map(|nl| (*e, nl))).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;

    #[test]
    fn catalog_has_three_distinct_services() {
        let names: BTreeSet<_> = catalog().iter().map(|e| e.service).collect();
        assert_eq!(names.len(), 3);
        assert!(names.contains("prometheus-operated"));
        assert!(names.contains("alertmanager-operated"));
        assert!(names.contains("project-monitoring-grafana"));
    }

    #[test]
    fn companion_set_names_are_unique_per_namespace() {
        let owner = OwnerIdentity::new("k8s", "uid-1");
        let set = companion_set("team-a", &owner).unwrap();
        assert_eq!(set.len(), 3);
        let names: Vec<_> = set.iter().map(|(_, nl)| nl.metadata.name.clone().unwrap()).collect();
        assert_eq!(
            names,
            vec![
                "monitoring-team-a-prometheus-operated",
                "monitoring-team-a-alertmanager-operated",
                "monitoring-team-a-project-monitoring-grafana",
            ]
        );
    }

    #[test]
    fn companion_set_rejects_empty_namespace() {
        let owner = OwnerIdentity::new("k8s", "uid-1");
        assert!(companion_set("", &owner).is_err());
    }
}
