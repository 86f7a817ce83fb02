use serde::{Deserialize, Serialize};

use super::{GenericFinding, Package, PackageVuln};

/// Everything collected by a scan so far.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Inventory {
    pub packages: Vec<Package>,
    pub package_vulns: Vec<PackageVuln>,
    pub generic_findings: Vec<GenericFinding>,
}

impl Inventory {
    pub fn is_empty(&self) -> bool {
        self.packages.is_empty() && self.package_vulns.is_empty() && self.generic_findings.is_empty()
    }

    /// Moves every item of `other` to the end of this inventory.
    pub fn append(&mut self, other: Inventory) {
        self.packages.extend(other.packages);
        self.package_vulns.extend(other.package_vulns);
        self.generic_findings.extend(other.generic_findings);
    }

    /// Vulnerabilities not marked as unexploitable.
    ///
    /// A vulnerability is suppressed by a signal of its own, or by a signal
    /// on its package that matches all vulnerabilities or lists its ID.
    pub fn unsuppressed_vulns(&self) -> impl Iterator<Item = &PackageVuln> {
        self.package_vulns.iter().filter(move |vuln| {
            if !vuln.exploitability_signals.is_empty() {
                return false;
            }
            !self
                .packages
                .iter()
                .filter(|p| {
                    p.name == vuln.package_name && p.version == vuln.package_version && p.purl_type == vuln.purl_type
                })
                .flat_map(|p| &p.exploitability_signals)
                .any(|s| s.matches_all_vulns || s.vuln_identifiers.iter().any(|id| id == &vuln.id))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ExploitabilitySignal, Justification, Severity};

    fn vuln(id: &str, name: &str) -> PackageVuln {
        PackageVuln {
            id: id.to_string(),
            package_name: name.to_string(),
            package_version: "1.0.0".to_string(),
            purl_type: "npm".to_string(),
            severity: Severity::High,
            summary: String::new(),
            fixed_version: None,
            reference_url: None,
            plugins: vec!["vulns/osv".to_string()],
            exploitability_signals: Vec::new(),
        }
    }

    #[test]
    fn test_append_keeps_order() {
        let mut inv = Inventory::default();
        inv.packages.push(Package::new("b", "1", "npm"));
        let other = Inventory {
            packages: vec![Package::new("a", "1", "npm")],
            ..Default::default()
        };
        inv.append(other);
        let names: Vec<&str> = inv.packages.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["b", "a"]);
        assert!(!inv.is_empty());
    }

    #[test]
    fn test_unsuppressed_vulns_honors_package_signals() {
        let mut cached = Package::new("left-pad", "1.0.0", "npm");
        cached
            .exploitability_signals
            .push(ExploitabilitySignal::for_all_vulns("vex/cachedir", Justification::ComponentNotPresent));
        let mut listed = Package::new("minimist", "1.0.0", "npm");
        listed.exploitability_signals.push(ExploitabilitySignal {
            plugin: "vex/ignorelist".to_string(),
            justification: Justification::Unspecified,
            matches_all_vulns: false,
            vuln_identifiers: vec!["GHSA-2".to_string()],
        });
        let mut own_signal = vuln("GHSA-4", "lodash");
        own_signal
            .exploitability_signals
            .push(ExploitabilitySignal::for_all_vulns("vex/ignorelist", Justification::Unspecified));

        let inv = Inventory {
            packages: vec![cached, listed, Package::new("lodash", "1.0.0", "npm")],
            package_vulns: vec![
                vuln("GHSA-1", "left-pad"),
                vuln("GHSA-2", "minimist"),
                vuln("GHSA-3", "minimist"),
                own_signal,
                vuln("GHSA-5", "lodash"),
            ],
            ..Default::default()
        };

        let ids: Vec<&str> = inv.unsuppressed_vulns().map(|v| v.id.as_str()).collect();
        assert_eq!(ids, vec!["GHSA-3", "GHSA-5"]);
    }

    #[test]
    fn test_package_signal_needs_matching_version() {
        let mut old = Package::new("left-pad", "0.9.0", "npm");
        old.exploitability_signals
            .push(ExploitabilitySignal::for_all_vulns("vex/cachedir", Justification::ComponentNotPresent));
        let inv = Inventory {
            packages: vec![old],
            package_vulns: vec![vuln("GHSA-1", "left-pad")],
            ..Default::default()
        };
        assert_eq!(inv.unsuppressed_vulns().count(), 1);
    }
}
