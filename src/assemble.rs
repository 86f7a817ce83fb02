//! Final result assembly with deterministic ordering.
//!
//! Two scans over the same input must serialize identically regardless of
//! filesystem enumeration order, so every list in the result is sorted.

use chrono::{DateTime, Utc};
use std::cmp::Ordering;

use crate::error::ScanError;
use crate::model::{GenericFinding, Inventory, Package, PackageVuln, PluginStatus, ScanResult, ScanStatus};

/// Version reported in every [`ScanResult`].
pub const SCANNER_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Builds the final, sorted result.
///
/// The scan succeeded iff `err` is `None`; otherwise its message becomes
/// the failure reason.
pub fn new_scan_result(
    start_time: DateTime<Utc>,
    end_time: DateTime<Utc>,
    plugin_status: Vec<PluginStatus>,
    inventory: Inventory,
    err: Option<&ScanError>,
) -> ScanResult {
    let status = match err {
        Some(e) => ScanStatus::failed(e.to_string()),
        None => ScanStatus::succeeded(),
    };
    let mut result = ScanResult {
        start_time,
        end_time,
        version: SCANNER_VERSION.to_string(),
        status,
        plugin_status,
        inventory,
    };
    sort_results(&mut result);
    result
}

/// Sorts every list of `result` for stable, diffable output.
pub fn sort_results(result: &mut ScanResult) {
    for pkg in &mut result.inventory.packages {
        pkg.locations.sort();
    }

    result.plugin_status.sort_by(|a, b| a.name.cmp(&b.name));
    result.inventory.packages.sort_by(cmp_packages);
    result.inventory.package_vulns.sort_by(cmp_package_vulns);
    result.inventory.generic_findings.sort_by(cmp_generic_findings);
}

/// Orders packages by name, version, number of plugins, the plugin names
/// and finally the joined locations.
///
/// Locations are compared in their stored order; [`sort_results`] sorts
/// them first.
pub fn cmp_packages(a: &Package, b: &Package) -> Ordering {
    a.name
        .cmp(&b.name)
        .then_with(|| a.version.cmp(&b.version))
        .then_with(|| a.plugins.len().cmp(&b.plugins.len()))
        .then_with(|| a.plugins.iter().cmp(b.plugins.iter()))
        .then_with(|| a.locations.join(" ").cmp(&b.locations.join(" ")))
}

fn cmp_package_vulns(a: &PackageVuln, b: &PackageVuln) -> Ordering {
    a.id.cmp(&b.id)
}

fn cmp_generic_findings(a: &GenericFinding, b: &GenericFinding) -> Ordering {
    a.advisory
        .id
        .reference
        .cmp(&b.advisory.id.reference)
        .then_with(|| a.target.extra.cmp(&b.target.extra))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Advisory, AdvisoryId, Severity, TargetDetails};

    fn pkg(name: &str, version: &str, plugins: &[&str], locations: &[&str]) -> Package {
        let mut p = Package::new(name, version, "npm");
        p.plugins = plugins.iter().map(|s| s.to_string()).collect();
        p.locations = locations.iter().map(|s| s.to_string()).collect();
        p
    }

    fn finding(reference: &str, extra: &str) -> GenericFinding {
        GenericFinding {
            advisory: Advisory {
                id: AdvisoryId {
                    publisher: "TEST".to_string(),
                    reference: reference.to_string(),
                },
                title: String::new(),
                description: String::new(),
                recommendation: String::new(),
                severity: Severity::Low,
            },
            target: TargetDetails {
                location: String::new(),
                extra: extra.to_string(),
            },
            plugins: vec!["test".to_string()],
            exploitability_signals: Vec::new(),
        }
    }

    #[test]
    fn test_cmp_packages_key_order() {
        let a = pkg("a", "2", &["x"], &[]);
        let b = pkg("b", "1", &["x"], &[]);
        assert_eq!(cmp_packages(&a, &b), Ordering::Less);

        let v1 = pkg("a", "1", &["x", "y"], &[]);
        let v2 = pkg("a", "2", &["x"], &[]);
        assert_eq!(cmp_packages(&v1, &v2), Ordering::Less);

        let one = pkg("a", "1", &["z"], &[]);
        let two = pkg("a", "1", &["a", "b"], &[]);
        assert_eq!(cmp_packages(&one, &two), Ordering::Less);

        let p1 = pkg("a", "1", &["a"], &["x/package-lock.json"]);
        let p2 = pkg("a", "1", &["b"], &["a/package-lock.json"]);
        assert_eq!(cmp_packages(&p1, &p2), Ordering::Less);

        let l1 = pkg("a", "1", &["a"], &["a/package-lock.json"]);
        let l2 = pkg("a", "1", &["a"], &["b/package-lock.json"]);
        assert_eq!(cmp_packages(&l1, &l2), Ordering::Less);
        assert_eq!(cmp_packages(&l1, &l1.clone()), Ordering::Equal);
    }

    #[test]
    fn test_permuted_inputs_serialize_identically() {
        let start = Utc::now();
        let packages = vec![
            pkg("lodash", "4.17.21", &["javascript/packagelockjson"], &["b/package-lock.json", "a/package-lock.json"]),
            pkg("lodash", "4.17.21", &["javascript/packagelockjson"], &["c/package-lock.json"]),
            pkg("express", "4.18.2", &["javascript/packagelockjson"], &["a/package-lock.json"]),
        ];
        let statuses = vec![
            PluginStatus {
                name: "vulns/osv".to_string(),
                version: 0,
                status: ScanStatus::succeeded(),
            },
            PluginStatus {
                name: "javascript/packagelockjson".to_string(),
                version: 0,
                status: ScanStatus::succeeded(),
            },
        ];
        let findings = vec![finding("B", "2"), finding("A", "9"), finding("B", "1")];

        let forward = new_scan_result(
            start,
            start,
            statuses.clone(),
            Inventory {
                packages: packages.clone(),
                generic_findings: findings.clone(),
                ..Default::default()
            },
            None,
        );

        let mut reversed_packages: Vec<Package> = packages.into_iter().rev().collect();
        reversed_packages[2].locations.reverse();
        let backward = new_scan_result(
            start,
            start,
            statuses.into_iter().rev().collect(),
            Inventory {
                packages: reversed_packages,
                generic_findings: findings.into_iter().rev().collect(),
                ..Default::default()
            },
            None,
        );

        let a = serde_json::to_string(&forward).unwrap();
        let b = serde_json::to_string(&backward).unwrap();
        assert_eq!(a, b);

        assert_eq!(forward.inventory.packages[0].name, "express");
        assert_eq!(
            forward.inventory.packages[1].locations,
            vec!["a/package-lock.json", "b/package-lock.json"]
        );
        assert_eq!(forward.plugin_status[0].name, "javascript/packagelockjson");
        let refs: Vec<(&str, &str)> = forward
            .inventory
            .generic_findings
            .iter()
            .map(|f| (f.advisory.id.reference.as_str(), f.target.extra.as_str()))
            .collect();
        assert_eq!(refs, vec![("A", "9"), ("B", "1"), ("B", "2")]);
    }

    #[test]
    fn test_failed_status_carries_reason() {
        let now = Utc::now();
        let result = new_scan_result(now, now, Vec::new(), Inventory::default(), Some(&ScanError::NoScanRoot));
        assert!(!result.status.is_success());
        assert_eq!(result.status.failure_reason, "no scan root specified");
        assert_eq!(result.version, SCANNER_VERSION);
    }
}
