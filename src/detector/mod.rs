//! Detectors turn the extracted package index into security findings.
//!
//! # Built-in detectors
//!
//! | Detector | Finds |
//! |----------|-------|
//! | [`OsvDetector`] | Known vulnerabilities of npm and PyPI packages via OSV.dev |

mod osv;

pub use osv::{parse_cvss_score, OsvDetector, OsvVuln, VulnCache, VulnQuery, DEFAULT_API_URL};

use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::context::ScanContext;
use crate::error::ScanError;
use crate::fs::ScanRoot;
use crate::model::{GenericFinding, Inventory, PackageVuln};
use crate::packageindex::PackageIndex;
use crate::plugin::{status_from_err, PhaseReport, Plugin};

/// Findings returned by one detector run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Findings {
    pub package_vulns: Vec<PackageVuln>,
    pub generic_findings: Vec<GenericFinding>,
}

impl Findings {
    pub fn is_empty(&self) -> bool {
        self.package_vulns.is_empty() && self.generic_findings.is_empty()
    }
}

#[async_trait]
pub trait Detector: Plugin {
    /// Names of the extractors whose packages this detector inspects.
    fn required_extractors(&self) -> Vec<String>;

    async fn scan(&self, ctx: &ScanContext, root: &ScanRoot, index: &PackageIndex) -> anyhow::Result<Findings>;
}

/// Runs `detectors` in order and collects their findings.
///
/// A failing detector doesn't stop the others; its error is reported in the
/// returned [`PhaseReport`] once every detector has run.
pub async fn run(
    ctx: &ScanContext,
    detectors: &[Arc<dyn Detector>],
    root: &ScanRoot,
    index: &PackageIndex,
) -> (Inventory, PhaseReport) {
    let mut inventory = Inventory::default();
    let mut report = PhaseReport::default();

    for detector in detectors {
        if ctx.is_cancelled() {
            report.errors.push(ScanError::Cancelled);
            break;
        }

        match detector.scan(ctx, root, index).await {
            Ok(mut findings) => {
                for vuln in &mut findings.package_vulns {
                    if vuln.plugins.is_empty() {
                        vuln.plugins.push(detector.name().to_string());
                    }
                }
                for finding in &mut findings.generic_findings {
                    if finding.plugins.is_empty() {
                        finding.plugins.push(detector.name().to_string());
                    }
                }
                debug!(
                    detector = detector.name(),
                    package_vulns = findings.package_vulns.len(),
                    generic_findings = findings.generic_findings.len(),
                    "detector complete"
                );
                inventory.package_vulns.extend(findings.package_vulns);
                inventory.generic_findings.extend(findings.generic_findings);
                report.statuses.push(status_from_err(detector.as_ref(), None));
            }
            Err(e) => {
                warn!(detector = detector.name(), error = %e, "detector failed");
                report.statuses.push(status_from_err(detector.as_ref(), Some(&e)));
                report.errors.push(ScanError::plugin(detector.name(), e));
            }
        }
    }

    (inventory, report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::MemFs;
    use crate::model::{Advisory, AdvisoryId, Package, Severity, TargetDetails};

    struct FixedDetector {
        name: &'static str,
        fail: bool,
    }

    impl Plugin for FixedDetector {
        fn name(&self) -> &str {
            self.name
        }
        fn version(&self) -> u32 {
            1
        }
    }

    #[async_trait]
    impl Detector for FixedDetector {
        fn required_extractors(&self) -> Vec<String> {
            Vec::new()
        }

        async fn scan(&self, _ctx: &ScanContext, _root: &ScanRoot, index: &PackageIndex) -> anyhow::Result<Findings> {
            if self.fail {
                anyhow::bail!("feed timed out");
            }
            Ok(Findings {
                generic_findings: vec![GenericFinding {
                    advisory: Advisory {
                        id: AdvisoryId {
                            publisher: "TEST".to_string(),
                            reference: format!("{}-{}", self.name, index.len()),
                        },
                        title: "weak password".to_string(),
                        description: String::new(),
                        recommendation: String::new(),
                        severity: Severity::High,
                    },
                    target: TargetDetails::default(),
                    plugins: Vec::new(),
                    exploitability_signals: Vec::new(),
                }],
                ..Default::default()
            })
        }
    }

    fn detector(name: &'static str, fail: bool) -> Arc<dyn Detector> {
        Arc::new(FixedDetector { name, fail })
    }

    #[tokio::test]
    async fn test_failing_detector_does_not_block_siblings() {
        let root = ScanRoot::virtual_fs(Arc::new(MemFs::new()));
        let index = PackageIndex::new(&[Package::new("openssh", "9.0", "deb")]).unwrap();
        let detectors = vec![detector("weakcreds/ssh", true), detector("weakcreds/ftp", false)];

        let (inv, report) = run(&ScanContext::new(), &detectors, &root, &index).await;

        assert_eq!(report.statuses.len(), 2);
        assert!(!report.statuses[0].status.is_success());
        assert_eq!(report.statuses[0].status.failure_reason, "feed timed out");
        assert!(report.statuses[1].status.is_success());
        assert_eq!(report.errors.len(), 1);

        assert_eq!(inv.generic_findings.len(), 1);
        assert_eq!(inv.generic_findings[0].advisory.id.reference, "weakcreds/ftp-1");
        assert_eq!(inv.generic_findings[0].plugins, vec!["weakcreds/ftp"]);
    }

    #[tokio::test]
    async fn test_cancelled_before_first_detector() {
        let root = ScanRoot::virtual_fs(Arc::new(MemFs::new()));
        let index = PackageIndex::default();
        let ctx = ScanContext::new();
        ctx.cancel();

        let (inv, report) = run(&ctx, &[detector("a", false)], &root, &index).await;
        assert!(inv.is_empty());
        assert!(report.statuses.is_empty());
        assert!(report.errors.iter().any(|e| e.is_cancelled()));
    }
}
