use anyhow::Result;
use async_trait::async_trait;

use super::Enricher;
use crate::config::IgnoreConfig;
use crate::context::ScanContext;
use crate::fs::ScanRoot;
use crate::model::{ExploitabilitySignal, Inventory, Justification};
use crate::plugin::Plugin;

/// Marks vulnerabilities and packages the user chose to ignore.
///
/// Ignored entries stay in the report with an exploitability signal, so a
/// consumer can still see what was suppressed.
pub struct IgnoreListEnricher {
    ignore: IgnoreConfig,
}

impl IgnoreListEnricher {
    pub const NAME: &'static str = "vex/ignorelist";

    pub fn new(ignore: IgnoreConfig) -> Self {
        Self { ignore }
    }
}

fn has_signal(signals: &[ExploitabilitySignal], plugin: &str) -> bool {
    signals.iter().any(|s| s.plugin == plugin)
}

impl Plugin for IgnoreListEnricher {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn version(&self) -> u32 {
        0
    }
}

#[async_trait]
impl Enricher for IgnoreListEnricher {
    fn required_plugins(&self) -> Vec<String> {
        Vec::new()
    }

    async fn enrich(&self, _ctx: &ScanContext, _root: &ScanRoot, inventory: &mut Inventory) -> Result<()> {
        for vuln in &mut inventory.package_vulns {
            if self.ignore.should_ignore_vulnerability(&vuln.id) && !has_signal(&vuln.exploitability_signals, Self::NAME)
            {
                vuln.exploitability_signals.push(ExploitabilitySignal {
                    plugin: Self::NAME.to_string(),
                    justification: Justification::VulnerableCodeNotPresent,
                    matches_all_vulns: false,
                    vuln_identifiers: vec![vuln.id.clone()],
                });
            }
        }

        for pkg in &mut inventory.packages {
            if self.ignore.should_ignore_package(&pkg.name) && !has_signal(&pkg.exploitability_signals, Self::NAME) {
                pkg.exploitability_signals.push(ExploitabilitySignal::for_all_vulns(
                    Self::NAME,
                    Justification::Unspecified,
                ));
            }
        }

        Ok(())
    }
}
