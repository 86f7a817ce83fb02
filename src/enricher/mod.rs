//! Enrichers add exploitability context to the finished inventory.
//!
//! Enrichers run last, after container layer attribution, so they can rely
//! on every package's final locations and layer details.

mod ignorelist;

pub use ignorelist::IgnoreListEnricher;

use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::context::ScanContext;
use crate::error::ScanError;
use crate::fs::ScanRoot;
use crate::model::Inventory;
use crate::plugin::{status_from_err, PhaseReport, Plugin};

#[async_trait]
pub trait Enricher: Plugin {
    /// Names of the plugins whose output this enricher needs.
    fn required_plugins(&self) -> Vec<String>;

    /// Updates `inventory` in place.
    async fn enrich(&self, ctx: &ScanContext, root: &ScanRoot, inventory: &mut Inventory) -> anyhow::Result<()>;
}

/// Runs `enrichers` in order against `inventory`, collecting every error.
pub async fn run(
    ctx: &ScanContext,
    enrichers: &[Arc<dyn Enricher>],
    root: &ScanRoot,
    inventory: &mut Inventory,
) -> PhaseReport {
    let mut report = PhaseReport::default();

    for enricher in enrichers {
        if ctx.is_cancelled() {
            report.errors.push(ScanError::Cancelled);
            break;
        }

        match enricher.enrich(ctx, root, inventory).await {
            Ok(()) => {
                debug!(enricher = enricher.name(), "enrichment complete");
                report.statuses.push(status_from_err(enricher.as_ref(), None));
            }
            Err(e) => {
                warn!(enricher = enricher.name(), error = %e, "enrichment failed");
                report.statuses.push(status_from_err(enricher.as_ref(), Some(&e)));
                report.errors.push(ScanError::plugin(enricher.name(), e));
            }
        }
    }

    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::MemFs;

    struct Cancelling;

    impl Plugin for Cancelling {
        fn name(&self) -> &str {
            "test/cancelling"
        }
        fn version(&self) -> u32 {
            0
        }
    }

    #[async_trait]
    impl Enricher for Cancelling {
        fn required_plugins(&self) -> Vec<String> {
            Vec::new()
        }

        async fn enrich(&self, ctx: &ScanContext, _root: &ScanRoot, _inventory: &mut Inventory) -> anyhow::Result<()> {
            ctx.cancel();
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_cancellation_between_enrichers() {
        let enrichers: Vec<Arc<dyn Enricher>> = vec![Arc::new(Cancelling), Arc::new(Cancelling)];
        let root = ScanRoot::virtual_fs(Arc::new(MemFs::new()));
        let mut inv = Inventory::default();

        let report = run(&ScanContext::new(), &enrichers, &root, &mut inv).await;

        assert_eq!(report.statuses.len(), 1);
        assert!(report.statuses[0].status.is_success());
        assert!(report.errors.iter().any(|e| e.is_cancelled()));
    }
}
