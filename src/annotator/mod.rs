//! Annotators add context to the inventory after detection.
//!
//! Unlike enrichers they never consult external sources; they only look at
//! the inventory and the scanned filesystem.

mod cachedir;

pub use cachedir::CacheDirAnnotator;

use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::context::ScanContext;
use crate::error::ScanError;
use crate::fs::ScanRoot;
use crate::model::Inventory;
use crate::plugin::{status_from_err, PhaseReport, Plugin};

#[async_trait]
pub trait Annotator: Plugin {
    /// Updates `inventory` in place.
    async fn annotate(&self, ctx: &ScanContext, root: &ScanRoot, inventory: &mut Inventory) -> anyhow::Result<()>;
}

/// Runs `annotators` in order against `inventory`.
///
/// Every error is collected; a failing annotator doesn't stop the next one.
pub async fn run(
    ctx: &ScanContext,
    annotators: &[Arc<dyn Annotator>],
    root: &ScanRoot,
    inventory: &mut Inventory,
) -> PhaseReport {
    let mut report = PhaseReport::default();

    for annotator in annotators {
        if ctx.is_cancelled() {
            report.errors.push(ScanError::Cancelled);
            break;
        }

        match annotator.annotate(ctx, root, inventory).await {
            Ok(()) => {
                debug!(annotator = annotator.name(), "annotation complete");
                report.statuses.push(status_from_err(annotator.as_ref(), None));
            }
            Err(e) => {
                warn!(annotator = annotator.name(), error = %e, "annotation failed");
                report.statuses.push(status_from_err(annotator.as_ref(), Some(&e)));
                report.errors.push(ScanError::plugin(annotator.name(), e));
            }
        }
    }

    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::MemFs;
    use crate::model::Package;

    struct Tagger {
        name: &'static str,
        fail: bool,
    }

    impl Plugin for Tagger {
        fn name(&self) -> &str {
            self.name
        }
        fn version(&self) -> u32 {
            0
        }
    }

    #[async_trait]
    impl Annotator for Tagger {
        async fn annotate(&self, _ctx: &ScanContext, _root: &ScanRoot, inventory: &mut Inventory) -> anyhow::Result<()> {
            if self.fail {
                anyhow::bail!("annotation source missing");
            }
            for pkg in &mut inventory.packages {
                pkg.metadata = serde_json::json!({ "annotated_by": self.name });
            }
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_errors_are_joined_not_short_circuited() {
        let annotators: Vec<Arc<dyn Annotator>> = vec![
            Arc::new(Tagger { name: "a", fail: true }),
            Arc::new(Tagger { name: "b", fail: false }),
            Arc::new(Tagger { name: "c", fail: true }),
        ];
        let root = ScanRoot::virtual_fs(Arc::new(MemFs::new()));
        let mut inv = Inventory {
            packages: vec![Package::new("x", "1", "npm")],
            ..Default::default()
        };

        let report = run(&ScanContext::new(), &annotators, &root, &mut inv).await;

        assert_eq!(report.statuses.len(), 3);
        assert_eq!(report.errors.len(), 2);
        assert_eq!(inv.packages[0].metadata["annotated_by"], "b");
    }
}
