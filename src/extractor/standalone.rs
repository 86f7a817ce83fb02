//! Runner for standalone extractors.

use std::sync::Arc;
use tracing::{debug, warn};

use super::{StandaloneExtractor, StandaloneInput};
use crate::context::ScanContext;
use crate::error::ScanError;
use crate::fs::ScanRoot;
use crate::model::Inventory;
use crate::plugin::{status_from_err, PhaseReport};

/// Runs `extractors` in order against `root`.
///
/// A failing extractor gets a failed status and the next one runs. Once the
/// scan is cancelled no further extractor runs and the report carries
/// [`ScanError::Cancelled`]; inventory collected up to then is returned.
pub async fn run(
    ctx: &ScanContext,
    extractors: &[Arc<dyn StandaloneExtractor>],
    root: &ScanRoot,
) -> (Inventory, PhaseReport) {
    let mut inventory = Inventory::default();
    let mut report = PhaseReport::default();

    let input = StandaloneInput {
        fs: root.fs.as_ref(),
        root: root.path.clone(),
    };

    for extractor in extractors {
        if ctx.is_cancelled() {
            report.errors.push(ScanError::Cancelled);
            break;
        }

        match extractor.extract(ctx, &input).await {
            Ok(mut inv) => {
                for pkg in &mut inv.packages {
                    pkg.add_plugin(extractor.name());
                }
                debug!(extractor = extractor.name(), packages = inv.packages.len(), "standalone extraction complete");
                inventory.append(inv);
                report.statuses.push(status_from_err(extractor.as_ref(), None));
            }
            Err(e) => {
                warn!(extractor = extractor.name(), error = %e, "standalone extraction failed");
                report.statuses.push(status_from_err(extractor.as_ref(), Some(&e)));
            }
        }
    }

    (inventory, report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::MemFs;
    use crate::model::Package;
    use crate::plugin::Plugin;
    use async_trait::async_trait;

    struct Fixed {
        name: &'static str,
        fail: bool,
        cancel_after: bool,
    }

    impl Plugin for Fixed {
        fn name(&self) -> &str {
            self.name
        }
        fn version(&self) -> u32 {
            0
        }
    }

    #[async_trait]
    impl StandaloneExtractor for Fixed {
        async fn extract(&self, ctx: &ScanContext, _input: &StandaloneInput<'_>) -> anyhow::Result<Inventory> {
            if self.cancel_after {
                ctx.cancel();
            }
            if self.fail {
                anyhow::bail!("command not found");
            }
            Ok(Inventory {
                packages: vec![Package::new(self.name, "1", "generic")],
                ..Default::default()
            })
        }
    }

    fn extractor(name: &'static str, fail: bool, cancel_after: bool) -> Arc<dyn StandaloneExtractor> {
        Arc::new(Fixed {
            name,
            fail,
            cancel_after,
        })
    }

    fn root() -> ScanRoot {
        ScanRoot::virtual_fs(Arc::new(MemFs::new()))
    }

    #[tokio::test]
    async fn test_failure_continues_with_next_extractor() {
        let extractors = vec![extractor("first", true, false), extractor("second", false, false)];
        let (inv, report) = run(&ScanContext::new(), &extractors, &root()).await;

        assert!(report.is_ok());
        assert_eq!(report.statuses.len(), 2);
        assert!(!report.statuses[0].status.is_success());
        assert!(report.statuses[1].status.is_success());
        assert_eq!(inv.packages.len(), 1);
        assert_eq!(inv.packages[0].plugins, vec!["second"]);
    }

    #[tokio::test]
    async fn test_cancellation_stops_remaining_extractors() {
        let extractors = vec![extractor("first", false, true), extractor("second", false, false)];
        let (inv, report) = run(&ScanContext::new(), &extractors, &root()).await;

        assert_eq!(report.statuses.len(), 1);
        assert!(report.errors.iter().any(|e| e.is_cancelled()));
        assert_eq!(inv.packages.len(), 1);
        assert_eq!(inv.packages[0].name, "first");
    }
}
