use anyhow::Result;
use async_trait::async_trait;

use super::Annotator;
use crate::context::ScanContext;
use crate::fs::{clean_path, ScanRoot};
use crate::model::{ExploitabilitySignal, Inventory, Justification};
use crate::plugin::Plugin;

/// Directory sequences that only hold package manager caches or scratch files.
const CACHE_DIRS: &[&[&str]] = &[
    &[".cache"],
    &[".npm", "_cacache"],
    &[".yarn", "cache"],
    &["var", "cache"],
    &["tmp"],
    &["Library", "Caches"],
    &["AppData", "Local", "Temp"],
];

/// Flags packages found only inside cache directories as not installed.
pub struct CacheDirAnnotator;

impl CacheDirAnnotator {
    pub const NAME: &'static str = "vex/cachedir";
}

fn is_cache_location(location: &str) -> bool {
    let cleaned = clean_path(location);
    let parts: Vec<&str> = cleaned.split('/').collect();
    // The last component is the file itself.
    let dirs = &parts[..parts.len().saturating_sub(1)];
    CACHE_DIRS
        .iter()
        .any(|seq| dirs.windows(seq.len()).any(|w| w == *seq))
}

impl Plugin for CacheDirAnnotator {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn version(&self) -> u32 {
        0
    }
}

#[async_trait]
impl Annotator for CacheDirAnnotator {
    async fn annotate(&self, _ctx: &ScanContext, _root: &ScanRoot, inventory: &mut Inventory) -> Result<()> {
        for pkg in &mut inventory.packages {
            if pkg.locations.is_empty() || !pkg.locations.iter().all(|l| is_cache_location(l)) {
                continue;
            }
            if pkg.exploitability_signals.iter().any(|s| s.plugin == Self::NAME) {
                continue;
            }
            pkg.exploitability_signals.push(ExploitabilitySignal::for_all_vulns(
                Self::NAME,
                Justification::ComponentNotPresent,
            ));
        }
        Ok(())
    }
}
