use std::fmt;
use std::sync::Arc;

use crate::annotator::Annotator;
use crate::detector::Detector;
use crate::enricher::Enricher;
use crate::extractor::walker::WalkOptions;
use crate::extractor::{FilesystemExtractor, StandaloneExtractor};
use crate::fs::ScanRoot;
use crate::plugin::{Capabilities, PluginSelection};

use super::ScanStats;

/// Everything one scan needs: plugins, environment, roots and walk filters.
///
/// The scanner only appends to the plugin lists (required extractors) and,
/// for container scans, replaces the scan roots.
#[derive(Clone, Default)]
pub struct ScanConfig {
    pub filesystem_extractors: Vec<Arc<dyn FilesystemExtractor>>,
    pub standalone_extractors: Vec<Arc<dyn StandaloneExtractor>>,
    pub detectors: Vec<Arc<dyn Detector>>,
    pub annotators: Vec<Arc<dyn Annotator>>,
    pub enrichers: Vec<Arc<dyn Enricher>>,
    /// What the scan environment provides.
    pub capabilities: Capabilities,
    pub scan_roots: Vec<ScanRoot>,
    pub walk: WalkOptions,
    /// Notified when the scan finishes.
    pub stats: Option<Arc<dyn ScanStats>>,
}

impl ScanConfig {
    pub fn new(capabilities: Capabilities) -> Self {
        Self {
            capabilities,
            ..Default::default()
        }
    }

    pub fn from_selection(selection: PluginSelection, capabilities: Capabilities) -> Self {
        Self {
            filesystem_extractors: selection.filesystem_extractors,
            standalone_extractors: selection.standalone_extractors,
            detectors: selection.detectors,
            annotators: selection.annotators,
            enrichers: selection.enrichers,
            capabilities,
            ..Default::default()
        }
    }

    pub fn with_root(mut self, root: ScanRoot) -> Self {
        self.scan_roots.push(root);
        self
    }

    pub fn with_walk_options(mut self, walk: WalkOptions) -> Self {
        self.walk = walk;
        self
    }

    pub fn with_stats(mut self, stats: Arc<dyn ScanStats>) -> Self {
        self.stats = Some(stats);
        self
    }

    pub fn with_filesystem_extractor(mut self, extractor: Arc<dyn FilesystemExtractor>) -> Self {
        self.filesystem_extractors.push(extractor);
        self
    }

    pub fn with_standalone_extractor(mut self, extractor: Arc<dyn StandaloneExtractor>) -> Self {
        self.standalone_extractors.push(extractor);
        self
    }

    pub fn with_detector(mut self, detector: Arc<dyn Detector>) -> Self {
        self.detectors.push(detector);
        self
    }

    pub fn with_annotator(mut self, annotator: Arc<dyn Annotator>) -> Self {
        self.annotators.push(annotator);
        self
    }

    pub fn with_enricher(mut self, enricher: Arc<dyn Enricher>) -> Self {
        self.enrichers.push(enricher);
        self
    }

    /// Names of every enabled plugin, in phase order.
    pub fn plugin_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = Vec::new();
        names.extend(self.filesystem_extractors.iter().map(|p| p.name()));
        names.extend(self.standalone_extractors.iter().map(|p| p.name()));
        names.extend(self.detectors.iter().map(|p| p.name()));
        names.extend(self.annotators.iter().map(|p| p.name()));
        names.extend(self.enrichers.iter().map(|p| p.name()));
        names
    }

    /// Returns true if a filesystem or standalone extractor named `name` is enabled.
    pub fn has_extractor(&self, name: &str) -> bool {
        self.filesystem_extractors.iter().any(|e| e.name() == name)
            || self.standalone_extractors.iter().any(|e| e.name() == name)
    }
}

impl fmt::Debug for ScanConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names = |plugins: Vec<&str>| plugins.join(", ");
        f.debug_struct("ScanConfig")
            .field(
                "filesystem_extractors",
                &names(self.filesystem_extractors.iter().map(|p| p.name()).collect()),
            )
            .field(
                "standalone_extractors",
                &names(self.standalone_extractors.iter().map(|p| p.name()).collect()),
            )
            .field("detectors", &names(self.detectors.iter().map(|p| p.name()).collect()))
            .field("annotators", &names(self.annotators.iter().map(|p| p.name()).collect()))
            .field("enrichers", &names(self.enrichers.iter().map(|p| p.name()).collect()))
            .field("capabilities", &self.capabilities)
            .field("scan_roots", &self.scan_roots)
            .field("walk", &self.walk)
            .field("stats", &self.stats.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extractor::{NpmGlobalExtractor, RequirementsExtractor};

    #[test]
    fn test_builder() {
        let config = ScanConfig::new(Capabilities::default())
            .with_root(ScanRoot::from_dir("."))
            .with_filesystem_extractor(Arc::new(RequirementsExtractor))
            .with_standalone_extractor(Arc::new(NpmGlobalExtractor));

        assert_eq!(config.scan_roots.len(), 1);
        assert_eq!(config.plugin_names(), vec!["python/requirements", "javascript/npmglobal"]);
        assert!(config.has_extractor("javascript/npmglobal"));
        assert!(!config.has_extractor("vulns/osv"));
        assert!(format!("{:?}", config).contains("python/requirements"));
    }
}
