use std::collections::BTreeMap;
use std::sync::Arc;

use super::{validate_requirements, Capabilities, Plugin};
use crate::annotator::{Annotator, CacheDirAnnotator};
use crate::config::Config;
use crate::detector::{Detector, OsvDetector, VulnCache};
use crate::enricher::{Enricher, IgnoreListEnricher};
use crate::error::ScanError;
use crate::extractor::{
    FilesystemExtractor, NpmGlobalExtractor, PackageLockJsonExtractor, RequirementsExtractor, StandaloneExtractor,
};

/// Plugin instances by name, one map per plugin kind.
///
/// Built once at startup and passed to whatever needs to resolve plugin
/// names, such as [`enable_required_extractors`](crate::scanner::enable_required_extractors).
#[derive(Default)]
pub struct PluginRegistry {
    filesystem: BTreeMap<String, Arc<dyn FilesystemExtractor>>,
    standalone: BTreeMap<String, Arc<dyn StandaloneExtractor>>,
    detectors: BTreeMap<String, Arc<dyn Detector>>,
    annotators: BTreeMap<String, Arc<dyn Annotator>>,
    enrichers: BTreeMap<String, Arc<dyn Enricher>>,
}

/// Plugins picked from a registry, grouped by kind.
#[derive(Default, Clone)]
pub struct PluginSelection {
    pub filesystem_extractors: Vec<Arc<dyn FilesystemExtractor>>,
    pub standalone_extractors: Vec<Arc<dyn StandaloneExtractor>>,
    pub detectors: Vec<Arc<dyn Detector>>,
    pub annotators: Vec<Arc<dyn Annotator>>,
    pub enrichers: Vec<Arc<dyn Enricher>>,
}

impl PluginSelection {
    pub fn len(&self) -> usize {
        self.filesystem_extractors.len()
            + self.standalone_extractors.len()
            + self.detectors.len()
            + self.annotators.len()
            + self.enrichers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drops every plugin whose requirements `capabilities` don't satisfy.
    ///
    /// Returns one [`ScanError::UnsatisfiedRequirements`] per dropped plugin.
    pub fn retain_supported(&mut self, capabilities: &Capabilities) -> Vec<ScanError> {
        let mut dropped = Vec::new();
        retain_supported(&mut self.filesystem_extractors, capabilities, &mut dropped);
        retain_supported(&mut self.standalone_extractors, capabilities, &mut dropped);
        retain_supported(&mut self.detectors, capabilities, &mut dropped);
        retain_supported(&mut self.annotators, capabilities, &mut dropped);
        retain_supported(&mut self.enrichers, capabilities, &mut dropped);
        dropped
    }
}

fn retain_supported<T: Plugin + ?Sized>(
    plugins: &mut Vec<Arc<T>>,
    capabilities: &Capabilities,
    dropped: &mut Vec<ScanError>,
) {
    plugins.retain(|p| match validate_requirements(p.as_ref(), capabilities) {
        Ok(()) => true,
        Err(e) => {
            dropped.push(e);
            false
        }
    });
}

/// Summary of a registered plugin, for listings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PluginInfo {
    pub kind: &'static str,
    pub name: String,
    pub version: u32,
    pub requirements: Capabilities,
}

impl PluginInfo {
    fn new<P: Plugin + ?Sized>(kind: &'static str, plugin: &P) -> Self {
        Self {
            kind,
            name: plugin.name().to_string(),
            version: plugin.version(),
            requirements: plugin.requirements(),
        }
    }
}

fn lookup<T: ?Sized>(map: &BTreeMap<String, Arc<T>>, kind: &'static str, name: &str) -> Result<Arc<T>, ScanError> {
    map.get(name).cloned().ok_or_else(|| ScanError::UnknownPlugin {
        kind,
        name: name.to_string(),
    })
}

impl PluginRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding every built-in plugin.
    ///
    /// The OSV detector uses `config.osv_api_url` and shares `vuln_cache`;
    /// the ignore list enricher uses `config.ignore`.
    pub fn builtin(config: &Config, vuln_cache: Arc<VulnCache>) -> Self {
        let mut registry = Self::new();
        registry.register_filesystem(Arc::new(PackageLockJsonExtractor));
        registry.register_filesystem(Arc::new(RequirementsExtractor));
        registry.register_standalone(Arc::new(NpmGlobalExtractor));
        registry.register_detector(Arc::new(OsvDetector::new(config.osv_api_url.clone(), vuln_cache)));
        registry.register_annotator(Arc::new(CacheDirAnnotator));
        registry.register_enricher(Arc::new(IgnoreListEnricher::new(config.ignore.clone())));
        registry
    }

    /// Registers a filesystem extractor, replacing one with the same name.
    pub fn register_filesystem(&mut self, extractor: Arc<dyn FilesystemExtractor>) {
        self.filesystem.insert(extractor.name().to_string(), extractor);
    }

    pub fn register_standalone(&mut self, extractor: Arc<dyn StandaloneExtractor>) {
        self.standalone.insert(extractor.name().to_string(), extractor);
    }

    pub fn register_detector(&mut self, detector: Arc<dyn Detector>) {
        self.detectors.insert(detector.name().to_string(), detector);
    }

    pub fn register_annotator(&mut self, annotator: Arc<dyn Annotator>) {
        self.annotators.insert(annotator.name().to_string(), annotator);
    }

    pub fn register_enricher(&mut self, enricher: Arc<dyn Enricher>) {
        self.enrichers.insert(enricher.name().to_string(), enricher);
    }

    pub fn lookup_filesystem(&self, name: &str) -> Result<Arc<dyn FilesystemExtractor>, ScanError> {
        lookup(&self.filesystem, "filesystem extractor", name)
    }

    pub fn lookup_standalone(&self, name: &str) -> Result<Arc<dyn StandaloneExtractor>, ScanError> {
        lookup(&self.standalone, "standalone extractor", name)
    }

    pub fn lookup_detector(&self, name: &str) -> Result<Arc<dyn Detector>, ScanError> {
        lookup(&self.detectors, "detector", name)
    }

    pub fn lookup_annotator(&self, name: &str) -> Result<Arc<dyn Annotator>, ScanError> {
        lookup(&self.annotators, "annotator", name)
    }

    pub fn lookup_enricher(&self, name: &str) -> Result<Arc<dyn Enricher>, ScanError> {
        lookup(&self.enrichers, "enricher", name)
    }

    /// Resolves plugin names of any kind, keeping their order.
    ///
    /// Duplicate names are selected once. Fails on the first unknown name.
    pub fn select<S: AsRef<str>>(&self, names: &[S]) -> Result<PluginSelection, ScanError> {
        let mut selection = PluginSelection::default();
        let mut seen = std::collections::HashSet::new();

        for name in names {
            let name = name.as_ref();
            if !seen.insert(name) {
                continue;
            }
            if let Some(p) = self.filesystem.get(name) {
                selection.filesystem_extractors.push(p.clone());
            } else if let Some(p) = self.standalone.get(name) {
                selection.standalone_extractors.push(p.clone());
            } else if let Some(p) = self.detectors.get(name) {
                selection.detectors.push(p.clone());
            } else if let Some(p) = self.annotators.get(name) {
                selection.annotators.push(p.clone());
            } else if let Some(p) = self.enrichers.get(name) {
                selection.enrichers.push(p.clone());
            } else {
                return Err(ScanError::UnknownPlugin {
                    kind: "plugin",
                    name: name.to_string(),
                });
            }
        }

        Ok(selection)
    }

    /// Every registered plugin, grouped by kind and sorted by name.
    pub fn list(&self) -> Vec<PluginInfo> {
        let mut infos = Vec::new();
        infos.extend(self.filesystem.values().map(|p| PluginInfo::new("filesystem extractor", p.as_ref())));
        infos.extend(self.standalone.values().map(|p| PluginInfo::new("standalone extractor", p.as_ref())));
        infos.extend(self.detectors.values().map(|p| PluginInfo::new("detector", p.as_ref())));
        infos.extend(self.annotators.values().map(|p| PluginInfo::new("annotator", p.as_ref())));
        infos.extend(self.enrichers.values().map(|p| PluginInfo::new("enricher", p.as_ref())));
        infos
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plugin::Network;

    fn registry() -> PluginRegistry {
        PluginRegistry::builtin(&Config::default(), Arc::default())
    }

    #[test]
    fn test_lookup_by_kind() {
        let registry = registry();
        assert!(registry.lookup_filesystem("python/requirements").is_ok());
        assert!(registry.lookup_standalone("javascript/npmglobal").is_ok());
        assert!(registry.lookup_detector("vulns/osv").is_ok());

        let err = registry.lookup_standalone("python/requirements").err().unwrap();
        assert_eq!(err.to_string(), "no standalone extractor named \"python/requirements\"");
    }

    #[test]
    fn test_select_groups_by_kind() {
        let registry = registry();
        let selection = registry
            .select(&["vulns/osv", "python/requirements", "vex/ignorelist", "python/requirements"])
            .unwrap();
        assert_eq!(selection.len(), 3);
        assert_eq!(selection.filesystem_extractors.len(), 1);
        assert_eq!(selection.detectors.len(), 1);
        assert_eq!(selection.enrichers.len(), 1);
    }

    #[test]
    fn test_select_unknown_name() {
        let err = registry().select(&["nope"]).err().unwrap();
        assert!(matches!(err, ScanError::UnknownPlugin { .. }));
    }

    #[test]
    fn test_default_config_plugins_are_registered() {
        let config = Config::default();
        let selection = registry().select(&config.plugins).unwrap();
        assert_eq!(selection.len(), config.plugins.len());
    }

    #[test]
    fn test_list() {
        let infos = registry().list();
        assert_eq!(infos.len(), 6);
        assert_eq!(infos[0].kind, "filesystem extractor");
        assert_eq!(infos[0].name, "javascript/packagelockjson");
        let npm = infos.iter().find(|i| i.name == "javascript/npmglobal").unwrap();
        assert!(npm.requirements.running_system);
    }

    #[test]
    fn test_register_replaces_same_name() {
        let mut registry = PluginRegistry::new();
        registry.register_filesystem(Arc::new(RequirementsExtractor));
        registry.register_filesystem(Arc::new(RequirementsExtractor));
        assert_eq!(registry.list().len(), 1);
    }

    #[test]
    fn test_retain_supported_drops_network_plugins_offline() {
        let mut selection = registry().select(&Config::default().plugins).unwrap();
        let dropped = selection.retain_supported(&Capabilities::running_system(Network::Offline));

        assert_eq!(dropped.len(), 1);
        assert!(matches!(&dropped[0], ScanError::UnsatisfiedRequirements { plugin, .. } if plugin == "vulns/osv"));
        assert!(selection.detectors.is_empty());
        assert_eq!(selection.filesystem_extractors.len(), 2);
        assert_eq!(selection.enrichers.len(), 1);
    }

    #[test]
    fn test_retain_supported_drops_running_system_plugins_for_images() {
        let mut selection = registry().select(&["javascript/npmglobal", "python/requirements"]).unwrap();
        let dropped = selection.retain_supported(&Capabilities::offline_image(Network::Online));

        assert_eq!(dropped.len(), 1);
        assert!(selection.standalone_extractors.is_empty());
        assert_eq!(selection.len(), 1);
    }
}
