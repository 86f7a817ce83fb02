//! Lookup index over extracted packages, handed to detectors.

use std::collections::BTreeMap;

use crate::error::ScanError;
use crate::model::Package;

/// Packages grouped by purl type and name.
#[derive(Debug, Default, Clone)]
pub struct PackageIndex {
    by_type: BTreeMap<String, BTreeMap<String, Vec<Package>>>,
}

impl PackageIndex {
    /// Builds the index.
    ///
    /// Fails on packages without a name or purl type, since they can't be
    /// looked up.
    pub fn new(packages: &[Package]) -> Result<Self, ScanError> {
        let mut by_type: BTreeMap<String, BTreeMap<String, Vec<Package>>> = BTreeMap::new();
        for pkg in packages {
            if pkg.name.is_empty() {
                return Err(ScanError::PackageIndex(format!(
                    "package with version {:?} from {:?} has no name",
                    pkg.version, pkg.plugins
                )));
            }
            if pkg.purl_type.is_empty() {
                return Err(ScanError::PackageIndex(format!("package {:?} has no purl type", pkg.name)));
            }
            by_type
                .entry(pkg.purl_type.clone())
                .or_default()
                .entry(pkg.name.clone())
                .or_default()
                .push(pkg.clone());
        }
        Ok(Self { by_type })
    }

    /// Every indexed package, grouped by purl type then name.
    pub fn get_all(&self) -> Vec<&Package> {
        self.by_type.values().flat_map(|names| names.values().flatten()).collect()
    }

    pub fn get_all_of_type(&self, purl_type: &str) -> Vec<&Package> {
        self.by_type
            .get(purl_type)
            .map(|names| names.values().flatten().collect())
            .unwrap_or_default()
    }

    /// All versions of one package.
    pub fn get_specific(&self, name: &str, purl_type: &str) -> &[Package] {
        self.by_type
            .get(purl_type)
            .and_then(|names| names.get(name))
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.by_type.values().flat_map(|names| names.values()).map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
