//! Plugin dependency resolution and requirement checks.

use std::collections::BTreeSet;
use tracing::debug;

use super::ScanConfig;
use crate::error::{ErrorList, ScanError};
use crate::plugin::{validate_requirements, PluginRegistry};

/// Enables the extractors that enabled detectors and enrichers depend on.
///
/// Each required name that isn't enabled yet is looked up in `registry`,
/// first as a filesystem extractor and then as a standalone extractor.
/// Calling this again on the same config changes nothing.
///
/// # Errors
///
/// Returns [`ScanError::RequiredPluginNotFound`] if a required name is in
/// neither registry.
pub fn enable_required_extractors(config: &mut ScanConfig, registry: &PluginRegistry) -> Result<(), ScanError> {
    let required: BTreeSet<String> = config
        .detectors
        .iter()
        .flat_map(|d| d.required_extractors())
        .chain(config.enrichers.iter().flat_map(|e| e.required_plugins()))
        .collect();

    for name in required {
        if config.has_extractor(&name) {
            continue;
        }
        match registry.lookup_filesystem(&name) {
            Ok(extractor) => config.filesystem_extractors.push(extractor),
            Err(filesystem) => match registry.lookup_standalone(&name) {
                Ok(extractor) => config.standalone_extractors.push(extractor),
                Err(standalone) => {
                    return Err(ScanError::RequiredPluginNotFound {
                        name,
                        filesystem: Box::new(filesystem),
                        standalone: Box::new(standalone),
                    })
                }
            },
        }
        debug!(plugin = %name, "enabled required extractor");
    }

    Ok(())
}

/// Checks every enabled plugin against the environment capabilities.
///
/// # Errors
///
/// Returns one error per plugin whose requirements aren't met, joined.
pub fn validate_plugin_requirements(config: &ScanConfig) -> Result<(), ScanError> {
    let caps = &config.capabilities;
    let mut errors = ErrorList::new();

    let results = config
        .filesystem_extractors
        .iter()
        .map(|p| validate_requirements(p.as_ref(), caps))
        .chain(config.standalone_extractors.iter().map(|p| validate_requirements(p.as_ref(), caps)))
        .chain(config.detectors.iter().map(|p| validate_requirements(p.as_ref(), caps)))
        .chain(config.annotators.iter().map(|p| validate_requirements(p.as_ref(), caps)))
        .chain(config.enrichers.iter().map(|p| validate_requirements(p.as_ref(), caps)));

    for result in results {
        if let Err(e) = result {
            errors.push(e);
        }
    }

    errors.into_result()
}
