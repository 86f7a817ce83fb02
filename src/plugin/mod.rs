//! Plugin identity, environment capabilities and requirement checks.
//!
//! Every unit of work in a scan is a [`Plugin`]. The kind-specific traits
//! build on it:
//!
//! | Trait | Phase |
//! |-------|-------|
//! | [`FilesystemExtractor`](crate::extractor::FilesystemExtractor) | Filesystem walk |
//! | [`StandaloneExtractor`](crate::extractor::StandaloneExtractor) | Standalone extraction |
//! | [`Detector`](crate::detector::Detector) | Detection |
//! | [`Annotator`](crate::annotator::Annotator) | Annotation |
//! | [`Enricher`](crate::enricher::Enricher) | Enrichment |

mod registry;

pub use registry::{PluginInfo, PluginRegistry, PluginSelection};

use serde::{Deserialize, Serialize};

use crate::error::{ErrorList, ScanError};
use crate::model::{PluginStatus, ScanStatus};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Os {
    #[default]
    Any,
    Linux,
    Windows,
    Mac,
    /// Linux or Mac.
    Unix,
}

impl Os {
    /// The operating system this binary was built for.
    pub fn current() -> Self {
        if cfg!(target_os = "linux") {
            Os::Linux
        } else if cfg!(target_os = "windows") {
            Os::Windows
        } else if cfg!(target_os = "macos") {
            Os::Mac
        } else if cfg!(unix) {
            Os::Unix
        } else {
            Os::Any
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Network {
    #[default]
    Any,
    Offline,
    Online,
}

/// What an environment provides, or what a plugin needs from it.
///
/// The scan environment must satisfy every field a plugin declares; a
/// default-valued field in a requirement places no constraint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Capabilities {
    pub os: Os,
    pub network: Network,
    /// Files can be read directly from a local filesystem.
    pub direct_fs: bool,
    /// The scan runs against the live system rather than an offline copy.
    pub running_system: bool,
    /// Extraction from directories (not only single files) is supported.
    pub extract_from_dirs: bool,
}

impl Capabilities {
    /// Capabilities of a scan of the machine it runs on.
    pub fn running_system(network: Network) -> Self {
        Self {
            os: Os::current(),
            network,
            direct_fs: true,
            running_system: true,
            extract_from_dirs: true,
        }
    }

    /// Capabilities of a scan of an offline copy, e.g. a container image.
    pub fn offline_image(network: Network) -> Self {
        Self {
            os: Os::Linux,
            network,
            direct_fs: false,
            running_system: false,
            extract_from_dirs: true,
        }
    }

    /// Returns a description of every requirement in `required` that these
    /// capabilities don't satisfy.
    pub fn unsatisfied(&self, required: &Capabilities) -> Vec<String> {
        let mut reasons = Vec::new();

        let os_ok = match required.os {
            Os::Any => true,
            Os::Unix => matches!(self.os, Os::Linux | Os::Mac | Os::Unix),
            os => self.os == os,
        };
        if !os_ok {
            reasons.push(format!("needs OS {:?} but scan environment is {:?}", required.os, self.os));
        }

        match (required.network, self.network) {
            (Network::Online, Network::Offline) => reasons.push("needs network access".to_string()),
            (Network::Offline, Network::Online) => reasons.push("must run offline".to_string()),
            _ => {}
        }

        if required.direct_fs && !self.direct_fs {
            reasons.push("needs direct filesystem access".to_string());
        }
        if required.running_system && !self.running_system {
            reasons.push("scan inside a running system required".to_string());
        }
        if required.extract_from_dirs && !self.extract_from_dirs {
            reasons.push("needs directory extraction".to_string());
        }

        reasons
    }
}

/// Identity and requirements shared by every plugin kind.
pub trait Plugin: Send + Sync {
    /// Unique name, e.g. `javascript/packagelockjson`.
    fn name(&self) -> &str;

    fn version(&self) -> u32;

    /// Capabilities the scan environment must provide.
    fn requirements(&self) -> Capabilities {
        Capabilities::default()
    }
}

/// Checks `plugin`'s requirements against the environment `capabilities`.
pub fn validate_requirements<P: Plugin + ?Sized>(plugin: &P, capabilities: &Capabilities) -> Result<(), ScanError> {
    let reasons = capabilities.unsatisfied(&plugin.requirements());
    if reasons.is_empty() {
        Ok(())
    } else {
        Err(ScanError::UnsatisfiedRequirements {
            plugin: plugin.name().to_string(),
            reasons,
        })
    }
}

/// Builds the status entry for one plugin invocation.
pub fn status_from_err<P: Plugin + ?Sized>(plugin: &P, err: Option<&anyhow::Error>) -> PluginStatus {
    PluginStatus {
        name: plugin.name().to_string(),
        version: plugin.version(),
        status: match err {
            Some(e) => ScanStatus::failed(e.to_string()),
            None => ScanStatus::succeeded(),
        },
    }
}

/// Statuses and errors collected while running one phase.
#[derive(Debug, Default)]
pub struct PhaseReport {
    pub statuses: Vec<PluginStatus>,
    pub errors: ErrorList,
}

impl PhaseReport {
    pub fn is_ok(&self) -> bool {
        self.errors.is_empty()
    }
}
