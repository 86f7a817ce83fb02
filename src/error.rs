//! Error types for scan orchestration.
//!
//! [`ScanError`] covers every failure the engine itself can report.
//! Plugins return [`anyhow::Error`]; the engine wraps those into
//! [`ScanError::Plugin`] so the failing plugin is always named.
//! [`ErrorList`] collects several errors from one phase and is reported once.

use std::fmt;
use thiserror::Error;

/// Errors produced while configuring or running a scan.
#[derive(Debug, Error)]
pub enum ScanError {
    /// No scan root was configured.
    #[error("no scan root specified")]
    NoScanRoot,

    /// Specific paths were requested together with several scan roots.
    #[error("can't extract specific files with several scan roots")]
    FilesWithSeveralRoots,

    /// A plugin named as required could not be found in any registry.
    #[error("required plugin {name:?} not present in the registry: {filesystem}, {standalone}")]
    RequiredPluginNotFound {
        /// Name of the missing plugin.
        name: String,
        /// Lookup error from the filesystem extractor registry.
        filesystem: Box<ScanError>,
        /// Lookup error from the standalone extractor registry.
        standalone: Box<ScanError>,
    },

    /// A registry lookup by name failed.
    #[error("no {kind} named {name:?}")]
    UnknownPlugin {
        /// Plugin kind that was searched.
        kind: &'static str,
        /// Name that was not found.
        name: String,
    },

    /// A plugin's declared requirements are not met by the environment.
    #[error("plugin {plugin} can't be enabled: {}", reasons.join(", "))]
    UnsatisfiedRequirements {
        /// Name of the plugin.
        plugin: String,
        /// Every requirement that failed.
        reasons: Vec<String>,
    },

    /// The scan root could not be traversed.
    #[error("failed to walk scan root {root:?}: {source}")]
    Walk {
        /// Root that failed.
        root: String,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The filesystem walk stopped early on a limit or an I/O error.
    #[error("filesystem walk aborted: {0}")]
    WalkAborted(String),

    /// The package index could not be built.
    #[error("failed to build package index: {0}")]
    PackageIndex(String),

    /// A single plugin failed.
    #[error("plugin {name} failed: {source}")]
    Plugin {
        /// Name of the failing plugin.
        name: String,
        /// Error returned by the plugin.
        #[source]
        source: anyhow::Error,
    },

    /// The container image could not provide its chain layers.
    #[error("failed to get chain layers: {0}")]
    ChainLayers(String),

    /// Several errors joined together.
    #[error("{0}")]
    Multiple(ErrorList),

    /// The scan was cancelled.
    #[error("scan was cancelled")]
    Cancelled,

    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ScanError {
    /// Wraps an error returned by a plugin.
    pub fn plugin(name: impl Into<String>, source: anyhow::Error) -> Self {
        ScanError::Plugin {
            name: name.into(),
            source,
        }
    }

    /// Returns true if this error, or any error joined into it, is a cancellation.
    pub fn is_cancelled(&self) -> bool {
        match self {
            ScanError::Cancelled => true,
            ScanError::Multiple(list) => list.iter().any(ScanError::is_cancelled),
            _ => false,
        }
    }
}

/// An ordered collection of errors reported together.
///
/// Displays as the messages of all contained errors separated by newlines.
#[derive(Debug, Default)]
pub struct ErrorList {
    errors: Vec<ScanError>,
}

impl ErrorList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, err: ScanError) {
        match err {
            ScanError::Multiple(list) => self.errors.extend(list.errors),
            other => self.errors.push(other),
        }
    }

    /// Appends every error of `other`.
    pub fn extend(&mut self, other: ErrorList) {
        self.errors.extend(other.errors);
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn len(&self) -> usize {
        self.errors.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ScanError> {
        self.errors.iter()
    }

    /// Collapses the list: `None` when empty, the sole error when there is
    /// one, and [`ScanError::Multiple`] otherwise.
    pub fn into_error(mut self) -> Option<ScanError> {
        match self.errors.len() {
            0 => None,
            1 => self.errors.pop(),
            _ => Some(ScanError::Multiple(self)),
        }
    }

    /// Like [`into_error`](Self::into_error) but as a `Result`.
    pub fn into_result(self) -> Result<(), ScanError> {
        match self.into_error() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

impl fmt::Display for ErrorList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, err) in self.errors.iter().enumerate() {
            if i > 0 {
                writeln!(f)?;
            }
            write!(f, "{}", err)?;
        }
        Ok(())
    }
}

impl From<ScanError> for ErrorList {
    fn from(err: ScanError) -> Self {
        let mut list = ErrorList::new();
        list.push(err);
        list
    }
}

impl FromIterator<ScanError> for ErrorList {
    fn from_iter<I: IntoIterator<Item = ScanError>>(iter: I) -> Self {
        let mut list = ErrorList::new();
        for err in iter {
            list.push(err);
        }
        list
    }
}
