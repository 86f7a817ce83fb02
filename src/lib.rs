//! Scan orchestration for software inventory and vulnerability detection.
//!
//! A scan runs plugins in phases over one or more scan roots: extractors
//! find packages, detectors report vulnerabilities, annotators and
//! enrichers add exploitability context. See [`scanner`] for the pipeline.

pub mod annotator;
pub mod assemble;
pub mod cache;
pub mod config;
pub mod context;
pub mod detector;
pub mod enricher;
pub mod error;
pub mod extractor;
pub mod fs;
pub mod image;
pub mod model;
pub mod output;
pub mod packageindex;
pub mod platform;
pub mod plugin;
pub mod scanner;

pub use cache::RequestCache;
pub use config::Config;
pub use context::ScanContext;
pub use error::{ErrorList, ScanError};
pub use fs::ScanRoot;
pub use image::{Image, LayeredImage};
pub use model::{Inventory, Package, PackageVuln, ScanResult, ScanStatus};
pub use packageindex::PackageIndex;
pub use scanner::{ScanConfig, Scanner};
