//! Scan pipeline coordination.
//!
//! A [`Scanner`] runs the phases of a scan in order:
//!
//! | Phase | Runs | On error |
//! |-------|------|----------|
//! | Validate | required extractors, capability checks, root checks | scan fails, nothing extracted |
//! | Filesystem extraction | [`FilesystemExtractor`](crate::extractor::FilesystemExtractor)s over every root | walk failures abort later phases |
//! | Standalone extraction | [`StandaloneExtractor`](crate::extractor::StandaloneExtractor)s on the first root | cancellation aborts |
//! | Indexing | [`PackageIndex`] over the packages found | aborts detection |
//! | Detection | [`Detector`](crate::detector::Detector)s | joined into the failure reason |
//! | Annotation | [`Annotator`](crate::annotator::Annotator)s | joined into the failure reason |
//! | Enrichment | [`Enricher`](crate::enricher::Enricher)s | joined into the failure reason |
//!
//! Inventory collected before an abort is always kept in the result.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use invscan::plugin::{Capabilities, Network, PluginRegistry};
//! use invscan::scanner::{ScanConfig, Scanner};
//! use invscan::{Config, ScanContext, ScanRoot};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let registry = Arc::new(PluginRegistry::builtin(&Config::default(), Arc::default()));
//!     let selection = registry.select(&["python/requirements"])?;
//!     let mut config = ScanConfig::from_selection(selection, Capabilities::running_system(Network::Offline))
//!         .with_root(ScanRoot::from_dir("."));
//!
//!     let result = Scanner::new(registry).scan(&ScanContext::new(), &mut config).await;
//!     println!("{} packages", result.inventory.packages.len());
//!     Ok(())
//! }
//! ```

mod config;
mod resolve;
mod stats;

pub use config::ScanConfig;
pub use resolve::{enable_required_extractors, validate_plugin_requirements};
pub use stats::ScanStats;

use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

use crate::assemble::new_scan_result;
use crate::context::ScanContext;
use crate::error::{ErrorList, ScanError};
use crate::extractor::{standalone, walker};
use crate::fs::ScanRoot;
use crate::image::{populate_layer_details, Image};
use crate::model::{Inventory, PluginStatus, ScanResult};
use crate::packageindex::PackageIndex;
use crate::plugin::{PhaseReport, PluginRegistry};
use crate::{annotator, detector, enricher};

/// Runs scans against filesystems and container images.
///
/// The registry is used to resolve extractors that enabled detectors and
/// enrichers depend on.
#[derive(Clone)]
pub struct Scanner {
    registry: Arc<PluginRegistry>,
}

/// State accumulated across phases.
#[derive(Default)]
struct Outcome {
    inventory: Inventory,
    statuses: Vec<PluginStatus>,
    errors: ErrorList,
    /// Set once a phase failed fatally; later phases are skipped.
    aborted: bool,
}

impl Outcome {
    /// Merges a phase report. Returns true if the phase reported errors.
    fn record(&mut self, report: PhaseReport) -> bool {
        self.statuses.extend(report.statuses);
        let failed = !report.errors.is_empty();
        self.errors.extend(report.errors);
        failed
    }

    fn abort(&mut self, err: ScanError) {
        self.errors.push(err);
        self.aborted = true;
    }

    /// Aborts if the scan has been cancelled since the last check.
    fn checkpoint(&mut self, ctx: &ScanContext) -> bool {
        if self.aborted {
            return false;
        }
        if let Err(e) = ctx.check() {
            // A runner may already have reported the cancellation.
            if !self.errors.iter().any(ScanError::is_cancelled) {
                self.errors.push(e);
            }
            self.aborted = true;
            return false;
        }
        true
    }

    fn finish(self, start_time: DateTime<Utc>, stats: Option<&dyn ScanStats>) -> ScanResult {
        let err = self.errors.into_error();
        let result = new_scan_result(start_time, Utc::now(), self.statuses, self.inventory, err.as_ref());
        if let Some(stats) = stats {
            let runtime = (result.end_time - result.start_time).to_std().unwrap_or_default();
            stats.after_scan(runtime, &result.status);
        }
        if result.status.is_success() {
            info!(
                packages = result.inventory.packages.len(),
                vulns = result.inventory.package_vulns.len(),
                findings = result.inventory.generic_findings.len(),
                "scan succeeded"
            );
        } else {
            warn!(
                reason = %result.status.failure_reason,
                packages = result.inventory.packages.len(),
                "scan failed"
            );
        }
        result
    }
}

impl Scanner {
    pub fn new(registry: Arc<PluginRegistry>) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &PluginRegistry {
        &self.registry
    }

    /// Scans the roots of `config`.
    ///
    /// Never fails outright: configuration problems and phase failures are
    /// reported through the result's status. Extractors required by the
    /// enabled detectors and enrichers are added to `config`.
    #[instrument(skip_all)]
    pub async fn scan(&self, ctx: &ScanContext, config: &mut ScanConfig) -> ScanResult {
        let start = Utc::now();
        let mut outcome = Outcome::default();

        if let Err(e) = self.prepare(config) {
            outcome.errors.push(e);
            return outcome.finish(start, config.stats.as_deref());
        }

        self.run_phases(ctx, config, &mut outcome).await;
        self.enrich(ctx, config, &mut outcome).await;
        outcome.finish(start, config.stats.as_deref())
    }

    /// Scans a container image and attributes each package to the layer
    /// that introduced it.
    ///
    /// Any scan roots in `config` are replaced by the image's filesystem.
    /// Enrichers run only after layer details are set.
    ///
    /// # Errors
    ///
    /// Returns [`ScanError::ChainLayers`] if the image can't provide its
    /// chain layers. Other failures are reported in the result's status.
    #[instrument(skip_all)]
    pub async fn scan_container(
        &self,
        ctx: &ScanContext,
        image: &dyn Image,
        config: &mut ScanConfig,
    ) -> Result<ScanResult, ScanError> {
        let start = Utc::now();

        if !config.scan_roots.is_empty() {
            warn!(roots = config.scan_roots.len(), "overriding scan roots with the image filesystem");
        }
        config.scan_roots = vec![ScanRoot::virtual_fs(image.fs())];

        let chain_layers = image.chain_layers()?;
        debug!(layers = chain_layers.len(), "loaded chain layers");

        let mut outcome = Outcome::default();
        if let Err(e) = self.prepare(config) {
            outcome.errors.push(e);
            return Ok(outcome.finish(start, config.stats.as_deref()));
        }

        self.run_phases(ctx, config, &mut outcome).await;

        if outcome.checkpoint(ctx) {
            populate_layer_details(ctx, &mut outcome.inventory, &chain_layers, &config.filesystem_extractors).await;
            self.enrich(ctx, config, &mut outcome).await;
        }

        Ok(outcome.finish(start, config.stats.as_deref()))
    }

    /// Resolves required extractors and checks the configuration.
    fn prepare(&self, config: &mut ScanConfig) -> Result<(), ScanError> {
        enable_required_extractors(config, &self.registry)?;
        validate_plugin_requirements(config)?;

        if config.scan_roots.is_empty() {
            return Err(ScanError::NoScanRoot);
        }
        if !config.walk.paths_to_extract.is_empty() && config.scan_roots.len() > 1 {
            return Err(ScanError::FilesWithSeveralRoots);
        }

        info!(
            roots = config.scan_roots.len(),
            plugins = %config.plugin_names().join(","),
            "starting scan"
        );
        Ok(())
    }

    /// Extraction, indexing, detection and annotation.
    async fn run_phases(&self, ctx: &ScanContext, config: &ScanConfig, outcome: &mut Outcome) {
        let Some(root) = config.scan_roots.first() else {
            outcome.abort(ScanError::NoScanRoot);
            return;
        };

        let (inventory, report) =
            walker::run(ctx, &config.filesystem_extractors, &config.scan_roots, &config.walk).await;
        outcome.inventory.append(inventory);
        if outcome.record(report) {
            outcome.aborted = true;
            return;
        }

        if !outcome.checkpoint(ctx) {
            return;
        }
        let (inventory, report) = standalone::run(ctx, &config.standalone_extractors, root).await;
        outcome.inventory.append(inventory);
        if outcome.record(report) {
            outcome.aborted = true;
            return;
        }

        if !outcome.checkpoint(ctx) {
            return;
        }
        let index = match PackageIndex::new(&outcome.inventory.packages) {
            Ok(index) => index,
            Err(e) => {
                warn!(error = %e, "skipping detection");
                outcome.abort(e);
                return;
            }
        };
        debug!(packages = index.len(), "built package index");

        let (findings, report) = detector::run(ctx, &config.detectors, root, &index).await;
        outcome.inventory.append(findings);
        outcome.record(report);

        if !outcome.checkpoint(ctx) {
            return;
        }
        let report = annotator::run(ctx, &config.annotators, root, &mut outcome.inventory).await;
        outcome.record(report);
    }

    async fn enrich(&self, ctx: &ScanContext, config: &ScanConfig, outcome: &mut Outcome) {
        let Some(root) = config.scan_roots.first() else {
            return;
        };
        if !outcome.checkpoint(ctx) {
            return;
        }
        let report = enricher::run(ctx, &config.enrichers, root, &mut outcome.inventory).await;
        outcome.record(report);
    }
}
