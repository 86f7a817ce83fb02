//! Hooks for collecting scan statistics.

use std::time::Duration;

use crate::model::ScanStatus;

/// Receives statistics about finished scans, e.g. to export metrics.
pub trait ScanStats: Send + Sync {
    /// Called once per scan after its result is assembled.
    fn after_scan(&self, runtime: Duration, status: &ScanStatus);
}
