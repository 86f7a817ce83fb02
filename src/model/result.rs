use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::Inventory;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Succeeded,
    Failed,
}

/// Outcome of a whole scan or of a single plugin.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanStatus {
    pub status: Status,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub failure_reason: String,
}

impl ScanStatus {
    pub fn succeeded() -> Self {
        Self {
            status: Status::Succeeded,
            failure_reason: String::new(),
        }
    }

    pub fn failed(reason: impl Into<String>) -> Self {
        Self {
            status: Status::Failed,
            failure_reason: reason.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == Status::Succeeded
    }
}

/// Status of one executed plugin.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PluginStatus {
    pub name: String,
    pub version: u32,
    pub status: ScanStatus,
}

/// The terminal artifact of a scan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanResult {
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    /// Version of the scanner that produced the result.
    pub version: String,
    pub status: ScanStatus,
    pub plugin_status: Vec<PluginStatus>,
    pub inventory: Inventory,
}

impl ScanResult {
    /// Statuses of the plugins that failed.
    pub fn failed_plugins(&self) -> impl Iterator<Item = &PluginStatus> {
        self.plugin_status.iter().filter(|s| !s.status.is_success())
    }
}
