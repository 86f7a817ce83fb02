use serde::{Deserialize, Serialize};

use super::ExploitabilitySignal;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Unknown,
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Unknown => "unknown",
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
            Severity::Critical => "critical",
        }
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A known vulnerability affecting a discovered package.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PackageVuln {
    /// Vulnerability identifier, e.g. `GHSA-xxxx-xxxx-xxxx`.
    pub id: String,
    pub package_name: String,
    pub package_version: String,
    pub purl_type: String,
    pub severity: Severity,
    pub summary: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fixed_version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reference_url: Option<String>,
    /// Detectors that reported the vulnerability.
    pub plugins: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub exploitability_signals: Vec<ExploitabilitySignal>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdvisoryId {
    pub publisher: String,
    pub reference: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Advisory {
    pub id: AdvisoryId,
    pub title: String,
    pub description: String,
    pub recommendation: String,
    pub severity: Severity,
}

/// What a generic finding is about, e.g. the address of a weak service.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TargetDetails {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub location: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub extra: String,
}

/// A security finding not tied to a specific package.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenericFinding {
    pub advisory: Advisory,
    #[serde(default)]
    pub target: TargetDetails,
    pub plugins: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub exploitability_signals: Vec<ExploitabilitySignal>,
}
