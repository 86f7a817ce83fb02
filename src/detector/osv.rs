use anyhow::{Context, Result};
use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::debug;

use super::{Detector, Findings};
use crate::cache::RequestCache;
use crate::context::ScanContext;
use crate::extractor::{PackageLockJsonExtractor, RequirementsExtractor};
use crate::fs::ScanRoot;
use crate::model::{PackageVuln, Severity};
use crate::packageindex::PackageIndex;
use crate::plugin::{Capabilities, Network, Plugin};

pub const DEFAULT_API_URL: &str = "https://api.osv.dev";

/// Maximum number of OSV queries in flight at once.
const MAX_CONCURRENT_QUERIES: usize = 8;

/// One OSV lookup: a package version in an ecosystem.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct VulnQuery {
    pub ecosystem: String,
    pub name: String,
    pub version: String,
}

/// OSV responses shared between scans, keyed by query.
pub type VulnCache = RequestCache<VulnQuery, Vec<OsvVuln>>;

/// Looks up known vulnerabilities of npm and PyPI packages on OSV.dev.
pub struct OsvDetector {
    client: reqwest::Client,
    base_url: String,
    cache: Arc<VulnCache>,
}

impl OsvDetector {
    pub const NAME: &'static str = "vulns/osv";

    pub fn new(base_url: impl Into<String>, cache: Arc<VulnCache>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            cache,
        }
    }

    fn get_ecosystem(purl_type: &str) -> Option<&'static str> {
        match purl_type {
            "npm" => Some("npm"),
            "pypi" => Some("PyPI"),
            _ => None,
        }
    }

    async fn query(&self, query: &VulnQuery) -> Result<Vec<OsvVuln>> {
        let body = OsvQuery {
            package: OsvPackage {
                name: &query.name,
                ecosystem: &query.ecosystem,
            },
            version: &query.version,
        };

        let response: OsvQueryResponse = self
            .client
            .post(format!("{}/v1/query", self.base_url))
            .json(&body)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        Ok(response.vulns)
    }
}

#[derive(Serialize)]
struct OsvPackage<'a> {
    name: &'a str,
    ecosystem: &'a str,
}

#[derive(Serialize)]
struct OsvQuery<'a> {
    package: OsvPackage<'a>,
    version: &'a str,
}

#[derive(Deserialize)]
struct OsvQueryResponse {
    #[serde(default)]
    vulns: Vec<OsvVuln>,
}

/// The parts of an OSV vulnerability record the detector reports.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OsvVuln {
    pub id: String,
    #[serde(default)]
    pub summary: Option<String>,
    #[serde(default)]
    pub severity: Vec<OsvSeverity>,
    #[serde(default)]
    pub affected: Vec<OsvAffected>,
    #[serde(default)]
    pub references: Vec<OsvReference>,
    #[serde(default)]
    pub database_specific: Option<OsvDatabaseSpecific>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OsvSeverity {
    #[serde(rename = "type")]
    pub severity_type: Option<String>,
    pub score: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OsvAffected {
    #[serde(default)]
    pub ranges: Vec<OsvRange>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OsvRange {
    #[serde(default)]
    pub events: Vec<OsvEvent>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OsvEvent {
    #[serde(default)]
    pub fixed: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OsvReference {
    pub url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OsvDatabaseSpecific {
    #[serde(default)]
    pub severity: Option<String>,
}

impl Plugin for OsvDetector {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn version(&self) -> u32 {
        0
    }

    fn requirements(&self) -> Capabilities {
        Capabilities {
            network: Network::Online,
            ..Default::default()
        }
    }
}

#[async_trait]
impl Detector for OsvDetector {
    fn required_extractors(&self) -> Vec<String> {
        vec![
            PackageLockJsonExtractor::NAME.to_string(),
            RequirementsExtractor::NAME.to_string(),
        ]
    }

    async fn scan(&self, _ctx: &ScanContext, _root: &ScanRoot, index: &PackageIndex) -> Result<Findings> {
        let queries: BTreeSet<(VulnQuery, String)> = index
            .get_all()
            .into_iter()
            .filter_map(|pkg| {
                let ecosystem = Self::get_ecosystem(&pkg.purl_type)?;
                Some((
                    VulnQuery {
                        ecosystem: ecosystem.to_string(),
                        name: pkg.name.clone(),
                        version: pkg.version.clone(),
                    },
                    pkg.purl_type.clone(),
                ))
            })
            .collect();

        let results: Vec<_> = stream::iter(queries)
            .map(|(query, purl_type)| async move {
                let result = self.cache.get(query.clone(), || self.query(&query)).await;
                (query, purl_type, result)
            })
            .buffered(MAX_CONCURRENT_QUERIES)
            .collect()
            .await;

        let mut findings = Findings::default();
        let mut failed = Vec::new();
        for (query, purl_type, result) in results {
            let vulns = match result {
                Ok(vulns) => vulns,
                Err(e) => {
                    debug!(package = %query.name, version = %query.version, error = %e, "OSV query failed");
                    failed.push((query, e));
                    continue;
                }
            };
            for vuln in vulns {
                findings.package_vulns.push(PackageVuln {
                    severity: parse_severity(&vuln),
                    fixed_version: extract_fixed_version(&vuln),
                    reference_url: vuln.references.iter().find_map(|r| r.url.clone()),
                    summary: vuln
                        .summary
                        .clone()
                        .unwrap_or_else(|| "Unknown vulnerability".to_string()),
                    id: vuln.id,
                    package_name: query.name.clone(),
                    package_version: query.version.clone(),
                    purl_type: purl_type.clone(),
                    plugins: vec![Self::NAME.to_string()],
                    exploitability_signals: Vec::new(),
                });
            }
        }

        if let Some((query, err)) = failed.into_iter().next() {
            return Err(err).with_context(|| {
                format!(
                    "OSV lookup failed for {}/{}@{}",
                    query.ecosystem, query.name, query.version
                )
            });
        }

        Ok(findings)
    }
}

/// Parses CVSS score into a severity level.
///
/// Supports both numeric scores and CVSS vector strings.
pub fn parse_cvss_score(score: &str) -> Severity {
    if let Ok(cvss) = score.parse::<f32>() {
        return match cvss {
            s if s >= 9.0 => Severity::Critical,
            s if s >= 7.0 => Severity::High,
            s if s >= 4.0 => Severity::Medium,
            s if s > 0.0 => Severity::Low,
            _ => Severity::Unknown,
        };
    }

    // Vectors carry no base score; approximate from the impact metrics.
    if score.contains("CVSS:") {
        if score.contains("/C:H") || score.contains("/I:H") || score.contains("/A:H") {
            return Severity::High;
        }
        if score.contains("/C:L") || score.contains("/I:L") || score.contains("/A:L") {
            return Severity::Medium;
        }
        return Severity::Low;
    }

    Severity::Unknown
}

fn parse_severity(vuln: &OsvVuln) -> Severity {
    let from_cvss = vuln
        .severity
        .iter()
        .filter_map(|sev| sev.score.as_deref())
        .map(parse_cvss_score)
        .find(|s| *s != Severity::Unknown);
    if let Some(severity) = from_cvss {
        return severity;
    }

    // GitHub advisories label severity in database_specific.
    match vuln
        .database_specific
        .as_ref()
        .and_then(|d| d.severity.as_deref())
        .map(str::to_ascii_uppercase)
        .as_deref()
    {
        Some("CRITICAL") => Severity::Critical,
        Some("HIGH") => Severity::High,
        Some("MODERATE") | Some("MEDIUM") => Severity::Medium,
        Some("LOW") => Severity::Low,
        _ => Severity::Unknown,
    }
}

fn extract_fixed_version(vuln: &OsvVuln) -> Option<String> {
    vuln.affected.iter().find_map(|affected| {
        affected
            .ranges
            .iter()
            .find_map(|range| range.events.iter().find_map(|event| event.fixed.clone()))
    })
}
