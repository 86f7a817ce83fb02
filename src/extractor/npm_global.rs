use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use std::collections::BTreeMap;
use tokio::process::Command;

use super::{StandaloneExtractor, StandaloneInput};
use crate::context::ScanContext;
use crate::model::{Inventory, Package};
use crate::plugin::{Capabilities, Plugin};

/// Lists globally installed npm packages of the running system.
pub struct NpmGlobalExtractor;

impl NpmGlobalExtractor {
    pub const NAME: &'static str = "javascript/npmglobal";
}

#[derive(Deserialize)]
struct NpmListOutput {
    dependencies: Option<BTreeMap<String, NpmPackage>>,
}

#[derive(Deserialize)]
struct NpmPackage {
    version: Option<String>,
    resolved: Option<String>,
}

fn parse_npm_list(stdout: &str) -> Result<Vec<Package>> {
    let npm_list: NpmListOutput = serde_json::from_str(stdout).context("Failed to parse npm list output")?;

    let mut packages = Vec::new();
    for (name, pkg) in npm_list.dependencies.unwrap_or_default() {
        // Skip npm itself
        if name == "npm" {
            continue;
        }
        let version = pkg.version.unwrap_or_else(|| "unknown".to_string());
        let mut package = Package::new(&name, version, "npm");
        if let Some(resolved) = pkg.resolved {
            package.metadata = serde_json::json!({ "resolved": resolved });
        }
        packages.push(package);
    }
    Ok(packages)
}

impl Plugin for NpmGlobalExtractor {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn version(&self) -> u32 {
        0
    }

    fn requirements(&self) -> Capabilities {
        Capabilities {
            running_system: true,
            ..Default::default()
        }
    }
}

#[async_trait]
impl StandaloneExtractor for NpmGlobalExtractor {
    async fn extract(&self, _ctx: &ScanContext, _input: &StandaloneInput<'_>) -> Result<Inventory> {
        let npm_cmd = if cfg!(target_os = "windows") { "npm.cmd" } else { "npm" };

        let output = Command::new(npm_cmd)
            .args(["list", "-g", "--json", "--depth=0"])
            .output()
            .await
            .context("Failed to execute npm. Is npm installed?")?;

        // npm list exits with 1 on peer dependency problems but still prints valid JSON.
        if !output.status.success() && output.stdout.is_empty() {
            return Ok(Inventory::default());
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        Ok(Inventory {
            packages: parse_npm_list(&stdout)?,
            ..Default::default()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_npm_list() {
        let stdout = r#"{
            "name": "lib",
            "dependencies": {
                "npm": { "version": "10.2.4" },
                "typescript": { "version": "5.3.3", "resolved": "https://registry.npmjs.org/typescript/-/typescript-5.3.3.tgz" },
                "broken": {}
            }
        }"#;
        let packages = parse_npm_list(stdout).unwrap();
        assert_eq!(packages.len(), 2);
        assert_eq!(packages[0].name, "broken");
        assert_eq!(packages[0].version, "unknown");
        assert_eq!(packages[1].name, "typescript");
        assert!(packages[1].metadata["resolved"].as_str().unwrap().ends_with(".tgz"));
    }

    #[test]
    fn test_parse_npm_list_without_dependencies() {
        assert!(parse_npm_list("{}").unwrap().is_empty());
        assert!(parse_npm_list("not json").is_err());
    }

    #[test]
    fn test_requires_running_system() {
        assert!(NpmGlobalExtractor.requirements().running_system);
    }
}
