use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use std::collections::{BTreeMap, HashSet};

use super::{FileApi, FilesystemExtractor, ScanInput};
use crate::context::ScanContext;
use crate::model::{Inventory, Package};
use crate::plugin::Plugin;

/// Extracts npm packages from `package-lock.json` and `npm-shrinkwrap.json`.
pub struct PackageLockJsonExtractor;

impl PackageLockJsonExtractor {
    pub const NAME: &'static str = "javascript/packagelockjson";
}

#[derive(Deserialize)]
struct Lockfile {
    #[serde(default)]
    packages: BTreeMap<String, LockPackage>,
    #[serde(default)]
    dependencies: BTreeMap<String, LockDependency>,
}

#[derive(Deserialize)]
struct LockPackage {
    name: Option<String>,
    version: Option<String>,
    #[serde(default)]
    dev: bool,
    #[serde(default)]
    link: bool,
}

#[derive(Deserialize)]
struct LockDependency {
    version: Option<String>,
    #[serde(default)]
    dev: bool,
    #[serde(default)]
    dependencies: BTreeMap<String, LockDependency>,
}

impl Plugin for PackageLockJsonExtractor {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn version(&self) -> u32 {
        0
    }
}

#[async_trait]
impl FilesystemExtractor for PackageLockJsonExtractor {
    fn file_required(&self, file: &FileApi<'_>) -> bool {
        let name = file.file_name();
        (name == "package-lock.json" || name == "npm-shrinkwrap.json") && !file.path.contains("node_modules/")
    }

    async fn extract(&self, _ctx: &ScanContext, input: &ScanInput<'_>) -> Result<Inventory> {
        let content = input
            .read()
            .with_context(|| format!("Failed to read {}", input.path))?;
        let lockfile: Lockfile =
            serde_json::from_slice(&content).with_context(|| format!("Failed to parse {}", input.path))?;

        let mut seen = HashSet::new();
        let mut packages = Vec::new();
        let mut push = |name: &str, version: &str, dev: bool| {
            if name.is_empty() || version.is_empty() {
                return;
            }
            if !seen.insert((name.to_string(), version.to_string())) {
                return;
            }
            let mut pkg = Package::new(name, version, "npm");
            if dev {
                pkg.metadata = serde_json::json!({ "dev_dependency": true });
            }
            packages.push(pkg);
        };

        if !lockfile.packages.is_empty() {
            // Lockfile v2 and v3.
            for (key, entry) in &lockfile.packages {
                if key.is_empty() || entry.link {
                    continue;
                }
                let Some(version) = &entry.version else {
                    continue;
                };
                let name = match &entry.name {
                    Some(name) => name.as_str(),
                    None => key.rsplit("node_modules/").next().unwrap_or(key),
                };
                push(name, version.as_str(), entry.dev);
            }
        } else {
            // Lockfile v1 nests dependencies recursively.
            let mut stack: Vec<(&String, &LockDependency)> = lockfile.dependencies.iter().collect();
            while let Some((name, dep)) = stack.pop() {
                if let Some(version) = &dep.version {
                    push(name.as_str(), version.as_str(), dep.dev);
                }
                stack.extend(dep.dependencies.iter());
            }
        }

        Ok(Inventory {
            packages,
            ..Default::default()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::MemFs;

    async fn extract(content: &str) -> Result<Inventory> {
        let fs = MemFs::new().with_file("package-lock.json", content);
        let input = ScanInput {
            fs: &fs,
            path: "package-lock.json",
            root: None,
            size: content.len() as u64,
        };
        PackageLockJsonExtractor.extract(&ScanContext::new(), &input).await
    }

    fn name_versions(inv: &Inventory) -> Vec<(String, String)> {
        let mut v: Vec<(String, String)> = inv
            .packages
            .iter()
            .map(|p| (p.name.clone(), p.version.clone()))
            .collect();
        v.sort();
        v
    }

    #[test]
    fn test_file_required() {
        let e = PackageLockJsonExtractor;
        assert!(e.file_required(&FileApi { path: "app/package-lock.json", size: 1 }));
        assert!(e.file_required(&FileApi { path: "npm-shrinkwrap.json", size: 1 }));
        assert!(!e.file_required(&FileApi { path: "app/node_modules/x/package-lock.json", size: 1 }));
        assert!(!e.file_required(&FileApi { path: "package.json", size: 1 }));
    }

    #[tokio::test]
    async fn test_lockfile_v3() {
        let content = r#"{
            "name": "app",
            "lockfileVersion": 3,
            "packages": {
                "": { "name": "app", "version": "1.0.0" },
                "node_modules/lodash": { "version": "4.17.21" },
                "node_modules/@babel/core": { "version": "7.24.0", "dev": true },
                "node_modules/a/node_modules/lodash": { "version": "3.10.1" },
                "packages/local": { "version": "0.0.1", "link": true }
            }
        }"#;
        let inv = extract(content).await.unwrap();
        assert_eq!(
            name_versions(&inv),
            vec![
                ("@babel/core".to_string(), "7.24.0".to_string()),
                ("lodash".to_string(), "3.10.1".to_string()),
                ("lodash".to_string(), "4.17.21".to_string()),
            ]
        );
        let babel = inv.packages.iter().find(|p| p.name == "@babel/core").unwrap();
        assert_eq!(babel.metadata["dev_dependency"], true);
        assert!(inv.packages.iter().all(|p| p.purl_type == "npm"));
    }

    #[tokio::test]
    async fn test_lockfile_v1_nested() {
        let content = r#"{
            "lockfileVersion": 1,
            "dependencies": {
                "express": {
                    "version": "4.18.2",
                    "dependencies": { "debug": { "version": "2.6.9" } }
                },
                "debug": { "version": "4.3.4" }
            }
        }"#;
        let inv = extract(content).await.unwrap();
        assert_eq!(
            name_versions(&inv),
            vec![
                ("debug".to_string(), "2.6.9".to_string()),
                ("debug".to_string(), "4.3.4".to_string()),
                ("express".to_string(), "4.18.2".to_string()),
            ]
        );
    }

    #[tokio::test]
    async fn test_invalid_json() {
        let err = extract("{ not json").await.unwrap_err();
        assert!(err.to_string().contains("Failed to parse"));
    }
}
