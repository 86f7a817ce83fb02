use anyhow::{Context, Result};
use async_trait::async_trait;

use super::{FileApi, FilesystemExtractor, ScanInput};
use crate::context::ScanContext;
use crate::model::{Inventory, Package};
use crate::plugin::Plugin;

/// Extracts pinned PyPI packages from pip requirements files.
pub struct RequirementsExtractor;

impl RequirementsExtractor {
    pub const NAME: &'static str = "python/requirements";
}

impl Plugin for RequirementsExtractor {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn version(&self) -> u32 {
        0
    }
}

/// Parses one requirements line into a name and an exact version.
///
/// Only `name==version` pins are reported; ranges, options and URLs are
/// skipped because they don't identify an installed version.
fn parse_line(line: &str) -> Option<(String, String)> {
    let line = line.split('#').next()?.trim();
    if line.is_empty() || line.starts_with('-') || line.contains("://") {
        return None;
    }
    // Drop environment markers and per-requirement options such as --hash.
    let line = line.split(';').next()?.split(" --").next()?;
    let compact: String = line.split_whitespace().collect();
    let (name, version) = compact.split_once("==")?;
    let name = name.split('[').next()?.trim();
    let version = version.trim();
    if name.is_empty() || version.is_empty() || version.contains(['*', ',']) {
        return None;
    }
    Some((name.to_lowercase().replace('_', "-"), version.to_string()))
}

#[async_trait]
impl FilesystemExtractor for RequirementsExtractor {
    fn file_required(&self, file: &FileApi<'_>) -> bool {
        let name = file.file_name();
        name.starts_with("requirements") && name.ends_with(".txt")
    }

    async fn extract(&self, _ctx: &ScanContext, input: &ScanInput<'_>) -> Result<Inventory> {
        let content = input
            .read_to_string()
            .with_context(|| format!("Failed to read {}", input.path))?;

        let packages = content
            .lines()
            .filter_map(parse_line)
            .map(|(name, version)| Package::new(name, version, "pypi"))
            .collect();

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

    #[test]
    fn test_parse_line() {
        assert_eq!(parse_line("requests==2.31.0"), Some(("requests".to_string(), "2.31.0".to_string())));
        assert_eq!(
            parse_line("Django_Rest[extra] == 3.14.0 ; python_version >= '3.8'"),
            Some(("django-rest".to_string(), "3.14.0".to_string()))
        );
        assert_eq!(
            parse_line("Flask_Cors[async]==4.0.0; python_version >= '3.8'"),
            Some(("flask-cors".to_string(), "4.0.0".to_string()))
        );
        assert_eq!(
            parse_line("urllib3==2.0.7 --hash=sha256:abc"),
            Some(("urllib3".to_string(), "2.0.7".to_string()))
        );
        assert_eq!(parse_line("# comment"), None);
        assert_eq!(parse_line("-r base.txt"), None);
        assert_eq!(parse_line("numpy>=1.20"), None);
        assert_eq!(parse_line("pkg==1.*"), None);
        assert_eq!(parse_line("git+https://github.com/x/y.git"), None);
    }

    #[test]
    fn test_file_required() {
        let e = RequirementsExtractor;
        assert!(e.file_required(&FileApi { path: "requirements.txt", size: 1 }));
        assert!(e.file_required(&FileApi { path: "svc/requirements-dev.txt", size: 1 }));
        assert!(!e.file_required(&FileApi { path: "requirements.in", size: 1 }));
    }

    #[tokio::test]
    async fn test_extract() {
        let content = "requests==2.31.0\n# pinned\nidna==3.4  # transitive\nnumpy>=1.0\n";
        let fs = MemFs::new().with_file("requirements.txt", content);
        let input = ScanInput {
            fs: &fs,
            path: "requirements.txt",
            root: None,
            size: content.len() as u64,
        };
        let inv = RequirementsExtractor.extract(&ScanContext::new(), &input).await.unwrap();
        let names: Vec<&str> = inv.packages.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["requests", "idna"]);
        assert!(inv.packages.iter().all(|p| p.purl_type == "pypi"));
    }
}
