use serde::{Deserialize, Serialize};

/// Reason a package or finding is considered not exploitable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Justification {
    Unspecified,
    ComponentNotPresent,
    VulnerableCodeNotPresent,
    VulnerableCodeNotInExecutePath,
    VulnerableCodeCannotBeControlledByAdversary,
    InlineMitigationsAlreadyExist,
}

/// Exploitability context appended by annotators and enrichers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExploitabilitySignal {
    /// Plugin that produced the signal.
    pub plugin: String,
    pub justification: Justification,
    /// Applies to every vulnerability of the package.
    #[serde(default)]
    pub matches_all_vulns: bool,
    /// Applies only to these vulnerability IDs.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub vuln_identifiers: Vec<String>,
}

impl ExploitabilitySignal {
    pub fn for_all_vulns(plugin: impl Into<String>, justification: Justification) -> Self {
        Self {
            plugin: plugin.into(),
            justification,
            matches_all_vulns: true,
            vuln_identifiers: Vec::new(),
        }
    }
}

/// Container image layer that introduced a package.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LayerDetails {
    /// Position of the layer in the image, starting at 0.
    pub index: usize,
    pub diff_id: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub command: String,
    pub in_base_image: bool,
}

/// A software package discovered by an extractor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Package {
    pub name: String,
    pub version: String,
    /// Package URL type, e.g. `npm` or `pypi`.
    pub purl_type: String,
    /// Files the package was found in.
    pub locations: Vec<String>,
    /// Names of the plugins that reported the package.
    pub plugins: Vec<String>,
    #[serde(default, skip_serializing_if = "serde_json::Value::is_null")]
    pub metadata: serde_json::Value,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub exploitability_signals: Vec<ExploitabilitySignal>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub layer_details: Option<LayerDetails>,
}

impl Package {
    pub fn new(name: impl Into<String>, version: impl Into<String>, purl_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
            purl_type: purl_type.into(),
            locations: Vec::new(),
            plugins: Vec::new(),
            metadata: serde_json::Value::Null,
            exploitability_signals: Vec::new(),
            layer_details: None,
        }
    }

    pub fn with_location(mut self, location: impl Into<String>) -> Self {
        self.locations.push(location.into());
        self
    }

    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = metadata;
        self
    }

    /// Records `plugin` as a source of this package unless already listed.
    pub fn add_plugin(&mut self, plugin: &str) {
        if !self.plugins.iter().any(|p| p == plugin) {
            self.plugins.push(plugin.to_string());
        }
    }

    /// Package URL without qualifiers, e.g. `pkg:npm/lodash@4.17.21`.
    pub fn purl(&self) -> String {
        format!("pkg:{}/{}@{}", self.purl_type, self.name, self.version)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_plugin_is_deduplicated() {
        let mut pkg = Package::new("lodash", "4.17.21", "npm");
        pkg.add_plugin("javascript/packagelockjson");
        pkg.add_plugin("javascript/packagelockjson");
        assert_eq!(pkg.plugins, vec!["javascript/packagelockjson"]);
    }

    #[test]
    fn test_purl() {
        let pkg = Package::new("requests", "2.31.0", "pypi");
        assert_eq!(pkg.purl(), "pkg:pypi/requests@2.31.0");
    }

    #[test]
    fn test_serialization_skips_empty_fields() {
        let pkg = Package::new("lodash", "4.17.21", "npm").with_location("package-lock.json");
        let json = serde_json::to_value(&pkg).unwrap();
        assert!(json.get("metadata").is_none());
        assert!(json.get("layer_details").is_none());
        assert!(json.get("exploitability_signals").is_none());
        assert_eq!(json["locations"][0], "package-lock.json");
    }
}
