use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum CatalogKind {
    /// Repository-style catalog backed by an `index.yaml`.
    #[serde(rename = "helm")]
    Helm,
    /// Registry-style catalog with a statically configured package list.
    #[serde(rename = "oci")]
    Oci,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub enum CatalogStatus {
    #[default]
    #[serde(rename = "PROD")]
    Prod,
    #[serde(rename = "TEST")]
    Test,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RegistryPackage {
    pub name: String,
    #[serde(default)]
    pub versions: Vec<String>,
}

/// One configured package source. Immutable once loaded.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct CatalogEntry {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: CatalogKind,
    pub location: String,
    #[serde(default)]
    pub name: HashMap<String, String>,
    #[serde(default)]
    pub status: CatalogStatus,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default)]
    pub skip_tls_verify: bool,
    #[serde(default)]
    pub ca_file: Option<String>,
    #[serde(default, alias = "excludedCharts")]
    pub excluded: Vec<String>,
    #[serde(default)]
    pub allow_sharing: bool,
    /// Only meaningful for registry-style catalogs.
    #[serde(default)]
    pub packages: Vec<RegistryPackage>,
}

impl CatalogEntry {
    pub fn is_excluded(&self, package: &str) -> bool {
        self.excluded.iter().any(|p| p == package)
    }

    pub fn find_package(&self, package: &str) -> Option<&RegistryPackage> {
        self.packages.iter().find(|p| p.name == package)
    }

    /// Location without a trailing slash, suitable for joining paths onto.
    pub fn base_location(&self) -> &str {
        self.location.trim_end_matches('/')
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_registry_catalog_from_yaml() {
        let yaml = r#"
- id: ide
  type: oci
  location: oci://ghcr.io/example/charts/
  excludedCharts: [legacy]
  packages:
    - name: jupyter-python
      versions: ["1.2.3", "1.2.4"]
- id: databases
  type: helm
  location: https://charts.example.org
"#;
        let catalogs: Vec<CatalogEntry> = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(catalogs.len(), 2);
        assert_eq!(catalogs[0].kind, CatalogKind::Oci);
        assert!(catalogs[0].is_excluded("legacy"));
        assert_eq!(
            catalogs[0].find_package("jupyter-python").unwrap().versions,
            vec!["1.2.3".to_string(), "1.2.4".to_string()]
        );
        assert_eq!(
            catalogs[0].base_location(),
            "oci://ghcr.io/example/charts"
        );
        assert_eq!(catalogs[1].kind, CatalogKind::Helm);
        assert_eq!(catalogs[1].status, CatalogStatus::Prod);
    }
}
