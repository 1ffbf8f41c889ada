use serde::{Deserialize, Serialize};
use std::fmt;

pub const OCI_SCHEME: &str = "oci://";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum ChartSource {
    /// Chart served from a repository index (`<repo_url>/index.yaml`).
    #[serde(rename_all = "camelCase")]
    Repository { repo_url: String, chart: String },
    /// Chart stored in an OCI registry; `reference` carries no scheme.
    Registry { reference: String },
    /// Chart directory or packaged archive on the local filesystem.
    Local { path: String },
}

/// Resolved, installable reference to a chart. Produced once per install
/// attempt and never mutated afterwards.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChartCoordinate {
    pub source: ChartSource,
    /// `None` means "latest".
    pub version: Option<String>,
}

impl ChartCoordinate {
    pub fn repository(
        repo_url: impl Into<String>,
        chart: impl Into<String>,
        version: Option<String>,
    ) -> Self {
        Self {
            source: ChartSource::Repository {
                repo_url: repo_url.into(),
                chart: chart.into(),
            },
            version,
        }
    }

    pub fn registry(reference: &str, version: Option<String>) -> Self {
        Self {
            source: ChartSource::Registry {
                reference: reference
                    .trim_start_matches(OCI_SCHEME)
                    .trim_end_matches('/')
                    .to_string(),
            },
            version,
        }
    }

    pub fn local(path: impl Into<String>) -> Self {
        Self {
            source: ChartSource::Local { path: path.into() },
            version: None,
        }
    }

    /// Human-readable chart reference, as used in logs and callbacks.
    pub fn chart_ref(&self) -> String {
        match &self.source {
            ChartSource::Repository { repo_url, chart } => {
                format!("{}/{}", repo_url.trim_end_matches('/'), chart)
            }
            ChartSource::Registry { reference } => {
                format!("{OCI_SCHEME}{reference}")
            }
            ChartSource::Local { path } => path.clone(),
        }
    }

    pub fn version_or_latest(&self) -> &str {
        self.version.as_deref().unwrap_or("latest")
    }
}

impl fmt::Display for ChartCoordinate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.chart_ref(), self.version_or_latest())
    }
}

/// Normalize a requested version: empty and `latest` both mean "no pin".
pub fn normalize_version(version: Option<&str>) -> Option<String> {
    match version.map(str::trim) {
        None | Some("") | Some("latest") => None,
        Some(v) => Some(v.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_chart_refs() {
        let repo = ChartCoordinate::repository(
            "https://charts.example.org/",
            "postgresql",
            Some("12.1.0".into()),
        );
        assert_eq!(repo.chart_ref(), "https://charts.example.org/postgresql");
        assert_eq!(repo.to_string(), "https://charts.example.org/postgresql@12.1.0");

        let oci = ChartCoordinate::registry("oci://ghcr.io/acme/jupyter", None);
        assert_eq!(oci.chart_ref(), "oci://ghcr.io/acme/jupyter");
        assert_eq!(oci.version_or_latest(), "latest");
    }

    #[test]
    fn latest_and_empty_versions_are_unpinned() {
        assert_eq!(normalize_version(Some("latest")), None);
        assert_eq!(normalize_version(Some("  ")), None);
        assert_eq!(normalize_version(None), None);
        assert_eq!(normalize_version(Some("1.0.0")), Some("1.0.0".into()));
    }
}
