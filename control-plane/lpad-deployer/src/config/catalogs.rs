use std::collections::HashSet;
use std::path::Path;

use lpad_models::CatalogEntry;
use tracing::info;

use super::DeployerConfig;
use crate::errors::ConfigError;

/// Load catalogs from `LPAD_CATALOGS_JSON` or, failing that, from
/// `LPAD_CATALOGS_FILE`. No source yields an empty list.
pub fn load_catalogs(
    cfg: &DeployerConfig,
) -> Result<Vec<CatalogEntry>, ConfigError> {
    let catalogs = if let Some(inline) = cfg.catalogs_json.as_deref() {
        serde_json::from_str::<Vec<CatalogEntry>>(inline)
            .map_err(|e| ConfigError::CatalogParse(e.to_string()))?
    } else if let Some(path) = cfg.catalogs_file.as_deref() {
        load_catalog_file(Path::new(path))?
    } else {
        Vec::new()
    };
    reject_duplicates(&catalogs)?;
    info!(count = catalogs.len(), "catalogs loaded");
    Ok(catalogs)
}

/// Parse a catalog file. JSON is a subset of YAML, so one parser covers
/// both formats.
pub fn load_catalog_file(path: &Path) -> Result<Vec<CatalogEntry>, ConfigError> {
    let raw = std::fs::read_to_string(path).map_err(|e| {
        ConfigError::CatalogFile {
            path: path.display().to_string(),
            reason: e.to_string(),
        }
    })?;
    parse_catalogs(&raw)
}

pub fn parse_catalogs(raw: &str) -> Result<Vec<CatalogEntry>, ConfigError> {
    #[derive(serde::Deserialize)]
    #[serde(untagged)]
    enum Document {
        Wrapped { catalogs: Vec<CatalogEntry> },
        List(Vec<CatalogEntry>),
    }

    let doc: Document = serde_yaml::from_str(raw)
        .map_err(|e| ConfigError::CatalogParse(e.to_string()))?;
    Ok(match doc {
        Document::Wrapped { catalogs } => catalogs,
        Document::List(list) => list,
    })
}

fn reject_duplicates(catalogs: &[CatalogEntry]) -> Result<(), ConfigError> {
    let mut seen = HashSet::new();
    for c in catalogs {
        if !seen.insert(c.id.as_str()) {
            return Err(ConfigError::DuplicateCatalog(c.id.clone()));
        }
    }
    Ok(())
}
