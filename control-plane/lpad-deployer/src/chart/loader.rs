use std::io::Read;
use std::path::{Component, Path, PathBuf};

use flate2::read::GzDecoder;
use serde::Deserialize;
use serde_json::Value;

use crate::errors::PreflightError;

const CHART_FILE: &str = "Chart.yaml";
const VALUES_FILE: &str = "values.yaml";

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChartMetadata {
    #[serde(default)]
    pub api_version: Option<String>,
    pub name: String,
    pub version: String,
    #[serde(default)]
    pub app_version: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
}

/// A chart that has been read from disk: metadata plus default values.
#[derive(Debug, Clone)]
pub struct LoadedChart {
    pub path: PathBuf,
    pub metadata: ChartMetadata,
    pub default_values: Value,
}

fn load_err(path: &Path, reason: impl std::fmt::Display) -> PreflightError {
    PreflightError::ChartLoad(format!("{}: {reason}", path.display()))
}

/// [`load_chart`] on the blocking pool, for callers on the async runtime.
pub async fn read_chart(path: PathBuf) -> Result<LoadedChart, PreflightError> {
    let shown = path.clone();
    tokio::task::spawn_blocking(move || load_chart(&path))
        .await
        .map_err(|e| load_err(&shown, e))?
}

/// Load a chart from an unpacked directory or a packaged `.tgz` archive.
pub fn load_chart(path: &Path) -> Result<LoadedChart, PreflightError> {
    let meta = std::fs::metadata(path).map_err(|e| load_err(path, e))?;
    let (chart_raw, values_raw) = if meta.is_dir() {
        read_dir_chart(path)?
    } else {
        read_archive_chart(path)?
    };

    let metadata: ChartMetadata = serde_yaml::from_str(&chart_raw)
        .map_err(|e| load_err(path, format!("invalid {CHART_FILE}: {e}")))?;
    let default_values = match values_raw {
        Some(raw) if !raw.trim().is_empty() => {
            serde_yaml::from_str::<Value>(&raw).map_err(|e| {
                load_err(path, format!("invalid {VALUES_FILE}: {e}"))
            })?
        }
        _ => Value::Object(Default::default()),
    };
    if !default_values.is_object() {
        return Err(load_err(path, format!("{VALUES_FILE} is not a map")));
    }

    Ok(LoadedChart {
        path: path.to_path_buf(),
        metadata,
        default_values,
    })
}

fn read_dir_chart(
    dir: &Path,
) -> Result<(String, Option<String>), PreflightError> {
    let chart_path = dir.join(CHART_FILE);
    let chart = std::fs::read_to_string(&chart_path)
        .map_err(|e| load_err(&chart_path, e))?;
    let values = match std::fs::read_to_string(dir.join(VALUES_FILE)) {
        Ok(v) => Some(v),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => None,
        Err(e) => return Err(load_err(&dir.join(VALUES_FILE), e)),
    };
    Ok((chart, values))
}

/// Packaged charts hold a single top-level directory; only its own
/// `Chart.yaml` and `values.yaml` count, not those of bundled subcharts.
fn read_archive_chart(
    archive_path: &Path,
) -> Result<(String, Option<String>), PreflightError> {
    let file =
        std::fs::File::open(archive_path).map_err(|e| load_err(archive_path, e))?;
    let mut archive = tar::Archive::new(GzDecoder::new(file));
    let entries = archive.entries().map_err(|e| load_err(archive_path, e))?;

    let mut chart = None;
    let mut values = None;
    for entry in entries {
        let mut entry = entry.map_err(|e| load_err(archive_path, e))?;
        let entry_path =
            entry.path().map_err(|e| load_err(archive_path, e))?.into_owned();
        let parts: Vec<_> = entry_path
            .components()
            .filter_map(|c| match c {
                Component::Normal(p) => Some(p.to_string_lossy().into_owned()),
                _ => None,
            })
            .collect();
        if parts.len() != 2 {
            continue;
        }
        let slot = match parts[1].as_str() {
            CHART_FILE => &mut chart,
            VALUES_FILE => &mut values,
            _ => continue,
        };
        let mut buf = String::new();
        entry
            .read_to_string(&mut buf)
            .map_err(|e| load_err(archive_path, e))?;
        *slot = Some(buf);
    }

    let chart = chart.ok_or_else(|| {
        load_err(archive_path, format!("archive has no {CHART_FILE}"))
    })?;
    Ok((chart, values))
}

#[cfg(test)]
pub(crate) mod fixtures {
    use std::path::{Path, PathBuf};

    pub const CHART_YAML: &str =
        "apiVersion: v2\nname: demo\nversion: 0.3.1\nappVersion: \"1.2\"\n";
    pub const VALUES_YAML: &str = "replicaCount: 1\nimage:\n  tag: stable\n";

    pub fn chart_dir(root: &Path) -> PathBuf {
        let dir = root.join("demo");
        std::fs::create_dir_all(dir.join("templates")).unwrap();
        std::fs::write(dir.join("Chart.yaml"), CHART_YAML).unwrap();
        std::fs::write(dir.join("values.yaml"), VALUES_YAML).unwrap();
        dir
    }

    pub fn chart_archive_bytes() -> Vec<u8> {
        let mut builder = tar::Builder::new(flate2::write::GzEncoder::new(
            Vec::new(),
            flate2::Compression::default(),
        ));
        for (name, body) in [
            ("demo/Chart.yaml", CHART_YAML),
            ("demo/values.yaml", VALUES_YAML),
            ("demo/charts/sub/Chart.yaml", "name: sub\nversion: 9.9.9\n"),
        ] {
            let mut header = tar::Header::new_gnu();
            header.set_size(body.len() as u64);
            header.set_mode(0o644);
            header.set_cksum();
            builder.append_data(&mut header, name, body.as_bytes()).unwrap();
        }
        builder.into_inner().unwrap().finish().unwrap()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn loads_chart_directory() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = fixtures::chart_dir(tmp.path());
        let chart = load_chart(&dir).unwrap();
        assert_eq!(chart.metadata.name, "demo");
        assert_eq!(chart.default_values["image"]["tag"], "stable");
    }

    #[test]
    fn loads_packaged_chart_ignoring_subcharts() {
        let tmp = tempfile::tempdir().unwrap();
        let archive = tmp.path().join("demo-0.3.1.tgz");
        std::fs::write(&archive, fixtures::chart_archive_bytes()).unwrap();
        let chart = load_chart(&archive).unwrap();
        assert_eq!(chart.metadata.version, "0.3.1");
        assert_eq!(chart.default_values["replicaCount"], 1);
    }

    #[tokio::test]
    async fn reads_archive_off_the_runtime() {
        let tmp = tempfile::tempdir().unwrap();
        let archive = tmp.path().join("demo-0.3.1.tgz");
        std::fs::write(&archive, fixtures::chart_archive_bytes()).unwrap();
        let chart = read_chart(archive.clone()).await.unwrap();
        assert_eq!(chart.path, archive);
        assert_eq!(chart.metadata.name, "demo");

        let err = read_chart(tmp.path().join("absent.tgz")).await.unwrap_err();
        assert!(matches!(err, PreflightError::ChartLoad(_)));
    }

    #[test]
    fn missing_directory_is_a_load_error() {
        let err = load_chart(Path::new("/definitely/not/here")).unwrap_err();
        assert!(err.to_string().contains("loading chart"));
    }

    #[test]
    fn values_file_is_optional() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(tmp.path().join("Chart.yaml"), fixtures::CHART_YAML)
            .unwrap();
        let chart = load_chart(tmp.path()).unwrap();
        assert!(chart.default_values.as_object().unwrap().is_empty());
    }
}
