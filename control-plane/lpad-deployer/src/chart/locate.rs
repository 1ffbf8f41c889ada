use std::hash::{DefaultHasher, Hash, Hasher};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use lpad_models::{ChartCoordinate, ChartSource, Event, OCI_SCHEME};
use serde_json::json;
use tempfile::TempDir;
use tokio::process::Command;
use tracing::{debug, info, instrument, warn};

use super::index::IndexFetcher;
use crate::errors::PreflightError;

/// A chart found on the local filesystem, ready to be loaded.
#[derive(Debug)]
pub struct LocatedChart {
    pub path: PathBuf,
    /// Version actually located; differs from the request after a fallback.
    pub version: Option<String>,
    /// Status events gathered while locating, published once the install
    /// has started.
    pub notices: Vec<Event>,
    /// Keeps a pulled OCI chart alive until the install is done with it.
    _scratch: Option<TempDir>,
}

impl LocatedChart {
    fn at(path: PathBuf, version: Option<String>) -> Self {
        Self {
            path,
            version,
            notices: Vec::new(),
            _scratch: None,
        }
    }
}

#[derive(Clone)]
pub struct ChartLocator {
    fetcher: Arc<dyn IndexFetcher>,
    cache_dir: PathBuf,
    helm_bin: String,
    version_fallback: bool,
}

impl ChartLocator {
    pub fn new(
        fetcher: Arc<dyn IndexFetcher>,
        cache_dir: impl Into<PathBuf>,
        helm_bin: impl Into<String>,
        version_fallback: bool,
    ) -> Self {
        Self {
            fetcher,
            cache_dir: cache_dir.into(),
            helm_bin: helm_bin.into(),
            version_fallback,
        }
    }

    #[instrument(skip(self), fields(chart = %coord))]
    pub async fn locate(
        &self,
        coord: &ChartCoordinate,
    ) -> Result<LocatedChart, PreflightError> {
        match &coord.source {
            ChartSource::Local { path } => {
                Ok(LocatedChart::at(PathBuf::from(path), coord.version.clone()))
            }
            ChartSource::Repository { repo_url, chart } => {
                self.locate_in_repository(coord, repo_url, chart).await
            }
            ChartSource::Registry { reference } => {
                self.pull_from_registry(coord, reference).await
            }
        }
    }

    async fn locate_in_repository(
        &self,
        coord: &ChartCoordinate,
        repo_url: &str,
        chart: &str,
    ) -> Result<LocatedChart, PreflightError> {
        let locate_err = |reason: String| PreflightError::ChartLocate {
            chart: coord.chart_ref(),
            reason,
        };

        let index = self
            .fetcher
            .fetch_index(repo_url)
            .await
            .map_err(|e| locate_err(e.to_string()))?;
        if !index.has_chart(chart) {
            return Err(locate_err(format!("chart {chart} not in repository")));
        }

        let mut notices = Vec::new();
        let entry = match coord.version.as_deref() {
            None => index.latest(chart),
            Some(requested) => match index.find(chart, requested) {
                Some(found) => Some(found),
                None if self.version_fallback => {
                    let latest = index.latest(chart);
                    let fallback = latest.map(|c| c.version.as_str()).unwrap_or("");
                    warn!(
                        requested,
                        fallback, "requested version missing; retrying with latest"
                    );
                    notices.push(Event::status(json!({
                        "status": "retrying-locate",
                        "requestedVersion": requested,
                        "version": fallback,
                        "reason": format!("version {requested} not found"),
                    })));
                    latest
                }
                None => {
                    return Err(locate_err(format!(
                        "version {requested} not found"
                    )));
                }
            },
        }
        .ok_or_else(|| locate_err(format!("no versions of {chart} published")))?;

        let url = entry
            .archive_url(repo_url)
            .ok_or_else(|| locate_err(format!("{chart}-{} has no archive url", entry.version)))?;
        let repo_dir = self.cache_dir.join(repository_key(repo_url));
        let target = repo_dir.join(format!("{}-{}.tgz", entry.name, entry.version));

        if tokio::fs::try_exists(&target).await.unwrap_or(false) {
            debug!(path = %target.display(), "chart archive cached");
        } else {
            let bytes = self
                .fetcher
                .fetch_archive(repo_url, &url)
                .await
                .map_err(|e| locate_err(e.to_string()))?;
            write_atomic(&repo_dir, &target, bytes)
                .await
                .map_err(|e| locate_err(format!("caching archive: {e}")))?;
            info!(path = %target.display(), "chart archive downloaded");
        }

        let mut located = LocatedChart::at(target, Some(entry.version.clone()));
        located.notices = notices;
        Ok(located)
    }

    async fn pull_from_registry(
        &self,
        coord: &ChartCoordinate,
        reference: &str,
    ) -> Result<LocatedChart, PreflightError> {
        let locate_err = |reason: String| PreflightError::ChartLocate {
            chart: coord.chart_ref(),
            reason,
        };

        tokio::fs::create_dir_all(&self.cache_dir)
            .await
            .map_err(|e| locate_err(e.to_string()))?;
        let scratch = tempfile::Builder::new()
            .prefix("oci-")
            .tempdir_in(&self.cache_dir)
            .map_err(|e| locate_err(e.to_string()))?;

        let mut cmd = Command::new(&self.helm_bin);
        cmd.arg("pull")
            .arg(format!("{OCI_SCHEME}{reference}"))
            .arg("--destination")
            .arg(scratch.path());
        if let Some(v) = coord.version.as_deref() {
            cmd.arg("--version").arg(v);
        }
        let output = cmd
            .output()
            .await
            .map_err(|e| locate_err(format!("running {}: {e}", self.helm_bin)))?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(locate_err(format!("helm pull failed: {}", stderr.trim())));
        }

        let archive = find_archive(scratch.path())
            .await
            .ok_or_else(|| locate_err("helm pull produced no archive".into()))?;
        Ok(LocatedChart {
            path: archive,
            version: coord.version.clone(),
            notices: Vec::new(),
            _scratch: Some(scratch),
        })
    }
}

/// Cache subdirectory for one repository, so equal chart names published by
/// different repositories never share an archive.
fn repository_key(repo_url: &str) -> String {
    let trimmed = repo_url.trim_end_matches('/');
    let mut hasher = DefaultHasher::new();
    trimmed.hash(&mut hasher);
    let host: String = reqwest::Url::parse(trimmed)
        .ok()
        .and_then(|u| u.host_str().map(str::to_owned))
        .unwrap_or_default()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '.' { c } else { '_' })
        .collect();
    format!("{host}-{:016x}", hasher.finish())
}

/// Each writer gets its own temp file in `dir`; the rename is atomic, so
/// concurrent downloads of one archive leave a complete file either way.
async fn write_atomic(dir: &Path, target: &Path, bytes: Vec<u8>) -> std::io::Result<()> {
    let dir = dir.to_path_buf();
    let target = target.to_path_buf();
    tokio::task::spawn_blocking(move || {
        std::fs::create_dir_all(&dir)?;
        let mut tmp = tempfile::NamedTempFile::new_in(&dir)?;
        tmp.write_all(&bytes)?;
        tmp.as_file().sync_all()?;
        tmp.persist(&target).map_err(|e| e.error)?;
        Ok::<_, std::io::Error>(())
    })
    .await
    .map_err(std::io::Error::other)?
}

async fn find_archive(dir: &Path) -> Option<PathBuf> {
    let mut entries = tokio::fs::read_dir(dir).await.ok()?;
    while let Ok(Some(entry)) = entries.next_entry().await {
        let path = entry.path();
        if path.extension().is_some_and(|ext| ext == "tgz") {
            return Some(path);
        }
    }
    None
}
