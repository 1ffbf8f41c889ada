use std::io::Write;
use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tokio::process::Command;
use tracing::{debug, info};

use crate::errors::InstallError;

#[derive(Debug, Clone)]
pub struct EngineRequest {
    pub release: String,
    pub namespace: String,
    pub chart_path: PathBuf,
    pub values: Value,
    pub timeout: Duration,
}

/// Performs the actual release install.
#[async_trait]
pub trait InstallEngine: Send + Sync {
    async fn install(&self, req: &EngineRequest) -> Result<(), InstallError>;
}

/// Installs through the `helm` binary. The install does not wait for
/// workloads; readiness is observed separately.
#[derive(Debug, Clone)]
pub struct HelmCliEngine {
    helm_bin: String,
}

impl HelmCliEngine {
    pub fn new(helm_bin: impl Into<String>) -> Self {
        Self {
            helm_bin: helm_bin.into(),
        }
    }

    fn args(req: &EngineRequest, values_file: &std::path::Path) -> Vec<String> {
        vec![
            "install".into(),
            req.release.clone(),
            req.chart_path.display().to_string(),
            "--namespace".into(),
            req.namespace.clone(),
            "--values".into(),
            values_file.display().to_string(),
            "--timeout".into(),
            format!("{}s", req.timeout.as_secs().max(1)),
        ]
    }
}

async fn write_values(values: &Value) -> Result<tempfile::NamedTempFile, InstallError> {
    let exec_err = |e: String| InstallError::InstallExecution(format!("writing values: {e}"));
    let yaml = serde_yaml::to_string(values).map_err(|e| exec_err(e.to_string()))?;
    tokio::task::spawn_blocking(move || {
        let mut file = tempfile::Builder::new()
            .prefix("lpad-values-")
            .suffix(".yaml")
            .tempfile()?;
        file.write_all(yaml.as_bytes())?;
        Ok::<_, std::io::Error>(file)
    })
    .await
    .map_err(|e| exec_err(e.to_string()))?
    .map_err(|e| exec_err(e.to_string()))
}

#[async_trait]
impl InstallEngine for HelmCliEngine {
    async fn install(&self, req: &EngineRequest) -> Result<(), InstallError> {
        let values_file = write_values(&req.values).await?;
        let args = Self::args(req, values_file.path());
        debug!(helm = %self.helm_bin, ?args, "running helm");

        let output = Command::new(&self.helm_bin)
            .args(&args)
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| {
                InstallError::InstallExecution(format!(
                    "running {}: {e}",
                    self.helm_bin
                ))
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(InstallError::InstallExecution(stderr.trim().to_string()));
        }
        info!(release = %req.release, namespace = %req.namespace, "helm install finished");
        Ok(())
    }
}
