use envconfig::Envconfig;
use std::path::PathBuf;
use std::time::Duration;

use crate::errors::ConfigError;
use crate::resolver::ResolvePolicy;

#[derive(Envconfig, Clone, Debug)]
pub struct DeployerConfig {
    #[envconfig(from = "HTTP_PORT", default = "8080")]
    pub http_port: u16,

    /// Catalog definitions (YAML or JSON list of catalogs).
    /// Env: LPAD_CATALOGS_FILE
    #[envconfig(from = "LPAD_CATALOGS_FILE")]
    pub catalogs_file: Option<String>,

    /// Inline catalog definitions; takes precedence over the file.
    /// Env: LPAD_CATALOGS_JSON
    #[envconfig(from = "LPAD_CATALOGS_JSON")]
    pub catalogs_json: Option<String>,

    /// Validate repository-style versions against the index at resolve time.
    #[envconfig(from = "LPAD_RESOLVE_EAGER", default = "false")]
    pub resolve_eager: bool,

    #[envconfig(from = "LPAD_SECRET_RETRY_ATTEMPTS", default = "5")]
    pub secret_retry_attempts: u32,

    #[envconfig(nested)]
    pub hub: HubConfig,

    #[envconfig(nested)]
    pub install: InstallConfig,

    #[envconfig(nested)]
    pub readiness: ReadinessConfig,
}

#[derive(Envconfig, Clone, Debug)]
pub struct HubConfig {
    /// Per-subscriber buffer; events beyond it are dropped for that
    /// subscriber.
    #[envconfig(from = "LPAD_HUB_CAPACITY", default = "16")]
    pub capacity: usize,

    #[envconfig(from = "LPAD_HEARTBEAT_SECS", default = "30")]
    pub heartbeat_secs: u64,

    /// How long a finished operation's `done` is replayed to late subscribers.
    #[envconfig(from = "LPAD_DONE_RETENTION_SECS", default = "600")]
    pub done_retention_secs: u64,
}

#[derive(Envconfig, Clone, Debug)]
pub struct InstallConfig {
    #[envconfig(from = "LPAD_INSTALL_TIMEOUT_SECS", default = "600")]
    pub timeout_secs: u64,

    /// Retry chart location with the latest version when the requested one
    /// is missing from the repository index.
    #[envconfig(from = "LPAD_VERSION_FALLBACK", default = "true")]
    pub version_fallback: bool,

    #[envconfig(from = "LPAD_HELM_BIN", default = "helm")]
    pub helm_bin: String,

    #[envconfig(from = "LPAD_CHART_CACHE_DIR")]
    pub chart_cache_dir: Option<String>,
}

#[derive(Envconfig, Clone, Debug)]
pub struct ReadinessConfig {
    #[envconfig(from = "LPAD_READINESS_TIMEOUT_SECS", default = "1200")]
    pub timeout_secs: u64,

    #[envconfig(from = "LPAD_READINESS_INTERVAL_MS", default = "2000")]
    pub interval_ms: u64,
}

impl DeployerConfig {
    pub fn load_from_env() -> Result<Self, ConfigError> {
        Ok(Self::init_from_env()?)
    }

    pub fn resolve_policy(&self) -> ResolvePolicy {
        if self.resolve_eager {
            ResolvePolicy::Eager
        } else {
            ResolvePolicy::Deferred
        }
    }

    pub fn chart_cache_dir(&self) -> PathBuf {
        self.install
            .chart_cache_dir
            .as_ref()
            .map(PathBuf::from)
            .unwrap_or_else(|| std::env::temp_dir().join("lpad-charts"))
    }
}

impl HubConfig {
    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.heartbeat_secs.max(1))
    }

    pub fn done_retention(&self) -> Duration {
        Duration::from_secs(self.done_retention_secs)
    }
}

impl InstallConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl ReadinessConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms.max(1))
    }
}
