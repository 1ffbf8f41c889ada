use thiserror::Error;

#[derive(Error, Debug)]
pub enum DeployerError {
    #[error("resolve package: {0}")]
    Resolve(#[from] ResolveError),

    #[error("install preflight: {0}")]
    Preflight(#[from] PreflightError),

    #[error("install: {0}")]
    Install(#[from] InstallError),

    #[error("release record: {0}")]
    Store(#[from] StoreError),

    #[error("readiness: {0}")]
    Readiness(#[from] ReadinessError),

    #[error("configuration: {0}")]
    Config(#[from] ConfigError),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ResolveError {
    #[error("catalog {0:?} not found")]
    CatalogNotFound(String),

    #[error("package {package:?} not found in catalog {catalog:?}")]
    PackageNotFound { catalog: String, package: String },

    #[error(
        "version {version:?} not found for package {package:?} in catalog {catalog:?}"
    )]
    VersionNotFound {
        catalog: String,
        package: String,
        version: String,
    },

    #[error("fetching repository index: {0}")]
    IndexFetch(String),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RepoError {
    #[error("request to {url} failed: {reason}")]
    Http { url: String, reason: String },

    #[error("{url} returned status {status}")]
    Status { url: String, status: u16 },

    #[error("parsing repository index: {0}")]
    Parse(String),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PreflightError {
    #[error("invalid release name: {0}")]
    InvalidRelease(String),

    #[error("locating chart {chart:?}: {reason}")]
    ChartLocate { chart: String, reason: String },

    #[error("loading chart: {0}")]
    ChartLoad(String),

    #[error("merging values: {0}")]
    ValuesMerge(String),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum InstallError {
    #[error("install timed out after {0}s")]
    InstallTimeout(u64),

    #[error("install failed: {0}")]
    InstallExecution(String),
}

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("record {name} in {namespace}: conflict retries exhausted")]
    SecretConflict { namespace: String, name: String },

    #[error("record {0} not found")]
    NotFound(String),

    #[error("record {0} already exists")]
    AlreadyExists(String),

    #[error("record {0} was modified concurrently")]
    Conflict(String),

    #[error("record decode: {0}")]
    Decode(#[from] lpad_models::MetadataDecodeError),

    #[error("kubernetes error: {0}")]
    Kube(String),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ReadinessError {
    #[error("watch cache sync failed for {0}")]
    WatchCacheSync(String),

    #[error("timeout or canceled while waiting for readiness: {0}")]
    ReadinessTimeout(String),

    #[error("watch terminated: {0}")]
    Watch(String),
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("environment: {0}")]
    Env(#[from] envconfig::Error),

    #[error("reading catalogs from {path}: {reason}")]
    CatalogFile { path: String, reason: String },

    #[error("parsing catalogs: {0}")]
    CatalogParse(String),

    #[error("duplicate catalog id {0:?}")]
    DuplicateCatalog(String),
}

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Internal server error: {0}")]
    InternalServerError(String),
}

impl From<DeployerError> for ApiError {
    fn from(err: DeployerError) -> Self {
        match err {
            DeployerError::Resolve(ResolveError::IndexFetch(_)) => {
                ApiError::InternalServerError(err.to_string())
            }
            DeployerError::Resolve(_) | DeployerError::Preflight(_) => {
                ApiError::BadRequest(err.to_string())
            }
            _ => ApiError::InternalServerError(err.to_string()),
        }
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        ApiError::InternalServerError(err.to_string())
    }
}

impl axum::response::IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        use axum::{Json, http::StatusCode};
        use serde_json::json;

        let (status, error_message) = match self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, msg),
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            ApiError::InternalServerError(msg) => {
                (StatusCode::INTERNAL_SERVER_ERROR, msg)
            }
        };

        let body = Json(json!({
            "error": error_message,
        }));

        (status, body).into_response()
    }
}
