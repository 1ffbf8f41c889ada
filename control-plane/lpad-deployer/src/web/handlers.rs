use axum::{
    Json,
    extract::{Path, State},
    http::{HeaderMap, StatusCode, header},
    response::{
        IntoResponse,
        sse::{Event as SseEvent, Sse},
    },
};
use futures_util::{Stream, StreamExt};
use lpad_models::{OperationId, ReleaseMetadata};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{info, warn};

use super::AppState;
use crate::errors::ApiError;
use crate::lifecycle::StartRequest;
use crate::stream;

/// Set by the authenticating proxy in front of the service.
pub const AUTH_USER_HEADER: &str = "x-auth-request-user";

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InstallBody {
    pub catalog_id: String,
    pub package_name: String,
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub friendly_name: Option<String>,
    #[serde(default)]
    pub share: bool,
    #[serde(default)]
    pub values: Option<Value>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InstallAccepted {
    pub operation_id: String,
    pub events_url: String,
}

fn caller(headers: &HeaderMap) -> Result<String, ApiError> {
    headers
        .get(AUTH_USER_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
        .ok_or_else(|| {
            ApiError::Unauthorized(format!("missing {AUTH_USER_HEADER} header"))
        })
}

pub async fn install_release(
    State(state): State<AppState>,
    Path((namespace, release)): Path<(String, String)>,
    headers: HeaderMap,
    Json(body): Json<InstallBody>,
) -> Result<impl IntoResponse, ApiError> {
    let owner = caller(&headers)?;
    info!(
        %namespace, %release, %owner,
        catalog = %body.catalog_id, package = %body.package_name,
        "API: install requested"
    );

    let accepted = state
        .lifecycle
        .start(StartRequest {
            namespace,
            release,
            owner,
            catalog_id: body.catalog_id,
            package: body.package_name,
            version: body.version,
            friendly_name: body.friendly_name,
            share: body.share,
            values: body.values,
        })
        .await
        .map_err(|e| {
            warn!(error = %e, "install rejected");
            ApiError::from(e)
        })?;

    Ok((
        StatusCode::ACCEPTED,
        [(header::LOCATION, accepted.events_url.clone())],
        Json(InstallAccepted {
            operation_id: accepted.operation_id.to_string(),
            events_url: accepted.events_url,
        }),
    ))
}

/// Server-sent events for one operation. Frames are named after the event
/// type and carry its payload as JSON.
pub async fn stream_events(
    State(state): State<AppState>,
    Path(op): Path<String>,
) -> Sse<impl Stream<Item = Result<SseEvent, axum::Error>>> {
    let frames = stream::relay(state.hub.clone(), OperationId::from(op), state.heartbeat)
        .map(|ev| SseEvent::default().event(ev.kind.as_str()).json_data(&ev.data));
    Sse::new(frames)
}

pub async fn get_record(
    State(state): State<AppState>,
    Path((namespace, release)): Path<(String, String)>,
) -> Result<Json<ReleaseMetadata>, ApiError> {
    match state.lifecycle.read_record(&namespace, &release).await? {
        Some(record) => Ok(Json(record)),
        None => Err(ApiError::NotFound(format!(
            "no record for release {release} in {namespace}"
        ))),
    }
}

pub async fn delete_record(
    State(state): State<AppState>,
    Path((namespace, release)): Path<(String, String)>,
) -> Result<StatusCode, ApiError> {
    state.lifecycle.delete_record(&namespace, &release).await?;
    info!(%namespace, %release, "API: record deleted");
    Ok(StatusCode::NO_CONTENT)
}
