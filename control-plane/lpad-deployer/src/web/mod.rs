pub mod handlers;

use std::{net::SocketAddr, sync::Arc, time::Duration};

use axum::{
    Router,
    http::{HeaderName, Method, header},
    routing::{get, put},
};
use tokio_util::sync::CancellationToken;
use tower::ServiceBuilder;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::info;

use crate::hub::EventHub;
use crate::lifecycle::ServiceLifecycle;
pub use handlers::{AUTH_USER_HEADER, InstallAccepted, InstallBody};

#[derive(Clone)]
pub struct AppState {
    pub lifecycle: Arc<ServiceLifecycle>,
    pub hub: Arc<EventHub>,
    pub heartbeat: Duration,
}

pub struct ApiServer {
    app: Router,
    port: u16,
}

impl ApiServer {
    pub fn new(state: AppState, port: u16) -> Self {
        let app = Router::new()
            .route(
                "/api/v1/namespaces/{namespace}/releases/{release}",
                put(handlers::install_release),
            )
            .route(
                "/api/v1/namespaces/{namespace}/releases/{release}/record",
                get(handlers::get_record).delete(handlers::delete_record),
            )
            .route("/api/v1/events/{op}", get(handlers::stream_events))
            .route("/health", get(health_check))
            .layer(
                ServiceBuilder::new()
                    .layer(TraceLayer::new_for_http())
                    .layer(cors()),
            )
            .with_state(state);

        Self { app, port }
    }

    /// Serve until `shutdown` is cancelled.
    pub async fn serve(self, shutdown: CancellationToken) -> std::io::Result<()> {
        let addr = SocketAddr::from(([0, 0, 0, 0], self.port));
        let listener = tokio::net::TcpListener::bind(addr).await?;

        info!("Deployer API server listening on {}", addr);
        info!("Health check available at: http://{}/health", addr);

        axum::serve(listener, self.app)
            .with_graceful_shutdown(async move { shutdown.cancelled().await })
            .await
    }

    pub fn into_router(self) -> Router {
        self.app
    }
}

/// Browsers follow the event stream and the `Location` of an accepted
/// install from other origins.
fn cors() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::PUT, Method::DELETE])
        .allow_headers([
            header::CONTENT_TYPE,
            HeaderName::from_static(AUTH_USER_HEADER),
        ])
        .expose_headers([header::LOCATION])
}

async fn health_check() -> axum::Json<serde_json::Value> {
    axum::Json(serde_json::json!({
        "status": "healthy",
        "service": "lpad-deployer",
        "version": env!("CARGO_PKG_VERSION"),
        "timestamp": chrono::Utc::now().to_rfc3339()
    }))
}
