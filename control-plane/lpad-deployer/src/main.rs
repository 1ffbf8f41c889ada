use anyhow::Result;
use lpad_deployer::{
    chart::{ChartLocator, HttpIndexFetcher},
    config::{DeployerConfig, load_catalogs},
    hub::EventHub,
    installer::{HelmCliEngine, InstallCallbacks, ReleaseInstaller},
    lifecycle::{ReadinessHandoff, ServiceLifecycle},
    metadata::{KubeSecretBackend, ReleaseMetadataStore, RetryPolicy},
    readiness::{KubeWorkloadWatcher, ReadinessAggregator},
    resolver::ChartResolver,
    web::{ApiServer, AppState},
};
use lpad_observability::{TracingConfig, setup_tracing};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    setup_tracing(TracingConfig::from_env("lpad-deployer", "info"))?;

    info!("Loading configuration from environment variables...");
    let config = DeployerConfig::load_from_env()?;
    let catalogs = load_catalogs(&config)?;
    info!(catalogs = catalogs.len(), "catalogs loaded");

    let client = kube::Client::try_default().await?;
    let shutdown = CancellationToken::new();

    let fetcher = Arc::new(HttpIndexFetcher::new(&catalogs));
    let resolver = Arc::new(ChartResolver::new(
        catalogs,
        config.resolve_policy(),
        fetcher.clone(),
    ));
    let locator = ChartLocator::new(
        fetcher,
        config.chart_cache_dir(),
        config.install.helm_bin.clone(),
        config.install.version_fallback,
    );

    let hub = Arc::new(
        EventHub::new(config.hub.capacity).with_retention(config.hub.done_retention()),
    );
    let callbacks = InstallCallbacks::default()
        .on_start(|ctx| {
            info!(op = %ctx.operation_id, release = %ctx.release, chart = %ctx.chart, "install started")
        })
        .on_success(|ctx| {
            info!(op = %ctx.operation_id, release = %ctx.release, "install succeeded")
        })
        .on_error(|ctx, err| {
            warn!(op = %ctx.operation_id, release = %ctx.release, error = %err, "install failed")
        });
    let installer = Arc::new(ReleaseInstaller::new(
        locator,
        Arc::new(HelmCliEngine::new(config.install.helm_bin.clone())),
        hub.clone(),
        callbacks,
        config.install.timeout(),
    ));

    let readiness = Arc::new(ReadinessAggregator::new(
        Arc::new(KubeWorkloadWatcher::new(client.clone())),
        hub.clone(),
        config.readiness.timeout(),
        config.readiness.interval(),
    ));
    let handoff = Arc::new(ReadinessHandoff::new(
        readiness,
        hub.clone(),
        shutdown.clone(),
    ));

    let store = ReleaseMetadataStore::new(
        Arc::new(KubeSecretBackend::new(client)),
        RetryPolicy::with_attempts(config.secret_retry_attempts),
    );
    let lifecycle = Arc::new(ServiceLifecycle::new(
        resolver, store, installer, handoff,
    ));

    let server = ApiServer::new(
        AppState {
            lifecycle,
            hub,
            heartbeat: config.hub.heartbeat_interval(),
        },
        config.http_port,
    );

    let signal = shutdown.clone();
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "failed to listen for shutdown signal");
            return;
        }
        info!("shutdown requested");
        signal.cancel();
    });

    info!("Starting deployer API server...");
    if let Err(e) = server.serve(shutdown).await {
        error!("Server error: {}", e);
        std::process::exit(1);
    }
    Ok(())
}
