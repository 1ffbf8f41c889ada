use std::sync::Arc;

use async_trait::async_trait;
use lpad_models::{Event, OperationId, ReleaseMetadata};
use serde_json::{Value, json};
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument, warn};

use crate::errors::{DeployerError, StoreError};
use crate::hub::EventHub;
use crate::installer::{
    InstallCallbacks, InstallContext, InstallRequest, PostInstall,
    ReleaseInstaller,
};
use crate::metadata::ReleaseMetadataStore;
use crate::readiness::ReadinessAggregator;
use crate::resolver::ChartResolver;

#[derive(Debug, Clone)]
pub struct StartRequest {
    pub namespace: String,
    pub release: String,
    pub owner: String,
    pub catalog_id: String,
    pub package: String,
    pub version: Option<String>,
    pub friendly_name: Option<String>,
    pub share: bool,
    pub values: Option<Value>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StartResponse {
    pub operation_id: OperationId,
    pub events_url: String,
}

pub fn events_url(op: &OperationId) -> String {
    format!("/api/v1/events/{op}")
}

/// Hands a successfully installed release to the readiness aggregator and
/// publishes the operation's single `done`.
pub struct ReadinessHandoff {
    readiness: Arc<ReadinessAggregator>,
    hub: Arc<EventHub>,
    cancel: CancellationToken,
}

impl ReadinessHandoff {
    pub fn new(
        readiness: Arc<ReadinessAggregator>,
        hub: Arc<EventHub>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            readiness,
            hub,
            cancel,
        }
    }
}

#[async_trait]
impl PostInstall for ReadinessHandoff {
    async fn after_install(&self, ctx: &InstallContext) {
        let outcome = self
            .readiness
            .watch_until_ready(
                &ctx.operation_id,
                self.cancel.child_token(),
                &ctx.namespace,
                &ctx.release,
            )
            .await;
        let done = match outcome {
            Ok(()) => Event::done_success(json!({
                "status": "deployed",
                "result": {
                    "releaseName": ctx.release,
                    "namespace": ctx.namespace,
                },
            })),
            Err(e) => {
                warn!(op = %ctx.operation_id, error = %e, "release did not become ready");
                Event::done_failure(e.to_string())
            }
        };
        self.hub.publish(&ctx.operation_id, done);
    }
}

/// Resolve, record ownership, install, then watch readiness.
pub struct ServiceLifecycle {
    resolver: Arc<ChartResolver>,
    store: ReleaseMetadataStore,
    installer: Arc<ReleaseInstaller>,
    handoff: Arc<ReadinessHandoff>,
}

impl ServiceLifecycle {
    pub fn new(
        resolver: Arc<ChartResolver>,
        store: ReleaseMetadataStore,
        installer: Arc<ReleaseInstaller>,
        handoff: Arc<ReadinessHandoff>,
    ) -> Self {
        Self {
            resolver,
            store,
            installer,
            handoff,
        }
    }

    #[instrument(skip(self, req), fields(namespace = %req.namespace, release = %req.release))]
    pub async fn start(
        &self,
        req: StartRequest,
    ) -> Result<StartResponse, DeployerError> {
        let op = OperationId::generate();
        let chart = self
            .resolver
            .resolve(&req.catalog_id, &req.package, req.version.as_deref())
            .await?;

        let metadata = ReleaseMetadata {
            release_id: req.release.clone(),
            namespace: req.namespace.clone(),
            owner: req.owner.clone(),
            friendly_name: req
                .friendly_name
                .clone()
                .unwrap_or_else(|| req.release.clone()),
            catalog_id: req.catalog_id.clone(),
            share: req.share,
        };
        self.store.ensure_metadata(&metadata).await?;

        let handoff: Arc<dyn PostInstall> = self.handoff.clone();
        self.installer
            .start_install(
                &op,
                InstallRequest {
                    release: req.release,
                    namespace: req.namespace,
                    chart,
                    values: req.values,
                    post_install: Some(handoff),
                },
                InstallCallbacks::default(),
            )
            .await?;

        info!(op = %op, "install accepted");
        Ok(StartResponse {
            events_url: events_url(&op),
            operation_id: op,
        })
    }

    pub async fn read_record(
        &self,
        namespace: &str,
        release: &str,
    ) -> Result<Option<ReleaseMetadata>, StoreError> {
        self.store.read_metadata(namespace, release).await
    }

    pub async fn delete_record(
        &self,
        namespace: &str,
        release: &str,
    ) -> Result<(), StoreError> {
        self.store.delete(namespace, release).await
    }
}
