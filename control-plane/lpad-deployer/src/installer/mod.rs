//! Release installer: synchronous preflight, then an asynchronous install
//! whose progress is published on the operation's hub channel.

pub mod callbacks;
pub mod engine;

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use lpad_models::{ChartCoordinate, Event, OperationId};
use serde_json::{Value, json};
use tracing::{Instrument, debug, error, info, info_span, instrument, warn};

pub use callbacks::{InstallCallbacks, InstallContext, PostInstall};
pub use engine::{EngineRequest, HelmCliEngine, InstallEngine};

use crate::chart::{ChartLocator, LocatedChart, merge_values, read_chart};
use crate::errors::{InstallError, PreflightError};
use crate::hub::EventHub;

/// Helm caps release names at 53 characters.
const MAX_RELEASE_LEN: usize = 53;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstallPhase {
    Pending,
    Preflight,
    PreflightFailed,
    Submitted,
    Installing,
    Installed,
    InstallFailed,
}

impl fmt::Display for InstallPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            InstallPhase::Pending => "pending",
            InstallPhase::Preflight => "preflight",
            InstallPhase::PreflightFailed => "preflight-failed",
            InstallPhase::Submitted => "submitted",
            InstallPhase::Installing => "installing",
            InstallPhase::Installed => "installed",
            InstallPhase::InstallFailed => "install-failed",
        };
        f.write_str(s)
    }
}

#[derive(Clone)]
pub struct InstallRequest {
    pub release: String,
    pub namespace: String,
    pub chart: ChartCoordinate,
    pub values: Option<Value>,
    /// Takes over after a successful install and owns the `done` event.
    pub post_install: Option<Arc<dyn PostInstall>>,
}

impl fmt::Debug for InstallRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InstallRequest")
            .field("release", &self.release)
            .field("namespace", &self.namespace)
            .field("chart", &self.chart.to_string())
            .field("post_install", &self.post_install.is_some())
            .finish()
    }
}

pub struct ReleaseInstaller {
    locator: ChartLocator,
    engine: Arc<dyn InstallEngine>,
    hub: Arc<EventHub>,
    callbacks: InstallCallbacks,
    install_timeout: Duration,
}

/// Everything the spawned execution needs, gathered during preflight.
struct Prepared {
    ctx: InstallContext,
    located: LocatedChart,
    values: Value,
}

impl ReleaseInstaller {
    pub fn new(
        locator: ChartLocator,
        engine: Arc<dyn InstallEngine>,
        hub: Arc<EventHub>,
        callbacks: InstallCallbacks,
        install_timeout: Duration,
    ) -> Self {
        Self {
            locator,
            engine,
            hub,
            callbacks,
            install_timeout,
        }
    }

    /// Run preflight and, when it passes, start the install in the
    /// background.
    ///
    /// A preflight error is returned directly: no callback fires and
    /// nothing is published for the operation.
    #[instrument(skip(self, op, req, per_call), fields(op = %op, release = %req.release))]
    pub async fn start_install(
        &self,
        op: &OperationId,
        req: InstallRequest,
        per_call: InstallCallbacks,
    ) -> Result<(), PreflightError> {
        debug!(phase = %InstallPhase::Pending, chart = %req.chart, "install requested");
        let prepared = match self.preflight(op, &req).await {
            Ok(p) => p,
            Err(e) => {
                warn!(phase = %InstallPhase::PreflightFailed, error = %e, "preflight failed");
                return Err(e);
            }
        };
        info!(phase = %InstallPhase::Submitted, chart = %prepared.ctx.chart, "install submitted");

        let execution = Execution {
            hub: self.hub.clone(),
            engine: self.engine.clone(),
            global: self.callbacks.clone(),
            per_call,
            post_install: req.post_install,
            timeout: self.install_timeout,
        };
        let span = info_span!("install", op = %op, release = %prepared.ctx.release);
        tokio::spawn(execution.run(prepared).instrument(span));
        Ok(())
    }

    async fn preflight(
        &self,
        op: &OperationId,
        req: &InstallRequest,
    ) -> Result<Prepared, PreflightError> {
        debug!(phase = %InstallPhase::Preflight, "running preflight");
        validate_release_name(&req.release)?;
        let located = self.locator.locate(&req.chart).await?;
        let chart = read_chart(located.path.clone()).await?;
        let values = merge_values(&chart.default_values, req.values.as_ref())?;

        let version = located
            .version
            .clone()
            .or_else(|| Some(chart.metadata.version.clone()));
        Ok(Prepared {
            ctx: InstallContext {
                operation_id: op.clone(),
                release: req.release.clone(),
                namespace: req.namespace.clone(),
                chart: req.chart.chart_ref(),
                version,
            },
            located,
            values,
        })
    }
}

struct Execution {
    hub: Arc<EventHub>,
    engine: Arc<dyn InstallEngine>,
    global: InstallCallbacks,
    per_call: InstallCallbacks,
    post_install: Option<Arc<dyn PostInstall>>,
    timeout: Duration,
}

impl Execution {
    async fn run(self, prepared: Prepared) {
        let Prepared {
            ctx,
            located,
            values,
        } = prepared;
        let op = &ctx.operation_id;

        info!(phase = %InstallPhase::Installing, "install started");
        self.hub.publish(
            op,
            Event::status(json!({
                "status": "installing",
                "release": ctx.release,
                "namespace": ctx.namespace,
                "chart": ctx.chart,
                "version": ctx.version,
            })),
        );
        self.global.fire_start(&ctx);
        self.per_call.fire_start(&ctx);
        for notice in &located.notices {
            self.hub.publish(op, notice.clone());
        }

        let req = EngineRequest {
            release: ctx.release.clone(),
            namespace: ctx.namespace.clone(),
            chart_path: located.path.clone(),
            values,
            timeout: self.timeout,
        };
        let result =
            match tokio::time::timeout(self.timeout, self.engine.install(&req))
                .await
            {
                Ok(r) => r,
                Err(_) => Err(InstallError::InstallTimeout(self.timeout.as_secs())),
            };
        drop(located);

        match result {
            Ok(()) => {
                info!(phase = %InstallPhase::Installed, "install succeeded");
                self.global.fire_success(&ctx);
                self.per_call.fire_success(&ctx);
                match &self.post_install {
                    Some(handoff) => {
                        self.hub.publish(
                            op,
                            Event::status(json!({
                                "status": "installed",
                                "release": ctx.release,
                            })),
                        );
                        handoff.after_install(&ctx).await;
                    }
                    None => self.hub.publish(
                        op,
                        Event::done_success(json!({
                            "status": "succeeded",
                            "release": ctx.release,
                            "namespace": ctx.namespace,
                        })),
                    ),
                }
            }
            Err(e) => {
                error!(phase = %InstallPhase::InstallFailed, error = %e, "install failed");
                self.global.fire_error(&ctx, &e);
                self.per_call.fire_error(&ctx, &e);
                self.hub.publish(op, Event::done_failure(e.to_string()));
            }
        }
    }
}

/// Release names follow DNS-1123 subdomain rules, within Helm's length cap.
pub fn validate_release_name(name: &str) -> Result<(), PreflightError> {
    let invalid = |why: &str| PreflightError::InvalidRelease(format!("{name:?}: {why}"));
    if name.is_empty() {
        return Err(invalid("must not be empty"));
    }
    if name.len() > MAX_RELEASE_LEN {
        return Err(invalid("longer than 53 characters"));
    }
    for label in name.split('.') {
        let bytes = label.as_bytes();
        let alnum = |b: &u8| b.is_ascii_lowercase() || b.is_ascii_digit();
        if bytes.is_empty()
            || !bytes.first().is_some_and(alnum)
            || !bytes.last().is_some_and(alnum)
            || !bytes.iter().all(|b| alnum(b) || *b == b'-')
        {
            return Err(invalid(
                "must be lowercase alphanumerics, '-' or '.', starting and ending alphanumeric",
            ));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn release_names() {
        assert!(validate_release_name("jupyter-123").is_ok());
        assert!(validate_release_name("a.b-c").is_ok());
        assert!(validate_release_name("").is_err());
        assert!(validate_release_name("Upper").is_err());
        assert!(validate_release_name("-lead").is_err());
        assert!(validate_release_name("trail-").is_err());
        assert!(validate_release_name(&"x".repeat(54)).is_err());
    }
}
