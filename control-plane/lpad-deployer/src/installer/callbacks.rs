use std::sync::Arc;

use async_trait::async_trait;
use lpad_models::OperationId;

use crate::errors::InstallError;

/// What an install is about, as handed to callbacks and the post-install
/// hand-off.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallContext {
    pub operation_id: OperationId,
    pub release: String,
    pub namespace: String,
    pub chart: String,
    pub version: Option<String>,
}

pub type ContextHook = Arc<dyn Fn(&InstallContext) + Send + Sync>;
pub type ErrorHook = Arc<dyn Fn(&InstallContext, &InstallError) + Send + Sync>;

/// Optional lifecycle hooks. The installer holds one global set and each
/// call may pass its own; both fire, global first.
#[derive(Clone, Default)]
pub struct InstallCallbacks {
    pub on_start: Option<ContextHook>,
    pub on_success: Option<ContextHook>,
    pub on_error: Option<ErrorHook>,
}

impl InstallCallbacks {
    pub fn on_start(
        mut self,
        f: impl Fn(&InstallContext) + Send + Sync + 'static,
    ) -> Self {
        self.on_start = Some(Arc::new(f));
        self
    }

    pub fn on_success(
        mut self,
        f: impl Fn(&InstallContext) + Send + Sync + 'static,
    ) -> Self {
        self.on_success = Some(Arc::new(f));
        self
    }

    pub fn on_error(
        mut self,
        f: impl Fn(&InstallContext, &InstallError) + Send + Sync + 'static,
    ) -> Self {
        self.on_error = Some(Arc::new(f));
        self
    }

    pub(crate) fn fire_start(&self, ctx: &InstallContext) {
        if let Some(f) = &self.on_start {
            f(ctx);
        }
    }

    pub(crate) fn fire_success(&self, ctx: &InstallContext) {
        if let Some(f) = &self.on_success {
            f(ctx);
        }
    }

    pub(crate) fn fire_error(&self, ctx: &InstallContext, err: &InstallError) {
        if let Some(f) = &self.on_error {
            f(ctx, err);
        }
    }
}

impl std::fmt::Debug for InstallCallbacks {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InstallCallbacks")
            .field("on_start", &self.on_start.is_some())
            .field("on_success", &self.on_success.is_some())
            .field("on_error", &self.on_error.is_some())
            .finish()
    }
}

/// Work that takes over after a successful install. When attached it owns
/// the operation's terminal `done` event.
#[async_trait]
pub trait PostInstall: Send + Sync {
    async fn after_install(&self, ctx: &InstallContext);
}
