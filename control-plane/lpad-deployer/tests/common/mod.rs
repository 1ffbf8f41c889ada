#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use lpad_deployer::chart::{ChartLocator, HttpIndexFetcher};
use lpad_deployer::errors::InstallError;
use lpad_deployer::hub::{EventHub, Subscription};
use lpad_deployer::installer::{
    EngineRequest, InstallCallbacks, InstallEngine, ReleaseInstaller,
};
use lpad_deployer::lifecycle::{ReadinessHandoff, ServiceLifecycle};
use lpad_deployer::metadata::{
    MemorySecretBackend, ReleaseMetadataStore, RetryPolicy,
};
use lpad_deployer::readiness::{
    ReadinessAggregator, WatchSink, WorkloadKind, WorkloadWatcher,
};
use lpad_deployer::resolver::{ChartResolver, ResolvePolicy};
use lpad_deployer::web::{ApiServer, AppState};
use lpad_models::{CatalogEntry, CatalogKind, Event};
use tokio::sync::{Mutex, Semaphore};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

pub const CATALOG_ID: &str = "stable";

pub fn chart_yaml(version: &str) -> String {
    format!("apiVersion: v2\nname: demo\nversion: {version}\n")
}

pub const VALUES_YAML: &str = "replicaCount: 1\n";

/// Unpacked chart directory `<root>/demo`.
pub fn chart_dir(root: &Path) -> PathBuf {
    let dir = root.join("demo");
    std::fs::create_dir_all(dir.join("templates")).unwrap();
    std::fs::write(dir.join("Chart.yaml"), chart_yaml("0.3.1")).unwrap();
    std::fs::write(dir.join("values.yaml"), VALUES_YAML).unwrap();
    dir
}

pub fn chart_archive(version: &str) -> Vec<u8> {
    let mut builder = tar::Builder::new(flate2::write::GzEncoder::new(
        Vec::new(),
        flate2::Compression::default(),
    ));
    let chart = chart_yaml(version);
    for (name, body) in [
        ("demo/Chart.yaml", chart.as_str()),
        ("demo/values.yaml", VALUES_YAML),
    ] {
        let mut header = tar::Header::new_gnu();
        header.set_size(body.len() as u64);
        header.set_mode(0o644);
        header.set_cksum();
        builder.append_data(&mut header, name, body.as_bytes()).unwrap();
    }
    builder.into_inner().unwrap().finish().unwrap()
}

/// A repository index serving `demo` at 0.3.1 and 0.4.0.
pub const INDEX_YAML: &str = r#"apiVersion: v1
entries:
  demo:
    - name: demo
      version: 0.4.0
      urls: ["charts/demo-0.4.0.tgz"]
    - name: demo
      version: 0.3.1
      urls: ["charts/demo-0.3.1.tgz"]
"#;

pub async fn mount_repository(server: &wiremock::MockServer) {
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, ResponseTemplate};

    Mock::given(method("GET"))
        .and(path("/index.yaml"))
        .respond_with(ResponseTemplate::new(200).set_body_string(INDEX_YAML))
        .mount(server)
        .await;
    for version in ["0.3.1", "0.4.0"] {
        Mock::given(method("GET"))
            .and(path(format!("/charts/demo-{version}.tgz")))
            .respond_with(
                ResponseTemplate::new(200).set_body_bytes(chart_archive(version)),
            )
            .mount(server)
            .await;
    }
}

pub fn helm_catalog(location: &str) -> CatalogEntry {
    CatalogEntry {
        id: CATALOG_ID.into(),
        kind: CatalogKind::Helm,
        location: location.into(),
        name: Default::default(),
        status: Default::default(),
        username: None,
        password: None,
        skip_tls_verify: false,
        ca_file: None,
        excluded: Vec::new(),
        allow_sharing: false,
        packages: Vec::new(),
    }
}

/// Install engine that records requests instead of running helm. Each
/// install waits for a permit when gated.
pub struct FakeEngine {
    pub fail_with: Option<String>,
    pub requests: Mutex<Vec<EngineRequest>>,
    gate: Option<Semaphore>,
}

impl FakeEngine {
    pub fn succeeding() -> Arc<Self> {
        Arc::new(Self {
            fail_with: None,
            requests: Mutex::new(Vec::new()),
            gate: None,
        })
    }

    pub fn failing(reason: &str) -> Arc<Self> {
        Arc::new(Self {
            fail_with: Some(reason.into()),
            requests: Mutex::new(Vec::new()),
            gate: None,
        })
    }

    pub fn gated() -> Arc<Self> {
        Arc::new(Self {
            fail_with: None,
            requests: Mutex::new(Vec::new()),
            gate: Some(Semaphore::new(0)),
        })
    }

    pub fn release(&self) {
        if let Some(gate) = &self.gate {
            gate.add_permits(1);
        }
    }
}

#[async_trait]
impl InstallEngine for FakeEngine {
    async fn install(&self, req: &EngineRequest) -> Result<(), InstallError> {
        self.requests.lock().await.push(req.clone());
        if let Some(gate) = &self.gate {
            gate.acquire().await.unwrap().forget();
        }
        match &self.fail_with {
            Some(reason) => Err(InstallError::InstallExecution(reason.clone())),
            None => Ok(()),
        }
    }
}

/// Lists nothing for every kind, so a release is ready as soon as the
/// caches sync.
pub struct EmptyClusterWatcher;

impl WorkloadWatcher for EmptyClusterWatcher {
    fn spawn_watches(
        &self,
        _namespace: &str,
        _selector: &str,
        sink: WatchSink,
    ) -> Vec<JoinHandle<()>> {
        vec![tokio::spawn(async move {
            for kind in WorkloadKind::ALL {
                sink.relisted(kind, Vec::new());
            }
            std::future::pending::<()>().await;
        })]
    }
}

#[derive(Default)]
pub struct CallbackCounts {
    pub started: AtomicUsize,
    pub succeeded: AtomicUsize,
    pub failed: AtomicUsize,
}

impl CallbackCounts {
    pub fn callbacks(self: &Arc<Self>) -> InstallCallbacks {
        let (s, ok, err) = (self.clone(), self.clone(), self.clone());
        InstallCallbacks::default()
            .on_start(move |_| {
                s.started.fetch_add(1, Ordering::SeqCst);
            })
            .on_success(move |_| {
                ok.succeeded.fetch_add(1, Ordering::SeqCst);
            })
            .on_error(move |_, _| {
                err.failed.fetch_add(1, Ordering::SeqCst);
            })
    }

    pub fn snapshot(&self) -> (usize, usize, usize) {
        (
            self.started.load(Ordering::SeqCst),
            self.succeeded.load(Ordering::SeqCst),
            self.failed.load(Ordering::SeqCst),
        )
    }
}

pub struct Harness {
    pub hub: Arc<EventHub>,
    pub engine: Arc<FakeEngine>,
    pub backend: MemorySecretBackend,
    pub installer: Arc<ReleaseInstaller>,
    pub lifecycle: Arc<ServiceLifecycle>,
    pub counts: Arc<CallbackCounts>,
    pub _cache: tempfile::TempDir,
}

impl Harness {
    pub fn new(catalogs: Vec<CatalogEntry>, engine: Arc<FakeEngine>) -> Self {
        let cache = tempfile::tempdir().unwrap();
        let hub = Arc::new(EventHub::new(64));
        let counts = Arc::new(CallbackCounts::default());
        let fetcher = Arc::new(HttpIndexFetcher::new(&catalogs));
        let resolver = Arc::new(ChartResolver::new(
            catalogs,
            ResolvePolicy::Deferred,
            fetcher.clone(),
        ));
        let installer = Arc::new(ReleaseInstaller::new(
            ChartLocator::new(fetcher, cache.path(), "helm", true),
            engine.clone(),
            hub.clone(),
            counts.callbacks(),
            Duration::from_secs(30),
        ));
        let readiness = Arc::new(ReadinessAggregator::new(
            Arc::new(EmptyClusterWatcher),
            hub.clone(),
            Duration::from_secs(10),
            Duration::from_millis(20),
        ));
        let handoff = Arc::new(ReadinessHandoff::new(
            readiness,
            hub.clone(),
            CancellationToken::new(),
        ));
        let backend = MemorySecretBackend::new();
        let store = ReleaseMetadataStore::new(
            Arc::new(backend.clone()),
            RetryPolicy::default(),
        );
        let lifecycle = Arc::new(ServiceLifecycle::new(
            resolver,
            store,
            installer.clone(),
            handoff,
        ));
        Self {
            hub,
            engine,
            backend,
            installer,
            lifecycle,
            counts,
            _cache: cache,
        }
    }

    pub fn router(&self) -> axum::Router {
        ApiServer::new(
            AppState {
                lifecycle: self.lifecycle.clone(),
                hub: self.hub.clone(),
                heartbeat: Duration::from_secs(30),
            },
            0,
        )
        .into_router()
    }
}

/// Drain a subscription up to and including its `done` event.
pub async fn collect_until_done(sub: &mut Subscription) -> Vec<Event> {
    let mut events = Vec::new();
    loop {
        let ev = tokio::time::timeout(Duration::from_secs(10), sub.recv())
            .await
            .expect("timed out waiting for events")
            .expect("subscription closed");
        let done = ev.is_terminal();
        events.push(ev);
        if done {
            return events;
        }
    }
}
