use std::fmt::Debug;
use std::sync::Arc;

use futures_util::StreamExt;
use k8s_openapi::api::apps::v1::{DaemonSet, Deployment, StatefulSet};
use k8s_openapi::api::batch::v1::Job;
use k8s_openapi::api::core::v1::{Pod, Service};
use k8s_openapi::NamespaceResourceScope;
use kube::runtime::{WatchStreamExt, watcher};
use kube::{Api, Client, Resource, ResourceExt};
use lpad_models::{Event, OperationId};
use serde::de::DeserializeOwned;
use serde_json::json;
use tokio::sync::mpsc::UnboundedSender;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use super::snapshot::{SnapshotStore, TrackedObject, WorkloadKind};
use crate::hub::EventHub;

pub const INSTANCE_LABEL: &str = "app.kubernetes.io/instance";

pub fn release_selector(release: &str) -> String {
    format!("{INSTANCE_LABEL}={release}")
}

/// Where watch tasks deliver what they observe.
#[derive(Clone)]
pub struct WatchSink {
    store: Arc<SnapshotStore>,
    hub: Arc<EventHub>,
    op: OperationId,
    ended: UnboundedSender<(WorkloadKind, String)>,
}

impl WatchSink {
    pub fn new(
        store: Arc<SnapshotStore>,
        hub: Arc<EventHub>,
        op: OperationId,
        ended: UnboundedSender<(WorkloadKind, String)>,
    ) -> Self {
        Self {
            store,
            hub,
            op,
            ended,
        }
    }

    fn emit(&self, kind: WorkloadKind, name: &str, action: &str) {
        self.hub.publish(
            &self.op,
            Event::status(json!({
                "kind": kind.as_str(),
                "name": name,
                "action": action,
            })),
        );
    }

    /// A full list for `kind` completed.
    pub fn relisted(&self, kind: WorkloadKind, objects: Vec<TrackedObject>) {
        for obj in &objects {
            self.emit(kind, obj.name(), "add");
        }
        self.store.replace_kind(kind, objects);
    }

    pub fn applied(&self, obj: TrackedObject) {
        let kind = obj.kind();
        let name = obj.name().to_string();
        let existed = self.store.upsert(obj);
        self.emit(kind, &name, if existed { "update" } else { "add" });
    }

    pub fn deleted(&self, kind: WorkloadKind, name: &str) {
        self.store.remove(kind, name);
        self.emit(kind, name, "delete");
    }

    /// The watch for `kind` stopped and will deliver nothing more.
    pub fn ended(&self, kind: WorkloadKind, reason: impl Into<String>) {
        let _ = self.ended.send((kind, reason.into()));
    }
}

/// Starts one watch task per workload kind for a release.
pub trait WorkloadWatcher: Send + Sync {
    fn spawn_watches(
        &self,
        namespace: &str,
        selector: &str,
        sink: WatchSink,
    ) -> Vec<JoinHandle<()>>;
}

/// Watches through the Kubernetes API with `kube::runtime::watcher`.
#[derive(Clone)]
pub struct KubeWorkloadWatcher {
    client: Client,
}

impl KubeWorkloadWatcher {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    fn spawn_one<K>(
        &self,
        kind: WorkloadKind,
        namespace: &str,
        selector: &str,
        sink: WatchSink,
    ) -> JoinHandle<()>
    where
        K: Resource<DynamicType = (), Scope = NamespaceResourceScope>
            + Clone
            + DeserializeOwned
            + Debug
            + Send
            + Sync
            + 'static,
        for<'a> TrackedObject: From<&'a K>,
    {
        let api: Api<K> = Api::namespaced(self.client.clone(), namespace);
        let config = watcher::Config::default().labels(selector);
        tokio::spawn(async move {
            let mut stream = watcher(api, config).default_backoff().boxed();
            let mut relist: Vec<TrackedObject> = Vec::new();
            while let Some(event) = stream.next().await {
                match event {
                    Ok(watcher::Event::Init) => relist.clear(),
                    Ok(watcher::Event::InitApply(obj)) => {
                        relist.push(TrackedObject::from(&obj))
                    }
                    Ok(watcher::Event::InitDone) => {
                        debug!(%kind, count = relist.len(), "watch cache synced");
                        sink.relisted(kind, std::mem::take(&mut relist));
                    }
                    Ok(watcher::Event::Apply(obj)) => {
                        sink.applied(TrackedObject::from(&obj))
                    }
                    Ok(watcher::Event::Delete(obj)) => {
                        sink.deleted(kind, &obj.name_any())
                    }
                    Err(e) => warn!(%kind, error = %e, "watch error; backing off"),
                }
            }
            sink.ended(kind, "watch stream ended");
        })
    }
}

impl WorkloadWatcher for KubeWorkloadWatcher {
    fn spawn_watches(
        &self,
        namespace: &str,
        selector: &str,
        sink: WatchSink,
    ) -> Vec<JoinHandle<()>> {
        WorkloadKind::ALL
            .into_iter()
            .map(|kind| {
                let sink = sink.clone();
                match kind {
                    WorkloadKind::Deployment => {
                        self.spawn_one::<Deployment>(kind, namespace, selector, sink)
                    }
                    WorkloadKind::StatefulSet => {
                        self.spawn_one::<StatefulSet>(kind, namespace, selector, sink)
                    }
                    WorkloadKind::DaemonSet => {
                        self.spawn_one::<DaemonSet>(kind, namespace, selector, sink)
                    }
                    WorkloadKind::Job => {
                        self.spawn_one::<Job>(kind, namespace, selector, sink)
                    }
                    WorkloadKind::Pod => {
                        self.spawn_one::<Pod>(kind, namespace, selector, sink)
                    }
                    WorkloadKind::Service => {
                        self.spawn_one::<Service>(kind, namespace, selector, sink)
                    }
                }
            })
            .collect()
    }
}
