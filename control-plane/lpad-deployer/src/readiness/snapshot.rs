use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::sync::{Mutex, MutexGuard};

use k8s_openapi::api::apps::v1::{DaemonSet, Deployment, StatefulSet};
use k8s_openapi::api::batch::v1::Job;
use k8s_openapi::api::core::v1::{Pod, Service};
use kube::ResourceExt;
use tokio::sync::Notify;

use super::rules::{Readiness, evaluate_all};

/// Workload kinds tracked for a release, in evaluation order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum WorkloadKind {
    Deployment,
    StatefulSet,
    DaemonSet,
    Job,
    Pod,
    Service,
}

impl WorkloadKind {
    pub const ALL: [WorkloadKind; 6] = [
        WorkloadKind::Deployment,
        WorkloadKind::StatefulSet,
        WorkloadKind::DaemonSet,
        WorkloadKind::Job,
        WorkloadKind::Pod,
        WorkloadKind::Service,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            WorkloadKind::Deployment => "Deployment",
            WorkloadKind::StatefulSet => "StatefulSet",
            WorkloadKind::DaemonSet => "DaemonSet",
            WorkloadKind::Job => "Job",
            WorkloadKind::Pod => "Pod",
            WorkloadKind::Service => "Service",
        }
    }
}

impl fmt::Display for WorkloadKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeploymentState {
    pub name: String,
    pub desired: i32,
    pub available: i32,
    pub available_condition: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatefulSetState {
    pub name: String,
    pub desired: i32,
    pub ready: i32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DaemonSetState {
    pub name: String,
    pub desired_scheduled: i32,
    pub ready: i32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobState {
    pub name: String,
    /// `None` when the job does not set `completions`.
    pub completions: Option<i32>,
    pub succeeded: i32,
    pub failed: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PodState {
    pub name: String,
    pub phase: Option<String>,
    pub containers_ready: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceState {
    pub name: String,
}

/// The readiness-relevant part of one watched object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TrackedObject {
    Deployment(DeploymentState),
    StatefulSet(StatefulSetState),
    DaemonSet(DaemonSetState),
    Job(JobState),
    Pod(PodState),
    Service(ServiceState),
}

impl TrackedObject {
    pub fn kind(&self) -> WorkloadKind {
        match self {
            TrackedObject::Deployment(_) => WorkloadKind::Deployment,
            TrackedObject::StatefulSet(_) => WorkloadKind::StatefulSet,
            TrackedObject::DaemonSet(_) => WorkloadKind::DaemonSet,
            TrackedObject::Job(_) => WorkloadKind::Job,
            TrackedObject::Pod(_) => WorkloadKind::Pod,
            TrackedObject::Service(_) => WorkloadKind::Service,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            TrackedObject::Deployment(s) => &s.name,
            TrackedObject::StatefulSet(s) => &s.name,
            TrackedObject::DaemonSet(s) => &s.name,
            TrackedObject::Job(s) => &s.name,
            TrackedObject::Pod(s) => &s.name,
            TrackedObject::Service(s) => &s.name,
        }
    }
}

fn condition_true<'a>(
    mut conditions: impl Iterator<Item = (&'a str, &'a str)>,
    wanted: &str,
) -> bool {
    conditions.any(|(t, s)| t == wanted && s == "True")
}

impl From<&Deployment> for TrackedObject {
    fn from(d: &Deployment) -> Self {
        let status = d.status.as_ref();
        TrackedObject::Deployment(DeploymentState {
            name: d.name_any(),
            desired: d.spec.as_ref().and_then(|s| s.replicas).unwrap_or(1),
            available: status.and_then(|s| s.available_replicas).unwrap_or(0),
            available_condition: condition_true(
                status
                    .and_then(|s| s.conditions.as_ref())
                    .into_iter()
                    .flatten()
                    .map(|c| (c.type_.as_str(), c.status.as_str())),
                "Available",
            ),
        })
    }
}

impl From<&StatefulSet> for TrackedObject {
    fn from(s: &StatefulSet) -> Self {
        TrackedObject::StatefulSet(StatefulSetState {
            name: s.name_any(),
            desired: s.spec.as_ref().and_then(|sp| sp.replicas).unwrap_or(1),
            ready: s
                .status
                .as_ref()
                .and_then(|st| st.ready_replicas)
                .unwrap_or(0),
        })
    }
}

impl From<&DaemonSet> for TrackedObject {
    fn from(d: &DaemonSet) -> Self {
        let status = d.status.as_ref();
        TrackedObject::DaemonSet(DaemonSetState {
            name: d.name_any(),
            desired_scheduled: status.map_or(0, |s| s.desired_number_scheduled),
            ready: status.map_or(0, |s| s.number_ready),
        })
    }
}

impl From<&Job> for TrackedObject {
    fn from(j: &Job) -> Self {
        let status = j.status.as_ref();
        TrackedObject::Job(JobState {
            name: j.name_any(),
            completions: j.spec.as_ref().and_then(|s| s.completions),
            succeeded: status.and_then(|s| s.succeeded).unwrap_or(0),
            failed: condition_true(
                status
                    .and_then(|s| s.conditions.as_ref())
                    .into_iter()
                    .flatten()
                    .map(|c| (c.type_.as_str(), c.status.as_str())),
                "Failed",
            ),
        })
    }
}

impl From<&Pod> for TrackedObject {
    fn from(p: &Pod) -> Self {
        let status = p.status.as_ref();
        TrackedObject::Pod(PodState {
            name: p.name_any(),
            phase: status.and_then(|s| s.phase.clone()),
            containers_ready: status
                .and_then(|s| s.container_statuses.as_ref())
                .is_none_or(|cs| cs.iter().all(|c| c.ready)),
        })
    }
}

impl From<&Service> for TrackedObject {
    fn from(s: &Service) -> Self {
        TrackedObject::Service(ServiceState { name: s.name_any() })
    }
}

#[derive(Debug, Default)]
struct Inner {
    objects: BTreeMap<(WorkloadKind, String), TrackedObject>,
    synced: HashSet<WorkloadKind>,
}

/// Mirror of the release's workloads shared by the watch tasks and the
/// evaluation loop. Every read and write goes through one mutex.
#[derive(Debug, Default)]
pub struct SnapshotStore {
    inner: Mutex<Inner>,
    sync_changed: Notify,
}

impl SnapshotStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Insert or update an object; returns whether it was already known.
    pub fn upsert(&self, obj: TrackedObject) -> bool {
        let key = (obj.kind(), obj.name().to_string());
        self.lock().objects.insert(key, obj).is_some()
    }

    pub fn remove(&self, kind: WorkloadKind, name: &str) -> bool {
        self.lock()
            .objects
            .remove(&(kind, name.to_string()))
            .is_some()
    }

    /// Swap in the result of a full list for `kind` and mark it synced.
    pub fn replace_kind(&self, kind: WorkloadKind, objects: Vec<TrackedObject>) {
        {
            let mut inner = self.lock();
            inner.objects.retain(|(k, _), _| *k != kind);
            for obj in objects.into_iter().filter(|o| o.kind() == kind) {
                inner.objects.insert((kind, obj.name().to_string()), obj);
            }
            inner.synced.insert(kind);
        }
        self.sync_changed.notify_one();
    }

    pub fn is_synced(&self) -> bool {
        let inner = self.lock();
        WorkloadKind::ALL.iter().all(|k| inner.synced.contains(k))
    }

    pub fn unsynced(&self) -> Vec<WorkloadKind> {
        let inner = self.lock();
        WorkloadKind::ALL
            .into_iter()
            .filter(|k| !inner.synced.contains(k))
            .collect()
    }

    /// Resolves after the next `replace_kind`.
    pub async fn sync_changed(&self) {
        self.sync_changed.notified().await
    }

    pub fn len(&self) -> usize {
        self.lock().objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Aggregate readiness of the current contents.
    pub fn evaluate(&self) -> Readiness {
        evaluate_all(self.lock().objects.values())
    }
}
