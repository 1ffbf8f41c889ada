pub mod aggregator;
pub mod rules;
pub mod snapshot;
pub mod watch;

pub use aggregator::ReadinessAggregator;
pub use rules::{ALL_READY, Readiness, evaluate_all};
pub use snapshot::{
    DaemonSetState, DeploymentState, JobState, PodState, ServiceState,
    SnapshotStore, StatefulSetState, TrackedObject, WorkloadKind,
};
pub use watch::{
    INSTANCE_LABEL, KubeWorkloadWatcher, WatchSink, WorkloadWatcher,
    release_selector,
};

#[cfg(test)]
mod snapshot_tests;
