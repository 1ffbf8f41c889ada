#[cfg(test)]
mod tests {
    use k8s_openapi::api::apps::v1::{
        DaemonSet, DaemonSetStatus, Deployment, DeploymentCondition, DeploymentSpec,
        DeploymentStatus, StatefulSet, StatefulSetSpec, StatefulSetStatus,
    };
    use k8s_openapi::api::batch::v1::{Job, JobCondition, JobSpec, JobStatus};
    use k8s_openapi::api::core::v1::{ContainerStatus, Pod, PodStatus};
    use kube::api::ObjectMeta;

    use crate::readiness::{
        ALL_READY, DaemonSetState, DeploymentState, JobState, PodState,
        ServiceState, SnapshotStore, StatefulSetState, TrackedObject,
        WorkloadKind, evaluate_all,
    };

    fn meta(name: &str) -> ObjectMeta {
        ObjectMeta {
            name: Some(name.into()),
            ..Default::default()
        }
    }

    fn deployment(name: &str, desired: i32, available: i32, cond: &str) -> Deployment {
        Deployment {
            metadata: meta(name),
            spec: Some(DeploymentSpec {
                replicas: Some(desired),
                ..Default::default()
            }),
            status: Some(DeploymentStatus {
                available_replicas: Some(available),
                conditions: Some(vec![DeploymentCondition {
                    type_: "Available".into(),
                    status: cond.into(),
                    ..Default::default()
                }]),
                ..Default::default()
            }),
        }
    }

    fn ready_deploy(name: &str) -> TrackedObject {
        TrackedObject::Deployment(DeploymentState {
            name: name.into(),
            desired: 1,
            available: 1,
            available_condition: true,
        })
    }

    #[test]
    fn deployment_short_of_replicas_reports_counts() {
        let obj = TrackedObject::from(&deployment("web", 3, 2, "True"));
        let r = evaluate_all([&obj]);
        assert!(!r.ready);
        assert!(r.reason.contains("not ready (2/3)"), "{}", r.reason);
        assert_eq!(r.reason, "deployment web not ready (2/3)");
    }

    #[test]
    fn deployment_requires_available_condition() {
        let obj = TrackedObject::from(&deployment("web", 1, 1, "False"));
        assert!(!evaluate_all([&obj]).ready);
        let obj = TrackedObject::from(&deployment("web", 1, 1, "True"));
        assert!(evaluate_all([&obj]).ready);
    }

    #[test]
    fn deployment_without_spec_replicas_defaults_to_one() {
        let mut d = deployment("web", 1, 0, "True");
        d.spec = None;
        let TrackedObject::Deployment(state) = TrackedObject::from(&d) else {
            panic!("expected deployment");
        };
        assert_eq!(state.desired, 1);
    }

    fn statefulset(name: &str, replicas: Option<i32>, ready: Option<i32>) -> StatefulSet {
        StatefulSet {
            metadata: meta(name),
            spec: Some(StatefulSetSpec {
                replicas,
                ..Default::default()
            }),
            status: Some(StatefulSetStatus {
                ready_replicas: ready,
                ..Default::default()
            }),
        }
    }

    #[test]
    fn statefulset_conversion_defaults() {
        let obj = TrackedObject::from(&statefulset("db", None, None));
        assert_eq!(
            obj,
            TrackedObject::StatefulSet(StatefulSetState {
                name: "db".into(),
                desired: 1,
                ready: 0,
            })
        );

        let mut bare = statefulset("db", Some(3), Some(3));
        bare.spec = None;
        bare.status = None;
        let TrackedObject::StatefulSet(state) = TrackedObject::from(&bare) else {
            panic!("expected statefulset");
        };
        assert_eq!((state.desired, state.ready), (1, 0));
    }

    #[test]
    fn statefulset_needs_every_replica_ready() {
        let short = TrackedObject::from(&statefulset("db", Some(3), Some(2)));
        assert_eq!(
            evaluate_all([&short]).reason,
            "statefulset db not ready (2/3)"
        );

        let defaulted = TrackedObject::from(&statefulset("db", None, None));
        assert_eq!(
            evaluate_all([&defaulted]).reason,
            "statefulset db not ready (0/1)"
        );

        let full = TrackedObject::from(&statefulset("db", Some(3), Some(3)));
        assert!(evaluate_all([&full]).ready);
    }

    fn daemonset(name: &str, scheduled: i32, ready: i32) -> DaemonSet {
        DaemonSet {
            metadata: meta(name),
            status: Some(DaemonSetStatus {
                desired_number_scheduled: scheduled,
                number_ready: ready,
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    #[test]
    fn daemonset_conversion_reads_status() {
        let obj = TrackedObject::from(&daemonset("agent", 4, 3));
        assert_eq!(
            obj,
            TrackedObject::DaemonSet(DaemonSetState {
                name: "agent".into(),
                desired_scheduled: 4,
                ready: 3,
            })
        );

        let mut fresh = daemonset("agent", 0, 0);
        fresh.status = None;
        let TrackedObject::DaemonSet(state) = TrackedObject::from(&fresh) else {
            panic!("expected daemonset");
        };
        assert_eq!((state.desired_scheduled, state.ready), (0, 0));
    }

    #[test]
    fn daemonset_needs_every_scheduled_pod_ready() {
        let short = TrackedObject::from(&daemonset("agent", 4, 3));
        let r = evaluate_all([&short]);
        assert!(!r.ready);
        assert_eq!(r.reason, "daemonset agent not ready (3/4)");

        let full = TrackedObject::from(&daemonset("agent", 4, 4));
        assert!(evaluate_all([&full]).ready);

        let unscheduled = TrackedObject::from(&daemonset("agent", 0, 0));
        assert!(evaluate_all([&unscheduled]).ready);
    }

    #[test]
    fn completed_job_is_ready() {
        let job = Job {
            metadata: meta("migrate"),
            spec: Some(JobSpec {
                completions: Some(1),
                ..Default::default()
            }),
            status: Some(JobStatus {
                succeeded: Some(1),
                ..Default::default()
            }),
        };
        let obj = TrackedObject::from(&job);
        assert!(evaluate_all([&obj]).ready);
    }

    #[test]
    fn failed_job_is_reported() {
        let job = Job {
            metadata: meta("migrate"),
            spec: Some(JobSpec::default()),
            status: Some(JobStatus {
                conditions: Some(vec![JobCondition {
                    type_: "Failed".into(),
                    status: "True".into(),
                    ..Default::default()
                }]),
                ..Default::default()
            }),
        };
        let r = evaluate_all([&TrackedObject::from(&job)]);
        assert_eq!(r.reason, "job migrate failed");
    }

    #[test]
    fn job_without_completions_needs_one_success() {
        let obj = TrackedObject::Job(JobState {
            name: "seed".into(),
            completions: None,
            succeeded: 0,
            failed: false,
        });
        assert_eq!(evaluate_all([&obj]).reason, "job seed not complete");
    }

    #[test]
    fn pod_rules() {
        let running = Pod {
            metadata: meta("web-0"),
            status: Some(PodStatus {
                phase: Some("Running".into()),
                container_statuses: Some(vec![ContainerStatus {
                    name: "app".into(),
                    ready: true,
                    ..Default::default()
                }]),
                ..Default::default()
            }),
            ..Default::default()
        };
        assert!(evaluate_all([&TrackedObject::from(&running)]).ready);

        let failed = TrackedObject::Pod(PodState {
            name: "web-1".into(),
            phase: Some("Failed".into()),
            containers_ready: true,
        });
        assert_eq!(evaluate_all([&failed]).reason, "pod web-1 failed");

        let pending = TrackedObject::Pod(PodState {
            name: "web-2".into(),
            phase: Some("Pending".into()),
            containers_ready: true,
        });
        assert_eq!(evaluate_all([&pending]).reason, "pod web-2 not ready");
    }

    #[test]
    fn empty_snapshot_is_vacuously_ready() {
        let store = SnapshotStore::new();
        let r = store.evaluate();
        assert!(r.ready);
        assert_eq!(r.reason, ALL_READY);
    }

    #[test]
    fn one_unready_object_flips_aggregate() {
        let store = SnapshotStore::new();
        store.upsert(ready_deploy("api"));
        store.upsert(ready_deploy("web"));
        store.upsert(TrackedObject::Service(ServiceState { name: "web".into() }));
        assert!(store.evaluate().ready);

        store.upsert(TrackedObject::Deployment(DeploymentState {
            name: "web".into(),
            desired: 2,
            available: 1,
            available_condition: true,
        }));
        let r = store.evaluate();
        assert!(!r.ready);
        assert_eq!(r.reason, "deployment web not ready (1/2)");

        store.remove(WorkloadKind::Deployment, "web");
        assert!(store.evaluate().ready);
    }

    #[test]
    fn first_unready_in_kind_then_name_order() {
        let store = SnapshotStore::new();
        store.upsert(TrackedObject::Pod(PodState {
            name: "a-pod".into(),
            phase: None,
            containers_ready: false,
        }));
        store.upsert(TrackedObject::Job(JobState {
            name: "z-job".into(),
            completions: Some(2),
            succeeded: 1,
            failed: false,
        }));
        assert_eq!(store.evaluate().reason, "job z-job not complete (1/2)");
    }

    #[test]
    fn relist_replaces_only_its_kind_and_marks_sync() {
        let store = SnapshotStore::new();
        store.upsert(ready_deploy("old"));
        store.upsert(TrackedObject::Service(ServiceState { name: "svc".into() }));

        store.replace_kind(WorkloadKind::Deployment, vec![ready_deploy("new")]);
        assert_eq!(store.len(), 2);
        assert!(!store.remove(WorkloadKind::Deployment, "old"));
        assert!(!store.is_synced());
        assert!(!store.unsynced().contains(&WorkloadKind::Deployment));

        for kind in WorkloadKind::ALL {
            store.replace_kind(kind, Vec::new());
        }
        assert!(store.is_synced());
        assert!(store.is_empty());
    }
}
