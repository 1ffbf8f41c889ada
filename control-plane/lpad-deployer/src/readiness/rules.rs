use super::snapshot::TrackedObject;

pub const ALL_READY: &str = "all ready";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Readiness {
    pub ready: bool,
    pub reason: String,
}

impl Readiness {
    fn ready() -> Self {
        Self {
            ready: true,
            reason: ALL_READY.to_string(),
        }
    }

    fn not_ready(reason: String) -> Self {
        Self {
            ready: false,
            reason,
        }
    }
}

/// Readiness of a single object. `None` means ready.
pub fn check(obj: &TrackedObject) -> Option<String> {
    match obj {
        TrackedObject::Deployment(d) => {
            (d.available < d.desired || !d.available_condition).then(|| {
                format!(
                    "deployment {} not ready ({}/{})",
                    d.name, d.available, d.desired
                )
            })
        }
        TrackedObject::StatefulSet(s) => (s.ready < s.desired).then(|| {
            format!("statefulset {} not ready ({}/{})", s.name, s.ready, s.desired)
        }),
        TrackedObject::DaemonSet(d) => (d.ready < d.desired_scheduled).then(|| {
            format!(
                "daemonset {} not ready ({}/{})",
                d.name, d.ready, d.desired_scheduled
            )
        }),
        TrackedObject::Job(j) => {
            if j.failed {
                return Some(format!("job {} failed", j.name));
            }
            match j.completions {
                Some(c) if j.succeeded < c => Some(format!(
                    "job {} not complete ({}/{})",
                    j.name, j.succeeded, c
                )),
                None if j.succeeded == 0 => {
                    Some(format!("job {} not complete", j.name))
                }
                _ => None,
            }
        }
        TrackedObject::Pod(p) => match p.phase.as_deref() {
            Some("Failed") => Some(format!("pod {} failed", p.name)),
            Some("Running") if p.containers_ready => None,
            _ => Some(format!("pod {} not ready", p.name)),
        },
        TrackedObject::Service(_) => None,
    }
}

/// AND over all objects; the reason is that of the first non-ready one.
/// An empty set is ready.
pub fn evaluate_all<'a>(
    objects: impl IntoIterator<Item = &'a TrackedObject>,
) -> Readiness {
    objects
        .into_iter()
        .find_map(check)
        .map_or_else(Readiness::ready, Readiness::not_ready)
}
