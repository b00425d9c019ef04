use std::time::Duration as StdDuration;

use crate::cluster_ops::ClusterOps;
use crate::crd::{Action, ChaosExperimentSpec};
use crate::errors::ErrorKind;
use crate::safety::PodCandidate;
use crate::sidecar::{self, SidecarParams};

/// Overall result of one dispatcher attempt (§4.10 failure semantics):
/// `Success` if every target succeeded, `Failure` if none did, `Partial`
/// otherwise. Partial is non-terminal and not retried unless zero targets
/// were affected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Success,
    Partial,
    Failure,
}

#[derive(Debug, Clone)]
pub struct AffectedTarget {
    pub kind: String,
    pub name: String,
    pub namespace: String,
    pub succeeded: bool,
    pub detail: String,
    /// Classified error kind, set only when `succeeded` is false. Used by the
    /// reconciler to decide retry policy without re-parsing `detail`.
    pub error_kind: Option<ErrorKind>,
}

#[derive(Debug, Clone)]
pub struct ExecutionReport {
    pub outcome: Outcome,
    pub message: String,
    pub affected: Vec<AffectedTarget>,
    pub error: Option<String>,
    pub new_affected_pods: Vec<String>,
    pub cordoned_nodes: Vec<String>,
}

impl ExecutionReport {
    fn from_targets(action: Action, affected: Vec<AffectedTarget>, new_affected_pods: Vec<String>) -> Self {
        let total = affected.len();
        let succeeded = affected.iter().filter(|t| t.succeeded).count();
        let outcome = if total == 0 || succeeded == 0 {
            Outcome::Failure
        } else if succeeded == total {
            Outcome::Success
        } else {
            Outcome::Partial
        };
        let message = format!("{}: {}/{} target(s) succeeded", action.tag(), succeeded, total);
        let error = (outcome == Outcome::Failure).then(|| format!("{} failed for all targets", action.tag()));
        ExecutionReport { outcome, message, affected, error, new_affected_pods, cordoned_nodes: Vec::new() }
    }

    fn preview(action: Action, targets: &[PodCandidate]) -> Self {
        let names: Vec<String> = targets.iter().map(|p| p.name.clone()).collect();
        ExecutionReport {
            outcome: Outcome::Success,
            message: format!("DRY RUN: Would {} {} pod(s): {}", dry_run_verb(action), targets.len(), names.join(", ")),
            affected: Vec::new(),
            error: None,
            new_affected_pods: Vec::new(),
            cordoned_nodes: Vec::new(),
        }
    }

    /// Partial success is a per-pod affair and treated as non-terminal; only
    /// a wholesale failure (affecting zero targets) is retry-eligible in the
    /// usual sense (§4.10).
    pub fn is_retryable_failure(&self) -> bool {
        self.outcome == Outcome::Failure
    }

    /// The most restrictive error kind among failed targets, used to decide
    /// retry policy for the attempt as a whole. Validation outranks
    /// Permission outranks Timeout outranks Execution outranks Unknown, so a
    /// single non-retryable failure in the batch is never masked by others.
    pub fn dominant_error_kind(&self) -> Option<ErrorKind> {
        fn rank(kind: ErrorKind) -> u8 {
            match kind {
                ErrorKind::Validation => 0,
                ErrorKind::Permission => 1,
                ErrorKind::Timeout => 2,
                ErrorKind::Execution => 3,
                ErrorKind::Unknown => 4,
            }
        }
        self.affected
            .iter()
            .filter(|t| !t.succeeded)
            .filter_map(|t| t.error_kind)
            .min_by_key(|k| rank(*k))
    }
}

fn dry_run_verb(action: Action) -> &'static str {
    match action {
        Action::PodKill => "delete",
        Action::PodDelay => "delay",
        Action::PodCpuStress => "CPU-stress",
        Action::PodMemoryStress => "memory-stress",
        Action::PodFailure => "kill (SIGKILL) pid 1 in",
        Action::PodNetworkLoss => "inject network loss into",
        Action::PodDiskFill => "fill disk under",
        Action::PodRestart => "gracefully restart",
        Action::NodeDrain => "drain",
    }
}

/// Dispatches one of the eight pod-targeting actions against `targets`.
/// `uid`/`attempt` seed sidecar naming; `dry_run` short-circuits to a preview
/// report with no cluster mutation, matching the dispatcher contract that
/// every action honors dry-run uniformly (§4.6).
pub async fn execute(
    ops: &dyn ClusterOps,
    spec: &ChaosExperimentSpec,
    targets: &[PodCandidate],
    uid: &str,
    attempt: u32,
    dry_run: bool,
) -> ExecutionReport {
    if dry_run {
        return ExecutionReport::preview(spec.action, targets);
    }

    match spec.action {
        Action::PodKill => execute_pod_kill(ops, targets).await,
        Action::PodFailure => execute_signal(ops, targets, "KILL").await,
        Action::PodRestart => execute_restart(ops, spec, targets).await,
        action if action.requires_sidecar() => execute_sidecar_action(ops, spec, targets, uid, attempt).await,
        Action::NodeDrain => unreachable!("node-drain targets nodes, use execute_node_drain"),
    }
}

async fn execute_pod_kill(ops: &dyn ClusterOps, targets: &[PodCandidate]) -> ExecutionReport {
    let mut affected = Vec::new();
    for pod in targets {
        let result = ops.delete_pod(&pod.namespace, &pod.name).await;
        let (succeeded, detail, error_kind) = match result {
            Ok(()) => (true, "deleted".to_string(), None),
            // already terminating is not an error (§4.10).
            Err(e) if e.message.contains("not found") => (true, "already gone".to_string(), None),
            Err(e) => (false, e.actionable_message(), Some(e.kind)),
        };
        affected.push(AffectedTarget { kind: "Pod".to_string(), name: pod.name.clone(), namespace: pod.namespace.clone(), succeeded, detail, error_kind });
    }
    ExecutionReport::from_targets(Action::PodKill, affected, vec![])
}

async fn execute_signal(ops: &dyn ClusterOps, targets: &[PodCandidate], signal: &str) -> ExecutionReport {
    let mut affected = Vec::new();
    for pod in targets {
        let container = resolve_container(ops, pod).await;
        let result = ops.exec_signal(&pod.namespace, &pod.name, &container, signal).await;
        let (succeeded, detail, error_kind) = match result {
            Ok(()) => (true, format!("sent SIG{signal}"), None),
            Err(e) => (false, e.actionable_message(), Some(e.kind)),
        };
        affected.push(AffectedTarget { kind: "Pod".to_string(), name: pod.name.clone(), namespace: pod.namespace.clone(), succeeded, detail, error_kind });
    }
    let action = if signal == "KILL" { Action::PodFailure } else { Action::PodRestart };
    ExecutionReport::from_targets(action, affected, vec![])
}

async fn execute_restart(ops: &dyn ClusterOps, spec: &ChaosExperimentSpec, targets: &[PodCandidate]) -> ExecutionReport {
    let interval = spec
        .restart_interval
        .as_deref()
        .and_then(|d| crate::validator::parse_bounded_duration(d).ok())
        .and_then(|d| d.to_std().ok());

    let mut affected = Vec::new();
    for (i, pod) in targets.iter().enumerate() {
        let container = resolve_container(ops, pod).await;
        let result = ops.exec_signal(&pod.namespace, &pod.name, &container, "TERM").await;
        let (succeeded, detail, error_kind) = match result {
            Ok(()) => (true, "sent SIGTERM".to_string(), None),
            Err(e) => (false, e.actionable_message(), Some(e.kind)),
        };
        affected.push(AffectedTarget { kind: "Pod".to_string(), name: pod.name.clone(), namespace: pod.namespace.clone(), succeeded, detail, error_kind });

        // Cooperative sleep between targets in the same attempt (§5); capped
        // by the number of remaining targets so one reconcile cannot stall.
        if let Some(interval) = interval {
            if i + 1 < targets.len() {
                tokio::time::sleep(interval.min(StdDuration::from_secs(30))).await;
            }
        }
    }
    ExecutionReport::from_targets(Action::PodRestart, affected, vec![])
}

/// Resolves the pod's primary container by re-fetching its snapshot; falls
/// back to `"app"` if the pod has already vanished (delete/failure path
/// should not block on this).
async fn resolve_container(ops: &dyn ClusterOps, pod: &PodCandidate) -> String {
    ops.get_pod(&pod.namespace, &pod.name)
        .await
        .map(|snapshot| snapshot.first_container_name)
        .unwrap_or_else(|_| "app".to_string())
}

async fn execute_sidecar_action(
    ops: &dyn ClusterOps,
    spec: &ChaosExperimentSpec,
    targets: &[PodCandidate],
    uid: &str,
    attempt: u32,
) -> ExecutionReport {
    let params = SidecarParams {
        cpu_load: spec.cpu_load,
        cpu_workers: spec.cpu_workers,
        memory_size: spec.memory_size.clone(),
        memory_workers: spec.memory_workers,
        loss_percentage: spec.loss_percentage,
        loss_correlation: spec.loss_correlation,
        fill_percentage: spec.fill_percentage,
        target_path: Some(spec.target_path.clone()),
    };
    let duration = spec.duration.as_deref().unwrap_or("30s");

    let mut affected = Vec::new();
    let mut new_affected_pods = Vec::new();
    for pod in targets {
        let name = sidecar::sidecar_name(spec.action, uid, attempt);
        let target_container = resolve_container(ops, pod).await;
        let container = match sidecar::build_container(spec.action, duration, &target_container, &name, &params) {
            Ok(c) => c,
            Err(e) => {
                affected.push(AffectedTarget { kind: "Pod".to_string(), name: pod.name.clone(), namespace: pod.namespace.clone(), succeeded: false, detail: e.message.clone(), error_kind: Some(e.kind) });
                continue;
            }
        };
        match sidecar::inject(ops, &pod.namespace, &pod.name, &container).await {
            Ok(handle) => {
                new_affected_pods.push(handle);
                affected.push(AffectedTarget { kind: "Pod".to_string(), name: pod.name.clone(), namespace: pod.namespace.clone(), succeeded: true, detail: format!("injected {name}"), error_kind: None });
            }
            Err(e) => affected.push(AffectedTarget { kind: "Pod".to_string(), name: pod.name.clone(), namespace: pod.namespace.clone(), succeeded: false, detail: e.actionable_message(), error_kind: Some(e.kind) }),
        }
    }
    ExecutionReport::from_targets(spec.action, affected, new_affected_pods)
}

/* ============================= NODE DRAIN ============================= */

#[derive(Debug, Clone)]
pub struct NodeCandidate {
    pub name: String,
}

/// `node-drain` cordons each node then evicts non-DaemonSet-owned pods on it,
/// recording cordoned node names for later uncordon (§4.6).
pub async fn execute_node_drain(ops: &dyn ClusterOps, nodes: &[NodeCandidate], dry_run: bool) -> ExecutionReport {
    if dry_run {
        let names: Vec<String> = nodes.iter().map(|n| n.name.clone()).collect();
        return ExecutionReport {
            outcome: Outcome::Success,
            message: format!("DRY RUN: Would drain {} node(s): {}", nodes.len(), names.join(", ")),
            affected: Vec::new(),
            error: None,
            new_affected_pods: Vec::new(),
            cordoned_nodes: Vec::new(),
        };
    }

    let mut affected = Vec::new();
    let mut cordoned = Vec::new();

    for node in nodes {
        let cordon_result = ops.cordon_node(&node.name, true).await;
        if let Err(e) = cordon_result {
            affected.push(AffectedTarget { kind: "Node".to_string(), name: node.name.clone(), namespace: String::new(), succeeded: false, detail: e.actionable_message(), error_kind: Some(e.kind) });
            continue;
        }
        cordoned.push(node.name.clone());

        let pods = match ops.pods_on_node(&node.name).await {
            Ok(pods) => pods,
            Err(e) => {
                affected.push(AffectedTarget { kind: "Node".to_string(), name: node.name.clone(), namespace: String::new(), succeeded: false, detail: format!("failed to list pods: {}", e.actionable_message()), error_kind: Some(e.kind) });
                continue;
            }
        };
        for pod in pods {
            if pod.owned_by_daemonset {
                continue;
            }
            let result = ops.evict_pod(&pod.namespace, &pod.name).await;
            let (succeeded, detail, error_kind) = match result {
                Ok(()) => (true, "evicted".to_string(), None),
                Err(e) => (false, e.actionable_message(), Some(e.kind)),
            };
            affected.push(AffectedTarget { kind: "Pod".to_string(), name: pod.name, namespace: pod.namespace, succeeded, detail, error_kind });
        }
        affected.push(AffectedTarget { kind: "Node".to_string(), name: node.name.clone(), namespace: String::new(), succeeded: true, detail: "cordoned".to_string(), error_kind: None });
    }

    let mut report = ExecutionReport::from_targets(Action::NodeDrain, affected, vec![]);
    report.cordoned_nodes = cordoned;
    report
}

/// Resolves a pod's owning Deployment/StatefulSet/DaemonSet/ReplicaSet name,
/// collapsing a ReplicaSet hash suffix back to its parent Deployment name
/// (`nginx-7d9f8c6b5d` -> `nginx`). Used to decide whether a pod on a
/// draining node is DaemonSet-owned and therefore must not be evicted.
pub fn strip_replicaset_hash(replicaset_name: &str) -> String {
    match replicaset_name.rsplit_once('-') {
        Some((base, suffix)) if suffix.len() >= 8 && suffix.chars().all(|c| c.is_ascii_alphanumeric()) => base.to_string(),
        _ => replicaset_name.to_string(),
    }
}
