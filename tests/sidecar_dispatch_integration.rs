mod common;

use chaos_operator::crd::Action;
use chaos_operator::dispatch::{execute, Outcome};
use chaos_operator::sidecar::{build_container, inject, sidecar_name, SidecarParams};

use common::{make_test_experiment, make_test_pod, TestClusterOps};

/* ============================= FULL PIPELINE TESTS ============================= */

/// Building a sidecar container for `pod-cpu-stress` and injecting it
/// against a fake pod succeeds on the first attempt with no conflicts.
#[tokio::test]
async fn test_build_and_inject_sidecar_succeeds_without_conflict() {
    let ops = TestClusterOps::new().with_pod(make_test_pod("nginx-0", "default", &[("app", "nginx")], "Running", false));
    let params = SidecarParams { cpu_load: Some(80), cpu_workers: Some(2), ..Default::default() };
    let name = sidecar_name(Action::PodCpuStress, "pod-uid-1", 1);
    let container = build_container(Action::PodCpuStress, "30s", "app", &name, &params).unwrap();

    let handle = inject(&ops, "default", "nginx-0", &container).await.unwrap();
    assert_eq!(handle, name);
    assert_eq!(ops.injected_containers.lock().unwrap().len(), 1);
}

/// A resource-version conflict on the first two attempts still resolves to
/// success on the third, exercising the injector's retry loop end to end.
#[tokio::test]
async fn test_inject_retries_through_conflicts_then_succeeds() {
    let ops = TestClusterOps::new()
        .with_pod(make_test_pod("nginx-0", "default", &[("app", "nginx")], "Running", false))
        .with_conflicts(2);
    let params = SidecarParams { loss_percentage: Some(15), ..Default::default() };
    let name = sidecar_name(Action::PodNetworkLoss, "pod-uid-1", 1);
    let container = build_container(Action::PodNetworkLoss, "1m", "app", &name, &params).unwrap();

    let handle = inject(&ops, "default", "nginx-0", &container).await.unwrap();
    assert_eq!(handle, name);
    assert_eq!(ops.injected_containers.lock().unwrap().len(), 1);
}

/// The full dispatcher correctly routes a `pod-kill` spec to a plain delete,
/// with no sidecar involvement at all.
#[tokio::test]
async fn test_dispatch_pod_kill_deletes_targets_directly() {
    let ops = TestClusterOps::new();
    let spec = make_test_experiment(Action::PodKill);
    let targets = vec![
        make_test_pod("nginx-0", "default", &[("app", "nginx")], "Running", false),
        make_test_pod("nginx-1", "default", &[("app", "nginx")], "Running", false),
    ];

    let report = execute(&ops, &spec, &targets, "exp-uid", 1, false).await;
    assert_eq!(report.outcome, Outcome::Success);
    assert_eq!(ops.deleted_pods.lock().unwrap().len(), 2);
}

/// A dry-run dispatch never mutates the cluster regardless of action, and
/// the preview message names the verb and targets.
#[tokio::test]
async fn test_dispatch_dry_run_never_mutates_cluster() {
    let ops = TestClusterOps::new().with_pod(make_test_pod("nginx-0", "default", &[("app", "nginx")], "Running", false));
    let spec = make_test_experiment(Action::PodCpuStress);
    let targets = vec![make_test_pod("nginx-0", "default", &[("app", "nginx")], "Running", false)];

    let report = execute(&ops, &spec, &targets, "exp-uid", 1, true).await;
    assert!(report.message.contains("DRY RUN"));
    assert!(ops.injected_containers.lock().unwrap().is_empty());
}

/// Dispatching a sidecar action against a real fake pod produces exactly one
/// ephemeral container and records the affected-pod handle the reconciler
/// persists to status.
#[tokio::test]
async fn test_dispatch_sidecar_action_injects_exactly_one_container_per_target() {
    let ops = TestClusterOps::new().with_pod(make_test_pod("nginx-0", "default", &[("app", "nginx")], "Running", false));
    let spec = make_test_experiment(Action::PodMemoryStress);
    let targets = vec![make_test_pod("nginx-0", "default", &[("app", "nginx")], "Running", false)];

    let report = execute(&ops, &spec, &targets, "exp-uid-2", 1, false).await;
    assert_eq!(report.outcome, Outcome::Success);
    assert_eq!(ops.injected_containers.lock().unwrap().len(), 1);
    assert_eq!(report.new_affected_pods.len(), 1);
}
