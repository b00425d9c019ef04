mod common;

use chaos_operator::safety::{apply_max_percentage_cap, filter_candidates, recheck_production_gate};
use chaos_operator::selector::{pick, resolve_candidates};

use common::make_test_pod;

/* ============================= HELPERS ============================= */

fn nginx_pool(n: usize) -> Vec<chaos_operator::safety::PodCandidate> {
    (0..n)
        .map(|i| make_test_pod(&format!("nginx-{i}"), "default", &[("app", "nginx")], "Running", false))
        .collect()
}

/* ============================= FULL PIPELINE TESTS ============================= */

/// filter -> cap -> select, chained exactly as the reconciler does before
/// dispatch, on a clean pool of ten matching pods capped at 30%.
#[test]
fn test_full_selection_pipeline_respects_cap_and_selector() {
    let pods = nginx_pool(10);
    let filtered = filter_candidates(&pods, &[]);
    assert_eq!(filtered.len(), 10);

    let candidates = resolve_candidates(&filtered, &std::collections::BTreeMap::from([("app".to_string(), "nginx".to_string())]));
    assert_eq!(candidates.len(), 10);

    let capped = apply_max_percentage_cap(10, candidates.len(), Some(30));
    assert_eq!(capped, 3);

    let picked = pick(&candidates, capped, "uid-1", 1, 1);
    assert_eq!(picked.len(), 3);
}

/// Terminating pods and the exclude label never survive `filter_candidates`,
/// so the selector never even sees them.
#[test]
fn test_filter_drops_terminating_and_excluded_before_selection() {
    let mut pods = nginx_pool(3);
    pods.push(make_test_pod("nginx-terminating", "default", &[("app", "nginx")], "Running", true));
    pods.push(make_test_pod("nginx-excluded", "default", &[("app", "nginx"), ("chaos.gushchin.dev/exclude", "true")], "Running", false));
    pods.push(make_test_pod("nginx-succeeded", "default", &[("app", "nginx")], "Succeeded", false));

    let filtered = filter_candidates(&pods, &[]);
    assert_eq!(filtered.len(), 3);
    assert!(filtered.iter().all(|p| p.name.starts_with("nginx-") && !p.name.contains("terminating") && !p.name.contains("excluded") && !p.name.contains("succeeded")));
}

/// Excluded namespaces are dropped even when the pod itself has no exclude
/// label.
#[test]
fn test_filter_drops_excluded_namespace() {
    let mut pods = nginx_pool(2);
    pods.push(make_test_pod("nginx-quarantine", "quarantine", &[("app", "nginx")], "Running", false));

    let filtered = filter_candidates(&pods, &["quarantine".to_string()]);
    assert_eq!(filtered.len(), 2);
    assert!(filtered.iter().all(|p| p.namespace == "default"));
}

/// A `maxPercentage` that floors to zero rounds up to one rather than
/// silently skipping the experiment entirely.
#[test]
fn test_max_percentage_rounding_to_zero_picks_one() {
    let capped = apply_max_percentage_cap(5, 100, Some(1));
    assert_eq!(capped, 1);
}

/// The cap never exceeds the eligible pool even when the requested count or
/// percentage would allow more.
#[test]
fn test_cap_never_exceeds_eligible_pool() {
    let capped = apply_max_percentage_cap(50, 4, Some(100));
    assert_eq!(capped, 4);
}

/// The same attempt number always selects the same subset (idempotence),
/// while a new attempt explores a different one.
#[test]
fn test_selection_is_idempotent_per_attempt_and_diverges_across_attempts() {
    let pods = nginx_pool(20);
    let filtered = filter_candidates(&pods, &[]);
    let refs: Vec<&chaos_operator::safety::PodCandidate> = filtered.iter().collect();

    let first = pick(&refs, 5, "uid-42", 3, 1);
    let first_again = pick(&refs, 5, "uid-42", 3, 1);
    assert_eq!(first.iter().map(|p| &p.name).collect::<Vec<_>>(), first_again.iter().map(|p| &p.name).collect::<Vec<_>>());

    let second_attempt = pick(&refs, 5, "uid-42", 3, 2);
    assert_ne!(first.iter().map(|p| &p.name).collect::<Vec<_>>(), second_attempt.iter().map(|p| &p.name).collect::<Vec<_>>());
}

/// The reconcile-time safety recheck independently catches a namespace that
/// turned production between admission and dispatch.
#[test]
fn test_recheck_production_gate_blocks_newly_production_namespace() {
    let labels = std::collections::BTreeMap::from([("environment".to_string(), "production".to_string())]);
    let annotations = std::collections::BTreeMap::new();
    let blocked = recheck_production_gate("checkout", &labels, &annotations, false);
    assert!(blocked.is_err());
}

/// The same recheck passes through untouched when `allowProduction` was set.
#[test]
fn test_recheck_production_gate_allows_when_flag_set() {
    let labels = std::collections::BTreeMap::from([("environment".to_string(), "production".to_string())]);
    let annotations = std::collections::BTreeMap::new();
    let blocked = recheck_production_gate("checkout", &labels, &annotations, true);
    assert!(blocked.is_ok());
}
