use std::collections::BTreeMap;

use crate::validator::is_production_namespace;

/// A pod as seen by the Safety Gate: just enough to apply the five filters
/// in §4.2 without depending on `k8s_openapi::Pod` directly, so pure logic
/// stays unit-testable without constructing full API objects.
#[derive(Debug, Clone)]
pub struct PodCandidate {
    pub name: String,
    pub namespace: String,
    pub is_terminating: bool,
    pub phase: String,
    pub labels: BTreeMap<String, String>,
}

impl PodCandidate {
    pub fn has_exclude_label(&self) -> bool {
        self.labels.get("chaos.gushchin.dev/exclude").map(String::as_str) == Some("true")
    }

    pub fn is_terminated_phase(&self) -> bool {
        self.is_terminating || matches!(self.phase.as_str(), "Succeeded" | "Failed")
    }
}

/// Re-applies the cluster-aware layer at reconcile time because state drifts
/// between admission and execution (§4.2).
///
/// Steps 1-4 are filters on the candidate list; step 5 (percentage cap) and
/// step 6 (production re-check) are exposed separately since they act on the
/// filtered count and can fail the whole reconcile rather than just drop a pod.
pub fn filter_candidates(candidates: &[PodCandidate], excluded_namespaces: &[String]) -> Vec<PodCandidate> {
    candidates
        .iter()
        .filter(|pod| !pod.is_terminated_phase())
        .filter(|pod| !pod.has_exclude_label())
        .filter(|pod| !excluded_namespaces.iter().any(|ns| ns == &pod.namespace))
        .cloned()
        .collect()
}

/// Applies `maxPercentage` as a cap, never a failure (§4.2 step 5, §4.6 tie-break).
/// Rounds the cap up to 1 when it would otherwise be 0 — the user asked for
/// chaos, so the floor is "do something to one pod", not "do nothing".
pub fn apply_max_percentage_cap(requested_count: u32, eligible: usize, max_percentage: Option<u32>) -> u32 {
    let Some(pct) = max_percentage else {
        return requested_count.min(eligible as u32);
    };
    if eligible == 0 {
        return 0;
    }
    let cap = ((eligible as f64 * pct as f64) / 100.0).ceil() as u32;
    let cap = cap.max(1);
    requested_count.min(cap).min(eligible as u32)
}

/// Re-checks the production gate at reconcile time (§4.2 step 6): a namespace
/// that was relabeled to production since admission fails the reconcile fast,
/// even though admission already passed once.
pub fn recheck_production_gate(
    namespace_name: &str,
    namespace_labels: &BTreeMap<String, String>,
    namespace_annotations: &BTreeMap<String, String>,
    allow_production: bool,
) -> Result<(), String> {
    if is_production_namespace(namespace_name, namespace_labels, namespace_annotations) && !allow_production {
        return Err(format!(
            "namespace `{namespace_name}` is now production; experiment lacks allowProduction=true"
        ));
    }
    Ok(())
}
