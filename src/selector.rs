use std::collections::BTreeMap;

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;

use crate::safety::PodCandidate;

/// Candidate eligibility report returned alongside the selection, used by
/// dry-run previews to describe what *would* be affected.
#[derive(Debug, Clone)]
pub struct EligibilityReport {
    pub candidate_count: usize,
    pub eligible_count: usize,
    pub selected_count: usize,
}

/// Resolves a label selector against a candidate pod list: every key/value
/// pair in `selector` must match. Order of `pods` is preserved.
pub fn resolve_candidates<'a>(
    pods: &'a [PodCandidate],
    selector: &BTreeMap<String, String>,
) -> Vec<&'a PodCandidate> {
    pods.iter()
        .filter(|pod| selector.iter().all(|(k, v)| pod.labels.get(k) == Some(v)))
        .collect()
}

/// Picks `count` pods from `eligible` using a deterministic pseudo-random
/// permutation seeded by `(uid, generation, attempt)` (§4.3, §9).
///
/// Two reconciles of the *same* attempt produce the identical subset
/// (idempotence); a new attempt (incremented `attempt`) explores a different
/// subset.
pub fn pick<'a>(eligible: &[&'a PodCandidate], count: u32, uid: &str, generation: i64, attempt: u32) -> Vec<&'a PodCandidate> {
    let mut rng = StdRng::seed_from_u64(seed_from(uid, generation, attempt));
    let mut pool: Vec<&PodCandidate> = eligible.to_vec();
    pool.shuffle(&mut rng);
    pool.truncate(count as usize);
    pool
}

/// Combines `(uid, generation, attempt)` into one seed via FNV-1a so the
/// same triple always yields the same permutation across process restarts.
fn seed_from(uid: &str, generation: i64, attempt: u32) -> u64 {
    const FNV_OFFSET: u64 = 0xcbf29ce484222325;
    const FNV_PRIME: u64 = 0x100000001b3;

    let mut hash = FNV_OFFSET;
    for byte in uid.as_bytes() {
        hash ^= *byte as u64;
        hash = hash.wrapping_mul(FNV_PRIME);
    }
    for byte in generation.to_le_bytes() {
        hash ^= byte as u64;
        hash = hash.wrapping_mul(FNV_PRIME);
    }
    for byte in attempt.to_le_bytes() {
        hash ^= byte as u64;
        hash = hash.wrapping_mul(FNV_PRIME);
    }
    hash
}
