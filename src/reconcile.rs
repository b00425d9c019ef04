use std::time::Duration as StdDuration;

use chrono::{DateTime, Duration as ChronoDuration, Utc};

use crate::clock::Clock;
use crate::cluster_ops::ClusterOps;
use crate::crd::{ChaosExperimentHistorySpec, ChaosExperimentSpec, ChaosExperimentStatus, ExperimentRef, Phase};
use crate::dispatch::{self, NodeCandidate};
use crate::errors::{ChaosError, ErrorKind};
use crate::history;
use crate::metrics::{self, LifecycleEvent};
use crate::retry;
use crate::safety;
use crate::schedule;
use crate::selector;
use crate::time_window;
use crate::validator;

/// Fallback requeue delay when every configured time window has permanently
/// closed (all-absolute windows, all in the past) and the reconciler has no
/// future boundary to aim for. Not specified by §4.10's pseudocode, which
/// assumes a window always reopens; without this the reconciler would return
/// `Done` and never look at the experiment again even though it's still
/// `Pending`.
const STUCK_WINDOW_FALLBACK: ChronoDuration = ChronoDuration::hours(1);

/// Stable identity fields the reconciler needs but doesn't own (§3 E1): the
/// `(namespace, name, uid)` triple plus `generation`, used to seed the
/// selector's deterministic PRNG, and `creationTimestamp`, the fallback
/// trigger instant for single-shot experiments.
#[derive(Debug, Clone)]
pub struct ExperimentIdentity {
    pub name: String,
    pub namespace: String,
    pub uid: String,
    pub generation: i64,
    pub creation_timestamp: DateTime<Utc>,
}

/// What the caller (the `kube::runtime::Controller` driver, or a test) should
/// do next. Mirrors §9's REDESIGN FLAGS: a `Reconciler` trait boundary that
/// never leaks the framework's own requeue type into this module.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum NextAction {
    RequeueAfter(StdDuration),
    RequeueNow,
    Done,
}

impl NextAction {
    fn requeue_at(now: DateTime<Utc>, at: DateTime<Utc>) -> NextAction {
        let delta = at - now;
        match delta.to_std() {
            Ok(d) => NextAction::RequeueAfter(d),
            Err(_) => NextAction::RequeueNow,
        }
    }
}

/// Everything one `reconcile_once` call produced: the status to persist, what
/// to do next, and (on an executed attempt) the immutable history record and
/// lifecycle event the caller must emit. Kept separate from side effects so
/// the state machine itself stays a pure-ish async function over the
/// `ClusterOps`/`Clock` collaborators, matching the rest of this crate's
/// "narrow trait, fake double in tests" shape.
#[derive(Debug, Clone)]
pub struct ReconcileOutcome {
    pub status: ChaosExperimentStatus,
    pub next_action: NextAction,
    pub history: Option<ChaosExperimentHistorySpec>,
    pub lifecycle_event: Option<LifecycleEvent>,
}

fn parse_ts(s: &Option<String>) -> Option<DateTime<Utc>> {
    s.as_deref()
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|dt| dt.with_timezone(&Utc))
}

fn fmt_ts(t: DateTime<Utc>) -> String {
    t.to_rfc3339()
}

/// The master state machine (§4.10). Drives one experiment through
/// Pending -> Running -> Completed/Failed, consulting every other component
/// in turn. Returns the status to persist and the next action for the
/// caller's work queue; never panics on a cluster-API error, matching §7's
/// propagation policy.
#[allow(clippy::too_many_lines)]
pub async fn reconcile_once(
    ops: &dyn ClusterOps,
    clock: &dyn Clock,
    identity: &ExperimentIdentity,
    spec: &ChaosExperimentSpec,
    status: &ChaosExperimentStatus,
    history_namespace: &str,
) -> Result<ReconcileOutcome, ChaosError> {
    let now = clock.now();
    let mut next = status.clone();

    // Terminal states perform best-effort cleanup once, then fall idle.
    if matches!(next.phase, Phase::Completed | Phase::Failed) {
        if next.cordoned_nodes.is_empty() && next.affected_pods.is_empty() {
            return Ok(ReconcileOutcome { status: next, next_action: NextAction::Done, history: None, lifecycle_event: None });
        }
        terminal_cleanup(ops, &mut next).await;
        return Ok(ReconcileOutcome { status: next, next_action: NextAction::Done, history: None, lifecycle_event: None });
    }

    // 1) Overall lifetime.
    if let (Some(experiment_duration), Some(start_time)) = (&spec.experiment_duration, parse_ts(&next.start_time)) {
        if let Ok(lifetime) = validator::parse_bounded_duration(experiment_duration) {
            if start_time + lifetime <= now {
                next.phase = Phase::Completed;
                next.completed_at = Some(fmt_ts(now));
                next.message = Some("experiment lifetime elapsed".to_string());
                terminal_cleanup(ops, &mut next).await;
                let report = dispatch::ExecutionReport {
                    outcome: dispatch::Outcome::Success,
                    message: "experiment lifetime elapsed".to_string(),
                    affected: vec![],
                    error: None,
                    new_affected_pods: vec![],
                    cordoned_nodes: vec![],
                };
                let record = build_history(identity, spec, start_time, now, Phase::Completed, &report, None, next.retry_count, spec.schedule.is_some());
                return Ok(ReconcileOutcome {
                    status: next,
                    next_action: NextAction::Done,
                    history: Some(record),
                    lifecycle_event: Some(LifecycleEvent::ExperimentSucceeded),
                });
            }
        }
    }

    // 2) Scheduling gate.
    let next_trigger = match &spec.schedule {
        Some(cron) => {
            let after = parse_ts(&next.last_scheduled_time).unwrap_or(identity.creation_timestamp);
            match schedule::next_fire(cron, after) {
                Ok(t) => t,
                Err(e) => return Err(ChaosError::validation("schedule_evaluator", e)),
            }
        }
        None => identity.creation_timestamp,
    };

    // 3) Time-window gate. Checked against whichever is later of the trigger
    // and "now": a trigger already in the past must advance relative to the
    // current instant, or a single-shot blocked once would stay blocked
    // forever re-evaluating the same historical instant.
    let check_instant = next_trigger.max(now);
    if !time_window::allows(&spec.time_windows, check_instant) {
        match time_window::next_boundary(&spec.time_windows, check_instant) {
            Some(eta) => {
                next.blocked_by_time_window = Some(fmt_ts(eta));
                return Ok(ReconcileOutcome { status: next, next_action: NextAction::requeue_at(now, eta), history: None, lifecycle_event: None });
            }
            None => {
                next.message = Some("all configured time windows have elapsed; no future execution is possible".to_string());
                return Ok(ReconcileOutcome { status: next, next_action: NextAction::RequeueAfter(STUCK_WINDOW_FALLBACK.to_std().unwrap()), history: None, lifecycle_event: None });
            }
        }
    }
    next.blocked_by_time_window = None;

    // 4) Retry wait.
    if let Some(retry_at) = parse_ts(&next.next_retry_time) {
        if retry_at > now {
            return Ok(ReconcileOutcome { status: next, next_action: NextAction::requeue_at(now, retry_at), history: None, lifecycle_event: None });
        }
    }

    // 5) Not-yet-time.
    if next_trigger > now {
        return Ok(ReconcileOutcome { status: next, next_action: NextAction::requeue_at(now, next_trigger), history: None, lifecycle_event: None });
    }

    // 6) Execute one attempt.
    next.phase = Phase::Running;
    let start_time = parse_ts(&next.start_time).unwrap_or(now);
    next.start_time = Some(fmt_ts(start_time));
    metrics::record_experiment_attempt(spec.action.tag(), &spec.target_namespace);
    if spec.dry_run {
        metrics::record_dry_run();
    }

    let attempt = next.retry_count + 1;
    let report = if spec.action.targets_nodes() {
        execute_node_action(ops, spec, identity, attempt).await
    } else {
        execute_pod_action(ops, spec, identity, attempt).await
    };

    let report = match report {
        Ok(r) => r,
        Err(e) => {
            metrics::record_experiment_error(spec.action.tag(), e.kind.as_metric_label());
            let message = e.actionable_message();
            let empty = dispatch::ExecutionReport { outcome: dispatch::Outcome::Failure, message: e.message.clone(), affected: vec![], error: Some(message.clone()), new_affected_pods: vec![], cordoned_nodes: vec![] };

            // Safety-gate re-check (e.g. production gate) is classified as
            // `Validation` and is never retried (§4.2 step 6, §4.9). Every
            // other kind (Permission/Timeout/Execution/Unknown) can come
            // from `list_pods`/`namespace_facts` just as easily as from the
            // dispatcher itself (§7: "Permission | 403/401 from any API
            // call"), so it goes through the same per-kind retry policy.
            if e.kind != ErrorKind::Validation && retry::should_retry(e.kind, next.retry_count, spec.max_retries) {
                next.retry_count += 1;
                let base_delay = validator::parse_bounded_duration(&spec.retry_delay).unwrap_or(ChronoDuration::seconds(30));
                let delay = retry::next_delay(e.kind, spec.retry_backoff, base_delay, next.retry_count - 1);
                next.next_retry_time = Some(fmt_ts(now + delay));
                next.last_error = Some(message.clone());
                next.message = Some(message.clone());
                let record = build_history(identity, spec, start_time, now, Phase::Running, &empty, Some(&e), next.retry_count, spec.schedule.is_some());
                let next_action = next_requeue_action(now, &next);
                return Ok(ReconcileOutcome { status: next, next_action, history: Some(record), lifecycle_event: Some(LifecycleEvent::ExperimentRetrying) });
            }

            next.phase = Phase::Failed;
            next.last_error = Some(message);
            next.next_retry_time = None;
            terminal_cleanup(ops, &mut next).await;
            let record = build_history(identity, spec, start_time, now, Phase::Failed, &empty, Some(&e), next.retry_count, spec.schedule.is_some());
            return Ok(ReconcileOutcome { status: next, next_action: NextAction::Done, history: Some(record), lifecycle_event: Some(LifecycleEvent::ExperimentFailed) });
        }
    };

    for pod in &report.new_affected_pods {
        if !next.affected_pods.contains(pod) {
            next.affected_pods.push(pod.clone());
        }
    }
    for node in &report.cordoned_nodes {
        if !next.cordoned_nodes.contains(node) {
            next.cordoned_nodes.push(node.clone());
        }
    }

    let succeeded_count = report.affected.iter().filter(|t| t.succeeded).count() as u64;
    metrics::record_resources_affected(spec.action.tag(), &spec.target_namespace, succeeded_count);

    let (history_phase, lifecycle_event, outcome_error) = if report.is_retryable_failure() {
        let kind = report.dominant_error_kind().unwrap_or(ErrorKind::Execution);
        let message = report.error.clone().unwrap_or_else(|| "attempt affected no targets".to_string());
        metrics::record_experiment_error(spec.action.tag(), kind.as_metric_label());

        if retry::should_retry(kind, next.retry_count, spec.max_retries) {
            next.retry_count += 1;
            let base_delay = validator::parse_bounded_duration(&spec.retry_delay).unwrap_or(ChronoDuration::seconds(30));
            let delay = retry::next_delay(kind, spec.retry_backoff, base_delay, next.retry_count - 1);
            next.next_retry_time = Some(fmt_ts(now + delay));
            next.last_error = Some(message.clone());
            (Phase::Running, Some(LifecycleEvent::ExperimentRetrying), Some(message))
        } else {
            next.phase = Phase::Failed;
            next.next_retry_time = None;
            next.last_error = Some(message.clone());
            terminal_cleanup(ops, &mut next).await;
            (Phase::Failed, Some(LifecycleEvent::ExperimentFailed), Some(message))
        }
    } else {
        next.retry_count = 0;
        next.last_error = None;
        next.next_retry_time = None;

        if let Some(cron) = &spec.schedule {
            next.last_scheduled_time = Some(fmt_ts(next_trigger));
            match schedule::next_fire(cron, next_trigger) {
                Ok(t) => next.next_scheduled_time = Some(fmt_ts(t)),
                Err(_) => next.next_scheduled_time = None,
            }
        } else {
            next.phase = Phase::Completed;
            next.completed_at = Some(fmt_ts(now));
            terminal_cleanup(ops, &mut next).await;
        }
        (next.phase, Some(LifecycleEvent::ExperimentSucceeded), None)
    };

    next.message = Some(report.message.clone());
    next.last_run_time = Some(fmt_ts(now));
    metrics::observe_experiment_duration(spec.action.tag(), (now - start_time).num_milliseconds() as f64 / 1000.0);

    let classified_error = outcome_error.as_ref().map(|m| ChaosError::new(ErrorKind::Execution, "dispatch", m.clone()));
    let record = build_history(identity, spec, start_time, now, history_phase, &report, classified_error.as_ref(), next.retry_count, spec.schedule.is_some());

    let next_action = next_requeue_action(now, &next);

    Ok(ReconcileOutcome { status: next, next_action, history: Some(record), lifecycle_event })
}

/// The minimum of every pending future instant: next retry, next scheduled
/// fire. `Done` when the experiment reached a terminal phase with nothing
/// left pending (single-shot success/failure already folded in above).
fn next_requeue_action(now: DateTime<Utc>, status: &ChaosExperimentStatus) -> NextAction {
    if matches!(status.phase, Phase::Completed | Phase::Failed) {
        return NextAction::Done;
    }
    let mut candidates = Vec::new();
    if let Some(t) = parse_ts(&status.next_retry_time) {
        candidates.push(t);
    }
    if let Some(t) = parse_ts(&status.next_scheduled_time) {
        candidates.push(t);
    }
    match candidates.into_iter().min() {
        Some(t) => NextAction::requeue_at(now, t),
        None => NextAction::RequeueNow,
    }
}

#[allow(clippy::too_many_arguments)]
fn build_history(
    identity: &ExperimentIdentity,
    spec: &ChaosExperimentSpec,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    phase: Phase,
    report: &dispatch::ExecutionReport,
    error: Option<&ChaosError>,
    retry_count: u32,
    scheduled: bool,
) -> ChaosExperimentHistorySpec {
    let experiment_ref = ExperimentRef { name: identity.name.clone(), namespace: identity.namespace.clone(), uid: identity.uid.clone() };
    history::build_record(experiment_ref, spec.clone(), start, end, phase, report, error, retry_count, scheduled)
}

/// Resolves eligible pods (Safety Gate re-check, §4.2), selects the subset to
/// act on (§4.3), and dispatches the action (§4.6).
async fn execute_pod_action(
    ops: &dyn ClusterOps,
    spec: &ChaosExperimentSpec,
    identity: &ExperimentIdentity,
    attempt: u32,
) -> Result<dispatch::ExecutionReport, ChaosError> {
    let (ns_labels, ns_annotations) = ops.namespace_facts(&spec.target_namespace).await?;
    safety::recheck_production_gate(&spec.target_namespace, &ns_labels, &ns_annotations, spec.allow_production)
        .map_err(|e| ChaosError::validation("safety_gate", e))?;

    let namespace_excluded = ns_annotations.get("chaos.gushchin.dev/exclude").map(String::as_str) == Some("true");
    let excluded_namespaces: Vec<String> = if namespace_excluded { vec![spec.target_namespace.clone()] } else { vec![] };

    let candidates = ops.list_pods(&spec.target_namespace, &spec.selector).await?;
    let eligible = safety::filter_candidates(&candidates, &excluded_namespaces);
    if candidates.len() > eligible.len() {
        metrics::record_excluded_resources((candidates.len() - eligible.len()) as u64);
    }

    let requested = safety::apply_max_percentage_cap(spec.count, eligible.len(), spec.max_percentage);
    if spec.max_percentage.is_some() && requested < spec.count.min(eligible.len() as u32) {
        metrics::record_percentage_block();
    }

    let eligible_refs: Vec<&safety::PodCandidate> = eligible.iter().collect();
    let targets = selector::pick(&eligible_refs, requested, &identity.uid, identity.generation, attempt);
    let targets_owned: Vec<safety::PodCandidate> = targets.into_iter().cloned().collect();

    Ok(dispatch::execute(ops, spec, &targets_owned, &identity.uid, attempt, spec.dry_run).await)
}

/// `node-drain` targets Nodes rather than Pods; selection is a deterministic
/// take-first-N by name rather than the PRNG used for pods, since the
/// percentage cap and idempotence requirements are the same but nodes are
/// rarely more than a handful and a stable order is easier to reason about
/// operationally (§4.6, §4.10).
async fn execute_node_action(
    ops: &dyn ClusterOps,
    spec: &ChaosExperimentSpec,
    _identity: &ExperimentIdentity,
    _attempt: u32,
) -> Result<dispatch::ExecutionReport, ChaosError> {
    let (ns_labels, ns_annotations) = ops.namespace_facts(&spec.target_namespace).await?;
    safety::recheck_production_gate(&spec.target_namespace, &ns_labels, &ns_annotations, spec.allow_production)
        .map_err(|e| ChaosError::validation("safety_gate", e))?;

    let mut nodes = ops.list_nodes(&spec.selector).await?;
    nodes.sort_by(|a, b| a.name.cmp(&b.name));
    let requested = safety::apply_max_percentage_cap(spec.count, nodes.len(), spec.max_percentage) as usize;
    let targets: Vec<NodeCandidate> = nodes.into_iter().take(requested).map(|n| NodeCandidate { name: n.name }).collect();

    Ok(dispatch::execute_node_drain(ops, &targets, spec.dry_run).await)
}

/// Best-effort uncordon + forget on a terminal transition (§3 E1 invariants,
/// §5 "Cancellation"). Failures are logged, never re-raised; both lists are
/// always cleared so a flaky uncordon can't wedge the experiment in a
/// permanent residual-cleanup state.
async fn terminal_cleanup(ops: &dyn ClusterOps, status: &mut ChaosExperimentStatus) {
    let mut residual = false;
    for node in std::mem::take(&mut status.cordoned_nodes) {
        if let Err(e) = ops.cordon_node(&node, false).await {
            tracing::warn!(node = %node, error = %e.actionable_message(), "uncordon_failed_during_cleanup");
            residual = true;
        }
    }
    // Ephemeral containers can't be removed, only forgotten (§9); dropping
    // the handle is the entire "cleanup" for affected_pods.
    status.affected_pods.clear();
    if residual {
        status.message = Some(format!("{}; some nodes could not be uncordoned", status.message.clone().unwrap_or_default()));
    }
}
