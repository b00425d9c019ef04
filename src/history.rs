use chrono::{DateTime, Duration, Utc};

use crate::cluster_ops::ClusterOps;
use crate::crd::{
    AffectedResource, AuditInfo, ChaosExperimentHistorySpec, ChaosExperimentSpec, ErrorInfo, ExecutionInfo,
    ExecutionStatus, ExperimentRef, FailureReason, Phase,
};
use crate::dispatch::{AffectedTarget, ExecutionReport, Outcome};
use crate::errors::{ChaosError, ErrorKind};

/// Default count cap: keep the most recent N records per experiment (§4.11).
pub const DEFAULT_RETENTION_LIMIT: u32 = 100;

/// Builds the immutable history record for one executed attempt, including
/// dry-run and failed attempts (§4.11). `now`/`started_at` are injected so
/// tests don't depend on wall-clock time.
#[allow(clippy::too_many_arguments)]
pub fn build_record(
    experiment_ref: ExperimentRef,
    experiment_spec: ChaosExperimentSpec,
    started_at: DateTime<Utc>,
    ended_at: DateTime<Utc>,
    phase: Phase,
    report: &ExecutionReport,
    error: Option<&ChaosError>,
    retry_count: u32,
    scheduled_execution: bool,
) -> ChaosExperimentHistorySpec {
    let status = match report.outcome {
        Outcome::Success => ExecutionStatus::Success,
        Outcome::Partial => ExecutionStatus::Partial,
        Outcome::Failure => ExecutionStatus::Failure,
    };

    let dry_run = experiment_spec.dry_run;
    let duration_seconds = (ended_at - started_at).num_milliseconds() as f64 / 1000.0;

    let affected_resources: Vec<AffectedResource> = report
        .affected
        .iter()
        .map(|t: &AffectedTarget| AffectedResource {
            kind: t.kind.clone(),
            name: t.name.clone(),
            namespace: t.namespace.clone(),
            action: experiment_spec.action.tag().to_string(),
            details: t.detail.clone(),
        })
        .collect();

    let error_info = error.map(|e| ErrorInfo {
        message: e.actionable_message(),
        code: e.kind.as_metric_label().to_string(),
        last_error: e.message.clone(),
        failure_reason: failure_reason(e.kind),
    });

    ChaosExperimentHistorySpec {
        experiment_ref,
        experiment_spec,
        execution: ExecutionInfo {
            start: started_at.to_rfc3339(),
            end: Some(ended_at.to_rfc3339()),
            duration_seconds: Some(duration_seconds),
            status,
            message: report.message.clone(),
            phase,
        },
        affected_resources,
        audit: AuditInfo {
            initiated_by: if scheduled_execution { "schedule".to_string() } else { "manual".to_string() },
            scheduled_execution,
            dry_run,
            retry_count,
            creation_timestamp: ended_at.to_rfc3339(),
        },
        error: error_info,
    }
}

fn failure_reason(kind: ErrorKind) -> FailureReason {
    match kind {
        ErrorKind::Validation => FailureReason::ValidationError,
        ErrorKind::Permission => FailureReason::PermissionDenied,
        ErrorKind::Timeout => FailureReason::Timeout,
        ErrorKind::Execution => FailureReason::ExecutionError,
        ErrorKind::Unknown => FailureReason::Unknown,
    }
}

/// Persists one history record; never updates an existing one (§4.11).
pub async fn record(ops: &dyn ClusterOps, history_namespace: &str, record: &ChaosExperimentHistorySpec) -> Result<String, ChaosError> {
    ops.create_history_record(history_namespace, record).await
}

/// Reason a history record was deleted, used for the `history_deleted_total{reason}` metric.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeletionReason {
    CountCap,
    Ttl,
}

/// Enforces both the count cap and TTL cap for one experiment's records
/// (§4.11). A record violating either cap is deleted. Returns the deleted
/// record names with their reason, for metrics accounting.
pub async fn enforce_retention(
    ops: &dyn ClusterOps,
    history_namespace: &str,
    experiment_name: &str,
    retention_limit: u32,
    ttl: Option<Duration>,
    now: DateTime<Utc>,
) -> Result<Vec<(String, DeletionReason)>, ChaosError> {
    let mut records = ops.list_history_records(history_namespace, experiment_name).await?;
    // Newest first.
    records.sort_by(|a, b| b.1.cmp(&a.1));

    let mut to_delete: Vec<(String, DeletionReason)> = Vec::new();

    if retention_limit > 0 {
        for (name, _) in records.iter().skip(retention_limit as usize) {
            to_delete.push((name.clone(), DeletionReason::CountCap));
        }
    }

    if let Some(ttl) = ttl {
        let cutoff = now - ttl;
        for (name, created_at) in &records {
            if *created_at < cutoff && !to_delete.iter().any(|(n, _)| n == name) {
                to_delete.push((name.clone(), DeletionReason::Ttl));
            }
        }
    }

    for (name, _) in &to_delete {
        ops.delete_history_record(history_namespace, name).await?;
    }

    Ok(to_delete)
}
