use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/* ============================= ACTION VOCABULARY ============================= */

/// The nine fault kinds the engine can inject.
///
/// Wire values are kebab-case and must match the CRD enum exactly.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, JsonSchema, PartialEq, Eq, Hash)]
#[serde(rename_all = "kebab-case")]
pub enum Action {
    PodKill,
    PodDelay,
    PodCpuStress,
    PodMemoryStress,
    PodFailure,
    PodNetworkLoss,
    PodDiskFill,
    PodRestart,
    NodeDrain,
}

impl Action {
    /// Short tag used to build sidecar container names (`<action>-<uid>-<attempt>`).
    pub fn tag(&self) -> &'static str {
        match self {
            Action::PodKill => "pod-kill",
            Action::PodDelay => "pod-delay",
            Action::PodCpuStress => "pod-cpu-stress",
            Action::PodMemoryStress => "pod-memory-stress",
            Action::PodFailure => "pod-failure",
            Action::PodNetworkLoss => "pod-network-loss",
            Action::PodDiskFill => "pod-disk-fill",
            Action::PodRestart => "pod-restart",
            Action::NodeDrain => "node-drain",
        }
    }

    /// Whether this action injects an ephemeral sidecar (vs. delete/exec/patch).
    pub fn requires_sidecar(&self) -> bool {
        matches!(
            self,
            Action::PodDelay
                | Action::PodCpuStress
                | Action::PodMemoryStress
                | Action::PodNetworkLoss
                | Action::PodDiskFill
        )
    }

    /// Whether `duration` is a required field for this action (§3 E1).
    pub fn requires_duration(&self) -> bool {
        self.requires_sidecar()
    }

    /// Whether this action targets Nodes instead of Pods.
    pub fn targets_nodes(&self) -> bool {
        matches!(self, Action::NodeDrain)
    }
}

/* ============================= RETRY POLICY ============================= */

#[derive(Debug, Clone, Copy, Serialize, Deserialize, JsonSchema, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum RetryBackoff {
    #[default]
    Exponential,
    Fixed,
}

/* ============================= TIME WINDOWS ============================= */

/// A single allowed-execution window. Either recurring (daily wall-clock) or absolute.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct TimeWindow {
    /// `"HH:MM"` local start, recurring windows only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start: Option<String>,
    /// `"HH:MM"` local end, recurring windows only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end: Option<String>,
    /// IANA timezone name; defaults to UTC when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timezone: Option<String>,
    /// Restrict the recurring window to these weekdays (`Mon`..`Sun`). Empty means every day.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub days_of_week: Vec<String>,
    /// RFC3339 instant; absolute windows only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_time: Option<String>,
    /// RFC3339 instant; absolute windows only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_time: Option<String>,
}

impl TimeWindow {
    pub fn is_absolute(&self) -> bool {
        self.start_time.is_some() || self.end_time.is_some()
    }
}

/* ============================= SPEC ============================= */

/// ChaosExperiment describes a single fault-injection experiment.
#[derive(CustomResource, Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[kube(
    group = "chaos.gushchin.dev",
    version = "v1",
    kind = "ChaosExperiment",
    plural = "chaosexperiments",
    status = "ChaosExperimentStatus",
    namespaced,
    shortname = "chaosexp",
    printcolumn = r#"{"name":"Action", "type":"string", "jsonPath":".spec.action"}"#,
    printcolumn = r#"{"name":"TargetNamespace", "type":"string", "jsonPath":".spec.targetNamespace"}"#,
    printcolumn = r#"{"name":"Count", "type":"integer", "jsonPath":".spec.count"}"#,
    printcolumn = r#"{"name":"Phase", "type":"string", "jsonPath":".status.phase"}"#,
    printcolumn = r#"{"name":"RetryCount", "type":"integer", "jsonPath":".status.retryCount"}"#,
    printcolumn = r#"{"name":"Age", "type":"date", "jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct ChaosExperimentSpec {
    pub action: Action,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub target_namespace: String,

    /// Label selector; at least one key/value pair is required by the cross-field layer.
    pub selector: std::collections::BTreeMap<String, String>,

    #[serde(default = "default_count")]
    #[schemars(range(min = 1, max = 100))]
    pub count: u32,

    /// Bounded time string (e.g. `"30s"`, `"5m"`, `"1h30m"`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[schemars(regex(pattern = r"^([0-9]+(s|m|h))+$"))]
    pub duration: Option<String>,

    /// Overall experiment lifetime; absent means "runs until deleted".
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[schemars(regex(pattern = r"^([0-9]+(s|m|h))+$"))]
    pub experiment_duration: Option<String>,

    /// Cron expression or predefined token (`@hourly`, ...); absent means single-shot.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schedule: Option<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub time_windows: Vec<TimeWindow>,

    #[serde(default = "default_max_retries")]
    #[schemars(range(min = 0, max = 10))]
    pub max_retries: u32,

    #[serde(default)]
    pub retry_backoff: RetryBackoff,

    #[serde(default = "default_retry_delay")]
    #[schemars(regex(pattern = r"^([0-9]+(s|m|h))+$"))]
    pub retry_delay: String,

    #[serde(default)]
    pub dry_run: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[schemars(range(min = 1, max = 100))]
    pub max_percentage: Option<u32>,

    #[serde(default)]
    pub allow_production: bool,

    // ── action-specific fields ──
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[schemars(range(min = 1, max = 100))]
    pub cpu_load: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[schemars(range(min = 1, max = 32))]
    pub cpu_workers: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[schemars(regex(pattern = r"^[0-9]+[MG]$"))]
    pub memory_size: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[schemars(range(min = 1, max = 8))]
    pub memory_workers: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[schemars(range(min = 1, max = 40))]
    pub loss_percentage: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[schemars(range(min = 0, max = 100))]
    pub loss_correlation: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[schemars(range(min = 50, max = 95))]
    pub fill_percentage: Option<u32>,
    #[serde(default = "default_target_path")]
    pub target_path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub volume_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[schemars(regex(pattern = r"^([0-9]+(s|m|h))+$"))]
    pub restart_interval: Option<String>,
}

fn default_count() -> u32 {
    1
}
fn default_max_retries() -> u32 {
    3
}
fn default_retry_delay() -> String {
    "30s".to_string()
}
fn default_target_path() -> String {
    "/tmp".to_string()
}

/* ============================= STATUS ============================= */

#[derive(Debug, Clone, Copy, Serialize, Deserialize, JsonSchema, PartialEq, Eq, Default)]
#[serde(rename_all = "PascalCase")]
pub enum Phase {
    #[default]
    Pending,
    Running,
    Completed,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "camelCase")]
pub struct ChaosExperimentStatus {
    #[serde(default)]
    pub phase: Phase,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_time: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_run_time: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_scheduled_time: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_scheduled_time: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_retry_time: Option<String>,

    #[serde(default)]
    pub retry_count: u32,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub cordoned_nodes: Vec<String>,

    /// `"namespace/pod:container"` entries for sidecars this experiment injected.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub affected_pods: Vec<String>,

    /// Set while blocked by a time window; eta of the next allowed instant.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub blocked_by_time_window: Option<String>,
}

/* ============================= HISTORY CRD (E2) ============================= */

#[derive(Debug, Clone, Copy, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum ExecutionStatus {
    Success,
    Partial,
    Failure,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum FailureReason {
    ValidationError,
    ResourceNotFound,
    PermissionDenied,
    ExecutionError,
    Timeout,
    Unknown,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ExperimentRef {
    pub name: String,
    pub namespace: String,
    pub uid: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionInfo {
    pub start: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_seconds: Option<f64>,
    pub status: ExecutionStatus,
    pub message: String,
    pub phase: Phase,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct AffectedResource {
    pub kind: String,
    pub name: String,
    pub namespace: String,
    pub action: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub details: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct AuditInfo {
    pub initiated_by: String,
    pub scheduled_execution: bool,
    pub dry_run: bool,
    pub retry_count: u32,
    pub creation_timestamp: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ErrorInfo {
    pub message: String,
    pub code: String,
    pub last_error: String,
    pub failure_reason: FailureReason,
}

/// ChaosExperimentHistory is an immutable audit record of one executed attempt.
#[derive(CustomResource, Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[kube(
    group = "chaos.gushchin.dev",
    version = "v1",
    kind = "ChaosExperimentHistory",
    plural = "chaosexperimenthistories",
    namespaced,
    shortname = "chaoshist",
    printcolumn = r#"{"name":"Experiment", "type":"string", "jsonPath":".spec.experimentRef.name"}"#,
    printcolumn = r#"{"name":"Action", "type":"string", "jsonPath":".spec.experimentSpec.action"}"#,
    printcolumn = r#"{"name":"Status", "type":"string", "jsonPath":".spec.execution.status"}"#,
    printcolumn = r#"{"name":"Duration", "type":"number", "jsonPath":".spec.execution.durationSeconds"}"#,
    printcolumn = r#"{"name":"Age", "type":"date", "jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct ChaosExperimentHistorySpec {
    pub experiment_ref: ExperimentRef,
    pub experiment_spec: ChaosExperimentSpec,
    pub execution: ExecutionInfo,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub affected_resources: Vec<AffectedResource>,
    pub audit: AuditInfo,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorInfo>,
}

/* ============================= TESTS ============================= */
