use async_trait::async_trait;

use crate::crd::ChaosExperimentHistorySpec;
use crate::errors::{ChaosError, ErrorKind};
use crate::safety::PodCandidate;

/// An ephemeral container declaration as understood by the injector, kept
/// narrow so callers don't need the full `k8s_openapi` `EphemeralContainer`
/// type to unit test dispatch logic.
#[derive(Debug, Clone, PartialEq)]
pub struct EphemeralContainerSpec {
    pub name: String,
    pub image: String,
    pub command: Vec<String>,
    pub args: Vec<String>,
    pub target_container_name: String,
    pub add_capabilities: Vec<String>,
    /// `resources.limits` entries (e.g. `"cpu" -> "1600m"`, `"memory" ->
    /// "1073741824"`). For CPU/memory stress these mirror the requested
    /// load so the sidecar cannot exceed the pod's own limit (§4.6, §4.7);
    /// network/disk actions carry a minimal fixed footprint instead.
    pub resource_limits: std::collections::BTreeMap<String, String>,
}

/// A pod as returned by a `Get`, carrying the resource version needed for the
/// sidecar injector's compare-and-swap loop.
#[derive(Debug, Clone)]
pub struct PodSnapshot {
    pub namespace: String,
    pub name: String,
    pub uid: String,
    pub resource_version: String,
    pub first_container_name: String,
    pub owner_kind: Option<String>,
    pub owner_name: Option<String>,
}

/// A node as seen by the selector when resolving `node-drain` targets.
#[derive(Debug, Clone)]
pub struct NodeInfo {
    pub name: String,
    pub labels: std::collections::BTreeMap<String, String>,
}

/// A pod found on a node being drained, with enough ownership information to
/// decide whether it must be skipped (DaemonSet-owned pods are never evicted).
#[derive(Debug, Clone)]
pub struct PodOnNode {
    pub namespace: String,
    pub name: String,
    pub owned_by_daemonset: bool,
}

/// The narrow surface every component that mutates the cluster depends on.
/// A real implementation wraps `kube::Client`; tests use [`FakeClusterOps`].
#[async_trait]
pub trait ClusterOps: Send + Sync {
    async fn list_pods(&self, namespace: &str, selector: &std::collections::BTreeMap<String, String>) -> Result<Vec<PodCandidate>, ChaosError>;
    async fn get_pod(&self, namespace: &str, name: &str) -> Result<PodSnapshot, ChaosError>;
    async fn delete_pod(&self, namespace: &str, name: &str) -> Result<(), ChaosError>;
    async fn exec_signal(&self, namespace: &str, pod: &str, container: &str, signal: &str) -> Result<(), ChaosError>;

    /// Compare-and-swap update of the `ephemeralContainers` subresource.
    /// Implementations must surface resource-version conflicts as a
    /// `ChaosError` the sidecar injector can recognize via [`is_conflict`].
    async fn append_ephemeral_container(
        &self,
        namespace: &str,
        name: &str,
        resource_version: &str,
        container: &EphemeralContainerSpec,
    ) -> Result<(), ChaosError>;

    async fn list_nodes(&self, selector: &std::collections::BTreeMap<String, String>) -> Result<Vec<NodeInfo>, ChaosError>;
    async fn pods_on_node(&self, node_name: &str) -> Result<Vec<PodOnNode>, ChaosError>;
    async fn cordon_node(&self, name: &str, unschedulable: bool) -> Result<(), ChaosError>;
    async fn evict_pod(&self, namespace: &str, name: &str) -> Result<(), ChaosError>;

    async fn namespace_exists(&self, name: &str) -> Result<bool, ChaosError>;
    async fn namespace_facts(&self, name: &str) -> Result<(std::collections::BTreeMap<String, String>, std::collections::BTreeMap<String, String>), ChaosError>;

    async fn create_history_record(&self, namespace: &str, spec: &ChaosExperimentHistorySpec) -> Result<String, ChaosError>;
    async fn list_history_records(&self, namespace: &str, experiment_name: &str) -> Result<Vec<(String, chrono::DateTime<chrono::Utc>)>, ChaosError>;
    async fn delete_history_record(&self, namespace: &str, name: &str) -> Result<(), ChaosError>;

    async fn emit_event(&self, namespace: &str, experiment_name: &str, reason: &str, message: &str, is_warning: bool) -> Result<(), ChaosError>;
}

/// A resource-version conflict, the only error shape the sidecar injector
/// and node-drain code retry on (§4.7, §5).
pub fn is_conflict(err: &ChaosError) -> bool {
    err.message.contains("object has been modified") || err.message.contains("Conflict") || err.message.contains("409")
}
