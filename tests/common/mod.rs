use std::collections::BTreeMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chaos_operator::cluster_ops::{ClusterOps, EphemeralContainerSpec, NodeInfo, PodOnNode, PodSnapshot};
use chaos_operator::crd::{Action, ChaosExperimentHistorySpec, ChaosExperimentSpec, RetryBackoff};
use chaos_operator::errors::ChaosError;
use chaos_operator::reconcile::ExperimentIdentity;
use chaos_operator::safety::PodCandidate;
use chrono::{DateTime, TimeZone, Utc};

/// A pod candidate as seen by the safety/selector stage, not a full
/// `k8s_openapi::Pod` — integration tests exercise the crate's own
/// `ClusterOps` seam, not apiserver wire shapes.
pub fn make_test_pod(name: &str, namespace: &str, labels: &[(&str, &str)], phase: &str, is_terminating: bool) -> PodCandidate {
    PodCandidate {
        name: name.to_string(),
        namespace: namespace.to_string(),
        is_terminating,
        phase: phase.to_string(),
        labels: labels.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect(),
    }
}

pub fn make_test_node(name: &str, labels: &[(&str, &str)]) -> NodeInfo {
    NodeInfo { name: name.to_string(), labels: labels.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect() }
}

/// Fixed instant every test anchors its clock to: 2026-01-06 is a Tuesday.
pub fn test_creation_timestamp() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 1, 6, 14, 30, 0).unwrap()
}

pub fn make_test_identity(name: &str, namespace: &str, uid: &str) -> ExperimentIdentity {
    ExperimentIdentity {
        name: name.to_string(),
        namespace: namespace.to_string(),
        uid: uid.to_string(),
        generation: 1,
        creation_timestamp: test_creation_timestamp(),
    }
}

/// A fully-populated spec with every action-specific field set, so callers
/// only need to override what their scenario cares about.
pub fn make_test_experiment(action: Action) -> ChaosExperimentSpec {
    ChaosExperimentSpec {
        action,
        target_namespace: "default".to_string(),
        selector: BTreeMap::from([("app".to_string(), "nginx".to_string())]),
        count: 1,
        duration: Some("30s".to_string()),
        experiment_duration: None,
        schedule: None,
        time_windows: vec![],
        max_retries: 3,
        retry_backoff: RetryBackoff::Fixed,
        retry_delay: "30s".to_string(),
        dry_run: false,
        max_percentage: None,
        allow_production: false,
        cpu_load: Some(80),
        cpu_workers: Some(2),
        memory_size: Some("512M".to_string()),
        memory_workers: Some(1),
        loss_percentage: Some(20),
        loss_correlation: None,
        fill_percentage: Some(80),
        target_path: "/tmp".to_string(),
        volume_name: None,
        restart_interval: None,
    }
}

/* ============================= FAKE CLUSTER ============================= */

/// An in-memory `ClusterOps` double for black-box integration tests, kept
/// separate from the library's own internal `#[cfg(test)]` fake since an
/// external `tests/` binary links against the compiled library, not its
/// test-only items. Builder-style like the teacher's own test fixtures.
#[derive(Default)]
pub struct TestClusterOps {
    pods: Mutex<Vec<(PodCandidate, PodSnapshot)>>,
    nodes: Mutex<Vec<NodeInfo>>,
    node_pods: Mutex<BTreeMap<String, Vec<PodOnNode>>>,
    conflict_countdown: Mutex<u32>,
    production_namespaces: Mutex<Vec<String>>,
    existing_namespaces: Mutex<Vec<String>>,
    history_records: Mutex<Vec<(String, String, ChaosExperimentHistorySpec)>>,
    pub deleted_pods: Mutex<Vec<(String, String)>>,
    pub signals_sent: Mutex<Vec<(String, String, String)>>,
    pub injected_containers: Mutex<Vec<(String, String, EphemeralContainerSpec)>>,
    pub cordoned_nodes: Mutex<BTreeMap<String, bool>>,
    pub evicted_pods: Mutex<Vec<(String, String)>>,
}

impl TestClusterOps {
    pub fn new() -> Self {
        let ops = TestClusterOps::default();
        ops.existing_namespaces.lock().unwrap().push("default".to_string());
        ops
    }

    pub fn with_pod(self, candidate: PodCandidate) -> Self {
        let snapshot = PodSnapshot {
            namespace: candidate.namespace.clone(),
            name: candidate.name.clone(),
            uid: format!("uid-{}", candidate.name),
            resource_version: "1".to_string(),
            first_container_name: "app".to_string(),
            owner_kind: None,
            owner_name: None,
        };
        self.pods.lock().unwrap().push((candidate, snapshot));
        self
    }

    pub fn with_node(self, node: NodeInfo, pods: Vec<PodOnNode>) -> Self {
        self.node_pods.lock().unwrap().insert(node.name.clone(), pods);
        self.nodes.lock().unwrap().push(node);
        self
    }

    pub fn with_conflicts(self, n: u32) -> Self {
        *self.conflict_countdown.lock().unwrap() = n;
        self
    }

    pub fn with_production_namespace(self, namespace: &str) -> Self {
        self.production_namespaces.lock().unwrap().push(namespace.to_string());
        self
    }
}

#[async_trait]
impl ClusterOps for TestClusterOps {
    async fn list_pods(&self, namespace: &str, selector: &BTreeMap<String, String>) -> Result<Vec<PodCandidate>, ChaosError> {
        Ok(self
            .pods
            .lock()
            .unwrap()
            .iter()
            .map(|(c, _)| c)
            .filter(|c| c.namespace == namespace)
            .filter(|c| selector.iter().all(|(k, v)| c.labels.get(k) == Some(v)))
            .cloned()
            .collect())
    }

    async fn get_pod(&self, namespace: &str, name: &str) -> Result<PodSnapshot, ChaosError> {
        self.pods
            .lock()
            .unwrap()
            .iter()
            .find(|(c, _)| c.namespace == namespace && c.name == name)
            .map(|(_, s)| s.clone())
            .ok_or_else(|| ChaosError::execution("get_pod", "not found").with_resource("pods"))
    }

    async fn delete_pod(&self, namespace: &str, name: &str) -> Result<(), ChaosError> {
        self.deleted_pods.lock().unwrap().push((namespace.to_string(), name.to_string()));
        Ok(())
    }

    async fn exec_signal(&self, namespace: &str, pod: &str, _container: &str, signal: &str) -> Result<(), ChaosError> {
        self.signals_sent.lock().unwrap().push((namespace.to_string(), pod.to_string(), signal.to_string()));
        Ok(())
    }

    async fn append_ephemeral_container(
        &self,
        namespace: &str,
        name: &str,
        _resource_version: &str,
        container: &EphemeralContainerSpec,
    ) -> Result<(), ChaosError> {
        let mut countdown = self.conflict_countdown.lock().unwrap();
        if *countdown > 0 {
            *countdown -= 1;
            return Err(ChaosError::execution("append_ephemeral_container", "Operation cannot be fulfilled: the object has been modified"));
        }
        self.injected_containers.lock().unwrap().push((namespace.to_string(), name.to_string(), container.clone()));
        Ok(())
    }

    async fn list_nodes(&self, selector: &BTreeMap<String, String>) -> Result<Vec<NodeInfo>, ChaosError> {
        Ok(self
            .nodes
            .lock()
            .unwrap()
            .iter()
            .filter(|n| selector.iter().all(|(k, v)| n.labels.get(k) == Some(v)))
            .cloned()
            .collect())
    }

    async fn pods_on_node(&self, node_name: &str) -> Result<Vec<PodOnNode>, ChaosError> {
        Ok(self.node_pods.lock().unwrap().get(node_name).cloned().unwrap_or_default())
    }

    async fn cordon_node(&self, name: &str, unschedulable: bool) -> Result<(), ChaosError> {
        self.cordoned_nodes.lock().unwrap().insert(name.to_string(), unschedulable);
        Ok(())
    }

    async fn evict_pod(&self, namespace: &str, name: &str) -> Result<(), ChaosError> {
        self.evicted_pods.lock().unwrap().push((namespace.to_string(), name.to_string()));
        Ok(())
    }

    async fn namespace_exists(&self, name: &str) -> Result<bool, ChaosError> {
        Ok(self.existing_namespaces.lock().unwrap().iter().any(|n| n == name))
    }

    async fn namespace_facts(&self, name: &str) -> Result<(BTreeMap<String, String>, BTreeMap<String, String>), ChaosError> {
        let mut labels = BTreeMap::new();
        if self.production_namespaces.lock().unwrap().iter().any(|n| n == name) {
            labels.insert("environment".to_string(), "production".to_string());
        }
        Ok((labels, BTreeMap::new()))
    }

    async fn create_history_record(&self, namespace: &str, spec: &ChaosExperimentHistorySpec) -> Result<String, ChaosError> {
        let name = format!("{}-{}", spec.experiment_ref.name, self.history_records.lock().unwrap().len());
        self.history_records.lock().unwrap().push((namespace.to_string(), name.clone(), spec.clone()));
        Ok(name)
    }

    async fn list_history_records(&self, namespace: &str, experiment_name: &str) -> Result<Vec<(String, DateTime<Utc>)>, ChaosError> {
        Ok(self
            .history_records
            .lock()
            .unwrap()
            .iter()
            .filter(|(ns, _, spec)| ns == namespace && spec.experiment_ref.name == experiment_name)
            .map(|(_, name, spec)| {
                let ts = DateTime::parse_from_rfc3339(&spec.audit.creation_timestamp)
                    .map(|dt| dt.with_timezone(&Utc))
                    .unwrap_or(DateTime::<Utc>::MIN_UTC);
                (name.clone(), ts)
            })
            .collect())
    }

    async fn delete_history_record(&self, namespace: &str, name: &str) -> Result<(), ChaosError> {
        self.history_records.lock().unwrap().retain(|(ns, n, _)| !(ns == namespace && n == name));
        Ok(())
    }

    async fn emit_event(&self, _namespace: &str, experiment_name: &str, reason: &str, message: &str, is_warning: bool) -> Result<(), ChaosError> {
        let _ = (experiment_name, reason, message, is_warning);
        Ok(())
    }
}
