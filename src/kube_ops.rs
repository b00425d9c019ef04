use std::collections::BTreeMap;

use async_trait::async_trait;
use futures::AsyncReadExt;
use k8s_openapi::api::core::v1::{Namespace, Node, Pod};
use kube::api::{Api, AttachParams, DeleteParams, EvictParams, ListParams, Patch, PatchParams, PostParams};
use kube::runtime::events::{EventSource, EventType, NewEvent, Recorder};
use kube::{Client, Resource, ResourceExt};

use crate::cluster_ops::{ClusterOps, EphemeralContainerSpec, NodeInfo, PodOnNode, PodSnapshot};
use crate::crd::ChaosExperimentHistorySpec;
use crate::dispatch::strip_replicaset_hash;
use crate::errors::ChaosError;
use crate::safety::PodCandidate;

// `ChaosExperimentHistory` already exists on `crd::ChaosExperimentHistory`;
// aliasing it here keeps this module's `Api<K>` turbofish readable.
type ChaosExperimentHistoryWire = crate::crd::ChaosExperimentHistory;

/// `ClusterOps` backed by a real `kube::Client`, the only implementation the
/// binary wires into the reconciler; tests use `FakeClusterOps` instead.
pub struct KubeClusterOps {
    client: Client,
}

impl KubeClusterOps {
    pub fn new(client: Client) -> Self {
        KubeClusterOps { client }
    }

    fn pods(&self, namespace: &str) -> Api<Pod> {
        Api::namespaced(self.client.clone(), namespace)
    }

    fn nodes(&self) -> Api<Node> {
        Api::all(self.client.clone())
    }
}

fn owner_info(pod: &Pod) -> (Option<String>, Option<String>) {
    let owner = pod
        .metadata
        .owner_references
        .as_ref()
        .and_then(|refs| refs.iter().find(|r| r.controller == Some(true)));
    match owner {
        Some(o) if o.kind == "ReplicaSet" => (Some("Deployment".to_string()), Some(strip_replicaset_hash(&o.name))),
        Some(o) => (Some(o.kind.clone()), Some(o.name.clone())),
        None => (None, None),
    }
}

fn to_pod_candidate(pod: &Pod) -> PodCandidate {
    PodCandidate {
        name: pod.name_any(),
        namespace: pod.namespace().unwrap_or_default(),
        is_terminating: pod.metadata.deletion_timestamp.is_some(),
        phase: pod.status.as_ref().and_then(|s| s.phase.clone()).unwrap_or_else(|| "Unknown".to_string()),
        labels: pod.metadata.labels.clone().unwrap_or_default().into_iter().collect(),
    }
}

fn map_kube_err(operation: &str, err: kube::Error) -> ChaosError {
    crate::errors::classify(&err, operation)
}

/// Maps `EphemeralContainerSpec::resource_limits` onto a
/// `ResourceRequirements` with `limits` set and `requests` left unset, `None`
/// when there is nothing to cap (§4.7).
fn resource_requirements(limits: &BTreeMap<String, String>) -> Option<k8s_openapi::api::core::v1::ResourceRequirements> {
    if limits.is_empty() {
        return None;
    }
    Some(k8s_openapi::api::core::v1::ResourceRequirements {
        limits: Some(
            limits
                .iter()
                .map(|(k, v)| (k.clone(), k8s_openapi::apimachinery::pkg::api::resource::Quantity(v.clone())))
                .collect(),
        ),
        ..Default::default()
    })
}

#[async_trait]
impl ClusterOps for KubeClusterOps {
    async fn list_pods(&self, namespace: &str, selector: &BTreeMap<String, String>) -> Result<Vec<PodCandidate>, ChaosError> {
        let label_selector = selector.iter().map(|(k, v)| format!("{k}={v}")).collect::<Vec<_>>().join(",");
        let lp = ListParams::default().labels(&label_selector);
        let list = self.pods(namespace).list(&lp).await.map_err(|e| map_kube_err("list_pods", e))?;
        Ok(list.items.iter().map(to_pod_candidate).collect())
    }

    async fn get_pod(&self, namespace: &str, name: &str) -> Result<PodSnapshot, ChaosError> {
        let pod = self.pods(namespace).get(name).await.map_err(|e| map_kube_err("get_pod", e))?;
        let (owner_kind, owner_name) = owner_info(&pod);
        let first_container_name = pod
            .spec
            .as_ref()
            .and_then(|s| s.containers.first())
            .map(|c| c.name.clone())
            .unwrap_or_else(|| "app".to_string());
        Ok(PodSnapshot {
            namespace: pod.namespace().unwrap_or_default(),
            name: pod.name_any(),
            uid: pod.uid().unwrap_or_default(),
            resource_version: pod.resource_version().unwrap_or_default(),
            first_container_name,
            owner_kind,
            owner_name,
        })
    }

    async fn delete_pod(&self, namespace: &str, name: &str) -> Result<(), ChaosError> {
        self.pods(namespace).delete(name, &DeleteParams::default()).await.map_err(|e| map_kube_err("delete_pod", e))?;
        Ok(())
    }

    async fn exec_signal(&self, namespace: &str, pod: &str, container: &str, signal: &str) -> Result<(), ChaosError> {
        let ap = AttachParams::default().container(container).stdin(false).stdout(true).stderr(true);
        let cmd = vec!["sh".to_string(), "-c".to_string(), format!("kill -{signal} 1")];
        let mut attached = self
            .pods(namespace)
            .exec(pod, cmd, &ap)
            .await
            .map_err(|e| map_kube_err("exec_signal", e))?;

        if let Some(mut stdout) = attached.stdout() {
            let mut buf = Vec::new();
            let _ = stdout.read_to_end(&mut buf).await;
        }
        attached.join().await.map_err(|e| ChaosError::execution("exec_signal", e.to_string()))?;
        Ok(())
    }

    async fn append_ephemeral_container(
        &self,
        namespace: &str,
        name: &str,
        resource_version: &str,
        container: &EphemeralContainerSpec,
    ) -> Result<(), ChaosError> {
        let current: Pod = self
            .pods(namespace)
            .get_subresource("ephemeralcontainers", name)
            .await
            .map_err(|e| map_kube_err("append_ephemeral_container", e))?;

        let mut spec = current.spec.clone().unwrap_or_default();
        let mut containers = spec.ephemeral_containers.clone().unwrap_or_default();
        containers.push(k8s_openapi::api::core::v1::EphemeralContainer {
            name: container.name.clone(),
            image: Some(container.image.clone()),
            command: Some(container.command.clone()),
            args: Some(container.args.clone()),
            target_container_name: Some(container.target_container_name.clone()),
            security_context: if container.add_capabilities.is_empty() {
                None
            } else {
                Some(k8s_openapi::api::core::v1::SecurityContext {
                    capabilities: Some(k8s_openapi::api::core::v1::Capabilities {
                        add: Some(container.add_capabilities.clone()),
                        drop: None,
                    }),
                    ..Default::default()
                })
            },
            resources: resource_requirements(&container.resource_limits),
            ..Default::default()
        });
        spec.ephemeral_containers = Some(containers);

        let body = Pod {
            metadata: k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta {
                name: Some(name.to_string()),
                namespace: Some(namespace.to_string()),
                resource_version: Some(resource_version.to_string()),
                ..Default::default()
            },
            spec: Some(spec),
            status: None,
        };
        let data = serde_json::to_vec(&body).map_err(|e| ChaosError::execution("append_ephemeral_container", e.to_string()))?;

        self.pods(namespace)
            .replace_subresource("ephemeralcontainers", name, &PostParams::default(), data)
            .await
            .map_err(|e| map_kube_err("append_ephemeral_container", e))?;
        Ok(())
    }

    async fn list_nodes(&self, selector: &BTreeMap<String, String>) -> Result<Vec<NodeInfo>, ChaosError> {
        let label_selector = selector.iter().map(|(k, v)| format!("{k}={v}")).collect::<Vec<_>>().join(",");
        let lp = ListParams::default().labels(&label_selector);
        let list = self.nodes().list(&lp).await.map_err(|e| map_kube_err("list_nodes", e))?;
        Ok(list
            .items
            .into_iter()
            .map(|n| NodeInfo { name: n.name_any(), labels: n.metadata.labels.unwrap_or_default().into_iter().collect() })
            .collect())
    }

    async fn pods_on_node(&self, node_name: &str) -> Result<Vec<PodOnNode>, ChaosError> {
        let lp = ListParams::default().fields(&format!("spec.nodeName={node_name}"));
        let list: kube::api::ObjectList<Pod> = Api::all(self.client.clone()).list(&lp).await.map_err(|e| map_kube_err("pods_on_node", e))?;
        Ok(list
            .items
            .iter()
            .map(|p| {
                let owned_by_daemonset = p
                    .metadata
                    .owner_references
                    .as_ref()
                    .is_some_and(|refs| refs.iter().any(|r| r.kind == "DaemonSet"));
                PodOnNode { namespace: p.namespace().unwrap_or_default(), name: p.name_any(), owned_by_daemonset }
            })
            .collect())
    }

    async fn cordon_node(&self, name: &str, unschedulable: bool) -> Result<(), ChaosError> {
        let patch = serde_json::json!({ "spec": { "unschedulable": unschedulable } });
        self.nodes()
            .patch(name, &PatchParams::apply("chaos-operator"), &Patch::Merge(&patch))
            .await
            .map_err(|e| map_kube_err("cordon_node", e))?;
        Ok(())
    }

    async fn evict_pod(&self, namespace: &str, name: &str) -> Result<(), ChaosError> {
        self.pods(namespace).evict(name, &EvictParams::default()).await.map_err(|e| map_kube_err("evict_pod", e))?;
        Ok(())
    }

    async fn namespace_exists(&self, name: &str) -> Result<bool, ChaosError> {
        let namespaces: Api<Namespace> = Api::all(self.client.clone());
        match namespaces.get(name).await {
            Ok(_) => Ok(true),
            Err(kube::Error::Api(e)) if e.code == 404 => Ok(false),
            Err(e) => Err(map_kube_err("namespace_exists", e)),
        }
    }

    async fn namespace_facts(&self, name: &str) -> Result<(BTreeMap<String, String>, BTreeMap<String, String>), ChaosError> {
        let namespaces: Api<Namespace> = Api::all(self.client.clone());
        let ns = namespaces.get(name).await.map_err(|e| map_kube_err("namespace_facts", e))?;
        let labels = ns.metadata.labels.unwrap_or_default().into_iter().collect();
        let annotations = ns.metadata.annotations.unwrap_or_default().into_iter().collect();
        Ok((labels, annotations))
    }

    async fn create_history_record(&self, namespace: &str, spec: &ChaosExperimentHistorySpec) -> Result<String, ChaosError> {
        let ts_millis = chrono::Utc::now().timestamp_millis();
        let name = format!("{}-{}", spec.experiment_ref.name, ts_millis);
        let history_api: Api<ChaosExperimentHistoryWire> = Api::namespaced(self.client.clone(), namespace);
        let record = ChaosExperimentHistoryWire::new(&name, spec.clone());
        history_api.create(&PostParams::default(), &record).await.map_err(|e| map_kube_err("create_history_record", e))?;
        Ok(name)
    }

    async fn list_history_records(&self, namespace: &str, experiment_name: &str) -> Result<Vec<(String, chrono::DateTime<chrono::Utc>)>, ChaosError> {
        let history_api: Api<ChaosExperimentHistoryWire> = Api::namespaced(self.client.clone(), namespace);
        let list = history_api.list(&ListParams::default()).await.map_err(|e| map_kube_err("list_history_records", e))?;
        Ok(list
            .items
            .into_iter()
            .filter(|r| r.spec.experiment_ref.name == experiment_name)
            .map(|r| {
                let ts = r
                    .metadata
                    .creation_timestamp
                    .as_ref()
                    .map(|t| t.0)
                    .unwrap_or(chrono::DateTime::<chrono::Utc>::MIN_UTC);
                (r.name_any(), ts)
            })
            .collect())
    }

    async fn delete_history_record(&self, namespace: &str, name: &str) -> Result<(), ChaosError> {
        let history_api: Api<ChaosExperimentHistoryWire> = Api::namespaced(self.client.clone(), namespace);
        match history_api.delete(name, &DeleteParams::default()).await {
            Ok(_) => Ok(()),
            Err(kube::Error::Api(e)) if e.code == 404 => Ok(()),
            Err(e) => Err(map_kube_err("delete_history_record", e)),
        }
    }

    async fn emit_event(&self, namespace: &str, experiment_name: &str, reason: &str, message: &str, is_warning: bool) -> Result<(), ChaosError> {
        let experiments: Api<crate::crd::ChaosExperiment> = Api::namespaced(self.client.clone(), namespace);
        let experiment = experiments.get(experiment_name).await.map_err(|e| map_kube_err("emit_event", e))?;
        let reference = k8s_openapi::api::core::v1::ObjectReference {
            api_version: Some(crate::crd::ChaosExperiment::api_version(&()).into_owned()),
            kind: Some(crate::crd::ChaosExperiment::kind(&()).into_owned()),
            name: Some(experiment.name_any()),
            namespace: experiment.namespace(),
            uid: experiment.uid(),
            resource_version: experiment.resource_version(),
            ..Default::default()
        };

        let recorder = Recorder::new(
            self.client.clone(),
            EventSource { controller: "chaos-operator".to_string(), controller_pod: std::env::var("POD_NAME").unwrap_or_else(|_| "chaos-operator".to_string()) },
            reference,
        );
        recorder
            .publish(NewEvent {
                action: reason.to_string(),
                reason: reason.to_string(),
                note: Some(message.to_string()),
                event_type: if is_warning { EventType::Warning } else { EventType::Normal },
                secondary_object: None,
            })
            .await
            .map_err(|e| ChaosError::execution("emit_event", e.to_string()))?;
        Ok(())
    }
}
