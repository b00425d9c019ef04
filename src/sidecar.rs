use std::collections::BTreeMap;
use std::time::Duration;

use crate::cluster_ops::{is_conflict, ClusterOps, EphemeralContainerSpec};
use crate::crd::Action;
use crate::errors::ChaosError;
use crate::validator::parse_memory_size;

/// Minimal fixed footprint for the network/disk sidecars, which don't scale
/// with a user-requested load the way CPU/memory stress does (§4.7).
const MINIMAL_CPU_LIMIT: &str = "50m";
const MINIMAL_MEMORY_LIMIT: &str = "67108864"; // 64Mi, in bytes

const MAX_ATTEMPTS: u32 = 5;
const INITIAL_BACKOFF: Duration = Duration::from_millis(100);
const MAX_BACKOFF: Duration = Duration::from_millis(1600);

/// Builds the sidecar image + invocation for the four action families that
/// require one, pinned by tag here and meant to be overridden by digest in
/// deployment config (§4.6, §4.7).
pub fn build_container(
    action: Action,
    duration: &str,
    target_container: &str,
    name: &str,
    params: &SidecarParams,
) -> Result<EphemeralContainerSpec, ChaosError> {
    let (image, command, args, capabilities) = match action {
        Action::PodDelay => (
            "ghcr.io/chaos-operator/tc-netem:stable",
            vec!["tc".to_string()],
            vec![
                "qdisc".to_string(),
                "add".to_string(),
                "dev".to_string(),
                "eth0".to_string(),
                "root".to_string(),
                "netem".to_string(),
                "delay".to_string(),
                duration.to_string(),
            ],
            vec!["NET_ADMIN".to_string()],
        ),
        Action::PodCpuStress => (
            "ghcr.io/chaos-operator/stress-ng:stable",
            vec!["stress-ng".to_string()],
            vec![
                "--cpu".to_string(),
                params.cpu_workers.unwrap_or(1).to_string(),
                "--cpu-load".to_string(),
                params.cpu_load.unwrap_or(50).to_string(),
                "--timeout".to_string(),
                duration.to_string(),
            ],
            vec![],
        ),
        Action::PodMemoryStress => (
            "ghcr.io/chaos-operator/stress-ng:stable",
            vec!["stress-ng".to_string()],
            vec![
                "--vm".to_string(),
                params.memory_workers.unwrap_or(1).to_string(),
                "--vm-bytes".to_string(),
                params.memory_size.clone().unwrap_or_default(),
                "--timeout".to_string(),
                duration.to_string(),
            ],
            vec![],
        ),
        Action::PodNetworkLoss => {
            let mut args = vec![
                "qdisc".to_string(),
                "add".to_string(),
                "dev".to_string(),
                "eth0".to_string(),
                "root".to_string(),
                "netem".to_string(),
                "loss".to_string(),
                format!("{}%", params.loss_percentage.unwrap_or(10)),
            ];
            if let Some(corr) = params.loss_correlation {
                args.push("correlation".to_string());
                args.push(format!("{corr}%"));
            }
            ("ghcr.io/chaos-operator/tc-netem:stable", vec!["tc".to_string()], args, vec!["NET_ADMIN".to_string()])
        }
        Action::PodDiskFill => (
            "ghcr.io/chaos-operator/disk-fill:stable",
            vec!["/bin/disk-fill.sh".to_string()],
            vec![
                params.target_path.clone().unwrap_or_else(|| "/tmp".to_string()),
                params.fill_percentage.unwrap_or(80).to_string(),
                duration.to_string(),
            ],
            vec![],
        ),
        other => return Err(ChaosError::execution("build_container", format!("{other:?} does not use a sidecar"))),
    };

    Ok(EphemeralContainerSpec {
        name: name.to_string(),
        image: image.to_string(),
        command,
        args,
        target_container_name: target_container.to_string(),
        add_capabilities: capabilities,
        resource_limits: resource_limits_for(action, params)?,
    })
}

/// Computes `resources.limits` for the injected sidecar (§4.6, §4.7).
///
/// CPU stress mirrors the requested load directly: `workers` cores each
/// loaded to `cpuLoad`% becomes `workers * cpuLoad * 10` millicores. Memory
/// stress mirrors `size × workers` verbatim, in bytes. Network/disk actions
/// get a minimal fixed footprint since they don't stress a resource that
/// needs capping.
fn resource_limits_for(action: Action, params: &SidecarParams) -> Result<BTreeMap<String, String>, ChaosError> {
    let mut limits = BTreeMap::new();
    match action {
        Action::PodCpuStress => {
            let workers = params.cpu_workers.unwrap_or(1) as u64;
            let load = params.cpu_load.unwrap_or(50) as u64;
            limits.insert("cpu".to_string(), format!("{}m", workers * load * 10));
        }
        Action::PodMemoryStress => {
            let size = params
                .memory_size
                .as_deref()
                .ok_or_else(|| ChaosError::validation("build_container", "pod-memory-stress requires memorySize"))?;
            let per_worker_bytes = parse_memory_size(size).map_err(|e| ChaosError::validation("build_container", e))?;
            let workers = params.memory_workers.unwrap_or(1) as u64;
            limits.insert("memory".to_string(), (per_worker_bytes * workers).to_string());
        }
        Action::PodDelay | Action::PodNetworkLoss | Action::PodDiskFill => {
            limits.insert("cpu".to_string(), MINIMAL_CPU_LIMIT.to_string());
            limits.insert("memory".to_string(), MINIMAL_MEMORY_LIMIT.to_string());
        }
        _ => {}
    }
    Ok(limits)
}

/// Action-specific knobs passed through to [`build_container`].
#[derive(Debug, Clone, Default)]
pub struct SidecarParams {
    pub cpu_load: Option<u32>,
    pub cpu_workers: Option<u32>,
    pub memory_size: Option<String>,
    pub memory_workers: Option<u32>,
    pub loss_percentage: Option<u32>,
    pub loss_correlation: Option<u32>,
    pub fill_percentage: Option<u32>,
    pub target_path: Option<String>,
}

/// The sidecar name format used everywhere: `<action>-<uid-prefix>-<attempt>`.
pub fn sidecar_name(action: Action, uid: &str, attempt: u32) -> String {
    let prefix: String = uid.chars().take(8).collect();
    format!("{}-{}-{}", action.tag(), prefix, attempt)
}

/// The `"ns/pod:container"` handle recorded in `status.affectedPods`.
pub fn affected_pod_handle(namespace: &str, pod: &str, container: &str) -> String {
    format!("{namespace}/{pod}:{container}")
}

/// Compare-and-swap injection against the `ephemeralContainers` subresource
/// (§4.7). Retries up to [`MAX_ATTEMPTS`] times on resource-version conflict,
/// with backoff doubling from [`INITIAL_BACKOFF`] capped at [`MAX_BACKOFF`].
pub async fn inject(ops: &dyn ClusterOps, namespace: &str, pod_name: &str, container: &EphemeralContainerSpec) -> Result<String, ChaosError> {
    let mut backoff = INITIAL_BACKOFF;

    for attempt in 1..=MAX_ATTEMPTS {
        let pod = ops.get_pod(namespace, pod_name).await?;
        match ops.append_ephemeral_container(namespace, pod_name, &pod.resource_version, container).await {
            Ok(()) => return Ok(affected_pod_handle(namespace, pod_name, &container.name)),
            Err(e) if is_conflict(&e) && attempt < MAX_ATTEMPTS => {
                tokio::time::sleep(backoff).await;
                backoff = (backoff * 2).min(MAX_BACKOFF);
            }
            Err(e) if is_conflict(&e) => {
                return Err(ChaosError::execution("inject_sidecar", "max retries exceeded").with_resource("pods/ephemeralcontainers"));
            }
            Err(e) => return Err(e),
        }
    }
    unreachable!("loop always returns within MAX_ATTEMPTS iterations")
}
