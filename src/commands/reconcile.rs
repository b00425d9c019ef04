use std::net::SocketAddr;
use std::sync::{Arc, LazyLock};
use std::time::Duration;

use anyhow::{Context, Result};
use axum::Router;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use futures::StreamExt;
use kube::api::{Api, Patch, PatchParams};
use kube::runtime::controller::{Action, Controller};
use kube::{Client, ResourceExt};
use prometheus::{IntCounter, Registry};
use tokio::signal;
use tokio::sync::{Mutex, broadcast};
use tracing::{info, warn};

use chaos_operator::clock::{Clock, SystemClock};
use chaos_operator::config::OperatorConfig;
use chaos_operator::crd::{ChaosExperiment, ChaosExperimentStatus, Phase};
use chaos_operator::kube_ops::KubeClusterOps;
use chaos_operator::metrics;
use chaos_operator::reconcile::{self, ExperimentIdentity, NextAction};
use chaos_operator::cluster_ops::ClusterOps;
use chaos_operator::history;
use chaos_operator::validator::{self, ClusterFacts};

/* ============================= CONFIG ============================= */

const FINALIZER: &str = "chaos.gushchin.dev/cleanup";

/* ============================= REGISTRY (request-side metrics) ============================= */

static REGISTRY_MIRROR: LazyLock<Registry> = LazyLock::new(Registry::new);

static RECONCILE_TOTAL: LazyLock<IntCounter> = LazyLock::new(|| {
    let c = IntCounter::new("chaosexperiment_reconcile_total", "Total ChaosExperiment reconciliation cycles").expect("metric definition is valid");
    REGISTRY_MIRROR.register(Box::new(c.clone())).expect("metric not yet registered");
    c
});

static RECONCILE_ERRORS: LazyLock<IntCounter> = LazyLock::new(|| {
    let c = IntCounter::new("chaosexperiment_reconcile_errors_total", "Total ChaosExperiment reconciliation errors").expect("metric definition is valid");
    REGISTRY_MIRROR.register(Box::new(c.clone())).expect("metric not yet registered");
    c
});

/* ============================= STATE ============================= */

pub(crate) struct ReconcileState {
    pub(crate) ready: bool,
}

/* ============================= CONTEXT ============================= */

struct ReconcileContext {
    client: Client,
    ops: KubeClusterOps,
    clock: SystemClock,
    config: OperatorConfig,
}

/* ============================= ENTRY ============================= */

pub async fn run(config: OperatorConfig) -> Result<()> {
    println!("Starting chaos-operator...\n");

    let client = Client::try_default().await.context("Failed to load kubeconfig")?;

    print!("  Cluster connection .......... ");
    match client.apiserver_version().await {
        Ok(v) => println!("OK (v{}.{})", v.major, v.minor),
        Err(e) => {
            println!("FAIL");
            anyhow::bail!("Cannot reach cluster: {}. Is the cluster running?", e);
        }
    }

    let experiments: Api<ChaosExperiment> = Api::all(client.clone());

    let ctx = Arc::new(ReconcileContext {
        client: client.clone(),
        ops: KubeClusterOps::new(client.clone()),
        clock: SystemClock,
        config: config.clone(),
    });

    metrics::init();
    LazyLock::force(&RECONCILE_TOTAL);
    LazyLock::force(&RECONCILE_ERRORS);

    let addr = SocketAddr::from(([0, 0, 0, 0], 9090));

    println!("  CRD watch ................... ChaosExperiment.chaos.gushchin.dev/v1");
    println!("  History namespace ........... {}", config.history_namespace);
    println!("  Metrics server .............. http://{addr}");
    println!();
    println!("  Available endpoints:");
    println!("    GET /healthz .............. Liveness probe (always 200 OK)");
    println!("    GET /readyz ............... Readiness probe (503 until first reconcile, then 200)");
    println!("    GET /metrics .............. Prometheus metrics scrape endpoint");
    println!();
    println!("Operator running. Press Ctrl+C to stop.\n");
    println!("{}", "=".repeat(70));

    info!("operator_controller_started");

    let reconcile_state = Arc::new(Mutex::new(ReconcileState { ready: false }));

    let (shutdown_tx, _) = broadcast::channel::<()>(1);

    let http_state = reconcile_state.clone();
    let http_shutdown = shutdown_tx.subscribe();
    let http_handle = tokio::spawn(async move { start_metrics_server(http_state, http_shutdown, addr).await });

    let retention_client = client.clone();
    let retention_config = config.clone();
    let mut retention_shutdown = shutdown_tx.subscribe();
    let retention_handle = tokio::spawn(async move { run_retention_loop(retention_client, retention_config, &mut retention_shutdown).await });

    let controller_state = reconcile_state.clone();
    let controller = Controller::new(experiments, Default::default()).run(reconcile, error_policy, ctx).for_each(move |result| {
        let state = controller_state.clone();
        async move {
            {
                let mut s = state.lock().await;
                if !s.ready {
                    s.ready = true;
                }
            }
            match result {
                Ok((_obj, _action)) => {}
                Err(e) => {
                    warn!(error = %e, "reconcile_dispatch_error");
                    eprintln!("[ERROR] Reconcile dispatch: {e}");
                }
            }
        }
    });

    // Use select! so Ctrl+C drops (cancels) the controller stream.
    // The kube Controller has no built-in shutdown hook, so dropping
    // the future is the only way to stop it cleanly.
    tokio::select! {
        _ = controller => {
            info!("operator_controller_stream_ended");
            println!("\nController stream ended unexpectedly.");
        }
        _ = signal::ctrl_c() => {
            info!("shutdown_signal_received");
            println!("\n{}", "=".repeat(70));
            println!("Shutdown signal received. Stopping operator...");
            println!("{}", "=".repeat(70));
        }
    }

    let _ = shutdown_tx.send(());
    let _ = http_handle.await?;
    let _ = retention_handle.await?;

    info!("operator_stopped");
    println!("Operator stopped.");

    Ok(())
}

/// Periodically enforces history retention (§4.11) across every experiment
/// currently known to the cluster. Runs independently of any single
/// experiment's reconcile cadence, since retention is a property of the
/// history namespace, not of one `ChaosExperiment` object.
async fn run_retention_loop(client: Client, config: OperatorConfig, shutdown: &mut broadcast::Receiver<()>) {
    if !config.enable_history {
        return;
    }
    let ops = KubeClusterOps::new(client.clone());
    let experiments: Api<ChaosExperiment> = Api::all(client);
    let ttl = match config.history_ttl_duration() {
        Ok(ttl) => ttl,
        Err(e) => {
            warn!(error = %e, "retention_loop_disabled_bad_ttl");
            return;
        }
    };
    let mut interval = tokio::time::interval(Duration::from_secs(300));
    loop {
        tokio::select! {
            _ = interval.tick() => {}
            _ = shutdown.recv() => return,
        }
        let names = match experiments.list(&Default::default()).await {
            Ok(list) => list.items.iter().map(|e| e.name_any()).collect::<Vec<_>>(),
            Err(e) => {
                warn!(error = %e, "retention_loop_list_failed");
                continue;
            }
        };
        for name in names {
            match history::enforce_retention(&ops, &config.history_namespace, &name, config.history_retention_limit, ttl, chrono::Utc::now()).await {
                Ok(deleted) => {
                    for (_, reason) in &deleted {
                        let reason = match reason {
                            history::DeletionReason::CountCap => "count_cap",
                            history::DeletionReason::Ttl => "ttl",
                        };
                        metrics::record_history_deleted(reason, 1);
                    }
                }
                Err(e) => warn!(experiment = %name, error = %e.actionable_message(), "retention_enforcement_failed"),
            }
        }
    }
}

/* ============================= RECONCILE ============================= */

async fn reconcile(experiment: Arc<ChaosExperiment>, ctx: Arc<ReconcileContext>) -> std::result::Result<Action, kube::Error> {
    let name = experiment.name_any();
    let namespace = experiment.namespace().unwrap_or_default();

    if experiment.metadata.deletion_timestamp.is_some() {
        return handle_deletion(&experiment, &ctx.client).await;
    }

    if !has_finalizer(&experiment) {
        add_finalizer(&experiment, &ctx.client).await?;
    }

    RECONCILE_TOTAL.inc();

    let identity = ExperimentIdentity {
        name: name.clone(),
        namespace: namespace.clone(),
        uid: experiment.metadata.uid.clone().unwrap_or_default(),
        generation: experiment.metadata.generation.unwrap_or(0),
        creation_timestamp: experiment.metadata.creation_timestamp.as_ref().map(|t| t.0).unwrap_or_else(chrono::Utc::now),
    };

    let mut status = experiment.status.clone().unwrap_or_default();

    if matches!(status.phase, Phase::Pending) {
        if let Some(denial) = admission_check(&ctx.ops, &experiment.spec, &namespace).await {
            status.phase = Phase::Failed;
            status.last_error = Some(denial.clone());
            let _ = ctx.ops.emit_event(&namespace, &name, "ExperimentRejected", &denial, true).await;
            persist_status(&ctx.client, &namespace, &name, &status).await?;
            return Ok(Action::await_change());
        }
    }

    let outcome = match reconcile::reconcile_once(&ctx.ops, &ctx.clock as &dyn Clock, &identity, &experiment.spec, &status, &ctx.config.history_namespace).await {
        Ok(o) => o,
        Err(e) => {
            warn!(experiment = %name, namespace = %namespace, error = %e.actionable_message(), "reconcile_once_failed");
            let io_err = std::io::Error::new(std::io::ErrorKind::Other, e.actionable_message());
            return Err(kube::Error::Service(Box::new(io_err)));
        }
    };

    persist_status(&ctx.client, &namespace, &name, &outcome.status).await?;

    if ctx.config.enable_history {
        if let Some(record) = &outcome.history {
            if let Err(e) = history::record(&ctx.ops, &ctx.config.history_namespace, record).await {
                warn!(experiment = %name, error = %e.actionable_message(), "history_record_failed");
            } else {
                metrics::record_history_created();
            }
        }
    }

    if let Some(event) = outcome.lifecycle_event {
        let message = outcome.status.message.clone().unwrap_or_else(|| event.reason().to_string());
        if let Err(e) = ctx.ops.emit_event(&namespace, &name, event.reason(), &message, event.is_warning()).await {
            warn!(experiment = %name, error = %e.actionable_message(), "event_emit_failed");
        }
    }

    info!(experiment = %name, namespace = %namespace, phase = ?outcome.status.phase, "reconcile_evaluated");

    Ok(next_action_to_kube(outcome.next_action))
}

/// Admission-time validation re-run at reconcile (§4.1): namespace/selector
/// facts are only knowable against the live cluster, so the cross-field and
/// cluster-aware checks run here rather than at webhook time (not served,
/// per the non-goal).
async fn admission_check(ops: &dyn ClusterOps, spec: &chaos_operator::crd::ChaosExperimentSpec, namespace: &str) -> Option<String> {
    let cross_field = validator::validate_cross_field(spec);
    if !cross_field.is_empty() {
        let joined = cross_field.iter().map(|e| format!("{}: {}", e.field, e.message)).collect::<Vec<_>>().join("; ");
        return Some(format!("ChaosExperiment rejected: {joined}"));
    }

    if spec.action.targets_nodes() {
        return None;
    }

    let namespace_exists = ops.namespace_exists(namespace).await.unwrap_or(false);
    let (ns_labels, ns_annotations) = ops.namespace_facts(namespace).await.unwrap_or_default();
    let candidates = ops.list_pods(namespace, &spec.selector).await.unwrap_or_default();
    let excluded = candidates.iter().filter(|c| c.has_exclude_label()).count();

    let facts = ClusterFacts {
        namespace_exists,
        matched_pods: candidates.len(),
        excluded_pods: excluded,
        namespace_name: namespace,
        namespace_labels: &ns_labels,
        namespace_annotations: &ns_annotations,
    };

    validator::validate_cluster_aware(spec, &facts).denial_message()
}

async fn persist_status(client: &Client, namespace: &str, name: &str, status: &ChaosExperimentStatus) -> std::result::Result<(), kube::Error> {
    let experiments: Api<ChaosExperiment> = Api::namespaced(client.clone(), namespace);
    let patch = serde_json::json!({ "status": status });
    experiments.patch_status(name, &PatchParams::apply("chaos-operator"), &Patch::Merge(&patch)).await?;
    Ok(())
}

fn next_action_to_kube(action: NextAction) -> Action {
    match action {
        NextAction::RequeueAfter(d) => Action::requeue(d),
        NextAction::RequeueNow => Action::requeue(Duration::from_secs(0)),
        NextAction::Done => Action::await_change(),
    }
}

/* ============================= ERROR POLICY ============================= */

fn error_policy(_experiment: Arc<ChaosExperiment>, error: &kube::Error, _ctx: Arc<ReconcileContext>) -> Action {
    RECONCILE_ERRORS.inc();
    warn!(error = %error, "reconcile_error");
    Action::requeue(Duration::from_secs(60))
}

/* ============================= FINALIZER ============================= */

fn has_finalizer(experiment: &ChaosExperiment) -> bool {
    experiment.metadata.finalizers.as_ref().is_some_and(|f| f.iter().any(|s| s == FINALIZER))
}

async fn add_finalizer(experiment: &ChaosExperiment, client: &Client) -> std::result::Result<(), kube::Error> {
    let name = experiment.name_any();
    let namespace = experiment.namespace().unwrap_or_default();
    let api: Api<ChaosExperiment> = Api::namespaced(client.clone(), &namespace);

    let patch = serde_json::json!({ "metadata": { "finalizers": [FINALIZER] } });
    api.patch(&name, &PatchParams::apply("chaos-operator"), &Patch::Merge(&patch)).await?;

    info!(experiment = %name, "finalizer_added");
    Ok(())
}

async fn remove_finalizer(experiment: &ChaosExperiment, client: &Client) -> std::result::Result<(), kube::Error> {
    let name = experiment.name_any();
    let namespace = experiment.namespace().unwrap_or_default();
    let api: Api<ChaosExperiment> = Api::namespaced(client.clone(), &namespace);

    let patch = serde_json::json!({ "metadata": { "finalizers": [] } });
    api.patch(&name, &PatchParams::apply("chaos-operator"), &Patch::Merge(&patch)).await?;

    info!(experiment = %name, "finalizer_removed");
    Ok(())
}

async fn handle_deletion(experiment: &ChaosExperiment, client: &Client) -> std::result::Result<Action, kube::Error> {
    let name = experiment.name_any();
    let namespace = experiment.namespace().unwrap_or_default();

    info!(experiment = %name, namespace = %namespace, "handling_deletion");

    let ops = KubeClusterOps::new(client.clone());
    if let Some(status) = &experiment.status {
        for node in &status.cordoned_nodes {
            if let Err(e) = ops.cordon_node(node, false).await {
                warn!(node = %node, error = %e.actionable_message(), "uncordon_failed_during_deletion");
            }
        }
    }

    if has_finalizer(experiment) {
        remove_finalizer(experiment, client).await?;
    }

    Ok(Action::await_change())
}

/* ============================= HTTP SERVER ============================= */

pub(crate) fn build_reconcile_router(state: Arc<Mutex<ReconcileState>>) -> Router {
    Router::new()
        .route("/metrics", get(reconcile_metrics_handler))
        .route("/healthz", get(|| async { (StatusCode::OK, "OK") }))
        .route(
            "/readyz",
            get({
                let state = state.clone();
                move || reconcile_ready_handler(state.clone())
            }),
        )
}

async fn start_metrics_server(state: Arc<Mutex<ReconcileState>>, mut shutdown: broadcast::Receiver<()>, addr: SocketAddr) -> Result<()> {
    let app = build_reconcile_router(state);

    let listener = tokio::net::TcpListener::bind(addr).await.context("Failed to bind metrics server on :9090")?;

    info!(addr = %addr, "reconcile_metrics_server_started");

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = shutdown.recv().await;
        })
        .await?;

    Ok(())
}

async fn reconcile_ready_handler(state: Arc<Mutex<ReconcileState>>) -> impl IntoResponse {
    let state = state.lock().await;
    if state.ready {
        (StatusCode::OK, "READY")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "NOT READY")
    }
}

async fn reconcile_metrics_handler() -> impl IntoResponse {
    match metrics::gather() {
        Ok(body) => (StatusCode::OK, body),
        Err(_) => (StatusCode::INTERNAL_SERVER_ERROR, "metrics encoding error".to_string()),
    }
}

/* ============================= TESTS ============================= */
