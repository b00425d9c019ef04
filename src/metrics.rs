use std::sync::LazyLock;

use prometheus::{Encoder, Histogram, HistogramVec, IntCounter, IntCounterVec, IntGauge, Registry, TextEncoder};

/* ============================= PROMETHEUS ============================= */

static REGISTRY: LazyLock<Registry> = LazyLock::new(Registry::new);

static EXPERIMENTS_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    let c = IntCounterVec::new(
        prometheus::Opts::new("experiments_total", "Total experiment executions attempted"),
        &["action", "target_namespace"],
    )
    .expect("metric definition is valid");
    REGISTRY.register(Box::new(c.clone())).expect("metric not yet registered");
    c
});

static EXPERIMENTS_ERRORS_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    let c = IntCounterVec::new(
        prometheus::Opts::new("experiments_errors_total", "Total experiment executions that ended in error"),
        &["action", "error_type"],
    )
    .expect("metric definition is valid");
    REGISTRY.register(Box::new(c.clone())).expect("metric not yet registered");
    c
});

static RESOURCES_AFFECTED_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    let c = IntCounterVec::new(
        prometheus::Opts::new("resources_affected_total", "Total pods/nodes actually affected by an action"),
        &["action", "target_namespace"],
    )
    .expect("metric definition is valid");
    REGISTRY.register(Box::new(c.clone())).expect("metric not yet registered");
    c
});

static ACTIVE_EXPERIMENTS: LazyLock<IntGauge> = LazyLock::new(|| {
    let g = IntGauge::new("active_experiments", "Experiments currently in the Running phase").expect("metric definition is valid");
    REGISTRY.register(Box::new(g.clone())).expect("metric not yet registered");
    g
});

static EXPERIMENT_DURATION_SECONDS: LazyLock<HistogramVec> = LazyLock::new(|| {
    let h = HistogramVec::new(
        prometheus::HistogramOpts::new("experiment_duration_seconds", "Wall-clock duration of one executed attempt"),
        &["action"],
    )
    .expect("metric definition is valid");
    REGISTRY.register(Box::new(h.clone())).expect("metric not yet registered");
    h
});

static HISTORY_RECORDS_TOTAL: LazyLock<IntCounter> = LazyLock::new(|| {
    let c = IntCounter::new("history_records_total", "Total history records created").expect("metric definition is valid");
    REGISTRY.register(Box::new(c.clone())).expect("metric not yet registered");
    c
});

static HISTORY_DELETED_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    let c = IntCounterVec::new(
        prometheus::Opts::new("history_deleted_total", "Total history records deleted by retention"),
        &["reason"],
    )
    .expect("metric definition is valid");
    REGISTRY.register(Box::new(c.clone())).expect("metric not yet registered");
    c
});

static DRY_RUNS_TOTAL: LazyLock<IntCounter> = LazyLock::new(|| {
    let c = IntCounter::new("dry_runs_total", "Total dry-run attempts").expect("metric definition is valid");
    REGISTRY.register(Box::new(c.clone())).expect("metric not yet registered");
    c
});

static PRODUCTION_BLOCKS_TOTAL: LazyLock<IntCounter> = LazyLock::new(|| {
    let c = IntCounter::new("production_blocks_total", "Total attempts blocked by the production gate").expect("metric definition is valid");
    REGISTRY.register(Box::new(c.clone())).expect("metric not yet registered");
    c
});

static PERCENTAGE_BLOCKS_TOTAL: LazyLock<IntCounter> = LazyLock::new(|| {
    let c = IntCounter::new("percentage_blocks_total", "Total attempts capped by maxPercentage").expect("metric definition is valid");
    REGISTRY.register(Box::new(c.clone())).expect("metric not yet registered");
    c
});

static EXCLUDED_RESOURCES_TOTAL: LazyLock<IntCounter> = LazyLock::new(|| {
    let c = IntCounter::new("excluded_resources_total", "Total candidates dropped by exclusion filters").expect("metric definition is valid");
    REGISTRY.register(Box::new(c.clone())).expect("metric not yet registered");
    c
});

/// Forces every metric into existence so it shows up on `/metrics` before the
/// first event that would otherwise register it lazily.
pub fn init() {
    LazyLock::force(&EXPERIMENTS_TOTAL);
    LazyLock::force(&EXPERIMENTS_ERRORS_TOTAL);
    LazyLock::force(&RESOURCES_AFFECTED_TOTAL);
    LazyLock::force(&ACTIVE_EXPERIMENTS);
    LazyLock::force(&EXPERIMENT_DURATION_SECONDS);
    LazyLock::force(&HISTORY_RECORDS_TOTAL);
    LazyLock::force(&HISTORY_DELETED_TOTAL);
    LazyLock::force(&DRY_RUNS_TOTAL);
    LazyLock::force(&PRODUCTION_BLOCKS_TOTAL);
    LazyLock::force(&PERCENTAGE_BLOCKS_TOTAL);
    LazyLock::force(&EXCLUDED_RESOURCES_TOTAL);
}

/// Encodes the registry's metric families as Prometheus text exposition
/// format, for the `/metrics` HTTP handler.
pub fn gather() -> Result<String, prometheus::Error> {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer)?;
    Ok(String::from_utf8(buffer).unwrap_or_default())
}

/* ============================= RECORDING HELPERS ============================= */

pub fn record_experiment_attempt(action: &str, target_namespace: &str) {
    EXPERIMENTS_TOTAL.with_label_values(&[action, target_namespace]).inc();
}

pub fn record_experiment_error(action: &str, error_type: &str) {
    EXPERIMENTS_ERRORS_TOTAL.with_label_values(&[action, error_type]).inc();
}

pub fn record_resources_affected(action: &str, target_namespace: &str, count: u64) {
    RESOURCES_AFFECTED_TOTAL.with_label_values(&[action, target_namespace]).inc_by(count);
}

pub fn set_active_experiments(count: i64) {
    ACTIVE_EXPERIMENTS.set(count);
}

pub fn observe_experiment_duration(action: &str, seconds: f64) {
    EXPERIMENT_DURATION_SECONDS.with_label_values(&[action]).observe(seconds);
}

pub fn record_history_created() {
    HISTORY_RECORDS_TOTAL.inc();
}

pub fn record_history_deleted(reason: &str, count: u64) {
    HISTORY_DELETED_TOTAL.with_label_values(&[reason]).inc_by(count);
}

pub fn record_dry_run() {
    DRY_RUNS_TOTAL.inc();
}

pub fn record_production_block() {
    PRODUCTION_BLOCKS_TOTAL.inc();
}

pub fn record_percentage_block() {
    PERCENTAGE_BLOCKS_TOTAL.inc();
}

pub fn record_excluded_resources(count: u64) {
    EXCLUDED_RESOURCES_TOTAL.inc_by(count);
}

/// A histogram timer handle; `observe_experiment_duration` is called manually
/// at completion instead of relying on drop timing, since an experiment's
/// lifetime spans multiple reconcile ticks rather than one function call.
pub struct Timer {
    started_at: std::time::Instant,
}

impl Timer {
    pub fn start() -> Self {
        Timer { started_at: std::time::Instant::now() }
    }

    pub fn elapsed_seconds(&self) -> f64 {
        self.started_at.elapsed().as_secs_f64()
    }
}

/// Lifecycle event kinds emitted as Kubernetes `Event` objects (§4.12).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleEvent {
    ExperimentStarted,
    ExperimentSucceeded,
    ExperimentRetrying,
    ExperimentFailed,
}

impl LifecycleEvent {
    pub fn reason(&self) -> &'static str {
        match self {
            LifecycleEvent::ExperimentStarted => "ExperimentStarted",
            LifecycleEvent::ExperimentSucceeded => "ExperimentSucceeded",
            LifecycleEvent::ExperimentRetrying => "ExperimentRetrying",
            LifecycleEvent::ExperimentFailed => "ExperimentFailed",
        }
    }

    pub fn is_warning(&self) -> bool {
        matches!(self, LifecycleEvent::ExperimentRetrying | LifecycleEvent::ExperimentFailed)
    }
}
