use std::collections::BTreeMap;

use crate::crd::{Action, ChaosExperimentSpec, TimeWindow};

/* ============================= TYPES ============================= */

/// A single admission-time validation failure, carrying the failing field so
/// callers can build a precise denial message.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidationError {
    pub field: String,
    pub message: String,
}

impl ValidationError {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        ValidationError {
            field: field.into(),
            message: message.into(),
        }
    }
}

/// Result of validating an experiment spec. Errors reject the write;
/// warnings are informational only (returned out-of-band, per §4.1).
#[derive(Debug, Clone, Default)]
pub struct ValidationOutcome {
    pub errors: Vec<ValidationError>,
    pub warnings: Vec<String>,
}

impl ValidationOutcome {
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn denial_message(&self) -> Option<String> {
        if self.errors.is_empty() {
            return None;
        }
        let joined = self
            .errors
            .iter()
            .map(|e| format!("{}: {}", e.field, e.message))
            .collect::<Vec<_>>()
            .join("; ");
        Some(format!("ChaosExperiment rejected: {joined}"))
    }
}

/* ============================= DURATION / MEMORY GRAMMAR ============================= */

/// Parses the bounded duration grammar `^([0-9]+(s|m|h))+$`, e.g. `30s`,
/// `5m`, `1h30m`. Shared by the CRD schema layer's documented pattern, the
/// CLI config flags, and every component that needs a duration off the spec.
pub fn parse_bounded_duration(input: &str) -> Result<chrono::Duration, String> {
    if input.is_empty() {
        return Err("duration string is empty".to_string());
    }

    let mut total = chrono::Duration::zero();
    let mut digits = String::new();
    let mut saw_unit = false;

    for ch in input.chars() {
        if ch.is_ascii_digit() {
            digits.push(ch);
        } else if matches!(ch, 's' | 'm' | 'h') {
            if digits.is_empty() {
                return Err(format!("malformed duration `{input}`: unit with no digits"));
            }
            let value: i64 = digits
                .parse()
                .map_err(|_| format!("malformed duration `{input}`: number too large"))?;
            digits.clear();
            saw_unit = true;
            total += match ch {
                's' => chrono::Duration::seconds(value),
                'm' => chrono::Duration::minutes(value),
                'h' => chrono::Duration::hours(value),
                _ => unreachable!(),
            };
        } else {
            return Err(format!("malformed duration `{input}`: unexpected character `{ch}`"));
        }
    }

    if !digits.is_empty() || !saw_unit {
        return Err(format!("malformed duration `{input}`: trailing digits with no unit"));
    }

    Ok(total)
}

/// Parses the memory size grammar `^[0-9]+[MG]$`, returning bytes.
pub fn parse_memory_size(input: &str) -> Result<u64, String> {
    let (digits, unit) = input.split_at(input.len().saturating_sub(1));
    if digits.is_empty() || !(unit == "M" || unit == "G") {
        return Err(format!("malformed memory size `{input}`: expected `<digits>M` or `<digits>G`"));
    }
    let value: u64 = digits
        .parse()
        .map_err(|_| format!("malformed memory size `{input}`: not a number"))?;
    Ok(match unit {
        "M" => value * 1024 * 1024,
        "G" => value * 1024 * 1024 * 1024,
        _ => unreachable!(),
    })
}

const VALID_WEEKDAYS: [&str; 7] = ["Mon", "Tue", "Wed", "Thu", "Fri", "Sat", "Sun"];

/* ============================= SCHEMA LAYER ============================= */

/// The schema layer is expressed as `schemars(range(...))`/`schemars(regex(...))`
/// attributes directly on `ChaosExperimentSpec` in `crd.rs`, so `kubectl apply`
/// rejects an out-of-range/malformed spec at admission without reaching this
/// library at all. Those attributes only take effect through the apiserver's
/// OpenAPI validation, though, so `validate_cross_field` below re-checks the
/// same numeric bounds directly: every caller that builds a spec in-process
/// (the reconciler's own re-validation, tests, any future non-webhook caller)
/// goes through this function instead of `kubectl apply` and must not skip
/// the bound check just because the CRD schema would have caught it.

/* ============================= CROSS-FIELD LAYER ============================= */

/// Deterministic pure function over the spec (§4.1 cross-field layer).
pub fn validate_cross_field(spec: &ChaosExperimentSpec) -> Vec<ValidationError> {
    let mut errors = Vec::new();

    if !(1..=100).contains(&spec.count) {
        errors.push(ValidationError::new("count", "count must be in [1,100]"));
    }
    if !(0..=10).contains(&spec.max_retries) {
        errors.push(ValidationError::new("maxRetries", "maxRetries must be in [0,10]"));
    }
    if let Some(p) = spec.max_percentage {
        if !(1..=100).contains(&p) {
            errors.push(ValidationError::new("maxPercentage", "maxPercentage must be in [1,100]"));
        }
    }
    if let Err(e) = parse_bounded_duration(&spec.retry_delay) {
        errors.push(ValidationError::new("retryDelay", e));
    }

    if spec.action.requires_duration() {
        match &spec.duration {
            None => errors.push(ValidationError::new("duration", format!("{:?} requires `duration`", spec.action))),
            Some(d) => {
                if let Err(e) = parse_bounded_duration(d) {
                    errors.push(ValidationError::new("duration", e));
                }
            }
        }
    }

    match spec.action {
        Action::PodCpuStress => {
            match spec.cpu_load {
                Some(load) if (1..=100).contains(&load) => {}
                _ => errors.push(ValidationError::new("cpuLoad", "pod-cpu-stress requires cpuLoad in [1,100]")),
            }
            if let Some(workers) = spec.cpu_workers {
                if !(1..=32).contains(&workers) {
                    errors.push(ValidationError::new("cpuWorkers", "cpuWorkers must be in [1,32]"));
                }
            }
        }
        Action::PodMemoryStress => {
            match &spec.memory_size {
                None => errors.push(ValidationError::new("memorySize", "pod-memory-stress requires memorySize")),
                Some(size) => {
                    if let Err(e) = parse_memory_size(size) {
                        errors.push(ValidationError::new("memorySize", e));
                    }
                }
            }
            if let Some(workers) = spec.memory_workers {
                if !(1..=8).contains(&workers) {
                    errors.push(ValidationError::new("memoryWorkers", "memoryWorkers must be in [1,8]"));
                }
            }
        }
        Action::PodNetworkLoss => {
            match spec.loss_percentage {
                Some(p) if (1..=40).contains(&p) => {}
                _ => errors.push(ValidationError::new("lossPercentage", "pod-network-loss requires lossPercentage in [1,40]")),
            }
            if let Some(c) = spec.loss_correlation {
                if c > 100 {
                    errors.push(ValidationError::new("lossCorrelation", "lossCorrelation must be in [0,100]"));
                }
            }
        }
        Action::PodDiskFill => {
            match spec.fill_percentage {
                Some(p) if (50..=95).contains(&p) => {}
                _ => errors.push(ValidationError::new("fillPercentage", "pod-disk-fill requires fillPercentage in [50,95]")),
            }
            if spec.target_path.is_empty() && spec.volume_name.is_none() {
                errors.push(ValidationError::new("targetPath", "pod-disk-fill requires targetPath or volumeName"));
            }
        }
        _ => {}
    }

    for (i, window) in spec.time_windows.iter().enumerate() {
        errors.extend(validate_time_window(i, window));
    }

    errors
}

fn validate_time_window(index: usize, window: &TimeWindow) -> Vec<ValidationError> {
    let mut errors = Vec::new();
    let field = format!("timeWindows[{index}]");

    if window.is_absolute() {
        match (&window.start_time, &window.end_time) {
            (Some(start), Some(end)) => {
                match (
                    chrono::DateTime::parse_from_rfc3339(start),
                    chrono::DateTime::parse_from_rfc3339(end),
                ) {
                    (Ok(s), Ok(e)) if e <= s => {
                        errors.push(ValidationError::new(&field, "absolute window endTime must be after startTime"));
                    }
                    (Ok(_), Ok(_)) => {}
                    _ => errors.push(ValidationError::new(&field, "absolute window requires RFC3339 startTime/endTime")),
                }
            }
            _ => errors.push(ValidationError::new(&field, "absolute window requires both startTime and endTime")),
        }
    } else {
        match (&window.start, &window.end) {
            (Some(start), Some(end)) => {
                if !is_valid_hhmm(start) || !is_valid_hhmm(end) {
                    errors.push(ValidationError::new(&field, "recurring window start/end must be HH:MM"));
                } else if start == end {
                    errors.push(ValidationError::new(&field, "recurring window start must not equal end"));
                }
            }
            _ => errors.push(ValidationError::new(&field, "recurring window requires both start and end")),
        }

        if let Some(tz) = &window.timezone {
            if tz.parse::<chrono_tz::Tz>().is_err() {
                errors.push(ValidationError::new(&field, format!("unknown IANA timezone `{tz}`")));
            }
        }

        for day in &window.days_of_week {
            if !VALID_WEEKDAYS.contains(&day.as_str()) {
                errors.push(ValidationError::new(&field, format!("unknown weekday `{day}`, expected one of Mon..Sun")));
            }
        }
    }

    errors
}

fn is_valid_hhmm(s: &str) -> bool {
    let Some((h, m)) = s.split_once(':') else { return false };
    let (Ok(h), Ok(m)) = (h.parse::<u32>(), m.parse::<u32>()) else { return false };
    h < 24 && m < 60
}

/* ============================= CLUSTER-AWARE LAYER ============================= */

/// Production-namespace detection shared by the Validator (admission) and the
/// Safety Gate (reconcile-time re-check).
///
/// A namespace is production iff: annotation `chaos.gushchin.dev/production=true`,
/// or label `environment=production`, or label `env=prod`, or its name matches
/// `production|prod-*|*-prod|*-production`.
pub fn is_production_namespace(
    name: &str,
    labels: &BTreeMap<String, String>,
    annotations: &BTreeMap<String, String>,
) -> bool {
    if annotations.get("chaos.gushchin.dev/production").map(String::as_str) == Some("true") {
        return true;
    }
    if labels.get("environment").map(String::as_str) == Some("production") {
        return true;
    }
    if labels.get("env").map(String::as_str) == Some("prod") {
        return true;
    }
    name == "production" || name.starts_with("prod-") || name.ends_with("-prod") || name.ends_with("-production")
}

/// Cluster-aware admission layer (§4.1). Callers supply cluster facts already
/// resolved by the collaborator client; this function stays a pure decision.
pub struct ClusterFacts<'a> {
    pub namespace_exists: bool,
    pub matched_pods: usize,
    pub excluded_pods: usize,
    pub namespace_name: &'a str,
    pub namespace_labels: &'a BTreeMap<String, String>,
    pub namespace_annotations: &'a BTreeMap<String, String>,
}

pub fn validate_cluster_aware(spec: &ChaosExperimentSpec, facts: &ClusterFacts) -> ValidationOutcome {
    let mut outcome = ValidationOutcome::default();

    if !facts.namespace_exists {
        outcome.errors.push(ValidationError::new("targetNamespace", "target namespace does not exist"));
        return outcome;
    }

    if facts.matched_pods == 0 {
        outcome.errors.push(ValidationError::new("selector", "selector matches no pods"));
        return outcome;
    }

    if spec.count as usize > facts.matched_pods {
        outcome.warnings.push(format!(
            "count {} exceeds {} matching pod(s); will be capped at reconcile time",
            spec.count, facts.matched_pods
        ));
    }

    if is_production_namespace(facts.namespace_name, facts.namespace_labels, facts.namespace_annotations)
        && !spec.allow_production
    {
        outcome.errors.push(ValidationError::new(
            "allowProduction",
            format!("namespace `{}` is production; set allowProduction=true", facts.namespace_name),
        ));
    }

    let eligible_after_exclusion = facts.matched_pods.saturating_sub(facts.excluded_pods);
    if eligible_after_exclusion == 0 {
        outcome.errors.push(ValidationError::new("selector", "all matching pods are excluded"));
        return outcome;
    }

    if let Some(max_pct) = spec.max_percentage {
        let actual_pct = (spec.count as f64 / eligible_after_exclusion as f64) * 100.0;
        if actual_pct > max_pct as f64 {
            outcome.errors.push(ValidationError::new(
                "maxPercentage",
                format!(
                    "count {} of {} eligible is exceeding maxPercentage limit of {}%",
                    spec.count, eligible_after_exclusion, max_pct
                ),
            ));
        }
    }

    outcome
}

/* ============================= TESTS ============================= */

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn base_spec(action: Action) -> ChaosExperimentSpec {
        ChaosExperimentSpec {
            action,
            target_namespace: "default".to_string(),
            selector: BTreeMap::from([("app".to_string(), "nginx".to_string())]),
            count: 1,
            duration: None,
            experiment_duration: None,
            schedule: None,
            time_windows: vec![],
            max_retries: 3,
            retry_backoff: Default::default(),
            retry_delay: "30s".to_string(),
            dry_run: false,
            max_percentage: None,
            allow_production: false,
            cpu_load: None,
            cpu_workers: None,
            memory_size: None,
            memory_workers: None,
            loss_percentage: None,
            loss_correlation: None,
            fill_percentage: None,
            target_path: "/tmp".to_string(),
            volume_name: None,
            restart_interval: None,
        }
    }

    #[test]
    fn test_parse_bounded_duration_simple() {
        assert_eq!(parse_bounded_duration("30s").unwrap(), chrono::Duration::seconds(30));
        assert_eq!(parse_bounded_duration("5m").unwrap(), chrono::Duration::minutes(5));
        assert_eq!(parse_bounded_duration("1h").unwrap(), chrono::Duration::hours(1));
    }

    #[test]
    fn test_parse_bounded_duration_compound() {
        let d = parse_bounded_duration("1h30m").unwrap();
        assert_eq!(d, chrono::Duration::hours(1) + chrono::Duration::minutes(30));
    }

    #[test]
    fn test_parse_bounded_duration_rejects_garbage() {
        assert!(parse_bounded_duration("abc").is_err());
        assert!(parse_bounded_duration("30").is_err());
        assert!(parse_bounded_duration("").is_err());
        assert!(parse_bounded_duration("30x").is_err());
    }

    #[test]
    fn test_parse_memory_size() {
        assert_eq!(parse_memory_size("512M").unwrap(), 512 * 1024 * 1024);
        assert_eq!(parse_memory_size("2G").unwrap(), 2 * 1024 * 1024 * 1024);
        assert!(parse_memory_size("512").is_err());
        assert!(parse_memory_size("MG").is_err());
    }

    #[test]
    fn test_cross_field_pod_delay_requires_duration() {
        let spec = base_spec(Action::PodDelay);
        let errors = validate_cross_field(&spec);
        assert!(errors.iter().any(|e| e.field == "duration"));
    }

    #[test]
    fn test_cross_field_pod_cpu_stress_requires_cpu_load() {
        let spec = ChaosExperimentSpec {
            duration: Some("1m".to_string()),
            ..base_spec(Action::PodCpuStress)
        };
        let errors = validate_cross_field(&spec);
        assert!(errors.iter().any(|e| e.field == "cpuLoad"));
    }

    #[test]
    fn test_cross_field_pod_cpu_stress_valid() {
        let spec = ChaosExperimentSpec {
            duration: Some("1m".to_string()),
            cpu_load: Some(80),
            ..base_spec(Action::PodCpuStress)
        };
        assert!(validate_cross_field(&spec).is_empty());
    }

    #[test]
    fn test_cross_field_network_loss_percentage_bounds() {
        let mut spec = ChaosExperimentSpec {
            duration: Some("30s".to_string()),
            loss_percentage: Some(50),
            ..base_spec(Action::PodNetworkLoss)
        };
        assert!(validate_cross_field(&spec).iter().any(|e| e.field == "lossPercentage"));
        spec.loss_percentage = Some(20);
        assert!(validate_cross_field(&spec).is_empty());
    }

    #[test]
    fn test_cross_field_count_out_of_range() {
        let mut spec = base_spec(Action::PodKill);
        spec.count = 0;
        assert!(validate_cross_field(&spec).iter().any(|e| e.field == "count"));
        spec.count = 101;
        assert!(validate_cross_field(&spec).iter().any(|e| e.field == "count"));
        spec.count = 100;
        assert!(!validate_cross_field(&spec).iter().any(|e| e.field == "count"));
    }

    #[test]
    fn test_cross_field_max_retries_out_of_range() {
        let mut spec = base_spec(Action::PodKill);
        spec.max_retries = 11;
        assert!(validate_cross_field(&spec).iter().any(|e| e.field == "maxRetries"));
        spec.max_retries = 10;
        assert!(!validate_cross_field(&spec).iter().any(|e| e.field == "maxRetries"));
    }

    #[test]
    fn test_cross_field_max_percentage_out_of_range() {
        let mut spec = base_spec(Action::PodKill);
        spec.max_percentage = Some(0);
        assert!(validate_cross_field(&spec).iter().any(|e| e.field == "maxPercentage"));
        spec.max_percentage = Some(101);
        assert!(validate_cross_field(&spec).iter().any(|e| e.field == "maxPercentage"));
        spec.max_percentage = Some(30);
        assert!(!validate_cross_field(&spec).iter().any(|e| e.field == "maxPercentage"));
    }

    #[test]
    fn test_cross_field_cpu_load_upper_bound_and_workers_range() {
        let mut spec = ChaosExperimentSpec {
            duration: Some("1m".to_string()),
            cpu_load: Some(150),
            cpu_workers: Some(64),
            ..base_spec(Action::PodCpuStress)
        };
        let errors = validate_cross_field(&spec);
        assert!(errors.iter().any(|e| e.field == "cpuLoad"));
        assert!(errors.iter().any(|e| e.field == "cpuWorkers"));
        spec.cpu_load = Some(80);
        spec.cpu_workers = Some(4);
        assert!(validate_cross_field(&spec).is_empty());
    }

    #[test]
    fn test_cross_field_memory_workers_range() {
        let mut spec = ChaosExperimentSpec {
            duration: Some("1m".to_string()),
            memory_size: Some("512M".to_string()),
            memory_workers: Some(9),
            ..base_spec(Action::PodMemoryStress)
        };
        assert!(validate_cross_field(&spec).iter().any(|e| e.field == "memoryWorkers"));
        spec.memory_workers = Some(8);
        assert!(validate_cross_field(&spec).is_empty());
    }

    #[test]
    fn test_cross_field_loss_correlation_range() {
        let mut spec = ChaosExperimentSpec {
            duration: Some("30s".to_string()),
            loss_percentage: Some(20),
            loss_correlation: Some(101),
            ..base_spec(Action::PodNetworkLoss)
        };
        assert!(validate_cross_field(&spec).iter().any(|e| e.field == "lossCorrelation"));
        spec.loss_correlation = Some(100);
        assert!(validate_cross_field(&spec).is_empty());
    }

    #[test]
    fn test_cross_field_disk_fill_requires_path_or_volume() {
        let spec = ChaosExperimentSpec {
            duration: Some("30s".to_string()),
            fill_percentage: Some(80),
            target_path: String::new(),
            volume_name: None,
            ..base_spec(Action::PodDiskFill)
        };
        assert!(validate_cross_field(&spec).iter().any(|e| e.field == "targetPath"));
    }

    #[test]
    fn test_cross_field_pod_kill_has_no_extra_requirements() {
        let spec = base_spec(Action::PodKill);
        assert!(validate_cross_field(&spec).is_empty());
    }

    #[test]
    fn test_time_window_recurring_valid() {
        let window = TimeWindow {
            start: Some("22:00".to_string()),
            end: Some("02:00".to_string()),
            ..Default::default()
        };
        assert!(validate_time_window(0, &window).is_empty());
    }

    #[test]
    fn test_time_window_recurring_equal_start_end_rejected() {
        let window = TimeWindow {
            start: Some("10:00".to_string()),
            end: Some("10:00".to_string()),
            ..Default::default()
        };
        assert!(!validate_time_window(0, &window).is_empty());
    }

    #[test]
    fn test_time_window_bad_timezone_rejected() {
        let window = TimeWindow {
            start: Some("09:00".to_string()),
            end: Some("17:00".to_string()),
            timezone: Some("Mars/Crater".to_string()),
            ..Default::default()
        };
        assert!(!validate_time_window(0, &window).is_empty());
    }

    #[test]
    fn test_time_window_good_timezone_accepted() {
        let window = TimeWindow {
            start: Some("09:00".to_string()),
            end: Some("17:00".to_string()),
            timezone: Some("Europe/Berlin".to_string()),
            ..Default::default()
        };
        assert!(validate_time_window(0, &window).is_empty());
    }

    #[test]
    fn test_time_window_bad_weekday_rejected() {
        let window = TimeWindow {
            start: Some("09:00".to_string()),
            end: Some("17:00".to_string()),
            days_of_week: vec!["Funday".to_string()],
            ..Default::default()
        };
        assert!(!validate_time_window(0, &window).is_empty());
    }

    #[test]
    fn test_time_window_absolute_end_after_start() {
        let window = TimeWindow {
            start_time: Some("2026-01-02T00:00:00Z".to_string()),
            end_time: Some("2026-01-01T00:00:00Z".to_string()),
            ..Default::default()
        };
        assert!(!validate_time_window(0, &window).is_empty());
    }

    fn empty_facts<'a>(
        namespace_name: &'a str,
        labels: &'a BTreeMap<String, String>,
        annotations: &'a BTreeMap<String, String>,
    ) -> ClusterFacts<'a> {
        ClusterFacts {
            namespace_exists: true,
            matched_pods: 5,
            excluded_pods: 0,
            namespace_name,
            namespace_labels: labels,
            namespace_annotations: annotations,
        }
    }

    #[test]
    fn test_cluster_aware_rejects_missing_namespace() {
        let labels = BTreeMap::new();
        let annotations = BTreeMap::new();
        let mut facts = empty_facts("default", &labels, &annotations);
        facts.namespace_exists = false;
        let spec = base_spec(Action::PodKill);
        let outcome = validate_cluster_aware(&spec, &facts);
        assert!(!outcome.is_valid());
    }

    #[test]
    fn test_cluster_aware_rejects_zero_matches() {
        let labels = BTreeMap::new();
        let annotations = BTreeMap::new();
        let mut facts = empty_facts("default", &labels, &annotations);
        facts.matched_pods = 0;
        let spec = base_spec(Action::PodKill);
        let outcome = validate_cluster_aware(&spec, &facts);
        assert!(!outcome.is_valid());
    }

    #[test]
    fn test_cluster_aware_warns_on_count_exceeding_matches() {
        let labels = BTreeMap::new();
        let annotations = BTreeMap::new();
        let facts = empty_facts("default", &labels, &annotations);
        let spec = ChaosExperimentSpec { count: 10, ..base_spec(Action::PodKill) };
        let outcome = validate_cluster_aware(&spec, &facts);
        assert!(outcome.is_valid());
        assert!(!outcome.warnings.is_empty());
    }

    #[test]
    fn test_cluster_aware_production_blocks_without_allow() {
        let labels = BTreeMap::from([("environment".to_string(), "production".to_string())]);
        let annotations = BTreeMap::new();
        let facts = empty_facts("default", &labels, &annotations);
        let spec = base_spec(Action::PodKill);
        let outcome = validate_cluster_aware(&spec, &facts);
        assert!(!outcome.is_valid());
        assert!(outcome.errors.iter().any(|e| e.field == "allowProduction"));
    }

    #[test]
    fn test_cluster_aware_production_allowed_with_flag() {
        let labels = BTreeMap::from([("environment".to_string(), "production".to_string())]);
        let annotations = BTreeMap::new();
        let facts = empty_facts("default", &labels, &annotations);
        let spec = ChaosExperimentSpec { allow_production: true, ..base_spec(Action::PodKill) };
        let outcome = validate_cluster_aware(&spec, &facts);
        assert!(outcome.is_valid());
    }

    #[test]
    fn test_cluster_aware_max_percentage_cap() {
        let labels = BTreeMap::new();
        let annotations = BTreeMap::new();
        let facts = empty_facts("default", &labels, &annotations);
        let spec = ChaosExperimentSpec { count: 3, max_percentage: Some(30), ..base_spec(Action::PodKill) };
        let outcome = validate_cluster_aware(&spec, &facts);
        assert!(!outcome.is_valid());
        assert!(outcome.errors.iter().any(|e| e.field == "maxPercentage"));
        assert!(outcome.denial_message().unwrap().contains("exceeding maxPercentage limit of 30%"));
    }

    #[test]
    fn test_is_production_namespace_by_name_pattern() {
        let empty = BTreeMap::new();
        assert!(is_production_namespace("production", &empty, &empty));
        assert!(is_production_namespace("prod-checkout", &empty, &empty));
        assert!(is_production_namespace("checkout-prod", &empty, &empty));
        assert!(is_production_namespace("checkout-production", &empty, &empty));
        assert!(!is_production_namespace("staging", &empty, &empty));
    }

    #[test]
    fn test_is_production_namespace_by_annotation() {
        let annotations = BTreeMap::from([("chaos.gushchin.dev/production".to_string(), "true".to_string())]);
        let empty = BTreeMap::new();
        assert!(is_production_namespace("anything", &empty, &annotations));
    }

    #[test]
    fn test_is_production_namespace_by_env_label() {
        let labels = BTreeMap::from([("env".to_string(), "prod".to_string())]);
        let empty = BTreeMap::new();
        assert!(is_production_namespace("anything", &labels, &empty));
    }
}
