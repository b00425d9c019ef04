use clap::Parser;

/// Start-up configuration for the reconcile loop (§6 "Operator start-up configuration").
///
/// Leader election and the metrics port are deliberately absent: they belong
/// to the deployment manifest, not the core engine.
#[derive(Parser, Debug, Clone)]
pub struct OperatorConfig {
    /// Namespace history records are created in, independent of the target
    /// namespace of the experiment that produced them.
    #[arg(long, env = "HISTORY_NAMESPACE", default_value = "chaos-operator-system")]
    pub history_namespace: String,

    /// Per-experiment history count cap; 0 disables the count cap.
    #[arg(long, default_value_t = 100)]
    pub history_retention_limit: u32,

    /// History TTL as a bounded duration string; 0 disables the TTL cap.
    /// Minimum 1h when enabled, per §6.
    #[arg(long, default_value = "720h")]
    pub history_ttl: String,

    #[arg(long, default_value_t = true)]
    pub enable_history: bool,

    /// Upper bound on reconciles running concurrently across distinct experiments.
    #[arg(long, default_value_t = 1)]
    pub max_concurrent_reconciles: usize,
}

impl OperatorConfig {
    /// Parses `history_ttl` through the same duration grammar the CRD schema
    /// layer uses (`^([0-9]+(s|m|h))+$`), returning `None` when TTL is disabled.
    pub fn history_ttl_duration(&self) -> Result<Option<chrono::Duration>, String> {
        let parsed = crate::validator::parse_bounded_duration(&self.history_ttl)?;
        if parsed.is_zero() {
            return Ok(None);
        }
        let one_hour = chrono::Duration::hours(1);
        if parsed < one_hour {
            return Err(format!(
                "history-ttl must be 0 (disabled) or at least 1h, got {}",
                self.history_ttl
            ));
        }
        Ok(Some(parsed))
    }
}
