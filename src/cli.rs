use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "chaos-operator")]
#[command(about = "Kubernetes chaos-engineering operator")]
#[command(version = env!("CARGO_PKG_VERSION"))]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Display application version
    Version,

    /// Check cluster connectivity and permissions
    Check,

    /// List Kubernetes resources (e.g. pods)
    List {
        /// Resource type to list (pods)
        resource: String,
    },

    /// Manage the ChaosExperiment and ChaosExperimentHistory CRDs
    Crd {
        #[command(subcommand)]
        action: CrdAction,
    },

    /// Start the chaos-operator reconcile loop
    Reconcile(chaos_operator::config::OperatorConfig),
}

#[derive(Subcommand)]
pub enum CrdAction {
    /// Print both CRDs' YAML to stdout
    Generate,

    /// Install both CRDs into the connected cluster
    Install,
}
