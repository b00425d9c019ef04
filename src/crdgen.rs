use kube::CustomResourceExt;

use chaos_operator::crd::{ChaosExperiment, ChaosExperimentHistory};

fn main() {
    let experiment = ChaosExperiment::crd();
    let history = ChaosExperimentHistory::crd();
    println!("{}", serde_yaml::to_string(&experiment).expect("CRD should serialize to YAML"));
    println!("---");
    println!("{}", serde_yaml::to_string(&history).expect("CRD should serialize to YAML"));
}
