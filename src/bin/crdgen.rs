//! # CRD Generator
//!
//! Prints the CustomResourceDefinitions of every experiment kind as a
//! multi-document YAML stream.
//!
//! ```bash
//! cargo run --bin crdgen | kubectl apply -f -
//! ```

use anyhow::Result;
use chaos_controller::crd::{HTTPChaos, NetworkChaos, PodChaos};
use kube::CustomResourceExt;

fn main() -> Result<()> {
    let crds = [HTTPChaos::crd(), NetworkChaos::crd(), PodChaos::crd()];
    for crd in &crds {
        print!("---\n{}", serde_yaml::to_string(crd)?);
    }
    Ok(())
}
