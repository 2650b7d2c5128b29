//! # CRD Generator
//!
//! Generates the `PropertyConfig` CustomResourceDefinition YAML from the Rust
//! type definitions.
//!
//! ## Usage
//!
//! ```bash
//! cargo run --bin crdgen > config/crd/propertyconfig.yaml
//! cargo run --bin crdgen | kubectl apply -f -
//! ```

use kube::CustomResourceExt;
use property_config_controller::crd::PropertyConfig;

fn main() -> anyhow::Result<()> {
    print!("{}", serde_yaml::to_string(&PropertyConfig::crd())?);
    Ok(())
}
