//! `stepwise tools`: list the built-in capabilities.

use stepwise_tools::{MemoryStore, default_registry};

pub fn run() -> Result<(), Box<dyn std::error::Error>> {
    let registry = default_registry(MemoryStore::new())?;

    println!("  {} capabilities registered", registry.len());
    for spec in registry.specs() {
        println!();
        println!("  {}: {}", spec.name, spec.description);
        println!("{}", serde_json::to_string_pretty(&spec.json_schema())?);
    }
    Ok(())
}
