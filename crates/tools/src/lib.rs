//! Built-in capabilities for the Stepwise agent.
//!
//! Each tool exposes a `spec()` describing its parameters and implements
//! [`stepwise_core::Tool`]. [`default_registry`] wires all of them up.

pub mod calculator;
pub mod current_time;
pub mod memory_store;
pub mod text_analyzer;
pub mod weather;

pub use calculator::CalculatorTool;
pub use current_time::CurrentTimeTool;
pub use memory_store::{MemoryStore, MemoryStoreTool};
pub use text_analyzer::TextAnalyzerTool;
pub use weather::WeatherTool;

use stepwise_core::error::{RegistryError, ToolError};
use stepwise_core::tool::{ToolParams, ToolRegistry};

/// Create a registry with all built-in tools.
///
/// `store` backs the `memory_store` capability and should be owned by the
/// session that uses the registry.
pub fn default_registry(store: MemoryStore) -> Result<ToolRegistry, RegistryError> {
    populate(ToolRegistry::new(), store)
}

/// Register all built-in tools into an existing (e.g. timeout-bounded) registry.
pub fn populate(mut registry: ToolRegistry, store: MemoryStore) -> Result<ToolRegistry, RegistryError> {
    registry.register(CalculatorTool::spec(), CalculatorTool)?;
    registry.register(WeatherTool::spec(), WeatherTool)?;
    registry.register(TextAnalyzerTool::spec(), TextAnalyzerTool)?;
    registry.register(CurrentTimeTool::spec(), CurrentTimeTool)?;
    registry.register(MemoryStoreTool::spec(), MemoryStoreTool::new(store))?;
    Ok(registry)
}

/// Fetch a string parameter that the schema marks as required.
pub(crate) fn str_param<'a>(params: &'a ToolParams, name: &str) -> Result<&'a str, ToolError> {
    params
        .get(name)
        .and_then(|v| v.as_str())
        .ok_or_else(|| ToolError::InvalidArguments(format!("missing '{name}' argument")))
}
