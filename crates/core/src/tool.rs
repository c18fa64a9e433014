//! Tool trait and registry: the abstraction over agent capabilities.
//!
//! Tools give the agent the ability to act: evaluate an expression, look up
//! the weather, remember a value. Each one is registered together with a
//! [`ToolSpec`] and invoked by name. The registry never lets a failure
//! escape: unknown names, bad parameters, errors, panics and timeouts all
//! come back as a failed [`ToolOutcome`].

use crate::error::{RegistryError, ToolError};
use crate::schema::ToolSpec;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::FutureExt;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};

pub use crate::schema::ToolParams;

/// The core Tool trait.
///
/// Implementations receive parameters that have already been validated and
/// normalized against their spec (defaults filled, types coerced).
#[async_trait]
pub trait Tool: Send + Sync {
    /// Execute the capability.
    async fn call(&self, params: ToolParams) -> std::result::Result<Value, ToolError>;
}

/// Adapter turning a synchronous closure into a [`Tool`].
pub struct FnTool<F>(pub F);

#[async_trait]
impl<F> Tool for FnTool<F>
where
    F: Fn(ToolParams) -> std::result::Result<Value, ToolError> + Send + Sync,
{
    async fn call(&self, params: ToolParams) -> std::result::Result<Value, ToolError> {
        (self.0)(params)
    }
}

/// Why an invocation failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FailureKind {
    /// Parameters did not satisfy the schema.
    Validation,
    /// The implementation returned an error, panicked or timed out.
    Execution,
    /// No capability registered under the requested name.
    NotFound,
}

impl FailureKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureKind::Validation => "validation",
            FailureKind::Execution => "execution",
            FailureKind::NotFound => "not-found",
        }
    }
}

impl std::fmt::Display for FailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Success payload or failure details; never both.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ToolStatus {
    Success { data: Value },
    Failed { category: FailureKind, error: String },
}

/// The uniform result envelope of one invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolOutcome {
    /// The capability name that was requested.
    pub capability: String,

    #[serde(flatten)]
    pub status: ToolStatus,

    pub timestamp: DateTime<Utc>,

    /// Wall-clock time spent inside the registry.
    pub duration_ms: u64,
}

impl ToolOutcome {
    fn new(capability: &str, status: ToolStatus, started: Instant) -> Self {
        Self {
            capability: capability.to_string(),
            status,
            timestamp: Utc::now(),
            duration_ms: started.elapsed().as_millis() as u64,
        }
    }

    fn failed(capability: &str, category: FailureKind, error: String, started: Instant) -> Self {
        Self::new(capability, ToolStatus::Failed { category, error }, started)
    }

    pub fn is_success(&self) -> bool {
        matches!(self.status, ToolStatus::Success { .. })
    }

    pub fn data(&self) -> Option<&Value> {
        match &self.status {
            ToolStatus::Success { data } => Some(data),
            ToolStatus::Failed { .. } => None,
        }
    }

    pub fn error(&self) -> Option<&str> {
        match &self.status {
            ToolStatus::Success { .. } => None,
            ToolStatus::Failed { error, .. } => Some(error),
        }
    }

    pub fn category(&self) -> Option<FailureKind> {
        match &self.status {
            ToolStatus::Success { .. } => None,
            ToolStatus::Failed { category, .. } => Some(*category),
        }
    }

    /// Render the outcome as observation text for the next prompt.
    pub fn render_observation(&self) -> String {
        match &self.status {
            ToolStatus::Success { data: Value::Object(map) } => {
                let mut out = String::from("Tool execution succeeded:");
                for (key, value) in map {
                    out.push('\n');
                    out.push_str(key);
                    out.push_str(": ");
                    out.push_str(&display_value(value));
                }
                out
            }
            ToolStatus::Success { data } => {
                format!("Tool execution succeeded: {}", display_value(data))
            }
            ToolStatus::Failed { category, error } => {
                format!("Tool execution failed ({category}): {error}")
            }
        }
    }
}

/// Strings are shown bare, everything else as compact JSON.
fn display_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

struct Entry {
    spec: ToolSpec,
    tool: Arc<dyn Tool>,
}

/// A registry of available capabilities.
///
/// Populated once during setup, then shared read-only (behind an `Arc`)
/// by any number of loop controllers.
pub struct ToolRegistry {
    entries: Vec<Entry>,
    index: HashMap<String, usize>,
    timeout: Option<Duration>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
            index: HashMap::new(),
            timeout: None,
        }
    }

    /// Bound every invocation by `timeout`; overruns become execution failures.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Register a capability under `spec.name`.
    pub fn register(
        &mut self,
        spec: ToolSpec,
        tool: impl Tool + 'static,
    ) -> std::result::Result<(), RegistryError> {
        spec.check_consistency()?;
        if self.index.contains_key(&spec.name) {
            return Err(RegistryError::DuplicateCapability(spec.name));
        }

        tracing::debug!(capability = %spec.name, params = spec.params.len(), "Registered capability");
        self.index.insert(spec.name.clone(), self.entries.len());
        self.entries.push(Entry {
            spec,
            tool: Arc::new(tool),
        });
        Ok(())
    }

    /// Register a synchronous closure as a capability.
    pub fn register_fn<F>(&mut self, spec: ToolSpec, f: F) -> std::result::Result<(), RegistryError>
    where
        F: Fn(ToolParams) -> std::result::Result<Value, ToolError> + Send + Sync + 'static,
    {
        self.register(spec, FnTool(f))
    }

    /// Invoke a capability by name. Never fails; see [`ToolOutcome`].
    pub async fn invoke(&self, name: &str, params: ToolParams) -> ToolOutcome {
        let started = Instant::now();

        let Some(entry) = self.index.get(name).map(|&i| &self.entries[i]) else {
            let error = format!(
                "capability not found: '{name}'. Available capabilities: {}",
                self.list_capabilities().join(", ")
            );
            return ToolOutcome::failed(name, FailureKind::NotFound, error, started);
        };

        let params = match entry.spec.validate(&params) {
            Ok(params) => params,
            Err(e) => {
                let error = format!("invalid parameters for '{name}': {e}");
                return ToolOutcome::failed(name, FailureKind::Validation, error, started);
            }
        };

        let call = AssertUnwindSafe(entry.tool.call(params)).catch_unwind();
        let result = match self.timeout {
            Some(limit) => match tokio::time::timeout(limit, call).await {
                Ok(result) => result,
                Err(_) => Ok(Err(ToolError::Timeout {
                    tool_name: name.to_string(),
                    timeout_ms: limit.as_millis() as u64,
                })),
            },
            None => call.await,
        };

        match result {
            Ok(Ok(data)) => ToolOutcome::new(name, ToolStatus::Success { data }, started),
            Ok(Err(e)) => {
                tracing::debug!(capability = name, error = %e, "Capability returned an error");
                ToolOutcome::failed(name, FailureKind::Execution, e.to_string(), started)
            }
            Err(panic) => {
                let reason = panic
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| panic.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "unknown panic".to_string());
                tracing::warn!(capability = name, %reason, "Capability panicked");
                let error = format!("capability '{name}' panicked: {reason}");
                ToolOutcome::failed(name, FailureKind::Execution, error, started)
            }
        }
    }

    /// All registered names, in registration order.
    pub fn list_capabilities(&self) -> Vec<String> {
        self.entries.iter().map(|e| e.spec.name.clone()).collect()
    }

    /// The spec registered under `name`, if any.
    pub fn describe(&self, name: &str) -> Option<&ToolSpec> {
        self.index.get(name).map(|&i| &self.entries[i].spec)
    }

    /// All specs, in registration order.
    pub fn specs(&self) -> impl Iterator<Item = &ToolSpec> {
        self.entries.iter().map(|e| &e.spec)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}
