//! Key/value memory capability.
//!
//! The storage lives in a [`MemoryStore`] handle owned by the session that
//! builds the registry; two sessions with two stores never see each other's
//! keys.

use async_trait::async_trait;
use serde_json::{Value, json};
use std::collections::HashMap;
use std::sync::Arc;
use stepwise_core::error::ToolError;
use stepwise_core::schema::{ParamSpec, ParamType, ToolSpec};
use stepwise_core::tool::{Tool, ToolParams};
use tokio::sync::RwLock;

/// Session-scoped string storage. Cloning shares the same map.
#[derive(Clone, Default)]
pub struct MemoryStore {
    inner: Arc<RwLock<HashMap<String, String>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn set(&self, key: impl Into<String>, value: impl Into<String>) {
        self.inner.write().await.insert(key.into(), value.into());
    }

    pub async fn get(&self, key: &str) -> Option<String> {
        self.inner.read().await.get(key).cloned()
    }

    pub async fn delete(&self, key: &str) -> Option<String> {
        self.inner.write().await.remove(key)
    }

    pub async fn len(&self) -> usize {
        self.inner.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.read().await.is_empty()
    }
}

pub struct MemoryStoreTool {
    store: MemoryStore,
}

impl MemoryStoreTool {
    pub const NAME: &'static str = "memory_store";

    pub fn new(store: MemoryStore) -> Self {
        Self { store }
    }

    pub fn spec() -> ToolSpec {
        ToolSpec::new(
            Self::NAME,
            "Remember, recall or forget a value for the rest of this session.",
        )
        .param(
            ParamSpec::new("key", ParamType::String)
                .describe("The key to operate on")
                .required(),
        )
        .param(
            ParamSpec::new("value", ParamType::String)
                .describe("The value to store (only for 'set')")
                .with_default(""),
        )
        .param(
            ParamSpec::new("operation", ParamType::String)
                .describe("'set', 'get' or 'delete'")
                .with_default("set")
                .one_of(["set", "get", "delete"]),
        )
        .example(json!({"key": "favorite_color", "value": "blue", "operation": "set"}))
        .example(json!({"key": "favorite_color", "operation": "get"}))
    }
}

#[async_trait]
impl Tool for MemoryStoreTool {
    async fn call(&self, params: ToolParams) -> Result<Value, ToolError> {
        let key = crate::str_param(&params, "key")?;
        let value = params.get("value").and_then(Value::as_str).unwrap_or("");
        let operation = params.get("operation").and_then(Value::as_str).unwrap_or("set");

        match operation {
            "set" => {
                self.store.set(key, value).await;
                tracing::debug!(key, "Stored value");
                Ok(json!({"operation": "set", "key": key, "value": value}))
            }
            "get" => Ok(match self.store.get(key).await {
                Some(value) => json!({"operation": "get", "key": key, "found": true, "value": value}),
                None => json!({"operation": "get", "key": key, "found": false}),
            }),
            "delete" => match self.store.delete(key).await {
                Some(_) => Ok(json!({"operation": "delete", "key": key, "deleted": true})),
                None => Err(ToolError::failed(Self::NAME, format!("key '{key}' does not exist"))),
            },
            other => Err(ToolError::InvalidArguments(format!(
                "unsupported operation: {other}"
            ))),
        }
    }
}
