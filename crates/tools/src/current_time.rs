//! Current time tool.

use async_trait::async_trait;
use chrono::{DateTime, Local, TimeZone, Utc};
use serde_json::{Value, json};
use stepwise_core::error::ToolError;
use stepwise_core::schema::{ParamSpec, ParamType, ToolSpec};
use stepwise_core::tool::{Tool, ToolParams};

pub struct CurrentTimeTool;

impl CurrentTimeTool {
    pub const NAME: &'static str = "current_time";

    pub fn spec() -> ToolSpec {
        ToolSpec::new(Self::NAME, "Get the current date and time.")
            .param(
                ParamSpec::new("timezone", ParamType::String)
                    .describe("'local' or 'utc'")
                    .with_default("local")
                    .one_of(["local", "utc"]),
            )
            .example(json!({"timezone": "utc"}))
    }
}

#[async_trait]
impl Tool for CurrentTimeTool {
    async fn call(&self, params: ToolParams) -> Result<Value, ToolError> {
        let timezone = params
            .get("timezone")
            .and_then(Value::as_str)
            .unwrap_or("local");

        match timezone {
            "utc" => Ok(describe(timezone, Utc::now())),
            "local" => Ok(describe(timezone, Local::now())),
            other => Err(ToolError::InvalidArguments(format!(
                "unsupported timezone: {other}"
            ))),
        }
    }
}

fn describe<Tz>(timezone: &str, now: DateTime<Tz>) -> Value
where
    Tz: TimeZone,
    Tz::Offset: std::fmt::Display,
{
    json!({
        "timezone": timezone,
        "current_time": now.format("%Y-%m-%d %H:%M:%S").to_string(),
        "date": now.format("%Y-%m-%d").to_string(),
        "time": now.format("%H:%M:%S").to_string(),
        "weekday": now.format("%A").to_string(),
        "timestamp": now.timestamp(),
    })
}
