//! Weather tool: returns deterministic mock weather data.
//!
//! Plausible data without network access, so the loop can be exercised
//! end-to-end. The same city always yields the same report.

use async_trait::async_trait;
use serde::Serialize;
use serde_json::{Value, json};
use stepwise_core::error::ToolError;
use stepwise_core::schema::{ParamSpec, ParamType, ToolSpec};
use stepwise_core::tool::{Tool, ToolParams};

pub struct WeatherTool;

impl WeatherTool {
    pub const NAME: &'static str = "get_weather";

    pub fn spec() -> ToolSpec {
        ToolSpec::new(
            Self::NAME,
            "Get the current weather for a city: temperature, conditions, humidity and wind.",
        )
        .param(
            ParamSpec::new("city", ParamType::String)
                .describe("The city name, e.g. 'Beijing'")
                .required(),
        )
        .param(
            ParamSpec::new("units", ParamType::String)
                .describe("Temperature units")
                .with_default("metric")
                .one_of(["metric", "imperial"]),
        )
        .example(json!({"city": "Beijing"}))
    }
}

#[async_trait]
impl Tool for WeatherTool {
    async fn call(&self, params: ToolParams) -> Result<Value, ToolError> {
        let city = crate::str_param(&params, "city")?.trim();
        if city.is_empty() {
            return Err(ToolError::InvalidArguments("city must not be empty".into()));
        }
        let units = params.get("units").and_then(Value::as_str).unwrap_or("metric");
        let report = mock_weather(city, units);
        serde_json::to_value(report).map_err(|e| ToolError::failed(Self::NAME, e.to_string()))
    }
}

#[derive(Debug, Serialize)]
struct WeatherReport {
    city: String,
    temperature: f64,
    units: &'static str,
    conditions: &'static str,
    humidity: u32,
    wind: String,
}

const CONDITIONS: [&str; 8] = [
    "Clear skies",
    "Partly cloudy",
    "Overcast",
    "Light rain",
    "Showers",
    "Thunderstorms",
    "Snow",
    "Foggy",
];

const WIND_DIRECTIONS: [&str; 8] = ["N", "NE", "E", "SE", "S", "SW", "W", "NW"];

fn mock_weather(city: &str, units: &str) -> WeatherReport {
    let hash = city
        .to_lowercase()
        .bytes()
        .fold(0u32, |acc, b| acc.wrapping_mul(31).wrapping_add(b as u32));

    let celsius = (hash % 40) as f64 - 5.0;
    let (temperature, units) = match units {
        "imperial" => (celsius * 9.0 / 5.0 + 32.0, "°F"),
        _ => (celsius, "°C"),
    };

    WeatherReport {
        city: city.to_string(),
        temperature: (temperature * 10.0).round() / 10.0,
        units,
        conditions: CONDITIONS[(hash as usize / 7) % CONDITIONS.len()],
        humidity: 30 + hash % 60,
        wind: format!(
            "{} {} km/h",
            WIND_DIRECTIONS[(hash as usize / 3) % WIND_DIRECTIONS.len()],
            5 + hash % 30
        ),
    }
}
