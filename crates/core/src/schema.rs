//! Capability schemas: the machine-checkable contract of a tool.
//!
//! A [`ToolSpec`] names a capability, documents it for the model, and
//! declares an ordered list of parameters. The registry validates every
//! invocation against the spec before the implementation is called:
//!
//! - required parameters must be present (and not `null`)
//! - values must be coercible to the declared type (`"5"` is a valid integer)
//! - enum-restricted parameters must hold one of the allowed values
//! - parameters the spec does not declare are rejected
//!
//! Missing optional parameters are filled in from their defaults, so the
//! implementation receives a complete, normalized parameter object.

use crate::error::RegistryError;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Parameter object handed to a tool implementation.
pub type ToolParams = serde_json::Map<String, Value>;

/// The declared type of a parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParamType {
    String,
    Integer,
    Number,
    Boolean,
    Object,
    Array,
}

impl ParamType {
    /// JSON-Schema type name.
    pub fn as_str(&self) -> &'static str {
        match self {
            ParamType::String => "string",
            ParamType::Integer => "integer",
            ParamType::Number => "number",
            ParamType::Boolean => "boolean",
            ParamType::Object => "object",
            ParamType::Array => "array",
        }
    }

    /// Coerce a JSON value into this type, if it is coercible.
    pub fn coerce(&self, value: &Value) -> Option<Value> {
        match (self, value) {
            (ParamType::String, Value::String(_)) => Some(value.clone()),
            (ParamType::String, Value::Number(n)) => Some(Value::String(n.to_string())),
            (ParamType::String, Value::Bool(b)) => Some(Value::String(b.to_string())),

            (ParamType::Integer, Value::Number(n)) => {
                if let Some(i) = n.as_i64() {
                    Some(Value::from(i))
                } else {
                    let f = n.as_f64()?;
                    integral(f).map(Value::from)
                }
            }
            (ParamType::Integer, Value::String(s)) => {
                let s = s.trim();
                match s.parse::<i64>() {
                    Ok(i) => Some(Value::from(i)),
                    Err(_) => s.parse::<f64>().ok().and_then(integral).map(Value::from),
                }
            }

            (ParamType::Number, Value::Number(_)) => Some(value.clone()),
            (ParamType::Number, Value::String(s)) => {
                let f = s.trim().parse::<f64>().ok().filter(|f| f.is_finite())?;
                serde_json::Number::from_f64(f).map(Value::Number)
            }

            (ParamType::Boolean, Value::Bool(_)) => Some(value.clone()),
            (ParamType::Boolean, Value::String(s)) => match s.trim().to_ascii_lowercase().as_str()
            {
                "true" => Some(Value::Bool(true)),
                "false" => Some(Value::Bool(false)),
                _ => None,
            },

            (ParamType::Object, Value::Object(_)) => Some(value.clone()),
            (ParamType::Array, Value::Array(_)) => Some(value.clone()),
            _ => None,
        }
    }
}

impl std::fmt::Display for ParamType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

fn integral(f: f64) -> Option<i64> {
    (f.is_finite() && f.fract() == 0.0 && f.abs() < 9.0e15).then_some(f as i64)
}

/// A single declared parameter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParamSpec {
    pub name: String,

    #[serde(rename = "type")]
    pub param_type: ParamType,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,

    #[serde(default)]
    pub required: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,

    /// Allowed values; empty means unrestricted.
    #[serde(default, rename = "enum", skip_serializing_if = "Vec::is_empty")]
    pub allowed: Vec<Value>,
}

impl ParamSpec {
    /// An optional parameter of the given type.
    pub fn new(name: impl Into<String>, param_type: ParamType) -> Self {
        Self {
            name: name.into(),
            param_type,
            description: String::new(),
            required: false,
            default: None,
            allowed: Vec::new(),
        }
    }

    pub fn describe(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn with_default(mut self, default: impl Into<Value>) -> Self {
        self.default = Some(default.into());
        self
    }

    /// Restrict the parameter to a fixed set of values.
    pub fn one_of<I, V>(mut self, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        self.allowed = values.into_iter().map(Into::into).collect();
        self
    }

    /// Coerce and check a supplied value against this parameter.
    fn check(&self, value: &Value) -> Result<Value, String> {
        let coerced = self.param_type.coerce(value).ok_or_else(|| {
            format!(
                "parameter '{}' expects {}, got {}",
                self.name,
                self.param_type,
                json_kind(value)
            )
        })?;

        if !self.allowed.is_empty() && !self.allowed.contains(&coerced) {
            let allowed: Vec<String> = self.allowed.iter().map(Value::to_string).collect();
            return Err(format!(
                "parameter '{}' must be one of [{}], got {}",
                self.name,
                allowed.join(", "),
                coerced
            ));
        }

        Ok(coerced)
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// The description of a registered capability.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolSpec {
    /// Unique capability name (e.g. "calculator").
    pub name: String,

    /// Model-facing documentation.
    pub description: String,

    /// Ordered parameter schema.
    #[serde(default)]
    pub params: Vec<ParamSpec>,

    /// Example parameter objects shown to the model.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub examples: Vec<Value>,
}

impl ToolSpec {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            params: Vec::new(),
            examples: Vec::new(),
        }
    }

    /// Append a parameter (order is preserved).
    pub fn param(mut self, param: ParamSpec) -> Self {
        self.params.push(param);
        self
    }

    /// Append a usage example.
    pub fn example(mut self, example: Value) -> Self {
        self.examples.push(example);
        self
    }

    /// Look up a parameter by name.
    pub fn get_param(&self, name: &str) -> Option<&ParamSpec> {
        self.params.iter().find(|p| p.name == name)
    }

    /// Check the spec itself for internal consistency.
    pub fn check_consistency(&self) -> Result<(), RegistryError> {
        let invalid = |reason: String| RegistryError::InvalidSpec {
            name: self.name.clone(),
            reason,
        };

        if self.name.trim().is_empty() || self.name.chars().any(char::is_whitespace) {
            return Err(invalid("name must be non-empty and contain no whitespace".into()));
        }

        for (i, param) in self.params.iter().enumerate() {
            if self.params[..i].iter().any(|p| p.name == param.name) {
                return Err(invalid(format!("duplicate parameter '{}'", param.name)));
            }
            if let Some(default) = &param.default {
                param.check(default).map_err(|e| invalid(format!("bad default: {e}")))?;
            }
        }

        Ok(())
    }

    /// Validate a parameter object, returning the normalized object.
    ///
    /// All problems are reported at once, joined with `"; "`.
    pub fn validate(&self, params: &ToolParams) -> Result<ToolParams, String> {
        let mut normalized = ToolParams::new();
        let mut problems = Vec::new();

        for param in &self.params {
            match params.get(&param.name).filter(|v| !v.is_null()) {
                Some(value) => match param.check(value) {
                    Ok(coerced) => {
                        normalized.insert(param.name.clone(), coerced);
                    }
                    Err(e) => problems.push(e),
                },
                None if param.required => {
                    problems.push(format!("missing required parameter '{}'", param.name));
                }
                None => {
                    if let Some(default) = &param.default {
                        normalized.insert(param.name.clone(), default.clone());
                    }
                }
            }
        }

        for key in params.keys() {
            if self.get_param(key).is_none() {
                problems.push(format!("unknown parameter '{key}'"));
            }
        }

        if problems.is_empty() {
            Ok(normalized)
        } else {
            Err(problems.join("; "))
        }
    }

    /// Render the parameter schema as a JSON-Schema object.
    pub fn json_schema(&self) -> Value {
        let mut properties = serde_json::Map::new();
        for param in &self.params {
            let mut prop = serde_json::Map::new();
            prop.insert("type".into(), Value::from(param.param_type.as_str()));
            if !param.description.is_empty() {
                prop.insert("description".into(), Value::from(param.description.clone()));
            }
            if let Some(default) = &param.default {
                prop.insert("default".into(), default.clone());
            }
            if !param.allowed.is_empty() {
                prop.insert("enum".into(), Value::Array(param.allowed.clone()));
            }
            properties.insert(param.name.clone(), Value::Object(prop));
        }

        let required: Vec<Value> = self
            .params
            .iter()
            .filter(|p| p.required)
            .map(|p| Value::from(p.name.clone()))
            .collect();

        serde_json::json!({
            "type": "object",
            "properties": properties,
            "required": required,
        })
    }
}
