//! Portable tool definitions
//!
//! Parameters are described with a JSON-schema subset (object properties,
//! primitive types, `required`, `enum`) so that builtin and externally
//! supplied tools are presented and validated the same way.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// JSON schema for tool input
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolInputSchema {
    /// Type (always "object")
    #[serde(rename = "type")]
    pub schema_type: String,

    /// Properties of the input object
    #[serde(skip_serializing_if = "Option::is_none")]
    pub properties: Option<Value>,

    /// Required properties
    #[serde(skip_serializing_if = "Option::is_none")]
    pub required: Option<Vec<String>>,
}

impl ToolInputSchema {
    /// Create an empty object schema
    pub fn new() -> Self {
        Self {
            schema_type: "object".to_string(),
            properties: None,
            required: None,
        }
    }

    /// Set the properties
    pub fn with_properties(mut self, properties: Value) -> Self {
        self.properties = Some(properties);
        self
    }

    /// Set the required properties
    pub fn with_required<S: Into<String>>(mut self, required: impl IntoIterator<Item = S>) -> Self {
        self.required = Some(required.into_iter().map(Into::into).collect());
        self
    }

    fn property(&self, name: &str) -> Option<&Map<String, Value>> {
        self.properties
            .as_ref()
            .and_then(|p| p.get(name))
            .and_then(|p| p.as_object())
    }

    /// Check `args` against this schema
    ///
    /// Returns a human-readable reason on the first violation. Unknown
    /// properties are tolerated.
    pub fn validate(&self, args: &Value) -> Result<(), String> {
        let Some(obj) = args.as_object() else {
            return Err("arguments must be a JSON object".to_string());
        };

        for name in self.required.iter().flatten() {
            if obj.get(name).map_or(true, Value::is_null) {
                return Err(format!("missing required field '{}'", name));
            }
        }

        for (name, value) in obj {
            let Some(prop) = self.property(name) else {
                continue;
            };
            if value.is_null() {
                continue;
            }

            if let Some(expected) = prop.get("type").and_then(Value::as_str) {
                if !type_matches(expected, value) {
                    return Err(format!("field '{}' must be of type {}", name, expected));
                }
            }

            if let Some(allowed) = prop.get("enum").and_then(Value::as_array) {
                if !allowed.contains(value) {
                    let options: Vec<String> = allowed.iter().map(Value::to_string).collect();
                    return Err(format!(
                        "field '{}' must be one of [{}]",
                        name,
                        options.join(", ")
                    ));
                }
            }
        }

        Ok(())
    }
}

impl Default for ToolInputSchema {
    fn default() -> Self {
        Self::new()
    }
}

fn type_matches(expected: &str, value: &Value) -> bool {
    match expected {
        "string" => value.is_string(),
        "integer" => value.is_i64() || value.is_u64(),
        "number" => value.is_number(),
        "boolean" => value.is_boolean(),
        "array" => value.is_array(),
        "object" => value.is_object(),
        _ => true,
    }
}

/// A callable tool as presented to the reasoning model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDefinition {
    /// Tool name, unique within a catalog
    pub name: String,

    /// Human description
    pub description: String,

    /// JSON schema for the tool input
    pub input_schema: ToolInputSchema,
}

impl ToolDefinition {
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        input_schema: ToolInputSchema,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            input_schema,
        }
    }

    /// Validate externally supplied arguments against the schema
    pub fn validate_args(&self, args: &Value) -> Result<(), String> {
        self.input_schema.validate(args)
    }
}
