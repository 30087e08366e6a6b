//! Output schemas and the tool definitions offered to the model.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use crate::ToolDefinition;

/// Tool offered on every step.
pub const STEP_TOOL_NAME: &str = "next_step";

/// Tool offered to the fallback extractor.
pub const EXTRACT_TOOL_NAME: &str = "submit_result";

/// Step tool fields that carry control information rather than output.
pub const HELPER_FIELDS: [&str; 3] = ["reasoning", "code", "final"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    String,
    Number,
    Integer,
    Boolean,
    Array,
    Object,
}

impl FieldType {
    pub fn json_name(&self) -> &'static str {
        match self {
            FieldType::String => "string",
            FieldType::Number => "number",
            FieldType::Integer => "integer",
            FieldType::Boolean => "boolean",
            FieldType::Array => "array",
            FieldType::Object => "object",
        }
    }

    pub fn matches(&self, value: &Value) -> bool {
        match self {
            FieldType::String => value.is_string(),
            FieldType::Number => value.is_number(),
            FieldType::Integer => value.is_i64() || value.is_u64(),
            FieldType::Boolean => value.is_boolean(),
            FieldType::Array => value.is_array(),
            FieldType::Object => value.is_object(),
        }
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.json_name())
    }
}

impl FromStr for FieldType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "string" | "str" => Ok(FieldType::String),
            "number" | "float" => Ok(FieldType::Number),
            "integer" | "int" => Ok(FieldType::Integer),
            "boolean" | "bool" => Ok(FieldType::Boolean),
            "array" | "list" => Ok(FieldType::Array),
            "object" | "dict" => Ok(FieldType::Object),
            other => Err(format!("unknown field type '{other}'")),
        }
    }
}

/// One domain output field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldSpec {
    pub name: String,
    pub field_type: FieldType,
    pub description: String,
    pub required: bool,
}

/// Ordered list of the fields an invocation must produce.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OutputSchema {
    fields: Vec<FieldSpec>,
}

impl OutputSchema {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a required field.
    pub fn field(
        mut self,
        name: impl Into<String>,
        field_type: FieldType,
        description: impl Into<String>,
    ) -> Self {
        self.fields.push(FieldSpec {
            name: name.into(),
            field_type,
            description: description.into(),
            required: true,
        });
        self
    }

    /// Add a field the model may omit.
    pub fn optional_field(
        mut self,
        name: impl Into<String>,
        field_type: FieldType,
        description: impl Into<String>,
    ) -> Self {
        self.fields.push(FieldSpec {
            name: name.into(),
            field_type,
            description: description.into(),
            required: false,
        });
        self
    }

    pub fn fields(&self) -> &[FieldSpec] {
        &self.fields
    }

    /// Reject empty schemas, duplicate names and names that collide with
    /// the step tool's helper fields.
    pub fn validate(&self) -> Result<(), String> {
        if self.fields.is_empty() {
            return Err("output schema has no fields".into());
        }
        let mut seen: Vec<&str> = Vec::with_capacity(self.fields.len());
        for field in &self.fields {
            if field.name.trim().is_empty() {
                return Err("output field name is empty".into());
            }
            if HELPER_FIELDS.contains(&field.name.as_str()) {
                return Err(format!("output field name '{}' is reserved", field.name));
            }
            if seen.contains(&field.name.as_str()) {
                return Err(format!("output field '{}' is declared twice", field.name));
            }
            seen.push(&field.name);
        }
        Ok(())
    }

    /// JSON schema properties for the domain fields.
    fn properties(&self) -> Map<String, Value> {
        self.fields
            .iter()
            .map(|f| {
                (
                    f.name.clone(),
                    json!({
                        "type": f.field_type.json_name(),
                        "description": f.description,
                    }),
                )
            })
            .collect()
    }

    fn required_names(&self) -> Vec<&str> {
        self.fields
            .iter()
            .filter(|f| f.required)
            .map(|f| f.name.as_str())
            .collect()
    }

    /// Render as a JSON object schema.
    pub fn to_json_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": self.properties(),
            "required": self.required_names(),
        })
    }

    /// Problems with `values` as a final answer: missing required fields
    /// and fields of the wrong type. Empty when the answer is acceptable.
    pub fn check(&self, values: &Map<String, Value>) -> Vec<String> {
        let mut problems = Vec::new();
        for field in &self.fields {
            match values.get(&field.name) {
                None | Some(Value::Null) if field.required => {
                    problems.push(format!("'{}' is missing", field.name));
                }
                None | Some(Value::Null) => {}
                Some(value) if !field.field_type.matches(value) => {
                    problems.push(format!(
                        "'{}' must be a {}",
                        field.name, field.field_type
                    ));
                }
                Some(_) => {}
            }
        }
        problems
    }

    /// Keep only the declared domain fields.
    pub fn extract(&self, values: &Map<String, Value>) -> Map<String, Value> {
        self.fields
            .iter()
            .filter_map(|f| values.get(&f.name).map(|v| (f.name.clone(), v.clone())))
            .filter(|(_, v)| !v.is_null())
            .collect()
    }

    /// One line per field, for prompts.
    pub fn describe(&self) -> String {
        self.fields
            .iter()
            .map(|f| {
                let optional = if f.required { "" } else { ", optional" };
                format!("- `{}` ({}{optional}): {}", f.name, f.field_type, f.description)
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Tool offered on every step: run code, or finish with the output fields.
pub fn step_tool(schema: &OutputSchema) -> ToolDefinition {
    let mut properties = Map::new();
    properties.insert(
        "reasoning".into(),
        json!({
            "type": "string",
            "description": "What you learned so far and what this step does."
        }),
    );
    properties.insert(
        "code".into(),
        json!({
            "type": "string",
            "description": "JavaScript to run in the session. Omit when final is true."
        }),
    );
    properties.insert(
        "final".into(),
        json!({
            "type": "boolean",
            "description": "Set to true only when the output fields below hold the answer."
        }),
    );
    properties.extend(schema.properties());

    ToolDefinition {
        name: STEP_TOOL_NAME.to_string(),
        description: "Run one step: either submit code to execute, or set final to true \
                      and fill in the output fields."
            .to_string(),
        parameters: json!({
            "type": "object",
            "properties": properties,
            "required": ["reasoning"],
        }),
    }
}

/// Tool offered to the fallback extractor: output fields only.
pub fn extract_tool(schema: &OutputSchema) -> ToolDefinition {
    ToolDefinition {
        name: EXTRACT_TOOL_NAME.to_string(),
        description: "Submit the final output fields.".to_string(),
        parameters: schema.to_json_schema(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn summary_schema() -> OutputSchema {
        OutputSchema::new()
            .field("summary", FieldType::String, "One paragraph summary")
            .optional_field("score", FieldType::Integer, "Confidence 0-10")
    }

    #[test]
    fn json_schema_lists_required_fields() {
        let schema = summary_schema().to_json_schema();
        assert_eq!(schema["type"], "object");
        assert_eq!(schema["properties"]["summary"]["type"], "string");
        assert_eq!(schema["properties"]["score"]["type"], "integer");
        assert_eq!(schema["required"], json!(["summary"]));
    }

    #[test]
    fn step_tool_has_helper_and_domain_fields() {
        let tool = step_tool(&summary_schema());
        assert_eq!(tool.name, STEP_TOOL_NAME);
        let props = &tool.parameters["properties"];
        for name in ["reasoning", "code", "final", "summary", "score"] {
            assert!(props.get(name).is_some(), "missing property {name}");
        }
        assert_eq!(props["final"]["type"], "boolean");
        assert_eq!(tool.parameters["required"], json!(["reasoning"]));
    }

    #[test]
    fn extract_tool_has_domain_fields_only() {
        let tool = extract_tool(&summary_schema());
        assert_eq!(tool.name, EXTRACT_TOOL_NAME);
        let props = tool.parameters["properties"].as_object().unwrap();
        assert_eq!(props.len(), 2);
        assert!(props.get("code").is_none());
    }

    #[test]
    fn validate_rejects_bad_schemas() {
        assert!(OutputSchema::new().validate().is_err());
        assert!(OutputSchema::new()
            .field("code", FieldType::String, "")
            .validate()
            .is_err());
        assert!(OutputSchema::new()
            .field("a", FieldType::String, "")
            .field("a", FieldType::Number, "")
            .validate()
            .is_err());
        assert!(summary_schema().validate().is_ok());
    }

    #[test]
    fn check_reports_missing_and_mistyped() {
        let schema = summary_schema();
        let values = json!({"score": "high"});
        let problems = schema.check(values.as_object().unwrap());
        assert_eq!(problems.len(), 2);
        assert!(problems[0].contains("'summary' is missing"));
        assert!(problems[1].contains("'score' must be a integer"));

        let values = json!({"summary": "ok"});
        assert!(schema.check(values.as_object().unwrap()).is_empty());
    }

    #[test]
    fn extract_strips_helper_fields() {
        let values = json!({
            "reasoning": "done",
            "final": true,
            "code": "",
            "summary": "ok",
            "score": null,
        });
        let fields = summary_schema().extract(values.as_object().unwrap());
        assert_eq!(fields.len(), 1);
        assert_eq!(fields["summary"], "ok");
    }

    #[test]
    fn field_type_parsing() {
        assert_eq!("int".parse::<FieldType>().unwrap(), FieldType::Integer);
        assert_eq!("String".parse::<FieldType>().unwrap(), FieldType::String);
        assert!("tuple".parse::<FieldType>().is_err());
    }
}
