//! Shape derivation and argument validation.
//!
//! A [`Shape`] describes the expected structure of a tool's arguments: field
//! names, type tags, human-readable descriptions and required flags. Shapes
//! are built once at registration time through [`ShapeBuilder`] and never
//! mutated afterward. Validation runs before a tool handler is invoked, so
//! malformed arguments never reach handler code.

use crate::error::{SchemaError, ToolError};
use serde_json::{Map, Value, json};

/// Type tag for a shape field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldType {
    String,
    Integer,
    Number,
    Boolean,
    Object,
    Array,
}

impl FieldType {
    /// JSON Schema type name.
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Integer => "integer",
            Self::Number => "number",
            Self::Boolean => "boolean",
            Self::Object => "object",
            Self::Array => "array",
        }
    }

    fn matches(&self, value: &Value) -> bool {
        match self {
            Self::String => value.is_string(),
            Self::Integer => value.is_i64() || value.is_u64(),
            Self::Number => value.is_number(),
            Self::Boolean => value.is_boolean(),
            Self::Object => value.is_object(),
            Self::Array => value.is_array(),
        }
    }
}

/// Policy for fields present in the arguments but absent from the shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UnknownFields {
    /// Reject arguments carrying fields the shape does not declare.
    #[default]
    Deny,
    /// Ignore undeclared fields.
    Allow,
}

/// A single declared field of a shape.
#[derive(Debug, Clone)]
pub struct FieldSpec {
    pub name: String,
    pub field_type: FieldType,
    pub description: String,
    pub required: bool,
}

/// Field-level description of expected argument structure.
#[derive(Debug, Clone)]
pub struct Shape {
    fields: Vec<FieldSpec>,
    unknown_fields: UnknownFields,
}

impl Shape {
    /// Shape with no declared fields (tools taking no arguments).
    pub fn empty() -> Self {
        Self {
            fields: Vec::new(),
            unknown_fields: UnknownFields::default(),
        }
    }

    pub fn builder() -> ShapeBuilder {
        ShapeBuilder::new()
    }

    pub fn fields(&self) -> &[FieldSpec] {
        &self.fields
    }

    fn field(&self, name: &str) -> Option<&FieldSpec> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Render the JSON Schema document advertised in `tools/list`.
    pub fn to_schema(&self) -> Value {
        let mut properties = Map::new();
        let mut required = Vec::new();

        for field in &self.fields {
            properties.insert(
                field.name.clone(),
                json!({
                    "type": field.field_type.type_name(),
                    "description": field.description,
                }),
            );
            if field.required {
                required.push(Value::String(field.name.clone()));
            }
        }

        let mut schema = Map::new();
        schema.insert("type".into(), Value::String("object".into()));
        schema.insert("properties".into(), Value::Object(properties));
        if !required.is_empty() {
            schema.insert("required".into(), Value::Array(required));
        }
        if self.unknown_fields == UnknownFields::Deny {
            schema.insert("additionalProperties".into(), Value::Bool(false));
        }
        Value::Object(schema)
    }

    /// Validate raw arguments against this shape.
    ///
    /// Checks, in order: the arguments form a JSON object (null counts as an
    /// empty object when nothing is required), all required fields are
    /// present, every present field carries the declared type, and unknown
    /// fields honor the configured policy.
    pub fn validate(&self, arguments: &Value) -> Result<(), ToolError> {
        let object = match arguments {
            Value::Object(map) => map,
            Value::Null => {
                if let Some(missing) = self.fields.iter().find(|f| f.required) {
                    return Err(ToolError::InvalidArguments(format!(
                        "missing required field: {}",
                        missing.name
                    )));
                }
                return Ok(());
            }
            other => {
                return Err(ToolError::InvalidArguments(format!(
                    "arguments must be an object, got {}",
                    json_type_name(other)
                )));
            }
        };

        for field in &self.fields {
            match object.get(&field.name) {
                Some(value) => {
                    if !field.field_type.matches(value) {
                        return Err(ToolError::InvalidArguments(format!(
                            "field '{}' expects {}, got {}",
                            field.name,
                            field.field_type.type_name(),
                            json_type_name(value)
                        )));
                    }
                }
                None if field.required => {
                    return Err(ToolError::InvalidArguments(format!(
                        "missing required field: {}",
                        field.name
                    )));
                }
                None => {}
            }
        }

        if self.unknown_fields == UnknownFields::Deny {
            for key in object.keys() {
                if self.field(key).is_none() {
                    return Err(ToolError::InvalidArguments(format!(
                        "unknown field: {key}"
                    )));
                }
            }
        }

        Ok(())
    }

    /// Best-effort check of structured output against a declared output shape.
    ///
    /// Returns field-level mismatch descriptions instead of failing; the
    /// caller logs them and passes the result through unchanged.
    pub fn check_output(&self, output: &Value) -> Vec<String> {
        let mut mismatches = Vec::new();

        let Some(object) = output.as_object() else {
            mismatches.push(format!(
                "structured output must be an object, got {}",
                json_type_name(output)
            ));
            return mismatches;
        };

        for field in &self.fields {
            match object.get(&field.name) {
                Some(value) if !field.field_type.matches(value) => {
                    mismatches.push(format!(
                        "output field '{}' expects {}, got {}",
                        field.name,
                        field.field_type.type_name(),
                        json_type_name(value)
                    ));
                }
                None if field.required => {
                    mismatches.push(format!("output missing field: {}", field.name));
                }
                _ => {}
            }
        }

        mismatches
    }
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Builder for [`Shape`]. Pure derivation: fails on field name collisions,
/// leaves no side effects.
#[derive(Debug, Default)]
pub struct ShapeBuilder {
    fields: Vec<FieldSpec>,
    unknown_fields: UnknownFields,
    duplicate: Option<String>,
}

impl ShapeBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare a required field.
    pub fn field(
        self,
        name: impl Into<String>,
        field_type: FieldType,
        description: impl Into<String>,
    ) -> Self {
        self.push(name.into(), field_type, description.into(), true)
    }

    /// Declare an optional field.
    pub fn optional_field(
        self,
        name: impl Into<String>,
        field_type: FieldType,
        description: impl Into<String>,
    ) -> Self {
        self.push(name.into(), field_type, description.into(), false)
    }

    pub fn unknown_fields(mut self, policy: UnknownFields) -> Self {
        self.unknown_fields = policy;
        self
    }

    fn push(mut self, name: String, field_type: FieldType, description: String, required: bool) -> Self {
        if self.duplicate.is_none() && self.fields.iter().any(|f| f.name == name) {
            self.duplicate = Some(name.clone());
        }
        self.fields.push(FieldSpec {
            name,
            field_type,
            description,
            required,
        });
        self
    }

    pub fn build(self) -> Result<Shape, SchemaError> {
        if let Some(name) = self.duplicate {
            return Err(SchemaError::DuplicateField(name));
        }
        Ok(Shape {
            fields: self.fields,
            unknown_fields: self.unknown_fields,
        })
    }
}
