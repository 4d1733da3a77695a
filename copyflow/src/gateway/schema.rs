//! Structured-output schemas.

use serde_json::{json, Map, Value};

/// Type of one schema field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    /// A JSON string.
    String,
    /// A JSON number.
    Number,
    /// A JSON array of strings.
    StringArray,
}

/// One field of an [`OutputSchema`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchemaField {
    /// Property name in the response object.
    pub name: &'static str,
    /// Expected type.
    pub kind: FieldKind,
    /// Description sent to the model.
    pub description: &'static str,
    /// Whether the property must be present.
    pub required: bool,
}

impl SchemaField {
    /// A required string field.
    #[must_use]
    pub const fn string(name: &'static str, description: &'static str) -> Self {
        Self {
            name,
            kind: FieldKind::String,
            description,
            required: true,
        }
    }

    /// Marks the field as optional.
    #[must_use]
    pub const fn optional(mut self) -> Self {
        self.required = false;
        self
    }

    /// Changes the field's type.
    #[must_use]
    pub const fn of_kind(mut self, kind: FieldKind) -> Self {
        self.kind = kind;
        self
    }
}

/// An ordered list of fields describing a JSON object.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OutputSchema {
    fields: &'static [SchemaField],
}

impl OutputSchema {
    /// Creates a schema from its fields.
    #[must_use]
    pub const fn new(fields: &'static [SchemaField]) -> Self {
        Self { fields }
    }

    /// Returns the fields in declaration order.
    #[must_use]
    pub const fn fields(&self) -> &'static [SchemaField] {
        self.fields
    }

    /// Renders the schema in the provider's `responseSchema` dialect.
    #[must_use]
    pub fn to_json_schema(&self) -> Value {
        let mut properties = Map::new();
        for field in self.fields {
            let mut property = match field.kind {
                FieldKind::String => json!({"type": "STRING"}),
                FieldKind::Number => json!({"type": "NUMBER"}),
                FieldKind::StringArray => json!({"type": "ARRAY", "items": {"type": "STRING"}}),
            };
            if let Some(obj) = property.as_object_mut() {
                obj.insert("description".to_string(), json!(field.description));
            }
            properties.insert(field.name.to_string(), property);
        }

        let required: Vec<_> = self
            .fields
            .iter()
            .filter(|f| f.required)
            .map(|f| f.name)
            .collect();
        let ordering: Vec<_> = self.fields.iter().map(|f| f.name).collect();

        json!({
            "type": "OBJECT",
            "properties": properties,
            "required": required,
            "propertyOrdering": ordering,
        })
    }

    /// Checks a parsed response against the schema.
    ///
    /// Extra properties are allowed. A `null` counts as absent.
    pub fn validate(&self, value: Value) -> Result<Map<String, Value>, String> {
        let Value::Object(object) = value else {
            return Err(format!("expected a JSON object, got {}", type_name(&value)));
        };

        for field in self.fields {
            match object.get(field.name) {
                None | Some(Value::Null) => {
                    if field.required {
                        return Err(format!("missing required field '{}'", field.name));
                    }
                }
                Some(found) => {
                    let ok = match field.kind {
                        FieldKind::String => found.is_string(),
                        FieldKind::Number => found.is_number(),
                        FieldKind::StringArray => found
                            .as_array()
                            .is_some_and(|items| items.iter().all(Value::is_string)),
                    };
                    if !ok {
                        return Err(format!(
                            "field '{}' should be {:?}, got {}",
                            field.name,
                            field.kind,
                            type_name(found)
                        ));
                    }
                }
            }
        }
        Ok(object)
    }

    /// Parses raw response text and validates it.
    pub fn parse(&self, raw: &str) -> Result<Map<String, Value>, String> {
        let body = strip_code_fences(raw);
        let value: Value =
            serde_json::from_str(body).map_err(|e| format!("response is not valid JSON: {e}"))?;
        self.validate(value)
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Removes a surrounding Markdown code fence, if any.
#[must_use]
pub fn strip_code_fences(raw: &str) -> &str {
    let trimmed = raw.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    // The opening line is dropped only when it is a language tag.
    let body = match rest.split_once('\n') {
        Some((first, remainder)) if !first.contains(['{', '[']) => remainder,
        _ => rest,
    };
    body.trim_end().strip_suffix("```").unwrap_or(body).trim()
}
