//! Expected output shape and the checks applied to parsed model output.

use serde_json::{json, Map, Value};

use crate::error::{AnalysisError, Result};

/// Required top-level fields of the model output, each with a type descriptor.
///
/// Field order is preserved so diagnostics list keys the way the schema declares them.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExpectedSchema {
    fields: Map<String, Value>,
}

impl ExpectedSchema {
    pub fn new(fields: Map<String, Value>) -> Self {
        Self { fields }
    }

    /// Schema with the given required keys and no type information.
    pub fn from_keys<I, S>(keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            fields: keys.into_iter().map(|k| (k.into(), json!({}))).collect(),
        }
    }

    /// Build from a JSON object.
    ///
    /// A full object JSON Schema (`"type": "object"` with a `properties` map)
    /// contributes its property names; any other object is taken as the field map itself.
    pub fn from_value(value: Value) -> Result<Self> {
        let Value::Object(mut map) = value else {
            return Err(AnalysisError::Schema(
                "expected schema must be a JSON object".to_string(),
            ));
        };

        let is_json_schema = map.get("type").and_then(Value::as_str) == Some("object")
            && map.get("properties").is_some_and(Value::is_object);
        if is_json_schema {
            if let Some(Value::Object(properties)) = map.remove("properties") {
                return Ok(Self::new(properties));
            }
        }
        Ok(Self::new(map))
    }

    pub fn fields(&self) -> &Map<String, Value> {
        &self.fields
    }

    pub fn required_keys(&self) -> Vec<&str> {
        self.fields.keys().map(String::as_str).collect()
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Required keys absent from `value`, in schema order.
    ///
    /// A value that is not an object is missing every key.
    pub fn missing_keys(&self, value: &Value) -> Vec<String> {
        let object = value.as_object();
        self.fields
            .keys()
            .filter(|key| !object.is_some_and(|o| o.contains_key(key.as_str())))
            .cloned()
            .collect()
    }

    /// Render as an object JSON Schema with every field required.
    pub fn to_json_schema(&self) -> Value {
        let properties: Map<String, Value> = self
            .fields
            .iter()
            .map(|(key, descriptor)| (key.clone(), descriptor_schema(descriptor)))
            .collect();
        json!({
            "type": "object",
            "properties": properties,
            "required": self.fields.keys().collect::<Vec<_>>(),
        })
    }
}

fn descriptor_schema(descriptor: &Value) -> Value {
    const TYPE_NAMES: [&str; 7] = [
        "string", "number", "integer", "boolean", "object", "array", "null",
    ];
    match descriptor {
        Value::Object(_) => descriptor.clone(),
        Value::String(name) if TYPE_NAMES.contains(&name.as_str()) => json!({ "type": name }),
        _ => json!({}),
    }
}

/// How thoroughly parsed output is checked against the [`ExpectedSchema`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ValidationMode {
    /// Only top-level key presence. Nested shapes, ranges and enums are not enforced.
    #[default]
    Shallow,
    /// Key presence plus full JSON Schema validation of every declared field.
    Strict,
}

/// Result of checking one parsed response.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SchemaReport {
    pub missing_keys: Vec<String>,
    pub violations: Vec<String>,
}

impl SchemaReport {
    pub fn is_valid(&self) -> bool {
        self.missing_keys.is_empty() && self.violations.is_empty()
    }
}

/// A schema prepared for repeated checks across the attempts of one run.
pub struct SchemaCheck<'a> {
    schema: &'a ExpectedSchema,
    strict: Option<jsonschema::Validator>,
}

impl<'a> SchemaCheck<'a> {
    pub fn compile(schema: &'a ExpectedSchema, mode: ValidationMode) -> Result<Self> {
        let strict = match mode {
            ValidationMode::Shallow => None,
            ValidationMode::Strict => Some(
                jsonschema::validator_for(&schema.to_json_schema())
                    .map_err(|e| AnalysisError::Schema(e.to_string()))?,
            ),
        };
        Ok(Self { schema, strict })
    }

    pub fn check(&self, value: &Value) -> SchemaReport {
        let missing_keys = self.schema.missing_keys(value);
        let violations = match &self.strict {
            // Missing keys are already reported; only list the remaining violations.
            Some(validator) if missing_keys.is_empty() => validator
                .iter_errors(value)
                .map(|err| format!("{}: {}", err.instance_path(), err))
                .collect(),
            _ => Vec::new(),
        };
        SchemaReport {
            missing_keys,
            violations,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_keys_follow_schema_order() {
        let schema = ExpectedSchema::from_keys(["c", "a", "b"]);
        let missing = schema.missing_keys(&json!({"a": 1}));
        assert_eq!(missing, vec!["c", "b"]);
    }

    #[test]
    fn non_object_is_missing_everything() {
        let schema = ExpectedSchema::from_keys(["a", "b"]);
        assert_eq!(schema.missing_keys(&json!([1, 2])), vec!["a", "b"]);
        assert_eq!(schema.missing_keys(&json!("a")), vec!["a", "b"]);
    }

    #[test]
    fn null_values_count_as_present() {
        let schema = ExpectedSchema::from_keys(["a"]);
        assert!(schema.missing_keys(&json!({"a": null})).is_empty());
    }

    #[test]
    fn json_schema_documents_use_property_names() {
        let schema = ExpectedSchema::from_value(json!({
            "type": "object",
            "properties": {
                "assets_score": {"type": "integer", "minimum": 1, "maximum": 5},
                "assets_analysis": {"type": "string"}
            },
            "required": ["assets_score"]
        }))
        .unwrap();
        assert_eq!(schema.required_keys(), vec!["assets_score", "assets_analysis"]);
    }

    #[test]
    fn plain_maps_are_used_as_is() {
        let schema = ExpectedSchema::from_value(json!({"type": "string", "summary": "string"}))
            .unwrap();
        assert_eq!(schema.required_keys(), vec!["type", "summary"]);
        assert!(ExpectedSchema::from_value(json!(["a"])).is_err());
    }

    #[test]
    fn shallow_check_ignores_constraints() {
        let schema = ExpectedSchema::from_value(json!({
            "score": {"type": "integer", "maximum": 5}
        }))
        .unwrap();
        let check = SchemaCheck::compile(&schema, ValidationMode::Shallow).unwrap();
        assert!(check.check(&json!({"score": 99})).is_valid());
    }

    #[test]
    fn strict_check_reports_constraint_violations() {
        let schema = ExpectedSchema::from_value(json!({
            "score": {"type": "integer", "maximum": 5},
            "label": "string"
        }))
        .unwrap();
        let check = SchemaCheck::compile(&schema, ValidationMode::Strict).unwrap();

        let report = check.check(&json!({"score": 99, "label": "ok"}));
        assert!(report.missing_keys.is_empty());
        assert_eq!(report.violations.len(), 1);
        assert!(report.violations[0].contains("/score"));

        let report = check.check(&json!({"score": 3}));
        assert_eq!(report.missing_keys, vec!["label"]);
        assert!(report.violations.is_empty());

        assert!(check.check(&json!({"score": 3, "label": "ok"})).is_valid());
    }
}
