use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Placeholder name to substitution value.
pub type ContextValues = BTreeMap<String, String>;

/// The creative brief attached to every uploaded file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreativeContext {
    pub brand: String,
    pub target_audience: String,
    pub category: String,
    pub primary_message: String,
    pub secondary_message1: String,
    pub secondary_message2: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
}

impl CreativeContext {
    pub fn new(brand: impl Into<String>) -> Self {
        Self {
            brand: brand.into(),
            ..Default::default()
        }
    }

    pub fn with_target_audience(mut self, value: impl Into<String>) -> Self {
        self.target_audience = value.into();
        self
    }

    pub fn with_category(mut self, value: impl Into<String>) -> Self {
        self.category = value.into();
        self
    }

    pub fn with_primary_message(mut self, value: impl Into<String>) -> Self {
        self.primary_message = value.into();
        self
    }

    pub fn with_secondary_messages(
        mut self,
        first: impl Into<String>,
        second: impl Into<String>,
    ) -> Self {
        self.secondary_message1 = first.into();
        self.secondary_message2 = second.into();
        self
    }

    pub fn with_version(mut self, value: impl Into<String>) -> Self {
        self.version = Some(value.into());
        self
    }

    /// Flatten into template values keyed by the camelCase placeholder names.
    ///
    /// A missing version is passed as an empty string so `{version}` never survives rendering.
    pub fn to_values(&self) -> ContextValues {
        [
            ("brand", self.brand.as_str()),
            ("targetAudience", self.target_audience.as_str()),
            ("category", self.category.as_str()),
            ("primaryMessage", self.primary_message.as_str()),
            ("secondaryMessage1", self.secondary_message1.as_str()),
            ("secondaryMessage2", self.secondary_message2.as_str()),
            ("version", self.version.as_deref().unwrap_or("")),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_version_becomes_empty() {
        let values = CreativeContext::new("Acme")
            .with_category("Snacks")
            .to_values();
        assert_eq!(values.get("brand").map(String::as_str), Some("Acme"));
        assert_eq!(values.get("category").map(String::as_str), Some("Snacks"));
        assert_eq!(values.get("version").map(String::as_str), Some(""));
        assert_eq!(values.len(), 7);
    }

    #[test]
    fn deserializes_camel_case_brief() {
        let ctx: CreativeContext = serde_json::from_str(
            r#"{"brand":"Acme","targetAudience":"Students","category":"Snacks",
                "primaryMessage":"Crunch","secondaryMessage1":"Cheap","secondaryMessage2":"Tasty"}"#,
        )
        .unwrap();
        assert_eq!(ctx.target_audience, "Students");
        assert!(ctx.version.is_none());
    }
}
