use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::{
    context::ContextValues,
    error::{AnalysisError, Result, ResultExt},
    media::{profile_key, Focus, MediaKind},
    schema::{ExpectedSchema, ValidationMode},
};

/// Retry budget used when a request does not specify one.
pub const DEFAULT_MAX_RETRIES: usize = 2;

/// Engine settings owned by the caller.
#[derive(Clone, Debug)]
pub struct AnalyzerConfig {
    /// Retries after the first attempt (default: 2).
    ///
    /// Applied by [`crate::MediaAnalyzer`] when it builds requests. A bare
    /// [`crate::RetryValidator`] uses [`crate::AnalysisRequest::max_retries`] instead.
    pub max_retries: usize,
    /// How parsed output is checked (default: shallow key presence).
    pub validation_mode: ValidationMode,
    /// Cap on how much of a rejected response is echoed back in feedback (default: no cap).
    pub echo_limit: Option<usize>,
    /// Maximum files analysed at once in a batch (default: 4). Zero is treated as one.
    pub concurrency: usize,
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            validation_mode: ValidationMode::Shallow,
            echo_limit: None,
            concurrency: 4,
        }
    }
}

impl AnalyzerConfig {
    pub fn with_max_retries(mut self, retries: usize) -> Self {
        self.max_retries = retries;
        self
    }

    pub fn with_validation_mode(mut self, mode: ValidationMode) -> Self {
        self.validation_mode = mode;
        self
    }

    pub fn with_echo_limit(mut self, limit: usize) -> Self {
        self.echo_limit = Some(limit);
        self
    }

    pub fn with_concurrency(mut self, limit: usize) -> Self {
        self.concurrency = limit.max(1);
        self
    }
}

/// Input widget hint for a context field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    Text,
    Textarea,
}

/// Declaration of one context value that uploads carry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContextFieldDef {
    pub name: String,
    pub label: String,
    pub required: bool,
    #[serde(rename = "type")]
    pub field_type: FieldType,
}

impl ContextFieldDef {
    fn new(name: &str, label: &str, required: bool, field_type: FieldType) -> Self {
        Self {
            name: name.to_string(),
            label: label.to_string(),
            required,
            field_type,
        }
    }
}

/// Output schema plus the warehouse table successful results are destined for.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutputSchemaConfig {
    pub schema: Value,
    pub table_name: String,
}

/// Application configuration: prompts, output schemas and context field declarations.
///
/// Prompts and schemas are keyed by profile key, e.g. `image-branding`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisConfig {
    #[serde(default)]
    pub system_prompts: BTreeMap<String, String>,
    #[serde(default)]
    pub output_schemas: BTreeMap<String, OutputSchemaConfig>,
    #[serde(default = "default_context_fields")]
    pub context_fields: Vec<ContextFieldDef>,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            system_prompts: BTreeMap::new(),
            output_schemas: BTreeMap::new(),
            context_fields: default_context_fields(),
        }
    }
}

fn default_context_fields() -> Vec<ContextFieldDef> {
    use FieldType::{Text, Textarea};
    vec![
        ContextFieldDef::new("brand", "Brand", true, Text),
        ContextFieldDef::new("targetAudience", "Target Audience", true, Text),
        ContextFieldDef::new("category", "Category", true, Text),
        ContextFieldDef::new("primaryMessage", "Primary Message", true, Textarea),
        ContextFieldDef::new("secondaryMessage1", "Secondary Message 1", true, Textarea),
        ContextFieldDef::new("secondaryMessage2", "Secondary Message 2", true, Textarea),
        ContextFieldDef::new("version", "Version", false, Text),
    ]
}

/// Everything needed to analyse one kind of media with one focus.
#[derive(Debug, Clone)]
pub struct AnalysisProfile {
    pub key: String,
    pub system_prompt: String,
    pub expected_schema: ExpectedSchema,
    pub table_name: String,
}

impl AnalysisConfig {
    pub fn from_json_str(json: &str) -> Result<Self> {
        serde_json::from_str(json).with_context("parsing analysis config")
    }

    /// Read a configuration file from disk.
    pub async fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = tokio::fs::read_to_string(path)
            .await
            .with_context(format!("reading {}", path.display()))?;
        let config = Self::from_json_str(&raw)?;
        info!(
            path = %path.display(),
            prompts = config.system_prompts.len(),
            schemas = config.output_schemas.len(),
            "Loaded analysis config"
        );
        Ok(config)
    }

    /// Write this configuration to disk as pretty JSON.
    pub async fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let json = serde_json::to_string_pretty(self)?;
        tokio::fs::write(path, json)
            .await
            .with_context(format!("writing {}", path.display()))?;
        debug!(path = %path.display(), "Saved analysis config");
        Ok(())
    }

    /// Resolve the prompt and schema for a media kind and focus.
    pub fn profile(&self, kind: MediaKind, focus: Focus) -> Result<AnalysisProfile> {
        let key = profile_key(kind, focus);
        let system_prompt = self
            .system_prompts
            .get(&key)
            .ok_or_else(|| AnalysisError::Config(format!("no system prompt for '{key}'")))?;
        let output = self
            .output_schemas
            .get(&key)
            .ok_or_else(|| AnalysisError::Config(format!("no output schema for '{key}'")))?;
        let expected_schema = ExpectedSchema::from_value(output.schema.clone())
            .with_context(format!("output schema for '{key}'"))?;

        Ok(AnalysisProfile {
            key,
            system_prompt: system_prompt.clone(),
            expected_schema,
            table_name: output.table_name.clone(),
        })
    }

    /// Names of required context fields that are absent or blank in `values`.
    pub fn missing_context(&self, values: &ContextValues) -> Vec<String> {
        self.context_fields
            .iter()
            .filter(|field| field.required)
            .filter(|field| {
                values
                    .get(&field.name)
                    .map_or(true, |v| v.trim().is_empty())
            })
            .map(|field| field.name.clone())
            .collect()
    }
}

/// Caller-owned handle on a configuration file with explicit refresh.
///
/// Readers take cheap snapshots; `refresh` swaps in a freshly loaded file
/// without disturbing runs that already hold the previous snapshot.
#[derive(Clone)]
pub struct ConfigStore {
    path: PathBuf,
    current: Arc<RwLock<Arc<AnalysisConfig>>>,
}

impl ConfigStore {
    pub async fn load(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let config = AnalysisConfig::load(&path).await?;
        Ok(Self {
            path,
            current: Arc::new(RwLock::new(Arc::new(config))),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Snapshot of the configuration currently in effect.
    pub async fn current(&self) -> Arc<AnalysisConfig> {
        self.current.read().await.clone()
    }

    /// Re-read the file. On error the previous snapshot stays in effect.
    pub async fn refresh(&self) -> Result<Arc<AnalysisConfig>> {
        let config = Arc::new(AnalysisConfig::load(&self.path).await?);
        *self.current.write().await = config.clone();
        Ok(config)
    }

    /// Swap in an in-memory configuration without touching the file.
    pub async fn replace(&self, config: AnalysisConfig) -> Arc<AnalysisConfig> {
        let config = Arc::new(config);
        *self.current.write().await = config.clone();
        config
    }

    /// Write the current snapshot back to the file.
    pub async fn persist(&self) -> Result<()> {
        let snapshot = self.current().await;
        snapshot.save(&self.path).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample() -> AnalysisConfig {
        AnalysisConfig::from_json_str(
            &json!({
                "systemPrompts": {
                    "image-branding": "Analyse {brand} for {targetAudience}."
                },
                "outputSchemas": {
                    "image-branding": {
                        "tableName": "image_branding_analysis",
                        "schema": {
                            "type": "object",
                            "properties": {
                                "assets_score": {"type": "integer"},
                                "summary": {"type": "string"}
                            }
                        }
                    }
                }
            })
            .to_string(),
        )
        .unwrap()
    }

    #[test]
    fn context_fields_default_when_absent() {
        let config = sample();
        assert_eq!(config.context_fields.len(), 7);
        assert!(config
            .context_fields
            .iter()
            .any(|f| f.name == "version" && !f.required));
    }

    #[test]
    fn resolves_profile() {
        let profile = sample().profile(MediaKind::Image, Focus::Branding).unwrap();
        assert_eq!(profile.key, "image-branding");
        assert_eq!(profile.table_name, "image_branding_analysis");
        assert_eq!(
            profile.expected_schema.required_keys(),
            vec!["assets_score", "summary"]
        );
    }

    #[test]
    fn unknown_profile_is_a_config_error() {
        let err = sample()
            .profile(MediaKind::Video, Focus::Performance)
            .unwrap_err();
        assert!(matches!(err, AnalysisError::Config(ref m) if m.contains("video-performance")));
    }

    #[test]
    fn reports_blank_required_context() {
        let config = sample();
        let values: ContextValues = [("brand", "Acme"), ("category", "  ")]
            .into_iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        let missing = config.missing_context(&values);
        assert!(missing.contains(&"category".to_string()));
        assert!(missing.contains(&"targetAudience".to_string()));
        assert!(!missing.contains(&"brand".to_string()));
        assert!(!missing.contains(&"version".to_string()));
    }

    #[test]
    fn analyzer_config_clamps_concurrency() {
        let config = AnalyzerConfig::default().with_concurrency(0);
        assert_eq!(config.concurrency, 1);
        assert_eq!(config.max_retries, DEFAULT_MAX_RETRIES);
    }

    #[tokio::test]
    async fn store_refreshes_from_disk() {
        let path = std::env::temp_dir()
            .join(format!("analysis-config-{}.json", uuid::Uuid::new_v4()));
        sample().save(&path).await.unwrap();

        let store = ConfigStore::load(&path).await.unwrap();
        let before = store.current().await;
        assert_eq!(before.system_prompts.len(), 1);

        let mut updated = sample();
        updated
            .system_prompts
            .insert("video-branding".to_string(), "Watch {brand}.".to_string());
        updated.save(&path).await.unwrap();

        let after = store.refresh().await.unwrap();
        assert_eq!(after.system_prompts.len(), 2);
        // Earlier snapshots are unaffected.
        assert_eq!(before.system_prompts.len(), 1);

        tokio::fs::remove_file(&path).await.unwrap();
        assert!(store.refresh().await.is_err());
        assert_eq!(store.current().await.system_prompts.len(), 2);
    }
}
