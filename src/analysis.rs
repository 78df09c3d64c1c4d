//! Per-file analysis on top of the retry engine.
//!
//! [`MediaAnalyzer`] resolves the right prompt and schema for each file from the
//! application config, runs the retry engine and packages the outcome as a
//! [`FileAnalysis`] record for the caller's storage layer. Batches run
//! concurrently up to the configured limit; results keep input order.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{info, instrument, warn};

use crate::{
    config::{AnalysisConfig, AnalyzerConfig},
    context::CreativeContext,
    error::Result,
    generator::ContentGenerator,
    media::{Focus, MediaKind},
    validator::{AnalysisOutcome, AnalysisRequest, RetryValidator},
};

/// An uploaded file ready for analysis.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaFile {
    pub id: u64,
    pub filename: String,
    pub file_uri: String,
    pub mime_type: String,
    pub context: CreativeContext,
}

/// Result record for one file.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FileAnalysis {
    pub file_id: u64,
    pub filename: String,
    pub focus: Focus,
    pub media_kind: Option<MediaKind>,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub retry_count: usize,
    /// Destination table; set only for successful results.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub table_name: Option<String>,
    pub analyzed_at: DateTime<Utc>,
}

impl FileAnalysis {
    fn rejected(file: &MediaFile, focus: Focus, kind: Option<MediaKind>, error: String) -> Self {
        Self {
            file_id: file.id,
            filename: file.filename.clone(),
            focus,
            media_kind: kind,
            success: false,
            result: None,
            error: Some(error),
            retry_count: 0,
            table_name: None,
            analyzed_at: Utc::now(),
        }
    }

    fn from_outcome(
        file: &MediaFile,
        focus: Focus,
        kind: MediaKind,
        table_name: String,
        outcome: AnalysisOutcome,
    ) -> Self {
        let success = outcome.is_success();
        let retry_count = outcome.retry_count;
        let (result, error) = match outcome.into_result() {
            Ok(value) => (Some(value), None),
            Err(error) => (None, Some(error)),
        };
        Self {
            file_id: file.id,
            filename: file.filename.clone(),
            focus,
            media_kind: Some(kind),
            success,
            result,
            error,
            retry_count,
            table_name: success.then_some(table_name),
            analyzed_at: Utc::now(),
        }
    }
}

/// Engine request plus the bookkeeping needed to file its result.
#[derive(Debug, Clone)]
pub struct PreparedAnalysis {
    pub request: AnalysisRequest,
    pub media_kind: MediaKind,
    pub table_name: String,
}

/// Analyses media files against the prompt profiles of an [`AnalysisConfig`].
#[derive(Clone)]
pub struct MediaAnalyzer {
    validator: RetryValidator,
    config: Arc<AnalysisConfig>,
}

impl MediaAnalyzer {
    pub fn new(generator: impl ContentGenerator + 'static, config: Arc<AnalysisConfig>) -> Self {
        Self {
            validator: RetryValidator::new(generator),
            config,
        }
    }

    pub fn with_settings(mut self, settings: AnalyzerConfig) -> Self {
        self.validator = self.validator.with_config(settings);
        self
    }

    /// Use a different configuration snapshot, e.g. after [`crate::ConfigStore::refresh`].
    pub fn with_config(mut self, config: Arc<AnalysisConfig>) -> Self {
        self.config = config;
        self
    }

    pub fn settings(&self) -> &AnalyzerConfig {
        self.validator.config()
    }

    /// Build the engine request for a file without running it.
    pub fn prepare(&self, file: &MediaFile, focus: Focus) -> Result<PreparedAnalysis> {
        let kind = MediaKind::from_mime_type(&file.mime_type)?;
        let profile = self.config.profile(kind, focus)?;

        let context = file.context.to_values();
        let missing = self.config.missing_context(&context);
        if !missing.is_empty() {
            warn!(file_id = file.id, ?missing, "Required context fields are blank");
        }

        let request = AnalysisRequest::new(
            file.file_uri.clone(),
            file.mime_type.clone(),
            profile.system_prompt,
            profile.expected_schema,
        )
        .with_context(context)
        .with_max_retries(self.settings().max_retries);
        Ok(PreparedAnalysis {
            request,
            media_kind: kind,
            table_name: profile.table_name,
        })
    }

    /// Analyse one file. Never fails; problems are reported in the record.
    #[instrument(skip_all, fields(file_id = file.id, filename = %file.filename, focus = %focus))]
    pub async fn analyze_file(&self, file: &MediaFile, focus: Focus) -> FileAnalysis {
        let prepared = match self.prepare(file, focus) {
            Ok(prepared) => prepared,
            Err(err) => {
                warn!(error = %err, "Skipping file");
                let kind = MediaKind::from_mime_type(&file.mime_type).ok();
                return FileAnalysis::rejected(file, focus, kind, err.to_string());
            }
        };

        let outcome = self.validator.run(&prepared.request).await;
        info!(
            success = outcome.is_success(),
            retry_count = outcome.retry_count,
            "Finished file analysis"
        );
        FileAnalysis::from_outcome(
            file,
            focus,
            prepared.media_kind,
            prepared.table_name,
            outcome,
        )
    }

    /// Analyse files concurrently, returning records in input order.
    #[instrument(skip_all, fields(files = files.len(), focus = %focus))]
    pub async fn analyze_batch(&self, files: &[MediaFile], focus: Focus) -> Vec<FileAnalysis> {
        let results: Vec<FileAnalysis> = stream::iter(files.iter())
            .map(|file| self.analyze_file(file, focus))
            .buffered(self.settings().concurrency.max(1))
            .collect()
            .await;

        let succeeded = results.iter().filter(|r| r.success).count();
        info!(
            succeeded,
            failed = results.len() - succeeded,
            "Finished batch analysis"
        );
        results
    }
}
