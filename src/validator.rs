//! Bounded retry loop that turns free-form model output into schema-checked JSON.
//!
//! Each run starts from the rendered system prompt. Every failed attempt (call
//! error, unparseable output, missing fields) appends a diagnostic block to the
//! prompt for the next attempt, so the prompt grows monotonically and each retry
//! sees all earlier diagnostics. The loop stops at the first valid response or
//! after `max_retries + 1` attempts. Failures never escape as errors; the caller
//! only ever sees an [`AnalysisOutcome`].

use std::fmt;
use std::sync::Arc;

use serde::{Serialize, Serializer};
use serde_json::Value;
use tracing::{debug, info, instrument, trace, warn};
use uuid::Uuid;

use crate::{
    config::{AnalyzerConfig, DEFAULT_MAX_RETRIES},
    context::ContextValues,
    extract::{parse_candidate, ExtractionStrategy},
    generator::{ContentGenerator, GenerationRequest},
    schema::{ExpectedSchema, SchemaCheck},
    template::{render_template, unresolved_placeholders},
};

/// Everything the engine needs for one run.
#[derive(Debug, Clone)]
pub struct AnalysisRequest {
    pub file_uri: String,
    pub mime_type: String,
    /// Prompt template with `{field}` placeholders.
    pub system_prompt: String,
    pub context: ContextValues,
    pub expected_schema: ExpectedSchema,
    pub max_retries: usize,
}

impl AnalysisRequest {
    pub fn new(
        file_uri: impl Into<String>,
        mime_type: impl Into<String>,
        system_prompt: impl Into<String>,
        expected_schema: ExpectedSchema,
    ) -> Self {
        Self {
            file_uri: file_uri.into(),
            mime_type: mime_type.into(),
            system_prompt: system_prompt.into(),
            context: ContextValues::new(),
            expected_schema,
            max_retries: DEFAULT_MAX_RETRIES,
        }
    }

    pub fn with_context(mut self, context: ContextValues) -> Self {
        self.context = context;
        self
    }

    pub fn with_context_value(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.context.insert(key.into(), value.into());
        self
    }

    pub fn with_max_retries(mut self, retries: usize) -> Self {
        self.max_retries = retries;
        self
    }

    /// The prompt sent on the first attempt.
    pub fn resolved_prompt(&self) -> String {
        render_template(&self.system_prompt, &self.context)
    }
}

/// Category of a failed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum FailureKind {
    CallError,
    ParseError,
    ValidationError,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::CallError => "CallError",
            Self::ParseError => "ParseError",
            Self::ValidationError => "ValidationError",
        };
        f.write_str(name)
    }
}

/// Why an attempt was rejected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttemptFailure {
    /// The generation capability itself failed.
    Call { message: String },
    /// The extracted candidate was not valid JSON.
    Parse { message: String },
    /// Parsed JSON did not satisfy the expected schema.
    Validation {
        missing_keys: Vec<String>,
        required_keys: Vec<String>,
        violations: Vec<String>,
    },
}

impl AttemptFailure {
    pub fn kind(&self) -> FailureKind {
        match self {
            Self::Call { .. } => FailureKind::CallError,
            Self::Parse { .. } => FailureKind::ParseError,
            Self::Validation { .. } => FailureKind::ValidationError,
        }
    }
}

impl fmt::Display for AttemptFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Call { message } => write!(f, "Generation call failed: {message}"),
            Self::Parse { message } => write!(f, "JSON parse error: {message}"),
            Self::Validation {
                missing_keys,
                violations,
                ..
            } => {
                let mut parts = Vec::new();
                if !missing_keys.is_empty() {
                    parts.push(format!("Missing required fields: {}", missing_keys.join(", ")));
                }
                if !violations.is_empty() {
                    parts.push(format!("Schema violations: {}", violations.join("; ")));
                }
                f.write_str(&parts.join("; "))
            }
        }
    }
}

/// Record of one loop iteration.
#[derive(Debug, Clone)]
pub struct AttemptOutcome {
    /// Zero-based attempt index.
    pub attempt: usize,
    /// Prompt sent on this attempt.
    pub prompt: String,
    /// Model text, absent only when the call failed.
    pub raw_text: Option<String>,
    pub strategy: Option<ExtractionStrategy>,
    pub parsed: Option<Value>,
    pub failure: Option<AttemptFailure>,
}

impl AttemptOutcome {
    pub fn is_success(&self) -> bool {
        self.failure.is_none()
    }

    pub fn failure_kind(&self) -> Option<FailureKind> {
        self.failure.as_ref().map(AttemptFailure::kind)
    }

    /// Missing keys, populated only for validation failures.
    pub fn missing_keys(&self) -> &[String] {
        match &self.failure {
            Some(AttemptFailure::Validation { missing_keys, .. }) => missing_keys,
            _ => &[],
        }
    }
}

/// Terminal state of a run.
#[derive(Debug, Clone, PartialEq)]
pub enum Verdict {
    Success(Value),
    /// Budget exhausted; carries the last failure description.
    Exhausted(String),
}

/// Final result of a run.
#[derive(Debug, Clone)]
pub struct AnalysisOutcome {
    pub verdict: Verdict,
    /// Attempts executed beyond the first. Never exceeds the request's `max_retries`.
    pub retry_count: usize,
    pub attempts: Vec<AttemptOutcome>,
}

impl AnalysisOutcome {
    fn success(value: Value, retry_count: usize, attempts: Vec<AttemptOutcome>) -> Self {
        Self {
            verdict: Verdict::Success(value),
            retry_count,
            attempts,
        }
    }

    fn exhausted(error: String, retry_count: usize, attempts: Vec<AttemptOutcome>) -> Self {
        Self {
            verdict: Verdict::Exhausted(error),
            retry_count,
            attempts,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self.verdict, Verdict::Success(_))
    }

    pub fn result(&self) -> Option<&Value> {
        match &self.verdict {
            Verdict::Success(value) => Some(value),
            Verdict::Exhausted(_) => None,
        }
    }

    pub fn error(&self) -> Option<&str> {
        match &self.verdict {
            Verdict::Success(_) => None,
            Verdict::Exhausted(error) => Some(error),
        }
    }

    /// Total generation calls made.
    pub fn total_attempts(&self) -> usize {
        self.attempts.len()
    }

    pub fn into_result(self) -> std::result::Result<Value, String> {
        match self.verdict {
            Verdict::Success(value) => Ok(value),
            Verdict::Exhausted(error) => Err(error),
        }
    }
}

/// Serialized as `{ success, result?, error?, retryCount }`.
impl Serialize for AnalysisOutcome {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        #[derive(Serialize)]
        #[serde(rename_all = "camelCase")]
        struct Wire<'a> {
            success: bool,
            #[serde(skip_serializing_if = "Option::is_none")]
            result: Option<&'a Value>,
            #[serde(skip_serializing_if = "Option::is_none")]
            error: Option<&'a str>,
            retry_count: usize,
        }

        Wire {
            success: self.is_success(),
            result: self.result(),
            error: self.error(),
            retry_count: self.retry_count,
        }
        .serialize(serializer)
    }
}

/// Diagnostic block appended to the prompt after a failed attempt.
///
/// Parse failures echo the raw response, validation failures echo the parsed
/// object; `echo_limit` caps the echoed text in characters when set.
pub fn feedback_block(
    failure: &AttemptFailure,
    raw_text: Option<&str>,
    parsed: Option<&Value>,
    echo_limit: Option<usize>,
) -> String {
    let echo = |text: String| match echo_limit {
        Some(limit) => truncate_for_echo(&text, limit),
        None => text,
    };

    match failure {
        AttemptFailure::Call { .. } => {
            format!("\n\nPREVIOUS ATTEMPT FAILED: {failure}\nPlease try again.")
        }
        AttemptFailure::Parse { .. } => format!(
            "\n\nPREVIOUS ATTEMPT FAILED: {failure}\nPlease ensure your response is valid JSON \
             matching the schema. Previous response was: {}",
            echo(raw_text.unwrap_or_default().to_string())
        ),
        AttemptFailure::Validation { required_keys, .. } => {
            let previous = parsed
                .and_then(|v| serde_json::to_string(v).ok())
                .unwrap_or_default();
            format!(
                "\n\nPREVIOUS ATTEMPT FAILED: {failure}\nRequired fields: {}\nPrevious response: {}",
                required_keys.join(", "),
                echo(previous)
            )
        }
    }
}

/// The prompt for the next attempt: the previous prompt plus the diagnostic block.
pub fn next_prompt(previous: &str, block: &str) -> String {
    let mut prompt = String::with_capacity(previous.len() + block.len());
    prompt.push_str(previous);
    prompt.push_str(block);
    prompt
}

fn truncate_for_echo(text: &str, max_chars: usize) -> String {
    let total = text.chars().count();
    if total <= max_chars {
        return text.to_string();
    }
    let cut = text
        .char_indices()
        .nth(max_chars)
        .map_or(text.len(), |(idx, _)| idx);
    format!("{}... [truncated, {total} total chars]", &text[..cut])
}

/// Drives the attempt loop against an injected generation capability.
#[derive(Clone)]
pub struct RetryValidator {
    generator: Arc<dyn ContentGenerator>,
    config: AnalyzerConfig,
}

impl RetryValidator {
    pub fn new(generator: impl ContentGenerator + 'static) -> Self {
        Self::from_shared(Arc::new(generator))
    }

    pub fn from_shared(generator: Arc<dyn ContentGenerator>) -> Self {
        Self {
            generator,
            config: AnalyzerConfig::default(),
        }
    }

    pub fn with_config(mut self, config: AnalyzerConfig) -> Self {
        self.config = config;
        self
    }

    pub fn config(&self) -> &AnalyzerConfig {
        &self.config
    }

    /// Run the attempt loop to a terminal state.
    #[instrument(
        skip_all,
        fields(
            run_id = %Uuid::new_v4(),
            file_uri = %request.file_uri,
            mime_type = %request.mime_type,
            max_retries = request.max_retries,
        )
    )]
    pub async fn run(&self, request: &AnalysisRequest) -> AnalysisOutcome {
        let unresolved = unresolved_placeholders(&request.system_prompt, &request.context);
        if !unresolved.is_empty() {
            warn!(?unresolved, "Prompt references placeholders with no context value");
        }

        let check = match SchemaCheck::compile(&request.expected_schema, self.config.validation_mode)
        {
            Ok(check) => check,
            Err(err) => {
                warn!(error = %err, "Expected schema could not be compiled");
                return AnalysisOutcome::exhausted(err.to_string(), 0, Vec::new());
            }
        };

        let mut prompt = request.resolved_prompt();
        let mut attempts = Vec::new();
        let mut last_error = String::new();

        for attempt in 0..=request.max_retries {
            let outcome = self.attempt(attempt, prompt.clone(), request, &check).await;

            let Some(failure) = outcome.failure.clone() else {
                info!(attempt, "Model output passed validation");
                let value = outcome.parsed.clone().unwrap_or_default();
                attempts.push(outcome);
                return AnalysisOutcome::success(value, attempt, attempts);
            };

            warn!(
                attempt,
                kind = %failure.kind(),
                error = %failure,
                "Attempt {}/{} rejected",
                attempt + 1,
                request.max_retries.saturating_add(1)
            );
            last_error = failure.to_string();

            if attempt < request.max_retries {
                let block = feedback_block(
                    &failure,
                    outcome.raw_text.as_deref(),
                    outcome.parsed.as_ref(),
                    self.config.echo_limit,
                );
                prompt = next_prompt(&prompt, &block);
                debug!(prompt_length = prompt.len(), "Scheduled corrective retry");
            }
            attempts.push(outcome);
        }

        AnalysisOutcome::exhausted(last_error, request.max_retries, attempts)
    }

    async fn attempt(
        &self,
        index: usize,
        prompt: String,
        request: &AnalysisRequest,
        check: &SchemaCheck<'_>,
    ) -> AttemptOutcome {
        let generation = GenerationRequest {
            prompt,
            file_uri: request.file_uri.clone(),
            mime_type: request.mime_type.clone(),
        };

        let mut outcome = AttemptOutcome {
            attempt: index,
            prompt: String::new(),
            raw_text: None,
            strategy: None,
            parsed: None,
            failure: None,
        };

        let raw = match self.generator.generate(&generation).await {
            Ok(raw) => raw,
            Err(err) => {
                outcome.prompt = generation.prompt;
                outcome.failure = Some(AttemptFailure::Call {
                    message: err.to_string(),
                });
                return outcome;
            }
        };
        outcome.prompt = generation.prompt;
        trace!(raw_response = %raw, "Raw model text");

        match parse_candidate(&raw) {
            Ok((strategy, value)) => {
                debug!(?strategy, "Extracted JSON candidate");
                outcome.strategy = Some(strategy);
                let report = check.check(&value);
                if !report.is_valid() {
                    outcome.failure = Some(AttemptFailure::Validation {
                        missing_keys: report.missing_keys,
                        required_keys: request
                            .expected_schema
                            .required_keys()
                            .into_iter()
                            .map(str::to_string)
                            .collect(),
                        violations: report.violations,
                    });
                }
                outcome.parsed = Some(value);
            }
            Err(err) => {
                outcome.failure = Some(AttemptFailure::Parse {
                    message: err.to_string(),
                });
            }
        }
        outcome.raw_text = Some(raw);
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn validation_failure() -> AttemptFailure {
        AttemptFailure::Validation {
            missing_keys: vec!["b".to_string()],
            required_keys: vec!["a".to_string(), "b".to_string()],
            violations: Vec::new(),
        }
    }

    #[test]
    fn call_feedback_asks_to_try_again() {
        let failure = AttemptFailure::Call {
            message: "quota".to_string(),
        };
        let block = feedback_block(&failure, None, None, None);
        assert_eq!(
            block,
            "\n\nPREVIOUS ATTEMPT FAILED: Generation call failed: quota\nPlease try again."
        );
    }

    #[test]
    fn parse_feedback_echoes_raw_response() {
        let failure = AttemptFailure::Parse {
            message: "expected value at line 1 column 1".to_string(),
        };
        let block = feedback_block(&failure, Some("Sorry, no."), None, None);
        assert!(block.contains("JSON parse error: expected value at line 1 column 1"));
        assert!(block.ends_with("Previous response was: Sorry, no."));
    }

    #[test]
    fn validation_feedback_lists_missing_and_required_keys() {
        let parsed = json!({"a": 1});
        let block = feedback_block(&validation_failure(), None, Some(&parsed), None);
        assert!(block.contains("Missing required fields: b"));
        assert!(block.contains("Required fields: a, b"));
        assert!(block.ends_with(r#"Previous response: {"a":1}"#));
    }

    #[test]
    fn echo_limit_counts_characters() {
        let failure = AttemptFailure::Parse {
            message: "bad".to_string(),
        };
        let block = feedback_block(&failure, Some("žžžžž"), None, Some(3));
        assert!(block.ends_with("Previous response was: žžž... [truncated, 5 total chars]"));

        let untouched = feedback_block(&failure, Some("žžž"), None, Some(3));
        assert!(untouched.ends_with("Previous response was: žžž"));
    }

    #[test]
    fn next_prompt_preserves_prefix() {
        let block = feedback_block(&validation_failure(), None, Some(&json!({})), None);
        let next = next_prompt("base", &block);
        assert!(next.starts_with("base"));
        assert_eq!(next.len(), "base".len() + block.len());
    }

    #[test]
    fn validation_display_joins_both_lists() {
        let failure = AttemptFailure::Validation {
            missing_keys: vec!["a".to_string()],
            required_keys: vec!["a".to_string()],
            violations: vec!["/b: 9 is greater than 5".to_string()],
        };
        assert_eq!(
            failure.to_string(),
            "Missing required fields: a; Schema violations: /b: 9 is greater than 5"
        );
        assert_eq!(failure.kind(), FailureKind::ValidationError);
    }

    #[test]
    fn outcome_serializes_to_caller_contract() {
        let ok = AnalysisOutcome::success(json!({"a": 1}), 1, Vec::new());
        assert_eq!(
            serde_json::to_value(&ok).unwrap(),
            json!({"success": true, "result": {"a": 1}, "retryCount": 1})
        );

        let failed = AnalysisOutcome::exhausted("JSON parse error: eof".to_string(), 2, Vec::new());
        assert_eq!(
            serde_json::to_value(&failed).unwrap(),
            json!({"success": false, "error": "JSON parse error: eof", "retryCount": 2})
        );
    }
}
