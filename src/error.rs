use thiserror::Error;

/// Detailed error types for media analysis operations.
#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error("Gemini client error: {0}")]
    Gemini(#[from] gemini_rust::ClientError),

    #[error("File API error: {0}")]
    Files(#[from] gemini_rust::FilesError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Schema error: {0}")]
    Schema(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Context error: {0}")]
    Context(String),

    #[error("Unsupported media: {0}")]
    UnsupportedMedia(String),

    #[error("Generation failed: {0}")]
    Generation(String),

    #[error("Generation call timed out after {secs} seconds")]
    Timeout { secs: u64 },

    #[error("Rate limited: retry after {retry_after_secs} seconds")]
    RateLimited { retry_after_secs: u64 },

    #[error("Service unavailable: {message}. Attempted {attempts} retries.")]
    ServiceUnavailable { message: String, attempts: usize },
}

impl AnalysisError {
    /// Check if this error is a transient provider failure worth retrying at the transport level.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::RateLimited { .. } | Self::ServiceUnavailable { .. } | Self::Timeout { .. } => {
                true
            }
            Self::Gemini(gemini_rust::ClientError::BadResponse { code, .. }) => {
                *code == 503 || *code == 429
            }
            _ => false,
        }
    }

    /// Get suggested retry delay in seconds, if applicable.
    pub fn retry_delay(&self) -> Option<u64> {
        match self {
            Self::RateLimited { retry_after_secs } => Some(*retry_after_secs),
            Self::ServiceUnavailable { .. } => Some(5),
            Self::Gemini(gemini_rust::ClientError::BadResponse {
                code: 429,
                description,
            }) => description
                .as_ref()
                .and_then(|d| parse_retry_delay_from_error(d)),
            _ => None,
        }
    }
}

/// Parse retry delay from a Gemini API error response body.
pub(crate) fn parse_retry_delay_from_error(description: &str) -> Option<u64> {
    if let Ok(json) = serde_json::from_str::<serde_json::Value>(description) {
        let details = json
            .get("error")
            .and_then(|e| e.get("details"))
            .and_then(|d| d.as_array());
        if let Some(details) = details {
            for detail in details {
                if detail.get("@type").and_then(|t| t.as_str())
                    == Some("type.googleapis.com/google.rpc.RetryInfo")
                {
                    if let Some(delay_str) = detail.get("retryDelay").and_then(|d| d.as_str()) {
                        return parse_duration_string(delay_str);
                    }
                }
            }
        }
    }

    // Plain-text hints: "Please retry in 57s.", "retry in 488.04ms"
    let lower = description.to_lowercase();
    let idx = lower.find("retry in ")?;
    let remainder = &lower[idx + "retry in ".len()..];
    let end = remainder
        .find(|c: char| !c.is_numeric() && c != '.' && c != 'm' && c != 's')
        .unwrap_or(remainder.len());
    parse_duration_string(remainder[..end].trim_end_matches('.'))
}

/// Parse duration strings like "44s", "44.5s", "500ms" into whole seconds.
fn parse_duration_string(s: &str) -> Option<u64> {
    let s = s.trim();

    if let Some(ms_part) = s.strip_suffix("ms") {
        let ms = ms_part.parse::<f64>().ok()?;
        if ms <= 0.0 {
            return Some(0);
        }
        return Some(((ms / 1000.0).ceil() as u64).max(1));
    }

    let secs = s.strip_suffix('s')?.parse::<f64>().ok()?;
    Some(secs.ceil() as u64)
}

pub type Result<T> = std::result::Result<T, AnalysisError>;

/// Extension trait for adding context to errors.
pub trait ResultExt<T> {
    /// Add context to an error.
    fn with_context(self, context: impl Into<String>) -> Result<T>;
}

impl<T, E: Into<AnalysisError>> ResultExt<T> for std::result::Result<T, E> {
    fn with_context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| {
            let base_err = e.into();
            AnalysisError::Context(format!("{}: {}", context.into(), base_err))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retry_delay_from_retry_info_detail() {
        let body = r#"{
            "error": {
                "code": 429,
                "details": [
                    {"@type": "type.googleapis.com/google.rpc.RetryInfo", "retryDelay": "44s"}
                ]
            }
        }"#;
        assert_eq!(parse_retry_delay_from_error(body), Some(44));
    }

    #[test]
    fn retry_delay_from_text_hint() {
        assert_eq!(
            parse_retry_delay_from_error("Quota exceeded. Please retry in 57s."),
            Some(57)
        );
        assert_eq!(
            parse_retry_delay_from_error("retry in 488.04ms"),
            Some(1)
        );
        assert_eq!(parse_retry_delay_from_error("no hint here"), None);
    }

    #[test]
    fn retryable_classification() {
        assert!(AnalysisError::RateLimited { retry_after_secs: 3 }.is_retryable());
        assert!(AnalysisError::Timeout { secs: 120 }.is_retryable());
        assert!(!AnalysisError::Config("bad".into()).is_retryable());
        assert_eq!(
            AnalysisError::ServiceUnavailable {
                message: "down".into(),
                attempts: 1
            }
            .retry_delay(),
            Some(5)
        );
    }

    #[test]
    fn with_context_wraps_message() {
        let err: std::result::Result<(), std::io::Error> = Err(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            "missing",
        ));
        let wrapped = err.with_context("loading config").unwrap_err();
        assert!(matches!(wrapped, AnalysisError::Context(ref m) if m.starts_with("loading config: I/O error")));
    }
}
