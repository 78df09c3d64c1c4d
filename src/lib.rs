//! Schema-checked Gemini analysis of images and videos.
//!
//! The core is a bounded retry engine: it renders a prompt template with
//! per-file context, asks a vision model about a media file, extracts JSON from
//! whatever text comes back, checks the required fields, and on failure retries
//! with the diagnostics appended to the prompt.
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use gemini_media_analysis::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> std::result::Result<(), Box<dyn std::error::Error>> {
//!     let generator = GeminiGeneratorBuilder::new("your-api-key").build()?;
//!     let validator = RetryValidator::new(generator);
//!
//!     let request = AnalysisRequest::new(
//!         "gs://creatives/banner.png",
//!         "image/png",
//!         "Rate the branding of this image for {brand}. Reply with JSON.",
//!         ExpectedSchema::from_keys(["assets_score", "assets_analysis"]),
//!     )
//!     .with_context_value("brand", "Acme");
//!
//!     let outcome = validator.run(&request).await;
//!     println!("{}", serde_json::to_string_pretty(&outcome)?);
//!     Ok(())
//! }
//! ```

pub mod analysis;
pub mod config;
pub mod context;
pub mod error;
pub mod extract;
pub mod files;
pub mod generator;
pub mod media;
pub mod schema;
pub mod template;
pub mod validator;

pub use analysis::{FileAnalysis, MediaAnalyzer, MediaFile, PreparedAnalysis};
pub use config::{
    AnalysisConfig, AnalysisProfile, AnalyzerConfig, ConfigStore, ContextFieldDef, FieldType,
    OutputSchemaConfig, DEFAULT_MAX_RETRIES,
};
pub use context::{ContextValues, CreativeContext};
pub use error::{AnalysisError, Result, ResultExt};
pub use extract::{extract_candidate, parse_candidate, ExtractionStrategy};
pub use files::{FileManager, UploadedMedia};
pub use generator::{
    ContentGenerator, GeminiGenerator, GeminiGeneratorBuilder, GenerationRequest, MockGenerator,
    MockHandler, MockReply, MockRequest,
};
pub use media::{profile_key, Focus, MediaKind};
pub use schema::{ExpectedSchema, SchemaCheck, SchemaReport, ValidationMode};
pub use template::{placeholders, render_template, unresolved_placeholders};
pub use validator::{
    feedback_block, next_prompt, AnalysisOutcome, AnalysisRequest, AttemptFailure,
    AttemptOutcome, FailureKind, RetryValidator, Verdict,
};

/// Prelude module for convenient imports.
///
/// ```rust
/// use gemini_media_analysis::prelude::*;
/// ```
pub mod prelude {
    pub use crate::analysis::{FileAnalysis, MediaAnalyzer, MediaFile};
    pub use crate::config::{AnalysisConfig, AnalyzerConfig, ConfigStore};
    pub use crate::context::{ContextValues, CreativeContext};
    pub use crate::error::{AnalysisError, Result, ResultExt};
    pub use crate::files::{FileManager, UploadedMedia};
    pub use crate::generator::{
        ContentGenerator, GeminiGenerator, GeminiGeneratorBuilder, GenerationRequest,
        MockGenerator, MockReply, MockRequest,
    };
    pub use crate::media::{Focus, MediaKind};
    pub use crate::schema::{ExpectedSchema, ValidationMode};
    pub use crate::validator::{AnalysisOutcome, AnalysisRequest, FailureKind, RetryValidator};

    // Re-export commonly used external types
    pub use gemini_rust::Model;
    pub use serde_json::{json, Value};
}
