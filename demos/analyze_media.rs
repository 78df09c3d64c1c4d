//! Example: upload a local image or video and analyse it against a config profile.
//!
//! Run with:
//! `GEMINI_API_KEY=... cargo run --example analyze_media -- path/to/creative.png branding`

use std::sync::Arc;

use gemini_media_analysis::prelude::*;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("gemini_media_analysis=info")),
        )
        .init();

    let api_key = std::env::var("GEMINI_API_KEY").expect("GEMINI_API_KEY must be set");
    let mut args = std::env::args().skip(1);
    let path = args.next().expect("usage: analyze_media <file> [branding|performance]");
    let focus = match args.next().as_deref() {
        Some("performance") => Focus::Performance,
        _ => Focus::Branding,
    };

    let config = Arc::new(AnalysisConfig::load("demos/config.json").await?);
    let generator = GeminiGeneratorBuilder::new(api_key)
        .with_model(Model::Gemini25Flash)
        .build()?;

    let uploaded = FileManager::new(generator.raw())
        .upload_and_wait(&path)
        .await?;
    println!("Uploaded {} as {}", uploaded.display_name, uploaded.uri);

    let brief = CreativeContext::new("Acme")
        .with_target_audience("Young professionals")
        .with_category("Coffee")
        .with_primary_message("Better mornings start here")
        .with_secondary_messages("Ethically sourced", "Ready in 60 seconds");
    let file = uploaded.into_media_file(1, brief);

    let analyzer = MediaAnalyzer::new(generator, config);
    let record = analyzer.analyze_file(&file, focus).await;

    println!("{}", serde_json::to_string_pretty(&record)?);
    Ok(())
}
