//! Example: run a batch offline with a mock generator.
//!
//! The mock omits a required field on its first answer for each file, so every
//! record shows one corrective retry. No API key or network access is needed.
//!
//! Run with: `cargo run --example mock_batch`

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use gemini_media_analysis::prelude::*;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let config = Arc::new(AnalysisConfig::load("demos/config.json").await?);

    let seen = Arc::new(Mutex::new(HashSet::new()));
    let generator = MockGenerator::new(move |req: MockRequest| {
        let first_time = seen.lock().unwrap().insert(req.request.file_uri.clone());
        if first_time {
            return Ok("```json\n{\"early_branding_score\": 4}\n```".to_string());
        }
        Ok(json!({
            "early_branding_score": 4,
            "overall_branding_score": 3,
            "branding_analysis": format!("Logo visible early in {}", req.request.file_uri),
        })
        .to_string())
    });

    let files: Vec<MediaFile> = (1..=3)
        .map(|id| MediaFile {
            id,
            filename: format!("spot-{id}.mp4"),
            file_uri: format!("https://example.invalid/files/spot-{id}"),
            mime_type: "video/mp4".to_string(),
            context: CreativeContext::new("Acme")
                .with_target_audience("Commuters")
                .with_primary_message("Coffee that keeps up")
                .with_version("v2"),
        })
        .collect();

    let analyzer = MediaAnalyzer::new(generator.clone(), config)
        .with_settings(AnalyzerConfig::default().with_concurrency(2));
    let records = analyzer.analyze_batch(&files, Focus::Branding).await;

    for record in &records {
        println!(
            "{} -> success={} retries={} table={:?}",
            record.filename, record.success, record.retry_count, record.table_name
        );
    }
    println!("Mock calls made: {}", generator.call_count());
    Ok(())
}
