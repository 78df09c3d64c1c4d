use std::{path::Path, sync::Arc};

use gemini_rust::{FileHandle, FileState, Gemini};
use tokio::fs;
use tokio::time::{sleep, Duration};
use tracing::{debug, info};

use crate::{
    analysis::MediaFile,
    context::CreativeContext,
    error::{AnalysisError, Result},
    media::MediaKind,
};

/// A media object the model can reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadedMedia {
    pub uri: String,
    pub mime_type: String,
    pub display_name: String,
    pub kind: MediaKind,
}

impl UploadedMedia {
    fn from_handle(handle: &FileHandle, display_name: &str) -> Result<Self> {
        let meta = handle.get_file_meta();
        let mime_type = meta
            .mime_type
            .as_ref()
            .ok_or_else(|| AnalysisError::Context("file handle missing mime_type".to_string()))?
            .to_string();
        let uri = meta
            .uri
            .as_ref()
            .ok_or_else(|| AnalysisError::Context("file handle missing uri".to_string()))?
            .to_string();
        let kind = MediaKind::from_mime_type(&mime_type)?;
        Ok(Self {
            uri,
            mime_type,
            display_name: display_name.to_string(),
            kind,
        })
    }

    /// Pair with a creative brief to form analysis input.
    pub fn into_media_file(self, id: u64, context: CreativeContext) -> MediaFile {
        MediaFile {
            id,
            filename: self.display_name,
            file_uri: self.uri,
            mime_type: self.mime_type,
            context,
        }
    }
}

/// MIME type and display name for a local file; rejects anything but images and videos.
fn describe_path(path: &Path) -> Result<(String, String)> {
    let mime = mime_guess::from_path(path)
        .first_or_octet_stream()
        .to_string();
    MediaKind::from_mime_type(&mime)?;
    let display_name = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("uploaded_media")
        .to_string();
    Ok((mime, display_name))
}

/// Uploads images and videos to the Gemini File API.
#[derive(Clone)]
pub struct FileManager {
    client: Arc<Gemini>,
    poll_interval: Duration,
    max_polls: usize,
}

impl FileManager {
    pub fn new(client: Arc<Gemini>) -> Self {
        Self {
            client,
            poll_interval: Duration::from_secs(2),
            max_polls: 30,
        }
    }

    /// How often and how many times to poll while a video is being processed.
    pub fn with_polling(mut self, interval: Duration, max_polls: usize) -> Self {
        self.poll_interval = interval;
        self.max_polls = max_polls.max(1);
        self
    }

    /// Upload a file from disk, guessing its MIME type from the extension.
    pub async fn upload_path<P: AsRef<Path>>(&self, path: P) -> Result<UploadedMedia> {
        let (mime, display_name) = describe_path(path.as_ref())?;
        let bytes = fs::read(path.as_ref()).await?;
        self.upload_bytes(bytes, &mime, &display_name).await
    }

    /// Upload raw bytes with an explicit MIME type.
    pub async fn upload_bytes(
        &self,
        bytes: impl Into<Vec<u8>>,
        mime_type: &str,
        display_name: &str,
    ) -> Result<UploadedMedia> {
        MediaKind::from_mime_type(mime_type)?;
        let handle = self.upload_handle(bytes, mime_type, display_name).await?;
        UploadedMedia::from_handle(&handle, display_name)
    }

    /// Upload a file and wait until the API reports it as active.
    ///
    /// Videos are processed asynchronously and cannot be referenced before then.
    pub async fn upload_and_wait<P: AsRef<Path>>(&self, path: P) -> Result<UploadedMedia> {
        let (mime, display_name) = describe_path(path.as_ref())?;
        let bytes = fs::read(path.as_ref()).await?;
        let handle = self.upload_handle(bytes, &mime, &display_name).await?;
        let active = self.wait_for_active(handle).await?;
        UploadedMedia::from_handle(&active, &display_name)
    }

    async fn upload_handle(
        &self,
        bytes: impl Into<Vec<u8>>,
        mime_type: &str,
        display_name: &str,
    ) -> Result<FileHandle> {
        let handle = self
            .client
            .create_file(bytes)
            .with_mime_type(mime_type.parse().map_err(|e| {
                AnalysisError::Context(format!("Invalid MIME type '{mime_type}': {e}"))
            })?)
            .display_name(display_name.to_string())
            .upload()
            .await?;
        info!(name = handle.name(), mime_type, "Uploaded media");
        Ok(handle)
    }

    async fn wait_for_active(&self, handle: FileHandle) -> Result<FileHandle> {
        let name = handle.name().to_string();
        for poll in 1..=self.max_polls {
            let latest = self.client.get_file(&name).await?;
            if latest
                .get_file_meta()
                .state
                .as_ref()
                .is_some_and(|s| *s == FileState::Active)
            {
                return Ok(latest);
            }
            debug!(name = %name, poll, "Waiting for media to become active");
            sleep(self.poll_interval).await;
        }
        Err(AnalysisError::Context(format!(
            "file {name} not active after {} checks",
            self.max_polls
        )))
    }
}
