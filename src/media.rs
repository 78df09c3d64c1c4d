use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{AnalysisError, Result};

/// Broad media category, inferred from the MIME type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Image,
    Video,
}

impl MediaKind {
    /// Classify a MIME type such as `image/png` or `video/mp4`.
    pub fn from_mime_type(mime_type: &str) -> Result<Self> {
        let lower = mime_type.trim().to_ascii_lowercase();
        if lower.starts_with("image/") {
            Ok(Self::Image)
        } else if lower.starts_with("video/") {
            Ok(Self::Video)
        } else {
            Err(AnalysisError::UnsupportedMedia(format!(
                "File must be an image or video, got '{mime_type}'"
            )))
        }
    }

    /// Guess the kind from a file extension.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let mime = mime_guess::from_path(path.as_ref()).first_or_octet_stream();
        Self::from_mime_type(mime.essence_str())
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Image => "image",
            Self::Video => "video",
        }
    }
}

impl fmt::Display for MediaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What the analysis should concentrate on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Focus {
    Branding,
    Performance,
}

impl Focus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Branding => "branding",
            Self::Performance => "performance",
        }
    }
}

impl fmt::Display for Focus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Key under which prompts and output schemas are stored, e.g. `video-branding`.
pub fn profile_key(kind: MediaKind, focus: Focus) -> String {
    format!("{kind}-{focus}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_mime_prefixes() {
        assert_eq!(MediaKind::from_mime_type("image/jpeg").unwrap(), MediaKind::Image);
        assert_eq!(MediaKind::from_mime_type("VIDEO/MP4").unwrap(), MediaKind::Video);
        assert!(matches!(
            MediaKind::from_mime_type("application/pdf"),
            Err(AnalysisError::UnsupportedMedia(_))
        ));
    }

    #[test]
    fn guesses_from_extension() {
        assert_eq!(MediaKind::from_path("banner.png").unwrap(), MediaKind::Image);
        assert_eq!(MediaKind::from_path("spot.mp4").unwrap(), MediaKind::Video);
        assert!(MediaKind::from_path("notes.txt").is_err());
    }

    #[test]
    fn renders_profile_keys() {
        assert_eq!(profile_key(MediaKind::Image, Focus::Branding), "image-branding");
        assert_eq!(
            profile_key(MediaKind::Video, Focus::Performance),
            "video-performance"
        );
    }
}
