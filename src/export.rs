//! Conversation export payloads and the file-save collaborator
//!
//! The controller never interprets exported bytes; it hands the payload to an
//! [`ExportSink`], which decides where the file ends up.

use crate::error::{RecallError, Result};
use crate::models::ConversationId;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Export formats offered by the service
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    /// Structured JSON document
    #[default]
    Json,
    /// Rendered PDF
    Pdf,
    /// Markdown transcript
    Markdown,
}

impl ExportFormat {
    /// Value of the `format` query parameter
    pub fn as_query(&self) -> &'static str {
        match self {
            Self::Json => "json",
            Self::Pdf => "pdf",
            Self::Markdown => "markdown",
        }
    }

    /// File extension used by the service's attachment names
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Json => "json",
            Self::Pdf => "pdf",
            Self::Markdown => "md",
        }
    }

    /// Default file name for a conversation export
    ///
    /// # Examples
    ///
    /// ```
    /// use recallai::export::ExportFormat;
    /// use recallai::models::ConversationId;
    ///
    /// let id = ConversationId::new("abc");
    /// assert_eq!(ExportFormat::Markdown.file_name(&id), "conversation_abc.md");
    /// ```
    pub fn file_name(&self, id: &ConversationId) -> String {
        format!("conversation_{}.{}", id, self.extension())
    }
}

impl fmt::Display for ExportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_query())
    }
}

impl FromStr for ExportFormat {
    type Err = RecallError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "json" => Ok(Self::Json),
            "pdf" => Ok(Self::Pdf),
            "markdown" | "md" => Ok(Self::Markdown),
            other => Err(RecallError::InvalidInput(format!(
                "Unknown export format: {}. Must be one of: json, pdf, markdown",
                other
            ))),
        }
    }
}

/// Opaque export body plus the metadata needed to save it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportPayload {
    /// Requested format
    pub format: ExportFormat,
    /// Suggested file name
    pub file_name: String,
    /// Content type reported by the service, if any
    pub content_type: Option<String>,
    /// Raw body
    pub data: Bytes,
}

/// File-save collaborator for exports
pub trait ExportSink: Send + Sync {
    /// Persist the payload, returning where it was written
    fn save(&self, payload: &ExportPayload) -> Result<PathBuf>;
}

/// Writes exports into a directory on the local filesystem
#[derive(Debug, Clone)]
pub struct FsExportSink {
    dir: PathBuf,
}

impl FsExportSink {
    /// Create a sink rooted at `dir`
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Sink rooted at the user's download directory, falling back to the
    /// current directory when the platform has none.
    pub fn downloads() -> Self {
        let dir = directories::UserDirs::new()
            .and_then(|dirs| dirs.download_dir().map(Path::to_path_buf))
            .unwrap_or_else(|| PathBuf::from("."));
        Self::new(dir)
    }

    /// Directory exports are written into
    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

impl ExportSink for FsExportSink {
    fn save(&self, payload: &ExportPayload) -> Result<PathBuf> {
        // Server-provided names must not escape the target directory.
        let name = Path::new(&payload.file_name)
            .file_name()
            .ok_or_else(|| {
                RecallError::InvalidInput(format!("Invalid export file name: {}", payload.file_name))
            })?
            .to_owned();

        std::fs::create_dir_all(&self.dir)?;
        let path = self.dir.join(name);
        std::fs::write(&path, &payload.data)?;
        tracing::info!(path = %path.display(), bytes = payload.data.len(), "Saved export");
        Ok(path)
    }
}
