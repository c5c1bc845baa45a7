use std::path::{Path, PathBuf};

use serde::Serialize;
use sha2::{Digest, Sha256};
use thiserror::Error;
use uuid::Uuid;

use crate::core::config::Settings;

#[derive(Debug, Error)]
pub(crate) enum UploadError {
    #[error("File must have an extension")]
    MissingExtension,
    #[error("File extension '{0}' is not allowed")]
    ExtensionNotAllowed(String),
    #[error("MIME type '{mime}' does not match extension '.{extension}'")]
    MimeMismatch { mime: String, extension: String },
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum UploadCategory {
    Lectures,
    Exams,
    AnswerKeys,
    Submissions,
}

impl UploadCategory {
    pub(crate) fn as_str(self) -> &'static str {
        match self {
            UploadCategory::Lectures => "lectures",
            UploadCategory::Exams => "exams",
            UploadCategory::AnswerKeys => "answer_keys",
            UploadCategory::Submissions => "submissions",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub(crate) struct StoredUpload {
    pub(crate) path: PathBuf,
    pub(crate) original_filename: String,
    pub(crate) size: u64,
    pub(crate) sha256: String,
}

/// Local upload directory, one subdirectory per category.
#[derive(Debug, Clone)]
pub(crate) struct UploadStore {
    root: PathBuf,
}

impl UploadStore {
    pub(crate) fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub(crate) fn from_settings(settings: &Settings) -> Self {
        Self::new(&settings.storage().upload_dir)
    }

    pub(crate) fn root(&self) -> &Path {
        &self.root
    }

    pub(crate) async fn store(
        &self,
        category: UploadCategory,
        original_filename: &str,
        bytes: &[u8],
    ) -> Result<StoredUpload, UploadError> {
        let dir = self.root.join(category.as_str());
        tokio::fs::create_dir_all(&dir).await?;

        let filename = format!("{}_{}", Uuid::new_v4(), sanitized_filename(original_filename));
        let path = dir.join(filename);
        tokio::fs::write(&path, bytes).await?;

        let sha256 = hex::encode(Sha256::digest(bytes));
        tracing::debug!(
            path = %path.display(),
            size = bytes.len(),
            sha256 = %sha256,
            "Upload stored"
        );

        Ok(StoredUpload {
            path,
            original_filename: original_filename.to_string(),
            size: bytes.len() as u64,
            sha256,
        })
    }

    /// Checks that the upload directory exists or can be created.
    pub(crate) async fn health(&self) -> Result<(), std::io::Error> {
        tokio::fs::create_dir_all(&self.root).await?;
        let metadata = tokio::fs::metadata(&self.root).await?;
        if metadata.permissions().readonly() {
            return Err(std::io::Error::new(
                std::io::ErrorKind::PermissionDenied,
                "upload directory is read-only",
            ));
        }
        Ok(())
    }
}

pub(crate) fn sanitized_filename(raw: &str) -> String {
    let base = raw.rsplit(|c: char| c == '/' || c == '\\').next().unwrap_or(raw);
    let cleaned: String = base
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'))
        .collect();
    let cleaned = cleaned.trim_start_matches('.');

    if cleaned.is_empty() {
        "upload".to_string()
    } else {
        cleaned.to_string()
    }
}

pub(crate) fn validate_upload(
    filename: &str,
    content_type: &str,
    allowed_extensions: &[String],
) -> Result<(), UploadError> {
    let extension = Path::new(filename)
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_ascii_lowercase())
        .ok_or(UploadError::MissingExtension)?;

    if !allowed_extensions.iter().any(|allowed| allowed == &extension) {
        return Err(UploadError::ExtensionNotAllowed(extension));
    }

    let mime = content_type.trim().to_ascii_lowercase();
    if mime_allowed_for_extension(&mime, &extension) {
        Ok(())
    } else {
        Err(UploadError::MimeMismatch { mime, extension })
    }
}

fn mime_allowed_for_extension(mime: &str, extension: &str) -> bool {
    match extension {
        "pdf" => matches!(mime, "application/pdf" | "application/x-pdf"),
        "jpg" | "jpeg" => matches!(mime, "image/jpeg" | "image/jpg"),
        "png" => mime == "image/png",
        _ => false,
    }
}
