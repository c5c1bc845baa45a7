use std::collections::HashMap;

use axum::extract::Multipart;

use crate::api::errors::ApiError;
use crate::services::document_parse::UploadedDocument;

/// A multipart body with one `file` part and any number of text fields.
#[derive(Debug, Default)]
pub(crate) struct UploadForm {
    file: Option<UploadedDocument>,
    fields: HashMap<String, String>,
}

impl UploadForm {
    pub(crate) async fn read(
        multipart: &mut Multipart,
        max_upload_size_mb: u64,
    ) -> Result<Self, ApiError> {
        let max_bytes = max_upload_size_mb * 1024 * 1024;
        let mut form = UploadForm::default();

        while let Some(mut field) = multipart
            .next_field()
            .await
            .map_err(|_| ApiError::BadRequest("Invalid multipart data".to_string()))?
        {
            let name = field.name().unwrap_or("").to_string();
            if name == "file" {
                let filename = field.file_name().unwrap_or("upload").to_string();
                let content_type =
                    field.content_type().unwrap_or("application/octet-stream").to_string();
                let mut bytes = Vec::new();
                while let Some(chunk) = field
                    .chunk()
                    .await
                    .map_err(|_| ApiError::BadRequest("Failed to read file".to_string()))?
                {
                    let next_size = bytes.len() as u64 + chunk.len() as u64;
                    if next_size > max_bytes {
                        return Err(ApiError::BadRequest(format!(
                            "File size exceeds {max_upload_size_mb}MB limit"
                        )));
                    }
                    bytes.extend_from_slice(&chunk);
                }
                form.file = Some(UploadedDocument { filename, content_type, bytes });
            } else if !name.is_empty() {
                let text = field
                    .text()
                    .await
                    .map_err(|_| ApiError::BadRequest(format!("Invalid value for '{name}'")))?;
                form.fields.insert(name, text);
            }
        }

        Ok(form)
    }

    /// Non-blank text field value, trimmed.
    pub(crate) fn field(&self, name: &str) -> Option<&str> {
        self.fields.get(name).map(|value| value.trim()).filter(|value| !value.is_empty())
    }

    pub(crate) fn take_file(&mut self) -> Result<UploadedDocument, ApiError> {
        let file =
            self.file.take().ok_or_else(|| ApiError::BadRequest("File is required".to_string()))?;
        if file.bytes.is_empty() {
            return Err(ApiError::BadRequest("Uploaded file is empty".to_string()));
        }
        Ok(file)
    }
}
