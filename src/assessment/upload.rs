use actix_multipart::Multipart;
use actix_web::HttpResponse;
use futures_util::StreamExt;
use log::warn;
use sanitize_filename::sanitize;

use crate::ErrorResponse;

/// OpenAPI shape of the upload form: one or more `file` parts.
#[derive(Debug, serde::Deserialize, utoipa::ToSchema)]
pub struct UploadDocumentsForm {
    #[allow(unused)]
    pub file: Vec<u8>,
}

/// One uploaded file: contents and sanitised file name.
#[derive(Debug)]
pub struct UploadedFile {
    pub file_name: String,
    pub contents: Vec<u8>,
}

#[derive(Debug, thiserror::Error)]
pub enum UploadParseError {
    #[error("Multipart field error: {0}")]
    FieldError(String),
    #[error("IO error: {0}")]
    IoError(String),
    #[error("No files found in multipart payload")]
    NoFiles,
}

impl From<UploadParseError> for HttpResponse {
    fn from(error: UploadParseError) -> Self {
        match error {
            UploadParseError::FieldError(_) | UploadParseError::NoFiles => {
                HttpResponse::BadRequest().json(ErrorResponse::bad_request(&format!("{}", error)))
            }
            UploadParseError::IoError(_) => HttpResponse::InternalServerError()
                .json(ErrorResponse::internal_error(&format!("{}", error))),
        }
    }
}

/// Collect every `file`/`files` field of a multipart upload.
pub async fn parse_document_uploads(
    mut multipart: Multipart,
) -> Result<Vec<UploadedFile>, UploadParseError> {
    let mut files = Vec::new();

    while let Some(item) = multipart.next().await {
        let mut field = item.map_err(|e| UploadParseError::FieldError(e.to_string()))?;
        let content_disposition = field
            .content_disposition()
            .ok_or_else(|| UploadParseError::FieldError("Content disposition not found".to_string()))?;
        let field_name = content_disposition
            .get_name()
            .ok_or_else(|| UploadParseError::FieldError("Field name not found".to_string()))?
            .to_string();

        if field_name != "file" && field_name != "files" {
            warn!("Ignoring unexpected multipart field '{}'", field_name);
            continue;
        }

        let file_name = content_disposition
            .get_filename()
            .map(sanitize)
            .filter(|name| !name.is_empty())
            .ok_or_else(|| UploadParseError::FieldError("No filename in file field".to_string()))?;

        let mut contents = Vec::new();
        while let Some(chunk) = field.next().await {
            let chunk_data = chunk.map_err(|e| UploadParseError::IoError(e.to_string()))?;
            contents.extend_from_slice(&chunk_data);
        }

        files.push(UploadedFile {
            file_name,
            contents,
        });
    }

    if files.is_empty() {
        return Err(UploadParseError::NoFiles);
    }
    Ok(files)
}
