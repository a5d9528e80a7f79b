use std::path::Path;

use crate::api::errors::ApiError;

const PDF_MAGIC: &[u8] = b"%PDF";

/// Accepts a PDF upload by extension, declared MIME type and file signature.
pub(crate) fn validate_pdf_upload(
    filename: &str,
    content_type: &str,
    bytes: &[u8],
) -> Result<(), ApiError> {
    let extension = Path::new(filename)
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_ascii_lowercase())
        .ok_or_else(|| ApiError::BadRequest("File must have a .pdf extension".to_string()))?;
    if extension != "pdf" {
        return Err(ApiError::BadRequest(format!("File extension '{extension}' is not allowed")));
    }

    let mime = content_type.split(';').next().unwrap_or("").trim().to_ascii_lowercase();
    if mime != "application/pdf" {
        return Err(ApiError::BadRequest(format!("MIME type '{mime}' is not a PDF")));
    }

    if bytes.is_empty() {
        return Err(ApiError::BadRequest("File is empty".to_string()));
    }
    if !bytes.starts_with(PDF_MAGIC) {
        return Err(ApiError::BadRequest("File content is not a PDF document".to_string()));
    }
    Ok(())
}

/// Keeps only characters that are safe to echo back and log.
pub(crate) fn sanitized_filename(filename: &str) -> String {
    let name = Path::new(filename)
        .file_name()
        .and_then(|name| name.to_str())
        .unwrap_or("upload.pdf");
    let cleaned: String = name
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') { c } else { '_' })
        .collect();
    if cleaned.trim_matches('_').is_empty() {
        "upload.pdf".to_string()
    } else {
        cleaned
    }
}
