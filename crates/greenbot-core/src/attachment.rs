//! Image attachment staging
//!
//! Turns a user-selected file into the two forms the rest of the core needs:
//! a displayable data URI (preview + the User message) and raw bytes with a
//! MIME type (the completion call). Picker and drop sources share one filter:
//! only `image/*` types are staged.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use std::fmt;
use std::path::Path;

use crate::error::AttachmentError;

/// Where a staged file came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttachmentSource {
    /// Chosen through the attach prompt
    Picker,
    /// Pasted or dropped onto the terminal
    Drop,
}

impl fmt::Display for AttachmentSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttachmentSource::Picker => f.write_str("picker"),
            AttachmentSource::Drop => f.write_str("drop"),
        }
    }
}

/// Raw image bytes plus MIME type, as sent to the Completion Service
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImagePayload {
    pub bytes: Vec<u8>,
    pub mime_type: String,
}

impl ImagePayload {
    pub fn base64(&self) -> String {
        BASE64.encode(&self.bytes)
    }
}

/// The single image attached to the pending input
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagedImage {
    payload: ImagePayload,
    data_uri: String,
    file_name: Option<String>,
}

impl StagedImage {
    pub fn new(bytes: Vec<u8>, mime_type: impl Into<String>) -> Self {
        let mime_type = mime_type.into();
        let data_uri = encode_data_uri(&mime_type, &bytes);
        Self {
            payload: ImagePayload { bytes, mime_type },
            data_uri,
            file_name: None,
        }
    }

    pub fn with_file_name(mut self, name: impl Into<String>) -> Self {
        self.file_name = Some(name.into());
        self
    }

    pub fn payload(&self) -> &ImagePayload {
        &self.payload
    }

    pub fn data_uri(&self) -> &str {
        &self.data_uri
    }

    pub fn mime_type(&self) -> &str {
        &self.payload.mime_type
    }

    pub fn file_name(&self) -> Option<&str> {
        self.file_name.as_deref()
    }

    pub fn size(&self) -> usize {
        self.payload.bytes.len()
    }
}

/// Read a file and stage it if it is an image.
pub async fn stage_from_path(
    path: &Path,
    source: AttachmentSource,
) -> Result<StagedImage, AttachmentError> {
    let bytes = tokio::fs::read(path)
        .await
        .map_err(|source| AttachmentError::Read {
            path: path.to_path_buf(),
            source,
        })?;

    let mime = detect_mime(path, &bytes).ok_or_else(|| AttachmentError::UnknownType {
        path: path.to_path_buf(),
    })?;

    if !is_image_mime(mime) {
        return Err(AttachmentError::NotAnImage {
            mime: mime.to_string(),
        });
    }

    tracing::debug!(path = %path.display(), %source, mime, size = bytes.len(), "staged image");

    let mut staged = StagedImage::new(bytes, mime);
    if let Some(name) = path.file_name().and_then(|n| n.to_str()) {
        staged = staged.with_file_name(name);
    }
    Ok(staged)
}

pub fn is_image_mime(mime: &str) -> bool {
    mime.starts_with("image/")
}

/// Sniff the content first, then fall back to the file extension
fn detect_mime(path: &Path, bytes: &[u8]) -> Option<&'static str> {
    if let Ok(format) = image::guess_format(bytes) {
        return Some(format.to_mime_type());
    }
    mime_for_path(path)
}

fn mime_for_path(path: &Path) -> Option<&'static str> {
    let ext = path
        .extension()
        .and_then(|value| value.to_str())
        .map(|value| value.to_ascii_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "png" => Some("image/png"),
        "jpg" | "jpeg" => Some("image/jpeg"),
        "webp" => Some("image/webp"),
        "gif" => Some("image/gif"),
        "heic" => Some("image/heic"),
        "heif" => Some("image/heif"),
        "pdf" => Some("application/pdf"),
        "txt" | "md" => Some("text/plain"),
        "json" => Some("application/json"),
        _ => None,
    }
}

pub fn encode_data_uri(mime: &str, bytes: &[u8]) -> String {
    format!("data:{};base64,{}", mime, BASE64.encode(bytes))
}

/// Split a base64 data URI back into MIME type and bytes
pub fn parse_data_uri(uri: &str) -> Option<(String, Vec<u8>)> {
    let rest = uri.strip_prefix("data:")?;
    let (header, data) = rest.split_once(',')?;
    let mime = header.strip_suffix(";base64")?;
    let bytes = BASE64.decode(data.as_bytes()).ok()?;
    Some((mime.to_string(), bytes))
}
