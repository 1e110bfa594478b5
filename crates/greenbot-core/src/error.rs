//! Error types for the GreenBot core.
//!
//! Service failures are never shown verbatim to the user. The orchestrators
//! log the cause and substitute one of the fixed messages below.

use std::path::PathBuf;
use thiserror::Error;

/// Shown in the conversation log when a completion call fails
pub const COMPLETION_FAILED_MESSAGE: &str =
    "Failed to get a response from the AI. Please check your API key and network connection.";

/// Shown in the generation session when an image generation call fails
pub const GENERATION_FAILED_MESSAGE: &str =
    "Failed to generate image. Please check your API key and prompt.";

/// Errors that halt the core before any orchestrator exists.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("No API key configured")]
    CredentialMissing,
    #[error("Configuration error: {0}")]
    Config(#[from] anyhow::Error),
}

/// Failure of a Completion or Image Generation Service call.
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("Request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("{service} API error {status}: {body}")]
    Api {
        service: &'static str,
        status: u16,
        body: String,
    },
    #[error("Invalid response: {0}")]
    InvalidResponse(String),
    #[error("No image was generated.")]
    EmptyGenerationResult,
    #[error("Service call did not complete: {0}")]
    Unavailable(String),
}

/// Errors raised while staging an image attachment.
#[derive(Debug, Error)]
pub enum AttachmentError {
    #[error("Failed to read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Not an image ({mime})")]
    NotAnImage { mime: String },
    #[error("Unrecognized file type: {}", path.display())]
    UnknownType { path: PathBuf },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_generation_display() {
        assert_eq!(
            ServiceError::EmptyGenerationResult.to_string(),
            "No image was generated."
        );
    }

    #[test]
    fn test_api_error_display() {
        let err = ServiceError::Api {
            service: "Gemini",
            status: 429,
            body: "quota exceeded".to_string(),
        };
        assert_eq!(err.to_string(), "Gemini API error 429: quota exceeded");
    }

    #[test]
    fn test_not_an_image_display() {
        let err = AttachmentError::NotAnImage {
            mime: "application/pdf".to_string(),
        };
        assert_eq!(err.to_string(), "Not an image (application/pdf)");
    }
}
