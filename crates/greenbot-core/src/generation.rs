//! Image-Generation Orchestrator
//!
//! A single-slot session: one prompt, one status, one result or error.
//! It keeps no history; a new prompt replaces whatever was shown before.

use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::ai::ImageGenerationService;
use crate::attachment::encode_data_uri;
use crate::error::{ServiceError, GENERATION_FAILED_MESSAGE};
use crate::notify::{ChangeNotifier, InFlight};
use crate::state::SubmitOutcome;

/// An image returned by the Image Generation Service
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedImage {
    bytes: Vec<u8>,
    mime_type: String,
    created_at: DateTime<Utc>,
}

impl GeneratedImage {
    pub fn new(bytes: Vec<u8>, mime_type: impl Into<String>, created_at: DateTime<Utc>) -> Self {
        Self {
            bytes,
            mime_type: mime_type.into(),
            created_at,
        }
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn mime_type(&self) -> &str {
        &self.mime_type
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn data_uri(&self) -> String {
        encode_data_uri(&self.mime_type, &self.bytes)
    }

    /// Download name, unique per generation via its timestamp
    pub fn file_name(&self) -> String {
        let ext = match self.mime_type.as_str() {
            "image/jpeg" => "jpg",
            "image/webp" => "webp",
            _ => "png",
        };
        format!(
            "greenbot-generated-{}.{}",
            self.created_at.timestamp_millis(),
            ext
        )
    }

    /// Write the image into `dir` under its download name
    pub async fn save_to(&self, dir: &Path) -> std::io::Result<PathBuf> {
        tokio::fs::create_dir_all(dir).await?;
        let path = dir.join(self.file_name());
        tokio::fs::write(&path, &self.bytes).await?;
        tracing::info!(path = %path.display(), "saved generated image");
        Ok(path)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum GenerationStatus {
    #[default]
    Idle,
    Generating,
    Succeeded(GeneratedImage),
    Failed(String),
}

#[derive(Debug, Clone, Default)]
pub struct GenerationSession {
    prompt: String,
    status: GenerationStatus,
}

impl GenerationSession {
    pub fn prompt(&self) -> &str {
        &self.prompt
    }

    pub fn status(&self) -> &GenerationStatus {
        &self.status
    }

    pub fn is_generating(&self) -> bool {
        matches!(self.status, GenerationStatus::Generating)
    }

    pub fn result(&self) -> Option<&GeneratedImage> {
        match &self.status {
            GenerationStatus::Succeeded(image) => Some(image),
            _ => None,
        }
    }

    pub fn error(&self) -> Option<&str> {
        match &self.status {
            GenerationStatus::Failed(message) => Some(message),
            _ => None,
        }
    }
}

pub struct ImageGenerationOrchestrator {
    service: Arc<dyn ImageGenerationService>,
    session: GenerationSession,
    in_flight: Option<InFlight<GeneratedImage>>,
    notifier: ChangeNotifier,
}

impl ImageGenerationOrchestrator {
    pub fn new(service: Arc<dyn ImageGenerationService>, notifier: ChangeNotifier) -> Self {
        Self {
            service,
            session: GenerationSession::default(),
            in_flight: None,
            notifier,
        }
    }

    pub fn session(&self) -> &GenerationSession {
        &self.session
    }

    pub fn is_busy(&self) -> bool {
        self.in_flight.is_some()
    }

    pub fn submit_generation_prompt(&mut self, prompt: &str) -> SubmitOutcome {
        if self.is_busy() {
            return SubmitOutcome::Busy;
        }
        if prompt.trim().is_empty() {
            return SubmitOutcome::Empty;
        }

        self.session = GenerationSession {
            prompt: prompt.to_string(),
            status: GenerationStatus::Generating,
        };

        let service = Arc::clone(&self.service);
        let prompt = prompt.to_string();
        self.in_flight = Some(InFlight::spawn(&self.notifier, async move {
            service.generate(&prompt).await
        }));

        tracing::info!("image generation started");
        self.notifier.notify();
        SubmitOutcome::Accepted
    }

    /// Apply a finished generation without waiting. Returns true if state changed.
    pub async fn poll(&mut self) -> bool {
        let Some(outcome) = self.in_flight.as_mut().and_then(InFlight::try_take) else {
            return false;
        };
        self.in_flight = None;
        self.apply(outcome);
        true
    }

    /// Wait for the in-flight generation, if any, and apply its outcome.
    pub async fn settle(&mut self) -> bool {
        let Some(call) = self.in_flight.take() else {
            return false;
        };
        let outcome = call.wait().await;
        self.apply(outcome);
        true
    }

    fn apply(&mut self, outcome: Result<GeneratedImage, ServiceError>) {
        self.session.status = match outcome {
            Ok(image) => {
                tracing::info!(size = image.bytes().len(), "image generation succeeded");
                GenerationStatus::Succeeded(image)
            }
            Err(e) => {
                tracing::error!(error = %e, "image generation failed");
                GenerationStatus::Failed(GENERATION_FAILED_MESSAGE.to_string())
            }
        };
        self.notifier.notify();
    }
}
