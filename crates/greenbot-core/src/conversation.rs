//! Conversation Orchestrator
//!
//! Owns the append-only message log, the staged image and the single
//! in-flight completion request. The service call runs on a spawned task;
//! the owner calls `poll` (or `settle`) to fold the reply back into the log.
//!
//! Each call sends only the current prompt and image. Earlier turns are
//! displayed but never replayed to the service.

use std::sync::Arc;

use crate::ai::{CompletionService, SYSTEM_INSTRUCTION};
use crate::attachment::StagedImage;
use crate::error::{ServiceError, COMPLETION_FAILED_MESSAGE};
use crate::notify::{ChangeNotifier, InFlight};
use crate::state::{Message, SubmitOutcome};

pub const GREETING: &str =
    "Hello! I'm GreenBot. How can I help you today? You can also upload an image.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConversationState {
    Idle,
    Awaiting,
}

pub struct ConversationOrchestrator {
    service: Arc<dyn CompletionService>,
    system_instruction: String,
    messages: Vec<Message>,
    staged_image: Option<StagedImage>,
    in_flight: Option<InFlight<String>>,
    notifier: ChangeNotifier,
}

impl ConversationOrchestrator {
    pub fn new(service: Arc<dyn CompletionService>, notifier: ChangeNotifier) -> Self {
        Self {
            service,
            system_instruction: SYSTEM_INSTRUCTION.to_string(),
            messages: vec![Message::model(GREETING)],
            staged_image: None,
            in_flight: None,
            notifier,
        }
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn staged_image(&self) -> Option<&StagedImage> {
        self.staged_image.as_ref()
    }

    pub fn state(&self) -> ConversationState {
        if self.in_flight.is_some() {
            ConversationState::Awaiting
        } else {
            ConversationState::Idle
        }
    }

    pub fn is_busy(&self) -> bool {
        self.state() == ConversationState::Awaiting
    }

    /// Whether `submit_message(text)` would be accepted right now
    pub fn can_submit(&self, text: &str) -> bool {
        !self.is_busy() && (!text.trim().is_empty() || self.staged_image.is_some())
    }

    /// Stage an image, replacing any previously staged one.
    pub fn stage_image(&mut self, image: StagedImage) {
        self.staged_image = Some(image);
        self.notifier.notify();
    }

    pub fn clear_staged_image(&mut self) {
        if self.staged_image.take().is_some() {
            self.notifier.notify();
        }
    }

    /// Send `text` plus the staged image, if any.
    ///
    /// On acceptance the User message is appended and the staged image is
    /// consumed before the service call is issued.
    pub fn submit_message(&mut self, text: &str) -> SubmitOutcome {
        if self.is_busy() {
            return SubmitOutcome::Busy;
        }
        if text.trim().is_empty() && self.staged_image.is_none() {
            return SubmitOutcome::Empty;
        }

        let image = self.staged_image.take();
        self.messages.push(Message::user(
            text,
            image.as_ref().map(|img| img.data_uri().to_string()),
        ));

        let service = Arc::clone(&self.service);
        let system_instruction = self.system_instruction.clone();
        let prompt = text.to_string();
        let payload = image.map(|img| img.payload().clone());

        self.in_flight = Some(InFlight::spawn(&self.notifier, async move {
            match payload {
                Some(payload) => {
                    service
                        .complete_with_image(&prompt, &payload, &system_instruction)
                        .await
                }
                None => service.complete(&prompt, &system_instruction).await,
            }
        }));

        tracing::info!(messages = self.messages.len(), "completion request sent");
        self.notifier.notify();
        SubmitOutcome::Accepted
    }

    /// Apply a finished reply without waiting. Returns true if the log changed.
    pub async fn poll(&mut self) -> bool {
        let Some(outcome) = self.in_flight.as_mut().and_then(InFlight::try_take) else {
            return false;
        };
        self.in_flight = None;
        self.apply(outcome);
        true
    }

    /// Wait for the in-flight reply, if any, and append it to the log.
    pub async fn settle(&mut self) -> bool {
        let Some(call) = self.in_flight.take() else {
            return false;
        };
        let outcome = call.wait().await;
        self.apply(outcome);
        true
    }

    fn apply(&mut self, outcome: Result<String, ServiceError>) {
        match outcome {
            Ok(text) => self.messages.push(Message::model(text)),
            Err(e) => {
                tracing::error!(error = %e, "completion request failed");
                self.messages.push(Message::error(COMPLETION_FAILED_MESSAGE));
            }
        }
        self.notifier.notify();
    }
}
