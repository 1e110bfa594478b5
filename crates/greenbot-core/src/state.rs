//! UI-agnostic conversation state types
//!
//! These are the values the presentation layer reads back from the
//! orchestrators. They don't depend on any specific UI framework.

use serde::{Deserialize, Serialize};

/// One turn in the conversation log
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub text: String,
    /// Embedded image as a `data:<mime>;base64,<payload>` URI
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
}

impl Message {
    pub fn user(text: impl Into<String>, image: Option<String>) -> Self {
        Self {
            role: Role::User,
            text: text.into(),
            image,
        }
    }

    pub fn model(text: impl Into<String>) -> Self {
        Self {
            role: Role::Model,
            text: text.into(),
            image: None,
        }
    }

    pub fn error(text: impl Into<String>) -> Self {
        Self {
            role: Role::Error,
            text: text.into(),
            image: None,
        }
    }
}

/// Who produced a message. `Error` marks a failed exchange, not a third party.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Model,
    Error,
}

/// Result of handing an input event to an orchestrator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitOutcome {
    /// The request was issued
    Accepted,
    /// A request is already in flight; nothing changed
    Busy,
    /// Nothing to send (blank text and no staged image, or blank prompt)
    Empty,
}

impl SubmitOutcome {
    pub fn is_accepted(&self) -> bool {
        matches!(self, SubmitOutcome::Accepted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_serializes_lowercase() {
        let msg = Message::model("hi");
        let json = serde_json::to_string(&msg).unwrap();
        assert_eq!(json, r#"{"role":"model","text":"hi"}"#);
    }

    #[test]
    fn test_user_message_keeps_image() {
        let msg = Message::user("", Some("data:image/png;base64,AAAA".to_string()));
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["role"], "user");
        assert_eq!(json["image"], "data:image/png;base64,AAAA");
    }
}
