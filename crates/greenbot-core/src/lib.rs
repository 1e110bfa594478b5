pub mod ai;
pub mod assistant;
pub mod attachment;
pub mod config;
pub mod conversation;
pub mod credential;
pub mod error;
pub mod generation;
pub mod notify;
pub mod state;

// Re-export main types for convenience
pub use ai::{CompletionService, GeminiClient, ImageGenerationService, ImagenClient, SYSTEM_INSTRUCTION};
pub use assistant::Assistant;
pub use attachment::{AttachmentSource, StagedImage};
pub use config::Config;
pub use conversation::{ConversationOrchestrator, ConversationState, GREETING};
pub use credential::{
    resolve_credential, ConfigCredentialStore, CredentialSource, CredentialStore,
    MemoryCredentialStore,
};
pub use error::{AttachmentError, CoreError, ServiceError};
pub use generation::{GeneratedImage, GenerationSession, GenerationStatus, ImageGenerationOrchestrator};
pub use notify::ChangeNotifier;
pub use state::{Message, Role, SubmitOutcome};
