use std::sync::Arc;
use tokio::sync::watch;

use crate::ai::{CompletionService, GeminiClient, ImageGenerationService, ImagenClient};
use crate::config::Config;
use crate::conversation::ConversationOrchestrator;
use crate::error::CoreError;
use crate::generation::ImageGenerationOrchestrator;
use crate::notify::ChangeNotifier;

/// Both orchestrators, wired to services built from one credential.
///
/// There is no way to get an `Assistant` without a credential; swapping the
/// key means connecting a new one.
pub struct Assistant {
    pub conversation: ConversationOrchestrator,
    pub generation: ImageGenerationOrchestrator,
    notifier: ChangeNotifier,
}

impl Assistant {
    pub fn connect(credential: Option<&str>, config: &Config) -> Result<Self, CoreError> {
        let key = credential
            .map(str::trim)
            .filter(|key| !key.is_empty())
            .ok_or(CoreError::CredentialMissing)?;

        let api_base = config.api_base();
        let completion = GeminiClient::new(key)
            .with_api_base(&api_base)
            .with_model(config.chat_model());
        let images = ImagenClient::new(key)
            .with_api_base(&api_base)
            .with_model(config.image_model());

        tracing::info!(
            chat_model = completion.model(),
            image_model = images.model(),
            "connected"
        );
        Ok(Self::with_services(Arc::new(completion), Arc::new(images)))
    }

    pub fn with_services(
        completion: Arc<dyn CompletionService>,
        images: Arc<dyn ImageGenerationService>,
    ) -> Self {
        let notifier = ChangeNotifier::new();
        Self {
            conversation: ConversationOrchestrator::new(completion, notifier.clone()),
            generation: ImageGenerationOrchestrator::new(images, notifier.clone()),
            notifier,
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.notifier.subscribe()
    }

    /// Fold in any finished service calls. Returns true if anything changed.
    pub async fn poll(&mut self) -> bool {
        let chat = self.conversation.poll().await;
        let image = self.generation.poll().await;
        chat || image
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attachment::ImagePayload;
    use crate::error::ServiceError;
    use crate::generation::GeneratedImage;
    use async_trait::async_trait;

    struct Echo;

    #[async_trait]
    impl CompletionService for Echo {
        async fn complete(&self, prompt: &str, _: &str) -> Result<String, ServiceError> {
            Ok(format!("echo: {prompt}"))
        }

        async fn complete_with_image(
            &self,
            prompt: &str,
            _: &ImagePayload,
            _: &str,
        ) -> Result<String, ServiceError> {
            Ok(format!("echo+image: {prompt}"))
        }
    }

    struct NoImages;

    #[async_trait]
    impl ImageGenerationService for NoImages {
        async fn generate(&self, _: &str) -> Result<GeneratedImage, ServiceError> {
            Err(ServiceError::EmptyGenerationResult)
        }
    }

    #[test]
    fn test_missing_credential_blocks() {
        let config = Config::new();
        assert!(matches!(
            Assistant::connect(None, &config),
            Err(CoreError::CredentialMissing)
        ));
        assert!(matches!(
            Assistant::connect(Some("   "), &config),
            Err(CoreError::CredentialMissing)
        ));
    }

    #[tokio::test]
    async fn test_connect_with_credential() {
        let assistant = Assistant::connect(Some("key"), &Config::new()).unwrap();
        assert_eq!(assistant.conversation.messages().len(), 1);
        assert!(!assistant.generation.is_busy());
    }

    #[tokio::test]
    async fn test_orchestrators_share_notifications() {
        let mut assistant = Assistant::with_services(Arc::new(Echo), Arc::new(NoImages));
        let mut rx = assistant.subscribe();

        assistant.conversation.submit_message("ping");
        assert!(rx.has_changed().unwrap());
        rx.borrow_and_update();

        assistant.generation.submit_generation_prompt("cube");
        assert!(rx.has_changed().unwrap());

        assistant.conversation.settle().await;
        assistant.generation.settle().await;
        assert!(!assistant.poll().await);
        assert_eq!(assistant.conversation.messages()[2].text, "echo: ping");
        assert!(assistant.generation.session().error().is_some());
    }
}
