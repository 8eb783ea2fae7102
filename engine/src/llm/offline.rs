use super::{CompletionRequest, CompletionService};
use async_trait::async_trait;
use sdk::errors::Result;

/// Deterministic local responder used when no completion backend is configured
#[derive(Debug, Default)]
pub struct OfflineCompletion;

impl OfflineCompletion {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl CompletionService for OfflineCompletion {
    fn name(&self) -> &str {
        "offline"
    }

    async fn complete(&self, request: CompletionRequest) -> Result<String> {
        let reply = match request.last_user_message() {
            Some(text) => format!(
                "I'm running offline, so I can't act on that yet. You said: \"{}\"",
                text.trim()
            ),
            None => "I'm running offline. Ask me something to get started.".to_string(),
        };
        Ok(reply)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sdk::engine::{Message, Role};

    #[tokio::test]
    async fn test_echoes_last_user_message() {
        let request = CompletionRequest::new(
            "any",
            &[
                Message::new(Role::User, "old"),
                Message::new(Role::User, " add eggs "),
            ],
        );
        let reply = OfflineCompletion::new().complete(request).await.unwrap();
        assert!(reply.contains("\"add eggs\""));
    }

    #[tokio::test]
    async fn test_no_user_message() {
        let request = CompletionRequest::new("any", &[Message::new(Role::System, "seed")]);
        let reply = OfflineCompletion::new().complete(request).await.unwrap();
        assert!(reply.contains("offline"));
    }
}
