//! Completion provider abstraction
//!
//! The local conversation engine turns its parsed conversation into a
//! [`CompletionRequest`] and asks a [`CompletionService`] for the assistant's
//! reply. Two providers ship with the engine: an HTTP backend and an offline
//! responder that never touches the network.

use async_trait::async_trait;
use sdk::engine::{Message, Role};
use sdk::errors::Result;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::config::{CompletionConfig, CompletionProvider};

pub mod http;
pub mod offline;

pub use http::HttpCompletionService;
pub use offline::OfflineCompletion;

/// One message as sent to a completion backend
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletionMessage {
    pub role: String,
    pub content: String,
}

impl From<&Message> for CompletionMessage {
    fn from(message: &Message) -> Self {
        Self {
            role: message.role.as_str().to_string(),
            content: message.content.clone(),
        }
    }
}

/// Request for the next assistant reply
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletionRequest {
    pub model: String,
    pub messages: Vec<CompletionMessage>,
}

impl CompletionRequest {
    pub fn new(model: impl Into<String>, messages: &[Message]) -> Self {
        Self {
            model: model.into(),
            messages: messages.iter().map(CompletionMessage::from).collect(),
        }
    }

    /// Content of the most recent user message, if any
    pub fn last_user_message(&self) -> Option<&str> {
        self.messages
            .iter()
            .rev()
            .find(|m| m.role == Role::User.as_str())
            .map(|m| m.content.as_str())
    }
}

/// Completion backend trait that all providers implement
#[async_trait]
pub trait CompletionService: Send + Sync {
    /// Returns the name of the provider (e.g., "http", "offline")
    fn name(&self) -> &str;

    /// Produce the assistant reply for the conversation so far
    async fn complete(&self, request: CompletionRequest) -> Result<String>;
}

/// Build the provider selected in config
pub fn from_config(config: &CompletionConfig) -> Result<Arc<dyn CompletionService>> {
    match config.provider {
        CompletionProvider::Http => Ok(Arc::new(HttpCompletionService::from_config(config)?)),
        CompletionProvider::Offline => Ok(Arc::new(OfflineCompletion::new())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_from_messages() {
        let messages = vec![
            Message::new(Role::System, "Be brief"),
            Message::new(Role::User, "first"),
            Message::new(Role::Assistant, "ok"),
            Message::new(Role::User, "second"),
        ];
        let request = CompletionRequest::new("model-x", &messages);

        assert_eq!(request.model, "model-x");
        assert_eq!(request.messages.len(), 4);
        assert_eq!(request.messages[0].role, "system");
        assert_eq!(request.last_user_message(), Some("second"));
    }

    #[test]
    fn test_serializes_flat_roles() {
        let request = CompletionRequest::new("m", &[Message::new(Role::User, "hi")]);
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"model": "m", "messages": [{"role": "user", "content": "hi"}]})
        );
    }

    #[test]
    fn test_from_config_selects_provider() {
        let mut config = CompletionConfig::default();
        assert_eq!(from_config(&config).unwrap().name(), "http");

        config.provider = CompletionProvider::Offline;
        assert_eq!(from_config(&config).unwrap().name(), "offline");
    }
}
