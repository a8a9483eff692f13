//! Wire types and per-call option structs.

use std::collections::HashMap;

use reqwest::Method;
use reqwest::header::HeaderMap;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Default model for the chat-completion convenience call.
pub const DEFAULT_CHAT_MODEL: &str = "gpt-4o-mini";

/// Response body of the secret-fetch endpoint.
#[derive(Deserialize, Debug)]
pub(crate) struct SecretResponse {
    pub value: Option<String>,
    pub error: Option<String>,
}

/// Response body of the env-fetch endpoint.
#[derive(Deserialize, Debug)]
pub(crate) struct EnvResponse {
    pub secrets: Option<HashMap<String, String>>,
    pub error: Option<String>,
}

/// Per-call options for a proxy request. Proxy responses are never cached.
#[derive(Debug, Clone)]
pub struct ProxyOptions {
    /// HTTP method of the forwarded request.
    pub method: Method,
    /// JSON body, sent when present.
    pub payload: Option<Value>,
    /// Extra headers merged into the request. The `Authorization` header is
    /// always set from the call's token and cannot be overridden here.
    pub headers: HeaderMap,
}

impl Default for ProxyOptions {
    fn default() -> Self {
        Self {
            method: Method::POST,
            payload: None,
            headers: HeaderMap::new(),
        }
    }
}

impl ProxyOptions {
    /// A POST carrying the given JSON payload.
    pub fn with_payload(payload: Value) -> Self {
        Self {
            payload: Some(payload),
            ..Self::default()
        }
    }
}

/// One message in a chat-completion conversation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn new(role: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: role.into(),
            content: content.into(),
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new("system", content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new("user", content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new("assistant", content)
    }
}

/// Options for the chat-completion convenience call.
#[derive(Debug, Clone)]
pub struct ChatOptions {
    /// Model forwarded to the remote API.
    pub model: String,
    /// Extra top-level parameters merged into the payload; entries here
    /// override `model` and `messages` on key collision.
    pub extra: Map<String, Value>,
}

impl Default for ChatOptions {
    fn default() -> Self {
        Self {
            model: DEFAULT_CHAT_MODEL.to_string(),
            extra: Map::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_proxy_options_default_to_post() {
        let options = ProxyOptions::default();
        assert_eq!(options.method, Method::POST);
        assert!(options.payload.is_none());
        assert!(options.headers.is_empty());
    }

    #[test]
    fn test_chat_message_constructors() {
        let message = ChatMessage::user("Hello!");
        assert_eq!(message.role, "user");
        assert_eq!(message.content, "Hello!");
    }

    #[test]
    fn test_chat_message_serializes_as_role_content() {
        let message = ChatMessage::system("be brief");
        let value = serde_json::to_value(&message).unwrap();
        assert_eq!(
            value,
            serde_json::json!({"role": "system", "content": "be brief"})
        );
    }

    #[test]
    fn test_chat_options_default_model() {
        assert_eq!(ChatOptions::default().model, DEFAULT_CHAT_MODEL);
    }
}
