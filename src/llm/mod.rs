//! Chat completion service
//!
//! The model is asked either for free text or for a call to a single declared
//! function whose arguments follow a JSON schema. Replies are normalized into
//! [`ModelReply`] so no provider-specific shapes leak past this module.

mod http_backend;

pub use http_backend::*;

use crate::config::CompletionConfig;
use crate::error::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    Function,
}

/// A function invocation, as emitted by the model or replayed in few-shot examples
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionCall {
    pub name: String,
    /// JSON-encoded arguments, exactly as produced by the model
    pub arguments: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    #[serde(default)]
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub function_call: Option<FunctionCall>,
}

impl ChatMessage {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            name: None,
            function_call: None,
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }
}

/// A function the model may call, with its JSON-schema parameters
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FunctionSpec {
    pub name: String,
    pub description: String,
    pub parameters: serde_json::Value,
}

#[derive(Debug, Clone)]
pub struct CompletionRequest {
    pub messages: Vec<ChatMessage>,
    pub function: Option<FunctionSpec>,
    /// Require the model to answer through `function` instead of free text
    pub force_function: bool,
}

/// Normalized model output
#[derive(Debug, Clone, PartialEq)]
pub enum ModelReply {
    FunctionCall(FunctionCall),
    Text(String),
}

#[async_trait]
pub trait CompletionService: Send + Sync {
    async fn complete(&self, request: CompletionRequest) -> Result<ModelReply>;

    fn model_name(&self) -> &str;
}

/// Create a completion client based on configuration
pub fn create_completion(config: &CompletionConfig) -> Result<Box<dyn CompletionService>> {
    Ok(Box::new(HttpCompletion::new(config)?))
}
