/*!
 * Provider implementations for chat-completion endpoints.
 *
 * This module contains client implementations for the translation backends:
 * - OpenRouter: OpenAI-compatible streaming API with per-request provider routing
 * - Mock: scripted provider used by tests
 */

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt::Debug;

use crate::errors::ProviderError;
use crate::translation::stop::StopFlag;

/// Chat message object
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    /// Role of the message sender (system, user or assistant)
    pub role: String,
    /// Content of the message
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: "assistant".to_string(),
            content: content.into(),
        }
    }
}

/// Model and sampling parameters sent with every request
#[derive(Debug, Clone, PartialEq)]
pub struct SamplingParams {
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
    pub frequency_penalty: f32,
    pub top_p: f32,
    /// 0 disables top-k and leaves it out of the request
    pub top_k: u32,
}

/// A single completion request
#[derive(Debug, Clone, PartialEq)]
pub struct ChatRequest {
    pub messages: Vec<ChatMessage>,
    pub params: SamplingParams,
    /// Upstream provider the router must use, if any
    pub route: Option<String>,
}

/// Common trait for all completion backends
///
/// Implementations return the complete assistant text of one attempt. Retries
/// and provider rotation are handled by the caller.
#[async_trait]
pub trait Provider: Send + Sync + Debug {
    /// Run one completion attempt, aborting early if `stop` is raised
    async fn complete(&self, request: ChatRequest, stop: &StopFlag) -> Result<String, ProviderError>;

    /// Short name used in logs
    fn name(&self) -> &str;
}

pub mod mock;
pub mod openrouter;
