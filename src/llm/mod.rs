// Language model module
// Chat message types and the chat-completions client used to answer questions

#[cfg(test)]
mod tests;

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info};

use crate::config::Config;
use crate::http::{ProviderHttp, endpoint};
use crate::{RagError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

impl fmt::Display for Role {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::System => "system",
            Self::User => "user",
            Self::Assistant => "assistant",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    #[inline]
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    #[inline]
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    #[inline]
    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// Produces a single answer for a chat-style message list
#[async_trait]
pub trait LanguageModel: Send + Sync {
    async fn complete(&self, messages: &[ChatMessage]) -> Result<String>;
}

/// Client for an OpenAI-compatible `/chat/completions` endpoint
#[derive(Debug, Clone)]
pub struct ChatClient {
    base_url: String,
    model: String,
    max_tokens: u32,
    temperature: f32,
    http: ProviderHttp,
}

#[derive(Debug, Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    max_tokens: u32,
    temperature: f32,
}

#[derive(Debug, Deserialize)]
struct CompletionResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

impl ChatClient {
    #[inline]
    pub fn new(config: &Config) -> Result<Self> {
        let llm = &config.llm;
        llm.validate()?;

        Ok(Self {
            base_url: llm.base_url.clone(),
            model: llm.model.clone(),
            max_tokens: llm.max_tokens,
            temperature: llm.temperature,
            http: ProviderHttp::new(
                Duration::from_secs(llm.timeout_seconds),
                &llm.api_key,
                &llm.site_url,
                &llm.app_name,
            ),
        })
    }

    /// Check that the provider is reachable
    #[inline]
    pub fn health_check(&self) -> Result<()> {
        let url = endpoint(&self.base_url, "models");
        self.http
            .get(&url)
            .map_err(|e| RagError::LanguageModel(format!("Health check failed: {}", e)))?;

        info!("Language model provider at {} is reachable", self.base_url);
        Ok(())
    }

    /// Blocking completion call returning the first choice, trimmed
    #[inline]
    pub fn complete_blocking(&self, messages: &[ChatMessage]) -> Result<String> {
        debug!(
            "Requesting completion from {} with {} messages",
            self.model,
            messages.len()
        );

        let request = CompletionRequest {
            model: &self.model,
            messages,
            max_tokens: self.max_tokens,
            temperature: self.temperature,
        };
        let request_json = serde_json::to_string(&request).map_err(|e| {
            RagError::LanguageModel(format!("Failed to serialize completion request: {}", e))
        })?;

        let url = endpoint(&self.base_url, "chat/completions");
        let response_text = self.http.post_json(&url, &request_json).map_err(|e| {
            error!("Completion request failed: {}", e);
            RagError::LanguageModel(format!("Failed to get completion: {}", e))
        })?;

        let response: CompletionResponse = serde_json::from_str(&response_text).map_err(|e| {
            RagError::LanguageModel(format!("Failed to parse completion response: {}", e))
        })?;

        let answer = response
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| {
                RagError::LanguageModel("Completion response contained no choices".to_string())
            })?;

        Ok(answer.trim().to_string())
    }
}

#[async_trait]
impl LanguageModel for ChatClient {
    async fn complete(&self, messages: &[ChatMessage]) -> Result<String> {
        let client = self.clone();
        let messages = messages.to_vec();
        tokio::task::spawn_blocking(move || client.complete_blocking(&messages))
            .await
            .map_err(|e| RagError::LanguageModel(format!("Completion task failed: {}", e)))?
    }
}
