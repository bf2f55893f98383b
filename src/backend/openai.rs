//! OpenAI-compatible completion client
//!
//! Talks to any server exposing `/chat/completions` and `/models` (OpenAI,
//! Ollama's OpenAI shim, vLLM, LM Studio). The caller's credential is sent
//! as a bearer token; the configured key is used when the caller has none.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::schema::LlmConfig;
use crate::error::BackendError;

use super::prompts;
use super::{Credential, ResponseGenerator, ResponseRequest};

// ============================================================================
// Wire Types
// ============================================================================

/// Author of a chat message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    /// Instructions
    System,
    /// The player (or the generator prompt)
    User,
    /// The model
    Assistant,
}

/// One chat completion message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChatMessage {
    /// Author
    pub role: ChatRole,
    /// Text
    pub content: String,
}

impl ChatMessage {
    /// System message.
    #[must_use]
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::System,
            content: content.into(),
        }
    }

    /// User message.
    #[must_use]
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::User,
            content: content.into(),
        }
    }

    /// Assistant message.
    #[must_use]
    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::Assistant,
            content: content.into(),
        }
    }
}

#[derive(Debug, Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    temperature: f32,
    max_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChatChoiceMessage {
    content: Option<String>,
}

/// Sampling parameters for one call.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sampling {
    /// Temperature
    pub temperature: f32,
    /// Token cap
    pub max_tokens: u32,
}

// ============================================================================
// Client
// ============================================================================

/// OpenAI-compatible HTTP client.
#[derive(Debug, Clone)]
pub struct OpenAiClient {
    config: LlmConfig,
    client: reqwest::Client,
}

impl OpenAiClient {
    /// Creates a client. Per-call deadlines are applied by the callers.
    ///
    /// # Panics
    ///
    /// Panics if the HTTP client cannot be built (TLS backend unavailable).
    #[must_use]
    pub fn new(config: LlmConfig) -> Self {
        let client = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .expect("failed to build HTTP client");
        Self { config, client }
    }

    /// Configured model name.
    #[must_use]
    pub fn model(&self) -> &str {
        &self.config.model
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{path}", self.config.base_url.trim_end_matches('/'))
    }

    fn bearer<'a>(&'a self, credential: &'a Credential) -> Option<&'a str> {
        if credential.is_empty() {
            self.config
                .api_key
                .as_deref()
                .filter(|k| !k.trim().is_empty())
        } else {
            Some(credential.expose())
        }
    }

    fn authorize(
        &self,
        request: reqwest::RequestBuilder,
        credential: &Credential,
    ) -> reqwest::RequestBuilder {
        match self.bearer(credential) {
            Some(key) => request.bearer_auth(key),
            None => request,
        }
    }

    /// Checks the credential by listing models.
    ///
    /// # Errors
    ///
    /// Returns `BackendError::Unauthorized` when the key is rejected.
    pub async fn list_models(&self, credential: &Credential) -> Result<(), BackendError> {
        let request = self.authorize(self.client.get(self.endpoint("models")), credential);
        let response = request.send().await?;
        check_status(response.status())?;
        debug!(model = %self.config.model, "credential accepted");
        Ok(())
    }

    /// Runs one chat completion and returns the trimmed text.
    ///
    /// # Errors
    ///
    /// Returns a `BackendError` on transport failure, a non-2xx status, or a
    /// response without choices.
    pub async fn chat(
        &self,
        credential: &Credential,
        messages: &[ChatMessage],
        sampling: Sampling,
    ) -> Result<String, BackendError> {
        let body = ChatCompletionRequest {
            model: &self.config.model,
            messages,
            temperature: sampling.temperature,
            max_tokens: sampling.max_tokens,
        };
        let request = self.authorize(
            self.client.post(self.endpoint("chat/completions")).json(&body),
            credential,
        );
        let response = request.send().await?;
        check_status(response.status())?;

        let parsed: ChatCompletionResponse = response.json().await?;
        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .map(|text| text.trim().to_string())
            .ok_or_else(|| BackendError::InvalidResponse("no choices in response".to_string()))
    }
}

fn check_status(status: reqwest::StatusCode) -> Result<(), BackendError> {
    match status.as_u16() {
        200..=299 => Ok(()),
        401 | 403 => Err(BackendError::Unauthorized),
        code => Err(BackendError::HttpStatus(code)),
    }
}

#[async_trait]
impl ResponseGenerator for OpenAiClient {
    async fn generate_response(
        &self,
        credential: &Credential,
        request: &ResponseRequest,
    ) -> Result<String, BackendError> {
        let messages = prompts::persona_messages(request);
        self.chat(
            credential,
            &messages,
            Sampling {
                temperature: self.config.temperature,
                max_tokens: self.config.max_tokens,
            },
        )
        .await
    }
}
