//! Remote guess verification
//!
//! Asks a peer game server which persona is the impostor of a session. The
//! peer exposes the same verify route this crate serves, so either field
//! name for the revealed identity is accepted.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;

use crate::error::BackendError;
use crate::game::session::SessionId;
use crate::persona::PersonaId;

use super::{GuessVerifier, RemoteVerdict};

#[derive(Debug, Deserialize)]
struct VerifyResponse {
    correct: bool,
    #[serde(alias = "revealed_impostor")]
    actual_impostor: PersonaId,
    #[serde(default)]
    message: String,
}

/// HTTP client for a peer verify endpoint.
#[derive(Debug, Clone)]
pub struct HttpVerifier {
    base_url: String,
    client: reqwest::Client,
}

impl HttpVerifier {
    /// Creates a verifier for `base_url` with a per-request `timeout`.
    ///
    /// # Panics
    ///
    /// Panics if the HTTP client cannot be built (TLS backend unavailable).
    #[must_use]
    pub fn new(base_url: String, timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .expect("failed to build HTTP client");
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
        }
    }

    fn verify_url(&self, session: SessionId) -> String {
        format!("{}/api/game/{session}/verify", self.base_url)
    }

    fn verify_request(&self, session: SessionId, guess: PersonaId) -> reqwest::RequestBuilder {
        self.client
            .post(self.verify_url(session))
            .query(&[("guess", guess.color())])
    }
}

#[async_trait]
impl GuessVerifier for HttpVerifier {
    async fn verify(
        &self,
        session: SessionId,
        guess: PersonaId,
    ) -> Result<RemoteVerdict, BackendError> {
        let response = self.verify_request(session, guess).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(BackendError::HttpStatus(status.as_u16()));
        }
        let body: VerifyResponse = response.json().await?;
        debug!(session_id = %session, correct = body.correct, "remote verdict");
        Ok(RemoteVerdict {
            correct: body.correct,
            actual_impostor: body.actual_impostor,
            message: body.message,
        })
    }
}
