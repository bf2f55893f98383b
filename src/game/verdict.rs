//! Verdict resolver
//!
//! The only code path that turns the concealed impostor identity into
//! client-visible data. A remote verifier, when configured, is consulted
//! first; what happens when it cannot be reached depends on the trust model.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::backend::{GuessVerifier, RemoteVerdict};
use crate::error::{BackendError, GameError};
use crate::observability::metrics;
use crate::persona::PersonaId;

use super::session::{ImpostorToken, Session};

/// Message shown for a correct guess.
pub const CORRECT_MESSAGE: &str = "You found the impostor!";

/// Outcome of a guess.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Verdict {
    /// Whether the guess named the impostor
    pub correct: bool,
    /// The submitted guess
    pub guess: PersonaId,
    /// The impostor, revealed regardless of correctness
    pub revealed_impostor: PersonaId,
    /// Player-facing summary
    pub message: String,
}

impl Verdict {
    /// Compares `guess` against the session-held identity.
    #[must_use]
    pub fn local(impostor: &ImpostorToken, guess: PersonaId) -> Self {
        let revealed = impostor.reveal();
        let correct = impostor.matches(guess);
        Self {
            correct,
            guess,
            revealed_impostor: revealed,
            message: verdict_message(correct, revealed),
        }
    }
}

fn verdict_message(correct: bool, impostor: PersonaId) -> String {
    if correct {
        CORRECT_MESSAGE.to_string()
    } else {
        format!("Wrong! The impostor was {impostor}.")
    }
}

/// How much a remote verifier is trusted over the session-held identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TrustModel {
    /// Server and verifier share one trust domain: fall back to local
    /// comparison when the verifier is unreachable.
    #[default]
    SingleDomain,
    /// The verifier is authoritative: never fall back.
    Hardened,
}

impl fmt::Display for TrustModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SingleDomain => f.write_str("single-domain"),
            Self::Hardened => f.write_str("hardened"),
        }
    }
}

/// Produces verdicts for sessions in `Accusing`.
#[derive(Clone)]
pub struct VerdictResolver {
    verifier: Option<Arc<dyn GuessVerifier>>,
    trust_model: TrustModel,
    timeout: Duration,
}

impl fmt::Debug for VerdictResolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VerdictResolver")
            .field("remote", &self.verifier.is_some())
            .field("trust_model", &self.trust_model)
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl VerdictResolver {
    /// Creates a resolver.
    #[must_use]
    pub fn new(
        verifier: Option<Arc<dyn GuessVerifier>>,
        trust_model: TrustModel,
        timeout: Duration,
    ) -> Self {
        Self {
            verifier,
            trust_model,
            timeout,
        }
    }

    /// A resolver that only compares locally.
    #[must_use]
    pub fn local_only() -> Self {
        Self::new(None, TrustModel::SingleDomain, Duration::from_secs(5))
    }

    /// Computes the verdict for `guess` without changing the session.
    ///
    /// The caller holds the session lock for the duration of the call and
    /// records the verdict on success.
    ///
    /// # Errors
    ///
    /// Returns `GameError::Phase` outside `Accusing`, and
    /// `GameError::Verification` under [`TrustModel::Hardened`] when the
    /// remote verifier disagrees with the session or is unreachable.
    pub async fn resolve(&self, session: &Session, guess: PersonaId) -> Result<Verdict, GameError> {
        session.ensure_guessable()?;

        let local = Verdict::local(session.impostor(), guess);
        let Some(verifier) = &self.verifier else {
            return Ok(local);
        };

        let remote = match tokio::time::timeout(self.timeout, verifier.verify(session.id(), guess))
            .await
        {
            Ok(result) => result,
            Err(_) => Err(BackendError::Timeout),
        };

        match remote {
            Ok(remote) => self.reconcile(session, local, &remote),
            Err(e) => match self.trust_model {
                TrustModel::SingleDomain => {
                    metrics::record_verifier_fallback();
                    warn!(
                        session_id = %session.id(),
                        error = %e,
                        "remote verifier unreachable; using session record"
                    );
                    Ok(local)
                }
                TrustModel::Hardened => Err(GameError::Verification(e.to_string())),
            },
        }
    }

    /// The session record is authoritative. A disagreeing remote answer is
    /// replaced by the local verdict under [`TrustModel::SingleDomain`] and
    /// rejected under [`TrustModel::Hardened`].
    fn reconcile(
        &self,
        session: &Session,
        local: Verdict,
        remote: &RemoteVerdict,
    ) -> Result<Verdict, GameError> {
        if remote.actual_impostor != local.revealed_impostor || remote.correct != local.correct {
            return match self.trust_model {
                TrustModel::SingleDomain => {
                    metrics::record_verifier_fallback();
                    warn!(
                        session_id = %session.id(),
                        "remote verifier disagrees with session record; using session record"
                    );
                    Ok(local)
                }
                TrustModel::Hardened => Err(GameError::Verification(
                    "remote verifier disagrees with the session record".to_string(),
                )),
            };
        }
        debug!("remote verifier confirmed verdict");
        let message = if remote.message.trim().is_empty() {
            local.message
        } else {
            remote.message.clone()
        };
        Ok(Verdict { message, ..local })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{Credential, ScriptedBackend};
    use crate::game::phase::Phase;
    use crate::game::session::{SessionConfig, SessionId};
    use async_trait::async_trait;

    struct FixedVerifier(Result<RemoteVerdict, BackendError>);

    #[async_trait]
    impl GuessVerifier for FixedVerifier {
        async fn verify(
            &self,
            _session: SessionId,
            _guess: PersonaId,
        ) -> Result<RemoteVerdict, BackendError> {
            self.0.clone()
        }
    }

    fn accusing_session(impostor: PersonaId) -> Session {
        let mut s = Session::new(
            SessionId::new(),
            ImpostorToken::assigned(impostor),
            ScriptedBackend::scenario_for(impostor),
            Credential::default(),
            SessionConfig::default(),
        );
        s.accuse().unwrap();
        s
    }

    fn resolver(result: Result<RemoteVerdict, BackendError>, trust: TrustModel) -> VerdictResolver {
        VerdictResolver::new(
            Some(Arc::new(FixedVerifier(result))),
            trust,
            Duration::from_secs(1),
        )
    }

    #[test]
    fn local_messages() {
        let token = ImpostorToken::assigned(PersonaId::Blue);
        let hit = Verdict::local(&token, PersonaId::Blue);
        assert!(hit.correct);
        assert_eq!(hit.message, "You found the impostor!");

        let miss = Verdict::local(&token, PersonaId::Red);
        assert!(!miss.correct);
        assert_eq!(miss.revealed_impostor, PersonaId::Blue);
        assert_eq!(miss.message, "Wrong! The impostor was blue.");
    }

    #[tokio::test]
    async fn resolve_requires_accusing() {
        let s = Session::new(
            SessionId::new(),
            ImpostorToken::assigned(PersonaId::Red),
            ScriptedBackend::scenario_for(PersonaId::Red),
            Credential::default(),
            SessionConfig::default(),
        );
        let err = VerdictResolver::local_only()
            .resolve(&s, PersonaId::Red)
            .await
            .unwrap_err();
        assert!(matches!(err, GameError::Phase(_)));
    }

    #[tokio::test]
    async fn remote_agreement_uses_remote_message() {
        let s = accusing_session(PersonaId::Green);
        let r = resolver(
            Ok(RemoteVerdict {
                correct: true,
                actual_impostor: PersonaId::Green,
                message: "Nice work".into(),
            }),
            TrustModel::Hardened,
        );
        let v = r.resolve(&s, PersonaId::Green).await.unwrap();
        assert!(v.correct);
        assert_eq!(v.message, "Nice work");
    }

    fn disagreeing() -> Result<RemoteVerdict, BackendError> {
        Ok(RemoteVerdict {
            correct: false,
            actual_impostor: PersonaId::Red,
            message: "The impostor was red".into(),
        })
    }

    #[tokio::test]
    async fn single_domain_overrides_disagreeing_remote() {
        let mut s = accusing_session(PersonaId::Green);
        let r = resolver(disagreeing(), TrustModel::SingleDomain);
        let v = r.resolve(&s, PersonaId::Green).await.unwrap();
        assert!(v.correct);
        assert_eq!(v.revealed_impostor, PersonaId::Green);
        assert_eq!(v.message, CORRECT_MESSAGE);

        s.record_verdict(v).unwrap();
        assert_eq!(s.phase(), Phase::Resolved);
    }

    #[tokio::test]
    async fn hardened_rejects_disagreeing_remote() {
        let s = accusing_session(PersonaId::Green);
        let r = resolver(disagreeing(), TrustModel::Hardened);
        assert!(matches!(
            r.resolve(&s, PersonaId::Green).await.unwrap_err(),
            GameError::Verification(_)
        ));
        assert_eq!(s.phase(), Phase::Accusing);
    }

    #[tokio::test]
    async fn unreachable_single_domain_falls_back() {
        let s = accusing_session(PersonaId::Yellow);
        let r = resolver(
            Err(BackendError::Network("refused".into())),
            TrustModel::SingleDomain,
        );
        let v = r.resolve(&s, PersonaId::Red).await.unwrap();
        assert!(!v.correct);
        assert_eq!(v.revealed_impostor, PersonaId::Yellow);
    }

    #[tokio::test]
    async fn unreachable_hardened_fails() {
        let s = accusing_session(PersonaId::Yellow);
        let r = resolver(Err(BackendError::Timeout), TrustModel::Hardened);
        let err = r.resolve(&s, PersonaId::Yellow).await.unwrap_err();
        assert!(matches!(err, GameError::Verification(_)));
        assert!(err.is_retryable());
    }

    #[test]
    fn trust_model_parses_kebab_case() {
        let t: TrustModel = serde_yaml::from_str("hardened").unwrap();
        assert_eq!(t, TrustModel::Hardened);
        let t: TrustModel = serde_yaml::from_str("single-domain").unwrap();
        assert_eq!(t, TrustModel::SingleDomain);
        assert_eq!(TrustModel::Hardened.to_string(), "hardened");
    }

    #[test]
    fn verdict_serializes_identity() {
        let v = Verdict::local(&ImpostorToken::assigned(PersonaId::Red), PersonaId::Blue);
        let json = serde_json::to_value(&v).unwrap();
        assert_eq!(json["revealed_impostor"], "red");
        assert_eq!(json["guess"], "blue");
        assert_eq!(json["correct"], false);
    }
}
