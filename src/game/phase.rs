//! Phase controller
//!
//! The per-session state machine `Playing -> Accusing -> Resolved`.
//! `Accusing -> Playing` is allowed once; `Resolved` is terminal.

use std::fmt;

use serde::Serialize;

use crate::error::PhaseError;

/// Game phase of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    /// Player is questioning personas (initial)
    Playing,
    /// Player must commit to a guess
    Accusing,
    /// A guess was submitted (terminal)
    Resolved,
}

impl Phase {
    /// Lowercase name used in logs, metrics and error messages.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Playing => "playing",
            Self::Accusing => "accusing",
            Self::Resolved => "resolved",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a transition fired.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TransitionReason {
    /// The shared question budget reached zero
    BudgetExhausted,
    /// The player chose to accuse before the budget ran out
    PlayerAccused,
    /// The player declined to guess and resumed questioning
    PlayerWentBack,
    /// A guess was submitted
    GuessSubmitted,
}

impl fmt::Display for TransitionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::BudgetExhausted => "budget_exhausted",
            Self::PlayerAccused => "player_accused",
            Self::PlayerWentBack => "player_went_back",
            Self::GuessSubmitted => "guess_submitted",
        };
        f.write_str(s)
    }
}

/// Record of a phase transition for downstream processing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PhaseTransition {
    /// Phase we transitioned from
    pub from: Phase,
    /// Phase we transitioned to
    pub to: Phase,
    /// Reason the transition fired
    pub reason: TransitionReason,
}

/// Phase state machine for one session.
///
/// Not synchronized on its own; the owning session serializes access.
#[derive(Debug, Clone)]
pub struct PhaseController {
    phase: Phase,
    back_used: bool,
}

impl Default for PhaseController {
    fn default() -> Self {
        Self::new()
    }
}

impl PhaseController {
    /// Creates a controller in `Playing`.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            phase: Phase::Playing,
            back_used: false,
        }
    }

    /// Returns the current phase.
    #[must_use]
    pub const fn phase(&self) -> Phase {
        self.phase
    }

    /// Returns whether the single back transition is still available.
    #[must_use]
    pub const fn back_available(&self) -> bool {
        !self.back_used
    }

    /// Returns whether the session reached its terminal phase.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self.phase, Phase::Resolved)
    }

    /// Fails with [`PhaseError::NotAllowed`] unless the current phase is `expected`.
    ///
    /// # Errors
    ///
    /// Returns `PhaseError::NotAllowed` naming `operation` and the current phase.
    pub fn require(&self, expected: Phase, operation: &'static str) -> Result<(), PhaseError> {
        if self.phase == expected {
            Ok(())
        } else {
            Err(PhaseError::NotAllowed {
                operation,
                phase: self.phase,
            })
        }
    }

    /// Forces `Playing -> Accusing` after the budget ran out.
    ///
    /// Returns `None` when the session is not playing (nothing to do).
    pub fn exhaust_budget(&mut self) -> Option<PhaseTransition> {
        (self.phase == Phase::Playing)
            .then(|| self.transition(Phase::Accusing, TransitionReason::BudgetExhausted))
    }

    /// Explicit early accusation: `Playing -> Accusing`.
    ///
    /// # Errors
    ///
    /// Returns `PhaseError::NotAllowed` outside `Playing`.
    pub fn accuse(&mut self) -> Result<PhaseTransition, PhaseError> {
        self.require(Phase::Playing, "accuse")?;
        Ok(self.transition(Phase::Accusing, TransitionReason::PlayerAccused))
    }

    /// Declines to guess: `Accusing -> Playing`, once per session.
    ///
    /// # Errors
    ///
    /// Returns `PhaseError::NotAllowed` outside `Accusing` and
    /// `PhaseError::BackAlreadyUsed` on the second attempt.
    pub fn back(&mut self) -> Result<PhaseTransition, PhaseError> {
        self.require(Phase::Accusing, "back")?;
        if self.back_used {
            return Err(PhaseError::BackAlreadyUsed);
        }
        self.back_used = true;
        Ok(self.transition(Phase::Playing, TransitionReason::PlayerWentBack))
    }

    /// Commits a guess: `Accusing -> Resolved`.
    ///
    /// # Errors
    ///
    /// Returns `PhaseError::NotAllowed` outside `Accusing`.
    pub fn resolve(&mut self) -> Result<PhaseTransition, PhaseError> {
        self.require(Phase::Accusing, "guess")?;
        Ok(self.transition(Phase::Resolved, TransitionReason::GuessSubmitted))
    }

    fn transition(&mut self, to: Phase, reason: TransitionReason) -> PhaseTransition {
        let from = self.phase;
        self.phase = to;
        PhaseTransition { from, to, reason }
    }
}
