//! Persona registry
//!
//! The closed set of AI-controlled personas a player interrogates. Personas
//! are identified by color on the wire and by a `PlayerN` name inside
//! generated scenarios.

use std::fmt;
use std::str::FromStr;

use rand::Rng;
use serde::{Deserialize, Serialize};

/// Identifier of one of the four personas.
///
/// Declaration order is display order; it carries no other meaning.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PersonaId {
    /// `Player1`
    Red,
    /// `Player2`
    Yellow,
    /// `Player3`
    Blue,
    /// `Player4`
    Green,
}

impl PersonaId {
    /// Every registered persona, in display order.
    pub const ALL: [Self; 4] = [Self::Red, Self::Yellow, Self::Blue, Self::Green];

    /// Color name used on the wire.
    #[must_use]
    pub const fn color(self) -> &'static str {
        match self {
            Self::Red => "red",
            Self::Yellow => "yellow",
            Self::Blue => "blue",
            Self::Green => "green",
        }
    }

    /// Player name used inside generated scenarios.
    #[must_use]
    pub const fn player_name(self) -> &'static str {
        match self {
            Self::Red => "Player1",
            Self::Yellow => "Player2",
            Self::Blue => "Player3",
            Self::Green => "Player4",
        }
    }

    /// Zero-based position in [`PersonaId::ALL`].
    #[must_use]
    pub const fn index(self) -> usize {
        self as usize
    }

    /// Looks up a persona by its scenario player name (`"Player3"`).
    #[must_use]
    pub fn from_player_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|p| p.player_name() == name)
    }

    /// Draws a persona uniformly at random.
    pub fn random<R: Rng + ?Sized>(rng: &mut R) -> Self {
        Self::ALL[rng.random_range(0..Self::ALL.len())]
    }
}

impl fmt::Display for PersonaId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.color())
    }
}

/// Error returned when a string names no registered persona.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownPersona {
    /// The rejected input
    pub input: String,
    /// Closest registered color, if any is near enough
    pub suggestion: Option<&'static str>,
}

impl fmt::Display for UnknownPersona {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown persona '{}'", self.input)?;
        if let Some(s) = self.suggestion {
            write!(f, " (did you mean '{s}'?)")?;
        }
        Ok(())
    }
}

impl std::error::Error for UnknownPersona {}

impl FromStr for PersonaId {
    type Err = UnknownPersona;

    /// Accepts a color (`"Blue"`) or a player name (`"Player3"`), case-insensitively.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let needle = s.trim().to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|p| p.color() == needle || p.player_name().eq_ignore_ascii_case(&needle))
            .ok_or_else(|| UnknownPersona {
                input: s.to_string(),
                suggestion: suggest_persona(&needle),
            })
    }
}

/// Suggests the closest color for typo correction.
///
/// Returns a match only if its Damerau-Levenshtein distance is at most 2.
#[must_use]
pub fn suggest_persona(input: &str) -> Option<&'static str> {
    PersonaId::ALL
        .iter()
        .map(|p| (p.color(), strsim::damerau_levenshtein(input, p.color())))
        .filter(|(_, dist)| *dist <= 2)
        .min_by_key(|(_, dist)| *dist)
        .map(|(name, _)| name)
}
