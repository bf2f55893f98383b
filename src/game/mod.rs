//! Game session orchestration
//!
//! - [`phase`]: the `Playing -> Accusing -> Resolved` state machine
//! - [`session`]: the session aggregate (budget, logs, concealed impostor)
//! - [`gateway`]: one question/answer exchange with one persona
//! - [`verdict`]: guess resolution, the only path that reveals the impostor
//! - [`store`]: synchronized owner of all live sessions

pub mod gateway;
pub mod phase;
pub mod session;
pub mod store;
pub mod verdict;

pub use gateway::Exchange;
pub use phase::{Phase, PhaseController, PhaseTransition, TransitionReason};
pub use session::{ImpostorToken, Message, Role, Session, SessionConfig, SessionId, SessionSnapshot};
pub use store::{SessionStore, StoreSettings};
pub use verdict::{TrustModel, Verdict, VerdictResolver};
