//! `impostor` - Session orchestration for a social-deduction chat game
//!
//! A player questions four LLM-driven crewmates under a shared question
//! budget, then names the one secretly playing the impostor. This library
//! holds the game core and the HTTP and terminal front ends around it.

pub mod backend;
pub mod cli;
pub mod config;
pub mod error;
pub mod game;
pub mod observability;
pub mod persona;
pub mod transport;
