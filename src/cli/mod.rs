//! Command-line interface
//!
//! Argument parsing and command handlers for the `impostor` binary.

pub mod args;
pub mod commands;
