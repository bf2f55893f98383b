//! Observability module
//!
//! Logging, metrics, and structured event infrastructure for monitoring
//! game sessions.

pub mod events;
pub mod logging;
pub mod metrics;

pub use events::{Event, EventEmitter};
pub use logging::LogSettings;
pub use metrics::init_metrics;
