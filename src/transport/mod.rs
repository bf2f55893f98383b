//! Transport layer
//!
//! The JSON HTTP API in front of the session store.

pub mod http;

pub use http::{ApiError, AppState, HttpServer, build_router, parse_bind_addr};
