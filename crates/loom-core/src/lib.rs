//! Core utilities shared across the loom renderer workspace.
//!
//! This crate provides the foundational pieces the other crates build on:
//! - Application-level error types and result aliases
//! - Logging initialization

mod error;
mod logging;

pub use error::{Error, Result};
pub use logging::init_logging;
