//! Common utilities for hostlink
//!
//! This crate provides the pieces shared by the session library and the probe
//! binary: the application-level error type and tracing setup.

pub mod error;
pub mod logging;

pub use error::{Error, Result};
pub use logging::setup_logging;
