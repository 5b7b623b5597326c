//! The `utils` module provides the shared error types and the logging
//! bootstrap used across the adapters.

pub mod error;
pub mod logging;
