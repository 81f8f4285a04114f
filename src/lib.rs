//! chanrelay - mirror chat channels into other channels
//!
//! This library provides the relay engine, its configuration and the
//! Discord adapter used by the chanrelay binary.

pub mod cli;
pub mod config;
pub mod relay;

#[cfg(test)]
pub(crate) mod test_utils;

// Re-export Args for the binary
pub use cli::Args;
