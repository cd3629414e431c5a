//! Infrastructure layer module
//!
//! Configuration loading and logging setup used by the CLI.

pub mod config;
pub mod logging;
