//! Domain layer for the response verifier
//!
//! This module contains the status state machine, the task/result models and
//! the ports implemented by storage and sandbox adapters.

pub mod errors;
pub mod models;
pub mod ports;

pub use errors::{DomainError, DomainResult};
