//! CLI command implementations.

pub mod status;
pub mod update;
pub mod verify;
pub mod worker;
