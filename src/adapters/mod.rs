//! Infrastructure adapters for external systems.

pub mod sandbox;
pub mod sqlite;
