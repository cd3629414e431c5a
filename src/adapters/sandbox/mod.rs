//! Sandbox adapters.

pub mod http;
pub mod mock;

pub use http::{HttpSandbox, HttpSandboxConfig};
pub use mock::{MockReply, MockSandbox};
