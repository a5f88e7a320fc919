//! Common traits and types used across the httpecho library
//!
//! This module contains the server trait the binaries drive, the relay
//! output abstraction and helpers for spinning up test servers.

pub mod test_utils;
pub mod traits;

pub use test_utils::{spawn_test_server, CapturedOutput};
pub use traits::{EchoServerTrait, RelayOutput, StdoutOutput};
