//! Network addressing types

pub mod endpoint;

pub use endpoint::{Endpoint, DEFAULT_HOST, DEFAULT_PORT};
