//! HTTP echo server and client
//!
//! The server relays `POST /echo` request bodies to a [`crate::RelayOutput`]
//! and answers `200 received\n`; everything else gets an empty `404`. The
//! client posts an input stream to `/echo` and relays the response body.
//! HTTP/1.1 framing is handled here directly: heads are parsed with
//! `httparse`, bodies go through the codecs in [`body`].

pub mod body;
pub mod client;
pub mod config;
pub mod protocol;
pub mod server;


pub use body::{relay_body, BodyDecoder, ChunkedEncoder};
pub use client::HttpEchoClient;
pub use config::{ClientConfig, HttpConfig};
pub use protocol::{BodyFraming, HttpProtocolError, RequestHead, ResponseHead, Route};
pub use server::HttpEchoServer;
