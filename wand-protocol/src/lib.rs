//! wand-protocol: Shared wire definitions for the wand client
//!
//! The server speaks unstructured UTF-8 text in both directions. This
//! crate defines the [`Endpoint`] a session connects to and the
//! [`TextCodec`] that turns arbitrarily chunked inbound bytes into text
//! without splitting multi-byte characters.

pub mod codec;
pub mod types;

// Re-export main types at crate root
pub use codec::{CodecError, TextCodec};
pub use types::{Endpoint, EndpointError};

/// Default server host
pub const DEFAULT_HOST: &str = "127.0.0.1";

/// Default server port
pub const DEFAULT_PORT: u16 = 8080;

/// Upper bound on the bytes requested by a single receive
pub const MAX_RECEIVE_LEN: usize = 64 * 1024;
