//! Neovim msgpack-RPC client runtime.
//!
//! # Crate Structure
//!
//! - [`transport`]: Unix domain socket and stdio streams
//! - [`codec`]: MessagePack value model, streaming decoder, format encoder,
//!   typed extraction and teardown
//! - [`client`]: request/response correlation and the typed Neovim API
//!   (behind the default `client` feature)

/// Re-export transport types.
pub mod transport {
    pub use mpackrpc_transport::*;
}

/// Re-export codec types.
pub mod codec {
    pub use mpackrpc_codec::*;
}

/// Re-export client types (requires `client` feature).
#[cfg(feature = "client")]
pub mod client {
    pub use mpackrpc_client::*;
}
