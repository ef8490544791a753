//! Byte-stream connections to a msgpack-RPC host process.
//!
//! The host (an editor) is reached either through the Unix domain socket it
//! listens on, or through the standard streams of a process it spawned as an
//! RPC job. Both look the same to the layers above: an [`IpcStream`] that is
//! `Read + Write` and can be split into independent read and write halves.

pub mod error;
pub mod traits;

#[cfg(unix)]
pub mod uds;

pub use error::{Result, TransportError};
pub use traits::IpcStream;

#[cfg(unix)]
pub use uds::UnixDomainSocket;
