//! Neovim msgpack-RPC client.
//!
//! [`ProtocolRuntime`] owns any number of channels, each with its own
//! receiver thread, and matches responses to the callers waiting for them.
//! [`Nvim`] wraps one channel with typed API calls.
//!
//! ```no_run
//! let nvim = mpackrpc_client::connect("/tmp/nvim.sock")?;
//! let buf = nvim.get_current_buf()?;
//! for line in nvim.buf_get_lines(buf, 0, -1, false)? {
//!     println!("{}", String::from_utf8_lossy(&line));
//! }
//! # Ok::<(), mpackrpc_client::ClientError>(())
//! ```

pub mod api;
pub mod config;
pub mod connector;
pub mod envelope;
pub mod error;
pub mod events;
pub mod pending;
pub mod runtime;

pub use api::Nvim;
pub use config::{ClientConfig, DEFAULT_REQUEST_TIMEOUT};
pub use connector::{connect, connect_stdio, connect_to, connect_with_config};
pub use envelope::{message_type_name, Envelope, RemoteError, NOTIFICATION, REQUEST, RESPONSE};
pub use error::{ClientError, Result};
pub use events::{BufferEvent, CHANGEDTICK_EVENT, DETACH_EVENT, LINES_EVENT};
pub use runtime::{AtomicError, AtomicResponse, NotificationHandler, ProtocolRuntime};
