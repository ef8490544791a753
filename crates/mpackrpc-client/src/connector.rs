use std::path::Path;

use mpackrpc_transport::IpcStream;
#[cfg(unix)]
use mpackrpc_transport::UnixDomainSocket;
use tracing::debug;

use crate::api::Nvim;
use crate::config::ClientConfig;
use crate::error::Result;
use crate::runtime::ProtocolRuntime;

/// Connect to a Neovim listening on `path` (see `:echo v:servername`).
pub fn connect(path: impl AsRef<Path>) -> Result<Nvim> {
    connect_with_config(path, ClientConfig::default())
}

/// Connect with explicit configuration.
pub fn connect_with_config(path: impl AsRef<Path>, config: ClientConfig) -> Result<Nvim> {
    connect_to(&ProtocolRuntime::new(config), path)
}

/// Connect one more channel to an existing runtime.
pub fn connect_to(runtime: &ProtocolRuntime, path: impl AsRef<Path>) -> Result<Nvim> {
    #[cfg(not(unix))]
    {
        let _ = runtime;
        let path = path.as_ref().to_path_buf();
        return Err(mpackrpc_transport::TransportError::Connect {
            path,
            source: std::io::Error::new(
                std::io::ErrorKind::Unsupported,
                "mpackrpc-client requires Unix domain sockets",
            ),
        }
        .into());
    }

    #[cfg(unix)]
    {
        let path = path.as_ref();
        let stream = UnixDomainSocket::connect(path)?;
        let channel = runtime.attach(stream)?;
        debug!(channel, path = %path.display(), "connected");
        Ok(Nvim::new(runtime.clone(), channel))
    }
}

/// Talk to the host over this process's stdin/stdout, for clients the host
/// started as a job with `rpc = true`.
///
/// Timeouts are not supported on stdio; `read_timeout` and `write_timeout`
/// must be `None`.
pub fn connect_stdio(config: ClientConfig) -> Result<Nvim> {
    let runtime = ProtocolRuntime::new(config);
    let channel = runtime.attach(IpcStream::stdio())?;
    debug!(channel, "attached to stdio");
    Ok(Nvim::new(runtime, channel))
}
