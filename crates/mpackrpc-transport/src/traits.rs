use std::io::{Read, Write};

use crate::error::{Result, TransportError};

/// A connected stream to the host, implementing `Read` and `Write`.
///
/// On Unix this wraps a Unix domain socket stream. A client launched by the
/// host as an RPC job talks over its own stdin/stdout instead.
pub struct IpcStream {
    inner: IpcStreamInner,
}

enum IpcStreamInner {
    #[cfg(unix)]
    Unix(std::os::unix::net::UnixStream),
    Stdio {
        stdin: std::io::Stdin,
        stdout: std::io::Stdout,
    },
}

impl Read for IpcStream {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        match &mut self.inner {
            #[cfg(unix)]
            IpcStreamInner::Unix(stream) => stream.read(buf),
            IpcStreamInner::Stdio { stdin, .. } => stdin.read(buf),
        }
    }
}

impl Write for IpcStream {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        match &mut self.inner {
            #[cfg(unix)]
            IpcStreamInner::Unix(stream) => stream.write(buf),
            IpcStreamInner::Stdio { stdout, .. } => stdout.write(buf),
        }
    }

    fn flush(&mut self) -> std::io::Result<()> {
        match &mut self.inner {
            #[cfg(unix)]
            IpcStreamInner::Unix(stream) => stream.flush(),
            IpcStreamInner::Stdio { stdout, .. } => stdout.flush(),
        }
    }
}

impl IpcStream {
    /// Create an IpcStream from a Unix domain socket stream.
    #[cfg(unix)]
    pub fn from_unix(stream: std::os::unix::net::UnixStream) -> Self {
        Self {
            inner: IpcStreamInner::Unix(stream),
        }
    }

    /// A stream over this process's stdin (read side) and stdout (write side).
    ///
    /// Nothing else in the process may write to stdout once this is in use,
    /// the host would read it as protocol bytes.
    pub fn stdio() -> Self {
        Self {
            inner: IpcStreamInner::Stdio {
                stdin: std::io::stdin(),
                stdout: std::io::stdout(),
            },
        }
    }

    /// A connected pair of in-process streams.
    #[cfg(unix)]
    pub fn pair() -> Result<(Self, Self)> {
        let (left, right) = std::os::unix::net::UnixStream::pair()?;
        Ok((Self::from_unix(left), Self::from_unix(right)))
    }

    /// Set read timeout on the underlying stream.
    ///
    /// Standard streams have no timeout support; clearing the timeout on them
    /// is accepted, setting one is not.
    pub fn set_read_timeout(&self, timeout: Option<std::time::Duration>) -> Result<()> {
        match &self.inner {
            #[cfg(unix)]
            IpcStreamInner::Unix(stream) => stream.set_read_timeout(timeout).map_err(Into::into),
            IpcStreamInner::Stdio { .. } => stdio_timeout(timeout, "read timeout"),
        }
    }

    /// Set write timeout on the underlying stream.
    pub fn set_write_timeout(&self, timeout: Option<std::time::Duration>) -> Result<()> {
        match &self.inner {
            #[cfg(unix)]
            IpcStreamInner::Unix(stream) => stream.set_write_timeout(timeout).map_err(Into::into),
            IpcStreamInner::Stdio { .. } => stdio_timeout(timeout, "write timeout"),
        }
    }

    /// Try to clone this stream (creates a new file descriptor for sockets).
    pub fn try_clone(&self) -> Result<Self> {
        match &self.inner {
            #[cfg(unix)]
            IpcStreamInner::Unix(stream) => {
                let cloned = stream.try_clone()?;
                Ok(Self::from_unix(cloned))
            }
            IpcStreamInner::Stdio { .. } => Ok(Self::stdio()),
        }
    }

    /// Shut down both directions of the stream.
    ///
    /// Wakes up a reader blocked on the other half of a cloned socket.
    pub fn shutdown(&self) -> Result<()> {
        match &self.inner {
            #[cfg(unix)]
            IpcStreamInner::Unix(stream) => stream
                .shutdown(std::net::Shutdown::Both)
                .map_err(Into::into),
            IpcStreamInner::Stdio { .. } => Err(TransportError::Unsupported {
                operation: "shutdown",
                transport: "stdio",
            }),
        }
    }

    /// Transport name for diagnostics.
    pub fn transport_name(&self) -> &'static str {
        match &self.inner {
            #[cfg(unix)]
            IpcStreamInner::Unix(_) => "unix-domain-socket",
            IpcStreamInner::Stdio { .. } => "stdio",
        }
    }
}

fn stdio_timeout(timeout: Option<std::time::Duration>, operation: &'static str) -> Result<()> {
    match timeout {
        None => Ok(()),
        Some(_) => Err(TransportError::Unsupported {
            operation,
            transport: "stdio",
        }),
    }
}

impl std::fmt::Debug for IpcStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IpcStream")
            .field("type", &self.transport_name())
            .finish()
    }
}
