use std::time::Duration;

use mpackrpc_codec::CodecConfig;

/// Default time a caller waits for its response.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Configuration for a [`ProtocolRuntime`](crate::ProtocolRuntime).
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// How long `send_request` waits for the matching response.
    /// `None` waits forever. Default: 30 s.
    pub request_timeout: Option<Duration>,
    /// Decoder limits for every attached channel.
    pub codec: CodecConfig,
    /// Read timeout on channel sockets. When set, receiver threads wake up
    /// this often while idle to notice a local `close`.
    pub read_timeout: Option<Duration>,
    /// Write timeout on channel sockets.
    pub write_timeout: Option<Duration>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            request_timeout: Some(DEFAULT_REQUEST_TIMEOUT),
            codec: CodecConfig::default(),
            read_timeout: None,
            write_timeout: None,
        }
    }
}
