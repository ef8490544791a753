//! Request/response correlation over any number of channels.
//!
//! Each attached channel gets one receiver thread that owns the read half of
//! its transport. Callers write under the channel's send lock and then block
//! on a one-shot receiver until the receiver thread hands them the response
//! carrying their sequence number.

use std::collections::HashMap;
use std::io::ErrorKind;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU16, AtomicU32, Ordering};
use std::sync::mpsc::{Receiver, RecvTimeoutError};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::thread::{self, JoinHandle};

use mpackrpc_codec::{
    destroy, encode_fmt, expect, Arg, AtomicCallBatch, CodecError, Encoded, ExpectKind,
    Extracted, FormatError, MessageReader, MessageWriter, Value,
};
use mpackrpc_transport::IpcStream;
use tracing::{debug, error, trace, warn};

use crate::config::ClientConfig;
use crate::envelope::{Envelope, RemoteError, NOTIFICATION, REQUEST};
use crate::error::{ClientError, Result};
use crate::pending::{PendingTable, Reply};

/// Callback for one notification event: channel id and the params array.
pub type NotificationHandler = Arc<dyn Fn(u16, Vec<Value>) + Send + Sync>;

const ATOMIC_METHOD: &str = "nvim_call_atomic";

/// Result of an `nvim_call_atomic` round trip.
#[derive(Debug, Clone, PartialEq)]
pub struct AtomicResponse {
    /// Results of the calls that ran, in batch order.
    pub results: Vec<Value>,
    /// Set when a call failed; later calls in the batch did not run.
    pub error: Option<AtomicError>,
}

/// The failing call of an atomic batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AtomicError {
    pub index: usize,
    pub error: RemoteError,
}

impl AtomicResponse {
    /// Parse `[results, nil | [index, type, message]]`.
    pub fn from_value(value: Value) -> Result<Self> {
        let shape = || ClientError::ProtocolViolation(format!("malformed {ATOMIC_METHOD} result"));

        let mut parts = value.into_array().ok_or_else(shape)?;
        if parts.len() != 2 {
            return Err(shape());
        }
        let error = parts.pop().unwrap_or(Value::Nil);
        let results = parts.pop().and_then(Value::into_array).ok_or_else(shape)?;

        let error = match error {
            Value::Nil => None,
            Value::Array(mut fields) if fields.len() == 3 => {
                let index = fields[0]
                    .as_u64()
                    .and_then(|i| usize::try_from(i).ok())
                    .ok_or_else(shape)?;
                let detail = Value::Array(fields.split_off(1));
                Some(AtomicError {
                    index,
                    error: RemoteError::from_value(detail),
                })
            }
            _ => return Err(shape()),
        };

        Ok(Self { results, error })
    }
}

struct Channel {
    id: u16,
    transport: &'static str,
    writer: Mutex<MessageWriter<IpcStream>>,
    /// Clone of the stream kept only to shut it down.
    control: IpcStream,
    next_sequence: AtomicU32,
    open: AtomicBool,
    receiver: Mutex<Option<JoinHandle<()>>>,
}

impl Channel {
    fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }
}

struct Shared {
    config: ClientConfig,
    channels: RwLock<HashMap<u16, Arc<Channel>>>,
    next_channel: AtomicU16,
    pending: PendingTable,
    handlers: RwLock<HashMap<String, NotificationHandler>>,
}

/// Correlates requests with responses and dispatches notifications.
///
/// Cheap to clone; all clones share the same channels and tables.
#[derive(Clone)]
pub struct ProtocolRuntime {
    shared: Arc<Shared>,
}

impl Default for ProtocolRuntime {
    fn default() -> Self {
        Self::new(ClientConfig::default())
    }
}

impl ProtocolRuntime {
    pub fn new(config: ClientConfig) -> Self {
        Self {
            shared: Arc::new(Shared {
                config,
                channels: RwLock::new(HashMap::new()),
                next_channel: AtomicU16::new(1),
                pending: PendingTable::new(),
                handlers: RwLock::new(HashMap::new()),
            }),
        }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.shared.config
    }

    /// Take over `stream` as a new channel and start its receiver thread.
    pub fn attach(&self, stream: IpcStream) -> Result<u16> {
        let config = &self.shared.config;
        let transport = stream.transport_name();
        let read_half = stream.try_clone()?;
        let control = stream.try_clone()?;
        let writer = MessageWriter::with_timeout(stream, config.codec.clone(), config.write_timeout)?;
        let reader = MessageReader::with_timeout(read_half, config.codec.clone(), config.read_timeout)?;

        let id = self.shared.next_channel.fetch_add(1, Ordering::Relaxed);
        let channel = Arc::new(Channel {
            id,
            transport,
            writer: Mutex::new(writer),
            control,
            next_sequence: AtomicU32::new(0),
            open: AtomicBool::new(true),
            receiver: Mutex::new(None),
        });
        write(&self.shared.channels).insert(id, Arc::clone(&channel));

        let shared = Arc::clone(&self.shared);
        let receiving = Arc::clone(&channel);
        let spawned = thread::Builder::new()
            .name(format!("mpackrpc-recv-{id}"))
            .spawn(move || receive_loop(&shared, &receiving, reader));

        match spawned {
            Ok(handle) => {
                *lock(&channel.receiver) = Some(handle);
                debug!(channel = id, transport, "channel attached");
                Ok(id)
            }
            Err(err) => {
                write(&self.shared.channels).remove(&id);
                Err(ClientError::Transport(err.into()))
            }
        }
    }

    /// Send `method(params)` and block until its response arrives.
    ///
    /// `fmt` describes the elements of the params array. A response with a
    /// non-nil `error` field becomes [`ClientError::Remote`].
    pub fn send_request(
        &self,
        channel: u16,
        method: &str,
        fmt: &str,
        args: &[Arg<'_>],
    ) -> Result<Value> {
        let format = format!("[u,u,s,[!{fmt}]]");
        let (sequence, rx) = self.start_request(
            channel,
            method,
            |sequence| self.shared.pending.insert_waiter(channel, sequence),
            |sequence| {
                encode_fmt(
                    args.len(),
                    &format,
                    &[
                        Arg::UInt(REQUEST),
                        Arg::UInt(sequence.into()),
                        Arg::from(method),
                        Arg::Forward(args),
                    ],
                )
            },
        )?;
        self.wait(channel, sequence, rx)
    }

    /// Send a request whose response is discarded when it arrives.
    pub fn send_request_nowait(
        &self,
        channel: u16,
        method: &str,
        fmt: &str,
        args: &[Arg<'_>],
    ) -> Result<u32> {
        let format = format!("[u,u,s,[!{fmt}]]");
        let (sequence, ()) = self.start_request(
            channel,
            method,
            |sequence| self.shared.pending.insert_discard(channel, sequence),
            |sequence| {
                encode_fmt(
                    args.len(),
                    &format,
                    &[
                        Arg::UInt(REQUEST),
                        Arg::UInt(sequence.into()),
                        Arg::from(method),
                        Arg::Forward(args),
                    ],
                )
            },
        )?;
        Ok(sequence)
    }

    /// Send `[2, method, params]`; nothing comes back.
    pub fn send_notification(
        &self,
        channel: u16,
        method: &str,
        fmt: &str,
        args: &[Arg<'_>],
    ) -> Result<()> {
        let ch = self.channel(channel)?;
        let mut writer = lock(&ch.writer);
        if !ch.is_open() {
            return Err(ClientError::ChannelClosed(channel));
        }

        let encoded = encode_fmt(
            args.len(),
            &format!("[u,s,[!{fmt}]]"),
            &[Arg::UInt(NOTIFICATION), Arg::from(method), Arg::Forward(args)],
        )?;
        self.write_locked(&ch, &mut writer, &encoded)?;
        debug!(channel, method, "sent notification");
        Ok(())
    }

    /// Run every call of `batch` in one `nvim_call_atomic` round trip.
    pub fn send_atomic_batch(
        &self,
        channel: u16,
        batch: &AtomicCallBatch<'_>,
    ) -> Result<AtomicResponse> {
        let format = format!("[u,u,s,[{}]]", batch.format());
        let records = batch.records();
        let (sequence, rx) = self.start_request(
            channel,
            ATOMIC_METHOD,
            |sequence| self.shared.pending.insert_waiter(channel, sequence),
            |sequence| {
                encode_fmt(
                    batch.len(),
                    &format,
                    &[
                        Arg::UInt(REQUEST),
                        Arg::UInt(sequence.into()),
                        Arg::from(ATOMIC_METHOD),
                        Arg::Batch(records),
                    ],
                )
            },
        )?;
        let value = self.wait(channel, sequence, rx)?;
        AtomicResponse::from_value(value)
    }

    /// [`send_request`](Self::send_request) followed by [`expect`].
    ///
    /// A result of the wrong kind is logged and yields `Ok(None)`.
    pub fn call_expect(
        &self,
        channel: u16,
        method: &str,
        fmt: &str,
        args: &[Arg<'_>],
        kind: ExpectKind,
    ) -> Result<Option<Extracted>> {
        let value = self.send_request(channel, method, fmt, args)?;
        Ok(expect(value, kind))
    }

    /// Route notifications named `event` to `handler`, replacing any previous one.
    ///
    /// Handlers run on the channel's receiver thread and must not wait for a
    /// response on that same channel.
    pub fn register_notification_handler<F>(&self, event: impl Into<String>, handler: F)
    where
        F: Fn(u16, Vec<Value>) + Send + Sync + 'static,
    {
        let event = event.into();
        debug!(event = %event, "notification handler registered");
        write(&self.shared.handlers).insert(event, Arc::new(handler));
    }

    pub fn unregister_notification_handler(&self, event: &str) -> bool {
        write(&self.shared.handlers).remove(event).is_some()
    }

    /// Requests still waiting for a response, over all channels.
    pub fn pending_count(&self) -> usize {
        self.shared.pending.len()
    }

    pub fn is_open(&self, channel: u16) -> bool {
        read(&self.shared.channels)
            .get(&channel)
            .is_some_and(|ch| ch.is_open())
    }

    /// Close a channel: stop its receiver, fail its pending requests and
    /// forget it. Later calls naming the channel get `UnknownChannel`.
    pub fn close(&self, channel: u16) -> Result<()> {
        let ch = self.channel(channel)?;
        if ch.open.swap(false, Ordering::SeqCst) {
            debug!(channel, transport = ch.transport, "closing channel");
        }

        let stopped = match ch.control.shutdown() {
            Ok(()) => true,
            Err(err) => {
                debug!(channel, error = %err, "transport cannot be shut down");
                false
            }
        };
        self.shared.pending.fail_channel(channel);

        let handle = lock(&ch.receiver).take();
        if let Some(handle) = handle {
            // Never join from the receiver itself, e.g. inside a handler.
            if stopped && handle.thread().id() != thread::current().id() {
                let _ = handle.join();
            }
        }
        write(&self.shared.channels).remove(&channel);
        Ok(())
    }

    fn channel(&self, channel: u16) -> Result<Arc<Channel>> {
        read(&self.shared.channels)
            .get(&channel)
            .cloned()
            .ok_or(ClientError::UnknownChannel(channel))
    }

    /// Assign a sequence number, register the pending entry and write the
    /// request, all under the channel's send lock.
    fn start_request<R>(
        &self,
        channel: u16,
        method: &str,
        register: impl FnOnce(u32) -> R,
        build: impl FnOnce(u32) -> std::result::Result<Encoded, FormatError>,
    ) -> Result<(u32, R)> {
        let ch = self.channel(channel)?;
        let mut writer = lock(&ch.writer);
        if !ch.is_open() {
            return Err(ClientError::ChannelClosed(channel));
        }

        let sequence = ch.next_sequence.fetch_add(1, Ordering::Relaxed);
        let encoded = build(sequence)?;
        let registered = register(sequence);
        // The receiver may have failed this channel's entries between the
        // check above and the insert.
        if !ch.is_open() {
            self.shared.pending.remove(channel, sequence);
            return Err(ClientError::ChannelClosed(channel));
        }

        if let Err(err) = self.write_locked(&ch, &mut writer, &encoded) {
            self.shared.pending.remove(channel, sequence);
            return Err(err);
        }
        debug!(channel, sequence, method, "sent request");
        Ok((sequence, registered))
    }

    /// A failed write leaves the stream mid-message, so it closes the channel.
    fn write_locked(
        &self,
        ch: &Channel,
        writer: &mut MessageWriter<IpcStream>,
        encoded: &Encoded,
    ) -> Result<()> {
        match writer.write_encoded(encoded) {
            Ok(()) => {
                trace!(channel = ch.id, bytes = encoded.packed.len(), "message written");
                Ok(())
            }
            Err(err) => {
                if ch.open.swap(false, Ordering::SeqCst) {
                    error!(channel = ch.id, error = %err, "write failed, closing channel");
                }
                let _ = ch.control.shutdown();
                Err(err.into())
            }
        }
    }

    fn wait(&self, channel: u16, sequence: u32, rx: Receiver<Reply>) -> Result<Value> {
        let closed = || Err(ClientError::ChannelClosed(channel));
        let Some(timeout) = self.shared.config.request_timeout else {
            return rx.recv().unwrap_or_else(|_| closed());
        };

        match rx.recv_timeout(timeout) {
            Ok(reply) => reply,
            Err(RecvTimeoutError::Timeout) => {
                if self.shared.pending.remove(channel, sequence) {
                    warn!(channel, sequence, ?timeout, "request timed out");
                    return Err(ClientError::RequestTimeout(timeout));
                }
                // The receiver took the entry first; its reply is on the way.
                rx.recv().unwrap_or_else(|_| closed())
            }
            Err(RecvTimeoutError::Disconnected) => closed(),
        }
    }
}

fn receive_loop(shared: &Shared, channel: &Channel, mut reader: MessageReader<IpcStream>) {
    debug!(channel = channel.id, "receiver started");

    let outcome = loop {
        let message = match reader.read_message() {
            Ok(message) => message,
            Err(CodecError::Io(err))
                if matches!(err.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) =>
            {
                if channel.is_open() {
                    continue;
                }
                break Ok(());
            }
            Err(CodecError::ConnectionClosed) => break Ok(()),
            Err(err) => break Err(ClientError::from(err)),
        };
        trace!(
            channel = channel.id,
            buffered = reader.buffered(),
            "message received"
        );
        if let Err(err) = shared.route(channel, message) {
            break Err(err);
        }
    };

    let was_open = channel.open.swap(false, Ordering::SeqCst);
    match outcome {
        Err(err) if was_open => error!(channel = channel.id, error = %err, "channel failed"),
        _ => debug!(channel = channel.id, "channel closed"),
    }

    let failed = shared.pending.fail_channel(channel.id);
    if failed > 0 {
        debug!(channel = channel.id, failed, "pending requests failed");
    }
}

impl Shared {
    fn route(&self, channel: &Channel, message: Value) -> Result<()> {
        match Envelope::parse(message)? {
            Envelope::Response {
                sequence,
                error,
                result,
            } => {
                debug!(channel = channel.id, sequence, "response received");
                let reply = if error.is_nil() {
                    Ok(result)
                } else {
                    destroy(result);
                    Err(ClientError::Remote(RemoteError::from_value(error)))
                };
                if !self.pending.complete(channel.id, sequence, reply) {
                    warn!(
                        channel = channel.id,
                        sequence, "response matches no pending request"
                    );
                }
            }
            Envelope::Notification { event, params } => {
                let event = String::from_utf8_lossy(&event);
                let handler = read(&self.handlers).get(event.as_ref()).cloned();
                match handler {
                    Some(handler) => {
                        debug!(channel = channel.id, event = %event, "dispatching notification");
                        let id = channel.id;
                        let handled = panic::catch_unwind(AssertUnwindSafe(|| handler(id, params)));
                        if handled.is_err() {
                            error!(channel = id, event = %event, "notification handler panicked");
                        }
                    }
                    None => {
                        warn!(channel = channel.id, event = %event, "no handler for notification");
                        destroy(Value::Array(params));
                    }
                }
            }
            Envelope::Request {
                sequence, method, ..
            } => {
                return Err(ClientError::ProtocolViolation(format!(
                    "host sent request {} (sequence {sequence}), which this client does not serve",
                    String::from_utf8_lossy(&method)
                )));
            }
        }
        Ok(())
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

fn read<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(PoisonError::into_inner)
}

fn write<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(PoisonError::into_inner)
}
