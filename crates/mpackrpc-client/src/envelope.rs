//! msgpack-RPC message envelopes.
//!
//! | Kind         | Shape                             |
//! |--------------|-----------------------------------|
//! | Request      | `[0, sequence, method, params]`   |
//! | Response     | `[1, sequence, error, result]`    |
//! | Notification | `[2, event, params]`              |

use std::fmt;

use bytes::Bytes;
use mpackrpc_codec::Value;

use crate::error::{ClientError, Result};

pub const REQUEST: u64 = 0;
pub const RESPONSE: u64 = 1;
pub const NOTIFICATION: u64 = 2;

/// Human-readable name for a message type code.
pub fn message_type_name(kind: u64) -> &'static str {
    match kind {
        REQUEST => "request",
        RESPONSE => "response",
        NOTIFICATION => "notification",
        _ => "unknown",
    }
}

/// One decoded message, split into its fields.
#[derive(Debug, Clone, PartialEq)]
pub enum Envelope {
    Request {
        sequence: u32,
        method: Bytes,
        params: Vec<Value>,
    },
    Response {
        sequence: u32,
        error: Value,
        result: Value,
    },
    Notification {
        event: Bytes,
        params: Vec<Value>,
    },
}

impl Envelope {
    /// Validate a top-level message and take it apart.
    pub fn parse(message: Value) -> Result<Self> {
        let fields = match message {
            Value::Array(fields) => fields,
            other => {
                return Err(violation(format!(
                    "message must be an array, got {}",
                    other.kind()
                )))
            }
        };

        let kind = fields
            .first()
            .and_then(Value::as_u64)
            .ok_or_else(|| violation("message type must be an unsigned integer".into()))?;

        let expected = match kind {
            REQUEST | RESPONSE => 4,
            NOTIFICATION => 3,
            other => return Err(violation(format!("unknown message type {other}"))),
        };
        if fields.len() != expected {
            return Err(violation(format!(
                "{} must have {expected} elements, got {}",
                message_type_name(kind),
                fields.len()
            )));
        }

        let mut fields = fields.into_iter().skip(1);
        let mut next = || fields.next().unwrap_or(Value::Nil);

        match kind {
            REQUEST => {
                let sequence = sequence(&next())?;
                let method = name(next(), "method")?;
                let params = params(next())?;
                Ok(Envelope::Request {
                    sequence,
                    method,
                    params,
                })
            }
            RESPONSE => {
                let sequence = sequence(&next())?;
                let error = next();
                let result = next();
                Ok(Envelope::Response {
                    sequence,
                    error,
                    result,
                })
            }
            _ => {
                let event = name(next(), "event")?;
                let params = params(next())?;
                Ok(Envelope::Notification { event, params })
            }
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Envelope::Request { .. } => message_type_name(REQUEST),
            Envelope::Response { .. } => message_type_name(RESPONSE),
            Envelope::Notification { .. } => message_type_name(NOTIFICATION),
        }
    }
}

fn violation(message: String) -> ClientError {
    ClientError::ProtocolViolation(message)
}

fn sequence(value: &Value) -> Result<u32> {
    value
        .as_u64()
        .and_then(|seq| u32::try_from(seq).ok())
        .ok_or_else(|| violation(format!("invalid sequence number {value}")))
}

fn name(value: Value, field: &str) -> Result<Bytes> {
    match value {
        Value::Str(bytes) => Ok(bytes),
        other => Err(violation(format!(
            "{field} must be a string, got {}",
            other.kind()
        ))),
    }
}

fn params(value: Value) -> Result<Vec<Value>> {
    match value {
        Value::Array(items) => Ok(items),
        other => Err(violation(format!(
            "params must be an array, got {}",
            other.kind()
        ))),
    }
}

/// An error reported by the host in a response's `error` field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteError {
    /// Neovim's error type: 0 for exceptions, 1 for validation errors.
    /// `-1` when the error value had some other shape.
    pub kind: i64,
    pub message: String,
}

impl RemoteError {
    pub fn from_value(value: Value) -> Self {
        if let Value::Array(items) = &value {
            if let [kind, Value::Str(message)] = items.as_slice() {
                if let Some(kind) = kind.as_i64() {
                    return Self {
                        kind,
                        message: String::from_utf8_lossy(message).into_owned(),
                    };
                }
            }
        }
        match value {
            Value::Str(message) => Self {
                kind: -1,
                message: String::from_utf8_lossy(&message).into_owned(),
            },
            other => Self {
                kind: -1,
                message: other.to_string(),
            },
        }
    }
}

impl fmt::Display for RemoteError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            0 => write!(f, "exception: {}", self.message),
            1 => write!(f, "validation error: {}", self.message),
            _ => f.write_str(&self.message),
        }
    }
}

impl std::error::Error for RemoteError {}
