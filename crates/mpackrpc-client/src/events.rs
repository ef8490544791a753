//! Buffer update notifications sent after `nvim_buf_attach`.

use bytes::Bytes;
use mpackrpc_codec::{destroy, expect, ExpectKind, Extracted, Value};

use crate::error::{ClientError, Result};

pub const LINES_EVENT: &str = "nvim_buf_lines_event";
pub const CHANGEDTICK_EVENT: &str = "nvim_buf_changedtick_event";
pub const DETACH_EVENT: &str = "nvim_buf_detach_event";

#[derive(Debug, Clone, PartialEq)]
pub enum BufferEvent {
    /// Lines `first..last` (zero-based, end-exclusive) were replaced by `lines`.
    Lines {
        buffer: i64,
        /// `None` when the change did not bump the tick, e.g. undo of nothing.
        changedtick: Option<i64>,
        first: i64,
        last: i64,
        lines: Vec<Bytes>,
        /// More events follow for the same initial buffer contents.
        more: bool,
    },
    ChangedTick {
        buffer: i64,
        changedtick: i64,
    },
    Detach {
        buffer: i64,
    },
    Other {
        event: String,
        params: Vec<Value>,
    },
}

impl BufferEvent {
    pub fn parse(event: &str, params: Vec<Value>) -> Result<Self> {
        let arity = match event {
            LINES_EVENT => 6,
            CHANGEDTICK_EVENT => 2,
            DETACH_EVENT => 1,
            _ => {
                return Ok(BufferEvent::Other {
                    event: event.to_string(),
                    params,
                })
            }
        };
        if params.len() != arity {
            let found = params.len();
            destroy(Value::Array(params));
            return Err(malformed(event, &format!("{found} params, expected {arity}")));
        }

        let mut params = params.into_iter();
        let mut next = || params.next().unwrap_or(Value::Nil);
        let num = |value: Value, field: &str| {
            expect(value, ExpectKind::Num)
                .and_then(|n| n.as_num())
                .ok_or_else(|| malformed(event, field))
        };

        match event {
            LINES_EVENT => {
                let buffer = num(next(), "buffer")?;
                let changedtick = match next() {
                    Value::Nil => None,
                    tick => Some(num(tick, "changedtick")?),
                };
                let first = num(next(), "firstline")?;
                let last = num(next(), "lastline")?;
                let lines = expect(next(), ExpectKind::StrList)
                    .and_then(Extracted::into_str_list)
                    .ok_or_else(|| malformed(event, "linedata"))?;
                let more = expect(next(), ExpectKind::Bool)
                    .and_then(|b| b.as_bool())
                    .ok_or_else(|| malformed(event, "more"))?;
                Ok(BufferEvent::Lines {
                    buffer,
                    changedtick,
                    first,
                    last,
                    lines,
                    more,
                })
            }
            CHANGEDTICK_EVENT => Ok(BufferEvent::ChangedTick {
                buffer: num(next(), "buffer")?,
                changedtick: num(next(), "changedtick")?,
            }),
            _ => Ok(BufferEvent::Detach {
                buffer: num(next(), "buffer")?,
            }),
        }
    }

    pub fn buffer(&self) -> Option<i64> {
        match *self {
            BufferEvent::Lines { buffer, .. }
            | BufferEvent::ChangedTick { buffer, .. }
            | BufferEvent::Detach { buffer } => Some(buffer),
            BufferEvent::Other { .. } => None,
        }
    }
}

fn malformed(event: &str, detail: &str) -> ClientError {
    ClientError::ProtocolViolation(format!("malformed {event}: {detail}"))
}
