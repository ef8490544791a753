//! Typed wrappers over the Neovim API.

use bytes::Bytes;
use mpackrpc_codec::{destroy, expect, Arg, AtomicCallBatch, ExpectKind, Extracted, Value};

use crate::error::{ClientError, Result};
use crate::runtime::{AtomicResponse, ProtocolRuntime};

/// One Neovim instance reached over one channel of a runtime.
#[derive(Clone)]
pub struct Nvim {
    runtime: ProtocolRuntime,
    channel: u16,
}

impl Nvim {
    pub fn new(runtime: ProtocolRuntime, channel: u16) -> Self {
        Self { runtime, channel }
    }

    pub fn runtime(&self) -> &ProtocolRuntime {
        &self.runtime
    }

    pub fn channel(&self) -> u16 {
        self.channel
    }

    /// Send any request and return its raw result.
    pub fn request(&self, method: &str, fmt: &str, args: &[Arg<'_>]) -> Result<Value> {
        self.runtime.send_request(self.channel, method, fmt, args)
    }

    /// The host's channel id for this client and the API metadata dictionary.
    pub fn get_api_info(&self) -> Result<(i64, Vec<(Value, Value)>)> {
        let info = self
            .typed("nvim_get_api_info", "", &[], ExpectKind::Array)?
            .into_array()
            .unwrap_or_default();
        let [id, metadata]: [Value; 2] = info
            .try_into()
            .map_err(|_| unexpected("nvim_get_api_info"))?;
        match (expect(id, ExpectKind::Num), expect(metadata, ExpectKind::Dict)) {
            (Some(Extracted::Num(id)), Some(Extracted::Dict(metadata))) => Ok((id, metadata)),
            _ => Err(unexpected("nvim_get_api_info")),
        }
    }

    pub fn command(&self, command: &str) -> Result<()> {
        self.unit("nvim_command", "s", &[Arg::from(command)])
    }

    pub fn eval(&self, expr: &str) -> Result<Value> {
        self.request("nvim_eval", "s", &[Arg::from(expr)])
    }

    /// Call a Vimscript function; `fmt` describes `args`.
    pub fn call_function(&self, name: &str, fmt: &str, args: &[Arg<'_>]) -> Result<Value> {
        self.request(
            "nvim_call_function",
            &format!("s[!{fmt}]"),
            &[Arg::from(name), Arg::Forward(args)],
        )
    }

    pub fn get_var(&self, name: &str) -> Result<Value> {
        self.request("nvim_get_var", "s", &[Arg::from(name)])
    }

    /// Set `g:name`. Only scalar arguments are meaningful; nested ones are sent as nil.
    pub fn set_var(&self, name: &str, value: Arg<'_>) -> Result<()> {
        let (code, value) = scalar(value);
        let args: Vec<Arg<'_>> = std::iter::once(Arg::from(name)).chain(value).collect();
        self.unit("nvim_set_var", &format!("s{code}"), &args)
    }

    pub fn get_option(&self, name: &str) -> Result<Value> {
        self.request("nvim_get_option", "s", &[Arg::from(name)])
    }

    pub fn get_current_buf(&self) -> Result<i64> {
        self.num("nvim_get_current_buf", "", &[])
    }

    pub fn list_bufs(&self) -> Result<Vec<i64>> {
        let bufs = self.typed("nvim_list_bufs", "", &[], ExpectKind::Array)?;
        bufs.into_array()
            .unwrap_or_default()
            .into_iter()
            .map(|buf| {
                expect(buf, ExpectKind::Num)
                    .and_then(|n| n.as_num())
                    .ok_or_else(|| unexpected("nvim_list_bufs"))
            })
            .collect()
    }

    pub fn buf_get_lines(&self, buf: i64, start: i64, end: i64, strict: bool) -> Result<Vec<Bytes>> {
        self.typed(
            "nvim_buf_get_lines",
            "d,d,d,b",
            &[buf.into(), start.into(), end.into(), strict.into()],
            ExpectKind::StrList,
        )
        .map(|lines| lines.into_str_list().unwrap_or_default())
    }

    pub fn buf_line_count(&self, buf: i64) -> Result<i64> {
        self.num("nvim_buf_line_count", "d", &[buf.into()])
    }

    pub fn buf_get_name(&self, buf: i64) -> Result<String> {
        self.typed("nvim_buf_get_name", "d", &[buf.into()], ExpectKind::String)
            .map(|name| name.into_string().unwrap_or_default())
    }

    pub fn buf_get_var(&self, buf: i64, name: &str) -> Result<Value> {
        self.request("nvim_buf_get_var", "d,s", &[buf.into(), Arg::from(name)])
    }

    pub fn buf_get_option(&self, buf: i64, name: &str) -> Result<Value> {
        self.request("nvim_buf_get_option", "d,s", &[buf.into(), Arg::from(name)])
    }

    pub fn buf_get_changedtick(&self, buf: i64) -> Result<i64> {
        self.num("nvim_buf_get_changedtick", "d", &[buf.into()])
    }

    /// Start receiving `nvim_buf_*_event` notifications for `buf`.
    pub fn buf_attach(&self, buf: i64, send_buffer: bool) -> Result<bool> {
        self.flag("nvim_buf_attach", "d,b,{}", &[buf.into(), send_buffer.into()])
    }

    pub fn buf_detach(&self, buf: i64) -> Result<bool> {
        self.flag("nvim_buf_detach", "d", &[buf.into()])
    }

    /// Highlight columns `col_start..col_end` of `line`; `col_end` -1 means
    /// end of line. Returns the namespace id used.
    pub fn buf_add_highlight(
        &self,
        buf: i64,
        ns_id: i64,
        hl_group: &str,
        line: i64,
        col_start: i64,
        col_end: i64,
    ) -> Result<i64> {
        self.num(
            "nvim_buf_add_highlight",
            "d,d,s,d,d,d",
            &[
                buf.into(),
                ns_id.into(),
                Arg::from(hl_group),
                line.into(),
                col_start.into(),
                col_end.into(),
            ],
        )
    }

    pub fn buf_clear_namespace(&self, buf: i64, ns_id: i64, line_start: i64, line_end: i64) -> Result<()> {
        self.unit(
            "nvim_buf_clear_namespace",
            "d,d,d,d",
            &[buf.into(), ns_id.into(), line_start.into(), line_end.into()],
        )
    }

    pub fn subscribe(&self, event: &str) -> Result<()> {
        self.unit("nvim_subscribe", "s", &[Arg::from(event)])
    }

    pub fn unsubscribe(&self, event: &str) -> Result<()> {
        self.unit("nvim_unsubscribe", "s", &[Arg::from(event)])
    }

    /// Identify this client to the host. Sent as a notification.
    pub fn set_client_info(
        &self,
        name: &str,
        version: (u64, u64, &str),
        kind: &str,
    ) -> Result<()> {
        let (major, minor, dev) = version;
        self.runtime.send_notification(
            self.channel,
            "nvim_set_client_info",
            "s,{s:u,s:u,s:s},s,{},{}",
            &[
                Arg::from(name),
                Arg::from("major"),
                major.into(),
                Arg::from("minor"),
                minor.into(),
                Arg::from("prerelease"),
                Arg::from(dev),
                Arg::from(kind),
            ],
        )
    }

    pub fn out_write(&self, text: &str) -> Result<()> {
        self.unit("nvim_out_write", "s", &[Arg::from(text)])
    }

    pub fn err_writeln(&self, text: &str) -> Result<()> {
        self.unit("nvim_err_writeln", "s", &[Arg::from(text)])
    }

    pub fn call_atomic(&self, batch: &AtomicCallBatch<'_>) -> Result<AtomicResponse> {
        self.runtime.send_atomic_batch(self.channel, batch)
    }

    pub fn close(&self) -> Result<()> {
        self.runtime.close(self.channel)
    }

    fn typed(&self, method: &str, fmt: &str, args: &[Arg<'_>], kind: ExpectKind) -> Result<Extracted> {
        self.runtime
            .call_expect(self.channel, method, fmt, args, kind)?
            .ok_or_else(|| unexpected(method))
    }

    fn num(&self, method: &str, fmt: &str, args: &[Arg<'_>]) -> Result<i64> {
        self.typed(method, fmt, args, ExpectKind::Num)
            .and_then(|n| n.as_num().ok_or_else(|| unexpected(method)))
    }

    fn flag(&self, method: &str, fmt: &str, args: &[Arg<'_>]) -> Result<bool> {
        self.typed(method, fmt, args, ExpectKind::Bool)
            .and_then(|b| b.as_bool().ok_or_else(|| unexpected(method)))
    }

    /// For methods returning nothing; whatever comes back is released.
    fn unit(&self, method: &str, fmt: &str, args: &[Arg<'_>]) -> Result<()> {
        destroy(self.request(method, fmt, args)?);
        Ok(())
    }
}

/// Format code for a scalar argument; `n` consumes no argument.
fn scalar(arg: Arg<'_>) -> (char, Option<Arg<'_>>) {
    match arg {
        Arg::Int(_) => ('d', Some(arg)),
        Arg::UInt(_) => ('u', Some(arg)),
        Arg::Bool(_) => ('b', Some(arg)),
        Arg::Str(_) => ('s', Some(arg)),
        Arg::Nil | Arg::Forward(_) | Arg::Batch(_) => ('n', None),
    }
}

fn unexpected(method: &str) -> ClientError {
    ClientError::ProtocolViolation(format!("{method} returned an unexpected value"))
}
