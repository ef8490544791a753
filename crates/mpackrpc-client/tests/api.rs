//! Typed API calls against a scripted host.

use std::thread;

use bytes::Bytes;
use mpackrpc_client::{BufferEvent, ClientError, Envelope, Nvim, ProtocolRuntime, LINES_EVENT};
use mpackrpc_codec::{Arg, AtomicCallBatch, Ext, MessageReader, MessageWriter, Value};
use mpackrpc_transport::IpcStream;

fn buf(handle: u32) -> Value {
    Value::Ext(Ext::new(0, handle))
}

/// Answers requests the way a small Neovim would and records what it saw.
fn fake_nvim(host: IpcStream) -> thread::JoinHandle<Vec<(String, Vec<Value>)>> {
    thread::spawn(move || {
        let mut reader = MessageReader::new(host.try_clone().unwrap());
        let mut writer = MessageWriter::new(host);
        let mut seen = Vec::new();

        while let Ok(message) = reader.read_message() {
            let (sequence, method, params) = match Envelope::parse(message).unwrap() {
                Envelope::Request {
                    sequence,
                    method,
                    params,
                } => (Some(sequence), method, params),
                Envelope::Notification { event, params } => (None, event, params),
                Envelope::Response { .. } => panic!("client sent a response"),
            };
            let method = String::from_utf8(method.to_vec()).unwrap();
            seen.push((method.clone(), params.clone()));
            let Some(sequence) = sequence else { continue };

            let (error, result) = match method.as_str() {
                "nvim_get_api_info" => (
                    Value::Nil,
                    Value::Array(vec![
                        Value::UInt(3),
                        Value::Map(vec![(Value::str("version"), Value::Map(vec![]))]),
                    ]),
                ),
                "nvim_list_bufs" => (Value::Nil, Value::Array(vec![buf(1), buf(4)])),
                "nvim_get_current_buf" => (Value::Nil, buf(4)),
                "nvim_buf_get_lines" => (
                    Value::Nil,
                    Value::Array(vec![Value::str("alpha"), Value::str("beta")]),
                ),
                "nvim_buf_get_name" => (Value::Nil, Value::str("/tmp/notes.txt")),
                "nvim_buf_attach" => (Value::Nil, Value::Bool(true)),
                "nvim_call_function" => (Value::Nil, Value::UInt(42)),
                "nvim_call_atomic" => (
                    Value::Nil,
                    Value::Array(vec![Value::Array(vec![Value::Nil, Value::Nil]), Value::Nil]),
                ),
                "nvim_command" if params.first() == Some(&Value::str("bad")) => (
                    Value::Array(vec![Value::UInt(0), Value::str("E492: Not an editor command")]),
                    Value::Nil,
                ),
                _ => (Value::Nil, Value::Nil),
            };
            writer
                .write_value(&Value::Array(vec![
                    Value::UInt(1),
                    Value::UInt(sequence.into()),
                    error,
                    result,
                ]))
                .unwrap();
        }
        seen
    })
}

fn setup() -> (Nvim, thread::JoinHandle<Vec<(String, Vec<Value>)>>) {
    let (client, host) = IpcStream::pair().unwrap();
    let runtime = ProtocolRuntime::default();
    let channel = runtime.attach(client).unwrap();
    (Nvim::new(runtime, channel), fake_nvim(host))
}

#[test]
fn typed_calls() {
    let (nvim, host) = setup();

    let (id, metadata) = nvim.get_api_info().unwrap();
    assert_eq!(id, 3);
    assert_eq!(metadata.len(), 1);

    assert_eq!(nvim.list_bufs().unwrap(), vec![1, 4]);
    let current = nvim.get_current_buf().unwrap();
    assert_eq!(current, 4);
    assert_eq!(
        nvim.buf_get_lines(current, 0, -1, false).unwrap(),
        vec![Bytes::from_static(b"alpha"), Bytes::from_static(b"beta")]
    );
    assert_eq!(nvim.buf_get_name(current).unwrap(), "/tmp/notes.txt");
    assert!(nvim.buf_attach(current, false).unwrap());
    assert_eq!(
        nvim.call_function("strlen", "s", &[Arg::from("hello")]).unwrap(),
        Value::UInt(42)
    );
    nvim.set_var("answer", Arg::Int(42)).unwrap();
    nvim.set_var("nothing", Arg::Nil).unwrap();
    nvim.set_client_info("mpackrpc", (0, 3, "dev"), "remote").unwrap();
    nvim.command("echo 'hi'").unwrap();

    nvim.close().unwrap();
    let seen = host.join().unwrap();

    let find = |method: &str| {
        seen.iter()
            .find(|(m, _)| m == method)
            .map(|(_, params)| params.clone())
            .unwrap_or_else(|| panic!("{method} was never sent"))
    };
    assert_eq!(
        find("nvim_buf_get_lines"),
        vec![Value::Int(4), Value::Int(0), Value::Int(-1), Value::Bool(false)]
    );
    assert_eq!(
        find("nvim_buf_attach"),
        vec![Value::Int(4), Value::Bool(false), Value::Map(vec![])]
    );
    assert_eq!(
        find("nvim_call_function"),
        vec![Value::str("strlen"), Value::Array(vec![Value::str("hello")])]
    );
    let set_client_info = find("nvim_set_client_info");
    assert_eq!(set_client_info[0], Value::str("mpackrpc"));
    assert_eq!(
        set_client_info[1].get_str("minor").and_then(Value::as_u64),
        Some(3)
    );
    let set_vars: Vec<_> = seen
        .iter()
        .filter(|(m, _)| m == "nvim_set_var")
        .map(|(_, params)| params.clone())
        .collect();
    assert_eq!(
        set_vars,
        vec![
            vec![Value::str("answer"), Value::Int(42)],
            vec![Value::str("nothing"), Value::Nil],
        ]
    );
}

#[test]
fn remote_errors_surface() {
    let (nvim, host) = setup();
    let err = nvim.command("bad").unwrap_err();
    assert!(matches!(err, ClientError::Remote(ref remote) if remote.message.contains("E492")));
    // The channel survives a remote error.
    nvim.command("good").unwrap();
    nvim.close().unwrap();
    host.join().unwrap();
}

#[test]
fn atomic_batch_through_api() {
    let (nvim, host) = setup();
    let mut batch = AtomicCallBatch::new();
    batch
        .push_call("nvim_command", "s", &[Arg::from("set nowrap")])
        .push_call("nvim_buf_set_name", "d,s", &[Arg::Int(1), Arg::from("x")]);
    let response = nvim.call_atomic(&batch).unwrap();
    assert_eq!(response.results.len(), 2);
    assert!(response.error.is_none());
    nvim.close().unwrap();
    host.join().unwrap();
}

#[test]
fn buffer_events_through_a_handler() {
    let (client, host) = IpcStream::pair().unwrap();
    let runtime = ProtocolRuntime::default();
    let (tx, rx) = std::sync::mpsc::channel();
    runtime.register_notification_handler(LINES_EVENT, move |_, params| {
        tx.send(BufferEvent::parse(LINES_EVENT, params)).unwrap();
    });
    let _channel = runtime.attach(client).unwrap();

    let mut writer = MessageWriter::new(host);
    writer
        .write_value(&Value::Array(vec![
            Value::UInt(2),
            Value::str(LINES_EVENT),
            Value::Array(vec![
                buf(1),
                Value::UInt(7),
                Value::UInt(0),
                Value::UInt(1),
                Value::Array(vec![Value::str("edited")]),
                Value::Bool(false),
            ]),
        ]))
        .unwrap();

    let event = rx
        .recv_timeout(std::time::Duration::from_secs(5))
        .unwrap()
        .unwrap();
    assert_eq!(
        event,
        BufferEvent::Lines {
            buffer: 1,
            changedtick: Some(7),
            first: 0,
            last: 1,
            lines: vec![Bytes::from_static(b"edited")],
            more: false,
        }
    );
}
