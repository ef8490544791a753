//! Attach to the current buffer and print every change until it is detached.
//!
//! Run with:
//!   NVIM=/path/to/socket cargo run --example buffer-events

use std::sync::mpsc;

use mpackrpc::client::{connect, BufferEvent, CHANGEDTICK_EVENT, DETACH_EVENT, LINES_EVENT};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let socket = std::env::var("NVIM").map_err(|_| "set NVIM to the server socket")?;
    let nvim = connect(&socket)?;

    let (tx, rx) = mpsc::channel();
    for name in [LINES_EVENT, CHANGEDTICK_EVENT, DETACH_EVENT] {
        let tx = tx.clone();
        nvim.runtime()
            .register_notification_handler(name, move |_, params| {
                let _ = tx.send(BufferEvent::parse(name, params));
            });
    }

    let buf = nvim.get_current_buf()?;
    if !nvim.buf_attach(buf, true)? {
        return Err(format!("could not attach to buffer {buf}").into());
    }
    eprintln!("[client] attached to buffer {buf}; edit it in Neovim");

    for event in rx {
        match event? {
            BufferEvent::Lines {
                first, last, lines, ..
            } => eprintln!("[client] lines {first}..{last} -> {} new", lines.len()),
            BufferEvent::ChangedTick { changedtick, .. } => {
                eprintln!("[client] changedtick {changedtick}")
            }
            BufferEvent::Detach { .. } => {
                eprintln!("[client] detached");
                break;
            }
            BufferEvent::Other { event, .. } => eprintln!("[client] {event}"),
        }
    }

    nvim.close()?;
    Ok(())
}
