//! Print the current buffer of a running Neovim, then run a few calls in one
//! atomic batch.
//!
//! Run with:
//!   NVIM=/path/to/socket cargo run --example current-buffer

use mpackrpc::client::connect;
use mpackrpc::codec::{Arg, AtomicCallBatch};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let socket = std::env::var("NVIM").map_err(|_| "set NVIM to the server socket")?;
    let nvim = connect(&socket)?;
    nvim.set_client_info("current-buffer", (0, 1, ""), "remote")?;

    let (channel_id, _metadata) = nvim.get_api_info()?;
    let buf = nvim.get_current_buf()?;
    eprintln!(
        "[client] channel {channel_id}, buffer {buf}: {}",
        nvim.buf_get_name(buf)?
    );

    for (i, line) in nvim.buf_get_lines(buf, 0, -1, false)?.iter().enumerate() {
        println!("{:>4} {}", i + 1, String::from_utf8_lossy(line));
    }

    let mut batch = AtomicCallBatch::new();
    batch
        .push_call("nvim_buf_line_count", "d", &[Arg::Int(buf)])
        .push_call("nvim_buf_get_changedtick", "d", &[Arg::Int(buf)])
        .push_call("nvim_eval", "s", &[Arg::from("&filetype")]);
    let response = nvim.call_atomic(&batch)?;
    for result in &response.results {
        eprintln!("[client] atomic result: {result}");
    }
    if let Some(failure) = response.error {
        eprintln!("[client] call {} failed: {}", failure.index, failure.error);
    }

    nvim.close()?;
    Ok(())
}
