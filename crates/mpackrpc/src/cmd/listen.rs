use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::Arc;
use std::time::Duration;

use mpackrpc_client::{BufferEvent, CHANGEDTICK_EVENT, DETACH_EVENT, LINES_EVENT};
use mpackrpc_codec::Value;
use tracing::{debug, warn};

use crate::cmd::ListenArgs;
use crate::exit::{client_error, CliError, CliResult, FAILURE, INTERNAL, SUCCESS};
use crate::output::{print_buffer_event, print_notification, OutputFormat};

/// How often the main loop checks for Ctrl-C and a dead channel.
const TICK: Duration = Duration::from_millis(200);

enum Incoming {
    Notification {
        channel: u16,
        event: String,
        params: Vec<Value>,
    },
    Buffer {
        channel: u16,
        event: BufferEvent,
    },
}

pub fn run(args: ListenArgs, format: OutputFormat) -> CliResult<i32> {
    if args.events.is_empty() && args.attach.is_none() {
        return Err(CliError::usage(
            "nothing to listen for: pass --event or --attach",
        ));
    }

    let nvim = args.connect.connect()?;
    let runtime = nvim.runtime().clone();
    let (tx, rx) = mpsc::channel();

    for event in &args.events {
        let tx = tx.clone();
        let name = event.clone();
        runtime.register_notification_handler(event.as_str(), move |channel, params| {
            let _ = tx.send(Incoming::Notification {
                channel,
                event: name.clone(),
                params,
            });
        });
        nvim.subscribe(event)
            .map_err(|err| client_error("subscribe failed", err))?;
        debug!(event = %event, "subscribed");
    }

    if let Some(buffer) = args.attach {
        for name in [LINES_EVENT, CHANGEDTICK_EVENT, DETACH_EVENT] {
            let tx = tx.clone();
            runtime.register_notification_handler(name, move |channel, params| {
                match BufferEvent::parse(name, params) {
                    Ok(event) => {
                        let _ = tx.send(Incoming::Buffer { channel, event });
                    }
                    Err(err) => warn!(error = %err, "dropping malformed buffer event"),
                }
            });
        }
        let attached = nvim
            .buf_attach(buffer, false)
            .map_err(|err| client_error("attach failed", err))?;
        if !attached {
            return Err(CliError::new(
                FAILURE,
                format!("could not attach to buffer {buffer}"),
            ));
        }
        debug!(buffer, "attached to buffer");
    }
    drop(tx);

    let running = Arc::new(AtomicBool::new(true));
    install_ctrlc_handler(running.clone())?;

    let mut printed = 0usize;
    while running.load(Ordering::SeqCst) {
        let incoming = match rx.recv_timeout(TICK) {
            Ok(incoming) => incoming,
            Err(RecvTimeoutError::Timeout) => {
                if !runtime.is_open(nvim.channel()) {
                    return Err(CliError::new(FAILURE, "connection closed by host"));
                }
                continue;
            }
            Err(RecvTimeoutError::Disconnected) => break,
        };

        match incoming {
            Incoming::Notification {
                channel,
                event,
                params,
            } => print_notification(channel, &event, &params, format),
            Incoming::Buffer { channel, event } => print_buffer_event(channel, &event, format),
        }
        printed = printed.saturating_add(1);

        if let Some(count) = args.count {
            if printed >= count {
                break;
            }
        }
    }

    let _ = nvim.close();
    Ok(SUCCESS)
}

fn install_ctrlc_handler(running: Arc<AtomicBool>) -> CliResult<()> {
    ctrlc::set_handler(move || {
        running.store(false, Ordering::SeqCst);
    })
    .map_err(|err| CliError::new(INTERNAL, format!("signal handler setup failed: {err}")))
}
