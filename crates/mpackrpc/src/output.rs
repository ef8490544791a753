use std::io::IsTerminal;
use std::time::{SystemTime, UNIX_EPOCH};

use clap::ValueEnum;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use mpackrpc_client::BufferEvent;
use mpackrpc_codec::Value;
use serde::Serialize;
use serde_json::{json, Map, Value as Json};

#[derive(Clone, Debug, Copy, ValueEnum)]
pub enum OutputFormat {
    Json,
    Table,
    Pretty,
}

impl OutputFormat {
    pub fn default_for_stdout() -> Self {
        if std::io::stdout().is_terminal() {
            Self::Table
        } else {
            Self::Json
        }
    }
}

/// JSON rendering of a value. Strings are decoded lossily, non-string map
/// keys are printed in their dump form, ext values become
/// `{"ext": kind, "handle": n}`.
pub fn to_json(value: &Value) -> Json {
    match value {
        Value::Nil => Json::Null,
        Value::Bool(b) => Json::Bool(*b),
        Value::Int(n) => json!(n),
        Value::UInt(n) => json!(n),
        Value::Ext(ext) => json!({ "ext": ext.kind, "handle": ext.num }),
        Value::Str(bytes) => Json::String(String::from_utf8_lossy(bytes).into_owned()),
        Value::Array(items) => Json::Array(items.iter().map(to_json).collect()),
        Value::Map(entries) => {
            let mut object = Map::with_capacity(entries.len());
            for (key, value) in entries {
                let key = match key.as_bytes() {
                    Some(bytes) => String::from_utf8_lossy(bytes).into_owned(),
                    None => key.to_string(),
                };
                object.insert(key, to_json(value));
            }
            Json::Object(object)
        }
    }
}

#[derive(Serialize)]
struct ResultOutput<'a> {
    method: &'a str,
    kind: &'a str,
    result: Json,
    timestamp: String,
}

pub fn print_result(method: &str, value: &Value, format: OutputFormat) {
    match format {
        OutputFormat::Json => {
            let out = ResultOutput {
                method,
                kind: value.kind().as_str(),
                result: to_json(value),
                timestamp: now_unix_seconds(),
            };
            print_json(&out);
        }
        OutputFormat::Table => {
            let mut table = new_table();
            match value {
                Value::Array(items) => {
                    table.set_header(vec!["INDEX", "KIND", "VALUE"]);
                    for (i, item) in items.iter().enumerate() {
                        table.add_row(vec![i.to_string(), item.kind().to_string(), cell(item)]);
                    }
                }
                Value::Map(entries) => {
                    table.set_header(vec!["KEY", "KIND", "VALUE"]);
                    for (key, item) in entries {
                        table.add_row(vec![cell(key), item.kind().to_string(), cell(item)]);
                    }
                }
                scalar => {
                    table
                        .set_header(vec!["METHOD", "KIND", "VALUE"])
                        .add_row(vec![method.to_string(), scalar.kind().to_string(), cell(scalar)]);
                }
            }
            println!("{table}");
        }
        OutputFormat::Pretty => println!("{value}"),
    }
}

#[derive(Serialize)]
struct NotificationOutput<'a> {
    channel: u16,
    event: &'a str,
    params: Json,
    timestamp: String,
}

pub fn print_notification(channel: u16, event: &str, params: &[Value], format: OutputFormat) {
    let rendered = Json::Array(params.iter().map(to_json).collect());
    match format {
        OutputFormat::Json => print_json(&NotificationOutput {
            channel,
            event,
            params: rendered,
            timestamp: now_unix_seconds(),
        }),
        OutputFormat::Table => {
            let mut table = new_table();
            table
                .set_header(vec!["CHANNEL", "EVENT", "PARAMS"])
                .add_row(vec![channel.to_string(), event.to_string(), rendered.to_string()]);
            println!("{table}");
        }
        OutputFormat::Pretty => println!("channel={channel} event={event} params={rendered}"),
    }
}

pub fn buffer_event_json(event: &BufferEvent) -> Json {
    match event {
        BufferEvent::Lines {
            buffer,
            changedtick,
            first,
            last,
            lines,
            more,
        } => json!({
            "type": "lines",
            "buffer": buffer,
            "changedtick": changedtick,
            "first": first,
            "last": last,
            "lines": lines
                .iter()
                .map(|line| String::from_utf8_lossy(line).into_owned())
                .collect::<Vec<_>>(),
            "more": more,
        }),
        BufferEvent::ChangedTick {
            buffer,
            changedtick,
        } => json!({ "type": "changedtick", "buffer": buffer, "changedtick": changedtick }),
        BufferEvent::Detach { buffer } => json!({ "type": "detach", "buffer": buffer }),
        BufferEvent::Other { event, params } => json!({
            "type": "other",
            "event": event,
            "params": params.iter().map(to_json).collect::<Vec<_>>(),
        }),
    }
}

pub fn print_buffer_event(channel: u16, event: &BufferEvent, format: OutputFormat) {
    let mut rendered = buffer_event_json(event);
    match format {
        OutputFormat::Json => {
            if let Json::Object(object) = &mut rendered {
                object.insert("channel".into(), json!(channel));
                object.insert("timestamp".into(), json!(now_unix_seconds()));
            }
            print_json(&rendered);
        }
        OutputFormat::Table => {
            let mut table = new_table();
            table.set_header(vec!["CHANNEL", "BUFFER", "DETAIL"]).add_row(vec![
                channel.to_string(),
                event.buffer().map(|b| b.to_string()).unwrap_or_default(),
                rendered.to_string(),
            ]);
            println!("{table}");
        }
        OutputFormat::Pretty => println!("channel={channel} {rendered}"),
    }
}

#[derive(Serialize)]
struct DecodedOutput<'a> {
    offset: usize,
    size: usize,
    kind: &'a str,
    value: Json,
}

pub fn print_decoded(offset: usize, size: usize, value: &Value, format: OutputFormat) {
    match format {
        OutputFormat::Json => print_json(&DecodedOutput {
            offset,
            size,
            kind: value.kind().as_str(),
            value: to_json(value),
        }),
        OutputFormat::Table => {
            let mut table = new_table();
            table
                .set_header(vec!["OFFSET", "SIZE", "KIND", "VALUE"])
                .add_row(vec![
                    offset.to_string(),
                    size.to_string(),
                    value.kind().to_string(),
                    cell(value),
                ]);
            println!("{table}");
        }
        OutputFormat::Pretty => println!("@{offset} ({size} bytes) {value}"),
    }
}

fn print_json<T: Serialize>(out: &T) {
    println!(
        "{}",
        serde_json::to_string(out).unwrap_or_else(|_| "{}".to_string())
    );
}

fn new_table() -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic);
    table
}

fn cell(value: &Value) -> String {
    match value.as_bytes() {
        Some(bytes) => String::from_utf8_lossy(bytes).into_owned(),
        None => value.to_string(),
    }
}

fn now_unix_seconds() -> String {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs().to_string())
        .unwrap_or_else(|_| "0".to_string())
}
