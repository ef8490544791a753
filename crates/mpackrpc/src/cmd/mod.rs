use std::path::PathBuf;
use std::time::Duration;

use clap::{Args, Subcommand};
use mpackrpc_client::{connect_with_config, ClientConfig, Nvim};

use crate::exit::{client_error, CliError, CliResult};
use crate::output::OutputFormat;

pub mod call;
pub mod decode;
pub mod eval;
pub mod listen;
pub mod version;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Call an API method and print its result.
    Call(CallArgs),
    /// Evaluate a Vimscript expression.
    Eval(EvalArgs),
    /// Subscribe to events and print notifications as they arrive.
    Listen(ListenArgs),
    /// Decode MessagePack data offline.
    Decode(DecodeArgs),
    /// Show version information.
    Version(VersionArgs),
}

pub fn run(command: Command, format: OutputFormat) -> CliResult<i32> {
    match command {
        Command::Call(args) => call::run(args, format),
        Command::Eval(args) => eval::run(args, format),
        Command::Listen(args) => listen::run(args, format),
        Command::Decode(args) => decode::run(args, format),
        Command::Version(args) => version::run(args),
    }
}

#[derive(Args, Debug)]
pub struct ConnectArgs {
    /// Socket of the Neovim instance.
    #[arg(long, short = 's', env = "NVIM", value_name = "PATH")]
    pub socket: PathBuf,
    /// Maximum time to wait for each response (e.g. 5s, 500ms).
    #[arg(long, default_value = "5s")]
    pub timeout: String,
}

impl ConnectArgs {
    pub fn connect(&self) -> CliResult<Nvim> {
        let config = ClientConfig {
            request_timeout: Some(parse_duration(&self.timeout)?),
            ..ClientConfig::default()
        };
        connect_with_config(&self.socket, config).map_err(|err| client_error("connect failed", err))
    }
}

#[derive(Args, Debug)]
pub struct CallArgs {
    #[command(flatten)]
    pub connect: ConnectArgs,
    /// API method, e.g. nvim_buf_line_count.
    pub method: String,
    /// Format of the parameters, one code per argument
    /// (d/l signed, u unsigned, b bool, s/c string, n nil; brackets nest).
    /// Default: every argument is a string.
    #[arg(long, short = 'f')]
    pub fmt: Option<String>,
    /// Parameters, converted according to --fmt.
    #[arg(allow_hyphen_values = true)]
    pub args: Vec<String>,
}

#[derive(Args, Debug)]
pub struct EvalArgs {
    #[command(flatten)]
    pub connect: ConnectArgs,
    /// Vimscript expression.
    pub expr: String,
}

#[derive(Args, Debug)]
pub struct ListenArgs {
    #[command(flatten)]
    pub connect: ConnectArgs,
    /// Event to subscribe to (repeatable).
    #[arg(long = "event", short = 'e', value_name = "EVENT")]
    pub events: Vec<String>,
    /// Attach to a buffer and print its update events (0 = current buffer).
    #[arg(long, value_name = "BUFFER")]
    pub attach: Option<i64>,
    /// Exit after printing N notifications.
    #[arg(long)]
    pub count: Option<usize>,
}

#[derive(Args, Debug)]
pub struct DecodeArgs {
    /// File to decode. Default: stdin.
    pub file: Option<PathBuf>,
    /// Input is hex text; whitespace is ignored.
    #[arg(long)]
    pub hex: bool,
}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Show extended build provenance.
    #[arg(long)]
    pub extended: bool,
}

pub fn parse_duration(input: &str) -> CliResult<Duration> {
    let input = input.trim();
    if input.is_empty() {
        return Err(CliError::usage("duration must not be empty"));
    }

    let (number, unit) = if let Some(num) = input.strip_suffix("ms") {
        (num, "ms")
    } else if let Some(num) = input.strip_suffix('s') {
        (num, "s")
    } else {
        (input, "s")
    };

    let value: u64 = number
        .parse()
        .map_err(|_| CliError::usage(format!("invalid duration value: {input}")))?;

    if value == 0 {
        return Err(CliError::usage("duration must be greater than zero"));
    }

    Ok(match unit {
        "ms" => Duration::from_millis(value),
        _ => Duration::from_secs(value),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_duration_seconds_and_millis() {
        assert_eq!(parse_duration("2s").unwrap(), Duration::from_secs(2));
        assert_eq!(parse_duration("150ms").unwrap(), Duration::from_millis(150));
        assert_eq!(parse_duration("3").unwrap(), Duration::from_secs(3));
    }

    #[test]
    fn parse_duration_rejects_invalid_values() {
        assert!(parse_duration("0s").is_err());
        assert!(parse_duration("bad").is_err());
        assert!(parse_duration("").is_err());
    }
}
