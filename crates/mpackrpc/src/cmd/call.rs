use mpackrpc_codec::Arg;

use crate::cmd::CallArgs;
use crate::exit::{client_error, CliError, CliResult, SUCCESS};
use crate::output::{print_result, OutputFormat};

pub fn run(args: CallArgs, format: OutputFormat) -> CliResult<i32> {
    let fmt = args
        .fmt
        .clone()
        .unwrap_or_else(|| vec!["s"; args.args.len()].join(","));
    let params = convert_args(&fmt, &args.args)?;

    let nvim = args.connect.connect()?;
    let value = nvim
        .request(&args.method, &fmt, &params)
        .map_err(|err| client_error("call failed", err))?;
    print_result(&args.method, &value, format);
    let _ = nvim.close();
    Ok(SUCCESS)
}

/// Convert command-line strings into format arguments, one per scalar code.
fn convert_args<'a>(fmt: &str, raw: &'a [String]) -> CliResult<Vec<Arg<'a>>> {
    let mut raw = raw.iter();
    let mut out = Vec::new();

    for ch in fmt.chars() {
        let code = ch.to_ascii_lowercase();
        match code {
            'd' | 'l' | 'u' | 'b' | 's' | 'c' => {}
            '!' | '@' | '*' => {
                return Err(CliError::usage(format!(
                    "format code '{ch}' is not available from the command line"
                )))
            }
            // Structure and separators; unknown codes are reported by the encoder.
            _ => continue,
        }

        let text = raw
            .next()
            .ok_or_else(|| CliError::usage(format!("missing argument for format code '{ch}'")))?;
        let invalid = || CliError::usage(format!("'{text}' is not valid for format code '{ch}'"));
        out.push(match code {
            'd' | 'l' => Arg::Int(text.parse().map_err(|_| invalid())?),
            'u' => Arg::UInt(text.parse().map_err(|_| invalid())?),
            'b' => Arg::Bool(parse_bool(text).ok_or_else(invalid)?),
            _ => Arg::from(text.as_str()),
        });
    }

    if raw.next().is_some() {
        return Err(CliError::usage("more arguments than format codes"));
    }
    Ok(out)
}

fn parse_bool(text: &str) -> Option<bool> {
    match text {
        "true" | "1" | "v:true" => Some(true),
        "false" | "0" | "v:false" => Some(false),
        _ => None,
    }
}
