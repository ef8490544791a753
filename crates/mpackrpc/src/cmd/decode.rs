use std::fs;
use std::io::Read;

use mpackrpc_codec::{decode_slice, CodecError};

use crate::cmd::DecodeArgs;
use crate::exit::{codec_error, io_error, CliError, CliResult, DATA_INVALID, SUCCESS};
use crate::output::{print_decoded, OutputFormat};

pub fn run(args: DecodeArgs, format: OutputFormat) -> CliResult<i32> {
    let raw = match &args.file {
        Some(path) => fs::read(path)
            .map_err(|err| io_error(&format!("failed reading {}", path.display()), err))?,
        None => {
            let mut buf = Vec::new();
            std::io::stdin()
                .read_to_end(&mut buf)
                .map_err(|err| io_error("failed reading stdin", err))?;
            buf
        }
    };
    let bytes = if args.hex { parse_hex(&raw)? } else { raw };

    let mut offset = 0usize;
    while offset < bytes.len() {
        let (value, used) = decode_slice(&bytes[offset..]).map_err(|err| match err {
            CodecError::UnexpectedEof => CliError::new(
                DATA_INVALID,
                format!("truncated value at offset {offset}"),
            ),
            other => codec_error(&format!("decode failed at offset {offset}"), other),
        })?;
        print_decoded(offset, used, &value, format);
        offset += used;
    }

    Ok(SUCCESS)
}

fn parse_hex(text: &[u8]) -> CliResult<Vec<u8>> {
    let digits: Vec<u8> = text
        .iter()
        .copied()
        .filter(|b| !b.is_ascii_whitespace())
        .collect();
    if digits.len() % 2 != 0 {
        return Err(CliError::new(DATA_INVALID, "hex input has an odd number of digits"));
    }

    digits
        .chunks(2)
        .map(|pair| {
            let high = hex_digit(pair[0]);
            let low = hex_digit(pair[1]);
            match (high, low) {
                (Some(high), Some(low)) => Ok(high << 4 | low),
                _ => Err(CliError::new(
                    DATA_INVALID,
                    format!("invalid hex digits '{}'", String::from_utf8_lossy(pair)),
                )),
            }
        })
        .collect()
}

fn hex_digit(b: u8) -> Option<u8> {
    (b as char).to_digit(16).map(|d| d as u8)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_hex_with_whitespace() {
        assert_eq!(parse_hex(b"93 01\n02 0a").unwrap(), vec![0x93, 0x01, 0x02, 0x0A]);
        assert_eq!(parse_hex(b"C0").unwrap(), vec![0xC0]);
    }

    #[test]
    fn rejects_bad_hex() {
        assert!(parse_hex(b"930").is_err());
        assert!(parse_hex(b"zz").is_err());
    }
}
