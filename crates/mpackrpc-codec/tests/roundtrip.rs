use bytes::{Bytes, BytesMut};
use mpackrpc_codec::{
    decode_slice, decode_value, encode, encode_fmt, identify, Arg, AtomicCallBatch, CodecConfig,
    CodecError, Ext, MessageReader, MessageWriter, Value, TYPE_TABLE,
};

/// xorshift64, enough to vary tree shapes deterministically.
struct Rng(u64);

impl Rng {
    fn next(&mut self) -> u64 {
        self.0 ^= self.0 << 13;
        self.0 ^= self.0 >> 7;
        self.0 ^= self.0 << 17;
        self.0
    }

    fn below(&mut self, n: u64) -> u64 {
        self.next() % n
    }
}

fn random_value(rng: &mut Rng, depth: usize) -> Value {
    let pick = if depth == 0 { rng.below(6) } else { rng.below(8) };
    match pick {
        0 => Value::Nil,
        1 => Value::Bool(rng.below(2) == 1),
        2 => Value::Int(-((rng.next() >> (rng.below(63) + 1)) as i64)),
        3 => Value::UInt(rng.next() >> rng.below(64)),
        4 => Value::Ext(Ext::new(rng.below(3) as i8, (rng.next() >> 32) as u32)),
        5 => {
            let len = [0, 1, 31, 32, 255, 256, 300][rng.below(7) as usize];
            Value::Str(Bytes::from(vec![b'a' + (rng.below(26) as u8); len]))
        }
        6 => {
            let len = [0, 3, 15, 16, 20][rng.below(5) as usize];
            Value::Array((0..len).map(|_| random_value(rng, depth - 1)).collect())
        }
        _ => {
            let len = [0, 2, 15, 16][rng.below(4) as usize];
            Value::Map(
                (0..len)
                    .map(|_| (random_value(rng, 0), random_value(rng, depth - 1)))
                    .collect(),
            )
        }
    }
}

#[test]
fn random_trees_roundtrip() {
    let mut rng = Rng(0x9E37_79B9_7F4A_7C15);
    for _ in 0..200 {
        let value = random_value(&mut rng, 3);
        let wire = encode(&value).unwrap();
        let (decoded, used) = decode_slice(&wire).unwrap();
        assert_eq!(used, wire.len());
        assert_eq!(decoded, value);
    }
}

#[test]
fn stream_of_trees_in_arbitrary_chunks() {
    let mut rng = Rng(42);
    let values: Vec<Value> = (0..30).map(|_| random_value(&mut rng, 2)).collect();
    let mut wire = Vec::new();
    for value in &values {
        wire.extend_from_slice(&encode(value).unwrap());
    }

    let mut buf = BytesMut::new();
    let mut decoded = Vec::new();
    for chunk in wire.chunks(97) {
        buf.extend_from_slice(chunk);
        while let Some(value) = decode_value(&mut buf, &CodecConfig::default()).unwrap() {
            decoded.push(value);
        }
    }
    assert!(buf.is_empty());
    assert_eq!(decoded, values);
}

#[test]
fn type_table_is_total() {
    for lead in 0..=255u8 {
        match identify(lead) {
            Ok(entry) => assert!(TYPE_TABLE.iter().any(|e| std::ptr::eq(e, entry))),
            Err(CodecError::MalformedTag(b)) => {
                assert_eq!(b, lead);
                assert!(matches!(lead, 0xC1 | 0xCA | 0xCB));
            }
            Err(other) => panic!("unexpected error {other}"),
        }
    }
}

#[test]
fn string_lengths_are_preserved() {
    for len in [0usize, 1, 31, 32, 255, 256, 65_535, 65_536] {
        let value = Value::Str(Bytes::from(vec![0u8; len]));
        let (decoded, _) = decode_slice(&encode(&value).unwrap()).unwrap();
        assert_eq!(decoded.as_bytes().map(|b| b.len()), Some(len));
    }
}

#[test]
#[cfg(unix)]
fn atomic_request_over_a_socket() {
    let (left, right) = std::os::unix::net::UnixStream::pair().unwrap();
    let mut writer = MessageWriter::new(left);
    let mut reader = MessageReader::new(right);

    let mut batch = AtomicCallBatch::new();
    batch.push_call("nvim_buf_get_lines", "d,d,d,b", &[1.into(), 0.into(), (-1).into(), false.into()]);
    batch.push_call("nvim_get_current_line", "", &[]);

    let fmt = format!("[d,d,s:[{}]]", batch.format());
    let encoded = encode_fmt(
        batch.len(),
        &fmt,
        &[0.into(), 3.into(), "nvim_call_atomic".into(), Arg::Batch(batch.records())],
    )
    .unwrap();
    writer.write_encoded(&encoded).unwrap();

    let received = reader.read_message().unwrap();
    assert_eq!(received, encoded.value);
    let calls = received.index(3).and_then(|p| p.index(0)).and_then(Value::as_array).unwrap();
    assert_eq!(calls.len(), 2);
    assert_eq!(calls[0].index(1).and_then(Value::as_array).map(<[_]>::len), Some(4));
}
