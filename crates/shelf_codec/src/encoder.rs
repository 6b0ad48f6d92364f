//! Canonical CBOR encoder.
//!
//! Output follows the deterministic encoding of RFC 8949 §4.2.1, with one
//! local rule: floats are always written as 64-bit doubles so that a stored
//! number never changes width between writes.

use crate::decoder::MAX_DEPTH;
use crate::error::{CodecError, CodecResult};
use crate::value::Value;

const MAJOR_UNSIGNED: u8 = 0;
const MAJOR_NEGATIVE: u8 = 1;
const MAJOR_BYTES: u8 = 2;
const MAJOR_TEXT: u8 = 3;
const MAJOR_ARRAY: u8 = 4;
const MAJOR_MAP: u8 = 5;

const FALSE: u8 = 0xf4;
const TRUE: u8 = 0xf5;
const NULL: u8 = 0xf6;
const FLOAT64: u8 = 0xfb;

/// Encodes `value` as canonical CBOR.
///
/// # Errors
///
/// [`CodecError::InvalidStructure`] if arrays and maps nest deeper than the
/// decoder accepts.
pub fn to_canonical_cbor(value: &Value) -> CodecResult<Vec<u8>> {
    let mut out = Vec::new();
    encode_into(value, &mut out)?;
    Ok(out)
}

/// Appends the canonical encoding of `value` to `out`.
///
/// On error `out` may hold a partial encoding.
///
/// # Errors
///
/// Same as [`to_canonical_cbor`].
pub fn encode_into(value: &Value, out: &mut Vec<u8>) -> CodecResult<()> {
    write_value(out, value, 0)
}

fn write_value(out: &mut Vec<u8>, value: &Value, depth: usize) -> CodecResult<()> {
    match value {
        Value::Null => out.push(NULL),
        Value::Bool(b) => out.push(if *b { TRUE } else { FALSE }),
        Value::Integer(n) => match u64::try_from(*n) {
            Ok(unsigned) => write_head(out, MAJOR_UNSIGNED, unsigned),
            // -1 - n, which never overflows for negative n
            Err(_) => write_head(out, MAJOR_NEGATIVE, !(*n as u64)),
        },
        Value::Float(f) => {
            out.push(FLOAT64);
            out.extend_from_slice(&f.to_bits().to_be_bytes());
        }
        Value::Bytes(bytes) => {
            write_head(out, MAJOR_BYTES, bytes.len() as u64);
            out.extend_from_slice(bytes);
        }
        Value::Text(text) => {
            write_head(out, MAJOR_TEXT, text.len() as u64);
            out.extend_from_slice(text.as_bytes());
        }
        Value::Array(items) => {
            let depth = enter(depth)?;
            write_head(out, MAJOR_ARRAY, items.len() as u64);
            for item in items {
                write_value(out, item, depth)?;
            }
        }
        Value::Map(pairs) => {
            let depth = enter(depth)?;
            write_map(out, pairs, depth)?;
        }
    }
    Ok(())
}

fn enter(depth: usize) -> CodecResult<usize> {
    if depth >= MAX_DEPTH {
        return Err(CodecError::invalid_structure("nesting too deep to encode"));
    }
    Ok(depth + 1)
}

/// Maps are ordered by encoded key: shorter encodings first, then bytewise.
/// `Value::map` already keeps that order, but a `Value::Map` built directly
/// may not.
fn write_map(out: &mut Vec<u8>, pairs: &[(Value, Value)], depth: usize) -> CodecResult<()> {
    let mut entries = pairs
        .iter()
        .map(|(key, value)| {
            let mut encoded = Vec::new();
            write_value(&mut encoded, key, depth)?;
            Ok((encoded, value))
        })
        .collect::<CodecResult<Vec<_>>>()?;
    entries.sort_by(|(a, _), (b, _)| a.len().cmp(&b.len()).then_with(|| a.cmp(b)));

    write_head(out, MAJOR_MAP, entries.len() as u64);
    for (key, value) in entries {
        out.extend_from_slice(&key);
        write_value(out, value, depth)?;
    }
    Ok(())
}

/// Writes a major type with its argument in the shortest form.
#[allow(clippy::cast_possible_truncation)]
fn write_head(out: &mut Vec<u8>, major: u8, arg: u64) {
    let major = major << 5;
    match arg {
        0..=23 => out.push(major | arg as u8),
        24..=0xff => out.extend_from_slice(&[major | 24, arg as u8]),
        0x100..=0xffff => {
            out.push(major | 25);
            out.extend_from_slice(&(arg as u16).to_be_bytes());
        }
        0x1_0000..=0xffff_ffff => {
            out.push(major | 26);
            out.extend_from_slice(&(arg as u32).to_be_bytes());
        }
        _ => {
            out.push(major | 27);
            out.extend_from_slice(&arg.to_be_bytes());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn enc(value: &Value) -> Vec<u8> {
        to_canonical_cbor(value).unwrap()
    }

    #[test]
    fn simple_values() {
        assert_eq!(enc(&Value::Null), [0xf6]);
        assert_eq!(enc(&Value::Bool(false)), [0xf4]);
        assert_eq!(enc(&Value::Bool(true)), [0xf5]);
    }

    #[test]
    fn integer_widths() {
        assert_eq!(enc(&Value::Integer(0)), [0x00]);
        assert_eq!(enc(&Value::Integer(23)), [0x17]);
        assert_eq!(enc(&Value::Integer(24)), [0x18, 24]);
        assert_eq!(enc(&Value::Integer(255)), [0x18, 0xff]);
        assert_eq!(enc(&Value::Integer(256)), [0x19, 0x01, 0x00]);
        assert_eq!(enc(&Value::Integer(65_536)), [0x1a, 0x00, 0x01, 0x00, 0x00]);
        assert_eq!(
            enc(&Value::Integer(i64::MAX)),
            [0x1b, 0x7f, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff]
        );
    }

    #[test]
    fn negative_integers() {
        assert_eq!(enc(&Value::Integer(-1)), [0x20]);
        assert_eq!(enc(&Value::Integer(-24)), [0x37]);
        assert_eq!(enc(&Value::Integer(-25)), [0x38, 24]);
        assert_eq!(
            enc(&Value::Integer(i64::MIN)),
            [0x3b, 0x7f, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff]
        );
    }

    #[test]
    fn floats_are_doubles() {
        assert_eq!(enc(&Value::Float(1.5)), [0xfb, 0x3f, 0xf8, 0, 0, 0, 0, 0, 0]);
    }

    #[test]
    fn text_and_bytes() {
        assert_eq!(enc(&Value::from("abc")), [0x63, b'a', b'b', b'c']);
        assert_eq!(enc(&Value::Bytes(vec![1, 2])), [0x42, 1, 2]);
    }

    #[test]
    fn hand_built_map_is_sorted() {
        let unsorted = Value::Map(vec![
            (Value::from("bb"), Value::Integer(1)),
            (Value::from("a"), Value::Integer(2)),
        ]);
        let sorted = Value::object([("a", Value::Integer(2)), ("bb", Value::Integer(1))]);
        assert_eq!(enc(&unsorted), enc(&sorted));
        assert_eq!(enc(&sorted)[..3], [0xa2, 0x61, b'a']);
    }

    #[test]
    fn nested_array() {
        let value = Value::Array(vec![Value::Integer(1), Value::Array(vec![])]);
        assert_eq!(enc(&value), [0x82, 0x01, 0x80]);
    }

    #[test]
    fn encode_into_appends() {
        let mut out = vec![0xaa];
        encode_into(&Value::Integer(1), &mut out).unwrap();
        encode_into(&Value::Null, &mut out).unwrap();
        assert_eq!(out, [0xaa, 0x01, 0xf6]);
    }

    #[test]
    fn too_deep_is_rejected() {
        let mut value = Value::Null;
        for _ in 0..=MAX_DEPTH {
            value = Value::Array(vec![value]);
        }
        assert!(matches!(
            to_canonical_cbor(&value),
            Err(CodecError::InvalidStructure { .. })
        ));
    }
}
