//! CBOR decoder.

use crate::error::{CodecError, CodecResult};
use crate::value::Value;
use std::cmp::Ordering;

/// Decode a value from canonical CBOR bytes.
///
/// The whole input must be consumed.
///
/// # Errors
///
/// Returns an error if the bytes are not valid canonical CBOR.
pub fn from_cbor(bytes: &[u8]) -> CodecResult<Value> {
    CanonicalDecoder::new(bytes).decode_all()
}

/// Maximum allowed element count for arrays and maps.
const MAX_CONTAINER_ELEMENTS: u64 = 16 * 1024 * 1024;

/// Maximum allowed byte/string length.
const MAX_BYTES_LENGTH: u64 = 256 * 1024 * 1024;

/// Maximum nesting depth of arrays and maps.
pub(crate) const MAX_DEPTH: usize = 256;

/// A CBOR decoder.
///
/// In strict mode (the default) input must be canonical: shortest integer
/// encodings, sorted map keys, definite lengths, doubles only. Lenient mode
/// accepts any well-formed CBOR a general-purpose serializer may produce
/// (half/single floats, indefinite lengths, unsorted maps) and normalises
/// maps into canonical key order.
pub struct CanonicalDecoder<'a> {
    data: &'a [u8],
    pos: usize,
    strict: bool,
    depth: usize,
}

impl<'a> CanonicalDecoder<'a> {
    /// Create a strict decoder for the given bytes.
    pub fn new(data: &'a [u8]) -> Self {
        Self {
            data,
            pos: 0,
            strict: true,
            depth: 0,
        }
    }

    /// Create a lenient decoder for the given bytes.
    pub fn lenient(data: &'a [u8]) -> Self {
        Self {
            strict: false,
            ..Self::new(data)
        }
    }

    /// Decode exactly one value and require the input to be fully consumed.
    pub fn decode_all(&mut self) -> CodecResult<Value> {
        let value = self.decode()?;
        if !self.is_empty() {
            return Err(CodecError::invalid_structure(format!(
                "{} trailing bytes",
                self.remaining().len()
            )));
        }
        Ok(value)
    }

    /// Decode the next value.
    pub fn decode(&mut self) -> CodecResult<Value> {
        let initial_byte = self.read_byte()?;
        self.decode_item(initial_byte)
    }

    /// Check if all bytes have been consumed.
    pub fn is_empty(&self) -> bool {
        self.pos >= self.data.len()
    }

    /// Get remaining bytes.
    pub fn remaining(&self) -> &[u8] {
        &self.data[self.pos..]
    }

    fn decode_item(&mut self, initial_byte: u8) -> CodecResult<Value> {
        let major_type = initial_byte >> 5;
        let additional_info = initial_byte & 0x1f;

        match major_type {
            0 => {
                let n = self.decode_unsigned(additional_info)?;
                i64::try_from(n)
                    .map(Value::Integer)
                    .map_err(|_| CodecError::IntegerOverflow)
            }
            1 => {
                let n = self.decode_unsigned(additional_info)?;
                // Negative integer: value is -(n+1)
                i64::try_from(n)
                    .map(|n| Value::Integer(-n - 1))
                    .map_err(|_| CodecError::IntegerOverflow)
            }
            2 => self.decode_bytes(additional_info).map(Value::Bytes),
            3 => self.decode_text(additional_info).map(Value::Text),
            4 => self.nested(|d| d.decode_array(additional_info)),
            5 => self.nested(|d| d.decode_map(additional_info)),
            6 => {
                // Tagged value: the tag is dropped
                let _tag = self.decode_unsigned(additional_info)?;
                self.decode()
            }
            _ => self.decode_simple(additional_info),
        }
    }

    fn nested(&mut self, f: impl FnOnce(&mut Self) -> CodecResult<Value>) -> CodecResult<Value> {
        if self.depth >= MAX_DEPTH {
            return Err(CodecError::invalid_structure("nesting too deep"));
        }
        self.depth += 1;
        let result = f(self);
        self.depth -= 1;
        result
    }

    #[inline]
    fn read_byte(&mut self) -> CodecResult<u8> {
        let byte = *self.data.get(self.pos).ok_or(CodecError::Truncated)?;
        self.pos += 1;
        Ok(byte)
    }

    #[inline]
    fn peek_byte(&self) -> CodecResult<u8> {
        self.data.get(self.pos).copied().ok_or(CodecError::Truncated)
    }

    #[inline]
    fn read_bytes(&mut self, len: usize) -> CodecResult<&'a [u8]> {
        let data: &'a [u8] = self.data;
        let end = self.pos.checked_add(len).ok_or(CodecError::Truncated)?;
        let bytes = data.get(self.pos..end).ok_or(CodecError::Truncated)?;
        self.pos = end;
        Ok(bytes)
    }

    fn read_array<const N: usize>(&mut self) -> CodecResult<[u8; N]> {
        let bytes = self.read_bytes(N)?;
        bytes
            .try_into()
            .map_err(|_| CodecError::Truncated)
    }

    fn decode_unsigned(&mut self, additional_info: u8) -> CodecResult<u64> {
        let (value, fits_shorter) = match additional_info {
            0..=23 => return Ok(u64::from(additional_info)),
            24 => {
                let v = u64::from(self.read_byte()?);
                (v, v < 24)
            }
            25 => {
                let v = u64::from(u16::from_be_bytes(self.read_array()?));
                (v, v <= 0xFF)
            }
            26 => {
                let v = u64::from(u32::from_be_bytes(self.read_array()?));
                (v, v <= 0xFFFF)
            }
            27 => {
                let v = u64::from_be_bytes(self.read_array()?);
                (v, v <= 0xFFFF_FFFF)
            }
            28..=30 => return Err(CodecError::invalid_structure("reserved additional info")),
            _ => return Err(CodecError::IndefiniteLength),
        };

        if self.strict && fits_shorter {
            return Err(CodecError::invalid_structure(
                "non-canonical: value could be encoded in fewer bytes",
            ));
        }
        Ok(value)
    }

    /// Reads a definite length, or `None` for an indefinite-length item.
    fn decode_length(&mut self, additional_info: u8, max: u64) -> CodecResult<Option<usize>> {
        if additional_info == 31 {
            if self.strict {
                return Err(CodecError::IndefiniteLength);
            }
            return Ok(None);
        }
        let len = self.decode_unsigned(additional_info)?;
        if len > max {
            return Err(CodecError::TooLarge {
                claimed: len,
                limit: max,
            });
        }
        usize::try_from(len)
            .map(Some)
            .map_err(|_| CodecError::TooLarge {
                claimed: len,
                limit: max,
            })
    }

    /// Consumes a break byte if one is next.
    fn at_break(&mut self) -> CodecResult<bool> {
        if self.peek_byte()? == 0xff {
            self.pos += 1;
            return Ok(true);
        }
        Ok(false)
    }

    fn decode_bytes(&mut self, additional_info: u8) -> CodecResult<Vec<u8>> {
        match self.decode_length(additional_info, MAX_BYTES_LENGTH)? {
            Some(len) => Ok(self.read_bytes(len)?.to_vec()),
            None => {
                let mut out = Vec::new();
                while !self.at_break()? {
                    let initial = self.read_byte()?;
                    if initial >> 5 != 2 || initial & 0x1f == 31 {
                        return Err(CodecError::invalid_structure(
                            "invalid chunk in indefinite byte string",
                        ));
                    }
                    out.extend(self.decode_bytes(initial & 0x1f)?);
                }
                Ok(out)
            }
        }
    }

    fn decode_text(&mut self, additional_info: u8) -> CodecResult<String> {
        match self.decode_length(additional_info, MAX_BYTES_LENGTH)? {
            Some(len) => {
                let bytes = self.read_bytes(len)?;
                std::str::from_utf8(bytes)
                    .map(str::to_string)
                    .map_err(|_| CodecError::InvalidUtf8)
            }
            None => {
                let mut out = String::new();
                while !self.at_break()? {
                    let initial = self.read_byte()?;
                    if initial >> 5 != 3 || initial & 0x1f == 31 {
                        return Err(CodecError::invalid_structure(
                            "invalid chunk in indefinite text string",
                        ));
                    }
                    out.push_str(&self.decode_text(initial & 0x1f)?);
                }
                Ok(out)
            }
        }
    }

    fn decode_array(&mut self, additional_info: u8) -> CodecResult<Value> {
        let mut items = Vec::new();
        match self.decode_length(additional_info, MAX_CONTAINER_ELEMENTS)? {
            Some(len) => {
                items.reserve(len.min(1024));
                for _ in 0..len {
                    items.push(self.decode()?);
                }
            }
            None => {
                while !self.at_break()? {
                    items.push(self.decode()?);
                }
            }
        }
        Ok(Value::Array(items))
    }

    fn decode_map(&mut self, additional_info: u8) -> CodecResult<Value> {
        let mut pairs = Vec::new();
        let mut prev_key_bytes: Option<&'a [u8]> = None;

        let mut remaining = self.decode_length(additional_info, MAX_CONTAINER_ELEMENTS)?;
        loop {
            match remaining.as_mut() {
                Some(0) => break,
                Some(n) => *n -= 1,
                None => {
                    if self.at_break()? {
                        break;
                    }
                }
            }

            let data: &'a [u8] = self.data;
            let key_start = self.pos;
            let key = self.decode()?;
            let key_bytes = &data[key_start..self.pos];

            if self.strict {
                if let Some(prev) = prev_key_bytes {
                    if compare_cbor_bytes(prev, key_bytes) != Ordering::Less {
                        return Err(CodecError::invalid_structure(
                            "non-canonical: map keys not in sorted order",
                        ));
                    }
                }
                prev_key_bytes = Some(key_bytes);
            }

            let value = self.decode()?;
            pairs.push((key, value));
        }

        if self.strict {
            Ok(Value::Map(pairs))
        } else {
            Ok(Value::map(pairs))
        }
    }

    fn decode_simple(&mut self, additional_info: u8) -> CodecResult<Value> {
        match additional_info {
            20 => Ok(Value::Bool(false)),
            21 => Ok(Value::Bool(true)),
            // undefined is read as null
            22 | 23 => Ok(Value::Null),
            24 => {
                let simple = self.read_byte()?;
                Err(CodecError::unsupported_type(format!("simple value {simple}")))
            }
            25 | 26 if self.strict => Err(CodecError::invalid_structure(
                "non-canonical: floats must be encoded as doubles",
            )),
            25 => Ok(Value::Float(f16_to_f64(u16::from_be_bytes(self.read_array()?)))),
            26 => Ok(Value::Float(f64::from(f32::from_be_bytes(self.read_array()?)))),
            27 => Ok(Value::Float(f64::from_be_bytes(self.read_array()?))),
            28..=30 => Err(CodecError::invalid_structure("reserved additional info")),
            31 => Err(CodecError::invalid_structure("break without indefinite")),
            _ => Err(CodecError::unsupported_type(format!(
                "simple value {additional_info}"
            ))),
        }
    }
}

/// Compare two CBOR byte sequences for canonical ordering.
/// Uses length-first, then bytewise comparison.
fn compare_cbor_bytes(a: &[u8], b: &[u8]) -> Ordering {
    a.len().cmp(&b.len()).then_with(|| a.cmp(b))
}

/// Widens an IEEE 754 half-precision float.
fn f16_to_f64(bits: u16) -> f64 {
    let sign = if bits & 0x8000 == 0 { 1.0 } else { -1.0 };
    let exponent = i32::from((bits >> 10) & 0x1f);
    let fraction = f64::from(bits & 0x03ff);

    match exponent {
        0 => sign * fraction * 2f64.powi(-24),
        31 if fraction == 0.0 => sign * f64::INFINITY,
        31 => f64::NAN,
        _ => sign * (1.0 + fraction / 1024.0) * 2f64.powi(exponent - 15),
    }
}
