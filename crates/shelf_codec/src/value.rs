//! Dynamic value type for stored records.

use std::cmp::Ordering;

/// A dynamic record value.
///
/// Every record a store holds is a `Value`. Typed records are converted with
/// [`crate::to_value`] and [`crate::from_value`]; index keys are derived from
/// values with [`crate::KeyPath`].
///
/// Floats are always encoded as 64-bit IEEE 754 doubles so that encoding
/// stays deterministic.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// Null value.
    Null,
    /// Boolean value.
    Bool(bool),
    /// Signed integer (supports full i64 range).
    Integer(i64),
    /// Double-precision float.
    Float(f64),
    /// Byte string.
    Bytes(Vec<u8>),
    /// Text string (UTF-8).
    Text(String),
    /// Array of values.
    Array(Vec<Value>),
    /// Map of key-value pairs (keys are sorted for canonical encoding).
    Map(Vec<(Value, Value)>),
}

impl Value {
    /// Create a map value with sorted keys.
    ///
    /// Keys are sorted by their canonical CBOR encoding (length-first, then
    /// bytewise).
    pub fn map(mut pairs: Vec<(Value, Value)>) -> Self {
        pairs.sort_by(|a, b| a.0.cmp_canonical(&b.0));
        Value::Map(pairs)
    }

    /// Create a map value from text keys.
    pub fn object<K: Into<String>>(fields: impl IntoIterator<Item = (K, Value)>) -> Self {
        Self::map(
            fields
                .into_iter()
                .map(|(k, v)| (Value::Text(k.into()), v))
                .collect(),
        )
    }

    /// Compare two values for canonical ordering.
    ///
    /// This is the ordering of their canonical CBOR encodings, which is the
    /// order map keys are written in.
    pub fn cmp_canonical(&self, other: &Self) -> Ordering {
        let self_type = self.major_type();
        let other_type = other.major_type();

        if self_type != other_type {
            return self_type.cmp(&other_type);
        }

        match (self, other) {
            (Value::Integer(a), Value::Integer(b)) => {
                // Same sign here; the CBOR argument is n for n >= 0 and -1 - n
                // for n < 0, compared length-first.
                #[allow(clippy::cast_sign_loss)]
                let arg = |n: i64| if n >= 0 { n as u64 } else { (-1 - n) as u64 };
                Self::cmp_unsigned_canonical(arg(*a), arg(*b))
            }
            (Value::Bytes(a), Value::Bytes(b)) => a.len().cmp(&b.len()).then_with(|| a.cmp(b)),
            (Value::Text(a), Value::Text(b)) => a.len().cmp(&b.len()).then_with(|| a.cmp(b)),
            (Value::Array(a), Value::Array(b)) => a.len().cmp(&b.len()).then_with(|| {
                a.iter()
                    .zip(b.iter())
                    .map(|(av, bv)| av.cmp_canonical(bv))
                    .find(|ord| *ord != Ordering::Equal)
                    .unwrap_or(Ordering::Equal)
            }),
            (Value::Map(a), Value::Map(b)) => a.len().cmp(&b.len()).then_with(|| {
                a.iter()
                    .zip(b.iter())
                    .map(|((ak, av), (bk, bv))| {
                        ak.cmp_canonical(bk).then_with(|| av.cmp_canonical(bv))
                    })
                    .find(|ord| *ord != Ordering::Equal)
                    .unwrap_or(Ordering::Equal)
            }),
            // Major type 7: one-byte simple values sort before 9-byte doubles.
            _ => self
                .simple_rank()
                .cmp(&other.simple_rank())
                .then_with(|| match (self, other) {
                    (Value::Float(a), Value::Float(b)) => a.to_bits().cmp(&b.to_bits()),
                    _ => Ordering::Equal,
                }),
        }
    }

    /// Compare two unsigned integers by their canonical CBOR encoding.
    fn cmp_unsigned_canonical(a: u64, b: u64) -> Ordering {
        Self::cbor_uint_encoded_len(a)
            .cmp(&Self::cbor_uint_encoded_len(b))
            .then(a.cmp(&b))
    }

    /// Returns the encoded length (in bytes) of an unsigned integer in CBOR.
    fn cbor_uint_encoded_len(n: u64) -> usize {
        if n <= 23 {
            1
        } else if n <= 0xFF {
            2
        } else if n <= 0xFFFF {
            3
        } else if n <= 0xFFFF_FFFF {
            5
        } else {
            9
        }
    }

    /// Initial byte of major-type-7 values, used to order them.
    fn simple_rank(&self) -> u8 {
        match self {
            Value::Bool(false) => 0xf4,
            Value::Bool(true) => 0xf5,
            Value::Null => 0xf6,
            _ => 0xfb,
        }
    }

    /// Get the CBOR major type for this value.
    fn major_type(&self) -> u8 {
        match self {
            Value::Integer(n) if *n >= 0 => 0,
            Value::Integer(_) => 1,
            Value::Bytes(_) => 2,
            Value::Text(_) => 3,
            Value::Array(_) => 4,
            Value::Map(_) => 5,
            Value::Bool(_) | Value::Null | Value::Float(_) => 7,
        }
    }

    /// Check if this value is null.
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Get this value as a boolean, if it is one.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Get this value as an integer, if it is one.
    pub fn as_integer(&self) -> Option<i64> {
        match self {
            Value::Integer(n) => Some(*n),
            _ => None,
        }
    }

    /// Get this value as a number, if it is an integer or a float.
    #[allow(clippy::cast_precision_loss)]
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Value::Integer(n) => Some(*n as f64),
            Value::Float(f) => Some(*f),
            _ => None,
        }
    }

    /// Get this value as bytes, if it is a byte string.
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Value::Bytes(b) => Some(b),
            _ => None,
        }
    }

    /// Get this value as a string, if it is a text string.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Get this value as an array, if it is one.
    pub fn as_array(&self) -> Option<&[Value]> {
        match self {
            Value::Array(a) => Some(a),
            _ => None,
        }
    }

    /// Get this value as a map, if it is one.
    pub fn as_map(&self) -> Option<&[(Value, Value)]> {
        match self {
            Value::Map(m) => Some(m),
            _ => None,
        }
    }

    /// Look up a text key in this map value.
    pub fn get(&self, key: &str) -> Option<&Value> {
        match self {
            Value::Map(pairs) => pairs
                .iter()
                .find(|(k, _)| k.as_text() == Some(key))
                .map(|(_, v)| v),
            _ => None,
        }
    }

    /// Insert or replace a text-keyed field, keeping keys sorted.
    ///
    /// Non-map values are replaced by a single-field map.
    pub fn set(&mut self, key: &str, value: Value) {
        let mut pairs = match std::mem::replace(self, Value::Null) {
            Value::Map(pairs) => pairs,
            _ => Vec::new(),
        };
        pairs.retain(|(k, _)| k.as_text() != Some(key));
        pairs.push((Value::Text(key.to_string()), value));
        *self = Value::map(pairs);
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Integer(n)
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Value::Integer(i64::from(n))
    }
}

impl From<u32> for Value {
    fn from(n: u32) -> Self {
        Value::Integer(i64::from(n))
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Value::Float(f)
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Text(s)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Text(s.to_string())
    }
}

impl From<Vec<u8>> for Value {
    fn from(b: Vec<u8>) -> Self {
        Value::Bytes(b)
    }
}

impl From<&[u8]> for Value {
    fn from(b: &[u8]) -> Self {
        Value::Bytes(b.to_vec())
    }
}

impl From<Vec<Value>> for Value {
    fn from(v: Vec<Value>) -> Self {
        Value::Array(v)
    }
}

impl From<()> for Value {
    fn from((): ()) -> Self {
        Value::Null
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn map_keys_are_sorted() {
        let map = Value::object([
            ("z", Value::Integer(1)),
            ("a", Value::Integer(2)),
            ("m", Value::Integer(3)),
        ]);

        let keys: Vec<_> = map
            .as_map()
            .unwrap()
            .iter()
            .map(|(k, _)| k.as_text().unwrap())
            .collect();
        assert_eq!(keys, vec!["a", "m", "z"]);
    }

    #[test]
    fn map_key_length_ordering() {
        // Shorter keys come first in canonical CBOR
        let map = Value::object([
            ("abc", Value::Integer(1)),
            ("a", Value::Integer(2)),
            ("ab", Value::Integer(3)),
        ]);

        let keys: Vec<_> = map
            .as_map()
            .unwrap()
            .iter()
            .map(|(k, _)| k.as_text().unwrap())
            .collect();
        assert_eq!(keys, vec!["a", "ab", "abc"]);
    }

    #[test]
    fn integer_ordering() {
        let mut sorted = vec![
            Value::Integer(-1),
            Value::Integer(0),
            Value::Integer(1000),
            Value::Integer(-2),
            Value::Integer(2),
        ];
        sorted.sort_by(Value::cmp_canonical);

        assert_eq!(
            sorted,
            vec![
                Value::Integer(0),
                Value::Integer(2),
                Value::Integer(1000),
                Value::Integer(-1),
                Value::Integer(-2),
            ]
        );
    }

    #[test]
    fn simple_values_order_before_floats() {
        let mut sorted = vec![
            Value::Float(0.5),
            Value::Null,
            Value::Bool(true),
            Value::Bool(false),
        ];
        sorted.sort_by(Value::cmp_canonical);

        assert_eq!(
            sorted,
            vec![
                Value::Bool(false),
                Value::Bool(true),
                Value::Null,
                Value::Float(0.5),
            ]
        );
    }

    #[test]
    fn value_accessors() {
        assert!(Value::Null.is_null());
        assert_eq!(Value::Bool(true).as_bool(), Some(true));
        assert_eq!(Value::Integer(42).as_integer(), Some(42));
        assert_eq!(Value::Integer(42).as_number(), Some(42.0));
        assert_eq!(Value::Float(1.5).as_number(), Some(1.5));
        assert_eq!(Value::Text("42".into()).as_number(), None);
        assert_eq!(Value::Text("hello".into()).as_text(), Some("hello"));
        assert_eq!(Value::Bytes(vec![1, 2, 3]).as_bytes(), Some(&[1, 2, 3][..]));
    }

    #[test]
    fn map_get_and_set() {
        let mut map = Value::object([("name", Value::from("Alice"))]);
        assert_eq!(map.get("name"), Some(&Value::from("Alice")));
        assert_eq!(map.get("missing"), None);

        map.set("age", Value::Integer(30));
        map.set("name", Value::from("Bob"));
        assert_eq!(map.get("age"), Some(&Value::Integer(30)));
        assert_eq!(map.get("name"), Some(&Value::from("Bob")));
        assert_eq!(map.as_map().unwrap().len(), 2);
    }

    #[test]
    fn set_on_non_map_creates_map() {
        let mut value = Value::Integer(1);
        value.set("x", Value::Bool(true));
        assert_eq!(value, Value::object([("x", Value::Bool(true))]));
    }
}
