//! Record and index keys.

use crate::error::{CodecError, CodecResult};
use crate::value::Value;
use std::cmp::Ordering;
use std::fmt;

/// A key identifying a record in a store or an entry in an index.
///
/// Keys have a total order across types: every number sorts before every
/// text, every text before every byte string, every byte string before every
/// array. Within a type:
///
/// - numbers compare numerically
/// - text compares by code point
/// - bytes compare lexicographically
/// - arrays compare element by element, shorter prefix first
///
/// NaN is not a valid key number; [`Key::number`] and [`Key::from_value`]
/// reject it.
#[derive(Debug, Clone)]
pub enum Key {
    /// A numeric key. All numbers are doubles.
    Number(f64),
    /// A text key.
    Text(String),
    /// A binary key.
    Bytes(Vec<u8>),
    /// A compound key.
    Array(Vec<Key>),
}

impl Key {
    /// Creates a numeric key, rejecting NaN.
    ///
    /// Negative zero is normalised to zero.
    pub fn number(n: f64) -> CodecResult<Self> {
        if n.is_nan() {
            return Err(CodecError::invalid_key("NaN is not a valid key"));
        }
        Ok(Self::numeric(n))
    }

    /// A numeric key with negative zero folded into zero. NaN passes through
    /// and is caught by [`Key::validate`].
    fn numeric(n: f64) -> Self {
        Key::Number(if n == 0.0 { 0.0 } else { n })
    }

    /// Checks that this key contains no NaN.
    pub fn validate(&self) -> CodecResult<()> {
        match self {
            Key::Number(n) if n.is_nan() => Err(CodecError::invalid_key("NaN is not a valid key")),
            Key::Array(items) => items.iter().try_for_each(Key::validate),
            _ => Ok(()),
        }
    }

    /// Converts a record value into a key.
    ///
    /// Integers and floats become numbers, text and bytes map directly, and
    /// arrays convert element-wise. Null, booleans and maps are not keys.
    #[allow(clippy::cast_precision_loss)]
    pub fn from_value(value: &Value) -> CodecResult<Self> {
        match value {
            Value::Integer(n) => Ok(Key::numeric(*n as f64)),
            Value::Float(f) => Key::number(*f),
            Value::Text(s) => Ok(Key::Text(s.clone())),
            Value::Bytes(b) => Ok(Key::Bytes(b.clone())),
            Value::Array(items) => items
                .iter()
                .map(Key::from_value)
                .collect::<CodecResult<Vec<_>>>()
                .map(Key::Array),
            Value::Null => Err(CodecError::invalid_key("null is not a valid key")),
            Value::Bool(_) => Err(CodecError::invalid_key("booleans are not valid keys")),
            Value::Map(_) => Err(CodecError::invalid_key("maps are not valid keys")),
        }
    }

    /// Converts this key into a record value.
    ///
    /// Numbers with an exact integer representation become integers so that
    /// typed records with integer fields deserialize cleanly.
    #[allow(clippy::cast_possible_truncation, clippy::cast_precision_loss)]
    pub fn to_value(&self) -> Value {
        match self {
            Key::Number(n) => {
                let truncated = *n as i64;
                if n.fract() == 0.0 && truncated as f64 == *n && n.abs() < 9.007_199_254_740_992e15 {
                    Value::Integer(truncated)
                } else {
                    Value::Float(*n)
                }
            }
            Key::Text(s) => Value::Text(s.clone()),
            Key::Bytes(b) => Value::Bytes(b.clone()),
            Key::Array(items) => Value::Array(items.iter().map(Key::to_value).collect()),
        }
    }

    /// Returns the number if this is a numeric key.
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Key::Number(n) => Some(*n),
            _ => None,
        }
    }

    /// Returns the text if this is a text key.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Key::Text(s) => Some(s),
            _ => None,
        }
    }

    fn type_rank(&self) -> u8 {
        match self {
            Key::Number(_) => 0,
            Key::Text(_) => 1,
            Key::Bytes(_) => 2,
            Key::Array(_) => 3,
        }
    }
}

impl Ord for Key {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Key::Number(a), Key::Number(b)) => a.partial_cmp(b).unwrap_or_else(|| a.total_cmp(b)),
            (Key::Text(a), Key::Text(b)) => a.cmp(b),
            (Key::Bytes(a), Key::Bytes(b)) => a.cmp(b),
            (Key::Array(a), Key::Array(b)) => a.cmp(b),
            _ => self.type_rank().cmp(&other.type_rank()),
        }
    }
}

impl PartialOrd for Key {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for Key {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Key {}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Key::Number(n) => write!(f, "{n}"),
            Key::Text(s) => write!(f, "{s:?}"),
            Key::Bytes(b) => {
                f.write_str("0x")?;
                b.iter().try_for_each(|byte| write!(f, "{byte:02x}"))
            }
            Key::Array(items) => {
                f.write_str("[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{item}")?;
                }
                f.write_str("]")
            }
        }
    }
}

impl From<i64> for Key {
    #[allow(clippy::cast_precision_loss)]
    fn from(n: i64) -> Self {
        Key::numeric(n as f64)
    }
}

impl From<i32> for Key {
    fn from(n: i32) -> Self {
        Key::numeric(f64::from(n))
    }
}

impl From<u32> for Key {
    fn from(n: u32) -> Self {
        Key::numeric(f64::from(n))
    }
}

impl From<String> for Key {
    fn from(s: String) -> Self {
        Key::Text(s)
    }
}

impl From<&str> for Key {
    fn from(s: &str) -> Self {
        Key::Text(s.to_string())
    }
}

impl From<Vec<u8>> for Key {
    fn from(b: Vec<u8>) -> Self {
        Key::Bytes(b)
    }
}

impl From<Vec<Key>> for Key {
    fn from(items: Vec<Key>) -> Self {
        Key::Array(items)
    }
}

/// A Rust type usable as the primary key of a typed store.
pub trait StoreKey: Sized {
    /// Converts into a platform key.
    fn into_key(self) -> Key;

    /// Converts back from a platform key.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::InvalidKey`] if the key has the wrong shape.
    fn from_key(key: Key) -> CodecResult<Self>;
}

impl StoreKey for Key {
    fn into_key(self) -> Key {
        self
    }

    fn from_key(key: Key) -> CodecResult<Self> {
        Ok(key)
    }
}

impl StoreKey for String {
    fn into_key(self) -> Key {
        Key::Text(self)
    }

    fn from_key(key: Key) -> CodecResult<Self> {
        match key {
            Key::Text(s) => Ok(s),
            other => Err(CodecError::invalid_key(format!("expected text key, got {other}"))),
        }
    }
}

impl StoreKey for f64 {
    fn into_key(self) -> Key {
        Key::numeric(self)
    }

    fn from_key(key: Key) -> CodecResult<Self> {
        key.as_number()
            .ok_or_else(|| CodecError::invalid_key(format!("expected numeric key, got {key}")))
    }
}

macro_rules! integer_store_key {
    ($($ty:ty),*) => {$(
        impl StoreKey for $ty {
            #[allow(clippy::cast_precision_loss, clippy::cast_lossless)]
            fn into_key(self) -> Key {
                Key::numeric(self as f64)
            }

            #[allow(clippy::cast_possible_truncation, clippy::cast_precision_loss)]
            fn from_key(key: Key) -> CodecResult<Self> {
                let n = f64::from_key(key)?;
                let converted = n as $ty;
                if n.fract() != 0.0 || converted as f64 != n {
                    return Err(CodecError::invalid_key(format!(
                        "{n} is not a valid {}",
                        stringify!($ty)
                    )));
                }
                Ok(converted)
            }
        }
    )*};
}

integer_store_key!(i64, i32, u32);

impl StoreKey for Vec<u8> {
    fn into_key(self) -> Key {
        Key::Bytes(self)
    }

    fn from_key(key: Key) -> CodecResult<Self> {
        match key {
            Key::Bytes(b) => Ok(b),
            other => Err(CodecError::invalid_key(format!("expected binary key, got {other}"))),
        }
    }
}

impl StoreKey for Vec<Key> {
    fn into_key(self) -> Key {
        Key::Array(self)
    }

    fn from_key(key: Key) -> CodecResult<Self> {
        match key {
            Key::Array(items) => Ok(items),
            other => Err(CodecError::invalid_key(format!("expected array key, got {other}"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn cross_type_ordering() {
        let mut keys = vec![
            Key::Array(vec![]),
            Key::Bytes(vec![0]),
            Key::from("a"),
            Key::from(1_000_000),
        ];
        keys.sort();
        assert_eq!(
            keys,
            vec![
                Key::from(1_000_000),
                Key::from("a"),
                Key::Bytes(vec![0]),
                Key::Array(vec![]),
            ]
        );
    }

    #[test]
    fn numbers_order_numerically() {
        assert!(Key::from(-5) < Key::from(2));
        assert!(Key::Number(2.5) < Key::from(3));
        assert!(Key::Number(f64::NEG_INFINITY) < Key::from(i64::MIN));
    }

    #[test]
    fn arrays_order_elementwise() {
        let short = Key::Array(vec![Key::from(1)]);
        let long = Key::Array(vec![Key::from(1), Key::from(0)]);
        let bigger = Key::Array(vec![Key::from(2)]);
        assert!(short < long);
        assert!(long < bigger);
    }

    #[test]
    fn text_orders_by_code_point() {
        assert!(Key::from("B") < Key::from("a"));
        assert!(Key::from("z") < Key::from("é"));
    }

    #[test]
    fn nan_rejected() {
        assert!(Key::number(f64::NAN).is_err());
        assert!(Key::from_value(&Value::Float(f64::NAN)).is_err());
        assert!(Key::Array(vec![Key::Number(f64::NAN)]).validate().is_err());
        assert!(Key::from(3).validate().is_ok());
    }

    #[test]
    fn negative_zero_normalised() {
        assert_eq!(Key::number(-0.0).unwrap().as_number(), Some(0.0));
        assert!(Key::number(-0.0).unwrap().as_number().unwrap().is_sign_positive());
    }

    #[test]
    fn typed_negative_zero_key_is_zero() {
        let key = (-0.0f64).into_key();
        assert_eq!(key, Key::from(0));
        assert!(f64::from_key(key).unwrap().is_sign_positive());
        assert!(matches!(0i64.into_key(), Key::Number(n) if n.is_sign_positive()));
    }

    #[test]
    fn value_conversion() {
        assert_eq!(Key::from_value(&Value::Integer(7)).unwrap(), Key::from(7));
        assert_eq!(Key::from_value(&Value::from("x")).unwrap(), Key::from("x"));
        assert!(Key::from_value(&Value::Null).is_err());
        assert!(Key::from_value(&Value::Bool(true)).is_err());
        assert!(Key::from_value(&Value::object([("a", Value::Null)])).is_err());

        assert_eq!(Key::from(7).to_value(), Value::Integer(7));
        assert_eq!(Key::Number(0.5).to_value(), Value::Float(0.5));
        assert_eq!(
            Key::Array(vec![Key::from("a"), Key::from(1)]).to_value(),
            Value::Array(vec![Value::from("a"), Value::Integer(1)])
        );
    }

    #[test]
    fn store_key_conversions() {
        assert_eq!(i64::from_key(42_i64.into_key()).unwrap(), 42);
        assert_eq!(u32::from_key(Key::from(9)).unwrap(), 9);
        assert!(u32::from_key(Key::from(-1)).is_err());
        assert!(i64::from_key(Key::Number(1.5)).is_err());
        assert!(i64::from_key(Key::from("1")).is_err());
        assert_eq!(String::from_key(Key::from("k")).unwrap(), "k");
        assert!(String::from_key(Key::from(1)).is_err());
        assert_eq!(Vec::<u8>::from_key(Key::Bytes(vec![1])).unwrap(), vec![1]);
    }

    #[test]
    fn display() {
        assert_eq!(Key::from(3).to_string(), "3");
        assert_eq!(Key::from("a").to_string(), "\"a\"");
        assert_eq!(Key::Bytes(vec![0xab, 1]).to_string(), "0xab01");
        assert_eq!(
            Key::Array(vec![Key::from(1), Key::from("b")]).to_string(),
            "[1, \"b\"]"
        );
    }

    fn arb_key() -> impl Strategy<Value = Key> {
        let leaf = prop_oneof![
            (-1.0e9..1.0e9f64).prop_map(Key::Number),
            "[a-z]{0,6}".prop_map(Key::Text),
            prop::collection::vec(any::<u8>(), 0..4).prop_map(Key::Bytes),
        ];
        leaf.prop_recursive(2, 8, 3, |inner| {
            prop::collection::vec(inner, 0..3).prop_map(Key::Array)
        })
    }

    proptest! {
        #[test]
        fn ordering_is_total_and_antisymmetric(a in arb_key(), b in arb_key()) {
            prop_assert_eq!(a.cmp(&b), b.cmp(&a).reverse());
            prop_assert_eq!(a == b, a.cmp(&b) == Ordering::Equal);
        }

        #[test]
        fn ordering_is_transitive(a in arb_key(), b in arb_key(), c in arb_key()) {
            let mut sorted = vec![a, b, c];
            sorted.sort();
            prop_assert!(sorted[0] <= sorted[1]);
            prop_assert!(sorted[1] <= sorted[2]);
            prop_assert!(sorted[0] <= sorted[2]);
        }

        #[test]
        fn value_roundtrip_preserves_key(key in arb_key()) {
            let back = Key::from_value(&key.to_value()).unwrap();
            prop_assert_eq!(back, key);
        }
    }
}
