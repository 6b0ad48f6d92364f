//! Key paths: how an index key is extracted from a record.

use crate::error::{CodecError, CodecResult};
use crate::key::Key;
use crate::value::Value;
use std::fmt;

/// Where an index finds its key inside a record.
///
/// A single path is a dotted sequence of field names (`"author.name"`); the
/// empty path names the record itself. A sequence of paths produces a
/// compound array key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum KeyPath {
    /// One dotted path.
    Single(String),
    /// Several dotted paths forming a compound key.
    Sequence(Vec<String>),
}

impl KeyPath {
    /// Returns `true` if every component is a usable path.
    ///
    /// Path segments may not be empty, except for the whole-record path `""`
    /// in the single form. Sequences must be non-empty.
    pub fn is_valid(&self) -> bool {
        match self {
            KeyPath::Single(path) => path.is_empty() || valid_dotted(path),
            KeyPath::Sequence(paths) => !paths.is_empty() && paths.iter().all(|p| valid_dotted(p)),
        }
    }

    /// Resolves the raw value this path points at.
    ///
    /// Sequence paths yield an array of the resolved components.
    pub fn resolve_value(&self, record: &Value) -> Option<Value> {
        match self {
            KeyPath::Single(path) => resolve(record, path).cloned(),
            KeyPath::Sequence(paths) => paths
                .iter()
                .map(|p| resolve(record, p).cloned())
                .collect::<Option<Vec<_>>>()
                .map(Value::Array),
        }
    }

    /// Extracts the key for `record`, or `None` if the record has no valid
    /// key at this path.
    pub fn evaluate(&self, record: &Value) -> Option<Key> {
        match self {
            KeyPath::Single(path) => Key::from_value(resolve(record, path)?).ok(),
            KeyPath::Sequence(paths) => paths
                .iter()
                .map(|p| Key::from_value(resolve(record, p)?).ok())
                .collect::<Option<Vec<_>>>()
                .map(Key::Array),
        }
    }

    /// Encodes this path for persistence.
    pub fn to_value(&self) -> Value {
        match self {
            KeyPath::Single(path) => Value::Text(path.clone()),
            KeyPath::Sequence(paths) => {
                Value::Array(paths.iter().map(|p| Value::Text(p.clone())).collect())
            }
        }
    }

    /// Decodes a persisted path.
    pub fn from_value(value: &Value) -> CodecResult<Self> {
        match value {
            Value::Text(path) => Ok(KeyPath::Single(path.clone())),
            Value::Array(items) => items
                .iter()
                .map(|item| {
                    item.as_text()
                        .map(str::to_string)
                        .ok_or_else(|| CodecError::invalid_structure("key path segment is not text"))
                })
                .collect::<CodecResult<Vec<_>>>()
                .map(KeyPath::Sequence),
            _ => Err(CodecError::invalid_structure("key path must be text or array")),
        }
    }
}

fn valid_dotted(path: &str) -> bool {
    !path.is_empty() && path.split('.').all(|segment| !segment.is_empty())
}

fn resolve<'v>(record: &'v Value, path: &str) -> Option<&'v Value> {
    if path.is_empty() {
        return Some(record);
    }
    path.split('.').try_fold(record, |current, field| current.get(field))
}

impl fmt::Display for KeyPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeyPath::Single(path) => f.write_str(path),
            KeyPath::Sequence(paths) => write!(f, "[{}]", paths.join(", ")),
        }
    }
}

impl From<&str> for KeyPath {
    fn from(path: &str) -> Self {
        KeyPath::Single(path.to_string())
    }
}

impl From<String> for KeyPath {
    fn from(path: String) -> Self {
        KeyPath::Single(path)
    }
}

impl From<Vec<String>> for KeyPath {
    fn from(paths: Vec<String>) -> Self {
        KeyPath::Sequence(paths)
    }
}

impl From<&[&str]> for KeyPath {
    fn from(paths: &[&str]) -> Self {
        KeyPath::Sequence(paths.iter().map(|p| (*p).to_string()).collect())
    }
}
