//! Journal frames.
//!
//! A database journal is a sequence of frames:
//!
//! ```text
//! | "SHJ1" | type u8 | len u32 LE | payload (len bytes) | crc32 u32 LE |
//! ```
//!
//! The checksum covers type, length and payload. Payloads are canonical CBOR.
//! A journal starts with a snapshot frame holding the full state; each commit
//! appends one commit frame carrying the operation log of one transaction.

use crate::error::{EngineError, EngineResult};
use crate::key_range::KeyRange;
use crate::meta::{IndexMeta, IndexOptions};
use crate::state::{DatabaseState, Op, StoreData};
use crc32fast::Hasher;
use shelf_codec::{from_cbor, to_canonical_cbor, Key, KeyPath, Value};
use std::sync::Arc;

const MAGIC: &[u8; 4] = b"SHJ1";
const HEADER_LEN: usize = 9;
const TRAILER_LEN: usize = 4;

/// Frame carrying the full database state.
pub(crate) const FRAME_SNAPSHOT: u8 = 1;
/// Frame carrying one committed transaction.
pub(crate) const FRAME_COMMIT: u8 = 2;

/// Result of replaying a journal.
#[derive(Debug)]
pub(crate) struct Replay {
    pub state: DatabaseState,
    /// Sequence number of the last applied frame.
    pub seq: u64,
    /// Commit frames applied since the last snapshot.
    pub commits_since_snapshot: u64,
    /// Length of the valid prefix.
    pub valid_len: usize,
    /// Why replay stopped before the end, if it did.
    pub stopped: Option<String>,
}

/// Encodes a snapshot frame of `state`.
pub(crate) fn snapshot_frame(state: &DatabaseState, seq: u64) -> EngineResult<Vec<u8>> {
    let stores = state
        .stores
        .values()
        .map(|store| encode_store(store))
        .collect();
    let payload = Value::object([
        ("version", int(state.version)?),
        ("seq", int(seq)?),
        ("stores", Value::Array(stores)),
    ]);
    frame(FRAME_SNAPSHOT, &payload)
}

/// Encodes a commit frame.
pub(crate) fn commit_frame(seq: u64, store: &str, ops: &[Op]) -> EngineResult<Vec<u8>> {
    let payload = Value::object([
        ("seq", int(seq)?),
        ("store", Value::from(store)),
        ("ops", Value::Array(ops.iter().map(encode_op).collect())),
    ]);
    frame(FRAME_COMMIT, &payload)
}

fn frame(frame_type: u8, payload: &Value) -> EngineResult<Vec<u8>> {
    let body = to_canonical_cbor(payload)?;
    let len = u32::try_from(body.len())
        .map_err(|_| EngineError::data(format!("frame of {} bytes is too large", body.len())))?;

    let mut out = Vec::with_capacity(HEADER_LEN + body.len() + TRAILER_LEN);
    out.extend_from_slice(MAGIC);
    out.push(frame_type);
    out.extend_from_slice(&len.to_le_bytes());
    out.extend_from_slice(&body);

    let mut hasher = Hasher::new();
    hasher.update(&out[4..]);
    out.extend_from_slice(&hasher.finalize().to_le_bytes());
    Ok(out)
}

/// Splits off the first frame of `bytes`: its type, payload and total length.
fn read_frame(bytes: &[u8]) -> Result<(u8, &[u8], usize), String> {
    if bytes.len() < HEADER_LEN {
        return Err("truncated frame header".into());
    }
    if &bytes[..4] != MAGIC {
        return Err("bad frame magic".into());
    }
    let frame_type = bytes[4];
    let len = u32::from_le_bytes([bytes[5], bytes[6], bytes[7], bytes[8]]) as usize;
    let total = HEADER_LEN + len + TRAILER_LEN;
    if bytes.len() < total {
        return Err("truncated frame".into());
    }

    let body_end = HEADER_LEN + len;
    let mut hasher = Hasher::new();
    hasher.update(&bytes[4..body_end]);
    let expected = hasher.finalize();
    let actual = u32::from_le_bytes([
        bytes[body_end],
        bytes[body_end + 1],
        bytes[body_end + 2],
        bytes[body_end + 3],
    ]);
    if expected != actual {
        return Err(format!(
            "checksum mismatch: expected {expected:08x}, got {actual:08x}"
        ));
    }
    Ok((frame_type, &bytes[HEADER_LEN..body_end], total))
}

/// Replays a journal up to its first damaged frame.
///
/// # Errors
///
/// Returns [`EngineError::Corrupted`] if not even the leading snapshot can
/// be read.
pub(crate) fn replay(bytes: &[u8]) -> EngineResult<Replay> {
    let mut replay: Option<Replay> = None;
    let mut pos = 0;
    let mut stopped = None;

    while pos < bytes.len() {
        let outcome = read_frame(&bytes[pos..]).and_then(|(frame_type, payload, len)| {
            apply_frame(&mut replay, frame_type, payload)
                .map(|()| len)
                .map_err(|e| e.to_string())
        });
        match outcome {
            Ok(len) => {
                pos += len;
                if let Some(replay) = replay.as_mut() {
                    replay.valid_len = pos;
                }
            }
            Err(reason) => {
                stopped = Some(format!("{reason} at offset {pos}"));
                break;
            }
        }
    }

    let mut replay = replay.ok_or_else(|| {
        EngineError::corrupted(
            stopped
                .clone()
                .unwrap_or_else(|| "journal is empty".to_string()),
        )
    })?;
    replay.stopped = stopped;
    Ok(replay)
}

fn apply_frame(replay: &mut Option<Replay>, frame_type: u8, payload: &[u8]) -> EngineResult<()> {
    let payload = from_cbor(payload)?;
    match frame_type {
        FRAME_SNAPSHOT => {
            let (state, seq) = decode_snapshot(&payload)?;
            *replay = Some(Replay {
                state,
                seq,
                commits_since_snapshot: 0,
                valid_len: 0,
                stopped: None,
            });
            Ok(())
        }
        FRAME_COMMIT => {
            let replay = replay
                .as_mut()
                .ok_or_else(|| EngineError::corrupted("commit frame before any snapshot"))?;
            let seq = uint(field(&payload, "seq")?)?;
            if seq != replay.seq + 1 {
                return Err(EngineError::corrupted(format!(
                    "commit sequence {seq} does not follow {}",
                    replay.seq
                )));
            }
            let store_name = text(field(&payload, "store")?)?;
            let store = replay
                .state
                .stores
                .get(store_name)
                .ok_or_else(|| EngineError::corrupted(format!("commit to unknown store {store_name}")))?;

            let mut next = StoreData::clone(store);
            for op in array(field(&payload, "ops")?)? {
                next.apply(&decode_op(op)?)?;
            }
            replay
                .state
                .stores
                .insert(store_name.to_string(), Arc::new(next));
            replay.seq = seq;
            replay.commits_since_snapshot += 1;
            Ok(())
        }
        other => Err(EngineError::corrupted(format!("unknown frame type {other}"))),
    }
}

fn encode_store(store: &StoreData) -> Value {
    let indexes = store
        .indexes
        .values()
        .map(|index| {
            Value::object([
                ("name", Value::from(index.meta.name.as_str())),
                ("key_path", index.meta.key_path.to_value()),
                ("unique", Value::Bool(index.meta.options.unique)),
                ("multi_entry", Value::Bool(index.meta.options.multi_entry)),
            ])
        })
        .collect();
    let records = store
        .records
        .iter()
        .map(|(key, value)| Value::Array(vec![key.to_value(), value.clone()]))
        .collect();
    Value::object([
        ("name", Value::from(store.name.as_str())),
        ("indexes", Value::Array(indexes)),
        ("records", Value::Array(records)),
    ])
}

fn decode_snapshot(payload: &Value) -> EngineResult<(DatabaseState, u64)> {
    let mut state = DatabaseState {
        version: uint(field(payload, "version")?)?,
        ..DatabaseState::default()
    };
    for store in array(field(payload, "stores")?)? {
        let mut data = StoreData::new(text(field(store, "name")?)?);
        for record in array(field(store, "records")?)? {
            match array(record)? {
                [key, value] => {
                    data.records.insert(Key::from_value(key)?, value.clone());
                }
                _ => return Err(EngineError::corrupted("record entry is not a pair")),
            }
        }
        // Index entries are derived state and rebuilt from the records
        for index in array(field(store, "indexes")?)? {
            data.restore_index(IndexMeta {
                name: text(field(index, "name")?)?.to_string(),
                key_path: KeyPath::from_value(field(index, "key_path")?)?,
                options: IndexOptions {
                    unique: boolean(field(index, "unique")?)?,
                    multi_entry: boolean(field(index, "multi_entry")?)?,
                },
            })?;
        }
        state.stores.insert(data.name.clone(), Arc::new(data));
    }
    Ok((state, uint(field(payload, "seq")?)?))
}

fn encode_op(op: &Op) -> Value {
    match op {
        Op::Put {
            key,
            value,
            overwrite,
        } => Value::Array(vec![
            Value::from("put"),
            key.to_value(),
            value.clone(),
            Value::Bool(*overwrite),
        ]),
        Op::Delete(range) => Value::Array(vec![Value::from("delete"), encode_range(range)]),
        Op::Clear => Value::Array(vec![Value::from("clear")]),
    }
}

fn decode_op(value: &Value) -> EngineResult<Op> {
    match array(value)? {
        [tag, key, value, overwrite] if tag.as_text() == Some("put") => Ok(Op::Put {
            key: Key::from_value(key)?,
            value: value.clone(),
            overwrite: boolean(overwrite)?,
        }),
        [tag, range] if tag.as_text() == Some("delete") => Ok(Op::Delete(decode_range(range)?)),
        [tag] if tag.as_text() == Some("clear") => Ok(Op::Clear),
        _ => Err(EngineError::corrupted("unrecognized operation")),
    }
}

fn encode_range(range: &KeyRange) -> Value {
    let bound = |key: Option<&Key>| key.map_or(Value::Null, Key::to_value);
    Value::object([
        ("lower", bound(range.lower())),
        ("upper", bound(range.upper())),
        ("lower_open", Value::Bool(range.lower_open())),
        ("upper_open", Value::Bool(range.upper_open())),
    ])
}

fn decode_range(value: &Value) -> EngineResult<KeyRange> {
    let bound = |name: &str| -> EngineResult<Option<Key>> {
        match field(value, name)? {
            Value::Null => Ok(None),
            key => Ok(Some(Key::from_value(key)?)),
        }
    };
    let lower_open = boolean(field(value, "lower_open")?)?;
    let upper_open = boolean(field(value, "upper_open")?)?;
    match (bound("lower")?, bound("upper")?) {
        (Some(lower), Some(upper)) => KeyRange::bound(lower, upper, lower_open, upper_open),
        (Some(lower), None) => Ok(KeyRange::lower_bound(lower, lower_open)),
        (None, Some(upper)) => Ok(KeyRange::upper_bound(upper, upper_open)),
        (None, None) => Ok(KeyRange::default()),
    }
}

fn int(n: u64) -> EngineResult<Value> {
    i64::try_from(n)
        .map(Value::Integer)
        .map_err(|_| EngineError::data(format!("{n} does not fit in a journal integer")))
}

fn field<'v>(value: &'v Value, name: &str) -> EngineResult<&'v Value> {
    value
        .get(name)
        .ok_or_else(|| EngineError::corrupted(format!("missing field {name}")))
}

fn uint(value: &Value) -> EngineResult<u64> {
    value
        .as_integer()
        .and_then(|n| u64::try_from(n).ok())
        .ok_or_else(|| EngineError::corrupted("expected unsigned integer"))
}

fn text(value: &Value) -> EngineResult<&str> {
    value
        .as_text()
        .ok_or_else(|| EngineError::corrupted("expected text"))
}

fn boolean(value: &Value) -> EngineResult<bool> {
    value
        .as_bool()
        .ok_or_else(|| EngineError::corrupted("expected boolean"))
}

fn array(value: &Value) -> EngineResult<&[Value]> {
    value
        .as_array()
        .ok_or_else(|| EngineError::corrupted("expected array"))
}
