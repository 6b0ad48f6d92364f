//! Benchmark utilities.

use rand::distributions::Alphanumeric;
use rand::Rng;
use serde::{Deserialize, Serialize};
use shelf_codec::Value;

/// Record shape used by the store benchmarks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Note {
    /// Free text body.
    pub body: String,
    /// Author name, indexed as `by_author`.
    pub author: String,
    /// Tags, indexed multi-entry as `by_tag`.
    pub tags: Vec<String>,
}

/// Random bytes of the given length.
pub fn random_data(size: usize) -> Vec<u8> {
    let mut rng = rand::thread_rng();
    (0..size).map(|_| rng.gen()).collect()
}

/// Random alphanumeric text of the given length.
pub fn random_text(len: usize) -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(len)
        .map(char::from)
        .collect()
}

/// `count` notes spread over `authors` authors, each with a body of
/// `body_len` characters.
pub fn generate_notes(count: usize, authors: usize, body_len: usize) -> Vec<(u32, Note)> {
    let mut rng = rand::thread_rng();
    (0..count)
        .map(|i| {
            let author = format!("author-{}", rng.gen_range(0..authors.max(1)));
            let tags = (0..rng.gen_range(0..4))
                .map(|t| format!("tag-{t}"))
                .collect();
            let note = Note {
                body: random_text(body_len),
                author,
                tags,
            };
            (i as u32, note)
        })
        .collect()
}

/// A nested map `depth` levels deep with `width` entries per level.
pub fn nested_value(depth: usize, width: usize) -> Value {
    if depth == 0 {
        return Value::Text("leaf".into());
    }
    Value::object((0..width).map(|i| (format!("key_{i}"), nested_value(depth - 1, width))))
}
