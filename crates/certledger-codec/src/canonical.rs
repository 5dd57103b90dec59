use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};

use crate::error::{CodecError, CodecResult};

/// Recursively sort the keys of every object in `value`.
///
/// The result is rebuilt by inserting entries in sorted order, so the
/// output is sorted whether or not `serde_json`'s `preserve_order` feature
/// is active somewhere in the dependency graph.
pub fn canonicalize(value: Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<(String, Value)> = map.into_iter().collect();
            entries.sort_by(|(a, _), (b, _)| a.cmp(b));
            let mut sorted = Map::new();
            for (key, child) in entries {
                sorted.insert(key, canonicalize(child));
            }
            Value::Object(sorted)
        }
        Value::Array(items) => Value::Array(items.into_iter().map(canonicalize).collect()),
        other => other,
    }
}

/// Encode a JSON value canonically.
pub fn encode_value(value: Value) -> CodecResult<Vec<u8>> {
    serde_json::to_vec(&canonicalize(value)).map_err(|e| CodecError::Serialization(e.to_string()))
}

/// Encode any serializable value as canonical JSON bytes.
pub fn encode<T: Serialize + ?Sized>(value: &T) -> CodecResult<Vec<u8>> {
    let tree = serde_json::to_value(value).map_err(|e| CodecError::Serialization(e.to_string()))?;
    encode_value(tree)
}

/// Decode canonical (or any valid) JSON bytes into `T`.
pub fn decode<T: DeserializeOwned>(bytes: &[u8]) -> CodecResult<T> {
    serde_json::from_slice(bytes).map_err(|e| CodecError::Deserialization(e.to_string()))
}
