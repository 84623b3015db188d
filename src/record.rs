//! The document store's record shape.
//!
//! Every document is a JSON object. Entities are converted to and from that
//! shape with serde, and partial writes are expressed as JSON objects that
//! are merged into the stored one.
//!
//! # Merge semantics
//!
//! ```text
//! stored:  { "name": "A", "address": { "city": "X", "zip": "1" }, "items": [1, 2] }
//! patch:   { "address": { "city": "Y" }, "items": [3] }
//! result:  { "name": "A", "address": { "city": "Y", "zip": "1" }, "items": [3] }
//! ```
//!
//! Nested objects merge key by key; arrays and scalars are replaced whole.
//! This is why a reconciliation write carries the entire `items` array.

use crate::error::{Error, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};

/// A stored document body.
pub type Record = Map<String, Value>;

/// Convert any serializable value to a record.
///
/// # Errors
///
/// `Error::SerializationError` if the value does not serialize to a JSON object.
pub fn to_record<T: Serialize>(value: &T) -> Result<Record> {
    match serde_json::to_value(value) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(other) => Err(Error::SerializationError(format!(
            "expected an object, got {}",
            json_kind(&other)
        ))),
        Err(e) => Err(Error::SerializationError(e.to_string())),
    }
}

/// Convert a record back into a typed value.
///
/// # Errors
///
/// `Error::DeserializationError` if the record does not match `T`.
pub fn from_record<T: DeserializeOwned>(record: Record) -> Result<T> {
    serde_json::from_value(Value::Object(record))
        .map_err(|e| Error::DeserializationError(e.to_string()))
}

/// Merge `patch` into `target` in place.
pub fn merge_into(target: &mut Record, patch: Record) {
    for (key, value) in patch {
        match (target.get_mut(&key), value) {
            (Some(Value::Object(existing)), Value::Object(incoming)) => {
                merge_into(existing, incoming);
            }
            (_, value) => {
                target.insert(key, value);
            }
        }
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use serde_json::json;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Sample {
        id: String,
        count: u32,
    }

    fn obj(value: Value) -> Record {
        match value {
            Value::Object(map) => map,
            _ => panic!("not an object"),
        }
    }

    #[test]
    fn test_record_round_trip() {
        let sample = Sample {
            id: "p1".to_string(),
            count: 3,
        };
        let record = to_record(&sample).expect("to_record");
        assert_eq!(record.get("count"), Some(&json!(3)));
        let back: Sample = from_record(record).expect("from_record");
        assert_eq!(back, sample);
    }

    #[test]
    fn test_non_object_rejected() {
        let err = to_record(&vec![1, 2, 3]).unwrap_err();
        assert!(matches!(err, Error::SerializationError(_)));
    }

    #[test]
    fn test_shape_mismatch_is_deserialization_error() {
        let err = from_record::<Sample>(obj(json!({ "id": 1 }))).unwrap_err();
        assert!(matches!(err, Error::DeserializationError(_)));
    }

    #[test]
    fn test_merge_nested_objects_and_replace_arrays() {
        let mut stored = obj(json!({
            "name": "A",
            "address": { "city": "X", "zip": "1" },
            "items": [1, 2]
        }));
        merge_into(
            &mut stored,
            obj(json!({ "address": { "city": "Y" }, "items": [3] })),
        );
        assert_eq!(
            Value::Object(stored),
            json!({
                "name": "A",
                "address": { "city": "Y", "zip": "1" },
                "items": [3]
            })
        );
    }
}
