//! The decoded JSON document handed to the query evaluator

use serde_json::{Map, Value};

/// A JSON object keyed by string, decoded from a fetch or cache payload
pub type Document = Map<String, Value>;

/// Decodes a payload as a JSON object.
///
/// Arrays, scalars and malformed bodies are rejected; only a mapping is a
/// usable document.
pub fn decode(bytes: &[u8]) -> Result<Document, serde_json::Error> {
    serde_json::from_slice(bytes)
}
