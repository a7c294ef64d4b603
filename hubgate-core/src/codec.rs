//! JSON-UTF8 codec for event bodies.
//!
//! Every message on the bus carries exactly one JSON document as its body.
//! Decoding follows plain JSON-object semantics: unknown fields are ignored
//! and missing fields fall back to the target type's defaults.

use serde::{Serialize, de::DeserializeOwned};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CodecError {
    #[error("Failed to encode event body: {0}")]
    Encode(#[source] serde_json::Error),

    #[error("Failed to decode event body: {0}")]
    Decode(#[source] serde_json::Error),

    #[error("Event body is not valid UTF-8: {0}")]
    InvalidUtf8(#[from] std::str::Utf8Error),
}

pub fn encode<T: Serialize + ?Sized>(value: &T) -> Result<Vec<u8>, CodecError> {
    serde_json::to_vec(value).map_err(CodecError::Encode)
}

pub fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, CodecError> {
    // serde_json accepts raw bytes, but a non UTF-8 body gets its own error
    let text = std::str::from_utf8(bytes)?;
    serde_json::from_str(text).map_err(CodecError::Decode)
}
