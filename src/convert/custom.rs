//! Pluggable custom converter
//!
//! Any type without a primitive codec is serialized through a
//! [`CustomConverter`]: a general-purpose structured serializer operating on
//! a `serde_json::Value` document model. The default implementation encodes
//! the document as plain JSON; alternative implementations can encode the
//! same document model however they like (compressed, framed, etc.).

use crate::core::error::{RedisError, RedisResult};
use bytes::Bytes;

/// Structured serializer used for types outside the primitive table
pub trait CustomConverter: Send + Sync {
    /// Encode a structured document to its byte representation
    fn encode(&self, document: serde_json::Value) -> RedisResult<Bytes>;

    /// Decode a byte representation back into a structured document
    fn decode(&self, bytes: &[u8]) -> RedisResult<serde_json::Value>;
}

/// Default general-purpose converter: plain JSON
#[derive(Debug, Default, Clone, Copy)]
pub struct JsonConverter;

impl CustomConverter for JsonConverter {
    fn encode(&self, document: serde_json::Value) -> RedisResult<Bytes> {
        serde_json::to_vec(&document)
            .map(Bytes::from)
            .map_err(|e| RedisError::Conversion(format!("JSON encode failed: {}", e)))
    }

    fn decode(&self, bytes: &[u8]) -> RedisResult<serde_json::Value> {
        serde_json::from_slice(bytes)
            .map_err(|e| RedisError::Conversion(format!("JSON decode failed: {}", e)))
    }
}
