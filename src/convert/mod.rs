//! Value conversion between typed values and the wire representation
//!
//! [`ValueConverter`] is the single entry point every structure wrapper uses.
//! For types in the primitive table the conversion is a direct scalar
//! mapping with no serializer involvement; everything else goes through the
//! pluggable [`CustomConverter`] (JSON by default). Null markers short-circuit
//! in both directions and never reach the custom converter.

pub mod custom;
pub(crate) mod primitive;

pub use custom::{CustomConverter, JsonConverter};

use crate::core::error::{RedisError, RedisResult};
use crate::core::value::WireValue;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::any::{Any, TypeId};
use std::sync::Arc;

/// Bound for values storable through the typed structure wrappers
pub trait Storable: Serialize + DeserializeOwned + Any + Send + Sync {}

impl<T> Storable for T where T: Serialize + DeserializeOwned + Any + Send + Sync {}

/// Per-connection conversion facade
///
/// Cheap to clone; the custom converter is shared behind an `Arc` and the
/// primitive table is a process-wide constant.
#[derive(Clone)]
pub struct ValueConverter {
    custom: Arc<dyn CustomConverter>,
}

impl Default for ValueConverter {
    fn default() -> Self {
        Self::new(Arc::new(JsonConverter))
    }
}

impl ValueConverter {
    /// Create a converter with the given custom converter for
    /// non-primitive types
    pub fn new(custom: Arc<dyn CustomConverter>) -> Self {
        Self { custom }
    }

    /// Convert a typed value to its wire representation
    ///
    /// Primitive types take the table fast path; other types are serialized
    /// through the custom converter and wrapped as raw bytes.
    pub fn serialize<T>(&self, value: &T) -> RedisResult<WireValue>
    where
        T: Serialize + Any,
    {
        if let Some(codec) = primitive::lookup(TypeId::of::<T>()) {
            return Ok(codec.encode(value));
        }
        let document = serde_json::to_value(value)
            .map_err(|e| RedisError::Conversion(format!("serialization failed: {}", e)))?;
        Ok(WireValue::Bytes(self.custom.encode(document)?))
    }

    /// Convert an optional value, mapping `None` to the wire null marker
    /// without invoking the custom converter.
    pub fn serialize_opt<T>(&self, value: Option<&T>) -> RedisResult<WireValue>
    where
        T: Serialize + Any,
    {
        match value {
            None => Ok(WireValue::Null),
            Some(v) => self.serialize(v),
        }
    }

    /// Convert a wire value back into a typed value
    ///
    /// Fails with [`RedisError::Conversion`] if the wire data is not valid
    /// for the requested type. A null marker is an error here; use
    /// [`ValueConverter::deserialize_opt`] where absence is expected.
    pub fn deserialize<T>(&self, value: &WireValue) -> RedisResult<T>
    where
        T: DeserializeOwned + Any,
    {
        if let Some(codec) = primitive::lookup(TypeId::of::<T>()) {
            let boxed = codec.decode(value)?;
            return Ok(*boxed
                .downcast::<T>()
                .expect("codec registered under this TypeId"));
        }
        if value.is_null() {
            return Err(RedisError::Conversion(
                "cannot deserialize null into a non-optional type".to_string(),
            ));
        }
        let bytes = value.as_bytes()?;
        let document = self.custom.decode(&bytes)?;
        serde_json::from_value(document)
            .map_err(|e| RedisError::Conversion(format!("deserialization failed: {}", e)))
    }

    /// Convert a wire value that may be the null marker, mapping null to
    /// `None` without invoking the custom converter.
    pub fn deserialize_opt<T>(&self, value: &WireValue) -> RedisResult<Option<T>>
    where
        T: DeserializeOwned + Any,
    {
        if value.is_null() {
            return Ok(None);
        }
        self.deserialize(value).map(Some)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use serde::Deserialize;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Session {
        user: String,
        hits: u32,
    }

    /// Custom converter double that panics if it is ever consulted.
    struct ForbiddenConverter;

    impl CustomConverter for ForbiddenConverter {
        fn encode(&self, _document: serde_json::Value) -> RedisResult<Bytes> {
            panic!("custom converter must not be invoked");
        }

        fn decode(&self, _bytes: &[u8]) -> RedisResult<serde_json::Value> {
            panic!("custom converter must not be invoked");
        }
    }

    #[test]
    fn test_primitive_fast_path_bypasses_custom() {
        let converter = ValueConverter::new(Arc::new(ForbiddenConverter));
        let wire = converter.serialize(&42i64).unwrap();
        assert_eq!(wire, WireValue::Integer(42));
        assert_eq!(converter.deserialize::<i64>(&wire).unwrap(), 42);
    }

    #[test]
    fn test_null_marker_short_circuit() {
        let converter = ValueConverter::new(Arc::new(ForbiddenConverter));
        let wire = converter.serialize_opt::<Session>(None).unwrap();
        assert!(wire.is_null());
        let back: Option<Session> = converter.deserialize_opt(&WireValue::Null).unwrap();
        assert!(back.is_none());
    }

    #[test]
    fn test_custom_type_roundtrip() {
        let converter = ValueConverter::default();
        let session = Session {
            user: "alice".to_string(),
            hits: 7,
        };
        let wire = converter.serialize(&session).unwrap();
        assert!(matches!(wire, WireValue::Bytes(_)));
        let back: Session = converter.deserialize(&wire).unwrap();
        assert_eq!(back, session);
    }

    #[test]
    fn test_deserialize_corrupt_bytes() {
        let converter = ValueConverter::default();
        let wire = WireValue::Bytes(Bytes::from_static(b"\xff\xfe not json"));
        assert!(converter.deserialize::<Session>(&wire).is_err());
    }

    #[test]
    fn test_deserialize_null_into_required_type() {
        let converter = ValueConverter::default();
        assert!(converter.deserialize::<Session>(&WireValue::Null).is_err());
        assert!(converter.deserialize::<i64>(&WireValue::Null).is_err());
    }

    #[test]
    fn test_optional_primitive_through_table() {
        let converter = ValueConverter::new(Arc::new(ForbiddenConverter));
        let wire = converter.serialize(&Some(5u32)).unwrap();
        assert_eq!(wire, WireValue::Integer(5));
        let absent = converter.serialize(&None::<u32>).unwrap();
        assert!(absent.is_null());
        assert_eq!(
            converter.deserialize::<Option<u32>>(&WireValue::Null).unwrap(),
            None
        );
    }
}
