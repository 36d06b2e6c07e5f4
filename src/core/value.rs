//! Wire value types
//!
//! A [`WireValue`] is the scalar unit a serializer produces and a
//! deserializer consumes: integers, floats, booleans, strings, or raw bytes.
//! Structured data never appears here directly; it is serialized to bytes
//! first. The `Array` variant exists only for multi-value command replies
//! coming back from the transport (e.g. `LRANGE`, `HGETALL`).

use crate::core::error::{RedisError, RedisResult};
use bytes::Bytes;

/// Scalar wire representation of a value sent to or received from Redis
#[derive(Debug, Clone, PartialEq)]
pub enum WireValue {
    /// Null marker: key absent / no value
    Null,
    /// Signed integer
    Integer(i64),
    /// Double-precision float
    Float(f64),
    /// Boolean
    Boolean(bool),
    /// UTF-8 string
    String(String),
    /// Raw binary payload
    Bytes(Bytes),
    /// Multi-value reply from the transport; never produced by serialization
    Array(Vec<WireValue>),
}

impl WireValue {
    /// Convert to an integer if possible
    pub fn as_int(&self) -> RedisResult<i64> {
        match self {
            WireValue::Integer(i) => Ok(*i),
            WireValue::String(s) => s
                .parse::<i64>()
                .map_err(|e| RedisError::Conversion(format!("cannot parse integer: {}", e))),
            WireValue::Bytes(b) => {
                let s = std::str::from_utf8(b)
                    .map_err(|e| RedisError::Conversion(format!("invalid UTF-8: {}", e)))?;
                s.parse::<i64>()
                    .map_err(|e| RedisError::Conversion(format!("cannot parse integer: {}", e)))
            }
            _ => Err(RedisError::Conversion(format!(
                "cannot convert {:?} to integer",
                self
            ))),
        }
    }

    /// Convert to a float if possible
    pub fn as_float(&self) -> RedisResult<f64> {
        match self {
            WireValue::Float(f) => Ok(*f),
            WireValue::Integer(i) => Ok(*i as f64),
            WireValue::String(s) => s
                .parse::<f64>()
                .map_err(|e| RedisError::Conversion(format!("cannot parse float: {}", e))),
            WireValue::Bytes(b) => {
                let s = std::str::from_utf8(b)
                    .map_err(|e| RedisError::Conversion(format!("invalid UTF-8: {}", e)))?;
                s.parse::<f64>()
                    .map_err(|e| RedisError::Conversion(format!("cannot parse float: {}", e)))
            }
            _ => Err(RedisError::Conversion(format!(
                "cannot convert {:?} to float",
                self
            ))),
        }
    }

    /// Convert to a string if possible
    pub fn as_string(&self) -> RedisResult<String> {
        match self {
            WireValue::String(s) => Ok(s.clone()),
            WireValue::Bytes(b) => String::from_utf8(b.to_vec())
                .map_err(|e| RedisError::Conversion(format!("invalid UTF-8: {}", e))),
            WireValue::Integer(i) => Ok(i.to_string()),
            WireValue::Float(f) => Ok(f.to_string()),
            WireValue::Null => Err(RedisError::Conversion("value is null".to_string())),
            _ => Err(RedisError::Conversion(format!(
                "cannot convert {:?} to string",
                self
            ))),
        }
    }

    /// Convert to bytes if possible
    pub fn as_bytes(&self) -> RedisResult<Bytes> {
        match self {
            WireValue::Bytes(b) => Ok(b.clone()),
            WireValue::String(s) => Ok(Bytes::copy_from_slice(s.as_bytes())),
            WireValue::Null => Err(RedisError::Conversion("value is null".to_string())),
            _ => Err(RedisError::Conversion(format!(
                "cannot convert {:?} to bytes",
                self
            ))),
        }
    }

    /// Convert to a boolean if possible
    pub fn as_bool(&self) -> RedisResult<bool> {
        match self {
            WireValue::Boolean(b) => Ok(*b),
            WireValue::Integer(i) => Ok(*i != 0),
            WireValue::String(s) => match s.as_str() {
                "true" | "1" => Ok(true),
                "false" | "0" => Ok(false),
                _ => Err(RedisError::Conversion(format!(
                    "cannot parse boolean from {:?}",
                    s
                ))),
            },
            _ => Err(RedisError::Conversion(format!(
                "cannot convert {:?} to boolean",
                self
            ))),
        }
    }

    /// Convert to an array of values if possible
    pub fn into_array(self) -> RedisResult<Vec<WireValue>> {
        match self {
            WireValue::Array(values) => Ok(values),
            WireValue::Null => Ok(Vec::new()),
            _ => Err(RedisError::Conversion(format!(
                "cannot convert {:?} to array",
                self
            ))),
        }
    }

    /// Check if this is the null marker
    pub fn is_null(&self) -> bool {
        matches!(self, WireValue::Null)
    }
}

impl From<String> for WireValue {
    fn from(s: String) -> Self {
        WireValue::String(s)
    }
}

impl From<&str> for WireValue {
    fn from(s: &str) -> Self {
        WireValue::String(s.to_string())
    }
}

impl From<i64> for WireValue {
    fn from(i: i64) -> Self {
        WireValue::Integer(i)
    }
}

impl From<f64> for WireValue {
    fn from(f: f64) -> Self {
        WireValue::Float(f)
    }
}

impl From<bool> for WireValue {
    fn from(b: bool) -> Self {
        WireValue::Boolean(b)
    }
}

impl From<Vec<u8>> for WireValue {
    fn from(b: Vec<u8>) -> Self {
        WireValue::Bytes(Bytes::from(b))
    }
}

impl From<Bytes> for WireValue {
    fn from(b: Bytes) -> Self {
        WireValue::Bytes(b)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_as_int() {
        assert_eq!(WireValue::Integer(42).as_int().unwrap(), 42);
        assert_eq!(WireValue::String("123".to_string()).as_int().unwrap(), 123);
        assert_eq!(
            WireValue::Bytes(Bytes::from_static(b"-7")).as_int().unwrap(),
            -7
        );
        assert!(WireValue::Null.as_int().is_err());
    }

    #[test]
    fn test_as_float() {
        assert_eq!(WireValue::Float(1.5).as_float().unwrap(), 1.5);
        assert_eq!(WireValue::Integer(3).as_float().unwrap(), 3.0);
        assert_eq!(
            WireValue::String("2.25".to_string()).as_float().unwrap(),
            2.25
        );
    }

    #[test]
    fn test_as_string() {
        assert_eq!(
            WireValue::String("ok".to_string()).as_string().unwrap(),
            "ok"
        );
        assert_eq!(
            WireValue::Bytes(Bytes::from_static(b"raw"))
                .as_string()
                .unwrap(),
            "raw"
        );
        assert_eq!(WireValue::Integer(9).as_string().unwrap(), "9");
        assert!(WireValue::Null.as_string().is_err());
    }

    #[test]
    fn test_as_bool() {
        assert!(WireValue::Boolean(true).as_bool().unwrap());
        assert!(WireValue::Integer(1).as_bool().unwrap());
        assert!(!WireValue::String("false".to_string()).as_bool().unwrap());
    }

    #[test]
    fn test_into_array() {
        let arr = WireValue::Array(vec![WireValue::Integer(1), WireValue::Integer(2)]);
        assert_eq!(arr.into_array().unwrap().len(), 2);
        assert!(WireValue::Null.into_array().unwrap().is_empty());
        assert!(WireValue::Integer(1).into_array().is_err());
    }

    #[test]
    fn test_is_null() {
        assert!(WireValue::Null.is_null());
        assert!(!WireValue::Integer(0).is_null());
    }
}
