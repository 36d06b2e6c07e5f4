//! Primitive converter table
//!
//! A process-wide, immutable registry mapping each scalar type to a
//! specialized encode/decode pair that goes straight to the wire
//! representation, bypassing the general-purpose serializer. Lookup is an
//! O(1) `TypeId` probe into a table built once on first use.

use crate::core::error::{RedisError, RedisResult};
use crate::core::value::WireValue;
use bytes::Bytes;
use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::LazyLock;

/// Specialized converter between one exact scalar type and the wire value
pub(crate) struct PrimitiveCodec {
    encode: fn(&dyn Any) -> WireValue,
    decode: fn(&WireValue) -> RedisResult<Box<dyn Any>>,
}

impl PrimitiveCodec {
    pub(crate) fn encode(&self, value: &dyn Any) -> WireValue {
        (self.encode)(value)
    }

    pub(crate) fn decode(&self, value: &WireValue) -> RedisResult<Box<dyn Any>> {
        (self.decode)(value)
    }
}

/// Look up the primitive codec for a type, if one is registered.
pub(crate) fn lookup(type_id: TypeId) -> Option<&'static PrimitiveCodec> {
    TABLE.get(&type_id)
}

/// Direct scalar-to-wire conversion, implemented for every type in the table
trait Primitive: Sized + 'static {
    fn to_wire(&self) -> WireValue;
    fn from_wire(value: &WireValue) -> RedisResult<Self>;
}

// The nullable form of every registered scalar maps None to the wire null
// marker and never consults the inner codec for it.
impl<T: Primitive> Primitive for Option<T> {
    fn to_wire(&self) -> WireValue {
        match self {
            None => WireValue::Null,
            Some(v) => v.to_wire(),
        }
    }

    fn from_wire(value: &WireValue) -> RedisResult<Self> {
        if value.is_null() {
            Ok(None)
        } else {
            T::from_wire(value).map(Some)
        }
    }
}

impl Primitive for bool {
    fn to_wire(&self) -> WireValue {
        WireValue::Boolean(*self)
    }

    fn from_wire(value: &WireValue) -> RedisResult<Self> {
        value.as_bool()
    }
}

impl Primitive for char {
    fn to_wire(&self) -> WireValue {
        WireValue::String(self.to_string())
    }

    fn from_wire(value: &WireValue) -> RedisResult<Self> {
        let s = value.as_string()?;
        let mut chars = s.chars();
        match (chars.next(), chars.next()) {
            (Some(c), None) => Ok(c),
            _ => Err(RedisError::Conversion(format!(
                "expected a single character, got {:?}",
                s
            ))),
        }
    }
}

macro_rules! impl_primitive_int {
    ($($ty:ty),*) => {
        $(
            impl Primitive for $ty {
                fn to_wire(&self) -> WireValue {
                    WireValue::Integer(i64::from(*self))
                }

                fn from_wire(value: &WireValue) -> RedisResult<Self> {
                    let i = value.as_int()?;
                    <$ty>::try_from(i).map_err(|_| {
                        RedisError::Conversion(format!(
                            "integer {} out of range for {}",
                            i,
                            stringify!($ty)
                        ))
                    })
                }
            }
        )*
    };
}

impl_primitive_int!(i8, i16, i32, u8, u16, u32);

impl Primitive for i64 {
    fn to_wire(&self) -> WireValue {
        WireValue::Integer(*self)
    }

    fn from_wire(value: &WireValue) -> RedisResult<Self> {
        value.as_int()
    }
}

impl Primitive for u64 {
    fn to_wire(&self) -> WireValue {
        // Values above i64::MAX do not fit the integer wire form; Redis
        // stores integers as strings on the wire, so the decimal form is
        // equally canonical.
        match i64::try_from(*self) {
            Ok(i) => WireValue::Integer(i),
            Err(_) => WireValue::String(self.to_string()),
        }
    }

    fn from_wire(value: &WireValue) -> RedisResult<Self> {
        match value {
            WireValue::Integer(i) => u64::try_from(*i).map_err(|_| {
                RedisError::Conversion(format!("integer {} out of range for u64", i))
            }),
            other => other.as_string()?.parse::<u64>().map_err(|e| {
                RedisError::Conversion(format!("cannot parse u64: {}", e))
            }),
        }
    }
}

impl Primitive for f32 {
    fn to_wire(&self) -> WireValue {
        WireValue::Float(f64::from(*self))
    }

    fn from_wire(value: &WireValue) -> RedisResult<Self> {
        Ok(value.as_float()? as f32)
    }
}

impl Primitive for f64 {
    fn to_wire(&self) -> WireValue {
        WireValue::Float(*self)
    }

    fn from_wire(value: &WireValue) -> RedisResult<Self> {
        value.as_float()
    }
}

impl Primitive for String {
    fn to_wire(&self) -> WireValue {
        WireValue::String(self.clone())
    }

    fn from_wire(value: &WireValue) -> RedisResult<Self> {
        value.as_string()
    }
}

impl Primitive for Vec<u8> {
    fn to_wire(&self) -> WireValue {
        WireValue::Bytes(Bytes::copy_from_slice(self))
    }

    fn from_wire(value: &WireValue) -> RedisResult<Self> {
        Ok(value.as_bytes()?.to_vec())
    }
}

impl Primitive for Bytes {
    fn to_wire(&self) -> WireValue {
        WireValue::Bytes(self.clone())
    }

    fn from_wire(value: &WireValue) -> RedisResult<Self> {
        value.as_bytes()
    }
}

fn encode_as<T: Primitive>(value: &dyn Any) -> WireValue {
    value
        .downcast_ref::<T>()
        .expect("codec registered under this TypeId")
        .to_wire()
}

fn decode_as<T: Primitive>(value: &WireValue) -> RedisResult<Box<dyn Any>> {
    T::from_wire(value).map(|v| Box::new(v) as Box<dyn Any>)
}

static TABLE: LazyLock<HashMap<TypeId, PrimitiveCodec>> = LazyLock::new(|| {
    let mut table = HashMap::new();

    macro_rules! register {
        ($($ty:ty),*) => {
            $(
                table.insert(
                    TypeId::of::<$ty>(),
                    PrimitiveCodec {
                        encode: encode_as::<$ty>,
                        decode: decode_as::<$ty>,
                    },
                );
                table.insert(
                    TypeId::of::<Option<$ty>>(),
                    PrimitiveCodec {
                        encode: encode_as::<Option<$ty>>,
                        decode: decode_as::<Option<$ty>>,
                    },
                );
            )*
        };
    }

    register!(
        bool,
        char,
        i8,
        i16,
        i32,
        i64,
        u8,
        u16,
        u32,
        u64,
        f32,
        f64,
        String,
        Vec<u8>,
        Bytes
    );

    table
});

#[cfg(test)]
mod tests {
    use super::*;

    fn roundtrip<T: Primitive + PartialEq + std::fmt::Debug + Clone>(value: T) {
        let wire = value.to_wire();
        let back = T::from_wire(&wire).unwrap();
        assert_eq!(back, value);
    }

    #[test]
    fn test_integer_roundtrip_boundaries() {
        roundtrip(0i64);
        roundtrip(-1i64);
        roundtrip(i64::MIN);
        roundtrip(i64::MAX);
        roundtrip(i8::MIN);
        roundtrip(i8::MAX);
        roundtrip(u8::MAX);
        roundtrip(u16::MAX);
        roundtrip(u32::MAX);
        roundtrip(u64::MAX);
        roundtrip(u64::MIN);
    }

    #[test]
    fn test_integer_range_check() {
        let wire = WireValue::Integer(300);
        assert!(i8::from_wire(&wire).is_err());
        assert!(u8::from_wire(&wire).is_err());
        assert!(u64::from_wire(&WireValue::Integer(-1)).is_err());
    }

    #[test]
    fn test_float_roundtrip() {
        roundtrip(0.0f64);
        roundtrip(f64::MAX);
        roundtrip(f64::MIN);
        roundtrip(f64::INFINITY);
        roundtrip(f64::NEG_INFINITY);
        roundtrip(1.5f32);
        roundtrip(f32::MAX);

        let nan = f64::from_wire(&f64::NAN.to_wire()).unwrap();
        assert!(nan.is_nan());
    }

    #[test]
    fn test_string_and_bytes_roundtrip() {
        roundtrip(String::new());
        roundtrip("héllo wörld".to_string());
        roundtrip(Vec::<u8>::new());
        roundtrip(vec![0u8, 255, 1, 128]);
        roundtrip(Bytes::from_static(b"payload"));
        roundtrip('x');
        roundtrip('é');
    }

    #[test]
    fn test_option_roundtrip() {
        roundtrip(Some(42i64));
        roundtrip(None::<i64>);
        roundtrip(Some("s".to_string()));
        roundtrip(None::<String>);
        assert_eq!(None::<i64>.to_wire(), WireValue::Null);
    }

    #[test]
    fn test_table_lookup() {
        assert!(lookup(TypeId::of::<i64>()).is_some());
        assert!(lookup(TypeId::of::<Option<bool>>()).is_some());
        assert!(lookup(TypeId::of::<Bytes>()).is_some());
        assert!(lookup(TypeId::of::<Vec<String>>()).is_none());
    }

    #[test]
    fn test_codec_dispatch_through_table() {
        let codec = lookup(TypeId::of::<i64>()).unwrap();
        let wire = codec.encode(&42i64);
        assert_eq!(wire, WireValue::Integer(42));
        let back = codec.decode(&wire).unwrap();
        assert_eq!(*back.downcast::<i64>().unwrap(), 42);
    }

    #[test]
    fn test_lenient_decode_from_string_wire() {
        // Replies from a real server arrive as bulk strings; numeric codecs
        // accept the textual form.
        assert_eq!(
            i64::from_wire(&WireValue::String("42".to_string())).unwrap(),
            42
        );
        assert_eq!(
            f64::from_wire(&WireValue::String("1.5".to_string())).unwrap(),
            1.5
        );
    }
}
