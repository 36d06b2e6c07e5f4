//! Core types: errors, configuration, and the wire value representation

pub mod config;
pub mod error;
pub mod value;

pub use config::ConnectionConfig;
pub use error::{RedisError, RedisResult};
pub use value::WireValue;
