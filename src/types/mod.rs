//! Typed structure wrappers
//!
//! One wrapper per Redis data structure, each a cheap immutable value
//! combining a connection, a key, and an optional default expiry. Every
//! mutating operation accepts a per-call expiry that overrides the default;
//! every read deserializes through the connection's converter.

pub mod dictionary;
pub mod geo;
pub mod hyperloglog;
pub mod list;
pub mod lock;
pub mod script;
pub mod set;
pub mod sorted_set;
pub mod string;

pub use dictionary::RedisDictionary;
pub use geo::{GeoEntry, GeoPosition, GeoUnit, RedisGeo};
pub use hyperloglog::RedisHyperLogLog;
pub use list::RedisList;
pub use lock::{LockGuard, RedisLock};
pub use script::{RedisLua, Script};
pub use set::RedisSet;
pub use sorted_set::RedisSortedSet;
pub use string::RedisString;
