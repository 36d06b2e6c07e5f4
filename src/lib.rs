//! Typed data-structure layer over Redis
//!
//! `redis-typed` wraps individual Redis keys in strongly typed handles:
//! [`RedisString<T>`], [`RedisList<T>`], [`RedisSet<T>`],
//! [`RedisSortedSet<T>`], [`RedisDictionary<K, V>`], [`RedisHyperLogLog<T>`],
//! [`RedisGeo<T>`], [`RedisLock`], and [`RedisLua`]. Values move through a
//! pluggable conversion layer: primitives take a direct wire fast path, and
//! everything else goes through a configurable serializer (JSON by default).
//!
//! The actual Redis I/O sits behind the [`Transport`] trait, so the library
//! works with any underlying client, and tests run against the in-memory
//! [`MemoryTransport`].
//!
//! # Features
//!
//! - One typed handle per key, cheap to clone and share
//! - Primitive fast path plus pluggable serialization for custom types
//! - Default and per-call expiry, composed atomically with each write
//! - Client-side transactions with deferred typed results
//! - Atomic increment-with-bound operations via bundled Lua scripts
//! - Distributed lock with compare-token release and extension
//!
//! # Quick Start
//!
//! ```no_run
//! use redis_typed::{Connection, ConnectionConfig, MemoryTransport, RedisString};
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ConnectionConfig::new("redis://localhost:6379");
//!     let connection = Connection::new(config, MemoryTransport::new().factory());
//!
//!     let greeting = RedisString::<String>::new(&connection, "greeting");
//!     greeting
//!         .set(&"hello".to_string(), Some(Duration::from_secs(60)))
//!         .await?;
//!     let value = greeting.get().await?;
//!     println!("Value: {:?}", value.into_option());
//!
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::missing_const_for_fn)]
#![allow(clippy::uninlined_format_args)]
#![allow(clippy::doc_markdown)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_sign_loss)]
#![allow(clippy::cast_lossless)]
#![allow(clippy::return_self_not_must_use)]
#![allow(clippy::manual_let_else)]

pub mod connection;
pub mod convert;
pub mod core;
pub mod result;
pub mod testing;
pub mod transaction;
pub mod types;

pub(crate) mod executor;

pub use crate::connection::{
    Connection, ConnectionBuilder, QueuedCommand, Transport, TransportFactory,
};
pub use crate::convert::{CustomConverter, JsonConverter, Storable, ValueConverter};
pub use crate::core::{ConnectionConfig, RedisError, RedisResult, WireValue};
pub use crate::result::{RedisValue, RedisValueWithExpiry};
pub use crate::testing::MemoryTransport;
pub use crate::transaction::{Pending, Transaction};
pub use crate::types::{
    GeoEntry, GeoPosition, GeoUnit, LockGuard, RedisDictionary, RedisGeo, RedisHyperLogLog,
    RedisList, RedisLock, RedisLua, RedisSet, RedisSortedSet, RedisString, Script,
};
