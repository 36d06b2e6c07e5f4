//! Typed member-set wrapper
//!
//! [`RedisSet`] stores presence as a hash field (the serialized member)
//! mapped to a serialized `true`, rather than using a native Redis set.
//! This shares the dictionary wrapper's serialization behavior: existence
//! is determined by field presence, never by the stored value's content.

use crate::connection::Connection;
use crate::convert::Storable;
use crate::core::error::RedisResult;
use crate::core::value::WireValue;
use crate::executor;
use std::marker::PhantomData;
use std::time::Duration;

/// Typed wrapper for a set of members, backed by a Redis hash
#[derive(Debug, Clone)]
pub struct RedisSet<T> {
    connection: Connection,
    key: String,
    default_expiry: Option<Duration>,
    _marker: PhantomData<fn() -> T>,
}

impl<T: Storable> RedisSet<T> {
    /// Create a wrapper for the given key with no default expiry
    pub fn new(connection: &Connection, key: impl Into<String>) -> Self {
        Self {
            connection: connection.clone(),
            key: key.into(),
            default_expiry: None,
            _marker: PhantomData,
        }
    }

    /// Set a default expiry applied to writes that pass no per-call expiry
    #[must_use]
    pub fn with_default_expiry(mut self, expiry: Duration) -> Self {
        self.default_expiry = Some(expiry);
        self
    }

    /// The key this wrapper operates on
    pub fn key(&self) -> &str {
        &self.key
    }

    fn expiry_for(&self, per_call: Option<Duration>) -> Option<Duration> {
        per_call.or(self.default_expiry)
    }

    fn key_arg(&self) -> WireValue {
        WireValue::from(self.key.as_str())
    }

    /// Add a member; returns true if it was not present before
    pub async fn add(&self, member: &T, expiry: Option<Duration>) -> RedisResult<bool> {
        let converter = self.connection.converter();
        let field = converter.serialize(member)?;
        let marker = converter.serialize(&true)?;
        executor::execute_with_expiry(
            &self.connection,
            &self.key,
            "HSET",
            vec![self.key_arg(), field, marker],
            self.expiry_for(expiry),
            |reply| Ok(reply.as_int()? != 0),
        )
        .await
    }

    /// Add several members; returns the number newly added
    pub async fn add_many(&self, members: &[T], expiry: Option<Duration>) -> RedisResult<i64> {
        let converter = self.connection.converter();
        let marker = converter.serialize(&true)?;
        let mut args = Vec::with_capacity(1 + members.len() * 2);
        args.push(self.key_arg());
        for member in members {
            args.push(converter.serialize(member)?);
            args.push(marker.clone());
        }
        executor::execute_with_expiry(
            &self.connection,
            &self.key,
            "HSET",
            args,
            self.expiry_for(expiry),
            |reply| reply.as_int(),
        )
        .await
    }

    /// Whether the member is present
    pub async fn contains(&self, member: &T) -> RedisResult<bool> {
        let field = self.connection.converter().serialize(member)?;
        let reply = self
            .connection
            .execute("HEXISTS", &[self.key_arg(), field])
            .await?;
        Ok(reply.as_int()? != 0)
    }

    /// Remove a member; returns whether it was present
    pub async fn remove(&self, member: &T) -> RedisResult<bool> {
        let field = self.connection.converter().serialize(member)?;
        let reply = self
            .connection
            .execute("HDEL", &[self.key_arg(), field])
            .await?;
        Ok(reply.as_int()? != 0)
    }

    /// Every member of the set
    pub async fn members(&self) -> RedisResult<Vec<T>> {
        let reply = self.connection.execute("HKEYS", &[self.key_arg()]).await?;
        let converter = self.connection.converter();
        reply
            .into_array()?
            .iter()
            .map(|v| converter.deserialize(v))
            .collect()
    }

    /// The number of members
    pub async fn len(&self) -> RedisResult<i64> {
        let reply = self.connection.execute("HLEN", &[self.key_arg()]).await?;
        reply.as_int()
    }

    /// Whether the set is empty or absent
    pub async fn is_empty(&self) -> RedisResult<bool> {
        Ok(self.len().await? == 0)
    }

    /// Delete the whole set; returns whether it existed
    pub async fn delete(&self) -> RedisResult<bool> {
        let reply = self.connection.execute("DEL", &[self.key_arg()]).await?;
        Ok(reply.as_int()? != 0)
    }
}
