//! Typed list wrapper

use crate::connection::Connection;
use crate::convert::Storable;
use crate::core::error::RedisResult;
use crate::core::value::WireValue;
use crate::executor;
use crate::result::RedisValue;
use std::marker::PhantomData;
use std::time::Duration;

/// Typed wrapper for a Redis list
///
/// Range operations follow the Redis index convention: negative indices
/// count from the end (`-1` is the last element), and a resolved start past
/// the stop yields an empty result rather than an error.
#[derive(Debug, Clone)]
pub struct RedisList<T> {
    connection: Connection,
    key: String,
    default_expiry: Option<Duration>,
    _marker: PhantomData<fn() -> T>,
}

impl<T: Storable> RedisList<T> {
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

    async fn push(
        &self,
        command: &'static str,
        values: &[T],
        expiry: Option<Duration>,
    ) -> RedisResult<i64> {
        let converter = self.connection.converter();
        let mut args = Vec::with_capacity(1 + values.len());
        args.push(self.key_arg());
        for value in values {
            args.push(converter.serialize(value)?);
        }
        executor::execute_with_expiry(
            &self.connection,
            &self.key,
            command,
            args,
            self.expiry_for(expiry),
            |reply| reply.as_int(),
        )
        .await
    }

    /// Prepend a value; returns the new list length
    pub async fn push_front(&self, value: &T, expiry: Option<Duration>) -> RedisResult<i64> {
        self.push("LPUSH", std::slice::from_ref(value), expiry).await
    }

    /// Prepend several values; returns the new list length
    pub async fn push_front_many(
        &self,
        values: &[T],
        expiry: Option<Duration>,
    ) -> RedisResult<i64> {
        self.push("LPUSH", values, expiry).await
    }

    /// Append a value; returns the new list length
    pub async fn push_back(&self, value: &T, expiry: Option<Duration>) -> RedisResult<i64> {
        self.push("RPUSH", std::slice::from_ref(value), expiry).await
    }

    /// Append several values; returns the new list length
    pub async fn push_back_many(
        &self,
        values: &[T],
        expiry: Option<Duration>,
    ) -> RedisResult<i64> {
        self.push("RPUSH", values, expiry).await
    }

    /// Remove and return the first element
    pub async fn pop_front(&self) -> RedisResult<RedisValue<T>> {
        let reply = self.connection.execute("LPOP", &[self.key_arg()]).await?;
        let value = self.connection.converter().deserialize_opt(&reply)?;
        Ok(RedisValue::from_option(value))
    }

    /// Remove and return the last element
    pub async fn pop_back(&self) -> RedisResult<RedisValue<T>> {
        let reply = self.connection.execute("RPOP", &[self.key_arg()]).await?;
        let value = self.connection.converter().deserialize_opt(&reply)?;
        Ok(RedisValue::from_option(value))
    }

    /// Elements between `start` and `stop`, inclusive, in list order
    pub async fn range(&self, start: i64, stop: i64) -> RedisResult<Vec<T>> {
        let reply = self
            .connection
            .execute(
                "LRANGE",
                &[
                    self.key_arg(),
                    WireValue::Integer(start),
                    WireValue::Integer(stop),
                ],
            )
            .await?;
        let converter = self.connection.converter();
        reply
            .into_array()?
            .iter()
            .map(|v| converter.deserialize(v))
            .collect()
    }

    /// The element at `index`; negative indices count from the end
    pub async fn index(&self, index: i64) -> RedisResult<RedisValue<T>> {
        let reply = self
            .connection
            .execute("LINDEX", &[self.key_arg(), WireValue::Integer(index)])
            .await?;
        let value = self.connection.converter().deserialize_opt(&reply)?;
        Ok(RedisValue::from_option(value))
    }

    /// Overwrite the element at `index`; out-of-range is a server error
    pub async fn set_at(
        &self,
        index: i64,
        value: &T,
        expiry: Option<Duration>,
    ) -> RedisResult<()> {
        let wire = self.connection.converter().serialize(value)?;
        executor::execute_with_expiry_unit(
            &self.connection,
            &self.key,
            "LSET",
            vec![self.key_arg(), WireValue::Integer(index), wire],
            self.expiry_for(expiry),
        )
        .await
    }

    /// Insert `value` immediately before the first occurrence of `pivot`;
    /// returns the new length, or -1 if the pivot was not found
    pub async fn insert_before(
        &self,
        pivot: &T,
        value: &T,
        expiry: Option<Duration>,
    ) -> RedisResult<i64> {
        self.insert("BEFORE", pivot, value, expiry).await
    }

    /// Insert `value` immediately after the first occurrence of `pivot`;
    /// returns the new length, or -1 if the pivot was not found
    pub async fn insert_after(
        &self,
        pivot: &T,
        value: &T,
        expiry: Option<Duration>,
    ) -> RedisResult<i64> {
        self.insert("AFTER", pivot, value, expiry).await
    }

    async fn insert(
        &self,
        position: &'static str,
        pivot: &T,
        value: &T,
        expiry: Option<Duration>,
    ) -> RedisResult<i64> {
        let converter = self.connection.converter();
        let pivot = converter.serialize(pivot)?;
        let value = converter.serialize(value)?;
        executor::execute_with_expiry(
            &self.connection,
            &self.key,
            "LINSERT",
            vec![self.key_arg(), WireValue::from(position), pivot, value],
            self.expiry_for(expiry),
            |reply| reply.as_int(),
        )
        .await
    }

    /// Remove occurrences of `value`: `count > 0` from the head, `< 0` from
    /// the tail, `0` all. Returns the number removed.
    pub async fn remove(&self, value: &T, count: i64) -> RedisResult<i64> {
        let wire = self.connection.converter().serialize(value)?;
        let reply = self
            .connection
            .execute("LREM", &[self.key_arg(), WireValue::Integer(count), wire])
            .await?;
        reply.as_int()
    }

    /// Trim the list to the elements between `start` and `stop`, inclusive
    pub async fn trim(
        &self,
        start: i64,
        stop: i64,
        expiry: Option<Duration>,
    ) -> RedisResult<()> {
        executor::execute_with_expiry_unit(
            &self.connection,
            &self.key,
            "LTRIM",
            vec![
                self.key_arg(),
                WireValue::Integer(start),
                WireValue::Integer(stop),
            ],
            self.expiry_for(expiry),
        )
        .await
    }

    /// The number of elements in the list
    pub async fn len(&self) -> RedisResult<i64> {
        let reply = self.connection.execute("LLEN", &[self.key_arg()]).await?;
        reply.as_int()
    }

    /// Whether the list is empty or absent
    pub async fn is_empty(&self) -> RedisResult<bool> {
        Ok(self.len().await? == 0)
    }

    /// Delete the key; returns whether it existed
    pub async fn delete(&self) -> RedisResult<bool> {
        let reply = self.connection.execute("DEL", &[self.key_arg()]).await?;
        Ok(reply.as_int()? != 0)
    }
}
