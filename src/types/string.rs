//! Typed string wrapper
//!
//! [`RedisString`] binds a connection, a key, and an optional default expiry
//! to a single Redis string value of type `T`. Writes route through the
//! expiry-composing executor; reads come back as [`RedisValue`].

use crate::connection::Connection;
use crate::convert::Storable;
use crate::core::error::RedisResult;
use crate::core::value::WireValue;
use crate::executor;
use crate::result::{RedisValue, RedisValueWithExpiry};
use crate::types::script::Script;
use std::future::Future;
use std::marker::PhantomData;
use std::sync::LazyLock;
use std::time::Duration;

/// Atomically increments and clamps to an upper bound.
pub(crate) static INCREMENT_LIMIT_MAX: LazyLock<Script> = LazyLock::new(|| {
    Script::new(
        r#"local v = redis.call('INCRBY', KEYS[1], ARGV[1])
local limit = tonumber(ARGV[2])
if v > limit then
    redis.call('SET', KEYS[1], ARGV[2])
    return limit
end
return v"#,
    )
});

/// Atomically decrements and clamps to a lower bound.
pub(crate) static DECREMENT_LIMIT_MIN: LazyLock<Script> = LazyLock::new(|| {
    Script::new(
        r#"local v = redis.call('DECRBY', KEYS[1], ARGV[1])
local limit = tonumber(ARGV[2])
if v < limit then
    redis.call('SET', KEYS[1], ARGV[2])
    return limit
end
return v"#,
    )
});

/// Typed wrapper for a Redis string value
///
/// Cheap, immutable value: clone freely, it never owns the connection.
///
/// When `T` is itself an `Option`, a stored `None` is written as the wire
/// null marker and reads back as an absent [`RedisValue`], indistinguishable
/// from a key that does not exist. Use a wrapper type with an explicit
/// variant if that distinction matters.
#[derive(Debug, Clone)]
pub struct RedisString<T> {
    connection: Connection,
    key: String,
    default_expiry: Option<Duration>,
    _marker: PhantomData<fn() -> T>,
}

impl<T: Storable> RedisString<T> {
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

    /// Store a value; an expiry (per-call or default) is applied atomically
    /// with the write. Without one, any existing expiration is left alone.
    pub async fn set(&self, value: &T, expiry: Option<Duration>) -> RedisResult<()> {
        let wire = self.connection.converter().serialize(value)?;
        match self.expiry_for(expiry) {
            None => {
                // KEEPTTL: a bare SET would drop an existing expiration.
                self.connection
                    .execute("SET", &[self.key_arg(), wire, WireValue::from("KEEPTTL")])
                    .await?;
                Ok(())
            }
            ttl @ Some(_) => {
                executor::execute_with_expiry_unit(
                    &self.connection,
                    &self.key,
                    "SET",
                    vec![self.key_arg(), wire],
                    ttl,
                )
                .await
            }
        }
    }

    /// Store a value only if the key does not exist; returns whether it was
    /// set. The expiry rides on the same `SET` command, so there is no TTL
    /// side effect when the key already exists.
    pub async fn set_if_not_exists(
        &self,
        value: &T,
        expiry: Option<Duration>,
    ) -> RedisResult<bool> {
        let wire = self.connection.converter().serialize(value)?;
        let mut args = vec![self.key_arg(), wire, WireValue::from("NX")];
        if let Some(ttl) = self.expiry_for(expiry) {
            args.push(WireValue::from("PX"));
            args.push(WireValue::Integer(ttl.as_millis() as i64));
        }
        let reply = self.connection.execute("SET", &args).await?;
        Ok(!reply.is_null())
    }

    /// Fetch the value; absent key yields an empty [`RedisValue`]
    pub async fn get(&self) -> RedisResult<RedisValue<T>> {
        let reply = self.connection.execute("GET", &[self.key_arg()]).await?;
        let value = self.connection.converter().deserialize_opt(&reply)?;
        Ok(RedisValue::from_option(value))
    }

    /// Fetch the value together with its remaining TTL, atomically
    pub async fn get_with_expiry(&self) -> RedisResult<RedisValueWithExpiry<T>> {
        let mut tx = self.connection.transaction();
        let value = tx.queue("GET", vec![self.key_arg()]);
        let ttl = tx.queue("PTTL", vec![self.key_arg()]);
        tx.exec().await?;

        let value = self
            .connection
            .converter()
            .deserialize_opt(&value.resolve().await?)?;
        let ttl_ms = ttl.resolve().await?.as_int()?;
        let expiry = u64::try_from(ttl_ms).ok().map(Duration::from_millis);
        Ok(RedisValueWithExpiry::new(value, expiry))
    }

    /// Store a new value and return the previous one. Without an expiry,
    /// any existing expiration is left alone.
    pub async fn get_and_set(
        &self,
        value: &T,
        expiry: Option<Duration>,
    ) -> RedisResult<RedisValue<T>> {
        let converter = self.connection.converter().clone();
        let wire = converter.serialize(value)?;
        match self.expiry_for(expiry) {
            None => {
                let reply = self
                    .connection
                    .execute(
                        "SET",
                        &[
                            self.key_arg(),
                            wire,
                            WireValue::from("GET"),
                            WireValue::from("KEEPTTL"),
                        ],
                    )
                    .await?;
                Ok(RedisValue::from_option(converter.deserialize_opt(&reply)?))
            }
            ttl @ Some(_) => {
                executor::execute_with_expiry(
                    &self.connection,
                    &self.key,
                    "SET",
                    vec![self.key_arg(), wire, WireValue::from("GET")],
                    ttl,
                    move |reply| {
                        Ok(RedisValue::from_option(converter.deserialize_opt(&reply)?))
                    },
                )
                .await
            }
        }
    }

    /// Return the cached value, or compute one, store it (with expiry), and
    /// return it. The factory runs at most once and never when a value
    /// already exists.
    pub async fn get_or_set<F>(&self, factory: F, expiry: Option<Duration>) -> RedisResult<T>
    where
        F: FnOnce() -> T,
    {
        if let Some(cached) = self.get().await?.into_option() {
            return Ok(cached);
        }
        let value = factory();
        self.set(&value, expiry).await?;
        Ok(value)
    }

    /// Async-factory variant of [`RedisString::get_or_set`]
    pub async fn get_or_set_with<F, Fut>(
        &self,
        factory: F,
        expiry: Option<Duration>,
    ) -> RedisResult<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        if let Some(cached) = self.get().await?.into_option() {
            return Ok(cached);
        }
        let value = factory().await;
        self.set(&value, expiry).await?;
        Ok(value)
    }

    /// Whether the key exists
    pub async fn exists(&self) -> RedisResult<bool> {
        let reply = self.connection.execute("EXISTS", &[self.key_arg()]).await?;
        Ok(reply.as_int()? != 0)
    }

    /// Delete the key; returns whether it existed
    pub async fn delete(&self) -> RedisResult<bool> {
        let reply = self.connection.execute("DEL", &[self.key_arg()]).await?;
        Ok(reply.as_int()? != 0)
    }

    /// Set the key's expiration; returns false if the key does not exist
    pub async fn expire(&self, expiry: Duration) -> RedisResult<bool> {
        let reply = self
            .connection
            .execute(
                "PEXPIRE",
                &[
                    self.key_arg(),
                    WireValue::Integer(expiry.as_millis() as i64),
                ],
            )
            .await?;
        Ok(reply.as_int()? != 0)
    }

    /// The key's remaining TTL, or `None` if absent or without expiration
    pub async fn time_to_live(&self) -> RedisResult<Option<Duration>> {
        let reply = self.connection.execute("PTTL", &[self.key_arg()]).await?;
        let ms = reply.as_int()?;
        Ok(u64::try_from(ms).ok().map(Duration::from_millis))
    }

    /// Append to the stored string; returns the new length
    pub async fn append(&self, value: &T, expiry: Option<Duration>) -> RedisResult<i64> {
        let wire = self.connection.converter().serialize(value)?;
        executor::execute_with_expiry(
            &self.connection,
            &self.key,
            "APPEND",
            vec![self.key_arg(), wire],
            self.expiry_for(expiry),
            |reply| reply.as_int(),
        )
        .await
    }

    /// Increment the key's integer value by one
    ///
    /// The key must hold an integer-compatible value; anything else is a
    /// server error, propagated untouched.
    pub async fn increment(&self, expiry: Option<Duration>) -> RedisResult<i64> {
        self.increment_by(1, expiry).await
    }

    /// Decrement the key's integer value by one
    pub async fn decrement(&self, expiry: Option<Duration>) -> RedisResult<i64> {
        self.increment_by(-1, expiry).await
    }

    /// Increment the key's integer value by `delta` (negative to decrement)
    pub async fn increment_by(&self, delta: i64, expiry: Option<Duration>) -> RedisResult<i64> {
        executor::execute_with_expiry(
            &self.connection,
            &self.key,
            "INCRBY",
            vec![self.key_arg(), WireValue::Integer(delta)],
            self.expiry_for(expiry),
            |reply| reply.as_int(),
        )
        .await
    }

    /// Increment the key's float value by `delta`
    pub async fn increment_float(
        &self,
        delta: f64,
        expiry: Option<Duration>,
    ) -> RedisResult<f64> {
        executor::execute_with_expiry(
            &self.connection,
            &self.key,
            "INCRBYFLOAT",
            vec![self.key_arg(), WireValue::Float(delta)],
            self.expiry_for(expiry),
            |reply| reply.as_float(),
        )
        .await
    }

    /// Atomically increment and clamp to an upper bound
    ///
    /// Runs entirely server-side in one step, so concurrent incrementers
    /// cannot race the value past `max`: the call that would cross the
    /// bound stores exactly `max`, and later calls return `max` unchanged.
    pub async fn increment_limit(&self, delta: i64, max: i64) -> RedisResult<i64> {
        let reply = INCREMENT_LIMIT_MAX
            .invoke(
                &self.connection,
                vec![self.key_arg()],
                vec![WireValue::Integer(delta), WireValue::Integer(max)],
            )
            .await?;
        reply.as_int()
    }

    /// Atomically decrement and clamp to a lower bound; symmetric to
    /// [`RedisString::increment_limit`]
    pub async fn decrement_limit(&self, delta: i64, min: i64) -> RedisResult<i64> {
        let reply = DECREMENT_LIMIT_MIN
            .invoke(
                &self.connection,
                vec![self.key_arg()],
                vec![WireValue::Integer(delta), WireValue::Integer(min)],
            )
            .await?;
        reply.as_int()
    }
}
