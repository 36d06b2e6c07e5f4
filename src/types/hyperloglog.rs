//! Typed HyperLogLog wrapper

use crate::connection::Connection;
use crate::convert::Storable;
use crate::core::error::RedisResult;
use crate::core::value::WireValue;
use crate::executor;
use std::marker::PhantomData;
use std::time::Duration;

/// Typed wrapper for a Redis HyperLogLog cardinality estimator
#[derive(Debug, Clone)]
pub struct RedisHyperLogLog<T> {
    connection: Connection,
    key: String,
    default_expiry: Option<Duration>,
    _marker: PhantomData<fn() -> T>,
}

impl<T: Storable> RedisHyperLogLog<T> {
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

    /// Observe an element; returns true if the estimate changed
    pub async fn add(&self, value: &T, expiry: Option<Duration>) -> RedisResult<bool> {
        self.add_many(std::slice::from_ref(value), expiry).await
    }

    /// Observe several elements; returns true if the estimate changed
    pub async fn add_many(&self, values: &[T], expiry: Option<Duration>) -> RedisResult<bool> {
        let converter = self.connection.converter();
        let mut args = Vec::with_capacity(1 + values.len());
        args.push(self.key_arg());
        for value in values {
            args.push(converter.serialize(value)?);
        }
        executor::execute_with_expiry(
            &self.connection,
            &self.key,
            "PFADD",
            args,
            self.expiry_for(expiry),
            |reply| Ok(reply.as_int()? != 0),
        )
        .await
    }

    /// The estimated cardinality
    pub async fn count(&self) -> RedisResult<i64> {
        let reply = self.connection.execute("PFCOUNT", &[self.key_arg()]).await?;
        reply.as_int()
    }

    /// Merge other estimators into this one
    pub async fn merge_from(&self, sources: &[&RedisHyperLogLog<T>]) -> RedisResult<()> {
        let mut args = Vec::with_capacity(1 + sources.len());
        args.push(self.key_arg());
        for source in sources {
            args.push(WireValue::from(source.key()));
        }
        self.connection.execute("PFMERGE", &args).await?;
        Ok(())
    }

    /// Delete the estimator; returns whether it existed
    pub async fn delete(&self) -> RedisResult<bool> {
        let reply = self.connection.execute("DEL", &[self.key_arg()]).await?;
        Ok(reply.as_int()? != 0)
    }
}
