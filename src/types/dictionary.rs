//! Typed dictionary (hash) wrapper

use crate::connection::Connection;
use crate::convert::Storable;
use crate::core::error::RedisResult;
use crate::core::value::WireValue;
use crate::executor;
use crate::result::RedisValue;
use std::future::Future;
use std::marker::PhantomData;
use std::time::Duration;

/// Typed wrapper for a Redis hash, keyed by `K` with values of `V`
///
/// Field keys and values are both serialized through the connection's
/// converter, so any storable type works for either side.
#[derive(Debug, Clone)]
pub struct RedisDictionary<K, V> {
    connection: Connection,
    key: String,
    default_expiry: Option<Duration>,
    _marker: PhantomData<fn() -> (K, V)>,
}

impl<K: Storable, V: Storable> RedisDictionary<K, V> {
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

    /// Store a field; returns true if the field is new
    pub async fn set(
        &self,
        field: &K,
        value: &V,
        expiry: Option<Duration>,
    ) -> RedisResult<bool> {
        let converter = self.connection.converter();
        let field = converter.serialize(field)?;
        let value = converter.serialize(value)?;
        executor::execute_with_expiry(
            &self.connection,
            &self.key,
            "HSET",
            vec![self.key_arg(), field, value],
            self.expiry_for(expiry),
            |reply| Ok(reply.as_int()? != 0),
        )
        .await
    }

    /// Store several fields at once; returns the number of new fields
    pub async fn set_many(
        &self,
        entries: &[(K, V)],
        expiry: Option<Duration>,
    ) -> RedisResult<i64> {
        let converter = self.connection.converter();
        let mut args = Vec::with_capacity(1 + entries.len() * 2);
        args.push(self.key_arg());
        for (field, value) in entries {
            args.push(converter.serialize(field)?);
            args.push(converter.serialize(value)?);
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

    /// Fetch one field
    pub async fn get(&self, field: &K) -> RedisResult<RedisValue<V>> {
        let converter = self.connection.converter();
        let field = converter.serialize(field)?;
        let reply = self
            .connection
            .execute("HGET", &[self.key_arg(), field])
            .await?;
        Ok(RedisValue::from_option(converter.deserialize_opt(&reply)?))
    }

    /// Fetch several fields; each slot mirrors presence of its field
    pub async fn get_many(&self, fields: &[K]) -> RedisResult<Vec<RedisValue<V>>> {
        let converter = self.connection.converter();
        let mut args = Vec::with_capacity(1 + fields.len());
        args.push(self.key_arg());
        for field in fields {
            args.push(converter.serialize(field)?);
        }
        let reply = self.connection.execute("HMGET", &args).await?;
        reply
            .into_array()?
            .iter()
            .map(|v| Ok(RedisValue::from_option(converter.deserialize_opt(v)?)))
            .collect()
    }

    /// Return the cached field value, or compute one, store it (with
    /// expiry), and return it. The factory runs at most once and never when
    /// the field already exists.
    pub async fn get_or_set<F>(
        &self,
        field: &K,
        factory: F,
        expiry: Option<Duration>,
    ) -> RedisResult<V>
    where
        F: FnOnce() -> V,
    {
        if let Some(cached) = self.get(field).await?.into_option() {
            return Ok(cached);
        }
        let value = factory();
        self.set(field, &value, expiry).await?;
        Ok(value)
    }

    /// Async-factory variant of [`RedisDictionary::get_or_set`]
    pub async fn get_or_set_with<F, Fut>(
        &self,
        field: &K,
        factory: F,
        expiry: Option<Duration>,
    ) -> RedisResult<V>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = V>,
    {
        if let Some(cached) = self.get(field).await?.into_option() {
            return Ok(cached);
        }
        let value = factory().await;
        self.set(field, &value, expiry).await?;
        Ok(value)
    }

    /// Whether the field exists
    pub async fn contains_key(&self, field: &K) -> RedisResult<bool> {
        let field = self.connection.converter().serialize(field)?;
        let reply = self
            .connection
            .execute("HEXISTS", &[self.key_arg(), field])
            .await?;
        Ok(reply.as_int()? != 0)
    }

    /// Remove a field; returns whether it existed
    pub async fn remove(&self, field: &K) -> RedisResult<bool> {
        let field = self.connection.converter().serialize(field)?;
        let reply = self
            .connection
            .execute("HDEL", &[self.key_arg(), field])
            .await?;
        Ok(reply.as_int()? != 0)
    }

    /// The number of fields
    pub async fn len(&self) -> RedisResult<i64> {
        let reply = self.connection.execute("HLEN", &[self.key_arg()]).await?;
        reply.as_int()
    }

    /// Whether the hash is empty or absent
    pub async fn is_empty(&self) -> RedisResult<bool> {
        Ok(self.len().await? == 0)
    }

    /// Every field/value pair
    pub async fn get_all(&self) -> RedisResult<Vec<(K, V)>> {
        let reply = self.connection.execute("HGETALL", &[self.key_arg()]).await?;
        let converter = self.connection.converter();
        let flat = reply.into_array()?;
        flat.chunks_exact(2)
            .map(|pair| {
                Ok((
                    converter.deserialize(&pair[0])?,
                    converter.deserialize(&pair[1])?,
                ))
            })
            .collect()
    }

    /// Every field key
    pub async fn keys(&self) -> RedisResult<Vec<K>> {
        let reply = self.connection.execute("HKEYS", &[self.key_arg()]).await?;
        let converter = self.connection.converter();
        reply
            .into_array()?
            .iter()
            .map(|v| converter.deserialize(v))
            .collect()
    }

    /// Every field value
    pub async fn values(&self) -> RedisResult<Vec<V>> {
        let reply = self.connection.execute("HVALS", &[self.key_arg()]).await?;
        let converter = self.connection.converter();
        reply
            .into_array()?
            .iter()
            .map(|v| converter.deserialize(v))
            .collect()
    }

    /// Delete the whole hash; returns whether it existed
    pub async fn delete(&self) -> RedisResult<bool> {
        let reply = self.connection.execute("DEL", &[self.key_arg()]).await?;
        Ok(reply.as_int()? != 0)
    }
}
