//! Typed sorted-set wrapper

use crate::connection::Connection;
use crate::convert::Storable;
use crate::core::error::RedisResult;
use crate::core::value::WireValue;
use crate::executor;
use crate::result::RedisValue;
use crate::types::script::Script;
use std::marker::PhantomData;
use std::sync::LazyLock;
use std::time::Duration;

/// Atomically increments a member's score and clamps to an upper bound.
pub(crate) static SCORE_LIMIT_MAX: LazyLock<Script> = LazyLock::new(|| {
    Script::new(
        r#"local s = tonumber(redis.call('ZINCRBY', KEYS[1], ARGV[1], ARGV[2]))
local limit = tonumber(ARGV[3])
if s > limit then
    redis.call('ZADD', KEYS[1], ARGV[3], ARGV[2])
    return ARGV[3]
end
return tostring(s)"#,
    )
});

/// Atomically decrements a member's score and clamps to a lower bound.
pub(crate) static SCORE_LIMIT_MIN: LazyLock<Script> = LazyLock::new(|| {
    Script::new(
        r#"local s = tonumber(redis.call('ZINCRBY', KEYS[1], ARGV[1], ARGV[2]))
local limit = tonumber(ARGV[3])
if s < limit then
    redis.call('ZADD', KEYS[1], ARGV[3], ARGV[2])
    return ARGV[3]
end
return tostring(s)"#,
    )
});

/// Typed wrapper for a Redis sorted set
///
/// Rank ranges follow the Redis index convention: negative indices count
/// from the end, and a resolved start past the stop yields an empty result.
#[derive(Debug, Clone)]
pub struct RedisSortedSet<T> {
    connection: Connection,
    key: String,
    default_expiry: Option<Duration>,
    _marker: PhantomData<fn() -> T>,
}

impl<T: Storable> RedisSortedSet<T> {
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

    /// Add a member with a score; returns true if the member is new
    pub async fn add(
        &self,
        member: &T,
        score: f64,
        expiry: Option<Duration>,
    ) -> RedisResult<bool> {
        let wire = self.connection.converter().serialize(member)?;
        executor::execute_with_expiry(
            &self.connection,
            &self.key,
            "ZADD",
            vec![self.key_arg(), WireValue::Float(score), wire],
            self.expiry_for(expiry),
            |reply| Ok(reply.as_int()? != 0),
        )
        .await
    }

    /// Add several scored members; returns the number newly added
    pub async fn add_many(
        &self,
        entries: &[(T, f64)],
        expiry: Option<Duration>,
    ) -> RedisResult<i64> {
        let converter = self.connection.converter();
        let mut args = Vec::with_capacity(1 + entries.len() * 2);
        args.push(self.key_arg());
        for (member, score) in entries {
            args.push(WireValue::Float(*score));
            args.push(converter.serialize(member)?);
        }
        executor::execute_with_expiry(
            &self.connection,
            &self.key,
            "ZADD",
            args,
            self.expiry_for(expiry),
            |reply| reply.as_int(),
        )
        .await
    }

    /// Remove a member; returns whether it was present
    pub async fn remove(&self, member: &T) -> RedisResult<bool> {
        let wire = self.connection.converter().serialize(member)?;
        let reply = self
            .connection
            .execute("ZREM", &[self.key_arg(), wire])
            .await?;
        Ok(reply.as_int()? != 0)
    }

    /// The member's score, if present
    pub async fn score(&self, member: &T) -> RedisResult<RedisValue<f64>> {
        let wire = self.connection.converter().serialize(member)?;
        let reply = self
            .connection
            .execute("ZSCORE", &[self.key_arg(), wire])
            .await?;
        if reply.is_null() {
            Ok(RedisValue::none())
        } else {
            Ok(RedisValue::new(reply.as_float()?))
        }
    }

    /// The member's ascending rank (0-based), if present
    pub async fn rank(&self, member: &T) -> RedisResult<RedisValue<i64>> {
        self.rank_command("ZRANK", member).await
    }

    /// The member's descending rank (0-based), if present
    pub async fn rev_rank(&self, member: &T) -> RedisResult<RedisValue<i64>> {
        self.rank_command("ZREVRANK", member).await
    }

    async fn rank_command(
        &self,
        command: &'static str,
        member: &T,
    ) -> RedisResult<RedisValue<i64>> {
        let wire = self.connection.converter().serialize(member)?;
        let reply = self
            .connection
            .execute(command, &[self.key_arg(), wire])
            .await?;
        if reply.is_null() {
            Ok(RedisValue::none())
        } else {
            Ok(RedisValue::new(reply.as_int()?))
        }
    }

    /// Members between ranks `start` and `stop`, inclusive, ascending
    pub async fn range_by_rank(&self, start: i64, stop: i64) -> RedisResult<Vec<T>> {
        let reply = self
            .connection
            .execute(
                "ZRANGE",
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

    /// Like [`RedisSortedSet::range_by_rank`] but paired with scores
    pub async fn range_by_rank_with_scores(
        &self,
        start: i64,
        stop: i64,
    ) -> RedisResult<Vec<(T, f64)>> {
        let reply = self
            .connection
            .execute(
                "ZRANGE",
                &[
                    self.key_arg(),
                    WireValue::Integer(start),
                    WireValue::Integer(stop),
                    WireValue::from("WITHSCORES"),
                ],
            )
            .await?;
        let converter = self.connection.converter();
        let flat = reply.into_array()?;
        flat.chunks_exact(2)
            .map(|pair| Ok((converter.deserialize(&pair[0])?, pair[1].as_float()?)))
            .collect()
    }

    /// Members with scores between `min` and `max`, inclusive, ascending
    pub async fn range_by_score(&self, min: f64, max: f64) -> RedisResult<Vec<T>> {
        let reply = self
            .connection
            .execute(
                "ZRANGEBYSCORE",
                &[self.key_arg(), WireValue::Float(min), WireValue::Float(max)],
            )
            .await?;
        let converter = self.connection.converter();
        reply
            .into_array()?
            .iter()
            .map(|v| converter.deserialize(v))
            .collect()
    }

    /// The number of members with scores between `min` and `max`, inclusive
    pub async fn count(&self, min: f64, max: f64) -> RedisResult<i64> {
        let reply = self
            .connection
            .execute(
                "ZCOUNT",
                &[self.key_arg(), WireValue::Float(min), WireValue::Float(max)],
            )
            .await?;
        reply.as_int()
    }

    /// The total number of members
    pub async fn len(&self) -> RedisResult<i64> {
        let reply = self.connection.execute("ZCARD", &[self.key_arg()]).await?;
        reply.as_int()
    }

    /// Whether the sorted set is empty or absent
    pub async fn is_empty(&self) -> RedisResult<bool> {
        Ok(self.len().await? == 0)
    }

    /// Increment a member's score by `delta`; returns the new score
    pub async fn increment_score(
        &self,
        member: &T,
        delta: f64,
        expiry: Option<Duration>,
    ) -> RedisResult<f64> {
        let wire = self.connection.converter().serialize(member)?;
        executor::execute_with_expiry(
            &self.connection,
            &self.key,
            "ZINCRBY",
            vec![self.key_arg(), WireValue::Float(delta), wire],
            self.expiry_for(expiry),
            |reply| reply.as_float(),
        )
        .await
    }

    /// Atomically increment a member's score and clamp to an upper bound
    ///
    /// Runs server-side in one step; concurrent incrementers cannot race
    /// the score past `max`.
    pub async fn increment_score_limit(
        &self,
        member: &T,
        delta: f64,
        max: f64,
    ) -> RedisResult<f64> {
        let wire = self.connection.converter().serialize(member)?;
        let reply = SCORE_LIMIT_MAX
            .invoke(
                &self.connection,
                vec![self.key_arg()],
                vec![WireValue::Float(delta), wire, WireValue::Float(max)],
            )
            .await?;
        reply.as_float()
    }

    /// Atomically decrement a member's score and clamp to a lower bound;
    /// symmetric to [`RedisSortedSet::increment_score_limit`]
    pub async fn decrement_score_limit(
        &self,
        member: &T,
        delta: f64,
        min: f64,
    ) -> RedisResult<f64> {
        let wire = self.connection.converter().serialize(member)?;
        let reply = SCORE_LIMIT_MIN
            .invoke(
                &self.connection,
                vec![self.key_arg()],
                vec![WireValue::Float(-delta), wire, WireValue::Float(min)],
            )
            .await?;
        reply.as_float()
    }

    /// Delete the whole sorted set; returns whether it existed
    pub async fn delete(&self) -> RedisResult<bool> {
        let reply = self.connection.execute("DEL", &[self.key_arg()]).await?;
        Ok(reply.as_int()? != 0)
    }
}
