//! Distributed lock wrapper
//!
//! [`RedisLock::acquire`] takes the lock with a single `SET key token NX PX`
//! command, so acquisition and TTL are atomic. Release and extension go
//! through compare-token Lua scripts: only the holder of the token can
//! release or extend, which prevents a client whose TTL already lapsed from
//! deleting a lock someone else has since taken.

use crate::connection::Connection;
use crate::core::error::RedisResult;
use crate::core::value::WireValue;
use crate::types::script::Script;
use rand::Rng;
use std::sync::LazyLock;
use std::time::Duration;

/// Deletes the key only if it still holds the caller's token.
pub(crate) static RELEASE: LazyLock<Script> = LazyLock::new(|| {
    Script::new(
        r#"if redis.call('GET', KEYS[1]) == ARGV[1] then
    return redis.call('DEL', KEYS[1])
end
return 0"#,
    )
});

/// Refreshes the TTL only if the key still holds the caller's token.
pub(crate) static EXTEND: LazyLock<Script> = LazyLock::new(|| {
    Script::new(
        r#"if redis.call('GET', KEYS[1]) == ARGV[1] then
    return redis.call('PEXPIRE', KEYS[1], ARGV[2])
end
return 0"#,
    )
});

/// Distributed lock on a single key
#[derive(Debug, Clone)]
pub struct RedisLock {
    connection: Connection,
    key: String,
}

impl RedisLock {
    /// Create a lock handle for the given key
    pub fn new(connection: &Connection, key: impl Into<String>) -> Self {
        Self {
            connection: connection.clone(),
            key: key.into(),
        }
    }

    /// The key this lock is taken on
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Try to take the lock for `ttl`; `None` means someone else holds it
    pub async fn acquire(&self, ttl: Duration) -> RedisResult<Option<LockGuard>> {
        let token = format!("{:032x}", rand::rng().random::<u128>());
        let reply = self
            .connection
            .execute(
                "SET",
                &[
                    WireValue::from(self.key.as_str()),
                    WireValue::from(token.as_str()),
                    WireValue::from("NX"),
                    WireValue::from("PX"),
                    WireValue::Integer(ttl.as_millis() as i64),
                ],
            )
            .await?;
        if reply.is_null() {
            return Ok(None);
        }
        Ok(Some(LockGuard {
            connection: self.connection.clone(),
            key: self.key.clone(),
            token,
        }))
    }

    /// Whether anyone currently holds the lock
    pub async fn is_held(&self) -> RedisResult<bool> {
        let reply = self
            .connection
            .execute("EXISTS", &[WireValue::from(self.key.as_str())])
            .await?;
        Ok(reply.as_int()? != 0)
    }
}

/// Proof of holding a lock; release or extend through it
///
/// Dropping the guard does not release the lock (that would require a
/// network call in `Drop`); an unreleased lock simply lapses with its TTL.
#[derive(Debug)]
pub struct LockGuard {
    connection: Connection,
    key: String,
    token: String,
}

impl LockGuard {
    /// The token this guard holds the lock with
    pub fn token(&self) -> &str {
        &self.token
    }

    /// Release the lock; returns false if it was already lost (TTL lapsed
    /// and the key is gone or re-acquired by someone else)
    pub async fn release(self) -> RedisResult<bool> {
        let reply = RELEASE
            .invoke(
                &self.connection,
                vec![WireValue::from(self.key.as_str())],
                vec![WireValue::from(self.token.as_str())],
            )
            .await?;
        Ok(reply.as_int()? != 0)
    }

    /// Refresh the lock's TTL; returns false if the lock was already lost
    pub async fn extend(&self, ttl: Duration) -> RedisResult<bool> {
        let reply = EXTEND
            .invoke(
                &self.connection,
                vec![WireValue::from(self.key.as_str())],
                vec![
                    WireValue::from(self.token.as_str()),
                    WireValue::Integer(ttl.as_millis() as i64),
                ],
            )
            .await?;
        Ok(reply.as_int()? != 0)
    }
}
