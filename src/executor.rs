//! Expiry-composing command execution
//!
//! Every write operation on the typed wrappers funnels through here so that
//! "also set the key's expiry" composes with the write atomically without
//! each operation re-implementing transaction orchestration.
//!
//! Without an expiry the command runs directly, with no transaction
//! overhead. With an expiry the command and a `PEXPIRE` are queued in one
//! transaction and committed together: no other client can observe the key
//! written without its TTL, and a failed write leaves no orphan TTL behind.
//! The `PEXPIRE` sub-command's own reply is deliberately never inspected;
//! batch atomicity already covers it.

use crate::connection::Connection;
use crate::core::error::RedisResult;
use crate::core::value::WireValue;
use std::time::Duration;

/// Execute a write command, optionally composing an atomic expiry update,
/// and parse the command's own reply.
pub(crate) async fn execute_with_expiry<T, F>(
    connection: &Connection,
    key: &str,
    command: &'static str,
    args: Vec<WireValue>,
    expiry: Option<Duration>,
    parse: F,
) -> RedisResult<T>
where
    F: FnOnce(WireValue) -> RedisResult<T>,
{
    match expiry {
        None => {
            let reply = connection.execute(command, &args).await?;
            parse(reply)
        }
        Some(ttl) => {
            let mut tx = connection.transaction();
            let primary = tx.queue(command, args);
            // Fire-and-forget: only the committed/aborted outcome of the
            // whole batch matters.
            drop(tx.queue(
                "PEXPIRE",
                vec![
                    WireValue::from(key),
                    WireValue::Integer(ttl.as_millis() as i64),
                ],
            ));
            tx.exec().await?;
            parse(primary.resolve().await?)
        }
    }
}

/// Variant for write commands whose reply carries no information.
pub(crate) async fn execute_with_expiry_unit(
    connection: &Connection,
    key: &str,
    command: &'static str,
    args: Vec<WireValue>,
    expiry: Option<Duration>,
) -> RedisResult<()> {
    execute_with_expiry(connection, key, command, args, expiry, |_| Ok(())).await
}
