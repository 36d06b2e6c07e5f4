//! Client-side transaction builder
//!
//! A [`Transaction`] queues commands locally; nothing touches the wire until
//! [`Transaction::exec`] commits the whole batch through the transport in
//! one atomic unit. Each queued command hands back a [`Pending`] that
//! resolves to that command's reply only after the commit. Dropping a
//! `Pending` is fine: that command's individual reply is simply discarded
//! (the batch still succeeds or fails as a whole).

use crate::connection::{Connection, QueuedCommand};
use crate::core::error::{RedisError, RedisResult};
use crate::core::value::WireValue;
use tokio::sync::oneshot;
use tracing::debug;

/// Deferred reply for one command inside a transaction
///
/// Resolves after the owning transaction commits. If the transaction is
/// dropped or its commit fails, resolving yields a transaction error.
#[derive(Debug)]
pub struct Pending {
    receiver: oneshot::Receiver<WireValue>,
}

impl Pending {
    /// Await this command's reply; only meaningful after `exec`
    pub async fn resolve(self) -> RedisResult<WireValue> {
        self.receiver.await.map_err(|_| {
            RedisError::Transaction("transaction aborted before this command resolved".to_string())
        })
    }
}

/// A batch of commands executed atomically
pub struct Transaction {
    connection: Connection,
    queued: Vec<QueuedCommand>,
    senders: Vec<oneshot::Sender<WireValue>>,
}

impl Transaction {
    pub(crate) fn new(connection: Connection) -> Self {
        Self {
            connection,
            queued: Vec::new(),
            senders: Vec::new(),
        }
    }

    /// Queue a command; its reply becomes available via the returned
    /// [`Pending`] once the transaction commits.
    pub fn queue(&mut self, command: impl Into<String>, args: Vec<WireValue>) -> Pending {
        let (sender, receiver) = oneshot::channel();
        self.queued.push(QueuedCommand {
            command: command.into(),
            args,
        });
        self.senders.push(sender);
        Pending { receiver }
    }

    /// Number of queued commands
    #[must_use]
    pub fn len(&self) -> usize {
        self.queued.len()
    }

    /// Whether no commands have been queued
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.queued.is_empty()
    }

    /// Commit the batch
    ///
    /// All queued commands apply atomically relative to other clients; on
    /// error none of their effects are observable and every outstanding
    /// [`Pending`] resolves to a transaction error.
    pub async fn exec(self) -> RedisResult<()> {
        if self.queued.is_empty() {
            return Err(RedisError::Transaction("transaction is empty".to_string()));
        }

        debug!(commands = self.queued.len(), "committing transaction");
        let replies = self.connection.execute_batch(&self.queued).await?;
        if replies.len() != self.senders.len() {
            return Err(RedisError::Transaction(format!(
                "expected {} replies, got {}",
                self.senders.len(),
                replies.len()
            )));
        }

        for (sender, reply) in self.senders.into_iter().zip(replies) {
            // A dropped Pending means the caller does not care about this
            // command's individual reply.
            let _ = sender.send(reply);
        }
        Ok(())
    }
}
