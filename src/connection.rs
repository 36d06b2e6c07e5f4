//! Connection facade and transport boundary
//!
//! A [`Connection`] identifies a logical server/database and owns the lazily
//! created transport handle, the configured [`ValueConverter`], and optional
//! lifecycle event hooks. The transport itself is a boundary collaborator:
//! anything implementing [`Transport`] (a real multiplexed client, or the
//! in-memory double in [`crate::testing`]) can sit behind a connection.
//!
//! At most one live transport handle exists at a time. Concurrent callers
//! race to create one only on first use or after a detected failure; the
//! race is settled by a mutex held only around the check-and-create, never
//! across command I/O once the handle exists.

use crate::core::config::ConnectionConfig;
use crate::core::error::{RedisError, RedisResult};
use crate::core::value::WireValue;
use crate::convert::ValueConverter;
use crate::transaction::Transaction;
use std::fmt;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// A single command queued for batched (transactional) execution
#[derive(Debug, Clone)]
pub struct QueuedCommand {
    /// Command name, e.g. `SET`
    pub command: String,
    /// Command arguments, key first
    pub args: Vec<WireValue>,
}

/// Async command execution surface provided by the underlying client
///
/// Implementations own connection management, retries, timeouts, and
/// cancellation; this layer only propagates what they surface.
#[async_trait::async_trait]
pub trait Transport: Send + Sync {
    /// Execute a single command and return its reply
    async fn execute(&self, command: &str, args: &[WireValue]) -> RedisResult<WireValue>;

    /// Execute a batch of commands as one atomic transaction
    ///
    /// The batch applies as a unit relative to other clients: either every
    /// command's effect becomes observable, or none does and the call
    /// returns an error. Replies come back in queue order.
    async fn execute_batch(&self, commands: &[QueuedCommand]) -> RedisResult<Vec<WireValue>>;

    /// Whether the transport considers itself usable
    ///
    /// A `false` here makes the owning [`Connection`] drop the cached handle
    /// and ask the factory for a fresh one on next use.
    fn is_connected(&self) -> bool;
}

/// Creates transports on demand for a [`Connection`]
#[async_trait::async_trait]
pub trait TransportFactory: Send + Sync {
    /// Establish a transport for the given configuration
    async fn connect(&self, config: &ConnectionConfig) -> RedisResult<Arc<dyn Transport>>;
}

type EventHook = Box<dyn Fn(&str) + Send + Sync>;

/// Optional lifecycle callbacks; observability only, never correctness
#[derive(Default)]
pub(crate) struct ConnectionEvents {
    on_connected: Option<EventHook>,
    on_connection_failed: Option<EventHook>,
    on_error: Option<EventHook>,
}

impl ConnectionEvents {
    fn connected(&self, endpoint: &str) {
        if let Some(hook) = &self.on_connected {
            hook(endpoint);
        }
    }

    fn connection_failed(&self, message: &str) {
        if let Some(hook) = &self.on_connection_failed {
            hook(message);
        }
    }

    fn error(&self, message: &str) {
        if let Some(hook) = &self.on_error {
            hook(message);
        }
    }
}

struct ConnectionInner {
    config: ConnectionConfig,
    factory: Box<dyn TransportFactory>,
    transport: Mutex<Option<Arc<dyn Transport>>>,
    converter: ValueConverter,
    events: ConnectionEvents,
}

/// Logical connection to a Redis server/database
///
/// Cheap to clone and share; all clones refer to the same transport handle
/// and converter.
#[derive(Clone)]
pub struct Connection {
    inner: Arc<ConnectionInner>,
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("connection_string", &self.inner.config.connection_string)
            .field("database", &self.inner.config.database)
            .finish_non_exhaustive()
    }
}

impl Connection {
    /// Create a connection with the default JSON converter and no event hooks
    pub fn new(config: ConnectionConfig, factory: impl TransportFactory + 'static) -> Self {
        Self::builder(config, factory).build()
    }

    /// Start building a connection with a custom converter or event hooks
    pub fn builder(
        config: ConnectionConfig,
        factory: impl TransportFactory + 'static,
    ) -> ConnectionBuilder {
        ConnectionBuilder {
            config,
            factory: Box::new(factory),
            converter: ValueConverter::default(),
            events: ConnectionEvents::default(),
        }
    }

    /// The converter used for all typed values on this connection
    pub fn converter(&self) -> &ValueConverter {
        &self.inner.converter
    }

    /// The configuration this connection was built with
    pub fn config(&self) -> &ConnectionConfig {
        &self.inner.config
    }

    /// Begin a client-side transaction bound to this connection
    pub fn transaction(&self) -> Transaction {
        Transaction::new(self.clone())
    }

    /// Get the live transport handle, creating it if needed
    ///
    /// The mutex is held only across the health check and factory call, so
    /// concurrent first users cannot create duplicate transports.
    pub(crate) async fn transport(&self) -> RedisResult<Arc<dyn Transport>> {
        let mut guard = self.inner.transport.lock().await;
        if let Some(transport) = guard.as_ref() {
            if transport.is_connected() {
                return Ok(Arc::clone(transport));
            }
            debug!("cached transport reports disconnect, discarding handle");
            *guard = None;
        }

        match self.inner.factory.connect(&self.inner.config).await {
            Ok(transport) => {
                info!(
                    endpoint = %self.inner.config.connection_string,
                    "transport established"
                );
                self.inner
                    .events
                    .connected(&self.inner.config.connection_string);
                *guard = Some(Arc::clone(&transport));
                Ok(transport)
            }
            Err(e) => {
                warn!(error = %e, "transport creation failed");
                self.inner.events.connection_failed(&e.to_string());
                Err(e)
            }
        }
    }

    /// Execute a single command on the live transport
    ///
    /// Transport-level failures invalidate the cached handle so the next
    /// caller retries creation; nothing is retried here.
    pub(crate) async fn execute(
        &self,
        command: &str,
        args: &[WireValue],
    ) -> RedisResult<WireValue> {
        let transport = self.transport().await?;
        match transport.execute(command, args).await {
            Ok(reply) => Ok(reply),
            Err(e) => {
                if e.is_transport_failure() {
                    debug!(command, error = %e, "transport failure, invalidating handle");
                    *self.inner.transport.lock().await = None;
                }
                self.inner.events.error(&e.to_string());
                Err(e)
            }
        }
    }

    /// Execute a command batch atomically on the live transport
    pub(crate) async fn execute_batch(
        &self,
        commands: &[QueuedCommand],
    ) -> RedisResult<Vec<WireValue>> {
        let transport = self.transport().await?;
        match transport.execute_batch(commands).await {
            Ok(replies) => Ok(replies),
            Err(e) => {
                if e.is_transport_failure() {
                    debug!(error = %e, "transport failure during batch, invalidating handle");
                    *self.inner.transport.lock().await = None;
                }
                self.inner.events.error(&e.to_string());
                Err(e)
            }
        }
    }
}

/// Builder for [`Connection`]
pub struct ConnectionBuilder {
    config: ConnectionConfig,
    factory: Box<dyn TransportFactory>,
    converter: ValueConverter,
    events: ConnectionEvents,
}

impl ConnectionBuilder {
    /// Use a specific value converter instead of the JSON default
    #[must_use]
    pub fn converter(mut self, converter: ValueConverter) -> Self {
        self.converter = converter;
        self
    }

    /// Hook invoked after a transport is established
    #[must_use]
    pub fn on_connected(mut self, hook: impl Fn(&str) + Send + Sync + 'static) -> Self {
        self.events.on_connected = Some(Box::new(hook));
        self
    }

    /// Hook invoked when transport creation fails
    #[must_use]
    pub fn on_connection_failed(mut self, hook: impl Fn(&str) + Send + Sync + 'static) -> Self {
        self.events.on_connection_failed = Some(Box::new(hook));
        self
    }

    /// Hook invoked on any command error
    #[must_use]
    pub fn on_error(mut self, hook: impl Fn(&str) + Send + Sync + 'static) -> Self {
        self.events.on_error = Some(Box::new(hook));
        self
    }

    /// Finish building the connection
    pub fn build(self) -> Connection {
        Connection {
            inner: Arc::new(ConnectionInner {
                config: self.config,
                factory: self.factory,
                transport: Mutex::new(None),
                converter: self.converter,
                events: self.events,
            }),
        }
    }
}
