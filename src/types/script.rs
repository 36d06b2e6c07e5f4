//! Lua script support and the script-eval wrapper
//!
//! A [`Script`] pairs Lua source with its SHA1 so execution can use
//! `EVALSHA` and fall back to `EVAL` only when the server has not cached the
//! script yet. [`RedisLua`] is the typed wrapper: it serializes arguments
//! and deserializes the reply through the connection's converter.

use crate::connection::Connection;
use crate::convert::Storable;
use crate::core::error::RedisResult;
use crate::core::value::WireValue;
use crate::result::RedisValue;
use sha1::{Digest, Sha1};
use tracing::debug;

/// A Lua script with its precomputed SHA1 hash
#[derive(Debug, Clone)]
pub struct Script {
    source: String,
    sha: String,
}

fn calculate_sha1(source: &str) -> String {
    let mut hasher = Sha1::new();
    hasher.update(source.as_bytes());
    let digest = hasher.finalize();
    let mut out = String::with_capacity(digest.len() * 2);
    for byte in digest {
        out.push_str(&format!("{:02x}", byte));
    }
    out
}

impl Script {
    /// Create a script from Lua source code
    pub fn new(source: impl Into<String>) -> Self {
        let source = source.into();
        let sha = calculate_sha1(&source);
        Self { source, sha }
    }

    /// SHA1 hash of the source, as sent with `EVALSHA`
    #[must_use]
    pub fn sha(&self) -> &str {
        &self.sha
    }

    /// The Lua source code
    #[must_use]
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Execute the script against a connection
    ///
    /// Tries `EVALSHA` first; on a `NOSCRIPT` rejection re-submits the full
    /// source with `EVAL` (which also caches it server-side).
    pub async fn invoke(
        &self,
        connection: &Connection,
        keys: Vec<WireValue>,
        args: Vec<WireValue>,
    ) -> RedisResult<WireValue> {
        let mut sha_args = Vec::with_capacity(2 + keys.len() + args.len());
        sha_args.push(WireValue::from(self.sha.as_str()));
        sha_args.push(WireValue::Integer(keys.len() as i64));
        sha_args.extend(keys.iter().cloned());
        sha_args.extend(args.iter().cloned());

        match connection.execute("EVALSHA", &sha_args).await {
            Err(e) if e.is_noscript() => {
                debug!(sha = %self.sha, "script not cached, falling back to EVAL");
                let mut eval_args = Vec::with_capacity(2 + keys.len() + args.len());
                eval_args.push(WireValue::from(self.source.as_str()));
                eval_args.push(WireValue::Integer(keys.len() as i64));
                eval_args.extend(keys);
                eval_args.extend(args);
                connection.execute("EVAL", &eval_args).await
            }
            other => other,
        }
    }
}

/// Typed script-eval wrapper bound to a connection and a key
#[derive(Debug, Clone)]
pub struct RedisLua {
    connection: Connection,
    key: String,
}

impl RedisLua {
    /// Create a script-eval wrapper for the given key
    pub fn new(connection: &Connection, key: impl Into<String>) -> Self {
        Self {
            connection: connection.clone(),
            key: key.into(),
        }
    }

    /// The key this wrapper passes as `KEYS[1]`
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Evaluate a script with typed arguments, deserializing the reply
    ///
    /// Arguments are serialized through the connection's converter; a null
    /// reply maps to an absent [`RedisValue`].
    pub async fn eval<A, T>(&self, script: &Script, args: &[A]) -> RedisResult<RedisValue<T>>
    where
        A: Storable,
        T: Storable,
    {
        let converter = self.connection.converter();
        let wire_args = args
            .iter()
            .map(|a| converter.serialize(a))
            .collect::<RedisResult<Vec<_>>>()?;
        let reply = script
            .invoke(
                &self.connection,
                vec![WireValue::from(self.key.as_str())],
                wire_args,
            )
            .await?;
        Ok(RedisValue::from_option(converter.deserialize_opt(&reply)?))
    }

    /// Evaluate a script with raw wire arguments and extra keys
    pub async fn eval_raw(
        &self,
        script: &Script,
        extra_keys: &[&str],
        args: Vec<WireValue>,
    ) -> RedisResult<WireValue> {
        let mut keys = Vec::with_capacity(1 + extra_keys.len());
        keys.push(WireValue::from(self.key.as_str()));
        keys.extend(extra_keys.iter().map(|k| WireValue::from(*k)));
        script.invoke(&self.connection, keys, args).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::{QueuedCommand, Transport, TransportFactory};
    use crate::core::config::ConnectionConfig;
    use crate::core::error::RedisError;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::{Arc, Mutex};

    #[test]
    fn test_sha_is_stable_and_hex() {
        let script = Script::new("return 1");
        assert_eq!(script.sha().len(), 40);
        assert_eq!(script.sha(), Script::new("return 1").sha());
        assert_ne!(script.sha(), Script::new("return 2").sha());
    }

    /// Rejects the first EVALSHA with NOSCRIPT, accepts EVAL.
    #[derive(Default)]
    struct NoscriptOnceTransport {
        seen_sha: AtomicBool,
        commands: Mutex<Vec<String>>,
    }

    #[async_trait::async_trait]
    impl Transport for NoscriptOnceTransport {
        async fn execute(&self, command: &str, _args: &[WireValue]) -> RedisResult<WireValue> {
            self.commands.lock().unwrap().push(command.to_string());
            if command == "EVALSHA" && !self.seen_sha.swap(true, Ordering::SeqCst) {
                return Err(RedisError::Server(
                    "NOSCRIPT No matching script".to_string(),
                ));
            }
            Ok(WireValue::Integer(7))
        }

        async fn execute_batch(
            &self,
            commands: &[QueuedCommand],
        ) -> RedisResult<Vec<WireValue>> {
            Ok(vec![WireValue::Null; commands.len()])
        }

        fn is_connected(&self) -> bool {
            true
        }
    }

    struct Factory(Arc<NoscriptOnceTransport>);

    #[async_trait::async_trait]
    impl TransportFactory for Factory {
        async fn connect(&self, _config: &ConnectionConfig) -> RedisResult<Arc<dyn Transport>> {
            Ok(Arc::clone(&self.0) as Arc<dyn Transport>)
        }
    }

    #[tokio::test]
    async fn test_evalsha_falls_back_to_eval_on_noscript() {
        let transport = Arc::new(NoscriptOnceTransport::default());
        let connection = Connection::new(
            ConnectionConfig::default(),
            Factory(Arc::clone(&transport)),
        );

        let script = Script::new("return redis.call('GET', KEYS[1])");
        let reply = script
            .invoke(&connection, vec![WireValue::from("k")], vec![])
            .await
            .unwrap();
        assert_eq!(reply, WireValue::Integer(7));
        assert_eq!(
            *transport.commands.lock().unwrap(),
            vec!["EVALSHA".to_string(), "EVAL".to_string()]
        );

        // Second invocation: the script is cached, EVALSHA succeeds.
        script
            .invoke(&connection, vec![WireValue::from("k")], vec![])
            .await
            .unwrap();
        assert_eq!(transport.commands.lock().unwrap().last().unwrap(), "EVALSHA");
    }

    /// Replies Null to everything, recording the full argument lists.
    #[derive(Default)]
    struct CapturingTransport {
        calls: Mutex<Vec<(String, Vec<WireValue>)>>,
    }

    #[async_trait::async_trait]
    impl Transport for CapturingTransport {
        async fn execute(&self, command: &str, args: &[WireValue]) -> RedisResult<WireValue> {
            self.calls
                .lock()
                .unwrap()
                .push((command.to_string(), args.to_vec()));
            Ok(WireValue::Null)
        }

        async fn execute_batch(
            &self,
            commands: &[QueuedCommand],
        ) -> RedisResult<Vec<WireValue>> {
            Ok(vec![WireValue::Null; commands.len()])
        }

        fn is_connected(&self) -> bool {
            true
        }
    }

    struct CapturingFactory(Arc<CapturingTransport>);

    #[async_trait::async_trait]
    impl TransportFactory for CapturingFactory {
        async fn connect(&self, _config: &ConnectionConfig) -> RedisResult<Arc<dyn Transport>> {
            Ok(Arc::clone(&self.0) as Arc<dyn Transport>)
        }
    }

    #[tokio::test]
    async fn test_typed_eval_serializes_args_and_maps_null_to_absent() {
        let transport = Arc::new(CapturingTransport::default());
        let connection = Connection::new(
            ConnectionConfig::default(),
            CapturingFactory(Arc::clone(&transport)),
        );

        let lua = RedisLua::new(&connection, "counter");
        let script = Script::new("return redis.call('GET', KEYS[1])");
        let reply = lua.eval::<i64, String>(&script, &[5]).await.unwrap();
        assert!(!reply.has_value());

        let calls = transport.calls.lock().unwrap();
        let (command, args) = &calls[0];
        assert_eq!(command, "EVALSHA");
        assert_eq!(args[0], WireValue::from(script.sha()));
        assert_eq!(args[1], WireValue::Integer(1));
        assert_eq!(args[2], WireValue::from("counter"));
        assert_eq!(args[3], WireValue::Integer(5));
    }
}
