//! In-memory transport double for tests
//!
//! [`MemoryTransport`] implements [`Transport`] over a plain in-process map,
//! so typed wrappers can be exercised end to end without a server. It honors
//! the semantics the wrappers rely on: per-key expiration, wrong-type
//! rejections, atomic batches that roll back on failure, and emulation of
//! the bundled Lua scripts (matched by SHA).
//!
//! ```no_run
//! use redis_typed::{Connection, ConnectionConfig, MemoryTransport, RedisString};
//!
//! # async fn demo() -> redis_typed::RedisResult<()> {
//! let transport = MemoryTransport::new();
//! let connection = Connection::new(ConnectionConfig::default(), transport.factory());
//! let counter = RedisString::<i64>::new(&connection, "counter");
//! counter.increment(None).await?;
//! # Ok(())
//! # }
//! ```

use crate::connection::{QueuedCommand, Transport, TransportFactory};
use crate::core::config::ConnectionConfig;
use crate::core::error::{RedisError, RedisResult};
use crate::core::value::WireValue;
use crate::types::{lock, sorted_set, string};
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

const EARTH_RADIUS_METERS: f64 = 6_372_797.560_856;

fn wrong_type() -> RedisError {
    RedisError::Server(
        "WRONGTYPE Operation against a key holding the wrong kind of value".to_string(),
    )
}

fn not_integer() -> RedisError {
    RedisError::Server("ERR value is not an integer or out of range".to_string())
}

fn not_float() -> RedisError {
    RedisError::Server("ERR value is not a valid float".to_string())
}

fn wrong_arity(command: &str) -> RedisError {
    RedisError::Server(format!(
        "ERR wrong number of arguments for '{}' command",
        command.to_ascii_lowercase()
    ))
}

/// Canonical identity bytes for a wire value, used wherever the server
/// compares members or fields for equality.
fn wire_id(value: &WireValue) -> Vec<u8> {
    match value {
        WireValue::Null => Vec::new(),
        WireValue::Integer(i) => i.to_string().into_bytes(),
        WireValue::Float(f) => f.to_string().into_bytes(),
        WireValue::Boolean(b) => b.to_string().into_bytes(),
        WireValue::String(s) => s.clone().into_bytes(),
        WireValue::Bytes(b) => b.to_vec(),
        WireValue::Array(items) => items.iter().flat_map(wire_id).collect(),
    }
}

fn arg<'a>(command: &str, args: &'a [WireValue], index: usize) -> RedisResult<&'a WireValue> {
    args.get(index).ok_or_else(|| wrong_arity(command))
}

fn key_of(command: &str, args: &[WireValue]) -> RedisResult<String> {
    arg(command, args, 0)?.as_string()
}

#[derive(Debug, Clone)]
struct HashField {
    id: Vec<u8>,
    field: WireValue,
    value: WireValue,
}

#[derive(Debug, Clone)]
struct ZsetMember {
    score: f64,
    id: Vec<u8>,
    member: WireValue,
}

#[derive(Debug, Clone)]
struct GeoMember {
    id: Vec<u8>,
    member: WireValue,
    longitude: f64,
    latitude: f64,
}

#[derive(Debug, Clone)]
enum Stored {
    Scalar(WireValue),
    List(VecDeque<WireValue>),
    Hash(Vec<HashField>),
    Zset(Vec<ZsetMember>),
    Geo(Vec<GeoMember>),
    Hll(HashSet<Vec<u8>>),
}

#[derive(Debug, Clone)]
struct Entry {
    data: Stored,
    expires_at: Option<Instant>,
}

impl Entry {
    fn fresh(data: Stored) -> Self {
        Self {
            data,
            expires_at: None,
        }
    }
}

/// Resolve a Redis `start`/`stop` index pair against a length; `None` means
/// the range is empty.
fn range_bounds(start: i64, stop: i64, len: usize) -> Option<(usize, usize)> {
    let len = len as i64;
    let mut start = if start < 0 { len + start } else { start };
    let mut stop = if stop < 0 { len + stop } else { stop };
    if start < 0 {
        start = 0;
    }
    if stop >= len {
        stop = len - 1;
    }
    if len == 0 || start > stop || start >= len {
        None
    } else {
        Some((start as usize, stop as usize))
    }
}

fn haversine(lon1: f64, lat1: f64, lon2: f64, lat2: f64) -> f64 {
    let (lat1, lat2) = (lat1.to_radians(), lat2.to_radians());
    let dlat = lat2 - lat1;
    let dlon = (lon2 - lon1).to_radians();
    let a = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlon / 2.0).sin().powi(2);
    2.0 * a.sqrt().asin() * EARTH_RADIUS_METERS
}

fn unit_factor(unit: &str) -> RedisResult<f64> {
    match unit {
        "m" => Ok(1.0),
        "km" => Ok(1000.0),
        "mi" => Ok(1609.34),
        "ft" => Ok(0.3048),
        other => Err(RedisError::Server(format!(
            "ERR unsupported unit provided. please use m, km, ft, mi: {other}"
        ))),
    }
}

#[derive(Debug, Default)]
struct Store {
    map: HashMap<String, Entry>,
}

impl Store {
    fn purge(&mut self, key: &str) {
        if let Some(entry) = self.map.get(key) {
            if entry.expires_at.is_some_and(|at| Instant::now() >= at) {
                self.map.remove(key);
            }
        }
    }

    fn entry(&mut self, key: &str) -> Option<&Entry> {
        self.purge(key);
        self.map.get(key)
    }

    fn entry_mut(&mut self, key: &str) -> Option<&mut Entry> {
        self.purge(key);
        self.map.get_mut(key)
    }

    fn scalar(&mut self, key: &str) -> RedisResult<Option<&WireValue>> {
        match self.entry(key) {
            None => Ok(None),
            Some(Entry {
                data: Stored::Scalar(v),
                ..
            }) => Ok(Some(v)),
            Some(_) => Err(wrong_type()),
        }
    }

    fn list_mut(&mut self, key: &str) -> RedisResult<&mut VecDeque<WireValue>> {
        self.purge(key);
        let entry = self
            .map
            .entry(key.to_string())
            .or_insert_with(|| Entry::fresh(Stored::List(VecDeque::new())));
        match &mut entry.data {
            Stored::List(items) => Ok(items),
            _ => Err(wrong_type()),
        }
    }

    fn list(&mut self, key: &str) -> RedisResult<Option<&VecDeque<WireValue>>> {
        match self.entry(key) {
            None => Ok(None),
            Some(Entry {
                data: Stored::List(items),
                ..
            }) => Ok(Some(items)),
            Some(_) => Err(wrong_type()),
        }
    }

    fn hash_mut(&mut self, key: &str) -> RedisResult<&mut Vec<HashField>> {
        self.purge(key);
        let entry = self
            .map
            .entry(key.to_string())
            .or_insert_with(|| Entry::fresh(Stored::Hash(Vec::new())));
        match &mut entry.data {
            Stored::Hash(fields) => Ok(fields),
            _ => Err(wrong_type()),
        }
    }

    fn hash(&mut self, key: &str) -> RedisResult<Option<&Vec<HashField>>> {
        match self.entry(key) {
            None => Ok(None),
            Some(Entry {
                data: Stored::Hash(fields),
                ..
            }) => Ok(Some(fields)),
            Some(_) => Err(wrong_type()),
        }
    }

    fn zset_mut(&mut self, key: &str) -> RedisResult<&mut Vec<ZsetMember>> {
        self.purge(key);
        let entry = self
            .map
            .entry(key.to_string())
            .or_insert_with(|| Entry::fresh(Stored::Zset(Vec::new())));
        match &mut entry.data {
            Stored::Zset(members) => Ok(members),
            _ => Err(wrong_type()),
        }
    }

    fn zset(&mut self, key: &str) -> RedisResult<Option<&Vec<ZsetMember>>> {
        match self.entry(key) {
            None => Ok(None),
            Some(Entry {
                data: Stored::Zset(members),
                ..
            }) => Ok(Some(members)),
            Some(_) => Err(wrong_type()),
        }
    }

    fn geo_mut(&mut self, key: &str) -> RedisResult<&mut Vec<GeoMember>> {
        self.purge(key);
        let entry = self
            .map
            .entry(key.to_string())
            .or_insert_with(|| Entry::fresh(Stored::Geo(Vec::new())));
        match &mut entry.data {
            Stored::Geo(members) => Ok(members),
            _ => Err(wrong_type()),
        }
    }

    fn hll_mut(&mut self, key: &str) -> RedisResult<&mut HashSet<Vec<u8>>> {
        self.purge(key);
        let entry = self
            .map
            .entry(key.to_string())
            .or_insert_with(|| Entry::fresh(Stored::Hll(HashSet::new())));
        match &mut entry.data {
            Stored::Hll(ids) => Ok(ids),
            _ => Err(wrong_type()),
        }
    }

    fn remove_if_empty(&mut self, key: &str) {
        let empty = match self.map.get(key).map(|e| &e.data) {
            Some(Stored::List(items)) => items.is_empty(),
            Some(Stored::Hash(fields)) => fields.is_empty(),
            Some(Stored::Zset(members)) => members.is_empty(),
            _ => false,
        };
        if empty {
            self.map.remove(key);
        }
    }

    fn incr_by(&mut self, key: &str, delta: i64) -> RedisResult<i64> {
        let current = match self.scalar(key)? {
            None => 0,
            Some(v) => v.as_int().map_err(|_| not_integer())?,
        };
        let next = current.checked_add(delta).ok_or_else(not_integer)?;
        match self.entry_mut(key) {
            Some(entry) => entry.data = Stored::Scalar(WireValue::Integer(next)),
            None => {
                self.map.insert(
                    key.to_string(),
                    Entry::fresh(Stored::Scalar(WireValue::Integer(next))),
                );
            }
        }
        Ok(next)
    }

    fn zset_sort(members: &mut [ZsetMember]) {
        members.sort_by(|a, b| {
            a.score
                .partial_cmp(&b.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.id.cmp(&b.id))
        });
    }

    fn zincr_by(&mut self, key: &str, delta: f64, member: &WireValue) -> RedisResult<f64> {
        let id = wire_id(member);
        let members = self.zset_mut(key)?;
        let score = match members.iter_mut().find(|m| m.id == id) {
            Some(existing) => {
                existing.score += delta;
                existing.score
            }
            None => {
                members.push(ZsetMember {
                    score: delta,
                    id,
                    member: member.clone(),
                });
                delta
            }
        };
        Self::zset_sort(members);
        Ok(score)
    }

    fn zset_set_score(
        &mut self,
        key: &str,
        member: &WireValue,
        score: f64,
    ) -> RedisResult<()> {
        let id = wire_id(member);
        let members = self.zset_mut(key)?;
        match members.iter_mut().find(|m| m.id == id) {
            Some(existing) => existing.score = score,
            None => members.push(ZsetMember {
                score,
                id,
                member: member.clone(),
            }),
        }
        Self::zset_sort(members);
        Ok(())
    }

    fn apply(&mut self, command: &str, args: &[WireValue]) -> RedisResult<WireValue> {
        match command {
            // Strings and generic key commands
            "SET" => self.set(args),
            "GET" => {
                let key = key_of(command, args)?;
                Ok(self.scalar(&key)?.cloned().unwrap_or(WireValue::Null))
            }
            "DEL" => {
                let mut removed = 0;
                for key in args {
                    let key = key.as_string()?;
                    self.purge(&key);
                    if self.map.remove(&key).is_some() {
                        removed += 1;
                    }
                }
                Ok(WireValue::Integer(removed))
            }
            "EXISTS" => {
                let mut found = 0;
                for key in args {
                    if self.entry(&key.as_string()?).is_some() {
                        found += 1;
                    }
                }
                Ok(WireValue::Integer(found))
            }
            "PEXPIRE" => {
                let key = key_of(command, args)?;
                let ms = arg(command, args, 1)?.as_int()?;
                let ms = u64::try_from(ms).map_err(|_| not_integer())?;
                match self.entry_mut(&key) {
                    Some(entry) => {
                        entry.expires_at = Some(Instant::now() + Duration::from_millis(ms));
                        Ok(WireValue::Integer(1))
                    }
                    None => Ok(WireValue::Integer(0)),
                }
            }
            "PTTL" => {
                let key = key_of(command, args)?;
                match self.entry(&key) {
                    None => Ok(WireValue::Integer(-2)),
                    Some(Entry {
                        expires_at: None, ..
                    }) => Ok(WireValue::Integer(-1)),
                    Some(Entry {
                        expires_at: Some(at),
                        ..
                    }) => {
                        let remaining = at.saturating_duration_since(Instant::now());
                        Ok(WireValue::Integer(remaining.as_millis() as i64))
                    }
                }
            }
            "APPEND" => {
                let key = key_of(command, args)?;
                let suffix = arg(command, args, 1)?.as_string()?;
                let mut current = match self.scalar(&key)? {
                    None => String::new(),
                    Some(v) => v.as_string()?,
                };
                current.push_str(&suffix);
                let len = current.len() as i64;
                match self.entry_mut(&key) {
                    Some(entry) => entry.data = Stored::Scalar(WireValue::String(current)),
                    None => {
                        self.map
                            .insert(key, Entry::fresh(Stored::Scalar(WireValue::String(current))));
                    }
                }
                Ok(WireValue::Integer(len))
            }
            "INCRBY" => {
                let key = key_of(command, args)?;
                let delta = arg(command, args, 1)?.as_int()?;
                Ok(WireValue::Integer(self.incr_by(&key, delta)?))
            }
            "DECRBY" => {
                let key = key_of(command, args)?;
                let delta = arg(command, args, 1)?.as_int()?;
                Ok(WireValue::Integer(self.incr_by(&key, -delta)?))
            }
            "INCRBYFLOAT" => {
                let key = key_of(command, args)?;
                let delta = arg(command, args, 1)?.as_float()?;
                let current = match self.scalar(&key)? {
                    None => 0.0,
                    Some(v) => v.as_float().map_err(|_| not_float())?,
                };
                let next = current + delta;
                match self.entry_mut(&key) {
                    Some(entry) => entry.data = Stored::Scalar(WireValue::Float(next)),
                    None => {
                        self.map.insert(
                            key,
                            Entry::fresh(Stored::Scalar(WireValue::Float(next))),
                        );
                    }
                }
                Ok(WireValue::Float(next))
            }

            // Lists
            "LPUSH" | "RPUSH" => {
                let key = key_of(command, args)?;
                let front = command == "LPUSH";
                let items = self.list_mut(&key)?;
                for value in &args[1..] {
                    if front {
                        items.push_front(value.clone());
                    } else {
                        items.push_back(value.clone());
                    }
                }
                Ok(WireValue::Integer(items.len() as i64))
            }
            "LPOP" | "RPOP" => {
                let key = key_of(command, args)?;
                let popped = match self.entry_mut(&key) {
                    None => None,
                    Some(Entry {
                        data: Stored::List(items),
                        ..
                    }) => {
                        if command == "LPOP" {
                            items.pop_front()
                        } else {
                            items.pop_back()
                        }
                    }
                    Some(_) => return Err(wrong_type()),
                };
                self.remove_if_empty(&key);
                Ok(popped.unwrap_or(WireValue::Null))
            }
            "LRANGE" => {
                let key = key_of(command, args)?;
                let start = arg(command, args, 1)?.as_int()?;
                let stop = arg(command, args, 2)?.as_int()?;
                let items = match self.list(&key)? {
                    None => return Ok(WireValue::Array(Vec::new())),
                    Some(items) => items,
                };
                let slice = match range_bounds(start, stop, items.len()) {
                    None => Vec::new(),
                    Some((from, to)) => items.iter().skip(from).take(to - from + 1).cloned().collect(),
                };
                Ok(WireValue::Array(slice))
            }
            "LINDEX" => {
                let key = key_of(command, args)?;
                let index = arg(command, args, 1)?.as_int()?;
                let items = match self.list(&key)? {
                    None => return Ok(WireValue::Null),
                    Some(items) => items,
                };
                let len = items.len() as i64;
                let index = if index < 0 { len + index } else { index };
                if index < 0 || index >= len {
                    return Ok(WireValue::Null);
                }
                Ok(items[index as usize].clone())
            }
            "LLEN" => {
                let key = key_of(command, args)?;
                let len = self.list(&key)?.map_or(0, VecDeque::len);
                Ok(WireValue::Integer(len as i64))
            }
            "LSET" => {
                let key = key_of(command, args)?;
                let index = arg(command, args, 1)?.as_int()?;
                let value = arg(command, args, 2)?.clone();
                let items = match self.entry_mut(&key) {
                    None => {
                        return Err(RedisError::Server("ERR no such key".to_string()));
                    }
                    Some(Entry {
                        data: Stored::List(items),
                        ..
                    }) => items,
                    Some(_) => return Err(wrong_type()),
                };
                let len = items.len() as i64;
                let index = if index < 0 { len + index } else { index };
                if index < 0 || index >= len {
                    return Err(RedisError::Server("ERR index out of range".to_string()));
                }
                items[index as usize] = value;
                Ok(WireValue::String("OK".to_string()))
            }
            "LREM" => {
                let key = key_of(command, args)?;
                let count = arg(command, args, 1)?.as_int()?;
                let id = wire_id(arg(command, args, 2)?);
                let removed = match self.entry_mut(&key) {
                    None => 0,
                    Some(Entry {
                        data: Stored::List(items),
                        ..
                    }) => {
                        let limit = if count == 0 {
                            usize::MAX
                        } else {
                            count.unsigned_abs() as usize
                        };
                        let mut positions: Vec<usize> = items
                            .iter()
                            .enumerate()
                            .filter(|(_, v)| wire_id(v) == id)
                            .map(|(i, _)| i)
                            .collect();
                        if count < 0 {
                            positions.reverse();
                        }
                        positions.truncate(limit);
                        positions.sort_unstable_by(|a, b| b.cmp(a));
                        for position in &positions {
                            items.remove(*position);
                        }
                        positions.len()
                    }
                    Some(_) => return Err(wrong_type()),
                };
                self.remove_if_empty(&key);
                Ok(WireValue::Integer(removed as i64))
            }
            "LTRIM" => {
                let key = key_of(command, args)?;
                let start = arg(command, args, 1)?.as_int()?;
                let stop = arg(command, args, 2)?.as_int()?;
                match self.entry_mut(&key) {
                    None => {}
                    Some(Entry {
                        data: Stored::List(items),
                        ..
                    }) => match range_bounds(start, stop, items.len()) {
                        None => items.clear(),
                        Some((from, to)) => {
                            let kept: VecDeque<WireValue> = items
                                .iter()
                                .skip(from)
                                .take(to - from + 1)
                                .cloned()
                                .collect();
                            *items = kept;
                        }
                    },
                    Some(_) => return Err(wrong_type()),
                }
                self.remove_if_empty(&key);
                Ok(WireValue::String("OK".to_string()))
            }
            "LINSERT" => {
                let key = key_of(command, args)?;
                let before = match arg(command, args, 1)?.as_string()?.to_ascii_uppercase().as_str() {
                    "BEFORE" => true,
                    "AFTER" => false,
                    _ => return Err(RedisError::Server("ERR syntax error".to_string())),
                };
                let pivot = wire_id(arg(command, args, 2)?);
                let value = arg(command, args, 3)?.clone();
                let items = match self.entry_mut(&key) {
                    None => return Ok(WireValue::Integer(0)),
                    Some(Entry {
                        data: Stored::List(items),
                        ..
                    }) => items,
                    Some(_) => return Err(wrong_type()),
                };
                match items.iter().position(|v| wire_id(v) == pivot) {
                    None => Ok(WireValue::Integer(-1)),
                    Some(position) => {
                        let at = if before { position } else { position + 1 };
                        items.insert(at, value);
                        Ok(WireValue::Integer(items.len() as i64))
                    }
                }
            }

            // Hashes
            "HSET" => {
                let key = key_of(command, args)?;
                if args.len() < 3 || args.len() % 2 == 0 {
                    return Err(wrong_arity(command));
                }
                let fields = self.hash_mut(&key)?;
                let mut added = 0;
                for pair in args[1..].chunks_exact(2) {
                    let id = wire_id(&pair[0]);
                    match fields.iter_mut().find(|f| f.id == id) {
                        Some(existing) => existing.value = pair[1].clone(),
                        None => {
                            fields.push(HashField {
                                id,
                                field: pair[0].clone(),
                                value: pair[1].clone(),
                            });
                            added += 1;
                        }
                    }
                }
                Ok(WireValue::Integer(added))
            }
            "HGET" => {
                let key = key_of(command, args)?;
                let id = wire_id(arg(command, args, 1)?);
                let value = self
                    .hash(&key)?
                    .and_then(|fields| fields.iter().find(|f| f.id == id))
                    .map(|f| f.value.clone());
                Ok(value.unwrap_or(WireValue::Null))
            }
            "HMGET" => {
                let key = key_of(command, args)?;
                let ids: Vec<Vec<u8>> = args[1..].iter().map(wire_id).collect();
                let fields = self.hash(&key)?;
                let values = ids
                    .iter()
                    .map(|id| {
                        fields
                            .and_then(|fields| fields.iter().find(|f| &f.id == id))
                            .map_or(WireValue::Null, |f| f.value.clone())
                    })
                    .collect();
                Ok(WireValue::Array(values))
            }
            "HDEL" => {
                let key = key_of(command, args)?;
                let removed = match self.entry_mut(&key) {
                    None => 0,
                    Some(Entry {
                        data: Stored::Hash(fields),
                        ..
                    }) => {
                        let mut removed = 0;
                        for field in &args[1..] {
                            let id = wire_id(field);
                            if let Some(position) = fields.iter().position(|f| f.id == id) {
                                fields.remove(position);
                                removed += 1;
                            }
                        }
                        removed
                    }
                    Some(_) => return Err(wrong_type()),
                };
                self.remove_if_empty(&key);
                Ok(WireValue::Integer(removed))
            }
            "HEXISTS" => {
                let key = key_of(command, args)?;
                let id = wire_id(arg(command, args, 1)?);
                let found = self
                    .hash(&key)?
                    .is_some_and(|fields| fields.iter().any(|f| f.id == id));
                Ok(WireValue::Integer(i64::from(found)))
            }
            "HGETALL" => {
                let key = key_of(command, args)?;
                let mut flat = Vec::new();
                if let Some(fields) = self.hash(&key)? {
                    for field in fields {
                        flat.push(field.field.clone());
                        flat.push(field.value.clone());
                    }
                }
                Ok(WireValue::Array(flat))
            }
            "HKEYS" => {
                let key = key_of(command, args)?;
                let keys = self
                    .hash(&key)?
                    .map_or_else(Vec::new, |fields| {
                        fields.iter().map(|f| f.field.clone()).collect()
                    });
                Ok(WireValue::Array(keys))
            }
            "HVALS" => {
                let key = key_of(command, args)?;
                let values = self
                    .hash(&key)?
                    .map_or_else(Vec::new, |fields| {
                        fields.iter().map(|f| f.value.clone()).collect()
                    });
                Ok(WireValue::Array(values))
            }
            "HLEN" => {
                let key = key_of(command, args)?;
                let len = self.hash(&key)?.map_or(0, Vec::len);
                Ok(WireValue::Integer(len as i64))
            }

            // Sorted sets
            "ZADD" => {
                let key = key_of(command, args)?;
                if args.len() < 3 || args.len() % 2 == 0 {
                    return Err(wrong_arity(command));
                }
                let mut added = 0;
                for pair in args[1..].chunks_exact(2) {
                    let score = pair[0].as_float()?;
                    let id = wire_id(&pair[1]);
                    let members = self.zset_mut(&key)?;
                    if !members.iter().any(|m| m.id == id) {
                        added += 1;
                    }
                    self.zset_set_score(&key, &pair[1], score)?;
                }
                Ok(WireValue::Integer(added))
            }
            "ZINCRBY" => {
                let key = key_of(command, args)?;
                let delta = arg(command, args, 1)?.as_float()?;
                let member = arg(command, args, 2)?.clone();
                Ok(WireValue::Float(self.zincr_by(&key, delta, &member)?))
            }
            "ZSCORE" => {
                let key = key_of(command, args)?;
                let id = wire_id(arg(command, args, 1)?);
                let score = self
                    .zset(&key)?
                    .and_then(|members| members.iter().find(|m| m.id == id))
                    .map(|m| m.score);
                Ok(score.map_or(WireValue::Null, WireValue::Float))
            }
            "ZRANK" | "ZREVRANK" => {
                let key = key_of(command, args)?;
                let id = wire_id(arg(command, args, 1)?);
                let members = match self.zset(&key)? {
                    None => return Ok(WireValue::Null),
                    Some(members) => members,
                };
                match members.iter().position(|m| m.id == id) {
                    None => Ok(WireValue::Null),
                    Some(rank) => {
                        let rank = if command == "ZREVRANK" {
                            members.len() - 1 - rank
                        } else {
                            rank
                        };
                        Ok(WireValue::Integer(rank as i64))
                    }
                }
            }
            "ZRANGE" => {
                let key = key_of(command, args)?;
                let start = arg(command, args, 1)?.as_int()?;
                let stop = arg(command, args, 2)?.as_int()?;
                let with_scores = args
                    .get(3)
                    .map(|v| v.as_string())
                    .transpose()?
                    .is_some_and(|flag| flag.eq_ignore_ascii_case("WITHSCORES"));
                let members = match self.zset(&key)? {
                    None => return Ok(WireValue::Array(Vec::new())),
                    Some(members) => members,
                };
                let mut out = Vec::new();
                if let Some((from, to)) = range_bounds(start, stop, members.len()) {
                    for member in &members[from..=to] {
                        out.push(member.member.clone());
                        if with_scores {
                            out.push(WireValue::Float(member.score));
                        }
                    }
                }
                Ok(WireValue::Array(out))
            }
            "ZRANGEBYSCORE" => {
                let key = key_of(command, args)?;
                let min = arg(command, args, 1)?.as_float()?;
                let max = arg(command, args, 2)?.as_float()?;
                let members = self.zset(&key)?.map_or_else(Vec::new, |members| {
                    members
                        .iter()
                        .filter(|m| m.score >= min && m.score <= max)
                        .map(|m| m.member.clone())
                        .collect()
                });
                Ok(WireValue::Array(members))
            }
            "ZCOUNT" => {
                let key = key_of(command, args)?;
                let min = arg(command, args, 1)?.as_float()?;
                let max = arg(command, args, 2)?.as_float()?;
                let count = self.zset(&key)?.map_or(0, |members| {
                    members
                        .iter()
                        .filter(|m| m.score >= min && m.score <= max)
                        .count()
                });
                Ok(WireValue::Integer(count as i64))
            }
            "ZCARD" => {
                let key = key_of(command, args)?;
                let len = self.zset(&key)?.map_or(0, Vec::len);
                Ok(WireValue::Integer(len as i64))
            }
            "ZREM" => {
                let key = key_of(command, args)?;
                let removed = match self.entry_mut(&key) {
                    None => 0,
                    Some(Entry {
                        data: Stored::Zset(members),
                        ..
                    }) => {
                        let mut removed = 0;
                        for member in &args[1..] {
                            let id = wire_id(member);
                            if let Some(position) = members.iter().position(|m| m.id == id) {
                                members.remove(position);
                                removed += 1;
                            }
                        }
                        removed
                    }
                    Some(_) => return Err(wrong_type()),
                };
                self.remove_if_empty(&key);
                Ok(WireValue::Integer(removed))
            }

            // HyperLogLog
            "PFADD" => {
                let key = key_of(command, args)?;
                let ids = self.hll_mut(&key)?;
                let mut changed = false;
                for value in &args[1..] {
                    changed |= ids.insert(wire_id(value));
                }
                Ok(WireValue::Integer(i64::from(changed)))
            }
            "PFCOUNT" => {
                let mut union: HashSet<Vec<u8>> = HashSet::new();
                for key in args {
                    let key = key.as_string()?;
                    match self.entry(&key) {
                        None => {}
                        Some(Entry {
                            data: Stored::Hll(ids),
                            ..
                        }) => union.extend(ids.iter().cloned()),
                        Some(_) => return Err(wrong_type()),
                    }
                }
                Ok(WireValue::Integer(union.len() as i64))
            }
            "PFMERGE" => {
                let destination = key_of(command, args)?;
                let mut merged: HashSet<Vec<u8>> = HashSet::new();
                for key in &args[1..] {
                    let key = key.as_string()?;
                    match self.entry(&key) {
                        None => {}
                        Some(Entry {
                            data: Stored::Hll(ids),
                            ..
                        }) => merged.extend(ids.iter().cloned()),
                        Some(_) => return Err(wrong_type()),
                    }
                }
                self.hll_mut(&destination)?.extend(merged);
                Ok(WireValue::String("OK".to_string()))
            }

            // Geospatial
            "GEOADD" => {
                let key = key_of(command, args)?;
                if args.len() < 4 || (args.len() - 1) % 3 != 0 {
                    return Err(wrong_arity(command));
                }
                let members = self.geo_mut(&key)?;
                let mut added = 0;
                for triple in args[1..].chunks_exact(3) {
                    let longitude = triple[0].as_float()?;
                    let latitude = triple[1].as_float()?;
                    let id = wire_id(&triple[2]);
                    match members.iter_mut().find(|m| m.id == id) {
                        Some(existing) => {
                            existing.longitude = longitude;
                            existing.latitude = latitude;
                        }
                        None => {
                            members.push(GeoMember {
                                id,
                                member: triple[2].clone(),
                                longitude,
                                latitude,
                            });
                            added += 1;
                        }
                    }
                }
                Ok(WireValue::Integer(added))
            }
            "GEODIST" => {
                let key = key_of(command, args)?;
                let from = wire_id(arg(command, args, 1)?);
                let to = wire_id(arg(command, args, 2)?);
                let factor = match args.get(3) {
                    None => 1.0,
                    Some(unit) => unit_factor(&unit.as_string()?)?,
                };
                let members = match self.entry(&key) {
                    None => return Ok(WireValue::Null),
                    Some(Entry {
                        data: Stored::Geo(members),
                        ..
                    }) => members,
                    Some(_) => return Err(wrong_type()),
                };
                let from = members.iter().find(|m| m.id == from);
                let to = members.iter().find(|m| m.id == to);
                match (from, to) {
                    (Some(a), Some(b)) => {
                        let meters =
                            haversine(a.longitude, a.latitude, b.longitude, b.latitude);
                        Ok(WireValue::Float(meters / factor))
                    }
                    _ => Ok(WireValue::Null),
                }
            }
            "GEOPOS" => {
                let key = key_of(command, args)?;
                let ids: Vec<Vec<u8>> = args[1..].iter().map(wire_id).collect();
                let members = match self.entry(&key) {
                    None => return Ok(WireValue::Array(vec![WireValue::Null; ids.len()])),
                    Some(Entry {
                        data: Stored::Geo(members),
                        ..
                    }) => members,
                    Some(_) => return Err(wrong_type()),
                };
                let positions = ids
                    .iter()
                    .map(|id| {
                        members.iter().find(|m| &m.id == id).map_or(
                            WireValue::Null,
                            |m| {
                                WireValue::Array(vec![
                                    WireValue::Float(m.longitude),
                                    WireValue::Float(m.latitude),
                                ])
                            },
                        )
                    })
                    .collect();
                Ok(WireValue::Array(positions))
            }
            "GEOSEARCH" => {
                let key = key_of(command, args)?;
                let longitude = arg(command, args, 2)?.as_float()?;
                let latitude = arg(command, args, 3)?.as_float()?;
                let radius = arg(command, args, 5)?.as_float()?;
                let factor = unit_factor(&arg(command, args, 6)?.as_string()?)?;
                let radius_meters = radius * factor;
                let members = match self.entry(&key) {
                    None => return Ok(WireValue::Array(Vec::new())),
                    Some(Entry {
                        data: Stored::Geo(members),
                        ..
                    }) => members,
                    Some(_) => return Err(wrong_type()),
                };
                let mut hits: Vec<(f64, WireValue)> = members
                    .iter()
                    .map(|m| {
                        (
                            haversine(longitude, latitude, m.longitude, m.latitude),
                            m.member.clone(),
                        )
                    })
                    .filter(|(distance, _)| *distance <= radius_meters)
                    .collect();
                hits.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap_or(std::cmp::Ordering::Equal));
                Ok(WireValue::Array(hits.into_iter().map(|(_, m)| m).collect()))
            }

            // Scripting
            "EVALSHA" | "EVAL" => self.eval(command, args),

            other => Err(RedisError::Server(format!(
                "ERR unknown command '{other}'"
            ))),
        }
    }

    fn set(&mut self, args: &[WireValue]) -> RedisResult<WireValue> {
        let key = key_of("SET", args)?;
        let value = arg("SET", args, 1)?.clone();
        let mut require_absent = false;
        let mut require_present = false;
        let mut keep_ttl = false;
        let mut return_old = false;
        let mut ttl = None;
        let mut i = 2;
        while i < args.len() {
            match args[i].as_string()?.to_ascii_uppercase().as_str() {
                "NX" => require_absent = true,
                "XX" => require_present = true,
                "KEEPTTL" => keep_ttl = true,
                "GET" => return_old = true,
                "PX" => {
                    i += 1;
                    let ms = arg("SET", args, i)?.as_int()?;
                    ttl = Some(Duration::from_millis(
                        u64::try_from(ms).map_err(|_| not_integer())?,
                    ));
                }
                "EX" => {
                    i += 1;
                    let secs = arg("SET", args, i)?.as_int()?;
                    ttl = Some(Duration::from_secs(
                        u64::try_from(secs).map_err(|_| not_integer())?,
                    ));
                }
                _ => return Err(RedisError::Server("ERR syntax error".to_string())),
            }
            i += 1;
        }
        self.purge(&key);
        let previous = self.map.get(&key).cloned();
        let exists = previous.is_some();
        if (require_absent && exists) || (require_present && !exists) {
            return Ok(WireValue::Null);
        }
        let old = match &previous {
            Some(Entry {
                data: Stored::Scalar(v),
                ..
            }) => v.clone(),
            Some(_) if return_old => return Err(wrong_type()),
            _ => WireValue::Null,
        };
        let expires_at = match (ttl, keep_ttl) {
            (Some(d), _) => Some(Instant::now() + d),
            (None, true) => previous.and_then(|e| e.expires_at),
            (None, false) => None,
        };
        self.map.insert(
            key,
            Entry {
                data: Stored::Scalar(value),
                expires_at,
            },
        );
        if return_old {
            Ok(old)
        } else {
            Ok(WireValue::String("OK".to_string()))
        }
    }

    /// Emulate the crate's bundled Lua scripts, identified by SHA (for
    /// `EVALSHA`) or by exact source (for `EVAL`).
    fn eval(&mut self, command: &str, args: &[WireValue]) -> RedisResult<WireValue> {
        let handle = arg(command, args, 0)?.as_string()?;
        let numkeys = usize::try_from(arg(command, args, 1)?.as_int()?)
            .map_err(|_| not_integer())?;
        if args.len() < 2 + numkeys {
            return Err(wrong_arity(command));
        }
        let keys = &args[2..2 + numkeys];
        let argv = &args[2 + numkeys..];

        let sha = if command == "EVALSHA" {
            let known = [
                &string::INCREMENT_LIMIT_MAX,
                &string::DECREMENT_LIMIT_MIN,
                &sorted_set::SCORE_LIMIT_MAX,
                &sorted_set::SCORE_LIMIT_MIN,
                &lock::RELEASE,
                &lock::EXTEND,
            ];
            if !known.iter().any(|script| script.sha() == handle) {
                return Err(RedisError::Server(
                    "NOSCRIPT No matching script. Please use EVAL.".to_string(),
                ));
            }
            handle
        } else {
            sha_of_source(&handle)?
        };

        let key = arg(command, keys, 0)?.as_string()?;
        if sha == string::INCREMENT_LIMIT_MAX.sha() {
            let delta = arg(command, argv, 0)?.as_int()?;
            let limit = arg(command, argv, 1)?.as_int().map_err(|_| not_integer())?;
            let value = self.incr_by(&key, delta)?;
            if value > limit {
                self.set(&[
                    WireValue::String(key),
                    WireValue::Integer(limit),
                ])?;
                return Ok(WireValue::Integer(limit));
            }
            Ok(WireValue::Integer(value))
        } else if sha == string::DECREMENT_LIMIT_MIN.sha() {
            let delta = arg(command, argv, 0)?.as_int()?;
            let limit = arg(command, argv, 1)?.as_int().map_err(|_| not_integer())?;
            let value = self.incr_by(&key, -delta)?;
            if value < limit {
                self.set(&[
                    WireValue::String(key),
                    WireValue::Integer(limit),
                ])?;
                return Ok(WireValue::Integer(limit));
            }
            Ok(WireValue::Integer(value))
        } else if sha == sorted_set::SCORE_LIMIT_MAX.sha() {
            let delta = arg(command, argv, 0)?.as_float()?;
            let member = arg(command, argv, 1)?.clone();
            let limit = arg(command, argv, 2)?.as_float().map_err(|_| not_float())?;
            let score = self.zincr_by(&key, delta, &member)?;
            if score > limit {
                self.zset_set_score(&key, &member, limit)?;
                return Ok(WireValue::Float(limit));
            }
            Ok(WireValue::Float(score))
        } else if sha == sorted_set::SCORE_LIMIT_MIN.sha() {
            let delta = arg(command, argv, 0)?.as_float()?;
            let member = arg(command, argv, 1)?.clone();
            let limit = arg(command, argv, 2)?.as_float().map_err(|_| not_float())?;
            let score = self.zincr_by(&key, delta, &member)?;
            if score < limit {
                self.zset_set_score(&key, &member, limit)?;
                return Ok(WireValue::Float(limit));
            }
            Ok(WireValue::Float(score))
        } else if sha == lock::RELEASE.sha() {
            let token = wire_id(arg(command, argv, 0)?);
            let held = self
                .scalar(&key)?
                .is_some_and(|current| wire_id(current) == token);
            if held {
                self.map.remove(&key);
                return Ok(WireValue::Integer(1));
            }
            Ok(WireValue::Integer(0))
        } else if sha == lock::EXTEND.sha() {
            let token = wire_id(arg(command, argv, 0)?);
            let ms = arg(command, argv, 1)?.as_int()?;
            let ms = u64::try_from(ms).map_err(|_| not_integer())?;
            let held = self
                .scalar(&key)?
                .is_some_and(|current| wire_id(current) == token);
            if held {
                if let Some(entry) = self.entry_mut(&key) {
                    entry.expires_at = Some(Instant::now() + Duration::from_millis(ms));
                    return Ok(WireValue::Integer(1));
                }
            }
            Ok(WireValue::Integer(0))
        } else {
            Err(RedisError::Server(format!(
                "ERR unsupported script {sha}"
            )))
        }
    }
}

/// Resolve `EVAL` source text to the SHA of a bundled script.
fn sha_of_source(source: &str) -> RedisResult<String> {
    let known = [
        &string::INCREMENT_LIMIT_MAX,
        &string::DECREMENT_LIMIT_MIN,
        &sorted_set::SCORE_LIMIT_MAX,
        &sorted_set::SCORE_LIMIT_MIN,
        &lock::RELEASE,
        &lock::EXTEND,
    ];
    known
        .iter()
        .find(|script| script.source() == source)
        .map(|script| script.sha().to_string())
        .ok_or_else(|| RedisError::Server("ERR unsupported script source".to_string()))
}

struct MemoryInner {
    store: Mutex<Store>,
    log: Mutex<Vec<String>>,
    transactions: AtomicUsize,
    connected: AtomicBool,
}

impl Default for MemoryInner {
    fn default() -> Self {
        Self {
            store: Mutex::new(Store::default()),
            log: Mutex::new(Vec::new()),
            transactions: AtomicUsize::new(0),
            connected: AtomicBool::new(true),
        }
    }
}

/// In-memory [`Transport`] for tests
///
/// Clones share the same store, so a test can hold one handle for
/// inspection while the connection under test uses another.
#[derive(Clone, Default)]
pub struct MemoryTransport {
    inner: Arc<MemoryInner>,
}

impl MemoryTransport {
    /// Create an empty, connected transport
    pub fn new() -> Self {
        Self::default()
    }

    /// A factory that hands out this same transport to a [`Connection`]
    pub fn factory(&self) -> MemoryFactory {
        MemoryFactory(self.clone())
    }

    /// Flip the connected flag; a `false` makes the owning connection
    /// discard its handle and reconnect through the factory
    pub fn set_connected(&self, connected: bool) {
        self.inner.connected.store(connected, Ordering::SeqCst);
    }

    /// Names of every command executed so far, in order
    pub fn commands(&self) -> Vec<String> {
        self.inner
            .log
            .lock()
            .expect("memory transport state poisoned")
            .clone()
    }

    /// How many transactional batches have been started
    pub fn transactions_started(&self) -> usize {
        self.inner.transactions.load(Ordering::SeqCst)
    }
}

impl std::fmt::Debug for MemoryTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryTransport")
            .field("connected", &self.is_connected())
            .field("transactions", &self.transactions_started())
            .finish()
    }
}

#[async_trait::async_trait]
impl Transport for MemoryTransport {
    async fn execute(&self, command: &str, args: &[WireValue]) -> RedisResult<WireValue> {
        self.inner
            .log
            .lock()
            .expect("memory transport state poisoned")
            .push(command.to_string());
        let mut store = self
            .inner
            .store
            .lock()
            .expect("memory transport state poisoned");
        store.apply(command, args)
    }

    async fn execute_batch(&self, commands: &[QueuedCommand]) -> RedisResult<Vec<WireValue>> {
        self.inner.transactions.fetch_add(1, Ordering::SeqCst);
        let mut store = self
            .inner
            .store
            .lock()
            .expect("memory transport state poisoned");
        let snapshot = store.map.clone();
        let mut replies = Vec::with_capacity(commands.len());
        for queued in commands {
            self.inner
                .log
                .lock()
                .expect("memory transport state poisoned")
                .push(queued.command.clone());
            match store.apply(&queued.command, &queued.args) {
                Ok(reply) => replies.push(reply),
                Err(e) => {
                    // Nothing from a failed batch may remain observable.
                    store.map = snapshot;
                    return Err(e);
                }
            }
        }
        Ok(replies)
    }

    fn is_connected(&self) -> bool {
        self.inner.connected.load(Ordering::SeqCst)
    }
}

/// Factory returning the shared [`MemoryTransport`]
pub struct MemoryFactory(MemoryTransport);

#[async_trait::async_trait]
impl TransportFactory for MemoryFactory {
    async fn connect(&self, _config: &ConnectionConfig) -> RedisResult<Arc<dyn Transport>> {
        Ok(Arc::new(self.0.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn run(transport: &MemoryTransport, command: &str, args: &[WireValue]) -> WireValue {
        transport.execute(command, args).await.unwrap()
    }

    #[tokio::test]
    async fn test_set_get_roundtrip() {
        let transport = MemoryTransport::new();
        run(
            &transport,
            "SET",
            &[WireValue::from("k"), WireValue::Integer(5)],
        )
        .await;
        assert_eq!(
            run(&transport, "GET", &[WireValue::from("k")]).await,
            WireValue::Integer(5)
        );
        assert_eq!(
            run(&transport, "GET", &[WireValue::from("missing")]).await,
            WireValue::Null
        );
    }

    #[tokio::test]
    async fn test_set_nx_respects_existing_key() {
        let transport = MemoryTransport::new();
        run(
            &transport,
            "SET",
            &[WireValue::from("k"), WireValue::Integer(1)],
        )
        .await;
        let reply = run(
            &transport,
            "SET",
            &[
                WireValue::from("k"),
                WireValue::Integer(2),
                WireValue::from("NX"),
            ],
        )
        .await;
        assert!(reply.is_null());
        assert_eq!(
            run(&transport, "GET", &[WireValue::from("k")]).await,
            WireValue::Integer(1)
        );
    }

    #[tokio::test]
    async fn test_expired_key_vanishes() {
        let transport = MemoryTransport::new();
        run(
            &transport,
            "SET",
            &[
                WireValue::from("k"),
                WireValue::Integer(1),
                WireValue::from("PX"),
                WireValue::Integer(1),
            ],
        )
        .await;
        std::thread::sleep(Duration::from_millis(10));
        assert!(run(&transport, "GET", &[WireValue::from("k")]).await.is_null());
        assert_eq!(
            run(&transport, "PTTL", &[WireValue::from("k")]).await,
            WireValue::Integer(-2)
        );
    }

    #[tokio::test]
    async fn test_wrong_type_is_rejected() {
        let transport = MemoryTransport::new();
        run(
            &transport,
            "LPUSH",
            &[WireValue::from("k"), WireValue::Integer(1)],
        )
        .await;
        let err = transport
            .execute("GET", &[WireValue::from("k")])
            .await
            .unwrap_err();
        assert!(err.to_string().contains("WRONGTYPE"));
    }

    #[tokio::test]
    async fn test_failed_batch_rolls_back() {
        let transport = MemoryTransport::new();
        run(
            &transport,
            "LPUSH",
            &[WireValue::from("list"), WireValue::Integer(1)],
        )
        .await;

        let batch = [
            QueuedCommand {
                command: "SET".to_string(),
                args: vec![WireValue::from("k"), WireValue::Integer(9)],
            },
            QueuedCommand {
                command: "INCRBY".to_string(),
                args: vec![WireValue::from("list"), WireValue::Integer(1)],
            },
        ];
        assert!(transport.execute_batch(&batch).await.is_err());
        assert_eq!(transport.transactions_started(), 1);

        // The SET before the failing command must not be visible.
        assert!(run(&transport, "GET", &[WireValue::from("k")]).await.is_null());
    }

    #[tokio::test]
    async fn test_zset_orders_by_score_then_identity() {
        let transport = MemoryTransport::new();
        run(
            &transport,
            "ZADD",
            &[
                WireValue::from("z"),
                WireValue::Float(2.0),
                WireValue::from("b"),
                WireValue::Float(1.0),
                WireValue::from("c"),
                WireValue::Float(2.0),
                WireValue::from("a"),
            ],
        )
        .await;
        let members = run(
            &transport,
            "ZRANGE",
            &[
                WireValue::from("z"),
                WireValue::Integer(0),
                WireValue::Integer(-1),
            ],
        )
        .await
        .into_array()
        .unwrap();
        assert_eq!(
            members,
            vec![
                WireValue::from("c"),
                WireValue::from("a"),
                WireValue::from("b"),
            ]
        );
    }

    #[tokio::test]
    async fn test_geodist_uses_haversine() {
        let transport = MemoryTransport::new();
        run(
            &transport,
            "GEOADD",
            &[
                WireValue::from("geo"),
                WireValue::Float(13.361389),
                WireValue::Float(38.115556),
                WireValue::from("Palermo"),
                WireValue::Float(15.087269),
                WireValue::Float(37.502669),
                WireValue::from("Catania"),
            ],
        )
        .await;
        let distance = run(
            &transport,
            "GEODIST",
            &[
                WireValue::from("geo"),
                WireValue::from("Palermo"),
                WireValue::from("Catania"),
                WireValue::from("km"),
            ],
        )
        .await
        .as_float()
        .unwrap();
        assert!((distance - 166.27).abs() < 1.0, "got {distance}");
    }
}
