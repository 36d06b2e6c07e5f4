//! Result wrappers distinguishing "key absent" from "value present"
//!
//! Read operations return a [`RedisValue`] instead of a bare value so that a
//! missing key is a first-class state rather than a sentinel. Accessing the
//! value of an absent result is a programming error and panics; use the
//! `value_or*` accessors or [`RedisValue::into_option`] when absence is a
//! normal outcome.

use std::time::Duration;

/// Optional-value wrapper returned by read operations
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RedisValue<T> {
    value: Option<T>,
}

impl<T> RedisValue<T> {
    /// Wrap a present value
    pub fn new(value: T) -> Self {
        Self { value: Some(value) }
    }

    /// The absent result (key or field did not exist)
    pub fn none() -> Self {
        Self { value: None }
    }

    /// Build from an option: `Some` is present, `None` is absent
    pub fn from_option(value: Option<T>) -> Self {
        Self { value }
    }

    /// Whether a value is present
    pub fn has_value(&self) -> bool {
        self.value.is_some()
    }

    /// Access the value
    ///
    /// # Panics
    ///
    /// Panics if no value is present. Check [`RedisValue::has_value`] first,
    /// or use [`RedisValue::into_option`].
    pub fn value(&self) -> &T {
        self.value
            .as_ref()
            .expect("accessed value of an absent RedisValue")
    }

    /// Consume the wrapper, returning the value or the given default
    pub fn value_or(self, default: T) -> T {
        self.value.unwrap_or(default)
    }

    /// Consume the wrapper, returning the value or lazily computing a
    /// default; the factory is not called when a value is present.
    pub fn value_or_else<F>(self, factory: F) -> T
    where
        F: FnOnce() -> T,
    {
        self.value.unwrap_or_else(factory)
    }

    /// Bridge to `Option` semantics
    pub fn into_option(self) -> Option<T> {
        self.value
    }

    /// Map the contained value, preserving absence
    pub fn map<U, F>(self, f: F) -> RedisValue<U>
    where
        F: FnOnce(T) -> U,
    {
        RedisValue {
            value: self.value.map(f),
        }
    }
}

impl<T> Default for RedisValue<T> {
    fn default() -> Self {
        Self::none()
    }
}

impl<T> From<Option<T>> for RedisValue<T> {
    fn from(value: Option<T>) -> Self {
        Self { value }
    }
}

/// Result wrapper that also carries the key's time-to-live
///
/// Produced by operations that fetch value and expiry atomically. The expiry
/// is `None` when the key has no expiration set (or no value is present).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RedisValueWithExpiry<T> {
    value: RedisValue<T>,
    expiry: Option<Duration>,
}

impl<T> RedisValueWithExpiry<T> {
    /// Build from an optional value and an optional remaining TTL
    pub fn new(value: Option<T>, expiry: Option<Duration>) -> Self {
        Self {
            value: RedisValue::from_option(value),
            expiry,
        }
    }

    /// Whether a value is present
    pub fn has_value(&self) -> bool {
        self.value.has_value()
    }

    /// Access the value; panics if absent (see [`RedisValue::value`])
    pub fn value(&self) -> &T {
        self.value.value()
    }

    /// The remaining time-to-live, if the key has one
    pub fn expiry(&self) -> Option<Duration> {
        self.expiry
    }

    /// Split into the plain value wrapper and the expiry
    pub fn into_parts(self) -> (RedisValue<T>, Option<Duration>) {
        (self.value, self.expiry)
    }
}
