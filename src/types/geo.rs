//! Typed geospatial index wrapper

use crate::connection::Connection;
use crate::convert::Storable;
use crate::core::error::{RedisError, RedisResult};
use crate::core::value::WireValue;
use crate::executor;
use crate::result::RedisValue;
use std::marker::PhantomData;
use std::time::Duration;

/// Distance unit for geospatial queries
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GeoUnit {
    /// Meters
    Meters,
    /// Kilometers
    Kilometers,
    /// Miles
    Miles,
    /// Feet
    Feet,
}

impl GeoUnit {
    /// The unit token the server expects
    pub fn as_str(self) -> &'static str {
        match self {
            GeoUnit::Meters => "m",
            GeoUnit::Kilometers => "km",
            GeoUnit::Miles => "mi",
            GeoUnit::Feet => "ft",
        }
    }
}

/// A member with its coordinates, for bulk insertion
#[derive(Debug, Clone, PartialEq)]
pub struct GeoEntry<T> {
    /// Longitude in degrees
    pub longitude: f64,
    /// Latitude in degrees
    pub latitude: f64,
    /// The member at that position
    pub member: T,
}

/// A position returned by [`RedisGeo::position`]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GeoPosition {
    /// Longitude in degrees
    pub longitude: f64,
    /// Latitude in degrees
    pub latitude: f64,
}

/// Typed wrapper for a Redis geospatial index
#[derive(Debug, Clone)]
pub struct RedisGeo<T> {
    connection: Connection,
    key: String,
    default_expiry: Option<Duration>,
    _marker: PhantomData<fn() -> T>,
}

impl<T: Storable> RedisGeo<T> {
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

    /// Add a member at a position; returns true if the member is new
    pub async fn add(
        &self,
        longitude: f64,
        latitude: f64,
        member: &T,
        expiry: Option<Duration>,
    ) -> RedisResult<bool> {
        let wire = self.connection.converter().serialize(member)?;
        executor::execute_with_expiry(
            &self.connection,
            &self.key,
            "GEOADD",
            vec![
                self.key_arg(),
                WireValue::Float(longitude),
                WireValue::Float(latitude),
                wire,
            ],
            self.expiry_for(expiry),
            |reply| Ok(reply.as_int()? != 0),
        )
        .await
    }

    /// Add several positioned members; returns the number newly added
    pub async fn add_many(
        &self,
        entries: &[GeoEntry<T>],
        expiry: Option<Duration>,
    ) -> RedisResult<i64> {
        let converter = self.connection.converter();
        let mut args = Vec::with_capacity(1 + entries.len() * 3);
        args.push(self.key_arg());
        for entry in entries {
            args.push(WireValue::Float(entry.longitude));
            args.push(WireValue::Float(entry.latitude));
            args.push(converter.serialize(&entry.member)?);
        }
        executor::execute_with_expiry(
            &self.connection,
            &self.key,
            "GEOADD",
            args,
            self.expiry_for(expiry),
            |reply| reply.as_int(),
        )
        .await
    }

    /// The distance between two members, in the given unit; absent when
    /// either member is missing
    pub async fn distance(
        &self,
        from: &T,
        to: &T,
        unit: GeoUnit,
    ) -> RedisResult<RedisValue<f64>> {
        let converter = self.connection.converter();
        let from = converter.serialize(from)?;
        let to = converter.serialize(to)?;
        let reply = self
            .connection
            .execute(
                "GEODIST",
                &[self.key_arg(), from, to, WireValue::from(unit.as_str())],
            )
            .await?;
        if reply.is_null() {
            Ok(RedisValue::none())
        } else {
            Ok(RedisValue::new(reply.as_float()?))
        }
    }

    /// The member's position, if present
    pub async fn position(&self, member: &T) -> RedisResult<RedisValue<GeoPosition>> {
        let wire = self.connection.converter().serialize(member)?;
        let reply = self
            .connection
            .execute("GEOPOS", &[self.key_arg(), wire])
            .await?;
        let mut slots = reply.into_array()?;
        match slots.pop() {
            None | Some(WireValue::Null) => Ok(RedisValue::none()),
            Some(position) => {
                let pair = position.into_array()?;
                if pair.len() != 2 {
                    return Err(RedisError::UnexpectedResponse(
                        "GEOPOS entry is not a coordinate pair".to_string(),
                    ));
                }
                Ok(RedisValue::new(GeoPosition {
                    longitude: pair[0].as_float()?,
                    latitude: pair[1].as_float()?,
                }))
            }
        }
    }

    /// Members within `radius` of a center point, nearest first
    pub async fn radius(
        &self,
        longitude: f64,
        latitude: f64,
        radius: f64,
        unit: GeoUnit,
    ) -> RedisResult<Vec<T>> {
        let reply = self
            .connection
            .execute(
                "GEOSEARCH",
                &[
                    self.key_arg(),
                    WireValue::from("FROMLONLAT"),
                    WireValue::Float(longitude),
                    WireValue::Float(latitude),
                    WireValue::from("BYRADIUS"),
                    WireValue::Float(radius),
                    WireValue::from(unit.as_str()),
                    WireValue::from("ASC"),
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

    /// Delete the whole index; returns whether it existed
    pub async fn delete(&self) -> RedisResult<bool> {
        let reply = self.connection.execute("DEL", &[self.key_arg()]).await?;
        Ok(reply.as_int()? != 0)
    }
}
