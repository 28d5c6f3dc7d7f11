//! Serde helpers that store a [`Duration`] as integer milliseconds

use serde::{Deserialize, Deserializer, Serializer};
use std::time::Duration;

/// Serialize a duration as milliseconds
pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_u64(value.as_millis() as u64)
}

/// Deserialize a duration from milliseconds
pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
    Ok(Duration::from_millis(u64::deserialize(deserializer)?))
}
