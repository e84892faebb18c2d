//! 64-bit entity IDs.
//!
//! Every ID packs a millisecond timestamp (bits 22..64), worker and
//! process numbers, and a per-millisecond counter into one u64. On the
//! wire IDs travel as decimal strings so JavaScript consumers do not
//! lose precision; decoding accepts either form, encoding always emits
//! the string form.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

/// Milliseconds between the Unix epoch and the Discord epoch
/// (2015-01-01T00:00:00Z).
pub const DISCORD_EPOCH_MS: u64 = 1_420_070_400_000;

/// Bits below the timestamp portion of an ID.
const TIMESTAMP_SHIFT: u32 = 22;

/// An entity ID.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Snowflake(pub u64);

impl Snowflake {
    #[inline]
    pub const fn new(value: u64) -> Self {
        Self(value)
    }

    #[inline]
    pub const fn get(self) -> u64 {
        self.0
    }

    /// Creation time, as milliseconds since the Unix epoch.
    #[inline]
    pub const fn timestamp(self) -> u64 {
        (self.0 >> TIMESTAMP_SHIFT) + DISCORD_EPOCH_MS
    }

    /// Worker that minted the ID (bits 17..22).
    #[inline]
    pub const fn worker_id(self) -> u8 {
        ((self.0 >> 17) & 0b1_1111) as u8
    }

    /// Process that minted the ID (bits 12..17).
    #[inline]
    pub const fn process_id(self) -> u8 {
        ((self.0 >> 12) & 0b1_1111) as u8
    }

    /// Counter distinguishing IDs minted in the same millisecond
    /// (bits 0..12).
    #[inline]
    pub const fn increment(self) -> u16 {
        (self.0 & 0xFFF) as u16
    }

    /// The shard that owns the guild with this ID:
    /// `(id >> 22) % total_shards`.
    #[inline]
    pub const fn shard_id(self, total_shards: u16) -> u16 {
        ((self.0 >> TIMESTAMP_SHIFT) % total_shards as u64) as u16
    }
}

impl fmt::Display for Snowflake {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

impl From<u64> for Snowflake {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

impl From<Snowflake> for u64 {
    fn from(id: Snowflake) -> Self {
        id.0
    }
}

impl Serialize for Snowflake {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.collect_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for Snowflake {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        // The API serializes IDs as strings, but integers show up in
        // hand-written payloads and older tooling.
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Repr {
            Number(u64),
            Text(String),
        }

        match Repr::deserialize(deserializer)? {
            Repr::Number(value) => Ok(Self(value)),
            Repr::Text(text) => text.parse().map(Self).map_err(|_| {
                serde::de::Error::custom(format!("invalid snowflake: {text:?}"))
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decodes_string_and_integer_forms() {
        let from_string: Snowflake = serde_json::from_str(r#""175928847299117063""#).unwrap();
        let from_integer: Snowflake = serde_json::from_str("175928847299117063").unwrap();
        assert_eq!(from_string, from_integer);
        assert_eq!(from_string.get(), 175928847299117063);
    }

    #[test]
    fn test_rejects_non_numeric_strings() {
        assert!(serde_json::from_str::<Snowflake>(r#""not-an-id""#).is_err());
    }

    #[test]
    fn test_encodes_as_string() {
        let json = serde_json::to_string(&Snowflake::new(175928847299117063)).unwrap();
        assert_eq!(json, r#""175928847299117063""#);
    }

    #[test]
    fn test_bit_layout() {
        // 5000 ms past the epoch, worker 3, process 2, increment 7.
        let id = Snowflake::new((5000 << 22) | (3 << 17) | (2 << 12) | 7);

        assert_eq!(id.timestamp(), DISCORD_EPOCH_MS + 5000);
        assert_eq!(id.worker_id(), 3);
        assert_eq!(id.process_id(), 2);
        assert_eq!(id.increment(), 7);
    }

    #[test]
    fn test_shard_routing() {
        // 175928847299117063 >> 22 = 41888046837, mod 4 = 1
        let guild = Snowflake::new(175928847299117063);
        assert_eq!(guild.shard_id(4), 1);
        assert_eq!(guild.shard_id(1), 0);
    }
}
