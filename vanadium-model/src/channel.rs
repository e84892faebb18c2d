use crate::snowflake::Snowflake;
use serde::{Deserialize, Serialize};

/// Discord Channel representation.
///
/// Threads share this shape; the `kind` field distinguishes them.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Channel {
    /// Channel ID.
    pub id: Snowflake,
    /// Channel type.
    #[serde(default, rename = "type")]
    pub kind: Option<u8>,
    /// ID of the guild the channel belongs to, absent for DM channels.
    #[serde(default)]
    pub guild_id: Option<Snowflake>,
    /// Sorting position.
    #[serde(default)]
    pub position: Option<i32>,
    /// Channel name (1-100 characters).
    #[serde(default)]
    pub name: Option<String>,
    /// Channel topic.
    #[serde(default)]
    pub topic: Option<String>,
    /// Whether the channel is NSFW.
    #[serde(default)]
    pub nsfw: Option<bool>,
    /// ID of the last message sent in this channel.
    #[serde(default)]
    pub last_message_id: Option<Snowflake>,
    /// Slowmode delay in seconds.
    #[serde(default)]
    pub rate_limit_per_user: Option<u32>,
    /// ID of the creator (group DMs, threads).
    #[serde(default)]
    pub owner_id: Option<Snowflake>,
    /// Parent category (channels) or parent channel (threads).
    #[serde(default)]
    pub parent_id: Option<Snowflake>,
    /// Timestamp of the last pinned message.
    #[serde(default)]
    pub last_pin_timestamp: Option<String>,
}
