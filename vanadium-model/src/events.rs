//! Dispatch (opcode 0) payload types and the parsed dispatch enum.
//!
//! Every event consumed by the cache projection gets a typed payload;
//! anything else is carried through as [`Dispatch::Unknown`] so consumers
//! still observe it.

use crate::channel::Channel;
use crate::guild::{Emoji, Guild, GuildMember, Role, Sticker, UnavailableGuild};
use crate::presence::Presence;
use crate::scheduled::ScheduledEvent;
use crate::snowflake::Snowflake;
use crate::user::User;
use crate::voice::{StageInstance, VoiceState};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// The READY dispatch payload.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Ready {
    /// Gateway protocol version.
    pub v: u8,
    /// Current user.
    pub user: User,
    /// Guilds the user is in (unavailable during initial connection).
    #[serde(default)]
    pub guilds: Vec<UnavailableGuild>,
    /// Session ID for resuming.
    pub session_id: String,
    /// URL to use for resuming the session.
    #[serde(default)]
    pub resume_gateway_url: Option<String>,
    /// Shard information: [shard_id, total_shards].
    #[serde(default)]
    pub shard: Option<[u16; 2]>,
}

/// CHANNEL_PINS_UPDATE payload.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ChannelPinsUpdate {
    #[serde(default)]
    pub guild_id: Option<Snowflake>,
    pub channel_id: Snowflake,
    #[serde(default)]
    pub last_pin_timestamp: Option<String>,
}

/// GUILD_ROLE_CREATE / GUILD_ROLE_UPDATE payload.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct GuildRoleEvent {
    pub guild_id: Snowflake,
    pub role: Role,
}

/// GUILD_ROLE_DELETE payload.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct GuildRoleDelete {
    pub guild_id: Snowflake,
    pub role_id: Snowflake,
}

/// GUILD_EMOJIS_UPDATE payload.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct GuildEmojisUpdate {
    pub guild_id: Snowflake,
    #[serde(default)]
    pub emojis: Vec<Emoji>,
}

/// GUILD_STICKERS_UPDATE payload.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct GuildStickersUpdate {
    pub guild_id: Snowflake,
    #[serde(default)]
    pub stickers: Vec<Sticker>,
}

/// GUILD_MEMBER_ADD / GUILD_MEMBER_UPDATE payload: a member with the
/// guild it belongs to inlined.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct GuildMemberEvent {
    pub guild_id: Snowflake,
    #[serde(flatten)]
    pub member: GuildMember,
}

/// GUILD_MEMBER_REMOVE payload.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct GuildMemberRemove {
    pub guild_id: Snowflake,
    pub user: User,
}

/// GUILD_MEMBERS_CHUNK payload, the response to a member request.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct GuildMembersChunk {
    pub guild_id: Snowflake,
    #[serde(default)]
    pub members: Vec<GuildMember>,
    /// Index of this chunk within the response set.
    pub chunk_index: u32,
    /// Total chunks in the response set.
    pub chunk_count: u32,
    /// Requested IDs that were not found in the guild.
    #[serde(default)]
    pub not_found: Vec<Snowflake>,
    /// Presences, when requested with the presences intent.
    #[serde(default)]
    pub presences: Vec<Presence>,
    /// Nonce echoed back from the request.
    #[serde(default)]
    pub nonce: Option<String>,
}

/// MESSAGE_CREATE payload, reduced to the fields this library consumes.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Message {
    pub id: Snowflake,
    pub channel_id: Snowflake,
    #[serde(default)]
    pub guild_id: Option<Snowflake>,
    #[serde(default)]
    pub author: Option<User>,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub timestamp: Option<String>,
}

/// A parsed gateway dispatch.
#[derive(Debug, Clone)]
#[non_exhaustive]
pub enum Dispatch {
    /// Received after successful Identify.
    Ready(Box<Ready>),
    /// Received after successful Resume.
    Resumed,

    /// Channel was created.
    ChannelCreate(Box<Channel>),
    /// Channel was updated.
    ChannelUpdate(Box<Channel>),
    /// Channel was deleted.
    ChannelDelete(Box<Channel>),
    /// Message was pinned/unpinned.
    ChannelPinsUpdate(ChannelPinsUpdate),

    /// Thread was created or the user gained access to one.
    ThreadCreate(Box<Channel>),
    /// Thread was updated.
    ThreadUpdate(Box<Channel>),
    /// Thread was deleted.
    ThreadDelete(Box<Channel>),

    /// Lazy-load for unavailable guild, or guild joined.
    GuildCreate(Box<Guild>),
    /// Guild was updated.
    GuildUpdate(Box<Guild>),
    /// Guild was deleted or became unavailable.
    GuildDelete(UnavailableGuild),
    /// Guild emojis were updated.
    GuildEmojisUpdate(GuildEmojisUpdate),
    /// Guild stickers were updated.
    GuildStickersUpdate(GuildStickersUpdate),

    /// Role was created.
    GuildRoleCreate(GuildRoleEvent),
    /// Role was updated.
    GuildRoleUpdate(GuildRoleEvent),
    /// Role was deleted.
    GuildRoleDelete(GuildRoleDelete),

    /// New member joined guild.
    GuildMemberAdd(Box<GuildMemberEvent>),
    /// Member was updated.
    GuildMemberUpdate(Box<GuildMemberEvent>),
    /// Member was removed from guild.
    GuildMemberRemove(GuildMemberRemove),
    /// Response to a guild member request.
    GuildMembersChunk(Box<GuildMembersChunk>),

    /// Scheduled event was created.
    GuildScheduledEventCreate(Box<ScheduledEvent>),
    /// Scheduled event was updated.
    GuildScheduledEventUpdate(Box<ScheduledEvent>),
    /// Scheduled event was deleted.
    GuildScheduledEventDelete(Box<ScheduledEvent>),

    /// Stage instance was created.
    StageInstanceCreate(StageInstance),
    /// Stage instance was updated.
    StageInstanceUpdate(StageInstance),
    /// Stage instance was deleted.
    StageInstanceDelete(StageInstance),

    /// Message was sent.
    MessageCreate(Box<Message>),
    /// A user's presence changed.
    PresenceUpdate(Box<Presence>),
    /// The bot's own user was updated.
    UserUpdate(User),
    /// A user's voice state changed.
    VoiceStateUpdate(Box<VoiceState>),

    /// Any dispatch type this library has no dedicated payload for.
    Unknown {
        /// The `t` field of the frame.
        kind: String,
        /// The raw `d` field.
        data: Value,
    },
}

impl Dispatch {
    /// Parse a dispatch payload from its event type and `d` value.
    ///
    /// Unrecognized event types never fail; they come back as
    /// [`Dispatch::Unknown`].
    pub fn parse(kind: &str, data: Value) -> Result<Self, serde_json::Error> {
        use serde_json::from_value;

        Ok(match kind {
            "READY" => Self::Ready(Box::new(from_value(data)?)),
            "RESUMED" => Self::Resumed,
            "CHANNEL_CREATE" => Self::ChannelCreate(Box::new(from_value(data)?)),
            "CHANNEL_UPDATE" => Self::ChannelUpdate(Box::new(from_value(data)?)),
            "CHANNEL_DELETE" => Self::ChannelDelete(Box::new(from_value(data)?)),
            "CHANNEL_PINS_UPDATE" => Self::ChannelPinsUpdate(from_value(data)?),
            "THREAD_CREATE" => Self::ThreadCreate(Box::new(from_value(data)?)),
            "THREAD_UPDATE" => Self::ThreadUpdate(Box::new(from_value(data)?)),
            "THREAD_DELETE" => Self::ThreadDelete(Box::new(from_value(data)?)),
            "GUILD_CREATE" => Self::GuildCreate(Box::new(from_value(data)?)),
            "GUILD_UPDATE" => Self::GuildUpdate(Box::new(from_value(data)?)),
            "GUILD_DELETE" => Self::GuildDelete(from_value(data)?),
            "GUILD_EMOJIS_UPDATE" => Self::GuildEmojisUpdate(from_value(data)?),
            "GUILD_STICKERS_UPDATE" => Self::GuildStickersUpdate(from_value(data)?),
            "GUILD_ROLE_CREATE" => Self::GuildRoleCreate(from_value(data)?),
            "GUILD_ROLE_UPDATE" => Self::GuildRoleUpdate(from_value(data)?),
            "GUILD_ROLE_DELETE" => Self::GuildRoleDelete(from_value(data)?),
            "GUILD_MEMBER_ADD" => Self::GuildMemberAdd(Box::new(from_value(data)?)),
            "GUILD_MEMBER_UPDATE" => Self::GuildMemberUpdate(Box::new(from_value(data)?)),
            "GUILD_MEMBER_REMOVE" => Self::GuildMemberRemove(from_value(data)?),
            "GUILD_MEMBERS_CHUNK" => Self::GuildMembersChunk(Box::new(from_value(data)?)),
            "GUILD_SCHEDULED_EVENT_CREATE" => {
                Self::GuildScheduledEventCreate(Box::new(from_value(data)?))
            }
            "GUILD_SCHEDULED_EVENT_UPDATE" => {
                Self::GuildScheduledEventUpdate(Box::new(from_value(data)?))
            }
            "GUILD_SCHEDULED_EVENT_DELETE" => {
                Self::GuildScheduledEventDelete(Box::new(from_value(data)?))
            }
            "STAGE_INSTANCE_CREATE" => Self::StageInstanceCreate(from_value(data)?),
            "STAGE_INSTANCE_UPDATE" => Self::StageInstanceUpdate(from_value(data)?),
            "STAGE_INSTANCE_DELETE" => Self::StageInstanceDelete(from_value(data)?),
            "MESSAGE_CREATE" => Self::MessageCreate(Box::new(from_value(data)?)),
            "PRESENCE_UPDATE" => Self::PresenceUpdate(Box::new(from_value(data)?)),
            "USER_UPDATE" => Self::UserUpdate(from_value(data)?),
            "VOICE_STATE_UPDATE" => Self::VoiceStateUpdate(Box::new(from_value(data)?)),
            _ => Self::Unknown {
                kind: kind.to_owned(),
                data,
            },
        })
    }

    /// The gateway event type string for this dispatch.
    pub fn kind(&self) -> &str {
        match self {
            Self::Ready(_) => "READY",
            Self::Resumed => "RESUMED",
            Self::ChannelCreate(_) => "CHANNEL_CREATE",
            Self::ChannelUpdate(_) => "CHANNEL_UPDATE",
            Self::ChannelDelete(_) => "CHANNEL_DELETE",
            Self::ChannelPinsUpdate(_) => "CHANNEL_PINS_UPDATE",
            Self::ThreadCreate(_) => "THREAD_CREATE",
            Self::ThreadUpdate(_) => "THREAD_UPDATE",
            Self::ThreadDelete(_) => "THREAD_DELETE",
            Self::GuildCreate(_) => "GUILD_CREATE",
            Self::GuildUpdate(_) => "GUILD_UPDATE",
            Self::GuildDelete(_) => "GUILD_DELETE",
            Self::GuildEmojisUpdate(_) => "GUILD_EMOJIS_UPDATE",
            Self::GuildStickersUpdate(_) => "GUILD_STICKERS_UPDATE",
            Self::GuildRoleCreate(_) => "GUILD_ROLE_CREATE",
            Self::GuildRoleUpdate(_) => "GUILD_ROLE_UPDATE",
            Self::GuildRoleDelete(_) => "GUILD_ROLE_DELETE",
            Self::GuildMemberAdd(_) => "GUILD_MEMBER_ADD",
            Self::GuildMemberUpdate(_) => "GUILD_MEMBER_UPDATE",
            Self::GuildMemberRemove(_) => "GUILD_MEMBER_REMOVE",
            Self::GuildMembersChunk(_) => "GUILD_MEMBERS_CHUNK",
            Self::GuildScheduledEventCreate(_) => "GUILD_SCHEDULED_EVENT_CREATE",
            Self::GuildScheduledEventUpdate(_) => "GUILD_SCHEDULED_EVENT_UPDATE",
            Self::GuildScheduledEventDelete(_) => "GUILD_SCHEDULED_EVENT_DELETE",
            Self::StageInstanceCreate(_) => "STAGE_INSTANCE_CREATE",
            Self::StageInstanceUpdate(_) => "STAGE_INSTANCE_UPDATE",
            Self::StageInstanceDelete(_) => "STAGE_INSTANCE_DELETE",
            Self::MessageCreate(_) => "MESSAGE_CREATE",
            Self::PresenceUpdate(_) => "PRESENCE_UPDATE",
            Self::UserUpdate(_) => "USER_UPDATE",
            Self::VoiceStateUpdate(_) => "VOICE_STATE_UPDATE",
            Self::Unknown { kind, .. } => kind,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_ready() {
        let data = json!({
            "v": 10,
            "user": {"id": "42", "username": "bot"},
            "guilds": [{"id": "9", "unavailable": true}],
            "session_id": "abc",
            "resume_gateway_url": "wss://gateway-us-east1-b.discord.gg",
            "shard": [0, 1],
        });

        match Dispatch::parse("READY", data).unwrap() {
            Dispatch::Ready(ready) => {
                assert_eq!(ready.session_id, "abc");
                assert_eq!(ready.user.id, Snowflake::new(42));
                assert_eq!(ready.guilds.len(), 1);
                assert_eq!(ready.shard, Some([0, 1]));
            }
            other => panic!("expected READY, got {}", other.kind()),
        }
    }

    #[test]
    fn test_parse_member_add_flattened() {
        let data = json!({
            "guild_id": "9",
            "user": {"id": "7", "username": "someone"},
            "roles": ["1", "2"],
            "joined_at": "2020-01-01T00:00:00Z",
        });

        match Dispatch::parse("GUILD_MEMBER_ADD", data).unwrap() {
            Dispatch::GuildMemberAdd(event) => {
                assert_eq!(event.guild_id, Snowflake::new(9));
                assert_eq!(event.member.user_id(), Some(Snowflake::new(7)));
                assert_eq!(event.member.roles.len(), 2);
            }
            other => panic!("expected GUILD_MEMBER_ADD, got {}", other.kind()),
        }
    }

    #[test]
    fn test_parse_unknown_passthrough() {
        let data = json!({"whatever": true});
        let dispatch = Dispatch::parse("TYPING_START", data.clone()).unwrap();

        match dispatch {
            Dispatch::Unknown { kind, data: raw } => {
                assert_eq!(kind, "TYPING_START");
                assert_eq!(raw, data);
            }
            other => panic!("expected Unknown, got {}", other.kind()),
        }
    }

    #[test]
    fn test_parse_chunk() {
        let data = json!({
            "guild_id": "9",
            "members": [{"user": {"id": "7"}}],
            "chunk_index": 0,
            "chunk_count": 2,
            "not_found": ["123"],
            "nonce": "deadbeef",
        });

        match Dispatch::parse("GUILD_MEMBERS_CHUNK", data).unwrap() {
            Dispatch::GuildMembersChunk(chunk) => {
                assert_eq!(chunk.chunk_count, 2);
                assert_eq!(chunk.not_found, vec![Snowflake::new(123)]);
                assert_eq!(chunk.nonce.as_deref(), Some("deadbeef"));
            }
            other => panic!("expected GUILD_MEMBERS_CHUNK, got {}", other.kind()),
        }
    }
}
