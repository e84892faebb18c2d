//! Vanadium Model - Core types for the Vanadium Discord library
#![deny(unsafe_code)]
//!
//! Entity types are partial by design: the gateway deals in fragments, so
//! every non-id field is optional or defaulted.
//!
//! # Modules
//!
//! - [`snowflake`] - 64-bit IDs and shard math
//! - [`intents`] - Gateway intents bitfield
//! - [`events`] - Dispatch payload types and the parsed dispatch enum
//! - [`user`], [`channel`], [`guild`], [`presence`], [`voice`], [`scheduled`] - entities

pub mod channel;
pub mod events;
pub mod guild;
pub mod intents;
pub mod presence;
pub mod scheduled;
pub mod snowflake;
pub mod user;
pub mod voice;

pub use channel::Channel;
pub use events::{
    ChannelPinsUpdate, Dispatch, GuildEmojisUpdate, GuildMemberEvent, GuildMemberRemove,
    GuildMembersChunk, GuildRoleDelete, GuildRoleEvent, GuildStickersUpdate, Message, Ready,
};
pub use guild::{Emoji, Guild, GuildMember, Role, Sticker, UnavailableGuild};
pub use intents::Intents;
pub use presence::{Activity, ActivityType, ClientStatus, Presence, PresenceUpdate, Status};
pub use scheduled::ScheduledEvent;
pub use snowflake::{Snowflake, DISCORD_EPOCH_MS};
pub use user::{PartialUser, User};
pub use voice::{StageInstance, VoiceState};
