//! Cache configuration: which entity kinds to cache and, per kind, which
//! fields to retain.
//!
//! Field selection is a bitset over each entity's closed field set.
//! Key fields (the record's own id, `guild_id`, a member's user id) are
//! always retained; an empty mask keeps only those.

use bitflags::bitflags;

bitflags! {
    /// Retainable channel fields.
    pub struct ChannelFields: u32 {
        const KIND = 1;
        const POSITION = 1 << 1;
        const NAME = 1 << 2;
        const TOPIC = 1 << 3;
        const NSFW = 1 << 4;
        const LAST_MESSAGE_ID = 1 << 5;
        const RATE_LIMIT_PER_USER = 1 << 6;
        const OWNER_ID = 1 << 7;
        const PARENT_ID = 1 << 8;
        const LAST_PIN_TIMESTAMP = 1 << 9;
    }
}

bitflags! {
    /// Retainable guild fields. Child id lists (channels, roles,
    /// members, emojis, stickers) are key material and always kept.
    pub struct GuildFields: u32 {
        const NAME = 1;
        const ICON = 1 << 1;
        const SPLASH = 1 << 2;
        const OWNER_ID = 1 << 3;
        const AFK_CHANNEL_ID = 1 << 4;
        const AFK_TIMEOUT = 1 << 5;
        const VERIFICATION_LEVEL = 1 << 6;
        const UNAVAILABLE = 1 << 7;
        const MEMBER_COUNT = 1 << 8;
        const LARGE = 1 << 9;
        const FEATURES = 1 << 10;
        const VANITY_URL_CODE = 1 << 11;
        const DESCRIPTION = 1 << 12;
        const BANNER = 1 << 13;
        const PREMIUM_TIER = 1 << 14;
        const PREFERRED_LOCALE = 1 << 15;
    }
}

bitflags! {
    /// Retainable member fields.
    pub struct MemberFields: u32 {
        const NICK = 1;
        const AVATAR = 1 << 1;
        const ROLES = 1 << 2;
        const JOINED_AT = 1 << 3;
        const PREMIUM_SINCE = 1 << 4;
        const DEAF = 1 << 5;
        const MUTE = 1 << 6;
        const PENDING = 1 << 7;
        const COMMUNICATION_DISABLED_UNTIL = 1 << 8;
    }
}

bitflags! {
    /// Retainable presence fields.
    pub struct PresenceFields: u32 {
        const STATUS = 1;
        const ACTIVITIES = 1 << 1;
        const CLIENT_STATUS = 1 << 2;
    }
}

bitflags! {
    /// Retainable role fields.
    pub struct RoleFields: u32 {
        const NAME = 1;
        const COLOR = 1 << 1;
        const HOIST = 1 << 2;
        const POSITION = 1 << 3;
        const PERMISSIONS = 1 << 4;
        const MANAGED = 1 << 5;
        const MENTIONABLE = 1 << 6;
    }
}

bitflags! {
    /// Retainable user fields.
    pub struct UserFields: u32 {
        const USERNAME = 1;
        const DISCRIMINATOR = 1 << 1;
        const GLOBAL_NAME = 1 << 2;
        const AVATAR = 1 << 3;
        const BOT = 1 << 4;
        const SYSTEM = 1 << 5;
        const BANNER = 1 << 6;
        const ACCENT_COLOR = 1 << 7;
        const LOCALE = 1 << 8;
        const FLAGS = 1 << 9;
        const PUBLIC_FLAGS = 1 << 10;
    }
}

bitflags! {
    /// Retainable voice state fields.
    pub struct VoiceStateFields: u32 {
        const CHANNEL_ID = 1;
        const SESSION_ID = 1 << 1;
        const DEAF = 1 << 2;
        const MUTE = 1 << 3;
        const SELF_DEAF = 1 << 4;
        const SELF_MUTE = 1 << 5;
        const SELF_STREAM = 1 << 6;
        const SELF_VIDEO = 1 << 7;
        const SUPPRESS = 1 << 8;
    }
}

bitflags! {
    /// Retainable stage instance fields.
    pub struct StageInstanceFields: u32 {
        const TOPIC = 1;
        const PRIVACY_LEVEL = 1 << 1;
    }
}

bitflags! {
    /// Retainable scheduled event fields.
    pub struct ScheduledEventFields: u32 {
        const CHANNEL_ID = 1;
        const CREATOR_ID = 1 << 1;
        const NAME = 1 << 2;
        const DESCRIPTION = 1 << 3;
        const START_TIME = 1 << 4;
        const END_TIME = 1 << 5;
        const STATUS = 1 << 6;
        const ENTITY_TYPE = 1 << 7;
        const USER_COUNT = 1 << 8;
    }
}

/// Per-kind cache enablement.
///
/// `None` disables the kind entirely; `Some(mask)` caches the kind and
/// retains the masked fields (plus key fields, always).
#[derive(Debug, Clone, Default)]
pub struct CacheConfig {
    pub channels: Option<ChannelFields>,
    pub guilds: Option<GuildFields>,
    pub members: Option<MemberFields>,
    pub presences: Option<PresenceFields>,
    pub roles: Option<RoleFields>,
    pub users: Option<UserFields>,
    pub voice_states: Option<VoiceStateFields>,
    pub stage_instances: Option<StageInstanceFields>,
    pub scheduled_events: Option<ScheduledEventFields>,
}

impl CacheConfig {
    /// Cache nothing. Identical to [`Default`].
    pub fn none() -> Self {
        Self::default()
    }

    /// Cache every kind with every field retained.
    pub fn all() -> Self {
        Self {
            channels: Some(ChannelFields::all()),
            guilds: Some(GuildFields::all()),
            members: Some(MemberFields::all()),
            presences: Some(PresenceFields::all()),
            roles: Some(RoleFields::all()),
            users: Some(UserFields::all()),
            voice_states: Some(VoiceStateFields::all()),
            stage_instances: Some(StageInstanceFields::all()),
            scheduled_events: Some(ScheduledEventFields::all()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_disables_everything() {
        let config = CacheConfig::default();
        assert!(config.channels.is_none());
        assert!(config.guilds.is_none());
        assert!(config.users.is_none());
    }

    #[test]
    fn test_empty_mask_is_enabled() {
        let config = CacheConfig {
            users: Some(UserFields::empty()),
            ..CacheConfig::default()
        };
        assert!(config.users.is_some());
        assert!(!config.users.unwrap().contains(UserFields::USERNAME));
    }
}
