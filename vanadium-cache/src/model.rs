//! Cached record types.
//!
//! Records are partial by design: only fields selected in the cache
//! configuration are retained, everything else stays `None`. `update`
//! merges the defined fields of an incoming payload under the mask; key
//! fields are merged unconditionally.

use crate::config::{
    ChannelFields, GuildFields, MemberFields, PresenceFields, RoleFields, ScheduledEventFields,
    StageInstanceFields, UserFields, VoiceStateFields,
};
use vanadium_model::{
    Activity, Channel, ClientStatus, Guild, GuildMember, Presence, Role, ScheduledEvent, Snowflake,
    StageInstance, Status, User, VoiceState,
};

/// Merge one optional source field into the record when its flag is set.
macro_rules! merge {
    ($fields:expr, $flag:expr, $dst:expr, $src:expr) => {
        if $fields.contains($flag) {
            if let Some(value) = &$src {
                $dst = Some(value.clone());
            }
        }
    };
}

/// A cached channel (or thread).
#[derive(Debug, Clone, PartialEq)]
pub struct CachedChannel {
    pub id: Snowflake,
    pub guild_id: Option<Snowflake>,
    pub kind: Option<u8>,
    pub position: Option<i32>,
    pub name: Option<String>,
    pub topic: Option<String>,
    pub nsfw: Option<bool>,
    pub last_message_id: Option<Snowflake>,
    pub rate_limit_per_user: Option<u32>,
    pub owner_id: Option<Snowflake>,
    pub parent_id: Option<Snowflake>,
    pub last_pin_timestamp: Option<String>,
}

impl CachedChannel {
    pub(crate) fn new(id: Snowflake) -> Self {
        Self {
            id,
            guild_id: None,
            kind: None,
            position: None,
            name: None,
            topic: None,
            nsfw: None,
            last_message_id: None,
            rate_limit_per_user: None,
            owner_id: None,
            parent_id: None,
            last_pin_timestamp: None,
        }
    }

    pub(crate) fn update(
        &mut self,
        channel: &Channel,
        parent_guild: Option<Snowflake>,
        fields: ChannelFields,
    ) {
        if let Some(guild_id) = channel.guild_id.or(parent_guild) {
            self.guild_id = Some(guild_id);
        }

        merge!(fields, ChannelFields::KIND, self.kind, channel.kind);
        merge!(fields, ChannelFields::POSITION, self.position, channel.position);
        merge!(fields, ChannelFields::NAME, self.name, channel.name);
        merge!(fields, ChannelFields::TOPIC, self.topic, channel.topic);
        merge!(fields, ChannelFields::NSFW, self.nsfw, channel.nsfw);
        merge!(
            fields,
            ChannelFields::LAST_MESSAGE_ID,
            self.last_message_id,
            channel.last_message_id
        );
        merge!(
            fields,
            ChannelFields::RATE_LIMIT_PER_USER,
            self.rate_limit_per_user,
            channel.rate_limit_per_user
        );
        merge!(fields, ChannelFields::OWNER_ID, self.owner_id, channel.owner_id);
        merge!(fields, ChannelFields::PARENT_ID, self.parent_id, channel.parent_id);
        merge!(
            fields,
            ChannelFields::LAST_PIN_TIMESTAMP,
            self.last_pin_timestamp,
            channel.last_pin_timestamp
        );
    }
}

/// A cached guild. Child collections are reduced to id lists.
#[derive(Debug, Clone, PartialEq)]
pub struct CachedGuild {
    pub id: Snowflake,
    /// Channel and thread ids, newest first.
    pub channels: Vec<Snowflake>,
    pub roles: Vec<Snowflake>,
    /// Member user ids.
    pub members: Vec<Snowflake>,
    pub emojis: Vec<Snowflake>,
    pub stickers: Vec<Snowflake>,
    pub name: Option<String>,
    pub icon: Option<String>,
    pub splash: Option<String>,
    pub owner_id: Option<Snowflake>,
    pub afk_channel_id: Option<Snowflake>,
    pub afk_timeout: Option<u32>,
    pub verification_level: Option<u8>,
    pub unavailable: Option<bool>,
    pub member_count: Option<u64>,
    pub large: Option<bool>,
    pub features: Option<Vec<String>>,
    pub vanity_url_code: Option<String>,
    pub description: Option<String>,
    pub banner: Option<String>,
    pub premium_tier: Option<u8>,
    pub preferred_locale: Option<String>,
}

impl CachedGuild {
    pub(crate) fn new(id: Snowflake) -> Self {
        Self {
            id,
            channels: Vec::new(),
            roles: Vec::new(),
            members: Vec::new(),
            emojis: Vec::new(),
            stickers: Vec::new(),
            name: None,
            icon: None,
            splash: None,
            owner_id: None,
            afk_channel_id: None,
            afk_timeout: None,
            verification_level: None,
            unavailable: None,
            member_count: None,
            large: None,
            features: None,
            vanity_url_code: None,
            description: None,
            banner: None,
            premium_tier: None,
            preferred_locale: None,
        }
    }

    pub(crate) fn update(&mut self, guild: &Guild, fields: GuildFields) {
        // Child collections reduced to id arrays, kept regardless of the
        // mask.
        if !guild.channels.is_empty() || !guild.threads.is_empty() {
            let mut ids: Vec<Snowflake> = guild.channels.iter().map(|c| c.id).collect();
            ids.extend(guild.threads.iter().map(|t| t.id));
            ids.dedup();
            self.channels = ids;
        }
        if !guild.roles.is_empty() {
            self.roles = guild.roles.iter().map(|r| r.id).collect();
        }
        if !guild.members.is_empty() {
            self.members = guild.members.iter().filter_map(|m| m.user_id()).collect();
        }
        if !guild.emojis.is_empty() {
            self.emojis = guild.emojis.iter().filter_map(|e| e.id).collect();
        }
        if !guild.stickers.is_empty() {
            self.stickers = guild.stickers.iter().map(|s| s.id).collect();
        }

        merge!(fields, GuildFields::NAME, self.name, guild.name);
        merge!(fields, GuildFields::ICON, self.icon, guild.icon);
        merge!(fields, GuildFields::SPLASH, self.splash, guild.splash);
        merge!(fields, GuildFields::OWNER_ID, self.owner_id, guild.owner_id);
        merge!(
            fields,
            GuildFields::AFK_CHANNEL_ID,
            self.afk_channel_id,
            guild.afk_channel_id
        );
        merge!(fields, GuildFields::AFK_TIMEOUT, self.afk_timeout, guild.afk_timeout);
        merge!(
            fields,
            GuildFields::VERIFICATION_LEVEL,
            self.verification_level,
            guild.verification_level
        );
        merge!(fields, GuildFields::UNAVAILABLE, self.unavailable, guild.unavailable);
        merge!(fields, GuildFields::MEMBER_COUNT, self.member_count, guild.member_count);
        merge!(fields, GuildFields::LARGE, self.large, guild.large);
        if fields.contains(GuildFields::FEATURES) && !guild.features.is_empty() {
            self.features = Some(guild.features.clone());
        }
        merge!(
            fields,
            GuildFields::VANITY_URL_CODE,
            self.vanity_url_code,
            guild.vanity_url_code
        );
        merge!(fields, GuildFields::DESCRIPTION, self.description, guild.description);
        merge!(fields, GuildFields::BANNER, self.banner, guild.banner);
        merge!(fields, GuildFields::PREMIUM_TIER, self.premium_tier, guild.premium_tier);
        merge!(
            fields,
            GuildFields::PREFERRED_LOCALE,
            self.preferred_locale,
            guild.preferred_locale
        );
    }
}

/// A cached guild member, keyed by (guild, user).
#[derive(Debug, Clone, PartialEq)]
pub struct CachedMember {
    pub guild_id: Snowflake,
    pub user_id: Snowflake,
    pub nick: Option<String>,
    pub avatar: Option<String>,
    pub roles: Option<Vec<Snowflake>>,
    pub joined_at: Option<String>,
    pub premium_since: Option<String>,
    pub deaf: Option<bool>,
    pub mute: Option<bool>,
    pub pending: Option<bool>,
    pub communication_disabled_until: Option<String>,
}

impl CachedMember {
    pub(crate) fn new(guild_id: Snowflake, user_id: Snowflake) -> Self {
        Self {
            guild_id,
            user_id,
            nick: None,
            avatar: None,
            roles: None,
            joined_at: None,
            premium_since: None,
            deaf: None,
            mute: None,
            pending: None,
            communication_disabled_until: None,
        }
    }

    pub(crate) fn update(&mut self, member: &GuildMember, fields: MemberFields) {
        merge!(fields, MemberFields::NICK, self.nick, member.nick);
        merge!(fields, MemberFields::AVATAR, self.avatar, member.avatar);
        if fields.contains(MemberFields::ROLES) && !member.roles.is_empty() {
            self.roles = Some(member.roles.clone());
        }
        merge!(fields, MemberFields::JOINED_AT, self.joined_at, member.joined_at);
        merge!(
            fields,
            MemberFields::PREMIUM_SINCE,
            self.premium_since,
            member.premium_since
        );
        merge!(fields, MemberFields::DEAF, self.deaf, member.deaf);
        merge!(fields, MemberFields::MUTE, self.mute, member.mute);
        merge!(fields, MemberFields::PENDING, self.pending, member.pending);
        merge!(
            fields,
            MemberFields::COMMUNICATION_DISABLED_UNTIL,
            self.communication_disabled_until,
            member.communication_disabled_until
        );
    }
}

/// A cached presence, keyed by (guild, user).
#[derive(Debug, Clone, PartialEq)]
pub struct CachedPresence {
    pub guild_id: Snowflake,
    pub user_id: Snowflake,
    pub status: Option<Status>,
    pub activities: Option<Vec<Activity>>,
    pub client_status: Option<ClientStatus>,
}

impl CachedPresence {
    pub(crate) fn new(guild_id: Snowflake, user_id: Snowflake) -> Self {
        Self {
            guild_id,
            user_id,
            status: None,
            activities: None,
            client_status: None,
        }
    }

    pub(crate) fn update(&mut self, presence: &Presence, fields: PresenceFields) {
        merge!(fields, PresenceFields::STATUS, self.status, presence.status);
        if fields.contains(PresenceFields::ACTIVITIES) {
            self.activities = Some(presence.activities.clone());
        }
        merge!(
            fields,
            PresenceFields::CLIENT_STATUS,
            self.client_status,
            presence.client_status
        );
    }
}

/// A cached role.
#[derive(Debug, Clone, PartialEq)]
pub struct CachedRole {
    pub id: Snowflake,
    pub guild_id: Option<Snowflake>,
    pub name: Option<String>,
    pub color: Option<u32>,
    pub hoist: Option<bool>,
    pub position: Option<i32>,
    pub permissions: Option<String>,
    pub managed: Option<bool>,
    pub mentionable: Option<bool>,
}

impl CachedRole {
    pub(crate) fn new(id: Snowflake) -> Self {
        Self {
            id,
            guild_id: None,
            name: None,
            color: None,
            hoist: None,
            position: None,
            permissions: None,
            managed: None,
            mentionable: None,
        }
    }

    pub(crate) fn update(&mut self, role: &Role, guild_id: Option<Snowflake>, fields: RoleFields) {
        if let Some(guild_id) = guild_id {
            self.guild_id = Some(guild_id);
        }

        merge!(fields, RoleFields::NAME, self.name, role.name);
        merge!(fields, RoleFields::COLOR, self.color, role.color);
        merge!(fields, RoleFields::HOIST, self.hoist, role.hoist);
        merge!(fields, RoleFields::POSITION, self.position, role.position);
        merge!(fields, RoleFields::PERMISSIONS, self.permissions, role.permissions);
        merge!(fields, RoleFields::MANAGED, self.managed, role.managed);
        merge!(fields, RoleFields::MENTIONABLE, self.mentionable, role.mentionable);
    }
}

/// A cached user.
#[derive(Debug, Clone, PartialEq)]
pub struct CachedUser {
    pub id: Snowflake,
    pub username: Option<String>,
    pub discriminator: Option<String>,
    pub global_name: Option<String>,
    pub avatar: Option<String>,
    pub bot: Option<bool>,
    pub system: Option<bool>,
    pub banner: Option<String>,
    pub accent_color: Option<u32>,
    pub locale: Option<String>,
    pub flags: Option<u64>,
    pub public_flags: Option<u64>,
}

impl CachedUser {
    pub(crate) fn new(id: Snowflake) -> Self {
        Self {
            id,
            username: None,
            discriminator: None,
            global_name: None,
            avatar: None,
            bot: None,
            system: None,
            banner: None,
            accent_color: None,
            locale: None,
            flags: None,
            public_flags: None,
        }
    }

    pub(crate) fn update(&mut self, user: &User, fields: UserFields) {
        merge!(fields, UserFields::USERNAME, self.username, user.username);
        merge!(
            fields,
            UserFields::DISCRIMINATOR,
            self.discriminator,
            user.discriminator
        );
        merge!(fields, UserFields::GLOBAL_NAME, self.global_name, user.global_name);
        merge!(fields, UserFields::AVATAR, self.avatar, user.avatar);
        merge!(fields, UserFields::BOT, self.bot, user.bot);
        merge!(fields, UserFields::SYSTEM, self.system, user.system);
        merge!(fields, UserFields::BANNER, self.banner, user.banner);
        merge!(fields, UserFields::ACCENT_COLOR, self.accent_color, user.accent_color);
        merge!(fields, UserFields::LOCALE, self.locale, user.locale);
        merge!(fields, UserFields::FLAGS, self.flags, user.flags);
        merge!(fields, UserFields::PUBLIC_FLAGS, self.public_flags, user.public_flags);
    }
}

/// A cached voice state, keyed by (guild, user).
#[derive(Debug, Clone, PartialEq)]
pub struct CachedVoiceState {
    pub guild_id: Snowflake,
    pub user_id: Snowflake,
    pub channel_id: Option<Snowflake>,
    pub session_id: Option<String>,
    pub deaf: Option<bool>,
    pub mute: Option<bool>,
    pub self_deaf: Option<bool>,
    pub self_mute: Option<bool>,
    pub self_stream: Option<bool>,
    pub self_video: Option<bool>,
    pub suppress: Option<bool>,
}

impl CachedVoiceState {
    pub(crate) fn new(guild_id: Snowflake, user_id: Snowflake) -> Self {
        Self {
            guild_id,
            user_id,
            channel_id: None,
            session_id: None,
            deaf: None,
            mute: None,
            self_deaf: None,
            self_mute: None,
            self_stream: None,
            self_video: None,
            suppress: None,
        }
    }

    pub(crate) fn update(&mut self, state: &VoiceState, fields: VoiceStateFields) {
        merge!(fields, VoiceStateFields::CHANNEL_ID, self.channel_id, state.channel_id);
        merge!(fields, VoiceStateFields::SESSION_ID, self.session_id, state.session_id);
        merge!(fields, VoiceStateFields::DEAF, self.deaf, state.deaf);
        merge!(fields, VoiceStateFields::MUTE, self.mute, state.mute);
        merge!(fields, VoiceStateFields::SELF_DEAF, self.self_deaf, state.self_deaf);
        merge!(fields, VoiceStateFields::SELF_MUTE, self.self_mute, state.self_mute);
        merge!(
            fields,
            VoiceStateFields::SELF_STREAM,
            self.self_stream,
            state.self_stream
        );
        merge!(fields, VoiceStateFields::SELF_VIDEO, self.self_video, state.self_video);
        merge!(fields, VoiceStateFields::SUPPRESS, self.suppress, state.suppress);
    }
}

/// A cached stage instance.
#[derive(Debug, Clone, PartialEq)]
pub struct CachedStageInstance {
    pub id: Snowflake,
    pub guild_id: Snowflake,
    pub channel_id: Snowflake,
    pub topic: Option<String>,
    pub privacy_level: Option<u8>,
}

impl CachedStageInstance {
    pub(crate) fn new(stage: &StageInstance) -> Self {
        Self {
            id: stage.id,
            guild_id: stage.guild_id,
            channel_id: stage.channel_id,
            topic: None,
            privacy_level: None,
        }
    }

    pub(crate) fn update(&mut self, stage: &StageInstance, fields: StageInstanceFields) {
        merge!(fields, StageInstanceFields::TOPIC, self.topic, stage.topic);
        merge!(
            fields,
            StageInstanceFields::PRIVACY_LEVEL,
            self.privacy_level,
            stage.privacy_level
        );
    }
}

/// A cached scheduled event.
#[derive(Debug, Clone, PartialEq)]
pub struct CachedScheduledEvent {
    pub id: Snowflake,
    pub guild_id: Snowflake,
    pub channel_id: Option<Snowflake>,
    pub creator_id: Option<Snowflake>,
    pub name: Option<String>,
    pub description: Option<String>,
    pub scheduled_start_time: Option<String>,
    pub scheduled_end_time: Option<String>,
    pub status: Option<u8>,
    pub entity_type: Option<u8>,
    pub user_count: Option<u32>,
}

impl CachedScheduledEvent {
    pub(crate) fn new(event: &ScheduledEvent) -> Self {
        Self {
            id: event.id,
            guild_id: event.guild_id,
            channel_id: None,
            creator_id: None,
            name: None,
            description: None,
            scheduled_start_time: None,
            scheduled_end_time: None,
            status: None,
            entity_type: None,
            user_count: None,
        }
    }

    pub(crate) fn update(&mut self, event: &ScheduledEvent, fields: ScheduledEventFields) {
        merge!(
            fields,
            ScheduledEventFields::CHANNEL_ID,
            self.channel_id,
            event.channel_id
        );
        merge!(
            fields,
            ScheduledEventFields::CREATOR_ID,
            self.creator_id,
            event.creator_id
        );
        merge!(fields, ScheduledEventFields::NAME, self.name, event.name);
        merge!(
            fields,
            ScheduledEventFields::DESCRIPTION,
            self.description,
            event.description
        );
        merge!(
            fields,
            ScheduledEventFields::START_TIME,
            self.scheduled_start_time,
            event.scheduled_start_time
        );
        merge!(
            fields,
            ScheduledEventFields::END_TIME,
            self.scheduled_end_time,
            event.scheduled_end_time
        );
        merge!(fields, ScheduledEventFields::STATUS, self.status, event.status);
        merge!(
            fields,
            ScheduledEventFields::ENTITY_TYPE,
            self.entity_type,
            event.entity_type
        );
        merge!(
            fields,
            ScheduledEventFields::USER_COUNT,
            self.user_count,
            event.user_count
        );
    }
}
