//! Vanadium Cache - Event-driven selective cache for Discord entities
#![deny(unsafe_code)]
//!
//! The projection consumes gateway dispatches and maintains an
//! in-memory snapshot of the entities enabled in its configuration.
//! Records are partial: each kind carries a field mask and only masked
//! fields are retained (key ids always are). Applying the same dispatch
//! twice yields the same cache.
//!
//! The projection is driven from the dispatch pipeline before external
//! fan-out, so subscribers observe an already-updated cache.

pub mod config;
pub mod model;

pub use config::{
    CacheConfig, ChannelFields, GuildFields, MemberFields, PresenceFields, RoleFields,
    ScheduledEventFields, StageInstanceFields, UserFields, VoiceStateFields,
};
pub use model::{
    CachedChannel, CachedGuild, CachedMember, CachedPresence, CachedRole, CachedScheduledEvent,
    CachedStageInstance, CachedUser, CachedVoiceState,
};

use dashmap::DashMap;
use vanadium_model::{
    Channel, Dispatch, Guild, GuildMember, Presence, Role, Snowflake, User, VoiceState,
};

/// Entry counts per entity kind.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub channels: usize,
    pub guilds: usize,
    pub members: usize,
    pub presences: usize,
    pub roles: usize,
    pub users: usize,
    pub voice_states: usize,
    pub stage_instances: usize,
    pub scheduled_events: usize,
}

/// The in-memory projection of gateway state.
pub struct CacheProjection {
    config: CacheConfig,
    channels: DashMap<Snowflake, CachedChannel>,
    guilds: DashMap<Snowflake, CachedGuild>,
    members: DashMap<(Snowflake, Snowflake), CachedMember>,
    presences: DashMap<(Snowflake, Snowflake), CachedPresence>,
    roles: DashMap<Snowflake, CachedRole>,
    users: DashMap<Snowflake, CachedUser>,
    voice_states: DashMap<(Snowflake, Snowflake), CachedVoiceState>,
    stage_instances: DashMap<Snowflake, CachedStageInstance>,
    scheduled_events: DashMap<Snowflake, CachedScheduledEvent>,
}

impl CacheProjection {
    /// Create a projection with the given per-kind configuration.
    pub fn new(config: CacheConfig) -> Self {
        Self {
            config,
            channels: DashMap::new(),
            guilds: DashMap::new(),
            members: DashMap::new(),
            presences: DashMap::new(),
            roles: DashMap::new(),
            users: DashMap::new(),
            voice_states: DashMap::new(),
            stage_instances: DashMap::new(),
            scheduled_events: DashMap::new(),
        }
    }

    /// The active configuration.
    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    // =========================================================================
    // Lookups
    // =========================================================================

    pub fn channel(&self, id: Snowflake) -> Option<CachedChannel> {
        self.channels.get(&id).map(|entry| entry.clone())
    }

    pub fn guild(&self, id: Snowflake) -> Option<CachedGuild> {
        self.guilds.get(&id).map(|entry| entry.clone())
    }

    pub fn member(&self, guild_id: Snowflake, user_id: Snowflake) -> Option<CachedMember> {
        self.members.get(&(guild_id, user_id)).map(|entry| entry.clone())
    }

    pub fn presence(&self, guild_id: Snowflake, user_id: Snowflake) -> Option<CachedPresence> {
        self.presences
            .get(&(guild_id, user_id))
            .map(|entry| entry.clone())
    }

    pub fn role(&self, id: Snowflake) -> Option<CachedRole> {
        self.roles.get(&id).map(|entry| entry.clone())
    }

    pub fn user(&self, id: Snowflake) -> Option<CachedUser> {
        self.users.get(&id).map(|entry| entry.clone())
    }

    pub fn voice_state(&self, guild_id: Snowflake, user_id: Snowflake) -> Option<CachedVoiceState> {
        self.voice_states
            .get(&(guild_id, user_id))
            .map(|entry| entry.clone())
    }

    pub fn stage_instance(&self, id: Snowflake) -> Option<CachedStageInstance> {
        self.stage_instances.get(&id).map(|entry| entry.clone())
    }

    pub fn scheduled_event(&self, id: Snowflake) -> Option<CachedScheduledEvent> {
        self.scheduled_events.get(&id).map(|entry| entry.clone())
    }

    /// Entry counts for every kind.
    pub fn stats(&self) -> CacheStats {
        CacheStats {
            channels: self.channels.len(),
            guilds: self.guilds.len(),
            members: self.members.len(),
            presences: self.presences.len(),
            roles: self.roles.len(),
            users: self.users.len(),
            voice_states: self.voice_states.len(),
            stage_instances: self.stage_instances.len(),
            scheduled_events: self.scheduled_events.len(),
        }
    }

    // =========================================================================
    // Projection
    // =========================================================================

    /// Apply a dispatch to the projection.
    ///
    /// Dispatch types without an update rule are no-ops.
    pub fn apply(&self, dispatch: &Dispatch) {
        match dispatch {
            Dispatch::Ready(ready) => {
                if self.config.guilds.is_some() {
                    for guild in &ready.guilds {
                        self.guilds
                            .entry(guild.id)
                            .or_insert_with(|| CachedGuild::new(guild.id));
                    }
                }
                self.upsert_user(&ready.user);
            }

            Dispatch::ChannelCreate(channel) | Dispatch::ThreadCreate(channel) => {
                self.upsert_channel(channel, None);
                if let Some(guild_id) = channel.guild_id {
                    self.guild_add_channel(guild_id, channel.id);
                }
            }
            Dispatch::ChannelUpdate(channel) | Dispatch::ThreadUpdate(channel) => {
                self.upsert_channel(channel, None);
            }
            Dispatch::ChannelDelete(channel) | Dispatch::ThreadDelete(channel) => {
                self.channels.remove(&channel.id);
                if let Some(guild_id) = channel.guild_id {
                    if let Some(mut guild) = self.guilds.get_mut(&guild_id) {
                        guild.channels.retain(|id| *id != channel.id);
                    }
                }
            }
            Dispatch::ChannelPinsUpdate(pins) => {
                let partial = Channel {
                    id: pins.channel_id,
                    guild_id: pins.guild_id,
                    last_pin_timestamp: pins.last_pin_timestamp.clone(),
                    ..Channel::default()
                };
                self.upsert_channel(&partial, None);
            }

            Dispatch::GuildCreate(guild) | Dispatch::GuildUpdate(guild) => {
                self.upsert_guild_tree(guild);
            }
            Dispatch::GuildDelete(deleted) => {
                if deleted.unavailable == Some(true) {
                    let partial = Guild {
                        id: deleted.id,
                        unavailable: Some(true),
                        ..Guild::default()
                    };
                    if let Some(fields) = self.config.guilds {
                        let mut entry = self
                            .guilds
                            .entry(deleted.id)
                            .or_insert_with(|| CachedGuild::new(deleted.id));
                        entry.update(&partial, fields);
                    }
                } else {
                    self.remove_guild(deleted.id);
                }
            }
            Dispatch::GuildEmojisUpdate(update) => {
                if self.config.guilds.is_some() {
                    let mut guild = self
                        .guilds
                        .entry(update.guild_id)
                        .or_insert_with(|| CachedGuild::new(update.guild_id));
                    guild.emojis = update.emojis.iter().filter_map(|e| e.id).collect();
                }
            }
            Dispatch::GuildStickersUpdate(update) => {
                if self.config.guilds.is_some() {
                    let mut guild = self
                        .guilds
                        .entry(update.guild_id)
                        .or_insert_with(|| CachedGuild::new(update.guild_id));
                    guild.stickers = update.stickers.iter().map(|s| s.id).collect();
                }
            }

            Dispatch::GuildRoleCreate(event) | Dispatch::GuildRoleUpdate(event) => {
                self.upsert_role(&event.role, Some(event.guild_id));
                if self.config.guilds.is_some() {
                    let mut guild = self
                        .guilds
                        .entry(event.guild_id)
                        .or_insert_with(|| CachedGuild::new(event.guild_id));
                    if !guild.roles.contains(&event.role.id) {
                        guild.roles.push(event.role.id);
                    }
                }
            }
            Dispatch::GuildRoleDelete(event) => {
                self.roles.remove(&event.role_id);
                if let Some(mut guild) = self.guilds.get_mut(&event.guild_id) {
                    guild.roles.retain(|id| *id != event.role_id);
                }
            }

            Dispatch::GuildMemberAdd(event) | Dispatch::GuildMemberUpdate(event) => {
                self.upsert_member(event.guild_id, &event.member);
                if let (Some(user_id), true) =
                    (event.member.user_id(), self.config.guilds.is_some())
                {
                    let mut guild = self
                        .guilds
                        .entry(event.guild_id)
                        .or_insert_with(|| CachedGuild::new(event.guild_id));
                    if !guild.members.contains(&user_id) {
                        guild.members.push(user_id);
                    }
                }
            }
            Dispatch::GuildMemberRemove(event) => {
                self.members.remove(&(event.guild_id, event.user.id));
                if let Some(mut guild) = self.guilds.get_mut(&event.guild_id) {
                    guild.members.retain(|id| *id != event.user.id);
                }
            }
            Dispatch::GuildMembersChunk(chunk) => {
                for member in &chunk.members {
                    self.upsert_member(chunk.guild_id, member);
                }
                for presence in &chunk.presences {
                    self.upsert_presence(presence, Some(chunk.guild_id));
                }
            }

            Dispatch::GuildScheduledEventCreate(event)
            | Dispatch::GuildScheduledEventUpdate(event) => {
                if let Some(fields) = self.config.scheduled_events {
                    let mut entry = self
                        .scheduled_events
                        .entry(event.id)
                        .or_insert_with(|| CachedScheduledEvent::new(event));
                    entry.update(event, fields);
                }
            }
            Dispatch::GuildScheduledEventDelete(event) => {
                self.scheduled_events.remove(&event.id);
            }

            Dispatch::StageInstanceCreate(stage) | Dispatch::StageInstanceUpdate(stage) => {
                if let Some(fields) = self.config.stage_instances {
                    let mut entry = self
                        .stage_instances
                        .entry(stage.id)
                        .or_insert_with(|| CachedStageInstance::new(stage));
                    entry.update(stage, fields);
                }
            }
            Dispatch::StageInstanceDelete(stage) => {
                self.stage_instances.remove(&stage.id);
            }

            Dispatch::MessageCreate(message) => {
                let partial = Channel {
                    id: message.channel_id,
                    guild_id: message.guild_id,
                    last_message_id: Some(message.id),
                    ..Channel::default()
                };
                self.upsert_channel(&partial, None);
            }
            Dispatch::PresenceUpdate(presence) => {
                self.upsert_presence(presence, None);
            }
            Dispatch::UserUpdate(user) => {
                self.upsert_user(user);
            }
            Dispatch::VoiceStateUpdate(state) => {
                self.apply_voice_state(state);
            }

            // Everything else leaves the cache untouched.
            _ => {}
        }
    }

    // =========================================================================
    // Upsert helpers
    // =========================================================================

    fn upsert_channel(&self, channel: &Channel, parent_guild: Option<Snowflake>) {
        let Some(fields) = self.config.channels else {
            return;
        };
        let mut entry = self
            .channels
            .entry(channel.id)
            .or_insert_with(|| CachedChannel::new(channel.id));
        entry.update(channel, parent_guild, fields);
    }

    /// Prepend a channel id to its guild's channel list, deduplicated.
    fn guild_add_channel(&self, guild_id: Snowflake, channel_id: Snowflake) {
        if self.config.guilds.is_none() {
            return;
        }
        let mut guild = self
            .guilds
            .entry(guild_id)
            .or_insert_with(|| CachedGuild::new(guild_id));
        if !guild.channels.contains(&channel_id) {
            guild.channels.insert(0, channel_id);
        }
    }

    /// Upsert a guild and every child entity it carries.
    fn upsert_guild_tree(&self, guild: &Guild) {
        if let Some(fields) = self.config.guilds {
            let mut entry = self
                .guilds
                .entry(guild.id)
                .or_insert_with(|| CachedGuild::new(guild.id));
            entry.update(guild, fields);
        }

        // GUILD_CREATE children do not repeat the guild id, so it is
        // passed down explicitly.
        for channel in guild.channels.iter().chain(guild.threads.iter()) {
            self.upsert_channel(channel, Some(guild.id));
        }
        for role in &guild.roles {
            self.upsert_role(role, Some(guild.id));
        }
        for member in &guild.members {
            self.upsert_member(guild.id, member);
        }
        for presence in &guild.presences {
            self.upsert_presence(presence, Some(guild.id));
        }
        for state in &guild.voice_states {
            let mut scoped = state.clone();
            scoped.guild_id = scoped.guild_id.or(Some(guild.id));
            self.apply_voice_state(&scoped);
        }
    }

    /// Remove a guild and sweep every child record belonging to it.
    fn remove_guild(&self, guild_id: Snowflake) {
        self.guilds.remove(&guild_id);
        self.channels.retain(|_, channel| channel.guild_id != Some(guild_id));
        self.roles.retain(|_, role| role.guild_id != Some(guild_id));
        self.members.retain(|(guild, _), _| *guild != guild_id);
        self.presences.retain(|(guild, _), _| *guild != guild_id);
        self.voice_states.retain(|(guild, _), _| *guild != guild_id);
        self.stage_instances.retain(|_, stage| stage.guild_id != guild_id);
        self.scheduled_events.retain(|_, event| event.guild_id != guild_id);
    }

    fn upsert_role(&self, role: &Role, guild_id: Option<Snowflake>) {
        let Some(fields) = self.config.roles else {
            return;
        };
        let mut entry = self
            .roles
            .entry(role.id)
            .or_insert_with(|| CachedRole::new(role.id));
        entry.update(role, guild_id, fields);
    }

    fn upsert_member(&self, guild_id: Snowflake, member: &GuildMember) {
        if let Some(user) = &member.user {
            self.upsert_user(user);
        }

        let Some(fields) = self.config.members else {
            return;
        };
        let Some(user_id) = member.user_id() else {
            return;
        };
        let mut entry = self
            .members
            .entry((guild_id, user_id))
            .or_insert_with(|| CachedMember::new(guild_id, user_id));
        entry.update(member, fields);
    }

    fn upsert_presence(&self, presence: &Presence, parent_guild: Option<Snowflake>) {
        let Some(fields) = self.config.presences else {
            return;
        };
        let Some(guild_id) = presence.guild_id.or(parent_guild) else {
            return;
        };
        let user_id = presence.user.id;
        let mut entry = self
            .presences
            .entry((guild_id, user_id))
            .or_insert_with(|| CachedPresence::new(guild_id, user_id));
        entry.update(presence, fields);
    }

    fn upsert_user(&self, user: &User) {
        let Some(fields) = self.config.users else {
            return;
        };
        let mut entry = self
            .users
            .entry(user.id)
            .or_insert_with(|| CachedUser::new(user.id));
        entry.update(user, fields);
    }

    /// A voice state with no channel means the user left voice; the
    /// record is dropped instead of upserted.
    fn apply_voice_state(&self, state: &VoiceState) {
        let Some(fields) = self.config.voice_states else {
            return;
        };
        let Some(guild_id) = state.guild_id else {
            return;
        };

        if state.channel_id.is_none() {
            self.voice_states.remove(&(guild_id, state.user_id));
            return;
        }

        let mut entry = self
            .voice_states
            .entry((guild_id, state.user_id))
            .or_insert_with(|| CachedVoiceState::new(guild_id, state.user_id));
        entry.update(state, fields);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn parse(kind: &str, data: serde_json::Value) -> Dispatch {
        Dispatch::parse(kind, data).unwrap()
    }

    fn full_cache() -> CacheProjection {
        CacheProjection::new(CacheConfig::all())
    }

    #[test]
    fn test_ready_with_selected_user_fields() {
        // users enabled for ["username"] only.
        let cache = CacheProjection::new(CacheConfig {
            users: Some(UserFields::USERNAME),
            ..CacheConfig::default()
        });

        cache.apply(&parse(
            "READY",
            json!({
                "v": 10,
                "user": {"id": "42", "username": "bot", "avatar": "deadbeef"},
                "guilds": [],
                "session_id": "abc",
            }),
        ));

        let user = cache.user(Snowflake::new(42)).expect("user should be cached");
        assert_eq!(user.id, Snowflake::new(42));
        assert_eq!(user.username.as_deref(), Some("bot"));
        // The avatar was present in the payload but not selected.
        assert!(user.avatar.is_none());
    }

    #[test]
    fn test_ready_registers_partial_guilds() {
        let cache = full_cache();
        cache.apply(&parse(
            "READY",
            json!({
                "v": 10,
                "user": {"id": "42"},
                "guilds": [{"id": "9", "unavailable": true}],
                "session_id": "abc",
            }),
        ));

        assert!(cache.guild(Snowflake::new(9)).is_some());
    }

    #[test]
    fn test_channel_create_prepends_to_guild_list() {
        let cache = full_cache();

        cache.apply(&parse(
            "CHANNEL_CREATE",
            json!({"id": "1", "guild_id": "9", "name": "general", "type": 0}),
        ));
        cache.apply(&parse(
            "CHANNEL_CREATE",
            json!({"id": "2", "guild_id": "9", "name": "random", "type": 0}),
        ));
        // Duplicate create must not duplicate the list entry.
        cache.apply(&parse(
            "CHANNEL_CREATE",
            json!({"id": "2", "guild_id": "9", "name": "random", "type": 0}),
        ));

        let guild = cache.guild(Snowflake::new(9)).unwrap();
        assert_eq!(guild.channels, vec![Snowflake::new(2), Snowflake::new(1)]);
        assert_eq!(
            cache.channel(Snowflake::new(1)).unwrap().name.as_deref(),
            Some("general")
        );
    }

    #[test]
    fn test_channel_delete_removes_from_guild_list() {
        let cache = full_cache();
        cache.apply(&parse(
            "CHANNEL_CREATE",
            json!({"id": "1", "guild_id": "9", "type": 0}),
        ));
        cache.apply(&parse(
            "CHANNEL_DELETE",
            json!({"id": "1", "guild_id": "9", "type": 0}),
        ));

        assert!(cache.channel(Snowflake::new(1)).is_none());
        assert!(cache.guild(Snowflake::new(9)).unwrap().channels.is_empty());
    }

    #[test]
    fn test_channel_field_mask() {
        let cache = CacheProjection::new(CacheConfig {
            channels: Some(ChannelFields::NAME),
            ..CacheConfig::default()
        });

        cache.apply(&parse(
            "CHANNEL_CREATE",
            json!({"id": "1", "guild_id": "9", "name": "general", "topic": "hello", "type": 0}),
        ));

        let channel = cache.channel(Snowflake::new(1)).unwrap();
        assert_eq!(channel.name.as_deref(), Some("general"));
        assert!(channel.topic.is_none());
        assert!(channel.kind.is_none());
        // guild_id is a key field and survives any mask.
        assert_eq!(channel.guild_id, Some(Snowflake::new(9)));
    }

    #[test]
    fn test_channel_pins_update() {
        let cache = full_cache();
        cache.apply(&parse(
            "CHANNEL_PINS_UPDATE",
            json!({"channel_id": "1", "guild_id": "9", "last_pin_timestamp": "2024-01-01T00:00:00Z"}),
        ));

        let channel = cache.channel(Snowflake::new(1)).unwrap();
        assert_eq!(
            channel.last_pin_timestamp.as_deref(),
            Some("2024-01-01T00:00:00Z")
        );
    }

    fn guild_create() -> Dispatch {
        parse(
            "GUILD_CREATE",
            json!({
                "id": "9",
                "name": "test guild",
                "channels": [
                    {"id": "1", "name": "general", "type": 0},
                    {"id": "2", "name": "voice", "type": 2},
                    {"id": "3", "name": "rules", "type": 0},
                ],
                "roles": [{"id": "20", "name": "admin"}],
                "members": [{"user": {"id": "7", "username": "someone"}, "nick": "nick"}],
                "presences": [{"user": {"id": "7"}, "status": "online"}],
                "voice_states": [{"user_id": "7", "channel_id": "2", "session_id": "s"}],
            }),
        )
    }

    #[test]
    fn test_guild_create_projects_children() {
        let cache = full_cache();
        cache.apply(&guild_create());

        let guild = cache.guild(Snowflake::new(9)).unwrap();
        assert_eq!(guild.name.as_deref(), Some("test guild"));
        assert_eq!(guild.channels.len(), 3);
        assert_eq!(guild.roles, vec![Snowflake::new(20)]);
        assert_eq!(guild.members, vec![Snowflake::new(7)]);

        // Children were upserted individually, with the guild id filled in.
        let channel = cache.channel(Snowflake::new(1)).unwrap();
        assert_eq!(channel.guild_id, Some(Snowflake::new(9)));
        assert_eq!(cache.role(Snowflake::new(20)).unwrap().guild_id, Some(Snowflake::new(9)));
        assert!(cache.member(Snowflake::new(9), Snowflake::new(7)).is_some());
        assert!(cache.presence(Snowflake::new(9), Snowflake::new(7)).is_some());
        assert!(cache.voice_state(Snowflake::new(9), Snowflake::new(7)).is_some());
        assert_eq!(cache.user(Snowflake::new(7)).unwrap().username.as_deref(), Some("someone"));
    }

    #[test]
    fn test_guild_delete_sweeps_children() {
        let cache = full_cache();
        cache.apply(&guild_create());
        // A channel of an unrelated guild must survive the sweep.
        cache.apply(&parse(
            "CHANNEL_CREATE",
            json!({"id": "100", "guild_id": "10", "type": 0}),
        ));

        cache.apply(&parse("GUILD_DELETE", json!({"id": "9"})));

        assert!(cache.guild(Snowflake::new(9)).is_none());
        assert!(cache.channel(Snowflake::new(1)).is_none());
        assert!(cache.channel(Snowflake::new(2)).is_none());
        assert!(cache.channel(Snowflake::new(3)).is_none());
        assert!(cache.role(Snowflake::new(20)).is_none());
        assert!(cache.member(Snowflake::new(9), Snowflake::new(7)).is_none());
        assert!(cache.presence(Snowflake::new(9), Snowflake::new(7)).is_none());
        assert!(cache.voice_state(Snowflake::new(9), Snowflake::new(7)).is_none());

        assert!(cache.channel(Snowflake::new(100)).is_some());
    }

    #[test]
    fn test_guild_delete_unavailable_marks_only() {
        let cache = full_cache();
        cache.apply(&guild_create());
        cache.apply(&parse("GUILD_DELETE", json!({"id": "9", "unavailable": true})));

        let guild = cache.guild(Snowflake::new(9)).expect("guild should remain");
        assert_eq!(guild.unavailable, Some(true));
        // Children remain too.
        assert!(cache.channel(Snowflake::new(1)).is_some());
    }

    #[test]
    fn test_double_apply_is_idempotent() {
        let cache = full_cache();
        cache.apply(&guild_create());
        let guild_before = cache.guild(Snowflake::new(9)).unwrap();
        let stats_before = cache.stats();

        cache.apply(&guild_create());
        assert_eq!(cache.guild(Snowflake::new(9)).unwrap(), guild_before);
        assert_eq!(cache.stats(), stats_before);
    }

    #[test]
    fn test_role_lifecycle() {
        let cache = full_cache();

        cache.apply(&parse(
            "GUILD_ROLE_CREATE",
            json!({"guild_id": "9", "role": {"id": "21", "name": "mods"}}),
        ));
        assert_eq!(cache.role(Snowflake::new(21)).unwrap().name.as_deref(), Some("mods"));
        assert!(cache.guild(Snowflake::new(9)).unwrap().roles.contains(&Snowflake::new(21)));

        cache.apply(&parse(
            "GUILD_ROLE_UPDATE",
            json!({"guild_id": "9", "role": {"id": "21", "name": "moderators"}}),
        ));
        assert_eq!(
            cache.role(Snowflake::new(21)).unwrap().name.as_deref(),
            Some("moderators")
        );

        cache.apply(&parse(
            "GUILD_ROLE_DELETE",
            json!({"guild_id": "9", "role_id": "21"}),
        ));
        assert!(cache.role(Snowflake::new(21)).is_none());
        assert!(!cache.guild(Snowflake::new(9)).unwrap().roles.contains(&Snowflake::new(21)));
    }

    #[test]
    fn test_member_add_and_remove() {
        let cache = full_cache();

        cache.apply(&parse(
            "GUILD_MEMBER_ADD",
            json!({"guild_id": "9", "user": {"id": "7", "username": "someone"}, "nick": "n"}),
        ));
        assert!(cache.member(Snowflake::new(9), Snowflake::new(7)).is_some());
        assert!(cache.guild(Snowflake::new(9)).unwrap().members.contains(&Snowflake::new(7)));

        cache.apply(&parse(
            "GUILD_MEMBER_REMOVE",
            json!({"guild_id": "9", "user": {"id": "7"}}),
        ));
        assert!(cache.member(Snowflake::new(9), Snowflake::new(7)).is_none());
        assert!(!cache.guild(Snowflake::new(9)).unwrap().members.contains(&Snowflake::new(7)));
        // The user record survives a member removal.
        assert!(cache.user(Snowflake::new(7)).is_some());
    }

    #[test]
    fn test_members_chunk_bulk_upsert() {
        let cache = full_cache();
        cache.apply(&parse(
            "GUILD_MEMBERS_CHUNK",
            json!({
                "guild_id": "9",
                "members": [
                    {"user": {"id": "7", "username": "a"}},
                    {"user": {"id": "8", "username": "b"}},
                ],
                "presences": [{"user": {"id": "7"}, "status": "idle"}],
                "chunk_index": 0,
                "chunk_count": 1,
            }),
        ));

        assert!(cache.member(Snowflake::new(9), Snowflake::new(7)).is_some());
        assert!(cache.member(Snowflake::new(9), Snowflake::new(8)).is_some());
        assert!(cache.presence(Snowflake::new(9), Snowflake::new(7)).is_some());
        assert_eq!(cache.stats().users, 2);
    }

    #[test]
    fn test_message_create_touches_only_last_message_id() {
        let cache = full_cache();
        cache.apply(&parse(
            "MESSAGE_CREATE",
            json!({"id": "500", "channel_id": "1", "guild_id": "9", "content": "hi"}),
        ));

        let channel = cache.channel(Snowflake::new(1)).unwrap();
        assert_eq!(channel.last_message_id, Some(Snowflake::new(500)));
        assert!(channel.name.is_none());
    }

    #[test]
    fn test_voice_state_leave_removes_record() {
        let cache = full_cache();
        cache.apply(&parse(
            "VOICE_STATE_UPDATE",
            json!({"guild_id": "9", "user_id": "7", "channel_id": "2", "session_id": "s"}),
        ));
        assert!(cache.voice_state(Snowflake::new(9), Snowflake::new(7)).is_some());

        cache.apply(&parse(
            "VOICE_STATE_UPDATE",
            json!({"guild_id": "9", "user_id": "7", "channel_id": null}),
        ));
        assert!(cache.voice_state(Snowflake::new(9), Snowflake::new(7)).is_none());
    }

    #[test]
    fn test_stage_and_scheduled_event_lifecycle() {
        let cache = full_cache();

        cache.apply(&parse(
            "STAGE_INSTANCE_CREATE",
            json!({"id": "30", "guild_id": "9", "channel_id": "2", "topic": "talk"}),
        ));
        assert_eq!(
            cache.stage_instance(Snowflake::new(30)).unwrap().topic.as_deref(),
            Some("talk")
        );
        cache.apply(&parse(
            "STAGE_INSTANCE_DELETE",
            json!({"id": "30", "guild_id": "9", "channel_id": "2"}),
        ));
        assert!(cache.stage_instance(Snowflake::new(30)).is_none());

        cache.apply(&parse(
            "GUILD_SCHEDULED_EVENT_CREATE",
            json!({"id": "40", "guild_id": "9", "name": "movie night"}),
        ));
        assert_eq!(
            cache.scheduled_event(Snowflake::new(40)).unwrap().name.as_deref(),
            Some("movie night")
        );
        cache.apply(&parse(
            "GUILD_SCHEDULED_EVENT_DELETE",
            json!({"id": "40", "guild_id": "9"}),
        ));
        assert!(cache.scheduled_event(Snowflake::new(40)).is_none());
    }

    #[test]
    fn test_disabled_kinds_are_noops() {
        let cache = CacheProjection::new(CacheConfig::none());
        cache.apply(&guild_create());
        cache.apply(&parse(
            "CHANNEL_CREATE",
            json!({"id": "1", "guild_id": "9", "type": 0}),
        ));

        assert_eq!(cache.stats(), CacheStats::default());
    }

    #[test]
    fn test_unhandled_dispatch_is_noop() {
        let cache = full_cache();
        cache.apply(&parse("TYPING_START", json!({"channel_id": "1", "user_id": "7"})));
        assert_eq!(cache.stats(), CacheStats::default());
    }
}
