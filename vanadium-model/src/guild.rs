use crate::channel::Channel;
use crate::presence::Presence;
use crate::snowflake::Snowflake;
use crate::user::User;
use crate::voice::VoiceState;
use serde::{Deserialize, Serialize};

/// Discord Guild (Server) representation.
///
/// GUILD_CREATE carries the child collections (channels, members, voice
/// states); GUILD_UPDATE does not, which is why they all default to empty.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Guild {
    /// Guild ID.
    pub id: Snowflake,
    /// Guild name (2-100 characters).
    #[serde(default)]
    pub name: Option<String>,
    /// Icon hash.
    #[serde(default)]
    pub icon: Option<String>,
    /// Splash hash.
    #[serde(default)]
    pub splash: Option<String>,
    /// ID of owner.
    #[serde(default)]
    pub owner_id: Option<Snowflake>,
    /// ID of AFK channel.
    #[serde(default)]
    pub afk_channel_id: Option<Snowflake>,
    /// AFK timeout in seconds.
    #[serde(default)]
    pub afk_timeout: Option<u32>,
    /// Verification level required.
    #[serde(default)]
    pub verification_level: Option<u8>,
    /// Whether the guild is unavailable due to an outage.
    #[serde(default)]
    pub unavailable: Option<bool>,
    /// Member count (only in GUILD_CREATE).
    #[serde(default)]
    pub member_count: Option<u64>,
    /// Whether this is considered a large guild.
    #[serde(default)]
    pub large: Option<bool>,
    /// Enabled guild features.
    #[serde(default)]
    pub features: Vec<String>,
    /// Vanity URL code.
    #[serde(default)]
    pub vanity_url_code: Option<String>,
    /// Guild description.
    #[serde(default)]
    pub description: Option<String>,
    /// Banner hash.
    #[serde(default)]
    pub banner: Option<String>,
    /// Premium tier (boost level).
    #[serde(default)]
    pub premium_tier: Option<u8>,
    /// Preferred locale.
    #[serde(default)]
    pub preferred_locale: Option<String>,
    /// Roles in the guild.
    #[serde(default)]
    pub roles: Vec<Role>,
    /// Custom guild emojis.
    #[serde(default)]
    pub emojis: Vec<Emoji>,
    /// Custom guild stickers.
    #[serde(default)]
    pub stickers: Vec<Sticker>,
    /// Channels (only in GUILD_CREATE).
    #[serde(default)]
    pub channels: Vec<Channel>,
    /// Active threads (only in GUILD_CREATE).
    #[serde(default)]
    pub threads: Vec<Channel>,
    /// Members (only in GUILD_CREATE, capped by large_threshold).
    #[serde(default)]
    pub members: Vec<GuildMember>,
    /// Presences (only in GUILD_CREATE, requires the presences intent).
    #[serde(default)]
    pub presences: Vec<Presence>,
    /// Voice states (only in GUILD_CREATE).
    #[serde(default)]
    pub voice_states: Vec<VoiceState>,
}

/// A guild that is or became unavailable; also the GUILD_DELETE payload.
///
/// When `unavailable` is absent the user was removed from the guild.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct UnavailableGuild {
    pub id: Snowflake,
    #[serde(default)]
    pub unavailable: Option<bool>,
}

/// Discord Role representation.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Role {
    /// Role ID.
    pub id: Snowflake,
    /// Role name.
    #[serde(default)]
    pub name: Option<String>,
    /// Integer color.
    #[serde(default)]
    pub color: Option<u32>,
    /// Whether the role is pinned in the user listing.
    #[serde(default)]
    pub hoist: Option<bool>,
    /// Sorting position.
    #[serde(default)]
    pub position: Option<i32>,
    /// Permission bit set, stringified.
    #[serde(default)]
    pub permissions: Option<String>,
    /// Whether the role is managed by an integration.
    #[serde(default)]
    pub managed: Option<bool>,
    /// Whether the role is mentionable.
    #[serde(default)]
    pub mentionable: Option<bool>,
}

/// Custom guild emoji.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Emoji {
    #[serde(default)]
    pub id: Option<Snowflake>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub animated: Option<bool>,
    #[serde(default)]
    pub available: Option<bool>,
}

/// Custom guild sticker.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Sticker {
    pub id: Snowflake,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub guild_id: Option<Snowflake>,
}

/// Guild member.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct GuildMember {
    /// The underlying user. Absent in message payloads, present in
    /// member events and chunks.
    #[serde(default)]
    pub user: Option<User>,
    /// Guild-specific nickname.
    #[serde(default)]
    pub nick: Option<String>,
    /// Guild-specific avatar hash.
    #[serde(default)]
    pub avatar: Option<String>,
    /// Role IDs.
    #[serde(default)]
    pub roles: Vec<Snowflake>,
    /// When the user joined the guild.
    #[serde(default)]
    pub joined_at: Option<String>,
    /// When the user started boosting.
    #[serde(default)]
    pub premium_since: Option<String>,
    /// Whether the user is server-deafened.
    #[serde(default)]
    pub deaf: Option<bool>,
    /// Whether the user is server-muted.
    #[serde(default)]
    pub mute: Option<bool>,
    /// Whether the user has passed membership screening.
    #[serde(default)]
    pub pending: Option<bool>,
    /// Timeout expiry.
    #[serde(default)]
    pub communication_disabled_until: Option<String>,
}

impl GuildMember {
    /// ID of the member's user, when the payload carried one.
    pub fn user_id(&self) -> Option<Snowflake> {
        self.user.as_ref().map(|user| user.id)
    }
}
