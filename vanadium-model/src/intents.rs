//! Gateway intents.
//!
//! The bitfield advertised at identify opts the session into event
//! categories. Members, presences, and message content are privileged
//! and must be enabled for the application before the gateway accepts
//! them.

use bitflags::bitflags;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

bitflags! {
    /// Event categories a session subscribes to at identify.
    pub struct Intents: u64 {
        /// Guild lifecycle, roles, channels, and threads.
        const GUILDS = 1;
        /// Member joins, updates, and removes. Privileged.
        const GUILD_MEMBERS = 1 << 1;
        /// Bans and audit log entries.
        const GUILD_MODERATION = 1 << 2;
        /// Emoji and sticker updates.
        const GUILD_EMOJIS_AND_STICKERS = 1 << 3;
        /// Integration updates.
        const GUILD_INTEGRATIONS = 1 << 4;
        /// Webhook updates.
        const GUILD_WEBHOOKS = 1 << 5;
        /// Invite creation and deletion.
        const GUILD_INVITES = 1 << 6;
        /// Voice state updates.
        const GUILD_VOICE_STATES = 1 << 7;
        /// Presence updates. Privileged.
        const GUILD_PRESENCES = 1 << 8;
        /// Messages in guild channels.
        const GUILD_MESSAGES = 1 << 9;
        /// Reactions in guild channels.
        const GUILD_MESSAGE_REACTIONS = 1 << 10;
        /// Typing indicators in guild channels.
        const GUILD_MESSAGE_TYPING = 1 << 11;
        /// Direct messages.
        const DIRECT_MESSAGES = 1 << 12;
        /// Reactions in direct messages.
        const DIRECT_MESSAGE_REACTIONS = 1 << 13;
        /// Typing indicators in direct messages.
        const DIRECT_MESSAGE_TYPING = 1 << 14;
        /// Message content in message events. Privileged.
        const MESSAGE_CONTENT = 1 << 15;
        /// Scheduled event lifecycle.
        const GUILD_SCHEDULED_EVENTS = 1 << 16;
        /// AutoMod rule configuration.
        const AUTO_MODERATION_CONFIGURATION = 1 << 20;
        /// AutoMod rule execution.
        const AUTO_MODERATION_EXECUTION = 1 << 21;

        /// The intents that require approval in the developer portal.
        const PRIVILEGED = Self::GUILD_MEMBERS.bits()
            | Self::GUILD_PRESENCES.bits()
            | Self::MESSAGE_CONTENT.bits();

        /// Every defined intent, privileged included.
        const ALL = Self::GUILDS.bits()
            | Self::GUILD_MEMBERS.bits()
            | Self::GUILD_MODERATION.bits()
            | Self::GUILD_EMOJIS_AND_STICKERS.bits()
            | Self::GUILD_INTEGRATIONS.bits()
            | Self::GUILD_WEBHOOKS.bits()
            | Self::GUILD_INVITES.bits()
            | Self::GUILD_VOICE_STATES.bits()
            | Self::GUILD_PRESENCES.bits()
            | Self::GUILD_MESSAGES.bits()
            | Self::GUILD_MESSAGE_REACTIONS.bits()
            | Self::GUILD_MESSAGE_TYPING.bits()
            | Self::DIRECT_MESSAGES.bits()
            | Self::DIRECT_MESSAGE_REACTIONS.bits()
            | Self::DIRECT_MESSAGE_TYPING.bits()
            | Self::MESSAGE_CONTENT.bits()
            | Self::GUILD_SCHEDULED_EVENTS.bits()
            | Self::AUTO_MODERATION_CONFIGURATION.bits()
            | Self::AUTO_MODERATION_EXECUTION.bits();

        /// Every intent that needs no approval.
        const NON_PRIVILEGED = Self::ALL.bits() & !Self::PRIVILEGED.bits();
    }
}

impl Intents {
    /// Look up a single intent by its API name (e.g. `"GUILD_MEMBERS"`).
    ///
    /// Only the individual intents are addressable by name, not the
    /// convenience combinations.
    pub fn from_name(name: &str) -> Option<Self> {
        Some(match name {
            "GUILDS" => Self::GUILDS,
            "GUILD_MEMBERS" => Self::GUILD_MEMBERS,
            "GUILD_MODERATION" => Self::GUILD_MODERATION,
            "GUILD_EMOJIS_AND_STICKERS" => Self::GUILD_EMOJIS_AND_STICKERS,
            "GUILD_INTEGRATIONS" => Self::GUILD_INTEGRATIONS,
            "GUILD_WEBHOOKS" => Self::GUILD_WEBHOOKS,
            "GUILD_INVITES" => Self::GUILD_INVITES,
            "GUILD_VOICE_STATES" => Self::GUILD_VOICE_STATES,
            "GUILD_PRESENCES" => Self::GUILD_PRESENCES,
            "GUILD_MESSAGES" => Self::GUILD_MESSAGES,
            "GUILD_MESSAGE_REACTIONS" => Self::GUILD_MESSAGE_REACTIONS,
            "GUILD_MESSAGE_TYPING" => Self::GUILD_MESSAGE_TYPING,
            "DIRECT_MESSAGES" => Self::DIRECT_MESSAGES,
            "DIRECT_MESSAGE_REACTIONS" => Self::DIRECT_MESSAGE_REACTIONS,
            "DIRECT_MESSAGE_TYPING" => Self::DIRECT_MESSAGE_TYPING,
            "MESSAGE_CONTENT" => Self::MESSAGE_CONTENT,
            "GUILD_SCHEDULED_EVENTS" => Self::GUILD_SCHEDULED_EVENTS,
            "AUTO_MODERATION_CONFIGURATION" => Self::AUTO_MODERATION_CONFIGURATION,
            "AUTO_MODERATION_EXECUTION" => Self::AUTO_MODERATION_EXECUTION,
            _ => return None,
        })
    }
}

impl Default for Intents {
    fn default() -> Self {
        Self::NON_PRIVILEGED
    }
}

impl Serialize for Intents {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        self.bits().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Intents {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        u64::deserialize(deserializer).map(Self::from_bits_truncate)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_intent_bit_values() {
        assert_eq!(Intents::GUILDS.bits(), 1);
        assert_eq!(Intents::MESSAGE_CONTENT.bits(), 32768);
        assert_eq!(Intents::GUILD_SCHEDULED_EVENTS.bits(), 65536);
        assert_eq!(Intents::AUTO_MODERATION_CONFIGURATION.bits(), 1 << 20);
        assert_eq!(Intents::AUTO_MODERATION_EXECUTION.bits(), 1 << 21);
    }

    #[test]
    fn test_composites_partition_the_space() {
        assert_eq!(
            Intents::PRIVILEGED,
            Intents::GUILD_MEMBERS | Intents::GUILD_PRESENCES | Intents::MESSAGE_CONTENT
        );
        assert!(!Intents::NON_PRIVILEGED.intersects(Intents::PRIVILEGED));
        assert_eq!(Intents::NON_PRIVILEGED | Intents::PRIVILEGED, Intents::ALL);
    }

    #[test]
    fn test_serde_as_number() {
        let intents = Intents::GUILDS | Intents::GUILD_MESSAGES;
        assert_eq!(serde_json::to_string(&intents).unwrap(), "513");

        let decoded: Intents = serde_json::from_str("513").unwrap();
        assert_eq!(decoded, intents);

        // Unknown bits (1 << 17 is unassigned) are dropped rather than
        // rejected.
        let decoded: Intents = serde_json::from_str("131073").unwrap();
        assert_eq!(decoded, Intents::GUILDS);
    }

    #[test]
    fn test_intent_name_lookup() {
        assert_eq!(Intents::from_name("GUILDS"), Some(Intents::GUILDS));
        assert_eq!(
            Intents::from_name("MESSAGE_CONTENT"),
            Some(Intents::MESSAGE_CONTENT)
        );
        assert_eq!(Intents::from_name("NOT_AN_INTENT"), None);
    }
}
