//! Gateway configuration and option normalization.
//!
//! User-facing options accept several shapes (notably for intents); this
//! module fills defaults and resolves everything down to the concrete
//! values shards run with.

use crate::error::ConfigError;
use std::time::Duration;
use vanadium_model::{Intents, PresenceUpdate};

/// Intents, as users may express them.
#[derive(Debug, Clone)]
pub enum IntentsInput {
    /// A prebuilt bitfield.
    Flags(Intents),
    /// Raw bits.
    Bits(u64),
    /// API intent names, e.g. `["GUILDS", "GUILD_MESSAGES"]`.
    Names(Vec<String>),
    /// Every intent, privileged included.
    All,
    /// Every non-privileged intent.
    NonPrivileged,
}

impl IntentsInput {
    /// Resolve to the final bitfield.
    pub fn resolve(&self) -> Result<Intents, ConfigError> {
        match self {
            Self::Flags(intents) => Ok(*intents),
            Self::Bits(bits) => Ok(Intents::from_bits_truncate(*bits)),
            Self::Names(names) => {
                let mut intents = Intents::empty();
                for name in names {
                    let intent = Intents::from_name(name).ok_or_else(|| {
                        ConfigError::UnknownIntent { name: name.clone() }
                    })?;
                    intents |= intent;
                }
                Ok(intents)
            }
            Self::All => Ok(Intents::ALL),
            Self::NonPrivileged => Ok(Intents::NON_PRIVILEGED),
        }
    }
}

impl Default for IntentsInput {
    fn default() -> Self {
        Self::NonPrivileged
    }
}

impl From<Intents> for IntentsInput {
    fn from(intents: Intents) -> Self {
        Self::Flags(intents)
    }
}

impl From<u64> for IntentsInput {
    fn from(bits: u64) -> Self {
        Self::Bits(bits)
    }
}

/// Which slice of the shard space this process runs.
#[derive(Debug, Clone, Default)]
pub struct ShardingConfig {
    /// Fleet-wide shard count advertised in Identify. `None` uses the
    /// count recommended by `GET /gateway/bot`.
    pub total_shards: Option<u16>,
    /// How many shards to spawn locally. `None` spawns all of them.
    pub shards: Option<u16>,
    /// First shard id to spawn locally.
    pub offset: u16,
}

/// Gateway configuration shared by all shards of a fleet.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// Bot token.
    pub token: String,
    /// Gateway intents.
    pub intents: IntentsInput,
    /// Threshold above which guilds are "large" (offline members not
    /// sent). Clamped to 50..=250 when shards are built.
    pub large_guild_threshold: u8,
    /// Presence advertised at identify.
    pub presence: Option<PresenceUpdate>,
    /// Shard slice configuration.
    pub sharding: ShardingConfig,
    /// Delay between failed spawn attempts.
    pub spawn_attempt_delay: Duration,
    /// Connect attempts before `spawn()` gives up.
    pub spawn_max_attempts: u32,
    /// Bound on a single connect or resume handshake.
    pub spawn_timeout: Duration,
    /// Gateway API version.
    pub version: u8,
}

impl GatewayConfig {
    /// Configuration with default settings for a token.
    pub fn new(token: impl Into<String>, intents: impl Into<IntentsInput>) -> Self {
        Self {
            token: token.into(),
            intents: intents.into(),
            large_guild_threshold: 50,
            presence: None,
            sharding: ShardingConfig::default(),
            spawn_attempt_delay: Duration::from_millis(2500),
            spawn_max_attempts: 10,
            spawn_timeout: Duration::from_millis(30_000),
            version: 10,
        }
    }

    /// Set the shard slice.
    pub fn with_sharding(mut self, sharding: ShardingConfig) -> Self {
        self.sharding = sharding;
        self
    }

    /// Set the presence advertised at identify.
    pub fn with_presence(mut self, presence: PresenceUpdate) -> Self {
        self.presence = Some(presence);
        self
    }

    /// Set the large guild threshold; applied clamped to 50..=250.
    pub fn with_large_guild_threshold(mut self, threshold: u8) -> Self {
        self.large_guild_threshold = threshold;
        self
    }

    /// The large guild threshold, clamped to the API's accepted range.
    pub fn clamped_large_guild_threshold(&self) -> u8 {
        self.large_guild_threshold.clamp(50, 250)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_intent_resolution() {
        let flags = IntentsInput::Flags(Intents::GUILDS).resolve().unwrap();
        assert_eq!(flags, Intents::GUILDS);

        let bits = IntentsInput::Bits(513).resolve().unwrap();
        assert_eq!(bits, Intents::GUILDS | Intents::GUILD_MESSAGES);

        let named = IntentsInput::Names(vec!["GUILDS".into(), "GUILD_MEMBERS".into()])
            .resolve()
            .unwrap();
        assert_eq!(named, Intents::GUILDS | Intents::GUILD_MEMBERS);

        assert_eq!(IntentsInput::All.resolve().unwrap(), Intents::ALL);
        assert_eq!(
            IntentsInput::NonPrivileged.resolve().unwrap(),
            Intents::NON_PRIVILEGED
        );
    }

    #[test]
    fn test_unknown_intent_name() {
        let result = IntentsInput::Names(vec!["NOT_REAL".into()]).resolve();
        assert!(matches!(result, Err(ConfigError::UnknownIntent { name }) if name == "NOT_REAL"));
    }

    #[test]
    fn test_defaults() {
        let config = GatewayConfig::new("token", Intents::GUILDS);
        assert_eq!(config.spawn_attempt_delay, Duration::from_millis(2500));
        assert_eq!(config.spawn_max_attempts, 10);
        assert_eq!(config.spawn_timeout, Duration::from_millis(30_000));
        assert_eq!(config.version, 10);
    }

    #[test]
    fn test_large_guild_threshold_clamped() {
        let config = GatewayConfig::new("token", Intents::GUILDS).with_large_guild_threshold(10);
        assert_eq!(config.clamped_large_guild_threshold(), 50);

        let config = GatewayConfig::new("token", Intents::GUILDS).with_large_guild_threshold(255);
        assert_eq!(config.clamped_large_guild_threshold(), 250);

        let config = GatewayConfig::new("token", Intents::GUILDS).with_large_guild_threshold(250);
        assert_eq!(config.clamped_large_guild_threshold(), 250);
    }
}
