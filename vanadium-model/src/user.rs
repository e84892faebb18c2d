use crate::snowflake::Snowflake;
use serde::{Deserialize, Serialize};

/// Discord User representation.
///
/// Gateway payloads routinely carry partial users, so every field other
/// than the ID is optional or defaulted.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct User {
    /// User ID.
    pub id: Snowflake,
    /// Username (not unique per se post-pomelo).
    #[serde(default)]
    pub username: Option<String>,
    /// User's 4-digit Discord tag (deprecated, "0" for pomelo users).
    #[serde(default)]
    pub discriminator: Option<String>,
    /// User's display name.
    #[serde(default)]
    pub global_name: Option<String>,
    /// Avatar hash.
    #[serde(default)]
    pub avatar: Option<String>,
    /// Whether the user is a bot.
    #[serde(default)]
    pub bot: Option<bool>,
    /// Whether the user is a system user.
    #[serde(default)]
    pub system: Option<bool>,
    /// Banner hash.
    #[serde(default)]
    pub banner: Option<String>,
    /// Banner color as integer.
    #[serde(default)]
    pub accent_color: Option<u32>,
    /// User's locale.
    #[serde(default)]
    pub locale: Option<String>,
    /// User flags.
    #[serde(default)]
    pub flags: Option<u64>,
    /// Public flags on the user.
    #[serde(default)]
    pub public_flags: Option<u64>,
}

/// Partial user carried inside presence updates.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PartialUser {
    pub id: Snowflake,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_user_decoding() {
        let json = r#"{"id":"42","username":"bot"}"#;
        let user: User = serde_json::from_str(json).unwrap();
        assert_eq!(user.id, Snowflake::new(42));
        assert_eq!(user.username.as_deref(), Some("bot"));
        assert!(user.avatar.is_none());
    }
}
