//! Presence types, shared by the outgoing presence-update command and the
//! PRESENCE_UPDATE dispatch.

use crate::snowflake::Snowflake;
use crate::user::PartialUser;
use serde::{Deserialize, Serialize};

/// User status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    /// Online.
    #[default]
    Online,
    /// Do Not Disturb.
    Dnd,
    /// Away / Idle.
    Idle,
    /// Invisible (shown as offline).
    Invisible,
    /// Offline.
    Offline,
}

/// Activity type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "u8", into = "u8")]
pub enum ActivityType {
    /// Playing {name}
    Playing,
    /// Streaming {name}
    Streaming,
    /// Listening to {name}
    Listening,
    /// Watching {name}
    Watching,
    /// {emoji} {name}
    Custom,
    /// Competing in {name}
    Competing,
}

impl From<u8> for ActivityType {
    fn from(value: u8) -> Self {
        match value {
            0 => ActivityType::Playing,
            1 => ActivityType::Streaming,
            2 => ActivityType::Listening,
            3 => ActivityType::Watching,
            4 => ActivityType::Custom,
            5 => ActivityType::Competing,
            _ => ActivityType::Playing,
        }
    }
}

impl From<ActivityType> for u8 {
    fn from(value: ActivityType) -> Self {
        match value {
            ActivityType::Playing => 0,
            ActivityType::Streaming => 1,
            ActivityType::Listening => 2,
            ActivityType::Watching => 3,
            ActivityType::Custom => 4,
            ActivityType::Competing => 5,
        }
    }
}

/// Activity for presence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Activity {
    /// Activity name.
    pub name: String,

    /// Activity type.
    #[serde(rename = "type")]
    pub activity_type: ActivityType,

    /// Stream URL (only for Streaming type).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

/// Presence payload sent with Identify or the presence-update command.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PresenceUpdate {
    /// Unix timestamp (milliseconds) of when the client went idle.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub since: Option<u64>,

    /// User's activities.
    pub activities: Vec<Activity>,

    /// User's status.
    pub status: Status,

    /// Whether the client is AFK.
    pub afk: bool,
}

impl Default for PresenceUpdate {
    fn default() -> Self {
        Self {
            since: None,
            activities: Vec::new(),
            status: Status::Online,
            afk: false,
        }
    }
}

/// Per-platform status carried in PRESENCE_UPDATE.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct ClientStatus {
    #[serde(default)]
    pub desktop: Option<String>,
    #[serde(default)]
    pub mobile: Option<String>,
    #[serde(default)]
    pub web: Option<String>,
}

/// The PRESENCE_UPDATE dispatch payload.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Presence {
    /// The user the presence belongs to. Only the ID is guaranteed.
    pub user: PartialUser,
    #[serde(default)]
    pub guild_id: Option<Snowflake>,
    #[serde(default)]
    pub status: Option<Status>,
    #[serde(default)]
    pub activities: Vec<Activity>,
    #[serde(default)]
    pub client_status: Option<ClientStatus>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_encoding() {
        assert_eq!(serde_json::to_string(&Status::Dnd).unwrap(), r#""dnd""#);
        let status: Status = serde_json::from_str(r#""idle""#).unwrap();
        assert_eq!(status, Status::Idle);
    }

    #[test]
    fn test_presence_decoding() {
        let json = r#"{"user":{"id":"7"},"guild_id":"9","status":"online","activities":[]}"#;
        let presence: Presence = serde_json::from_str(json).unwrap();
        assert_eq!(presence.user.id, Snowflake::new(7));
        assert_eq!(presence.status, Some(Status::Online));
    }
}
