use crate::snowflake::Snowflake;
use serde::{Deserialize, Serialize};

/// Voice connection state of a user; also the VOICE_STATE_UPDATE payload.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct VoiceState {
    #[serde(default)]
    pub guild_id: Option<Snowflake>,
    /// Channel the user is connected to; null means disconnected.
    #[serde(default)]
    pub channel_id: Option<Snowflake>,
    pub user_id: Snowflake,
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default)]
    pub deaf: Option<bool>,
    #[serde(default)]
    pub mute: Option<bool>,
    #[serde(default)]
    pub self_deaf: Option<bool>,
    #[serde(default)]
    pub self_mute: Option<bool>,
    #[serde(default)]
    pub self_stream: Option<bool>,
    #[serde(default)]
    pub self_video: Option<bool>,
    #[serde(default)]
    pub suppress: Option<bool>,
}

/// A live stage inside a stage channel.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct StageInstance {
    pub id: Snowflake,
    pub guild_id: Snowflake,
    pub channel_id: Snowflake,
    #[serde(default)]
    pub topic: Option<String>,
    #[serde(default)]
    pub privacy_level: Option<u8>,
}
