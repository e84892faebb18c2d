use crate::snowflake::Snowflake;
use serde::{Deserialize, Serialize};

/// Guild scheduled event.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ScheduledEvent {
    pub id: Snowflake,
    pub guild_id: Snowflake,
    #[serde(default)]
    pub channel_id: Option<Snowflake>,
    #[serde(default)]
    pub creator_id: Option<Snowflake>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub scheduled_start_time: Option<String>,
    #[serde(default)]
    pub scheduled_end_time: Option<String>,
    #[serde(default)]
    pub status: Option<u8>,
    #[serde(default)]
    pub entity_type: Option<u8>,
    #[serde(default)]
    pub user_count: Option<u32>,
}
