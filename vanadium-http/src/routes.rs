//! Typed response bodies for the endpoints this crate calls itself.

use serde::{Deserialize, Serialize};

/// Response of `GET /gateway/bot`.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct GatewayBot {
    /// WebSocket URL to connect shards to.
    pub url: String,
    /// Recommended number of shards.
    pub shards: u16,
    /// Session start limit information.
    pub session_start_limit: SessionStartLimit,
}

/// How many sessions the bot may start.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SessionStartLimit {
    /// Total sessions allowed per window.
    pub total: u32,
    /// Sessions remaining in the current window.
    pub remaining: u32,
    /// Milliseconds until the limit resets.
    pub reset_after: u64,
    /// How many shards may identify concurrently per 5 seconds.
    pub max_concurrency: u16,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gateway_bot_decoding() {
        let json = r#"{
            "url": "wss://gateway.discord.gg",
            "shards": 9,
            "session_start_limit": {
                "total": 1000,
                "remaining": 999,
                "reset_after": 14400000,
                "max_concurrency": 1
            }
        }"#;

        let info: GatewayBot = serde_json::from_str(json).unwrap();
        assert_eq!(info.shards, 9);
        assert_eq!(info.session_start_limit.max_concurrency, 1);
    }
}
