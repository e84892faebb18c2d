//! Gateway payload structures.
//!
//! These structures represent the JSON payloads sent and received over the
//! Gateway WebSocket.

use crate::opcode::OpCode;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use vanadium_model::{Intents, PresenceUpdate, Snowflake};

/// A raw Gateway frame for initial parsing; `d` stays untyped until the
/// opcode is known.
#[derive(Debug, Deserialize)]
pub struct RawGatewayPayload {
    /// Opcode for the payload.
    pub op: OpCode,

    /// Event data.
    #[serde(default)]
    pub d: Option<Value>,

    /// Sequence number (for Dispatch events).
    #[serde(default)]
    pub s: Option<u64>,

    /// Event name (for Dispatch events).
    #[serde(default)]
    pub t: Option<String>,
}

/// A fully formed outbound Gateway payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayPayload<D> {
    /// Opcode for the payload.
    pub op: OpCode,

    /// Event data.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub d: Option<D>,
}

impl<D: Serialize> GatewayPayload<D> {
    /// Create a new payload with only opcode and data.
    pub fn new(op: OpCode, data: D) -> Self {
        Self { op, d: Some(data) }
    }
}

// ============================================================================
// Hello Payload (Received after connection)
// ============================================================================

/// Payload for the Hello opcode (op 10).
///
/// Received immediately after connecting to the Gateway.
#[derive(Debug, Clone, Deserialize)]
pub struct HelloPayload {
    /// Interval (in milliseconds) at which to send heartbeats.
    pub heartbeat_interval: u64,
}

// ============================================================================
// Identify Payload (Sent to authenticate)
// ============================================================================

/// Payload for the Identify opcode (op 2).
///
/// Sent to authenticate and start a new session.
#[derive(Debug, Clone, Serialize)]
pub struct IdentifyPayload<'a> {
    /// Authentication token.
    pub token: &'a str,

    /// Gateway intents.
    pub intents: Intents,

    /// Connection properties.
    pub properties: ConnectionProperties<'a>,

    /// Whether to enable payload compression.
    pub compress: bool,

    /// Threshold for large guilds (50-250).
    pub large_threshold: u8,

    /// Shard information: [shard_id, total_shards].
    pub shard: [u16; 2],

    /// Initial presence.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub presence: Option<&'a PresenceUpdate>,
}

/// Connection properties sent with Identify.
#[derive(Debug, Clone, Serialize)]
pub struct ConnectionProperties<'a> {
    /// Operating system.
    pub os: &'a str,

    /// Library name.
    pub browser: &'a str,

    /// Library name (again, for device).
    pub device: &'a str,
}

impl Default for ConnectionProperties<'_> {
    fn default() -> Self {
        Self {
            os: std::env::consts::OS,
            browser: "vanadium-rs",
            device: "vanadium-rs",
        }
    }
}

// ============================================================================
// Resume Payload (Sent to resume a session)
// ============================================================================

/// Payload for the Resume opcode (op 6).
#[derive(Debug, Clone, Serialize)]
pub struct ResumePayload<'a> {
    /// Authentication token.
    pub token: &'a str,

    /// Session ID from the previous Ready event.
    pub session_id: &'a str,

    /// Last sequence number received.
    pub seq: u64,
}

// ============================================================================
// Request Guild Members Payload
// ============================================================================

/// Payload for the RequestGuildMembers opcode (op 8).
#[derive(Debug, Clone, Serialize)]
pub struct RequestGuildMembersPayload {
    /// Guild to fetch members for.
    pub guild_id: Snowflake,

    /// Prefix the returned usernames must match; `""` matches everyone.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub query: Option<String>,

    /// Maximum members to return; `0` with an empty query returns all.
    pub limit: u32,

    /// Whether to include presences (requires the presences intent).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub presences: Option<bool>,

    /// Specific users to fetch, instead of a query.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_ids: Option<Vec<Snowflake>>,

    /// Correlation nonce echoed back in each chunk (at most 32 bytes).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nonce: Option<String>,
}

// ============================================================================
// Voice State Update Payload
// ============================================================================

/// Payload for the VoiceStateUpdate opcode (op 4).
#[derive(Debug, Clone, Serialize)]
pub struct VoiceStateUpdatePayload {
    pub guild_id: Snowflake,
    /// `None` disconnects from voice.
    pub channel_id: Option<Snowflake>,
    pub self_mute: bool,
    pub self_deaf: bool,
}

// ============================================================================
// Heartbeat Payload
// ============================================================================

/// Create a Heartbeat payload.
///
/// The heartbeat payload is just the sequence number (or null if no events received).
pub fn create_heartbeat_payload(sequence: Option<u64>) -> String {
    match sequence {
        Some(seq) => format!(r#"{{"op":1,"d":{seq}}}"#),
        None => r#"{"op":1,"d":null}"#.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hello_payload() {
        let json = r#"{"heartbeat_interval": 41250}"#;
        let payload: HelloPayload = serde_json::from_str(json).unwrap();
        assert_eq!(payload.heartbeat_interval, 41250);
    }

    #[test]
    fn test_identify_serialization() {
        let identify = IdentifyPayload {
            token: "test_token",
            intents: Intents::GUILDS | Intents::GUILD_MESSAGES,
            properties: ConnectionProperties::default(),
            compress: false,
            large_threshold: 50,
            shard: [0, 1],
            presence: None,
        };
        let payload = GatewayPayload::new(OpCode::Identify, &identify);

        let json = serde_json::to_string(&payload).unwrap();
        assert!(json.contains(r#""op":2"#));
        assert!(json.contains("test_token"));
        assert!(json.contains(r#""shard":[0,1]"#));
        assert!(json.contains(r#""compress":false"#));
    }

    #[test]
    fn test_heartbeat_payload() {
        let payload = create_heartbeat_payload(Some(42));
        assert_eq!(payload, r#"{"op":1,"d":42}"#);

        let payload_null = create_heartbeat_payload(None);
        assert_eq!(payload_null, r#"{"op":1,"d":null}"#);
    }

    #[test]
    fn test_raw_payload_parsing() {
        let json = r#"{"op":0,"d":{"a":1},"s":7,"t":"MESSAGE_CREATE"}"#;
        let raw: RawGatewayPayload = serde_json::from_str(json).unwrap();
        assert_eq!(raw.op, OpCode::Dispatch);
        assert_eq!(raw.s, Some(7));
        assert_eq!(raw.t.as_deref(), Some("MESSAGE_CREATE"));
    }
}
