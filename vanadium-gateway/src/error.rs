//! Gateway error types using thiserror.
//!
//! Shard-level and fleet-level failures are kept in separate enums so a
//! caller can tell which subsystem produced an error.

use thiserror::Error;
use vanadium_http::RestError;

/// Errors produced by a single shard.
#[derive(Debug, Error)]
pub enum ShardError {
    /// `spawn()` was called while the shard was not disconnected.
    #[error("shard is already connecting or connected")]
    AlreadyConnecting,

    /// A pending spawn or resume was interrupted by `kill()`.
    #[error("spawn or resume interrupted by kill")]
    InterruptFromKill,

    /// The socket closed in the middle of the connect handshake.
    #[error("socket closed during initialization (code {code}): {reason}")]
    ClosedDuringSocketInit {
        /// WebSocket close code, 0 when the stream just ended.
        code: u16,
        /// Close reason.
        reason: String,
    },

    /// Every allowed spawn attempt failed.
    #[error("all {attempts} spawn attempts failed")]
    MaxSpawnAttemptsReached {
        /// Number of attempts made.
        attempts: u32,
    },

    /// A queued send was cancelled because the queue was force-flushed.
    #[error("queued send cancelled by force flush")]
    SendQueueForceFlushed,

    /// A send was attempted with no open socket.
    #[error("cannot send without an open socket")]
    SendWithoutOpenSocket,

    /// The gateway invalidated the session.
    #[error("session invalidated by the gateway (resumable: {resumable})")]
    SessionInvalidated {
        /// Whether the session can be resumed.
        resumable: bool,
    },

    /// The gateway did not complete the handshake within the spawn timeout.
    #[error("timed out waiting for the gateway handshake")]
    HandshakeTimeout,

    /// The gateway closed the connection with a code that reconnecting
    /// cannot recover from (bad token, bad intents, bad shard config).
    #[error("fatal close code {code}: {reason}")]
    FatalClose {
        /// WebSocket close code.
        code: u16,
        /// Close reason.
        reason: String,
    },

    /// WebSocket connection or protocol error.
    #[error("websocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    /// Failed to decode a gateway frame.
    #[error("payload decode error: {0}")]
    PayloadDecode(#[from] serde_json::Error),

    /// URL parsing error.
    #[error("url parse error: {0}")]
    UrlParse(#[from] url::ParseError),
}

/// Errors produced by the fleet coordinator.
#[derive(Debug, Error)]
pub enum FleetError {
    /// `connect()` was called on a fleet that is already running.
    #[error("fleet is already connected")]
    AlreadyConnected,

    /// The fleet has not been connected yet, or was shut down.
    #[error("fleet is not connected")]
    NotConnected,

    /// A guild resolved to a shard this fleet does not own.
    #[error("shard {shard_id} is not managed by this fleet")]
    NoShard {
        /// The shard the guild hashes to.
        shard_id: u16,
    },

    /// A member-fetch nonce exceeded the 32 byte limit.
    #[error("member fetch nonce exceeds 32 bytes")]
    MemberNonceTooBig,

    /// `GET /gateway/bot` returned something unusable.
    #[error("invalid response from the gateway bot endpoint")]
    InvalidRestResponse(#[source] RestError),

    /// The configured shard window does not fit in the total shard count.
    #[error(
        "invalid shard config: offset {offset} + shards {shards} exceeds total {total_shards}"
    )]
    InvalidShardConfig {
        /// Configured first shard id.
        offset: u16,
        /// Configured local shard count.
        shards: u16,
        /// Fleet-wide shard count.
        total_shards: u16,
    },

    /// Not enough session starts remain to spawn the fleet.
    #[error("session start limit reached: {remaining} remaining, {required} required")]
    SessionStartLimitReached {
        /// Session starts remaining in the window.
        remaining: u32,
        /// Session starts this fleet needs.
        required: u32,
    },

    /// The fleet was shut down while an operation was pending.
    #[error("fleet shut down")]
    Shutdown,

    /// A shard-level failure.
    #[error(transparent)]
    Shard(#[from] ShardError),

    /// A REST failure.
    #[error(transparent)]
    Rest(#[from] RestError),

    /// A configuration failure.
    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// Gateway configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A named intent did not match any known intent.
    #[error("unknown intent name: {name}")]
    UnknownIntent {
        /// The offending name.
        name: String,
    },
}

/// Discord Gateway close codes.
///
/// See: <https://discord.com/developers/docs/topics/opcodes-and-status-codes#gateway-gateway-close-event-codes>
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum CloseCode {
    /// Unknown error occurred.
    UnknownError = 4000,
    /// Invalid opcode sent.
    UnknownOpcode = 4001,
    /// Invalid payload (decode error).
    DecodeError = 4002,
    /// Payload sent before identifying.
    NotAuthenticated = 4003,
    /// Invalid token.
    AuthenticationFailed = 4004,
    /// Already authenticated.
    AlreadyAuthenticated = 4005,
    /// Invalid sequence number for resume.
    InvalidSeq = 4007,
    /// Rate limited.
    RateLimited = 4008,
    /// Session timed out.
    SessionTimedOut = 4009,
    /// Invalid shard configuration.
    InvalidShard = 4010,
    /// Too many guilds (sharding required).
    ShardingRequired = 4011,
    /// Invalid API version.
    InvalidApiVersion = 4012,
    /// Invalid intents.
    InvalidIntents = 4013,
    /// Disallowed intents (privileged intent not enabled).
    DisallowedIntents = 4014,
}

impl CloseCode {
    /// Returns whether reconnection is possible after this close code.
    pub const fn can_reconnect(self) -> bool {
        !matches!(
            self,
            CloseCode::AuthenticationFailed
                | CloseCode::InvalidShard
                | CloseCode::ShardingRequired
                | CloseCode::InvalidApiVersion
                | CloseCode::InvalidIntents
                | CloseCode::DisallowedIntents
        )
    }

    /// Try to convert a u16 close code to this enum.
    pub fn from_code(code: u16) -> Option<Self> {
        match code {
            4000 => Some(CloseCode::UnknownError),
            4001 => Some(CloseCode::UnknownOpcode),
            4002 => Some(CloseCode::DecodeError),
            4003 => Some(CloseCode::NotAuthenticated),
            4004 => Some(CloseCode::AuthenticationFailed),
            4005 => Some(CloseCode::AlreadyAuthenticated),
            4007 => Some(CloseCode::InvalidSeq),
            4008 => Some(CloseCode::RateLimited),
            4009 => Some(CloseCode::SessionTimedOut),
            4010 => Some(CloseCode::InvalidShard),
            4011 => Some(CloseCode::ShardingRequired),
            4012 => Some(CloseCode::InvalidApiVersion),
            4013 => Some(CloseCode::InvalidIntents),
            4014 => Some(CloseCode::DisallowedIntents),
            _ => None,
        }
    }

    /// Whether a raw close code allows reconnecting; unknown codes do.
    pub fn code_allows_reconnect(code: u16) -> bool {
        Self::from_code(code).map_or(true, Self::can_reconnect)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_close_code_classification() {
        assert!(CloseCode::code_allows_reconnect(4000));
        assert!(CloseCode::code_allows_reconnect(4009));
        assert!(CloseCode::code_allows_reconnect(1006));
        assert!(!CloseCode::code_allows_reconnect(4004));
        assert!(!CloseCode::code_allows_reconnect(4014));
    }
}
