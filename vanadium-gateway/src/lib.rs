//! Vanadium Gateway - Discord Gateway WebSocket client
#![deny(unsafe_code)]
//!
//! This crate maintains persistent, identified gateway sessions for a
//! bot: per-shard WebSocket state machines with heartbeating, session
//! resumption, and ordered dispatch fan-out, plus a fleet coordinator
//! that spawns shards in identify buckets and routes commands to the
//! shard owning a guild.
//!
//! # Example
//!
//! ```ignore
//! use vanadium_gateway::{Fleet, GatewayConfig};
//! use vanadium_http::{RestClient, RestConfig};
//! use vanadium_model::Intents;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let rest = Arc::new(RestClient::new(RestConfig::new("your-token"))?);
//!     let (fleet, events) = Fleet::new(
//!         GatewayConfig::new("your-token", Intents::GUILDS),
//!         rest,
//!     );
//!     fleet.connect().await?;
//!
//!     while let Ok((shard_id, event)) = events.recv_async().await {
//!         println!("shard {}: {:?}", shard_id, event);
//!     }
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod fleet;
pub mod heartbeat;
mod opcode;
mod payload;
mod shard;

// Public re-exports
pub use config::{GatewayConfig, IntentsInput, ShardingConfig};
pub use error::{CloseCode, ConfigError, FleetError, ShardError};
pub use fleet::{
    DispatchHook, Fleet, FleetStartup, MemberChunks, MemberRequestOptions, ShardTarget,
    MEMBER_NONCE_MAX_BYTES, SHARD_SPAWN_COOLDOWN,
};
pub use heartbeat::Heartbeats;
pub use opcode::OpCode;
pub use payload::{
    create_heartbeat_payload, ConnectionProperties, GatewayPayload, HelloPayload, IdentifyPayload,
    RawGatewayPayload, RequestGuildMembersPayload, ResumePayload, VoiceStateUpdatePayload,
};
pub use shard::{Shard, ShardConfig, ShardEvent, ShardState};

/// Discord Gateway API version used by this library.
pub const GATEWAY_VERSION: u8 = 10;

/// Default gateway URL (overridden by the /gateway/bot response).
pub const DEFAULT_GATEWAY_URL: &str = "wss://gateway.discord.gg";
