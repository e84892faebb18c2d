//! Fleet coordination for multi-shard deployments.
//!
//! The fleet fetches connection metadata from the REST API, computes
//! which slice of the shard space this process owns, spawns shards in
//! identify buckets (`shard_id % max_concurrency`, with a cooldown
//! between buckets), and aggregates every shard's event stream into one
//! channel tagged with the shard id. Commands (presence updates, member
//! requests, voice state) are routed to the shard that owns the target
//! guild by snowflake hashing.

use crate::config::GatewayConfig;
use crate::error::{FleetError, ShardError};
use crate::opcode::OpCode;
use crate::payload::{GatewayPayload, RequestGuildMembersPayload, VoiceStateUpdatePayload};
use crate::shard::{Shard, ShardConfig, ShardEvent, ShardState};

use dashmap::DashMap;
use flume::{Receiver, Sender};
use futures_util::future::join_all;
use parking_lot::{Mutex, RwLock};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::time::sleep;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use vanadium_http::{RestClient, RestError};
use vanadium_model::{Dispatch, GuildMember, GuildMembersChunk, Presence, PresenceUpdate, Snowflake, User};

/// Cooldown between identify buckets.
pub const SHARD_SPAWN_COOLDOWN: Duration = Duration::from_secs(5);

/// Longest accepted member-fetch nonce, in bytes.
pub const MEMBER_NONCE_MAX_BYTES: usize = 32;

/// Observer invoked for every dispatch before external fan-out; this is
/// where a cache projection plugs in.
pub type DispatchHook = Arc<dyn Fn(u16, &Dispatch) + Send + Sync>;

/// Which shards a command should go to.
#[derive(Debug, Clone)]
pub enum ShardTarget {
    /// A single shard id.
    One(u16),
    /// A list of shard ids.
    Many(Vec<u16>),
    /// All locally owned shards.
    All,
}

/// Resolved shard slice for this process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct ShardPlan {
    /// Fleet-wide shard count advertised in identify.
    total: u16,
    /// First locally owned shard id.
    offset: u16,
    /// Locally owned shard count.
    count: u16,
}

/// Result of [`Fleet::connect`].
#[derive(Debug)]
pub struct FleetStartup {
    /// Shards that reached READY.
    pub successful: Vec<u16>,
    /// Shards that exhausted their spawn attempts, with the final error.
    pub failed: Vec<(u16, ShardError)>,
}

/// Accumulated result of a guild member request.
#[derive(Debug, Default)]
pub struct MemberChunks {
    /// Members across all chunks.
    pub members: Vec<GuildMember>,
    /// Presences, when requested with the presences intent.
    pub presences: Vec<Presence>,
    /// Requested user ids that were not found.
    pub not_found: Vec<Snowflake>,
}

/// Options for [`Fleet::fetch_guild_members`].
#[derive(Debug, Clone, Default)]
pub struct MemberRequestOptions {
    /// Username prefix filter; `None` requests all members.
    pub query: Option<String>,
    /// Maximum members to return; 0 means no limit.
    pub limit: u32,
    /// Fetch these specific users instead of a query.
    pub user_ids: Vec<Snowflake>,
    /// Include presences (requires the presences intent).
    pub presences: bool,
    /// Correlation nonce; generated when absent. At most 32 bytes.
    pub nonce: Option<String>,
}

/// Accumulates GUILD_MEMBERS_CHUNK dispatches for one nonce.
struct ChunkCollector {
    members: Mutex<Vec<GuildMember>>,
    presences: Mutex<Vec<Presence>>,
    not_found: Mutex<Vec<Snowflake>>,
    done: Mutex<Option<oneshot::Sender<MemberChunks>>>,
}

impl ChunkCollector {
    fn new(done: oneshot::Sender<MemberChunks>) -> Self {
        Self {
            members: Mutex::new(Vec::new()),
            presences: Mutex::new(Vec::new()),
            not_found: Mutex::new(Vec::new()),
            done: Mutex::new(Some(done)),
        }
    }

    fn absorb(&self, chunk: &GuildMembersChunk) {
        self.members.lock().extend(chunk.members.iter().cloned());
        self.presences.lock().extend(chunk.presences.iter().cloned());
        self.not_found.lock().extend(chunk.not_found.iter().copied());
    }

    fn finish(&self) {
        if let Some(done) = self.done.lock().take() {
            let _ = done.send(MemberChunks {
                members: std::mem::take(&mut *self.members.lock()),
                presences: std::mem::take(&mut *self.presences.lock()),
                not_found: std::mem::take(&mut *self.not_found.lock()),
            });
        }
    }
}

/// A fleet of gateway shards.
///
/// # Example
///
/// ```ignore
/// use vanadium_gateway::{Fleet, GatewayConfig};
/// use vanadium_http::{RestClient, RestConfig};
/// use vanadium_model::Intents;
/// use std::sync::Arc;
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let rest = Arc::new(RestClient::new(RestConfig::new("your-token"))?);
///     let config = GatewayConfig::new("your-token", Intents::GUILDS);
///
///     let (fleet, events) = Fleet::new(config, rest);
///     fleet.connect().await?;
///
///     while let Ok((shard_id, event)) = events.recv_async().await {
///         println!("shard {}: {:?}", shard_id, event);
///     }
///     Ok(())
/// }
/// ```
pub struct Fleet {
    inner: Arc<FleetInner>,
}

struct FleetInner {
    /// Fleet configuration.
    config: GatewayConfig,

    /// REST client, used for `GET /gateway/bot`.
    rest: Arc<RestClient>,

    /// Locally owned shards.
    shards: DashMap<u16, Arc<Shard>>,

    /// Resolved shard slice, present once connected.
    plan: RwLock<Option<ShardPlan>>,

    /// The bot's own user, from the first READY.
    user: RwLock<Option<User>>,

    /// Aggregated event fan-out.
    event_tx: Sender<(u16, ShardEvent)>,

    /// Pre-fan-out dispatch observer (cache projection).
    hook: RwLock<Option<DispatchHook>>,

    /// In-flight member requests by nonce.
    pending_chunks: DashMap<String, Arc<ChunkCollector>>,

    /// Per-shard event forwarding tasks.
    forwarders: Mutex<Vec<JoinHandle<()>>>,

    /// Whether `connect()` has run.
    started: AtomicBool,
}

impl Fleet {
    /// Create a new fleet.
    ///
    /// Returns the fleet and a receiver of `(shard_id, event)` pairs
    /// aggregated across all shards.
    pub fn new(config: GatewayConfig, rest: Arc<RestClient>) -> (Self, Receiver<(u16, ShardEvent)>) {
        let (event_tx, event_rx) = flume::unbounded();

        let fleet = Self {
            inner: Arc::new(FleetInner {
                config,
                rest,
                shards: DashMap::new(),
                plan: RwLock::new(None),
                user: RwLock::new(None),
                event_tx,
                hook: RwLock::new(None),
                pending_chunks: DashMap::new(),
                forwarders: Mutex::new(Vec::new()),
                started: AtomicBool::new(false),
            }),
        };

        (fleet, event_rx)
    }

    /// Register an observer that sees every dispatch before external
    /// subscribers. Must be installed before [`connect`](Self::connect).
    pub fn set_dispatch_hook(&self, hook: DispatchHook) {
        *self.inner.hook.write() = Some(hook);
    }

    /// Fetch gateway metadata, spawn all locally owned shards in
    /// identify buckets, and return which spawned and which failed.
    ///
    /// # Errors
    ///
    /// Returns [`FleetError::AlreadyConnected`] on a second call,
    /// [`FleetError::InvalidRestResponse`] when `GET /gateway/bot` is
    /// malformed, [`FleetError::InvalidShardConfig`] when the configured
    /// shard window does not fit, and
    /// [`FleetError::SessionStartLimitReached`] when too few session
    /// starts remain.
    pub async fn connect(&self) -> Result<FleetStartup, FleetError> {
        if self.inner.started.swap(true, Ordering::AcqRel) {
            return Err(FleetError::AlreadyConnected);
        }

        let result = self.connect_inner().await;
        if result.is_err() {
            // A failed setup leaves the fleet reusable.
            self.inner.started.store(false, Ordering::Release);
        }
        result
    }

    async fn connect_inner(&self) -> Result<FleetStartup, FleetError> {
        let intents = self.inner.config.intents.resolve()?;

        let info = self.inner.rest.get_gateway_bot().await.map_err(|error| match error {
            RestError::UnableToParseResponseBody(_) => FleetError::InvalidRestResponse(error),
            other => FleetError::Rest(other),
        })?;

        let plan = resolve_plan(&self.inner.config.sharding, info.shards)?;

        if info.session_start_limit.remaining < u32::from(plan.count) {
            return Err(FleetError::SessionStartLimitReached {
                remaining: info.session_start_limit.remaining,
                required: u32::from(plan.count),
            });
        }

        *self.inner.plan.write() = Some(plan);

        info!(
            total = plan.total,
            offset = plan.offset,
            count = plan.count,
            max_concurrency = info.session_start_limit.max_concurrency,
            "starting fleet"
        );

        // Create all shards and their event forwarders up front.
        let mut created: Vec<(u16, Arc<Shard>)> = Vec::with_capacity(usize::from(plan.count));
        for shard_id in plan.offset..plan.offset + plan.count {
            let shard_config = ShardConfig {
                token: self.inner.config.token.clone(),
                intents,
                gateway_url: info.url.clone(),
                large_threshold: self.inner.config.clamped_large_guild_threshold(),
                presence: self.inner.config.presence.clone(),
                spawn_attempt_delay: self.inner.config.spawn_attempt_delay,
                spawn_max_attempts: self.inner.config.spawn_max_attempts,
                spawn_timeout: self.inner.config.spawn_timeout,
                version: self.inner.config.version,
            };

            let (shard_tx, shard_rx) = flume::unbounded();
            let shard = Arc::new(Shard::new(shard_id, plan.total, shard_config, shard_tx));

            let inner = self.inner.clone();
            let handle = tokio::spawn(async move {
                while let Ok(event) = shard_rx.recv_async().await {
                    if let ShardEvent::Dispatch(dispatch) = &event {
                        inner.handle_dispatch(shard_id, dispatch);
                    }
                    if inner.event_tx.send_async((shard_id, event)).await.is_err() {
                        break;
                    }
                }
            });
            self.inner.forwarders.lock().push(handle);

            self.inner.shards.insert(shard_id, shard.clone());
            created.push((shard_id, shard));
        }

        // Spawn in identify buckets; shards in a bucket identify in
        // parallel, buckets are separated by the cooldown.
        let buckets = group_buckets(plan, info.session_start_limit.max_concurrency);
        let mut successful = Vec::new();
        let mut failed = Vec::new();
        let mut first = true;

        for (bucket_id, ids) in buckets {
            if !first {
                debug!(bucket = bucket_id, "waiting identify cooldown");
                sleep(SHARD_SPAWN_COOLDOWN).await;
            }
            first = false;

            let spawns = created
                .iter()
                .filter(|(id, _)| ids.contains(id))
                .map(|(id, shard)| {
                    let id = *id;
                    let shard = shard.clone();
                    async move { (id, shard.spawn().await) }
                });

            for (shard_id, result) in join_all(spawns).await {
                match result {
                    Ok(_ready) => successful.push(shard_id),
                    Err(error) => {
                        warn!(shard_id, error = %error, "shard failed to spawn");
                        failed.push((shard_id, error));
                    }
                }
            }
        }

        info!(
            successful = successful.len(),
            failed = failed.len(),
            "fleet ready"
        );

        Ok(FleetStartup { successful, failed })
    }

    /// Which shard (fleet-wide) owns a guild: `(id >> 22) % total`.
    ///
    /// # Errors
    ///
    /// Returns [`FleetError::NotConnected`] before [`connect`](Self::connect).
    pub fn guild_shard(&self, guild_id: Snowflake) -> Result<u16, FleetError> {
        let plan = (*self.inner.plan.read()).ok_or(FleetError::NotConnected)?;
        Ok(guild_id.shard_id(plan.total))
    }

    /// The locally owned shard responsible for a guild.
    ///
    /// # Errors
    ///
    /// Returns [`FleetError::NoShard`] when the guild hashes to a shard
    /// outside this fleet's slice.
    pub fn shard_for_guild(&self, guild_id: Snowflake) -> Result<Arc<Shard>, FleetError> {
        let shard_id = self.guild_shard(guild_id)?;
        self.inner
            .shards
            .get(&shard_id)
            .map(|entry| entry.clone())
            .ok_or(FleetError::NoShard { shard_id })
    }

    /// A locally owned shard by id.
    pub fn shard(&self, shard_id: u16) -> Option<Arc<Shard>> {
        self.inner.shards.get(&shard_id).map(|entry| entry.clone())
    }

    /// All locally owned shard ids.
    pub fn shard_ids(&self) -> Vec<u16> {
        let mut ids: Vec<u16> = self.inner.shards.iter().map(|entry| *entry.key()).collect();
        ids.sort_unstable();
        ids
    }

    /// The state of a shard.
    pub fn shard_state(&self, shard_id: u16) -> Option<ShardState> {
        self.inner.shards.get(&shard_id).map(|entry| entry.state())
    }

    /// The last measured heartbeat latency of a shard.
    pub fn shard_latency(&self, shard_id: u16) -> Option<Duration> {
        self.inner.shards.get(&shard_id).and_then(|entry| entry.latency())
    }

    /// The bot's own user, once the first shard reached READY.
    pub fn user(&self) -> Option<User> {
        self.inner.user.read().clone()
    }

    /// Request members for a guild over the gateway and collect every
    /// matching chunk.
    ///
    /// A random nonce correlates the chunks unless one is provided.
    ///
    /// # Errors
    ///
    /// Returns [`FleetError::MemberNonceTooBig`] for nonces over 32
    /// bytes, and routing errors per [`shard_for_guild`](Self::shard_for_guild).
    pub async fn fetch_guild_members(
        &self,
        guild_id: Snowflake,
        options: MemberRequestOptions,
    ) -> Result<MemberChunks, FleetError> {
        let nonce = options.nonce.clone().unwrap_or_else(random_nonce);
        if nonce.len() > MEMBER_NONCE_MAX_BYTES {
            return Err(FleetError::MemberNonceTooBig);
        }

        let shard = self.shard_for_guild(guild_id)?;

        let (done_tx, done_rx) = oneshot::channel();
        self.inner
            .pending_chunks
            .insert(nonce.clone(), Arc::new(ChunkCollector::new(done_tx)));

        let payload = GatewayPayload::new(
            OpCode::RequestGuildMembers,
            RequestGuildMembersPayload {
                guild_id,
                query: if options.user_ids.is_empty() {
                    Some(options.query.clone().unwrap_or_default())
                } else {
                    options.query.clone()
                },
                limit: options.limit,
                presences: options.presences.then_some(true),
                user_ids: (!options.user_ids.is_empty()).then(|| options.user_ids.clone()),
                nonce: Some(nonce.clone()),
            },
        );

        if let Err(error) = shard.send(&payload, false).await {
            self.inner.pending_chunks.remove(&nonce);
            return Err(error.into());
        }

        done_rx.await.map_err(|_| FleetError::Shutdown)
    }

    /// Broadcast a presence update to one, several, or all local shards.
    pub async fn update_presence(
        &self,
        presence: &PresenceUpdate,
        target: ShardTarget,
    ) -> Result<(), FleetError> {
        let payload = GatewayPayload::new(OpCode::PresenceUpdate, presence);
        let ids = match target {
            ShardTarget::One(id) => vec![id],
            ShardTarget::Many(ids) => ids,
            ShardTarget::All => self.shard_ids(),
        };

        for shard_id in ids {
            let shard = self
                .shard(shard_id)
                .ok_or(FleetError::NoShard { shard_id })?;
            shard.send(&payload, false).await?;
        }

        Ok(())
    }

    /// Update the bot's voice state in a guild; `channel_id: None`
    /// disconnects.
    pub async fn update_voice_state(
        &self,
        guild_id: Snowflake,
        channel_id: Option<Snowflake>,
        self_mute: bool,
        self_deaf: bool,
    ) -> Result<(), FleetError> {
        let shard = self.shard_for_guild(guild_id)?;
        let payload = GatewayPayload::new(
            OpCode::VoiceStateUpdate,
            VoiceStateUpdatePayload {
                guild_id,
                channel_id,
                self_mute,
                self_deaf,
            },
        );
        shard.send(&payload, false).await?;
        Ok(())
    }

    /// Kill every shard and stop the event pump.
    pub fn shutdown(&self) {
        info!("shutting down fleet");

        for entry in self.inner.shards.iter() {
            entry.value().kill(1000, "fleet shutdown");
        }
        for handle in self.inner.forwarders.lock().drain(..) {
            handle.abort();
        }
        self.inner.pending_chunks.clear();
    }
}

impl FleetInner {
    /// Pre-fan-out processing of a dispatch: the hook (cache) first, then
    /// fleet bookkeeping.
    fn handle_dispatch(&self, shard_id: u16, dispatch: &Dispatch) {
        if let Some(hook) = self.hook.read().as_ref() {
            hook(shard_id, dispatch);
        }

        match dispatch {
            Dispatch::Ready(ready) => {
                let mut user = self.user.write();
                if user.is_none() {
                    *user = Some(ready.user.clone());
                }
            }
            Dispatch::GuildMembersChunk(chunk) => {
                let Some(nonce) = chunk.nonce.as_deref() else {
                    return;
                };
                let Some(collector) = self.pending_chunks.get(nonce).map(|c| c.clone()) else {
                    return;
                };

                collector.absorb(chunk);
                if chunk.chunk_index + 1 == chunk.chunk_count {
                    if let Some((_, collector)) = self.pending_chunks.remove(nonce) {
                        collector.finish();
                    }
                }
            }
            _ => {}
        }
    }
}

/// Resolve the local shard slice from configuration and the recommended
/// count.
fn resolve_plan(
    sharding: &crate::config::ShardingConfig,
    recommended: u16,
) -> Result<ShardPlan, FleetError> {
    let total = sharding.total_shards.unwrap_or(recommended).max(1);
    let count = sharding.shards.unwrap_or(total);
    let offset = sharding.offset;

    let fits = offset
        .checked_add(count)
        .map_or(false, |end| end <= total);
    if !fits {
        return Err(FleetError::InvalidShardConfig {
            offset,
            shards: count,
            total_shards: total,
        });
    }

    Ok(ShardPlan {
        total,
        offset,
        count,
    })
}

/// Group local shard ids into identify buckets by
/// `id % max_concurrency`.
fn group_buckets(plan: ShardPlan, max_concurrency: u16) -> BTreeMap<u16, Vec<u16>> {
    let concurrency = max_concurrency.max(1);
    let mut buckets: BTreeMap<u16, Vec<u16>> = BTreeMap::new();
    for shard_id in plan.offset..plan.offset + plan.count {
        buckets.entry(shard_id % concurrency).or_default().push(shard_id);
    }
    buckets
}

/// Random 16-character alphanumeric nonce for member requests.
fn random_nonce() -> String {
    use rand::Rng;

    rand::rng()
        .sample_iter(rand::distr::Alphanumeric)
        .take(16)
        .map(char::from)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ShardingConfig;
    use vanadium_http::RestConfig;
    use vanadium_model::Intents;

    fn test_fleet() -> (Fleet, Receiver<(u16, ShardEvent)>) {
        let rest = Arc::new(RestClient::new(RestConfig::new("test_token")).unwrap());
        Fleet::new(GatewayConfig::new("test_token", Intents::GUILDS), rest)
    }

    fn sharding(total: Option<u16>, shards: Option<u16>, offset: u16) -> ShardingConfig {
        ShardingConfig {
            total_shards: total,
            shards,
            offset,
        }
    }

    #[test]
    fn test_resolve_plan_defaults_to_recommendation() {
        let plan = resolve_plan(&sharding(None, None, 0), 4).unwrap();
        assert_eq!(plan, ShardPlan { total: 4, offset: 0, count: 4 });
    }

    #[test]
    fn test_resolve_plan_window_boundary() {
        // offset + count == total is accepted.
        let plan = resolve_plan(&sharding(Some(8), Some(4), 4), 1).unwrap();
        assert_eq!(plan, ShardPlan { total: 8, offset: 4, count: 4 });

        // One past the end is rejected.
        let result = resolve_plan(&sharding(Some(8), Some(5), 4), 1);
        assert!(matches!(
            result,
            Err(FleetError::InvalidShardConfig {
                offset: 4,
                shards: 5,
                total_shards: 8,
            })
        ));
    }

    #[test]
    fn test_group_buckets() {
        let plan = ShardPlan { total: 8, offset: 0, count: 8 };
        let buckets = group_buckets(plan, 2);

        assert_eq!(buckets[&0], vec![0, 2, 4, 6]);
        assert_eq!(buckets[&1], vec![1, 3, 5, 7]);
    }

    #[test]
    fn test_group_buckets_serial() {
        let plan = ShardPlan { total: 3, offset: 0, count: 3 };
        let buckets = group_buckets(plan, 1);

        assert_eq!(buckets.len(), 1);
        assert_eq!(buckets[&0], vec![0, 1, 2]);
    }

    #[test]
    fn test_random_nonce_fits_limit() {
        let nonce = random_nonce();
        assert_eq!(nonce.len(), 16);
        assert!(nonce.len() <= MEMBER_NONCE_MAX_BYTES);
        assert!(nonce.bytes().all(|b| b.is_ascii_alphanumeric()));
    }

    #[tokio::test]
    async fn test_member_nonce_boundary() {
        let (fleet, _events) = test_fleet();

        // 33 bytes is rejected before anything else happens.
        let result = fleet
            .fetch_guild_members(
                Snowflake::new(1),
                MemberRequestOptions {
                    nonce: Some("x".repeat(33)),
                    ..MemberRequestOptions::default()
                },
            )
            .await;
        assert!(matches!(result, Err(FleetError::MemberNonceTooBig)));

        // 32 bytes passes the nonce check (and then fails on routing,
        // because the fleet is not connected).
        let result = fleet
            .fetch_guild_members(
                Snowflake::new(1),
                MemberRequestOptions {
                    nonce: Some("x".repeat(32)),
                    ..MemberRequestOptions::default()
                },
            )
            .await;
        assert!(matches!(result, Err(FleetError::NotConnected)));
    }

    #[test]
    fn test_guild_shard_requires_connection() {
        let (fleet, _events) = test_fleet();
        assert!(matches!(
            fleet.guild_shard(Snowflake::new(1)),
            Err(FleetError::NotConnected)
        ));
    }

    #[test]
    fn test_guild_shard_routing() {
        let (fleet, _events) = test_fleet();
        *fleet.inner.plan.write() = Some(ShardPlan { total: 4, offset: 0, count: 4 });

        let guild = Snowflake::new(175928847299117063);
        assert_eq!(fleet.guild_shard(guild).unwrap(), 1);

        // No shards were spawned, so routing with ensure fails.
        assert!(matches!(
            fleet.shard_for_guild(guild),
            Err(FleetError::NoShard { shard_id: 1 })
        ));
    }

    #[test]
    fn test_chunk_accumulation() {
        let (fleet, _events) = test_fleet();

        let (done_tx, mut done_rx) = oneshot::channel();
        fleet
            .inner
            .pending_chunks
            .insert("nonce1".to_owned(), Arc::new(ChunkCollector::new(done_tx)));

        let chunk = |index: u32, user_id: u64| {
            Dispatch::parse(
                "GUILD_MEMBERS_CHUNK",
                serde_json::json!({
                    "guild_id": "9",
                    "members": [{"user": {"id": user_id.to_string()}}],
                    "chunk_index": index,
                    "chunk_count": 2,
                    "nonce": "nonce1",
                }),
            )
            .unwrap()
        };

        fleet.inner.handle_dispatch(0, &chunk(0, 7));
        assert!(done_rx.try_recv().is_err());

        fleet.inner.handle_dispatch(0, &chunk(1, 8));
        let result = done_rx.try_recv().expect("member request should complete");
        assert_eq!(result.members.len(), 2);
        assert!(fleet.inner.pending_chunks.is_empty());
    }

    #[test]
    fn test_chunks_with_foreign_nonce_are_ignored() {
        let (fleet, _events) = test_fleet();

        let dispatch = Dispatch::parse(
            "GUILD_MEMBERS_CHUNK",
            serde_json::json!({
                "guild_id": "9",
                "members": [],
                "chunk_index": 0,
                "chunk_count": 1,
                "nonce": "unknown",
            }),
        )
        .unwrap();

        // No pending request for this nonce: nothing happens.
        fleet.inner.handle_dispatch(0, &dispatch);
        assert!(fleet.inner.pending_chunks.is_empty());
    }
}
