//! Shard implementation for Discord Gateway connection.
//!
//! A Shard represents a single WebSocket connection to Discord's Gateway.
//! For large bots, multiple shards are used to distribute guild events.
//!
//! The shard is a four-state machine: `Disconnected`, `Connecting`,
//! `Resuming`, and `Connected`. [`Shard::spawn`] drives the identify
//! handshake and resolves on the first READY; afterwards a background
//! task keeps the session alive, resuming (indefinitely) whenever the
//! socket drops. Payloads sent while not connected are queued and flushed
//! in order on entering `Connected`; only heartbeat, identify, and resume
//! bypass the queue.

use crate::error::{CloseCode, ShardError};
use crate::heartbeat::Heartbeats;
use crate::opcode::OpCode;
use crate::payload::{
    create_heartbeat_payload, ConnectionProperties, GatewayPayload, HelloPayload, IdentifyPayload,
    RawGatewayPayload, ResumePayload,
};

use flume::{Receiver, Sender};
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use parking_lot::{Mutex, RwLock};
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::{oneshot, Notify};
use tokio::time::{sleep, sleep_until, timeout};
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, error, info, trace, warn};
use url::Url;
use vanadium_model::{Dispatch, Intents, PresenceUpdate, Ready};

/// Type alias for the WebSocket stream.
type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WsSink = SplitSink<WsStream, WsMessage>;
type WsSource = SplitStream<WsStream>;

/// Shard connection state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShardState {
    /// Disconnected, not running.
    Disconnected,
    /// Connecting and identifying a fresh session.
    Connecting,
    /// Reconnecting and resuming a previous session.
    Resuming,
    /// Fully connected and receiving events.
    Connected,
}

/// Events emitted by a shard.
#[derive(Debug, Clone)]
pub enum ShardEvent {
    /// A dispatch received from the gateway, in socket order.
    Dispatch(Dispatch),
    /// The shard changed state.
    State {
        /// State before the transition.
        from: ShardState,
        /// State after the transition.
        to: ShardState,
    },
    /// A raw payload was written to the socket.
    Sent(String),
}

/// Configuration for a shard.
#[derive(Debug, Clone)]
pub struct ShardConfig {
    /// Bot token.
    pub token: String,

    /// Gateway intents.
    pub intents: Intents,

    /// Gateway URL (usually from /gateway/bot).
    pub gateway_url: String,

    /// Large guild threshold (50-250).
    pub large_threshold: u8,

    /// Presence advertised at identify.
    pub presence: Option<PresenceUpdate>,

    /// Delay between failed spawn attempts.
    pub spawn_attempt_delay: Duration,

    /// Connect attempts before `spawn()` gives up.
    pub spawn_max_attempts: u32,

    /// Bound on a single connect or resume handshake.
    pub spawn_timeout: Duration,

    /// Gateway API version.
    pub version: u8,
}

impl ShardConfig {
    /// Create a new shard configuration with required fields.
    pub fn new(token: impl Into<String>, intents: Intents) -> Self {
        Self {
            token: token.into(),
            intents,
            gateway_url: crate::DEFAULT_GATEWAY_URL.to_string(),
            large_threshold: 50,
            presence: None,
            spawn_attempt_delay: Duration::from_millis(2500),
            spawn_max_attempts: 10,
            spawn_timeout: Duration::from_millis(30_000),
            version: crate::GATEWAY_VERSION,
        }
    }

    /// Set a custom gateway URL.
    pub fn with_gateway_url(mut self, url: impl Into<String>) -> Self {
        self.gateway_url = url.into();
        self
    }
}

/// Session data for resuming connections.
#[derive(Debug, Clone)]
struct Session {
    /// Session ID from the Ready event.
    id: String,
    /// Resume URL from the Ready event.
    resume_url: Option<String>,
}

/// A send waiting in the queue for the shard to become connected.
struct QueuedSend {
    payload: String,
    done: oneshot::Sender<Result<(), ShardError>>,
}

/// Command sent to the socket task.
enum SocketCommand {
    /// Write a payload to the socket.
    Send {
        payload: String,
        done: oneshot::Sender<Result<(), ShardError>>,
    },
    /// Close the socket and resume.
    Restart,
}

/// The two socket halves of an established connection.
struct Connection {
    sink: WsSink,
    stream: WsSource,
}

/// Internal action derived from a received frame.
enum FrameAction {
    None,
    Dispatch(Dispatch),
    Heartbeat,
    HeartbeatAck,
    Reconnect,
    InvalidSession { resumable: bool },
    Hello(HelloPayload),
}

/// Why the read loop exited.
enum LoopOutcome {
    /// External kill; stop the driver.
    Kill,
    /// Socket loss or gateway request; reconnect.
    Reconnect,
    /// Unrecoverable close code; stop the driver.
    Fatal,
}

/// A Discord Gateway shard.
///
/// Cheap to share: all state lives behind an `Arc`.
pub struct Shard {
    inner: Arc<ShardInner>,
}

struct ShardInner {
    /// This shard's ID.
    id: u16,

    /// Fleet-wide shard count advertised in Identify.
    total_shards: u16,

    /// Shard configuration.
    config: ShardConfig,

    /// Current connection state.
    state: RwLock<ShardState>,

    /// Session data for resuming.
    session: RwLock<Option<Session>>,

    /// Last sequence number received; 0 means none yet.
    sequence: AtomicU64,

    /// Heartbeat bookkeeping.
    heartbeat: Heartbeats,

    /// Whether `kill()` was requested.
    killed: AtomicBool,

    /// Close code and reason passed to `kill()`.
    kill_code: Mutex<Option<(u16, String)>>,

    /// Wakes the driver on kill; replaced on each spawn.
    kill_notify: Mutex<Arc<Notify>>,

    /// Event fan-out.
    event_tx: Sender<ShardEvent>,

    /// Commands to the socket task.
    command_tx: Sender<SocketCommand>,
    command_rx: Receiver<SocketCommand>,

    /// Payloads queued until the shard is connected.
    send_queue: Mutex<VecDeque<QueuedSend>>,

    /// Completion slot for a pending `spawn()`.
    pending_ready: Mutex<Option<oneshot::Sender<Result<Ready, ShardError>>>>,

    /// Completion slot for a pending `restart()`.
    pending_resume: Mutex<Option<oneshot::Sender<Result<(), ShardError>>>>,
}

impl Shard {
    /// Create a new shard.
    ///
    /// Events (dispatches, state changes, raw sent payloads) are emitted
    /// on `event_tx` in socket order.
    pub fn new(
        id: u16,
        total_shards: u16,
        config: ShardConfig,
        event_tx: Sender<ShardEvent>,
    ) -> Self {
        let (command_tx, command_rx) = flume::unbounded();

        Self {
            inner: Arc::new(ShardInner {
                id,
                total_shards,
                config,
                state: RwLock::new(ShardState::Disconnected),
                session: RwLock::new(None),
                sequence: AtomicU64::new(0),
                heartbeat: Heartbeats::new(),
                killed: AtomicBool::new(false),
                kill_code: Mutex::new(None),
                kill_notify: Mutex::new(Arc::new(Notify::new())),
                event_tx,
                command_tx,
                command_rx,
                send_queue: Mutex::new(VecDeque::new()),
                pending_ready: Mutex::new(None),
                pending_resume: Mutex::new(None),
            }),
        }
    }

    /// Get the shard ID.
    pub fn id(&self) -> u16 {
        self.inner.id
    }

    /// Get the fleet-wide shard count this shard identifies with.
    pub fn total_shards(&self) -> u16 {
        self.inner.total_shards
    }

    /// Get the current shard state.
    pub fn state(&self) -> ShardState {
        *self.inner.state.read()
    }

    /// Get the last sequence number, if any dispatch carried one yet.
    pub fn sequence(&self) -> Option<u64> {
        self.inner.current_sequence()
    }

    /// Get the active session ID, present between READY and invalidation.
    pub fn session_id(&self) -> Option<String> {
        self.inner.session.read().as_ref().map(|s| s.id.clone())
    }

    /// Get the last measured heartbeat latency.
    pub fn latency(&self) -> Option<Duration> {
        self.inner.heartbeat.latency()
    }

    /// Connect to the gateway and identify.
    ///
    /// Resolves with the READY payload once the session is established.
    /// Connection attempts are bounded by `spawn_timeout` each and
    /// retried up to `spawn_max_attempts` times; afterwards the shard
    /// keeps its session alive in the background, resuming indefinitely,
    /// until [`kill`](Self::kill) is called.
    ///
    /// # Errors
    ///
    /// Returns [`ShardError::AlreadyConnecting`] if the shard is not
    /// disconnected, [`ShardError::MaxSpawnAttemptsReached`] when every
    /// attempt failed, and [`ShardError::InterruptFromKill`] if killed
    /// while pending.
    pub async fn spawn(&self) -> Result<Ready, ShardError> {
        {
            let mut state = self.inner.state.write();
            if *state != ShardState::Disconnected {
                return Err(ShardError::AlreadyConnecting);
            }
            *state = ShardState::Connecting;
        }
        self.inner.emit(ShardEvent::State {
            from: ShardState::Disconnected,
            to: ShardState::Connecting,
        });

        self.inner.killed.store(false, Ordering::Release);
        *self.inner.kill_code.lock() = None;

        // Drop commands left over from a previous connection.
        while self.inner.command_rx.try_recv().is_ok() {}

        let (ready_tx, ready_rx) = oneshot::channel();
        *self.inner.pending_ready.lock() = Some(ready_tx);

        let notify = Arc::new(Notify::new());
        *self.inner.kill_notify.lock() = notify.clone();

        let inner = self.inner.clone();
        tokio::spawn(async move {
            driver(inner, notify).await;
        });

        ready_rx
            .await
            .map_err(|_| ShardError::InterruptFromKill)?
    }

    /// Close the current socket and resume the session.
    ///
    /// Resolves once the gateway acknowledges the resume.
    ///
    /// # Errors
    ///
    /// Returns [`ShardError::SendWithoutOpenSocket`] when the shard is
    /// not running.
    pub async fn restart(&self) -> Result<(), ShardError> {
        if self.state() == ShardState::Disconnected {
            return Err(ShardError::SendWithoutOpenSocket);
        }

        let (resume_tx, resume_rx) = oneshot::channel();
        *self.inner.pending_resume.lock() = Some(resume_tx);
        let _ = self.inner.command_tx.send(SocketCommand::Restart);

        resume_rx
            .await
            .map_err(|_| ShardError::InterruptFromKill)?
    }

    /// Kill the shard: cancel timers and pending operations, flush the
    /// send queue, and close the socket with the given code.
    ///
    /// The session is kept, so a later [`spawn`](Self::spawn) may resume.
    pub fn kill(&self, code: u16, reason: &str) {
        info!(shard_id = self.inner.id, code, reason, "killing shard");
        self.inner.killed.store(true, Ordering::Release);
        *self.inner.kill_code.lock() = Some((code, reason.to_owned()));

        if let Some(tx) = self.inner.pending_ready.lock().take() {
            let _ = tx.send(Err(ShardError::InterruptFromKill));
        }
        if let Some(tx) = self.inner.pending_resume.lock().take() {
            let _ = tx.send(Err(ShardError::InterruptFromKill));
        }

        let drained: Vec<QueuedSend> = self.inner.send_queue.lock().drain(..).collect();
        for queued in drained {
            let _ = queued.done.send(Err(ShardError::SendQueueForceFlushed));
        }

        self.inner.kill_notify.lock().notify_one();
    }

    /// Send a payload to the gateway.
    ///
    /// While the shard is not connected, non-forced sends are queued in
    /// order and flushed on entering `Connected`. `force` bypasses the
    /// queue and requires an open socket; it is what the shard itself
    /// uses for heartbeat, identify, and resume.
    pub async fn send<T: serde::Serialize>(&self, payload: &T, force: bool) -> Result<(), ShardError> {
        self.send_raw(serde_json::to_string(payload)?, force).await
    }

    /// Send an already serialized payload. See [`send`](Self::send).
    pub async fn send_raw(&self, payload: String, force: bool) -> Result<(), ShardError> {
        if self.state() == ShardState::Connected {
            let (done_tx, done_rx) = oneshot::channel();
            self.inner
                .command_tx
                .send(SocketCommand::Send {
                    payload,
                    done: done_tx,
                })
                .map_err(|_| ShardError::SendWithoutOpenSocket)?;
            return done_rx
                .await
                .map_err(|_| ShardError::SendWithoutOpenSocket)?;
        }

        if force {
            return Err(if self.inner.killed.load(Ordering::Acquire) {
                ShardError::SendQueueForceFlushed
            } else {
                ShardError::SendWithoutOpenSocket
            });
        }

        if self.inner.killed.load(Ordering::Acquire) {
            return Err(ShardError::SendWithoutOpenSocket);
        }

        let (done_tx, done_rx) = oneshot::channel();
        self.inner.send_queue.lock().push_back(QueuedSend {
            payload,
            done: done_tx,
        });
        trace!(shard_id = self.inner.id, "queued send until connected");

        done_rx
            .await
            .map_err(|_| ShardError::SendQueueForceFlushed)?
    }
}

impl ShardInner {
    fn emit(&self, event: ShardEvent) {
        let _ = self.event_tx.send(event);
    }

    fn set_state(&self, to: ShardState) {
        let from = {
            let mut state = self.state.write();
            let from = *state;
            if from == to {
                return;
            }
            *state = to;
            from
        };
        debug!(shard_id = self.id, ?from, ?to, "shard state change");
        self.emit(ShardEvent::State { from, to });
    }

    fn current_sequence(&self) -> Option<u64> {
        match self.sequence.load(Ordering::Acquire) {
            0 => None,
            sequence => Some(sequence),
        }
    }

    fn can_resume(&self) -> bool {
        self.session.read().is_some() && self.sequence.load(Ordering::Acquire) > 0
    }

    /// Drop the session and sequence together; the session is only
    /// invalidated by an explicit unresumable invalid-session.
    fn invalidate_session(&self) {
        debug!(shard_id = self.id, "session invalidated");
        *self.session.write() = None;
        self.sequence.store(0, Ordering::Release);
    }

    /// Build the gateway URL with query parameters, preferring the
    /// resume URL when one is known.
    fn build_gateway_url(&self) -> Result<Url, ShardError> {
        let base_url = self
            .session
            .read()
            .as_ref()
            .and_then(|s| s.resume_url.clone())
            .unwrap_or_else(|| self.config.gateway_url.clone());

        let mut url = Url::parse(&base_url)?;
        url.query_pairs_mut()
            .append_pair("v", &self.config.version.to_string())
            .append_pair("encoding", "json");

        Ok(url)
    }
}

/// Background task owning the socket: connect (or resume), run the read
/// loop, and repeat until killed or fatally closed.
async fn driver(inner: Arc<ShardInner>, notify: Arc<Notify>) {
    let mut attempts: u32 = 0;

    loop {
        if inner.killed.load(Ordering::Acquire) {
            deliver_failure(&inner, ShardError::InterruptFromKill);
            inner.set_state(ShardState::Disconnected);
            return;
        }

        let resuming = inner.can_resume();
        inner.set_state(if resuming {
            ShardState::Resuming
        } else {
            ShardState::Connecting
        });

        let result = tokio::select! {
            _ = notify.notified() => Err(ShardError::InterruptFromKill),
            result = timeout(inner.config.spawn_timeout, establish(&inner)) => match result {
                Ok(result) => result,
                Err(_) => Err(ShardError::HandshakeTimeout),
            },
        };

        let connection = match result {
            Ok(connection) => connection,
            Err(ShardError::InterruptFromKill) => {
                deliver_failure(&inner, ShardError::InterruptFromKill);
                inner.set_state(ShardState::Disconnected);
                return;
            }
            Err(error @ ShardError::FatalClose { .. }) => {
                error!(shard_id = inner.id, error = %error, "unrecoverable gateway close");
                deliver_failure(&inner, error);
                inner.set_state(ShardState::Disconnected);
                return;
            }
            Err(error) => {
                attempts += 1;
                warn!(
                    shard_id = inner.id,
                    attempt = attempts,
                    error = %error,
                    "connect attempt failed"
                );

                // Only the initial spawn is bounded; an established shard
                // resumes indefinitely until killed.
                let bounded = inner.pending_ready.lock().is_some();
                if bounded && attempts >= inner.config.spawn_max_attempts {
                    deliver_failure(&inner, ShardError::MaxSpawnAttemptsReached { attempts });
                    inner.set_state(ShardState::Disconnected);
                    return;
                }

                // A failed fresh connect falls back to Disconnected
                // between attempts; a failed resume stays in Resuming.
                if !inner.can_resume() {
                    inner.set_state(ShardState::Disconnected);
                }

                let delay = with_jitter(inner.config.spawn_attempt_delay, 0.25);
                tokio::select! {
                    _ = notify.notified() => {
                        deliver_failure(&inner, ShardError::InterruptFromKill);
                        inner.set_state(ShardState::Disconnected);
                        return;
                    }
                    _ = sleep(delay) => {}
                }
                continue;
            }
        };

        attempts = 0;
        match read_loop(&inner, connection, &notify).await {
            LoopOutcome::Kill => {
                deliver_failure(&inner, ShardError::InterruptFromKill);
                inner.set_state(ShardState::Disconnected);
                return;
            }
            LoopOutcome::Fatal => {
                inner.set_state(ShardState::Disconnected);
                return;
            }
            LoopOutcome::Reconnect => {
                // With a live session the shard goes straight to
                // Resuming; without one it passes through Disconnected
                // and identifies fresh.
                if !inner.can_resume() {
                    inner.set_state(ShardState::Disconnected);
                }
            }
        }
    }
}

/// Resolve whichever start promise is pending with an error.
fn deliver_failure(inner: &ShardInner, error: ShardError) {
    if let Some(tx) = inner.pending_ready.lock().take() {
        let _ = tx.send(Err(error));
    } else if let Some(tx) = inner.pending_resume.lock().take() {
        let _ = tx.send(Err(error));
    }
}

/// Open the socket and run the handshake through READY or RESUMED.
async fn establish(inner: &Arc<ShardInner>) -> Result<Connection, ShardError> {
    let url = inner.build_gateway_url()?;
    debug!(shard_id = inner.id, url = %url, "connecting to gateway");

    let (ws_stream, _response) = connect_async(url.as_str()).await?;
    let (mut sink, mut stream) = ws_stream.split();

    let hello = wait_for_hello(inner, &mut stream).await?;
    inner
        .heartbeat
        .start_interval(Duration::from_millis(hello.heartbeat_interval));
    debug!(
        shard_id = inner.id,
        interval_ms = hello.heartbeat_interval,
        "received hello"
    );

    // Immediate heartbeat, then identify or resume. All three bypass the
    // send queue.
    send_forced(
        inner,
        &mut sink,
        create_heartbeat_payload(inner.current_sequence()),
    )
    .await?;
    inner.heartbeat.record_sent();

    let resume_with = {
        let session = inner.session.read();
        session
            .as_ref()
            .map(|s| s.id.clone())
            .zip(inner.current_sequence())
    };

    if let Some((session_id, seq)) = resume_with {
        info!(shard_id = inner.id, session_id = %session_id, seq, "resuming session");
        let payload = GatewayPayload::new(
            OpCode::Resume,
            ResumePayload {
                token: &inner.config.token,
                session_id: &session_id,
                seq,
            },
        );
        send_forced(inner, &mut sink, serde_json::to_string(&payload)?).await?;
    } else {
        info!(shard_id = inner.id, "sending identify");
        let identify = IdentifyPayload {
            token: &inner.config.token,
            intents: inner.config.intents,
            properties: ConnectionProperties::default(),
            compress: false,
            large_threshold: inner.config.large_threshold,
            shard: [inner.id, inner.total_shards],
            presence: inner.config.presence.as_ref(),
        };
        let payload = GatewayPayload::new(OpCode::Identify, &identify);
        send_forced(inner, &mut sink, serde_json::to_string(&payload)?).await?;
    }

    loop {
        // The heartbeat cadence starts at Hello, so the interval timer
        // runs here too, not just in the post-ready loop.
        let message = tokio::select! {
            _ = sleep_until(inner.heartbeat.next_deadline()) => {
                if inner.heartbeat.is_zombie() {
                    return Err(ShardError::ClosedDuringSocketInit {
                        code: 0,
                        reason: "missed heartbeat ack during handshake".to_owned(),
                    });
                }

                send_forced(
                    inner,
                    &mut sink,
                    create_heartbeat_payload(inner.current_sequence()),
                )
                .await?;
                inner.heartbeat.record_sent();
                continue;
            }

            message = stream.next() => match message {
                Some(Ok(message)) => message,
                Some(Err(source)) => return Err(ShardError::WebSocket(source)),
                None => {
                    return Err(ShardError::ClosedDuringSocketInit {
                        code: 0,
                        reason: "stream ended before ready".to_owned(),
                    })
                }
            },
        };

        match message {
            WsMessage::Text(text) => match process_frame(inner, text.as_str())? {
                FrameAction::Dispatch(Dispatch::Ready(ready)) => {
                    *inner.session.write() = Some(Session {
                        id: ready.session_id.clone(),
                        resume_url: ready.resume_gateway_url.clone(),
                    });
                    let ready_payload = (*ready).clone();
                    inner.emit(ShardEvent::Dispatch(Dispatch::Ready(ready)));

                    finish_connected(inner, &mut sink).await?;
                    if let Some(tx) = inner.pending_ready.lock().take() {
                        let _ = tx.send(Ok(ready_payload));
                    }
                    info!(shard_id = inner.id, "shard ready");
                    return Ok(Connection { sink, stream });
                }
                FrameAction::Dispatch(Dispatch::Resumed) => {
                    inner.emit(ShardEvent::Dispatch(Dispatch::Resumed));

                    finish_connected(inner, &mut sink).await?;
                    if let Some(tx) = inner.pending_resume.lock().take() {
                        let _ = tx.send(Ok(()));
                    }
                    info!(shard_id = inner.id, "session resumed");
                    return Ok(Connection { sink, stream });
                }
                // Replayed dispatches arriving before RESUMED.
                FrameAction::Dispatch(dispatch) => {
                    inner.emit(ShardEvent::Dispatch(dispatch));
                }
                FrameAction::Heartbeat => {
                    send_forced(
                        inner,
                        &mut sink,
                        create_heartbeat_payload(inner.current_sequence()),
                    )
                    .await?;
                    inner.heartbeat.record_sent();
                }
                FrameAction::HeartbeatAck => inner.heartbeat.record_ack(),
                FrameAction::InvalidSession { resumable } => {
                    warn!(
                        shard_id = inner.id,
                        resumable, "session invalidated during handshake"
                    );
                    if !resumable {
                        inner.invalidate_session();
                    }
                    return Err(ShardError::SessionInvalidated { resumable });
                }
                FrameAction::Reconnect => {
                    return Err(ShardError::ClosedDuringSocketInit {
                        code: 0,
                        reason: "reconnect requested during handshake".to_owned(),
                    })
                }
                FrameAction::Hello(_) | FrameAction::None => {}
            },
            WsMessage::Close(frame) => {
                let (code, reason) = close_parts(frame);
                if !CloseCode::code_allows_reconnect(code) {
                    return Err(ShardError::FatalClose { code, reason });
                }
                return Err(ShardError::ClosedDuringSocketInit { code, reason });
            }
            WsMessage::Ping(data) => {
                sink.send(WsMessage::Pong(data)).await?;
            }
            _ => {}
        }
    }
}

/// Wait for the Hello payload after connecting.
async fn wait_for_hello(
    inner: &Arc<ShardInner>,
    stream: &mut WsSource,
) -> Result<HelloPayload, ShardError> {
    loop {
        let message = match stream.next().await {
            Some(Ok(message)) => message,
            Some(Err(source)) => return Err(ShardError::WebSocket(source)),
            None => {
                return Err(ShardError::ClosedDuringSocketInit {
                    code: 0,
                    reason: "connection closed before hello".to_owned(),
                })
            }
        };

        match message {
            WsMessage::Text(text) => {
                if let FrameAction::Hello(hello) = process_frame(inner, text.as_str())? {
                    return Ok(hello);
                }
            }
            WsMessage::Close(frame) => {
                let (code, reason) = close_parts(frame);
                if !CloseCode::code_allows_reconnect(code) {
                    return Err(ShardError::FatalClose { code, reason });
                }
                return Err(ShardError::ClosedDuringSocketInit { code, reason });
            }
            _ => {}
        }
    }
}

/// Enter `Connected` and flush the send queue in order.
async fn finish_connected(inner: &Arc<ShardInner>, sink: &mut WsSink) -> Result<(), ShardError> {
    inner.set_state(ShardState::Connected);

    loop {
        let queued = { inner.send_queue.lock().pop_front() };
        let Some(queued) = queued else {
            return Ok(());
        };

        match sink
            .send(WsMessage::Text(queued.payload.clone().into()))
            .await
        {
            Ok(()) => {
                inner.emit(ShardEvent::Sent(queued.payload));
                let _ = queued.done.send(Ok(()));
            }
            Err(source) => {
                let _ = queued.done.send(Err(ShardError::SendWithoutOpenSocket));
                return Err(ShardError::WebSocket(source));
            }
        }
    }
}

/// Steady-state loop: socket frames, heartbeat timer, user commands.
async fn read_loop(
    inner: &Arc<ShardInner>,
    mut connection: Connection,
    notify: &Notify,
) -> LoopOutcome {
    loop {
        tokio::select! {
            _ = notify.notified() => {
                let (code, reason) = inner
                    .kill_code
                    .lock()
                    .take()
                    .unwrap_or((1000, String::new()));
                let _ = close_socket(&mut connection.sink, code, &reason).await;
                return LoopOutcome::Kill;
            }

            command = inner.command_rx.recv_async() => match command {
                Ok(SocketCommand::Send { payload, done }) => {
                    match connection
                        .sink
                        .send(WsMessage::Text(payload.clone().into()))
                        .await
                    {
                        Ok(()) => {
                            inner.emit(ShardEvent::Sent(payload));
                            let _ = done.send(Ok(()));
                        }
                        Err(source) => {
                            warn!(shard_id = inner.id, error = %source, "send failed, resuming");
                            let _ = done.send(Err(ShardError::SendWithoutOpenSocket));
                            return LoopOutcome::Reconnect;
                        }
                    }
                }
                Ok(SocketCommand::Restart) => {
                    info!(shard_id = inner.id, "restart requested");
                    let _ = close_socket(&mut connection.sink, 1012, "restarting").await;
                    return LoopOutcome::Reconnect;
                }
                // The shard owns a sender, so this channel never closes
                // while the shard is alive.
                Err(_) => return LoopOutcome::Kill,
            },

            _ = sleep_until(inner.heartbeat.next_deadline()) => {
                if inner.heartbeat.is_zombie() {
                    warn!(
                        shard_id = inner.id,
                        "missed heartbeat ack, assuming zombie connection"
                    );
                    let _ = close_socket(&mut connection.sink, 1012, "zombie connection").await;
                    return LoopOutcome::Reconnect;
                }

                let payload = create_heartbeat_payload(inner.current_sequence());
                if send_forced(inner, &mut connection.sink, payload).await.is_err() {
                    return LoopOutcome::Reconnect;
                }
                inner.heartbeat.record_sent();
            }

            message = connection.stream.next() => match message {
                Some(Ok(WsMessage::Text(text))) => match process_frame(inner, text.as_str()) {
                    Ok(FrameAction::Dispatch(dispatch)) => {
                        inner.emit(ShardEvent::Dispatch(dispatch));
                    }
                    Ok(FrameAction::Heartbeat) => {
                        let payload = create_heartbeat_payload(inner.current_sequence());
                        if send_forced(inner, &mut connection.sink, payload).await.is_err() {
                            return LoopOutcome::Reconnect;
                        }
                        inner.heartbeat.record_sent();
                    }
                    Ok(FrameAction::HeartbeatAck) => inner.heartbeat.record_ack(),
                    Ok(FrameAction::Reconnect) => {
                        info!(shard_id = inner.id, "gateway requested reconnect");
                        let _ = close_socket(&mut connection.sink, 1012, "reconnect requested").await;
                        return LoopOutcome::Reconnect;
                    }
                    Ok(FrameAction::InvalidSession { resumable }) => {
                        warn!(shard_id = inner.id, resumable, "session invalidated");
                        if !resumable {
                            inner.invalidate_session();
                        }
                        let _ = close_socket(&mut connection.sink, 1012, "session invalidated").await;
                        return LoopOutcome::Reconnect;
                    }
                    Ok(FrameAction::Hello(_)) | Ok(FrameAction::None) => {}
                    Err(source) => {
                        warn!(shard_id = inner.id, error = %source, "failed to decode frame");
                    }
                },
                Some(Ok(WsMessage::Ping(data))) => {
                    let _ = connection.sink.send(WsMessage::Pong(data)).await;
                }
                Some(Ok(WsMessage::Close(frame))) => {
                    let (code, reason) = close_parts(frame);
                    if !CloseCode::code_allows_reconnect(code) {
                        error!(shard_id = inner.id, code, reason = %reason, "fatal close code");
                        return LoopOutcome::Fatal;
                    }
                    warn!(shard_id = inner.id, code, reason = %reason, "connection closed, resuming");
                    return LoopOutcome::Reconnect;
                }
                Some(Ok(_)) => {}
                Some(Err(source)) => {
                    warn!(shard_id = inner.id, error = %source, "websocket error, resuming");
                    return LoopOutcome::Reconnect;
                }
                None => {
                    warn!(shard_id = inner.id, "stream ended, resuming");
                    return LoopOutcome::Reconnect;
                }
            },
        }
    }
}

/// Parse a frame, update the sequence, and classify the opcode.
fn process_frame(inner: &ShardInner, text: &str) -> Result<FrameAction, ShardError> {
    let raw: RawGatewayPayload = serde_json::from_str(text)?;

    if let Some(sequence) = raw.s {
        let previous = inner.sequence.load(Ordering::Acquire);
        if sequence > previous {
            inner.sequence.store(sequence, Ordering::Release);
        }
    }

    Ok(match raw.op {
        OpCode::Dispatch => {
            let Some(kind) = raw.t else {
                return Ok(FrameAction::None);
            };
            let data = raw.d.unwrap_or(Value::Null);
            FrameAction::Dispatch(Dispatch::parse(&kind, data)?)
        }
        OpCode::Heartbeat => FrameAction::Heartbeat,
        OpCode::HeartbeatAck => FrameAction::HeartbeatAck,
        OpCode::Reconnect => FrameAction::Reconnect,
        OpCode::InvalidSession => FrameAction::InvalidSession {
            resumable: raw.d.and_then(|d| d.as_bool()).unwrap_or(false),
        },
        OpCode::Hello => FrameAction::Hello(serde_json::from_value(raw.d.unwrap_or(Value::Null))?),
        other => {
            trace!(shard_id = inner.id, opcode = ?other, "ignoring opcode");
            FrameAction::None
        }
    })
}

/// Write a payload to the socket, bypassing the send queue.
async fn send_forced(
    inner: &Arc<ShardInner>,
    sink: &mut WsSink,
    payload: String,
) -> Result<(), ShardError> {
    sink.send(WsMessage::Text(payload.clone().into())).await?;
    inner.emit(ShardEvent::Sent(payload));
    Ok(())
}

async fn close_socket(sink: &mut WsSink, code: u16, reason: &str) -> Result<(), ShardError> {
    sink.send(WsMessage::Close(Some(CloseFrame {
        code: code.into(),
        reason: reason.to_owned().into(),
    })))
    .await?;
    Ok(())
}

fn close_parts(frame: Option<CloseFrame>) -> (u16, String) {
    frame
        .map(|frame| (u16::from(frame.code), frame.reason.to_string()))
        .unwrap_or((0, String::new()))
}

/// Add up to `jitter_factor` of random jitter to a duration so a fleet
/// of shards does not reconnect in lockstep.
fn with_jitter(duration: Duration, jitter_factor: f64) -> Duration {
    use rand::Rng;

    #[allow(
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss,
        clippy::cast_precision_loss
    )]
    let jitter_range = (duration.as_millis() as f64 * jitter_factor) as u64;
    let jitter = rand::rng().random_range(0..=jitter_range);
    duration + Duration::from_millis(jitter)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::timeout as tokio_timeout;
    use vanadium_model::Intents;

    fn test_shard() -> (Shard, Receiver<ShardEvent>) {
        let (event_tx, event_rx) = flume::unbounded();
        let config = ShardConfig::new("test_token", Intents::GUILDS | Intents::GUILD_MESSAGES);
        (Shard::new(0, 1, config, event_tx), event_rx)
    }

    #[test]
    fn test_shard_creation() {
        let (shard, _rx) = test_shard();
        assert_eq!(shard.id(), 0);
        assert_eq!(shard.total_shards(), 1);
        assert_eq!(shard.state(), ShardState::Disconnected);
        assert_eq!(shard.sequence(), None);
        assert!(shard.session_id().is_none());
    }

    #[test]
    fn test_gateway_url_building() {
        let (shard, _rx) = test_shard();
        let url = shard.inner.build_gateway_url().expect("url should build");
        assert!(url.as_str().contains("v=10"));
        assert!(url.as_str().contains("encoding=json"));
    }

    #[test]
    fn test_gateway_url_prefers_resume_url() {
        let (shard, _rx) = test_shard();
        *shard.inner.session.write() = Some(Session {
            id: "abc".to_owned(),
            resume_url: Some("wss://gateway-us-east1-b.discord.gg".to_owned()),
        });

        let url = shard.inner.build_gateway_url().expect("url should build");
        assert!(url.as_str().starts_with("wss://gateway-us-east1-b.discord.gg"));
    }

    #[test]
    fn test_state_change_events() {
        let (shard, rx) = test_shard();
        shard.inner.set_state(ShardState::Connecting);

        match rx.try_recv().expect("state event expected") {
            ShardEvent::State { from, to } => {
                assert_eq!(from, ShardState::Disconnected);
                assert_eq!(to, ShardState::Connecting);
            }
            other => panic!("unexpected event: {other:?}"),
        }

        // Setting the same state again emits nothing.
        shard.inner.set_state(ShardState::Connecting);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_spawn_guard_rejects_concurrent_spawn() {
        let (shard, _rx) = test_shard();
        shard.inner.set_state(ShardState::Connecting);

        match shard.spawn().await {
            Err(ShardError::AlreadyConnecting) => {}
            other => panic!("expected AlreadyConnecting, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_force_send_without_socket() {
        let (shard, _rx) = test_shard();
        match shard.send_raw("{}".to_owned(), true).await {
            Err(ShardError::SendWithoutOpenSocket) => {}
            other => panic!("expected SendWithoutOpenSocket, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_queued_send_rejected_on_kill() {
        let (shard, _rx) = test_shard();

        let send = shard.send_raw(r#"{"op":3}"#.to_owned(), false);
        tokio::pin!(send);

        // Drive the future far enough to enqueue.
        assert!(tokio_timeout(Duration::from_millis(10), &mut send)
            .await
            .is_err());
        assert_eq!(shard.inner.send_queue.lock().len(), 1);

        shard.kill(1000, "test shutdown");

        match send.await {
            Err(ShardError::SendQueueForceFlushed) => {}
            other => panic!("expected SendQueueForceFlushed, got {other:?}"),
        }
        assert!(shard.inner.send_queue.lock().is_empty());
    }

    #[test]
    fn test_sequence_updates_are_monotonic() {
        let (shard, _rx) = test_shard();

        let frame = r#"{"op":0,"d":{},"s":5,"t":"TYPING_START"}"#;
        process_frame(&shard.inner, frame).unwrap();
        assert_eq!(shard.sequence(), Some(5));

        // A lower sequence must not regress the counter.
        let stale = r#"{"op":0,"d":{},"s":3,"t":"TYPING_START"}"#;
        process_frame(&shard.inner, stale).unwrap();
        assert_eq!(shard.sequence(), Some(5));
    }

    #[test]
    fn test_invalid_session_frame() {
        let (shard, _rx) = test_shard();

        let frame = r#"{"op":9,"d":false}"#;
        match process_frame(&shard.inner, frame).unwrap() {
            FrameAction::InvalidSession { resumable } => assert!(!resumable),
            _ => panic!("expected invalid session"),
        }

        let frame = r#"{"op":9,"d":true}"#;
        match process_frame(&shard.inner, frame).unwrap() {
            FrameAction::InvalidSession { resumable } => assert!(resumable),
            _ => panic!("expected invalid session"),
        }
    }

    #[test]
    fn test_hello_frame() {
        let (shard, _rx) = test_shard();

        let frame = r#"{"op":10,"d":{"heartbeat_interval":41250}}"#;
        match process_frame(&shard.inner, frame).unwrap() {
            FrameAction::Hello(hello) => assert_eq!(hello.heartbeat_interval, 41250),
            _ => panic!("expected hello"),
        }
    }

    #[test]
    fn test_restart_requires_running_shard() {
        let (shard, _rx) = test_shard();
        let result = futures_util::FutureExt::now_or_never(shard.restart());
        match result {
            Some(Err(ShardError::SendWithoutOpenSocket)) => {}
            other => panic!("expected SendWithoutOpenSocket, got {other:?}"),
        }
    }
}
