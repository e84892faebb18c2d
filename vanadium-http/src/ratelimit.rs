//! Bucket-based rate limiting for the Discord REST API.
//!
//! Requests are queued per bucket and dispatched one at a time, in
//! arrival order. A bucket is identified by the hash the API assigns to
//! its route template plus the route's major parameter; until the API
//! names a bucket, a synthetic `unhashed:` hash keyed on the template is
//! used and later migrated.
//!
//! Callers acquire a [`Permit`], perform exactly one request, and hand
//! the response's rate limit headers back via [`Permit::complete`]. The
//! bucket's drain task blocks on that completion, which is what keeps at
//! most one request of a bucket in flight.

use crate::error::RestError;
use crate::route::Route;
use dashmap::DashMap;
use parking_lot::Mutex;
use reqwest::header::HeaderMap;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::sync::oneshot;
use tokio::time::{sleep, Instant};
use tracing::{debug, trace, warn};

/// Rate limiting configuration.
#[derive(Debug, Clone)]
pub struct RatelimitConfig {
    /// Requests allowed per second across all buckets.
    pub global_per_second: u32,
    /// Extra pause added when waiting out a bucket reset.
    pub pause: Duration,
    /// How often unused buckets are swept, and how long a bucket must be
    /// idle to qualify.
    pub sweep_interval: Duration,
}

impl Default for RatelimitConfig {
    fn default() -> Self {
        Self {
            global_per_second: 50,
            pause: Duration::from_millis(10),
            sweep_interval: Duration::from_secs(300),
        }
    }
}

/// Parsed `x-ratelimit-*` response headers.
#[derive(Debug, Clone, Default)]
pub struct RatelimitHeaders {
    /// `x-ratelimit-limit`.
    pub limit: Option<u32>,
    /// `x-ratelimit-remaining`.
    pub remaining: Option<u32>,
    /// `x-ratelimit-reset`, unix seconds.
    pub reset: Option<f64>,
    /// `x-ratelimit-reset-after`, seconds.
    pub reset_after: Option<f64>,
    /// `x-ratelimit-bucket`.
    pub bucket: Option<String>,
    /// `x-ratelimit-global`.
    pub global: bool,
    /// `x-ratelimit-scope`.
    pub scope: Option<String>,
    /// `retry-after`, seconds.
    pub retry_after: Option<f64>,
}

impl RatelimitHeaders {
    /// Parse the recognized headers out of a response header map.
    pub fn parse(headers: &HeaderMap) -> Self {
        fn get<T: std::str::FromStr>(headers: &HeaderMap, name: &str) -> Option<T> {
            headers
                .get(name)
                .and_then(|value| value.to_str().ok())
                .and_then(|value| value.parse().ok())
        }

        Self {
            limit: get(headers, "x-ratelimit-limit"),
            remaining: get(headers, "x-ratelimit-remaining"),
            reset: get(headers, "x-ratelimit-reset"),
            reset_after: get(headers, "x-ratelimit-reset-after"),
            bucket: get(headers, "x-ratelimit-bucket"),
            global: get::<String>(headers, "x-ratelimit-global")
                .map(|v| v == "true")
                .unwrap_or(false),
            scope: get(headers, "x-ratelimit-scope"),
            retry_after: get(headers, "retry-after"),
        }
    }

    /// Time until the bucket resets, preferring `reset-after` over the
    /// absolute `reset` timestamp (clock-skew safe).
    pub fn reset_delay(&self) -> Option<Duration> {
        if let Some(seconds) = self.reset_after {
            return Some(Duration::from_secs_f64(seconds.max(0.0)));
        }

        let reset = self.reset?;
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .ok()?
            .as_secs_f64();
        Some(Duration::from_secs_f64((reset - now).max(0.0)))
    }
}

/// Permission to perform one request.
///
/// Dropping the permit without completing it releases the bucket without
/// updating its limits.
#[derive(Debug)]
pub struct Permit {
    completion: oneshot::Sender<Option<RatelimitHeaders>>,
}

impl Permit {
    /// Report the response headers back to the bucket, or `None` when the
    /// request failed before a response arrived.
    pub fn complete(self, headers: Option<RatelimitHeaders>) {
        let _ = self.completion.send(headers);
    }
}

/// A queued request waiting for its turn in a bucket.
struct Waiter {
    /// Route-hash table key of the route the waiter came in on.
    key: String,
    permit_tx: oneshot::Sender<Permit>,
}

/// A rate limit bucket and its request queue.
struct Bucket {
    /// `hash + ":" + major`.
    id: String,
    hash: String,
    major: String,
    /// Capacity for the current window.
    allowed: AtomicU32,
    /// Requests left in the current window.
    remaining: AtomicU32,
    reset_at: Mutex<Instant>,
    last_used: Mutex<Instant>,
    queue: Mutex<VecDeque<Waiter>>,
    draining: AtomicBool,
}

impl Bucket {
    fn new(hash: &str, major: &str) -> Self {
        let now = Instant::now();
        Self {
            id: format!("{hash}:{major}"),
            hash: hash.to_owned(),
            major: major.to_owned(),
            allowed: AtomicU32::new(1),
            remaining: AtomicU32::new(1),
            reset_at: Mutex::new(now),
            last_used: Mutex::new(now),
            queue: Mutex::new(VecDeque::new()),
            draining: AtomicBool::new(false),
        }
    }

    /// Whether the bucket can be dropped by the sweeper.
    fn idle(&self, max_idle: Duration) -> bool {
        self.last_used.lock().elapsed() > max_idle
            && self.remaining.load(Ordering::Acquire) == self.allowed.load(Ordering::Acquire)
            && self.queue.lock().is_empty()
            && !self.draining.load(Ordering::Acquire)
    }
}

/// Global (cross-bucket) rate limit state.
struct GlobalLimiter {
    state: Mutex<GlobalState>,
}

struct GlobalState {
    left: u32,
    reset_at: Instant,
}

impl GlobalLimiter {
    fn new(per_second: u32) -> Self {
        Self {
            state: Mutex::new(GlobalState {
                left: per_second,
                reset_at: Instant::now() + Duration::from_secs(1),
            }),
        }
    }

    /// Take one slot of the per-second global allowance, sleeping through
    /// window rollovers and lockouts.
    async fn acquire(&self, per_second: u32) {
        loop {
            let delay = {
                let mut state = self.state.lock();
                let now = Instant::now();

                if now >= state.reset_at {
                    state.left = per_second;
                    state.reset_at = now + Duration::from_secs(1);
                }

                if state.left > 0 {
                    state.left -= 1;
                    return;
                }

                state.reset_at - now
            };

            sleep(delay).await;
        }
    }

    /// Freeze all dispatching until `until` (a global 429).
    fn lockout(&self, until: Instant) {
        let mut state = self.state.lock();
        state.left = 0;
        if until > state.reset_at {
            state.reset_at = until;
        }
    }
}

struct RatelimiterInner {
    /// `None` means rate limits are disabled entirely.
    config: Option<RatelimitConfig>,
    /// Learned route-template -> bucket-hash mapping.
    route_hashes: DashMap<String, String>,
    /// Bucket id -> bucket.
    buckets: DashMap<String, Arc<Bucket>>,
    global: GlobalLimiter,
    sweeper_started: AtomicBool,
    sweeper: Mutex<Option<tokio::task::AbortHandle>>,
}

impl Drop for RatelimiterInner {
    fn drop(&mut self) {
        if let Some(handle) = self.sweeper.lock().take() {
            handle.abort();
        }
    }
}

/// The REST rate limit engine.
#[derive(Clone)]
pub struct Ratelimiter {
    inner: Arc<RatelimiterInner>,
}

impl Ratelimiter {
    /// Create an enabled rate limiter.
    pub fn new(config: RatelimitConfig) -> Self {
        let global = GlobalLimiter::new(config.global_per_second);
        Self {
            inner: Arc::new(RatelimiterInner {
                config: Some(config),
                route_hashes: DashMap::new(),
                buckets: DashMap::new(),
                global,
                sweeper_started: AtomicBool::new(false),
                sweeper: Mutex::new(None),
            }),
        }
    }

    /// Create a disabled rate limiter; any attempt to queue through it
    /// fails with [`RestError::CreateBucketWithDisabledRatelimits`].
    pub fn disabled() -> Self {
        Self {
            inner: Arc::new(RatelimiterInner {
                config: None,
                route_hashes: DashMap::new(),
                buckets: DashMap::new(),
                global: GlobalLimiter::new(0),
                sweeper_started: AtomicBool::new(false),
                sweeper: Mutex::new(None),
            }),
        }
    }

    /// Whether rate limiting is active.
    pub fn is_enabled(&self) -> bool {
        self.inner.config.is_some()
    }

    /// Wait for a permit to request `route`, in bucket arrival order.
    pub async fn acquire(&self, route: &Route) -> Result<Permit, RestError> {
        self.acquire_inner(route, false).await
    }

    /// Wait for a permit, skipping to the head of the bucket queue. Used
    /// to re-enqueue a request the API answered with 429.
    pub async fn acquire_front(&self, route: &Route) -> Result<Permit, RestError> {
        self.acquire_inner(route, true).await
    }

    async fn acquire_inner(&self, route: &Route, front: bool) -> Result<Permit, RestError> {
        self.ensure_sweeper();

        let key = route.ratelimit_key();
        let hash = self
            .inner
            .route_hashes
            .get(&key)
            .map(|entry| entry.value().clone())
            .unwrap_or_else(|| format!("unhashed:{key}"));

        let bucket = self.bucket(&hash, &route.major.key())?;
        let (permit_tx, permit_rx) = oneshot::channel();

        {
            let mut queue = bucket.queue.lock();
            let waiter = Waiter {
                key: key.clone(),
                permit_tx,
            };
            if front {
                queue.push_front(waiter);
            } else {
                queue.push_back(waiter);
            }
        }

        self.ensure_draining(&bucket);

        permit_rx.await.map_err(|_| RestError::RatelimiterDropped)
    }

    /// Look up or create the bucket for a hash and major parameter.
    fn bucket(&self, hash: &str, major: &str) -> Result<Arc<Bucket>, RestError> {
        if self.inner.config.is_none() {
            return Err(RestError::CreateBucketWithDisabledRatelimits);
        }

        let id = format!("{hash}:{major}");
        Ok(self
            .inner
            .buckets
            .entry(id)
            .or_insert_with(|| {
                trace!(hash = %hash, major = %major, "created rate limit bucket");
                Arc::new(Bucket::new(hash, major))
            })
            .clone())
    }

    /// Spawn the drain task for a bucket unless one is already running.
    fn ensure_draining(&self, bucket: &Arc<Bucket>) {
        if bucket.draining.swap(true, Ordering::AcqRel) {
            return;
        }

        let inner = self.inner.clone();
        let bucket = bucket.clone();
        tokio::spawn(async move {
            drain(inner, bucket).await;
        });
    }

    fn ensure_sweeper(&self) {
        if self.inner.config.is_none() || self.inner.sweeper_started.swap(true, Ordering::AcqRel) {
            return;
        }

        let interval = self
            .inner
            .config
            .as_ref()
            .map(|c| c.sweep_interval)
            .unwrap_or_default();
        let weak = Arc::downgrade(&self.inner);
        let handle = tokio::spawn(async move {
            loop {
                sleep(interval).await;
                let Some(inner) = weak.upgrade() else {
                    return;
                };
                sweep(&inner, interval);
            }
        });

        *self.inner.sweeper.lock() = Some(handle.abort_handle());
    }

    /// Drop buckets that have been idle for a full sweep interval.
    #[cfg(test)]
    fn sweep_now(&self) {
        if let Some(config) = self.inner.config.as_ref() {
            sweep(&self.inner, config.sweep_interval);
        }
    }
}

/// Remove buckets with no pending work and no local limit state.
fn sweep(inner: &RatelimiterInner, max_idle: Duration) {
    let before = inner.buckets.len();
    inner.buckets.retain(|_, bucket| !bucket.idle(max_idle));
    let removed = before - inner.buckets.len();
    if removed > 0 {
        debug!(removed, "swept idle rate limit buckets");
    }
}

/// Drain a bucket's queue until it is empty: one request at a time, each
/// gated on the global limit and the bucket's own window.
async fn drain(inner: Arc<RatelimiterInner>, bucket: Arc<Bucket>) {
    let config = match inner.config.as_ref() {
        Some(config) => config.clone(),
        None => return,
    };

    loop {
        let waiter = {
            let mut queue = bucket.queue.lock();
            match queue.pop_front() {
                Some(waiter) => waiter,
                None => {
                    bucket.draining.store(false, Ordering::Release);
                    return;
                }
            }
        };

        // Caller gave up while queued.
        if waiter.permit_tx.is_closed() {
            continue;
        }

        inner.global.acquire(config.global_per_second).await;

        // Wait out the bucket's own window.
        loop {
            if bucket.remaining.load(Ordering::Acquire) > 0 {
                break;
            }

            let delay = {
                let reset_at = *bucket.reset_at.lock();
                let now = Instant::now();
                if now >= reset_at {
                    bucket
                        .remaining
                        .store(bucket.allowed.load(Ordering::Acquire), Ordering::Release);
                    break;
                }
                reset_at - now + config.pause
            };

            trace!(bucket = %bucket.id, ?delay, "bucket exhausted, waiting for reset");
            sleep(delay).await;
        }

        let remaining = bucket.remaining.load(Ordering::Acquire);
        bucket
            .remaining
            .store(remaining.saturating_sub(1), Ordering::Release);
        *bucket.last_used.lock() = Instant::now();

        let (completion_tx, completion_rx) = oneshot::channel();
        if waiter
            .permit_tx
            .send(Permit {
                completion: completion_tx,
            })
            .is_err()
        {
            continue;
        }

        // At most one request in flight per bucket: block on the caller
        // reporting back before dispatching the next waiter.
        match completion_rx.await {
            Ok(Some(headers)) => on_headers(&inner, &bucket, &waiter.key, &headers),
            Ok(None) | Err(_) => {}
        }
    }
}

/// Apply response headers to a bucket and the global limiter.
fn on_headers(
    inner: &Arc<RatelimiterInner>,
    bucket: &Arc<Bucket>,
    key: &str,
    headers: &RatelimitHeaders,
) {
    if headers.global {
        if let Some(retry_after) = headers.retry_after {
            let until = Instant::now() + Duration::from_secs_f64(retry_after.max(0.0));
            warn!(retry_after, "globally rate limited");
            inner.global.lockout(until);
        }
        return;
    }

    if let Some(limit) = headers.limit {
        bucket.allowed.store(limit, Ordering::Release);
    }
    if let Some(remaining) = headers.remaining {
        bucket.remaining.store(remaining, Ordering::Release);
    }
    if let Some(delay) = headers.reset_delay() {
        *bucket.reset_at.lock() = Instant::now() + delay;
    }
    if let Some(retry_after) = headers.retry_after {
        // A non-global 429: empty the bucket until the server says so.
        bucket.remaining.store(0, Ordering::Release);
        *bucket.reset_at.lock() = Instant::now() + Duration::from_secs_f64(retry_after.max(0.0));
    }

    // Learn the server-assigned hash and migrate any queued work off the
    // synthetic bucket.
    if let Some(server_hash) = headers.bucket.as_deref() {
        if server_hash != bucket.hash {
            debug!(
                key = %key,
                old = %bucket.hash,
                new = %server_hash,
                "bucket hash learned, migrating route"
            );
            inner
                .route_hashes
                .insert(key.to_owned(), server_hash.to_owned());

            let id = format!("{}:{}", server_hash, bucket.major);
            let target = inner
                .buckets
                .entry(id)
                .or_insert_with(|| Arc::new(Bucket::new(server_hash, &bucket.major)))
                .clone();

            // Seed the new bucket with what the headers just told us.
            if let Some(limit) = headers.limit {
                target.allowed.store(limit, Ordering::Release);
            }
            if let Some(remaining) = headers.remaining {
                target.remaining.store(remaining, Ordering::Release);
            }
            if let Some(delay) = headers.reset_delay() {
                *target.reset_at.lock() = Instant::now() + delay;
            }

            let pending: Vec<Waiter> = {
                let mut queue = bucket.queue.lock();
                queue.drain(..).collect()
            };
            if !pending.is_empty() {
                let mut queue = target.queue.lock();
                queue.extend(pending);
            }

            let limiter = Ratelimiter {
                inner: inner.clone(),
            };
            limiter.ensure_draining(&target);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::route::Route;
    use reqwest::Method;
    use tokio::time::{advance, timeout};

    fn channel_route() -> Route {
        Route::new(Method::GET, "/channels/123/messages")
    }

    fn guild_route() -> Route {
        Route::new(Method::GET, "/guilds/9/members")
    }

    fn headers(limit: u32, remaining: u32, reset_after: f64, bucket: &str) -> RatelimitHeaders {
        RatelimitHeaders {
            limit: Some(limit),
            remaining: Some(remaining),
            reset_after: Some(reset_after),
            bucket: Some(bucket.to_owned()),
            ..RatelimitHeaders::default()
        }
    }

    #[test]
    fn test_header_parsing() {
        let mut map = HeaderMap::new();
        map.insert("x-ratelimit-limit", "5".parse().unwrap());
        map.insert("x-ratelimit-remaining", "3".parse().unwrap());
        map.insert("x-ratelimit-reset-after", "1.25".parse().unwrap());
        map.insert("x-ratelimit-bucket", "abcd1234".parse().unwrap());
        map.insert("x-ratelimit-global", "true".parse().unwrap());
        map.insert("x-ratelimit-scope", "user".parse().unwrap());
        map.insert("retry-after", "2".parse().unwrap());

        let headers = RatelimitHeaders::parse(&map);
        assert_eq!(headers.limit, Some(5));
        assert_eq!(headers.remaining, Some(3));
        assert_eq!(headers.reset_after, Some(1.25));
        assert_eq!(headers.bucket.as_deref(), Some("abcd1234"));
        assert!(headers.global);
        assert_eq!(headers.scope.as_deref(), Some("user"));
        assert_eq!(headers.retry_after, Some(2.0));
        assert_eq!(headers.reset_delay(), Some(Duration::from_secs_f64(1.25)));
    }

    #[test]
    fn test_headers_absent() {
        let headers = RatelimitHeaders::parse(&HeaderMap::new());
        assert_eq!(headers.limit, None);
        assert!(!headers.global);
        assert_eq!(headers.reset_delay(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_fifo_order() {
        let limiter = Ratelimiter::new(RatelimitConfig::default());

        // Hold the bucket with an in-flight request, then queue two more
        // in a known order.
        let held = limiter.acquire(&channel_route()).await.unwrap();

        let first_route = channel_route();
        let first = limiter.acquire(&first_route);
        tokio::pin!(first);
        assert!(timeout(Duration::from_millis(10), &mut first).await.is_err());

        let second_route = channel_route();
        let second = limiter.acquire(&second_route);
        tokio::pin!(second);
        assert!(timeout(Duration::from_millis(10), &mut second).await.is_err());

        held.complete(Some(headers(5, 4, 1.0, "abc")));

        tokio::select! {
            biased;
            _ = &mut second => panic!("second request dispatched before first"),
            permit = &mut first => {
                permit.unwrap().complete(Some(headers(5, 3, 1.0, "abc")));
            }
        }

        let permit = second.await.unwrap();
        permit.complete(Some(headers(5, 2, 1.0, "abc")));
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhausted_bucket_waits_for_reset() {
        let limiter = Ratelimiter::new(RatelimitConfig::default());
        let start = Instant::now();

        let permit = limiter.acquire(&channel_route()).await.unwrap();
        permit.complete(Some(headers(5, 0, 2.0, "abc")));

        let permit = limiter.acquire(&channel_route()).await.unwrap();
        permit.complete(Some(headers(5, 4, 2.0, "abc")));

        assert!(start.elapsed() >= Duration::from_secs(2));
    }

    #[tokio::test(start_paused = true)]
    async fn test_global_lockout_freezes_all_buckets() {
        let limiter = Ratelimiter::new(RatelimitConfig::default());
        let start = Instant::now();

        // A global 429 on the channel route.
        let permit = limiter.acquire(&channel_route()).await.unwrap();
        permit.complete(Some(RatelimitHeaders {
            global: true,
            retry_after: Some(2.0),
            ..RatelimitHeaders::default()
        }));

        // An unrelated route must also wait out the lockout.
        let permit = limiter.acquire(&guild_route()).await.unwrap();
        permit.complete(Some(headers(5, 4, 1.0, "xyz")));

        assert!(start.elapsed() >= Duration::from_secs(2));
    }

    #[tokio::test(start_paused = true)]
    async fn test_bucket_hash_migration() {
        let limiter = Ratelimiter::new(RatelimitConfig::default());

        let permit = limiter.acquire(&channel_route()).await.unwrap();
        permit.complete(Some(headers(5, 4, 1.0, "abc")));

        // Let the drain task process the completion.
        tokio::task::yield_now().await;
        advance(Duration::from_millis(1)).await;

        let key = channel_route().ratelimit_key();
        assert_eq!(
            limiter.inner.route_hashes.get(&key).map(|h| h.value().clone()),
            Some("abc".to_owned())
        );
        assert!(limiter.inner.buckets.contains_key("abc:123"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_sweep_removes_idle_buckets() {
        let limiter = Ratelimiter::new(RatelimitConfig::default());

        let permit = limiter.acquire(&channel_route()).await.unwrap();
        // Full window: nothing pending, nothing owed.
        permit.complete(Some(headers(5, 5, 1.0, "abc")));
        advance(Duration::from_millis(1)).await;

        assert!(!limiter.inner.buckets.is_empty());

        advance(Duration::from_secs(301)).await;
        limiter.sweep_now();
        assert!(limiter.inner.buckets.is_empty());
    }

    #[tokio::test]
    async fn test_disabled_ratelimiter_refuses_buckets() {
        let limiter = Ratelimiter::disabled();
        let result = limiter.acquire(&channel_route()).await;
        assert!(matches!(
            result,
            Err(RestError::CreateBucketWithDisabledRatelimits)
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_acquire_front_takes_priority() {
        let limiter = Ratelimiter::new(RatelimitConfig::default());

        // Hold the bucket with an in-flight request.
        let held = limiter.acquire(&channel_route()).await.unwrap();

        let back_route = channel_route();
        let back = limiter.acquire(&back_route);
        tokio::pin!(back);
        // Give the back waiter time to enqueue before the front one.
        assert!(timeout(Duration::from_millis(10), &mut back).await.is_err());

        let front_route = channel_route();
        let front = limiter.acquire_front(&front_route);
        tokio::pin!(front);
        assert!(timeout(Duration::from_millis(10), &mut front)
            .await
            .is_err());

        held.complete(Some(headers(5, 4, 1.0, "abc")));

        tokio::select! {
            biased;
            _ = &mut back => panic!("front-queued request was not prioritized"),
            permit = &mut front => permit.unwrap().complete(Some(headers(5, 3, 1.0, "abc"))),
        }

        back.await.unwrap().complete(None);
    }
}
