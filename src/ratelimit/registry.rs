//! Concurrent per-client bucket registry with idle eviction.

use std::sync::Arc;
use std::time::Instant;

use dashmap::mapref::one::RefMut;
use dashmap::DashMap;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, trace};

use super::bucket::TokenBucket;
use super::clock::Clock;
use crate::config::RouteLimitConfig;

/// A client's bucket together with when it was last seen.
#[derive(Debug)]
pub struct Visitor {
    bucket: TokenBucket,
    last_seen: Instant,
}

impl Visitor {
    /// When this client last made a request.
    pub fn last_seen(&self) -> Instant {
        self.last_seen
    }
}

/// Exclusive access to one client's bucket.
///
/// Holds the lock of the map shard that owns the entry, so the entry cannot
/// be evicted while the handle is alive. Drop it promptly.
pub struct BucketHandle<'a> {
    visitor: RefMut<'a, String, Visitor>,
    now: Instant,
}

impl BucketHandle<'_> {
    /// Take one token from the bucket.
    pub fn try_consume(&mut self) -> bool {
        let now = self.now;
        self.visitor.bucket.try_consume(now)
    }

    /// Tokens currently available.
    pub fn tokens(&self) -> u64 {
        self.visitor.bucket.tokens()
    }
}

/// Maps client identifiers to token buckets.
///
/// Entries are created on first sight at full capacity and removed by
/// [`VisitorRegistry::sweep`] once idle longer than the configured timeout.
/// The map is sharded; every operation locks at most one shard at a time.
pub struct VisitorRegistry {
    /// Buckets indexed by client identifier
    visitors: DashMap<String, Visitor>,
    /// Bucket and eviction parameters
    config: RouteLimitConfig,
    /// Time source
    clock: Arc<dyn Clock>,
}

impl VisitorRegistry {
    /// Create an empty registry.
    pub fn new(config: RouteLimitConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            visitors: DashMap::new(),
            config,
            clock,
        }
    }

    /// Look up the client's bucket, creating a full one if absent, and mark
    /// the client as seen.
    pub fn get_or_create(&self, client_id: &str) -> BucketHandle<'_> {
        let mut visitor = match self.visitors.get_mut(client_id) {
            Some(visitor) => visitor,
            None => self
                .visitors
                .entry(client_id.to_string())
                .or_insert_with(|| {
                    let now = self.clock.now();
                    debug!(
                        client = %client_id,
                        capacity = self.config.capacity,
                        refill_per_second = self.config.refill_per_second,
                        "Creating new visitor bucket"
                    );
                    Visitor {
                        bucket: TokenBucket::new(
                            self.config.capacity,
                            self.config.refill_per_second,
                            now,
                        ),
                        last_seen: now,
                    }
                }),
        };

        // Read under the entry lock so handles for one client see
        // non-decreasing instants.
        let now = self.clock.now();
        visitor.last_seen = now;
        BucketHandle { visitor, now }
    }

    /// Run an admission check for the client.
    ///
    /// Returns `true` if the request may proceed.
    pub fn check(&self, client_id: &str) -> bool {
        let (allowed, remaining) = {
            let mut handle = self.get_or_create(client_id);
            let allowed = handle.try_consume();
            (allowed, handle.tokens())
        };

        trace!(
            client = %client_id,
            allowed = allowed,
            remaining = remaining,
            "Checked rate limit"
        );

        if !allowed {
            debug!(client = %client_id, "Rate limit exceeded");
        }
        allowed
    }

    /// Evict visitors idle for longer than the configured timeout.
    ///
    /// Returns the number of visitors removed.
    pub fn sweep(&self) -> usize {
        let now = self.clock.now();
        let idle_timeout = self.config.idle_timeout();
        let before = self.visitors.len();

        self.visitors
            .retain(|_, visitor| now.saturating_duration_since(visitor.last_seen) <= idle_timeout);

        let removed = before.saturating_sub(self.visitors.len());
        debug!(
            removed = removed,
            remaining = self.visitors.len(),
            "Swept idle visitors"
        );
        removed
    }

    /// Number of tracked visitors.
    pub fn visitor_count(&self) -> usize {
        self.visitors.len()
    }

    /// Start the periodic eviction sweep on the current tokio runtime.
    pub fn spawn_sweeper(self: &Arc<Self>) -> SweepHandle {
        let registry = Arc::clone(self);
        let period = self.config.sweep_interval();
        let (shutdown_tx, mut shutdown_rx) = oneshot::channel();

        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        registry.sweep();
                    }
                    _ = &mut shutdown_rx => {
                        debug!("Visitor sweeper stopping");
                        break;
                    }
                }
            }
        });

        info!(interval = ?period, "Started visitor sweeper");
        SweepHandle {
            shutdown: Some(shutdown_tx),
            task: Some(task),
        }
    }
}

/// Owns a running sweep task.
///
/// Dropping the handle aborts the task; [`SweepHandle::shutdown`] stops it
/// and waits for it to finish.
pub struct SweepHandle {
    shutdown: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<()>>,
}

impl SweepHandle {
    /// Stop the sweep task and wait for it to exit.
    pub async fn shutdown(mut self) {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }

    /// Whether the task has exited.
    pub fn is_finished(&self) -> bool {
        self.task.as_ref().map_or(true, |task| task.is_finished())
    }
}

impl Drop for SweepHandle {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}
