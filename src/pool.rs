//! Object pools for the types the connection engine allocates once and
//! wants to reuse forever: [`crate::http::request::Parser`] buffers,
//! [`crate::Response`] write buffers, and similar per-connection scratch
//! state.
//!
//! The engine itself already leans on "allocate once, `reset()`, reuse"
//! for the lifetime of a single connection (`HttpConnection::reset_request_response`).
//! This module generalizes the same discipline across connections, so a
//! closed connection's buffers aren't dropped and a new one's aren't
//! allocated from scratch.
//!
//! Two strategies are provided:
//!
//! - [`Standard`] — one global queue plus a thread-local single-slot
//!   fast path. Good default for most workloads.
//! - [`PerProcessor`] — one queue per CPU, round-robin assignment.
//!   Avoids cross-core contention on the shared queue under very high
//!   acquire/release rates, at the cost of lower reuse locality when
//!   threads migrate.
use crate::{
    http::{
        request::{Parser, Request},
        response::Response,
    },
    limits::{ReqLimits, RespLimits},
};
use crossbeam::queue::SegQueue;
use std::cell::RefCell;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

/// A type that can be pooled: constructed once, reset between uses
/// instead of dropped and reallocated.
///
/// `Config` carries whatever a fresh instance needs to size itself
/// (buffer capacities, limits) — most `Poolable` types need one, so
/// there's no default; use `Config = ()` if yours doesn't.
pub trait Poolable {
    type Config;

    /// Builds a fresh instance, used only on a pool miss.
    fn new(config: &Self::Config) -> Self;

    /// Restores the instance to its just-constructed state before it's
    /// handed out again.
    fn reset(&mut self, config: &Self::Config);
}

/// Counters for pool hit rate, exposed for diagnostics.
#[derive(Debug, Default)]
pub struct PoolStats {
    hits: AtomicU64,
    cold_creates: AtomicU64,
    releases: AtomicU64,
}

impl PoolStats {
    /// Number of `acquire()` calls satisfied from a pooled instance.
    pub fn hits(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }

    /// Number of `acquire()` calls that had to build a fresh instance.
    pub fn cold_creates(&self) -> u64 {
        self.cold_creates.load(Ordering::Relaxed)
    }

    /// Number of instances returned via `release()`.
    pub fn releases(&self) -> u64 {
        self.releases.load(Ordering::Relaxed)
    }

    #[inline]
    fn record_hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    fn record_cold(&self) {
        self.cold_creates.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    fn record_release(&self) {
        self.releases.fetch_add(1, Ordering::Relaxed);
    }
}

thread_local! {
    static FAST_SLOT: RefCell<Option<Box<dyn std::any::Any>>> = const { RefCell::new(None) };
}

/// A global pool of `T`, backed by a lock-free queue with a per-thread
/// single-slot fast path that avoids touching the queue at all on the
/// common "acquire, use, release" round trip within one thread.
pub struct Standard<T: Poolable + 'static> {
    queue: SegQueue<T>,
    stats: PoolStats,
}

impl<T: Poolable + 'static> Standard<T> {
    /// Builds an empty pool.
    pub fn new() -> Self {
        Standard {
            queue: SegQueue::new(),
            stats: PoolStats::default(),
        }
    }

    /// Builds a pool pre-filled with `n` freshly constructed instances,
    /// so the first `n` acquisitions across the process don't pay the
    /// cold-create cost.
    pub fn with_prewarm(n: usize, config: &T::Config) -> Self {
        let pool = Self::new();
        for _ in 0..n {
            pool.queue.push(T::new(config));
        }
        pool
    }

    /// Takes an instance from the thread-local fast slot, then the
    /// shared queue, then falls back to [`Poolable::new`].
    pub fn acquire(&self, config: &T::Config) -> T {
        if let Some(value) = FAST_SLOT.with(|slot| {
            slot.borrow_mut()
                .take()
                .and_then(|boxed| boxed.downcast::<T>().ok())
                .map(|boxed| *boxed)
        }) {
            self.stats.record_hit();
            return value;
        }

        if let Some(value) = self.queue.pop() {
            self.stats.record_hit();
            return value;
        }

        self.stats.record_cold();
        T::new(config)
    }

    /// Resets `value` and returns it to the thread-local fast slot if
    /// empty, otherwise the shared queue.
    pub fn release(&self, mut value: T, config: &T::Config) {
        value.reset(config);
        self.stats.record_release();

        let spilled = FAST_SLOT.with(|slot| {
            let mut slot = slot.borrow_mut();
            if slot.is_none() {
                *slot = Some(Box::new(value) as Box<dyn std::any::Any>);
                None
            } else {
                Some(value)
            }
        });

        if let Some(value) = spilled {
            self.queue.push(value);
        }
    }

    /// Hit/miss/release counters for this pool.
    pub fn stats(&self) -> &PoolStats {
        &self.stats
    }
}

impl<T: Poolable + 'static> Default for Standard<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// A value checked out of a [`PerProcessor`] pool, tagged with the
/// shard it came from so `release` returns it to the same queue it was
/// popped from rather than whichever CPU happens to release it.
pub struct Slot<T> {
    shard: usize,
    value: Option<T>,
}

impl<T> Slot<T> {
    /// Borrows the pooled value.
    pub fn get(&self) -> &T {
        self.value.as_ref().expect("Slot value taken")
    }

    /// Mutably borrows the pooled value.
    pub fn get_mut(&mut self) -> &mut T {
        self.value.as_mut().expect("Slot value taken")
    }
}

/// A pool sharded one queue per available CPU, with round-robin
/// assignment on acquire. Trades the `Standard` pool's single shared
/// queue (one point of contention) for `available_parallelism()`
/// independent queues.
pub struct PerProcessor<T: Poolable + 'static> {
    shards: Box<[SegQueue<T>]>,
    next: AtomicUsize,
    stats: PoolStats,
}

impl<T: Poolable + 'static> PerProcessor<T> {
    /// Builds an empty pool with one shard per available CPU (falling
    /// back to a single shard if parallelism can't be queried).
    pub fn new() -> Self {
        let shard_count = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);
        let shards = (0..shard_count).map(|_| SegQueue::new()).collect();
        PerProcessor {
            shards,
            next: AtomicUsize::new(0),
            stats: PoolStats::default(),
        }
    }

    /// Builds a pool pre-filled with `n` instances per shard.
    pub fn with_prewarm(n: usize, config: &T::Config) -> Self {
        let pool = Self::new();
        for shard in pool.shards.iter() {
            for _ in 0..n {
                shard.push(T::new(config));
            }
        }
        pool
    }

    fn next_shard(&self) -> usize {
        self.next.fetch_add(1, Ordering::Relaxed) % self.shards.len()
    }

    /// Pops from a round-robin-chosen shard, falling back to
    /// [`Poolable::new`] on a miss.
    pub fn acquire(&self, config: &T::Config) -> Slot<T> {
        let shard = self.next_shard();
        let value = match self.shards[shard].pop() {
            Some(value) => {
                self.stats.record_hit();
                value
            }
            None => {
                self.stats.record_cold();
                T::new(config)
            }
        };
        Slot {
            shard,
            value: Some(value),
        }
    }

    /// Resets the slot's value and returns it to the shard it was
    /// acquired from.
    pub fn release(&self, mut slot: Slot<T>, config: &T::Config) {
        if let Some(mut value) = slot.value.take() {
            value.reset(config);
            self.stats.record_release();
            self.shards[slot.shard].push(value);
        }
    }

    /// Hit/miss/release counters for this pool.
    pub fn stats(&self) -> &PoolStats {
        &self.stats
    }
}

impl<T: Poolable + 'static> Default for PerProcessor<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// The connection engine's per-type object pools, shared across every
/// worker so a closed connection's `Parser`/`Request`/`Response` go
/// back into circulation instead of being dropped with the connection.
pub(crate) struct Pools {
    parsers: Standard<Parser>,
    requests: Standard<Request>,
    responses: Standard<Response>,
}

impl Pools {
    /// Builds pools pre-filled with `n` instances of each type, matching
    /// the server's `max_connections` so the steady-state worker set
    /// never pays a cold-create cost after startup.
    pub(crate) fn with_prewarm(n: usize, req_limits: &ReqLimits, resp_limits: &RespLimits) -> Self {
        Pools {
            parsers: Standard::with_prewarm(n, req_limits),
            requests: Standard::with_prewarm(n, req_limits),
            responses: Standard::with_prewarm(n, resp_limits),
        }
    }

    pub(crate) fn acquire_parser(&self, limits: &ReqLimits) -> Parser {
        self.parsers.acquire(limits)
    }

    pub(crate) fn release_parser(&self, value: Parser, limits: &ReqLimits) {
        self.parsers.release(value, limits)
    }

    pub(crate) fn acquire_request(&self, limits: &ReqLimits) -> Request {
        self.requests.acquire(limits)
    }

    pub(crate) fn release_request(&self, value: Request, limits: &ReqLimits) {
        self.requests.release(value, limits)
    }

    pub(crate) fn acquire_response(&self, limits: &RespLimits) -> Response {
        self.responses.acquire(limits)
    }

    pub(crate) fn release_response(&self, value: Response, limits: &RespLimits) {
        self.responses.release(value, limits)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, PartialEq)]
    struct Buf {
        data: Vec<u8>,
        used: bool,
    }

    impl Poolable for Buf {
        type Config = ();

        fn new(_: &()) -> Self {
            Buf {
                data: vec![0; 16],
                used: false,
            }
        }

        fn reset(&mut self, _: &()) {
            self.used = false;
        }
    }

    #[test]
    fn standard_cold_create_then_reuse() {
        let pool: Standard<Buf> = Standard::new();
        assert_eq!(pool.stats().cold_creates(), 0);

        let mut buf = pool.acquire(&());
        assert_eq!(pool.stats().cold_creates(), 1);
        buf.used = true;
        pool.release(buf, &());

        let buf = pool.acquire(&());
        assert!(!buf.used);
        assert_eq!(pool.stats().hits(), 1);
    }

    #[test]
    fn standard_prewarm_avoids_cold_create() {
        let pool: Standard<Buf> = Standard::with_prewarm(4, &());
        let _a = pool.acquire(&());
        assert_eq!(pool.stats().cold_creates(), 0);
        assert_eq!(pool.stats().hits(), 1);
    }

    #[test]
    fn standard_fast_slot_round_trip() {
        let pool: Standard<Buf> = Standard::new();
        let buf = pool.acquire(&());
        pool.release(buf, &());
        // second acquire should come from the thread-local fast slot,
        // still counted as a hit, queue never touched.
        let buf = pool.acquire(&());
        assert!(pool.queue.is_empty());
        pool.release(buf, &());
    }

    #[test]
    fn per_processor_round_robins_shards() {
        let pool: PerProcessor<Buf> = PerProcessor::new();
        let slot = pool.acquire(&());
        let shard = slot.shard;
        pool.release(slot, &());

        // releasing returns to the same shard it came from.
        assert!(!pool.shards[shard].is_empty());
    }

    #[test]
    fn per_processor_reset_on_release() {
        let pool: PerProcessor<Buf> = PerProcessor::new();
        let mut slot = pool.acquire(&());
        slot.get_mut().used = true;
        pool.release(slot, &());

        let slot = pool.acquire(&());
        assert!(!slot.get().used);
    }

    #[test]
    fn per_processor_prewarm_fills_every_shard() {
        let pool: PerProcessor<Buf> = PerProcessor::with_prewarm(2, &());
        for shard in pool.shards.iter() {
            assert_eq!(shard.len(), 2);
        }
    }
}
