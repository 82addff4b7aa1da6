//! Per-host idle connection pool for the outbound client engine.
//!
//! One [`HostQueue`] per `host:port`, holding idle [`TcpStream`]s up to
//! `max_idle_conns_per_host`. Acquiring blocks (via [`tokio::sync::Notify`])
//! when the host is already at `max_conns_per_host` in-flight connections,
//! rather than dialing past the configured ceiling.
use crate::limits::{ClientPoolLimits, DialLimits};
use crossbeam::queue::ArrayQueue;
use std::collections::HashMap;
use std::future::Future;
use std::io;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Instant;
use tokio::net::TcpStream;
use tokio::sync::Notify;
use tokio::time::timeout;

/// Raised by [`ConnectionPool::acquire`].
#[derive(Debug)]
pub enum AcquireError {
    /// Dialing a fresh connection failed.
    Io(io::Error),
    /// The host is at `max_conns_per_host` and no connection freed up
    /// within `acquire_timeout`.
    PoolExhausted,
}

impl std::fmt::Display for AcquireError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AcquireError::Io(err) => write!(f, "dial failed: {err}"),
            AcquireError::PoolExhausted => write!(f, "connection pool exhausted"),
        }
    }
}

impl std::error::Error for AcquireError {}

/// Establishes outbound connections. Implemented for [`TcpDial`]
/// (plain TCP); a TLS-terminating implementation can wrap it the same
/// way the engine's own [`crate::server::connection::HttpConnection`]
/// is generic over a stream type.
pub trait Dial: Send + Sync {
    /// Connects to `host_port` (already `host:port` formatted).
    fn connect(
        &self,
        host_port: &str,
    ) -> impl Future<Output = io::Result<TcpStream>> + Send;
}

/// Default [`Dial`]: a plain `TcpStream::connect` bounded by
/// [`DialLimits::dial_timeout`].
pub struct TcpDial {
    limits: DialLimits,
}

impl TcpDial {
    /// Builds a dialer using `limits` for connect timeouts.
    pub fn new(limits: DialLimits) -> Self {
        TcpDial { limits }
    }
}

impl Dial for TcpDial {
    async fn connect(&self, host_port: &str) -> io::Result<TcpStream> {
        match timeout(self.limits.dial_timeout, TcpStream::connect(host_port)).await {
            Ok(result) => result,
            Err(_) => Err(io::Error::new(io::ErrorKind::TimedOut, "dial timed out")),
        }
    }
}

/// A pooled connection, tagged with when it was dialed so the sweeper
/// can enforce `max_conn_lifetime` independently of idle time.
pub(crate) struct PooledConnection {
    pub(crate) stream: TcpStream,
    dialed_at: Instant,
    idle_since: Instant,
}

impl PooledConnection {
    fn is_expired(&self, limits: &ClientPoolLimits, now: Instant) -> bool {
        now.duration_since(self.dialed_at) > limits.max_conn_lifetime
            || now.duration_since(self.idle_since) > limits.max_idle_time
    }
}

/// The wake-on-release signal for a host, split out of [`HostQueue`]
/// and `Arc`-shared so a waiter can hold its own clone across an
/// `.await` instead of borrowing through the `hosts` mutex guard (which
/// doesn't live that long).
#[derive(Default)]
struct HostSignal {
    notify: Notify,
    waiters: AtomicUsize,
}

struct DecrementWaiters<'a>(&'a AtomicUsize);

impl Drop for DecrementWaiters<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::AcqRel);
    }
}

/// Idle-connection queue and in-flight accounting for a single host.
pub(crate) struct HostQueue {
    idle: ArrayQueue<PooledConnection>,
    signal: Arc<HostSignal>,
    total: AtomicUsize,
}

impl HostQueue {
    fn new(capacity: usize) -> Self {
        HostQueue {
            idle: ArrayQueue::new(capacity.max(1)),
            signal: Arc::new(HostSignal::default()),
            total: AtomicUsize::new(0),
        }
    }

    fn take_idle(&self, limits: &ClientPoolLimits) -> Option<TcpStream> {
        let now = Instant::now();
        while let Some(conn) = self.idle.pop() {
            if conn.is_expired(limits, now) {
                self.total.fetch_sub(1, Ordering::AcqRel);
                continue;
            }
            return Some(conn.stream);
        }
        None
    }
}

/// Per-host connection pool keyed by `host:port`.
///
/// Acquiring either reuses an idle connection, dials a fresh one (if
/// under `max_conns_per_host`), or waits on the host's [`Notify`] for a
/// release. Released connections go back to the idle queue unless the
/// pool is full or the connection has exceeded its lifetime, in which
/// case they're dropped (closing the socket) and the host's in-flight
/// count is decremented.
pub struct ConnectionPool<D: Dial = TcpDial> {
    hosts: Mutex<HashMap<Box<str>, HostQueue>>,
    limits: ClientPoolLimits,
    dial: D,
}

impl<D: Dial> ConnectionPool<D> {
    /// Builds a pool dialing new connections through `dial`.
    ///
    /// Generic over [`Dial`] rather than boxing it: the trait's
    /// `connect` method returns an opaque per-call future (native
    /// `async fn` in a trait), which isn't object-safe behind
    /// `Box<dyn Dial>` without an extra boxing layer. Monomorphizing
    /// over `D` keeps the common `TcpDial` path allocation-free.
    pub fn new(limits: ClientPoolLimits, dial: D) -> Self {
        ConnectionPool {
            hosts: Mutex::new(HashMap::new()),
            limits,
            dial,
        }
    }

    /// Acquires a connection to `host_port`, reusing an idle one when
    /// available, dialing when the host has spare capacity, or waiting
    /// for a release otherwise. Fails with [`AcquireError::PoolExhausted`]
    /// if no connection becomes available within `acquire_timeout`.
    pub async fn acquire(&self, host_port: &str) -> Result<TcpStream, AcquireError> {
        match timeout(self.limits.acquire_timeout, self.acquire_inner(host_port)).await {
            Ok(result) => result,
            Err(_) => Err(AcquireError::PoolExhausted),
        }
    }

    async fn acquire_inner(&self, host_port: &str) -> Result<TcpStream, AcquireError> {
        loop {
            let under_cap = {
                let mut hosts = self.hosts.lock().unwrap();
                let queue = hosts
                    .entry(host_port.into())
                    .or_insert_with(|| HostQueue::new(self.limits.max_idle_conns_per_host));

                if let Some(stream) = queue.take_idle(&self.limits) {
                    return Ok(stream);
                }

                let under_cap = queue.total.load(Ordering::Acquire) < self.limits.max_conns_per_host;
                if under_cap {
                    queue.total.fetch_add(1, Ordering::AcqRel);
                }
                under_cap
            };

            if under_cap {
                match self.dial.connect(host_port).await {
                    Ok(stream) => return Ok(stream),
                    Err(err) => {
                        let hosts = self.hosts.lock().unwrap();
                        if let Some(queue) = hosts.get(host_port) {
                            queue.total.fetch_sub(1, Ordering::AcqRel);
                        }
                        return Err(AcquireError::Io(err));
                    }
                }
            }

            self.wait_for_release(host_port).await;
        }
    }

    async fn wait_for_release(&self, host_port: &str) {
        let signal = {
            let hosts = self.hosts.lock().unwrap();
            match hosts.get(host_port) {
                Some(queue) => queue.signal.clone(),
                None => return,
            }
        };

        signal.waiters.fetch_add(1, Ordering::AcqRel);
        // Decrements on every exit path, including the acquire-level
        // deadline cancelling this future mid-wait, so `waiters` never
        // drifts from the number of tasks actually blocked here.
        let _guard = DecrementWaiters(&signal.waiters);
        signal.notify.notified().await;
    }

    /// Returns a connection to the pool. Dropped instead of reinserted
    /// if the host's idle queue is full or the connection has expired.
    pub fn release(&self, host_port: &str, stream: TcpStream, dialed_at: Instant) {
        let hosts = self.hosts.lock().unwrap();
        let Some(queue) = hosts.get(host_port) else {
            return;
        };

        let conn = PooledConnection {
            stream,
            dialed_at,
            idle_since: Instant::now(),
        };

        if conn.is_expired(&self.limits, Instant::now()) || queue.idle.push(conn).is_err() {
            queue.total.fetch_sub(1, Ordering::AcqRel);
        }

        if queue.signal.waiters.load(Ordering::Acquire) > 0 {
            queue.signal.notify.notify_one();
        }
    }

    /// Drops expired idle connections across every host. Intended to
    /// be driven by a periodic background task.
    pub fn sweep(&self) {
        let hosts = self.hosts.lock().unwrap();
        let now = Instant::now();
        for queue in hosts.values() {
            let mut kept = Vec::new();
            while let Some(conn) = queue.idle.pop() {
                if conn.is_expired(&self.limits, now) {
                    queue.total.fetch_sub(1, Ordering::AcqRel);
                } else {
                    kept.push(conn);
                }
            }
            for conn in kept {
                let _ = queue.idle.push(conn);
            }
        }
    }
}
