//! Routing of received frames into per-protocol buffer queues
//!
//! A [`Dispatcher`] reads a fixed-width identifier at a fixed offset of every
//! frame, picks the first listener registered for it (or the default route),
//! copies the frame into a buffer from that listener's pool and pushes the
//! buffer into the listener's queue.
//!
//! Nothing on this path blocks except the dispatcher's own lock: pool and
//! queue are only ever tried. Every frame that cannot be delivered is counted
//! and dropped.

use crate::core::ProtocolId;
use crate::error::Result;
use crate::pool::BufferPool;
use crate::queue::BufferQueue;
use crate::registry::{Registry, RouteBuilder};
use crate::stats::{DispatchStats, GlobalCounters};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, trace};

/// What happened to a single frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// Copied and queued
    Delivered,
    /// No listener and no default route
    Unmatched,
    /// Truncated frame discarded by the route's partial policy
    DroppedPartial,
    /// The route's pool had no free block
    PoolExhausted,
    /// The frame did not fit into a pool block
    Overflowed {
        /// Bytes beyond the block size
        bytes: usize,
    },
    /// The route's queue was full; the buffer went back to the pool
    QueueFull,
}

impl DispatchOutcome {
    /// Check whether the frame reached a queue
    pub fn is_delivered(&self) -> bool {
        matches!(self, DispatchOutcome::Delivered)
    }
}

/// Anything that accepts received frames
///
/// `frame` holds the bytes that were actually captured; `reported_len` is
/// the length the frame had on the link, larger than `frame.len()` when the
/// receiver had to cut it.
pub trait PackageHandler: Send + Sync {
    /// Route one frame
    fn handle_package(&self, frame: &[u8], reported_len: usize) -> DispatchOutcome;
}

struct State<Id, const N: usize> {
    registry: Registry<Id, N>,
    totals: GlobalCounters,
}

/// Fixed-capacity protocol dispatcher for up to `N` listeners
///
/// All registration, dispatching and counter access is serialized by one
/// internal lock, so counter reads always reflect whole dispatch operations.
///
/// # Example
///
/// ```
/// use protocol_dispatcher::{BoundedQueue, BufferQueue, Dispatcher, FixedBlockPool};
/// use std::sync::Arc;
///
/// let pool = Arc::new(FixedBlockPool::new(4, 64));
/// let queue = Arc::new(BoundedQueue::new(4));
///
/// // One-byte identifier right after a two-byte header
/// let dispatcher = Dispatcher::<u8, 4>::new(2);
/// dispatcher.add_queue(0x42, pool.clone(), queue.clone(), false)?;
///
/// dispatcher.handle_package(&[0xFF, 0xFF, 0x42, 1, 2, 3], 6);
/// let buffer = queue.try_receive().unwrap();
/// assert_eq!(buffer.as_slice(), &[0xFF, 0xFF, 0x42, 1, 2, 3]);
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
pub struct Dispatcher<Id: ProtocolId, const N: usize> {
    /// Position of the identifier within every frame
    offset: usize,
    state: Mutex<State<Id, N>>,
}

impl<Id: ProtocolId, const N: usize> Dispatcher<Id, N> {
    /// Create a dispatcher reading identifiers `offset` bytes into each frame
    pub fn new(offset: usize) -> Self {
        Dispatcher {
            offset,
            state: Mutex::new(State {
                registry: Registry::new(),
                totals: GlobalCounters::default(),
            }),
        }
    }

    /// Byte offset of the identifier field
    pub fn offset(&self) -> usize {
        self.offset
    }

    /// Maximum number of listeners
    pub fn capacity(&self) -> usize {
        N
    }

    /// Number of registered listeners, not counting the default route
    pub fn listener_count(&self) -> usize {
        self.state.lock().registry.len()
    }

    /// Check whether a catch-all route is installed
    pub fn has_default_queue(&self) -> bool {
        self.state.lock().registry.has_default()
    }

    /// Route frames carrying `id` into `queue`
    ///
    /// Fails without side effects once all `N` slots are taken. Registering
    /// the same identifier twice is allowed; the first registration receives
    /// all matching frames.
    pub fn add_queue(
        &self,
        id: Id,
        pool: Arc<dyn BufferPool>,
        queue: Arc<dyn BufferQueue>,
        drop_partial: bool,
    ) -> Result<()> {
        self.add_route(
            id,
            RouteBuilder::new()
                .with_pool(pool)
                .with_queue(queue)
                .with_drop_partial(drop_partial),
        )
    }

    /// Register a route for `id`
    ///
    /// Routes without pool or queue are rejected regardless of free capacity.
    pub fn add_route(&self, id: Id, route: RouteBuilder) -> Result<()> {
        let mut state = self.state.lock();
        state.registry.add(id, route)?;
        debug!(
            id = ?id,
            listeners = state.registry.len(),
            capacity = N,
            "Listener registered"
        );
        Ok(())
    }

    /// Route every frame no listener matches into `queue`
    ///
    /// Can only succeed once.
    pub fn set_default_queue(
        &self,
        pool: Arc<dyn BufferPool>,
        queue: Arc<dyn BufferQueue>,
        drop_partial: bool,
    ) -> Result<()> {
        self.set_default_route(
            RouteBuilder::new()
                .with_pool(pool)
                .with_queue(queue)
                .with_drop_partial(drop_partial),
        )
    }

    /// Install the catch-all route
    pub fn set_default_route(&self, route: RouteBuilder) -> Result<()> {
        let mut state = self.state.lock();
        state.registry.set_default(route)?;
        debug!("Default route registered");
        Ok(())
    }

    /// Route one frame
    ///
    /// Never blocks on pools or queues and never fails; frames that cannot
    /// be delivered are dropped and counted.
    pub fn handle_package(&self, frame: &[u8], reported_len: usize) -> DispatchOutcome {
        let id = Id::read_at(frame, self.offset);

        let mut guard = self.state.lock();
        let State { registry, totals } = &mut *guard;

        let Some(endpoint) = registry.resolve(id) else {
            totals.record_unmatched();
            trace!(id = ?id, len = frame.len(), "Unmatched frame dropped");
            return DispatchOutcome::Unmatched;
        };

        if reported_len > frame.len() && endpoint.drop_partial {
            endpoint.counters.record_partial();
            totals.drops.record_partial();
            debug!(
                id = ?id,
                len = frame.len(),
                reported_len,
                "Partial frame dropped"
            );
            return DispatchOutcome::DroppedPartial;
        }

        let mut buffer = match endpoint.pool.acquire(frame.len()) {
            Ok(buffer) => buffer,
            Err(err) => {
                let overflow = err.overflow();
                endpoint.counters.record_drop();
                totals.drops.record_drop();
                if overflow > 0 {
                    endpoint.counters.record_overflow(overflow);
                    totals.drops.record_overflow(overflow);
                    debug!(id = ?id, len = frame.len(), overflow, "Frame exceeds block size");
                    return DispatchOutcome::Overflowed { bytes: overflow };
                }
                debug!(id = ?id, len = frame.len(), "Buffer pool exhausted");
                return DispatchOutcome::PoolExhausted;
            }
        };

        // A pool may hand out a block smaller than it claims to support
        if let Err(err) = buffer.fill_from(frame) {
            endpoint.pool.release(buffer);
            let overflow = err.overflow();
            endpoint.counters.record_drop();
            endpoint.counters.record_overflow(overflow);
            totals.drops.record_drop();
            totals.drops.record_overflow(overflow);
            debug!(id = ?id, len = frame.len(), overflow, "Frame exceeds acquired buffer");
            return DispatchOutcome::Overflowed { bytes: overflow };
        }

        if let Err(buffer) = endpoint.queue.try_send(buffer) {
            endpoint.pool.release(buffer);
            endpoint.counters.record_drop();
            totals.drops.record_drop();
            debug!(id = ?id, len = frame.len(), "Queue full, frame dropped");
            return DispatchOutcome::QueueFull;
        }

        trace!(id = ?id, len = frame.len(), "Frame delivered");
        DispatchOutcome::Delivered
    }

    /// Frames dropped for lack of buffers or queue space, over all routes
    pub fn dropped_packages(&self) -> u32 {
        self.state.lock().totals.drops.dropped
    }

    /// Frames dropped on the routes feeding `queue`
    pub fn dropped_packages_for<Q: BufferQueue + ?Sized>(&self, queue: &Q) -> u32 {
        self.sum_for(queue, |c| c.dropped)
    }

    /// Truncated frames discarded by a partial policy, over all routes
    pub fn partial_packages(&self) -> u32 {
        self.state.lock().totals.drops.partial
    }

    /// Truncated frames discarded on the routes feeding `queue`
    pub fn partial_packages_for<Q: BufferQueue + ?Sized>(&self, queue: &Q) -> u32 {
        self.sum_for(queue, |c| c.partial)
    }

    /// Bytes that did not fit into pool blocks, over all routes
    pub fn overflowed_bytes(&self) -> u32 {
        self.state.lock().totals.drops.overflowed_bytes
    }

    /// Bytes that did not fit into pool blocks on the routes feeding `queue`
    pub fn overflowed_bytes_for<Q: BufferQueue + ?Sized>(&self, queue: &Q) -> u32 {
        self.sum_for(queue, |c| c.overflowed_bytes)
    }

    /// Frames no route accepted
    ///
    /// Stops increasing once a default route is installed.
    pub fn unmatched_packages(&self) -> u32 {
        self.state.lock().totals.unmatched
    }

    /// Zero every global and per-route counter
    ///
    /// Registered routes are left untouched.
    pub fn reset_error_counters(&self) {
        let mut guard = self.state.lock();
        let State { registry, totals } = &mut *guard;
        *totals = GlobalCounters::default();
        for endpoint in registry.endpoints_mut() {
            endpoint.counters = Default::default();
        }
        debug!("Error counters reset");
    }

    /// Snapshot of all counters
    pub fn stats(&self) -> DispatchStats {
        let state = self.state.lock();
        Self::snapshot(&state)
    }

    /// Snapshot of all counters, giving up if the lock is not free in time
    pub fn try_stats_for(&self, timeout: Duration) -> Option<DispatchStats> {
        let state = self.state.try_lock_for(timeout)?;
        Some(Self::snapshot(&state))
    }

    fn snapshot(state: &State<Id, N>) -> DispatchStats {
        DispatchStats {
            global: state.totals,
            listeners: state.registry.listener_stats(),
        }
    }

    fn sum_for<Q, F>(&self, queue: &Q, counter: F) -> u32
    where
        Q: BufferQueue + ?Sized,
        F: Fn(&crate::stats::DropCounters) -> u32,
    {
        let state = self.state.lock();
        state
            .registry
            .endpoints()
            .filter(|e| e.targets(queue))
            .fold(0u32, |sum, e| sum.saturating_add(counter(&e.counters)))
    }
}

impl<Id: ProtocolId, const N: usize> PackageHandler for Dispatcher<Id, N> {
    fn handle_package(&self, frame: &[u8], reported_len: usize) -> DispatchOutcome {
        Dispatcher::handle_package(self, frame, reported_len)
    }
}

impl<Id: ProtocolId, const N: usize> std::fmt::Debug for Dispatcher<Id, N> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("offset", &self.offset)
            .field("capacity", &N)
            .finish_non_exhaustive()
    }
}

/// Builder for dispatchers
pub struct DispatcherBuilder {
    offset: usize,
}

impl DispatcherBuilder {
    /// Create a new builder with the identifier at the start of the frame
    pub fn new() -> Self {
        DispatcherBuilder { offset: 0 }
    }

    /// Set the byte offset of the identifier field
    pub fn with_offset(mut self, offset: usize) -> Self {
        self.offset = offset;
        self
    }

    /// Build a dispatcher for identifier type `Id` and `N` listeners
    pub fn build<Id: ProtocolId, const N: usize>(self) -> Dispatcher<Id, N> {
        Dispatcher::new(self.offset)
    }
}

impl Default for DispatcherBuilder {
    fn default() -> Self {
        Self::new()
    }
}
