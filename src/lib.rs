//! # Protocol Dispatcher
//!
//! A fixed-capacity packet demultiplexer for onboard flight software.
//!
//! Frames arriving from a link-layer receiver carry a protocol identifier at a
//! fixed byte offset. The dispatcher reads that identifier, selects the first
//! listener registered for it (or a catch-all default route), copies the frame
//! into a buffer taken from the listener's pool and pushes it into the
//! listener's queue for a consumer task. This library provides:
//!
//! - A statically sized listener table with no allocation on the receive path
//! - Non-blocking buffer acquisition and queueing; backpressure shows up as
//!   counted drops, never as a stalled receiver
//! - Per-listener and global drop, partial and overflow accounting
//! - Reference lock-free buffer pool and queue implementations
//! - A receive loop driving any link-layer [`Receiver`]
//!
//! ## Features
//!
//! - `serde`: Enable serialization of diagnostic snapshots
//!
//! ## Example
//!
//! ```
//! use protocol_dispatcher::{BoundedQueue, BufferQueue, DispatcherBuilder, FixedBlockPool};
//! use std::sync::Arc;
//!
//! let pool = Arc::new(FixedBlockPool::new(8, 256));
//! let telemetry = Arc::new(BoundedQueue::new(8));
//!
//! // 16-bit identifier at byte 4, room for 4 listeners
//! let dispatcher = DispatcherBuilder::new().with_offset(4).build::<u16, 4>();
//! dispatcher.add_queue(0x0101, pool.clone(), telemetry.clone(), true)?;
//!
//! let mut frame = vec![0u8; 4];
//! frame.extend_from_slice(&0x0101u16.to_ne_bytes());
//! frame.extend_from_slice(b"payload");
//!
//! dispatcher.handle_package(&frame, frame.len());
//! assert_eq!(telemetry.try_receive().unwrap().as_slice(), frame.as_slice());
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod core;
pub mod dispatcher;
pub mod error;
pub mod pool;
pub mod queue;
pub mod receiver;
pub mod registry;
pub mod stats;

pub use self::core::{Buffer, ProtocolId};
pub use dispatcher::{DispatchOutcome, Dispatcher, DispatcherBuilder, PackageHandler};
pub use error::{DispatchError, PoolError, Result};
pub use pool::{BufferPool, FixedBlockPool};
pub use queue::{BoundedQueue, BufferQueue};
pub use receiver::{Heartbeat, ReceiveWorker, Receiver};
pub use registry::RouteBuilder;
pub use stats::{DispatchStats, DropCounters, GlobalCounters, ListenerStats};

/// Crate-wide defaults
pub mod limits {
    use std::time::Duration;

    /// How long a receive loop waits for a frame before checking its stop flag
    pub const DEFAULT_RECEIVE_TIMEOUT: Duration = Duration::from_millis(100);

    /// Receive buffer size of a worker built with `with_default_frame_len`
    pub const DEFAULT_MAX_FRAME_LEN: usize = 4096;

    /// Time allowed for dispatching one frame, added to the receive timeout
    /// when announcing liveness
    pub const DEFAULT_PROCESSING_BUDGET: Duration = Duration::from_millis(10);
}
