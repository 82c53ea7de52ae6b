//! Error types for protocol dispatching

use thiserror::Error;

/// Result type for dispatcher operations
pub type Result<T> = std::result::Result<T, DispatchError>;

/// Errors reported by registration, receive loops and telemetry export
///
/// Dispatching itself never fails; every rejected frame is a counted drop.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DispatchError {
    /// Route registered without a pool or a queue
    #[error("Incomplete route: {0}")]
    IncompleteRoute(String),

    /// Every listener slot is taken
    #[error("Registry full: {0}")]
    RegistryFull(String),

    /// A default route can only be installed once
    #[error("Default route already set")]
    DefaultAlreadySet,

    /// The link-layer receiver failed
    #[error("Receive failed: {0}")]
    ReceiveFailed(String),

    /// Statistics could not be encoded
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl DispatchError {
    /// Create a new IncompleteRoute error
    pub fn incomplete_route(msg: impl Into<String>) -> Self {
        DispatchError::IncompleteRoute(msg.into())
    }

    /// Create a new RegistryFull error
    pub fn registry_full(msg: impl Into<String>) -> Self {
        DispatchError::RegistryFull(msg.into())
    }

    /// Create a new ReceiveFailed error
    pub fn receive_failed(msg: impl Into<String>) -> Self {
        DispatchError::ReceiveFailed(msg.into())
    }

    /// Create a new Serialization error
    pub fn serialization(msg: impl Into<String>) -> Self {
        DispatchError::Serialization(msg.into())
    }
}

/// Reasons a [`BufferPool`](crate::pool::BufferPool) cannot hand out a buffer
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum PoolError {
    /// No free block left
    #[error("Pool exhausted")]
    Exhausted,

    /// The request does not fit into a single block
    #[error("{requested} bytes exceed block size of {block_size}")]
    TooLarge {
        /// Bytes that were requested
        requested: usize,
        /// Size of one pool block
        block_size: usize,
    },
}

impl PoolError {
    /// Number of bytes that did not fit, zero for exhaustion
    pub fn overflow(&self) -> usize {
        match self {
            PoolError::Exhausted => 0,
            PoolError::TooLarge {
                requested,
                block_size,
            } => requested.saturating_sub(*block_size),
        }
    }
}
