//! Receive loop feeding a dispatcher from a link-layer receiver

use crate::dispatcher::{DispatchOutcome, PackageHandler};
use crate::error::{DispatchError, Result};
use crate::limits;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;
use tracing::{debug, error, info};

/// Source of raw frames, e.g. a SpaceWire or UART link driver
pub trait Receiver: Send {
    /// Wait up to `timeout` for the next frame
    ///
    /// Copies at most `buffer.len()` bytes of the frame into `buffer` and
    /// returns the length the frame had on the link, which may be larger
    /// than the buffer. Returns `Ok(None)` when the timeout expired.
    fn receive(&mut self, buffer: &mut [u8], timeout: Duration) -> Result<Option<usize>>;
}

/// Liveness signal emitted by a receive loop
///
/// Called once per loop iteration with the longest time the loop may take
/// before the next call. A supervisor that sees no call within that window
/// can treat the receive task as stalled.
pub trait Heartbeat: Send {
    /// Announce that the loop is alive for at least `processing_timeout`
    fn send(&mut self, processing_timeout: Duration);
}

impl<F: FnMut(Duration) + Send> Heartbeat for F {
    fn send(&mut self, processing_timeout: Duration) {
        self(processing_timeout)
    }
}

/// Drives a [`Receiver`] and hands every frame to a [`PackageHandler`]
///
/// Frames are received into one buffer allocated at construction. Frames
/// longer than that buffer are passed on truncated, together with their full
/// length, so the handler can apply its partial-frame policy.
pub struct ReceiveWorker<R> {
    receiver: R,
    handler: Arc<dyn PackageHandler>,
    buffer: Box<[u8]>,
    timeout: Duration,
    processing_budget: Duration,
    heartbeat: Option<Box<dyn Heartbeat>>,
}

impl<R: Receiver> ReceiveWorker<R> {
    /// Create a worker receiving frames of up to `max_frame_len` bytes
    pub fn new(receiver: R, handler: Arc<dyn PackageHandler>, max_frame_len: usize) -> Self {
        ReceiveWorker {
            receiver,
            handler,
            buffer: vec![0u8; max_frame_len].into_boxed_slice(),
            timeout: limits::DEFAULT_RECEIVE_TIMEOUT,
            processing_budget: limits::DEFAULT_PROCESSING_BUDGET,
            heartbeat: None,
        }
    }

    /// Create a worker with a [`limits::DEFAULT_MAX_FRAME_LEN`] receive buffer
    pub fn with_default_frame_len(receiver: R, handler: Arc<dyn PackageHandler>) -> Self {
        Self::new(receiver, handler, limits::DEFAULT_MAX_FRAME_LEN)
    }

    /// Set how long a single receive call may wait
    ///
    /// Bounds how quickly [`run`](Self::run) notices the stop flag.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Signal liveness through `heartbeat` on every iteration
    pub fn with_heartbeat(mut self, heartbeat: impl Heartbeat + 'static) -> Self {
        self.heartbeat = Some(Box::new(heartbeat));
        self
    }

    /// Set the time allowed for dispatching one frame
    ///
    /// Heartbeats cover the receive timeout plus this budget.
    pub fn with_processing_budget(mut self, budget: Duration) -> Self {
        self.processing_budget = budget;
        self
    }

    /// Size of the receive buffer
    pub fn max_frame_len(&self) -> usize {
        self.buffer.len()
    }

    /// Receive and dispatch at most one frame
    ///
    /// Sends one heartbeat first, if one is configured. Returns `Ok(None)` if
    /// no frame arrived within the timeout.
    pub fn poll_once(&mut self) -> Result<Option<DispatchOutcome>> {
        let window = self.timeout.saturating_add(self.processing_budget);
        if let Some(heartbeat) = self.heartbeat.as_mut() {
            heartbeat.send(window);
        }

        let Some(reported_len) = self.receiver.receive(&mut self.buffer, self.timeout)? else {
            return Ok(None);
        };

        let captured = reported_len.min(self.buffer.len());
        let outcome = self
            .handler
            .handle_package(&self.buffer[..captured], reported_len);
        Ok(Some(outcome))
    }

    /// Receive until `stop` is set, returning the number of frames handled
    ///
    /// A receiver error ends the loop and is returned.
    pub fn run(mut self, stop: Arc<AtomicBool>) -> Result<u64> {
        info!(
            max_frame_len = self.buffer.len(),
            timeout_ms = u64::try_from(self.timeout.as_millis()).unwrap_or(u64::MAX),
            heartbeat = self.heartbeat.is_some(),
            "Receive loop started"
        );

        let mut frames: u64 = 0;
        while !stop.load(Ordering::Acquire) {
            match self.poll_once() {
                Ok(Some(outcome)) => {
                    frames += 1;
                    if !outcome.is_delivered() {
                        debug!(?outcome, frames, "Frame not delivered");
                    }
                }
                Ok(None) => {}
                Err(e) => {
                    error!(error = %e, frames, "Receive loop aborted");
                    return Err(e);
                }
            }
        }

        info!(frames, "Receive loop stopped");
        Ok(frames)
    }

    /// Run the loop on a dedicated thread
    pub fn spawn(self, stop: Arc<AtomicBool>) -> Result<JoinHandle<Result<u64>>>
    where
        R: 'static,
    {
        std::thread::Builder::new()
            .name("dispatch-rx".to_string())
            .spawn(move || self.run(stop))
            .map_err(|e| DispatchError::receive_failed(format!("cannot spawn receive thread: {}", e)))
    }
}
