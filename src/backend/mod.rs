//! Block backend abstraction
//!
//! A backend wraps a storage target behind a small capability set: enqueue a
//! read or write, flush the queue to the underlying asynchronous mechanism,
//! and hand back finished operations when its readiness descriptor fires.
//! Completions are returned as owned values — the scheduler, not the
//! backend, decides what happens next — which makes the buffer handover from
//! a finished read to the paired write an ordinary move.

mod memory;
#[cfg(target_os = "linux")]
mod uring;

pub use memory::{CompletionOrder, MemoryBackend};
#[cfg(target_os = "linux")]
pub use uring::UringBackend;

use crate::core::{BlockBuffer, BlockDescriptor};
use crate::error::Result;
use std::os::fd::RawFd;

/// A finished read or write handed back by [`BlockBackend::process_ready`]
#[derive(Debug)]
pub struct Completion {
    /// Correlation id of the block this operation belonged to
    pub index: u64,
    /// Byte offset the operation targeted
    pub offset: u64,
    /// Bytes transferred, or a negated errno on failure
    pub result: i32,
    /// The block's buffer, ownership returned to the caller
    pub buffer: BlockBuffer,
}

impl Completion {
    /// Whether the operation failed
    pub fn is_failure(&self) -> bool {
        self.result < 0
    }

    /// The operation's failure as an I/O error, if it failed
    pub fn error(&self) -> Option<std::io::Error> {
        if self.result < 0 {
            Some(std::io::Error::from_raw_os_error(-self.result))
        } else {
            None
        }
    }
}

/// Capability set implemented by every block backend
///
/// All methods are non-blocking; the only place the engine waits is the
/// readiness multiplexer. Completion order across blocks is the backend's
/// choice and may differ from submission order.
pub trait BlockBackend {
    /// Logical size of the target in bytes
    fn total_bytes(&self) -> u64;

    /// Descriptors that become readable when completions are pending;
    /// stable for the backend's lifetime
    fn readiness_descriptors(&self) -> Vec<RawFd>;

    /// Queue a read of the block's range into its buffer
    ///
    /// The backend owns the buffer until the matching completion is handed
    /// back. Fails with `QueueFull` when the queue is exhausted.
    fn enqueue_read(&mut self, block: BlockDescriptor) -> Result<()>;

    /// Queue a write of the block's buffer to its range
    fn enqueue_write(&mut self, block: BlockDescriptor) -> Result<()>;

    /// Flush queued operations to the underlying mechanism; no-op when
    /// nothing is queued
    fn submit(&mut self) -> Result<()>;

    /// Drain finished operations after a readiness descriptor fired
    fn process_ready(&mut self) -> Result<Vec<Completion>>;

    /// Operations enqueued or in flight, for diagnostics
    fn pending(&self) -> usize;
}

/// Drain a non-blocking notification descriptor (eventfd or pipe read end)
pub(crate) fn drain_notify_fd(fd: RawFd) {
    let mut scratch = [0u8; 64];
    loop {
        // Safety: reading into a local buffer of the stated length.
        let n = unsafe { libc::read(fd, scratch.as_mut_ptr().cast(), scratch.len()) };
        if n <= 0 || (n as usize) < scratch.len() {
            break;
        }
    }
}

/// Signal a notification descriptor with an 8-byte counter increment
pub(crate) fn signal_notify_fd(fd: RawFd) {
    let one: u64 = 1;
    // Safety: writing 8 bytes from a valid local. A full pipe only delays
    // the wakeup the next drain would deliver anyway.
    let _ = unsafe { libc::write(fd, (&one as *const u64).cast(), 8) };
}
