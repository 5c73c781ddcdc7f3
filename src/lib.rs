//! # rawcopy - Asynchronous Block-Level Image Copy
//!
//! rawcopy streams a disk image into a raw file or block device, block by
//! block, through two asynchronous backends: reads from the source and
//! writes to the destination are pipelined so a bounded number of
//! operations stay in flight, with in-order submission, out-of-order
//! completion tolerance and a graceful drain to completion.
//!
//! ## Design
//!
//! - **Backends** implement a small capability set — enqueue, submit,
//!   process-ready — and expose a readiness descriptor
//! - **One thread**: the only blocking point is a poll over both backends'
//!   readiness descriptors; completions are handled inline
//! - **Move-only buffers**: each block's buffer is owned by exactly one
//!   in-flight operation and is released once, after its write completes
//! - **Batched submission**: queued operations are flushed every tenth
//!   enqueue to amortize dispatch cost
//!
//! ## Quick Start
//!
//! ```no_run
//! use rawcopy::backend::MemoryBackend;
//! use rawcopy::config::CopyConfig;
//! use rawcopy::core::CopyScheduler;
//! use rawcopy::progress::ProgressTracker;
//!
//! let source = MemoryBackend::new(vec![0u8; 40960]).unwrap();
//! let dest = MemoryBackend::with_capacity(40960).unwrap();
//!
//! let progress = ProgressTracker::new(40960, std::io::stderr());
//! let scheduler = CopyScheduler::new(
//!     Box::new(source),
//!     Box::new(dest),
//!     &CopyConfig::default(),
//!     progress,
//! )
//! .unwrap();
//!
//! let report = scheduler.run().unwrap();
//! println!("copied {} bytes in {} blocks", report.bytes_written, report.blocks);
//! ```
//!
//! On Linux the production backend is [`backend::UringBackend`], which runs
//! the same trait over io_uring with a registered eventfd as the readiness
//! descriptor.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod backend;
pub mod config;
pub mod core;
pub mod error;
pub mod fs;
pub mod progress;

// Re-export commonly used types
pub use backend::{BlockBackend, Completion, MemoryBackend};
pub use config::CopyConfig;
pub use core::{BlockBuffer, BlockDescriptor, CopyScheduler, TransferReport, TransferSession};
pub use error::{RawCopyError, Result};
pub use progress::ProgressTracker;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
