//! io_uring block backend for Linux
//!
//! Wraps an `io_uring` instance around one file or block device. An eventfd
//! registered with the ring serves as the readiness descriptor: the kernel
//! bumps it whenever completions land, the multiplexer polls it, and
//! `process_ready` reaps the completion queue.
//!
//! Buffers of in-flight operations are parked in a pending table keyed by
//! the block's correlation id (carried in `user_data`), which keeps the
//! kernel-visible pointer alive until the completion is reaped.

use crate::backend::{drain_notify_fd, BlockBackend, Completion};
use crate::core::BlockDescriptor;
use crate::error::{RawCopyError, Result};
use crate::fs::device_capacity;
use io_uring::{opcode, squeue, types, IoUring};
use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::os::fd::{AsRawFd, FromRawFd, OwnedFd, RawFd};
use std::os::unix::fs::FileTypeExt;
use std::path::Path;

struct PendingOp {
    offset: u64,
    buffer: crate::core::BlockBuffer,
}

enum Direction {
    Read,
    Write,
}

/// Asynchronous file/block-device backend built on io_uring
pub struct UringBackend {
    file: File,
    ring: IoUring,
    event_fd: OwnedFd,
    pending: HashMap<u64, PendingOp>,
    queued: usize,
    size: u64,
}

impl UringBackend {
    /// Open a source image read-only
    pub fn open_source(path: &Path, queue_depth: u32) -> Result<Self> {
        let file = File::open(path).map_err(|e| RawCopyError::open(path, e))?;
        Self::from_file(file, path, queue_depth)
    }

    /// Open an already-provisioned destination read-write
    pub fn open_destination(path: &Path, queue_depth: u32) -> Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(path)
            .map_err(|e| RawCopyError::open(path, e))?;
        Self::from_file(file, path, queue_depth)
    }

    fn from_file(file: File, path: &Path, queue_depth: u32) -> Result<Self> {
        let size = target_size(&file).map_err(|e| RawCopyError::open(path, e))?;
        let ring = IoUring::new(queue_depth).map_err(|e| RawCopyError::open(path, e))?;
        let event_fd = new_eventfd().map_err(|e| RawCopyError::open(path, e))?;
        ring.submitter()
            .register_eventfd(event_fd.as_raw_fd())
            .map_err(|e| RawCopyError::open(path, e))?;
        Ok(Self {
            file,
            ring,
            event_fd,
            pending: HashMap::new(),
            queued: 0,
            size,
        })
    }

    fn enqueue(&mut self, mut block: BlockDescriptor, direction: Direction) -> Result<()> {
        if self.pending.contains_key(&block.index) {
            return Err(RawCopyError::QueueFull {
                index: block.index,
                offset: block.offset,
            });
        }

        let fd = types::Fd(self.file.as_raw_fd());
        let entry = match direction {
            Direction::Read => {
                opcode::Read::new(fd, block.buffer.as_mut_ptr(), block.len() as u32)
                    .offset(block.offset)
                    .build()
                    .user_data(block.index)
            }
            Direction::Write => {
                opcode::Write::new(fd, block.buffer.as_ptr(), block.len() as u32)
                    .offset(block.offset)
                    .build()
                    .user_data(block.index)
            }
        };

        self.push(&entry, &block)?;
        self.queued += 1;
        // The buffer stays here until process_ready reaps the completion,
        // keeping the pointer in the submission entry valid.
        self.pending.insert(
            block.index,
            PendingOp {
                offset: block.offset,
                buffer: block.buffer,
            },
        );
        Ok(())
    }

    fn push(&mut self, entry: &squeue::Entry, block: &BlockDescriptor) -> Result<()> {
        // Safety: the buffer the entry points at outlives the operation via
        // the pending table.
        if unsafe { self.ring.submission().push(entry) }.is_ok() {
            return Ok(());
        }
        // Submission queue full; flush and retry once.
        self.ring.submit().map_err(RawCopyError::Submit)?;
        self.queued = 0;
        unsafe { self.ring.submission().push(entry) }.map_err(|_| RawCopyError::QueueFull {
            index: block.index,
            offset: block.offset,
        })
    }
}

impl BlockBackend for UringBackend {
    fn total_bytes(&self) -> u64 {
        self.size
    }

    fn readiness_descriptors(&self) -> Vec<RawFd> {
        vec![self.event_fd.as_raw_fd()]
    }

    fn enqueue_read(&mut self, block: BlockDescriptor) -> Result<()> {
        self.enqueue(block, Direction::Read)
    }

    fn enqueue_write(&mut self, block: BlockDescriptor) -> Result<()> {
        self.enqueue(block, Direction::Write)
    }

    fn submit(&mut self) -> Result<()> {
        if self.queued == 0 {
            return Ok(());
        }
        self.ring.submit().map_err(RawCopyError::Submit)?;
        self.queued = 0;
        Ok(())
    }

    fn process_ready(&mut self) -> Result<Vec<Completion>> {
        drain_notify_fd(self.event_fd.as_raw_fd());
        let mut finished = Vec::new();
        let pending = &mut self.pending;
        for cqe in self.ring.completion() {
            let index = cqe.user_data();
            match pending.remove(&index) {
                Some(op) => finished.push(Completion {
                    index,
                    offset: op.offset,
                    result: cqe.result(),
                    buffer: op.buffer,
                }),
                None => tracing::warn!(index, "completion with no pending operation"),
            }
        }
        Ok(finished)
    }

    fn pending(&self) -> usize {
        self.pending.len()
    }
}

/// Logical size of an open target: metadata length for regular files,
/// `BLKGETSIZE64` for block devices
fn target_size(file: &File) -> std::io::Result<u64> {
    let meta = file.metadata()?;
    if meta.file_type().is_block_device() {
        device_capacity(file.as_raw_fd())
    } else {
        Ok(meta.len())
    }
}

fn new_eventfd() -> std::io::Result<OwnedFd> {
    // Safety: eventfd returns a fresh descriptor we immediately own.
    let fd = unsafe { libc::eventfd(0, libc::EFD_CLOEXEC | libc::EFD_NONBLOCK) };
    if fd < 0 {
        return Err(std::io::Error::last_os_error());
    }
    Ok(unsafe { OwnedFd::from_raw_fd(fd) })
}
