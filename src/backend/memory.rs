//! In-memory block backend
//!
//! A backend over a plain byte vector, driving its readiness descriptor with
//! a non-blocking pipe. Operations queued with `enqueue_*` complete when
//! `submit` runs them, but the completions only become visible through
//! `process_ready` after the pipe fires — the same rhythm as a real
//! asynchronous backend, which makes this the test double for the whole
//! engine. Completion order and per-block failures are injectable.

use crate::backend::{drain_notify_fd, signal_notify_fd, BlockBackend, Completion};
use crate::core::BlockDescriptor;
use crate::error::{RawCopyError, Result};
use std::collections::{HashSet, VecDeque};
use std::os::fd::{AsRawFd, FromRawFd, OwnedFd, RawFd};
use std::sync::{Arc, Mutex, PoisonError};

const DEFAULT_QUEUE_CAPACITY: usize = 1024;

/// Order in which a submit batch surfaces its completions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompletionOrder {
    /// Completions arrive in submission order
    InOrder,
    /// Completions arrive in reverse submission order
    Reversed,
}

struct QueuedOp {
    write: bool,
    block: BlockDescriptor,
}

/// Block backend over an in-memory byte vector
pub struct MemoryBackend {
    data: Arc<Mutex<Vec<u8>>>,
    notify_rx: OwnedFd,
    notify_tx: OwnedFd,
    queued: Vec<QueuedOp>,
    ready: VecDeque<Completion>,
    order: CompletionOrder,
    fail_blocks: HashSet<u64>,
    queue_capacity: usize,
}

impl MemoryBackend {
    /// Create a backend owning the given bytes
    pub fn new(data: Vec<u8>) -> Result<Self> {
        Self::shared(Arc::new(Mutex::new(data)))
    }

    /// Create a zero-filled backend of `len` bytes
    pub fn with_capacity(len: usize) -> Result<Self> {
        Self::new(vec![0u8; len])
    }

    /// Create a backend over shared bytes, so a test can inspect the target
    /// after the engine consumed the backend
    pub fn shared(data: Arc<Mutex<Vec<u8>>>) -> Result<Self> {
        let (notify_rx, notify_tx) = new_notify_pipe()
            .map_err(|e| RawCopyError::setup("<memory backend>", e))?;
        Ok(Self {
            data,
            notify_rx,
            notify_tx,
            queued: Vec::new(),
            ready: VecDeque::new(),
            order: CompletionOrder::InOrder,
            fail_blocks: HashSet::new(),
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
        })
    }

    /// Shared handle to the backing bytes
    pub fn handle(&self) -> Arc<Mutex<Vec<u8>>> {
        Arc::clone(&self.data)
    }

    /// Choose the completion delivery order for subsequent submits
    pub fn set_completion_order(&mut self, order: CompletionOrder) {
        self.order = order;
    }

    /// Make every operation on the given block index fail with EIO
    pub fn fail_block(&mut self, index: u64) {
        self.fail_blocks.insert(index);
    }

    fn enqueue(&mut self, block: BlockDescriptor, write: bool) -> Result<()> {
        if self.queued.len() >= self.queue_capacity {
            return Err(RawCopyError::QueueFull {
                index: block.index,
                offset: block.offset,
            });
        }
        self.queued.push(QueuedOp { write, block });
        Ok(())
    }

    fn perform(&self, op: QueuedOp) -> Completion {
        let QueuedOp { write, mut block } = op;
        let len = block.len();
        let start = block.offset as usize;

        let result = if self.fail_blocks.contains(&block.index) {
            -libc::EIO
        } else {
            let mut data = self
                .data
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            match start.checked_add(len) {
                Some(end) if end <= data.len() => {
                    if write {
                        data[start..end].copy_from_slice(&block.buffer);
                    } else {
                        block.buffer.copy_from_slice(&data[start..end]);
                    }
                    len as i32
                }
                _ => -libc::EINVAL,
            }
        };

        Completion {
            index: block.index,
            offset: block.offset,
            result,
            buffer: block.buffer,
        }
    }
}

impl BlockBackend for MemoryBackend {
    fn total_bytes(&self) -> u64 {
        self.data
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len() as u64
    }

    fn readiness_descriptors(&self) -> Vec<RawFd> {
        vec![self.notify_rx.as_raw_fd()]
    }

    fn enqueue_read(&mut self, block: BlockDescriptor) -> Result<()> {
        self.enqueue(block, false)
    }

    fn enqueue_write(&mut self, block: BlockDescriptor) -> Result<()> {
        self.enqueue(block, true)
    }

    fn submit(&mut self) -> Result<()> {
        if self.queued.is_empty() {
            return Ok(());
        }
        let batch = std::mem::take(&mut self.queued);
        let mut finished: Vec<Completion> = batch.into_iter().map(|op| self.perform(op)).collect();
        if self.order == CompletionOrder::Reversed {
            finished.reverse();
        }
        self.ready.extend(finished);
        signal_notify_fd(self.notify_tx.as_raw_fd());
        Ok(())
    }

    fn process_ready(&mut self) -> Result<Vec<Completion>> {
        drain_notify_fd(self.notify_rx.as_raw_fd());
        Ok(self.ready.drain(..).collect())
    }

    fn pending(&self) -> usize {
        self.queued.len() + self.ready.len()
    }
}

/// Non-blocking pipe, `(read_end, write_end)`
fn new_notify_pipe() -> std::io::Result<(OwnedFd, OwnedFd)> {
    let mut fds = [0i32; 2];
    // Safety: pipe2 fills the two descriptors we immediately own.
    let rc = unsafe { libc::pipe2(fds.as_mut_ptr(), libc::O_CLOEXEC | libc::O_NONBLOCK) };
    if rc < 0 {
        return Err(std::io::Error::last_os_error());
    }
    Ok(unsafe { (OwnedFd::from_raw_fd(fds[0]), OwnedFd::from_raw_fd(fds[1])) })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::BlockBuffer;

    fn block(index: u64, len: usize) -> BlockDescriptor {
        BlockDescriptor {
            offset: index * 4096,
            index,
            buffer: BlockBuffer::zeroed(len, 4096).unwrap(),
        }
    }

    #[test]
    fn test_read_write_round_trip() {
        let mut source = MemoryBackend::new((0..8192u32).map(|i| (i % 256) as u8).collect())
            .unwrap();
        source.enqueue_read(block(1, 4096)).unwrap();
        source.submit().unwrap();

        let mut done = source.process_ready().unwrap();
        assert_eq!(done.len(), 1);
        let completion = done.pop().unwrap();
        assert_eq!(completion.result, 4096);
        assert_eq!(completion.buffer[0], (4096 % 256) as u8);

        let mut dest = MemoryBackend::with_capacity(8192).unwrap();
        dest.enqueue_write(BlockDescriptor {
            offset: completion.offset,
            index: completion.index,
            buffer: completion.buffer,
        })
        .unwrap();
        dest.submit().unwrap();
        assert_eq!(dest.process_ready().unwrap()[0].result, 4096);

        let written = dest.handle();
        let written = written.lock().unwrap();
        assert_eq!(written[4096], (4096 % 256) as u8);
    }

    #[test]
    fn test_completions_stay_hidden_until_processed() {
        let mut backend = MemoryBackend::with_capacity(4096).unwrap();
        backend.enqueue_read(block(0, 4096)).unwrap();
        assert_eq!(backend.pending(), 1);
        backend.submit().unwrap();
        assert_eq!(backend.pending(), 1);
        assert_eq!(backend.process_ready().unwrap().len(), 1);
        assert_eq!(backend.pending(), 0);
    }

    #[test]
    fn test_reversed_completion_order() {
        let mut backend = MemoryBackend::with_capacity(12288).unwrap();
        for i in 0..3 {
            backend.enqueue_read(block(i, 4096)).unwrap();
        }
        backend.set_completion_order(CompletionOrder::Reversed);
        backend.submit().unwrap();

        let indices: Vec<u64> = backend
            .process_ready()
            .unwrap()
            .iter()
            .map(|c| c.index)
            .collect();
        assert_eq!(indices, vec![2, 1, 0]);
    }

    #[test]
    fn test_failure_injection() {
        let mut backend = MemoryBackend::with_capacity(8192).unwrap();
        backend.fail_block(1);
        backend.enqueue_read(block(0, 4096)).unwrap();
        backend.enqueue_read(block(1, 4096)).unwrap();
        backend.submit().unwrap();

        let done = backend.process_ready().unwrap();
        assert_eq!(done[0].result, 4096);
        assert_eq!(done[1].result, -libc::EIO);
    }

    #[test]
    fn test_out_of_range_operation_fails() {
        let mut backend = MemoryBackend::with_capacity(4096).unwrap();
        backend.enqueue_read(block(5, 4096)).unwrap();
        backend.submit().unwrap();
        assert_eq!(backend.process_ready().unwrap()[0].result, -libc::EINVAL);
    }
}
