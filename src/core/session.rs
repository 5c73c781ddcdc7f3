//! Transfer session state
//!
//! A [`TransferSession`] is the engine's working state: where the next read
//! goes, how many operations were submitted and how many completed. It is
//! mutated only from the single control-loop thread, so plain fields are
//! enough — no locking, no atomics.

/// Global phase of a transfer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// New reads are still being generated
    Filling,
    /// All reads submitted; waiting for in-flight operations to finish
    Draining,
    /// Every submitted block has completed its write
    Done,
}

/// Counters and cursor for a single transfer
#[derive(Debug)]
pub struct TransferSession {
    total_size: u64,
    block_size: usize,
    next_offset: u64,
    submitted: u64,
    completed_reads: u64,
    completed_writes: u64,
    bytes_written: u64,
}

impl TransferSession {
    /// Create a session for a transfer of `total_size` bytes in
    /// `block_size` chunks
    pub fn new(total_size: u64, block_size: usize) -> Self {
        Self {
            total_size,
            block_size,
            next_offset: 0,
            submitted: 0,
            completed_reads: 0,
            completed_writes: 0,
            bytes_written: 0,
        }
    }

    /// Current phase of the session
    pub fn phase(&self) -> Phase {
        if self.next_offset < self.total_size {
            Phase::Filling
        } else if self.completed_writes < self.submitted {
            Phase::Draining
        } else {
            Phase::Done
        }
    }

    /// Whether new reads are still being generated
    pub fn is_filling(&self) -> bool {
        self.phase() == Phase::Filling
    }

    /// Whether the transfer is complete
    pub fn is_done(&self) -> bool {
        self.phase() == Phase::Done
    }

    /// Next block to read, as `(offset, length, index)`
    ///
    /// Advances the cursor. The final block may be shorter than the block
    /// size; every byte of `[0, total_size)` is covered exactly once.
    pub fn next_block(&mut self) -> Option<(u64, usize, u64)> {
        if self.next_offset >= self.total_size {
            return None;
        }
        let offset = self.next_offset;
        let len = (self.total_size - offset).min(self.block_size as u64) as usize;
        let index = offset / self.block_size as u64;
        self.next_offset = offset + len as u64;
        Some((offset, len, index))
    }

    /// Record that a read was enqueued
    pub fn record_submitted(&mut self) {
        self.submitted += 1;
    }

    /// Record a read completion (successful or failed)
    pub fn record_read_completion(&mut self) {
        self.completed_reads += 1;
        debug_assert!(self.completed_reads <= self.submitted);
    }

    /// Record a write completion (successful or failed) of `len` bytes
    ///
    /// `bytes_written` advances even for a failed write; the accounting
    /// keeps the termination condition reachable and the gap is visible only
    /// in the destination's actual contents.
    pub fn record_write_completion(&mut self, len: u64) {
        self.completed_writes += 1;
        self.bytes_written += len;
        debug_assert!(self.completed_writes <= self.submitted);
    }

    /// Total bytes this transfer covers
    pub fn total_size(&self) -> u64 {
        self.total_size
    }

    /// Reads submitted so far
    pub fn submitted(&self) -> u64 {
        self.submitted
    }

    /// Read completions observed so far
    pub fn completed_reads(&self) -> u64 {
        self.completed_reads
    }

    /// Write completions observed so far
    pub fn completed_writes(&self) -> u64 {
        self.completed_writes
    }

    /// Bytes accounted as written so far
    pub fn bytes_written(&self) -> u64 {
        self.bytes_written
    }

    /// Blocks whose write has not yet completed
    pub fn in_flight(&self) -> u64 {
        self.submitted - self.completed_writes
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_empty_transfer_is_immediately_done() {
        let session = TransferSession::new(0, 4096);
        assert_eq!(session.phase(), Phase::Done);
        assert_eq!(session.submitted(), 0);
    }

    #[test]
    fn test_phase_transitions() {
        let mut session = TransferSession::new(8192, 4096);
        assert_eq!(session.phase(), Phase::Filling);

        session.next_block().unwrap();
        session.record_submitted();
        assert_eq!(session.phase(), Phase::Filling);

        session.next_block().unwrap();
        session.record_submitted();
        assert_eq!(session.phase(), Phase::Draining);
        assert!(session.next_block().is_none());

        session.record_read_completion();
        session.record_read_completion();
        assert_eq!(session.phase(), Phase::Draining);

        session.record_write_completion(4096);
        session.record_write_completion(4096);
        assert_eq!(session.phase(), Phase::Done);
        assert_eq!(session.bytes_written(), 8192);
    }

    #[test]
    fn test_tail_block_is_short() {
        let mut session = TransferSession::new(10000, 4096);
        assert_eq!(session.next_block(), Some((0, 4096, 0)));
        assert_eq!(session.next_block(), Some((4096, 4096, 1)));
        assert_eq!(session.next_block(), Some((8192, 1808, 2)));
        assert_eq!(session.next_block(), None);
    }

    #[test]
    fn test_out_of_order_accounting_is_order_independent() {
        // Write completions for blocks 2 then 1: counters only, no ordering.
        let mut session = TransferSession::new(8192, 4096);
        session.next_block();
        session.record_submitted();
        session.next_block();
        session.record_submitted();
        session.record_read_completion();
        session.record_read_completion();

        session.record_write_completion(4096); // block 2 first
        assert_eq!(session.phase(), Phase::Draining);
        session.record_write_completion(4096); // block 1 second
        assert_eq!(session.phase(), Phase::Done);
    }

    proptest! {
        #[test]
        fn blocks_tile_the_transfer(total in 0u64..300_000) {
            let mut session = TransferSession::new(total, 4096);
            let mut expected_offset = 0u64;
            while let Some((offset, len, index)) = session.next_block() {
                prop_assert_eq!(offset, expected_offset);
                prop_assert_eq!(index, offset / 4096);
                prop_assert!(len > 0 && len <= 4096);
                expected_offset = offset + len as u64;
            }
            prop_assert_eq!(expected_offset, total);
        }
    }
}
