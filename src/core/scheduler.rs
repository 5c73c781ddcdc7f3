//! Copy scheduler
//!
//! The control loop: generate reads while there is image left, hand each
//! finished read's buffer to the destination as a write, and pump the
//! multiplexer until every submitted block has completed its write.
//! Everything runs on one thread; the multiplexer's wait is the only place
//! the loop blocks.
//!
//! A failed read or write is logged and counted as completed — the loop
//! always terminates, at the cost of silently dropping that block's data.
//! Callers that need stronger guarantees must layer their own policy on top.

use crate::backend::BlockBackend;
use crate::config::CopyConfig;
use crate::core::block::{BlockBuffer, BlockDescriptor};
use crate::core::multiplexer::{BackendRole, ReadinessMultiplexer};
use crate::core::session::TransferSession;
use crate::error::Result;
use crate::progress::ProgressTracker;
use std::io::Write;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Summary of a finished transfer
#[derive(Debug, Clone)]
pub struct TransferReport {
    /// Blocks submitted (and completed, successfully or not)
    pub blocks: u64,
    /// Bytes accounted as written
    pub bytes_written: u64,
    /// Wall-clock duration of the copy loop
    pub elapsed: Duration,
}

impl TransferReport {
    /// Average throughput in bytes per second
    pub fn throughput(&self) -> f64 {
        let secs = self.elapsed.as_secs_f64();
        if secs > 0.0 {
            self.bytes_written as f64 / secs
        } else {
            0.0
        }
    }
}

/// Single-threaded block-copy control loop
pub struct CopyScheduler<W: Write> {
    source: Box<dyn BlockBackend>,
    dest: Box<dyn BlockBackend>,
    mux: ReadinessMultiplexer,
    session: TransferSession,
    progress: ProgressTracker<W>,
    block_size: usize,
    submit_batch: u64,
    max_in_flight: u64,
    drain_timeout_ms: u16,
}

impl<W: Write> CopyScheduler<W> {
    /// Build a scheduler over an opened source and a provisioned destination
    ///
    /// The transfer length is the source's total size; the destination is
    /// assumed large enough (verified during provisioning).
    pub fn new(
        source: Box<dyn BlockBackend>,
        dest: Box<dyn BlockBackend>,
        config: &CopyConfig,
        progress: ProgressTracker<W>,
    ) -> Result<Self> {
        config.validate()?;

        let mut mux = ReadinessMultiplexer::new();
        mux.register(BackendRole::Source, &source.readiness_descriptors());
        mux.register(BackendRole::Destination, &dest.readiness_descriptors());

        let session = TransferSession::new(source.total_bytes(), config.block_size);

        Ok(Self {
            source,
            dest,
            mux,
            session,
            progress,
            block_size: config.block_size,
            submit_batch: config.submit_batch,
            max_in_flight: config.max_in_flight,
            drain_timeout_ms: config.drain_timeout_ms,
        })
    }

    /// Run the transfer to completion
    pub fn run(mut self) -> Result<TransferReport> {
        let started = Instant::now();

        while !self.session.is_done() {
            let generated = self.fill_one()?;
            if !generated {
                // Throttled or draining: flush batched stragglers so queued
                // operations cannot stall the drain.
                self.source.submit()?;
                self.dest.submit()?;
            }

            let timeout_ms = if generated { 0 } else { self.drain_timeout_ms };
            for role in self.mux.wait(timeout_ms)? {
                match role {
                    BackendRole::Source => self.drain_source()?,
                    BackendRole::Destination => self.drain_dest()?,
                }
            }
        }

        self.progress.finish();
        let report = TransferReport {
            blocks: self.session.submitted(),
            bytes_written: self.session.bytes_written(),
            elapsed: started.elapsed(),
        };
        debug!(
            blocks = report.blocks,
            bytes = report.bytes_written,
            "transfer drained"
        );
        Ok(report)
    }

    /// Enqueue the next read, if still filling and under the in-flight cap
    fn fill_one(&mut self) -> Result<bool> {
        if !self.session.is_filling() || self.session.in_flight() >= self.max_in_flight {
            return Ok(false);
        }
        let Some((offset, len, index)) = self.session.next_block() else {
            return Ok(false);
        };

        let buffer = BlockBuffer::zeroed(len, self.block_size)?;
        self.source.enqueue_read(BlockDescriptor {
            offset,
            index,
            buffer,
        })?;
        self.session.record_submitted();

        // Batch dispatch overhead; flush unconditionally once the last read
        // has been generated.
        if self.session.submitted() % self.submit_batch == 0 || !self.session.is_filling() {
            self.source.submit()?;
        }
        Ok(true)
    }

    /// Handle read completions: each finished read becomes a write on the
    /// destination, reusing the block's buffer and correlation id
    fn drain_source(&mut self) -> Result<()> {
        for completion in self.source.process_ready()? {
            if let Some(err) = completion.error() {
                warn!(block = completion.index, error = %err, "read failed");
            }
            self.session.record_read_completion();

            self.dest.enqueue_write(BlockDescriptor {
                offset: completion.offset,
                index: completion.index,
                buffer: completion.buffer,
            })?;

            // Batch while reads are still coming; once filling has ended,
            // every completion flushes to bound write-dispatch latency.
            if self.session.completed_reads() % self.submit_batch == 0
                || !self.session.is_filling()
            {
                self.dest.submit()?;
            }
        }
        Ok(())
    }

    /// Handle write completions: account bytes, release the buffer, tick
    /// the progress bar
    fn drain_dest(&mut self) -> Result<()> {
        for completion in self.dest.process_ready()? {
            if let Some(err) = completion.error() {
                warn!(block = completion.index, error = %err, "write failed");
            }
            self.session
                .record_write_completion(completion.buffer.len() as u64);
            self.progress.advance(self.session.bytes_written());
            // completion.buffer drops here, its single release.
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::MemoryBackend;

    fn patterned(len: usize) -> Vec<u8> {
        (0..len).map(|i| (i * 31 % 251) as u8).collect()
    }

    #[test]
    fn test_single_block_copy() {
        let source = MemoryBackend::new(patterned(4096)).unwrap();
        let dest = MemoryBackend::with_capacity(4096).unwrap();
        let dest_data = dest.handle();

        let progress = ProgressTracker::new(4096, Vec::new());
        let scheduler = CopyScheduler::new(
            Box::new(source),
            Box::new(dest),
            &CopyConfig::default(),
            progress,
        )
        .unwrap();

        let report = scheduler.run().unwrap();
        assert_eq!(report.blocks, 1);
        assert_eq!(report.bytes_written, 4096);
        assert_eq!(*dest_data.lock().unwrap(), patterned(4096));
    }

    #[test]
    fn test_in_flight_stays_bounded() {
        let config = CopyConfig {
            max_in_flight: 4,
            ..Default::default()
        };
        let source = MemoryBackend::new(patterned(64 * 4096)).unwrap();
        let dest = MemoryBackend::with_capacity(64 * 4096).unwrap();
        let dest_data = dest.handle();

        let progress = ProgressTracker::new(64 * 4096, Vec::new());
        let scheduler =
            CopyScheduler::new(Box::new(source), Box::new(dest), &config, progress).unwrap();

        let report = scheduler.run().unwrap();
        assert_eq!(report.blocks, 64);
        assert_eq!(*dest_data.lock().unwrap(), patterned(64 * 4096));
    }
}
