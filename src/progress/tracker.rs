//! Transfer progress tracker
//!
//! Maps bytes written to 5% buckets and rerenders a bracketed bar in place,
//! one render per newly crossed bucket — never twice for the same bucket,
//! no matter how many completions land inside it. Purely observational:
//! render failures are swallowed and nothing here feeds back into
//! scheduling.

use std::io::Write;

/// Number of progress buckets (5% each)
pub const BUCKETS: u64 = 20;

const PERCENT_STEP: u64 = 100 / BUCKETS;
const BAR_WIDTH: usize = BUCKETS as usize;

/// Idempotent 5%-step progress bar
#[derive(Debug)]
pub struct ProgressTracker<W: Write> {
    total: u64,
    shown: u64,
    out: W,
}

impl<W: Write> ProgressTracker<W> {
    /// Create a tracker for a transfer of `total` bytes writing to `out`
    pub fn new(total: u64, out: W) -> Self {
        Self {
            total,
            shown: 0,
            out,
        }
    }

    /// Update the bar from the cumulative byte count
    ///
    /// Renders once per bucket newly crossed since the last call; a
    /// zero-byte transfer only renders at [`finish`](Self::finish).
    pub fn advance(&mut self, bytes_written: u64) {
        if self.total == 0 {
            return;
        }
        let bucket = bytes_written.min(self.total) * BUCKETS / self.total;
        self.render_to(bucket);
    }

    /// Complete the bar and print the closing banner
    pub fn finish(&mut self) {
        self.render_to(BUCKETS);
        let _ = writeln!(self.out, "\nTRANSFER COMPLETE");
        let _ = self.out.flush();
    }

    /// Percentage rendered so far
    pub fn shown_percent(&self) -> u64 {
        self.shown * PERCENT_STEP
    }

    fn render_to(&mut self, bucket: u64) {
        let bucket = bucket.min(BUCKETS);
        while self.shown < bucket {
            self.shown += 1;
            let filled = self.shown as usize;
            let bar = if filled == BAR_WIDTH {
                "=".repeat(BAR_WIDTH)
            } else {
                format!(
                    "{}>{}",
                    "=".repeat(filled - 1),
                    " ".repeat(BAR_WIDTH - filled)
                )
            };
            let _ = write!(self.out, "\r[{}]  {:>3}%", bar, self.shown * PERCENT_STEP);
            let _ = self.out.flush();
        }
    }
}
