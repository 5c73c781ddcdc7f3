//! Configuration settings for rawcopy
//!
//! Defines the CLI arguments and the engine configuration with defaults
//! matching the classic qcow-to-raw tool (4 KiB blocks, submit every 10th
//! queued operation).

use crate::error::{RawCopyError, Result};
use clap::Parser;
use std::path::PathBuf;

/// rawcopy - asynchronous block-level image copy
#[derive(Parser, Debug, Clone)]
#[command(name = "rawcopy")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Copy a disk image to a raw file or block device, block by block")]
#[command(long_about = r#"
rawcopy streams fixed-size blocks from a source image into a raw file or
block device. Reads and writes are pipelined through asynchronous backends
so a bounded number of operations stay in flight at all times.

Examples:
  rawcopy /dev/sdb disk.img               # Image onto a block device
  rawcopy out.raw disk.img --yes          # Overwrite without prompting
  rawcopy out.raw disk.img -b 64K         # Larger transfer blocks
"#)]
pub struct CliArgs {
    /// Destination file or block device (existing data will be overwritten)
    #[arg(value_name = "DESTINATION")]
    pub destination: PathBuf,

    /// Source image
    #[arg(value_name = "SOURCE")]
    pub source: PathBuf,

    /// Transfer block size (e.g. 4096, 64K)
    #[arg(short = 'b', long, default_value = "4K", value_name = "SIZE")]
    pub block_size: String,

    /// Queue this many operations before each submit
    #[arg(long, default_value = "10", value_name = "NUM")]
    pub submit_batch: u64,

    /// Submission queue depth of the asynchronous backends
    #[arg(long, default_value = "64", value_name = "NUM")]
    pub queue_depth: u32,

    /// Poll interval in milliseconds while draining in-flight operations
    #[arg(long, default_value = "1", value_name = "MS")]
    pub drain_timeout_ms: u16,

    /// Overwrite an existing destination without prompting
    #[arg(short = 'y', long)]
    pub yes: bool,

    /// Quiet mode (suppress the progress bar)
    #[arg(short = 'q', long)]
    pub quiet: bool,
}

/// Runtime configuration for the copy engine
#[derive(Debug, Clone)]
pub struct CopyConfig {
    /// Fixed transfer block size in bytes; also the buffer alignment
    pub block_size: usize,
    /// Submit queued operations every N enqueues
    pub submit_batch: u64,
    /// Submission queue depth for the asynchronous backends
    pub queue_depth: u32,
    /// Upper bound on blocks in flight (read submitted, write not complete)
    pub max_in_flight: u64,
    /// Poll interval in milliseconds once no new reads are being generated
    pub drain_timeout_ms: u16,
}

impl Default for CopyConfig {
    fn default() -> Self {
        Self {
            block_size: 4096,
            submit_batch: 10,
            queue_depth: 64,
            max_in_flight: 64,
            drain_timeout_ms: 1,
        }
    }
}

impl CopyConfig {
    /// Build a configuration from parsed CLI arguments
    pub fn from_cli(args: &CliArgs) -> Result<Self> {
        let block_size = parse_size(&args.block_size).map_err(RawCopyError::Config)? as usize;

        let config = Self {
            block_size,
            submit_batch: args.submit_batch,
            queue_depth: args.queue_depth,
            max_in_flight: u64::from(args.queue_depth),
            drain_timeout_ms: args.drain_timeout_ms,
        };
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.block_size == 0 || !self.block_size.is_power_of_two() {
            return Err(RawCopyError::config(format!(
                "block size must be a power of two, got {}",
                self.block_size
            )));
        }
        if self.submit_batch == 0 {
            return Err(RawCopyError::config("submit batch must be at least 1"));
        }
        if self.queue_depth == 0 {
            return Err(RawCopyError::config("queue depth must be at least 1"));
        }
        if self.max_in_flight == 0 {
            return Err(RawCopyError::config("max in-flight must be at least 1"));
        }
        Ok(())
    }
}

/// Parse a human-readable size string (e.g. "4096", "64K", "1M")
pub fn parse_size(size: &str) -> std::result::Result<u64, String> {
    let size = size.trim().to_uppercase();

    if size.is_empty() {
        return Err("empty size string".to_string());
    }

    let (num_str, multiplier) = if size.ends_with("GB") || size.ends_with('G') {
        let num = size.trim_end_matches(|c| c == 'G' || c == 'B');
        (num, 1024u64 * 1024 * 1024)
    } else if size.ends_with("MB") || size.ends_with('M') {
        let num = size.trim_end_matches(|c| c == 'M' || c == 'B');
        (num, 1024u64 * 1024)
    } else if size.ends_with("KB") || size.ends_with('K') {
        let num = size.trim_end_matches(|c| c == 'K' || c == 'B');
        (num, 1024u64)
    } else if size.ends_with('B') {
        (size.trim_end_matches('B'), 1u64)
    } else {
        (size.as_str(), 1u64)
    };

    let num: u64 = num_str
        .trim()
        .parse()
        .map_err(|_| format!("invalid number: {}", num_str))?;

    Ok(num * multiplier)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_size() {
        assert_eq!(parse_size("4096").unwrap(), 4096);
        assert_eq!(parse_size("4K").unwrap(), 4096);
        assert_eq!(parse_size("64KB").unwrap(), 65536);
        assert_eq!(parse_size("1M").unwrap(), 1024 * 1024);
        assert_eq!(parse_size("2G").unwrap(), 2 * 1024 * 1024 * 1024);
        assert!(parse_size("").is_err());
        assert!(parse_size("not-a-size").is_err());
    }

    #[test]
    fn test_default_config_is_valid() {
        assert!(CopyConfig::default().validate().is_ok());
    }

    #[test]
    fn test_rejects_unaligned_block_size() {
        let config = CopyConfig {
            block_size: 5000,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_from_cli() {
        let args = CliArgs::parse_from(["rawcopy", "/tmp/dst", "/tmp/src", "-b", "8K"]);
        let config = CopyConfig::from_cli(&args).unwrap();
        assert_eq!(config.block_size, 8192);
        assert_eq!(config.submit_batch, 10);
        assert_eq!(config.max_in_flight, 64);
    }
}
