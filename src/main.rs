//! rawcopy CLI - asynchronous block-level image copy
//!
//! Provisions the destination, opens both io_uring backends and runs the
//! copy scheduler to completion.

use clap::Parser;
use rawcopy::config::CliArgs;
use tracing_subscriber::EnvFilter;

fn main() {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(false)
        .init();

    let args = CliArgs::parse();

    if let Err(e) = run(args) {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

#[cfg(target_os = "linux")]
fn run(args: CliArgs) -> rawcopy::Result<()> {
    use rawcopy::backend::{BlockBackend, UringBackend};
    use rawcopy::config::CopyConfig;
    use rawcopy::core::CopyScheduler;
    use rawcopy::fs::provision_destination;
    use rawcopy::progress::ProgressTracker;
    use std::io::Write;
    use tracing::info;

    let config = CopyConfig::from_cli(&args)?;

    let source = UringBackend::open_source(&args.source, config.queue_depth)?;
    let total = source.total_bytes();
    info!(
        path = %args.source.display(),
        size = %humansize::format_size(total, humansize::BINARY),
        "source opened"
    );

    provision_destination(&args.destination, total, args.yes)?;
    let dest = UringBackend::open_destination(&args.destination, config.queue_depth)?;

    let out: Box<dyn Write> = if args.quiet {
        Box::new(std::io::sink())
    } else {
        Box::new(std::io::stderr())
    };
    let progress = ProgressTracker::new(total, out);

    let scheduler = CopyScheduler::new(Box::new(source), Box::new(dest), &config, progress)?;
    let report = scheduler.run()?;

    info!(
        blocks = report.blocks,
        bytes = %humansize::format_size(report.bytes_written, humansize::BINARY),
        elapsed = ?report.elapsed,
        throughput = %format!("{}/s", humansize::format_size(report.throughput() as u64, humansize::BINARY)),
        "transfer finished"
    );
    Ok(())
}

#[cfg(not(target_os = "linux"))]
fn run(_args: CliArgs) -> rawcopy::Result<()> {
    Err(rawcopy::RawCopyError::config(
        "the io_uring backend requires Linux",
    ))
}
