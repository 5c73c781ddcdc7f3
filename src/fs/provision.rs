//! Destination provisioning
//!
//! Before the engine runs, the destination must exist and be large enough:
//! a missing path becomes a new file extended to the source size, an
//! existing regular file is truncated to it, and a block device has its
//! capacity checked via ioctl. Overwriting an existing target requires
//! confirmation unless the caller opted out.

use crate::error::{RawCopyError, Result};
use std::fs::{File, OpenOptions};
use std::io::{BufRead, Write};
use std::os::fd::{AsRawFd, RawFd};
use std::os::unix::fs::FileTypeExt;
use std::path::Path;
use tracing::info;

#[cfg(target_os = "linux")]
mod ioctls {
    nix::ioctl_read!(blkgetsize64, 0x12, 114, u64);
}

/// Capacity of a block device in bytes, via `BLKGETSIZE64`
#[cfg(target_os = "linux")]
pub fn device_capacity(fd: RawFd) -> std::io::Result<u64> {
    let mut size: u64 = 0;
    // Safety: fd is an open block device and size is a valid out pointer.
    unsafe { ioctls::blkgetsize64(fd, &mut size) }.map_err(std::io::Error::from)?;
    Ok(size)
}

/// Capacity of a block device in bytes (unsupported off Linux)
#[cfg(not(target_os = "linux"))]
pub fn device_capacity(_fd: RawFd) -> std::io::Result<u64> {
    Err(std::io::Error::new(
        std::io::ErrorKind::Unsupported,
        "block device sizing requires Linux",
    ))
}

/// Prepare `path` to receive `required` bytes
///
/// Creates and sizes the file when missing. When the target exists, asks
/// for confirmation first (skipped by `assume_yes`), then either verifies a
/// block device's capacity or truncates a regular file to the source size.
pub fn provision_destination(path: &Path, required: u64, assume_yes: bool) -> Result<()> {
    let meta = match std::fs::metadata(path) {
        Ok(meta) => meta,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            let file = File::create(path).map_err(|e| RawCopyError::setup(path, e))?;
            file.set_len(required)
                .map_err(|e| RawCopyError::setup(path, e))?;
            info!(path = %path.display(), bytes = required, "destination file created");
            return Ok(());
        }
        Err(e) => return Err(RawCopyError::setup(path, e)),
    };

    if !assume_yes && !confirm_overwrite(path)? {
        return Err(RawCopyError::Aborted);
    }

    let file = OpenOptions::new()
        .write(true)
        .open(path)
        .map_err(|e| RawCopyError::setup(path, e))?;

    if meta.file_type().is_block_device() {
        let available =
            device_capacity(file.as_raw_fd()).map_err(|e| RawCopyError::setup(path, e))?;
        if available < required {
            return Err(RawCopyError::InsufficientSpace {
                path: path.to_path_buf(),
                required,
                available,
            });
        }
        info!(path = %path.display(), capacity = available, "destination device verified");
    } else {
        file.set_len(required)
            .map_err(|e| RawCopyError::setup(path, e))?;
        info!(path = %path.display(), bytes = required, "destination file truncated");
    }
    Ok(())
}

/// Ask on stderr whether `path` may be overwritten; reads one stdin line
fn confirm_overwrite(path: &Path) -> Result<bool> {
    eprint!(
        "WARNING: all existing data in {} will be overwritten.\nDo you wish to continue? (y or n)  ",
        path.display()
    );
    let _ = std::io::stderr().flush();

    let mut answer = String::new();
    std::io::stdin()
        .lock()
        .read_line(&mut answer)
        .map_err(|e| RawCopyError::setup(path, e))?;
    Ok(answer.trim_start().starts_with('y'))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_destination_is_created_and_sized() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dest.raw");

        provision_destination(&path, 40960, true).unwrap();
        assert_eq!(std::fs::metadata(&path).unwrap().len(), 40960);
    }

    #[test]
    fn test_existing_file_is_resized() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dest.raw");
        std::fs::write(&path, b"previous contents").unwrap();

        provision_destination(&path, 8192, true).unwrap();
        assert_eq!(std::fs::metadata(&path).unwrap().len(), 8192);
    }

    #[test]
    fn test_unreachable_destination_is_a_setup_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing-subdir").join("dest.raw");

        let err = provision_destination(&path, 4096, true).unwrap_err();
        assert!(matches!(err, RawCopyError::Setup { .. }));
    }
}
