//! Readiness multiplexer
//!
//! The single blocking point of the engine: waits on the union of both
//! backends' readiness descriptors and reports which side has completions to
//! process. The timeout is the caller's lever — zero while reads are still
//! being generated, a short interval while draining.

use crate::error::{RawCopyError, Result};
use nix::poll::{poll, PollFd, PollFlags, PollTimeout};
use std::os::fd::{BorrowedFd, RawFd};

/// Which backend a readiness descriptor belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendRole {
    /// The backend reads are queued against
    Source,
    /// The backend writes are queued against
    Destination,
}

/// Waits for readiness across both backends' descriptors
#[derive(Debug, Default)]
pub struct ReadinessMultiplexer {
    entries: Vec<(BackendRole, RawFd)>,
}

impl ReadinessMultiplexer {
    /// Create an empty multiplexer
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a backend's readiness descriptors under its role
    pub fn register(&mut self, role: BackendRole, fds: &[RawFd]) {
        for &fd in fds {
            self.entries.push((role, fd));
        }
    }

    /// Wait up to `timeout_ms` for readiness; returns the roles with
    /// pending completions (deduplicated, possibly empty on timeout)
    ///
    /// Any poll failure is fatal to the run.
    pub fn wait(&self, timeout_ms: u16) -> Result<Vec<BackendRole>> {
        if self.entries.is_empty() {
            return Ok(Vec::new());
        }

        // Safety: every registered descriptor outlives this call; backends
        // keep their readiness descriptors open for their whole lifetime.
        let borrowed: Vec<BorrowedFd<'_>> = self
            .entries
            .iter()
            .map(|&(_, fd)| unsafe { BorrowedFd::borrow_raw(fd) })
            .collect();
        let mut poll_fds: Vec<PollFd<'_>> = borrowed
            .iter()
            .map(|fd| PollFd::new(*fd, PollFlags::POLLIN))
            .collect();

        let ready = poll(&mut poll_fds, PollTimeout::from(timeout_ms))
            .map_err(|e| RawCopyError::Wait(e.into()))?;
        if ready == 0 {
            return Ok(Vec::new());
        }

        let wanted = PollFlags::POLLIN | PollFlags::POLLERR | PollFlags::POLLHUP;
        let mut roles = Vec::new();
        for (poll_fd, &(role, _)) in poll_fds.iter().zip(self.entries.iter()) {
            let fired = poll_fd.revents().is_some_and(|r| r.intersects(wanted));
            if fired && !roles.contains(&role) {
                roles.push(role);
            }
        }
        Ok(roles)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::os::fd::{AsRawFd, FromRawFd, OwnedFd};

    fn pipe_pair() -> (OwnedFd, OwnedFd) {
        let mut fds = [0i32; 2];
        let rc = unsafe { libc::pipe2(fds.as_mut_ptr(), libc::O_CLOEXEC | libc::O_NONBLOCK) };
        assert_eq!(rc, 0);
        unsafe { (OwnedFd::from_raw_fd(fds[0]), OwnedFd::from_raw_fd(fds[1])) }
    }

    #[test]
    fn test_timeout_returns_no_roles() {
        let (rx, _tx) = pipe_pair();
        let mut mux = ReadinessMultiplexer::new();
        mux.register(BackendRole::Source, &[rx.as_raw_fd()]);
        assert!(mux.wait(0).unwrap().is_empty());
    }

    #[test]
    fn test_ready_descriptor_reports_its_role() {
        let (src_rx, src_tx) = pipe_pair();
        let (dst_rx, _dst_tx) = pipe_pair();
        let mut mux = ReadinessMultiplexer::new();
        mux.register(BackendRole::Source, &[src_rx.as_raw_fd()]);
        mux.register(BackendRole::Destination, &[dst_rx.as_raw_fd()]);

        let one = 1u64;
        unsafe { libc::write(src_tx.as_raw_fd(), (&one as *const u64).cast(), 8) };

        let roles = mux.wait(10).unwrap();
        assert_eq!(roles, vec![BackendRole::Source]);
    }

    #[test]
    fn test_empty_multiplexer_never_blocks() {
        let mux = ReadinessMultiplexer::new();
        assert!(mux.wait(1000).unwrap().is_empty());
    }
}
