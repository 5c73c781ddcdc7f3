//! Filesystem setup module
//!
//! Destination provisioning: existence checks, the interactive overwrite
//! prompt, file creation/truncation and block-device capacity verification.
//! Simple setup I/O performed before the copy engine starts.

mod provision;

pub use provision::*;
