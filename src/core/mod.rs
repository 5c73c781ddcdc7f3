//! Core copy engine module
//!
//! Block descriptors, the transfer session state machine, the readiness
//! multiplexer and the scheduler that ties them together.

mod block;
mod multiplexer;
mod scheduler;
mod session;

pub use block::*;
pub use multiplexer::*;
pub use scheduler::*;
pub use session::*;
