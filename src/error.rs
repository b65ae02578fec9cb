//! # Kernel Errors
//!
//! All failure signaling is by return value. The kernel never unwinds.

use thiserror::Error;

/// Why a thread couldn't be created.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum CreateError {
    /// Every slot of the thread table is taken.
    #[error("thread table is full")]
    TableFull,
    /// The stack region has no room left for another stack.
    #[error("stack pool exhausted")]
    StackPoolExhausted,
    /// Threads can only be created before `start`.
    #[error("threads cannot be created after the kernel has started")]
    KernelStarted,
}

/// A supervisor call the dispatcher refused. The thread table is left
/// untouched on every error path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum TrapError {
    /// The call number isn't one the kernel defines.
    #[error("unknown supervisor call #{0}")]
    Unknown(u8),
    /// A launch was requested with no thread selected, or a second time.
    #[error("no thread is waiting to be launched")]
    NotReady,
}
