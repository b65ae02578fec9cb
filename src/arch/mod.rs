//! # Architecture Abstraction Layer
//!
//! The kernel core never touches hardware directly. Everything it needs
//! from the processor goes through the [`Port`] trait. The interrupt
//! disable/enable bracket is the one exception: it is provided by the
//! `critical-section` implementation linked into the firmware (for the
//! Cortex-M4 port, `cortex-m`'s single-core PRIMASK implementation).
//!
//! The single-core assumption is baked in here: on a multi-core part,
//! disabling interrupts does not exclude the other core and the critical
//! section implementation would have to become a real lock.
//!
//! Currently implements the Cortex-M4 port; extensible to other
//! architectures by adding sibling modules.

use crate::trap::Trap;

#[cfg(all(target_arch = "arm", target_os = "none"))]
pub mod cortex_m4;

#[cfg(test)]
pub mod sim;

/// Processor primitives the kernel calls into.
///
/// All functions are associated (no `self`): a port describes the one CPU
/// the kernel runs on.
pub trait Port {
    /// Current value of the thread-mode stack pointer.
    fn read_stack_pointer() -> *mut u32;

    /// Load the thread-mode stack pointer.
    fn write_stack_pointer(stack_pointer: *mut u32);

    /// Set the pending bit of the switch line. The switch itself happens
    /// once every higher-priority handler has returned.
    fn trigger_switch_request();

    /// Synchronous trap into the kernel with `trap` as the call number.
    fn raise_supervisor_call(trap: Trap);

    /// Resume the thread whose frame the stack pointer register points at.
    /// Called from the launch trap only; on hardware it does not return.
    fn enter_thread_mode();

    /// Sleep until the next interrupt. Used by the idle thread.
    fn low_power_wait();
}
