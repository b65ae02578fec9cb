//! # Prios Configuration
//!
//! Compile-time constants governing the kernel. All limits are fixed at
//! compile time. There is no dynamic allocation.

use crate::thread::Priority;

/// Maximum number of thread slots, including the idle thread in slot 0.
/// This bounds the static thread table.
pub const MAX_THREADS: usize = 8;

/// Per-thread stack size in bytes. Must be large enough for the deepest
/// call chain plus the hardware exception frame (32 bytes) and the
/// software-saved context (32 bytes for R4–R11).
pub const STACK_SIZE: usize = 0x400;

/// Size in bytes of the region the firmware hands to the stack allocator.
/// Thread count is bounded by `STACK_POOL_SIZE / STACK_SIZE` as well as by
/// `MAX_THREADS`.
pub const STACK_POOL_SIZE: usize = 0x4000;

/// Stack alignment required by the AAPCS at a public interface.
pub const STACK_ALIGN: usize = 8;

/// Default time slice in ticks, used when a thread is created without an
/// explicit slice.
pub const DEFAULT_TIME_SLICE: u32 = 10;

/// SysTick frequency in Hz. At 1 kHz one tick is one millisecond.
pub const TICK_HZ: u32 = 1000;

/// System clock frequency in Hz (default for STM32F4 at 16 MHz HSI).
pub const SYSTEM_CLOCK_HZ: u32 = 16_000_000;

/// Priority of the idle thread: the numerically largest, i.e. the least
/// urgent rank. Lower value = higher priority.
pub const IDLE_PRIORITY: Priority = Priority::MAX;

/// Exception priority of the switch line (PendSV) and of SysTick. Both sit
/// at the bottom so a context switch never preempts an application ISR.
pub const SWITCH_EXCEPTION_PRIORITY: u8 = 0xFE;

/// Exception priority of the supervisor call line. One notch above the
/// switch line so a yield request can always be taken.
pub const SVC_EXCEPTION_PRIORITY: u8 = 0xFD;

const _: () = assert!(STACK_SIZE % STACK_ALIGN == 0);
const _: () = assert!(STACK_SIZE >= 16 * 4 * 2);
const _: () = assert!(STACK_POOL_SIZE >= STACK_SIZE);
const _: () = assert!(MAX_THREADS >= 2);
const _: () = assert!(TICK_HZ > 0 && SYSTEM_CLOCK_HZ % TICK_HZ == 0);
