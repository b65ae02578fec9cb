//! # Prios — Priority RTOS
//!
//! A preemptive, priority-based real-time kernel for single-core ARM
//! Cortex-M4 microcontrollers.
//!
//! ## Overview
//!
//! Prios multiplexes one CPU across a fixed set of threads created at boot.
//! The most urgent `Ready` thread always runs; equal priorities are broken
//! by slot order. Threads give up the CPU by yielding, by blocking on a
//! semaphore or mutex, by sleeping, or when the timer tick exhausts their
//! time slice.
//!
//! ## Architecture
//!
//! ```text
//! ┌────────────────────────────────────────────────────────┐
//! │                   Application Threads                  │
//! ├────────────────────────────────────────────────────────┤
//! │                 Kernel API (kernel.rs)                 │
//! │   init() · create_thread() · start() · yield_now()     │
//! │   sleep() · handle_trap() · on_switch() · on_tick()    │
//! ├──────────────┬────────────────────┬────────────────────┤
//! │  Scheduler   │   Thread Table     │  Sync Primitives   │
//! │ scheduler.rs │   thread.rs        │  sync.rs           │
//! │  ─ select    │   ─ TCB            │  ─ Semaphore       │
//! │  ─ tick      │   ─ ThreadState    │  ─ Mutex (PI)      │
//! ├──────────────┴──────┬─────────────┴────────────────────┤
//! │ Stack Pool stack.rs │ Initial Trap Frame frame.rs      │
//! ├─────────────────────┴──────────────────────────────────┤
//! │            Arch Port (arch/cortex_m4.rs)               │
//! │    SVCall · PendSV · SysTick · First Dispatch          │
//! ├────────────────────────────────────────────────────────┤
//! │         ARM Cortex-M4 Hardware (Thumb-2)               │
//! └────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Scheduling Model
//!
//! - **Priority**: lower number = more urgent; `u8::MAX` is the idle thread
//! - **Preemption**: a thread runs for its time slice (default 10 ticks)
//!   and is then put back in competition with the other `Ready` threads
//! - **Blocking**: no wait queues. A release wakes every blocked thread and
//!   each one re-checks its condition when selected
//! - **Priority inheritance**: a mutex owner runs at the priority of its
//!   most urgent direct waiter, one level deep
//!
//! ## Memory Model
//!
//! - **No heap**: All state is statically allocated
//! - **No `alloc`**: Pure `core` only
//! - **Fixed-size thread table**: `[ThreadControlBlock; MAX_THREADS]`
//! - **Stack pool**: one region carved into `STACK_SIZE` blocks, one per slot
//! - **Critical sections**: kernel state sits in a `critical_section::Mutex`
//!   and can only be borrowed with interrupts disabled

#![cfg_attr(not(test), no_std)]

pub mod config;
pub mod error;
pub mod trap;
pub mod stack;
pub mod frame;
pub mod thread;
pub mod scheduler;
pub mod arch;
pub mod kernel;
pub mod sync;

#[cfg(all(target_arch = "arm", target_os = "none"))]
pub mod logger;

pub use error::{CreateError, TrapError};
pub use kernel::Rtos;
pub use sync::{Mutex, Semaphore};
pub use thread::{Priority, ThreadConfig, ThreadId, ThreadState};
