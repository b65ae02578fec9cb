//! # Cortex-M4 Port Layer
//!
//! Hardware-specific code for the ARM Cortex-M4 (Thumb-2) processor.
//! Implements [`Port`] and the three exception handlers the kernel needs:
//! SVCall (yield and launch requests), PendSV (the context switch) and
//! SysTick (the scheduler tick).
//!
//! ## Context Switch Mechanism
//!
//! The Cortex-M4 uses a split-stack model:
//! - **MSP** (Main Stack Pointer): Used by the kernel and interrupt handlers
//! - **PSP** (Process Stack Pointer): Used by threads in Thread mode
//!
//! On exception entry, the hardware automatically stacks R0–R3, R12, LR, PC,
//! and xPSR onto the process stack. The PendSV handler manually saves and
//! restores R4–R11, which completes the full context save/restore.
//!
//! ## Interrupt Priorities
//!
//! - SVCall: 0xFD, so a thread's yield request is always taken at once
//! - PendSV, SysTick: 0xFE, so the switch only runs when no other ISR is active
//!
//! Threads never call `svc` from handler mode; interrupt handlers use
//! [`Rtos::request_switch`](crate::kernel::Rtos::request_switch) instead.

use core::arch::{asm, global_asm};

use cortex_m::peripheral::scb::SystemHandler;
use cortex_m::peripheral::syst::SystClkSource;
use cortex_m::peripheral::{SCB, SYST};
use cortex_m::register::psp;
use cortex_m_rt::exception;

use super::Port;
use crate::config::{
    SVC_EXCEPTION_PRIORITY, SWITCH_EXCEPTION_PRIORITY, SYSTEM_CLOCK_HZ, TICK_HZ,
};
use crate::kernel::RTOS;
use crate::trap::Trap;

/// The Cortex-M4 processor as seen by the kernel.
pub struct CortexM4;

impl Port for CortexM4 {
    #[inline]
    fn read_stack_pointer() -> *mut u32 {
        psp::read() as *mut u32
    }

    #[inline]
    fn write_stack_pointer(stack_pointer: *mut u32) {
        unsafe { psp::write(stack_pointer as u32) }
    }

    #[inline]
    fn trigger_switch_request() {
        SCB::set_pendsv();
        cortex_m::asm::isb();
    }

    #[inline]
    fn raise_supervisor_call(trap: Trap) {
        // The call number is an instruction immediate, so each trap gets
        // its own `svc`.
        unsafe {
            match trap {
                Trap::Launch => asm!("svc #3"),
                Trap::Yield => asm!("svc #100"),
            }
        }
    }

    fn enter_thread_mode() {
        // PSP points at R4 of a saved frame. Pop the software half here and
        // let the exception return pop the hardware half.
        unsafe {
            asm!(
                "mrs r0, psp",
                "ldmia r0!, {{r4-r11}}",
                "msr psp, r0",
                "mvn lr, #2",          // EXC_RETURN 0xFFFFFFFD: Thread mode, PSP
                "bx lr",
                options(noreturn)
            );
        }
    }

    #[inline]
    fn low_power_wait() {
        cortex_m::asm::wfi();
    }
}

// ---------------------------------------------------------------------------
// Board bring-up
// ---------------------------------------------------------------------------

/// Configure the SysTick timer for the scheduler tick.
///
/// Sets up SysTick to fire at `TICK_HZ` frequency using the processor
/// clock. Each tick runs [`Rtos::on_tick`](crate::kernel::Rtos::on_tick).
pub fn configure_systick(syst: &mut SYST) {
    let reload = SYSTEM_CLOCK_HZ / TICK_HZ - 1;
    syst.set_reload(reload);
    syst.clear_current();
    syst.set_clock_source(SystClkSource::Core);
    syst.enable_counter();
    syst.enable_interrupt();
}

/// Put PendSV and SysTick at the bottom of the priority range and SVCall
/// one notch above them.
pub fn set_exception_priorities(scb: &mut SCB) {
    unsafe {
        scb.set_priority(SystemHandler::PendSV, SWITCH_EXCEPTION_PRIORITY);
        scb.set_priority(SystemHandler::SysTick, SWITCH_EXCEPTION_PRIORITY);
        scb.set_priority(SystemHandler::SVCall, SVC_EXCEPTION_PRIORITY);
    }
}

/// Start the kernel. **Does not return.**
///
/// Configures the SysTick timer and exception priorities, then hands over
/// to [`Rtos::start`](crate::kernel::Rtos::start).
pub fn start(mut core_peripherals: cortex_m::Peripherals) -> ! {
    set_exception_priorities(&mut core_peripherals.SCB);
    configure_systick(&mut core_peripherals.SYST);
    RTOS.start()
}

// ---------------------------------------------------------------------------
// SVCall handler
// ---------------------------------------------------------------------------

// Hand the stacked frame of whichever stack the caller was on to
// `svc_entry`. Bit 2 of EXC_RETURN tells MSP (boot context) from PSP
// (thread). A tail branch keeps LR = EXC_RETURN for the Rust return.
global_asm!(
    ".section .text.SVCall,\"ax\",%progbits",
    ".global SVCall",
    ".type SVCall,%function",
    ".thumb_func",
    "SVCall:",
    "    tst lr, #4",
    "    ite eq",
    "    mrseq r0, msp",
    "    mrsne r0, psp",
    "    b {entry}",
    entry = sym svc_entry,
);

/// Decode the `svc` immediate and dispatch it.
///
/// # Safety
/// Called only from the `SVCall` stub with a pointer to the hardware frame.
unsafe extern "C" fn svc_entry(frame: *const u32) {
    // Stacked PC is the instruction after `svc #imm`; the immediate is the
    // low byte of the 16-bit instruction before it.
    let return_address = *frame.add(6) as *const u8;
    let number = *return_address.sub(2);
    let _ = RTOS.handle_trap(number);
}

// ---------------------------------------------------------------------------
// PendSV handler (context switch)
// ---------------------------------------------------------------------------

// ## Sequence
// 1. Save R4–R11 onto the current thread's stack and update PSP
// 2. Run the scheduler pass, which records PSP in the outgoing record and
//    loads PSP with the incoming thread's saved value
// 3. Restore R4–R11 from the new thread's stack
// 4. Return from exception (hardware restores R0–R3, R12, LR, PC, xPSR)
global_asm!(
    ".section .text.PendSV,\"ax\",%progbits",
    ".global PendSV",
    ".type PendSV,%function",
    ".thumb_func",
    "PendSV:",
    "    mrs r0, psp",
    "    stmdb r0!, {{r4-r11}}",
    "    msr psp, r0",
    "    bl {switch}",
    "    mrs r0, psp",
    "    ldmia r0!, {{r4-r11}}",
    "    msr psp, r0",
    "    mvn r0, #2",
    "    bx r0",
    switch = sym pendsv_switch,
);

extern "C" fn pendsv_switch() {
    RTOS.on_switch();
}

// ---------------------------------------------------------------------------
// SysTick handler
// ---------------------------------------------------------------------------

/// Scheduler tick entry point, at `TICK_HZ`.
#[exception]
fn SysTick() {
    RTOS.on_tick();
}
