//! # Initial Trap Frame
//!
//! A freshly created thread has never run, so there is no register state to
//! restore. We fabricate one: a frame laid out exactly like the one the
//! context-switch path saves, so the first dispatch of a thread looks like a
//! return from an exception that preempted it at its entry point.
//!
//! ## Stack Layout (top = high address, growing down)
//!
//! ```text
//! [Hardware-restored region]   popped by the exception return
//!   xPSR  (Thumb bit set)
//!   PC    (entry point)
//!   LR    (EXC_RETURN sentinel)
//!   R12
//!   R3
//!   R2
//!   R1
//!   R0    (thread argument)
//! [Software-restored region]   popped by the switch handler
//!   R11
//!   ...
//!   R4                         <- returned stack pointer
//! ```

use crate::thread::ThreadEntry;

/// xPSR with only the Thumb execution-state bit set.
pub const XPSR_THUMB: u32 = 1 << 24;

/// Link register value of a fresh thread. Entry functions never return, so
/// this is never branched to; it's the thread-mode/PSP exception return
/// code, which makes a stray return fault instead of running off.
pub const EXC_RETURN_THREAD_PSP: u32 = 0xFFFF_FFFD;

/// Filler for registers that carry no state yet. Easy to spot in a dump.
pub const REGISTER_FILL: u32 = 0x0A0A_0A0A;

/// Words in a full frame.
pub const FRAME_WORDS: usize = 16;

/// Registers the switch handler saves and restores itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(C)]
pub struct SoftwareFrame {
    pub r4: u32,
    pub r5: u32,
    pub r6: u32,
    pub r7: u32,
    pub r8: u32,
    pub r9: u32,
    pub r10: u32,
    pub r11: u32,
}

/// Registers the processor stacks on exception entry, in its fixed order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(C)]
pub struct HardwareFrame {
    pub r0: u32,
    pub r1: u32,
    pub r2: u32,
    pub r3: u32,
    pub r12: u32,
    pub lr: u32,
    pub pc: u32,
    pub xpsr: u32,
}

/// A complete saved context, lowest address first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(C)]
pub struct TrapFrame {
    pub software: SoftwareFrame,
    pub hardware: HardwareFrame,
}

const _: () = assert!(core::mem::size_of::<TrapFrame>() == FRAME_WORDS * 4);

impl TrapFrame {
    /// Frame that starts `entry` with `arg` as its only parameter.
    pub fn new(entry: ThreadEntry, arg: usize) -> Self {
        // Exception return requires bit 0 of the return address clear; the
        // Thumb state comes from xPSR instead.
        let pc = (entry as usize as u32) & !1;
        Self {
            software: SoftwareFrame {
                r4: REGISTER_FILL,
                r5: REGISTER_FILL,
                r6: REGISTER_FILL,
                r7: REGISTER_FILL,
                r8: REGISTER_FILL,
                r9: REGISTER_FILL,
                r10: REGISTER_FILL,
                r11: REGISTER_FILL,
            },
            hardware: HardwareFrame {
                r0: arg as u32,
                r1: REGISTER_FILL,
                r2: REGISTER_FILL,
                r3: REGISTER_FILL,
                r12: REGISTER_FILL,
                lr: EXC_RETURN_THREAD_PSP,
                pc,
                xpsr: XPSR_THUMB,
            },
        }
    }

    /// Write the frame just below `stack_top` and return the address of its
    /// first word, which becomes the thread's saved stack pointer.
    ///
    /// # Safety
    /// `stack_top` must be 8-byte aligned, with at least `FRAME_WORDS`
    /// writable words below it belonging to a stack no thread is running on.
    pub(crate) unsafe fn push(self, stack_top: *mut u32) -> *mut u32 {
        let frame = stack_top.cast::<TrapFrame>().sub(1);
        frame.write(self);
        frame.cast()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    extern "C" fn entry(_: usize) -> ! {
        loop {}
    }

    #[test]
    fn test_frame_mimics_exception_entry() {
        let frame = TrapFrame::new(entry, 0x1234);

        assert_eq!(frame.hardware.r0, 0x1234);
        assert_eq!(frame.hardware.pc, (entry as usize as u32) & !1);
        assert_eq!(frame.hardware.lr, EXC_RETURN_THREAD_PSP);
        assert_eq!(frame.hardware.xpsr, XPSR_THUMB);
        assert_eq!(frame.software.r4, REGISTER_FILL);
        assert_eq!(frame.software.r11, REGISTER_FILL);
    }

    #[test]
    fn test_push_returns_lowest_word() {
        let mut stack = [0u64; 32];
        let top = unsafe { stack.as_mut_ptr().add(stack.len()) }.cast::<u32>();

        let sp = unsafe { TrapFrame::new(entry, 7).push(top) };

        assert_eq!(top as usize - sp as usize, FRAME_WORDS * 4);
        let words = unsafe { core::slice::from_raw_parts(sp, FRAME_WORDS) };
        // R4..R11 first, then R0 carrying the argument, xPSR last
        assert!(words[..8].iter().all(|&w| w == REGISTER_FILL));
        assert_eq!(words[8], 7);
        assert_eq!(words[13], EXC_RETURN_THREAD_PSP);
        assert_eq!(words[15], XPSR_THUMB);
    }
}
