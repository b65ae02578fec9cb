//! # Host Simulation Port
//!
//! A [`Port`] for host tests. It records what the kernel asked the
//! hardware to do instead of doing it. Every supervisor call is handed to
//! an optional per-thread hook, which lets a test play the part of "the
//! other threads" while the caller is switched out.

use std::cell::{Cell, RefCell};

use super::Port;
use crate::config::STACK_POOL_SIZE;
use crate::trap::Trap;

type TrapHook = Box<dyn FnMut(Trap)>;

thread_local! {
    static STACK_POINTER: Cell<usize> = const { Cell::new(0) };
    static SWITCH_REQUESTED: Cell<bool> = const { Cell::new(false) };
    static THREAD_MODE_ENTRIES: Cell<usize> = const { Cell::new(0) };
    static TRAPS: RefCell<Vec<Trap>> = const { RefCell::new(Vec::new()) };
    static HOOK: RefCell<Option<TrapHook>> = const { RefCell::new(None) };
}

pub struct SimPort;

impl SimPort {
    /// Forget everything recorded on this test thread.
    pub fn reset() {
        STACK_POINTER.with(|sp| sp.set(0));
        SWITCH_REQUESTED.with(|flag| flag.set(false));
        THREAD_MODE_ENTRIES.with(|n| n.set(0));
        TRAPS.with(|traps| traps.borrow_mut().clear());
        HOOK.with(|hook| *hook.borrow_mut() = None);
    }

    /// Run `hook` on every supervisor call. A call raised while the hook
    /// itself runs is only recorded.
    pub fn on_trap(hook: impl FnMut(Trap) + 'static) {
        HOOK.with(|slot| *slot.borrow_mut() = Some(Box::new(hook)));
    }

    /// Return and clear the switch-line pending bit.
    pub fn take_switch_request() -> bool {
        SWITCH_REQUESTED.with(|flag| flag.replace(false))
    }

    pub fn traps() -> Vec<Trap> {
        TRAPS.with(|traps| traps.borrow().clone())
    }

    pub fn stack_pointer() -> *mut u32 {
        STACK_POINTER.with(|sp| sp.get()) as *mut u32
    }

    pub fn set_stack_pointer(stack_pointer: *mut u32) {
        STACK_POINTER.with(|sp| sp.set(stack_pointer as usize));
    }

    pub fn thread_mode_entries() -> usize {
        THREAD_MODE_ENTRIES.with(|n| n.get())
    }
}

impl Port for SimPort {
    fn read_stack_pointer() -> *mut u32 {
        Self::stack_pointer()
    }

    fn write_stack_pointer(stack_pointer: *mut u32) {
        Self::set_stack_pointer(stack_pointer);
    }

    fn trigger_switch_request() {
        SWITCH_REQUESTED.with(|flag| flag.set(true));
    }

    fn raise_supervisor_call(trap: Trap) {
        TRAPS.with(|traps| traps.borrow_mut().push(trap));

        let hook = HOOK.with(|slot| slot.borrow_mut().take());
        if let Some(mut hook) = hook {
            hook(trap);
            HOOK.with(|slot| {
                let mut slot = slot.borrow_mut();
                // The hook may have installed its successor
                if slot.is_none() {
                    *slot = Some(hook);
                }
            });
        }
    }

    fn enter_thread_mode() {
        THREAD_MODE_ENTRIES.with(|n| n.set(n.get() + 1));
    }

    fn low_power_wait() {
        std::hint::spin_loop();
    }
}

/// A leaked stack region the size the firmware uses.
pub fn stack_region() -> &'static mut [u32] {
    Box::leak(vec![0u32; STACK_POOL_SIZE / 4].into_boxed_slice())
}

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}
