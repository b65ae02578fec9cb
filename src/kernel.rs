//! # Kernel
//!
//! Top-level kernel object and public API for Prios.
//!
//! [`Rtos`] owns the whole kernel state. The state sits behind a
//! `critical_section::Mutex`, so every path that reads or changes the
//! thread table first has to produce a `CriticalSection` token, i.e. run
//! with interrupts disabled. The type parameter selects the processor port.
//!
//! ## Startup Sequence
//!
//! ```text
//! reset_handler (cortex-m-rt)
//!   └─► main()
//!         ├─► RTOS.init(region)       ← Stack pool + idle thread
//!         ├─► RTOS.create_thread()    ← Register threads (×N)
//!         └─► cortex_m4::start()      ← Launch scheduler (no return)
//!               ├─► Configure SysTick
//!               ├─► Set exception priorities
//!               └─► RTOS.start()
//!                     ├─► first scheduler pass
//!                     └─► svc #3 ─► SP = first frame ─► thread mode
//! ```
//!
//! ## Trap and Interrupt Entry Points
//!
//! The port's exception handlers call into the portable halves here:
//! - supervisor call → [`Rtos::handle_trap`]
//! - switch line (PendSV) → [`Rtos::on_switch`]
//! - timer tick (SysTick) → [`Rtos::on_tick`]

use core::cell::{RefCell, RefMut};
use core::marker::PhantomData;

use critical_section::{CriticalSection, Mutex};

use crate::arch::Port;
use crate::config::TICK_HZ;
use crate::error::{CreateError, TrapError};
use crate::scheduler::Scheduler;
use crate::thread::{Priority, ThreadConfig, ThreadEntry, ThreadId, ThreadState};
use crate::trap::Trap;

// ---------------------------------------------------------------------------
// Global kernel instance
// ---------------------------------------------------------------------------

/// The kernel instance the Cortex-M4 exception handlers dispatch to.
#[cfg(all(target_arch = "arm", target_os = "none"))]
pub static RTOS: Rtos<crate::arch::cortex_m4::CortexM4> = Rtos::new();

/// A kernel instance bound to port `P`.
pub struct Rtos<P: Port> {
    scheduler: Mutex<RefCell<Scheduler>>,
    _port: PhantomData<fn() -> P>,
}

/// Body of the idle thread: wait for interrupts, forever.
extern "C" fn idle_thread<P: Port>(_: usize) -> ! {
    loop {
        P::low_power_wait();
    }
}

/// Convert milliseconds to ticks, rounding up so a delay never comes out
/// shorter than asked for.
pub const fn ms_to_ticks(ms: u32) -> u32 {
    ticks_at(ms, TICK_HZ)
}

const fn ticks_at(ms: u32, tick_hz: u32) -> u32 {
    let ticks = (ms as u64 * tick_hz as u64).div_ceil(1000);
    if ticks > u32::MAX as u64 {
        u32::MAX
    } else {
        ticks as u32
    }
}

impl<P: Port> Rtos<P> {
    pub const fn new() -> Self {
        Self {
            scheduler: Mutex::new(RefCell::new(Scheduler::new())),
            _port: PhantomData,
        }
    }

    /// Borrow the kernel state. The token proves interrupts are disabled.
    pub(crate) fn scheduler<'cs>(&'cs self, cs: CriticalSection<'cs>) -> RefMut<'cs, Scheduler> {
        self.scheduler.borrow_ref_mut(cs)
    }

    /// Run `f` on a consistent snapshot of the kernel state.
    pub fn inspect<R>(&self, f: impl FnOnce(&Scheduler) -> R) -> R {
        critical_section::with(|cs| f(&self.scheduler(cs)))
    }

    // -----------------------------------------------------------------------
    // Boot-time API
    // -----------------------------------------------------------------------

    /// Initialize the kernel with `region` as stack memory and create the
    /// idle thread in slot 0.
    ///
    /// Must be called before any other kernel function.
    pub fn init(&self, region: &'static mut [u32]) -> Result<(), CreateError> {
        critical_section::with(move |cs| self.scheduler(cs).init(region, idle_thread::<P>))?;
        log::info!("kernel initialized");
        Ok(())
    }

    /// Create a thread running `entry(arg)` at `priority` with the default
    /// time slice.
    pub fn create_thread(
        &self,
        entry: ThreadEntry,
        arg: usize,
        priority: Priority,
    ) -> Result<ThreadId, CreateError> {
        self.spawn(entry, arg, ThreadConfig::with_priority(priority))
    }

    /// Create a thread with an explicit configuration.
    ///
    /// # Returns
    /// - `Ok(id)`: The thread's slot in the thread table.
    /// - `Err(_)`: Table full, stack pool exhausted, or kernel started.
    ///
    /// # Example
    /// ```ignore
    /// let id = RTOS.spawn(worker, 0, ThreadConfig { priority: 3, time_slice: 5 })?;
    /// ```
    pub fn spawn(
        &self,
        entry: ThreadEntry,
        arg: usize,
        config: ThreadConfig,
    ) -> Result<ThreadId, CreateError> {
        let created = critical_section::with(|cs| self.scheduler(cs).create_thread(entry, arg, config));
        match created {
            Ok(id) => log::info!("thread {} created (priority {})", id.index(), config.priority),
            Err(e) => log::warn!("thread creation failed: {}", e),
        }
        created
    }

    /// First scheduler pass: choose and mark the first thread to run.
    /// `start` follows it with the launch trap.
    pub fn launch(&self) -> Option<ThreadId> {
        critical_section::with(|cs| self.scheduler(cs).launch())
    }

    /// Start scheduling. **Does not return.**
    ///
    /// The port's timer and exception priorities must be configured
    /// already. Waits forever if no thread has been created.
    pub fn start(&self) -> ! {
        match self.launch() {
            Some(first) => {
                log::info!("kernel start: launching thread {}", first.index());
                P::raise_supervisor_call(Trap::Launch);
            }
            None => log::warn!("kernel start: no threads"),
        }
        loop {
            P::low_power_wait();
        }
    }

    // -----------------------------------------------------------------------
    // Thread API
    // -----------------------------------------------------------------------

    /// Give up the CPU. The scheduler runs at the next safe point and may
    /// pick the caller again. A no-op until the first thread is running.
    pub fn yield_now(&self) {
        if self.is_running() {
            P::raise_supervisor_call(Trap::Yield);
        }
    }

    /// Sleep for `ticks` timer ticks. `sleep(0)` just yields.
    pub fn sleep(&self, ticks: u32) {
        critical_section::with(|cs| self.scheduler(cs).sleep_current(ticks));
        self.yield_now();
    }

    /// Sleep for at least `ms` milliseconds.
    pub fn delay_ms(&self, ms: u32) {
        self.sleep(ms_to_ticks(ms));
    }

    /// Pend a context switch from interrupt context. Ignored until the
    /// first thread is running.
    pub fn request_switch(&self) {
        if self.is_running() {
            P::trigger_switch_request();
        }
    }

    // -----------------------------------------------------------------------
    // Exception entry points
    // -----------------------------------------------------------------------

    /// Supervisor call dispatcher.
    ///
    /// - `Yield`: pend the switch line and return.
    /// - `Launch`: point the stack pointer register at the first thread's
    ///   frame and enter thread mode. Accepted once.
    ///
    /// Unknown numbers are reported in debug builds and otherwise ignored;
    /// no path through here changes thread state on error.
    pub fn handle_trap(&self, number: u8) -> Result<(), TrapError> {
        let trap = match Trap::try_from(number) {
            Ok(trap) => trap,
            Err(e) => {
                #[cfg(debug_assertions)]
                log::error!("{}", e);
                return Err(e);
            }
        };

        match trap {
            Trap::Yield => {
                P::trigger_switch_request();
                Ok(())
            }
            Trap::Launch => {
                let stack_pointer = critical_section::with(|cs| self.scheduler(cs).take_launch())
                    .ok_or(TrapError::NotReady)?;
                P::write_stack_pointer(stack_pointer);
                P::enter_thread_mode();
                Ok(())
            }
        }
    }

    /// Body of the switch-line handler: one atomic scheduler pass.
    ///
    /// Returns the thread now running, or `None` until the launch trap has
    /// been taken. A switch pended before then must not overwrite the first
    /// thread's saved frame pointer.
    pub fn on_switch(&self) -> Option<ThreadId> {
        critical_section::with(|cs| {
            let mut scheduler = self.scheduler(cs);
            if !scheduler.is_running() {
                return None;
            }
            Some(scheduler.schedule::<P>())
        })
    }

    /// Body of the timer handler. Never switches by itself; an exhausted
    /// slice only pends the switch line.
    pub fn on_tick(&self) {
        let expired = critical_section::with(|cs| self.scheduler(cs).tick());
        if expired {
            P::trigger_switch_request();
        }
    }

    // -----------------------------------------------------------------------
    // Queries
    // -----------------------------------------------------------------------

    pub fn is_started(&self) -> bool {
        self.inspect(|s| s.is_started())
    }

    /// True once the first thread owns the CPU.
    pub fn is_running(&self) -> bool {
        self.inspect(|s| s.is_running())
    }

    pub fn current_thread(&self) -> Option<ThreadId> {
        self.inspect(|s| s.current())
    }

    pub fn thread_state(&self, id: ThreadId) -> Option<ThreadState> {
        self.inspect(|s| s.state(id))
    }

    pub fn thread_priority(&self, id: ThreadId) -> Option<Priority> {
        self.inspect(|s| s.priority(id))
    }

    pub fn thread_count(&self) -> usize {
        self.inspect(|s| s.thread_count())
    }

    /// Ticks since boot.
    pub fn tick_count(&self) -> u64 {
        self.inspect(|s| s.tick_count())
    }
}

impl<P: Port> Default for Rtos<P> {
    fn default() -> Self {
        Self::new()
    }
}
