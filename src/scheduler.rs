//! # Scheduler
//!
//! The kernel-state aggregate: thread table, stack pool, tick counter and
//! launch state, plus every state transition that touches them. The
//! `Scheduler` is only ever reached through `&mut` obtained under a
//! critical section (see `kernel::Rtos`), so each method runs atomically.
//!
//! ## Selection Algorithm
//!
//! At each switch point:
//! 1. **Save**: persist the live stack pointer of the current thread and,
//!    if it is still `Running`, demote it to `Ready`
//! 2. **Select**: the `Ready` thread with the numerically smallest priority;
//!    ties go to the lowest slot index
//! 3. **Fallback**: with nothing `Ready`, the idle thread (slot 0)
//! 4. **Dispatch**: mark it `Running`, refill its time slice and program the
//!    process stack pointer with its saved value
//!
//! The tie-break is deliberately simple: two equal-priority threads that
//! never block will not share the CPU. The lower slot wins every pass.

use crate::arch::Port;
use crate::config::IDLE_PRIORITY;
use crate::error::CreateError;
use crate::frame::TrapFrame;
use crate::stack::StackPool;
use crate::thread::{
    Priority, ThreadConfig, ThreadControlBlock, ThreadEntry, ThreadId, ThreadState, ThreadTable,
};

/// Progress of the one-time transition to the first running thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Launch {
    /// Still in the boot context; threads may be created.
    Pending,
    /// The first thread is chosen, waiting for the launch trap.
    Selected,
    /// The launch trap has handed the CPU to the first thread.
    Entered,
}

/// The central kernel state. Stored inside `kernel::Rtos`.
///
/// ## Design Notes
///
/// - All threads are stored inline in a fixed-size array (no heap)
/// - Slot 0 holds the idle thread once `init` has run
/// - Thread stacks come from the pool slot matching the thread's slot
pub struct Scheduler {
    threads: ThreadTable,
    stacks: StackPool,
    tick_count: u64,
    launch: Launch,
}

impl Scheduler {
    pub const fn new() -> Self {
        Self {
            threads: ThreadTable::new(),
            stacks: StackPool::empty(),
            tick_count: 0,
            launch: Launch::Pending,
        }
    }

    /// Reset the kernel state, adopt `region` as the stack pool and create
    /// the idle thread in slot 0.
    pub fn init(&mut self, region: &'static mut [u32], idle: ThreadEntry) -> Result<ThreadId, CreateError> {
        *self = Self::new();
        self.stacks = StackPool::new(region);
        self.create_thread(idle, 0, ThreadConfig::with_priority(IDLE_PRIORITY))
    }

    /// Register a new `Ready` thread with a pre-built frame on its stack.
    ///
    /// # Returns
    /// - `Ok(id)`: the slot of the new thread
    /// - `Err(_)`: table full, stack pool exhausted, or already started
    pub fn create_thread(
        &mut self,
        entry: ThreadEntry,
        arg: usize,
        config: ThreadConfig,
    ) -> Result<ThreadId, CreateError> {
        if self.is_started() {
            return Err(CreateError::KernelStarted);
        }
        if self.threads.is_full() {
            return Err(CreateError::TableFull);
        }
        let top = self
            .stacks
            .stack_top(self.threads.next_slot())
            .ok_or(CreateError::StackPoolExhausted)?;

        // Safety: the pool hands out an aligned, exclusively owned block of
        // `STACK_SIZE` bytes per slot, and this slot has never run.
        let stack_pointer = unsafe { TrapFrame::new(entry, arg).push(top) };

        self.threads
            .push(ThreadControlBlock::new(entry, config, stack_pointer))
            .ok_or(CreateError::TableFull)
    }

    /// Pick the thread to run next without changing any state.
    pub fn select_next(&self) -> ThreadId {
        let mut best: Option<(ThreadId, Priority)> = None;
        for (id, tcb) in self.threads.iter() {
            if !tcb.is_ready() {
                continue;
            }
            // Strict comparison keeps the lowest slot on a tie
            if best.map_or(true, |(_, priority)| tcb.priority < priority) {
                best = Some((id, tcb.priority));
            }
        }
        best.map_or(ThreadId::IDLE, |(id, _)| id)
    }

    /// Make `id` the running thread and return the stack pointer to resume.
    fn dispatch(&mut self, id: ThreadId) -> *mut u32 {
        self.threads.set_current(id);
        match self.threads.get_mut(id) {
            Some(tcb) => {
                tcb.state = ThreadState::Running;
                tcb.time_slice_remaining = tcb.time_slice_budget;
                tcb.stack_pointer
            }
            None => core::ptr::null_mut(),
        }
    }

    /// First scheduler pass, run from the boot context by `start`. Chooses
    /// the first thread; the launch trap later moves the CPU onto it.
    ///
    /// Returns `None` if no thread exists or the kernel already launched.
    pub fn launch(&mut self) -> Option<ThreadId> {
        if self.launch != Launch::Pending || self.threads.is_empty() {
            return None;
        }
        let first = self.select_next();
        self.dispatch(first);
        self.launch = Launch::Selected;
        Some(first)
    }

    /// Consume the pending launch, yielding the stack pointer of the chosen
    /// thread. Only the first call after `launch` succeeds.
    pub fn take_launch(&mut self) -> Option<*mut u32> {
        if self.launch != Launch::Selected {
            return None;
        }
        let tcb = self.threads.get(self.threads.current()?)?;
        self.launch = Launch::Entered;
        Some(tcb.stack_pointer)
    }

    /// True once `launch` has chosen the first thread. Thread creation is
    /// closed from here on.
    #[inline]
    pub fn is_started(&self) -> bool {
        self.launch != Launch::Pending
    }

    /// True once the launch trap has put the first thread on the CPU. Until
    /// then the process stack pointer holds nothing worth saving, so no
    /// switch pass may run.
    #[inline]
    pub fn is_running(&self) -> bool {
        self.launch == Launch::Entered
    }

    /// The context-switch pass. Saves the outgoing thread's stack pointer,
    /// selects the next thread and programs the process stack pointer.
    ///
    /// # Returns
    /// The thread now running.
    pub fn schedule<P: Port>(&mut self) -> ThreadId {
        let previous = self.threads.current();
        if let Some(tcb) = self.threads.current_tcb_mut() {
            tcb.stack_pointer = P::read_stack_pointer();
            if tcb.state == ThreadState::Running {
                tcb.state = ThreadState::Ready;
            }
        }

        let next = self.select_next();
        let stack_pointer = self.dispatch(next);
        P::write_stack_pointer(stack_pointer);

        if previous != Some(next) {
            log::trace!("switch {:?} -> {:?}", previous, next);
        }
        next
    }

    /// Per-tick accounting. Wakes sleepers whose counter runs out and
    /// charges the running thread one tick of its slice.
    ///
    /// # Returns
    /// `true` if the running thread's slice is exhausted and a switch
    /// should be requested. Always `false` before the launch trap.
    pub fn tick(&mut self) -> bool {
        self.tick_count = self.tick_count.wrapping_add(1);

        for tcb in self.threads.iter_mut() {
            if tcb.state != ThreadState::Sleeping {
                continue;
            }
            tcb.sleep_ticks_remaining = tcb.sleep_ticks_remaining.saturating_sub(1);
            if tcb.sleep_ticks_remaining == 0 {
                tcb.state = ThreadState::Ready;
            }
        }

        if !self.is_running() {
            return false;
        }
        match self.threads.current_tcb_mut() {
            Some(tcb) if tcb.state == ThreadState::Running => {
                tcb.time_slice_remaining = tcb.time_slice_remaining.saturating_sub(1);
                tcb.time_slice_remaining == 0
            }
            _ => false,
        }
    }

    /// Move the running thread to `Blocked`. The idle thread never blocks.
    ///
    /// Returns `false` if there was no thread to block.
    pub fn block_current(&mut self) -> bool {
        self.suspend_current(ThreadState::Blocked, 0)
    }

    /// Move the running thread to `Sleeping` for `ticks` ticks. The idle
    /// thread never sleeps, and a zero-tick sleep is not a sleep.
    pub fn sleep_current(&mut self, ticks: u32) -> bool {
        if ticks == 0 {
            return false;
        }
        self.suspend_current(ThreadState::Sleeping, ticks)
    }

    fn suspend_current(&mut self, state: ThreadState, ticks: u32) -> bool {
        match self.threads.current() {
            Some(id) if !id.is_idle() => {}
            _ => return false,
        }
        match self.threads.current_tcb_mut() {
            Some(tcb) if tcb.state == ThreadState::Running => {
                tcb.state = state;
                tcb.sleep_ticks_remaining = ticks;
                true
            }
            _ => false,
        }
    }

    /// Make every `Blocked` thread `Ready`. Waiters re-check their condition
    /// when they next run, so waking too many is harmless.
    ///
    /// Returns the number of threads woken.
    pub fn wake_blocked(&mut self) -> usize {
        let mut woken = 0;
        for tcb in self.threads.iter_mut() {
            if tcb.state == ThreadState::Blocked {
                tcb.state = ThreadState::Ready;
                woken += 1;
            }
        }
        woken
    }

    #[inline]
    pub fn current(&self) -> Option<ThreadId> {
        self.threads.current()
    }

    pub fn state(&self, id: ThreadId) -> Option<ThreadState> {
        self.threads.get(id).map(|tcb| tcb.state)
    }

    pub fn priority(&self, id: ThreadId) -> Option<Priority> {
        self.threads.get(id).map(|tcb| tcb.priority)
    }

    /// Overwrite a thread's priority. Used by priority inheritance.
    pub fn set_priority(&mut self, id: ThreadId, priority: Priority) {
        if let Some(tcb) = self.threads.get_mut(id) {
            tcb.priority = priority;
        }
    }

    #[inline]
    pub fn thread_count(&self) -> usize {
        self.threads.len()
    }

    #[inline]
    pub fn tick_count(&self) -> u64 {
        self.tick_count
    }

    /// Read-only view of the thread table.
    pub fn threads(&self) -> &ThreadTable {
        &self.threads
    }
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Unit tests (host-only)
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arch::sim::{self, SimPort};
    use crate::config::{DEFAULT_TIME_SLICE, MAX_THREADS, STACK_SIZE};
    use quickcheck_macros::quickcheck;

    extern "C" fn idle(_: usize) -> ! {
        loop {}
    }

    extern "C" fn worker(_: usize) -> ! {
        loop {}
    }

    fn booted() -> Scheduler {
        sim::init_logging();
        SimPort::reset();
        let mut scheduler = Scheduler::new();
        scheduler.init(sim::stack_region(), idle).unwrap();
        scheduler
    }

    fn spawn(scheduler: &mut Scheduler, priority: Priority) -> ThreadId {
        scheduler
            .create_thread(worker, 0, ThreadConfig::with_priority(priority))
            .unwrap()
    }

    /// Launch and take the launch trap, as `Rtos::start` does.
    fn enter(scheduler: &mut Scheduler) {
        scheduler.launch();
        scheduler.take_launch();
    }

    fn running(scheduler: &Scheduler) -> Vec<ThreadId> {
        scheduler
            .threads()
            .iter()
            .filter(|(_, tcb)| tcb.state == ThreadState::Running)
            .map(|(id, _)| id)
            .collect()
    }

    #[test]
    fn test_init_creates_idle_thread() {
        let scheduler = booted();
        assert_eq!(scheduler.thread_count(), 1);
        assert_eq!(scheduler.priority(ThreadId::IDLE), Some(IDLE_PRIORITY));
        assert_eq!(scheduler.state(ThreadId::IDLE), Some(ThreadState::Ready));
        assert!(!scheduler.is_started());
    }

    #[test]
    fn test_highest_priority_runs_first() {
        let mut scheduler = booted();
        spawn(&mut scheduler, 5);
        let urgent = spawn(&mut scheduler, 1);
        spawn(&mut scheduler, 3);

        assert_eq!(scheduler.launch(), Some(urgent));
        assert_eq!(scheduler.state(urgent), Some(ThreadState::Running));
        assert_eq!(running(&scheduler), vec![urgent]);
    }

    #[test]
    fn test_tie_goes_to_lowest_slot() {
        let mut scheduler = booted();
        let first = spawn(&mut scheduler, 2);
        let second = spawn(&mut scheduler, 2);

        assert_eq!(scheduler.launch(), Some(first));
        // The running thread is demoted and competes again; it still wins
        assert_eq!(scheduler.schedule::<SimPort>(), first);
        assert_eq!(scheduler.state(second), Some(ThreadState::Ready));
    }

    #[test]
    fn test_idle_fallback_when_nothing_ready() {
        let mut scheduler = booted();
        let a = spawn(&mut scheduler, 1);
        let b = spawn(&mut scheduler, 2);

        assert_eq!(scheduler.launch(), Some(a));
        assert!(scheduler.block_current());
        assert_eq!(scheduler.schedule::<SimPort>(), b);
        assert!(scheduler.sleep_current(4));
        assert_eq!(scheduler.schedule::<SimPort>(), ThreadId::IDLE);
        assert_eq!(running(&scheduler), vec![ThreadId::IDLE]);
    }

    #[test]
    fn test_idle_never_blocks_or_sleeps() {
        let mut scheduler = booted();
        assert_eq!(scheduler.launch(), Some(ThreadId::IDLE));
        assert!(!scheduler.block_current());
        assert!(!scheduler.sleep_current(10));
        assert_eq!(scheduler.state(ThreadId::IDLE), Some(ThreadState::Running));
    }

    #[test]
    fn test_schedule_saves_and_programs_stack_pointer() {
        let mut scheduler = booted();
        let a = spawn(&mut scheduler, 1);
        let b = spawn(&mut scheduler, 2);
        scheduler.launch();

        let b_saved = scheduler.threads().get(b).unwrap().stack_pointer;
        let live = 0x2000_1000usize as *mut u32;
        SimPort::set_stack_pointer(live);

        scheduler.block_current();
        assert_eq!(scheduler.schedule::<SimPort>(), b);
        assert_eq!(scheduler.threads().get(a).unwrap().stack_pointer, live);
        assert_eq!(SimPort::stack_pointer(), b_saved);
    }

    #[test]
    fn test_dispatch_refills_time_slice() {
        let mut scheduler = booted();
        let a = spawn(&mut scheduler, 1);
        enter(&mut scheduler);

        for _ in 0..3 {
            scheduler.tick();
        }
        let tcb = scheduler.threads().get(a).unwrap();
        assert_eq!(tcb.time_slice_remaining, DEFAULT_TIME_SLICE - 3);

        scheduler.schedule::<SimPort>();
        let tcb = scheduler.threads().get(a).unwrap();
        assert_eq!(tcb.time_slice_remaining, DEFAULT_TIME_SLICE);
    }

    #[test]
    fn test_slice_expiry_requests_switch() {
        let mut scheduler = booted();
        scheduler
            .create_thread(worker, 0, ThreadConfig { priority: 1, time_slice: 3 })
            .unwrap();
        enter(&mut scheduler);

        assert!(!scheduler.tick());
        assert!(!scheduler.tick());
        assert!(scheduler.tick());
        assert_eq!(scheduler.tick_count(), 3);
    }

    #[test]
    fn test_slice_not_charged_before_launch_trap() {
        let mut scheduler = booted();
        let a = scheduler
            .create_thread(worker, 0, ThreadConfig { priority: 1, time_slice: 2 })
            .unwrap();
        scheduler.launch();
        assert!(scheduler.is_started());
        assert!(!scheduler.is_running());

        for _ in 0..4 {
            assert!(!scheduler.tick());
        }
        assert_eq!(scheduler.threads().get(a).unwrap().time_slice_remaining, 2);
        assert_eq!(scheduler.tick_count(), 4);

        scheduler.take_launch();
        assert!(scheduler.is_running());
        assert!(!scheduler.tick());
        assert!(scheduler.tick());
    }

    #[test]
    fn test_blocked_thread_is_not_charged() {
        let mut scheduler = booted();
        let a = spawn(&mut scheduler, 1);
        scheduler.launch();
        scheduler.block_current();

        for _ in 0..DEFAULT_TIME_SLICE * 2 {
            assert!(!scheduler.tick());
        }
        assert_eq!(scheduler.state(a), Some(ThreadState::Blocked));
    }

    #[test]
    fn test_wake_blocked_is_broadcast() {
        let mut scheduler = booted();
        let a = spawn(&mut scheduler, 1);
        let b = spawn(&mut scheduler, 2);
        let c = spawn(&mut scheduler, 3);
        scheduler.launch();
        scheduler.block_current();
        scheduler.schedule::<SimPort>();
        scheduler.block_current();
        scheduler.schedule::<SimPort>();
        scheduler.sleep_current(5);
        scheduler.schedule::<SimPort>();

        assert_eq!(scheduler.wake_blocked(), 2);
        assert_eq!(scheduler.state(a), Some(ThreadState::Ready));
        assert_eq!(scheduler.state(b), Some(ThreadState::Ready));
        assert_eq!(scheduler.state(c), Some(ThreadState::Sleeping));
    }

    #[test]
    fn test_table_full() {
        let mut scheduler = booted();
        for _ in 1..MAX_THREADS {
            spawn(&mut scheduler, 4);
        }
        assert_eq!(
            scheduler.create_thread(worker, 0, ThreadConfig::with_priority(4)),
            Err(CreateError::TableFull)
        );
        assert_eq!(scheduler.thread_count(), MAX_THREADS);
    }

    #[test]
    fn test_stack_pool_exhausted() {
        sim::init_logging();
        let mut scheduler = Scheduler::new();
        // Room for the idle stack and at most one more
        let region = Box::leak(vec![0u32; 2 * STACK_SIZE / 4 + 1].into_boxed_slice());
        scheduler.init(region, idle).unwrap();

        let mut created = 0;
        let error = loop {
            match scheduler.create_thread(worker, 0, ThreadConfig::with_priority(1)) {
                Ok(_) => created += 1,
                Err(e) => break e,
            }
        };
        assert_eq!(error, CreateError::StackPoolExhausted);
        assert!(created <= 1);
    }

    #[test]
    fn test_create_before_init_fails() {
        let mut scheduler = Scheduler::new();
        assert_eq!(
            scheduler.create_thread(worker, 0, ThreadConfig::with_priority(1)),
            Err(CreateError::StackPoolExhausted)
        );
    }

    #[test]
    fn test_create_after_launch_fails() {
        let mut scheduler = booted();
        scheduler.launch();
        assert_eq!(
            scheduler.create_thread(worker, 0, ThreadConfig::with_priority(1)),
            Err(CreateError::KernelStarted)
        );
    }

    #[test]
    fn test_launch_happens_once() {
        let mut scheduler = booted();
        let a = spawn(&mut scheduler, 1);
        assert!(scheduler.take_launch().is_none());
        assert_eq!(scheduler.launch(), Some(a));
        assert_eq!(scheduler.launch(), None);

        let sp = scheduler.take_launch().unwrap();
        assert_eq!(sp, scheduler.threads().get(a).unwrap().stack_pointer);
        assert!(scheduler.take_launch().is_none());
    }

    #[test]
    fn test_sleep_wakes_after_exact_tick_count() {
        let mut scheduler = booted();
        let a = spawn(&mut scheduler, 1);
        scheduler.launch();
        scheduler.sleep_current(5);
        scheduler.schedule::<SimPort>();

        for _ in 0..4 {
            scheduler.tick();
            assert_eq!(scheduler.state(a), Some(ThreadState::Sleeping));
        }
        scheduler.tick();
        assert_eq!(scheduler.state(a), Some(ThreadState::Ready));
    }

    #[quickcheck]
    fn prop_selects_smallest_priority_lowest_slot(priorities: Vec<u8>) -> bool {
        let mut scheduler = booted();
        let priorities: Vec<Priority> = priorities
            .into_iter()
            .take(MAX_THREADS - 1)
            .map(|p| p.min(IDLE_PRIORITY - 1))
            .collect();
        for &priority in &priorities {
            spawn(&mut scheduler, priority);
        }

        let expected = priorities
            .iter()
            .enumerate()
            .min_by_key(|&(slot, &priority)| (priority, slot))
            .map_or(ThreadId::IDLE, |(slot, _)| ThreadId(slot + 1));

        scheduler.launch() == Some(expected)
    }

    #[quickcheck]
    fn prop_sleep_bound(ticks: u8) -> bool {
        let ticks = u32::from(ticks) + 1;
        let mut scheduler = booted();
        let a = spawn(&mut scheduler, 1);
        scheduler.launch();
        scheduler.sleep_current(ticks);
        scheduler.schedule::<SimPort>();

        for _ in 1..ticks {
            scheduler.tick();
            if scheduler.state(a) != Some(ThreadState::Sleeping) {
                return false;
            }
        }
        scheduler.tick();
        scheduler.state(a) == Some(ThreadState::Ready)
    }

    /// Random interleavings of the running thread's own transitions, ticks
    /// and wake-ups always leave exactly one thread running after a pass.
    #[quickcheck]
    fn prop_exactly_one_running(ops: Vec<u8>) -> bool {
        let mut scheduler = booted();
        for priority in [4, 2, 7] {
            spawn(&mut scheduler, priority);
        }
        enter(&mut scheduler);

        for op in ops {
            match op % 5 {
                0 => {
                    scheduler.block_current();
                }
                1 => {
                    scheduler.sleep_current(u32::from(op % 3));
                }
                2 => {
                    scheduler.tick();
                }
                3 => {
                    scheduler.wake_blocked();
                }
                _ => {}
            }
            scheduler.schedule::<SimPort>();
            if running(&scheduler).len() != 1 {
                return false;
            }
        }
        true
    }
}
