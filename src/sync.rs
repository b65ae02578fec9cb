//! # Synchronization Primitives
//!
//! Counting semaphore and priority-inheriting mutex, built only from the
//! scheduler's state transitions and the yield trap.
//!
//! Neither primitive keeps a wait queue. A thread that can't proceed marks
//! itself `Blocked` and yields; every release wakes *all* blocked threads,
//! and each one retries from the top when it next runs. Threads that lose
//! the race simply block again. Wake order is therefore decided by the
//! scheduler's priority selection, not by arrival order.
//!
//! Counters and owner records are only touched inside a critical section,
//! in the same section as the thread-state transition they go with.

use core::cell::Cell;

use critical_section::{CriticalSection, Mutex as CsMutex};

use crate::arch::Port;
use crate::config::IDLE_PRIORITY;
use crate::kernel::Rtos;
use crate::scheduler::Scheduler;
use crate::thread::{Priority, ThreadId};

// ---------------------------------------------------------------------------
// Semaphore
// ---------------------------------------------------------------------------

/// Counting semaphore. No ownership: any thread may post or pend.
pub struct Semaphore {
    count: CsMutex<Cell<u32>>,
}

impl Semaphore {
    pub const fn new(initial: u32) -> Self {
        Self {
            count: CsMutex::new(Cell::new(initial)),
        }
    }

    pub fn count(&self) -> u32 {
        critical_section::with(|cs| self.count.borrow(cs).get())
    }

    fn take(&self, cs: CriticalSection<'_>) -> bool {
        let count = self.count.borrow(cs);
        match count.get() {
            0 => false,
            n => {
                count.set(n - 1);
                true
            }
        }
    }

    /// Decrement the counter if it is positive. Never blocks.
    pub fn try_pend(&self) -> bool {
        critical_section::with(|cs| self.take(cs))
    }

    /// Decrement the counter, blocking while it is zero.
    pub fn pend<P: Port>(&self, os: &Rtos<P>) {
        loop {
            let acquired = critical_section::with(|cs| {
                if self.take(cs) {
                    return true;
                }
                os.scheduler(cs).block_current();
                false
            });
            if acquired {
                return;
            }
            os.yield_now();
        }
    }

    /// Increment the counter, wake every blocked thread and yield so a more
    /// urgent waiter can run straight away.
    pub fn post<P: Port>(&self, os: &Rtos<P>) {
        self.release(os);
        os.yield_now();
    }

    /// `post` for interrupt handlers. Pends the switch line instead of
    /// raising a supervisor call, which can't be taken from handler mode.
    pub fn post_from_isr<P: Port>(&self, os: &Rtos<P>) {
        self.release(os);
        os.request_switch();
    }

    fn release<P: Port>(&self, os: &Rtos<P>) {
        critical_section::with(|cs| {
            let count = self.count.borrow(cs);
            count.set(count.get().saturating_add(1));
            os.scheduler(cs).wake_blocked();
        });
    }
}

// ---------------------------------------------------------------------------
// Mutex
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy)]
struct Ownership {
    /// `None` iff nobody holds the mutex.
    owner: Option<ThreadId>,
    /// Owner's priority when it acquired the mutex.
    restore_priority: Priority,
}

enum Attempt {
    Acquired,
    Blocked,
    Refused,
}

/// Mutual exclusion lock with single-level priority inheritance.
///
/// While a more urgent thread waits, the owner runs at the waiter's
/// priority; unlocking restores the owner's priority from acquisition time.
/// Inheritance is one level deep only: if the owner is itself blocked on
/// another mutex, that mutex's owner is not boosted.
pub struct Mutex {
    ownership: CsMutex<Cell<Ownership>>,
}

impl Mutex {
    pub const fn new() -> Self {
        Self {
            ownership: CsMutex::new(Cell::new(Ownership {
                owner: None,
                restore_priority: IDLE_PRIORITY,
            })),
        }
    }

    pub fn owner(&self) -> Option<ThreadId> {
        critical_section::with(|cs| self.ownership.borrow(cs).get().owner)
    }

    /// Acquire the mutex, blocking while another thread holds it.
    ///
    /// Locking from the boot context, or re-locking a mutex the caller
    /// already holds, is ignored.
    pub fn lock<P: Port>(&self, os: &Rtos<P>) {
        loop {
            let attempt = critical_section::with(|cs| self.attempt(&mut os.scheduler(cs), cs));
            match attempt {
                Attempt::Acquired | Attempt::Refused => return,
                Attempt::Blocked => os.yield_now(),
            }
        }
    }

    fn attempt(&self, scheduler: &mut Scheduler, cs: CriticalSection<'_>) -> Attempt {
        let Some(me) = scheduler.current() else {
            log::warn!("mutex lock outside a thread ignored");
            return Attempt::Refused;
        };
        let cell = self.ownership.borrow(cs);
        let mut ownership = cell.get();

        match ownership.owner {
            None => {
                ownership.owner = Some(me);
                ownership.restore_priority = scheduler.priority(me).unwrap_or(IDLE_PRIORITY);
                cell.set(ownership);
                Attempt::Acquired
            }
            Some(owner) if owner == me => {
                log::debug!("thread {} re-locked a mutex it holds", me.index());
                Attempt::Refused
            }
            Some(owner) => {
                // Boost the direct owner only; no walk down a chain of owners
                if let (Some(mine), Some(theirs)) = (scheduler.priority(me), scheduler.priority(owner)) {
                    if mine < theirs {
                        scheduler.set_priority(owner, mine);
                    }
                }
                scheduler.block_current();
                Attempt::Blocked
            }
        }
    }

    /// Release the mutex, restore the owner's priority, wake every blocked
    /// thread and yield. Silently ignored unless the caller is the owner.
    pub fn unlock<P: Port>(&self, os: &Rtos<P>) {
        let released = critical_section::with(|cs| {
            let mut scheduler = os.scheduler(cs);
            let cell = self.ownership.borrow(cs);
            let ownership = cell.get();

            let me = scheduler.current();
            let owner = match ownership.owner {
                Some(owner) if Some(owner) == me => owner,
                _ => {
                    log::debug!("mutex unlock by non-owner ignored");
                    return false;
                }
            };

            scheduler.set_priority(owner, ownership.restore_priority);
            cell.set(Ownership {
                owner: None,
                ..ownership
            });
            scheduler.wake_blocked();
            true
        });
        if released {
            os.yield_now();
        }
    }
}

impl Default for Mutex {
    fn default() -> Self {
        Self::new()
    }
}
