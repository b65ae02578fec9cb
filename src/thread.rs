//! # Thread Control Block
//!
//! Defines the thread model for Prios. Each thread owns one slot of a fixed
//! table; records are never shared by value, only referred to by slot index
//! (`ThreadId`). Slot 0 always holds the idle thread.

use crate::config::{DEFAULT_TIME_SLICE, MAX_THREADS};

/// Scheduling rank. **Lower value = higher priority.**
pub type Priority = u8;

/// Thread entry point. Receives the opaque argument given at creation and
/// never returns: there is no thread exit in this kernel.
pub type ThreadEntry = extern "C" fn(usize) -> !;

// ---------------------------------------------------------------------------
// Thread identity
// ---------------------------------------------------------------------------

/// Index of a thread's slot in the thread table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ThreadId(pub(crate) usize);

impl ThreadId {
    /// The idle thread, created by kernel initialization.
    pub const IDLE: ThreadId = ThreadId(0);

    #[inline]
    pub const fn index(self) -> usize {
        self.0
    }

    #[inline]
    pub const fn is_idle(self) -> bool {
        self.0 == 0
    }
}

// ---------------------------------------------------------------------------
// Thread state machine
// ---------------------------------------------------------------------------

/// Execution state of a thread.
///
/// ```text
///                 select
///   ┌─────────┐ ─────────► ┌─────────┐
///   │  Ready  │            │ Running │
///   └─────────┘ ◄───────── └─────────┘
///     ▲     ▲    preempt     │     │
///     │     │                │     │ delay
///     │     │      block     │     ▼
///     │  ┌─────────┐ ◄───────┘  ┌──────────┐
///     │  │ Blocked │            │ Sleeping │
///     │  └─────────┘            └──────────┘
///     │    post/unlock               │
///     └──────────────────────────────┘
///              sleep timer expires
/// ```
///
/// There is no terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThreadState {
    /// Runnable, waiting to be selected.
    Ready,
    /// Owns the CPU.
    Running,
    /// Waiting on a semaphore or mutex.
    Blocked,
    /// Waiting for its sleep counter to run out.
    Sleeping,
}

// ---------------------------------------------------------------------------
// Thread configuration (fixed at creation)
// ---------------------------------------------------------------------------

/// Per-thread settings given at creation time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ThreadConfig {
    /// Base priority. Lower = more urgent.
    pub priority: Priority,
    /// Time slice in ticks. If 0, uses `DEFAULT_TIME_SLICE`.
    pub time_slice: u32,
}

impl ThreadConfig {
    /// Configuration with the default time slice.
    pub const fn with_priority(priority: Priority) -> Self {
        Self {
            priority,
            time_slice: 0,
        }
    }

    /// Returns the effective time slice, falling back to the system default.
    #[inline]
    pub const fn effective_time_slice(&self) -> u32 {
        if self.time_slice > 0 {
            self.time_slice
        } else {
            DEFAULT_TIME_SLICE
        }
    }
}

// ---------------------------------------------------------------------------
// Thread Control Block
// ---------------------------------------------------------------------------

/// Everything the kernel knows about one thread.
#[derive(Clone, Copy)]
pub struct ThreadControlBlock {
    /// Saved top of stack. Stale while the thread is `Running`: the live
    /// value is in the process stack pointer register.
    pub stack_pointer: *mut u32,
    /// Where the thread started. `None` for an unused slot.
    pub entry: Option<ThreadEntry>,
    /// Current priority. Raised temporarily by priority inheritance.
    pub priority: Priority,
    pub state: ThreadState,
    /// Slice length handed out on every dispatch.
    pub time_slice_budget: u32,
    /// Ticks left before forced preemption.
    pub time_slice_remaining: u32,
    /// Ticks left before a `Sleeping` thread becomes `Ready`.
    pub sleep_ticks_remaining: u32,
}

// Safety: `stack_pointer` points into the thread's own block of the stack
// pool. We only access TCBs within critical sections.
unsafe impl Send for ThreadControlBlock {}

impl ThreadControlBlock {
    /// An unused slot. Used to initialize the static table.
    pub const EMPTY: Self = Self {
        stack_pointer: core::ptr::null_mut(),
        entry: None,
        priority: Priority::MAX,
        state: ThreadState::Ready,
        time_slice_budget: 0,
        time_slice_remaining: 0,
        sleep_ticks_remaining: 0,
    };

    /// A `Ready` thread whose initial frame sits at `stack_pointer`.
    pub fn new(entry: ThreadEntry, config: ThreadConfig, stack_pointer: *mut u32) -> Self {
        let slice = config.effective_time_slice();
        Self {
            stack_pointer,
            entry: Some(entry),
            priority: config.priority,
            state: ThreadState::Ready,
            time_slice_budget: slice,
            time_slice_remaining: slice,
            sleep_ticks_remaining: 0,
        }
    }

    #[inline]
    pub fn is_ready(&self) -> bool {
        self.state == ThreadState::Ready
    }
}

// ---------------------------------------------------------------------------
// Thread table
// ---------------------------------------------------------------------------

/// Fixed-capacity array of thread records plus the current-thread index.
/// Slots fill in creation order and are never vacated.
pub struct ThreadTable {
    records: [ThreadControlBlock; MAX_THREADS],
    count: usize,
    current: Option<ThreadId>,
}

impl ThreadTable {
    pub const fn new() -> Self {
        Self {
            records: [ThreadControlBlock::EMPTY; MAX_THREADS],
            count: 0,
            current: None,
        }
    }

    /// Number of threads created so far, idle thread included.
    #[inline]
    pub fn len(&self) -> usize {
        self.count
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    #[inline]
    pub fn is_full(&self) -> bool {
        self.count == MAX_THREADS
    }

    /// Slot the next created thread will occupy.
    #[inline]
    pub fn next_slot(&self) -> usize {
        self.count
    }

    /// Append a record. Returns `None` when every slot is taken.
    pub fn push(&mut self, tcb: ThreadControlBlock) -> Option<ThreadId> {
        if self.is_full() {
            return None;
        }
        let id = ThreadId(self.count);
        self.records[self.count] = tcb;
        self.count += 1;
        Some(id)
    }

    /// Record of a created thread.
    pub fn get(&self, id: ThreadId) -> Option<&ThreadControlBlock> {
        self.records[..self.count].get(id.0)
    }

    pub fn get_mut(&mut self, id: ThreadId) -> Option<&mut ThreadControlBlock> {
        self.records[..self.count].get_mut(id.0)
    }

    /// Created records in slot order.
    pub fn iter(&self) -> impl Iterator<Item = (ThreadId, &ThreadControlBlock)> {
        self.records[..self.count]
            .iter()
            .enumerate()
            .map(|(i, tcb)| (ThreadId(i), tcb))
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut ThreadControlBlock> {
        self.records[..self.count].iter_mut()
    }

    /// The thread that owns (or is about to own) the CPU.
    #[inline]
    pub fn current(&self) -> Option<ThreadId> {
        self.current
    }

    pub fn current_tcb_mut(&mut self) -> Option<&mut ThreadControlBlock> {
        let id = self.current?;
        self.get_mut(id)
    }

    pub(crate) fn set_current(&mut self, id: ThreadId) {
        self.current = Some(id);
    }
}

impl Default for ThreadTable {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Unit tests (host-only)
// ---------------------------------------------------------------------------
