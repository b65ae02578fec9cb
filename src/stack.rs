//! # Stack Allocator
//!
//! Partitions one fixed memory region into equally sized thread stacks.
//! Slot `n` owns the `n`-th `STACK_SIZE` block counted down from the
//! (8-byte aligned) top of the region, so blocks never overlap and the
//! mapping from slot to stack is fixed for the life of the kernel.
//!
//! ```text
//!   region top ─► ┌──────────────┐
//!                 │   slot 0     │  (idle thread)
//!                 ├──────────────┤
//!                 │   slot 1     │
//!                 ├──────────────┤
//!                 │     ...      │
//!                 ├──────────────┤
//!                 │  slot n-1    │
//!                 ├──────────────┤
//!                 │  (unused)    │  < STACK_SIZE remainder
//!   region base ► └──────────────┘
//! ```
//!
//! There is no freeing: threads are never destroyed.

use core::ptr;

use crate::config::{STACK_ALIGN, STACK_SIZE};

const WORD: usize = core::mem::size_of::<u32>();
const STACK_WORDS: usize = STACK_SIZE / WORD;

/// Backing memory for a pool of thread stacks.
pub struct StackPool {
    /// Lowest address of the region.
    base: *mut u32,
    /// Words from `base` to the aligned top of the region.
    top_words: usize,
}

// Safety: `base` points into a `&'static mut` region handed over in `new`;
// nothing else holds a reference to it. The pool is only reached through
// the kernel's critical-section guarded state.
unsafe impl Send for StackPool {}

impl StackPool {
    /// A pool with no memory. Every allocation fails.
    pub const fn empty() -> Self {
        Self {
            base: ptr::null_mut(),
            top_words: 0,
        }
    }

    /// Take ownership of `region` for thread stacks.
    pub fn new(region: &'static mut [u32]) -> Self {
        let base = region.as_mut_ptr();
        let end = base as usize + region.len() * WORD;
        let misalignment = end % STACK_ALIGN;
        Self {
            base,
            top_words: region.len() - misalignment / WORD,
        }
    }

    /// Number of stacks the region can hold.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.top_words / STACK_WORDS
    }

    /// Top-of-stack address (one past the highest word) for `slot`, or
    /// `None` if the region has no block for it.
    pub fn stack_top(&self, slot: usize) -> Option<*mut u32> {
        if slot >= self.capacity() {
            return None;
        }
        let offset = self.top_words - slot * STACK_WORDS;
        // Safety: `offset <= top_words <= region.len()`, so the result is
        // within or one past the end of the owned region.
        Some(unsafe { self.base.add(offset) })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn region(words: usize) -> &'static mut [u32] {
        Box::leak(vec![0u32; words].into_boxed_slice())
    }

    #[test]
    fn test_empty_pool_has_no_stacks() {
        let pool = StackPool::empty();
        assert_eq!(pool.capacity(), 0);
        assert!(pool.stack_top(0).is_none());
    }

    #[test]
    fn test_blocks_are_disjoint_and_aligned() {
        let pool = StackPool::new(region(STACK_WORDS * 4 + 3));
        assert!(pool.capacity() >= 3);

        let mut previous: Option<usize> = None;
        for slot in 0..pool.capacity() {
            let top = pool.stack_top(slot).unwrap() as usize;
            assert_eq!(top % STACK_ALIGN, 0);
            if let Some(above) = previous {
                assert_eq!(above - top, STACK_SIZE);
            }
            previous = Some(top);
        }
    }

    #[test]
    fn test_allocation_beyond_region_fails() {
        let pool = StackPool::new(region(STACK_WORDS * 2));
        let capacity = pool.capacity();
        assert!(capacity == 1 || capacity == 2);
        assert!(pool.stack_top(capacity).is_none());
        assert!(pool.stack_top(capacity - 1).is_some());
    }

    #[test]
    fn test_lowest_block_stays_inside_region() {
        let words = STACK_WORDS * 3;
        let memory = region(words);
        let base = memory.as_ptr() as usize;
        let pool = StackPool::new(memory);
        let last = pool.stack_top(pool.capacity() - 1).unwrap() as usize;
        assert!(last - STACK_SIZE >= base);
    }
}
