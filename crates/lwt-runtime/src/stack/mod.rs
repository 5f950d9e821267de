//! Thread stacks
//!
//! Each stack is its own anonymous mapping with a `PROT_NONE` guard page at
//! the low end, so an overflow faults instead of corrupting a neighbour.
//! Stacks live as long as their control block; `die` does not free them,
//! the ready pool reuses them, and host teardown unmaps them via `Drop`.

cfg_if::cfg_if! {
    if #[cfg(unix)] {
        mod unix;
        use unix::{map_stack, page_size, unmap_stack};
    } else {
        compile_error!("Unsupported platform");
    }
}

use std::cell::Cell;
use std::ptr::NonNull;

use lwt_core::constants::STACK_ALIGN;
use lwt_core::error::MemoryError;

/// One mapped stack, guard page included
pub struct Stack {
    /// Lowest address of the mapping (start of the guard page)
    base: NonNull<u8>,
    /// Total mapping length, guard page included
    len: usize,
    guard: usize,
}

impl Stack {
    /// Highest usable address; stacks grow down from here
    #[inline]
    pub fn top(&self) -> *mut u8 {
        // base + len stays inside (one past) the mapping
        self.base.as_ptr().wrapping_add(self.len)
    }

    /// Lowest usable address (just above the guard page)
    #[inline]
    pub fn limit(&self) -> *mut u8 {
        self.base.as_ptr().wrapping_add(self.guard)
    }

    /// Usable bytes
    #[inline]
    pub fn usable(&self) -> usize {
        self.len - self.guard
    }

    /// Stack pointer a fresh context starts with
    #[inline]
    pub fn initial_sp(&self) -> usize {
        (self.top() as usize) & !(STACK_ALIGN - 1)
    }
}

impl Drop for Stack {
    fn drop(&mut self) {
        unmap_stack(self.base, self.len);
    }
}

impl std::fmt::Debug for Stack {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Stack")
            .field("limit", &self.limit())
            .field("top", &self.top())
            .finish()
    }
}

/// Per-host stack allocator
///
/// Rounds the configured size up to whole pages. Stacks stay with the
/// control block that first took them and are unmapped when it drops.
pub struct StackPool {
    stack_size: usize,
    page_size: usize,
    allocated: Cell<usize>,
}

impl StackPool {
    pub fn new(stack_size: usize) -> Self {
        let page_size = page_size();
        let stack_size = stack_size.div_ceil(page_size).max(1) * page_size;
        Self {
            stack_size,
            page_size,
            allocated: Cell::new(0),
        }
    }

    /// Map a new stack
    pub fn allocate(&self) -> Result<Stack, MemoryError> {
        let len = self
            .stack_size
            .checked_add(self.page_size)
            .ok_or(MemoryError::TooLarge)?;
        let base = map_stack(len, self.page_size)?;
        self.allocated.set(self.allocated.get() + 1);
        Ok(Stack {
            base,
            len,
            guard: self.page_size,
        })
    }

    /// Usable bytes per stack, after page rounding
    #[inline]
    pub fn stack_size(&self) -> usize {
        self.stack_size
    }

    /// Stacks mapped by this pool so far
    #[inline]
    pub fn allocated(&self) -> usize {
        self.allocated.get()
    }
}
