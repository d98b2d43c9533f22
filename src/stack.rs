//! # Task Stacks
//!
//! Private stack memory for each task. Stacks are full-descending: the
//! context frame is written just below the top address and grows toward
//! lower addresses.

use core::cell::UnsafeCell;

use crate::frame::FRAME_BYTES;

/// Smallest stack region the bootstrapper accepts: one context frame plus
/// a double-word of headroom.
pub const MIN_STACK_BYTES: usize = FRAME_BYTES + 8;

/// A task stack of `LEN` bytes.
///
/// `LEN` must be a multiple of 8, which is checked at compile time when the
/// stack is built in a `static`. Stacks are aligned on 8-byte boundaries as
/// required by AAPCS.
#[repr(align(8))]
pub struct Stack<const LEN: usize> {
    contents: UnsafeCell<[u8; LEN]>,
}

impl<const LEN: usize> Stack<LEN> {
    /// Create a new, zeroed stack.
    pub const fn new() -> Self {
        assert!(LEN % 8 == 0);
        Self {
            contents: UnsafeCell::new([0u8; LEN]),
        }
    }

    /// Describe this stack as a region the scheduler can bootstrap.
    pub const fn region(&'static self) -> StackRegion {
        StackRegion {
            // Pointing one past the array is allowed; a full-descending
            // stack never writes to its top address, only below it.
            top: unsafe { self.contents.get().add(1) as *mut u32 },
            len: LEN,
        }
    }
}

// SAFETY: the stack only hands out raw pointers to itself. Its memory is
// written by the bootstrapper before the scheduler starts and afterwards only
// by the task that owns it.
unsafe impl<const LEN: usize> Sync for Stack<LEN> {}

impl<const LEN: usize> Default for Stack<LEN> {
    fn default() -> Self {
        Stack::new()
    }
}

/// A contiguous block of memory used as one task's stack.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StackRegion {
    top: *mut u32,
    len: usize,
}

impl StackRegion {
    /// Describe an arbitrary memory block as a stack region.
    ///
    /// # Safety
    /// `top - len .. top` must be memory owned exclusively by one task for the
    /// rest of the program.
    pub const unsafe fn from_raw(top: *mut u32, len: usize) -> Self {
        Self { top, len }
    }

    /// One past the highest address of the region.
    pub const fn top(&self) -> *mut u32 {
        self.top
    }

    /// Lowest address of the region.
    pub fn bottom(&self) -> usize {
        (self.top as usize).wrapping_sub(self.len)
    }

    /// Size of the region in bytes.
    pub const fn len(&self) -> usize {
        self.len
    }

    /// Whether the region can hold the initial context frame.
    pub const fn fits_frame(&self) -> bool {
        self.len >= MIN_STACK_BYTES
    }

    /// Whether the top address is 8-byte aligned.
    pub fn is_aligned(&self) -> bool {
        (self.top as usize) % 8 == 0
    }

    /// Whether two regions share any byte.
    pub fn overlaps(&self, other: &StackRegion) -> bool {
        self.bottom() < other.top as usize && other.bottom() < self.top as usize
    }
}
