//! # Task Control Block
//!
//! Defines the task model for RROS. The task set is closed: every task is
//! described once by a [`Task`] at startup, bootstrapped into a
//! [`TaskControlBlock`], and never created or destroyed afterwards.

use crate::stack::{Stack, StackRegion};

// ---------------------------------------------------------------------------
// Task state machine
// ---------------------------------------------------------------------------

/// Scheduling state of a task.
///
/// There is no `Running` state: the running task is the one whose index
/// equals the scheduler's current-task cursor.
///
/// ```text
///   ┌──────────┐    task_delay()     ┌──────────┐
///   │  Ready   │ ──────────────────► │ Blocked  │
///   └──────────┘                     └──────────┘
///        ▲                                │
///        └──────── wake tick reached ─────┘
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(target_os = "none", derive(defmt::Format))]
pub enum TaskState {
    /// Task may be selected to run.
    Ready,
    /// Task sleeps until the tick counter reaches its wake tick.
    Blocked,
}

/// Task entry point. Called once, never returns.
pub type TaskEntry = extern "C" fn() -> !;

// ---------------------------------------------------------------------------
// Task description (immutable, usually a `static`)
// ---------------------------------------------------------------------------

/// Static description of one task: what it runs and where its stack lives.
#[derive(Clone, Copy)]
pub struct Task {
    entry: TaskEntry,
    stack: StackRegion,
}

impl Task {
    /// Describe a task running `entry` on its own `stack`.
    pub const fn new<const N: usize>(entry: TaskEntry, stack: &'static Stack<N>) -> Task {
        Task {
            entry,
            stack: stack.region(),
        }
    }

    /// Describe a task running on an arbitrary memory region.
    ///
    /// # Safety
    /// See [`StackRegion::from_raw`]; the region must belong to this task
    /// alone.
    pub const unsafe fn from_region(entry: TaskEntry, stack: StackRegion) -> Task {
        Task { entry, stack }
    }

    /// The task's entry function.
    pub const fn entry(&self) -> TaskEntry {
        self.entry
    }

    /// The task's stack region.
    pub const fn stack(&self) -> StackRegion {
        self.stack
    }
}

// Safety: a `Task` is a function pointer plus the address of memory that
// belongs to that task alone.
unsafe impl Sync for Task {}

// ---------------------------------------------------------------------------
// Task Control Block
// ---------------------------------------------------------------------------

/// Task Control Block (TCB): everything the scheduler keeps per task slot.
///
/// TCBs live in a fixed-size array inside the scheduler. `stack_pointer` is
/// written only by the bootstrapper and by the context switch; while the
/// task is not running it points at a complete context frame.
#[derive(Clone, Copy)]
pub struct TaskControlBlock {
    /// Ready or Blocked.
    pub state: TaskState,

    /// Saved process stack pointer. Points at R4 of the saved frame.
    pub stack_pointer: *mut u32,

    /// Tick at which a Blocked task becomes Ready. Stale while Ready.
    pub wake_tick: u32,

    /// Entry point, set once at bootstrap.
    pub entry: Option<TaskEntry>,
}

// Safety: `stack_pointer` always points into the task's own stack region,
// and TCBs are only touched inside critical sections or from PendSV.
unsafe impl Send for TaskControlBlock {}

impl TaskControlBlock {
    /// An unbootstrapped slot. Used to initialize the static array.
    pub const EMPTY: TaskControlBlock = TaskControlBlock {
        state: TaskState::Ready,
        stack_pointer: core::ptr::null_mut(),
        wake_tick: 0,
        entry: None,
    };

    /// Mark the task Blocked until the tick counter reads `wake_tick`.
    pub fn block_until(&mut self, wake_tick: u32) {
        self.wake_tick = wake_tick;
        self.state = TaskState::Blocked;
    }

    /// Make the task Ready if it is Blocked and `now` is its wake tick.
    ///
    /// Returns `true` if the task was woken.
    #[inline]
    pub fn wake_if_due(&mut self, now: u32) -> bool {
        if self.state == TaskState::Blocked && self.wake_tick == now {
            self.state = TaskState::Ready;
            true
        } else {
            false
        }
    }

    /// Check if this task may be selected.
    #[inline]
    pub fn is_ready(&self) -> bool {
        self.state == TaskState::Ready
    }
}

// ---------------------------------------------------------------------------
// Unit tests (host-only)
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    extern "C" fn spin() -> ! {
        loop {}
    }

    #[test]
    fn test_empty_tcb() {
        let tcb = TaskControlBlock::EMPTY;
        assert!(tcb.is_ready());
        assert!(tcb.stack_pointer.is_null());
        assert!(tcb.entry.is_none());
    }

    #[test]
    fn test_block_and_wake() {
        let mut tcb = TaskControlBlock::EMPTY;
        tcb.block_until(40);
        assert_eq!(tcb.state, TaskState::Blocked);
        assert_eq!(tcb.wake_tick, 40);

        assert!(!tcb.wake_if_due(39));
        assert!(!tcb.wake_if_due(41));
        assert_eq!(tcb.state, TaskState::Blocked);

        assert!(tcb.wake_if_due(40));
        assert!(tcb.is_ready());
    }

    #[test]
    fn test_ready_task_ignores_stale_wake_tick() {
        let mut tcb = TaskControlBlock::EMPTY;
        tcb.block_until(7);
        assert!(tcb.wake_if_due(7));
        // Promoted once; the old deadline no longer matters.
        assert!(!tcb.wake_if_due(7));
        assert!(tcb.is_ready());
    }

    #[test]
    fn test_task_description() {
        static STACK: Stack<256> = Stack::new();
        static TASK: Task = Task::new(spin, &STACK);
        assert_eq!(TASK.entry() as usize, spin as usize);
        assert_eq!(TASK.stack().len(), 256);
        assert_eq!(TASK.stack().top() as usize, &STACK as *const _ as usize + 256);
    }
}
