//! # Scheduler
//!
//! Core scheduling logic for RROS: a priority-less, preemptive round robin
//! over a fixed task table, with tick-based blocking.
//!
//! ## Scheduling Algorithm
//!
//! At each SysTick interrupt:
//! 1. **Advance time**: increment the tick counter (wrapping)
//! 2. **Unblock sweep**: every Blocked task other than the idle task and the
//!    running task whose wake tick equals the counter becomes Ready
//! 3. **Reschedule**: the tick handler pends PendSV
//!
//! In PendSV the outgoing task's stack pointer is saved, the next Ready task
//! after the current one is chosen in circular order, and the incoming
//! task's stack pointer is handed back to the assembly to restore.
//!
//! ## Idle Fallback
//!
//! Slot 0 holds the idle task. The round-robin scan never picks it; it only
//! runs when every other task is Blocked, so the processor always has
//! something to execute.
//!
//! Nothing here touches hardware. The arch layer drives these methods from
//! its exception handlers, and the host unit tests drive them directly.

use crate::config::{ConfigError, FIRST_TASK, IDLE_TASK, MAX_TASKS};
use crate::frame::{self, HW_FRAME_WORDS};
use crate::task::{Task, TaskControlBlock, TaskEntry, TaskState};

// ---------------------------------------------------------------------------
// Scheduler struct
// ---------------------------------------------------------------------------

/// Lifecycle of the scheduler itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(target_os = "none", derive(defmt::Format))]
pub enum Phase {
    /// No task table yet.
    Empty,
    /// Frames written, first task not launched.
    Bootstrapped,
    /// A task owns the processor.
    Running,
}

/// Where the first task starts: the top of its stack and its entry point.
#[derive(Clone, Copy)]
pub struct Launch {
    pub stack_top: *mut u32,
    pub entry: TaskEntry,
}

/// The scheduler state: task table, current-task cursor and tick counter.
///
/// One instance lives in a `static` in `kernel.rs`.
///
/// ## Design Notes
///
/// - All tasks are stored inline in a fixed-size array (no heap)
/// - `current_task` tracks the index of the running task
/// - An idle task (index 0) is always present as a fallback
pub struct Scheduler<const N: usize = MAX_TASKS> {
    /// Fixed-size array of TCBs. Index 0 is reserved for the idle task.
    tasks: [TaskControlBlock; N],

    /// Index of the task that currently owns PSP.
    current_task: usize,

    /// Ticks since start, wrapping at `u32::MAX`.
    tick_count: u32,

    phase: Phase,
}

impl<const N: usize> Scheduler<N> {
    /// Create an empty scheduler. The task table must be bootstrapped
    /// before the scheduler can start.
    pub const fn new() -> Self {
        // Idle task plus at least one real task
        assert!(N > FIRST_TASK);
        Self {
            tasks: [TaskControlBlock::EMPTY; N],
            current_task: FIRST_TASK,
            tick_count: 0,
            phase: Phase::Empty,
        }
    }

    // -----------------------------------------------------------------------
    // Bootstrap
    // -----------------------------------------------------------------------

    /// Fill the TCB table from `tasks` and write each task's initial frame.
    ///
    /// Slot 0 must be the idle task. All stack regions are validated before
    /// any of them is written, so a failed bootstrap leaves memory untouched.
    pub fn bootstrap(&mut self, tasks: &[Task; N]) -> Result<(), ConfigError> {
        if self.phase != Phase::Empty {
            return Err(ConfigError::AlreadyStarted);
        }

        for (id, task) in tasks.iter().enumerate() {
            let region = task.stack();
            if !region.fits_frame() {
                return Err(ConfigError::StackTooSmall { task: id });
            }
            if !region.is_aligned() {
                return Err(ConfigError::StackMisaligned { task: id });
            }
            for (other, earlier) in tasks[..id].iter().enumerate() {
                if region.overlaps(&earlier.stack()) {
                    return Err(ConfigError::StacksOverlap { first: other, second: id });
                }
            }
        }

        for (id, (tcb, task)) in self.tasks.iter_mut().zip(tasks.iter()).enumerate() {
            let top = task.stack().top();
            // SAFETY: the region was checked above to be aligned and large
            // enough, and the `Task` constructors require it to belong to
            // this task alone.
            let sp = unsafe { frame::write_initial(top, task.entry() as usize) };
            debug!(
                "Init task frame {=usize}, stack top 0x{=usize:08x}, frame @ 0x{=usize:08x}",
                id,
                top as usize,
                sp as usize
            );

            *tcb = TaskControlBlock {
                state: TaskState::Ready,
                stack_pointer: sp,
                wake_tick: 0,
                entry: Some(task.entry()),
            };
        }

        self.current_task = FIRST_TASK;
        self.phase = Phase::Bootstrapped;
        Ok(())
    }

    /// Hand over the first task.
    ///
    /// The first task is started by a direct jump rather than an exception
    /// return, so its bootstrapped frame is discarded: PSP starts at the top
    /// of its stack. The frame is rebuilt by the first PendSV that switches
    /// away from it.
    pub fn launch(&mut self) -> Result<Launch, ConfigError> {
        match self.phase {
            Phase::Empty => return Err(ConfigError::NotBootstrapped),
            Phase::Running => return Err(ConfigError::AlreadyStarted),
            Phase::Bootstrapped => {}
        }

        let tcb = &self.tasks[self.current_task];
        let entry = tcb.entry.ok_or(ConfigError::NotBootstrapped)?;
        // SAFETY: bootstrap left a complete frame at `stack_pointer`.
        let stack_top = unsafe {
            let (_, hw) = frame::restore_callee(tcb.stack_pointer);
            hw.add(HW_FRAME_WORDS)
        };

        self.phase = Phase::Running;
        info!("Launching task {=usize}", self.current_task);
        Ok(Launch { stack_top, entry })
    }

    // -----------------------------------------------------------------------
    // Tick handling
    // -----------------------------------------------------------------------

    /// Called from the SysTick handler every tick.
    ///
    /// Advances the tick counter by exactly one, then promotes every Blocked
    /// task whose wake tick equals the new count. The idle task and the
    /// running task are skipped.
    ///
    /// The comparison is an exact match: a task whose wake tick is skipped
    /// stays Blocked until the counter wraps around to it again.
    pub fn tick(&mut self) {
        self.tick_count = self.tick_count.wrapping_add(1);

        let now = self.tick_count;
        let current = self.current_task;
        for (id, tcb) in self.tasks.iter_mut().enumerate().skip(IDLE_TASK + 1) {
            if id != current {
                tcb.wake_if_due(now);
            }
        }
    }

    // -----------------------------------------------------------------------
    // Task selection
    // -----------------------------------------------------------------------

    /// Select the next task to run and make it current.
    ///
    /// Scans one full revolution starting after the current task and picks
    /// the first Ready task that is not the idle task. If there is none, the
    /// idle task is selected.
    ///
    /// # Returns
    /// Index of the task that is now current.
    pub fn select_next(&mut self) -> usize {
        let mut next = IDLE_TASK;
        for step in 1..=N {
            let candidate = (self.current_task + step) % N;
            if candidate != IDLE_TASK && self.tasks[candidate].is_ready() {
                next = candidate;
                break;
            }
        }
        self.current_task = next;
        next
    }

    // -----------------------------------------------------------------------
    // Blocking
    // -----------------------------------------------------------------------

    /// Block the current task for `ticks` ticks.
    ///
    /// Must be called inside a critical section. The idle task never blocks;
    /// for it this is a no-op. A zero-tick delay wakes on `tick_count` itself,
    /// which the next sweep has already passed, so the task sleeps until the
    /// counter wraps.
    ///
    /// Returns `true` if the caller must pend a reschedule.
    pub fn block_current(&mut self, ticks: u32) -> bool {
        let current = self.current_task;
        if current == IDLE_TASK {
            return false;
        }
        let wake = self.tick_count.wrapping_add(ticks);
        self.tasks[current].block_until(wake);
        trace!("Task {=usize} blocked until tick {=u32}", current, wake);
        true
    }

    // -----------------------------------------------------------------------
    // Context switch
    // -----------------------------------------------------------------------

    /// Scheduler half of PendSV.
    ///
    /// Stores `psp` (pointing at the outgoing task's saved R4) in the current
    /// TCB, selects the next task, and returns the stack pointer to restore.
    pub fn switch_context(&mut self, psp: *mut u32) -> *mut u32 {
        self.tasks[self.current_task].stack_pointer = psp;
        let next = self.select_next();
        self.tasks[next].stack_pointer
    }

    // -----------------------------------------------------------------------
    // Accessors
    // -----------------------------------------------------------------------

    /// Index of the running task.
    pub fn current_task(&self) -> usize {
        self.current_task
    }

    /// Ticks elapsed since start, modulo 2^32.
    pub fn tick_count(&self) -> u32 {
        self.tick_count
    }

    /// Lifecycle phase.
    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// The TCB in slot `id`.
    pub fn tcb(&self, id: usize) -> &TaskControlBlock {
        &self.tasks[id]
    }
}

impl<const N: usize> Default for Scheduler<N> {
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
    use crate::frame::{EXC_RETURN_THREAD_PSP, FRAME_BYTES, INITIAL_XPSR};
    use crate::stack::{Stack, StackRegion};

    extern "C" fn idle() -> ! {
        loop {}
    }
    extern "C" fn t1() -> ! {
        loop {}
    }
    extern "C" fn t2() -> ! {
        loop {}
    }
    extern "C" fn t3() -> ! {
        loop {}
    }
    extern "C" fn t4() -> ! {
        loop {}
    }

    const ENTRIES: [TaskEntry; 5] = [idle, t1, t2, t3, t4];

    fn stack() -> &'static Stack<256> {
        std::boxed::Box::leak(std::boxed::Box::new(Stack::new()))
    }

    fn task_set() -> [Task; 5] {
        ENTRIES.map(|entry| Task::new(entry, stack()))
    }

    fn bootstrapped() -> Scheduler<5> {
        let mut sched = Scheduler::<5>::new();
        sched.bootstrap(&task_set()).unwrap();
        sched
    }

    /// Put every user task except `except` to sleep far in the future.
    fn block_all_but(sched: &mut Scheduler<5>, except: &[usize]) {
        for id in 1..5 {
            if !except.contains(&id) {
                sched.tasks[id].block_until(u32::MAX);
            }
        }
    }

    // --- bootstrap ---

    #[test]
    fn test_bootstrap_writes_frames() {
        let tasks = task_set();
        let mut sched = Scheduler::<5>::new();
        assert_eq!(sched.phase(), Phase::Empty);
        sched.bootstrap(&tasks).unwrap();

        assert_eq!(sched.phase(), Phase::Bootstrapped);
        assert_eq!(sched.current_task(), FIRST_TASK);
        assert_eq!(sched.tick_count(), 0);

        for (id, task) in tasks.iter().enumerate() {
            let tcb = sched.tcb(id);
            assert_eq!(tcb.state, TaskState::Ready);
            assert_eq!(
                task.stack().top() as usize - tcb.stack_pointer as usize,
                FRAME_BYTES
            );
            let frame = unsafe { frame::read(tcb.stack_pointer) };
            assert_eq!(frame.callee.regs, [0; 8]);
            assert_eq!(frame.exception.xpsr, INITIAL_XPSR);
            assert_eq!(frame.exception.lr, EXC_RETURN_THREAD_PSP);
            assert_eq!(frame.exception.pc, (ENTRIES[id] as usize as u32) & !1);
            assert_eq!(tcb.entry.map(|e| e as usize), Some(ENTRIES[id] as usize));
        }
    }

    #[test]
    fn test_bootstrap_rejects_small_stack() {
        static SMALL: Stack<32> = Stack::new();
        let mut tasks = task_set();
        tasks[3] = Task::new(t3, &SMALL);
        let mut sched = Scheduler::<5>::new();
        assert_eq!(
            sched.bootstrap(&tasks),
            Err(ConfigError::StackTooSmall { task: 3 })
        );
        assert_eq!(sched.phase(), Phase::Empty);
    }

    #[test]
    fn test_bootstrap_rejects_misaligned_stack() {
        let mut tasks = task_set();
        let base = stack().region();
        let odd = unsafe { StackRegion::from_raw((base.top() as usize - 4) as *mut u32, 200) };
        tasks[2] = unsafe { Task::from_region(t2, odd) };
        let mut sched = Scheduler::<5>::new();
        assert_eq!(
            sched.bootstrap(&tasks),
            Err(ConfigError::StackMisaligned { task: 2 })
        );
    }

    #[test]
    fn test_bootstrap_rejects_shared_stack() {
        static SHARED: Stack<256> = Stack::new();
        let mut tasks = task_set();
        tasks[1] = Task::new(t1, &SHARED);
        tasks[4] = Task::new(t4, &SHARED);
        let mut sched = Scheduler::<5>::new();
        assert_eq!(
            sched.bootstrap(&tasks),
            Err(ConfigError::StacksOverlap { first: 1, second: 4 })
        );
    }

    #[test]
    fn test_bootstrap_twice() {
        let mut sched = bootstrapped();
        assert_eq!(sched.bootstrap(&task_set()), Err(ConfigError::AlreadyStarted));
    }

    // --- launch ---

    #[test]
    fn test_launch_first_task() {
        let tasks = task_set();
        let mut sched = Scheduler::<5>::new();
        assert!(matches!(sched.launch(), Err(ConfigError::NotBootstrapped)));

        sched.bootstrap(&tasks).unwrap();
        let launch = sched.launch().unwrap();
        assert_eq!(launch.stack_top, tasks[FIRST_TASK].stack().top());
        assert_eq!(launch.entry as usize, t1 as usize);
        assert_eq!(sched.phase(), Phase::Running);

        assert!(matches!(sched.launch(), Err(ConfigError::AlreadyStarted)));
    }

    // --- tick ---

    #[test]
    fn test_tick_counts() {
        let mut sched = bootstrapped();
        for n in 1..=1234u32 {
            sched.tick();
            assert_eq!(sched.tick_count(), n);
        }
    }

    #[test]
    fn test_tick_wraps() {
        let mut sched = bootstrapped();
        sched.tick_count = u32::MAX - 1;
        sched.tick();
        assert_eq!(sched.tick_count(), u32::MAX);
        sched.tick();
        assert_eq!(sched.tick_count(), 0);
    }

    #[test]
    fn test_delay_boundaries() {
        let mut sched = bootstrapped();
        for _ in 0..17 {
            sched.tick();
        }
        // Task 1 runs and sleeps for 10 ticks at T = 17.
        assert!(sched.block_current(10));
        assert_eq!(sched.tcb(1).wake_tick, 27);
        sched.switch_context(sched.tcb(1).stack_pointer);
        assert_ne!(sched.current_task(), 1);

        for _ in 18..27 {
            sched.tick();
            assert_eq!(sched.tcb(1).state, TaskState::Blocked);
        }
        sched.tick();
        assert_eq!(sched.tick_count(), 27);
        assert_eq!(sched.tcb(1).state, TaskState::Ready);
    }

    #[test]
    fn test_delay_across_wrap() {
        let mut sched = bootstrapped();
        sched.tick_count = u32::MAX - 1;
        assert!(sched.block_current(3));
        assert_eq!(sched.tcb(1).wake_tick, 1);
        sched.select_next();

        sched.tick();
        sched.tick();
        assert_eq!(sched.tcb(1).state, TaskState::Blocked);
        sched.tick();
        assert_eq!(sched.tick_count(), 1);
        assert!(sched.tcb(1).is_ready());
    }

    #[test]
    fn test_missed_wake_tick_stays_blocked() {
        let mut sched = bootstrapped();
        assert!(sched.block_current(5));
        sched.select_next();
        // The counter jumps past the deadline.
        sched.tick_count = 5;
        sched.tick();
        assert_eq!(sched.tcb(1).state, TaskState::Blocked);
        for _ in 0..100 {
            sched.tick();
        }
        assert_eq!(sched.tcb(1).state, TaskState::Blocked);
    }

    #[test]
    fn test_sweep_skips_running_task() {
        let mut sched = bootstrapped();
        // Task 1 blocks but the tick arrives before PendSV switches away.
        assert!(sched.block_current(1));
        sched.tick();
        assert_eq!(sched.current_task(), 1);
        assert_eq!(sched.tcb(1).state, TaskState::Blocked);
    }

    #[test]
    fn test_sweep_skips_idle() {
        let mut sched = bootstrapped();
        // Never happens through the API; the sweep must not care either way.
        sched.tasks[IDLE_TASK].block_until(1);
        sched.select_next();
        sched.tick();
        assert_eq!(sched.tcb(IDLE_TASK).state, TaskState::Blocked);
    }

    // --- selection ---

    #[test]
    fn test_round_robin_order() {
        let mut sched = bootstrapped();
        assert_eq!(sched.current_task(), 1);
        let picks: std::vec::Vec<usize> = (0..8).map(|_| sched.select_next()).collect();
        assert_eq!(picks, [2, 3, 4, 1, 2, 3, 4, 1]);
    }

    #[test]
    fn test_round_robin_skips_blocked() {
        let mut sched = bootstrapped();
        block_all_but(&mut sched, &[1, 3]);
        assert_eq!(sched.select_next(), 3);
        assert_eq!(sched.select_next(), 1);
        assert_eq!(sched.select_next(), 3);
    }

    #[test]
    fn test_only_current_ready_keeps_running() {
        let mut sched = bootstrapped();
        block_all_but(&mut sched, &[1]);
        assert_eq!(sched.select_next(), 1);
    }

    #[test]
    fn test_idle_fallback() {
        let mut sched = bootstrapped();
        block_all_but(&mut sched, &[]);
        for _ in 0..10 {
            assert_eq!(sched.select_next(), IDLE_TASK);
        }
    }

    #[test]
    fn test_leaves_idle_when_task_wakes() {
        let mut sched = bootstrapped();
        block_all_but(&mut sched, &[]);
        assert_eq!(sched.select_next(), IDLE_TASK);
        sched.tasks[4].state = TaskState::Ready;
        assert_eq!(sched.select_next(), 4);
    }

    // --- blocking ---

    #[test]
    fn test_idle_never_blocks() {
        let mut sched = bootstrapped();
        block_all_but(&mut sched, &[]);
        sched.select_next();
        assert_eq!(sched.current_task(), IDLE_TASK);

        let before = sched.tcb(IDLE_TASK).wake_tick;
        assert!(!sched.block_current(100));
        assert_eq!(sched.tcb(IDLE_TASK).state, TaskState::Ready);
        assert_eq!(sched.tcb(IDLE_TASK).wake_tick, before);
    }

    #[test]
    fn test_zero_delay_sleeps_until_wrap() {
        let mut sched = bootstrapped();
        sched.tick_count = 42;
        assert!(sched.block_current(0));
        assert_eq!(sched.tcb(1).state, TaskState::Blocked);
        assert_eq!(sched.tcb(1).wake_tick, 42);
        assert_eq!(sched.select_next(), 2);

        // The wake tick is already behind the counter.
        sched.tick();
        assert_eq!(sched.tcb(1).state, TaskState::Blocked);
    }

    // --- context switch ---

    #[test]
    fn test_switch_saves_and_restores_pointers() {
        let mut sched = bootstrapped();
        let incoming = sched.tcb(2).stack_pointer;
        let outgoing = unsafe { sched.tcb(1).stack_pointer.sub(3) };

        let restored = sched.switch_context(outgoing);
        assert_eq!(sched.tcb(1).stack_pointer, outgoing);
        assert_eq!(sched.current_task(), 2);
        assert_eq!(restored, incoming);
    }

    // --- whole-system scenario ---

    /// An LED task: on, sleep `period`, off, sleep `period`, forever.
    struct Blinker {
        period: u32,
        on: bool,
        turned_off: u32,
    }

    impl Blinker {
        fn new(period: u32) -> Self {
            Self { period, on: false, turned_off: 0 }
        }

        /// One pass of the task body between two delays.
        fn step(&mut self, sched: &mut Scheduler<5>) -> bool {
            if self.on {
                self.turned_off += 1;
            }
            self.on = !self.on;
            sched.block_current(self.period)
        }
    }

    /// Run PendSV until no reschedule is pending, letting each selected task
    /// run its body.
    fn service_pendsv(sched: &mut Scheduler<5>, blinkers: &mut [Blinker], mut pending: bool) {
        while pending {
            pending = false;
            let psp = sched.tcb(sched.current_task()).stack_pointer;
            let restored = sched.switch_context(psp);
            let next = sched.current_task();
            assert_eq!(restored, sched.tcb(next).stack_pointer);

            let all_blocked = (1..5).all(|id| !sched.tcb(id).is_ready());
            if next == IDLE_TASK {
                assert!(all_blocked);
            } else {
                assert!(sched.tcb(next).is_ready());
                pending = blinkers[next - 1].step(sched);
            }
        }
    }

    #[test]
    fn test_blinky_scenario() {
        let mut sched = bootstrapped();
        let mut blinkers = [
            Blinker::new(1000),
            Blinker::new(500),
            Blinker::new(250),
            Blinker::new(125),
        ];

        sched.launch().unwrap();
        let pending = blinkers[0].step(&mut sched);
        service_pendsv(&mut sched, &mut blinkers, pending);
        assert_eq!(sched.current_task(), IDLE_TASK);
        assert!(blinkers.iter().all(|b| b.on));

        for _ in 0..1000 {
            sched.tick();
            service_pendsv(&mut sched, &mut blinkers, true);
        }

        assert_eq!(sched.tick_count(), 1000);
        let offs: std::vec::Vec<u32> = blinkers.iter().map(|b| b.turned_off).collect();
        assert_eq!(offs, [1, 1, 2, 4]);
        assert!(!blinkers[0].on);
        assert!(blinkers[3].on);
    }
}
