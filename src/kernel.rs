//! # Kernel
//!
//! Top-level kernel initialization and public API for RROS.
//!
//! The kernel owns the one global scheduler instance. Every access to it,
//! from tasks or from exception handlers, goes through a critical section.
//!
//! ## Startup Sequence
//!
//! ```text
//! reset_handler (cortex-m-rt)
//!   └─► main()
//!         ├─► CortexM4::enable_fault_traps()
//!         ├─► kernel::init(&TASKS)    ← bootstrap every task frame
//!         └─► kernel::start(port, hz) ← no return on success
//!               ├─► mask interrupts
//!               ├─► set PendSV / SysTick priorities
//!               ├─► configure SysTick
//!               └─► switch to PSP and jump to task 1 (unmasks interrupts)
//! ```

use crate::arch::Reschedule;
use crate::config::{ConfigError, MAX_TASKS};
use crate::scheduler::Scheduler;
use crate::sync::Shared;
use crate::task::{Task, TaskState};

#[cfg(target_os = "none")]
use crate::arch::cortex_m4::{self, CortexM4, PendSv};

// ---------------------------------------------------------------------------
// Global scheduler instance
// ---------------------------------------------------------------------------

/// Global scheduler instance, shared by task context, SysTick and PendSV.
static SCHEDULER: Shared<Scheduler<MAX_TASKS>> = Shared::new(Scheduler::new());

// ---------------------------------------------------------------------------
// Kernel API
// ---------------------------------------------------------------------------

/// Bootstrap the task table.
///
/// Slot 0 of `tasks` is the idle task. Writes the initial context frame of
/// every task onto its stack. Must be called once, before [`start`].
pub fn init(tasks: &[Task; MAX_TASKS]) -> Result<(), ConfigError> {
    let result = SCHEDULER.lock(|s| s.bootstrap(tasks));
    match result {
        Ok(()) => info!("Task table ready ({=usize} slots)", MAX_TASKS),
        Err(err) => error!("Task table rejected: {}", err),
    }
    result
}

/// Start the scheduler. **Does not return** unless configuration fails.
///
/// Masks interrupts, gives SysTick priority over PendSV, programs SysTick for
/// `tick_hz`, then switches thread mode to the process stack and jumps into
/// the first task. Interrupts are unmasked by that final jump.
///
/// On error interrupts stay masked and no task has run; the caller is
/// expected to report and halt.
#[cfg(target_os = "none")]
pub fn start(mut port: CortexM4, tick_hz: u32) -> Result<core::convert::Infallible, ConfigError> {
    cortex_m::interrupt::disable();

    let launch = SCHEDULER.lock(|s| s.launch())?;
    port.set_exception_priorities();
    port.configure_periodic_tick(tick_hz)?;
    info!("Scheduler started at {=u32} Hz", tick_hz);

    // SAFETY: `launch` comes from a bootstrapped scheduler, so the stack top
    // belongs to the first task and the entry never returns.
    unsafe { cortex_m4::launch(launch.stack_top, launch.entry) }
}

/// Block the calling task for `ticks` scheduler ticks.
///
/// The task is marked Blocked, a reschedule is pended, and the call returns
/// once the task has been woken and selected again. From the idle task this
/// is a no-op. The wake tick is matched exactly, so `task_delay(0)` sleeps
/// until the tick counter wraps.
///
/// # Precondition
/// Task context only. Calling this from an interrupt handler is undefined.
#[cfg(target_os = "none")]
pub fn task_delay(ticks: u32) {
    task_delay_with(&PendSv, ticks);
}

/// [`task_delay`] with an explicit reschedule capability.
pub fn task_delay_with<R: Reschedule>(port: &R, ticks: u32) {
    SCHEDULER.lock(|s| {
        if s.block_current(ticks) {
            port.pend_reschedule();
        }
    });
}

/// Tick entry point. Call once per SysTick interrupt.
///
/// Advances the tick counter, wakes due tasks, then pends a reschedule.
pub fn tick<R: Reschedule>(port: &R) {
    SCHEDULER.lock(|s| s.tick());
    port.pend_reschedule();
}

/// Scheduler half of the PendSV handler.
///
/// Saves `psp` into the outgoing task's TCB, selects the next task and
/// returns the stack pointer to restore. Save and select happen in one
/// critical section, so SysTick never sees a half-switched table.
pub fn switch_context(psp: *mut u32) -> *mut u32 {
    SCHEDULER.lock(|s| s.switch_context(psp))
}

/// Ticks elapsed since the scheduler started.
pub fn now() -> u32 {
    SCHEDULER.lock(|s| s.tick_count())
}

/// Index of the running task.
pub fn current_task() -> usize {
    SCHEDULER.lock(|s| s.current_task())
}

/// State of the task in slot `id`.
///
/// # Panics
/// If `id >= MAX_TASKS`.
pub fn task_state(id: usize) -> TaskState {
    SCHEDULER.lock(|s| s.tcb(id).state)
}

// ---------------------------------------------------------------------------
// Unit tests (host-only)
// ---------------------------------------------------------------------------
