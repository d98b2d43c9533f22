//! # RROS Configuration
//!
//! Compile-time constants governing the scheduler and system behavior.
//! All limits are fixed at compile time — no dynamic allocation.

use core::fmt;

/// Number of task slots, including the idle task in slot 0.
/// This bounds the static TCB array.
pub const MAX_TASKS: usize = 5;

/// Slot reserved for the idle task. Never blocked, always selectable.
pub const IDLE_TASK: usize = 0;

/// Slot of the task launched when the scheduler starts.
pub const FIRST_TASK: usize = 1;

/// SysTick frequency in Hz. One tick is one millisecond at 1000 Hz.
pub const TICK_HZ: u32 = 1000;

/// Per-task stack size in bytes used by the demo firmware. Must hold the
/// deepest call chain plus the 64-byte context frame.
pub const STACK_SIZE: usize = 1024;

/// System clock frequency in Hz (STM32F4 running from the 16 MHz HSI).
pub const SYSTEM_CLOCK_HZ: u32 = 16_000_000;

/// Errors detected while bringing the scheduler up.
///
/// Every variant is raised before interrupts are enabled; none of them can
/// occur once the first task is running.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(target_os = "none", derive(defmt::Format))]
pub enum ConfigError {
    /// The stack region of `task` cannot hold a context frame plus headroom.
    StackTooSmall { task: usize },
    /// The top of the stack region of `task` is not 8-byte aligned.
    StackMisaligned { task: usize },
    /// Two tasks were handed overlapping stack regions.
    StacksOverlap { first: usize, second: usize },
    /// `start` was called before the task table was bootstrapped.
    NotBootstrapped,
    /// The scheduler was bootstrapped or started twice.
    AlreadyStarted,
    /// The requested tick rate cannot be produced by SysTick.
    InvalidTickRate { rate_hz: u32 },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::StackTooSmall { task } => write!(f, "stack of task {} is too small", task),
            ConfigError::StackMisaligned { task } => {
                write!(f, "stack of task {} is not 8-byte aligned", task)
            }
            ConfigError::StacksOverlap { first, second } => {
                write!(f, "stacks of tasks {} and {} overlap", first, second)
            }
            ConfigError::NotBootstrapped => write!(f, "task table not bootstrapped"),
            ConfigError::AlreadyStarted => write!(f, "scheduler already started"),
            ConfigError::InvalidTickRate { rate_hz } => {
                write!(f, "tick rate of {} Hz not supported", rate_hz)
            }
        }
    }
}
