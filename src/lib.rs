//! # RROS — Round-Robin Operating System
//!
//! A minimal preemptive round-robin task scheduler for ARM Cortex-M4
//! microcontrollers.
//!
//! ## Overview
//!
//! A fixed set of tasks share one core. Every millisecond SysTick advances the
//! tick counter, wakes tasks whose delay has expired and pends PendSV; PendSV
//! saves the running task's registers on its own stack and resumes the next
//! Ready task in circular order. Tasks give up the processor early by
//! calling [`kernel::task_delay`]. When every task sleeps, the idle task in
//! slot 0 runs.
//!
//! ## Architecture
//!
//! ```text
//! ┌────────────────────────────────────────────────────────┐
//! │                    Application Tasks                    │
//! ├────────────────────────────────────────────────────────┤
//! │                 Kernel API (kernel.rs)                  │
//! │        init() · start() · task_delay() · now()          │
//! ├───────────────────────────┬────────────────────────────┤
//! │  Scheduler                │  Sync (sync.rs)            │
//! │  scheduler.rs             │  ─ critical_section        │
//! │  ─ tick()   ─ select_next │  ─ Shared<T>               │
//! │  ─ block_current()        │                            │
//! ├───────────────────────────┴────────────────────────────┤
//! │   Task Model (task.rs) · Stacks (stack.rs)              │
//! │   Context Frame (frame.rs)                              │
//! ├────────────────────────────────────────────────────────┤
//! │            Arch Port (arch/cortex_m4.rs)                │
//! │    PendSV · SysTick · launch · fault traps             │
//! ├────────────────────────────────────────────────────────┤
//! │         ARM Cortex-M4 Hardware (Thumb-2)                │
//! └────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Memory Model
//!
//! - **No heap**: all state is statically allocated
//! - **Fixed-size TCB array**: `[TaskControlBlock; MAX_TASKS]`
//! - **Per-task stack**: a `static` [`Stack`] handed to each [`Task`]
//! - **Critical sections**: `critical_section::with()` for shared state
//!
//! Everything above the arch port is plain Rust and is unit-tested on the
//! host.

#![cfg_attr(not(test), no_std)]

#[macro_use]
mod fmt;

pub mod arch;
pub mod config;
pub mod frame;
pub mod kernel;
pub mod scheduler;
pub mod stack;
pub mod sync;
pub mod task;

pub use config::ConfigError;
pub use stack::Stack;
pub use task::{Task, TaskEntry};
