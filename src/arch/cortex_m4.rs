//! # Cortex-M4 Port Layer
//!
//! Hardware-specific code for the ARM Cortex-M4 (Thumb-2) processor.
//! Implements context switching via PendSV, SysTick configuration, fault
//! trap enabling and the first-task launch.
//!
//! ## Context Switch Mechanism
//!
//! The Cortex-M4 uses a split-stack model:
//! - **MSP** (Main Stack Pointer): used by `main` and by exception handlers
//! - **PSP** (Process Stack Pointer): used by tasks in Thread mode
//!
//! On exception entry, the hardware automatically stacks R0–R3, R12, LR, PC,
//! and xPSR onto the process stack. The PendSV handler saves and restores
//! R4–R11 itself, which completes the context described in `frame.rs`.
//!
//! The port targets the soft-float ABI (`thumbv7em-none-eabi`): tasks never
//! touch the FPU, so every exception frame is a basic 8-word frame and every
//! return uses EXC_RETURN `0xFFFF_FFFD`.
//!
//! ## Interrupt Priorities
//!
//! - SysTick: 0x00 — the tick's unblock sweep always completes first
//! - PendSV: 0xFF (lowest) — runs only when no other handler is active

use core::arch::naked_asm;

use cortex_m::peripheral::scb::SystemHandler;
use cortex_m::peripheral::syst::SystClkSource;
use cortex_m::peripheral::{SCB, SYST};
use cortex_m_rt::exception;

use super::{systick_reload, Reschedule};
use crate::config::{ConfigError, SYSTEM_CLOCK_HZ};
use crate::kernel;
use crate::task::TaskEntry;

/// SHCSR bits enabling the configurable fault exceptions.
const SHCSR_MEMFAULTENA: u32 = 1 << 16;
const SHCSR_BUSFAULTENA: u32 = 1 << 17;
const SHCSR_USGFAULTENA: u32 = 1 << 18;

const SYSTICK_PRIORITY: u8 = 0x00;
const PENDSV_PRIORITY: u8 = 0xFF;

// ---------------------------------------------------------------------------
// Capabilities
// ---------------------------------------------------------------------------

/// Pends the PendSV exception. Zero-sized, usable from any context.
#[derive(Debug, Clone, Copy, Default)]
pub struct PendSv;

impl Reschedule for PendSv {
    #[inline]
    fn pend_reschedule(&self) {
        SCB::set_pendsv();
    }
}

/// Ownership of the core peripherals the scheduler needs during bring-up.
pub struct CortexM4 {
    scb: SCB,
    syst: SYST,
}

impl CortexM4 {
    pub fn new(scb: SCB, syst: SYST) -> Self {
        Self { scb, syst }
    }

    /// Route MemManage, BusFault and UsageFault to their own handlers
    /// instead of escalating them to HardFault.
    pub fn enable_fault_traps(&mut self) {
        // SAFETY: setting the enable bits only changes which handler a fault
        // is delivered to.
        unsafe {
            self.scb
                .shcsr
                .modify(|r| r | SHCSR_MEMFAULTENA | SHCSR_BUSFAULTENA | SHCSR_USGFAULTENA);
        }
    }

    /// Program SysTick to interrupt `rate_hz` times per second from the core
    /// clock, and start it.
    pub fn configure_periodic_tick(&mut self, rate_hz: u32) -> Result<(), ConfigError> {
        let reload = systick_reload(SYSTEM_CLOCK_HZ, rate_hz)?;
        self.syst.set_reload(reload);
        self.syst.clear_current();
        self.syst.set_clock_source(SystClkSource::Core);
        self.syst.enable_interrupt();
        self.syst.enable_counter();
        Ok(())
    }

    /// Give SysTick precedence over PendSV, and make PendSV the lowest
    /// priority exception in the system.
    pub fn set_exception_priorities(&mut self) {
        // SAFETY: called with interrupts masked, before any task runs, so no
        // priority-based critical section can be broken.
        unsafe {
            self.scb.set_priority(SystemHandler::SysTick, SYSTICK_PRIORITY);
            self.scb.set_priority(SystemHandler::PendSV, PENDSV_PRIORITY);
        }
    }
}

// ---------------------------------------------------------------------------
// First task launch
// ---------------------------------------------------------------------------

/// Switch Thread mode to the process stack at `stack_top` and jump to
/// `entry`, unmasking interrupts on the way.
///
/// Inputs: `r0` = initial PSP, `r1` = entry address. Never returns; `main`'s
/// frame on MSP is abandoned.
///
/// # Safety
/// Must be called once, in privileged Thread mode on MSP, with interrupts
/// masked. `stack_top` must be the 8-byte aligned top of the task's stack.
#[unsafe(naked)]
pub unsafe extern "C" fn launch(stack_top: *mut u32, entry: TaskEntry) -> ! {
    naked_asm!(
        "msr psp, r0",
        // CONTROL.SPSEL = 1: Thread mode uses PSP, stays privileged
        "movs r0, #2",
        "msr control, r0",
        "isb",
        "cpsie i",
        "bx r1",
    );
}

// ---------------------------------------------------------------------------
// PendSV handler (context switch)
// ---------------------------------------------------------------------------

/// PendSV exception handler — performs the actual context switch.
///
/// ## Sequence
/// 1. Save R4–R11 below the current task's PSP
/// 2. Call into the kernel: store that pointer in the current TCB, select
///    the next task, get its saved pointer back in `r0`
/// 3. Restore R4–R11 from the new task's stack
/// 4. Point PSP past them and return from the exception; the hardware
///    unstacks R0–R3, R12, LR, PC and xPSR and resumes the new task
///
/// It is a naked function: no prologue may push anything or reuse R4–R11
/// before they are saved. Only R0–R3 and R12 are scratch here, because the
/// hardware stacked them on entry.
///
/// # Safety
/// Entered by the NVIC only.
#[no_mangle]
#[allow(non_snake_case)]
#[unsafe(naked)]
pub unsafe extern "C" fn PendSV() {
    naked_asm!(
        // --- Save current context ---
        "mrs r0, psp",
        "stmdb r0!, {{r4-r11}}",

        // Keep EXC_RETURN; r2 pads MSP to 8 bytes for the call
        "push {{r2, lr}}",
        "bl {switch}",
        "pop {{r2, lr}}",

        // --- Restore new context ---
        "ldmia r0!, {{r4-r11}}",
        "msr psp, r0",
        "bx lr",

        switch = sym pendsv_switch,
    );
}

/// Kernel half of PendSV. `psp` points at the saved R4 of the outgoing task;
/// the return value points at the saved R4 of the incoming one.
extern "C" fn pendsv_switch(psp: *mut u32) -> *mut u32 {
    kernel::switch_context(psp)
}

// ---------------------------------------------------------------------------
// SysTick handler
// ---------------------------------------------------------------------------

/// SysTick exception handler — scheduler tick entry point.
#[exception]
fn SysTick() {
    kernel::tick(&PendSv);
}
