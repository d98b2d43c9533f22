//! # RROS Blinky
//!
//! Four tasks blink the four user LEDs of the STM32F4-Discovery at
//! different rates, each sleeping with `task_delay` between toggles:
//!
//! | Slot | Task | LED | Half-period |
//! |------|------|-----|-------------|
//! | 0 | `idle_task` | — | — |
//! | 1 | `green_task` | PD12 | 1000 ms |
//! | 2 | `orange_task` | PD13 | 500 ms |
//! | 3 | `blue_task` | PD15 | 250 ms |
//! | 4 | `red_task` | PD14 | 125 ms |
//!
//! Most of the time every LED task is asleep and the idle task runs.

#![no_std]
#![no_main]

use cortex_m_rt::{entry, exception, ExceptionFrame};
use defmt_semihosting as _;
use panic_halt as _;

use rros::arch::cortex_m4::CortexM4;
use rros::config::{MAX_TASKS, STACK_SIZE, TICK_HZ};
use rros::{kernel, ConfigError, Stack, Task};

// ---------------------------------------------------------------------------
// Task table
// ---------------------------------------------------------------------------

static TASKS: [Task; MAX_TASKS] = [
    Task::new(idle_task, {
        static STACK: Stack<STACK_SIZE> = Stack::new();
        &STACK
    }),
    Task::new(green_task, {
        static STACK: Stack<STACK_SIZE> = Stack::new();
        &STACK
    }),
    Task::new(orange_task, {
        static STACK: Stack<STACK_SIZE> = Stack::new();
        &STACK
    }),
    Task::new(blue_task, {
        static STACK: Stack<STACK_SIZE> = Stack::new();
        &STACK
    }),
    Task::new(red_task, {
        static STACK: Stack<STACK_SIZE> = Stack::new();
        &STACK
    }),
];

// ---------------------------------------------------------------------------
// Task entry points
// ---------------------------------------------------------------------------

/// Runs whenever every LED task is asleep.
extern "C" fn idle_task() -> ! {
    loop {
        cortex_m::asm::wfi();
    }
}

extern "C" fn green_task() -> ! {
    blink(Led::Green, 1000)
}

extern "C" fn orange_task() -> ! {
    blink(Led::Orange, 500)
}

extern "C" fn blue_task() -> ! {
    blink(Led::Blue, 250)
}

extern "C" fn red_task() -> ! {
    blink(Led::Red, 125)
}

/// On for `half_period` ticks, off for `half_period` ticks, forever.
fn blink(led: Led, half_period: u32) -> ! {
    loop {
        led.on();
        kernel::task_delay(half_period);
        led.off();
        kernel::task_delay(half_period);
    }
}

// ---------------------------------------------------------------------------
// LEDs (GPIOD 12..=15)
// ---------------------------------------------------------------------------

const RCC_AHB1ENR: *mut u32 = 0x4002_3830 as *mut u32;
const RCC_AHB1ENR_GPIODEN: u32 = 1 << 3;
const GPIOD_MODER: *mut u32 = 0x4002_0C00 as *mut u32;
const GPIOD_BSRR: *mut u32 = 0x4002_0C18 as *mut u32;

#[derive(Clone, Copy)]
enum Led {
    Green = 12,
    Orange = 13,
    Red = 14,
    Blue = 15,
}

impl Led {
    const ALL: [Led; 4] = [Led::Green, Led::Orange, Led::Red, Led::Blue];

    /// Clock GPIOD and make every LED pin a push-pull output.
    fn init_all() {
        // SAFETY: single-threaded bring-up, before the scheduler starts.
        unsafe {
            let enr = RCC_AHB1ENR.read_volatile();
            RCC_AHB1ENR.write_volatile(enr | RCC_AHB1ENR_GPIODEN);

            let mut moder = GPIOD_MODER.read_volatile();
            for led in Led::ALL {
                let shift = 2 * led as u32;
                moder = (moder & !(0b11 << shift)) | (0b01 << shift);
            }
            GPIOD_MODER.write_volatile(moder);
        }
        for led in Led::ALL {
            led.off();
        }
    }

    fn on(self) {
        // SAFETY: BSRR writes are atomic set/reset; other pins are unaffected.
        unsafe { GPIOD_BSRR.write_volatile(1 << self as u32) }
    }

    fn off(self) {
        // SAFETY: as in `on`.
        unsafe { GPIOD_BSRR.write_volatile(1 << (self as u32 + 16)) }
    }
}

// ---------------------------------------------------------------------------
// Main entry point
// ---------------------------------------------------------------------------

/// Firmware entry point. Enables fault traps, bootstraps the task table and
/// starts the scheduler. Does not return.
#[entry]
fn main() -> ! {
    let cp = cortex_m::Peripherals::take().unwrap();
    let mut port = CortexM4::new(cp.SCB, cp.SYST);

    port.enable_fault_traps();
    Led::init_all();
    defmt::info!("RROS blinky, {=usize} task slots", MAX_TASKS);

    if let Err(err) = kernel::init(&TASKS) {
        config_failed(err);
    }
    let Err(err) = kernel::start(port, TICK_HZ);
    config_failed(err)
}

fn config_failed(err: ConfigError) -> ! {
    defmt::error!("Configuration error: {}", err);
    halt()
}

// ---------------------------------------------------------------------------
// Fault handlers
// ---------------------------------------------------------------------------

fn halt() -> ! {
    cortex_m::interrupt::disable();
    loop {
        cortex_m::asm::wfi();
    }
}

#[exception]
unsafe fn HardFault(frame: &ExceptionFrame) -> ! {
    defmt::error!("Exception: HardFault at pc 0x{=u32:08x}", frame.pc());
    halt()
}

#[exception]
fn MemoryManagement() -> ! {
    defmt::error!("Exception: MemManage");
    halt()
}

#[exception]
fn BusFault() -> ! {
    defmt::error!("Exception: BusFault");
    halt()
}

#[exception]
fn UsageFault() -> ! {
    defmt::error!("Exception: UsageFault");
    halt()
}
