//! # Architecture Abstraction Layer
//!
//! The scheduler never pokes hardware registers itself. It talks to the
//! processor through the capabilities defined here; the Cortex-M4 port
//! implements them, and host tests substitute recording fakes.

use crate::config::ConfigError;

#[cfg(target_os = "none")]
pub mod cortex_m4;

/// Ability to request a context switch.
///
/// Pending only marks the reschedule exception; the switch itself runs once
/// nothing of higher priority is active and interrupts are enabled.
pub trait Reschedule {
    fn pend_reschedule(&self);
}

/// Largest value the 24-bit SysTick reload register holds.
pub const SYSTICK_MAX_RELOAD: u32 = 0x00FF_FFFF;

/// SysTick reload value producing `rate_hz` interrupts per second from a
/// `clock_hz` core clock.
pub fn systick_reload(clock_hz: u32, rate_hz: u32) -> Result<u32, ConfigError> {
    if rate_hz == 0 || rate_hz > clock_hz {
        return Err(ConfigError::InvalidTickRate { rate_hz });
    }
    let reload = clock_hz / rate_hz - 1;
    if reload == 0 || reload > SYSTICK_MAX_RELOAD {
        return Err(ConfigError::InvalidTickRate { rate_hz });
    }
    Ok(reload)
}
