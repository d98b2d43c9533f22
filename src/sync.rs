//! # Synchronization Primitives
//!
//! Interrupt-safe access to the shared scheduler state. The TCB table and
//! the tick counter are touched from task context, SysTick and PendSV, so
//! every access goes through a critical section.
//!
//! On the target the critical section is provided by `cortex-m`
//! (`critical-section-single-core`: PRIMASK is set on entry and restored on
//! exit). Host unit tests use the `std` implementation.

use core::cell::RefCell;

pub use critical_section::CriticalSection;
use critical_section::Mutex;

/// Execute a closure within a critical section (interrupts disabled).
///
/// Keep critical sections as short as possible to minimize interrupt
/// latency. Nesting is allowed; interrupts are re-enabled only when the
/// outermost section ends.
#[inline]
pub fn critical_section<F, R>(f: F) -> R
where
    F: FnOnce(CriticalSection<'_>) -> R,
{
    critical_section::with(f)
}

/// A value shared between task context and exception handlers.
pub struct Shared<T> {
    inner: Mutex<RefCell<T>>,
}

impl<T> Shared<T> {
    /// Wrap `value`. Usable in a `static` initializer.
    pub const fn new(value: T) -> Self {
        Self {
            inner: Mutex::new(RefCell::new(value)),
        }
    }

    /// Run `f` with exclusive access to the value.
    ///
    /// # Panics
    /// If called re-entrantly from inside another `lock` on the same value.
    #[inline]
    pub fn lock<F, R>(&self, f: F) -> R
    where
        F: FnOnce(&mut T) -> R,
    {
        critical_section(|cs| f(&mut self.inner.borrow_ref_mut(cs)))
    }
}
