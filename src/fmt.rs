//! Logging shims.
//!
//! On the embedded target these forward to `defmt`. On the host (unit tests)
//! they only borrow their arguments, so the test binary links without a
//! global logger.

#![allow(unused_macros)]

macro_rules! trace {
    ($s:literal $(, $x:expr)* $(,)?) => {{
        #[cfg(target_os = "none")]
        ::defmt::trace!($s $(, $x)*);
        #[cfg(not(target_os = "none"))]
        let _ = ($( &$x, )*);
    }};
}

macro_rules! debug {
    ($s:literal $(, $x:expr)* $(,)?) => {{
        #[cfg(target_os = "none")]
        ::defmt::debug!($s $(, $x)*);
        #[cfg(not(target_os = "none"))]
        let _ = ($( &$x, )*);
    }};
}

macro_rules! info {
    ($s:literal $(, $x:expr)* $(,)?) => {{
        #[cfg(target_os = "none")]
        ::defmt::info!($s $(, $x)*);
        #[cfg(not(target_os = "none"))]
        let _ = ($( &$x, )*);
    }};
}

macro_rules! warn {
    ($s:literal $(, $x:expr)* $(,)?) => {{
        #[cfg(target_os = "none")]
        ::defmt::warn!($s $(, $x)*);
        #[cfg(not(target_os = "none"))]
        let _ = ($( &$x, )*);
    }};
}

macro_rules! error {
    ($s:literal $(, $x:expr)* $(,)?) => {{
        #[cfg(target_os = "none")]
        ::defmt::error!($s $(, $x)*);
        #[cfg(not(target_os = "none"))]
        let _ = ($( &$x, )*);
    }};
}
