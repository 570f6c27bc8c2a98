//! Logging shim.
//!
//! With the `log` feature, these forward to the `log` crate. Without it, the arguments are still
//! type-checked through `format_args!` but nothing is emitted, so log statements cost nothing in
//! timing-critical paths.

#[cfg(not(feature = "log"))]
macro_rules! discard {
    ($($t:tt)*) => {{ let _ = format_args!($($t)*); }};
}

#[cfg(feature = "log")]
macro_rules! error {
    ($($t:tt)*) => {{ ::log::error!($($t)*); }};
}

#[cfg(feature = "log")]
macro_rules! warn {
    ($($t:tt)*) => {{ ::log::warn!($($t)*); }};
}

#[cfg(feature = "log")]
macro_rules! info {
    ($($t:tt)*) => {{ ::log::info!($($t)*); }};
}

#[cfg(feature = "log")]
macro_rules! debug {
    ($($t:tt)*) => {{ ::log::debug!($($t)*); }};
}

#[cfg(feature = "log")]
macro_rules! trace {
    ($($t:tt)*) => {{ ::log::trace!($($t)*); }};
}

#[cfg(not(feature = "log"))]
macro_rules! error {
    ($($t:tt)*) => { discard!($($t)*) };
}

#[cfg(not(feature = "log"))]
macro_rules! warn {
    ($($t:tt)*) => { discard!($($t)*) };
}

#[cfg(not(feature = "log"))]
macro_rules! info {
    ($($t:tt)*) => { discard!($($t)*) };
}

#[cfg(not(feature = "log"))]
macro_rules! debug {
    ($($t:tt)*) => { discard!($($t)*) };
}

#[cfg(not(feature = "log"))]
macro_rules! trace {
    ($($t:tt)*) => { discard!($($t)*) };
}
