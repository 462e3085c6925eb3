//! Logging shim.
//!
//! With the `log` feature enabled this re-exports the `log` crate's macros.
//! Without it, every macro type-checks its format arguments and then compiles
//! to nothing, so values that are only ever logged do not trip
//! `unused_variables`.

#![allow(unused_macros, unused_imports)]

#[cfg(feature = "log")]
pub(crate) use ::log::{debug, error, info, trace, warn};

#[cfg(not(feature = "log"))]
macro_rules! discard {
    ($($arg:tt)+) => {
        if false {
            let _ = format_args!($($arg)+);
        }
    };
}
#[cfg(not(feature = "log"))]
pub(crate) use discard;

#[cfg(not(feature = "log"))]
macro_rules! trace {
    ($($arg:tt)+) => { $crate::log::discard!($($arg)+) };
}
#[cfg(not(feature = "log"))]
pub(crate) use trace;

#[cfg(not(feature = "log"))]
macro_rules! debug {
    ($($arg:tt)+) => { $crate::log::discard!($($arg)+) };
}
#[cfg(not(feature = "log"))]
pub(crate) use debug;

#[cfg(not(feature = "log"))]
macro_rules! info {
    ($($arg:tt)+) => { $crate::log::discard!($($arg)+) };
}
#[cfg(not(feature = "log"))]
pub(crate) use info;

#[cfg(not(feature = "log"))]
macro_rules! warn_impl {
    ($($arg:tt)+) => { $crate::log::discard!($($arg)+) };
}
#[cfg(not(feature = "log"))]
pub(crate) use warn_impl as warn;

#[cfg(not(feature = "log"))]
macro_rules! error {
    ($($arg:tt)+) => { $crate::log::discard!($($arg)+) };
}
#[cfg(not(feature = "log"))]
pub(crate) use error;
