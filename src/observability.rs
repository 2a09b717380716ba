//! Crate-internal logging facade.
//!
//! Backend selection:
//! 1) `tracing` feature => `tracing::*` events
//! 2) `logging` feature => `log::*` records
//! 3) neither enabled => no-op (format args are still type-checked)
//!
//! Every record is emitted under the `ocsp_stapling` target so embedding
//! servers can filter stapling noise independently of their own logs.

macro_rules! emit {
    ($level:ident, $($arg:tt)*) => {{
        #[cfg(feature = "tracing")]
        { tracing::$level!(target: "ocsp_stapling", $($arg)*); }

        #[cfg(all(not(feature = "tracing"), feature = "logging"))]
        { log::$level!(target: "ocsp_stapling", $($arg)*); }

        #[cfg(all(not(feature = "tracing"), not(feature = "logging")))]
        { let _ = format_args!($($arg)*); }
    }};
}

#[allow(unused_macros)]
macro_rules! log_debug {
    ($($arg:tt)*) => { $crate::observability::emit!(debug, $($arg)*) };
}

#[allow(unused_macros)]
macro_rules! log_info {
    ($($arg:tt)*) => { $crate::observability::emit!(info, $($arg)*) };
}

#[allow(unused_macros)]
macro_rules! log_warn {
    ($($arg:tt)*) => { $crate::observability::emit!(warn, $($arg)*) };
}

#[allow(unused_macros)]
macro_rules! log_error {
    ($($arg:tt)*) => { $crate::observability::emit!(error, $($arg)*) };
}

pub(crate) use emit;
pub(crate) use log_debug;
pub(crate) use log_error;
pub(crate) use log_info;
pub(crate) use log_warn;
