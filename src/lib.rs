#![doc(test(attr(deny(warnings))))]
#![forbid(unsafe_code)]
#![warn(missing_docs)]

//! Shared plumbing for long-running monitoring daemons.
//!
//! A daemon of a monitoring system does some specific work (talks to a device, serves clients…),
//! but it also needs to behave like a daemon. It needs to report what happens in a consistent
//! way, to the terminal while it is being started by hand and to the system log once it runs in
//! background. It needs to die loudly and with a meaningful exit status when it can't go on. This
//! crate covers these common parts:
//!
//! * [`logging`]: The logging fanout. Each message is routed to the terminal, the system log,
//!   both or neither, depending on a [`LogRoute`][logging::LogRoute] and, for debug messages, the
//!   verbosity.
//! * [`error`]: The [`Fatal`][error::Fatal] failure type, carrying an exit status up to a single
//!   place that logs it and terminates.
//! * [`app`]: That single place.
//! * [`paths`]: Where runtime state (PID files and such) lives.
//!
//! Going to background, dropping privileges and the PID files live in the `vigil-daemonize`
//! crate.
//!
//! # Examples
//!
//! ```rust
//! use vigil::app;
//! use vigil::emit;
//! use vigil::logging::{LogCfg, Logger};
//!
//! let logger = Logger::from_cfg(&LogCfg::default());
//! app::run_term(logger, |logger| {
//!     emit!(logger, Info, "Doing the work");
//!     Ok(())
//! });
//! ```

pub mod app;
pub mod error;
pub mod logging;
pub mod paths;
pub mod utils;

pub use crate::error::{AnyError, Fatal, FatalExt};
pub use crate::logging::{LogRoute, Logger, Severity};
pub use crate::paths::Paths;

/// Commonly used items.
pub mod prelude {
    pub use super::{emit, emit_debug, AnyError, Fatal, FatalExt, LogRoute, Logger, Severity};
}
