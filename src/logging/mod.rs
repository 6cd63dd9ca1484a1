//! The logging fanout.
//!
//! The [`Logger`] decides which of its sinks receive each message. There are two sinks, the
//! terminal (standard error output) and the system log. The decision is made by the [`LogRoute`]
//! bit mask and, for debug messages, by the verbosity threshold.
//!
//! The logger is an ordinary value, created once at startup (usually from the [`LogCfg`] and
//! [`LogOpts`] fragments) and passed by reference to whoever needs to log. Additionally, it can be
//! [installed][Logger::install] as the backend of the [`log`] crate, so libraries logging through
//! the usual macros end up in the same sinks.
//!
//! Logging is best-effort. If a sink fails to write, the failure is reported through the other
//! sink (if it is enabled) and otherwise ignored. Logging never fails the caller.
//!
//! # Examples
//!
//! ```rust
//! use vigil::{emit, emit_debug};
//! use vigil::logging::{LogRoute, Logger};
//!
//! let logger = Logger::new(LogRoute::STDERR, 1);
//! emit!(logger, Info, "Listening on {}", "127.0.0.1:3493");
//! // Goes through, level 1 <= verbosity 1
//! emit_debug!(logger, 1, "Sent {} bytes", 42);
//! // Dropped
//! emit_debug!(logger, 2, "Very verbose");
//! ```

use std::error::Error;
use std::fmt::{Arguments, Debug, Formatter, Result as FmtResult};
use std::process;
use std::sync::Arc;

use log::{LevelFilter, Log, Metadata, Record};
use serde::{Deserialize, Serialize};
use structopt::StructOpt;

use crate::error::Fatal;

mod dump;
mod route;
mod sink;

pub use self::dump::{ascii_dump, hex_dump};
pub use self::route::{LogRoute, RouteFlag};
#[cfg(feature = "syslog")]
pub use self::sink::Syslog;
pub use self::sink::{Severity, Sink, Terminal};

/// The logging configuration fragment.
///
/// Meant to be embedded into the application's configuration structure.
///
/// ```rust
/// use serde::Deserialize;
/// use vigil::logging::{LogCfg, LogRoute};
///
/// #[derive(Deserialize)]
/// struct Cfg {
///     logging: LogCfg,
/// }
///
/// let cfg: Cfg = toml::from_str(r#"
/// [logging]
/// route = ["stderr", "syslog-on-fatal"]
/// verbosity = 2
/// "#).unwrap();
/// assert_eq!(LogRoute::STDERR | LogRoute::SYSLOG_ON_FATAL, cfg.logging.route);
/// ```
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "kebab-case")]
#[non_exhaustive]
pub struct LogCfg {
    /// Where the messages go.
    ///
    /// Defaults to the standard error output, with the fatal messages going to the system log
    /// too.
    #[serde(default = "LogCfg::default_route")]
    pub route: LogRoute,

    /// Debug messages up to this level are logged.
    ///
    /// Zero means only the level-0 debug messages.
    #[serde(default)]
    pub verbosity: u32,
}

impl LogCfg {
    fn default_route() -> LogRoute {
        LogRoute::STDERR | LogRoute::SYSLOG_ON_FATAL
    }
}

impl Default for LogCfg {
    fn default() -> Self {
        LogCfg {
            route: LogCfg::default_route(),
            verbosity: 0,
        }
    }
}

/// Command line options fragment for logging.
///
/// Flatten this into the top-level `StructOpt` structure. The `-D` option can be repeated to
/// raise the verbosity further. The options override the configuration when merged by
/// [`transform`][LogOpts::transform].
#[derive(Clone, Debug, StructOpt)]
#[non_exhaustive]
pub struct LogOpts {
    /// Raise the debugging level (may be repeated).
    #[structopt(short = "D", parse(from_occurrences))]
    pub debug: u32,

    /// Log to the system log in addition to the standard error output.
    #[structopt(long)]
    pub syslog: bool,
}

impl LogOpts {
    /// Merges the command line options into the configuration.
    pub fn transform(&self, cfg: LogCfg) -> LogCfg {
        let mut route = cfg.route;
        if self.syslog {
            route.insert(LogRoute::SYSLOG);
        }
        LogCfg {
            route,
            verbosity: cfg.verbosity.max(self.debug),
        }
    }
}

/// The logging fanout engine.
///
/// See the [module documentation][self].
#[derive(Clone)]
pub struct Logger {
    route: LogRoute,
    verbosity: u32,
    ident: Option<String>,
    terminal: Arc<dyn Sink>,
    syslog: Option<Arc<dyn Sink>>,
    installed: bool,
}

impl Logger {
    /// Creates a logger writing to the standard error output.
    ///
    /// The system log sink is not connected until [`open_syslog`][Logger::open_syslog] is
    /// called. Until then, the [`SYSLOG`][LogRoute::SYSLOG] flags have no effect.
    pub fn new(route: LogRoute, verbosity: u32) -> Self {
        Self::with_sinks(route, verbosity, Arc::new(Terminal), None)
    }

    /// Creates a logger with custom sinks.
    pub fn with_sinks(
        route: LogRoute,
        verbosity: u32,
        terminal: Arc<dyn Sink>,
        syslog: Option<Arc<dyn Sink>>,
    ) -> Self {
        Self {
            route,
            verbosity,
            ident: None,
            terminal,
            syslog,
            installed: false,
        }
    }

    /// Creates the logger from the configuration fragment.
    pub fn from_cfg(cfg: &LogCfg) -> Self {
        Self::new(cfg.route, cfg.verbosity)
    }

    /// Connects the system log sink, tagging the messages with `progname`.
    ///
    /// If the connection fails, the system log sink stays disconnected and the error is
    /// returned. The logger is still usable.
    #[cfg(feature = "syslog")]
    pub fn open_syslog(&mut self, progname: &str) -> Result<(), crate::AnyError> {
        self.ident = Some(progname.to_owned());
        let syslog = Syslog::open(progname)?;
        self.syslog = Some(Arc::new(syslog));
        self.reinstall();
        Ok(())
    }

    /// The current route.
    pub fn route(&self) -> LogRoute {
        self.route
    }

    /// Changes the route.
    pub fn set_route(&mut self, route: LogRoute) {
        self.route = route;
        self.reinstall();
    }

    /// The current verbosity threshold.
    pub fn verbosity(&self) -> u32 {
        self.verbosity
    }

    /// Changes the verbosity threshold.
    pub fn set_verbosity(&mut self, verbosity: u32) {
        self.verbosity = verbosity;
        self.reinstall();
    }

    /// Would a debug message of this level be logged anywhere?
    pub fn debug_enabled(&self, level: u32) -> bool {
        level <= self.verbosity && (self.route.terminal() || self.has_syslog())
    }

    /// Logs an operational message.
    pub fn log(&self, severity: Severity, msg: Arguments) {
        self.deliver(
            self.route.terminal(),
            self.route.syslog(),
            severity,
            &msg.to_string(),
        );
    }

    /// Logs an operational message, appending the description of the error that caused it.
    pub fn log_with_errno(&self, severity: Severity, err: &dyn Error, msg: Arguments) {
        self.log(severity, format_args!("{}: {}", msg, err));
    }

    /// Logs a debug message, if `level` is within the verbosity.
    pub fn debug(&self, level: u32, msg: Arguments) {
        if level > self.verbosity {
            return;
        }
        self.deliver(
            self.route.terminal(),
            self.route.syslog(),
            Severity::Debug,
            &msg.to_string(),
        );
    }

    /// Logs a debug message with the description of the error appended.
    pub fn debug_with_errno(&self, level: u32, err: &dyn Error, msg: Arguments) {
        self.debug(level, format_args!("{}: {}", msg, err));
    }

    /// Logs the buffer as hexadecimal bytes on the given debug level.
    ///
    /// See [`hex_dump`] for the format.
    pub fn debug_hex(&self, level: u32, msg: &str, buf: &[u8]) {
        if level > self.verbosity {
            return;
        }
        for line in hex_dump(msg, buf) {
            self.debug(level, format_args!("{}", line));
        }
    }

    /// Logs the buffer as characters on the given debug level.
    ///
    /// See [`ascii_dump`] for the format.
    pub fn debug_ascii(&self, level: u32, msg: &str, buf: &[u8]) {
        if level > self.verbosity {
            return;
        }
        self.debug(level, format_args!("{}", ascii_dump(msg, buf)));
    }

    /// Delivers the fatal message, without terminating.
    ///
    /// The message goes to every sink enabled either by its plain flag or by its `_ON_FATAL`
    /// flag. This is the first half of [`fatal`][Logger::fatal], separated mostly for testing.
    pub fn emit_fatal(&self, fatal: &Fatal) {
        self.deliver(
            self.route.terminal_on_fatal(),
            self.route.syslog_on_fatal(),
            Severity::Critical,
            &fatal.to_string(),
        );
    }

    /// Delivers the fatal message and terminates the process with its status.
    pub fn fatal(&self, fatal: Fatal) -> ! {
        self.emit_fatal(&fatal);
        process::exit(fatal.status())
    }

    /// Adapts the logger to running in background.
    ///
    /// The standard error output is no longer connected to anything useful, so the route is
    /// switched to the system log. The system log sink is (re)connected so the messages carry the
    /// new process ID. If [`open_syslog`][Logger::open_syslog] was not called before, the
    /// connection is tagged with `progname`.
    ///
    /// If there's no system log sink at all after that (the connection failed and there was none
    /// before), the route to the standard error output is kept. There's no other place the
    /// messages could go to.
    pub fn detach(&mut self, progname: &str) {
        #[cfg(feature = "syslog")]
        {
            // A custom sink passed to with_sinks is left alone
            if self.ident.is_some() || self.syslog.is_none() {
                let ident = self
                    .ident
                    .get_or_insert_with(|| progname.to_owned())
                    .clone();
                match Syslog::open(&ident) {
                    Ok(syslog) => self.syslog = Some(Arc::new(syslog)),
                    Err(e) if self.syslog.is_some() => self.log(
                        Severity::Warning,
                        format_args!("Keeping the old syslog connection: {}", e),
                    ),
                    Err(e) => self.log(
                        Severity::Warning,
                        format_args!("No syslog to log to in background: {}", e),
                    ),
                }
            }
        }
        #[cfg(not(feature = "syslog"))]
        let _ = progname;
        self.route.insert(LogRoute::SYSLOG);
        if self.syslog.is_some() {
            self.route.remove(LogRoute::STDERR);
        }
        self.reinstall();
    }

    /// Is there a system log sink connected?
    pub fn syslog_connected(&self) -> bool {
        self.syslog.is_some()
    }

    /// Makes this logger the backend of the [`log`] crate.
    ///
    /// The `log` levels are mapped as:
    ///
    /// * `Error`, `Warn` and `Info` to the corresponding operational severities.
    /// * `Debug` to debug level 1.
    /// * `Trace` to debug level 2.
    ///
    /// Once installed, further changes to the logger (through the setters, [`detach`] or
    /// [`open_syslog`]) are propagated to the installed copy. It can be installed again at any
    /// time, replacing the previous one.
    ///
    /// [`detach`]: Logger::detach
    /// [`open_syslog`]: Logger::open_syslog
    pub fn install(&mut self) {
        // Fails if it is already set up, which is fine
        let _ = log_reroute::init();
        self.installed = true;
        log::set_max_level(self.max_level());
        log_reroute::reroute(self.clone());
    }

    fn reinstall(&mut self) {
        if self.installed {
            self.install();
        }
    }

    fn max_level(&self) -> LevelFilter {
        match self.verbosity {
            0 => LevelFilter::Info,
            1 => LevelFilter::Debug,
            _ => LevelFilter::Trace,
        }
    }

    fn has_syslog(&self) -> bool {
        self.route.syslog() && self.syslog.is_some()
    }

    fn deliver(&self, to_terminal: bool, to_syslog: bool, severity: Severity, msg: &str) {
        let syslog = self.syslog.as_ref().filter(|_| to_syslog);
        let terminal = Some(&self.terminal).filter(|_| to_terminal);
        let terminal_failed = terminal.and_then(|t| t.write(severity, msg).err());
        let syslog_failed = syslog.and_then(|s| s.write(severity, msg).err());
        // Report each failure through the other sink if that one works. Nothing else we can do.
        if let (Some(e), Some(s), None) = (terminal_failed.as_ref(), syslog, syslog_failed.as_ref())
        {
            let note = format!("Failed to log to {}: {}", self.terminal.name(), e);
            let _ = s.write(Severity::Warning, &note);
        }
        if let (Some(e), Some(t), None) = (syslog_failed.as_ref(), terminal, terminal_failed.as_ref())
        {
            let name = syslog.map(|s| s.name()).unwrap_or("syslog");
            let note = format!("Failed to log to {}: {}", name, e);
            let _ = t.write(Severity::Warning, &note);
        }
    }
}

impl Debug for Logger {
    fn fmt(&self, fmt: &mut Formatter) -> FmtResult {
        fmt.debug_struct("Logger")
            .field("route", &self.route)
            .field("verbosity", &self.verbosity)
            .field("ident", &self.ident)
            .field("syslog", &self.syslog.is_some())
            .finish()
    }
}

impl Log for Logger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        match metadata.level() {
            log::Level::Debug => self.debug_enabled(1),
            log::Level::Trace => self.debug_enabled(2),
            _ => self.route.terminal() || self.has_syslog(),
        }
    }

    fn log(&self, record: &Record) {
        let severity = match record.level() {
            log::Level::Error => Severity::Error,
            log::Level::Warn => Severity::Warning,
            log::Level::Info => Severity::Info,
            log::Level::Debug => return self.debug(1, *record.args()),
            log::Level::Trace => return self.debug(2, *record.args()),
        };
        Logger::log(self, severity, *record.args());
    }

    fn flush(&self) {}
}

/// Logs an operational message through a [`Logger`].
///
/// The second parameter is the name of the [`Severity`] variant, the rest is the `format!`-like
/// message.
///
/// ```rust
/// use vigil::emit;
/// use vigil::logging::{LogRoute, Logger};
///
/// let logger = Logger::new(LogRoute::STDERR, 0);
/// emit!(logger, Notice, "Reloading {}", "ups.conf");
/// ```
#[macro_export]
macro_rules! emit {
    ($logger: expr, $severity: ident, $($arg: tt)+) => {
        $logger.log(
            $crate::logging::Severity::$severity,
            format_args!($($arg)+),
        )
    };
}

/// Logs a debug message of the given level through a [`Logger`].
///
/// ```rust
/// use vigil::emit_debug;
/// use vigil::logging::{LogRoute, Logger};
///
/// let logger = Logger::new(LogRoute::STDERR, 0);
/// emit_debug!(logger, 3, "Not shown, the verbosity is just {}", logger.verbosity());
/// ```
#[macro_export]
macro_rules! emit_debug {
    ($logger: expr, $level: expr, $($arg: tt)+) => {
        $logger.debug($level, format_args!($($arg)+))
    };
}
