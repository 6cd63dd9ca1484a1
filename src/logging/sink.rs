use std::fmt::{Display, Formatter, Result as FmtResult};
use std::io::{self, Write};

use chrono::Local;

/// How important a message is.
///
/// All but [`Debug`][Severity::Debug] are the *operational* severities, routed only by the
/// [`LogRoute`][super::LogRoute]. Debug messages are additionally gated by the verbosity.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub enum Severity {
    /// The process can't go on. Used for the fatal messages.
    Critical,
    /// Something failed.
    Error,
    /// Something looks wrong, but it is handled.
    Warning,
    /// A normal but significant condition.
    Notice,
    /// Informational message.
    Info,
    /// Diagnostic message, subject to the verbosity threshold.
    Debug,
}

impl Severity {
    /// The name as written into the terminal output.
    pub fn name(self) -> &'static str {
        match self {
            Severity::Critical => "CRIT",
            Severity::Error => "ERROR",
            Severity::Warning => "WARN",
            Severity::Notice => "NOTICE",
            Severity::Info => "INFO",
            Severity::Debug => "DEBUG",
        }
    }
}

impl Display for Severity {
    fn fmt(&self, fmt: &mut Formatter) -> FmtResult {
        fmt.pad(self.name())
    }
}

/// A destination of log messages.
///
/// The [`Logger`][super::Logger] decides *if* a message goes to a sink, the sink only writes it
/// somewhere. An error returned from here never propagates further than the logger.
pub trait Sink: Send + Sync {
    /// A short name of the sink, used when reporting its own failures.
    fn name(&self) -> &str;

    /// Writes one message.
    ///
    /// The message is a single logical line without the trailing newline.
    fn write(&self, severity: Severity, message: &str) -> io::Result<()>;
}

/// The standard error output.
///
/// Each message is prefixed with a local timestamp and the severity.
#[derive(Copy, Clone, Debug, Default)]
pub struct Terminal;

impl Sink for Terminal {
    fn name(&self) -> &str {
        "stderr"
    }

    fn write(&self, severity: Severity, message: &str) -> io::Result<()> {
        let stderr = io::stderr();
        let mut out = stderr.lock();
        writeln!(
            out,
            "{} {:6} {}",
            Local::now().format("%Y-%m-%d %H:%M:%S%.3f"),
            severity,
            message,
        )?;
        out.flush()
    }
}

#[cfg(feature = "syslog")]
pub use self::system::Syslog;

#[cfg(feature = "syslog")]
mod system {
    use std::io::{self, ErrorKind};
    use std::process;
    use std::sync::Mutex;

    use log::trace;
    use syslog::{Facility, Formatter3164, LoggerBackend};

    use super::{Severity, Sink};
    use crate::AnyError;

    /// The local system log.
    ///
    /// Messages are tagged with the program name and the process ID at the time of opening. If
    /// the process ID changes (eg. by going to background), the sink needs to be opened again.
    pub struct Syslog {
        ident: String,
        logger: Mutex<syslog::Logger<LoggerBackend, Formatter3164>>,
    }

    impl Syslog {
        /// Connects to the local system log, with messages tagged as `ident`.
        pub fn open(ident: &str) -> Result<Self, AnyError> {
            trace!("Opening syslog as {}", ident);
            let formatter = Formatter3164 {
                facility: Facility::LOG_DAEMON,
                hostname: None,
                process: ident.to_owned(),
                pid: process::id() as _,
            };
            let logger = syslog::unix(formatter)
                .map_err(|e| format!("Failed to connect to syslog: {}", e))?;
            Ok(Self {
                ident: ident.to_owned(),
                logger: Mutex::new(logger),
            })
        }

        /// The tag the messages carry.
        pub fn ident(&self) -> &str {
            &self.ident
        }
    }

    impl Sink for Syslog {
        fn name(&self) -> &str {
            "syslog"
        }

        fn write(&self, severity: Severity, message: &str) -> io::Result<()> {
            let mut logger = self
                .logger
                .lock()
                .map_err(|_| io::Error::new(ErrorKind::Other, "syslog connection poisoned"))?;
            let result = match severity {
                Severity::Critical => logger.crit(message),
                Severity::Error => logger.err(message),
                Severity::Warning => logger.warning(message),
                Severity::Notice => logger.notice(message),
                Severity::Info => logger.info(message),
                Severity::Debug => logger.debug(message),
            };
            result.map_err(|e| io::Error::new(ErrorKind::Other, e.to_string()))
        }
    }
}
