use std::fmt::{Debug, Formatter, Result as FmtResult};
use std::ops::{BitOr, BitOrAssign};

use serde::{Deserialize, Serialize};

/// Where the log messages go.
///
/// This is a bit mask of independent flags. The plain flags ([`STDERR`][LogRoute::STDERR],
/// [`SYSLOG`][LogRoute::SYSLOG]) enable the sink for all messages. The `_ON_FATAL` variants enable
/// it only for the final message of a fatal failure.
///
/// In configuration, it is represented as a list of the flag names:
///
/// ```toml
/// route = ["syslog", "stderr-on-fatal"]
/// ```
#[derive(Copy, Clone, Default, Deserialize, Eq, PartialEq, Hash, Serialize)]
#[serde(from = "Vec<RouteFlag>", into = "Vec<RouteFlag>")]
pub struct LogRoute(u8);

impl LogRoute {
    /// Nothing is logged anywhere.
    pub const NONE: LogRoute = LogRoute(0);
    /// Log to the standard error output.
    pub const STDERR: LogRoute = LogRoute(0x01);
    /// Log to the system log.
    pub const SYSLOG: LogRoute = LogRoute(0x02);
    /// Log the fatal message to the standard error output, even if [`STDERR`][Self::STDERR] is
    /// not set.
    pub const STDERR_ON_FATAL: LogRoute = LogRoute(0x04);
    /// Log the fatal message to the system log, even if [`SYSLOG`][Self::SYSLOG] is not set.
    pub const SYSLOG_ON_FATAL: LogRoute = LogRoute(0x08);

    const ALL: [(LogRoute, RouteFlag); 4] = [
        (LogRoute::STDERR, RouteFlag::Stderr),
        (LogRoute::SYSLOG, RouteFlag::Syslog),
        (LogRoute::STDERR_ON_FATAL, RouteFlag::StderrOnFatal),
        (LogRoute::SYSLOG_ON_FATAL, RouteFlag::SyslogOnFatal),
    ];

    /// Creates the route from the raw bits.
    ///
    /// Unknown bits are dropped.
    pub fn from_bits(bits: u8) -> Self {
        LogRoute(bits & 0x0f)
    }

    /// The raw bits.
    pub fn bits(self) -> u8 {
        self.0
    }

    /// Are all the flags of `other` set in here?
    pub fn contains(self, other: LogRoute) -> bool {
        self.0 & other.0 == other.0
    }

    /// Is at least one of the flags of `other` set in here?
    pub fn intersects(self, other: LogRoute) -> bool {
        self.0 & other.0 != 0
    }

    /// Sets the given flags.
    pub fn insert(&mut self, other: LogRoute) {
        self.0 |= other.0;
    }

    /// Clears the given flags.
    pub fn remove(&mut self, other: LogRoute) {
        self.0 &= !other.0;
    }

    /// Are ordinary messages sent to the standard error output?
    pub fn terminal(self) -> bool {
        self.contains(LogRoute::STDERR)
    }

    /// Are ordinary messages sent to the system log?
    pub fn syslog(self) -> bool {
        self.contains(LogRoute::SYSLOG)
    }

    /// Is the fatal message sent to the standard error output?
    pub fn terminal_on_fatal(self) -> bool {
        self.intersects(LogRoute::STDERR | LogRoute::STDERR_ON_FATAL)
    }

    /// Is the fatal message sent to the system log?
    pub fn syslog_on_fatal(self) -> bool {
        self.intersects(LogRoute::SYSLOG | LogRoute::SYSLOG_ON_FATAL)
    }
}

impl BitOr for LogRoute {
    type Output = LogRoute;
    fn bitor(self, rhs: LogRoute) -> LogRoute {
        LogRoute(self.0 | rhs.0)
    }
}

impl BitOrAssign for LogRoute {
    fn bitor_assign(&mut self, rhs: LogRoute) {
        self.insert(rhs);
    }
}

impl Debug for LogRoute {
    fn fmt(&self, fmt: &mut Formatter) -> FmtResult {
        fmt.debug_list()
            .entries(Vec::<RouteFlag>::from(*self))
            .finish()
    }
}

/// A single flag of the [`LogRoute`], as written in configuration.
#[derive(Copy, Clone, Debug, Deserialize, Eq, PartialEq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum RouteFlag {
    /// [`LogRoute::STDERR`]
    Stderr,
    /// [`LogRoute::SYSLOG`]
    Syslog,
    /// [`LogRoute::STDERR_ON_FATAL`]
    StderrOnFatal,
    /// [`LogRoute::SYSLOG_ON_FATAL`]
    SyslogOnFatal,
}

impl From<RouteFlag> for LogRoute {
    fn from(flag: RouteFlag) -> LogRoute {
        LogRoute::ALL
            .iter()
            .find(|(_, f)| *f == flag)
            .map(|(route, _)| *route)
            .unwrap_or(LogRoute::NONE)
    }
}

impl From<Vec<RouteFlag>> for LogRoute {
    fn from(flags: Vec<RouteFlag>) -> LogRoute {
        flags
            .into_iter()
            .map(LogRoute::from)
            .fold(LogRoute::NONE, BitOr::bitor)
    }
}

impl From<LogRoute> for Vec<RouteFlag> {
    fn from(route: LogRoute) -> Vec<RouteFlag> {
        LogRoute::ALL
            .iter()
            .filter(|(r, _)| route.contains(*r))
            .map(|(_, flag)| *flag)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags() {
        let mut route = LogRoute::STDERR | LogRoute::SYSLOG_ON_FATAL;
        assert!(route.terminal());
        assert!(!route.syslog());
        assert!(route.terminal_on_fatal());
        assert!(route.syslog_on_fatal());

        route.remove(LogRoute::STDERR);
        assert!(!route.terminal());
        assert!(!route.terminal_on_fatal());
        route.insert(LogRoute::SYSLOG);
        assert!(route.syslog());
        assert_eq!(0x0a, route.bits());
    }

    #[test]
    fn unknown_bits_dropped() {
        assert_eq!(LogRoute::STDERR, LogRoute::from_bits(0x11));
        assert_eq!(0x0f, LogRoute::from_bits(0xff).bits());
    }

    #[derive(Debug, Deserialize)]
    struct Wrap {
        route: LogRoute,
    }

    #[test]
    fn from_config() {
        let w: Wrap = toml::from_str(r#"route = ["syslog", "stderr-on-fatal"]"#).unwrap();
        assert_eq!(LogRoute::SYSLOG | LogRoute::STDERR_ON_FATAL, w.route);
        assert!(toml::from_str::<Wrap>(r#"route = ["network"]"#).is_err());
    }
}
