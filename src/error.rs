//! Error handling utilities.
//!
//! Most of the operations in this workspace fall in one of two camps. Some of them can fail in a
//! way the caller is expected to handle (a missing account, a stale PID file) and these return
//! their own small error enums. The rest are the must-complete-or-die steps of bringing a daemon
//! up (dropping privileges, going to background). These return a [`Fatal`], which is carried up
//! to a single place (usually [`run_term`][crate::app::run_term]) that logs it and terminates
//! the process with the status inside.

use std::error::Error;
use std::fmt::{Display, Formatter, Result as FmtResult};

use err_context::prelude::*;

/// A wrapper type for any error.
///
/// This is just a type alias for boxed standard error. Any errors go and this is guaranteed to be
/// fully compatible.
pub type AnyError = Box<dyn Error + Send + Sync>;

/// The exit status used for fatal failures unless the caller picks another one.
pub const EXIT_FAILURE: i32 = 1;

/// The exit status of a process that terminated without a problem.
pub const EXIT_SUCCESS: i32 = 0;

/// A failure after which the process must not continue.
///
/// It carries the exit status the process should terminate with, the message to log and
/// optionally the underlying error (usually a failed system call). Creating one does nothing by
/// itself, it needs to be handed to [`Logger::fatal`][crate::logging::Logger::fatal] (directly or
/// through [`run_term`][crate::app::run_term]).
///
/// # Examples
///
/// ```rust
/// use std::io::{Error, ErrorKind};
/// use vigil::error::Fatal;
///
/// let fatal = Fatal::with_cause(3, "Can't open /dev/null", Error::new(ErrorKind::Other, "nope"));
/// assert_eq!(3, fatal.status());
/// assert_eq!("Can't open /dev/null: nope", fatal.to_string());
/// ```
#[derive(Debug)]
pub struct Fatal {
    status: i32,
    message: String,
    cause: Option<AnyError>,
}

impl Fatal {
    /// A fatal failure without an underlying error.
    pub fn new<M: Into<String>>(status: i32, message: M) -> Self {
        Self {
            status,
            message: message.into(),
            cause: None,
        }
    }

    /// A fatal failure caused by another error.
    ///
    /// The whole chain of the cause is appended to the message when displayed.
    pub fn with_cause<M, E>(status: i32, message: M, cause: E) -> Self
    where
        M: Into<String>,
        E: Into<AnyError>,
    {
        Self {
            status,
            message: message.into(),
            cause: Some(cause.into()),
        }
    }

    /// The exit status to terminate with.
    pub fn status(&self) -> i32 {
        self.status
    }

    /// The message without the cause.
    pub fn message(&self) -> &str {
        &self.message
    }

    /// The underlying error, if any.
    pub fn cause(&self) -> Option<&AnyError> {
        self.cause.as_ref()
    }
}

impl Display for Fatal {
    fn fmt(&self, fmt: &mut Formatter) -> FmtResult {
        match self.cause.as_ref() {
            Some(cause) => write!(fmt, "{}: {}", self.message, cause.display(": ")),
            None => write!(fmt, "{}", self.message),
        }
    }
}

impl Error for Fatal {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        self.cause
            .as_ref()
            .map(|c| c.as_ref() as &(dyn Error + 'static))
    }
}

/// Turning other errors into [`Fatal`]s.
///
/// # Examples
///
/// ```rust
/// use std::fs::File;
/// use vigil::error::{Fatal, FatalExt, EXIT_FAILURE};
///
/// fn open() -> Result<File, Fatal> {
///     File::open("/this/does/not/exist").or_fatal(EXIT_FAILURE, "Can't open the state file")
/// }
///
/// assert_eq!(EXIT_FAILURE, open().unwrap_err().status());
/// ```
pub trait FatalExt<T> {
    /// Makes the error fatal, with the given status and message.
    fn or_fatal<M: Into<String>>(self, status: i32, message: M) -> Result<T, Fatal>;

    /// Similar to [`or_fatal`][FatalExt::or_fatal], but the message is created lazily.
    fn or_fatal_with<M, F>(self, status: i32, message: F) -> Result<T, Fatal>
    where
        M: Into<String>,
        F: FnOnce() -> M;
}

impl<T, E> FatalExt<T> for Result<T, E>
where
    E: Into<AnyError>,
{
    fn or_fatal<M: Into<String>>(self, status: i32, message: M) -> Result<T, Fatal> {
        self.map_err(|e| Fatal::with_cause(status, message, e))
    }

    fn or_fatal_with<M, F>(self, status: i32, message: F) -> Result<T, Fatal>
    where
        M: Into<String>,
        F: FnOnce() -> M,
    {
        self.map_err(|e| Fatal::with_cause(status, message(), e))
    }
}

#[cfg(test)]
mod tests {
    use std::io::{Error as IoError, ErrorKind};

    use super::*;

    #[derive(Copy, Clone, Debug)]
    struct Dummy;

    impl Display for Dummy {
        fn fmt(&self, fmt: &mut Formatter) -> FmtResult {
            write!(fmt, "Dummy error")
        }
    }

    impl Error for Dummy {}

    #[test]
    fn plain() {
        let fatal = Fatal::new(4, "Broken");
        assert_eq!(4, fatal.status());
        assert_eq!("Broken", fatal.to_string());
        assert!(fatal.cause().is_none());
        assert!(fatal.source().is_none());
    }

    /// The whole chain of causes ends up in the message.
    #[test]
    fn cause_chain() {
        let err: Result<(), _> = Err(Dummy.context("Another level"));
        let fatal = err.or_fatal(2, "Top").unwrap_err();
        assert_eq!("Top: Another level: Dummy error", fatal.to_string());
        assert_eq!("Top", fatal.message());
        assert!(fatal.source().is_some());
    }

    #[test]
    fn lazy_message() {
        let err: Result<(), _> = Err(IoError::new(ErrorKind::NotFound, "gone"));
        let fatal = err
            .or_fatal_with(EXIT_FAILURE, || format!("Reading {}", "/x"))
            .unwrap_err();
        assert_eq!(EXIT_FAILURE, fatal.status());
        assert_eq!("Reading /x: gone", fatal.to_string());
    }
}
