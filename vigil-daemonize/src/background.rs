//! Going to background.

use std::fs::OpenOptions;
use std::os::unix::io::AsRawFd;
use std::process;

use err_context::prelude::*;
use log::{debug, trace};
use nix::unistd::{self, ForkResult};
use vigil::error::{Fatal, FatalExt, EXIT_FAILURE, EXIT_SUCCESS};
use vigil::{emit, AnyError, Logger};

/// Where in the daemonization the process is.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum DaemonState {
    /// Still attached to the terminal it was started from.
    Foreground,
    /// In the middle of detaching. Not observable from the outside.
    Detaching,
    /// Running in background, for the rest of its life.
    Background,
}

/// Moves the process into background.
///
/// # Multithreaded applications
///
/// As daemonization is done by using `fork`, only the calling thread survives it. Any threads
/// should be started only after going to background.
#[derive(Debug)]
pub struct Daemonizer {
    state: DaemonState,
}

impl Default for Daemonizer {
    fn default() -> Self {
        Self::new()
    }
}

impl Daemonizer {
    /// A daemonizer of a process that is still in foreground.
    pub fn new() -> Self {
        Daemonizer {
            state: DaemonState::Foreground,
        }
    }

    /// The current state.
    pub fn state(&self) -> DaemonState {
        self.state
    }

    /// Goes into background.
    ///
    /// The standard input and outputs are redirected to `/dev/null` and the process detaches from
    /// the terminal by a double fork with a new session in between. The original process and the
    /// intermediate one exit with success, this returns in the grandchild. Therefore, the process
    /// ID changes and anything recording it (like the PID file) must be done after this.
    ///
    /// The logger is switched to the system log (see [`Logger::detach`]), tagged with `progname`
    /// unless it was connected before.
    ///
    /// Any failure is fatal. Calling it in background already does nothing.
    ///
    /// No other threads may be running when this is called.
    pub fn background(&mut self, logger: &mut Logger, progname: &str) -> Result<(), Fatal> {
        if self.state == DaemonState::Background {
            debug!("Already in background");
            return Ok(());
        }
        self.state = DaemonState::Detaching;
        detach().or_fatal(EXIT_FAILURE, "Unable to enter background")?;
        self.state = DaemonState::Background;
        logger.detach(progname);
        emit!(logger, Info, "Startup successful");
        Ok(())
    }
}

#[allow(unsafe_code)]
fn detach() -> Result<(), AnyError> {
    trace!("Redirecting stdio");
    let devnull = OpenOptions::new()
        .read(true)
        .write(true)
        .open("/dev/null")
        .context("Failed to open /dev/null")?;
    for fd in &[0, 1, 2] {
        unistd::dup2(devnull.as_raw_fd(), *fd)
            .with_context(|_| format!("Failed to redirect FD {}", fd))?;
    }
    trace!("Doing double fork");
    // SAFETY: Called before any other threads are started (see the docs of Daemonizer), so the
    // child is a complete copy and not restricted to async-signal-safe calls.
    if let ForkResult::Parent { .. } = unsafe { unistd::fork() }.context("Failed to fork")? {
        process::exit(EXIT_SUCCESS);
    }
    unistd::setsid().context("Failed to create a new session")?;
    // SAFETY: As above, still the only thread.
    if let ForkResult::Parent { .. } = unsafe { unistd::fork() }.context("Failed to fork")? {
        process::exit(EXIT_SUCCESS);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_in_foreground() {
        assert_eq!(DaemonState::Foreground, Daemonizer::default().state());
    }

    #[test]
    fn background_is_terminal() {
        let mut daemonizer = Daemonizer {
            state: DaemonState::Background,
        };
        let mut logger = Logger::new(vigil::LogRoute::NONE, 0);
        daemonizer.background(&mut logger, "vigil-test").unwrap();
        assert_eq!(DaemonState::Background, daemonizer.state());
        // Nothing touched the logger either
        assert_eq!(vigil::LogRoute::NONE, logger.route());
    }
}
