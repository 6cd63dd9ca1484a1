#![doc(test(attr(deny(warnings))))]
#![deny(unsafe_code)]
#![warn(missing_docs)]

//! Bringing a vigil daemon up.
//!
//! A daemon is usually started by root, from a terminal or an init script. Before it starts doing
//! its actual work, it may need to confine itself into a chroot, drop the root privileges, go to
//! background and record its PID so it can be signalled later on. The building blocks live in the
//! modules:
//!
//! * [`privilege`]: Looking up the account, entering a chroot and switching the identity.
//! * [`background`]: Detaching from the terminal.
//! * [`pidfile`]: Recording the PID and signalling the running instance.
//!
//! The [`Daemon`] configuration fragment (with the [`Opts`] command line fragment) puts them
//! together in the right order.
//!
//! # Examples
//!
//! ```rust,no_run
//! use serde::Deserialize;
//! use structopt::StructOpt;
//! use vigil::app;
//! use vigil::logging::{LogCfg, LogOpts, Logger};
//! use vigil::Paths;
//! use vigil_daemonize::{Daemon, Opts as DaemonOpts};
//!
//! // From config files
//! #[derive(Default, Deserialize)]
//! struct Cfg {
//!     #[serde(default)]
//!     daemon: Daemon,
//!     #[serde(default)]
//!     logging: LogCfg,
//! }
//!
//! // From command line
//! #[derive(Debug, StructOpt)]
//! struct Opts {
//!     #[structopt(flatten)]
//!     daemon: DaemonOpts,
//!     #[structopt(flatten)]
//!     logging: LogOpts,
//! }
//!
//! fn main() {
//!     let opts = Opts::from_args();
//!     // Loaded by whatever means the application likes
//!     let Cfg { daemon, logging } = Cfg::default();
//!     let mut logger = Logger::from_cfg(&opts.logging.transform(logging));
//!     logger.install();
//!     app::run_term(logger, |logger| {
//!         let daemon = opts.daemon.transform(daemon);
//!         let _pid_file = daemon.start(logger, &Paths::from_env(), "mydaemon")?;
//!         // Possibly daemonized program goes here
//!         Ok(())
//!     });
//! }
//! ```
//!
//! # Added options
//!
//! The program above gets the `-d`, `-f`, `-u`, `-r` and `-P` command line options. The
//! configuration understands a new `daemon` section, with these options:
//!
//! * `user`: The user to become. Either a numeric ID or name. If not present, it doesn't change the
//!   user.
//! * `chroot`: A directory to confine the daemon into.
//! * `pid-file`: A PID file to write on startup. Either a bare name (placed into the PID directory)
//!   or a path. Defaults to the program name when going to background.
//! * `workdir`: A working directory it'll switch into. Defaults to `/` when going to background.
//! * `daemonize`: Should this go into background or not? If combined with the [`Opts`], it can be
//!   overridden on command line.
//!
//! # Multithreaded applications
//!
//! As daemonization is done by using `fork`, you should start any threads *after*
//! [`Daemon::start`]. Otherwise you'll lose the threads (and further bad things will happen).

use std::convert::Infallible;
use std::env;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use log::{debug, trace};
use serde::{Deserialize, Serialize};
use structopt::StructOpt;
use vigil::error::{Fatal, FatalExt, EXIT_FAILURE};
use vigil::utils::absolute_from_os_str;
use vigil::{Logger, Paths};

pub mod background;
pub mod pidfile;
pub mod privilege;

pub use crate::background::{DaemonState, Daemonizer};
pub use crate::pidfile::{
    is_running, send_signal, send_signal_fn, write_pid, MalformedReason, PidFile, SignalError,
};
pub use crate::privilege::{
    chroot_start, drop_to, resolve_account, resolve_uid, Identity, ResolveError,
};

/// Configuration of a user.
///
/// This is used to load the configuration of which user to drop privileges to.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(untagged)]
#[non_exhaustive]
pub enum SecId {
    /// Look up based on the name.
    Name(String),
    /// Look up based on the numerical ID.
    Id(u32),
    /// Don't drop privileges.
    ///
    /// This is not read from configuration, but it is the default value available if nothing is
    /// listed in configuration.
    #[serde(skip)]
    Nothing,
}

impl SecId {
    fn is_nothing(&self) -> bool {
        self == &SecId::Nothing
    }

    /// Looks the account up.
    ///
    /// Returns `None` for [`SecId::Nothing`].
    pub fn resolve(&self) -> Option<Result<Identity, ResolveError>> {
        match self {
            SecId::Name(name) => Some(resolve_account(name)),
            SecId::Id(id) => Some(resolve_uid(*id)),
            SecId::Nothing => None,
        }
    }
}

impl Default for SecId {
    fn default() -> Self {
        SecId::Nothing
    }
}

impl From<&str> for SecId {
    /// All digits is an ID, empty is nothing and anything else is a name.
    fn from(s: &str) -> Self {
        if s.is_empty() {
            SecId::Nothing
        } else if let Ok(id) = s.parse() {
            SecId::Id(id)
        } else {
            SecId::Name(s.to_owned())
        }
    }
}

impl FromStr for SecId {
    type Err = Infallible;
    fn from_str(s: &str) -> Result<Self, Infallible> {
        Ok(s.into())
    }
}

/// A configuration fragment for bringing the daemon up.
///
/// The fields can be manipulated by the user of this crate. However, it is not possible to create
/// the struct manually. This is on purpose, some future versions might add more fields. If you
/// want to create one, use `Daemon::default` and modify certain fields as needed.
///
/// # Examples
///
/// ```rust
/// # use vigil_daemonize::Daemon;
/// let mut daemon = Daemon::default();
/// daemon.workdir = Some("/".into());
/// ```
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "kebab-case")]
#[non_exhaustive]
pub struct Daemon {
    /// The user to drop privileges to.
    ///
    /// The user is not changed if not provided.
    #[serde(default, skip_serializing_if = "SecId::is_nothing")]
    pub user: SecId,

    /// Confine the daemon into this directory.
    ///
    /// Entered before dropping the privileges. Any paths used afterwards (the working directory,
    /// the PID file) are inside the chroot.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chroot: Option<PathBuf>,

    /// The PID file to write.
    ///
    /// Either a bare name, stored into the PID directory, or a path. If not set, the program name
    /// is used when going to background and nothing is written otherwise.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pid_file: Option<String>,

    /// Switch to this working directory at startup.
    ///
    /// If not set, it switches to `/` when going to background and stays where it is otherwise.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub workdir: Option<PathBuf>,

    // This is overwritten by [`Opts::transform`](struct.Opts.html#method.transform).
    //
    /// Enable the daemonization.
    ///
    /// Even if this is false, some activity (changing users, setting PID file, etc) is still done,
    /// but it doesn't go to background.
    #[serde(default)]
    pub daemonize: bool,
}

impl Daemon {
    /// Brings the daemon up according to the configuration.
    ///
    /// The steps are done in this order, each of them only if configured:
    ///
    /// 1. The user is looked up (while the account database is still reachable).
    /// 2. The chroot is entered (while there are still privileges to do so).
    /// 3. The privileges are dropped.
    /// 4. The working directory is switched.
    /// 5. The process goes to background (see [`Daemonizer::background`]).
    /// 6. The PID file is written (the PID changes when going to background).
    ///
    /// Failing any of the first five steps is fatal. Failing to write the PID file is only logged,
    /// in which case `None` is returned.
    ///
    /// The logger is switched to the system log when going to background.
    pub fn start(
        &self,
        logger: &mut Logger,
        paths: &Paths,
        progname: &str,
    ) -> Result<Option<PidFile>, Fatal> {
        debug!("Starting {} with {:?}", progname, self);
        let identity = self
            .user
            .resolve()
            .transpose()
            .or_fatal(EXIT_FAILURE, "Can't switch the user")?;

        if let Some(chroot) = self.chroot.as_ref() {
            chroot_start(chroot)?;
        }
        if let Some(identity) = identity {
            drop_to(identity)?;
        }

        let workdir = match (self.workdir.as_ref(), self.daemonize) {
            (Some(workdir), _) => Some(workdir.as_path()),
            (None, true) => Some(Path::new("/")),
            (None, false) => None,
        };
        if let Some(workdir) = workdir {
            trace!("Changing working directory to {}", workdir.display());
            env::set_current_dir(workdir).or_fatal_with(EXIT_FAILURE, || {
                format!("Failed to switch to workdir {}", workdir.display())
            })?;
        }

        if self.daemonize {
            Daemonizer::new().background(logger, progname)?;
        } else {
            trace!("Not going to background");
        }

        let pid_file = match (self.pid_file.as_ref(), self.daemonize) {
            (Some(name), _) => Some(name.as_str()),
            (None, true) => Some(progname),
            (None, false) => None,
        };
        Ok(pid_file.and_then(|name| write_pid(logger, paths, name).ok()))
    }
}

// Workaround for https://github.com/TeXitoi/structopt/issues/333
#[cfg_attr(not(doc), allow(missing_docs))]
#[cfg_attr(
    doc,
    doc = r#"
Command line options fragment.

This adds the `-d` (`--daemonize`) and `-f` (`--foreground`) flags to command line, together with
the `-u` (`--user`), `-r` (`--chroot`) and `-P` (`--pid-file`) options. These override whatever is
written in configuration when merged by [`transform`][Opts::transform].

Flatten this into the top-level `StructOpt` structure.
"#
)]
#[derive(Clone, Debug, StructOpt)]
#[non_exhaustive]
pub struct Opts {
    /// Daemonize, go to background (override the config).
    #[structopt(short, long)]
    pub daemonize: bool,

    /// Stay in foreground (don't go to background even if config says so).
    #[structopt(short, long)]
    pub foreground: bool,

    /// Switch to this user (name or numeric ID).
    #[structopt(short, long, parse(from_str))]
    pub user: Option<SecId>,

    /// Confine into this directory.
    #[structopt(short = "r", long, parse(from_os_str = absolute_from_os_str))]
    pub chroot: Option<PathBuf>,

    /// Write the PID file here (a name or a path).
    #[structopt(short = "P", long)]
    pub pid_file: Option<String>,
}

impl Opts {
    /// Returns if daemonization is forced one way or the other from the command line.
    ///
    /// The `-f` wins over `-d`. `None` means the configuration decides.
    pub fn daemonize(&self) -> Option<bool> {
        if self.foreground {
            Some(false)
        } else if self.daemonize {
            Some(true)
        } else {
            None
        }
    }

    /// Modifies the [`Daemon`] according to the command line.
    pub fn transform(&self, daemon: Daemon) -> Daemon {
        Daemon {
            daemonize: self.daemonize().unwrap_or(daemon.daemonize),
            user: self.user.clone().unwrap_or(daemon.user),
            chroot: self.chroot.clone().or(daemon.chroot),
            pid_file: self.pid_file.clone().or(daemon.pid_file),
            workdir: daemon.workdir,
        }
    }
}
