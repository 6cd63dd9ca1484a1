//! PID files and signalling a running instance.
//!
//! The running daemon records its process ID into a file. Another invocation of the same program
//! (eg. `mydaemon -c reload`) reads it back and sends the daemon a signal.
//!
//! There's no locking between reading the file and sending the signal. If the daemon exits in
//! between, the sender gets [`NotRunning`][SignalError::NotRunning] (or
//! [`PermissionDenied`][SignalError::PermissionDenied] if the ID got reused by someone else's
//! process).

use std::error::Error;
use std::ffi::OsString;
use std::fmt::{Display, Formatter, Result as FmtResult};
use std::fs::{self, OpenOptions};
use std::io::{self, ErrorKind, Write};
use std::os::unix::fs::OpenOptionsExt;
use std::path::{Path, PathBuf};

use log::{debug, trace};
use nix::errno::Errno;
use nix::sys::signal::{self, Signal};
use nix::unistd::Pid;
use vigil::error::{EXIT_FAILURE, EXIT_SUCCESS};
use vigil::{emit, emit_debug, Logger, Paths, Severity};

/// Why the content of the PID file can't be used.
#[derive(Debug)]
#[non_exhaustive]
pub enum MalformedReason {
    /// The file couldn't be read (including it not existing).
    Unreadable(io::Error),
    /// The file is empty.
    Empty,
    /// The file doesn't contain a number.
    NotNumeric(String),
    /// The number can't be a process ID.
    OutOfRange(i64),
}

impl Display for MalformedReason {
    fn fmt(&self, fmt: &mut Formatter) -> FmtResult {
        match self {
            MalformedReason::Unreadable(e) => write!(fmt, "can't read it: {}", e),
            MalformedReason::Empty => write!(fmt, "it is empty"),
            MalformedReason::NotNumeric(content) => write!(fmt, "{:?} is not a number", content),
            MalformedReason::OutOfRange(pid) => write!(fmt, "{} is not a valid process ID", pid),
        }
    }
}

/// A signal couldn't be delivered through a PID file.
#[derive(Debug)]
#[non_exhaustive]
pub enum SignalError {
    /// The recorded process doesn't exist (the PID file is stale).
    NotRunning {
        /// The PID file.
        path: PathBuf,
        /// The recorded process ID.
        pid: Pid,
    },
    /// The recorded process exists, but we are not allowed to signal it.
    PermissionDenied {
        /// The PID file.
        path: PathBuf,
        /// The recorded process ID.
        pid: Pid,
        /// The error of the delivery.
        source: Errno,
    },
    /// The PID file doesn't contain a usable process ID.
    Malformed {
        /// The PID file.
        path: PathBuf,
        /// What is wrong with it.
        reason: MalformedReason,
    },
}

impl Display for SignalError {
    fn fmt(&self, fmt: &mut Formatter) -> FmtResult {
        match self {
            SignalError::NotRunning { path, pid } => write!(
                fmt,
                "Process {} from {} is not running",
                pid,
                path.display()
            ),
            SignalError::PermissionDenied { path, pid, .. } => write!(
                fmt,
                "Not allowed to signal process {} from {}",
                pid,
                path.display()
            ),
            SignalError::Malformed { path, reason } => {
                write!(fmt, "Unusable PID file {}: {}", path.display(), reason)
            }
        }
    }
}

impl Error for SignalError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            SignalError::PermissionDenied { source, .. } => Some(source),
            SignalError::Malformed {
                reason: MalformedReason::Unreadable(e),
                ..
            } => Some(e),
            _ => None,
        }
    }
}

/// Parses the content of a PID file.
///
/// The content is a decimal number, optionally followed by a single newline. No sign, no other
/// whitespace. Only positive numbers are accepted; zero and negative numbers have a special
/// meaning for signal delivery (process groups) and must never end up there.
pub fn parse_pid(content: &str) -> Result<Pid, MalformedReason> {
    let number = content.strip_suffix('\n').unwrap_or(content);
    if number.is_empty() {
        return Err(MalformedReason::Empty);
    }
    let (negative, digits) = match number.strip_prefix('-') {
        Some(digits) => (true, digits),
        None => (false, number),
    };
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return Err(MalformedReason::NotNumeric(number.to_owned()));
    }
    // Only too many digits can fail here
    let pid: i64 = number
        .parse()
        .unwrap_or(if negative { i64::MIN } else { i64::MAX });
    if pid < 1 || pid > i64::from(i32::MAX) {
        return Err(MalformedReason::OutOfRange(pid));
    }
    Ok(Pid::from_raw(pid as i32))
}

/// A PID file.
#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub struct PidFile {
    path: PathBuf,
}

impl PidFile {
    /// A PID file at exactly this path.
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        PidFile { path: path.into() }
    }

    /// The canonical PID file of the program, `<pid-dir>/<progname>.pid`.
    pub fn for_program(progname: &str, paths: &Paths) -> Self {
        Self::new(paths.pid_dir.join(format!("{}.pid", progname)))
    }

    /// Either a bare program name or a path.
    ///
    /// Anything containing a `/` is taken as a path and used verbatim. A bare name is turned into
    /// the canonical PID file of the program (see [`for_program`][PidFile::for_program]).
    pub fn resolve(name: &str, paths: &Paths) -> Self {
        if name.contains('/') {
            Self::new(name)
        } else {
            Self::for_program(name, paths)
        }
    }

    /// Where the file is.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Records the current process ID.
    ///
    /// See [`write_pid`][PidFile::write_pid].
    pub fn write(&self) -> Result<Pid, io::Error> {
        let pid = Pid::this();
        self.write_pid(pid)?;
        Ok(pid)
    }

    /// Records the given process ID, replacing the previous content.
    ///
    /// The content is written into a temporary file in the same directory first and then renamed
    /// over the real one, so a concurrent reader sees either the old or the new content, never a
    /// partial one.
    pub fn write_pid(&self, pid: Pid) -> Result<(), io::Error> {
        let tmp = self.temp_path(pid)?;
        trace!("Writing PID {} to {} through {}", pid, self.path.display(), tmp.display());
        // A leftover from a crashed attempt
        let _ = fs::remove_file(&tmp);
        let result = OpenOptions::new()
            .write(true)
            .create_new(true)
            .mode(0o644)
            .open(&tmp)
            .and_then(|mut f| {
                writeln!(f, "{}", pid)?;
                f.sync_all()
            })
            .and_then(|()| fs::rename(&tmp, &self.path));
        if result.is_err() {
            let _ = fs::remove_file(&tmp);
        }
        result
    }

    fn temp_path(&self, pid: Pid) -> Result<PathBuf, io::Error> {
        let name = self.path.file_name().ok_or_else(|| {
            io::Error::new(
                ErrorKind::InvalidInput,
                format!("{} is not a file name", self.path.display()),
            )
        })?;
        let mut tmp = OsString::from(".");
        tmp.push(name);
        tmp.push(format!(".{}.tmp", pid));
        Ok(self.path.with_file_name(tmp))
    }

    /// Reads the recorded process ID.
    pub fn read(&self) -> Result<Pid, SignalError> {
        let malformed = |reason| SignalError::Malformed {
            path: self.path.clone(),
            reason,
        };
        let content = fs::read(&self.path).map_err(|e| malformed(MalformedReason::Unreadable(e)))?;
        let content = String::from_utf8_lossy(&content);
        parse_pid(&content).map_err(malformed)
    }

    fn kill(&self, pid: Pid, sig: Option<Signal>) -> Result<(), SignalError> {
        signal::kill(pid, sig).map_err(|e| match e {
            Errno::ESRCH => SignalError::NotRunning {
                path: self.path.clone(),
                pid,
            },
            source => SignalError::PermissionDenied {
                path: self.path.clone(),
                pid,
                source,
            },
        })
    }

    /// Checks the recorded process exists and can be signalled, without sending anything.
    pub fn probe(&self) -> Result<Pid, SignalError> {
        let pid = self.read()?;
        self.kill(pid, None)?;
        Ok(pid)
    }

    /// Sends the signal to the recorded process.
    ///
    /// The process is probed first, so nothing is delivered unless it can be. This only reports
    /// the signal was handed to the kernel, not that the process did anything about it.
    pub fn signal(&self, sig: Signal) -> Result<Pid, SignalError> {
        let pid = self.probe()?;
        debug!("Sending {} to {} from {}", sig, pid, self.path.display());
        self.kill(pid, Some(sig))?;
        Ok(pid)
    }

    /// Removes the file.
    ///
    /// Meant for the daemon itself on its way out.
    pub fn remove(&self) -> Result<(), io::Error> {
        trace!("Removing PID file {}", self.path.display());
        fs::remove_file(&self.path)
    }
}

/// Records the current process ID under the given name.
///
/// The `name` is either a bare program name or a path (see [`PidFile::resolve`]). The process ID
/// must be read after going to background, so call this afterwards.
///
/// A failure is logged, but there's not much more to it. The daemon can run without a PID file,
/// it only can't be signalled by the other invocations.
pub fn write_pid(logger: &Logger, paths: &Paths, name: &str) -> Result<PidFile, io::Error> {
    let file = PidFile::resolve(name, paths);
    match file.write() {
        Ok(_) => Ok(file),
        Err(e) => {
            logger.log_with_errno(
                Severity::Notice,
                &e,
                format_args!("writepid: can't write {}", file.path().display()),
            );
            Err(e)
        }
    }
}

/// Sends a signal to the process recorded in the PID file at the path.
pub fn send_signal_fn<P: AsRef<Path>>(path: P, sig: Signal) -> Result<Pid, SignalError> {
    PidFile::new(path.as_ref()).signal(sig)
}

/// Checks the process recorded in the PID file at the path is alive, without signalling it.
///
/// Uses the null signal, so the same outcomes as with [`send_signal_fn`] apply.
pub fn is_running<P: AsRef<Path>>(path: P) -> Result<Pid, SignalError> {
    PidFile::new(path.as_ref()).probe()
}

/// Sends a signal to the running instance of the program.
///
/// The PID file is the canonical one (see [`PidFile::for_program`]).
pub fn send_signal(paths: &Paths, progname: &str, sig: Signal) -> Result<Pid, SignalError> {
    send_signal_fn(PidFile::for_program(progname, paths).path(), sig)
}

/// Logs the failure of a signal delivery and turns it into an exit status.
///
/// Handy for the administrative invocations that only send a signal and exit.
pub fn report(logger: &Logger, result: &Result<Pid, SignalError>) -> i32 {
    match result {
        Ok(pid) => {
            emit_debug!(logger, 1, "Signal delivered to {}", pid);
            EXIT_SUCCESS
        }
        Err(e) => {
            emit!(logger, Error, "{}", e);
            EXIT_FAILURE
        }
    }
}

#[cfg(test)]
mod tests {
    use std::env;
    use std::fs::Permissions;
    use std::os::unix::fs::PermissionsExt;
    use std::process::Command;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    use nix::unistd::Uid;
    use tempfile::TempDir;
    use vigil::LogRoute;

    use super::*;
    use crate::privilege::{drop_to, resolve_account};

    fn tmp() -> (TempDir, Paths) {
        let dir = tempfile::tempdir().unwrap();
        let paths = Paths::in_dir(dir.path());
        (dir, paths)
    }

    #[test]
    fn resolve_names() {
        let paths = Paths::in_dir("/run/vigil");
        assert_eq!(
            Path::new("/run/vigil/upsd.pid"),
            PidFile::resolve("upsd", &paths).path()
        );
        assert_eq!(
            Path::new("/tmp/other.pid"),
            PidFile::resolve("/tmp/other.pid", &paths).path()
        );
        assert_eq!(
            Path::new("./local.pid"),
            PidFile::resolve("./local.pid", &paths).path()
        );
    }

    #[test]
    fn parse() {
        assert_eq!(Pid::from_raw(1), parse_pid("1\n").unwrap());
        assert_eq!(Pid::from_raw(4242), parse_pid("4242").unwrap());
        assert!(matches!(parse_pid(""), Err(MalformedReason::Empty)));
        assert!(matches!(parse_pid("\n"), Err(MalformedReason::Empty)));
        assert!(matches!(parse_pid("abc\n"), Err(MalformedReason::NotNumeric(_))));
        assert!(matches!(parse_pid("12 34"), Err(MalformedReason::NotNumeric(_))));
        assert!(matches!(parse_pid("+42"), Err(MalformedReason::NotNumeric(_))));
        assert!(matches!(parse_pid(" 42"), Err(MalformedReason::NotNumeric(_))));
        assert!(matches!(parse_pid("42 \n"), Err(MalformedReason::NotNumeric(_))));
        assert!(matches!(parse_pid("42\n\n"), Err(MalformedReason::NotNumeric(_))));
        assert!(matches!(parse_pid("42\r\n"), Err(MalformedReason::NotNumeric(_))));
        assert!(matches!(parse_pid("-"), Err(MalformedReason::NotNumeric(_))));
        assert!(matches!(parse_pid("0"), Err(MalformedReason::OutOfRange(0))));
        assert!(matches!(parse_pid("-1"), Err(MalformedReason::OutOfRange(-1))));
        assert!(matches!(
            parse_pid("3000000000"),
            Err(MalformedReason::OutOfRange(_))
        ));
        assert!(matches!(
            parse_pid("99999999999999999999999\n"),
            Err(MalformedReason::OutOfRange(i64::MAX))
        ));
    }

    /// The written file contains just the ID and replaces whatever was there before, without
    /// leaving any temporary files around.
    #[test]
    fn write_replaces() {
        let (dir, paths) = tmp();
        let file = PidFile::for_program("upsd", &paths);
        fs::write(file.path(), "123456789 and some garbage\n").unwrap();
        let logger = Logger::new(LogRoute::NONE, 0);
        let written = write_pid(&logger, &paths, "upsd").unwrap();
        assert_eq!(file, written);
        let content = fs::read_to_string(file.path()).unwrap();
        assert_eq!(format!("{}\n", Pid::this()), content);
        assert_eq!(Pid::this(), file.read().unwrap());
        assert_eq!(1, fs::read_dir(dir.path()).unwrap().count());

        file.remove().unwrap();
        assert!(!file.path().exists());
    }

    #[test]
    fn write_failure_is_reported() {
        let (dir, paths) = tmp();
        let missing = dir.path().join("no-such-dir").join("x.pid");
        let logger = Logger::new(LogRoute::NONE, 0);
        let err = write_pid(&logger, &paths, missing.to_str().unwrap()).unwrap_err();
        assert_eq!(ErrorKind::NotFound, err.kind());
    }

    #[test]
    fn malformed() {
        let (dir, _paths) = tmp();
        let path = dir.path().join("bad.pid");
        for content in &["not-a-pid\n", "", "0\n", "-42\n"] {
            fs::write(&path, content).unwrap();
            match send_signal_fn(&path, Signal::SIGTERM) {
                Err(SignalError::Malformed { path: p, .. }) => assert_eq!(path, p),
                other => panic!("Unexpected result for {:?}: {:?}", content, other),
            }
        }

        let missing = dir.path().join("missing.pid");
        match send_signal_fn(&missing, Signal::SIGTERM) {
            Err(SignalError::Malformed {
                reason: MalformedReason::Unreadable(e),
                ..
            }) => assert_eq!(ErrorKind::NotFound, e.kind()),
            other => panic!("Unexpected result {:?}", other),
        }
    }

    #[test]
    fn stale() {
        let (_dir, paths) = tmp();
        let file = PidFile::for_program("stale", &paths);
        // Way above any pid_max
        fs::write(file.path(), format!("{}\n", i32::MAX)).unwrap();
        match send_signal(&paths, "stale", Signal::SIGHUP) {
            Err(SignalError::NotRunning { pid, .. }) => assert_eq!(Pid::from_raw(i32::MAX), pid),
            other => panic!("Unexpected result {:?}", other),
        }
        assert!(matches!(
            is_running(file.path()),
            Err(SignalError::NotRunning { .. })
        ));
    }

    const INIT_CHILD_ENV: &str = "VIGIL_INIT_NOT_OURS_CHILD";

    fn check_init_not_ours(file: &PidFile) {
        assert!(!Uid::effective().is_root());
        match file.signal(Signal::SIGHUP) {
            Err(SignalError::PermissionDenied { pid, source, .. }) => {
                assert_eq!(Pid::from_raw(1), pid);
                assert_eq!(Errno::EPERM, source);
            }
            other => panic!("Unexpected result {:?}", other),
        }
    }

    /// Init exists, but isn't ours to signal.
    ///
    /// Root is allowed to signal it, so when running as root, the check is done in a child (this
    /// test binary run again) that switches to `nobody` first.
    #[test]
    fn init_not_ours() {
        if let Some(path) = env::var_os(INIT_CHILD_ENV) {
            let nobody = resolve_account("nobody").unwrap();
            drop_to(nobody).unwrap();
            check_init_not_ours(&PidFile::new(path));
            return;
        }

        let (dir, paths) = tmp();
        let file = PidFile::for_program("init", &paths);
        file.write_pid(Pid::from_raw(1)).unwrap();
        if Uid::effective().is_root() {
            // Let nobody get to the file
            fs::set_permissions(dir.path(), Permissions::from_mode(0o755)).unwrap();
            let output = Command::new(env::current_exe().unwrap())
                .args(&["pidfile::tests::init_not_ours", "--exact", "--nocapture"])
                .env(INIT_CHILD_ENV, file.path())
                .output()
                .unwrap();
            assert!(
                output.status.success(),
                "{}",
                String::from_utf8_lossy(&output.stderr)
            );
        } else {
            check_init_not_ours(&file);
        }
    }

    #[test]
    fn delivered() {
        let received = Arc::new(AtomicBool::new(false));
        signal_hook::flag::register(signal_hook::consts::SIGUSR2, Arc::clone(&received)).unwrap();

        let (_dir, paths) = tmp();
        let logger = Logger::new(LogRoute::NONE, 0);
        let file = write_pid(&logger, &paths, "myself").unwrap();
        assert_eq!(Pid::this(), file.probe().unwrap());
        let pid = send_signal(&paths, "myself", Signal::SIGUSR2).unwrap();
        assert_eq!(Pid::this(), pid);
        assert_eq!(0, report(&logger, &Ok(pid)));

        for _ in 0..100 {
            if received.load(Ordering::SeqCst) {
                return;
            }
            thread::sleep(Duration::from_millis(20));
        }
        panic!("Signal not received");
    }
}
