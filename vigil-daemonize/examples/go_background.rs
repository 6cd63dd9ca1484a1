//! A tiny service that can go to background.
//!
//! Run it with `-d` to daemonize it (and `-D` for more logging). Then, a second invocation with
//! `-c reload` or `-c stop` signals the running instance through the PID file.

use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use nix::sys::signal::Signal;
use serde::Deserialize;
use signal_hook::consts::{SIGHUP, SIGINT, SIGTERM};
use signal_hook::flag;
use structopt::StructOpt;
use vigil::error::{FatalExt, EXIT_FAILURE};
use vigil::logging::{LogCfg, LogOpts, Logger};
use vigil::{app, emit, Paths, Severity};
use vigil_daemonize::{pidfile, Daemon, Opts as DaemonOpts, PidFile};

const NAME: &str = "go_background";

#[derive(Copy, Clone, Debug)]
enum Command {
    Reload,
    Stop,
}

impl Command {
    fn signal(self) -> Signal {
        match self {
            Command::Reload => Signal::SIGHUP,
            Command::Stop => Signal::SIGTERM,
        }
    }
}

impl FromStr for Command {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, String> {
        match s {
            "reload" => Ok(Command::Reload),
            "stop" => Ok(Command::Stop),
            other => Err(format!("Unknown command {}", other)),
        }
    }
}

#[derive(Clone, Debug, StructOpt)]
struct Opts {
    #[structopt(flatten)]
    daemon: DaemonOpts,

    #[structopt(flatten)]
    logging: LogOpts,

    /// Send a command (reload or stop) to the running instance and exit.
    #[structopt(short = "c")]
    command: Option<Command>,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct Ui {
    msg: String,
    sleep_ms: u64,
}

#[derive(Clone, Debug, Deserialize)]
struct Cfg {
    #[serde(default)]
    daemon: Daemon,
    #[serde(default)]
    logging: LogCfg,
    ui: Ui,
}

const DEFAULT_CONFIG: &str = r#"
[daemon]
pid-file = "/tmp/go_background.pid"

[logging]
route = ["stderr", "syslog-on-fatal"]

[ui]
msg = "Hello world"
sleep-ms = 1000
"#;

fn main() {
    let opts = Opts::from_args();
    let Cfg { daemon, logging, ui } =
        toml::from_str(DEFAULT_CONFIG).expect("The built-in config is valid");

    let mut logger = Logger::from_cfg(&opts.logging.transform(logging));
    if let Err(e) = logger.open_syslog(NAME) {
        emit!(logger, Warning, "Running without syslog: {}", e);
    }
    logger.install();

    let paths = Paths::from_env();
    let daemon = opts.daemon.transform(daemon);

    app::run_term(logger, |logger| {
        if let Some(command) = opts.command {
            let file = PidFile::resolve(daemon.pid_file.as_deref().unwrap_or(NAME), &paths);
            let pid = pidfile::send_signal_fn(file.path(), command.signal())
                .or_fatal(EXIT_FAILURE, "Can't signal the running instance")?;
            emit!(logger, Info, "Sent {:?} to {}", command, pid);
            return Ok(());
        }

        let pid_file = daemon.start(logger, &paths, NAME)?;

        // Threads (and signal handlers) only after going to background
        let terminate = Arc::new(AtomicBool::new(false));
        let reload = Arc::new(AtomicBool::new(false));
        for sig in &[SIGTERM, SIGINT] {
            flag::register(*sig, Arc::clone(&terminate))
                .or_fatal(EXIT_FAILURE, "Can't register a signal handler")?;
        }
        flag::register(SIGHUP, Arc::clone(&reload))
            .or_fatal(EXIT_FAILURE, "Can't register a signal handler")?;

        while !terminate.load(Ordering::Relaxed) {
            if reload.swap(false, Ordering::Relaxed) {
                emit!(logger, Notice, "Reload requested");
            }
            emit!(logger, Info, "{}", ui.msg);
            thread::sleep(Duration::from_millis(ui.sleep_ms));
        }

        emit!(logger, Notice, "Terminating");
        if let Some(pid_file) = pid_file {
            if let Err(e) = pid_file.remove() {
                logger.log_with_errno(
                    Severity::Warning,
                    &e,
                    format_args!("Can't remove {}", pid_file.path().display()),
                );
            }
        }
        Ok(())
    });
}
