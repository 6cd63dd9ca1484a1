//! Going to background ends the original process, so the test binary is run again as a child
//! that daemonizes. The daemonized grandchild reports through files in a temporary directory.

use std::env;
use std::fs;
use std::path::Path;
use std::process::{self, Command};
use std::thread;
use std::time::Duration;

use nix::unistd::{self, Pid};
use vigil::{LogRoute, Logger, Paths};
use vigil_daemonize::Daemon;

const CHILD_ENV: &str = "VIGIL_BACKGROUND_CHILD";

fn child_body(dir: &Path) -> ! {
    let paths = Paths::in_dir(dir);
    let mut logger = Logger::new(LogRoute::NONE, 0);
    let original = Pid::this();
    let mut daemon = Daemon::default();
    daemon.daemonize = true;
    daemon.pid_file = Some("bg".to_owned());
    if let Err(fatal) = daemon.start(&mut logger, &paths, "vigil-bg-test") {
        logger.fatal(fatal);
    }

    // Only the grandchild gets here
    let pid = Pid::this();
    let sid = unistd::getsid(None).map(|s| s.as_raw()).unwrap_or(-1);
    let stdout = fs::read_link("/proc/self/fd/1")
        .map(|p| p.display().to_string())
        .unwrap_or_else(|_| "unknown".to_owned());
    let cwd = env::current_dir().unwrap();
    let info = format!(
        "{} {} {} {} {}",
        pid,
        original,
        sid,
        stdout,
        cwd.display()
    );
    // Written under a temporary name, so the parent never sees it half-done
    fs::write(dir.join("info.tmp"), info).unwrap();
    fs::rename(dir.join("info.tmp"), dir.join("info")).unwrap();
    process::exit(0);
}

#[test]
fn pid_file_records_daemon() {
    if let Some(dir) = env::var_os(CHILD_ENV) {
        child_body(Path::new(&dir));
    }

    let dir = tempfile::tempdir().unwrap();
    let child = Command::new(env::current_exe().unwrap())
        .args(&["pid_file_records_daemon", "--exact", "--nocapture"])
        .env(CHILD_ENV, dir.path())
        .spawn()
        .unwrap();
    let child_pid = child.id().to_string();
    let output = child.wait_with_output().unwrap();
    assert!(output.status.success());

    let info_path = dir.path().join("info");
    for _ in 0..250 {
        if info_path.exists() {
            break;
        }
        thread::sleep(Duration::from_millis(20));
    }
    let info = fs::read_to_string(&info_path).expect("The daemon didn't report");
    let fields = info.split(' ').collect::<Vec<_>>();
    assert_eq!(5, fields.len(), "{}", info);
    let (pid, original, sid, stdout, cwd) = (fields[0], fields[1], fields[2], fields[3], fields[4]);

    // The PID file holds the process ID after the fork, not the started one
    let recorded = fs::read_to_string(dir.path().join("bg.pid")).unwrap();
    assert_eq!(format!("{}\n", pid), recorded);
    assert_eq!(child_pid, original);
    assert_ne!(original, pid);

    // A new session, led by the intermediate process
    assert_ne!(original, sid);
    assert_ne!(pid, sid);

    if cfg!(target_os = "linux") {
        assert_eq!("/dev/null", stdout);
    }
    assert_eq!("/", cwd);
}
