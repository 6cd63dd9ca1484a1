//! Locations of the runtime state.
//!
//! The daemons keep some state in the file system, most notably the PID files. Where exactly is
//! decided when building the program, but it can be overridden by the environment:
//!
//! * `VIGIL_STATEPATH` overrides the state directory.
//! * `VIGIL_ALTPIDPATH` overrides the directory with PID files. If not set, the state directory is
//!   used if it was overridden, and the compiled default otherwise.

use std::env;
use std::ffi::OsString;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// The compiled-in default of the state directory.
pub const DEFAULT_STATE_DIR: &str = "/var/state/vigil";

/// The compiled-in default of the PID file directory.
pub const DEFAULT_PID_DIR: &str = "/run/vigil";

const STATE_ENV: &str = "VIGIL_STATEPATH";
const PID_ENV: &str = "VIGIL_ALTPIDPATH";

/// Directories with the runtime state.
///
/// Can be embedded into configuration, but usually is created by [`from_env`][Paths::from_env].
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct Paths {
    /// The state directory.
    pub state_dir: PathBuf,

    /// Where the PID files are stored.
    pub pid_dir: PathBuf,
}

impl Default for Paths {
    fn default() -> Self {
        Paths {
            state_dir: PathBuf::from(DEFAULT_STATE_DIR),
            pid_dir: PathBuf::from(DEFAULT_PID_DIR),
        }
    }
}

impl Paths {
    /// Reads the directories from the environment, using the defaults for the missing ones.
    pub fn from_env() -> Self {
        Self::from_vars(env::var_os(STATE_ENV), env::var_os(PID_ENV))
    }

    fn from_vars(state: Option<OsString>, pid: Option<OsString>) -> Self {
        let state = state.filter(|s| !s.is_empty()).map(PathBuf::from);
        let pid = pid
            .filter(|p| !p.is_empty())
            .map(PathBuf::from)
            .or_else(|| state.clone())
            .unwrap_or_else(|| PathBuf::from(DEFAULT_PID_DIR));
        Paths {
            state_dir: state.unwrap_or_else(|| PathBuf::from(DEFAULT_STATE_DIR)),
            pid_dir: pid,
        }
    }

    /// Creates paths with both directories the same.
    ///
    /// Useful mostly in tests.
    pub fn in_dir<P: AsRef<Path>>(dir: P) -> Self {
        Paths {
            state_dir: dir.as_ref().to_owned(),
            pid_dir: dir.as_ref().to_owned(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        assert_eq!(Paths::default(), Paths::from_vars(None, None));
        assert_eq!(Paths::default(), Paths::from_vars(Some("".into()), None));
    }

    /// The PID directory follows the state directory, unless set explicitly.
    #[test]
    fn fallbacks() {
        let paths = Paths::from_vars(Some("/tmp/state".into()), None);
        assert_eq!(Path::new("/tmp/state"), paths.state_dir);
        assert_eq!(Path::new("/tmp/state"), paths.pid_dir);

        let paths = Paths::from_vars(Some("/tmp/state".into()), Some("/tmp/pid".into()));
        assert_eq!(Path::new("/tmp/pid"), paths.pid_dir);

        let paths = Paths::from_vars(None, Some("/tmp/pid".into()));
        assert_eq!(Path::new(DEFAULT_STATE_DIR), paths.state_dir);
        assert_eq!(Path::new("/tmp/pid"), paths.pid_dir);
    }

    #[test]
    fn from_config() {
        let paths: Paths = toml::from_str(
            r#"
            state-dir = "/srv/state"
            pid-dir = "/srv/run"
            "#,
        )
        .unwrap();
        assert_eq!(Path::new("/srv/run"), paths.pid_dir);
    }
}
