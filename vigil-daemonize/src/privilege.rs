//! Dropping privileges.
//!
//! A daemon is often started as root (to bind a privileged port, to open a device, to write into
//! the state directory) but it should not keep running as root. The account to switch to is
//! looked up first by [`resolve_account`], while the account database is still reachable. Then
//! the process can optionally confine itself into a directory by [`chroot_start`] and finally
//! switches the identity by [`drop_to`].
//!
//! The order matters. Entering the chroot needs the privileges that are about to be dropped and
//! the account database is usually not available inside the chroot.

use std::env;
use std::error::Error;
#[cfg(not(any(target_os = "macos", target_os = "ios", target_os = "redox")))]
use std::ffi::CString;
use std::fmt::{Display, Formatter, Result as FmtResult};
use std::path::{Path, PathBuf};

use log::{debug, trace};
use nix::errno::Errno;
use nix::unistd::{self, Gid, Uid, User};
use privdrop::PrivDrop;
use vigil::error::{Fatal, FatalExt, EXIT_FAILURE};
use vigil::AnyError;

/// The account to switch to.
///
/// Created by [`resolve_account`] (or [`resolve_uid`]) and consumed by [`drop_to`].
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Identity {
    name: String,
    uid: Uid,
    gid: Gid,
    home: PathBuf,
}

impl Identity {
    /// The account name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The numeric user ID.
    pub fn uid(&self) -> Uid {
        self.uid
    }

    /// The numeric ID of the account's primary group.
    pub fn gid(&self) -> Gid {
        self.gid
    }

    /// The home directory of the account.
    pub fn home(&self) -> &Path {
        &self.home
    }
}

impl From<User> for Identity {
    fn from(user: User) -> Self {
        Identity {
            name: user.name,
            uid: user.uid,
            gid: user.gid,
            home: user.dir,
        }
    }
}

/// The account couldn't be resolved.
#[derive(Debug)]
#[non_exhaustive]
pub enum ResolveError {
    /// There's no such account.
    NotFound(String),
    /// The account database failed to answer.
    Lookup {
        /// The account asked for.
        name: String,
        /// What went wrong.
        source: Errno,
    },
}

impl Display for ResolveError {
    fn fmt(&self, fmt: &mut Formatter) -> FmtResult {
        match self {
            ResolveError::NotFound(name) => write!(fmt, "User {} not found", name),
            ResolveError::Lookup { name, .. } => write!(fmt, "Failed to look up user {}", name),
        }
    }
}

impl Error for ResolveError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            ResolveError::NotFound(_) => None,
            ResolveError::Lookup { source, .. } => Some(source),
        }
    }
}

fn lookup(name: String, result: nix::Result<Option<User>>) -> Result<Identity, ResolveError> {
    match result {
        Ok(Some(user)) => Ok(user.into()),
        Ok(None) => Err(ResolveError::NotFound(name)),
        // These are documented by getpwnam as other ways of saying "not there"
        Err(Errno::ENOENT) | Err(Errno::ESRCH) | Err(Errno::EBADF) | Err(Errno::EPERM) => {
            Err(ResolveError::NotFound(name))
        }
        Err(source) => Err(ResolveError::Lookup { name, source }),
    }
}

/// Looks up an account by its name.
pub fn resolve_account(name: &str) -> Result<Identity, ResolveError> {
    trace!("Looking up user {}", name);
    lookup(name.to_owned(), User::from_name(name))
}

/// Looks up an account by its numeric user ID.
pub fn resolve_uid(uid: u32) -> Result<Identity, ResolveError> {
    trace!("Looking up uid {}", uid);
    lookup(uid.to_string(), User::from_uid(Uid::from_raw(uid)))
}

#[cfg(not(any(target_os = "macos", target_os = "ios", target_os = "redox")))]
fn set_groups(identity: &Identity) -> Result<(), AnyError> {
    let name = CString::new(identity.name.as_bytes())?;
    unistd::initgroups(&name, identity.gid)?;
    Ok(())
}

#[cfg(any(target_os = "macos", target_os = "ios", target_os = "redox"))]
fn set_groups(identity: &Identity) -> Result<(), AnyError> {
    trace!("Supplementary groups of {} left as they are", identity.name);
    Ok(())
}

/// Checks the identity really changed and there's no way back.
fn verify(identity: &Identity) -> Result<(), Fatal> {
    let current = (
        unistd::getuid(),
        unistd::geteuid(),
        unistd::getgid(),
        unistd::getegid(),
    );
    if current != (identity.uid, identity.uid, identity.gid, identity.gid) {
        return Err(Fatal::new(
            EXIT_FAILURE,
            format!(
                "Failed to become {}: running as uid {}/{}, gid {}/{}",
                identity.name, current.0, current.1, current.2, current.3,
            ),
        ));
    }
    if !identity.uid.is_root() && unistd::setuid(Uid::from_raw(0)).is_ok() {
        return Err(Fatal::new(
            EXIT_FAILURE,
            format!("Failed to become {}: root privileges can be regained", identity.name),
        ));
    }
    Ok(())
}

/// Permanently switches the process to the given account.
///
/// The supplementary groups and the group are set first (these need the privileges the user
/// switch takes away), the user last. Afterwards, it checks both the real and effective IDs are
/// the target ones and that root can't be regained. Not managing to drop the privileges is fatal.
///
/// If the process doesn't run as root in the first place, there's nothing to drop and the
/// identity is left as it is.
pub fn drop_to(identity: Identity) -> Result<(), Fatal> {
    let (uid, euid) = (unistd::getuid(), unistd::geteuid());
    if !uid.is_root() && !euid.is_root() {
        debug!(
            "Not running as root (uid {}), not switching to user {}",
            uid, identity.name
        );
        return Ok(());
    }

    debug!(
        "Switching to user {} (uid {}, gid {})",
        identity.name, identity.uid, identity.gid
    );
    set_groups(&identity)
        .or_fatal_with(EXIT_FAILURE, || {
            format!("Failed to set the groups of {}", identity.name)
        })?;
    unistd::setgid(identity.gid)
        .or_fatal_with(EXIT_FAILURE, || format!("Failed to set gid to {}", identity.gid))?;
    unistd::setuid(identity.uid)
        .or_fatal_with(EXIT_FAILURE, || format!("Failed to set uid to {}", identity.uid))?;
    verify(&identity)
}

/// Changes the root directory of the process and enters it.
///
/// Both the root and the working directory are changed. Any failure is fatal, so the process
/// never continues with only one of them changed.
pub fn chroot_start(path: &Path) -> Result<(), Fatal> {
    debug!("Entering chroot {}", path.display());
    PrivDrop::default()
        .chroot(path)
        .apply()
        .or_fatal_with(EXIT_FAILURE, || format!("Can't chroot into {}", path.display()))?;
    let cwd = env::current_dir()
        .or_fatal(EXIT_FAILURE, "Can't read the working directory after chroot")?;
    if cwd != Path::new("/") {
        return Err(Fatal::new(
            EXIT_FAILURE,
            format!(
                "Working directory {} is outside of chroot {}",
                cwd.display(),
                path.display()
            ),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolve_root() {
        let root = resolve_account("root").unwrap();
        assert_eq!("root", root.name());
        assert!(root.uid().is_root());
        assert_eq!(Gid::from_raw(0), root.gid());

        let by_id = resolve_uid(0).unwrap();
        assert_eq!(root, by_id);
    }

    #[test]
    fn resolve_missing() {
        match resolve_account("vigil-no-such-user") {
            Err(ResolveError::NotFound(name)) => assert_eq!("vigil-no-such-user", name),
            other => panic!("Unexpected result {:?}", other),
        }
        let err = resolve_account("vigil-no-such-user").unwrap_err();
        assert_eq!("User vigil-no-such-user not found", err.to_string());
    }

    /// Without root, there's nothing to drop and nothing happens.
    #[test]
    fn unprivileged_drop_is_noop() {
        if unistd::geteuid().is_root() || unistd::getuid().is_root() {
            return;
        }
        let me = resolve_uid(unistd::getuid().as_raw()).unwrap();
        let root = resolve_account("root").unwrap();
        drop_to(root).unwrap();
        assert_eq!(me.uid(), unistd::getuid());
    }

    /// A failed chroot leaves everything as it was (and the caller terminates).
    #[test]
    fn chroot_missing_dir() {
        let before = env::current_dir().unwrap();
        let fatal = chroot_start(Path::new("/vigil/no/such/directory")).unwrap_err();
        assert_eq!(EXIT_FAILURE, fatal.status());
        assert!(fatal.to_string().starts_with("Can't chroot into /vigil/no/such/directory: "));
        assert_eq!(before, env::current_dir().unwrap());
    }
}
