use std::ffi::CString;
use std::fmt;
use std::str::FromStr;

/// The process whose namespaces and root are entered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Target {
    pid: libc::pid_t,
}

impl Target {
    /// The init process of the caller's PID namespace.
    pub const INIT: Target = Target { pid: 1 };

    /// Select the process with id `pid`. Returns `None` unless `pid` is positive.
    pub fn new(pid: libc::pid_t) -> Option<Target> {
        (pid > 0).then_some(Target { pid })
    }

    pub fn pid(&self) -> libc::pid_t {
        self.pid
    }

    /// Path of the target's root directory as seen from the caller's mount namespace.
    pub fn root_path(&self) -> CString {
        let path = format!("/proc/{}/root", self.pid).into_bytes();
        // SAFETY: a literal plus the decimal digits of a pid contain no NUL.
        unsafe { CString::from_vec_unchecked(path) }
    }
}

impl Default for Target {
    fn default() -> Self {
        Target::INIT
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.pid)
    }
}

impl FromStr for Target {
    type Err = ParseTargetError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let pid: libc::pid_t = s
            .parse()
            .map_err(|_| ParseTargetError(s.to_owned()))?;
        Target::new(pid).ok_or_else(|| ParseTargetError(s.to_owned()))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid process id {0:?}: expected a positive integer")]
pub struct ParseTargetError(pub String);
