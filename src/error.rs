use alloc_counter::no_alloc;
use std::ffi::c_int;

/// Result type for our error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Which step of entering the target failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum ErrorKind {
    /// The binary could not be opened before any namespace change.
    #[error("executable unavailable")]
    ExecutableUnavailable,

    /// The target process does not exist, or no pidfd could be obtained for it.
    #[error("target process unavailable")]
    TargetProcessUnavailable,

    /// The target's `/proc/PID/root` could not be opened.
    #[error("target root unavailable")]
    TargetRootUnavailable,

    /// The kernel refused `setns(2)` into the target's namespaces.
    #[error("namespace switch failed")]
    NamespaceSwitchFailed,

    /// One of `fchdir(2)`, `chroot(2)` or `chdir(2)` failed.
    #[error("root change failed")]
    RootChangeFailed,

    /// `execveat(2)` returned.
    #[error("exec failed")]
    ExecFailed,

    /// The launch was rejected before anything was opened.
    #[error("invalid argument")]
    InvalidArgument,
}

/// An error type which can track kind (which step failed), cause (reason the error happened) and
/// context (what we were doing when the error happened) without allocating.
#[derive(Debug, Clone, Copy)]
pub struct Error {
    pub errno: c_int,
    pub kind: Option<ErrorKind>,
    pub cause: Option<&'static str>,
    pub context: Option<&'static str>,
}

impl Error {
    /// Create an empty error.
    #[cfg_attr(debug_assertions, no_alloc)]
    pub fn new() -> Error {
        Error {
            errno: 0,
            kind: None,
            cause: None,
            context: None,
        }
    }

    /// Create an error from the last OS error.
    #[cfg_attr(debug_assertions, no_alloc)]
    pub fn last_os_error() -> Error {
        Error {
            errno: unsafe { *libc::__errno_location() },
            kind: None,
            cause: None,
            context: None,
        }
    }

    /// Replace the kind of an error.
    #[cfg_attr(debug_assertions, no_alloc)]
    pub fn kind(self, kind: ErrorKind) -> Error {
        Error {
            kind: Some(kind),
            ..self
        }
    }

    /// Replace the cause of an error.
    #[cfg_attr(debug_assertions, no_alloc)]
    pub fn cause(self, msg: &'static str) -> Error {
        Error {
            cause: Some(msg),
            ..self
        }
    }

    /// Replace the context of an error.
    #[cfg_attr(debug_assertions, no_alloc)]
    pub fn context(self, msg: &'static str) -> Error {
        Error {
            context: Some(msg),
            ..self
        }
    }

    /// Whether this error was tagged with `kind`.
    pub fn is(&self, kind: ErrorKind) -> bool {
        self.kind == Some(kind)
    }
}

impl Default for Error {
    fn default() -> Self {
        Self::new()
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Error {
        Error {
            errno: e.raw_os_error().unwrap_or(0),
            ..Error::new()
        }
    }
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        if let Some(kind) = self.kind {
            write!(f, "{kind}: ")?;
        }
        if let Some(context) = self.context {
            write!(f, "{context}: ")?;
        }
        if let Some(cause) = self.cause {
            write!(f, "{cause}")?;
            if self.errno == 0 {
                return Ok(());
            }
            write!(f, ": ")?;
        }

        // Get the error message from errno.
        let error_msg = unsafe { libc::strerror(self.errno) };
        let error_msg_len = unsafe { libc::strlen(error_msg) };
        let error_msg_str: &str = unsafe {
            std::str::from_utf8_unchecked(std::slice::from_raw_parts(
                error_msg as *const u8,
                error_msg_len,
            ))
        };
        write!(f, "{} (errno {})", error_msg_str, self.errno)
    }
}

impl std::error::Error for Error {}

// Define a macro, bail!, which returns an error with no errno and a custom message:
//
// - `bail!(msg)` returns an error with a cause.
// - `bail!(kind, msg)` returns an error with a kind and a cause.
macro_rules! bail {
    ($msg:expr) => {
        return Err($crate::error::Error::new().cause($msg))
    };
    ($kind:expr, $msg:expr) => {
        return Err($crate::error::Error::new().kind($kind).cause($msg))
    };
}
pub(crate) use bail;

// Define a macro, bail_errno!, which returns an error with the last OS error:
//
// - `bail_errno!()` returns an error with the last OS error.
// - `bail_errno!(msg)` returns an error with the last OS error and a cause.
macro_rules! bail_errno {
    () => {
        return Err($crate::error::Error::last_os_error());
    };
    ($msg:expr) => {
        return Err($crate::error::Error::last_os_error().cause($msg));
    };
}
pub(crate) use bail_errno;
