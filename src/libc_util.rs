use alloc_counter::no_alloc;
use c_str_macro::c_str;
use std::ffi::{c_char, c_int, c_uint, CStr};
use std::os::fd::{AsRawFd, BorrowedFd, FromRawFd, IntoRawFd, OwnedFd};

use crate::error::{bail, bail_errno, Error, Result};

/// Open `path` as an `O_PATH` descriptor. Only search permission on the leading directories is
/// needed; the file itself is not read until it is executed.
#[cfg_attr(debug_assertions, no_alloc)]
pub fn open_path(path: &CStr) -> Result<OwnedFd> {
    let fd @ 0.. = (unsafe { libc::open(path.as_ptr(), libc::O_PATH | libc::O_CLOEXEC) }) else {
        bail_errno!("open(O_PATH) failed");
    };
    Ok(unsafe { OwnedFd::from_raw_fd(fd) })
}

/// Open a directory for traversal.
#[cfg_attr(debug_assertions, no_alloc)]
pub fn open_directory(path: &CStr) -> Result<OwnedFd> {
    let flags = libc::O_RDONLY | libc::O_CLOEXEC | libc::O_DIRECTORY;
    let fd @ 0.. = (unsafe { libc::open(path.as_ptr(), flags) }) else {
        bail_errno!("open(O_DIRECTORY) failed");
    };
    Ok(unsafe { OwnedFd::from_raw_fd(fd) })
}

/// Get a pidfd for `pid`. The descriptor stays valid even if the process exits.
#[cfg_attr(debug_assertions, no_alloc)]
pub fn pidfd_open(pid: libc::pid_t) -> Result<OwnedFd> {
    let fd @ 0.. = (unsafe { libc::syscall(libc::SYS_pidfd_open, pid, 0 as c_uint) }) else {
        bail_errno!("pidfd_open(2) failed");
    };
    let Ok(fd) = c_int::try_from(fd) else {
        bail!("pidfd_open(2) returned an out-of-range descriptor");
    };
    Ok(unsafe { OwnedFd::from_raw_fd(fd) })
}

/// Move the calling thread into the namespaces in `nstype` of the process behind `fd`.
#[cfg_attr(debug_assertions, no_alloc)]
pub fn setns(fd: BorrowedFd<'_>, nstype: c_int) -> Result<()> {
    let 0 = (unsafe { libc::setns(fd.as_raw_fd(), nstype) }) else {
        bail_errno!("setns(2) failed");
    };
    Ok(())
}

/// Close a descriptor, reporting the result (dropping an [`OwnedFd`] ignores it).
#[cfg_attr(debug_assertions, no_alloc)]
pub fn close(fd: OwnedFd) -> Result<()> {
    let raw = fd.into_raw_fd();
    let 0 = (unsafe { libc::close(raw) }) else {
        bail_errno!("close(2) failed");
    };
    Ok(())
}

#[cfg_attr(debug_assertions, no_alloc)]
pub fn fchdir(fd: BorrowedFd<'_>) -> Result<()> {
    let 0 = (unsafe { libc::fchdir(fd.as_raw_fd()) }) else {
        bail_errno!("fchdir(2) failed");
    };
    Ok(())
}

#[cfg_attr(debug_assertions, no_alloc)]
pub fn chroot(path: &CStr) -> Result<()> {
    let 0 = (unsafe { libc::chroot(path.as_ptr()) }) else {
        bail_errno!("chroot(2) failed");
    };
    Ok(())
}

#[cfg_attr(debug_assertions, no_alloc)]
pub fn chdir(path: &CStr) -> Result<()> {
    let 0 = (unsafe { libc::chdir(path.as_ptr()) }) else {
        bail_errno!("chdir(2) failed");
    };
    Ok(())
}

/// Execute the file behind `fd` with `execveat(fd, "", argv, envp, AT_EMPTY_PATH)`.
///
/// Only returns on failure. Because `fd` is close-on-exec, interpreted (`#!`) scripts fail with
/// `ENOENT`: the interpreter would be handed a `/dev/fd/N` path that no longer exists.
///
/// # Safety
///
/// `argv` and `envp` must be null-terminated arrays of pointers to NUL-terminated strings.
#[cfg_attr(debug_assertions, no_alloc)]
pub unsafe fn execveat(
    fd: BorrowedFd<'_>,
    argv: *const *const c_char,
    envp: *const *const c_char,
) -> Error {
    libc::syscall(
        libc::SYS_execveat,
        fd.as_raw_fd(),
        c_str!("").as_ptr(),
        argv,
        envp,
        libc::AT_EMPTY_PATH,
    );
    Error::last_os_error().cause("execveat(2) failed")
}
