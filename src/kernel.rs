use std::ffi::{c_int, CStr};
use std::os::fd::{BorrowedFd, OwnedFd};

use crate::command::{ArgumentVector, Environment};
use crate::error::{Error, Result};
use crate::libc_util;

/// The system calls the entry sequence is made of.
///
/// [`Host`] issues them for real. Every method reports failure through the returned [`Error`]
/// with a `cause` naming the call; the sequence adds the kind and context.
pub trait Kernel {
    /// Open the binary to execute without reading it.
    fn open_executable(&self, path: &CStr) -> Result<OwnedFd>;

    /// Get a pidfd for `pid`.
    fn pidfd_open(&self, pid: libc::pid_t) -> Result<OwnedFd>;

    /// Open a directory that will become the new root.
    fn open_root(&self, path: &CStr) -> Result<OwnedFd>;

    /// Enter the namespaces in `nstype` of the process behind `fd`.
    fn setns(&self, fd: BorrowedFd<'_>, nstype: c_int) -> Result<()>;

    /// Close `fd`, reporting failure.
    fn close(&self, fd: OwnedFd) -> Result<()>;

    fn fchdir(&self, fd: BorrowedFd<'_>) -> Result<()>;

    fn chroot(&self, path: &CStr) -> Result<()>;

    fn chdir(&self, path: &CStr) -> Result<()>;

    /// Replace the process image with the file behind `fd`. Returns only on failure.
    fn execveat(&self, fd: BorrowedFd<'_>, argv: &ArgumentVector, envp: &Environment) -> Error;
}

/// The running kernel.
#[derive(Debug, Clone, Copy, Default)]
pub struct Host;

impl Kernel for Host {
    fn open_executable(&self, path: &CStr) -> Result<OwnedFd> {
        libc_util::open_path(path)
    }

    fn pidfd_open(&self, pid: libc::pid_t) -> Result<OwnedFd> {
        libc_util::pidfd_open(pid)
    }

    fn open_root(&self, path: &CStr) -> Result<OwnedFd> {
        libc_util::open_directory(path)
    }

    fn setns(&self, fd: BorrowedFd<'_>, nstype: c_int) -> Result<()> {
        libc_util::setns(fd, nstype)
    }

    fn close(&self, fd: OwnedFd) -> Result<()> {
        libc_util::close(fd)
    }

    fn fchdir(&self, fd: BorrowedFd<'_>) -> Result<()> {
        libc_util::fchdir(fd)
    }

    fn chroot(&self, path: &CStr) -> Result<()> {
        libc_util::chroot(path)
    }

    fn chdir(&self, path: &CStr) -> Result<()> {
        libc_util::chdir(path)
    }

    fn execveat(&self, fd: BorrowedFd<'_>, argv: &ArgumentVector, envp: &Environment) -> Error {
        // SAFETY: both arrays are null-terminated and point into strings they own.
        unsafe { libc_util::execveat(fd, argv.as_ptr(), envp.as_ptr()) }
    }
}

impl<K: Kernel + ?Sized> Kernel for &K {
    fn open_executable(&self, path: &CStr) -> Result<OwnedFd> {
        (**self).open_executable(path)
    }

    fn pidfd_open(&self, pid: libc::pid_t) -> Result<OwnedFd> {
        (**self).pidfd_open(pid)
    }

    fn open_root(&self, path: &CStr) -> Result<OwnedFd> {
        (**self).open_root(path)
    }

    fn setns(&self, fd: BorrowedFd<'_>, nstype: c_int) -> Result<()> {
        (**self).setns(fd, nstype)
    }

    fn close(&self, fd: OwnedFd) -> Result<()> {
        (**self).close(fd)
    }

    fn fchdir(&self, fd: BorrowedFd<'_>) -> Result<()> {
        (**self).fchdir(fd)
    }

    fn chroot(&self, path: &CStr) -> Result<()> {
        (**self).chroot(path)
    }

    fn chdir(&self, path: &CStr) -> Result<()> {
        (**self).chdir(path)
    }

    fn execveat(&self, fd: BorrowedFd<'_>, argv: &ArgumentVector, envp: &Environment) -> Error {
        (**self).execveat(fd, argv, envp)
    }
}
