//! The entry sequence, as a chain of phases.
//!
//! 1. [`Prepared::prepare`] opens the executable, a pidfd for the target, and the target's root,
//!    in that order, while still in the caller's namespaces.
//! 2. [`Prepared::switch_namespaces`] calls `setns(2)` and closes the pidfd.
//! 3. [`Switched::rebase_root`] does `fchdir(root)`, `chroot(".")`, `chdir("/")`.
//! 4. [`Rebased::exec`] calls `execveat(2)` on the executable handle.
//!
//! Every transition consumes the previous phase, so a handle can't be reopened after the switch,
//! and there is no way back from [`Switched`]: it has no method other than moving forward.
//!
//! ```compile_fail
//! use enter::{Command, Host, Prepared};
//!
//! let launch = Command::new("/bin/true").build().unwrap();
//! let prepared = Prepared::prepare(Host, launch).unwrap();
//! prepared.exec(); // only `Rebased` can exec
//! ```
//!
//! ```compile_fail
//! use enter::{Command, Host, Prepared};
//!
//! let launch = Command::new("/bin/true").build().unwrap();
//! let prepared = Prepared::prepare(Host, launch).unwrap();
//! let _switched = prepared.switch_namespaces();
//! let _again = prepared.switch_namespaces(); // `prepared` was consumed
//! ```

use alloc_counter::no_alloc;
use c_str_macro::c_str;
use std::convert::Infallible;
use std::os::fd::{AsFd, AsRawFd, BorrowedFd};

use tracing::{debug, span, Level};

use crate::command::{ArgumentVector, Environment, Launch};
use crate::error::{Error, ErrorKind, Result};
use crate::handle::{ExecutableHandle, NamespaceHandle, RootHandle};
use crate::kernel::Kernel;
use crate::NamespaceSet;

/// All handles acquired; still in the caller's namespaces and root.
///
/// Dropping this closes every handle, leaving the caller as it was.
#[derive(Debug)]
pub struct Prepared<K: Kernel> {
    kernel: K,
    executable: ExecutableHandle,
    namespace: NamespaceHandle,
    root: RootHandle,
    namespaces: NamespaceSet,
    argv: ArgumentVector,
    envp: Environment,
}

/// Inside the target's namespaces, not yet re-rooted.
#[derive(Debug)]
pub struct Switched<K: Kernel> {
    kernel: K,
    executable: ExecutableHandle,
    root: RootHandle,
    argv: ArgumentVector,
    envp: Environment,
}

/// Inside the target's namespaces and root; only the exec is left.
#[derive(Debug)]
pub struct Rebased<K: Kernel> {
    kernel: K,
    executable: ExecutableHandle,
    // Close-on-exec: kept open until the image is replaced.
    _root: RootHandle,
    argv: ArgumentVector,
    envp: Environment,
}

impl<K: Kernel> Prepared<K> {
    /// Open the executable, then the target's pidfd, then its root.
    ///
    /// Stops at the first failure; handles already opened are closed before returning.
    pub fn prepare(kernel: K, launch: Launch) -> Result<Prepared<K>> {
        let Launch {
            program,
            target,
            namespaces,
            argv,
            envp,
        } = launch;

        // Open the binary first. We want it as an fd so we can still execute it after the
        // chroot, when its path may not resolve at all.
        let executable = kernel
            .open_executable(&program)
            .map_err(|e| e.kind(ErrorKind::ExecutableUnavailable))?;
        let executable = ExecutableHandle::new(executable);
        debug!(fd = executable.as_fd().as_raw_fd(), path = ?program, "opened executable");

        let namespace = kernel
            .pidfd_open(target.pid())
            .map_err(|e| e.kind(ErrorKind::TargetProcessUnavailable))?;
        let namespace = NamespaceHandle::new(namespace);
        debug!(fd = namespace.as_fd().as_raw_fd(), pid = target.pid(), "opened pidfd");

        let root_path = target.root_path();
        let root = kernel
            .open_root(&root_path)
            .map_err(|e| e.kind(ErrorKind::TargetRootUnavailable))?;
        let root = RootHandle::new(root);
        debug!(fd = root.as_fd().as_raw_fd(), path = ?root_path, "opened target root");

        Ok(Prepared {
            kernel,
            executable,
            namespace,
            root,
            namespaces,
            argv,
            envp,
        })
    }

    /// Enter the target's namespaces and close the pidfd.
    ///
    /// If `setns(2)` fails, nothing has changed and the remaining handles are closed. Once it
    /// succeeds there is no way back.
    pub fn switch_namespaces(self) -> Result<Switched<K>> {
        let Prepared {
            kernel,
            executable,
            namespace,
            root,
            namespaces,
            argv,
            envp,
        } = self;

        let flags = namespaces.clone_flags();
        debug!(%namespaces, flags, "entering target namespaces");
        kernel
            .setns(namespace.as_fd(), flags)
            .map_err(|e| e.kind(ErrorKind::NamespaceSwitchFailed))?;

        // The pidfd must not survive into the new root.
        kernel
            .close(namespace.into_fd())
            .map_err(|e| {
                e.kind(ErrorKind::NamespaceSwitchFailed)
                    .context("closing pidfd after setns")
            })?;

        Ok(Switched {
            kernel,
            executable,
            root,
            argv,
            envp,
        })
    }
}

impl<K: Kernel> Switched<K> {
    /// Make the target's root our root and working directory.
    pub fn rebase_root(self) -> Result<Rebased<K>> {
        rebase(&self.kernel, self.root.as_fd())?;

        let Switched {
            kernel,
            executable,
            root,
            argv,
            envp,
        } = self;
        Ok(Rebased {
            kernel,
            executable,
            _root: root,
            argv,
            envp,
        })
    }
}

impl<K: Kernel> Rebased<K> {
    /// Replace this process with the executable opened in [`Prepared::prepare`].
    ///
    /// Only returns on failure.
    pub fn exec(self) -> Error {
        exec_image(&self.kernel, self.executable.as_fd(), &self.argv, &self.envp)
    }
}

/// Run the whole sequence. Never returns on success.
pub fn enter<K: Kernel>(kernel: K, launch: Launch) -> Error {
    let span = span!(Level::DEBUG, "enter", pid = launch.target.pid());
    let _span_guard = span.enter();

    match run(kernel, launch) {
        Ok(never) => match never {},
        Err(err) => err,
    }
}

fn run<K: Kernel>(kernel: K, launch: Launch) -> Result<Infallible> {
    let rebased = Prepared::prepare(kernel, launch)?
        .switch_namespaces()?
        .rebase_root()?;
    Err(rebased.exec())
}

/// `fchdir(root)`, `chroot(".")`, `chdir("/")`.
#[cfg_attr(debug_assertions, no_alloc)]
fn rebase<K: Kernel>(kernel: &K, root: BorrowedFd<'_>) -> Result<()> {
    kernel
        .fchdir(root)
        .map_err(|e| e.kind(ErrorKind::RootChangeFailed))?;
    kernel
        .chroot(c_str!("."))
        .map_err(|e| e.kind(ErrorKind::RootChangeFailed))?;
    kernel
        .chdir(c_str!("/"))
        .map_err(|e| e.kind(ErrorKind::RootChangeFailed))?;
    Ok(())
}

#[cfg_attr(debug_assertions, no_alloc)]
fn exec_image<K: Kernel>(
    kernel: &K,
    executable: BorrowedFd<'_>,
    argv: &ArgumentVector,
    envp: &Environment,
) -> Error {
    kernel
        .execveat(executable, argv, envp)
        .kind(ErrorKind::ExecFailed)
}
