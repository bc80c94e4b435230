//! Descriptors acquired before the namespace switch.
//!
//! None of these types are `Clone`, and none can be built outside this crate, so every handle is
//! opened once, in the caller's original filesystem view, and consumed once.

use std::os::fd::{AsFd, BorrowedFd, OwnedFd};

/// The binary to execute, opened `O_PATH | O_CLOEXEC`.
#[derive(Debug)]
pub struct ExecutableHandle(OwnedFd);

/// A pidfd for the target process, used as the `setns(2)` argument.
#[derive(Debug)]
pub struct NamespaceHandle(OwnedFd);

/// The target's `/proc/PID/root`, opened as a directory.
#[derive(Debug)]
pub struct RootHandle(OwnedFd);

macro_rules! handle_impls {
    ($name:ident) => {
        impl $name {
            pub(crate) fn new(fd: OwnedFd) -> $name {
                $name(fd)
            }
        }

        impl AsFd for $name {
            fn as_fd(&self) -> BorrowedFd<'_> {
                self.0.as_fd()
            }
        }
    };
}

handle_impls!(ExecutableHandle);
handle_impls!(NamespaceHandle);
handle_impls!(RootHandle);

impl NamespaceHandle {
    /// Give up the handle so it can be closed explicitly.
    pub(crate) fn into_fd(self) -> OwnedFd {
        self.0
    }
}
