mod libc_util;

mod error;
pub mod handle;
pub mod kernel;
pub mod namespace;
pub mod sequence;
pub mod target;

pub mod cli;
mod command;
pub mod logging;

pub use command::{ArgumentVector, CStringArray, Command, Environment, Launch, DEFAULT_PROGRAM};
pub use error::{Error, ErrorKind, Result};
pub use handle::{ExecutableHandle, NamespaceHandle, RootHandle};
pub use kernel::{Host, Kernel};
pub use namespace::{Namespace, NamespaceSet};
pub use sequence::{enter, Prepared, Rebased, Switched};
pub use target::Target;

/// In debug builds, use alloc_counter to verify at runtime that the steps after the namespace
/// switch do not allocate.
#[cfg(debug_assertions)]
#[global_allocator]
static ALLOC: alloc_counter::AllocCounterSystem = alloc_counter::AllocCounterSystem;
