use std::collections::BTreeMap;
use std::ffi::{c_char, CStr, CString, OsStr, OsString};
use std::os::unix::ffi::{OsStrExt, OsStringExt};
use std::ptr;

use tracing::debug;

use crate::error::{bail, Error, ErrorKind, Result};
use crate::kernel::{Host, Kernel};
use crate::{sequence, NamespaceSet, Target};

/// Binary run when none is given.
pub const DEFAULT_PROGRAM: &str = "/bin/bash";

/// A program to be run inside another process's namespaces and root.
#[derive(Debug, Clone)]
pub struct Command {
    // Exec information
    program: OsString,
    args: Vec<OsString>,
    env: BTreeMap<OsString, Option<OsString>>,
    inherit_parent_env: bool,

    // Where to run it.
    target: Target,
    namespaces: NamespaceSet,
}

/// A [`Command`] with every string converted for the kernel, ready to hand to
/// [`Prepared::prepare`](crate::Prepared::prepare).
#[derive(Debug)]
pub struct Launch {
    pub(crate) program: CString,
    pub(crate) target: Target,
    pub(crate) namespaces: NamespaceSet,
    pub(crate) argv: ArgumentVector,
    pub(crate) envp: Environment,
}

/// Owned NUL-terminated strings plus the null-terminated pointer array `execve(2)` wants.
///
/// The pointers refer to the strings' heap buffers, which do not move when the array does, so it
/// can be built before the namespace switch and passed along by value.
#[derive(Debug)]
pub struct CStringArray {
    strings: Vec<CString>,
    ptrs: Vec<*const c_char>,
}

/// The argument vector of the new image; `argv[0]` is the invocation name.
pub type ArgumentVector = CStringArray;

/// The environment of the new image, as `KEY=VALUE` strings.
pub type Environment = CStringArray;

impl CStringArray {
    pub fn new(strings: Vec<CString>) -> CStringArray {
        let mut ptrs: Vec<*const c_char> = strings.iter().map(|s| s.as_ptr()).collect();
        ptrs.push(ptr::null());
        CStringArray { strings, ptrs }
    }

    /// Pointer to the first element of the null-terminated array.
    pub fn as_ptr(&self) -> *const *const c_char {
        self.ptrs.as_ptr()
    }

    pub fn len(&self) -> usize {
        self.strings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.strings.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &CStr> {
        self.strings.iter().map(CString::as_c_str)
    }
}

impl Command {
    /// Create a new command.
    pub fn new(program: impl AsRef<OsStr>) -> Command {
        Command {
            program: program.as_ref().to_owned(),
            args: vec![program.as_ref().to_owned()],
            env: BTreeMap::new(),
            inherit_parent_env: false,
            target: Target::default(),
            namespaces: NamespaceSet::DEFAULT,
        }
    }

    /// Set the contents of `argv[0]`.
    pub fn argv0(&mut self, argv0: impl AsRef<OsStr>) -> &mut Command {
        self.args[0] = argv0.as_ref().to_owned();
        self
    }

    /// Append an argument.
    pub fn arg(&mut self, arg: impl AsRef<OsStr>) -> &mut Command {
        self.args.push(arg.as_ref().to_owned());
        self
    }

    /// Append several arguments.
    pub fn args(&mut self, args: impl IntoIterator<Item = impl AsRef<OsStr>>) -> &mut Command {
        self.args
            .extend(args.into_iter().map(|e| e.as_ref().to_owned()));
        self
    }

    /// Select the process whose namespaces and root are entered.
    pub fn target(&mut self, target: Target) -> &mut Command {
        self.target = target;
        self
    }

    /// Select which of the target's namespaces are entered.
    pub fn namespaces(&mut self, namespaces: NamespaceSet) -> &mut Command {
        self.namespaces = namespaces;
        self
    }

    /// Set the value of an environment variable in the new image.
    pub fn env(&mut self, key: impl AsRef<OsStr>, value: impl AsRef<OsStr>) -> &mut Command {
        let key = key.as_ref().to_owned();
        let value = value.as_ref().to_owned();
        self.env.insert(key, Some(value));
        self
    }

    /// Sets several environment variables.
    pub fn envs(
        &mut self,
        envs: impl IntoIterator<Item = (impl AsRef<OsStr>, impl AsRef<OsStr>)>,
    ) -> &mut Command {
        let envs_iter = envs
            .into_iter()
            .map(|(k, v)| (k.as_ref().to_owned(), Some(v.as_ref().to_owned())));
        self.env.extend(envs_iter);
        self
    }

    /// Explicitly removes an environment variable, preventing it from being inherited
    /// from the caller's environment.
    pub fn env_remove(&mut self, key: impl AsRef<OsStr>) -> &mut Command {
        self.env.insert(key.as_ref().to_owned(), None);
        self
    }

    /// Clear all environment variables, and stop inheriting the caller's environment.
    pub fn env_clear(&mut self) -> &mut Command {
        self.inherit_parent_env = false;
        self.env = BTreeMap::new();
        self
    }

    /// Start the new image's environment from the caller's instead of an empty one.
    pub fn inherit_env(&mut self, inherit: bool) -> &mut Command {
        self.inherit_parent_env = inherit;
        self
    }

    /// Returns an iterator over the arguments passed to the program, starting with `argv[0]`.
    pub fn get_args(&self) -> impl Iterator<Item = &OsStr> {
        self.args.iter().map(|e| e.as_os_str())
    }

    /// Returns the environment variables explicitly set or removed for the program.
    pub fn get_envs(&self) -> impl Iterator<Item = (&OsStr, Option<&OsStr>)> {
        self.env
            .iter()
            .map(|(k, v)| (k.as_os_str(), v.as_deref()))
    }

    /// Gets the executable path.
    pub fn get_program(&self) -> &OsStr {
        &self.program
    }

    pub fn get_target(&self) -> Target {
        self.target
    }

    pub fn get_namespaces(&self) -> NamespaceSet {
        self.namespaces
    }

    /// Convert every string for the kernel and check the request, without touching any
    /// namespace or file.
    pub fn build(self) -> Result<Launch> {
        if self.namespaces.is_empty() {
            bail!(ErrorKind::InvalidArgument, "no namespaces selected");
        }

        let program = to_cstring(self.program.into_vec(), "program path contains internal NUL")?;

        let args = self
            .args
            .into_iter()
            .map(|e| to_cstring(e.into_vec(), "argument contains internal NUL"))
            .collect::<Result<Vec<_>>>()?;

        // Collect the environment variables.
        let mut env_map: BTreeMap<OsString, OsString> = if self.inherit_parent_env {
            std::env::vars_os().collect()
        } else {
            BTreeMap::new()
        };
        for var in self.env {
            match var {
                (k, Some(v)) => {
                    env_map.insert(k, v);
                }
                (k, None) => {
                    env_map.remove(&k);
                }
            };
        }
        let envp = env_map
            .into_iter()
            .map(|(k, v)| {
                if k.as_bytes().contains(&b'=') {
                    return Err(Error::new()
                        .kind(ErrorKind::InvalidArgument)
                        .cause("env key contains '='"));
                }
                let mut kv = k.into_vec();
                kv.push(b'=');
                kv.extend(v.into_vec());
                to_cstring(kv, "env contains internal NUL")
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Launch {
            program,
            target: self.target,
            namespaces: self.namespaces,
            argv: CStringArray::new(args),
            envp: CStringArray::new(envp),
        })
    }

    /// Enter the target and replace this process with the program.
    ///
    /// Never returns on success. Any returned error is terminal: if it happened after the
    /// namespace switch, this process is already inside the target's namespaces. Entering again
    /// from such a process is not supported, since paths now resolve against the target's root.
    pub fn enter(self) -> Error {
        self.enter_with(Host)
    }

    /// Like [`Command::enter`], issuing the system calls through `kernel`.
    pub fn enter_with<K: Kernel>(self, kernel: K) -> Error {
        debug!(
            program = ?self.program,
            target = %self.target,
            namespaces = %self.namespaces,
            "entering"
        );
        match self.build() {
            Ok(launch) => sequence::enter(kernel, launch),
            Err(err) => err,
        }
    }
}

impl Launch {
    pub fn program(&self) -> &CStr {
        &self.program
    }

    pub fn target(&self) -> Target {
        self.target
    }

    pub fn namespaces(&self) -> NamespaceSet {
        self.namespaces
    }

    pub fn argv(&self) -> &ArgumentVector {
        &self.argv
    }

    pub fn envp(&self) -> &Environment {
        &self.envp
    }
}

fn to_cstring(bytes: Vec<u8>, cause: &'static str) -> Result<CString> {
    CString::new(bytes).map_err(|_| Error::new().kind(ErrorKind::InvalidArgument).cause(cause))
}
