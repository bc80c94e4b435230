use clap::{ArgAction, Parser, ValueEnum};
use std::ffi::OsString;

use tracing::debug;

use crate::command::DEFAULT_PROGRAM;
use crate::target::ParseTargetError;
use crate::{Command, NamespaceSet, Target};

#[derive(Debug, Parser)]
#[command(name = "enter")]
#[command(
    version,
    about = "Run a binary from this filesystem inside another process's namespaces and root",
    long_about = None
)]
#[command(override_usage = "enter [OPTIONS] [BINARY]\n       enter [OPTIONS] <PID> <BINARY> [ARGS]...")]
#[command(after_help = "EXAMPLES:
    # A shell in the namespaces and root of pid 1
    enter /usr/local/bin/ash

    # A command in another container, forwarding its arguments
    enter 1234 /usr/local/bin/ash -c 'top -n 1'

    # Only borrow the network namespace
    enter --namespaces network 1234 /bin/ip addr
")]
pub struct Cli {
    /// Namespaces to enter: `container`, `network`, or a list such as `net,mnt,pid`
    #[arg(short, long, value_name = "SET", default_value_t = NamespaceSet::DEFAULT)]
    pub namespaces: NamespaceSet,

    /// Whether operands after the binary are passed to it
    #[arg(long, value_enum, value_name = "MODE", default_value_t = ArgvMode::Forward)]
    pub argv_mode: ArgvMode,

    /// Use NAME as argv[0] instead of the binary path
    #[arg(short = 'a', long, value_name = "NAME")]
    pub argv0: Option<OsString>,

    /// Pass this process's environment to the binary instead of an empty one
    #[arg(long)]
    pub inherit_env: bool,

    /// Set an environment variable for the binary
    #[arg(short, long = "env", value_name = "KEY=VALUE", value_parser = parse_env_pair)]
    pub env: Vec<(String, String)>,

    /// Log what is being done (repeat for more detail)
    #[arg(short, long, action = ArgAction::Count)]
    pub verbose: u8,

    /// [PID] BINARY [ARGS]...
    ///
    /// Options are only recognised before the first operand.
    #[arg(value_name = "OPERANDS", trailing_var_arg = true)]
    pub operands: Vec<OsString>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ArgvMode {
    /// argv is the binary followed by the remaining operands
    Forward,
    /// argv is the binary alone; remaining operands are ignored
    BinaryOnly,
}

/// The operands, split into their parts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub target: Target,
    pub binary: OsString,
    pub args: Vec<OsString>,
}

#[derive(Debug, thiserror::Error)]
pub enum UsageError {
    #[error(transparent)]
    InvalidPid(#[from] ParseTargetError),
}

/// Split the operands into target, binary and arguments.
///
/// - no operands: pid 1, [`DEFAULT_PROGRAM`].
/// - one operand: pid 1, that binary.
/// - more: the first is the pid, the second the binary, the rest its arguments.
pub fn resolve_operands(operands: Vec<OsString>) -> Result<Invocation, UsageError> {
    let mut operands = operands.into_iter();
    let (Some(first), second) = (operands.next(), operands.next()) else {
        return Ok(Invocation {
            target: Target::default(),
            binary: DEFAULT_PROGRAM.into(),
            args: vec![],
        });
    };

    let Some(binary) = second else {
        return Ok(Invocation {
            target: Target::default(),
            binary: first,
            args: vec![],
        });
    };

    let target = first
        .to_str()
        .ok_or_else(|| ParseTargetError(first.to_string_lossy().into_owned()))?
        .parse::<Target>()?;
    Ok(Invocation {
        target,
        binary,
        args: operands.collect(),
    })
}

impl Cli {
    /// Turn the parsed command line into a [`Command`].
    pub fn into_command(self) -> Result<Command, UsageError> {
        let invocation = resolve_operands(self.operands)?;

        let mut cmd = Command::new(&invocation.binary);
        if let Some(argv0) = self.argv0 {
            cmd.argv0(argv0);
        }
        match self.argv_mode {
            ArgvMode::Forward => {
                cmd.args(invocation.args);
            }
            ArgvMode::BinaryOnly if !invocation.args.is_empty() => {
                debug!(ignored = invocation.args.len(), "binary-only argv, dropping operands");
            }
            ArgvMode::BinaryOnly => {}
        }
        cmd.target(invocation.target)
            .namespaces(self.namespaces)
            .inherit_env(self.inherit_env)
            .envs(self.env);

        Ok(cmd)
    }
}

fn parse_env_pair(s: &str) -> Result<(String, String), String> {
    match s.split_once('=') {
        Some((key, value)) if !key.is_empty() => Ok((key.to_owned(), value.to_owned())),
        _ => Err(format!("expected KEY=VALUE, got {s:?}")),
    }
}
