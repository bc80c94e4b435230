//! The `enter` binary, in scenarios that need no privileges.

use std::io::{BufRead, BufReader};
use std::path::Path;
use std::process::{Child, Command, Output, Stdio};

fn enter(args: &[&str]) -> eyre::Result<Output> {
    Ok(Command::new(env!("CARGO_BIN_EXE_enter")).args(args).output()?)
}

fn stderr(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr).into_owned()
}

#[test]
fn missing_binary_fails_before_anything_else() -> eyre::Result<()> {
    let output = enter(&["1", "/nonexistent/enter-test-binary"])?;

    assert_eq!(output.status.code(), Some(1));
    let stderr = stderr(&output);
    assert!(stderr.contains("executable unavailable"), "{stderr}");
    assert!(stderr.contains("open(O_PATH) failed"), "{stderr}");
    Ok(())
}

#[test]
fn missing_binary_with_default_target() -> eyre::Result<()> {
    let output = enter(&["/nonexistent/enter-test-binary"])?;

    assert_eq!(output.status.code(), Some(1));
    assert!(stderr(&output).contains("executable unavailable"));
    Ok(())
}

#[test]
fn missing_process_is_reported() -> eyre::Result<()> {
    // The binary itself is a file that certainly exists.
    let output = enter(&["99999999", env!("CARGO_BIN_EXE_enter")])?;

    assert_eq!(output.status.code(), Some(1));
    let stderr = stderr(&output);
    assert!(stderr.contains("target process unavailable"), "{stderr}");
    assert!(stderr.contains("pidfd_open(2) failed"), "{stderr}");
    Ok(())
}

#[test]
fn invalid_pid_is_a_usage_error() -> eyre::Result<()> {
    let output = enter(&["12abc", "/bin/true"])?;

    assert_eq!(output.status.code(), Some(1));
    assert!(stderr(&output).contains("invalid process id \"12abc\""));
    Ok(())
}

#[test]
fn invalid_namespace_set_is_a_usage_error() -> eyre::Result<()> {
    let output = enter(&["--namespaces", "net,time", "/bin/true"])?;

    assert_eq!(output.status.code(), Some(1));
    assert!(stderr(&output).contains("unknown namespace kind \"time\""));
    Ok(())
}

#[test]
fn help_exits_zero() -> eyre::Result<()> {
    let output = enter(&["--help"])?;

    assert_eq!(output.status.code(), Some(0));
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("--namespaces"), "{stdout}");
    Ok(())
}

#[test]
fn mistyped_option_is_reported_as_such() -> eyre::Result<()> {
    let output = enter(&["--namespace", "net", "1234", "/bin/sh"])?;

    assert_eq!(output.status.code(), Some(1));
    let stderr = stderr(&output);
    assert!(stderr.contains("unexpected argument"), "{stderr}");
    assert!(!stderr.contains("invalid process id"), "{stderr}");
    Ok(())
}

/// A process in its own user and mount namespaces, with a tmpfs over a directory. The tmpfs
/// holds a single `marker` file. Killed on drop.
struct Sandbox {
    child: Child,
}

impl Sandbox {
    /// Returns `None` when the host does not allow unprivileged user namespaces.
    fn spawn(dir: &Path) -> eyre::Result<Option<Sandbox>> {
        let script = r#"mount -t tmpfs tmpfs "$1" && : > "$1/marker" && echo ready && exec sleep 600"#;
        let spawned = Command::new("unshare")
            .args(["--user", "--map-root-user", "--mount", "sh", "-c", script, "sh"])
            .arg(dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn();
        let Ok(child) = spawned else {
            return Ok(None);
        };
        let mut sandbox = Sandbox { child };

        let stdout = sandbox
            .child
            .stdout
            .take()
            .ok_or_else(|| eyre::eyre!("sandbox stdout not captured"))?;
        let mut line = String::new();
        BufReader::new(stdout).read_line(&mut line)?;
        if line.trim() != "ready" {
            return Ok(None);
        }
        Ok(Some(sandbox))
    }

    fn pid(&self) -> String {
        self.child.id().to_string()
    }
}

impl Drop for Sandbox {
    fn drop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}

#[test]
fn runs_binary_missing_from_target_root() -> eyre::Result<()> {
    // Not under /tmp, which may be mounted noexec.
    let dir = tempfile::tempdir_in(env!("CARGO_TARGET_TMPDIR"))?;
    let shell = dir.path().join("host-only-sh");
    std::fs::copy("/bin/sh", &shell)?;

    let Some(sandbox) = Sandbox::spawn(dir.path())? else {
        eprintln!("skipping: unprivileged user namespaces are not available");
        return Ok(());
    };

    // Inside, `dir` is the sandbox's tmpfs: the marker is there and the shell is not.
    let pid = sandbox.pid();
    let output = Command::new(env!("CARGO_BIN_EXE_enter"))
        .args(["-n", "user,mnt", pid.as_str()])
        .arg(&shell)
        .args(["-c", r#"test -f "$1/marker" && ! test -e "$1/host-only-sh""#, "sh"])
        .arg(dir.path())
        .output()?;

    assert_eq!(output.status.code(), Some(0), "{}", stderr(&output));
    Ok(())
}

#[test]
fn exit_status_comes_from_the_binary() -> eyre::Result<()> {
    let dir = tempfile::tempdir_in(env!("CARGO_TARGET_TMPDIR"))?;
    let Some(sandbox) = Sandbox::spawn(dir.path())? else {
        eprintln!("skipping: unprivileged user namespaces are not available");
        return Ok(());
    };

    let pid = sandbox.pid();
    let output = enter(&["-n", "user,mnt", pid.as_str(), "/bin/true"])?;
    assert_eq!(output.status.code(), Some(0), "{}", stderr(&output));

    let output = enter(&["-n", "user,mnt", pid.as_str(), "/bin/false"])?;
    assert_eq!(output.status.code(), Some(1));
    assert!(output.stderr.is_empty(), "{}", stderr(&output));
    Ok(())
}
