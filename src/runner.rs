//! Subprocess Execution Module
//!
//! A thin synchronous wrapper around `std::process` used by every typing
//! adapter. Captures exit code, stdout, and stderr as text; a non-zero exit
//! is reported in the returned output, never as an error; adapters decide
//! what a failure means for their field. The only hard errors are "could not
//! spawn" and "did not terminate within the timeout", both of which get a
//! bounded retry because genotyping tools occasionally fail transiently (or
//! hang outright on malformed input).

use std::collections::HashMap;
use std::io::Read;
use std::path::Path;
use std::process::{Command, Stdio};
use std::time::Duration;

use wait_timeout::ChildExt;

/// Default per-invocation timeout. Genotyping tools can hang on malformed
/// assemblies; an hour is far beyond any legitimate single-sample runtime.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(3600);

/// Attempts per invocation (initial try + retries) for spawn/timeout
/// failures. Exit-code and parse failures are never retried.
const RETRY_ATTEMPTS: usize = 2;

/// Captured outcome of a completed subprocess.
#[derive(Debug, Clone)]
pub struct CmdOutput {
    /// Exit code, or None if the process was terminated by a signal.
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl CmdOutput {
    /// True when the process exited with status 0.
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }
}

/// Failure to obtain any output at all from a command.
#[derive(Debug)]
pub enum CmdError {
    /// The executable could not be started (missing, not executable, ...).
    Spawn(String),
    /// The process did not terminate within the timeout and was killed.
    Timeout(Duration),
}

impl std::fmt::Display for CmdError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CmdError::Spawn(e) => write!(f, "failed to start: {}", e),
            CmdError::Timeout(d) => write!(f, "did not terminate within {}s", d.as_secs()),
        }
    }
}

impl std::error::Error for CmdError {}

/// Runs a command to completion, capturing stdout and stderr fully.
///
/// Output is drained on separate threads so a chatty child cannot fill a
/// pipe and deadlock against our `wait`. On timeout the child is killed and
/// reaped before returning.
pub fn run_cmd(
    program: &Path,
    args: &[&str],
    cwd: Option<&Path>,
    env: Option<&HashMap<String, String>>,
    timeout: Duration,
) -> Result<CmdOutput, CmdError> {
    let mut cmd = Command::new(program);
    cmd.args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());
    if let Some(dir) = cwd {
        cmd.current_dir(dir);
    }
    if let Some(vars) = env {
        cmd.envs(vars);
    }

    let mut child = cmd.spawn().map_err(|e| CmdError::Spawn(e.to_string()))?;

    let mut stdout_pipe = child.stdout.take().expect("stdout was piped");
    let mut stderr_pipe = child.stderr.take().expect("stderr was piped");
    let out_handle = std::thread::spawn(move || {
        let mut buf = Vec::new();
        let _ = stdout_pipe.read_to_end(&mut buf);
        buf
    });
    let err_handle = std::thread::spawn(move || {
        let mut buf = Vec::new();
        let _ = stderr_pipe.read_to_end(&mut buf);
        buf
    });

    let status = match child.wait_timeout(timeout) {
        Ok(Some(status)) => status,
        Ok(None) => {
            let _ = child.kill();
            let _ = child.wait();
            // Do not join the readers here: a grandchild that inherited the
            // pipes can hold them open after the child is dead, and joining
            // would block until it exits. The reader threads finish on their
            // own at pipe EOF; until then they are leaked deliberately.
            drop(out_handle);
            drop(err_handle);
            return Err(CmdError::Timeout(timeout));
        }
        Err(e) => {
            let _ = child.kill();
            let _ = child.wait();
            drop(out_handle);
            drop(err_handle);
            return Err(CmdError::Spawn(e.to_string()));
        }
    };

    let stdout = out_handle.join().unwrap_or_default();
    let stderr = err_handle.join().unwrap_or_default();

    Ok(CmdOutput {
        exit_code: status.code(),
        stdout: String::from_utf8_lossy(&stdout).into_owned(),
        stderr: String::from_utf8_lossy(&stderr).into_owned(),
    })
}

/// `run_cmd` with a bounded retry budget for spawn and timeout failures.
pub fn run_cmd_retry(
    program: &Path,
    args: &[&str],
    cwd: Option<&Path>,
    env: Option<&HashMap<String, String>>,
    timeout: Duration,
) -> Result<CmdOutput, CmdError> {
    let mut last_err = None;
    for attempt in 1..=RETRY_ATTEMPTS {
        match run_cmd(program, args, cwd, env, timeout) {
            Ok(out) => return Ok(out),
            Err(e) => {
                if attempt < RETRY_ATTEMPTS {
                    eprintln!(
                        "[runner] {} {} (attempt {}/{}), retrying",
                        program.display(),
                        e,
                        attempt,
                        RETRY_ATTEMPTS
                    );
                }
                last_err = Some(e);
            }
        }
    }
    Err(last_err.expect("at least one attempt was made"))
}

// ============================================================================
// Tests
// ============================================================================
