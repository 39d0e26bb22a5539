//! Running helper programs.
//!
//! Two entry points wrap [`std::process::Command`] and translate OS and
//! exit-status failures into [`HelperError`]:
//!
//! - [`check_call`] lets the program's stdout/stderr pass straight through.
//! - [`check_output`] captures stdout and stderr through one shared pipe, so
//!   the returned text keeps the order the program wrote it in.
//!
//! Both honor [`CallOptions::retry_with_sudo`]: a permission-denied spawn or a
//! required-but-failed exit is retried exactly once with `sudo` prepended.

use std::ffi::OsString;
use std::io::{ErrorKind, Read};
use std::path::PathBuf;
use std::process::{Command, ExitStatus, Stdio};
use tracing::{debug, info};

use super::error::{HelperError, ENOENT};

const SUDO: &str = "sudo";

/// Options controlling a single helper invocation.
#[derive(Debug, Clone)]
pub struct CallOptions {
    /// Fail with [`HelperError::Failed`] on a non-zero exit.
    pub require_success: bool,
    /// Retry once under `sudo` on permission or exit failures.
    pub retry_with_sudo: bool,
    /// Working directory for the child process.
    pub current_dir: Option<PathBuf>,
    /// Environment overrides for the child process.
    pub env: Vec<(OsString, OsString)>,
}

impl Default for CallOptions {
    fn default() -> Self {
        Self {
            require_success: true,
            retry_with_sudo: false,
            current_dir: None,
            env: Vec::new(),
        }
    }
}

impl CallOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Don't treat a non-zero exit as an error.
    pub fn allow_failure(mut self) -> Self {
        self.require_success = false;
        self
    }

    pub fn retry_with_sudo(mut self) -> Self {
        self.retry_with_sudo = true;
        self
    }

    pub fn current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.current_dir = Some(dir.into());
        self
    }

    pub fn env(mut self, key: impl Into<OsString>, value: impl Into<OsString>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    /// Same options, without the sudo retry. Used for the one retry we allow.
    fn without_sudo_retry(&self) -> Self {
        Self {
            retry_with_sudo: false,
            ..self.clone()
        }
    }

    fn build_command(&self, args: &[String]) -> Command {
        let mut cmd = Command::new(&args[0]);
        cmd.args(&args[1..]);
        if let Some(dir) = &self.current_dir {
            cmd.current_dir(dir);
        }
        for (key, value) in &self.env {
            cmd.env(key, value);
        }
        cmd
    }
}

/// Runs a command, letting its output go to our stdout/stderr.
///
/// `args[0]` is the program to run.
///
/// # Errors
///
/// - [`HelperError::NotFound`] if the program does not exist.
/// - [`HelperError::Failed`] if it exits non-zero and `require_success` is set.
/// - [`HelperError::Io`] for any other spawn failure.
pub fn check_call<S: AsRef<str>>(args: &[S], opts: &CallOptions) -> Result<(), HelperError> {
    let args = to_owned_args(args)?;
    let cmd = args[0].clone();
    info!("Calling '{}'...", args.join(" "));

    let status = match opts.build_command(&args).status() {
        Ok(status) => status,
        Err(e) => {
            if opts.retry_with_sudo && e.kind() == ErrorKind::PermissionDenied {
                return check_call(&with_sudo(&args), &opts.without_sudo_retry());
            }
            return Err(spawn_error(&cmd, e));
        }
    };

    if !status.success() && opts.require_success {
        if opts.retry_with_sudo {
            return check_call(&with_sudo(&args), &opts.without_sudo_retry());
        }
        return Err(HelperError::Failed {
            name: cmd,
            code: exit_code(status),
            command: args.join(" "),
            output: None,
        });
    }

    info!("...done");
    debug!("{} exited with {}", cmd, status);
    Ok(())
}

/// Runs a command and returns its combined stdout and stderr.
///
/// stderr is redirected into the same pipe as stdout. The output is decoded
/// permissively; bytes that aren't valid UTF-8 are dropped. When a sudo retry
/// happens, the retried call's output is returned.
///
/// # Errors
///
/// Same as [`check_call`]; a [`HelperError::Failed`] also carries the output.
pub fn check_output<S: AsRef<str>>(args: &[S], opts: &CallOptions) -> Result<String, HelperError> {
    let args = to_owned_args(args)?;
    let cmd = args[0].clone();
    info!("Calling '{}' and capturing its output...", args.join(" "));

    let (status, combined) = match run_merged(opts.build_command(&args)) {
        Ok(result) => result,
        Err(e) => {
            if opts.retry_with_sudo && e.kind() == ErrorKind::PermissionDenied {
                return check_output(&with_sudo(&args), &opts.without_sudo_retry());
            }
            return Err(spawn_error(&cmd, e));
        }
    };
    let text = decode_lossy(&combined);

    if !status.success() && opts.require_success {
        if opts.retry_with_sudo {
            return check_output(&with_sudo(&args), &opts.without_sudo_retry());
        }
        return Err(HelperError::Failed {
            name: cmd,
            code: exit_code(status),
            command: args.join(" "),
            output: Some(text),
        });
    }

    info!("...done");
    debug!("{} output:\n{}", cmd, text);
    Ok(text)
}

/// Spawns `command` with stdout and stderr sharing one pipe and reads it to EOF.
fn run_merged(mut command: Command) -> std::io::Result<(ExitStatus, Vec<u8>)> {
    let (mut reader, writer) = std::io::pipe()?;
    command
        .stdin(Stdio::inherit())
        .stdout(writer.try_clone()?)
        .stderr(writer);
    let mut child = command.spawn()?;
    // The command still owns the write ends; EOF only arrives once they close.
    drop(command);

    let mut combined = Vec::new();
    let read = reader.read_to_end(&mut combined);
    let status = child.wait()?;
    read?;
    Ok((status, combined))
}

fn to_owned_args<S: AsRef<str>>(args: &[S]) -> Result<Vec<String>, HelperError> {
    if args.is_empty() {
        return Err(HelperError::EmptyCommand);
    }
    Ok(args.iter().map(|a| a.as_ref().to_string()).collect())
}

fn with_sudo(args: &[String]) -> Vec<String> {
    let mut sudo_args = Vec::with_capacity(args.len() + 1);
    sudo_args.push(SUDO.to_string());
    sudo_args.extend_from_slice(args);
    sudo_args
}

fn spawn_error(cmd: &str, e: std::io::Error) -> HelperError {
    if e.kind() == ErrorKind::NotFound {
        return HelperError::not_found(cmd, e.raw_os_error().unwrap_or(ENOENT));
    }
    HelperError::Io(e)
}

/// Exit code of a finished process; a signal death is reported as `-signal`.
fn exit_code(status: ExitStatus) -> i32 {
    if let Some(code) = status.code() {
        return code;
    }
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            return -signal;
        }
    }
    -1
}

fn decode_lossy(bytes: &[u8]) -> String {
    bytes.utf8_chunks().map(|chunk| chunk.valid()).collect()
}
