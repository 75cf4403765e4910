//! External process execution.
//!
//! Every compiler, linker, probe, and dependency build system call goes
//! through [`run`], which captures output verbatim and kills the child when
//! the timeout elapses.

use std::collections::BTreeMap;
use std::ffi::{OsStr, OsString};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use thiserror::Error;
use tokio::process::Command;
use tracing::debug;

#[derive(Debug, Error)]
pub enum ProcessError {
  #[error("failed to start '{program}': {source}")]
  Spawn {
    program: String,
    #[source]
    source: std::io::Error,
  },

  #[error("'{program}' timed out after {}s and was killed", .timeout.as_secs())]
  TimedOut { program: String, timeout: Duration },

  #[error("failed to collect output of '{program}': {source}")]
  Wait {
    program: String,
    #[source]
    source: std::io::Error,
  },
}

/// A fully described external command.
#[derive(Debug, Clone)]
pub struct Invocation {
  pub program: PathBuf,
  pub args: Vec<OsString>,
  pub cwd: Option<PathBuf>,
  pub env: BTreeMap<String, String>,
  pub timeout: Duration,
}

impl Invocation {
  pub fn new(program: impl Into<PathBuf>, timeout: Duration) -> Self {
    Self {
      program: program.into(),
      args: Vec::new(),
      cwd: None,
      env: BTreeMap::new(),
      timeout,
    }
  }

  pub fn arg(mut self, arg: impl AsRef<OsStr>) -> Self {
    self.args.push(arg.as_ref().to_os_string());
    self
  }

  pub fn args<I, S>(mut self, args: I) -> Self
  where
    I: IntoIterator<Item = S>,
    S: AsRef<OsStr>,
  {
    self.args.extend(args.into_iter().map(|a| a.as_ref().to_os_string()));
    self
  }

  pub fn current_dir(mut self, dir: impl AsRef<Path>) -> Self {
    self.cwd = Some(dir.as_ref().to_path_buf());
    self
  }

  pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
    self.env.insert(key.into(), value.into());
    self
  }

  /// Human-readable command line, used in logs and error messages.
  pub fn command_line(&self) -> String {
    let mut line = self.program.display().to_string();
    for arg in &self.args {
      line.push(' ');
      line.push_str(&arg.to_string_lossy());
    }
    line
  }
}

/// Captured result of a finished process.
#[derive(Debug, Clone)]
pub struct ProcessOutput {
  pub code: Option<i32>,
  pub stdout: String,
  pub stderr: String,
}

impl ProcessOutput {
  pub fn success(&self) -> bool {
    self.code == Some(0)
  }

  /// stderr followed by stdout, as the tool printed them.
  pub fn diagnostics(&self) -> String {
    match (self.stderr.trim().is_empty(), self.stdout.trim().is_empty()) {
      (false, false) => format!("{}\n{}", self.stderr.trim_end(), self.stdout.trim_end()),
      (false, true) => self.stderr.trim_end().to_string(),
      (true, false) => self.stdout.trim_end().to_string(),
      (true, true) => String::new(),
    }
  }
}

/// Run an invocation to completion.
///
/// A non-zero exit is not an error here; callers decide what a failure means
/// for their step.
pub async fn run(invocation: &Invocation) -> Result<ProcessOutput, ProcessError> {
  let program = invocation.program.display().to_string();
  debug!(cmd = %invocation.command_line(), cwd = ?invocation.cwd, "spawning process");

  let mut command = Command::new(&invocation.program);
  command
    .args(&invocation.args)
    .envs(&invocation.env)
    .stdin(Stdio::null())
    .stdout(Stdio::piped())
    .stderr(Stdio::piped())
    .kill_on_drop(true);
  if let Some(cwd) = &invocation.cwd {
    command.current_dir(cwd);
  }

  let child = command.spawn().map_err(|source| ProcessError::Spawn {
    program: program.clone(),
    source,
  })?;

  let output = match tokio::time::timeout(invocation.timeout, child.wait_with_output()).await {
    Ok(result) => result.map_err(|source| ProcessError::Wait {
      program: program.clone(),
      source,
    })?,
    Err(_) => {
      return Err(ProcessError::TimedOut {
        program,
        timeout: invocation.timeout,
      });
    }
  };

  let output = ProcessOutput {
    code: output.status.code(),
    stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
    stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
  };

  if !output.success() {
    debug!(program = %program, code = ?output.code, stderr = %output.stderr, "process failed");
  }

  Ok(output)
}
