//! External tool invocation
//!
//! Every opaque tool the pipeline drives (profile merger, redactor, nm,
//! compressors, gsutil, git) goes through [`ToolRunner`], so tests can record
//! invocations instead of spawning processes.

use crate::error::{PipelineError, PipelineResult};
use std::fmt;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::time::Instant;
use tracing::debug;

/// A single external command
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolInvocation {
    /// Program name or path
    pub program: String,
    /// Arguments
    pub args: Vec<String>,
    /// Working directory
    pub cwd: Option<PathBuf>,
    /// File fed to standard input
    pub stdin: Option<PathBuf>,
    /// File receiving standard output (captured otherwise)
    pub stdout: Option<PathBuf>,
}

impl ToolInvocation {
    /// Create new invocation
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            cwd: None,
            stdin: None,
            stdout: None,
        }
    }

    /// Append one argument
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Append arguments
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Set working directory
    pub fn with_cwd(mut self, cwd: impl Into<PathBuf>) -> Self {
        self.cwd = Some(cwd.into());
        self
    }

    /// Read standard input from a file
    pub fn with_stdin(mut self, path: impl Into<PathBuf>) -> Self {
        self.stdin = Some(path.into());
        self
    }

    /// Write standard output to a file
    pub fn with_stdout(mut self, path: impl Into<PathBuf>) -> Self {
        self.stdout = Some(path.into());
        self
    }

    /// Program followed by its arguments
    pub fn argv(&self) -> Vec<&str> {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect()
    }
}

impl fmt::Display for ToolInvocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.argv().join(" "))?;
        if let Some(stdin) = &self.stdin {
            write!(f, " < {}", stdin.display())?;
        }
        if let Some(stdout) = &self.stdout {
            write!(f, " > {}", stdout.display())?;
        }
        Ok(())
    }
}

/// Result of a finished command
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ToolOutput {
    /// Exit code (1 when killed by a signal)
    pub exit_code: i32,
    /// Captured stdout; empty when redirected to a file
    pub stdout: String,
    /// Captured stderr
    pub stderr: String,
}

impl ToolOutput {
    /// Successful output with the given stdout
    pub fn ok(stdout: impl Into<String>) -> Self {
        Self {
            exit_code: 0,
            stdout: stdout.into(),
            stderr: String::new(),
        }
    }

    /// Check if the command succeeded
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// Runs external commands
pub trait ToolRunner: Send + Sync {
    /// Run to completion, reporting any exit code
    fn run(&self, invocation: &ToolInvocation) -> PipelineResult<ToolOutput>;

    /// Run and turn a non-zero exit into [`PipelineError::ToolFailed`]
    fn run_checked(&self, invocation: &ToolInvocation) -> PipelineResult<ToolOutput> {
        let output = self.run(invocation)?;
        if !output.success() {
            return Err(PipelineError::ToolFailed {
                command: invocation.to_string(),
                exit_code: output.exit_code,
                stderr: output.stderr.trim().to_string(),
            });
        }
        Ok(output)
    }
}

/// Spawns real processes
#[derive(Debug, Default, Clone, Copy)]
pub struct ProcessRunner;

impl ProcessRunner {
    /// Create new process runner
    pub fn new() -> Self {
        Self
    }
}

fn open_for(path: &Path, write: bool) -> PipelineResult<File> {
    let file = if write { File::create(path) } else { File::open(path) };
    file.map_err(|e| PipelineError::io(path, e))
}

impl ToolRunner for ProcessRunner {
    fn run(&self, invocation: &ToolInvocation) -> PipelineResult<ToolOutput> {
        debug!(command = %invocation, "running tool");
        let start = Instant::now();

        let mut command = Command::new(&invocation.program);
        command.args(&invocation.args);

        if let Some(cwd) = &invocation.cwd {
            command.current_dir(cwd);
        }

        match &invocation.stdin {
            Some(path) => command.stdin(Stdio::from(open_for(path, false)?)),
            None => command.stdin(Stdio::null()),
        };

        match &invocation.stdout {
            Some(path) => command.stdout(Stdio::from(open_for(path, true)?)),
            None => command.stdout(Stdio::piped()),
        };

        let output = command
            .stderr(Stdio::piped())
            .spawn()
            .and_then(|child| child.wait_with_output())
            .map_err(|error| PipelineError::ToolSpawn {
                command: invocation.to_string(),
                error,
            })?;

        let result = ToolOutput {
            exit_code: output.status.code().unwrap_or(1),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        };

        debug!(
            command = %invocation.program,
            exit_code = result.exit_code,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "tool finished"
        );

        Ok(result)
    }
}
