use std::collections::HashMap;
use std::path::PathBuf;
use std::process::{Output, Stdio};
use std::time::Duration;

use tokio::process::Command;

use crate::errors::DependsError;

/// Time budget for a single external command unless overridden.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(120);

/// Builder for constructing and executing external processes.
///
/// Every execution is bounded by a timeout. The child is killed when the
/// timeout fires or when the returned future is dropped, so no process
/// outlives the call that spawned it.
#[derive(Debug, Clone)]
pub struct CommandBuilder {
    program: String,
    args: Vec<String>,
    env: HashMap<String, String>,
    cwd: Option<PathBuf>,
    timeout: Duration,
}

impl CommandBuilder {
    /// Create a new builder for the given program.
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            env: HashMap::new(),
            cwd: None,
            timeout: DEFAULT_TIMEOUT,
        }
    }

    /// Append a single argument.
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Append multiple arguments.
    pub fn args(mut self, args: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Set an environment variable for the child process.
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    /// Set the working directory for the child process.
    pub fn cwd(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cwd = Some(dir.into());
        self
    }

    /// Override the execution time budget.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Human-readable command line, used in logs and error messages.
    pub fn display(&self) -> String {
        let mut line = self.program.clone();
        for arg in &self.args {
            line.push(' ');
            line.push_str(arg);
        }
        line
    }

    /// Execute the command and return its raw output, whatever the exit status.
    pub async fn exec(&self) -> Result<Output, DependsError> {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        for (k, v) in &self.env {
            cmd.env(k, v);
        }
        if let Some(ref dir) = self.cwd {
            cmd.current_dir(dir);
        }

        tracing::debug!("Running `{}`", self.display());
        let child = cmd.spawn().map_err(|e| DependsError::Command {
            program: self.program.clone(),
            message: format!("failed to spawn: {e}"),
        })?;

        match tokio::time::timeout(self.timeout, child.wait_with_output()).await {
            Ok(output) => output.map_err(DependsError::from),
            Err(_) => Err(DependsError::Timeout {
                operation: self.display(),
                seconds: self.timeout.as_secs(),
            }),
        }
    }

    /// Execute the command and return its stdout, failing on a non-zero exit.
    pub async fn exec_stdout(&self) -> Result<String, DependsError> {
        let output = self.exec().await?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(DependsError::Command {
                program: self.program.clone(),
                message: format!("{} ({})", output.status, stderr.trim()),
            });
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}
