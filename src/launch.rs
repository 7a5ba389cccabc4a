//! Spawn configuration for supervised subprocesses.

use std::ffi::OsString;
use std::path::PathBuf;
use std::process::{Command, Stdio};

/// Reusable spawn configuration, kept separate from the argument vector.
///
/// The same spec can back several registered launches. Configuration is
/// limited to what a supervised worker needs: a working directory,
/// environment adjustments, and the option to silence its stdio.
#[derive(Debug, Clone, Default)]
pub struct LaunchSpec {
    current_dir: Option<PathBuf>,
    envs: Vec<(OsString, OsString)>,
    clear_env: bool,
    silence_stdout: bool,
    silence_stderr: bool,
}

impl LaunchSpec {
    pub fn new() -> Self {
        Self::default()
    }

    /// Working directory for the spawned process.
    pub fn current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.current_dir = Some(dir.into());
        self
    }

    /// Add or override an environment variable.
    pub fn env(mut self, key: impl Into<OsString>, value: impl Into<OsString>) -> Self {
        self.envs.push((key.into(), value.into()));
        self
    }

    /// Start from an empty environment instead of inheriting.
    pub fn clear_env(mut self) -> Self {
        self.clear_env = true;
        self
    }

    /// Send the child's stdout to the null device.
    pub fn silence_stdout(mut self) -> Self {
        self.silence_stdout = true;
        self
    }

    /// Send the child's stderr to the null device.
    pub fn silence_stderr(mut self) -> Self {
        self.silence_stderr = true;
        self
    }

    /// Build the `Command` for one argument vector, `argv[0]` being the
    /// program. `None` if the vector is empty: there is nothing to run.
    pub(crate) fn command(&self, argv: &[OsString]) -> Option<Command> {
        let (program, args) = argv.split_first()?;

        let mut command = Command::new(program);
        command.args(args);
        if self.clear_env {
            command.env_clear();
        }
        command.envs(self.envs.iter().map(|(k, v)| (k.as_os_str(), v.as_os_str())));
        if let Some(dir) = &self.current_dir {
            command.current_dir(dir);
        }
        if self.silence_stdout {
            command.stdout(Stdio::null());
        }
        if self.silence_stderr {
            command.stderr(Stdio::null());
        }
        Some(command)
    }
}
