//! Child process execution

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::process::Stdio;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::debug;

use crate::errors::DeployError;

/// A program invocation with its arguments, working directory and environment.
///
/// Arguments are passed to the program directly, never through a shell, so
/// interpolated values cannot change the command structure.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ShellCommand {
    pub program: String,
    pub args: Vec<String>,
    pub cwd: Option<PathBuf>,
    pub env: BTreeMap<String, String>,
    /// Run as this user (through `runuser`) instead of the current one
    pub user: Option<String>,
}

impl ShellCommand {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            ..Default::default()
        }
    }

    /// `sh -c <script>`
    pub fn script(script: impl Into<String>) -> Self {
        Self::new("sh").arg("-c").arg(script)
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn path_arg(self, path: &Path) -> Self {
        self.arg(path.to_string_lossy())
    }

    pub fn current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cwd = Some(dir.into());
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    pub fn envs<'a>(mut self, vars: impl IntoIterator<Item = (&'a String, &'a String)>) -> Self {
        self.env
            .extend(vars.into_iter().map(|(k, v)| (k.clone(), v.clone())));
        self
    }

    pub fn as_user(mut self, user: impl Into<String>) -> Self {
        self.user = Some(user.into());
        self
    }

    /// Program followed by its arguments
    pub fn argv(&self) -> Vec<&str> {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect()
    }
}

/// Arguments whose following value is a credential
const SECRET_FLAGS: &[&str] = &["--password"];

/// Renders the command line for logs. Environment values and credential
/// arguments are left out.
impl fmt::Display for ShellCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let argv = self.argv();
        let line: Vec<String> = argv
            .iter()
            .enumerate()
            .map(|(i, arg)| {
                let secret = i > 0 && SECRET_FLAGS.contains(&argv[i - 1]);
                if secret {
                    "'[REDACTED]'".to_string()
                } else {
                    shell_quote(arg)
                }
            })
            .collect();
        f.write_str(&line.join(" "))
    }
}

/// Quote a value for inclusion in a POSIX shell command line
pub fn shell_quote(value: &str) -> String {
    let safe = !value.is_empty()
        && value
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "-_./:=@%+,".contains(c));
    if safe {
        value.to_string()
    } else {
        format!("'{}'", value.replace('\'', r"'\''"))
    }
}

/// Executes commands on the host
#[async_trait]
pub trait CommandRunner: Send + Sync {
    /// Run the command to completion; a non-zero exit status is an error
    async fn run(&self, command: &ShellCommand) -> Result<(), DeployError>;

    /// Run the command and capture its standard output
    async fn output(&self, command: &ShellCommand) -> Result<String, DeployError>;

    /// Whether the command exits successfully
    async fn succeeds(&self, command: &ShellCommand) -> bool {
        self.run(command).await.is_ok()
    }
}

/// Runs commands as child processes of the deployer
#[derive(Debug, Clone, Default)]
pub struct ProcessRunner;

/// Variables `runuser` resets from the target user's passwd entry
const RUNUSER_RESET_VARS: &[&str] = &["HOME", "SHELL", "USER", "LOGNAME", "PATH"];

impl ProcessRunner {
    fn build(command: &ShellCommand) -> Command {
        let mut cmd = match &command.user {
            Some(user) => {
                let mut cmd = Command::new("runuser");
                cmd.args(["-u", user.as_str(), "--"]);
                // Re-apply the overrides runuser would clobber
                let reset: Vec<String> = command
                    .env
                    .iter()
                    .filter(|(key, _)| RUNUSER_RESET_VARS.contains(&key.as_str()))
                    .map(|(key, value)| format!("{key}={value}"))
                    .collect();
                if !reset.is_empty() {
                    cmd.arg("env").args(reset);
                }
                cmd.arg(&command.program);
                cmd
            }
            None => Command::new(&command.program),
        };
        cmd.args(&command.args).envs(&command.env);
        if let Some(cwd) = &command.cwd {
            cmd.current_dir(cwd);
        }
        cmd
    }
}

#[async_trait]
impl CommandRunner for ProcessRunner {
    async fn run(&self, command: &ShellCommand) -> Result<(), DeployError> {
        debug!("Running: {}", command);
        let status = Self::build(command)
            .stdin(Stdio::null())
            .status()
            .await
            .map_err(|e| DeployError::CommandFailed {
                command: command.to_string(),
                status: e.to_string(),
            })?;

        if !status.success() {
            return Err(DeployError::CommandFailed {
                command: command.to_string(),
                status: status.to_string(),
            });
        }
        Ok(())
    }

    async fn output(&self, command: &ShellCommand) -> Result<String, DeployError> {
        debug!("Capturing: {}", command);
        let output = Self::build(command)
            .stdin(Stdio::null())
            .stderr(Stdio::inherit())
            .output()
            .await
            .map_err(|e| DeployError::CommandFailed {
                command: command.to_string(),
                status: e.to_string(),
            })?;

        if !output.status.success() {
            return Err(DeployError::CommandFailed {
                command: command.to_string(),
                status: output.status.to_string(),
            });
        }
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }
}

/// `chown [-R] <owner> <path>`
pub fn chown(owner: &str, path: &Path, recursive: bool) -> ShellCommand {
    let cmd = ShellCommand::new("chown");
    let cmd = if recursive { cmd.arg("-R") } else { cmd };
    cmd.arg(owner).path_arg(path)
}

/// Whether `program` resolves on the `PATH`
pub async fn has_program(runner: &dyn CommandRunner, program: &str) -> bool {
    runner
        .succeeds(&ShellCommand::script(format!(
            "command -v {} >/dev/null 2>&1",
            shell_quote(program)
        )))
        .await
}
