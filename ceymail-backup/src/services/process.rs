//! External process boundary.
//!
//! Every child process the service starts goes through a [`CommandRunner`].
//! Invocations carry their complete environment explicitly; nothing is
//! inherited from the daemon.

use async_trait::async_trait;
use nix::sys::signal::{killpg, Signal};
use nix::unistd::Pid;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::{Child, Command};

/// How long a timed-out child has to exit after SIGTERM before SIGKILL.
const TERM_GRACE: Duration = Duration::from_secs(5);

#[derive(Debug, Error)]
pub enum ProcessError {
    #[error("{label} could not be started: {source}")]
    Spawn {
        label: &'static str,
        #[source]
        source: std::io::Error,
    },

    #[error("{label} timed out after {}s", .after.as_secs())]
    TimedOut {
        label: &'static str,
        after: Duration,
    },

    #[error("{label} exited with code {}: {stderr}", exit_code(.code))]
    Failed {
        label: &'static str,
        code: Option<i32>,
        stderr: String,
    },

    #[error("{label} is not permitted to run elevated")]
    NotAllowed { label: &'static str },
}

fn exit_code(code: &Option<i32>) -> String {
    code.map_or_else(|| "none".to_string(), |c| c.to_string())
}

/// A single process to run.
#[derive(Clone)]
pub struct Invocation {
    pub label: &'static str,
    pub program: PathBuf,
    pub args: Vec<OsString>,
    pub env: Vec<(String, String)>,
    pub timeout: Duration,
    pub elevated: bool,
}

impl Invocation {
    pub fn new(label: &'static str, program: impl Into<PathBuf>) -> Self {
        Self {
            label,
            program: program.into(),
            args: Vec::new(),
            env: Vec::new(),
            timeout: Duration::from_secs(10),
            elevated: false,
        }
    }

    pub fn arg(mut self, arg: impl Into<OsString>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn env(mut self, key: &str, value: impl Into<String>) -> Self {
        self.env.push((key.to_string(), value.into()));
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn elevated(mut self) -> Self {
        self.elevated = true;
        self
    }

    pub fn env_value(&self, key: &str) -> Option<&str> {
        self.env
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }
}

impl std::fmt::Debug for Invocation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let env_keys: Vec<&str> = self.env.iter().map(|(k, _)| k.as_str()).collect();
        f.debug_struct("Invocation")
            .field("label", &self.label)
            .field("program", &self.program)
            .field("args", &self.args)
            .field("env", &env_keys)
            .field("timeout", &self.timeout)
            .field("elevated", &self.elevated)
            .finish()
    }
}

#[derive(Debug, Clone)]
pub struct ProcessOutput {
    pub code: Option<i32>,
    pub stdout: Vec<u8>,
    /// Trimmed, lossily decoded.
    pub stderr: String,
}

impl ProcessOutput {
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }

    pub fn ensure_success(self, label: &'static str) -> Result<Self, ProcessError> {
        if self.success() {
            Ok(self)
        } else {
            Err(ProcessError::Failed {
                label,
                code: self.code,
                stderr: self.stderr,
            })
        }
    }
}

#[async_trait]
pub trait CommandRunner: Send + Sync {
    async fn run(&self, invocation: Invocation) -> Result<ProcessOutput, ProcessError>;
}

/// Runs invocations on the host. Elevated invocations go through `sudo -n`
/// and must name an allow-listed program.
pub struct SystemRunner {
    sudo: PathBuf,
    allow_list: Vec<PathBuf>,
}

impl SystemRunner {
    pub fn new(sudo: impl Into<PathBuf>, allow_list: Vec<PathBuf>) -> Self {
        Self {
            sudo: sudo.into(),
            allow_list,
        }
    }

    fn is_allowed(&self, program: &Path) -> bool {
        self.allow_list.iter().any(|p| p == program)
    }

    fn build(&self, invocation: &Invocation) -> Result<Command, ProcessError> {
        let mut cmd = if invocation.elevated {
            if !self.is_allowed(&invocation.program) {
                return Err(ProcessError::NotAllowed {
                    label: invocation.label,
                });
            }
            let mut cmd = Command::new(&self.sudo);
            cmd.arg("-n").arg(&invocation.program);
            cmd
        } else {
            Command::new(&invocation.program)
        };

        cmd.args(&invocation.args)
            .env_clear()
            .envs(invocation.env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .process_group(0);
        Ok(cmd)
    }
}

#[async_trait]
impl CommandRunner for SystemRunner {
    async fn run(&self, invocation: Invocation) -> Result<ProcessOutput, ProcessError> {
        let mut cmd = self.build(&invocation)?;
        let label = invocation.label;

        tracing::debug!(label, elevated = invocation.elevated, "Running external command");

        let mut child = cmd
            .spawn()
            .map_err(|source| ProcessError::Spawn { label, source })?;
        let stdout = child.stdout.take();
        let stderr = child.stderr.take();

        let finished = tokio::time::timeout(invocation.timeout, async {
            tokio::join!(child.wait(), read_pipe(stdout), read_pipe(stderr))
        })
        .await;

        let (status, stdout, stderr) = match finished {
            Ok((status, stdout, stderr)) => (
                status.map_err(|source| ProcessError::Spawn { label, source })?,
                stdout,
                stderr,
            ),
            Err(_) => {
                terminate(&mut child, label).await;
                return Err(ProcessError::TimedOut {
                    label,
                    after: invocation.timeout,
                });
            }
        };

        Ok(ProcessOutput {
            code: status.code(),
            stdout,
            stderr: String::from_utf8_lossy(&stderr).trim().to_string(),
        })
    }
}

async fn read_pipe<R: AsyncRead + Unpin>(pipe: Option<R>) -> Vec<u8> {
    let mut buf = Vec::new();
    if let Some(mut pipe) = pipe {
        if let Err(e) = pipe.read_to_end(&mut buf).await {
            tracing::debug!(error = %e, "Failed to read child output");
        }
    }
    buf
}

/// SIGTERM to the child's process group, then SIGKILL after [`TERM_GRACE`].
///
/// For elevated runs the group leader is sudo, which relays SIGTERM to the
/// program it started. SIGKILL cannot be relayed, so a root program that
/// ignores SIGTERM may outlive the kill.
async fn terminate(child: &mut Child, label: &'static str) {
    let group = child
        .id()
        .and_then(|id| i32::try_from(id).ok())
        .map(Pid::from_raw);

    if let Some(group) = group {
        if let Err(errno) = killpg(group, Signal::SIGTERM) {
            tracing::warn!(label, %errno, "Failed to signal timed-out process");
        }
        if tokio::time::timeout(TERM_GRACE, child.wait()).await.is_ok() {
            return;
        }
        tracing::warn!(label, "Timed-out process ignored SIGTERM, killing");
        let _ = killpg(group, Signal::SIGKILL);
    }

    if let Err(e) = child.kill().await {
        tracing::debug!(label, error = %e, "Failed to kill timed-out process");
    }
}
