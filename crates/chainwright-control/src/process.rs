//! External command execution.
//!
//! Every external tool (the bootstrap script, `ssh`, `scp`) runs through
//! [`run_command`], which bounds the call with a timeout and captures
//! combined output.

use std::process::Stdio;
use std::time::{Duration, Instant};

use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tokio::time::timeout;
use tracing::debug;

use crate::error::{DeployError, DeployResult};

/// Outcome of an external command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecOutput {
    /// Whether the command exited with status zero.
    pub success: bool,
    /// Captured stdout followed by stderr.
    pub output: String,
}

impl ExecOutput {
    /// A successful run with the given output.
    #[must_use]
    pub fn ok(output: impl Into<String>) -> Self {
        Self {
            success: true,
            output: output.into(),
        }
    }

    /// A failed run with the given output.
    #[must_use]
    pub fn failed(output: impl Into<String>) -> Self {
        Self {
            success: false,
            output: output.into(),
        }
    }
}

fn collect_lines<R>(stream: Option<R>) -> tokio::task::JoinHandle<Vec<String>>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut lines = Vec::new();
        if let Some(stream) = stream {
            let mut reader = BufReader::new(stream).lines();
            while let Ok(Some(line)) = reader.next_line().await {
                lines.push(line);
            }
        }
        lines
    })
}

/// Run a command to completion within `limit`.
///
/// A non-zero exit is reported through [`ExecOutput::success`]; only spawn
/// failures and timeouts are errors.
pub async fn run_command(
    mut cmd: Command,
    operation: &str,
    limit: Duration,
) -> DeployResult<ExecOutput> {
    cmd.stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let start = Instant::now();
    let mut child = cmd
        .spawn()
        .map_err(|e| DeployError::internal(format!("failed to spawn {operation}: {e}")))?;

    let stdout_task = collect_lines(child.stdout.take());
    let stderr_task = collect_lines(child.stderr.take());

    let status = match timeout(limit, child.wait()).await {
        Ok(Ok(status)) => status,
        Ok(Err(e)) => return Err(DeployError::Io(e)),
        Err(_) => {
            child.kill().await.ok();
            return Err(DeployError::Timeout {
                operation: operation.to_owned(),
                secs: limit.as_secs(),
            });
        }
    };

    let mut lines = stdout_task.await.unwrap_or_default();
    lines.extend(stderr_task.await.unwrap_or_default());
    let output = lines.join("\n");

    debug!(
        operation,
        exit_code = status.code().unwrap_or(-1),
        duration_ms = u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX),
        "command finished"
    );

    Ok(ExecOutput {
        success: status.success(),
        output,
    })
}
