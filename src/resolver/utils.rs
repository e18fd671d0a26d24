// Process supervision helpers shared by invokers

use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use tokio::io::AsyncReadExt;
use tokio::process::Command as TokioCommand;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::errors::InvokeError;

/// Captured output of a finished child process
#[derive(Debug, Clone, Default)]
pub struct ProcessOutput {
    /// `None` when the process was terminated by a signal
    pub exit_status: Option<i32>,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
}

/// Run a command to completion with a hard timeout.
///
/// The child is killed on timeout, on cancellation, and when the returned future
/// is dropped. A non-zero exit is returned as output, not as an error.
pub async fn run_output_with_timeout(
    program: &str,
    args: &[String],
    env: &[(&str, &Path)],
    limit: Duration,
    cancel: &CancellationToken,
) -> Result<ProcessOutput, InvokeError> {
    let launch_error = |reason: String| InvokeError::Launch {
        program: program.to_string(),
        reason,
    };

    let mut command = TokioCommand::new(program);
    command
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    for (key, value) in env {
        command.env(key, value);
    }

    let mut child = command.spawn().map_err(|e| launch_error(e.to_string()))?;

    let mut stdout_pipe = child
        .stdout
        .take()
        .ok_or_else(|| launch_error("failed to capture stdout".to_string()))?;
    let mut stderr_pipe = child
        .stderr
        .take()
        .ok_or_else(|| launch_error("failed to capture stderr".to_string()))?;

    let stdout_task = tokio::spawn(async move {
        let mut buf = Vec::new();
        let _ = stdout_pipe.read_to_end(&mut buf).await;
        buf
    });
    let stderr_task = tokio::spawn(async move {
        let mut buf = Vec::new();
        let _ = stderr_pipe.read_to_end(&mut buf).await;
        buf
    });

    let waited = tokio::select! {
        biased;
        _ = cancel.cancelled() => None,
        res = timeout(limit, child.wait()) => Some(res),
    };

    match waited {
        Some(Ok(Ok(status))) => {
            let stdout = stdout_task.await.unwrap_or_default();
            let stderr = stderr_task.await.unwrap_or_default();
            Ok(ProcessOutput {
                exit_status: status.code(),
                stdout,
                stderr,
            })
        }
        Some(Ok(Err(e))) => {
            stdout_task.abort();
            stderr_task.abort();
            Err(launch_error(format!("failed to wait: {}", e)))
        }
        Some(Err(_)) => {
            let _ = child.kill().await;
            stdout_task.abort();
            stderr_task.abort();
            debug!(program, timeout_ms = limit.as_millis() as u64, "Killed after timeout");
            Err(InvokeError::Timeout(limit))
        }
        None => {
            let _ = child.kill().await;
            stdout_task.abort();
            stderr_task.abort();
            debug!(program, "Killed after cancellation");
            Err(InvokeError::Cancelled)
        }
    }
}
