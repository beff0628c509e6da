//! Shell-based step execution on the host.

use chrono::{DateTime, Utc};
use forge_core::{Error, Result};
use std::collections::HashMap;
use std::path::Path;
use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info};

/// A single line of process output, streamed as it appears.
#[derive(Debug, Clone)]
pub struct OutputLine {
    pub stream: OutputStream,
    pub content: String,
    pub line_number: u32,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputStream {
    Stdout,
    Stderr,
}

/// Captured result of one command invocation.
#[derive(Debug, Clone)]
pub struct CommandOutput {
    pub exit_code: i32,
    pub success: bool,
    pub duration_ms: u64,
    pub stdout: String,
    pub stderr: String,
}

fn spawn_reader<R>(
    reader: R,
    stream: OutputStream,
    tx: Option<mpsc::Sender<OutputLine>>,
) -> JoinHandle<String>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut lines = BufReader::new(reader).lines();
        let mut captured = String::new();
        let mut line_num = 0u32;

        while let Ok(Some(line)) = lines.next_line().await {
            line_num += 1;
            captured.push_str(&line);
            captured.push('\n');
            if let Some(tx) = &tx {
                let output = OutputLine {
                    stream,
                    content: line,
                    line_number: line_num,
                    timestamp: Utc::now(),
                };
                // Receiver may be gone; keep capturing for the result.
                let _ = tx.send(output).await;
            }
        }
        captured
    })
}

/// Run a command through `sh -c`, streaming output lines and capturing the
/// full transcript. The core observes only the exit code and output, never
/// the command's internals.
pub async fn run_command(
    command: &str,
    workspace: &Path,
    env: &HashMap<String, String>,
    output_tx: Option<mpsc::Sender<OutputLine>>,
) -> Result<CommandOutput> {
    let start = std::time::Instant::now();

    info!(command = %command, workspace = %workspace.display(), "Executing shell command");

    let mut child = Command::new("sh")
        .arg("-c")
        .arg(command)
        .current_dir(workspace)
        .envs(env)
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        // If the run is cancelled and this future is dropped, the child
        // must not outlive it.
        .kill_on_drop(true)
        .spawn()
        .map_err(|e| Error::Internal(format!("Failed to spawn process: {e}")))?;

    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| Error::Internal("child stdout unavailable".to_string()))?;
    let stderr = child
        .stderr
        .take()
        .ok_or_else(|| Error::Internal("child stderr unavailable".to_string()))?;

    let stdout_handle = spawn_reader(stdout, OutputStream::Stdout, output_tx.clone());
    let stderr_handle = spawn_reader(stderr, OutputStream::Stderr, output_tx);

    let status = child
        .wait()
        .await
        .map_err(|e| Error::Internal(format!("Failed to wait for process: {e}")))?;

    let stdout = stdout_handle.await.unwrap_or_default();
    let stderr = stderr_handle.await.unwrap_or_default();

    let exit_code = status.code().unwrap_or(-1);
    let duration_ms = start.elapsed().as_millis() as u64;

    debug!(exit_code, duration_ms, "Command completed");

    Ok(CommandOutput {
        exit_code,
        success: exit_code == 0,
        duration_ms,
        stdout,
        stderr,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_run_command_success() {
        let (tx, mut rx) = mpsc::channel(16);
        let result = run_command("echo hello", Path::new("/tmp"), &HashMap::new(), Some(tx))
            .await
            .unwrap();

        assert!(result.success);
        assert_eq!(result.exit_code, 0);
        assert_eq!(result.stdout, "hello\n");

        let line = rx.recv().await.unwrap();
        assert_eq!(line.content, "hello");
        assert_eq!(line.stream, OutputStream::Stdout);
    }

    #[tokio::test]
    async fn test_run_command_failure() {
        let result = run_command("echo oops >&2; exit 3", Path::new("/tmp"), &HashMap::new(), None)
            .await
            .unwrap();

        assert!(!result.success);
        assert_eq!(result.exit_code, 3);
        assert_eq!(result.stderr, "oops\n");
    }

    #[tokio::test]
    async fn test_run_command_env() {
        let mut env = HashMap::new();
        env.insert("FORGE_REF".to_string(), "refs/heads/main".to_string());

        let result = run_command("echo $FORGE_REF", Path::new("/tmp"), &env, None)
            .await
            .unwrap();
        assert_eq!(result.stdout, "refs/heads/main\n");
    }
}
