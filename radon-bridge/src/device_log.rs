//! Device system-log capture: spawn `simctl … log stream` against the
//! discovered device, buffer its output for a bounded window, then kill
//! the process and return whatever was collected. This is a best-effort
//! snapshot; losing lines at termination is expected.

use std::process::Stdio;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tokio::sync::mpsc;
use tokio::time::sleep;
use tracing::debug;

use crate::detector::DeviceHandle;
use crate::errors::BridgeError;
use crate::metro::LogChunk;
use crate::validators::{validate_device_id, validate_path};

pub const DEFAULT_DEVICE_LOG_WINDOW: Duration = Duration::from_secs(5);

/// Stream the device's system log for `window`, optionally pre-filtered
/// server-side. The predicate filter is an optimization only; callers
/// still window and filter the result independently.
pub async fn stream_device_logs(
    device: &DeviceHandle,
    window: Duration,
    filter: Option<&str>,
) -> Result<LogChunk, BridgeError> {
    validate_device_id(&device.device_id)?;
    validate_path(&device.device_set.to_string_lossy())?;

    let mut cmd = Command::new("xcrun");
    cmd.arg("simctl")
        .arg("--set")
        .arg(&device.device_set)
        .arg("spawn")
        .arg(&device.device_id)
        .args(["log", "stream", "--level", "debug", "--style", "compact"]);

    if let Some(filter) = filter.filter(|f| !f.is_empty()) {
        // Arguments go through an exec vector, never a shell; only the
        // predicate's own quoting needs sanitizing.
        let sanitized: String = filter.chars().filter(|c| *c != '"' && *c != '\\').collect();
        cmd.arg("--predicate")
            .arg(format!("eventMessage CONTAINS \"{sanitized}\""));
    }

    collect_bounded(cmd, window).await
}

/// Run a streaming command, buffering stdout and stderr line-by-line until
/// the window elapses, then terminate it. Diagnostic-channel lines are
/// tagged so they remain distinguishable in the capture.
pub(crate) async fn collect_bounded(
    mut cmd: Command,
    window: Duration,
) -> Result<LogChunk, BridgeError> {
    cmd.stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .stdin(Stdio::null())
        .kill_on_drop(true);

    let mut child = cmd
        .spawn()
        .map_err(|e| BridgeError::CommandFailed(format!("failed to spawn log stream: {e}")))?;

    let stdout = child.stdout.take();
    let stderr = child.stderr.take();
    let (tx, mut rx) = mpsc::unbounded_channel::<String>();

    if let Some(stdout) = stdout {
        let tx = tx.clone();
        tokio::spawn(async move {
            let mut lines = BufReader::new(stdout).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                if tx.send(line).is_err() {
                    break;
                }
            }
        });
    }
    if let Some(stderr) = stderr {
        let tx = tx.clone();
        tokio::spawn(async move {
            let mut lines = BufReader::new(stderr).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                if tx.send(format!("[stderr] {line}")).is_err() {
                    break;
                }
            }
        });
    }
    drop(tx);

    let deadline = sleep(window);
    tokio::pin!(deadline);

    let mut buffered: Vec<String> = Vec::new();
    loop {
        tokio::select! {
            _ = &mut deadline => break,
            line = rx.recv() => match line {
                Some(line) => buffered.push(line),
                None => break, // both channels closed, process exited early
            },
        }
    }

    let _ = child.start_kill();
    let _ = child.wait().await;
    debug!(lines = buffered.len(), "device log collection window closed");

    Ok(LogChunk::from_lines(buffered))
}
