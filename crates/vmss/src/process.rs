//! Helpers for shelling out to `kubectl` and `az`.

use std::ffi::OsStr;
use std::process::{ExitStatus, Stdio};

use tokio::process::Command;
use tracing::debug;

/// Captured output of a finished tool invocation.
#[derive(Debug)]
pub(crate) struct ToolOutput {
    pub status: ExitStatus,
    pub stdout: String,
    pub stderr: String,
}

impl ToolOutput {
    pub fn success(&self) -> bool {
        self.status.success()
    }

    /// Exit status plus everything the tool printed, for error messages.
    pub fn diagnostic(&self) -> String {
        let mut text = format!("{}", self.status);
        for stream in [self.stderr.trim(), self.stdout.trim()] {
            if !stream.is_empty() {
                text.push_str("\nOutput: ");
                text.push_str(stream);
            }
        }
        text
    }
}

/// Run `program` with `args` and capture its output.
///
/// The child is killed if the returned future is dropped, which is how
/// cancellation releases an in-flight call.
pub(crate) async fn run_tool<I, S>(program: &str, args: I) -> std::io::Result<ToolOutput>
where
    I: IntoIterator<Item = S>,
    S: AsRef<OsStr>,
{
    let mut cmd = Command::new(program);
    cmd.args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    debug!(program = %program, "Spawning tool");
    let output = cmd.output().await?;
    debug!(program = %program, status = %output.status, "Tool exited");

    Ok(ToolOutput {
        status: output.status,
        stdout: String::from_utf8_lossy(&output.stdout).to_string(),
        stderr: String::from_utf8_lossy(&output.stderr).to_string(),
    })
}
