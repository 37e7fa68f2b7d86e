//! Shell command execution for command-template adapters.

use std::process::Stdio;

use tracing::debug;

use vigil_core::{AdapterError, AdapterResult};

/// Substitute `{key}` placeholders. Unknown placeholders are left as-is.
pub fn render(template: &str, vars: &[(&str, &str)]) -> String {
    let mut out = template.to_string();
    for (key, value) in vars {
        out = out.replace(&format!("{{{key}}}"), value);
    }
    out
}

/// Run `command` through `sh -c` and return its trimmed stdout.
///
/// A non-zero exit becomes [`AdapterError::Command`]. The child is killed
/// if the returned future is dropped.
pub async fn run_command(command: &str) -> AdapterResult<String> {
    debug!(%command, "running adapter command");
    let output = tokio::process::Command::new("sh")
        .arg("-c")
        .arg(command)
        .stdin(Stdio::null())
        .kill_on_drop(true)
        .output()
        .await
        .map_err(|e| AdapterError::Other(anyhow::anyhow!("failed to spawn `{command}`: {e}")))?;

    if !output.status.success() {
        return Err(AdapterError::Command {
            command: command.to_string(),
            status: output.status.code().unwrap_or(-1),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        });
    }

    String::from_utf8(output.stdout)
        .map(|s| s.trim().to_string())
        .map_err(|e| AdapterError::InvalidOutput(format!("`{command}` wrote non-UTF-8 output: {e}")))
}
