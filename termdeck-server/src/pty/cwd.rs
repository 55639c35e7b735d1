//! Working directory lookup for running processes

use tracing::trace;

/// Current working directory of a process, if it can be determined
#[cfg(target_os = "linux")]
pub async fn probe_process_cwd(pid: u32) -> Option<String> {
    let link = format!("/proc/{}/cwd", pid);
    match tokio::fs::read_link(&link).await {
        Ok(path) => Some(path.to_string_lossy().into_owned()),
        Err(e) => {
            trace!(pid, error = %e, "cwd link unreadable");
            None
        }
    }
}

/// Current working directory of a process, if it can be determined
#[cfg(not(target_os = "linux"))]
pub async fn probe_process_cwd(pid: u32) -> Option<String> {
    let output = tokio::process::Command::new("lsof")
        .args(["-a", "-d", "cwd", "-Fn", "-p"])
        .arg(pid.to_string())
        .output()
        .await
        .ok()?;

    if !output.status.success() {
        trace!(pid, status = ?output.status, "lsof failed");
        return None;
    }

    parse_lsof_cwd(&String::from_utf8_lossy(&output.stdout))
}

/// Extract the `n` (name) field from `lsof -Fn` output
#[cfg_attr(target_os = "linux", allow(dead_code))]
fn parse_lsof_cwd(output: &str) -> Option<String> {
    output
        .lines()
        .find_map(|line| line.strip_prefix('n'))
        .filter(|path| !path.is_empty())
        .map(str::to_string)
}
