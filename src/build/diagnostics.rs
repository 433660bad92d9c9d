use std::path::Path;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tokio::io::AsyncReadExt;
use tokio::process::Command;

/// Characters of stdout/stderr kept per command.
pub const OUTPUT_TAIL_CHARS: usize = 4000;
/// Hard cap on bytes read per stream before the tail is taken.
pub const MAX_OUTPUT_BYTES: usize = 1024 * 1024;

pub const PYTEST_TIMEOUT: Duration = Duration::from_secs(240);
pub const FLAKE8_TIMEOUT: Duration = Duration::from_secs(120);

/// Result of one diagnostic command. Spawn failures and timeouts are
/// reported here, never raised.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandOutcome {
    pub name: String,
    pub command: String,
    /// Exit code; `None` when the process was killed or never started.
    pub code: Option<i32>,
    pub timed_out: bool,
    pub stdout: String,
    pub stderr: String,
    pub duration_ms: u64,
}

impl CommandOutcome {
    pub fn passed(&self) -> bool {
        self.code == Some(0)
    }
}

/// `pytest -q` then `flake8`, both inside the run directory.
pub async fn run_diagnostics(dir: &Path) -> Vec<CommandOutcome> {
    vec![
        run_command("pytest", "pytest", &["-q"], dir, PYTEST_TIMEOUT).await,
        run_command("flake8", "flake8", &[], dir, FLAKE8_TIMEOUT).await,
    ]
}

/// Run `program args..` in `dir` with no shell. On timeout the whole process
/// group is killed.
pub async fn run_command(
    name: &str,
    program: &str,
    args: &[&str],
    dir: &Path,
    timeout: Duration,
) -> CommandOutcome {
    let start = Instant::now();
    let command = std::iter::once(program)
        .chain(args.iter().copied())
        .collect::<Vec<_>>()
        .join(" ");
    let mut outcome = CommandOutcome {
        name: name.to_string(),
        command,
        code: None,
        timed_out: false,
        stdout: String::new(),
        stderr: String::new(),
        duration_ms: 0,
    };

    let mut cmd = Command::new(program);
    cmd.args(args)
        .current_dir(dir)
        .stdin(std::process::Stdio::null())
        .stdout(std::process::Stdio::piped())
        .stderr(std::process::Stdio::piped())
        .process_group(0)
        .kill_on_drop(true);

    let mut child = match cmd.spawn() {
        Ok(c) => c,
        Err(e) => {
            tracing::warn!(program, "diagnostic command failed to start: {e}");
            outcome.stderr = format!("failed to start {program}: {e}");
            return outcome;
        }
    };
    let child_pid = child.id();

    let (Some(stdout_pipe), Some(stderr_pipe)) = (child.stdout.take(), child.stderr.take()) else {
        outcome.stderr = "stdio pipes unavailable".to_string();
        return outcome;
    };

    let run = async {
        let stdout = tokio::spawn(read_capped(stdout_pipe));
        let stderr = tokio::spawn(read_capped(stderr_pipe));
        let status = child.wait().await?;
        let stdout = stdout.await.unwrap_or_default();
        let stderr = stderr.await.unwrap_or_default();
        Ok::<_, std::io::Error>((status, stdout, stderr))
    };

    match tokio::time::timeout(timeout, run).await {
        Ok(Ok((status, stdout, stderr))) => {
            outcome.code = status.code();
            outcome.stdout = tail(&stdout, OUTPUT_TAIL_CHARS);
            outcome.stderr = tail(&stderr, OUTPUT_TAIL_CHARS);
        }
        Ok(Err(e)) => {
            outcome.stderr = format!("failed to wait for {program}: {e}");
        }
        Err(_) => {
            if let Some(pid) = child_pid {
                unsafe {
                    libc::kill(-(pid as i32), libc::SIGKILL);
                }
            }
            outcome.timed_out = true;
            outcome.stderr = "timeout".to_string();
        }
    }

    outcome.duration_ms = start.elapsed().as_millis() as u64;
    tracing::info!(
        name,
        code = ?outcome.code,
        timed_out = outcome.timed_out,
        duration_ms = outcome.duration_ms,
        "diagnostic command finished"
    );
    outcome
}

/// Keep the first `MAX_OUTPUT_BYTES`, then drain the rest so the child never
/// stalls on a full pipe.
async fn read_capped(mut pipe: impl tokio::io::AsyncRead + Unpin) -> String {
    let mut buf = Vec::with_capacity(16 * 1024);
    if let Err(e) = (&mut pipe)
        .take(MAX_OUTPUT_BYTES as u64)
        .read_to_end(&mut buf)
        .await
    {
        tracing::warn!("diagnostic pipe read error: {e}");
    } else if let Err(e) = tokio::io::copy(&mut pipe, &mut tokio::io::sink()).await {
        tracing::warn!("diagnostic pipe drain error: {e}");
    }
    String::from_utf8_lossy(&buf).into_owned()
}

/// Last `max` characters of `s`.
pub fn tail(s: &str, max: usize) -> String {
    let count = s.chars().count();
    if count <= max {
        return s.to_string();
    }
    s.chars().skip(count - max).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tail_keeps_last_chars() {
        assert_eq!(tail("abcdef", 3), "def");
        assert_eq!(tail("ab", 3), "ab");
        assert_eq!(tail("ééé", 2), "éé");
    }

    #[tokio::test]
    async fn missing_program_is_reported_not_raised() {
        let tmp = tempfile::tempdir().unwrap();
        let out = run_command(
            "nope",
            "definitely-not-a-real-binary-4b1d",
            &[],
            tmp.path(),
            Duration::from_secs(5),
        )
        .await;
        assert_eq!(out.code, None);
        assert!(!out.passed());
        assert!(out.stderr.contains("failed to start"));
    }

    #[tokio::test]
    async fn captures_exit_code_and_output() {
        let tmp = tempfile::tempdir().unwrap();
        let out = run_command(
            "sh",
            "sh",
            &["-c", "echo hello; exit 3"],
            tmp.path(),
            Duration::from_secs(10),
        )
        .await;
        assert_eq!(out.code, Some(3));
        assert_eq!(out.stdout.trim(), "hello");
        assert!(!out.timed_out);
    }

    #[tokio::test]
    async fn output_past_the_cap_is_drained() {
        let tmp = tempfile::tempdir().unwrap();
        let out = run_command(
            "chatty",
            "sh",
            &["-c", "yes x | head -c 3000000; echo done >&2"],
            tmp.path(),
            Duration::from_secs(20),
        )
        .await;
        assert!(!out.timed_out);
        assert_eq!(out.code, Some(0));
        assert_eq!(out.stdout.chars().count(), OUTPUT_TAIL_CHARS);
        assert_eq!(out.stderr.trim(), "done");
    }

    #[tokio::test]
    async fn timeout_kills_process_group() {
        let tmp = tempfile::tempdir().unwrap();
        let out = run_command(
            "sleep",
            "sh",
            &["-c", "sleep 30"],
            tmp.path(),
            Duration::from_millis(200),
        )
        .await;
        assert!(out.timed_out);
        assert_eq!(out.code, None);
        assert!(out.duration_ms < 10_000);
    }
}
