//! Child-process execution
//!
//! Spawns validated pipelines as direct children (no shell), wires
//! each stage's stdout to the next stage's stdin through an OS pipe,
//! enforces the wall-clock deadline and the stdout cap, and classifies
//! failures into the structured [`ExecutionResult`] kinds.

use std::os::fd::{AsRawFd, FromRawFd, OwnedFd};
use std::process::Stdio;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::{Child, Command};
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;

use crate::pipeline::Pipeline;
use crate::{ErrorKind, ExecStatus, ExecutionResult};

/// Grace period between the terminate and kill signals on timeout
const KILL_GRACE: Duration = Duration::from_millis(300);

/// One execution request
pub struct ExecRequest<'a> {
    pub pipeline: &'a Pipeline,
    /// Extra environment entries layered over the inherited one
    pub env_overlay: &'a [(String, String)],
    pub timeout: Duration,
    pub max_output_bytes: usize,
    /// stderr substrings identifying a credential problem
    pub auth_patterns: &'a [&'a str],
    /// Login command suggested alongside an auth error
    pub login_hint: &'a str,
    /// Optional cap on concurrently running children
    pub children_limit: Option<Arc<Semaphore>>,
}

/// Read up to `cap` bytes, then keep draining so the writer never
/// blocks on pipe back-pressure. The second field is true iff the
/// stream produced more than `cap` bytes.
async fn read_capped<R: AsyncRead + Unpin>(mut reader: R, cap: usize) -> (Vec<u8>, bool) {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 8192];
    let mut truncated = false;
    loop {
        match reader.read(&mut chunk).await {
            Ok(0) | Err(_) => break,
            Ok(n) => {
                if buf.len() < cap {
                    let take = n.min(cap - buf.len());
                    buf.extend_from_slice(&chunk[..take]);
                    if take < n {
                        truncated = true;
                    }
                } else {
                    truncated = true;
                }
            }
        }
    }
    (buf, truncated)
}

fn spawn_stage(
    argv: &[String],
    env_overlay: &[(String, String)],
    stdin: Stdio,
) -> std::io::Result<Child> {
    let mut cmd = Command::new(&argv[0]);
    cmd.args(&argv[1..])
        .stdin(stdin)
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    for (key, value) in env_overlay {
        cmd.env(key, value);
    }

    // Each child leads its own process group so the terminate/kill
    // signals also reach anything it forks.
    #[cfg(unix)]
    {
        // SAFETY: setpgid only changes the process group of the child.
        unsafe {
            cmd.pre_exec(|| {
                if libc::setpgid(0, 0) == -1 {
                    return Err(std::io::Error::last_os_error());
                }
                Ok(())
            });
        }
    }

    cmd.spawn()
}

#[cfg(unix)]
fn signal_group(pid: u32, signal: libc::c_int) {
    // Negative pid addresses the whole process group.
    unsafe {
        libc::kill(-(pid as libc::pid_t), signal);
    }
}

/// Terminate the whole pipeline: graceful signal, short grace, then
/// forcible kill, then reap everything.
async fn terminate_all(children: &mut [Child]) {
    if children.is_empty() {
        return;
    }
    #[cfg(unix)]
    for child in children.iter() {
        if let Some(pid) = child.id() {
            signal_group(pid, libc::SIGTERM);
        }
    }
    tokio::time::sleep(KILL_GRACE).await;
    for child in children.iter_mut() {
        let _ = child.start_kill();
        let _ = child.wait().await;
    }
}

fn is_auth_error(stderr: &str, patterns: &[&str]) -> bool {
    patterns.iter().any(|p| stderr.contains(p))
}

fn capture_stderr(child: &mut Child, cap: usize) -> JoinHandle<Vec<u8>> {
    let stderr = child.stderr.take();
    tokio::spawn(async move {
        match stderr {
            Some(stderr) => read_capped(stderr, cap).await.0,
            None => Vec::new(),
        }
    })
}

/// Execute a validated pipeline.
///
/// Expected failures (timeout, auth error, non-zero exit, spawn
/// failure) are returned structured; this function never panics on
/// child behavior.
pub async fn execute(req: ExecRequest<'_>) -> ExecutionResult {
    let started = Instant::now();
    let stage_count = req.pipeline.stages.len();

    let _permits = match &req.children_limit {
        Some(limit) => match limit.clone().try_acquire_many_owned(stage_count as u32) {
            Ok(permits) => Some(permits),
            Err(_) => {
                return ExecutionResult::error(
                    ErrorKind::ExecutionError,
                    "concurrent child process limit reached, try again later",
                    started.elapsed(),
                );
            }
        },
        None => None,
    };

    let mut children: Vec<Child> = Vec::with_capacity(stage_count);
    let mut stderr_tasks: Vec<JoinHandle<Vec<u8>>> = Vec::with_capacity(stage_count);

    for (index, stage) in req.pipeline.stages.iter().enumerate() {
        // Stage 0 gets no stdin; later stages read the previous
        // stage's stdout directly off the pipe.
        let stdin = if index == 0 {
            Stdio::null()
        } else {
            let prev = children[index - 1].stdout.take();
            match prev.and_then(|out| {
                let dup_fd = unsafe { libc::dup(out.as_raw_fd()) };
                if dup_fd < 0 {
                    None
                } else {
                    Some(unsafe { OwnedFd::from_raw_fd(dup_fd) })
                }
            }) {
                Some(fd) => Stdio::from(fd),
                None => {
                    terminate_all(&mut children).await;
                    return ExecutionResult::error(
                        ErrorKind::ExecutionError,
                        "failed to wire pipeline stages",
                        started.elapsed(),
                    );
                }
            }
        };

        match spawn_stage(&stage.argv, req.env_overlay, stdin) {
            Ok(mut child) => {
                stderr_tasks.push(capture_stderr(&mut child, req.max_output_bytes));
                children.push(child);
            }
            Err(err) => {
                terminate_all(&mut children).await;
                return ExecutionResult::error(
                    ErrorKind::ExecutionError,
                    format!("failed to spawn {:?}: {err}", stage.argv[0]),
                    started.elapsed(),
                );
            }
        }
    }

    // Drain the final stage's stdout concurrently with the waits so a
    // chatty child never deadlocks on a full pipe.
    let last_stdout = children
        .last_mut()
        .and_then(|child| child.stdout.take());
    let cap = req.max_output_bytes;
    let output_task: JoinHandle<(Vec<u8>, bool)> = tokio::spawn(async move {
        match last_stdout {
            Some(stdout) => read_capped(stdout, cap).await,
            None => (Vec::new(), false),
        }
    });

    let waited = tokio::time::timeout(req.timeout, async {
        let mut statuses = Vec::with_capacity(children.len());
        for child in children.iter_mut() {
            statuses.push(child.wait().await);
        }
        statuses
    })
    .await;

    let statuses = match waited {
        Ok(statuses) => statuses,
        Err(_) => {
            tracing::warn!(
                elapsed = ?started.elapsed(),
                "Pipeline exceeded its deadline, terminating"
            );
            terminate_all(&mut children).await;
            let _ = output_task.await;
            for task in stderr_tasks {
                let _ = task.await;
            }
            return ExecutionResult::error(
                ErrorKind::Timeout,
                format!(
                    "command timed out after {:.1}s",
                    started.elapsed().as_secs_f64()
                ),
                started.elapsed(),
            );
        }
    };

    let mut stderr_outputs = Vec::with_capacity(stderr_tasks.len());
    for task in stderr_tasks {
        stderr_outputs.push(String::from_utf8_lossy(&task.await.unwrap_or_default()).into_owned());
    }
    let (stdout_bytes, truncated) = output_task.await.unwrap_or_default();
    let elapsed = started.elapsed();

    // The earliest failing stage decides the outcome; a healthy tail
    // utility cannot mask a provider failure.
    for (index, status) in statuses.iter().enumerate() {
        let ok = status.as_ref().map(|s| s.success()).unwrap_or(false);
        if ok {
            continue;
        }
        let exit_code = status.as_ref().ok().and_then(|s| s.code());
        let stderr = stderr_outputs.get(index).cloned().unwrap_or_default();

        if is_auth_error(&stderr, req.auth_patterns) {
            return ExecutionResult {
                status: ExecStatus::Error,
                output: format!(
                    "Authentication error. Please run `{}` to authenticate.\n{}",
                    req.login_hint,
                    stderr.trim()
                ),
                structured: None,
                exit_code,
                error_kind: ErrorKind::AuthError,
                truncated: false,
                elapsed,
                warnings: Vec::new(),
            };
        }
        return ExecutionResult {
            status: ExecStatus::Error,
            output: if stderr.trim().is_empty() {
                "command failed with no error output".to_string()
            } else {
                stderr.trim_end().to_string()
            },
            structured: None,
            exit_code,
            error_kind: ErrorKind::ExecutionError,
            truncated: false,
            elapsed,
            warnings: Vec::new(),
        };
    }

    let exit_code = statuses
        .last()
        .and_then(|s| s.as_ref().ok())
        .and_then(|s| s.code())
        .unwrap_or(0);
    let mut output = String::from_utf8_lossy(&stdout_bytes).into_owned();

    // A truncated capture is never parsed as JSON.
    let structured = if truncated {
        None
    } else {
        serde_json::from_str::<serde_json::Value>(output.trim()).ok()
    };
    if let Some(value) = &structured {
        if let Ok(pretty) = serde_json::to_string_pretty(value) {
            output = pretty;
        }
    }

    let mut result = ExecutionResult::success(output, structured, exit_code, elapsed);
    result.truncated = truncated;
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline;

    fn request<'a>(pipeline: &'a Pipeline) -> ExecRequest<'a> {
        ExecRequest {
            pipeline,
            env_overlay: &[],
            timeout: Duration::from_secs(5),
            max_output_bytes: 1024 * 1024,
            auth_patterns: &[],
            login_hint: "login",
            children_limit: None,
        }
    }

    #[tokio::test]
    async fn runs_a_single_stage() {
        let pipeline = pipeline::parse("echo hello").unwrap();
        let result = execute(request(&pipeline)).await;
        assert!(result.is_success());
        assert_eq!(result.exit_code, Some(0));
        assert!(result.output.contains("hello"));
        assert!(!result.truncated);
    }

    #[tokio::test]
    async fn wires_a_three_stage_pipeline() {
        let pipeline =
            pipeline::parse(r"printf 'one\nRUNNING\nthree\n' | grep RUNNING | wc -l").unwrap();
        let result = execute(request(&pipeline)).await;
        assert!(result.is_success(), "pipeline failed: {}", result.output);
        assert_eq!(result.output.trim(), "1");
    }

    #[tokio::test]
    async fn enforces_the_deadline() {
        let pipeline = pipeline::parse("sleep 5").unwrap();
        let mut req = request(&pipeline);
        req.timeout = Duration::from_millis(200);
        let started = Instant::now();
        let result = execute(req).await;
        assert_eq!(result.error_kind, ErrorKind::Timeout);
        assert!(result.output.contains("timed out"));
        // Deadline plus grace, with headroom for a slow machine.
        assert!(started.elapsed() < Duration::from_secs(3));
    }

    #[tokio::test]
    async fn caps_and_drains_output() {
        let pipeline = pipeline::parse("seq 1 100000").unwrap();
        let mut req = request(&pipeline);
        req.max_output_bytes = 1000;
        let result = execute(req).await;
        assert!(result.is_success());
        assert!(result.truncated);
        assert!(result.output.len() <= 1000);
    }

    #[tokio::test]
    async fn exact_cap_is_not_truncated() {
        let pipeline = pipeline::parse("printf abcde").unwrap();
        let mut req = request(&pipeline);
        req.max_output_bytes = 5;
        let result = execute(req).await;
        assert!(result.is_success());
        assert_eq!(result.output, "abcde");
        assert!(!result.truncated);
    }

    #[tokio::test]
    async fn parses_json_stdout() {
        let pipeline = pipeline::parse(r#"printf '[{"name":"x"}]'"#).unwrap();
        let result = execute(request(&pipeline)).await;
        assert!(result.is_success());
        let structured = result.structured.expect("structured output");
        assert_eq!(structured[0]["name"], "x");
    }

    #[tokio::test]
    async fn classifies_auth_errors_from_stderr() {
        let pipeline = pipeline::parse("ls /nonexistent-cloudgate-path").unwrap();
        let mut req = request(&pipeline);
        req.auth_patterns = &["No such file"];
        req.login_hint = "provider login";
        let result = execute(req).await;
        assert_eq!(result.error_kind, ErrorKind::AuthError);
        assert!(result.output.contains("provider login"));
    }

    #[tokio::test]
    async fn nonzero_exit_is_an_execution_error() {
        let pipeline = pipeline::parse("ls /nonexistent-cloudgate-path").unwrap();
        let result = execute(request(&pipeline)).await;
        assert_eq!(result.error_kind, ErrorKind::ExecutionError);
        assert_eq!(result.status, ExecStatus::Error);
    }

    #[tokio::test]
    async fn missing_binary_is_an_execution_error() {
        let pipeline = pipeline::parse("cloudgate-no-such-binary-xyz").unwrap();
        let result = execute(request(&pipeline)).await;
        assert_eq!(result.error_kind, ErrorKind::ExecutionError);
        assert!(result.output.contains("failed to spawn"));
    }

    #[tokio::test]
    async fn provider_stage_failure_wins_over_healthy_tail() {
        let pipeline = pipeline::parse("ls /nonexistent-cloudgate-path | wc -l").unwrap();
        let result = execute(request(&pipeline)).await;
        // wc exits 0 on empty input; the earlier failure must surface.
        assert_eq!(result.error_kind, ErrorKind::ExecutionError);
    }

    #[tokio::test]
    async fn respects_children_limit() {
        let pipeline = pipeline::parse("echo hi | wc -c").unwrap();
        let mut req = request(&pipeline);
        req.children_limit = Some(Arc::new(Semaphore::new(1)));
        let result = execute(req).await;
        assert_eq!(result.error_kind, ErrorKind::ExecutionError);
        assert!(result.output.contains("limit"));
    }
}
