//! Runner (§2.8, §4.5): language-agnostic child-process driver. Prepares a
//! scratch directory, writes the source, compiles if required, runs under a
//! wall-clock timeout and output-buffer cap, and classifies the outcome.
//!
//! Spawn/drain pattern grounded in `tokio::process::Command` +
//! `tokio::select!` over concurrent stdout/stderr `BufReader::lines()`, the
//! same shape a real subprocess-driving executor uses to avoid deadlocking on
//! a full pipe while still enforcing a timeout.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::{Duration, Instant};

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, Command};
use uuid::Uuid;

use crate::catalogue::RuntimeDescriptor;
use crate::store::durable::{ExecutionResult, ExecutionStatus};

/// Minimum compile timeout, applied even when the execution's own time limit
/// is shorter (§4.5 step 3: `max(timeLimitMs, 10_000)`).
const MIN_COMPILE_TIMEOUT_MS: u64 = 10_000;

/// Case-insensitive substrings indicating a compile failure on a toolchain that
/// exits 0 even on error (§4.5 step 3, §9 decision 1 — fallback only).
const COMPILE_ERROR_MARKERS: [&str; 2] = ["error", "not found"];

#[derive(Debug)]
pub struct RunnerOutcome {
    pub status: ExecutionStatus,
    pub stdout: String,
    pub stderr: String,
    pub execution_time_ms: f64,
    pub exit_code: Option<i32>,
    pub timeout: bool,
}

impl RunnerOutcome {
    pub fn into_execution_result(self) -> ExecutionResult {
        ExecutionResult {
            status: self.status,
            stdout: self.stdout,
            stderr: self.stderr,
            execution_time_ms: self.execution_time_ms,
            exit_code: self.exit_code,
            timeout: self.timeout,
        }
    }
}

fn unsupported_runtime(runtime: &str) -> RunnerOutcome {
    RunnerOutcome {
        status: ExecutionStatus::Failed,
        stdout: String::new(),
        stderr: format!("Unsupported language: {runtime}"),
        execution_time_ms: 0.0,
        exit_code: None,
        timeout: false,
    }
}

/// Splits a command template like `"gcc -O2 -o {bin} {file}"` into a program
/// and argument list, substituting scratch-relative placeholders.
fn build_command_args(template: &str, scratch: &Path, file_name: &str) -> (String, Vec<String>) {
    let file = scratch.join(file_name).to_string_lossy().to_string();
    let bin = scratch.join("out").to_string_lossy().to_string();
    let dir = scratch.to_string_lossy().to_string();

    let mut parts = template.split_whitespace().map(|part| {
        part.replace("{file}", &file)
            .replace("{bin}", &bin)
            .replace("{dir}", &dir)
    });

    let program = parts.next().unwrap_or_default();
    let args = parts.collect();
    (program, args)
}

/// Runs a single child process with a wall-clock timeout and a combined
/// stdout+stderr byte cap, draining both streams concurrently so a full pipe
/// on one stream never blocks reading the other (§4.5 step 4).
async fn run_with_bounds(
    program: &str,
    args: &[String],
    cwd: &Path,
    timeout: Duration,
    output_cap_bytes: usize,
) -> std::io::Result<(Option<i32>, bool, String, String)> {
    let mut child: Child = Command::new(program)
        .args(args)
        .current_dir(cwd)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()?;

    let mut stdout_reader = BufReader::new(child.stdout.take().expect("piped stdout")).lines();
    let mut stderr_reader = BufReader::new(child.stderr.take().expect("piped stderr")).lines();

    let mut stdout = String::new();
    let mut stderr = String::new();
    let mut stdout_done = false;
    let mut stderr_done = false;
    let mut cap_exceeded = false;

    let drain = async {
        while !(stdout_done && stderr_done) {
            if stdout.len() + stderr.len() > output_cap_bytes {
                cap_exceeded = true;
                break;
            }

            tokio::select! {
                line = stdout_reader.next_line(), if !stdout_done => {
                    match line {
                        Ok(Some(line)) => { stdout.push_str(&line); stdout.push('\n'); }
                        Ok(None) | Err(_) => stdout_done = true,
                    }
                }
                line = stderr_reader.next_line(), if !stderr_done => {
                    match line {
                        Ok(Some(line)) => { stderr.push_str(&line); stderr.push('\n'); }
                        Ok(None) | Err(_) => stderr_done = true,
                    }
                }
            }
        }
    };

    let timed_out = match tokio::time::timeout(timeout, drain).await {
        Ok(()) => false,
        Err(_) => true,
    };

    if timed_out || cap_exceeded {
        let _ = child.start_kill();
        let _ = child.wait().await;
        if cap_exceeded && !stderr.contains("output limit exceeded") {
            stderr.push_str("output limit exceeded\n");
        }
        return Ok((None, timed_out, stdout, stderr));
    }

    // Drain loop exited because both streams closed; collect the exit status.
    let status = child.wait().await?;
    Ok((status.code(), false, stdout, stderr))
}

/// Executes `descriptor`'s compile command, if any (§4.5 step 3).
///
/// Returns `Ok(None)` when compilation succeeded (or there was nothing to
/// compile); `Ok(Some(outcome))` with a terminal FAILED outcome when it did not.
async fn maybe_compile(
    descriptor: &RuntimeDescriptor,
    scratch: &Path,
    time_limit_ms: i32,
) -> std::io::Result<Option<RunnerOutcome>> {
    let Some(template) = descriptor.compile_cmd_template else {
        return Ok(None);
    };

    let (program, args) = build_command_args(template, scratch, descriptor.file_name);
    let timeout = Duration::from_millis((time_limit_ms as u64).max(MIN_COMPILE_TIMEOUT_MS));

    // Compile output isn't bounded by the memory-limit cap; give it a generous
    // fixed ceiling so a pathological error dump can't hang the drain loop.
    let (exit_code, timed_out, stdout, stderr) =
        run_with_bounds(&program, &args, scratch, timeout, 16 * 1024 * 1024).await?;

    let combined = format!("{stdout}{stderr}");
    let exit_nonzero = exit_code.map(|c| c != 0).unwrap_or(true);
    // §9 decision 1: exit code first; the substring scan only kicks in when the
    // compiler itself claims success (exit 0) but the output looks like an error.
    let looks_like_error = !exit_nonzero
        && COMPILE_ERROR_MARKERS
            .iter()
            .any(|marker| combined.to_lowercase().contains(marker));

    if timed_out || exit_nonzero || looks_like_error {
        let stderr = if combined.trim().is_empty() {
            "compilation failed".to_string()
        } else {
            combined
        };
        return Ok(Some(RunnerOutcome {
            status: ExecutionStatus::Failed,
            stdout: String::new(),
            stderr,
            execution_time_ms: 0.0,
            exit_code: Some(1),
            timeout: false,
        }));
    }

    Ok(None)
}

/// Runs a language descriptor against source text end to end (§4.5).
///
/// The scratch directory is guaranteed to be cleaned up on every exit path,
/// including early returns and the unsupported-runtime branch.
pub async fn run(
    descriptor: &RuntimeDescriptor,
    source: &str,
    time_limit_ms: i32,
    memory_limit_mb: i32,
) -> RunnerOutcome {
    let scratch = scratch_dir();
    if let Err(err) = tokio::fs::create_dir_all(&scratch).await {
        return RunnerOutcome {
            status: ExecutionStatus::Failed,
            stdout: String::new(),
            stderr: format!("failed to create scratch directory: {err}"),
            execution_time_ms: 0.0,
            exit_code: Some(1),
            timeout: false,
        };
    }

    let outcome = run_inner(descriptor, source, time_limit_ms, memory_limit_mb, &scratch).await;

    if let Err(err) = tokio::fs::remove_dir_all(&scratch).await {
        tracing::warn!(scratch = %scratch.display(), error = %err, "scratch directory cleanup failed");
    }

    outcome
}

async fn run_inner(
    descriptor: &RuntimeDescriptor,
    source: &str,
    time_limit_ms: i32,
    memory_limit_mb: i32,
    scratch: &Path,
) -> RunnerOutcome {
    if let Err(err) = tokio::fs::write(scratch.join(descriptor.file_name), source).await {
        return RunnerOutcome {
            status: ExecutionStatus::Failed,
            stdout: String::new(),
            stderr: format!("failed to write source: {err}"),
            execution_time_ms: 0.0,
            exit_code: Some(1),
            timeout: false,
        };
    }

    match maybe_compile(descriptor, scratch, time_limit_ms).await {
        Ok(Some(compile_failure)) => return compile_failure,
        Ok(None) => {}
        Err(err) => {
            return RunnerOutcome {
                status: ExecutionStatus::Failed,
                stdout: String::new(),
                stderr: format!("failed to invoke compiler: {err}"),
                execution_time_ms: 0.0,
                exit_code: Some(1),
                timeout: false,
            };
        }
    }

    let (program, args) = build_command_args(descriptor.run_cmd_template, scratch, descriptor.file_name);
    let timeout = Duration::from_millis(time_limit_ms.max(0) as u64);
    let output_cap_bytes = (memory_limit_mb.max(0) as usize) * 1024 * 1024;

    let started = Instant::now();
    let run_result = run_with_bounds(&program, &args, scratch, timeout, output_cap_bytes).await;
    let execution_time_ms = started.elapsed().as_secs_f64() * 1000.0;

    match run_result {
        Ok((Some(0), false, stdout, stderr)) => RunnerOutcome {
            status: ExecutionStatus::Completed,
            stdout,
            stderr,
            execution_time_ms,
            exit_code: Some(0),
            timeout: false,
        },
        Ok((_, true, stdout, mut stderr)) => {
            if stderr.trim().is_empty() {
                stderr = "Execution timeout".to_string();
            }
            RunnerOutcome {
                status: ExecutionStatus::Timeout,
                stdout,
                stderr,
                execution_time_ms,
                exit_code: None,
                timeout: true,
            }
        }
        Ok((code, false, stdout, stderr)) => RunnerOutcome {
            status: ExecutionStatus::Failed,
            stdout,
            stderr,
            execution_time_ms,
            exit_code: Some(code.unwrap_or(1)),
            timeout: false,
        },
        Err(err) => RunnerOutcome {
            status: ExecutionStatus::Failed,
            stdout: String::new(),
            stderr: format!("failed to spawn process: {err}"),
            execution_time_ms,
            exit_code: Some(1),
            timeout: false,
        },
    }
}

/// Runs an execution, or produces the unsupported-runtime outcome directly
/// when no descriptor exists for the given runtime key (§4.5 "Unsupported
/// runtime key").
pub async fn run_by_runtime(
    descriptor: Option<&RuntimeDescriptor>,
    runtime: &str,
    source: &str,
    time_limit_ms: i32,
    memory_limit_mb: i32,
) -> RunnerOutcome {
    match descriptor {
        Some(descriptor) => run(descriptor, source, time_limit_ms, memory_limit_mb).await,
        None => unsupported_runtime(runtime),
    }
}

fn scratch_dir() -> PathBuf {
    let now = chrono::Utc::now().timestamp_millis();
    std::env::temp_dir().join(format!("codecell-{now}-{}", Uuid::new_v4()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn build_command_args_substitutes_placeholders() {
        let scratch = Path::new("/tmp/scratch-x");
        let (program, args) = build_command_args("gcc -O2 -o {bin} {file}", scratch, "main.c");
        assert_eq!(program, "gcc");
        assert_eq!(
            args,
            vec![
                "-O2".to_string(),
                "-o".to_string(),
                "/tmp/scratch-x/out".to_string(),
                "/tmp/scratch-x/main.c".to_string(),
            ]
        );
    }

    #[test]
    fn build_command_args_handles_interpreted_runtime() {
        let scratch = Path::new("/tmp/scratch-y");
        let (program, args) = build_command_args("python3 {file}", scratch, "main.py");
        assert_eq!(program, "python3");
        assert_eq!(args, vec!["/tmp/scratch-y/main.py".to_string()]);
    }

    #[test]
    fn unsupported_runtime_outcome_is_failed_with_descriptive_stderr() {
        let outcome = unsupported_runtime("cobol");
        assert_eq!(outcome.status, ExecutionStatus::Failed);
        assert_eq!(outcome.stderr, "Unsupported language: cobol");
        assert!(outcome.exit_code.is_none());
    }
}
