//! Invocation of the external programs the pipeline shells out to.
//!
//! Two shapes cover every caller: a captured run with an optional wall-clock
//! budget (the media tools), and a detached spawn that never waits (the
//! workstation render, whose completion is observed on disk instead).

use std::io::Read;
use std::path::Path;
use std::process::{Child, Command, ExitStatus, Output, Stdio};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crate::error::{ForgeError, ForgeResult};

/// Granularity of the budget check while a child is running.
const WAIT_SLICE: Duration = Duration::from_millis(25);

#[must_use]
pub fn command_exists(program: &str) -> bool {
    which::which(program).is_ok()
}

pub fn run_command(program: &str, args: &[String], cwd: Option<&Path>) -> ForgeResult<Output> {
    run_command_with_timeout(program, args, cwd, None)
}

/// Run a program to completion, capturing stdout and stderr.
///
/// With a budget, the child is killed once the budget elapses and whatever
/// stderr it produced is folded into the timeout error. Pipes are drained on
/// their own threads so a chatty child can never deadlock against a full
/// pipe buffer.
pub fn run_command_with_timeout(
    program: &str,
    args: &[String],
    cwd: Option<&Path>,
    budget: Option<Duration>,
) -> ForgeResult<Output> {
    if !command_exists(program) {
        return Err(ForgeError::CommandMissing {
            command: program.to_owned(),
        });
    }

    let rendered = render_invocation(program, args);
    let mut command = Command::new(program);
    command
        .args(args)
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());
    if let Some(dir) = cwd {
        command.current_dir(dir);
    }

    let mut child = command.spawn()?;
    let stdout = drain(child.stdout.take());
    let stderr = drain(child.stderr.take());

    let status = match budget {
        None => child.wait()?,
        Some(limit) => match wait_with_deadline(&mut child, limit)? {
            Some(status) => status,
            None => {
                let _ = child.kill();
                let _ = child.wait();
                let captured = stderr.join().unwrap_or_default();
                return Err(ForgeError::from_command_timeout(
                    rendered,
                    limit.as_millis().try_into().unwrap_or(u64::MAX),
                    String::from_utf8_lossy(&captured).into_owned(),
                ));
            }
        },
    };

    let output = Output {
        status,
        stdout: stdout.join().unwrap_or_default(),
        stderr: stderr.join().unwrap_or_default(),
    };
    if output.status.success() {
        return Ok(output);
    }
    Err(ForgeError::from_command_failure(
        rendered,
        output.status.code().unwrap_or(-1),
        String::from_utf8_lossy(&output.stderr).into_owned(),
    ))
}

/// Launch a program and deliberately do not wait for it.
///
/// Completion of the detached workstation render is observed by polling for
/// its artifact (see [`crate::poll`]). Returns the child's PID.
pub fn spawn_detached(program: &Path, args: &[String], cwd: Option<&Path>) -> ForgeResult<u32> {
    if !program.exists() && !command_exists(&program.display().to_string()) {
        return Err(ForgeError::CommandMissing {
            command: program.display().to_string(),
        });
    }

    let mut command = Command::new(program);
    command
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null());
    if let Some(dir) = cwd {
        command.current_dir(dir);
    }

    let child = command.spawn()?;
    let pid = child.id();
    tracing::debug!(program = %program.display(), pid, "spawned detached process");
    Ok(pid)
}

fn drain<R: Read + Send + 'static>(pipe: Option<R>) -> JoinHandle<Vec<u8>> {
    thread::spawn(move || {
        let mut buf = Vec::new();
        if let Some(mut pipe) = pipe {
            let _ = pipe.read_to_end(&mut buf);
        }
        buf
    })
}

/// Poll the child until it exits or the budget runs out. `None` means the
/// budget elapsed with the child still running.
fn wait_with_deadline(child: &mut Child, limit: Duration) -> std::io::Result<Option<ExitStatus>> {
    let deadline = Instant::now() + limit;
    loop {
        if let Some(status) = child.try_wait()? {
            return Ok(Some(status));
        }
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            return Ok(None);
        }
        thread::sleep(WAIT_SLICE.min(remaining));
    }
}

fn render_invocation(program: &str, args: &[String]) -> String {
    if args.is_empty() {
        program.to_owned()
    } else {
        format!("{} {}", program, args.join(" "))
    }
}
