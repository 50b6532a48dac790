//! Bounded child-process execution for the model invoker.

use std::io::{Read, Write};
use std::process::{Command, ExitStatus, Stdio};
use std::thread;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use tracing::{debug, instrument, warn};
use wait_timeout::ChildExt;

/// Captured output of an invoker child process.
#[derive(Debug)]
pub struct InvokerOutput {
    pub status: ExitStatus,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
    /// Bytes dropped from either stream once the capture limit was hit.
    pub truncated_bytes: usize,
    pub timed_out: bool,
}

/// Run `cmd` with the prompt piped to stdin, enforcing a wall-clock
/// timeout and a per-stream capture limit.
///
/// Both pipes are drained on dedicated threads while the child runs, so
/// a chatty model CLI cannot deadlock the step. Bytes past the limit
/// are discarded but still drained.
#[instrument(skip_all, fields(timeout_secs = timeout.as_secs(), capture_limit_bytes))]
pub fn run_piped(
    mut cmd: Command,
    stdin: &[u8],
    timeout: Duration,
    capture_limit_bytes: usize,
) -> Result<InvokerOutput> {
    cmd.stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());

    debug!("spawning invoker process");
    let mut child = cmd.spawn().context("spawn invoker command")?;

    let mut child_stdin = child
        .stdin
        .take()
        .ok_or_else(|| anyhow!("stdin was not piped"))?;
    child_stdin.write_all(stdin).context("write prompt to stdin")?;
    // Close the pipe so the child sees EOF on the prompt.
    drop(child_stdin);

    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| anyhow!("stdout was not piped"))?;
    let stderr = child
        .stderr
        .take()
        .ok_or_else(|| anyhow!("stderr was not piped"))?;

    let stdout_reader = thread::spawn(move || drain_limited(stdout, capture_limit_bytes));
    let stderr_reader = thread::spawn(move || drain_limited(stderr, capture_limit_bytes));

    let mut timed_out = false;
    let status = match child.wait_timeout(timeout).context("wait for invoker")? {
        Some(status) => status,
        None => {
            warn!(timeout_secs = timeout.as_secs(), "invoker timed out, killing");
            timed_out = true;
            child.kill().context("kill invoker")?;
            child.wait().context("wait invoker after kill")?
        }
    };

    let (stdout, dropped_out) = join_reader(stdout_reader).context("join stdout reader")?;
    let (stderr, dropped_err) = join_reader(stderr_reader).context("join stderr reader")?;
    let truncated_bytes = dropped_out + dropped_err;
    if truncated_bytes > 0 {
        warn!(truncated_bytes, "invoker output truncated");
    }

    debug!(exit_code = ?status.code(), timed_out, "invoker finished");
    Ok(InvokerOutput {
        status,
        stdout,
        stderr,
        truncated_bytes,
        timed_out,
    })
}

fn join_reader(handle: thread::JoinHandle<Result<(Vec<u8>, usize)>>) -> Result<(Vec<u8>, usize)> {
    handle
        .join()
        .map_err(|_| anyhow!("reader thread panicked"))?
}

fn drain_limited<R: Read>(mut reader: R, limit: usize) -> Result<(Vec<u8>, usize)> {
    let mut kept = Vec::new();
    let mut dropped = 0usize;
    let mut chunk = [0u8; 8192];

    loop {
        let n = reader.read(&mut chunk).context("read invoker output")?;
        if n == 0 {
            break;
        }
        let room = limit.saturating_sub(kept.len());
        let take = n.min(room);
        kept.extend_from_slice(&chunk[..take]);
        dropped += n - take;
    }

    Ok((kept, dropped))
}
