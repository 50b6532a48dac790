//! Model invocation boundary.
//!
//! The [`Invoker`] trait decouples step orchestration from the actual
//! generative backend. The real backend is an external CLI that reads
//! the prompt on stdin and prints the reply on stdout; tests use
//! scripted invokers that return predetermined replies without
//! spawning processes.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use tracing::{debug, info, instrument, warn};

use crate::io::process::{InvokerOutput, run_piped};

/// Parameters for one `generate(text) -> text` call.
#[derive(Debug, Clone)]
pub struct InvokeRequest {
    /// Rendered directive prompt.
    pub prompt: String,
    /// Model identifier, appended to the command as `--model <name>`.
    pub model: String,
    /// Wall-clock bound on the call.
    pub timeout: Duration,
    /// Truncate captured output beyond this many bytes.
    pub output_limit_bytes: usize,
    /// Where to write the invocation transcript, if anywhere.
    pub transcript_path: Option<PathBuf>,
}

/// Abstraction over generative backends.
pub trait Invoker {
    /// Submit the prompt and return the raw reply text.
    fn generate(&self, request: &InvokeRequest) -> Result<String>;
}

/// Invoker that spawns a configured model CLI.
pub struct CommandInvoker {
    command: Vec<String>,
}

impl CommandInvoker {
    pub fn new(command: Vec<String>) -> Self {
        Self { command }
    }
}

impl Invoker for CommandInvoker {
    #[instrument(skip_all, fields(model = %request.model, timeout_secs = request.timeout.as_secs()))]
    fn generate(&self, request: &InvokeRequest) -> Result<String> {
        let program = self
            .command
            .first()
            .ok_or_else(|| anyhow!("invoker command is empty"))?;
        info!(program = %program, "starting model invocation");

        let mut cmd = Command::new(program);
        cmd.args(&self.command[1..]);
        if !request.model.is_empty() {
            cmd.arg("--model").arg(&request.model);
        }

        let output = run_piped(
            cmd,
            request.prompt.as_bytes(),
            request.timeout,
            request.output_limit_bytes,
        )
        .context("run invoker command")?;

        if let Some(path) = request.transcript_path.as_deref() {
            write_transcript(path, &output)?;
        }

        if output.timed_out {
            warn!(timeout_secs = request.timeout.as_secs(), "model invocation timed out");
            return Err(anyhow!(
                "model invocation timed out after {:?}",
                request.timeout
            ));
        }
        if !output.status.success() {
            warn!(exit_code = ?output.status.code(), "model invocation failed");
            return Err(anyhow!(
                "model invocation failed with status {:?}",
                output.status.code()
            ));
        }

        let reply = String::from_utf8(output.stdout).context("decode model reply as UTF-8")?;
        debug!(reply_bytes = reply.len(), "model invocation completed");
        Ok(reply)
    }
}

fn write_transcript(path: &Path, output: &InvokerOutput) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("create transcript dir {}", parent.display()))?;
    }
    let mut buf = String::new();
    buf.push_str("=== stdout ===\n");
    buf.push_str(&String::from_utf8_lossy(&output.stdout));
    buf.push_str("\n=== stderr ===\n");
    buf.push_str(&String::from_utf8_lossy(&output.stderr));
    if output.truncated_bytes > 0 {
        buf.push_str(&format!("\n[truncated {} bytes]\n", output.truncated_bytes));
    }
    if output.timed_out {
        buf.push_str("\n[invoker timed out]\n");
    }
    fs::write(path, buf).with_context(|| format!("write transcript {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(transcript: Option<PathBuf>) -> InvokeRequest {
        InvokeRequest {
            prompt: "the prompt".to_string(),
            model: String::new(),
            timeout: Duration::from_secs(5),
            output_limit_bytes: 10_000,
            transcript_path: transcript,
        }
    }

    #[test]
    fn command_invoker_pipes_prompt_and_returns_stdout() {
        let invoker = CommandInvoker::new(vec!["sh".to_string(), "-c".to_string(), "cat".to_string()]);
        let reply = invoker.generate(&request(None)).expect("generate");
        assert_eq!(reply, "the prompt");
    }

    #[test]
    fn nonzero_exit_is_an_invocation_error() {
        let invoker = CommandInvoker::new(vec![
            "sh".to_string(),
            "-c".to_string(),
            "exit 3".to_string(),
        ]);
        let err = invoker.generate(&request(None)).unwrap_err();
        assert!(err.to_string().contains("failed with status"));
    }

    #[test]
    fn transcript_records_both_streams() {
        let temp = tempfile::tempdir().expect("tempdir");
        let transcript = temp.path().join("state").join("invoker.log");
        let invoker = CommandInvoker::new(vec![
            "sh".to_string(),
            "-c".to_string(),
            "echo out; echo err >&2".to_string(),
        ]);

        invoker
            .generate(&request(Some(transcript.clone())))
            .expect("generate");

        let log = fs::read_to_string(&transcript).expect("read transcript");
        assert!(log.contains("=== stdout ===\nout"));
        assert!(log.contains("=== stderr ===\nerr"));
    }
}
