//! Pipeline configuration stored under `.ouroboros/config.toml`.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};

/// Well-known paths under a lineage root.
#[derive(Debug, Clone)]
pub struct LineagePaths {
    pub state_dir: PathBuf,
    pub config_path: PathBuf,
    /// Stdout/stderr transcript of the most recent model invocation.
    pub transcript_path: PathBuf,
}

impl LineagePaths {
    pub fn new(root: &Path) -> Self {
        let state_dir = root.join(".ouroboros");
        Self {
            config_path: state_dir.join("config.toml"),
            transcript_path: state_dir.join("invoker.log"),
            state_dir,
        }
    }
}

/// Pipeline configuration (TOML).
///
/// Edited by humans, re-read by every generation, and stable across
/// successor spawns unless an instruction changes the code that reads
/// it. Missing fields default to values matching the original lineage.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct PipelineConfig {
    /// Path of the current-source artifact, relative to the root.
    pub artifact: String,

    /// Model identifier handed to the invoker command.
    pub model: String,

    /// Seconds to wait between persisting the new source and spawning
    /// the successor.
    pub spawn_delay_secs: u64,

    /// Wall-clock bound on a single model invocation.
    pub invoke_timeout_secs: u64,

    /// Truncate captured invoker stdout/stderr beyond this many bytes.
    pub invoker_output_limit_bytes: usize,

    pub invoker: InvokerConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct InvokerConfig {
    /// Command that performs `generate(text) -> text`: receives the
    /// prompt on stdin and prints the reply on stdout
    /// (e.g. `["gemini"]`, `["llm", "--no-stream"]`).
    pub command: Vec<String>,
}

impl Default for InvokerConfig {
    fn default() -> Self {
        Self {
            command: vec!["gemini".to_string()],
        }
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            artifact: "current.ts".to_string(),
            model: "gemini-1.5-pro".to_string(),
            spawn_delay_secs: 3,
            invoke_timeout_secs: 10 * 60,
            invoker_output_limit_bytes: 1_000_000,
            invoker: InvokerConfig::default(),
        }
    }
}

impl PipelineConfig {
    pub fn validate(&self) -> Result<()> {
        if self.artifact.trim().is_empty() {
            return Err(anyhow!("artifact must be a non-empty path"));
        }
        if self.invoke_timeout_secs == 0 {
            return Err(anyhow!("invoke_timeout_secs must be > 0"));
        }
        if self.invoker_output_limit_bytes == 0 {
            return Err(anyhow!("invoker_output_limit_bytes must be > 0"));
        }
        if self.invoker.command.is_empty() || self.invoker.command[0].trim().is_empty() {
            return Err(anyhow!("invoker.command must be a non-empty array"));
        }
        Ok(())
    }
}

/// Load config from a TOML file.
///
/// If the file is missing, returns `PipelineConfig::default()`.
pub fn load_config(path: &Path) -> Result<PipelineConfig> {
    if !path.exists() {
        let cfg = PipelineConfig::default();
        cfg.validate()?;
        return Ok(cfg);
    }
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let cfg: PipelineConfig =
        toml::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
    cfg.validate()?;
    Ok(cfg)
}

/// Atomically write config to disk (temp file + rename).
pub fn write_config(path: &Path, cfg: &PipelineConfig) -> Result<()> {
    cfg.validate()?;
    let mut buf = toml::to_string_pretty(cfg).context("serialize config toml")?;
    buf.push('\n');
    write_atomic(path, &buf)
}

fn write_atomic(path: &Path, contents: &str) -> Result<()> {
    let parent = path
        .parent()
        .with_context(|| format!("config path missing parent {}", path.display()))?;
    fs::create_dir_all(parent).with_context(|| format!("create directory {}", parent.display()))?;
    let tmp_path = path.with_extension("toml.tmp");
    fs::write(&tmp_path, contents)
        .with_context(|| format!("write temp config {}", tmp_path.display()))?;
    fs::rename(&tmp_path, path).with_context(|| format!("replace config {}", path.display()))?;
    Ok(())
}
