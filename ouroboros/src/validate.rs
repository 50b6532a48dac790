//! Lineage contract validation for `ouroboros validate`.
//!
//! Checks the parts of the contract that can drift while no step is
//! running: the artifact must carry exactly one instruction block, and
//! the archive must be a gapless, order-consistent sequence.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use thiserror::Error;

use crate::core::instruction;
use crate::io::archive::Archive;
use crate::io::source::SourceStore;

/// Parameters for a validation pass.
#[derive(Debug, Clone)]
pub struct ValidateRequest {
    pub artifact: PathBuf,
    /// Archive directory to check, if the lineage has produced one.
    pub archive_dir: Option<PathBuf>,
}

/// Non-empty set of contract violations, kept as a distinct type so
/// the CLI can map it to the contract exit code.
#[derive(Debug, Clone, Error)]
#[error("lineage contract violations:\n- {}", violations.join("\n- "))]
pub struct ContractViolations {
    pub violations: Vec<String>,
}

/// Collect contract violations. An empty vector means the lineage is
/// well-formed.
pub fn validate_lineage(request: &ValidateRequest) -> Result<Vec<String>> {
    let mut violations = Vec::new();

    let store = SourceStore::new(&request.artifact);
    let source = store
        .load()
        .with_context(|| format!("read artifact {}", request.artifact.display()))?;
    if let Err(err) = instruction::extract_instruction(&source) {
        violations.push(format!("artifact: {err}"));
    }

    if let Some(dir) = request.archive_dir.as_deref() {
        check_archive(dir, store.extension(), &mut violations)?;
    }

    Ok(violations)
}

fn check_archive(dir: &Path, ext: &str, violations: &mut Vec<String>) -> Result<()> {
    let archive = Archive::new(dir, ext);
    let entries = archive.entries()?;

    for (position, generation) in entries.iter().enumerate() {
        let expected = position as u32;
        if generation.index != expected {
            violations.push(format!(
                "archive: expected index {expected} at position {position}, found {} ({})",
                generation.index,
                generation.archived_path.display()
            ));
        }
    }

    Ok(())
}
