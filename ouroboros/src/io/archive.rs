//! Append-only generation archive.
//!
//! The archive directory is the source of truth for lineage length:
//! the next index is derived by counting existing snapshot entries,
//! never from an in-memory counter, so the lineage resumes correctly
//! across process restarts. Entries are committed before any risky
//! operation (model call, extraction, spawn) runs, and are never
//! overwritten afterwards; the only sanctioned mutation is the
//! error-note append in [`append_error_note`].

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use chrono::{SecondsFormat, Utc};
use thiserror::Error;
use tracing::{debug, instrument, warn};

use crate::core::naming::{self, INDEX_WIDTH, MAX_INDEX};

/// One archived lineage position.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Generation {
    /// Position in the lineage, 0-based and strictly increasing.
    pub index: u32,
    /// Snapshot path under the archive directory.
    pub archived_path: PathBuf,
}

impl Generation {
    /// Index of the generation this one was derived from.
    pub fn parent_index(&self) -> Option<u32> {
        self.index.checked_sub(1)
    }
}

/// Raised when the next index no longer fits the fixed padding width.
/// Widening would let `10000.<ext>` sort before `9999.<ext>`, so the
/// boundary fails loudly instead.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("archive exhausted: index {index} does not fit in {width} digits")]
pub struct ArchiveExhausted {
    pub index: u64,
    pub width: usize,
}

/// The ordered, append-only snapshot directory.
#[derive(Debug, Clone)]
pub struct Archive {
    dir: PathBuf,
    ext: String,
}

impl Archive {
    pub fn new(dir: impl Into<PathBuf>, ext: impl Into<String>) -> Self {
        Self {
            dir: dir.into(),
            ext: ext.into(),
        }
    }

    /// Archived generations, sorted by index. Files that do not parse
    /// as snapshot names are ignored.
    pub fn entries(&self) -> Result<Vec<Generation>> {
        if !self.dir.exists() {
            return Ok(Vec::new());
        }
        let mut entries = Vec::new();
        for entry in fs::read_dir(&self.dir)
            .with_context(|| format!("read archive directory {}", self.dir.display()))?
        {
            let entry = entry.context("read archive entry")?;
            let file_name = entry.file_name();
            let Some(name) = file_name.to_str() else {
                continue;
            };
            if let Some(index) = naming::parse_entry_index(name, &self.ext) {
                entries.push(Generation {
                    index,
                    archived_path: entry.path(),
                });
            }
        }
        entries.sort_by_key(|generation| generation.index);
        Ok(entries)
    }

    /// Index the next commit will receive.
    pub fn next_index(&self) -> Result<u64> {
        Ok(self.entries()?.len() as u64)
    }

    /// Persist `source_text` as the next generation snapshot.
    ///
    /// Append-only: an existing snapshot path is never reused. Fails
    /// with [`ArchiveExhausted`] once the fixed width runs out.
    #[instrument(skip_all, fields(dir = %self.dir.display()))]
    pub fn commit(&self, source_text: &str) -> Result<Generation> {
        fs::create_dir_all(&self.dir)
            .with_context(|| format!("create archive directory {}", self.dir.display()))?;

        let next = self.next_index()?;
        if next > u64::from(MAX_INDEX) {
            return Err(ArchiveExhausted {
                index: next,
                width: INDEX_WIDTH,
            }
            .into());
        }
        let index = next as u32;
        let name = naming::entry_name(index, &self.ext)
            .ok_or_else(|| anyhow!("unrepresentable archive index {index}"))?;
        let archived_path = self.dir.join(name);

        let mut file = fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&archived_path)
            .with_context(|| format!("create archive snapshot {}", archived_path.display()))?;
        file.write_all(source_text.as_bytes())
            .with_context(|| format!("write archive snapshot {}", archived_path.display()))?;
        file.sync_all()
            .with_context(|| format!("sync archive snapshot {}", archived_path.display()))?;

        debug!(index, path = %archived_path.display(), "generation archived");
        Ok(Generation {
            index,
            archived_path,
        })
    }
}

/// Append a timestamped error note to an archived entry.
///
/// This is the error sink for every post-archival failure: the note
/// lands next to the snapshot it describes without disturbing any
/// other entry. Append, never truncate.
pub fn append_error_note(archived_path: &Path, kind: &str, message: &str) -> Result<()> {
    let timestamp = Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true);
    let note = format!("\n// ERROR[{kind}] {timestamp}: {}\n", message.replace('\n', " "));

    let mut file = fs::OpenOptions::new()
        .append(true)
        .open(archived_path)
        .with_context(|| format!("open archive entry {}", archived_path.display()))?;
    file.write_all(note.as_bytes())
        .with_context(|| format!("append error note to {}", archived_path.display()))?;

    warn!(kind, path = %archived_path.display(), "error recorded against archived generation");
    Ok(())
}
