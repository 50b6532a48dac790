//! Current-source artifact storage.
//!
//! The artifact is the single piece of externally persisted mutable
//! state in the pipeline. Writes go through a temp file + rename so a
//! successor process can never observe a half-written body.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::debug;

/// Fallback extension when the artifact path has none.
pub const DEFAULT_EXT: &str = "txt";

/// Reads and writes the canonical current-generation artifact.
#[derive(Debug, Clone)]
pub struct SourceStore {
    path: PathBuf,
}

impl SourceStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Extension used for archive snapshots of this artifact.
    pub fn extension(&self) -> &str {
        self.path
            .extension()
            .and_then(|ext| ext.to_str())
            .unwrap_or(DEFAULT_EXT)
    }

    pub fn load(&self) -> Result<String> {
        fs::read_to_string(&self.path)
            .with_context(|| format!("read current source {}", self.path.display()))
    }

    /// Atomically replace the artifact (temp file + rename).
    pub fn save(&self, contents: &str) -> Result<()> {
        debug!(path = %self.path.display(), bytes = contents.len(), "writing current source");
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent)
                .with_context(|| format!("create directory {}", parent.display()))?;
        }
        let tmp_path = self.path.with_extension(format!("{}.tmp", self.extension()));
        fs::write(&tmp_path, contents)
            .with_context(|| format!("write temp source {}", tmp_path.display()))?;
        fs::rename(&tmp_path, &self.path)
            .with_context(|| format!("replace current source {}", self.path.display()))?;
        Ok(())
    }

    /// Delete the artifact (self-destruct policy). The archive keeps
    /// the lineage history.
    pub fn remove(&self) -> Result<()> {
        fs::remove_file(&self.path)
            .with_context(|| format!("remove current source {}", self.path.display()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn save_then_load_round_trips() {
        let temp = tempfile::tempdir().expect("tempdir");
        let store = SourceStore::new(temp.path().join("current.ts"));

        store.save("generation zero\n").expect("save");
        assert_eq!(store.load().expect("load"), "generation zero\n");
    }

    #[test]
    fn save_replaces_without_leaving_temp_files() {
        let temp = tempfile::tempdir().expect("tempdir");
        let store = SourceStore::new(temp.path().join("current.ts"));

        store.save("one").expect("save");
        store.save("two").expect("save");
        assert_eq!(store.load().expect("load"), "two");

        let entries: Vec<_> = fs::read_dir(temp.path())
            .expect("read dir")
            .map(|e| e.expect("entry").file_name())
            .collect();
        assert_eq!(entries, vec!["current.ts"]);
    }

    #[test]
    fn extension_falls_back_when_missing() {
        assert_eq!(SourceStore::new("current.ts").extension(), "ts");
        assert_eq!(SourceStore::new("current").extension(), DEFAULT_EXT);
    }

    #[test]
    fn remove_deletes_the_artifact() {
        let temp = tempfile::tempdir().expect("tempdir");
        let store = SourceStore::new(temp.path().join("current.ts"));
        store.save("gone soon").expect("save");

        store.remove().expect("remove");
        assert!(!store.path().exists());
    }
}
