//! Archive entry naming.
//!
//! Entries are named `<zero-padded index>.<ext>` with a fixed width so
//! that lexicographic filename order and numeric index order coincide.
//! Indices beyond the width are unrepresentable on purpose: widening
//! the padding mid-lineage would break the ordering guarantee for the
//! entries already on disk, so callers must treat `None` as a hard
//! boundary.

/// Fixed zero-padding width for archive indices.
pub const INDEX_WIDTH: usize = 4;

/// Largest index representable at [`INDEX_WIDTH`] digits.
pub const MAX_INDEX: u32 = 9_999;

/// Render the archive file name for `index`, or `None` when the index
/// no longer fits the fixed width.
pub fn entry_name(index: u32, ext: &str) -> Option<String> {
    if index > MAX_INDEX {
        return None;
    }
    Some(format!("{index:0width$}.{ext}", width = INDEX_WIDTH))
}

/// Parse an archive file name back into its index.
///
/// Only names produced by [`entry_name`] match: exactly
/// [`INDEX_WIDTH`] ASCII digits followed by `.<ext>`. Anything else
/// (temp files, stray editor droppings) is ignored by
/// returning `None`, which keeps directory counting honest.
pub fn parse_entry_index(file_name: &str, ext: &str) -> Option<u32> {
    let stem = file_name.strip_suffix(ext)?.strip_suffix('.')?;
    if stem.len() != INDEX_WIDTH || !stem.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    stem.parse().ok()
}
