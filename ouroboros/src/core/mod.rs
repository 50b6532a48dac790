//! Pure lineage logic: instruction blocks, reply extraction, entry naming.
//!
//! Nothing in this module touches the filesystem or spawns processes,
//! so every contract here is testable without a temp directory.

pub mod extract;
pub mod instruction;
pub mod naming;
