//! Self-replicating generation pipeline.
//!
//! A lineage treats one source artifact as mutable program state. Each
//! step archives the current body under an ordered log path, submits
//! it (plus its embedded instruction) to a generative model, persists
//! the extracted reply as the new body, and launches a successor
//! process to continue the chain. The crate enforces a strict
//! separation:
//!
//! - **[`core`]**: Pure lineage logic (instruction blocks, reply
//!   extraction, entry naming). No I/O, fully testable in isolation.
//! - **[`io`]**: Side-effecting operations (artifact storage, archival,
//!   model invocation, process spawning). Isolated to enable scripted
//!   doubles in tests.
//!
//! [`step`] coordinates core logic with I/O to implement one pipeline
//! step; [`validate`] checks an existing lineage against the contract.

pub mod core;
pub mod exit_codes;
pub mod io;
pub mod logging;
pub mod step;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
pub mod validate;
