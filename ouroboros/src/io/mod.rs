//! Side-effecting operations: artifact storage, archival, model
//! invocation, and successor launching. Everything here is reachable
//! from `step::run_step` and is isolated so tests can substitute
//! scripted doubles for the process-spawning parts.

pub mod archive;
pub mod config;
pub mod invoker;
pub mod process;
pub mod prompt;
pub mod source;
pub mod spawn;
