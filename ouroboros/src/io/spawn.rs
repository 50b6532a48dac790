//! Successor-process launching.
//!
//! The successor is a detached continuation, not a supervised child:
//! the launcher spawns and immediately forgets, and the parent process
//! is expected to exit right after. The artifact write completes (and
//! is renamed into place) before any launch, so the two processes only
//! ever coordinate through the filesystem.

use std::path::PathBuf;
use std::process::{Command, Stdio};

use anyhow::{Context, Result};
use tracing::{info, instrument};

/// What to do with the lineage after the new source is persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SuccessorPolicy {
    /// Spawn the successor process (the default, continuing the chain).
    Spawn,
    /// Delete the artifact and end the lineage deliberately.
    SelfDestruct,
    /// Persist the new source but leave continuation to an external
    /// supervisor.
    Halt,
}

/// Fully resolved successor invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchPlan {
    pub program: PathBuf,
    pub args: Vec<String>,
}

impl LaunchPlan {
    /// Plan that re-invokes this executable's `step` with the same
    /// configuration surface the parent received.
    pub fn successor(
        artifact: &std::path::Path,
        archive_dir: &std::path::Path,
        model: &str,
        interval_secs: u64,
    ) -> Result<Self> {
        let program = std::env::current_exe().context("resolve current executable")?;
        let args = vec![
            "step".to_string(),
            "--log".to_string(),
            archive_dir.display().to_string(),
            "--artifact".to_string(),
            artifact.display().to_string(),
            "--model".to_string(),
            model.to_string(),
            "--interval".to_string(),
            interval_secs.to_string(),
        ];
        Ok(Self { program, args })
    }
}

/// Abstraction over successor launching. Tests record plans instead of
/// spawning real processes.
pub trait Launcher {
    /// Start the successor. Fire-and-forget: must not wait for it.
    fn launch(&self, plan: &LaunchPlan) -> Result<()>;
}

/// Launcher that spawns a real detached OS process.
pub struct ProcessLauncher;

impl Launcher for ProcessLauncher {
    #[instrument(skip_all, fields(program = %plan.program.display()))]
    fn launch(&self, plan: &LaunchPlan) -> Result<()> {
        let child = Command::new(&plan.program)
            .args(&plan.args)
            .stdin(Stdio::null())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit())
            .spawn()
            .with_context(|| format!("spawn successor {}", plan.program.display()))?;
        info!(pid = child.id(), "successor launched");
        // Intentionally not waited on: the child outlives this process.
        drop(child);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    #[test]
    fn successor_plan_re_supplies_the_configuration_surface() {
        let plan = LaunchPlan::successor(
            Path::new("current.ts"),
            Path::new("logs/run-1"),
            "gemini-1.5-pro",
            3,
        )
        .expect("plan");

        assert_eq!(
            plan.args,
            vec![
                "step",
                "--log",
                "logs/run-1",
                "--artifact",
                "current.ts",
                "--model",
                "gemini-1.5-pro",
                "--interval",
                "3",
            ]
        );
    }

    #[test]
    fn process_launcher_fires_and_forgets() {
        let plan = LaunchPlan {
            program: PathBuf::from("true"),
            args: Vec::new(),
        };
        ProcessLauncher.launch(&plan).expect("launch");
    }

    #[test]
    fn process_launcher_reports_missing_program() {
        let plan = LaunchPlan {
            program: PathBuf::from("/nonexistent/ouroboros-successor"),
            args: Vec::new(),
        };
        assert!(ProcessLauncher.launch(&plan).is_err());
    }
}
