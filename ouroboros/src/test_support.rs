//! Test-only scripted doubles and lineage fixtures.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use tempfile::TempDir;

use crate::core::instruction::{INSTRUCTION_BEGIN, INSTRUCTION_END};
use crate::io::archive::{Archive, Generation};
use crate::io::config::PipelineConfig;
use crate::io::invoker::{InvokeRequest, Invoker};
use crate::io::source::SourceStore;
use crate::io::spawn::{LaunchPlan, Launcher, SuccessorPolicy};
use crate::step::StepRequest;

/// Build a minimal source body carrying `instruction` in its block.
pub fn seed_source(instruction: &str) -> String {
    format!(
        "console.log(\"alive\")\n\n{INSTRUCTION_BEGIN}\n{instruction}\n{INSTRUCTION_END}\n"
    )
}

/// Wrap a source body in a ```` ```ts ```` fence, the shape replies
/// usually arrive in.
pub fn fenced_reply(source: &str) -> String {
    format!("```ts\n{source}```\n")
}

enum ScriptedReply {
    Text(String),
    Fail(String),
}

/// Invoker that replays a fixed script of replies and records every
/// request it receives.
pub struct ScriptedInvoker {
    script: RefCell<VecDeque<ScriptedReply>>,
    requests: RefCell<Vec<InvokeRequest>>,
}

impl ScriptedInvoker {
    pub fn replies(replies: Vec<&str>) -> Self {
        Self {
            script: RefCell::new(
                replies
                    .into_iter()
                    .map(|reply| ScriptedReply::Text(reply.to_string()))
                    .collect(),
            ),
            requests: RefCell::new(Vec::new()),
        }
    }

    pub fn failing(message: &str) -> Self {
        Self {
            script: RefCell::new(VecDeque::from([ScriptedReply::Fail(message.to_string())])),
            requests: RefCell::new(Vec::new()),
        }
    }

    /// Requests seen so far, in order.
    pub fn requests(&self) -> Vec<InvokeRequest> {
        self.requests.borrow().clone()
    }
}

impl Invoker for ScriptedInvoker {
    fn generate(&self, request: &InvokeRequest) -> Result<String> {
        self.requests.borrow_mut().push(request.clone());
        match self.script.borrow_mut().pop_front() {
            Some(ScriptedReply::Text(reply)) => Ok(reply),
            Some(ScriptedReply::Fail(message)) => Err(anyhow!("{message}")),
            None => Err(anyhow!("scripted invoker exhausted")),
        }
    }
}

/// Launcher that records plans instead of spawning processes.
#[derive(Default)]
pub struct RecordingLauncher {
    plans: RefCell<Vec<LaunchPlan>>,
    fail_with: Option<String>,
}

impl RecordingLauncher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing(message: &str) -> Self {
        Self {
            plans: RefCell::new(Vec::new()),
            fail_with: Some(message.to_string()),
        }
    }

    pub fn plans(&self) -> Vec<LaunchPlan> {
        self.plans.borrow().clone()
    }
}

impl Launcher for RecordingLauncher {
    fn launch(&self, plan: &LaunchPlan) -> Result<()> {
        if let Some(message) = &self.fail_with {
            return Err(anyhow!("{message}"));
        }
        self.plans.borrow_mut().push(plan.clone());
        Ok(())
    }
}

/// A disposable lineage root with a seeded artifact and archive dir.
pub struct TestLineage {
    temp: TempDir,
}

impl TestLineage {
    pub fn new() -> Result<Self> {
        Ok(Self {
            temp: TempDir::new().context("create lineage tempdir")?,
        })
    }

    pub fn root(&self) -> &Path {
        self.temp.path()
    }

    pub fn artifact_path(&self) -> PathBuf {
        self.root().join("current.ts")
    }

    pub fn archive_dir(&self) -> PathBuf {
        self.root().join("logs")
    }

    /// Seed the artifact with a body carrying `instruction`.
    pub fn seed(&self, instruction: &str) -> Result<PathBuf> {
        let path = self.artifact_path();
        SourceStore::new(&path).save(&seed_source(instruction))?;
        Ok(path)
    }

    /// Seed the artifact with an arbitrary body.
    pub fn seed_raw(&self, body: &str) -> Result<PathBuf> {
        let path = self.artifact_path();
        SourceStore::new(&path).save(body)?;
        Ok(path)
    }

    pub fn read_artifact(&self) -> Result<String> {
        SourceStore::new(self.artifact_path()).load()
    }

    pub fn archive_entries(&self) -> Result<Vec<Generation>> {
        Archive::new(self.archive_dir(), "ts").entries()
    }

    pub fn read_entry(&self, generation: &Generation) -> Result<String> {
        fs::read_to_string(&generation.archived_path)
            .with_context(|| format!("read {}", generation.archived_path.display()))
    }

    /// A step request against this lineage with a zero spawn delay.
    pub fn step_request(&self, policy: SuccessorPolicy) -> StepRequest {
        StepRequest {
            root: self.root().to_path_buf(),
            archive_dir: self.archive_dir(),
            artifact: None,
            model: Some("test-model".to_string()),
            interval_secs: Some(0),
            policy,
            config: PipelineConfig::default(),
        }
    }
}
