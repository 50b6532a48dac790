//! Orchestration for a single generation step.
//!
//! Ordering is the whole design: the previous body is archived before
//! any risky operation (model call, extraction, spawn) runs, so a
//! lineage is never lost to a failed step. Every post-archival failure
//! is recorded against the just-committed entry and surfaced to the
//! caller; nothing is retried.

use std::path::PathBuf;
use std::thread;
use std::time::Duration;

use anyhow::{Result, anyhow};
use thiserror::Error;
use tracing::{info, instrument, warn};

use crate::core::extract::{self, ExtractionError};
use crate::core::instruction;
use crate::io::archive::{append_error_note, Archive, ArchiveExhausted, Generation};
use crate::io::config::{LineagePaths, PipelineConfig};
use crate::io::invoker::{InvokeRequest, Invoker};
use crate::io::prompt::{DirectiveInputs, render_directive};
use crate::io::source::SourceStore;
use crate::io::spawn::{LaunchPlan, Launcher, SuccessorPolicy};

/// Step failure taxonomy. Every variant is local to one step and never
/// corrupts prior archive entries.
#[derive(Debug, Error)]
pub enum StepError {
    /// Could not durably write the archive snapshot. Fatal before any
    /// risky mutation; nothing to record against.
    #[error("archival failed: {0}")]
    Archival(#[source] anyhow::Error),
    /// The fixed-width index space ran out.
    #[error(transparent)]
    ArchiveExhausted(#[from] ArchiveExhausted),
    /// The model call produced no usable output.
    #[error("model invocation failed: {0}")]
    Invocation(#[source] anyhow::Error),
    /// The reply violated the lineage's structural contract.
    #[error("extraction failed: {0}")]
    Extraction(#[from] ExtractionError),
    /// Could not persist the new current source.
    #[error("persisting new source failed: {0}")]
    Persist(#[source] anyhow::Error),
    /// The successor did not start. The new source is persisted, so
    /// the lineage can be resumed manually.
    #[error("successor spawn failed: {0}")]
    Spawn(#[source] anyhow::Error),
}

impl StepError {
    /// Tag used in archived error notes and operator output.
    pub fn kind(&self) -> &'static str {
        match self {
            StepError::Archival(_) => "archival",
            StepError::ArchiveExhausted(_) => "archive-exhausted",
            StepError::Invocation(_) => "invocation",
            StepError::Extraction(_) => "extraction",
            StepError::Persist(_) => "persist",
            StepError::Spawn(_) => "spawn",
        }
    }
}

/// Parameters for one generation step.
#[derive(Debug, Clone)]
pub struct StepRequest {
    /// Lineage root (where `.ouroboros/` lives).
    pub root: PathBuf,
    /// Archive directory for this lineage.
    pub archive_dir: PathBuf,
    /// Artifact override; defaults to the configured path under root.
    pub artifact: Option<PathBuf>,
    /// Model override; defaults to the configured model.
    pub model: Option<String>,
    /// Pre-spawn delay override in seconds.
    pub interval_secs: Option<u64>,
    pub policy: SuccessorPolicy,
    /// Effective configuration, loaded once by the caller. The step
    /// never re-reads the config file, so an edit mid-step cannot
    /// split its settings.
    pub config: PipelineConfig,
}

/// Result of a completed step.
#[derive(Debug, Clone)]
pub struct StepOutcome {
    /// The archived parent generation.
    pub generation: Generation,
    /// Artifact path now holding the child generation.
    pub artifact: PathBuf,
    pub spawned: bool,
    pub destructed: bool,
}

/// Execute one step of the lineage: load, archive, invoke, extract,
/// persist, then apply the successor policy.
#[instrument(skip_all, fields(archive_dir = %request.archive_dir.display()))]
pub fn run_step<I: Invoker, L: Launcher>(
    request: &StepRequest,
    invoker: &I,
    launcher: &L,
) -> Result<StepOutcome> {
    let paths = LineagePaths::new(&request.root);
    let cfg = &request.config;
    let artifact = request
        .artifact
        .clone()
        .unwrap_or_else(|| request.root.join(&cfg.artifact));
    let model = request.model.clone().unwrap_or_else(|| cfg.model.clone());
    let interval_secs = request.interval_secs.unwrap_or(cfg.spawn_delay_secs);

    let store = SourceStore::new(&artifact);
    let prev_source = store.load()?;

    // The directory, not an in-memory counter, decides the index.
    let archive = Archive::new(&request.archive_dir, store.extension());
    let generation = archive
        .commit(&prev_source)
        .map_err(classify_commit_error)
        .map_err(anyhow::Error::new)?;
    info!(index = generation.index, path = %generation.archived_path.display(), "generation archived");

    let attempt = (|| -> Result<String, StepError> {
        let instruction_text = instruction::extract_instruction(&prev_source)
            .map_err(|err| StepError::Extraction(ExtractionError::InstructionMissing(err)))?;
        let require_span = extract::contains_protected_span(&prev_source);

        let prompt = render_directive(&DirectiveInputs {
            source: &prev_source,
            instruction: instruction_text,
            require_span,
        })
        .map_err(StepError::Invocation)?;

        let reply = invoker
            .generate(&InvokeRequest {
                prompt,
                model: model.clone(),
                timeout: Duration::from_secs(cfg.invoke_timeout_secs),
                output_limit_bytes: cfg.invoker_output_limit_bytes,
                transcript_path: Some(paths.transcript_path.clone()),
            })
            .map_err(StepError::Invocation)?;
        if reply.trim().is_empty() {
            return Err(StepError::Invocation(anyhow!("model returned an empty reply")));
        }

        let candidate = extract::extract(&reply, require_span)?;
        extract::ensure_instruction(&candidate)?;
        Ok(candidate)
    })();

    let candidate = match attempt {
        Ok(candidate) => candidate,
        Err(step_error) => return record_and_bail(&generation, step_error),
    };

    if let Err(err) = store.save(&candidate) {
        return record_and_bail(&generation, StepError::Persist(err));
    }
    info!(index = generation.index + 1, "new generation persisted");

    let mut spawned = false;
    let mut destructed = false;
    match request.policy {
        SuccessorPolicy::SelfDestruct => {
            if let Err(err) = store.remove() {
                return record_and_bail(&generation, StepError::Persist(err));
            }
            info!("lineage ended deliberately (self-destruct)");
            destructed = true;
        }
        SuccessorPolicy::Halt => {
            info!("successor spawn skipped (halt policy)");
        }
        SuccessorPolicy::Spawn => {
            if interval_secs > 0 {
                thread::sleep(Duration::from_secs(interval_secs));
            }
            let launch = LaunchPlan::successor(&artifact, &request.archive_dir, &model, interval_secs)
                .and_then(|plan| launcher.launch(&plan));
            if let Err(err) = launch {
                return record_and_bail(&generation, StepError::Spawn(err));
            }
            spawned = true;
        }
    }

    Ok(StepOutcome {
        generation,
        artifact,
        spawned,
        destructed,
    })
}

fn classify_commit_error(err: anyhow::Error) -> StepError {
    match err.downcast::<ArchiveExhausted>() {
        Ok(exhausted) => StepError::ArchiveExhausted(exhausted),
        Err(err) => StepError::Archival(err),
    }
}

/// Record a post-archival failure against the committed entry, then
/// surface it. A failing error sink must not mask the step error.
fn record_and_bail(generation: &Generation, step_error: StepError) -> Result<StepOutcome> {
    let message = format!("{step_error}");
    if let Err(sink_err) = append_error_note(&generation.archived_path, step_error.kind(), &message)
    {
        warn!(err = %sink_err, "failed to record error note against archive entry");
    }
    Err(anyhow::Error::new(step_error))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::config::write_config;
    use crate::test_support::{RecordingLauncher, ScriptedInvoker, TestLineage, fenced_reply, seed_source};

    #[test]
    fn archival_precedes_invocation() {
        let lineage = TestLineage::new().expect("lineage");
        lineage.seed("add a greeting").expect("seed");

        // Invoker fails, but the parent is already committed.
        let invoker = ScriptedInvoker::failing("network down");
        let launcher = RecordingLauncher::new();
        let err = run_step(&lineage.step_request(SuccessorPolicy::Spawn), &invoker, &launcher)
            .unwrap_err();

        let step_error = err.downcast_ref::<StepError>().expect("step error");
        assert_eq!(step_error.kind(), "invocation");
        assert_eq!(lineage.archive_entries().expect("entries").len(), 1);
        assert!(launcher.plans().is_empty());
    }

    #[test]
    fn step_settings_come_from_the_request_config_not_a_reread() {
        let lineage = TestLineage::new().expect("lineage");
        lineage.seed("add a greeting").expect("seed");

        // A config edit after the request was assembled must not leak
        // into the running step.
        let paths = LineagePaths::new(lineage.root());
        let on_disk = PipelineConfig {
            model: "disk-model".to_string(),
            ..PipelineConfig::default()
        };
        write_config(&paths.config_path, &on_disk).expect("write config");

        let mut request = lineage.step_request(SuccessorPolicy::Halt);
        request.model = None;
        request.config.model = "request-model".to_string();

        let invoker = ScriptedInvoker::replies(vec![&fenced_reply(&seed_source("next"))]);
        let launcher = RecordingLauncher::new();
        run_step(&request, &invoker, &launcher).expect("step");

        assert_eq!(invoker.requests()[0].model, "request-model");
    }

    #[test]
    fn missing_instruction_in_reply_is_a_contract_violation() {
        let lineage = TestLineage::new().expect("lineage");
        lineage.seed("add a greeting").expect("seed");
        let before = lineage.read_artifact().expect("artifact");

        let invoker = ScriptedInvoker::replies(vec!["console.log(1)\n"]);
        let launcher = RecordingLauncher::new();
        let err = run_step(&lineage.step_request(SuccessorPolicy::Spawn), &invoker, &launcher)
            .unwrap_err();

        assert!(matches!(
            err.downcast_ref::<StepError>(),
            Some(StepError::Extraction(ExtractionError::InstructionMissing(_)))
        ));
        // The reply must not be persisted.
        assert_eq!(lineage.read_artifact().expect("artifact"), before);
    }

    #[test]
    fn self_destruct_removes_artifact_and_skips_spawn() {
        let lineage = TestLineage::new().expect("lineage");
        let artifact = lineage.seed("add a greeting").expect("seed");

        let invoker = ScriptedInvoker::replies(vec![&fenced_reply(&seed_source("add a farewell"))]);
        let launcher = RecordingLauncher::new();
        let outcome = run_step(
            &lineage.step_request(SuccessorPolicy::SelfDestruct),
            &invoker,
            &launcher,
        )
        .expect("step");

        assert!(outcome.destructed);
        assert!(!outcome.spawned);
        assert!(!artifact.exists());
        assert!(launcher.plans().is_empty());
        // The lineage history survives the destruct.
        assert_eq!(lineage.archive_entries().expect("entries").len(), 1);
    }
}
