//! Self-rewriting generation pipeline CLI.
//!
//! One `step` invocation advances the lineage by a single generation:
//! archive the current artifact, ask the model to rewrite it, persist
//! the reply, and hand off to a successor process.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use ouroboros::exit_codes;
use ouroboros::io::config::{LineagePaths, PipelineConfig, load_config, write_config};
use ouroboros::io::invoker::CommandInvoker;
use ouroboros::io::spawn::{ProcessLauncher, SuccessorPolicy};
use ouroboros::step::{StepError, StepRequest, run_step};
use ouroboros::validate::{ContractViolations, ValidateRequest, validate_lineage};
use ouroboros::{logging, step};

const SEED_SOURCE: &str = include_str!("../seeds/seed.ts");

#[derive(Parser)]
#[command(
    name = "ouroboros",
    version,
    about = "Self-rewriting generation pipeline"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Seed the artifact and default config for a new lineage.
    Init {
        /// Overwrite existing files.
        #[arg(short, long)]
        force: bool,
    },
    /// Run one generation step: archive, invoke, extract, persist, spawn.
    Step {
        /// Archive directory for this lineage.
        #[arg(long)]
        log: PathBuf,
        /// Current-source artifact (defaults to the configured path).
        #[arg(long)]
        artifact: Option<PathBuf>,
        /// Model identifier passed to the invoker.
        #[arg(short, long)]
        model: Option<String>,
        /// Seconds to wait before spawning the successor.
        #[arg(short, long)]
        interval: Option<u64>,
        /// Delete the artifact after this step instead of spawning.
        #[arg(long, conflicts_with = "no_spawn")]
        self_destruct: bool,
        /// Persist the new source but do not spawn a successor.
        #[arg(long)]
        no_spawn: bool,
    },
    /// Check the artifact and archive against the lineage contract.
    Validate {
        /// Artifact to check (defaults to the configured path).
        #[arg(long)]
        artifact: Option<PathBuf>,
        /// Archive directory to check alongside the artifact.
        #[arg(long)]
        log: Option<PathBuf>,
    },
}

fn main() {
    logging::init();
    if let Err(err) = run() {
        eprintln!("{:#}", err);
        std::process::exit(exit_code_for(&err));
    }
}

fn run() -> Result<()> {
    let cli = Cli::parse();
    match cli.command {
        Command::Init { force } => cmd_init(force),
        Command::Step {
            log,
            artifact,
            model,
            interval,
            self_destruct,
            no_spawn,
        } => cmd_step(log, artifact, model, interval, self_destruct, no_spawn),
        Command::Validate { artifact, log } => cmd_validate(artifact, log),
    }
}

fn exit_code_for(err: &anyhow::Error) -> i32 {
    if err.downcast_ref::<ContractViolations>().is_some() {
        return exit_codes::CONTRACT;
    }
    match err.downcast_ref::<StepError>() {
        Some(StepError::Extraction(_)) => exit_codes::CONTRACT,
        Some(StepError::ArchiveExhausted(_)) => exit_codes::EXHAUSTED,
        _ => exit_codes::INVALID,
    }
}

fn cmd_init(force: bool) -> Result<()> {
    let root = Path::new(".");
    let paths = LineagePaths::new(root);

    if force || !paths.config_path.exists() {
        write_config(&paths.config_path, &PipelineConfig::default())?;
    }
    let cfg = load_config(&paths.config_path)?;

    let artifact = root.join(&cfg.artifact);
    if force || !artifact.exists() {
        fs::write(&artifact, SEED_SOURCE)
            .with_context(|| format!("write seed artifact {}", artifact.display()))?;
    }

    println!(
        "seeded {} (config at {})",
        artifact.display(),
        paths.config_path.display()
    );
    Ok(())
}

fn cmd_step(
    log: PathBuf,
    artifact: Option<PathBuf>,
    model: Option<String>,
    interval: Option<u64>,
    self_destruct: bool,
    no_spawn: bool,
) -> Result<()> {
    let policy = if self_destruct {
        SuccessorPolicy::SelfDestruct
    } else if no_spawn {
        SuccessorPolicy::Halt
    } else {
        SuccessorPolicy::Spawn
    };
    let root = PathBuf::from(".");
    // One read serves both the invoker command and the step settings.
    let paths = LineagePaths::new(&root);
    let cfg = load_config(&paths.config_path)?;
    let invoker = CommandInvoker::new(cfg.invoker.command.clone());

    let request = StepRequest {
        root,
        archive_dir: log,
        artifact,
        model,
        interval_secs: interval,
        policy,
        config: cfg,
    };

    let outcome = run_step(&request, &invoker, &ProcessLauncher)?;
    report_outcome(&outcome);
    Ok(())
}

fn report_outcome(outcome: &step::StepOutcome) {
    println!(
        "generation {} archived to {}",
        outcome.generation.index,
        outcome.generation.archived_path.display()
    );
    if outcome.destructed {
        println!("lineage ended: artifact deleted (self-destruct)");
    } else if outcome.spawned {
        println!("successor launched for {}", outcome.artifact.display());
    } else {
        println!("new generation persisted at {}", outcome.artifact.display());
    }
}

fn cmd_validate(artifact: Option<PathBuf>, log: Option<PathBuf>) -> Result<()> {
    let root = Path::new(".");
    let paths = LineagePaths::new(root);
    let cfg = load_config(&paths.config_path)?;
    let artifact = artifact.unwrap_or_else(|| root.join(&cfg.artifact));

    let violations = validate_lineage(&ValidateRequest {
        artifact,
        archive_dir: log,
    })?;
    if !violations.is_empty() {
        return Err(ContractViolations { violations }.into());
    }
    println!("lineage ok");
    Ok(())
}
