//! Run orchestration.
//!
//! A run has two phases:
//!
//! 1. Evaluation: every selected bundle goes through the state machine on a
//!    rayon worker. Pure; no shared mutable state.
//! 2. Application: outcomes are applied one bundle at a time in bundle id
//!    order. Sweep state is persisted after each bundle, so an interrupted
//!    run leaves a fully processed prefix and resumes from there.
//!
//! Preview runs stop after computing the actions of phase 2; neither the
//! library nor the sweep state is written.

pub mod apply;
pub mod context;
pub mod state;
pub mod sweep;

use std::path::PathBuf;

use anyhow::Result;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::RULE_CATALOG_VERSION;
use crate::bundle::discover_bundles;
use crate::bundle::read::folder_name;
use crate::report::model::{BundleReport, RunInfo, RunReport, ToolInfo};
use crate::routing::Taxonomy;
use crate::util::deterministic::sort_by_id;
use crate::util::hash::bundle_dir_hash;

use apply::{Action, apply};
use context::{Layout, PipelineContext};
use state::{Evaluation, PipelineOutcome, Scope, evaluate};
use sweep::SweepState;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RunMode {
    /// Full pipeline over newly submitted bundles.
    Intake,
    /// Scanner only, over sorted bundles that changed since last concluded.
    OnChangeSweep,
    /// Scanner only, over every sorted bundle.
    ScheduledSweep,
}

impl RunMode {
    pub fn is_sweep(self) -> bool {
        !matches!(self, RunMode::Intake)
    }
}

#[derive(Debug, Clone)]
pub struct RunOptions {
    pub root: PathBuf,
    pub config_path: Option<PathBuf>,
    pub mode: RunMode,
    pub dry_run: bool,
}

#[derive(Debug, Clone)]
struct Candidate {
    id: String,
    dir: PathBuf,
    scope: Scope,
    content_hash: String,
}

/// Load configuration and execute one run.
///
/// Configuration errors surface as `IntakeError::ScannerConfig` inside the
/// returned error; no bundle is evaluated in that case.
pub fn run(options: &RunOptions, tool: ToolInfo) -> Result<RunReport> {
    let ctx = PipelineContext::load(&options.root, options.config_path.as_deref())?;
    run_with_context(options, &ctx, tool)
}

pub fn run_with_context(
    options: &RunOptions,
    ctx: &PipelineContext,
    tool: ToolInfo,
) -> Result<RunReport> {
    let layout = ctx.layout(&options.root);
    let mode = options.mode;
    let dry_run = options.dry_run;

    info!(?mode, dry_run, root = %options.root.display(), "starting run");

    let mut sweep_state = SweepState::load(&layout.state_file)?;

    let candidates = match mode {
        RunMode::Intake => intake_candidates(&layout)?,
        RunMode::OnChangeSweep | RunMode::ScheduledSweep => {
            library_candidates(&layout, &ctx.taxonomy)?
        }
    };

    let (pending, skipped): (Vec<Candidate>, Vec<Candidate>) =
        candidates.into_iter().partition(|c| match mode {
            RunMode::Intake => true,
            RunMode::OnChangeSweep => {
                !sweep_state.is_current(&c.id, &c.content_hash, &ctx.fingerprint)
            }
            RunMode::ScheduledSweep => {
                !sweep_state.in_checkpoint(&c.id, &c.content_hash, &ctx.fingerprint)
            }
        });

    // Order is preserved by `collect`, so evaluations line up with `pending`.
    let evaluations: Vec<Evaluation> = pending
        .par_iter()
        .map(|c| evaluate(&c.id, &c.dir, ctx, &c.scope))
        .collect();

    if mode == RunMode::ScheduledSweep && !dry_run {
        sweep_state.begin_checkpoint(&ctx.fingerprint);
        sweep_state.save(&layout.state_file)?;
    }

    let mut bundles = Vec::with_capacity(evaluations.len());
    for (candidate, eval) in pending.iter().zip(evaluations) {
        let action = apply(&eval, ctx, &layout, mode, dry_run);

        if !dry_run && record(&mut sweep_state, candidate, &eval, &action, ctx, mode) {
            sweep_state.save(&layout.state_file)?;
        }

        bundles.push(BundleReport::new(eval, action));
    }

    if mode == RunMode::ScheduledSweep && !dry_run {
        sweep_state.finish_checkpoint();
        sweep_state.save(&layout.state_file)?;
    }

    let run = RunInfo {
        mode,
        dry_run,
        root: options.root.display().to_string(),
        config_fingerprint: ctx.fingerprint.clone(),
        rule_catalog_version: RULE_CATALOG_VERSION.to_string(),
    };
    let report = RunReport::new(
        tool,
        run,
        bundles,
        skipped.into_iter().map(|c| c.id).collect(),
    );

    info!(
        total = report.summary.total,
        sorted = report.summary.sorted,
        quarantined = report.summary.quarantined,
        rejected = report.summary.rejected,
        conflicts = report.summary.conflicts,
        skipped = report.summary.skipped,
        "run finished"
    );

    Ok(report)
}

/// Update sweep bookkeeping for one applied bundle. Returns whether the
/// state changed.
fn record(
    state: &mut SweepState,
    candidate: &Candidate,
    eval: &Evaluation,
    action: &Action,
    ctx: &PipelineContext,
    mode: RunMode,
) -> bool {
    let hash = &candidate.content_hash;

    match mode {
        RunMode::Intake => {
            let (PipelineOutcome::Sorted { .. }, Action::Moved { .. }, Some(routing)) =
                (&eval.outcome, action, &eval.routing)
            else {
                return false;
            };
            let id = format!("{}/{}", routing.folder, folder_name(&candidate.dir));
            state.record(&id, hash, &ctx.fingerprint);
        }
        RunMode::OnChangeSweep | RunMode::ScheduledSweep => {
            if eval.outcome.is_held() {
                state.forget(&candidate.id);
            } else {
                state.record(&candidate.id, hash, &ctx.fingerprint);
            }
            if mode == RunMode::ScheduledSweep {
                state.conclude(&candidate.id, hash);
            }
        }
    }

    true
}

fn intake_candidates(layout: &Layout) -> Result<Vec<Candidate>> {
    let mut candidates: Vec<Candidate> = discover_bundles(&layout.intake)?
        .into_iter()
        .map(|dir| Candidate {
            id: folder_name(&dir),
            content_hash: bundle_dir_hash(&dir),
            scope: Scope::Full,
            dir,
        })
        .collect();
    sort_by_id(&mut candidates, |c| c.id.as_str());
    Ok(candidates)
}

/// Every `<library>/<category-folder>/<bundle>` directory.
fn library_candidates(layout: &Layout, taxonomy: &Taxonomy) -> Result<Vec<Candidate>> {
    let mut candidates = Vec::new();
    for category_dir in discover_bundles(&layout.library)? {
        let folder = folder_name(&category_dir);
        let category = taxonomy.name_for_folder(&folder);
        for dir in discover_bundles(&category_dir)? {
            candidates.push(Candidate {
                id: format!("{folder}/{}", folder_name(&dir)),
                content_hash: bundle_dir_hash(&dir),
                scope: Scope::ScanOnly {
                    category: category.clone(),
                },
                dir,
            });
        }
    }
    sort_by_id(&mut candidates, |c| c.id.as_str());
    Ok(candidates)
}
