//! Filesystem mutation for one evaluated bundle.
//!
//! The only step that changes the library. Each bundle moves with a single
//! directory rename, so a bundle is either fully in its source location or
//! fully at its destination. A failure here affects only this bundle.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::SCHEMA_VERSION;
use crate::error::IntakeError;
use crate::pipeline::RunMode;
use crate::pipeline::context::{Layout, PipelineContext};
use crate::pipeline::state::{Evaluation, PipelineOutcome};
use crate::report::model::FindingsArtifact;

/// Reviewer context file placed inside quarantined bundles.
pub const FINDINGS_ARTIFACT: &str = "quarantine.json";

/// What happened on disk. Paths are relative to the library root.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Action {
    Moved { to: String },
    /// Preview only: the move that would have happened.
    Planned { to: String },
    Unchanged,
    Conflict { destination: String },
    Failed { error: String },
}

/// Where the bundle belongs after this run, or `None` to leave it.
pub fn destination(eval: &Evaluation, layout: &Layout, mode: RunMode) -> Option<PathBuf> {
    let leaf = eval.source.file_name()?;

    match &eval.outcome {
        PipelineOutcome::Quarantined { .. } | PipelineOutcome::RejectedMalformed { .. } => {
            Some(layout.quarantine.join(leaf))
        }
        PipelineOutcome::Sorted { .. } if mode == RunMode::Intake => {
            let folder = &eval.routing.as_ref()?.folder;
            Some(layout.library.join(folder).join(leaf))
        }
        PipelineOutcome::Sorted { .. } => None,
    }
}

pub fn apply(
    eval: &Evaluation,
    ctx: &PipelineContext,
    layout: &Layout,
    mode: RunMode,
    dry_run: bool,
) -> Action {
    let Some(dest) = destination(eval, layout, mode) else {
        return Action::Unchanged;
    };
    let to = layout.relative(&dest);

    if dry_run {
        return if dest.exists() {
            Action::Conflict { destination: to }
        } else {
            Action::Planned { to }
        };
    }

    match move_bundle(eval, ctx, layout, &dest) {
        Ok(()) => {
            if mode.is_sweep() {
                warn!(bundle = %eval.bundle_id, to = %to, "sorted bundle demoted to quarantine");
            } else {
                info!(bundle = %eval.bundle_id, to = %to, "bundle moved");
            }
            Action::Moved { to }
        }
        Err(IntakeError::DestinationConflict { .. }) => {
            warn!(bundle = %eval.bundle_id, destination = %to, "destination occupied, bundle left in place");
            Action::Conflict { destination: to }
        }
        Err(err) => {
            warn!(bundle = %eval.bundle_id, error = %err, "bundle move failed, bundle left in place");
            Action::Failed {
                error: err.to_string(),
            }
        }
    }
}

fn move_bundle(
    eval: &Evaluation,
    ctx: &PipelineContext,
    layout: &Layout,
    dest: &Path,
) -> Result<(), IntakeError> {
    if dest.exists() {
        return Err(IntakeError::DestinationConflict {
            destination: dest.to_path_buf(),
        });
    }

    if let Some(parent) = dest.parent() {
        fs::create_dir_all(parent).map_err(|e| IntakeError::io(parent, e))?;
    }

    let staged = if eval.outcome.is_held() {
        Some(StagedArtifact::write(eval, ctx, layout)?)
    } else {
        None
    };

    if let Err(err) = fs::rename(&eval.source, dest) {
        let err = IntakeError::io(&eval.source, err);
        return Err(match staged {
            Some(staged) => staged.abandon(err),
            None => err,
        });
    }

    Ok(())
}

/// Findings artifact written into the source folder ahead of the rename,
/// with whatever it replaced kept for rollback.
struct StagedArtifact {
    path: PathBuf,
    previous: Option<Vec<u8>>,
}

impl StagedArtifact {
    fn write(eval: &Evaluation, ctx: &PipelineContext, layout: &Layout) -> Result<Self, IntakeError> {
        let artifact = FindingsArtifact {
            schema_version: SCHEMA_VERSION.to_string(),
            bundle: eval.bundle_id.clone(),
            origin: layout.relative(&eval.source),
            outcome: eval.outcome.clone(),
            scan: eval.scan.clone(),
            worthiness: eval.worthiness.clone(),
            config_fingerprint: ctx.fingerprint.clone(),
        };

        let path = eval.source.join(FINDINGS_ARTIFACT);
        let bytes = serde_json::to_vec_pretty(&artifact)
            .map_err(|e| IntakeError::io(&path, io::Error::other(e)))?;
        let previous = fs::read(&path).ok();
        fs::write(&path, bytes).map_err(|e| IntakeError::io(&path, e))?;

        Ok(Self { path, previous })
    }

    /// Restore what the write replaced after `cause` stopped the move. If
    /// that fails too, the rollback error is what gets reported.
    fn abandon(self, cause: IntakeError) -> IntakeError {
        let restored = match &self.previous {
            Some(bytes) => fs::write(&self.path, bytes),
            None => fs::remove_file(&self.path),
        };

        match restored {
            Ok(()) => cause,
            Err(source) => {
                warn!(path = %self.path.display(), error = %source, "findings artifact rollback failed");
                IntakeError::ArtifactRollback {
                    path: self.path,
                    cause: cause.to_string(),
                    source,
                }
            }
        }
    }
}
