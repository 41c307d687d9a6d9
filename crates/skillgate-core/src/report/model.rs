use serde::{Deserialize, Serialize};

use crate::SCHEMA_VERSION;
use crate::pipeline::RunMode;
use crate::pipeline::apply::Action;
use crate::pipeline::state::{Evaluation, PipelineOutcome, Stage};
use crate::routing::RoutingDecision;
use crate::rules::ScanResult;
use crate::util::deterministic::sort_bundle_reports;
use crate::worthiness::WorthinessResult;

/// Top-level run report.
///
/// Deterministic for identical library contents and configuration:
/// bundles are listed in bundle id order regardless of the order workers
/// finished in.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub schema_version: String,
    pub tool: ToolInfo,
    pub run: RunInfo,
    pub bundles: Vec<BundleReport>,
    /// Bundles left untouched because they were already concluded with
    /// unchanged content.
    pub skipped: Vec<String>,
    pub summary: Summary,
}

impl RunReport {
    pub fn new(
        tool: ToolInfo,
        run: RunInfo,
        mut bundles: Vec<BundleReport>,
        mut skipped: Vec<String>,
    ) -> Self {
        sort_bundle_reports(&mut bundles);
        skipped.sort();
        let summary = Summary::tally(&bundles, skipped.len(), run.dry_run);

        Self {
            schema_version: SCHEMA_VERSION.to_string(),
            tool,
            run,
            bundles,
            skipped,
            summary,
        }
    }
}

/// Tool metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolInfo {
    pub name: String,
    pub version: String,
    pub commit: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunInfo {
    pub mode: RunMode,
    pub dry_run: bool,
    pub root: String,
    pub config_fingerprint: String,
    pub rule_catalog_version: String,
}

/// Everything needed to explain one bundle's outcome.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BundleReport {
    pub bundle: String,
    pub source: String,
    pub content_hash: Option<String>,
    pub trail: Vec<Stage>,
    pub outcome: PipelineOutcome,
    pub scan: Option<ScanResult>,
    pub worthiness: Option<WorthinessResult>,
    pub routing: Option<RoutingDecision>,
    pub action: Action,
}

impl BundleReport {
    pub fn new(evaluation: Evaluation, action: Action) -> Self {
        Self {
            bundle: evaluation.bundle_id,
            source: evaluation.source.display().to_string(),
            content_hash: evaluation.content_hash,
            trail: evaluation.trail,
            outcome: evaluation.outcome,
            scan: evaluation.scan,
            worthiness: evaluation.worthiness,
            routing: evaluation.routing,
            action,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Summary {
    pub total: usize,
    pub sorted: usize,
    pub quarantined: usize,
    pub rejected: usize,
    pub conflicts: usize,
    pub failed: usize,
    pub skipped: usize,
    /// 0 clean, 1 when a non-preview run held back at least one bundle.
    pub exit_code: i32,
}

impl Summary {
    pub fn tally(bundles: &[BundleReport], skipped: usize, dry_run: bool) -> Self {
        let mut summary = Summary {
            total: bundles.len(),
            skipped,
            ..Default::default()
        };

        for b in bundles {
            match b.outcome {
                PipelineOutcome::Sorted { .. } => summary.sorted += 1,
                PipelineOutcome::Quarantined { .. } => summary.quarantined += 1,
                PipelineOutcome::RejectedMalformed { .. } => summary.rejected += 1,
            }
            match b.action {
                Action::Conflict { .. } => summary.conflicts += 1,
                Action::Failed { .. } => summary.failed += 1,
                _ => {}
            }
        }

        let blocked = summary.quarantined + summary.rejected > 0;
        summary.exit_code = if blocked && !dry_run { 1 } else { 0 };
        summary
    }
}

/// Reviewer context written into a quarantined bundle as `quarantine.json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FindingsArtifact {
    pub schema_version: String,
    pub bundle: String,
    /// Location the bundle was moved from, relative to the library root.
    pub origin: String,
    pub outcome: PipelineOutcome,
    pub scan: Option<ScanResult>,
    pub worthiness: Option<WorthinessResult>,
    pub config_fingerprint: String,
}
