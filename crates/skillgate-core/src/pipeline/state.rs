//! Per-bundle state machine.
//!
//! ```text
//! Intake ─▶ Scanning ─┬─▶ Gating ─┬─▶ Routing ─▶ Sorted
//!    │                │           └─▶ QuarantinedByWorthiness
//!    │                └─▶ QuarantinedBySecurity
//!    └─▶ RejectedMalformed
//! ```
//!
//! Evaluation is pure: it reads the bundle folder and the shared context
//! and never touches the filesystem otherwise. Sweeps run the same machine
//! with `Scope::ScanOnly`, where a clean scan concludes as `Sorted` in the
//! bundle's current category.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::bundle::{Bundle, load_bundle};
use crate::error::{IntakeError, MalformedReason};
use crate::pipeline::context::PipelineContext;
use crate::routing::{RoutingDecision, route};
use crate::rules::{ScanResult, scan_bundle};
use crate::worthiness::{WorthinessResult, assess};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Intake,
    Scanning,
    Gating,
    Routing,
    QuarantinedBySecurity,
    QuarantinedByWorthiness,
    Sorted,
    RejectedMalformed,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum QuarantineReason {
    SecurityRisk,
    Unworthy,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", content = "result", rename_all = "snake_case")]
pub enum Evidence {
    Scan(ScanResult),
    Worthiness(WorthinessResult),
}

/// Terminal result for one bundle. Exactly one variant per bundle per run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum PipelineOutcome {
    Sorted {
        category: String,
    },
    Quarantined {
        reason: QuarantineReason,
        evidence: Evidence,
    },
    RejectedMalformed {
        reason: MalformedReason,
    },
}

impl PipelineOutcome {
    /// Quarantined and rejected bundles both go to quarantine.
    pub fn is_held(&self) -> bool {
        !matches!(self, PipelineOutcome::Sorted { .. })
    }
}

/// Which stages a run applies.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Scope {
    /// Scan, gate and route.
    Full,
    /// Scan only; a clean scan keeps the bundle in `category`.
    ScanOnly { category: String },
}

/// Computed artifacts for one bundle, owned by the orchestrator until the
/// report is written.
#[derive(Debug, Clone)]
pub struct Evaluation {
    pub bundle_id: String,
    pub source: PathBuf,
    pub content_hash: Option<String>,
    pub trail: Vec<Stage>,
    pub scan: Option<ScanResult>,
    pub worthiness: Option<WorthinessResult>,
    pub routing: Option<RoutingDecision>,
    pub outcome: PipelineOutcome,
}

enum Step {
    Intake,
    Scanning(Bundle),
    Gating(Bundle),
    Routing(Bundle),
    Done(PipelineOutcome),
}

pub fn evaluate(bundle_id: &str, dir: &Path, ctx: &PipelineContext, scope: &Scope) -> Evaluation {
    let mut eval = Evaluation {
        bundle_id: bundle_id.to_string(),
        source: dir.to_path_buf(),
        content_hash: None,
        trail: Vec::new(),
        scan: None,
        worthiness: None,
        routing: None,
        outcome: PipelineOutcome::RejectedMalformed {
            reason: MalformedReason::MissingDocument,
        },
    };

    let mut step = Step::Intake;
    loop {
        step = match step {
            Step::Intake => {
                eval.trail.push(Stage::Intake);
                match load_bundle(dir) {
                    Ok(bundle) => {
                        eval.content_hash = Some(bundle.content_hash.clone());
                        Step::Scanning(bundle)
                    }
                    Err(err) => {
                        eval.trail.push(Stage::RejectedMalformed);
                        Step::Done(PipelineOutcome::RejectedMalformed {
                            reason: malformed_reason(err),
                        })
                    }
                }
            }
            Step::Scanning(bundle) => {
                eval.trail.push(Stage::Scanning);
                let scan = scan_bundle(&bundle, &ctx.rules, &ctx.allowlist);
                eval.scan = Some(scan.clone());

                if scan.risk.requires_quarantine() {
                    eval.trail.push(Stage::QuarantinedBySecurity);
                    Step::Done(PipelineOutcome::Quarantined {
                        reason: QuarantineReason::SecurityRisk,
                        evidence: Evidence::Scan(scan),
                    })
                } else {
                    match scope {
                        Scope::Full => Step::Gating(bundle),
                        Scope::ScanOnly { category } => {
                            eval.trail.push(Stage::Sorted);
                            Step::Done(PipelineOutcome::Sorted {
                                category: category.clone(),
                            })
                        }
                    }
                }
            }
            Step::Gating(bundle) => {
                eval.trail.push(Stage::Gating);
                let result = assess(&bundle, &ctx.config.worthiness);
                eval.worthiness = Some(result.clone());

                if result.worthy {
                    Step::Routing(bundle)
                } else {
                    eval.trail.push(Stage::QuarantinedByWorthiness);
                    Step::Done(PipelineOutcome::Quarantined {
                        reason: QuarantineReason::Unworthy,
                        evidence: Evidence::Worthiness(result),
                    })
                }
            }
            Step::Routing(bundle) => {
                eval.trail.push(Stage::Routing);
                let decision = route(&bundle, &ctx.taxonomy);
                let category = decision.category.clone();
                eval.routing = Some(decision);
                eval.trail.push(Stage::Sorted);
                Step::Done(PipelineOutcome::Sorted { category })
            }
            Step::Done(outcome) => {
                debug!(bundle = bundle_id, trail = ?eval.trail, "bundle evaluated");
                eval.outcome = outcome;
                return eval;
            }
        };
    }
}

fn malformed_reason(err: IntakeError) -> MalformedReason {
    match err {
        IntakeError::MalformedBundle { reason, .. } => reason,
        other => MalformedReason::Unreadable {
            message: other.to_string(),
        },
    }
}
