use std::fmt::Write;

use crate::TOOL_NAME;
use crate::pipeline::apply::Action;
use crate::pipeline::state::{Evidence, PipelineOutcome};
use crate::report::model::{BundleReport, RunReport};

pub fn render_text(report: &RunReport) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "{} {}", TOOL_NAME, report.tool.version);
    let _ = writeln!(
        out,
        "Mode: {:?}{}",
        report.run.mode,
        if report.run.dry_run { " (dry run)" } else { "" }
    );
    let _ = writeln!(out, "Bundles:");
    for b in &report.bundles {
        render_bundle(&mut out, b);
    }
    if !report.skipped.is_empty() {
        let _ = writeln!(out, "Skipped (unchanged): {}", report.skipped.join(", "));
    }
    let s = &report.summary;
    let _ = writeln!(
        out,
        "Summary: {} sorted, {} quarantined, {} rejected, {} conflicts, {} failed, {} skipped",
        s.sorted, s.quarantined, s.rejected, s.conflicts, s.failed, s.skipped
    );
    out
}

fn render_bundle(out: &mut String, b: &BundleReport) {
    let outcome = match &b.outcome {
        PipelineOutcome::Sorted { category } => format!("sorted → {category}"),
        PipelineOutcome::Quarantined { reason, evidence } => match evidence {
            Evidence::Scan(scan) => format!(
                "quarantined ({reason:?}): risk {} score {}",
                scan.risk, scan.score
            ),
            Evidence::Worthiness(w) => {
                format!("quarantined ({reason:?}): worthiness {}", w.score)
            }
        },
        PipelineOutcome::RejectedMalformed { reason } => format!("rejected: {reason}"),
    };
    let _ = writeln!(out, "  - {} {} [{}]", b.bundle, outcome, action_label(&b.action));

    if let Some(scan) = &b.scan {
        for f in &scan.findings {
            let _ = writeln!(
                out,
                "      {} {} (+{}{}) {}: {:?}",
                f.rule_id,
                f.title,
                f.weight,
                if f.hard_fail { ", hard fail" } else { "" },
                f.span.file,
                f.excerpt
            );
        }
    }
    if let Some(w) = &b.worthiness {
        for c in &w.checks {
            let _ = writeln!(out, "      {:?} -{}: {}", c.check, c.points_lost, c.detail);
        }
    }
    if let Some(r) = &b.routing {
        let _ = writeln!(out, "      routed via {:?}", r.path);
        if let Some(note) = &r.note {
            let _ = writeln!(out, "      note: {note}");
        }
    }
}

fn action_label(action: &Action) -> String {
    match action {
        Action::Moved { to } => format!("moved to {to}"),
        Action::Planned { to } => format!("would move to {to}"),
        Action::Unchanged => "unchanged".into(),
        Action::Conflict { destination } => format!("conflict: {destination} exists"),
        Action::Failed { error } => format!("failed: {error}"),
    }
}
