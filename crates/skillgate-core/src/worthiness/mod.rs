//! Documentation quality gate.
//!
//! Hard-fail checks force quarantine regardless of the numeric score.
//! Scored checks start from a full budget and subtract the points of every
//! failed or penalized check; the result is clamped to `0..=100`.

use serde::{Deserialize, Serialize};

use crate::bundle::Bundle;
use crate::bundle::header::parse_document;
use crate::config::WorthinessConfig;
use crate::error::MalformedReason;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "snake_case")]
pub enum CheckId {
    RequiredDocument,
    HeaderBlock,
    RequiredFields,
    TriggerContext,
    SectionHeadings,
    Substance,
    Length,
    FolderReference,
}

/// A check that failed or cost points.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CheckFinding {
    pub check: CheckId,
    pub hard_fail: bool,
    pub points_lost: u32,
    pub detail: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct WorthinessResult {
    pub score: u32,
    pub worthy: bool,
    pub hard_fail: bool,
    /// In check order.
    pub checks: Vec<CheckFinding>,
}

pub fn assess(bundle: &Bundle, config: &WorthinessConfig) -> WorthinessResult {
    let mut checks = Vec::new();

    hard_checks(bundle, &mut checks);

    let body = bundle.body();
    let description = bundle.header.description.to_ascii_lowercase();

    if !config
        .trigger_phrases
        .iter()
        .any(|p| description.contains(p.to_ascii_lowercase().as_str()))
    {
        checks.push(CheckFinding {
            check: CheckId::TriggerContext,
            hard_fail: false,
            points_lost: config.trigger_points,
            detail: "description does not say when to use the skill".into(),
        });
    }

    let outline = Outline::of(body);

    if !(outline.has_h1 && outline.has_h2) {
        let missing = match (outline.has_h1, outline.has_h2) {
            (false, false) => "top-level and second-level headings",
            (false, true) => "a top-level heading",
            _ => "a second-level heading",
        };
        checks.push(CheckFinding {
            check: CheckId::SectionHeadings,
            hard_fail: false,
            points_lost: config.heading_points,
            detail: format!("body lacks {missing}"),
        });
    }

    if outline.words < config.min_body_words {
        checks.push(CheckFinding {
            check: CheckId::Substance,
            hard_fail: false,
            points_lost: config.substance_points,
            detail: format!(
                "body has {} words, fewer than {}",
                outline.words, config.min_body_words
            ),
        });
    }

    if outline.lines > config.max_body_lines {
        let over = outline.lines - config.max_body_lines;
        let steps = over.div_ceil(100) as u32;
        let lost = steps
            .saturating_mul(config.length_penalty_per_100_lines)
            .min(config.length_points);
        checks.push(CheckFinding {
            check: CheckId::Length,
            hard_fail: false,
            points_lost: lost,
            detail: format!(
                "body has {} lines, {} over the {}-line limit",
                outline.lines, over, config.max_body_lines
            ),
        });
    }

    let lowered = body.to_ascii_lowercase();
    for folder in &bundle.folders {
        if !contains_word(&lowered, folder) {
            checks.push(CheckFinding {
                check: CheckId::FolderReference,
                hard_fail: false,
                points_lost: config.unreferenced_folder_penalty,
                detail: format!("`{folder}/` exists but is never referenced in the body"),
            });
        }
    }

    let budget = config.budget();
    let lost = checks
        .iter()
        .fold(0u32, |acc, c| acc.saturating_add(c.points_lost));
    let score = budget.saturating_sub(lost);
    let hard_fail = checks.iter().any(|c| c.hard_fail);

    WorthinessResult {
        score,
        worthy: !hard_fail && score >= config.pass_score,
        hard_fail,
        checks,
    }
}

/// Structural requirements. The loader already rejects most of these, but
/// the gate re-checks so it holds for any `Bundle` value.
fn hard_checks(bundle: &Bundle, checks: &mut Vec<CheckFinding>) {
    let mut fail = |check, detail: &str| {
        checks.push(CheckFinding {
            check,
            hard_fail: true,
            points_lost: 0,
            detail: detail.into(),
        });
    };

    if bundle.document.trim().is_empty() {
        fail(CheckId::RequiredDocument, "skill document is missing or empty");
        return;
    }

    if let Err(reason) = parse_document(&bundle.document)
        && !matches!(reason, MalformedReason::EmptyField { .. })
    {
        fail(CheckId::HeaderBlock, &reason.to_string());
    }

    if bundle.header.name.trim().is_empty() {
        fail(CheckId::RequiredFields, "header field `name` is empty");
    }
    if bundle.header.description.trim().is_empty() {
        fail(CheckId::RequiredFields, "header field `description` is empty");
    }
}

#[derive(Debug, Default)]
struct Outline {
    has_h1: bool,
    has_h2: bool,
    words: usize,
    lines: usize,
}

impl Outline {
    /// Headings inside fenced code blocks do not count; prose words do not
    /// include heading lines.
    fn of(body: &str) -> Self {
        let mut outline = Outline::default();
        let mut in_fence = false;

        for line in body.lines() {
            outline.lines += 1;
            let trimmed = line.trim_start();

            if trimmed.starts_with("```") || trimmed.starts_with("~~~") {
                in_fence = !in_fence;
                continue;
            }

            if !in_fence {
                if line.starts_with("# ") {
                    outline.has_h1 = true;
                    continue;
                }
                if line.starts_with("## ") {
                    outline.has_h2 = true;
                    continue;
                }
                if line.starts_with('#') && line.trim_start_matches('#').starts_with(' ') {
                    continue;
                }
            }

            outline.words += line
                .split_whitespace()
                .filter(|w| w.chars().any(char::is_alphanumeric))
                .count();
        }

        outline
    }
}

fn contains_word(haystack: &str, word: &str) -> bool {
    haystack.match_indices(word).any(|(i, _)| {
        let before = haystack[..i].chars().next_back();
        let after = haystack[i + word.len()..].chars().next();
        !before.is_some_and(char::is_alphanumeric) && !after.is_some_and(char::is_alphanumeric)
    })
}
