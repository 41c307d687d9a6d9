//! Risk classification for scanner results.
//!
//! This module derives a risk level from an aggregate score and the
//! hard-fail flag.
//!
//! Responsibilities:
//! - Map a score onto a fixed set of risk bands
//! - Let hard-fail rules override the score
//! - Decide which levels require quarantine
//!
//! Non-responsibilities:
//! - Evaluating rule patterns (handled in `rules::eval`)
//! - Moving bundles (handled in `pipeline::apply`)
//!
//! The policy is intentionally simple and explainable:
//!
//!   - Any hard-fail rule matched → HIGH
//!   - Else score ≥ 60            → HIGH
//!   - Else score ≥ 30            → REVIEW
//!   - Else                       → LOW
//!
//! It is a total function of its inputs and does not depend on the order in
//! which rules matched.

use serde::{Deserialize, Serialize};

pub const REVIEW_THRESHOLD: u32 = 30;
pub const HIGH_THRESHOLD: u32 = 60;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "snake_case")]
pub enum RiskLevel {
    Low,
    Review,
    High,
}

impl RiskLevel {
    /// `review` and `high` both hold the bundle for a human.
    pub fn requires_quarantine(self) -> bool {
        !matches!(self, RiskLevel::Low)
    }
}

impl std::fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            RiskLevel::Low => "low",
            RiskLevel::Review => "review",
            RiskLevel::High => "high",
        };
        f.write_str(s)
    }
}

/// Derives the risk level for an aggregate scanner score.
pub fn classify(score: u32, hard_fail: bool) -> RiskLevel {
    if hard_fail || score >= HIGH_THRESHOLD {
        RiskLevel::High
    } else if score >= REVIEW_THRESHOLD {
        RiskLevel::Review
    } else {
        RiskLevel::Low
    }
}
