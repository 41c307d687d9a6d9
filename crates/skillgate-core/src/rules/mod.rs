pub mod catalog;
pub mod classify;
pub mod confirm;
pub mod eval;

pub use catalog::{FindingCategory, RuleId, RuleSet};
pub use classify::RiskLevel;
pub use eval::{Allowlist, Finding, ScanResult, Source, scan_bundle};
