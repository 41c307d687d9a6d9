pub mod bundle;
pub mod config;
pub mod error;
pub mod pipeline;
pub mod report;
pub mod routing;
pub mod rules;
pub mod util;
pub mod worthiness;

pub use error::{IntakeError, MalformedReason};
pub use pipeline::{RunMode, RunOptions, run};

pub const TOOL_NAME: &str = "skillgate";

/// JSON schema version of run reports and findings artifacts.
/// Bump only when the serialized shape changes semantically.
pub const SCHEMA_VERSION: &str = "0.1.0";

pub const RULE_CATALOG_VERSION: &str = "0.2.0";
