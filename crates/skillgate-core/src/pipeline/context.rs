use std::path::{Path, PathBuf};

use crate::RULE_CATALOG_VERSION;
use crate::config::{LayoutConfig, PipelineConfig};
use crate::error::IntakeError;
use crate::routing::Taxonomy;
use crate::rules::{Allowlist, RuleSet};
use crate::util::hash::sha256_hex;

/// Everything a run needs, built once and shared read-only by all workers.
#[derive(Debug, Clone)]
pub struct PipelineContext {
    pub config: PipelineConfig,
    pub rules: RuleSet,
    pub allowlist: Allowlist,
    pub taxonomy: Taxonomy,
    /// Identifies config + allowlist + rule catalog in reports and state.
    pub fingerprint: String,
}

impl PipelineContext {
    /// Load config from disk and compile rules, allowlist and taxonomy.
    ///
    /// Fails closed: any error here aborts the run before a single bundle
    /// is looked at.
    pub fn load(root: &Path, config_path: Option<&Path>) -> Result<Self, IntakeError> {
        let loaded = PipelineConfig::load(root, config_path)?;
        let phrases = loaded.config.allowlist_phrases(&loaded.base_dir)?;
        Self::build(loaded.config, phrases)
    }

    pub fn build(config: PipelineConfig, allowlist_phrases: Vec<String>) -> Result<Self, IntakeError> {
        config.validate()?;
        let rules = RuleSet::builtin()?;
        let allowlist = Allowlist::new(&allowlist_phrases)?;
        let taxonomy = Taxonomy::compile(&config.routing)?;
        let fingerprint = fingerprint(&config, &allowlist)?;

        Ok(Self {
            config,
            rules,
            allowlist,
            taxonomy,
            fingerprint,
        })
    }

    pub fn layout(&self, root: &Path) -> Layout {
        Layout::new(root, &self.config.layout)
    }
}

fn fingerprint(config: &PipelineConfig, allowlist: &Allowlist) -> Result<String, IntakeError> {
    let mut canonical = serde_json::to_vec(config)
        .map_err(|e| IntakeError::ScannerConfig(format!("cannot serialize config: {e}")))?;
    for phrase in allowlist.phrases() {
        canonical.push(0);
        canonical.extend_from_slice(phrase.as_bytes());
    }
    canonical.push(0);
    canonical.extend_from_slice(RULE_CATALOG_VERSION.as_bytes());
    Ok(sha256_hex(&canonical))
}

/// Absolute folder locations for one library root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Layout {
    pub root: PathBuf,
    pub intake: PathBuf,
    pub library: PathBuf,
    pub quarantine: PathBuf,
    pub state_file: PathBuf,
}

impl Layout {
    pub fn new(root: &Path, layout: &LayoutConfig) -> Self {
        Self {
            root: root.to_path_buf(),
            intake: root.join(&layout.intake),
            library: root.join(&layout.library),
            quarantine: root.join(&layout.quarantine),
            state_file: root.join(&layout.state_dir).join("state.json"),
        }
    }

    /// `path` relative to the root, for reports.
    pub fn relative(&self, path: &Path) -> String {
        path.strip_prefix(&self.root)
            .unwrap_or(path)
            .to_string_lossy()
            .replace('\\', "/")
    }
}
