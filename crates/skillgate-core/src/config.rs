//! Run configuration.
//!
//! Loaded once per run from `skillgate.toml` (or an explicit path) and
//! threaded through the scanner, gate and router as a plain value. Every
//! section is optional; missing keys fall back to the defaults below.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::IntakeError;

pub const DEFAULT_CONFIG_FILE: &str = "skillgate.toml";

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct PipelineConfig {
    pub layout: LayoutConfig,
    pub scanner: ScanConfig,
    pub worthiness: WorthinessConfig,
    pub routing: RoutingConfig,
}

/// Folder names relative to the library root.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct LayoutConfig {
    pub intake: String,
    pub library: String,
    pub quarantine: String,
    pub state_dir: String,
}

impl Default for LayoutConfig {
    fn default() -> Self {
        Self {
            intake: "intake".into(),
            library: "skills".into(),
            quarantine: "quarantine".into(),
            state_dir: ".skillgate".into(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct ScanConfig {
    /// Inline known-safe phrases.
    pub allowlist: Vec<String>,
    /// File with one phrase per line; `#` starts a comment line. Relative
    /// paths resolve against the config file's directory.
    pub allowlist_file: Option<PathBuf>,
}

/// Weights and thresholds of the worthiness gate.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct WorthinessConfig {
    pub pass_score: u32,
    pub trigger_points: u32,
    pub heading_points: u32,
    pub substance_points: u32,
    pub length_points: u32,
    pub min_body_words: usize,
    pub max_body_lines: usize,
    pub length_penalty_per_100_lines: u32,
    pub unreferenced_folder_penalty: u32,
    /// Lowercase phrases that mark a description as saying when to use it.
    pub trigger_phrases: Vec<String>,
}

impl Default for WorthinessConfig {
    fn default() -> Self {
        Self {
            pass_score: 70,
            trigger_points: 25,
            heading_points: 25,
            substance_points: 25,
            length_points: 25,
            min_body_words: 30,
            max_body_lines: 500,
            length_penalty_per_100_lines: 10,
            unreferenced_folder_penalty: 10,
            trigger_phrases: [
                "use when",
                "use this when",
                "use this skill when",
                "use it when",
                "use for",
                "when the user",
                "when you need",
                "triggers on",
                "invoke when",
            ]
            .into_iter()
            .map(String::from)
            .collect(),
        }
    }
}

impl WorthinessConfig {
    /// Score of a bundle that loses no points, capped at 100.
    pub fn budget(&self) -> u32 {
        self.trigger_points
            .saturating_add(self.heading_points)
            .saturating_add(self.substance_points)
            .saturating_add(self.length_points)
            .min(100)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct RoutingConfig {
    /// Minimum keyword hits the best category needs to win.
    pub min_keyword_hits: u32,
    pub fallback: String,
    /// Supported categories. Declaration order is the tie-break priority.
    pub categories: Vec<CategoryConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct CategoryConfig {
    pub name: String,
    /// Folder under the library root; defaults to the slugged name.
    #[serde(default)]
    pub folder: Option<String>,
    #[serde(default)]
    pub keywords: Vec<String>,
}

impl CategoryConfig {
    fn new(name: &str, keywords: &[&str]) -> Self {
        Self {
            name: name.into(),
            folder: None,
            keywords: keywords.iter().map(|k| k.to_string()).collect(),
        }
    }
}

impl Default for RoutingConfig {
    fn default() -> Self {
        Self {
            min_keyword_hits: 2,
            fallback: "unsorted".into(),
            categories: vec![
                CategoryConfig::new(
                    "Development",
                    &["code", "refactor", "debug", "git", "api", "programming", "compiler"],
                ),
                CategoryConfig::new(
                    "Tooling",
                    &["cli", "tool", "tooling", "script", "automation", "workflow", "build"],
                ),
                CategoryConfig::new(
                    "Data",
                    &["data", "csv", "sql", "database", "spreadsheet", "analytics"],
                ),
                CategoryConfig::new(
                    "Documents",
                    &["pdf", "docx", "document", "slides", "presentation"],
                ),
                CategoryConfig::new("Design", &["design", "ui", "ux", "figma", "css", "layout"]),
                CategoryConfig::new(
                    "Security",
                    &["security", "audit", "vulnerability", "threat", "encryption"],
                ),
                CategoryConfig::new(
                    "Communication",
                    &["email", "slack", "message", "announcement", "newsletter"],
                ),
                CategoryConfig::new(
                    "Productivity",
                    &["calendar", "task", "todo", "notes", "planning"],
                ),
            ],
        }
    }
}

/// A parsed config plus the directory relative paths resolve against.
#[derive(Debug, Clone)]
pub struct LoadedConfig {
    pub config: PipelineConfig,
    pub base_dir: PathBuf,
    /// Config file actually read, if any.
    pub source: Option<PathBuf>,
}

impl PipelineConfig {
    /// Load configuration for a run rooted at `root`.
    ///
    /// An explicit `path` must exist. Without one, `<root>/skillgate.toml`
    /// is read when present, otherwise built-in defaults apply. Any read or
    /// parse failure is a scanner configuration error.
    pub fn load(root: &Path, path: Option<&Path>) -> Result<LoadedConfig, IntakeError> {
        let candidate = match path {
            Some(p) => Some(p.to_path_buf()),
            None => Some(root.join(DEFAULT_CONFIG_FILE)).filter(|p| p.is_file()),
        };

        let Some(file) = candidate else {
            return Ok(LoadedConfig {
                config: PipelineConfig::default(),
                base_dir: root.to_path_buf(),
                source: None,
            });
        };

        let text = fs::read_to_string(&file).map_err(|e| {
            IntakeError::ScannerConfig(format!("cannot read config {}: {e}", file.display()))
        })?;
        let config = Self::from_toml(&text).map_err(|e| match e {
            IntakeError::ScannerConfig(msg) => {
                IntakeError::ScannerConfig(format!("{}: {msg}", file.display()))
            }
            other => other,
        })?;

        let base_dir = file
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));

        Ok(LoadedConfig {
            config,
            base_dir,
            source: Some(file),
        })
    }

    pub fn from_toml(text: &str) -> Result<Self, IntakeError> {
        let config: PipelineConfig = toml::from_str(text)
            .map_err(|e| IntakeError::ScannerConfig(format!("invalid config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), IntakeError> {
        let w = &self.worthiness;
        if w.pass_score > 100 {
            return Err(IntakeError::ScannerConfig(format!(
                "worthiness.pass_score {} is above 100",
                w.pass_score
            )));
        }
        if w.budget() < w.pass_score {
            return Err(IntakeError::ScannerConfig(format!(
                "worthiness points add up to {}, below pass_score {}",
                w.budget(),
                w.pass_score
            )));
        }
        if self.routing.fallback.trim().is_empty() {
            return Err(IntakeError::ScannerConfig(
                "routing.fallback must not be empty".into(),
            ));
        }
        for (key, value) in [
            ("intake", &self.layout.intake),
            ("library", &self.layout.library),
            ("quarantine", &self.layout.quarantine),
            ("state_dir", &self.layout.state_dir),
        ] {
            if value.trim().is_empty()
                || value.contains("..")
                || Path::new(value).is_absolute()
            {
                return Err(IntakeError::ScannerConfig(format!(
                    "layout.{key} must be a plain relative folder name"
                )));
            }
        }
        Ok(())
    }

    /// Inline allowlist phrases followed by those from `allowlist_file`.
    ///
    /// A configured file that cannot be read fails the run closed.
    pub fn allowlist_phrases(&self, base_dir: &Path) -> Result<Vec<String>, IntakeError> {
        let mut phrases = self.scanner.allowlist.clone();

        if let Some(file) = &self.scanner.allowlist_file {
            let path = base_dir.join(file);
            let text = fs::read_to_string(&path).map_err(|e| {
                IntakeError::ScannerConfig(format!(
                    "cannot read allowlist {}: {e}",
                    path.display()
                ))
            })?;
            phrases.extend(parse_allowlist(&text));
        }

        Ok(phrases)
    }
}

/// One phrase per non-blank line; lines starting with `#` are comments.
pub fn parse_allowlist(text: &str) -> Vec<String> {
    text.lines()
        .map(str::trim)
        .filter(|l| !l.is_empty() && !l.starts_with('#'))
        .map(String::from)
        .collect()
}
