use regex::Regex;

use crate::config::RoutingConfig;
use crate::error::IntakeError;

#[derive(Debug, Clone)]
pub struct Category {
    pub name: String,
    pub folder: String,
    pub keywords: Vec<String>,
    matcher: Option<Regex>,
}

impl Category {
    /// Whole-word, case-insensitive keyword occurrences in `text`.
    pub fn keyword_hits(&self, text: &str) -> u32 {
        self.matcher
            .as_ref()
            .map(|re| re.find_iter(text).count() as u32)
            .unwrap_or(0)
    }
}

/// Closed set of supported categories plus the fallback bucket.
///
/// Category order is the tie-break priority order.
#[derive(Debug, Clone)]
pub struct Taxonomy {
    categories: Vec<Category>,
    fallback: String,
    min_keyword_hits: u32,
}

impl Taxonomy {
    pub fn compile(config: &RoutingConfig) -> Result<Self, IntakeError> {
        let invalid = |msg: String| IntakeError::ScannerConfig(format!("invalid taxonomy: {msg}"));

        let fallback = slug(&config.fallback);
        let mut categories: Vec<Category> = Vec::with_capacity(config.categories.len());

        for entry in &config.categories {
            let name = entry.name.trim();
            if name.is_empty() {
                return Err(invalid("category with empty name".into()));
            }
            let folder = entry
                .folder
                .as_deref()
                .map(str::trim)
                .filter(|f| !f.is_empty())
                .map(String::from)
                .unwrap_or_else(|| slug(name));
            if folder.contains(['/', '\\']) || folder.starts_with('.') {
                return Err(invalid(format!("folder {folder:?} for {name} is not a plain name")));
            }
            if folder == fallback {
                return Err(invalid(format!("{name} uses the fallback folder {fallback:?}")));
            }
            if categories
                .iter()
                .any(|c| c.name.eq_ignore_ascii_case(name) || c.folder == folder)
            {
                return Err(invalid(format!("duplicate category {name}")));
            }

            let keywords: Vec<String> = entry
                .keywords
                .iter()
                .map(|k| k.trim().to_ascii_lowercase())
                .filter(|k| !k.is_empty())
                .collect();
            let matcher = if keywords.is_empty() {
                None
            } else {
                let alternation = keywords
                    .iter()
                    .map(|k| whole_word(k))
                    .collect::<Vec<_>>()
                    .join("|");
                let re = Regex::new(&format!(r"(?i)(?:{alternation})"))
                    .map_err(|e| invalid(format!("keywords for {name}: {e}")))?;
                Some(re)
            };

            categories.push(Category {
                name: name.to_string(),
                folder,
                keywords,
                matcher,
            });
        }

        Ok(Self {
            categories,
            fallback,
            min_keyword_hits: config.min_keyword_hits,
        })
    }

    pub fn categories(&self) -> &[Category] {
        &self.categories
    }

    /// Folder (and reported name) of the fallback bucket.
    pub fn fallback(&self) -> &str {
        &self.fallback
    }

    pub fn min_keyword_hits(&self) -> u32 {
        self.min_keyword_hits
    }

    /// Resolve a declared category by name or folder, case-insensitively.
    pub fn lookup(&self, declared: &str) -> Option<&Category> {
        let declared = declared.trim();
        self.categories.iter().find(|c| {
            c.name.eq_ignore_ascii_case(declared) || c.folder.eq_ignore_ascii_case(declared)
        })
    }

    /// Category name for a library folder; the fallback maps to itself.
    pub fn name_for_folder(&self, folder: &str) -> String {
        self.categories
            .iter()
            .find(|c| c.folder == folder)
            .map(|c| c.name.clone())
            .unwrap_or_else(|| folder.to_string())
    }
}

/// Lowercase, with whitespace runs collapsed into `-`.
pub fn slug(name: &str) -> String {
    name.split_whitespace()
        .map(str::to_lowercase)
        .collect::<Vec<_>>()
        .join("-")
}

/// Escaped keyword with a word boundary on each side that starts or ends
/// with a word character. `\b` next to `+` or `#` would never match.
fn whole_word(keyword: &str) -> String {
    let is_word = |c: Option<char>| c.is_some_and(|c| c.is_alphanumeric() || c == '_');
    let lead = if is_word(keyword.chars().next()) { r"\b" } else { "" };
    let trail = if is_word(keyword.chars().next_back()) { r"\b" } else { "" };
    format!("{lead}{}{trail}", regex::escape(keyword))
}
