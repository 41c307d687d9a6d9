//! Destination resolution for bundles that passed both gates.
//!
//! Strict precedence:
//!
//! 1. A declared category that belongs to the taxonomy.
//! 2. The category with the most keyword hits over folder name and body,
//!    ties going to the earlier category in taxonomy order.
//! 3. The fallback bucket, when no category reaches `min_keyword_hits`.
//!
//! Ambiguity is never an error; every input resolves to exactly one
//! destination.

pub mod taxonomy;

use serde::{Deserialize, Serialize};

use crate::bundle::Bundle;

pub use taxonomy::{Category, Taxonomy};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionPath {
    Explicit,
    Keyword,
    Fallback,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CategoryScore {
    pub category: String,
    pub hits: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RoutingDecision {
    pub category: String,
    /// Folder under the library root.
    pub folder: String,
    pub path: ResolutionPath,
    /// Keyword hits per category in priority order; empty on the explicit
    /// path.
    pub scores: Vec<CategoryScore>,
    pub note: Option<String>,
}

pub fn route(bundle: &Bundle, taxonomy: &Taxonomy) -> RoutingDecision {
    let mut note = None;

    if let Some(declared) = bundle.header.category.as_deref() {
        match taxonomy.lookup(declared) {
            Some(category) => {
                return RoutingDecision {
                    category: category.name.clone(),
                    folder: category.folder.clone(),
                    path: ResolutionPath::Explicit,
                    scores: Vec::new(),
                    note: None,
                };
            }
            None => {
                note = Some(format!(
                    "declared category {declared:?} is not in the taxonomy"
                ));
            }
        }
    }

    // `_` and `-` are word characters or punctuation in folder names; treat
    // both as separators so `pdf-tools` and `pdf_tools` hit `pdf`.
    let haystack = format!("{}\n{}", bundle.id.replace(['-', '_'], " "), bundle.body());

    let scores: Vec<CategoryScore> = taxonomy
        .categories()
        .iter()
        .map(|c| CategoryScore {
            category: c.name.clone(),
            hits: c.keyword_hits(&haystack),
        })
        .collect();

    // Strictly greater keeps the earliest category on ties.
    let mut best: Option<(usize, u32)> = None;
    for (idx, score) in scores.iter().enumerate() {
        if best.is_none_or(|(_, hits)| score.hits > hits) {
            best = Some((idx, score.hits));
        }
    }

    match best {
        Some((idx, hits)) if hits > 0 && hits >= taxonomy.min_keyword_hits() => {
            let category = &taxonomy.categories()[idx];
            RoutingDecision {
                category: category.name.clone(),
                folder: category.folder.clone(),
                path: ResolutionPath::Keyword,
                scores,
                note,
            }
        }
        _ => RoutingDecision {
            category: taxonomy.fallback().to_string(),
            folder: taxonomy.fallback().to_string(),
            path: ResolutionPath::Fallback,
            scores,
            note,
        },
    }
}
