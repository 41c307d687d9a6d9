//! Second-stage checks for rules whose pattern only finds candidates.

use base64::{Engine, engine::general_purpose::STANDARD};

use crate::rules::catalog::{Confirm, ENCODED_KEYWORDS};

/// Whether `candidate` passes `check`.
pub fn confirm(check: Confirm, candidate: &str) -> bool {
    match check {
        Confirm::Match => true,
        Confirm::DecodesToKeywords => decodes_to_keywords(candidate),
        Confirm::Entropy(min) => shannon_entropy(candidate) >= min,
        Confirm::Obfuscated => is_obfuscated(candidate),
    }
}

/// Decode as standard base64, ignoring padding and any trailing partial
/// quantum, and look for instruction keywords in the result.
fn decodes_to_keywords(candidate: &str) -> bool {
    let trimmed = candidate.trim_end_matches('=');
    let usable = &trimmed[..trimmed.len() - trimmed.len() % 4];
    let Ok(bytes) = STANDARD.decode(usable) else {
        return false;
    };
    let decoded = String::from_utf8_lossy(&bytes).to_ascii_lowercase();
    ENCODED_KEYWORDS.iter().any(|k| decoded.contains(k))
}

#[allow(clippy::cast_precision_loss)]
pub fn shannon_entropy(s: &str) -> f64 {
    if s.is_empty() {
        return 0.0;
    }
    let len = s.len() as f64;
    let mut freq = [0u32; 256];
    for &b in s.as_bytes() {
        freq[b as usize] += 1;
    }
    freq.iter()
        .filter(|&&count| count > 0)
        .map(|&count| {
            let p = f64::from(count) / len;
            -p * p.log2()
        })
        .sum()
}

fn is_obfuscated(candidate: &str) -> bool {
    let words: Vec<String> = candidate
        .split_whitespace()
        .map(|w| {
            w.trim_matches(|c: char| !c.is_alphanumeric())
                .to_ascii_lowercase()
        })
        .collect();
    !(words.iter().any(|w| w == "ignore") && words.iter().any(|w| w == "previous"))
}
