//! Header block parsing.
//!
//! A skill document opens with a delimited key-value block:
//!
//! ```text
//! ---
//! name: pdf-tools
//! description: >
//!   Use when the user needs to split or merge PDFs.
//! category: Documents
//! ---
//! # PDF tools
//! ```
//!
//! Only the flat subset needed for intake is understood: `key: value` lines,
//! quoted values, `>`/`|` block scalars and indented continuation lines.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::MalformedReason;

pub const DELIMITER: &str = "---";

/// Parsed header fields.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Header {
    pub name: String,
    pub description: String,
    /// Explicit category declaration, if any.
    pub category: Option<String>,
    /// Remaining keys, in sorted order.
    pub extra: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedDocument {
    pub header: Header,
    pub body_offset: usize,
}

/// Split `text` into header fields and the offset where the body starts.
pub fn parse_document(text: &str) -> Result<ParsedDocument, MalformedReason> {
    let mut lines = text.split_inclusive('\n');

    let first = lines.next().ok_or(MalformedReason::HeaderNotFirst)?;
    if !is_delimiter(first) {
        return Err(MalformedReason::HeaderNotFirst);
    }

    let mut offset = first.len();
    let mut header_lines = Vec::new();
    let mut closed = false;

    for line in lines {
        offset += line.len();
        if is_delimiter(line) {
            closed = true;
            break;
        }
        header_lines.push(strip_eol(line));
    }

    if !closed {
        return Err(MalformedReason::UnterminatedHeader);
    }

    let entries = parse_entries(&header_lines)?;
    let header = build_header(entries)?;

    Ok(ParsedDocument {
        header,
        body_offset: offset,
    })
}

/// A delimiter line is `---` followed only by spaces or tabs. The same rule
/// applies to the opening and the closing line.
fn is_delimiter(line: &str) -> bool {
    strip_eol(line).trim_end_matches([' ', '\t']) == DELIMITER
}

fn parse_entries(lines: &[&str]) -> Result<Vec<(String, String)>, MalformedReason> {
    let mut entries: Vec<(String, String)> = Vec::new();

    for (idx, raw) in lines.iter().enumerate() {
        // Line 1 is the opening delimiter.
        let line_no = idx + 2;

        if raw.trim().is_empty() {
            continue;
        }

        if raw.starts_with(' ') || raw.starts_with('\t') {
            let Some((_, value)) = entries.last_mut() else {
                return Err(MalformedReason::InvalidHeaderLine { line: line_no });
            };
            let piece = raw.trim();
            if value.is_empty() {
                value.push_str(piece);
            } else {
                value.push(' ');
                value.push_str(piece);
            }
            continue;
        }

        if raw.starts_with('#') {
            continue;
        }

        let Some((key, value)) = raw.split_once(':') else {
            return Err(MalformedReason::InvalidHeaderLine { line: line_no });
        };
        let key = key.trim();
        if key.is_empty() || key.contains(char::is_whitespace) {
            return Err(MalformedReason::InvalidHeaderLine { line: line_no });
        }

        let value = value.trim();
        let value = match value {
            ">" | "|" | ">-" | "|-" | ">+" | "|+" => String::new(),
            other => unquote(other).to_string(),
        };

        entries.push((key.to_ascii_lowercase(), value));
    }

    Ok(entries)
}

fn build_header(entries: Vec<(String, String)>) -> Result<Header, MalformedReason> {
    let mut header = Header::default();

    // Later duplicates win.
    for (key, value) in entries {
        match key.as_str() {
            "name" => header.name = value,
            "description" => header.description = value,
            "category" => {
                header.category = Some(value).filter(|v| !v.trim().is_empty());
            }
            _ => {
                header.extra.insert(key, value);
            }
        }
    }

    for (field, value) in [("name", &header.name), ("description", &header.description)] {
        if value.trim().is_empty() {
            return Err(MalformedReason::EmptyField {
                field: field.to_string(),
            });
        }
    }

    Ok(header)
}

fn strip_eol(line: &str) -> &str {
    line.trim_end_matches('\n').trim_end_matches('\r')
}

fn unquote(value: &str) -> &str {
    let bytes = value.as_bytes();
    if bytes.len() >= 2 {
        let (first, last) = (bytes[0], bytes[bytes.len() - 1]);
        if (first == b'"' || first == b'\'') && first == last {
            return &value[1..value.len() - 1];
        }
    }
    value
}
