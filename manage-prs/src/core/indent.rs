//! Indentation style detection for text documents.

use std::collections::BTreeMap;

use crate::core::scan;

/// Per-level indentation increment of a document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndentStyle {
    Tabs,
    Spaces(usize),
}

impl IndentStyle {
    /// Used when sampling is inconclusive.
    pub const DEFAULT: IndentStyle = IndentStyle::Spaces(4);

    /// The string for one indentation level.
    pub fn unit(self) -> String {
        match self {
            IndentStyle::Tabs => "\t".to_string(),
            IndentStyle::Spaces(n) => " ".repeat(n),
        }
    }
}

/// Sample every indented line and infer the style.
///
/// Tabs win when tab-indented lines outnumber space-indented ones; for
/// spaces the most common positive step between consecutive lines is the
/// increment (smaller wins ties). An even split between tabs and spaces, or
/// a document with no indented lines, yields [`IndentStyle::DEFAULT`].
pub fn detect(text: &str) -> IndentStyle {
    let mut tab_lines = 0usize;
    let mut space_lines = 0usize;
    let mut steps: BTreeMap<usize, usize> = BTreeMap::new();
    let mut previous = 0usize;

    for line in text.lines() {
        let body = line.trim_start_matches([' ', '\t']);
        if body.trim().is_empty() || body.starts_with('*') {
            continue;
        }
        let lead = &line[..line.len() - body.len()];
        if lead.is_empty() {
            previous = 0;
            continue;
        }
        if lead.bytes().all(|b| b == b'\t') {
            tab_lines += 1;
            continue;
        }
        if lead.contains('\t') {
            continue;
        }
        space_lines += 1;
        let width = lead.len();
        if width > previous {
            *steps.entry(width - previous).or_default() += 1;
        }
        previous = width;
    }

    if tab_lines > space_lines {
        return IndentStyle::Tabs;
    }
    if space_lines == 0 || tab_lines == space_lines {
        return IndentStyle::DEFAULT;
    }
    steps
        .iter()
        .max_by(|a, b| a.1.cmp(b.1).then(b.0.cmp(a.0)))
        .map_or(IndentStyle::DEFAULT, |(step, _)| IndentStyle::Spaces(*step))
}

/// Indentation conflict between sibling lines.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Conflict {
    pub first: String,
    pub second: String,
}

/// The indentation shared by every position in `starts` that begins its
/// own line. Positions that share a line with earlier content are ignored.
///
/// Returns `Ok(None)` when no position begins a line.
pub fn shared_indent(
    text: &str,
    starts: impl IntoIterator<Item = usize>,
) -> Result<Option<String>, Conflict> {
    let mut found: Option<&str> = None;
    for pos in starts {
        if !scan::starts_line(text, pos) {
            continue;
        }
        let indent = scan::line_indent(text, pos);
        match found {
            None => found = Some(indent),
            Some(existing) if existing != indent => {
                return Err(Conflict {
                    first: existing.to_string(),
                    second: indent.to_string(),
                });
            }
            Some(_) => {}
        }
    }
    Ok(found.map(str::to_string))
}

/// `"\r\n"` when the document already uses CRLF line endings.
pub fn newline(text: &str) -> &'static str {
    if text.contains("\r\n") { "\r\n" } else { "\n" }
}
