//! Bring copyright years in README and LICENSE up to date.

use std::sync::LazyLock;

use anyhow::Result;
use regex::Regex;
use tracing::{debug, info};

use super::{Invocation, Template, Workspace};

const README: &str = "README.md";
const LICENSE: &str = "LICENSE";

/// Year every outdated notice is extended to.
pub const TARGET_YEAR: u32 = 2025;
/// Years beyond this are typos and get corrected back to [`TARGET_YEAR`].
pub const MAX_YEAR: u32 = 2026;

static LICENSE_HEADING: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?mi)^##?\s+License\s*$").expect("valid regex"));
static ANY_HEADING: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^##?\s+").expect("valid regex"));
static NOTICE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)Copyright\s+\(c\)\s+(\d{4})\b(?:\s*-\s*(\d{4})\b)?[^\n]*")
        .expect("valid regex")
});

#[derive(Debug)]
pub struct FixCopyrightYear;

struct Notice {
    start_year: u32,
    start: std::ops::Range<usize>,
    end_year: Option<u32>,
    /// Span from the end of the start year through the end year.
    range_tail: Option<std::ops::Range<usize>>,
}

impl Notice {
    fn newest(&self) -> u32 {
        self.end_year.unwrap_or(self.start_year)
    }
}

/// Update the newest copyright notice of `text[from..to]`.
///
/// Returns the new text, or `None` when the newest notice is current.
fn bump_span(text: &str, from: usize, to: usize) -> Option<String> {
    let section = &text[from..to];
    let mut newest: Option<Notice> = None;
    for caps in NOTICE.captures_iter(section) {
        let (Some(start), Ok(start_year)) = (caps.get(1), caps[1].parse::<u32>()) else {
            continue;
        };
        let end = caps.get(2);
        let notice = Notice {
            start_year,
            start: from + start.start()..from + start.end(),
            end_year: end.and_then(|m| m.as_str().parse().ok()),
            range_tail: end.map(|m| from + start.end()..from + m.end()),
        };
        debug!(line = %caps[0].trim_end(), newest = notice.newest(), "copyright notice");
        if newest.as_ref().is_none_or(|n| notice.newest() > n.newest()) {
            newest = Some(notice);
        }
    }
    let notice = newest?;
    let year = notice.newest();
    if (TARGET_YEAR..=MAX_YEAR).contains(&year) {
        return None;
    }

    let (range, replacement) = match &notice.range_tail {
        Some(tail) => (tail.clone(), format!(" - {TARGET_YEAR}")),
        None if notice.start_year > MAX_YEAR => (notice.start.clone(), TARGET_YEAR.to_string()),
        None => (
            notice.start.clone(),
            format!("{} - {TARGET_YEAR}", notice.start_year),
        ),
    };
    info!(from = year, to = TARGET_YEAR, "updating copyright notice");
    let mut out = String::with_capacity(text.len() + 8);
    out.push_str(&text[..range.start]);
    out.push_str(&replacement);
    out.push_str(&text[range.end..]);
    Some(out)
}

/// Update the notice inside the README's `License` section.
pub fn bump_readme(text: &str) -> Option<String> {
    let heading = LICENSE_HEADING.find(text)?;
    let end = ANY_HEADING
        .find_at(text, heading.end())
        .map_or(text.len(), |m| m.start());
    bump_span(text, heading.start(), end)
}

/// Update the newest notice anywhere in `text`.
pub fn bump_file(text: &str) -> Option<String> {
    bump_span(text, 0, text.len())
}

impl Template for FixCopyrightYear {
    fn name(&self) -> &'static str {
        "E6005-Fix-Copyright-Year"
    }

    fn description(&self) -> &'static str {
        include_str!("descriptions/E6005-Fix-Copyright-Year.md")
    }

    fn patch(&self, workspace: &mut Workspace, _invocation: &Invocation) -> Result<()> {
        let files: [(&str, fn(&str) -> Option<String>); 2] =
            [(README, bump_readme), (LICENSE, bump_file)];
        for (file, bump) in files {
            let Some(doc) = workspace.document(file)? else {
                info!(file, "not present, skipping");
                continue;
            };
            match bump(doc.text()) {
                Some(updated) => {
                    doc.rewrite(updated)?;
                    info!(file, outcome = "updated", "copyright year updated");
                }
                None => info!(file, "copyright year already current"),
            }
        }
        Ok(())
    }
}
