//! Idempotent, minimal-span edits on JSON, JSON-with-comments and YAML text.
//!
//! A [`Document`] owns the raw text of one file. Structural edits (`set`,
//! `delete`, `append_unique`, `remove_matching`) locate their target with the
//! [`Scanner`], splice a replacement into a candidate copy of the text and
//! validate the candidate before it replaces the current text. A failed edit
//! therefore never leaves a half-applied document behind.
//!
//! Every edit reports whether it changed anything. An edit whose outcome is
//! byte-identical to the input reports `false`, which is what keeps no-op
//! template runs from producing pull requests.

use std::ops::Range;
use std::path::Path;

use serde_json::Value;
use thiserror::Error;

use crate::core::indent;
use crate::core::scan::{self, Element, Member, Scanner, join_path};

/// Why an edit could not be applied.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PatchError {
    #[error("`{path}` not found")]
    NotFound { path: String },
    #[error("`{path}` is not {expected}")]
    TypeMismatch {
        path: String,
        expected: &'static str,
    },
    #[error("edit would produce malformed output: {reason}")]
    MalformedOutput { reason: String },
    #[error("cannot infer indentation for `{path}`: siblings use {first:?} and {second:?}")]
    AmbiguousIndentation {
        path: String,
        first: String,
        second: String,
    },
    #[error("cannot scan document at byte {offset}: {reason}")]
    Syntax { offset: usize, reason: String },
    #[error("structural edits are not supported for {format} documents")]
    Unsupported { format: &'static str },
}

/// How a document's text is validated after each edit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    Json,
    /// JSON with `//` and `/* */` comments and trailing commas.
    Jsonc,
    Yaml,
    /// Free text, no validation.
    Text,
}

impl Format {
    /// Pick a format from a file name.
    pub fn from_path(path: &Path) -> Self {
        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or_default()
            .to_ascii_lowercase();
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or_default()
            .to_ascii_lowercase();
        match ext.as_str() {
            "jsonc" => Format::Jsonc,
            "json" if name.starts_with("tsconfig") || path.starts_with(".vscode") => Format::Jsonc,
            "json" => Format::Json,
            "yml" | "yaml" => Format::Yaml,
            _ => Format::Text,
        }
    }

    fn name(self) -> &'static str {
        match self {
            Format::Json => "JSON",
            Format::Jsonc => "JSONC",
            Format::Yaml => "YAML",
            Format::Text => "text",
        }
    }
}

/// Where a new object member is inserted when its key does not exist yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Anchor {
    /// Directly after the named sibling.
    After(String),
    /// Directly before the named sibling.
    Before(String),
    /// Before the parent's closing brace.
    End,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArrayEnd {
    Front,
    Back,
}

/// One structural edit.
#[derive(Debug, Clone, PartialEq)]
pub enum Operation {
    Set { value: Value, anchor: Anchor },
    Delete,
    AppendUnique { item: Value, end: ArrayEnd },
}

/// A structural edit addressed by key path (e.g. `["common", "license"]`).
#[derive(Debug, Clone, PartialEq)]
pub struct EditRequest {
    pub path: Vec<String>,
    pub operation: Operation,
}

impl EditRequest {
    pub fn new(path: &[&str], operation: Operation) -> Self {
        Self {
            path: path.iter().map(|s| s.to_string()).collect(),
            operation,
        }
    }
}

/// Text produced by [`patch_text`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Patched {
    pub text: String,
    pub changed: bool,
}

/// Apply one edit to raw text without keeping a [`Document`] around.
pub fn patch_text(
    document: &str,
    format: Format,
    request: &EditRequest,
) -> Result<Patched, PatchError> {
    let mut doc = Document::new(document, format);
    let changed = doc.apply(request)?;
    Ok(Patched {
        text: doc.into_text(),
        changed,
    })
}

/// Formatting conventions sampled from the document.
#[derive(Debug, Clone)]
struct Style {
    unit: String,
    newline: &'static str,
    colon: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    text: String,
    format: Format,
}

impl Document {
    pub fn new(text: impl Into<String>, format: Format) -> Self {
        Self {
            text: text.into(),
            format,
        }
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn into_text(self) -> String {
        self.text
    }

    /// Parse the value at `path`.
    pub fn get(&self, path: &[&str]) -> Result<Value, PatchError> {
        let located = self.scanner()?.locate(path)?;
        let m = &located.member;
        parse_json(&self.text[m.value_start..m.value_end], self.format)
    }

    pub fn contains(&self, path: &[&str]) -> bool {
        self.scanner()
            .and_then(|s| s.locate(path))
            .is_ok()
    }

    pub fn apply(&mut self, request: &EditRequest) -> Result<bool, PatchError> {
        let path: Vec<&str> = request.path.iter().map(String::as_str).collect();
        match &request.operation {
            Operation::Set { value, anchor } => self.set(&path, value, anchor),
            Operation::Delete => self.delete(&path),
            Operation::AppendUnique { item, end } => self.append_unique(&path, item, *end),
        }
    }

    /// Set the value at `path`.
    ///
    /// An existing value is replaced in place (a semantically equal value is
    /// left untouched). A missing key is inserted on its own line next to
    /// `anchor`, falling back to the end of the parent object when the
    /// anchor key does not exist. The parent object itself must exist.
    pub fn set(&mut self, path: &[&str], value: &Value, anchor: &Anchor) -> Result<bool, PatchError> {
        let Some((key, parent)) = path.split_last() else {
            return Err(PatchError::NotFound {
                path: String::new(),
            });
        };
        let located = match self.scanner()?.locate(path) {
            Ok(located) => located,
            Err(PatchError::NotFound { path: missing }) if missing == join_path(path) => {
                return self.insert_member(parent, key, value, anchor);
            }
            Err(err) => return Err(err),
        };

        let m = &located.member;
        let current = parse_json(&self.text[m.value_start..m.value_end], self.format)?;
        if current == *value {
            return Ok(false);
        }
        let style = self.style(located.siblings.first());
        let base = scan::line_indent(&self.text, m.key_start).to_string();
        let rendered = render(value, &base, &style);
        self.splice(m.value_start..m.value_end, &rendered)
    }

    /// Remove the member at `path` together with its line, keeping the
    /// comma placement of the surrounding members valid.
    pub fn delete(&mut self, path: &[&str]) -> Result<bool, PatchError> {
        let located = self.scanner()?.locate(path)?;
        let text = &self.text;
        let m = &located.member;
        let own_line = scan::starts_line(text, m.key_start);

        let range = if let Some(comma) = m.comma {
            if own_line && scan::rest_of_line_blank(text, comma + 1) {
                scan::line_start(text, m.key_start)..scan::next_line_start(text, comma)
            } else {
                m.key_start..scan::skip_inline_space(text, comma + 1)
            }
        } else if located.index == 0 {
            located.parent_open + 1..located.parent_close
        } else {
            let prev = &located.siblings[located.index - 1];
            let prev_comma = prev.comma.ok_or_else(|| PatchError::Syntax {
                offset: prev.value_end,
                reason: "missing comma between members".to_string(),
            })?;
            if own_line && scan::rest_of_line_blank(text, m.value_end) {
                if !scan::rest_of_line_blank(text, prev_comma + 1) {
                    // Trivia after the previous comma stays on its line.
                    let line = scan::line_start(text, m.key_start)
                        ..scan::next_line_start(text, m.value_end);
                    return self.splice_many(&[(prev_comma..prev_comma + 1, ""), (line, "")]);
                }
                prev_comma..scan::line_content_end(text, m.value_end)
            } else {
                prev_comma..m.value_end
            }
        };
        self.splice(range, "")
    }

    /// Add `item` to the array at `path` unless an equal element exists.
    pub fn append_unique(&mut self, path: &[&str], item: &Value, end: ArrayEnd) -> Result<bool, PatchError> {
        let (open, close, elements) = self.array_at(path)?;
        let mut raw = Vec::with_capacity(elements.len() + 1);
        for element in &elements {
            let slice = &self.text[element.start..element.end];
            if parse_json(slice, self.format)? == *item {
                return Ok(false);
            }
            raw.push(slice.to_string());
        }
        match end {
            ArrayEnd::Front => raw.insert(0, item.to_string()),
            ArrayEnd::Back => raw.push(item.to_string()),
        }
        self.rebuild_array(path, open, close, &elements, &raw)
    }

    /// Remove every element of the array at `path` for which `matches`
    /// returns true. Returns the removed values.
    pub fn remove_matching<F>(&mut self, path: &[&str], matches: F) -> Result<Vec<Value>, PatchError>
    where
        F: Fn(&Value) -> bool,
    {
        let (open, close, elements) = self.array_at(path)?;
        let mut kept = Vec::with_capacity(elements.len());
        let mut removed = Vec::new();
        for element in &elements {
            let slice = &self.text[element.start..element.end];
            let value = parse_json(slice, self.format)?;
            if matches(&value) {
                removed.push(value);
            } else {
                kept.push(slice.to_string());
            }
        }
        if removed.is_empty() {
            return Ok(removed);
        }
        self.rebuild_array(path, open, close, &elements, &kept)?;
        Ok(removed)
    }

    /// Replace the whole text, validating it against the document format.
    pub fn rewrite(&mut self, candidate: String) -> Result<bool, PatchError> {
        self.commit(candidate)
    }

    fn scanner(&self) -> Result<Scanner<'_>, PatchError> {
        match self.format {
            Format::Json => Ok(Scanner::new(&self.text, false)),
            Format::Jsonc => Ok(Scanner::new(&self.text, true)),
            other => Err(PatchError::Unsupported {
                format: other.name(),
            }),
        }
    }

    fn style(&self, sample: Option<&Member>) -> Style {
        let colon = sample
            .map(|m| &self.text[m.key_end..m.value_start])
            .filter(|sep| !sep.contains(['\n', '/']))
            .unwrap_or(": ")
            .to_string();
        Style {
            unit: indent::detect(&self.text).unit(),
            newline: indent::newline(&self.text),
            colon,
        }
    }

    fn insert_member(
        &mut self,
        parent: &[&str],
        key: &str,
        value: &Value,
        anchor: &Anchor,
    ) -> Result<bool, PatchError> {
        let scanner = self.scanner()?;
        let open = scanner.object_at(parent)?;
        let close = scanner.matching_close(open)?;
        let members = scanner.object_members(open)?;
        let style = self.style(members.first());
        let nl = style.newline;
        let text = &self.text;
        let key_json = Value::String(key.to_string()).to_string();

        if members.is_empty() {
            let outer = scan::line_indent(text, open).to_string();
            let inner = format!("{outer}{}", style.unit);
            let entry = format!("{key_json}{}{}", style.colon, render(value, &inner, &style));
            return self.splice(open + 1..close, &format!("{nl}{inner}{entry}{nl}{outer}"));
        }

        let target = match anchor {
            Anchor::After(k) | Anchor::Before(k) => members.iter().rposition(|m| m.key == *k),
            Anchor::End => None,
        };
        let (index, before) = match (anchor, target) {
            (Anchor::Before(_), Some(i)) => (i, true),
            (Anchor::After(_), Some(i)) => (i, false),
            _ => (members.len() - 1, false),
        };
        let sibling = &members[index];

        if scan::same_line(text, open, members[0].key_start) {
            let gap = inline_gap(text, open, &members, &style.colon);
            let entry = format!("{key_json}{}{value}", style.colon);
            return if before {
                let at = sibling.key_start;
                self.splice(at..at, &format!("{entry},{gap}"))
            } else {
                let at = sibling.value_end;
                self.splice(at..at, &format!(",{gap}{entry}"))
            };
        }

        let mut path: Vec<&str> = parent.to_vec();
        path.push(key);
        let member_indent = indent::shared_indent(text, members.iter().map(|m| m.key_start))
            .map_err(|c| PatchError::AmbiguousIndentation {
                path: join_path(&path),
                first: c.first,
                second: c.second,
            })?
            .unwrap_or_else(|| scan::line_indent(text, sibling.key_start).to_string());
        let entry = format!(
            "{key_json}{}{}",
            style.colon,
            render(value, &member_indent, &style)
        );

        if before {
            if scan::starts_line(text, sibling.key_start) {
                let at = scan::line_start(text, sibling.key_start);
                self.splice(at..at, &format!("{member_indent}{entry},{nl}"))
            } else {
                let at = sibling.key_start;
                self.splice(at..at, &format!("{entry}, "))
            }
        } else if let Some(comma) = sibling.comma {
            let at = if line_comment_follows(text, comma + 1) {
                scan::line_content_end(text, comma)
            } else {
                comma + 1
            };
            self.splice(at..at, &format!("{nl}{member_indent}{entry},"))
        } else {
            let at = sibling.value_end;
            if line_comment_follows(text, at) {
                let eol = scan::line_content_end(text, at);
                self.splice_many(&[
                    (at..at, ","),
                    (eol..eol, format!("{nl}{member_indent}{entry}").as_str()),
                ])
            } else {
                self.splice(at..at, &format!(",{nl}{member_indent}{entry}"))
            }
        }
    }

    fn array_at(&self, path: &[&str]) -> Result<(usize, usize, Vec<Element>), PatchError> {
        let scanner = self.scanner()?;
        let located = scanner.locate(path)?;
        let open = located.member.value_start;
        if self.text.as_bytes().get(open) != Some(&b'[') {
            return Err(PatchError::TypeMismatch {
                path: join_path(path),
                expected: "an array",
            });
        }
        let close = located.member.value_end - 1;
        Ok((open, close, scanner.array_elements(open)?))
    }

    /// Rewrite the body of the array `[open..=close]` with `items`, keeping
    /// the original one-per-line or inline layout.
    fn rebuild_array(
        &mut self,
        path: &[&str],
        open: usize,
        close: usize,
        old: &[Element],
        items: &[String],
    ) -> Result<bool, PatchError> {
        let text = &self.text;
        let style = self.style(None);
        let nl = style.newline;

        let body = if items.is_empty() {
            String::new()
        } else if old.is_empty() || text[open..close].contains('\n') {
            let outer = if scan::starts_line(text, close) {
                scan::line_indent(text, close)
            } else {
                scan::line_indent(text, open)
            };
            let inner = indent::shared_indent(text, old.iter().map(|e| e.start))
                .map_err(|c| PatchError::AmbiguousIndentation {
                    path: join_path(path),
                    first: c.first,
                    second: c.second,
                })?
                .unwrap_or_else(|| format!("{outer}{}", style.unit));
            let lines: Vec<String> = items.iter().map(|item| format!("{inner}{item}")).collect();
            format!("{nl}{}{nl}{outer}", lines.join(&format!(",{nl}")))
        } else {
            let pad = if text[open + 1..].starts_with(' ') { " " } else { "" };
            let sep = match old.first().and_then(|e| e.comma) {
                Some(c) if text[c + 1..].starts_with(' ') => ", ",
                Some(_) => ",",
                None if pad.is_empty() => ",",
                None => ", ",
            };
            format!("{pad}{}{pad}", items.join(sep))
        };
        self.splice(open + 1..close, &body)
    }

    fn splice(&mut self, range: Range<usize>, replacement: &str) -> Result<bool, PatchError> {
        self.splice_many(&[(range, replacement)])
    }

    /// Apply several replacements at once. Ranges must be ascending and
    /// must not overlap.
    fn splice_many(&mut self, edits: &[(Range<usize>, &str)]) -> Result<bool, PatchError> {
        let mut candidate = String::with_capacity(self.text.len() + 16);
        let mut cursor = 0;
        for (range, replacement) in edits {
            candidate.push_str(&self.text[cursor..range.start]);
            candidate.push_str(replacement);
            cursor = range.end;
        }
        candidate.push_str(&self.text[cursor..]);
        self.commit(candidate)
    }

    fn commit(&mut self, candidate: String) -> Result<bool, PatchError> {
        if candidate == self.text {
            return Ok(false);
        }
        validate(&candidate, self.format)?;
        self.text = candidate;
        Ok(true)
    }
}

/// True when the rest of the line after `pos` is a `//` comment.
fn line_comment_follows(text: &str, pos: usize) -> bool {
    text[scan::skip_inline_space(text, pos)..].starts_with("//")
}

/// Check that `text` parses as `format`.
pub fn validate(text: &str, format: Format) -> Result<(), PatchError> {
    let malformed = |reason: String| PatchError::MalformedOutput { reason };
    match format {
        Format::Json => serde_json::from_str::<Value>(text)
            .map(drop)
            .map_err(|e| malformed(e.to_string())),
        Format::Jsonc => serde_json::from_str::<Value>(&scan::strip_jsonc(text))
            .map(drop)
            .map_err(|e| malformed(e.to_string())),
        Format::Yaml => serde_yaml::from_str::<serde_yaml::Value>(text)
            .map(drop)
            .map_err(|e| malformed(e.to_string())),
        Format::Text => Ok(()),
    }
}

fn parse_json(text: &str, format: Format) -> Result<Value, PatchError> {
    let parsed = if format == Format::Jsonc {
        serde_json::from_str(&scan::strip_jsonc(text))
    } else {
        serde_json::from_str(text)
    };
    parsed.map_err(|e| PatchError::Syntax {
        offset: 0,
        reason: e.to_string(),
    })
}

/// Whitespace that follows commas in an inline object.
fn inline_gap(text: &str, open: usize, members: &[Member], colon: &str) -> &'static str {
    let spaced = match members.first().and_then(|m| m.comma) {
        Some(comma) => text[comma + 1..].starts_with(' '),
        None => text[open + 1..].starts_with(' ') || colon.ends_with(' '),
    };
    if spaced { " " } else { "" }
}

/// Render `value` for a line indented by `base`. Non-empty objects and
/// arrays are laid out one entry per line.
fn render(value: &Value, base: &str, style: &Style) -> String {
    let nl = style.newline;
    let inner = format!("{base}{}", style.unit);
    match value {
        Value::Object(map) if !map.is_empty() => {
            let entries: Vec<String> = map
                .iter()
                .map(|(k, v)| {
                    format!(
                        "{inner}{}{}{}",
                        Value::String(k.clone()),
                        style.colon,
                        render(v, &inner, style)
                    )
                })
                .collect();
            format!("{{{nl}{}{nl}{base}}}", entries.join(&format!(",{nl}")))
        }
        Value::Array(items) if !items.is_empty() => {
            let entries: Vec<String> = items
                .iter()
                .map(|v| format!("{inner}{}", render(v, &inner, style)))
                .collect();
            format!("[{nl}{}{nl}{base}]", entries.join(&format!(",{nl}")))
        }
        other => other.to_string(),
    }
}
