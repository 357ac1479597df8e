//! Character-level scanner for JSON and JSON-with-comments text.
//!
//! The scanner never builds a tree. It tracks string literals, escape
//! sequences, comments and bracket depth, and reports byte offsets so that
//! edits can target the exact span of a key or value while leaving every
//! other byte of the document alone.
//!
//! All structural characters are ASCII, so byte offsets returned here are
//! always valid `str` slice boundaries.

use crate::core::patch::PatchError;

/// One `"key": value` entry of an object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Member {
    /// Decoded key.
    pub key: String,
    /// Offset of the opening quote of the key.
    pub key_start: usize,
    /// Offset just past the closing quote of the key.
    pub key_end: usize,
    pub value_start: usize,
    /// Offset just past the last byte of the value.
    pub value_end: usize,
    /// Offset of the comma that follows the value, if any.
    pub comma: Option<usize>,
}

/// One element of an array.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Element {
    pub start: usize,
    pub end: usize,
    pub comma: Option<usize>,
}

/// Result of resolving a key path.
#[derive(Debug, Clone)]
pub struct Located {
    pub member: Member,
    /// All members of the parent object, in document order.
    pub siblings: Vec<Member>,
    /// Index of `member` inside `siblings`.
    pub index: usize,
    pub parent_open: usize,
    pub parent_close: usize,
}

#[derive(Debug, Clone, Copy)]
pub struct Scanner<'a> {
    src: &'a str,
    bytes: &'a [u8],
    comments: bool,
}

impl<'a> Scanner<'a> {
    /// `comments` enables `//` and `/* */` handling for JSON-with-comments.
    pub fn new(src: &'a str, comments: bool) -> Self {
        Self {
            src,
            bytes: src.as_bytes(),
            comments,
        }
    }

    /// Skip whitespace (and comments, when enabled) starting at `pos`.
    pub fn skip_trivia(&self, mut pos: usize) -> Result<usize, PatchError> {
        let len = self.bytes.len();
        loop {
            while pos < len && self.bytes[pos].is_ascii_whitespace() {
                pos += 1;
            }
            if self.comments && pos + 1 < len && self.bytes[pos] == b'/' {
                match self.bytes[pos + 1] {
                    b'/' => {
                        pos = self.src[pos..].find('\n').map_or(len, |i| pos + i);
                        continue;
                    }
                    b'*' => {
                        let end = self.src[pos + 2..]
                            .find("*/")
                            .ok_or_else(|| syntax(pos, "unterminated block comment"))?;
                        pos = pos + 2 + end + 2;
                        continue;
                    }
                    _ => {}
                }
            }
            return Ok(pos);
        }
    }

    /// Offset just past the closing quote of the string starting at `start`.
    pub fn string_end(&self, start: usize) -> Result<usize, PatchError> {
        if self.bytes.get(start) != Some(&b'"') {
            return Err(syntax(start, "expected string"));
        }
        let mut i = start + 1;
        while i < self.bytes.len() {
            match self.bytes[i] {
                b'\\' => i += 2,
                b'"' => return Ok(i + 1),
                _ => i += 1,
            }
        }
        Err(syntax(start, "unterminated string"))
    }

    /// Offset of the `}` or `]` that closes the bracket at `open`.
    pub fn matching_close(&self, open: usize) -> Result<usize, PatchError> {
        let mut depth = 0usize;
        let mut i = open;
        while i < self.bytes.len() {
            match self.bytes[i] {
                b'"' => {
                    i = self.string_end(i)?;
                    continue;
                }
                b'/' if self.comments && self.starts_comment(i) => {
                    i = self.skip_trivia(i)?;
                    continue;
                }
                b'{' | b'[' => depth += 1,
                b'}' | b']' => {
                    depth = depth.saturating_sub(1);
                    if depth == 0 {
                        return Ok(i);
                    }
                }
                _ => {}
            }
            i += 1;
        }
        Err(syntax(open, "unbalanced brackets"))
    }

    /// Offset just past the value that starts at `start`.
    pub fn value_end(&self, start: usize) -> Result<usize, PatchError> {
        match self.bytes.get(start) {
            None => Err(syntax(start, "expected value, found end of input")),
            Some(b'"') => self.string_end(start),
            Some(b'{' | b'[') => Ok(self.matching_close(start)? + 1),
            Some(b'}' | b']' | b',' | b':') => Err(syntax(start, "expected value")),
            Some(_) => {
                let mut i = start;
                while i < self.bytes.len() {
                    let b = self.bytes[i];
                    if matches!(b, b',' | b'}' | b']') || b.is_ascii_whitespace() {
                        break;
                    }
                    if b == b'/' && self.comments && self.starts_comment(i) {
                        break;
                    }
                    i += 1;
                }
                Ok(i)
            }
        }
    }

    /// Members of the object whose `{` sits at `open`.
    pub fn object_members(&self, open: usize) -> Result<Vec<Member>, PatchError> {
        if self.bytes.get(open) != Some(&b'{') {
            return Err(syntax(open, "expected object"));
        }
        let close = self.matching_close(open)?;
        let mut members = Vec::new();
        let mut pos = self.skip_trivia(open + 1)?;
        while pos < close {
            let key_start = pos;
            let key_end = self.string_end(key_start)?;
            let key: String = serde_json::from_str(&self.src[key_start..key_end])
                .map_err(|e| syntax(key_start, &e.to_string()))?;
            let colon = self.skip_trivia(key_end)?;
            if self.bytes.get(colon) != Some(&b':') {
                return Err(syntax(colon, "expected `:`"));
            }
            let value_start = self.skip_trivia(colon + 1)?;
            let value_end = self.value_end(value_start)?;
            let (comma, next) = self.after_entry(value_end, close)?;
            members.push(Member {
                key,
                key_start,
                key_end,
                value_start,
                value_end,
                comma,
            });
            pos = next;
        }
        Ok(members)
    }

    /// Elements of the array whose `[` sits at `open`.
    pub fn array_elements(&self, open: usize) -> Result<Vec<Element>, PatchError> {
        if self.bytes.get(open) != Some(&b'[') {
            return Err(syntax(open, "expected array"));
        }
        let close = self.matching_close(open)?;
        let mut elements = Vec::new();
        let mut pos = self.skip_trivia(open + 1)?;
        while pos < close {
            let end = self.value_end(pos)?;
            let (comma, next) = self.after_entry(end, close)?;
            elements.push(Element {
                start: pos,
                end,
                comma,
            });
            pos = next;
        }
        Ok(elements)
    }

    /// Offset of the first byte of the root value.
    pub fn root(&self) -> Result<usize, PatchError> {
        let pos = self.skip_trivia(0)?;
        if pos >= self.bytes.len() {
            return Err(syntax(pos, "empty document"));
        }
        Ok(pos)
    }

    /// Offset of the `{` of the object at `path` (the root for an empty path).
    pub fn object_at(&self, path: &[&str]) -> Result<usize, PatchError> {
        let open = if path.is_empty() {
            self.root()?
        } else {
            self.locate(path)?.member.value_start
        };
        if self.bytes.get(open) != Some(&b'{') {
            return Err(PatchError::TypeMismatch {
                path: join_path(path),
                expected: "an object",
            });
        }
        Ok(open)
    }

    /// Resolve `path` to the member it names.
    ///
    /// Duplicate keys resolve to the last occurrence, matching what a JSON
    /// parser would keep.
    pub fn locate(&self, path: &[&str]) -> Result<Located, PatchError> {
        let mut open = self.root()?;
        for (depth, segment) in path.iter().enumerate() {
            if self.bytes.get(open) != Some(&b'{') {
                return Err(PatchError::TypeMismatch {
                    path: join_path(&path[..depth]),
                    expected: "an object",
                });
            }
            let siblings = self.object_members(open)?;
            let index = siblings
                .iter()
                .rposition(|m| m.key == *segment)
                .ok_or_else(|| PatchError::NotFound {
                    path: join_path(&path[..=depth]),
                })?;
            if depth + 1 == path.len() {
                let parent_close = self.matching_close(open)?;
                return Ok(Located {
                    member: siblings[index].clone(),
                    siblings,
                    index,
                    parent_open: open,
                    parent_close,
                });
            }
            open = siblings[index].value_start;
        }
        Err(PatchError::NotFound {
            path: String::new(),
        })
    }

    fn after_entry(&self, end: usize, close: usize) -> Result<(Option<usize>, usize), PatchError> {
        let after = self.skip_trivia(end)?;
        if self.bytes.get(after) == Some(&b',') {
            return Ok((Some(after), self.skip_trivia(after + 1)?));
        }
        if after != close {
            return Err(syntax(after, "expected `,` or closing bracket"));
        }
        Ok((None, close))
    }

    fn starts_comment(&self, pos: usize) -> bool {
        matches!(self.bytes.get(pos + 1), Some(b'/' | b'*'))
    }
}

/// Render a key path as `a.b.c` for error messages.
pub fn join_path(path: &[&str]) -> String {
    path.join(".")
}

/// Offset of the first byte of the line containing `pos`.
pub fn line_start(text: &str, pos: usize) -> usize {
    text[..pos].rfind('\n').map_or(0, |i| i + 1)
}

/// Offset of the `\n` ending the line containing `pos` (or the text length).
pub fn line_end(text: &str, pos: usize) -> usize {
    text[pos..].find('\n').map_or(text.len(), |i| pos + i)
}

/// Like [`line_end`] but stops before a `\r` of a CRLF pair.
pub fn line_content_end(text: &str, pos: usize) -> usize {
    let end = line_end(text, pos);
    if end > pos && text.as_bytes()[end - 1] == b'\r' {
        end - 1
    } else {
        end
    }
}

/// Offset of the first byte of the line after the one containing `pos`.
pub fn next_line_start(text: &str, pos: usize) -> usize {
    let end = line_end(text, pos);
    if end < text.len() { end + 1 } else { end }
}

/// Leading spaces and tabs of the line containing `pos`.
pub fn line_indent(text: &str, pos: usize) -> &str {
    let start = line_start(text, pos);
    let line = &text[start..];
    let width = line.len() - line.trim_start_matches([' ', '\t']).len();
    &text[start..start + width]
}

/// True when only spaces or tabs precede `pos` on its line.
pub fn starts_line(text: &str, pos: usize) -> bool {
    text[line_start(text, pos)..pos]
        .bytes()
        .all(|b| b == b' ' || b == b'\t')
}

/// True when nothing but whitespace follows `pos` on its line.
pub fn rest_of_line_blank(text: &str, pos: usize) -> bool {
    text[pos..line_end(text, pos)].trim().is_empty()
}

pub fn same_line(text: &str, a: usize, b: usize) -> bool {
    let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
    !text[lo..hi].contains('\n')
}

/// Skip spaces and tabs (not newlines) starting at `pos`.
pub fn skip_inline_space(text: &str, pos: usize) -> usize {
    let rest = &text[pos..];
    pos + (rest.len() - rest.trim_start_matches([' ', '\t']).len())
}

/// Blank out comments and trailing commas so `serde_json` accepts
/// JSON-with-comments text. Offsets and line breaks are preserved.
pub fn strip_jsonc(text: &str) -> String {
    let bytes = text.as_bytes();
    let mut out = bytes.to_vec();
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'"' => i = skip_string_bytes(bytes, i),
            b'/' if bytes.get(i + 1) == Some(&b'/') => {
                while i < bytes.len() && bytes[i] != b'\n' {
                    out[i] = b' ';
                    i += 1;
                }
            }
            b'/' if bytes.get(i + 1) == Some(&b'*') => {
                let end = text[i + 2..]
                    .find("*/")
                    .map_or(bytes.len(), |p| i + 2 + p + 2);
                for b in &mut out[i..end] {
                    if *b != b'\n' {
                        *b = b' ';
                    }
                }
                i = end;
            }
            _ => i += 1,
        }
    }

    let mut i = 0;
    while i < out.len() {
        match out[i] {
            b'"' => i = skip_string_bytes(&out, i),
            b',' => {
                let next = out[i + 1..]
                    .iter()
                    .position(|b| !b.is_ascii_whitespace())
                    .map(|p| out[i + 1 + p]);
                if matches!(next, Some(b'}' | b']')) {
                    out[i] = b' ';
                }
                i += 1;
            }
            _ => i += 1,
        }
    }
    String::from_utf8_lossy(&out).into_owned()
}

fn skip_string_bytes(bytes: &[u8], start: usize) -> usize {
    let mut i = start + 1;
    while i < bytes.len() {
        match bytes[i] {
            b'\\' => i += 2,
            b'"' => return i + 1,
            _ => i += 1,
        }
    }
    bytes.len()
}

fn syntax(offset: usize, reason: &str) -> PatchError {
    PatchError::Syntax {
        offset,
        reason: reason.to_string(),
    }
}
