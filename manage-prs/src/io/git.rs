//! Read-only git queries against an adapter checkout.
//!
//! Templates never commit; the surrounding workflow does. We only ask git
//! which paths a template run touched so the run can report them.

use std::path::{Path, PathBuf};
use std::process::{Command, Output};

use anyhow::{Context, Result, anyhow};
use tracing::{debug, instrument};

/// Parsed `git status --porcelain` entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusEntry {
    /// 2-letter XY code, or "??" for untracked.
    pub code: String,
    pub path: String,
}

/// Wrapper for executing git commands in a working directory.
#[derive(Debug, Clone)]
pub struct Git {
    workdir: PathBuf,
}

impl Git {
    pub fn new(workdir: impl Into<PathBuf>) -> Self {
        Self {
            workdir: workdir.into(),
        }
    }

    /// True when the working directory is inside a git work tree.
    ///
    /// A missing `git` binary counts as "not a repository".
    pub fn is_repository(&self) -> bool {
        self.run(&["rev-parse", "--is-inside-work-tree"])
            .is_ok_and(|out| out.status.success())
    }

    /// Status entries (including untracked) below the working directory, in
    /// porcelain format. Paths are relative to the repository root.
    #[instrument(skip_all, fields(workdir = %self.workdir.display()))]
    pub fn status_porcelain(&self) -> Result<Vec<StatusEntry>> {
        let out = self.run_checked(&["status", "--porcelain=v1", "-uall", "--", "."])?;
        let text = String::from_utf8_lossy(&out.stdout);
        let mut entries = Vec::new();
        for line in text.lines() {
            if line.trim().is_empty() {
                continue;
            }
            entries.push(parse_status_line(line)?);
        }
        debug!(entries = entries.len(), "git status");
        Ok(entries)
    }

    /// Changed paths, excluding files whose name is listed in `ignore_names`.
    pub fn changed_paths(&self, ignore_names: &[&str]) -> Result<Vec<String>> {
        Ok(self
            .status_porcelain()?
            .into_iter()
            .map(|entry| entry.path)
            .filter(|path| !is_ignored(path, ignore_names))
            .collect())
    }

    fn run_checked(&self, args: &[&str]) -> Result<Output> {
        let output = self.run(args)?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(anyhow!("git {} failed: {}", args.join(" "), stderr.trim()));
        }
        Ok(output)
    }

    fn run(&self, args: &[&str]) -> Result<Output> {
        Command::new("git")
            .args(args)
            .current_dir(&self.workdir)
            .output()
            .with_context(|| format!("spawn git {}", args.join(" ")))
    }
}

fn parse_status_line(line: &str) -> Result<StatusEntry> {
    if let Some(path) = line.strip_prefix("?? ") {
        return Ok(StatusEntry {
            code: "??".to_string(),
            path: unquote(path.trim()),
        });
    }
    if line.len() < 4 {
        return Err(anyhow!("unexpected porcelain line: '{line}'"));
    }
    let code = line[..2].to_string();
    let rest = line[3..].trim();
    let path = rest.split_once(" -> ").map_or(rest, |(_, new)| new.trim());
    Ok(StatusEntry {
        code,
        path: unquote(path),
    })
}

fn is_ignored(path: &str, ignore_names: &[&str]) -> bool {
    Path::new(path)
        .file_name()
        .and_then(|name| name.to_str())
        .is_some_and(|name| ignore_names.contains(&name))
}

/// Porcelain quotes paths with spaces or special characters.
fn unquote(path: &str) -> String {
    path.strip_prefix('"')
        .and_then(|p| p.strip_suffix('"'))
        .unwrap_or(path)
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_untracked_line() {
        let e = parse_status_line("?? .pr-title").expect("parse");
        assert_eq!(
            e,
            StatusEntry {
                code: "??".to_string(),
                path: ".pr-title".to_string()
            }
        );
    }

    #[test]
    fn parses_modified_and_quoted_lines() {
        let e = parse_status_line(" M io-package.json").expect("parse");
        assert_eq!(e.code, " M");
        assert_eq!(e.path, "io-package.json");

        let e = parse_status_line(" M \"docs/en/my file.md\"").expect("parse");
        assert_eq!(e.path, "docs/en/my file.md");
    }

    #[test]
    fn parses_rename_line_uses_new_path() {
        let e = parse_status_line("R  LICENSE.txt -> LICENSE").expect("parse");
        assert_eq!(e.path, "LICENSE");
    }

    #[test]
    fn rejects_short_lines() {
        assert!(parse_status_line("M").is_err());
    }

    #[test]
    fn ignored_names_match_in_subdirectories() {
        let names = [".pr-title", ".pr-body"];
        assert!(is_ignored(".pr-title", &names));
        assert!(is_ignored("adapters/foo/.pr-body", &names));
        assert!(!is_ignored("adapters/foo/io-package.json", &names));
        assert!(!is_ignored("docs/.pr-title.md", &names));
    }

    #[test]
    fn changed_paths_in_subdirectory_skip_handoff_files() {
        let temp = tempfile::tempdir().expect("tempdir");
        let git = |args: &[&str]| {
            Command::new("git")
                .args(args)
                .current_dir(temp.path())
                .output()
        };
        match git(&["init", "-q"]) {
            Ok(out) if out.status.success() => {}
            // No usable git on this machine.
            _ => return,
        }
        let sub = temp.path().join("sub");
        std::fs::create_dir_all(&sub).expect("mkdir");
        for name in [".pr-title", ".pr-body", "io-package.json"] {
            std::fs::write(sub.join(name), "x").expect("write");
        }
        std::fs::write(temp.path().join("outside.txt"), "x").expect("write");

        let changed = Git::new(&sub)
            .changed_paths(&[".pr-title", ".pr-body"])
            .expect("status");
        assert_eq!(changed, vec!["sub/io-package.json".to_string()]);
    }

    #[test]
    fn missing_directory_is_not_a_repository() {
        let temp = tempfile::tempdir().expect("tempdir");
        let git = Git::new(temp.path().join("absent"));
        assert!(!git.is_repository());
    }
}
