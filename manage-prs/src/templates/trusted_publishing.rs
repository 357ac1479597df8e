//! Switch the npm release step from a stored token to trusted publishing.
//!
//! The deploy step stops passing `npm-token` (the line is kept as a comment)
//! and the job gains the `id-token: write` and `contents: write`
//! permissions the registry needs to verify the workflow's identity.

use anyhow::Result;
use tracing::{debug, info};

use super::{FleetContext, Invocation, Template, Workspace};
use crate::core::indent;

const WORKFLOW: &str = ".github/workflows/test-and-release.yml";
const DEPLOY_ACTION: &str = "ioBroker/testing-action-deploy@v1";
const TOKEN_KEY: &str = "npm-token:";
const COMMENT_SUFFIX: &str = "  # Commented out for migration to Trusted Publishing";
/// Owner the fleet walk is restricted to when no parameter data is given.
const DEFAULT_OWNER: &str = "mcm4iob";

#[derive(Debug)]
pub struct MigrateToTrustedPublishing;

fn indent_of(line: &str) -> usize {
    line.len() - line.trim_start().len()
}

fn is_comment(line: &str) -> bool {
    line.trim_start().starts_with('#')
}

fn is_blank(line: &str) -> bool {
    line.trim().is_empty()
}

/// `key:` with nothing after the colon but an optional comment.
fn bare_key(line: &str) -> Option<&str> {
    let trimmed = line.trim();
    let (key, rest) = trimmed.split_once(':')?;
    let rest = rest.trim();
    let valid = !key.is_empty()
        && key
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
    (valid && (rest.is_empty() || rest.starts_with('#'))).then_some(key)
}

/// The uncommented `npm-token` line of the deploy step's `with:` block.
fn find_token(lines: &[String]) -> Option<(usize, usize)> {
    for (deploy, line) in lines.iter().enumerate() {
        if !line.contains(DEPLOY_ACTION) || is_comment(line) {
            continue;
        }
        let step_indent = indent_of(line);
        let mut with_indent: Option<usize> = None;
        for (j, candidate) in lines.iter().enumerate().skip(deploy + 1) {
            if is_blank(candidate) || is_comment(candidate) {
                continue;
            }
            let trimmed = candidate.trim();
            let depth = indent_of(candidate);
            if depth < step_indent || (trimmed.starts_with("- ") && depth <= step_indent) {
                break;
            }
            match with_indent {
                Some(w) if depth <= w => break,
                Some(_) if trimmed.starts_with(TOKEN_KEY) => return Some((deploy, j)),
                Some(_) => {}
                None if trimmed == "with:" => with_indent = Some(depth),
                None => {}
            }
        }
    }
    None
}

/// Index of the job owning the `steps:` list that precedes `deploy`, and
/// the indentation of the job's keys.
fn find_job(lines: &[String], deploy: usize) -> Option<(usize, usize)> {
    let deploy_indent = indent_of(&lines[deploy]);
    let steps = (0..deploy)
        .rev()
        .find(|&i| lines[i].trim() == "steps:" && indent_of(&lines[i]) < deploy_indent)?;
    let key_indent = indent_of(&lines[steps]);
    let job = (0..steps).rev().find(|&i| {
        !is_blank(&lines[i]) && !is_comment(&lines[i]) && indent_of(&lines[i]) < key_indent
    })?;
    bare_key(&lines[job])?;
    Some((job, key_indent))
}

fn grant_permissions(lines: &mut Vec<String>, job: usize, deploy: usize, key_indent: usize) {
    let job_indent = indent_of(&lines[job]);
    let unit = key_indent.saturating_sub(job_indent).max(1);
    let child = " ".repeat(key_indent);
    let grandchild = " ".repeat(key_indent + unit);

    let existing = (job + 1..deploy).find(|&i| {
        indent_of(&lines[i]) == key_indent && lines[i].trim_start().starts_with("permissions:")
    });
    let Some(perm) = existing else {
        lines.splice(
            job + 1..job + 1,
            [
                format!("{child}permissions:"),
                format!("{grandchild}contents: write"),
                format!("{grandchild}id-token: write"),
            ],
        );
        return;
    };

    if bare_key(&lines[perm]).is_none() {
        let inline = lines[perm].trim_start()["permissions:".len()..].trim();
        if inline.starts_with("write-all") {
            return;
        }
        lines.splice(
            perm..=perm,
            [
                format!("{child}permissions:"),
                format!("{grandchild}contents: write"),
                format!("{grandchild}id-token: write"),
            ],
        );
        return;
    }

    let mut has_id_token = false;
    let mut has_contents_write = false;
    let mut last = perm;
    let mut value_indent = grandchild.clone();
    for i in perm + 1..lines.len() {
        let line = &lines[i];
        if is_blank(line) || is_comment(line) {
            continue;
        }
        if indent_of(line) <= key_indent {
            break;
        }
        last = i;
        value_indent = " ".repeat(indent_of(line));
        let trimmed = line.trim();
        if trimmed.starts_with("id-token:") {
            if !trimmed.contains("write") {
                lines[i] = format!("{value_indent}id-token: write");
            }
            has_id_token = true;
        } else if trimmed.starts_with("contents:") {
            if !trimmed.contains("write") {
                lines[i] = format!("{value_indent}contents: write");
            }
            has_contents_write = true;
        }
    }
    let mut added = Vec::new();
    if !has_id_token {
        added.push(format!("{value_indent}id-token: write"));
    }
    if !has_contents_write {
        added.push(format!("{value_indent}contents: write"));
    }
    lines.splice(last + 1..last + 1, added);
}

/// Rewrite a workflow for trusted publishing. `None` when the workflow does
/// not deploy with a stored npm token.
pub fn migrate(text: &str) -> Option<String> {
    let crlf = indent::newline(text) == "\r\n";
    let mut lines: Vec<String> = text
        .split('\n')
        .map(|l| l.strip_suffix('\r').unwrap_or(l).to_string())
        .collect();

    let (deploy, token) = find_token(&lines)?;
    let token_line = &lines[token];
    let pad = " ".repeat(indent_of(token_line));
    lines[token] = format!("{pad}# {}{COMMENT_SUFFIX}", token_line.trim());

    match find_job(&lines, deploy) {
        Some((job, key_indent)) => grant_permissions(&mut lines, job, deploy, key_indent),
        None => debug!("no job found above the deploy step, permissions unchanged"),
    }
    let nl = if crlf { "\r\n" } else { "\n" };
    Some(lines.join(nl))
}

impl Template for MigrateToTrustedPublishing {
    fn name(&self) -> &'static str {
        "X0000-MigrateToTrustedPublishing"
    }

    fn description(&self) -> &'static str {
        include_str!("descriptions/X0000-MigrateToTrustedPublishing.md")
    }

    fn patch(&self, workspace: &mut Workspace, _invocation: &Invocation) -> Result<()> {
        let Some(doc) = workspace.document(WORKFLOW)? else {
            info!("{WORKFLOW} does not exist, nothing to do");
            return Ok(());
        };
        match migrate(doc.text()) {
            Some(updated) => {
                doc.rewrite(updated)?;
                info!(outcome = "migrated", "npm token replaced by trusted publishing");
            }
            None => info!("no stored npm token in the deploy step, nothing to do"),
        }
        Ok(())
    }

    fn accepts(&self, ctx: &mut FleetContext) -> bool {
        let wanted = match ctx.parameter_data.trim() {
            "" => DEFAULT_OWNER,
            owner => owner,
        };
        ctx.owner.eq_ignore_ascii_case(wanted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::patch::{Format, validate};

    const WORKFLOW_TEXT: &str = "\
name: Test and Release
jobs:
  deploy:
    needs: [adapter-tests]
    runs-on: ubuntu-latest
    steps:
      - uses: ioBroker/testing-action-deploy@v1
        with:
          node-version: '20.x'
          npm-token: ${{ secrets.NPM_TOKEN }}
          github-token: ${{ secrets.GITHUB_TOKEN }}
";

    #[test]
    fn comments_token_and_adds_permissions() {
        let out = migrate(WORKFLOW_TEXT).expect("migrated");
        assert_eq!(
            out,
            "\
name: Test and Release
jobs:
  deploy:
    permissions:
      contents: write
      id-token: write
    needs: [adapter-tests]
    runs-on: ubuntu-latest
    steps:
      - uses: ioBroker/testing-action-deploy@v1
        with:
          node-version: '20.x'
          # npm-token: ${{ secrets.NPM_TOKEN }}  # Commented out for migration to Trusted Publishing
          github-token: ${{ secrets.GITHUB_TOKEN }}
"
        );
        validate(&out, Format::Yaml).expect("valid yaml");
        assert_eq!(migrate(&out), None);
    }

    #[test]
    fn upgrades_existing_permissions() {
        let text = WORKFLOW_TEXT.replace(
            "    runs-on: ubuntu-latest\n",
            "    runs-on: ubuntu-latest\n    permissions:\n      contents: read\n",
        );
        let out = migrate(&text).expect("migrated");
        assert!(out.contains("    permissions:\n      contents: write\n      id-token: write\n    steps:"));
        validate(&out, Format::Yaml).expect("valid yaml");
    }

    #[test]
    fn ignores_workflows_without_deploy_token() {
        assert_eq!(migrate("jobs:\n  test:\n    steps:\n      - run: npm test\n"), None);
        let commented = WORKFLOW_TEXT.replace("npm-token:", "# npm-token:");
        assert_eq!(migrate(&commented), None);
    }

    #[test]
    fn fleet_filter_defaults_to_one_owner() {
        let template = MigrateToTrustedPublishing;
        let mut ctx = FleetContext::new(template.name(), "");
        ctx.owner = "McM4iob".to_string();
        assert!(template.accepts(&mut ctx));
        ctx.owner = "acme".to_string();
        assert!(!template.accepts(&mut ctx));
        ctx.parameter_data = "acme".to_string();
        assert!(template.accepts(&mut ctx));
    }
}
