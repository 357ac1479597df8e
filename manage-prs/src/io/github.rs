//! Code host access through the `gh` CLI.
//!
//! [`CodeHost`] covers the pull request calls the lifecycle relies on and
//! [`JobTrigger`] the automation calls a fleet walk makes. [`GhCli`]
//! implements both by spawning `gh`; tests substitute scripted fakes.

use std::process::Command;

use anyhow::{Context, Result, anyhow};
use serde::Deserialize;
use tracing::{debug, instrument};

use crate::core::lifecycle::{PrMode, PrRecord, PrState};
use crate::core::types::RepoRef;
use crate::io::config::ManageConfig;
use crate::io::process::{ProcessLimits, run_command_with_timeout};

/// Search results are capped at this many PRs per query.
pub const SEARCH_LIMIT: u32 = 100;

/// A pull request to open.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewPullRequest {
    pub title: String,
    pub body: String,
    pub base: String,
    pub head: String,
}

/// Pull request operations on the code host.
pub trait CodeHost {
    /// Login of the authenticated identity.
    fn current_login(&self) -> Result<String>;

    /// PRs in `repo` authored by the current identity whose title equals
    /// `title`.
    fn find_pull_requests(&self, repo: &RepoRef, title: &str) -> Result<Vec<PrRecord>>;

    fn comment(&self, repo: &RepoRef, number: u64, body: &str) -> Result<()>;

    fn close(&self, repo: &RepoRef, number: u64) -> Result<()>;

    /// Open a PR and return its URL.
    fn create(&self, repo: &RepoRef, pr: &NewPullRequest) -> Result<String>;
}

/// Per-repository processing request sent during a fleet walk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepositoryJob {
    pub repository_url: String,
    pub template: String,
    pub parameter_data: String,
    pub pr_mode: PrMode,
}

/// Request to continue a fleet walk in a fresh run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RestartRequest {
    pub template: String,
    pub parameter_data: String,
    pub pr_mode: PrMode,
    /// Registry key the next run resumes from.
    pub from: String,
    /// Extra CLI flags for the next run (`--dry`, `--debug`).
    pub flags: Vec<String>,
}

/// Out-of-process automation triggered by a fleet walk.
pub trait JobTrigger {
    fn trigger_repository(&self, job: &RepositoryJob) -> Result<()>;
    fn trigger_restart(&self, restart: &RestartRequest) -> Result<()>;
}

/// `gh` CLI client.
#[derive(Debug, Clone)]
pub struct GhCli {
    program: String,
    limits: ProcessLimits,
    bot_login: Option<String>,
    orchestrator_repo: String,
    repository_workflow: String,
    restart_event: String,
}

impl GhCli {
    pub fn from_config(cfg: &ManageConfig) -> Self {
        Self {
            program: "gh".to_string(),
            limits: cfg.gh_limits(),
            bot_login: cfg.bot_login.clone(),
            orchestrator_repo: cfg.orchestrator_repo.clone(),
            repository_workflow: cfg.repository_workflow.clone(),
            restart_event: cfg.restart_event.clone(),
        }
    }

    /// Use a different executable (tests point this at a stub script).
    pub fn with_program(mut self, program: impl Into<String>) -> Self {
        self.program = program.into();
        self
    }

    fn run(&self, args: &[String], stdin: Option<&[u8]>) -> Result<String> {
        let label = format!("gh {}", args.first().map_or("", String::as_str));
        debug!(args = ?args, "running gh");
        let mut cmd = Command::new(&self.program);
        cmd.args(args);
        let output = run_command_with_timeout(cmd, stdin, self.limits)
            .with_context(|| format!("run {label}"))?;
        output.ensure_success(&label)?;
        Ok(output.stdout_text())
    }

    fn issue_detail(&self, repo: &RepoRef, number: u64) -> Result<PrRecord> {
        let raw = self.run(
            &strings(&["api", &format!("repos/{repo}/issues/{number}")]),
            None,
        )?;
        let detail: IssueDetail = serde_json::from_str(&raw)
            .with_context(|| format!("parse detail of PR #{number}"))?;
        Ok(detail.into_record())
    }
}

impl CodeHost for GhCli {
    fn current_login(&self) -> Result<String> {
        if let Some(login) = &self.bot_login {
            return Ok(login.clone());
        }
        let login = self.run(&strings(&["api", "user", "-q", ".login"]), None)?;
        let login = login.trim();
        if login.is_empty() {
            return Err(anyhow!("gh returned an empty login"));
        }
        Ok(login.to_string())
    }

    #[instrument(skip_all, fields(repo = %repo))]
    fn find_pull_requests(&self, repo: &RepoRef, title: &str) -> Result<Vec<PrRecord>> {
        let limit = SEARCH_LIMIT.to_string();
        let repo_arg = repo.to_string();
        let query = title_query(title);
        let raw = self.run(
            &strings(&[
                "search",
                "prs",
                "--repo",
                &repo_arg,
                "--author",
                "@me",
                "--json",
                "number,title,state",
                "--limit",
                &limit,
                "--",
                &query,
            ]),
            None,
        )?;
        let hits: Vec<SearchHit> = serde_json::from_str(&raw).context("parse gh search output")?;
        debug!(hits = hits.len(), "search finished");

        let mut records = Vec::new();
        for hit in hits.into_iter().filter(|h| h.title == title) {
            let mut record = self.issue_detail(repo, hit.number)?;
            record.title = hit.title;
            records.push(record);
        }
        Ok(records)
    }

    fn comment(&self, repo: &RepoRef, number: u64, body: &str) -> Result<()> {
        let args = strings(&[
            "pr",
            "comment",
            &number.to_string(),
            "--repo",
            &repo.to_string(),
            "--body-file",
            "-",
        ]);
        self.run(&args, Some(body.as_bytes()))?;
        Ok(())
    }

    fn close(&self, repo: &RepoRef, number: u64) -> Result<()> {
        let args = strings(&["pr", "close", &number.to_string(), "--repo", &repo.to_string()]);
        self.run(&args, None)?;
        Ok(())
    }

    fn create(&self, repo: &RepoRef, pr: &NewPullRequest) -> Result<String> {
        let args = strings(&[
            "pr",
            "create",
            "--repo",
            &repo.to_string(),
            "--title",
            &pr.title,
            "--body-file",
            "-",
            "--base",
            &pr.base,
            "--head",
            &pr.head,
        ]);
        let out = self.run(&args, Some(pr.body.as_bytes()))?;
        Ok(out.trim().to_string())
    }
}

impl JobTrigger for GhCli {
    #[instrument(skip_all, fields(repository = %job.repository_url))]
    fn trigger_repository(&self, job: &RepositoryJob) -> Result<()> {
        let args = strings(&[
            "workflow",
            "run",
            &self.repository_workflow,
            "--repo",
            &self.orchestrator_repo,
            "-f",
            &format!("repository_url={}", job.repository_url),
            "-f",
            &format!("template={}", job.template),
            "-f",
            &format!("parameter_data={}", job.parameter_data),
            "-f",
            &format!("pr_mode={}", job.pr_mode),
        ]);
        self.run(&args, None)?;
        Ok(())
    }

    #[instrument(skip_all, fields(from = %restart.from))]
    fn trigger_restart(&self, restart: &RestartRequest) -> Result<()> {
        let mut args = strings(&[
            "api",
            &format!("repos/{}/dispatches", self.orchestrator_repo),
            "--method",
            "POST",
            "-f",
            &format!("event_type={}", self.restart_event),
            "-f",
            &format!("client_payload[template]={}", restart.template),
            "-f",
            &format!("client_payload[parameter_data]={}", restart.parameter_data),
            "-f",
            &format!("client_payload[pr_mode]={}", restart.pr_mode),
            "-f",
            &format!("client_payload[from]={}", restart.from),
        ]);
        if !restart.flags.is_empty() {
            args.push("-f".to_string());
            args.push(format!("client_payload[flags]={}", restart.flags.join(" ")));
        }
        self.run(&args, None)?;
        Ok(())
    }
}

/// Search the title as one phrase so words like `OR` or `-x` stay literal.
fn title_query(title: &str) -> String {
    format!("in:title \"{}\"", title.replace('"', "\\\""))
}

fn strings(args: &[&str]) -> Vec<String> {
    args.iter().map(|s| s.to_string()).collect()
}

#[derive(Debug, Deserialize)]
struct SearchHit {
    number: u64,
    title: String,
}

#[derive(Debug, Deserialize)]
struct Login {
    login: String,
}

#[derive(Debug, Deserialize)]
struct PullRequestLink {
    merged_at: Option<String>,
}

/// Subset of the REST issue payload; PRs are issues with a `pull_request` link.
#[derive(Debug, Deserialize)]
struct IssueDetail {
    number: u64,
    state: String,
    #[serde(default)]
    title: String,
    closed_by: Option<Login>,
    pull_request: Option<PullRequestLink>,
}

impl IssueDetail {
    fn into_record(self) -> PrRecord {
        let merged = self
            .pull_request
            .as_ref()
            .is_some_and(|pr| pr.merged_at.is_some());
        let state = match (self.state.eq_ignore_ascii_case("open"), merged) {
            (true, _) => PrState::Open,
            (false, true) => PrState::Merged,
            (false, false) => PrState::Closed,
        };
        PrRecord {
            number: self.number,
            title: self.title,
            state,
            closed_by: self.closed_by.map(|l| l.login),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn issue_detail_maps_states() {
        let open: IssueDetail = serde_json::from_str(
            r#"{"number": 3, "state": "open", "title": "t", "closed_by": null, "pull_request": {"merged_at": null}}"#,
        )
        .expect("parse");
        assert_eq!(open.into_record().state, PrState::Open);

        let merged: IssueDetail = serde_json::from_str(
            r#"{"number": 4, "state": "closed", "closed_by": {"login": "maintainer"}, "pull_request": {"merged_at": "2025-01-01T00:00:00Z"}}"#,
        )
        .expect("parse");
        let record = merged.into_record();
        assert_eq!(record.state, PrState::Merged);
        assert_eq!(record.closed_by.as_deref(), Some("maintainer"));

        let closed: IssueDetail = serde_json::from_str(
            r#"{"number": 5, "state": "closed", "closed_by": {"login": "iobroker-bot"}, "pull_request": {"merged_at": null}}"#,
        )
        .expect("parse");
        assert_eq!(closed.into_record().state, PrState::Closed);
    }

    #[test]
    fn title_query_is_a_quoted_phrase() {
        assert_eq!(
            title_query("[iobroker-bot] Add tier OR -x"),
            "in:title \"[iobroker-bot] Add tier OR -x\""
        );
        assert_eq!(
            title_query("Use \"licenseInformation\""),
            "in:title \"Use \\\"licenseInformation\\\"\""
        );
    }

    #[test]
    fn configured_login_skips_gh() {
        let cfg = ManageConfig {
            bot_login: Some("helper-bot".to_string()),
            ..ManageConfig::default()
        };
        let gh = GhCli::from_config(&cfg).with_program("/nonexistent/gh");
        assert_eq!(gh.current_login().expect("login"), "helper-bot");
    }
}
