//! `manage-pr`: execute the PR lifecycle for one repository.

use anyhow::{Context, Result};
use tracing::{info, instrument, warn};

use crate::core::lifecycle::{PrMode, Plan, decide, observe};
use crate::core::types::RepoRef;
use crate::io::github::{CodeHost, NewPullRequest};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManageRequest {
    pub mode: PrMode,
    pub repository: RepoRef,
    pub base: String,
    pub head: String,
    pub title: String,
    pub body: String,
}

/// A comment or close call that failed; the run carried on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloseFailure {
    pub number: u64,
    pub step: &'static str,
    pub error: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManageOutcome {
    pub plan: Plan,
    /// PRs closed successfully.
    pub closed: Vec<u64>,
    pub failures: Vec<CloseFailure>,
    /// URL of the created PR.
    pub created: Option<String>,
}

/// Observe the existing PRs, decide and execute the plan.
///
/// Comment and close failures are collected in the outcome. A failed
/// lookup or a failed create is an error.
#[instrument(skip_all, fields(repo = %request.repository, mode = %request.mode))]
pub fn manage_pull_request<H: CodeHost>(host: &H, request: &ManageRequest) -> Result<ManageOutcome> {
    let repo = &request.repository;
    let login = host.current_login().context("determine bot identity")?;
    let records = host
        .find_pull_requests(repo, &request.title)
        .with_context(|| format!("list PRs of {repo}"))?;
    let observed = observe(&records, &request.title, &login);
    info!(
        open = observed.open.len(),
        merged = observed.merged.len(),
        rejected = observed.rejected.is_some(),
        "existing PRs"
    );
    let plan = decide(request.mode, &observed);

    let mut closed = Vec::new();
    let mut failures = Vec::new();
    for &number in &plan.close {
        if let Err(err) = host.comment(repo, number, plan.close_reason.comment()) {
            warn!(number, error = %format!("{err:#}"), "comment failed");
            failures.push(CloseFailure {
                number,
                step: "comment",
                error: format!("{err:#}"),
            });
        }
        match host.close(repo, number) {
            Ok(()) => {
                info!(number, outcome = "closed", "PR closed");
                closed.push(number);
            }
            Err(err) => {
                warn!(number, error = %format!("{err:#}"), "close failed");
                failures.push(CloseFailure {
                    number,
                    step: "close",
                    error: format!("{err:#}"),
                });
            }
        }
    }

    let created = if plan.create {
        let url = host
            .create(
                repo,
                &NewPullRequest {
                    title: request.title.clone(),
                    body: request.body.clone(),
                    base: request.base.clone(),
                    head: request.head.clone(),
                },
            )
            .with_context(|| format!("create PR in {repo}"))?;
        info!(%url, outcome = "created", "PR created");
        Some(url)
    } else {
        None
    };
    if let Some(reason) = &plan.skip {
        info!(%reason, outcome = "skipped", "no PR created");
    }

    Ok(ManageOutcome {
        plan,
        closed,
        failures,
        created,
    })
}
