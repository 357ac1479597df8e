//! `apply-template`: run a template against a checkout and write the PR
//! hand-off files.

use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use tracing::{info, instrument, warn};

use crate::core::types::RepoRef;
use crate::io::config::ManageConfig;
use crate::io::git::Git;
use crate::io::handoff::{BODY_FILE, Handoff, TITLE_FILE};
use crate::io::rest::{RepoProbe, RepositoryCheck};
use crate::templates::{self, Invocation, TemplateDescription, TemplateRun};

#[derive(Debug, Clone)]
pub struct ApplyRequest {
    pub repository: RepoRef,
    pub template: String,
    pub parameter_data: String,
    /// Root of the repository checkout; hand-off files land here too.
    pub workdir: PathBuf,
}

#[derive(Debug, Clone)]
pub struct ApplyOutcome {
    pub run: TemplateRun,
    pub handoff: Handoff,
    /// Paths git reports as changed; `None` outside a git checkout.
    pub git_changes: Option<Vec<String>>,
}

/// Check preconditions, run the template and write the hand-off files.
///
/// Fails when the template is unknown, the repository does not exist or
/// the template fails. A rate-limited existence probe is not a failure.
#[instrument(skip_all, fields(repo = %request.repository, template = %request.template))]
pub fn apply_template<C: RepositoryCheck>(
    check: &C,
    cfg: &ManageConfig,
    request: &ApplyRequest,
) -> Result<ApplyOutcome> {
    let template = templates::require(&request.template)?;
    let description = TemplateDescription::parse(template.description())
        .with_context(|| format!("description of {}", template.name()))?;
    info!(outcome = "ok", "template found");

    match check.probe(&request.repository)? {
        RepoProbe::Exists => info!(outcome = "ok", "repository exists"),
        RepoProbe::RateLimited => {
            warn!("could not verify repository existence (rate limited), continuing");
        }
        RepoProbe::Missing => bail!(
            "repository {} does not exist or is not accessible",
            request.repository
        ),
    }

    let invocation = Invocation {
        template: template.name().to_string(),
        repository: request.repository.clone(),
        parameter_data: request.parameter_data.clone(),
    };
    let run = templates::run_template(template, &request.workdir, &invocation)?;

    let handoff = Handoff::compose(
        &cfg.title_prefix,
        &description.title,
        &description.body,
        template.name(),
        &request.parameter_data,
    );
    handoff.write(&request.workdir)?;
    info!(title = %handoff.title, outcome = "written", "hand-off files written");

    let git = Git::new(&request.workdir);
    let git_changes = if git.is_repository() {
        let changes = git.changed_paths(&[TITLE_FILE, BODY_FILE])?;
        for path in &changes {
            info!(%path, "changed");
        }
        Some(changes)
    } else {
        None
    };
    if !run.result.changed {
        warn!("template made no changes, no PR will be created");
    }

    Ok(ApplyOutcome {
        run,
        handoff,
        git_changes,
    })
}
