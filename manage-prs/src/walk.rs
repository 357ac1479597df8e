//! `walk-fleet`: trigger the per-repository automation across the registry.
//!
//! The walk pays a fixed pause after every triggered repository and stops
//! after a fixed number of triggers, handing the rest of the registry to a
//! restarted run through a restart request that names the next key.

use std::collections::BTreeMap;
use std::thread;
use std::time::Duration;

use anyhow::{Context, Result};
use tracing::{debug, info, instrument, warn};

use crate::core::filter::RepoFilter;
use crate::core::lifecycle::PrMode;
use crate::core::registry::RegistryEntry;
use crate::io::github::{JobTrigger, RepositoryJob, RestartRequest};
use crate::io::rest::RegistrySource;
use crate::templates::{FleetContext, Template};

/// How the walk waits between triggers.
pub trait Pacer {
    fn pause(&mut self, delay: Duration);
}

/// Sleeps the current thread.
#[derive(Debug, Default)]
pub struct SleepPacer;

impl Pacer for SleepPacer {
    fn pause(&mut self, delay: Duration) {
        thread::sleep(delay);
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WalkOptions {
    pub parameter_data: String,
    pub pr_mode: PrMode,
    /// Skip registry entries before this key.
    pub from: Option<String>,
    /// `owner/name` glob.
    pub filter: Option<String>,
    pub delay: Duration,
    pub dry_delay: Duration,
    /// Triggers allowed before handing over to a restart.
    pub budget: u32,
    /// Log instead of triggering.
    pub dry: bool,
    /// Forwarded to the restarted run.
    pub debug: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WalkSummary {
    /// Repositories triggered (or, in a dry run, that would have been).
    pub triggered: u32,
    /// Keys whose trigger failed.
    pub failed: Vec<String>,
    /// Entries rejected by the `owner/name` filter.
    pub filtered: u32,
    /// Entries rejected by the template's fleet filter.
    pub declined: u32,
    /// Entries without a derivable owner.
    pub unresolved: u32,
    /// Key the restarted run resumes from.
    pub restart_from: Option<String>,
    /// False when `from` was given but never matched.
    pub from_found: bool,
    /// Counters reported by the template's fleet hooks.
    pub report: BTreeMap<String, u64>,
}

pub struct FleetWalker<'a, T: JobTrigger, P: Pacer> {
    trigger: &'a T,
    pacer: P,
    template: &'static dyn Template,
    options: WalkOptions,
}

impl<'a, T: JobTrigger, P: Pacer> FleetWalker<'a, T, P> {
    pub fn new(trigger: &'a T, pacer: P, template: &'static dyn Template, options: WalkOptions) -> Self {
        Self {
            trigger,
            pacer,
            template,
            options,
        }
    }

    /// Hand back the pacer (tests inspect the recorded pauses).
    pub fn into_pacer(self) -> P {
        self.pacer
    }

    /// Fetch the registry from `source` and walk it.
    pub fn run<S: RegistrySource>(&mut self, source: &S) -> Result<WalkSummary> {
        let entries = source.fetch().context("load repository registry")?;
        self.walk(&entries)
    }

    #[instrument(skip_all, fields(template = self.template.name(), dry = self.options.dry))]
    pub fn walk(&mut self, entries: &[RegistryEntry]) -> Result<WalkSummary> {
        let filter = self
            .options
            .filter
            .as_deref()
            .map(RepoFilter::compile)
            .transpose()?;
        if let Some(filter) = &filter {
            info!(pattern = filter.pattern(), "restricting walk to matching repositories");
        }
        let mut ctx = FleetContext::new(self.template.name(), &self.options.parameter_data);
        self.template.init(&mut ctx);

        let mut summary = WalkSummary {
            from_found: self.options.from.is_none(),
            ..WalkSummary::default()
        };
        let mut remaining = self.options.budget;
        let pause = if self.options.dry {
            self.options.dry_delay
        } else {
            self.options.delay
        };

        for entry in entries {
            if entry.is_reserved() {
                continue;
            }
            if !summary.from_found {
                if self.options.from.as_deref() == Some(entry.key.as_str()) {
                    summary.from_found = true;
                } else {
                    continue;
                }
            }
            if remaining == 0 {
                summary.restart_from = Some(entry.key.clone());
                break;
            }
            let Some(repo) = entry.repository() else {
                warn!(key = %entry.key, "cannot derive owner from registry entry, skipping");
                summary.unresolved += 1;
                continue;
            };
            if let Some(filter) = &filter {
                if !filter.matches(&repo.owner, &repo.name) {
                    debug!(key = %entry.key, "filtered out");
                    summary.filtered += 1;
                    continue;
                }
            }
            ctx.owner = repo.owner.clone();
            ctx.adapter = entry.key.clone();
            if !self.template.accepts(&mut ctx) {
                debug!(key = %entry.key, "declined by template");
                summary.declined += 1;
                continue;
            }

            let job = RepositoryJob {
                repository_url: repo.url(),
                template: self.template.name().to_string(),
                parameter_data: self.options.parameter_data.clone(),
                pr_mode: self.options.pr_mode,
            };
            if self.options.dry {
                info!(key = %entry.key, repo = %repo, "dry run, would trigger");
                summary.triggered += 1;
            } else {
                match self.trigger.trigger_repository(&job) {
                    Ok(()) => {
                        info!(key = %entry.key, repo = %repo, outcome = "triggered", "repository triggered");
                        summary.triggered += 1;
                    }
                    Err(err) => {
                        warn!(key = %entry.key, error = %format!("{err:#}"), "trigger failed");
                        summary.failed.push(entry.key.clone());
                    }
                }
            }
            remaining -= 1;
            self.pacer.pause(pause);
        }

        self.template.finalize(&mut ctx);
        summary.report = ctx.report;
        if !summary.from_found {
            warn!(from = ?self.options.from, "start key never found in registry");
        }

        if let Some(from) = &summary.restart_from {
            let restart = RestartRequest {
                template: self.template.name().to_string(),
                parameter_data: self.options.parameter_data.clone(),
                pr_mode: self.options.pr_mode,
                from: from.clone(),
                flags: self.restart_flags(),
            };
            self.trigger
                .trigger_restart(&restart)
                .with_context(|| format!("trigger restart from {from}"))?;
            info!(%from, outcome = "restarted", "budget exhausted, restart triggered");
        }
        info!(
            triggered = summary.triggered,
            failed = summary.failed.len(),
            filtered = summary.filtered,
            declined = summary.declined,
            "walk finished"
        );
        Ok(summary)
    }

    fn restart_flags(&self) -> Vec<String> {
        let mut flags = Vec::new();
        if self.options.debug {
            flags.push("--debug".to_string());
        }
        if self.options.dry {
            flags.push("--dry".to_string());
        }
        flags
    }
}
