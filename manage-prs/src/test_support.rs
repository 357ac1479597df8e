//! Scripted collaborators and fixtures for unit and integration tests.

use std::cell::RefCell;
use std::collections::HashSet;
use std::fs;
use std::path::Path;
use std::time::Duration;

use anyhow::{Result, anyhow};

use crate::core::lifecycle::{PrRecord, PrState};
use crate::core::registry::RegistryEntry;
use crate::core::types::RepoRef;
use crate::io::github::{CodeHost, JobTrigger, NewPullRequest, RepositoryJob, RestartRequest};
use crate::io::rest::{RegistrySource, RepoProbe, RepositoryCheck};
use crate::templates::Invocation;
use crate::walk::Pacer;

pub const BOT_LOGIN: &str = "iobroker-bot";

/// A PR record with the given title.
pub fn pr(number: u64, title: &str, state: PrState, closed_by: Option<&str>) -> PrRecord {
    PrRecord {
        number,
        title: title.to_string(),
        state,
        closed_by: closed_by.map(str::to_string),
    }
}

/// A registry entry whose `meta` URL names `owner`.
pub fn entry(key: &str, owner: Option<&str>) -> RegistryEntry {
    RegistryEntry {
        key: key.to_string(),
        meta: owner.map(|o| {
            format!("https://raw.githubusercontent.com/{o}/ioBroker.{key}/master/io-package.json")
        }),
    }
}

pub fn invocation(template: &str) -> Invocation {
    Invocation {
        template: template.to_string(),
        repository: RepoRef {
            owner: "acme".to_string(),
            name: "ioBroker.foo".to_string(),
        },
        parameter_data: String::new(),
    }
}

/// Write `(relative path, contents)` pairs below `root`, creating parents.
pub fn write_files(root: &Path, files: &[(&str, &str)]) {
    for (rel, contents) in files {
        let path = root.join(rel);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).expect("create parent");
        }
        fs::write(&path, contents).expect("write fixture");
    }
}

/// One call made against [`ScriptedHost`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostCall {
    Comment { number: u64, body: String },
    Close { number: u64 },
    Create { title: String, base: String, head: String },
}

/// In-memory code host returning fixed PR records and recording mutations.
#[derive(Debug)]
pub struct ScriptedHost {
    login: String,
    records: Vec<PrRecord>,
    failing_comments: HashSet<u64>,
    failing_closes: HashSet<u64>,
    fail_create: bool,
    calls: RefCell<Vec<HostCall>>,
}

impl ScriptedHost {
    pub fn new(records: Vec<PrRecord>) -> Self {
        Self {
            login: BOT_LOGIN.to_string(),
            records,
            failing_comments: HashSet::new(),
            failing_closes: HashSet::new(),
            fail_create: false,
            calls: RefCell::new(Vec::new()),
        }
    }

    pub fn failing_comment(mut self, number: u64) -> Self {
        self.failing_comments.insert(number);
        self
    }

    pub fn failing_close(mut self, number: u64) -> Self {
        self.failing_closes.insert(number);
        self
    }

    pub fn failing_create(mut self) -> Self {
        self.fail_create = true;
        self
    }

    pub fn calls(&self) -> Vec<HostCall> {
        self.calls.borrow().clone()
    }

    pub fn creates(&self) -> usize {
        self.calls()
            .iter()
            .filter(|c| matches!(c, HostCall::Create { .. }))
            .count()
    }

    pub fn closed(&self) -> Vec<u64> {
        self.calls()
            .iter()
            .filter_map(|c| match c {
                HostCall::Close { number } => Some(*number),
                _ => None,
            })
            .collect()
    }
}

impl CodeHost for ScriptedHost {
    fn current_login(&self) -> Result<String> {
        Ok(self.login.clone())
    }

    fn find_pull_requests(&self, _repo: &RepoRef, title: &str) -> Result<Vec<PrRecord>> {
        Ok(self
            .records
            .iter()
            .filter(|r| r.title == title)
            .cloned()
            .collect())
    }

    fn comment(&self, _repo: &RepoRef, number: u64, body: &str) -> Result<()> {
        if self.failing_comments.contains(&number) {
            return Err(anyhow!("comment on #{number} rejected"));
        }
        self.calls.borrow_mut().push(HostCall::Comment {
            number,
            body: body.to_string(),
        });
        Ok(())
    }

    fn close(&self, _repo: &RepoRef, number: u64) -> Result<()> {
        if self.failing_closes.contains(&number) {
            return Err(anyhow!("close of #{number} rejected"));
        }
        self.calls.borrow_mut().push(HostCall::Close { number });
        Ok(())
    }

    fn create(&self, repo: &RepoRef, pr: &NewPullRequest) -> Result<String> {
        if self.fail_create {
            return Err(anyhow!("create rejected"));
        }
        let mut calls = self.calls.borrow_mut();
        calls.push(HostCall::Create {
            title: pr.title.clone(),
            base: pr.base.clone(),
            head: pr.head.clone(),
        });
        Ok(format!("{}/pull/{}", repo.url(), 100 + calls.len()))
    }
}

/// Records triggered jobs and restarts.
#[derive(Debug, Default)]
pub struct RecordingTrigger {
    jobs: RefCell<Vec<RepositoryJob>>,
    restarts: RefCell<Vec<RestartRequest>>,
    failing_urls: HashSet<String>,
}

impl RecordingTrigger {
    pub fn failing_for(mut self, repository_url: &str) -> Self {
        self.failing_urls.insert(repository_url.to_string());
        self
    }

    pub fn jobs(&self) -> Vec<RepositoryJob> {
        self.jobs.borrow().clone()
    }

    pub fn restarts(&self) -> Vec<RestartRequest> {
        self.restarts.borrow().clone()
    }
}

impl JobTrigger for RecordingTrigger {
    fn trigger_repository(&self, job: &RepositoryJob) -> Result<()> {
        if self.failing_urls.contains(&job.repository_url) {
            return Err(anyhow!("workflow dispatch for {} rejected", job.repository_url));
        }
        self.jobs.borrow_mut().push(job.clone());
        Ok(())
    }

    fn trigger_restart(&self, restart: &RestartRequest) -> Result<()> {
        self.restarts.borrow_mut().push(restart.clone());
        Ok(())
    }
}

/// Records requested pauses instead of sleeping.
#[derive(Debug, Default)]
pub struct NoPause {
    pub pauses: Vec<Duration>,
}

impl Pacer for NoPause {
    fn pause(&mut self, delay: Duration) {
        self.pauses.push(delay);
    }
}

/// Answers every existence probe the same way.
#[derive(Debug, Clone, Copy)]
pub struct StaticProbe(pub RepoProbe);

impl RepositoryCheck for StaticProbe {
    fn probe(&self, _repo: &RepoRef) -> Result<RepoProbe> {
        Ok(self.0)
    }
}

/// A registry served from memory.
#[derive(Debug, Clone, Default)]
pub struct StaticRegistry(pub Vec<RegistryEntry>);

impl RegistrySource for StaticRegistry {
    fn fetch(&self) -> Result<Vec<RegistryEntry>> {
        Ok(self.0.clone())
    }
}
