//! Templates and the runner that applies them to a repository checkout.
//!
//! A template is a statically registered [`Template`] value looked up by
//! name. It edits files through a [`Workspace`], which stages every edit in
//! memory; nothing reaches the disk until the template returns successfully
//! and [`Workspace::commit`] writes the changed files. A template that
//! decides no change is warranted leaves the workspace untouched and the
//! checkout stays byte-for-byte identical.

mod commitinfo;
mod copyright;
mod keywords;
mod license;
mod remove_common;
mod tier;
mod trusted_publishing;

use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use tempfile::NamedTempFile;
use tracing::{debug, info, instrument};

use crate::core::patch::{Document, Format};
use crate::core::types::{PatchResult, RepoRef};
use crate::exit_codes;

/// Arguments every template receives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub template: String,
    pub repository: RepoRef,
    /// Free-form extra input; empty when not given.
    pub parameter_data: String,
}

/// State shared by a template's fleet hooks during one fleet walk.
///
/// The walker owns it; `owner` and `adapter` are updated before every
/// [`Template::accepts`] call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FleetContext {
    pub template: String,
    pub parameter_data: String,
    pub owner: String,
    pub adapter: String,
    /// Counters a template accumulates across the walk.
    pub report: BTreeMap<String, u64>,
}

impl FleetContext {
    pub fn new(template: &str, parameter_data: &str) -> Self {
        Self {
            template: template.to_string(),
            parameter_data: parameter_data.to_string(),
            ..Self::default()
        }
    }

    pub fn bump(&mut self, counter: &str) {
        *self.report.entry(counter.to_string()).or_default() += 1;
    }
}

/// A named repository mutation plus its PR description.
pub trait Template: Sync {
    fn name(&self) -> &'static str;

    /// Markdown; the first line is the PR title, the rest the PR body.
    fn description(&self) -> &'static str;

    /// Stage the edits for one repository. Returning an error aborts the run
    /// without writing anything.
    fn patch(&self, workspace: &mut Workspace, invocation: &Invocation) -> Result<()>;

    /// Called once before a fleet walk starts.
    fn init(&self, _ctx: &mut FleetContext) {}

    /// Whether the fleet walk should trigger this repository.
    fn accepts(&self, _ctx: &mut FleetContext) -> bool {
        true
    }

    /// Called once after a fleet walk ends, including walks that hand over
    /// to a restart.
    fn finalize(&self, _ctx: &mut FleetContext) {}
}

static REGISTRY: [&dyn Template; 10] = [
    &remove_common::REMOVE_TITLE,
    &remove_common::REMOVE_MAIN,
    &remove_common::REMOVE_INSTALLED_FROM,
    &remove_common::REMOVE_FA_ICON,
    &keywords::FixKeywords,
    &tier::AddTier,
    &license::AddLicenseInformation,
    &copyright::FixCopyrightYear,
    &commitinfo::BlockCommitinfo,
    &trusted_publishing::MigrateToTrustedPublishing,
];

/// Every registered template, in registry order.
pub fn all() -> &'static [&'static dyn Template] {
    &REGISTRY
}

pub fn lookup(name: &str) -> Option<&'static dyn Template> {
    REGISTRY.iter().copied().find(|t| t.name() == name)
}

/// Like [`lookup`], but an unknown name is an error listing the known ones.
pub fn require(name: &str) -> Result<&'static dyn Template> {
    match lookup(name) {
        Some(template) => Ok(template),
        None => {
            let known: Vec<&str> = REGISTRY.iter().map(|t| t.name()).collect();
            bail!("unknown template `{name}` (known: {})", known.join(", "))
        }
    }
}

/// PR title and body taken from a template description.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TemplateDescription {
    pub title: String,
    pub body: String,
}

impl TemplateDescription {
    /// First line (leading `#` markers stripped) is the title, the trimmed
    /// remainder the body.
    pub fn parse(markdown: &str) -> Result<Self> {
        let (first, rest) = markdown.split_once('\n').unwrap_or((markdown, ""));
        let title = first.trim().trim_start_matches('#').trim();
        if title.is_empty() {
            bail!("template description has no title line");
        }
        Ok(Self {
            title: title.to_string(),
            body: rest.trim().to_string(),
        })
    }
}

#[derive(Debug)]
struct Staged {
    original: String,
    document: Document,
}

/// Files of one repository checkout, staged for editing.
#[derive(Debug)]
pub struct Workspace {
    root: PathBuf,
    staged: BTreeMap<PathBuf, Staged>,
}

impl Workspace {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            staged: BTreeMap::new(),
        }
    }

    /// Whether `rel` exists on disk.
    pub fn exists(&self, rel: &str) -> bool {
        self.root.join(rel).is_file()
    }

    /// The staged document for `rel`, loaded on first access. `None` when
    /// the file does not exist.
    pub fn document(&mut self, rel: &str) -> Result<Option<&mut Document>> {
        let key = PathBuf::from(rel);
        if !self.staged.contains_key(&key) {
            let path = self.root.join(&key);
            if !path.is_file() {
                return Ok(None);
            }
            let text =
                fs::read_to_string(&path).with_context(|| format!("read {}", path.display()))?;
            let document = Document::new(text.clone(), Format::from_path(&key));
            self.staged.insert(
                key.clone(),
                Staged {
                    original: text,
                    document,
                },
            );
        }
        Ok(self.staged.get_mut(&key).map(|s| &mut s.document))
    }

    /// Like [`Workspace::document`], but a missing file is an error.
    pub fn require(&mut self, rel: &str) -> Result<&mut Document> {
        match self.document(rel)? {
            Some(document) => Ok(document),
            None => bail!("{rel} does not exist"),
        }
    }

    /// Write every changed file through a temporary file and a rename.
    /// Returns the written relative paths.
    pub fn commit(self) -> Result<Vec<PathBuf>> {
        let mut written = Vec::new();
        for (rel, staged) in self.staged {
            if staged.document.text() == staged.original {
                continue;
            }
            let path = self.root.join(&rel);
            let dir = path.parent().unwrap_or(&self.root);
            let mut tmp = NamedTempFile::new_in(dir)
                .with_context(|| format!("create temp file in {}", dir.display()))?;
            tmp.write_all(staged.document.text().as_bytes())
                .with_context(|| format!("write {}", path.display()))?;
            if let Ok(meta) = fs::metadata(&path) {
                tmp.as_file()
                    .set_permissions(meta.permissions())
                    .with_context(|| format!("copy permissions of {}", path.display()))?;
            }
            tmp.persist(&path)
                .with_context(|| format!("replace {}", path.display()))?;
            debug!(path = %rel.display(), "file written");
            written.push(rel);
        }
        Ok(written)
    }
}

/// Result of [`run_template`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TemplateRun {
    pub result: PatchResult,
    /// Relative paths written, empty when nothing changed.
    pub written: Vec<PathBuf>,
}

/// Apply `template` to the checkout at `workdir`.
///
/// An error from the template leaves the checkout untouched.
#[instrument(skip_all, fields(template = template.name(), repo = %invocation.repository))]
pub fn run_template(
    template: &dyn Template,
    workdir: &Path,
    invocation: &Invocation,
) -> Result<TemplateRun> {
    let mut workspace = Workspace::new(workdir);
    template
        .patch(&mut workspace, invocation)
        .with_context(|| format!("template {} failed", template.name()))?;
    let written = workspace.commit()?;
    if written.is_empty() {
        info!("template made no changes");
    } else {
        info!(files = written.len(), outcome = "changed", "template applied");
    }
    Ok(TemplateRun {
        result: PatchResult {
            changed: !written.is_empty(),
            exit_code: exit_codes::OK,
        },
        written,
    })
}
