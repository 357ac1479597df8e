//! PR title/body hand-off files.
//!
//! `apply-template` writes them into the repository checkout and a later
//! `manage-pr` invocation, usually a separate process, reads them back.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result, bail};
use tracing::debug;

pub const TITLE_FILE: &str = ".pr-title";
pub const BODY_FILE: &str = ".pr-body";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Handoff {
    pub title: String,
    pub body: String,
}

impl Handoff {
    /// Build the PR text for a template run.
    ///
    /// The body is the description body followed by a separator, the
    /// template name and, when non-empty, the parameter data.
    pub fn compose(
        title_prefix: &str,
        title: &str,
        description_body: &str,
        template: &str,
        parameter_data: &str,
    ) -> Self {
        let mut body = description_body.to_string();
        body.push_str("\n\n---\n\n");
        body.push_str(&format!("**Template**: {template}\n"));
        if !parameter_data.is_empty() {
            body.push_str(&format!("**Parameters**: {parameter_data}\n"));
        }
        Self {
            title: format!("{title_prefix}{title}"),
            body,
        }
    }

    pub fn write(&self, dir: &Path) -> Result<()> {
        for (name, contents) in [(TITLE_FILE, &self.title), (BODY_FILE, &self.body)] {
            let path = dir.join(name);
            fs::write(&path, contents).with_context(|| format!("write {}", path.display()))?;
            debug!(path = %path.display(), "hand-off file written");
        }
        Ok(())
    }

    /// Read both files from `dir`. A missing file or an empty title is an error.
    pub fn read(dir: &Path) -> Result<Self> {
        let read = |name: &str| -> Result<String> {
            let path = dir.join(name);
            if !path.is_file() {
                bail!("hand-off file {} is missing", path.display());
            }
            fs::read_to_string(&path).with_context(|| format!("read {}", path.display()))
        };
        let title = read(TITLE_FILE)?.trim().to_string();
        let body = read(BODY_FILE)?;
        if title.is_empty() {
            bail!("hand-off file {TITLE_FILE} is empty");
        }
        Ok(Self { title, body })
    }
}
