//! Keep the release script's `.commitinfo` out of git.

use anyhow::Result;
use tracing::info;

use super::{Invocation, Template, Workspace};

const GITIGNORE: &str = ".gitignore";
const ENTRY: &str = ".commitinfo";
const BLOCK: &str = "\n#ignore .commitinfo created by ioBroker release script\n.commitinfo\n";

#[derive(Debug)]
pub struct BlockCommitinfo;

impl Template for BlockCommitinfo {
    fn name(&self) -> &'static str {
        "S0000-blockCommitinfo"
    }

    fn description(&self) -> &'static str {
        include_str!("descriptions/S0000-blockCommitinfo.md")
    }

    fn patch(&self, workspace: &mut Workspace, _invocation: &Invocation) -> Result<()> {
        let Some(doc) = workspace.document(GITIGNORE)? else {
            info!("{GITIGNORE} does not exist, nothing to do");
            return Ok(());
        };
        if doc.text().contains(ENTRY) {
            info!("{GITIGNORE} already ignores {ENTRY}");
            return Ok(());
        }
        let updated = format!("{}{BLOCK}", doc.text());
        doc.rewrite(updated)?;
        info!(outcome = "appended", "{ENTRY} added to {GITIGNORE}");
        Ok(())
    }
}
