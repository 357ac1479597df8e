//! `owner/name` glob filter for fleet walks.

use anyhow::{Context, Result};
use regex::{Regex, RegexBuilder};

/// A compiled `owner/name` pattern where `*` matches any run of characters.
///
/// Both halves are anchored and case-insensitive. A pattern without `/`
/// constrains only the name; an empty half matches everything.
#[derive(Debug, Clone)]
pub struct RepoFilter {
    pattern: String,
    owner: Regex,
    name: Regex,
}

impl RepoFilter {
    pub fn compile(pattern: &str) -> Result<Self> {
        let (owner, name) = match pattern.split_once('/') {
            Some((owner, name)) => (owner, name),
            None => ("*", pattern),
        };
        Ok(Self {
            pattern: pattern.to_string(),
            owner: compile_glob(owner).with_context(|| format!("compile owner pattern `{owner}`"))?,
            name: compile_glob(name).with_context(|| format!("compile name pattern `{name}`"))?,
        })
    }

    pub fn matches(&self, owner: &str, name: &str) -> bool {
        self.owner.is_match(owner) && self.name.is_match(name)
    }

    pub fn pattern(&self) -> &str {
        &self.pattern
    }
}

fn compile_glob(glob: &str) -> Result<Regex, regex::Error> {
    let glob = if glob.is_empty() { "*" } else { glob };
    let body: Vec<String> = glob.split('*').map(regex::escape).collect();
    RegexBuilder::new(&format!("^{}$", body.join(".*")))
        .case_insensitive(true)
        .build()
}
