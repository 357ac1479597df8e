//! Tool configuration read from `manage-prs.toml`.

use std::fs;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use serde::Deserialize;

use crate::io::process::ProcessLimits;

/// Default file name, looked up in the current directory.
pub const CONFIG_FILE: &str = "manage-prs.toml";

/// Tool configuration (TOML).
///
/// Every field has a default, so a missing file or a partial file is fine.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ManageConfig {
    /// Registry of fleet repositories.
    pub registry_url: String,

    /// Base URL of the code host REST API.
    pub api_base: String,

    /// Prepended to every PR title taken from a template description.
    pub title_prefix: String,

    /// Repository hosting the per-repository workflow and the restart event.
    pub orchestrator_repo: String,

    /// Workflow file run once per repository during a fleet walk.
    pub repository_workflow: String,

    /// `repository_dispatch` event type used to resume a fleet walk.
    pub restart_event: String,

    /// Identity the tool acts as. Defaults to the authenticated `gh` user.
    pub bot_login: Option<String>,

    /// Timeout for each `gh` invocation in seconds.
    pub gh_timeout_secs: u64,

    /// Truncate captured `gh` stdout/stderr beyond this many bytes.
    pub gh_output_limit_bytes: usize,

    pub walk: WalkConfig,
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct WalkConfig {
    /// Pause after each triggered repository.
    pub delay_secs: u64,

    /// Pause used instead of `delay_secs` in dry runs.
    pub dry_delay_secs: u64,

    /// Wall-clock budget of one walk before it hands over to a restart.
    pub restart_after_secs: u64,
}

impl Default for WalkConfig {
    fn default() -> Self {
        Self {
            delay_secs: 120,
            dry_delay_secs: 1,
            restart_after_secs: 3 * 60 * 60,
        }
    }
}

impl WalkConfig {
    /// Number of triggered repositories that fit into the time budget.
    pub fn iteration_budget(&self, delay_secs: u64) -> u32 {
        let per_iteration = delay_secs.max(1);
        u32::try_from(self.restart_after_secs / per_iteration)
            .unwrap_or(u32::MAX)
            .max(1)
    }
}

impl Default for ManageConfig {
    fn default() -> Self {
        Self {
            registry_url: "http://repo.iobroker.live/sources-dist-latest.json".to_string(),
            api_base: "https://api.github.com".to_string(),
            title_prefix: "[iobroker-bot] ".to_string(),
            orchestrator_repo: "iobroker-bot-orga/manage-prs".to_string(),
            repository_workflow: "processRepository.yml".to_string(),
            restart_event: "process-latest-restart".to_string(),
            bot_login: None,
            gh_timeout_secs: 120,
            gh_output_limit_bytes: 1_000_000,
            walk: WalkConfig::default(),
        }
    }
}

impl ManageConfig {
    pub fn validate(&self) -> Result<()> {
        for (name, value) in [
            ("registry_url", &self.registry_url),
            ("api_base", &self.api_base),
            ("orchestrator_repo", &self.orchestrator_repo),
            ("repository_workflow", &self.repository_workflow),
            ("restart_event", &self.restart_event),
        ] {
            if value.trim().is_empty() {
                return Err(anyhow!("{name} must not be empty"));
            }
        }
        if !self.orchestrator_repo.contains('/') {
            return Err(anyhow!("orchestrator_repo must be owner/name"));
        }
        if self.bot_login.as_deref().is_some_and(|l| l.trim().is_empty()) {
            return Err(anyhow!("bot_login must not be empty when set"));
        }
        if self.gh_timeout_secs == 0 {
            return Err(anyhow!("gh_timeout_secs must be > 0"));
        }
        if self.gh_output_limit_bytes == 0 {
            return Err(anyhow!("gh_output_limit_bytes must be > 0"));
        }
        if self.walk.delay_secs == 0 {
            return Err(anyhow!("walk.delay_secs must be > 0"));
        }
        if self.walk.restart_after_secs == 0 {
            return Err(anyhow!("walk.restart_after_secs must be > 0"));
        }
        Ok(())
    }

    pub fn gh_limits(&self) -> ProcessLimits {
        ProcessLimits {
            timeout: Duration::from_secs(self.gh_timeout_secs),
            output_limit_bytes: self.gh_output_limit_bytes,
        }
    }
}

/// Load config from a TOML file.
///
/// If the file is missing, returns `ManageConfig::default()`.
pub fn load_config(path: &Path) -> Result<ManageConfig> {
    if !path.exists() {
        let cfg = ManageConfig::default();
        cfg.validate()?;
        return Ok(cfg);
    }
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let cfg: ManageConfig =
        toml::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
    cfg.validate()
        .with_context(|| format!("invalid config {}", path.display()))?;
    Ok(cfg)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn load_missing_returns_default() {
        let temp = tempfile::tempdir().expect("tempdir");
        let cfg = load_config(&temp.path().join("missing.toml")).expect("load");
        assert_eq!(cfg, ManageConfig::default());
    }

    #[test]
    fn partial_file_keeps_other_defaults() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join(CONFIG_FILE);
        fs::write(&path, "bot_login = \"helper-bot\"\n\n[walk]\ndelay_secs = 60\n").expect("write");
        let cfg = load_config(&path).expect("load");
        assert_eq!(cfg.bot_login.as_deref(), Some("helper-bot"));
        assert_eq!(cfg.walk.delay_secs, 60);
        assert_eq!(cfg.walk.restart_after_secs, 3 * 60 * 60);
        assert_eq!(cfg.title_prefix, "[iobroker-bot] ");
    }

    #[test]
    fn rejects_zero_delay() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join(CONFIG_FILE);
        fs::write(&path, "[walk]\ndelay_secs = 0\n").expect("write");
        let err = load_config(&path).expect_err("invalid");
        assert!(format!("{err:#}").contains("delay_secs"));
    }

    #[test]
    fn default_budget_is_ninety_iterations() {
        let walk = WalkConfig::default();
        assert_eq!(walk.iteration_budget(walk.delay_secs), 90);
        assert_eq!(walk.iteration_budget(0), 10_800);
        assert_eq!(
            WalkConfig {
                restart_after_secs: 5,
                ..WalkConfig::default()
            }
            .iteration_budget(120),
            1
        );
    }
}
