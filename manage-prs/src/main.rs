//! Fleet-wide pull request automation for ioBroker adapter repositories.
//!
//! `apply-template` patches one checkout and writes the PR hand-off files,
//! `manage-pr` opens or closes PRs from those files and `walk-fleet`
//! triggers the per-repository job for every adapter in the registry.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use tracing::{info, warn};

use manage_prs::apply::{ApplyRequest, apply_template};
use manage_prs::core::lifecycle::PrMode;
use manage_prs::core::types::RepoRef;
use manage_prs::io::config::{CONFIG_FILE, load_config};
use manage_prs::io::github::GhCli;
use manage_prs::io::handoff::Handoff;
use manage_prs::io::rest::RestClient;
use manage_prs::manage::{ManageRequest, manage_pull_request};
use manage_prs::walk::{FleetWalker, SleepPacer, WalkOptions};
use manage_prs::{exit_codes, logging, templates};

#[derive(Parser)]
#[command(
    name = "manage-prs",
    version,
    about = "Apply templates and manage pull requests across the adapter fleet"
)]
struct Cli {
    /// Config file; defaults apply when it does not exist.
    #[arg(long, global = true, default_value = CONFIG_FILE)]
    config: PathBuf,

    /// Verbose logging.
    #[arg(long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Apply a template to a repository checkout and write `.pr-title`/`.pr-body`.
    ApplyTemplate {
        /// Repository as `owner/name`.
        repository: String,
        template: String,
        #[arg(default_value = "")]
        parameter_data: String,
        /// Checkout to patch.
        #[arg(long, default_value = ".")]
        workdir: PathBuf,
    },
    /// Close, skip or create the PR described by the hand-off files.
    ManagePr {
        /// One of force-creation, recreate, skip-if-existing, skip-if-closed,
        /// skip-if-merged, revoke.
        mode: String,
        repository: String,
        base: String,
        head: String,
        /// Directory holding the hand-off files.
        #[arg(long, default_value = ".")]
        workdir: PathBuf,
    },
    /// Trigger the repository job for every adapter in the registry.
    WalkFleet {
        #[arg(long)]
        template: String,
        /// Resume at this registry key.
        #[arg(long)]
        from: Option<String>,
        /// Only `owner/name` matches of this glob.
        #[arg(long)]
        filter: Option<String>,
        /// Seconds between triggers; overrides the config.
        #[arg(long)]
        delay: Option<u64>,
        /// Log what would be triggered without triggering.
        #[arg(long)]
        dry: bool,
        #[arg(long = "parameter_data", alias = "parameter-data", default_value = "")]
        parameter_data: String,
        #[arg(long = "pr_mode", alias = "pr-mode", default_value = "recreate")]
        pr_mode: String,
    },
    /// Print every template name with its PR title.
    ListTemplates,
}

fn main() {
    if let Err(err) = run() {
        eprintln!("{:#}", err);
        std::process::exit(exit_codes::FAILURE);
    }
}

fn run() -> Result<()> {
    let cli = Cli::parse();
    logging::init(cli.debug);
    match cli.command {
        Command::ApplyTemplate {
            repository,
            template,
            parameter_data,
            workdir,
        } => cmd_apply(&cli.config, &repository, template, parameter_data, workdir),
        Command::ManagePr {
            mode,
            repository,
            base,
            head,
            workdir,
        } => cmd_manage(&cli.config, &mode, &repository, base, head, &workdir),
        Command::WalkFleet {
            template,
            from,
            filter,
            delay,
            dry,
            parameter_data,
            pr_mode,
        } => cmd_walk(
            &cli.config,
            WalkArgs {
                template,
                from,
                filter,
                delay,
                dry,
                parameter_data,
                pr_mode,
                debug: cli.debug,
            },
        ),
        Command::ListTemplates => cmd_list(),
    }
}

fn cmd_apply(
    config: &Path,
    repository: &str,
    template: String,
    parameter_data: String,
    workdir: PathBuf,
) -> Result<()> {
    let cfg = load_config(config)?;
    let request = ApplyRequest {
        repository: RepoRef::parse(repository)?,
        template,
        parameter_data,
        workdir,
    };
    let client = RestClient::from_config(&cfg)?;
    let outcome = apply_template(&client, &cfg, &request)?;
    println!(
        "{}",
        if outcome.run.result.changed {
            "changed"
        } else {
            "unchanged"
        }
    );
    Ok(())
}

fn cmd_manage(
    config: &Path,
    mode: &str,
    repository: &str,
    base: String,
    head: String,
    workdir: &Path,
) -> Result<()> {
    let mode: PrMode = mode.parse()?;
    let repository = RepoRef::parse(repository)?;
    let handoff = Handoff::read(workdir)?;
    let cfg = load_config(config)?;
    let host = GhCli::from_config(&cfg);
    let outcome = manage_pull_request(
        &host,
        &ManageRequest {
            mode,
            repository,
            base,
            head,
            title: handoff.title,
            body: handoff.body,
        },
    )?;
    for failure in &outcome.failures {
        warn!(
            number = failure.number,
            step = failure.step,
            error = %failure.error,
            "PR could not be cleaned up"
        );
    }
    match (&outcome.created, &outcome.plan.skip) {
        (Some(url), _) => println!("{url}"),
        (None, Some(reason)) => println!("skipped: {reason}"),
        (None, None) => println!("closed: {}", outcome.closed.len()),
    }
    Ok(())
}

struct WalkArgs {
    template: String,
    from: Option<String>,
    filter: Option<String>,
    delay: Option<u64>,
    dry: bool,
    parameter_data: String,
    pr_mode: String,
    debug: bool,
}

fn cmd_walk(config: &Path, args: WalkArgs) -> Result<()> {
    let cfg = load_config(config)?;
    let template = templates::require(&args.template)?;
    let pr_mode: PrMode = args.pr_mode.parse()?;
    let delay_secs = args.delay.unwrap_or(cfg.walk.delay_secs);
    if delay_secs == 0 {
        bail!("--delay must be > 0");
    }
    let options = WalkOptions {
        parameter_data: args.parameter_data,
        pr_mode,
        from: args.from,
        filter: args.filter,
        delay: Duration::from_secs(delay_secs),
        dry_delay: Duration::from_secs(cfg.walk.dry_delay_secs),
        budget: cfg.walk.iteration_budget(delay_secs),
        dry: args.dry,
        debug: args.debug,
    };
    let registry = RestClient::from_config(&cfg)?;
    let host = GhCli::from_config(&cfg);
    let mut walker = FleetWalker::new(&host, SleepPacer, template, options);
    let summary = walker.run(&registry).context("fleet walk")?;
    info!(
        triggered = summary.triggered,
        failed = summary.failed.len(),
        filtered = summary.filtered,
        declined = summary.declined,
        unresolved = summary.unresolved,
        restart_from = ?summary.restart_from,
        "fleet walk finished"
    );
    for (counter, value) in &summary.report {
        println!("{counter}: {value}");
    }
    println!("triggered: {}", summary.triggered);
    if !summary.failed.is_empty() {
        println!("failed: {}", summary.failed.join(", "));
    }
    Ok(())
}

fn cmd_list() -> Result<()> {
    for template in templates::all() {
        let description = templates::TemplateDescription::parse(template.description())?;
        println!("{}\t{}", template.name(), description.title);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_apply_template_defaults() {
        let cli = Cli::parse_from(["manage-prs", "apply-template", "acme/ioBroker.foo", "W1035-addTier"]);
        match cli.command {
            Command::ApplyTemplate {
                repository,
                template,
                parameter_data,
                workdir,
            } => {
                assert_eq!(repository, "acme/ioBroker.foo");
                assert_eq!(template, "W1035-addTier");
                assert_eq!(parameter_data, "");
                assert_eq!(workdir, PathBuf::from("."));
            }
            _ => panic!("expected apply-template"),
        }
        assert_eq!(cli.config, PathBuf::from(CONFIG_FILE));
        assert!(!cli.debug);
    }

    #[test]
    fn parse_walk_fleet_accepts_underscore_and_dash_options() {
        for (data, mode) in [("--parameter_data", "--pr_mode"), ("--parameter-data", "--pr-mode")] {
            let cli = Cli::parse_from([
                "manage-prs",
                "walk-fleet",
                "--template",
                "W1035-addTier",
                data,
                "3",
                mode,
                "skip-if-merged",
                "--dry",
                "--debug",
            ]);
            assert!(cli.debug);
            match cli.command {
                Command::WalkFleet {
                    parameter_data,
                    pr_mode,
                    dry,
                    from,
                    ..
                } => {
                    assert_eq!(parameter_data, "3");
                    assert_eq!(pr_mode, "skip-if-merged");
                    assert!(dry);
                    assert!(from.is_none());
                }
                _ => panic!("expected walk-fleet"),
            }
        }
    }

    #[test]
    fn parse_walk_fleet_default_mode_is_recreate() {
        let cli = Cli::parse_from(["manage-prs", "walk-fleet", "--template", "x"]);
        match cli.command {
            Command::WalkFleet { pr_mode, delay, .. } => {
                assert_eq!(pr_mode, "recreate");
                assert!(delay.is_none());
            }
            _ => panic!("expected walk-fleet"),
        }
    }

    #[test]
    fn manage_pr_requires_four_positionals() {
        assert!(Cli::try_parse_from(["manage-prs", "manage-pr", "recreate", "a/b", "main"]).is_err());
    }
}
