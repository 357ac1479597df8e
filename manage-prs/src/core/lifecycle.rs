//! Pull request lifecycle decisions.
//!
//! Given the PRs that already exist for a repository and the desired
//! [`PrMode`], [`decide`] returns a [`Plan`]: which open PRs to close, with
//! which comment, and whether a new PR should be created. Executing the plan
//! is the caller's job (see `manage`).

use std::fmt;
use std::str::FromStr;

use thiserror::Error;

/// How existing PRs with the same title are treated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PrMode {
    /// Close every open duplicate, then always create.
    ForceCreation,
    /// Close open duplicates and create, unless a human rejected the change.
    Recreate,
    /// Do nothing while a PR with the title is open.
    SkipIfExisting,
    /// Do nothing once a human closed a PR with the title without merging.
    SkipIfClosed,
    /// Do nothing once a PR with the title was merged.
    SkipIfMerged,
    /// Close open PRs with the title and never create.
    Revoke,
}

impl PrMode {
    pub const ALL: [PrMode; 6] = [
        PrMode::ForceCreation,
        PrMode::Recreate,
        PrMode::SkipIfExisting,
        PrMode::SkipIfClosed,
        PrMode::SkipIfMerged,
        PrMode::Revoke,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            PrMode::ForceCreation => "force-creation",
            PrMode::Recreate => "recreate",
            PrMode::SkipIfExisting => "skip-if-existing",
            PrMode::SkipIfClosed => "skip-if-closed",
            PrMode::SkipIfMerged => "skip-if-merged",
            PrMode::Revoke => "revoke",
        }
    }
}

impl fmt::Display for PrMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid PR mode `{0}` (expected one of: force-creation, recreate, skip-if-existing, skip-if-closed, skip-if-merged, revoke)")]
pub struct InvalidMode(pub String);

impl FromStr for PrMode {
    type Err = InvalidMode;

    /// Accepts `skip-if-merged`, `skip if merged` and `skip_if_merged`,
    /// case-insensitively.
    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let normalized: String = raw
            .trim()
            .chars()
            .map(|c| match c {
                ' ' | '_' => '-',
                other => other.to_ascii_lowercase(),
            })
            .collect();
        PrMode::ALL
            .into_iter()
            .find(|mode| mode.as_str() == normalized)
            .ok_or_else(|| InvalidMode(raw.to_string()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrState {
    Open,
    /// Closed without merging.
    Closed,
    Merged,
}

/// A PR as observed on the code host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrRecord {
    pub number: u64,
    pub title: String,
    pub state: PrState,
    /// Login of whoever closed the PR, when known.
    pub closed_by: Option<String>,
}

/// PRs that share the exact title, classified.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Observation {
    /// Open PR numbers, ascending.
    pub open: Vec<u64>,
    /// Merged PR numbers, ascending.
    pub merged: Vec<u64>,
    /// The newest closed-unmerged PR, when someone other than the bot closed it.
    pub rejected: Option<Rejection>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rejection {
    pub number: u64,
    pub closed_by: String,
}

/// Keep records whose title equals `title` exactly and classify them.
///
/// When several closed-unmerged PRs exist, only the highest-numbered one
/// decides whether the change was rejected. A closer that is unknown or
/// equals `bot_login` (case-insensitive) is not a rejection.
pub fn observe(records: &[PrRecord], title: &str, bot_login: &str) -> Observation {
    let matching: Vec<&PrRecord> = records.iter().filter(|r| r.title == title).collect();

    let mut open: Vec<u64> = matching
        .iter()
        .filter(|r| r.state == PrState::Open)
        .map(|r| r.number)
        .collect();
    open.sort_unstable();
    open.dedup();

    let mut merged: Vec<u64> = matching
        .iter()
        .filter(|r| r.state == PrState::Merged)
        .map(|r| r.number)
        .collect();
    merged.sort_unstable();

    let rejected = matching
        .iter()
        .filter(|r| r.state == PrState::Closed)
        .max_by_key(|r| r.number)
        .and_then(|r| {
            r.closed_by
                .as_deref()
                .filter(|login| !login.eq_ignore_ascii_case(bot_login))
                .map(|login| Rejection {
                    number: r.number,
                    closed_by: login.to_string(),
                })
        });

    Observation {
        open,
        merged,
        rejected,
    }
}

/// Comment posted before closing a PR.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseReason {
    Superseded,
    Revoked,
}

impl CloseReason {
    pub fn comment(self) -> &'static str {
        match self {
            CloseReason::Superseded => {
                "This PR is being closed because a new PR will be created with updated changes."
            }
            CloseReason::Revoked => {
                "This PR is being closed because the proposed change has been revoked and is no longer needed."
            }
        }
    }
}

/// Why no PR is created.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    OpenExists { numbers: Vec<u64> },
    ClosedByOther(Rejection),
    AlreadyMerged { number: u64 },
    Revoked,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::OpenExists { numbers } => {
                let list: Vec<String> = numbers.iter().map(|n| format!("#{n}")).collect();
                write!(f, "open PR(s) {} already exist", list.join(", "))
            }
            SkipReason::ClosedByOther(r) => write!(
                f,
                "PR #{} was closed by {} without merging",
                r.number, r.closed_by
            ),
            SkipReason::AlreadyMerged { number } => write!(f, "PR #{number} was already merged"),
            SkipReason::Revoked => f.write_str("revoke mode never creates PRs"),
        }
    }
}

/// What to do for one repository.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Plan {
    /// PR numbers to comment on and close, in order.
    pub close: Vec<u64>,
    pub close_reason: CloseReason,
    pub create: bool,
    pub skip: Option<SkipReason>,
}

impl Plan {
    fn create_after_closing(open: &[u64]) -> Self {
        Self {
            close: open.to_vec(),
            close_reason: CloseReason::Superseded,
            create: true,
            skip: None,
        }
    }

    fn skip(reason: SkipReason) -> Self {
        Self {
            close: Vec::new(),
            close_reason: CloseReason::Superseded,
            create: false,
            skip: Some(reason),
        }
    }
}

/// Decide the plan for `mode`.
///
/// Every plan that creates a PR first closes the currently open PRs with the
/// same title, so at most one open PR with the title remains afterwards.
pub fn decide(mode: PrMode, observed: &Observation) -> Plan {
    let open = &observed.open;
    match mode {
        PrMode::ForceCreation => Plan::create_after_closing(open),
        PrMode::Recreate => match &observed.rejected {
            Some(rejection) if open.is_empty() => {
                Plan::skip(SkipReason::ClosedByOther(rejection.clone()))
            }
            _ => Plan::create_after_closing(open),
        },
        PrMode::SkipIfExisting => {
            if open.is_empty() {
                Plan::create_after_closing(open)
            } else {
                Plan::skip(SkipReason::OpenExists {
                    numbers: open.clone(),
                })
            }
        }
        PrMode::SkipIfClosed => match &observed.rejected {
            Some(rejection) => Plan::skip(SkipReason::ClosedByOther(rejection.clone())),
            None => Plan::create_after_closing(open),
        },
        PrMode::SkipIfMerged => match observed.merged.last() {
            Some(&number) => Plan::skip(SkipReason::AlreadyMerged { number }),
            None => Plan::create_after_closing(open),
        },
        PrMode::Revoke => Plan {
            close: open.clone(),
            close_reason: CloseReason::Revoked,
            create: false,
            skip: Some(SkipReason::Revoked),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const BOT: &str = "iobroker-bot";
    const TITLE: &str = "[iobroker-bot] Add tier";

    fn pr(number: u64, state: PrState, closed_by: Option<&str>) -> PrRecord {
        PrRecord {
            number,
            title: TITLE.to_string(),
            state,
            closed_by: closed_by.map(str::to_string),
        }
    }

    #[test]
    fn parses_both_mode_spellings() {
        assert_eq!("force creation".parse::<PrMode>(), Ok(PrMode::ForceCreation));
        assert_eq!("skip-if-merged".parse::<PrMode>(), Ok(PrMode::SkipIfMerged));
        assert_eq!("Skip If Closed".parse::<PrMode>(), Ok(PrMode::SkipIfClosed));
        assert!("sometimes".parse::<PrMode>().is_err());
    }

    #[test]
    fn observe_ignores_similar_titles() {
        let mut other = pr(9, PrState::Open, None);
        other.title = format!("{TITLE} (v2)");
        let observed = observe(&[other, pr(3, PrState::Open, None)], TITLE, BOT);
        assert_eq!(observed.open, vec![3]);
    }

    #[test]
    fn newest_closed_pr_decides_rejection() {
        let records = [
            pr(4, PrState::Closed, Some("human")),
            pr(8, PrState::Closed, Some(BOT)),
        ];
        assert_eq!(observe(&records, TITLE, BOT).rejected, None);

        let records = [
            pr(4, PrState::Closed, Some(BOT)),
            pr(8, PrState::Closed, Some("human")),
        ];
        let rejected = observe(&records, TITLE, BOT).rejected.expect("rejected");
        assert_eq!(rejected.number, 8);
    }

    #[test]
    fn unknown_closer_is_not_a_rejection() {
        let observed = observe(&[pr(2, PrState::Closed, None)], TITLE, BOT);
        assert_eq!(observed.rejected, None);
    }

    #[test]
    fn force_creation_closes_all_open_then_creates() {
        let observed = observe(
            &[pr(5, PrState::Open, None), pr(2, PrState::Open, None)],
            TITLE,
            BOT,
        );
        let plan = decide(PrMode::ForceCreation, &observed);
        assert_eq!(plan.close, vec![2, 5]);
        assert!(plan.create);
        assert_eq!(plan.close_reason, CloseReason::Superseded);
    }

    #[test]
    fn force_creation_ignores_rejection() {
        let observed = observe(&[pr(2, PrState::Closed, Some("human"))], TITLE, BOT);
        assert!(decide(PrMode::ForceCreation, &observed).create);
    }

    #[test]
    fn recreate_skips_human_closed() {
        let observed = observe(&[pr(2, PrState::Closed, Some("human"))], TITLE, BOT);
        let plan = decide(PrMode::Recreate, &observed);
        assert!(!plan.create);
        assert!(plan.close.is_empty());
        assert!(matches!(plan.skip, Some(SkipReason::ClosedByOther(_))));
    }

    #[test]
    fn recreate_with_open_pr_closes_and_creates() {
        let observed = observe(
            &[
                pr(2, PrState::Closed, Some("human")),
                pr(3, PrState::Open, None),
            ],
            TITLE,
            BOT,
        );
        let plan = decide(PrMode::Recreate, &observed);
        assert_eq!(plan.close, vec![3]);
        assert!(plan.create);
    }

    #[test]
    fn recreate_after_bot_close_creates() {
        let observed = observe(&[pr(2, PrState::Closed, Some(BOT))], TITLE, BOT);
        assert!(decide(PrMode::Recreate, &observed).create);
    }

    #[test]
    fn skip_if_existing() {
        let observed = observe(&[pr(3, PrState::Open, None)], TITLE, BOT);
        let plan = decide(PrMode::SkipIfExisting, &observed);
        assert!(!plan.create);
        assert!(plan.close.is_empty());

        let observed = observe(&[pr(2, PrState::Closed, Some("human"))], TITLE, BOT);
        assert!(decide(PrMode::SkipIfExisting, &observed).create);
    }

    #[test]
    fn skip_if_closed_replaces_open_pr_when_not_rejected() {
        let observed = observe(&[pr(3, PrState::Open, None)], TITLE, BOT);
        let plan = decide(PrMode::SkipIfClosed, &observed);
        assert_eq!(plan.close, vec![3]);
        assert!(plan.create);
    }

    #[test]
    fn skip_if_merged() {
        let observed = observe(
            &[pr(3, PrState::Merged, None), pr(4, PrState::Open, None)],
            TITLE,
            BOT,
        );
        let plan = decide(PrMode::SkipIfMerged, &observed);
        assert_eq!(plan.skip, Some(SkipReason::AlreadyMerged { number: 3 }));
        assert!(plan.close.is_empty());

        let observed = observe(&[pr(2, PrState::Closed, Some("human"))], TITLE, BOT);
        assert!(decide(PrMode::SkipIfMerged, &observed).create);
    }

    #[test]
    fn revoke_closes_without_creating() {
        let observed = observe(&[pr(3, PrState::Open, None)], TITLE, BOT);
        let plan = decide(PrMode::Revoke, &observed);
        assert_eq!(plan.close, vec![3]);
        assert_eq!(plan.close_reason, CloseReason::Revoked);
        assert!(!plan.create);

        let plan = decide(PrMode::Revoke, &Observation::default());
        assert!(plan.close.is_empty());
        assert!(!plan.create);
    }

    #[test]
    fn creating_plans_leave_at_most_one_open() {
        let observed = observe(
            &[pr(1, PrState::Open, None), pr(2, PrState::Open, None)],
            TITLE,
            BOT,
        );
        for mode in PrMode::ALL {
            let plan = decide(mode, &observed);
            let remaining = observed.open.len() - plan.close.len() + usize::from(plan.create);
            assert!(remaining <= 1 || !plan.create, "{mode}");
            if plan.create {
                assert_eq!(plan.close, observed.open, "{mode}");
            }
        }
    }
}
