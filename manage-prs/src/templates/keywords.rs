//! Normalise the keyword lists of `package.json` and `io-package.json`.

use anyhow::{Result, bail};
use serde_json::{Value, json};
use tracing::info;

use super::{Invocation, Template, Workspace};
use crate::core::patch::{Anchor, ArrayEnd};

const PACKAGE: &str = "package.json";
const IO_PACKAGE: &str = "io-package.json";
const CANONICAL: &str = "ioBroker";
/// Dropped from `common.keywords`, compared case-insensitively.
const FORBIDDEN: [&str; 3] = ["iobroker", "adapter", "smart home"];

#[derive(Debug)]
pub struct FixKeywords;

fn is_miscased(value: &Value) -> bool {
    value
        .as_str()
        .is_some_and(|s| s.eq_ignore_ascii_case(CANONICAL) && s != CANONICAL)
}

fn is_forbidden(value: &Value) -> bool {
    value
        .as_str()
        .is_some_and(|s| FORBIDDEN.iter().any(|f| s.eq_ignore_ascii_case(f)))
}

impl Template for FixKeywords {
    fn name(&self) -> &'static str {
        "W0040-fixKeywords"
    }

    fn description(&self) -> &'static str {
        include_str!("descriptions/W0040-fixKeywords.md")
    }

    fn patch(&self, workspace: &mut Workspace, _invocation: &Invocation) -> Result<()> {
        for file in [PACKAGE, IO_PACKAGE] {
            if !workspace.exists(file) {
                bail!("{file} does not exist");
            }
        }

        let package = workspace.require(PACKAGE)?;
        if package.contains(&["keywords"]) {
            for removed in package.remove_matching(&["keywords"], is_miscased)? {
                info!(keyword = %removed, file = PACKAGE, "removed miscased keyword");
            }
            if package.append_unique(&["keywords"], &json!(CANONICAL), ArrayEnd::Front)? {
                info!(file = PACKAGE, "added ioBroker as first keyword");
            }
        } else {
            package.set(&["keywords"], &json!([CANONICAL]), &Anchor::End)?;
            info!(file = PACKAGE, "created keywords");
        }

        let io_package = workspace.require(IO_PACKAGE)?;
        if !io_package.contains(&["common"]) {
            bail!("{IO_PACKAGE} has no common section");
        }
        if io_package.contains(&["common", "keywords"]) {
            for removed in io_package.remove_matching(&["common", "keywords"], is_forbidden)? {
                info!(keyword = %removed, file = IO_PACKAGE, "removed forbidden keyword");
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::*;
    use crate::templates::run_template;
    use crate::test_support::{invocation, write_files};

    #[test]
    fn fixes_both_files() {
        let temp = tempfile::tempdir().expect("tempdir");
        write_files(
            temp.path(),
            &[
                (
                    PACKAGE,
                    "{\n  \"name\": \"iobroker.foo\",\n  \"keywords\": [\n    \"iobroker\",\n    \"foo\"\n  ]\n}\n",
                ),
                (
                    IO_PACKAGE,
                    "{\n  \"common\": {\n    \"keywords\": [\"Smart Home\", \"foo\", \"adapter\"]\n  }\n}\n",
                ),
            ],
        );
        let run = run_template(&FixKeywords, temp.path(), &invocation("W0040-fixKeywords"))
            .expect("run");
        assert_eq!(run.written.len(), 2);
        assert_eq!(
            fs::read_to_string(temp.path().join(PACKAGE)).expect("read"),
            "{\n  \"name\": \"iobroker.foo\",\n  \"keywords\": [\n    \"ioBroker\",\n    \"foo\"\n  ]\n}\n"
        );
        assert_eq!(
            fs::read_to_string(temp.path().join(IO_PACKAGE)).expect("read"),
            "{\n  \"common\": {\n    \"keywords\": [\"foo\"]\n  }\n}\n"
        );

        let again = run_template(&FixKeywords, temp.path(), &invocation("W0040-fixKeywords"))
            .expect("run");
        assert!(!again.result.changed);
    }

    #[test]
    fn creates_missing_keywords() {
        let temp = tempfile::tempdir().expect("tempdir");
        write_files(
            temp.path(),
            &[
                (PACKAGE, "{\n  \"name\": \"iobroker.foo\"\n}\n"),
                (IO_PACKAGE, "{\n  \"common\": {}\n}\n"),
            ],
        );
        run_template(&FixKeywords, temp.path(), &invocation("W0040-fixKeywords")).expect("run");
        assert_eq!(
            fs::read_to_string(temp.path().join(PACKAGE)).expect("read"),
            "{\n  \"name\": \"iobroker.foo\",\n  \"keywords\": [\n    \"ioBroker\"\n  ]\n}\n"
        );
    }

    #[test]
    fn rejects_non_array_keywords() {
        let temp = tempfile::tempdir().expect("tempdir");
        write_files(
            temp.path(),
            &[
                (PACKAGE, "{\"keywords\": \"ioBroker\"}"),
                (IO_PACKAGE, "{\"common\": {}}"),
            ],
        );
        assert!(run_template(&FixKeywords, temp.path(), &invocation("W0040-fixKeywords")).is_err());
    }
}
