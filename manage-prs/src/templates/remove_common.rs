//! Templates that delete obsolete `io-package.json` attributes.

use anyhow::Result;
use tracing::{info, warn};

use super::{Invocation, Template, Workspace};
use crate::core::scan::join_path;

const IO_PACKAGE: &str = "io-package.json";

/// Delete a fixed list of attributes from `io-package.json`.
#[derive(Debug)]
pub struct RemoveMembers {
    name: &'static str,
    description: &'static str,
    paths: &'static [&'static [&'static str]],
    /// Deletion only happens while this attribute exists too.
    requires: Option<&'static [&'static str]>,
}

pub static REMOVE_TITLE: RemoveMembers = RemoveMembers {
    name: "W1084-removeCommonTitle",
    description: include_str!("descriptions/W1084-removeCommonTitle.md"),
    paths: &[&["common", "title"]],
    requires: Some(&["common", "titleLang"]),
};

pub static REMOVE_MAIN: RemoveMembers = RemoveMembers {
    name: "W1084-removeCommonMain",
    description: include_str!("descriptions/W1084-removeCommonMain.md"),
    paths: &[&["common", "main"]],
    requires: None,
};

pub static REMOVE_INSTALLED_FROM: RemoveMembers = RemoveMembers {
    name: "W1084-removeCommonInstalledFrom",
    description: include_str!("descriptions/W1084-removeCommonInstalledFrom.md"),
    paths: &[&["common", "installedFrom"], &["installedFrom"]],
    requires: None,
};

pub static REMOVE_FA_ICON: RemoveMembers = RemoveMembers {
    name: "W1084-removeFa-icon",
    description: include_str!("descriptions/W1084-removeFa-icon.md"),
    paths: &[&["common", "adminTab", "fa-icon"]],
    requires: None,
};

impl Template for RemoveMembers {
    fn name(&self) -> &'static str {
        self.name
    }

    fn description(&self) -> &'static str {
        self.description
    }

    fn patch(&self, workspace: &mut Workspace, _invocation: &Invocation) -> Result<()> {
        let doc = workspace.require(IO_PACKAGE)?;
        let present: Vec<&[&str]> = self
            .paths
            .iter()
            .copied()
            .filter(|path| doc.contains(path))
            .collect();
        if present.is_empty() {
            info!("nothing to remove");
            return Ok(());
        }
        if let Some(required) = self.requires {
            if !doc.contains(required) {
                warn!(
                    required = %join_path(required),
                    "attribute missing, keeping the file unchanged"
                );
                return Ok(());
            }
        }
        for path in present {
            doc.delete(path)?;
            info!(attribute = %join_path(path), "removed");
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
    fn removes_title_only_with_title_lang() {
        let temp = tempfile::tempdir().expect("tempdir");
        let with_lang = "{\n  \"common\": {\n    \"name\": \"foo\",\n    \"title\": \"Foo\",\n    \"titleLang\": {\"en\": \"Foo\"}\n  }\n}\n";
        write_files(temp.path(), &[(IO_PACKAGE, with_lang)]);
        let run = run_template(&REMOVE_TITLE, temp.path(), &invocation(REMOVE_TITLE.name))
            .expect("run");
        assert!(run.result.changed);
        assert_eq!(
            fs::read_to_string(temp.path().join(IO_PACKAGE)).expect("read"),
            "{\n  \"common\": {\n    \"name\": \"foo\",\n    \"titleLang\": {\"en\": \"Foo\"}\n  }\n}\n"
        );

        let without_lang = "{\n  \"common\": {\n    \"title\": \"Foo\"\n  }\n}\n";
        write_files(temp.path(), &[(IO_PACKAGE, without_lang)]);
        let run = run_template(&REMOVE_TITLE, temp.path(), &invocation(REMOVE_TITLE.name))
            .expect("run");
        assert!(!run.result.changed);
    }

    #[test]
    fn removes_both_installed_from_attributes() {
        let temp = tempfile::tempdir().expect("tempdir");
        let text = "{\n\t\"common\": {\n\t\t\"name\": \"foo\",\n\t\t\"installedFrom\": \"x\"\n\t},\n\t\"installedFrom\": \"y\",\n\t\"native\": {}\n}\n";
        write_files(temp.path(), &[(IO_PACKAGE, text)]);
        run_template(
            &REMOVE_INSTALLED_FROM,
            temp.path(),
            &invocation(REMOVE_INSTALLED_FROM.name),
        )
        .expect("run");
        assert_eq!(
            fs::read_to_string(temp.path().join(IO_PACKAGE)).expect("read"),
            "{\n\t\"common\": {\n\t\t\"name\": \"foo\"\n\t},\n\t\"native\": {}\n}\n"
        );
    }

    #[test]
    fn missing_io_package_is_an_error() {
        let temp = tempfile::tempdir().expect("tempdir");
        assert!(run_template(&REMOVE_MAIN, temp.path(), &invocation(REMOVE_MAIN.name)).is_err());
    }
}
