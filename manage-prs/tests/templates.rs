//! Every registered template is idempotent: a second run over its own
//! output reports no change and leaves every byte on disk as it was.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use manage_prs::templates::{self, run_template};
use manage_prs::test_support::{invocation, write_files};

const IO_PACKAGE: &str = r#"{
  "common": {
    "name": "foo",
    "title": "Foo",
    "titleLang": {
      "en": "Foo"
    },
    "main": "main.js",
    "installedFrom": "iobroker.foo@1.0.0",
    "type": "lighting",
    "loglevel": "info",
    "license": "MIT",
    "keywords": ["lights", "adapter", "ioBroker"],
    "adminTab": {
      "name": "Foo",
      "fa-icon": "info"
    }
  },
  "installedFrom": "iobroker.foo@1.0.0",
  "native": {}
}
"#;

const PACKAGE: &str = r#"{
  "name": "iobroker.foo",
  "license": "MIT",
  "keywords": [
    "iobroker",
    "lights"
  ]
}
"#;

const README: &str = "# ioBroker.foo\n\n## Changelog\n\n### 1.0.0\n* release\n\n## License\nMIT License\n\nCopyright (c) 2021 Jane Doe <jane@example.com>\n";

const LICENSE: &str = "MIT License\n\nCopyright (c) 2019-2022 Jane Doe <jane@example.com>\n";

const GITIGNORE: &str = "node_modules\n.idea\n";

const WORKFLOW: &str = "\
name: Test and Release
on:
  push:
jobs:
  deploy:
    needs: [adapter-tests]
    runs-on: ubuntu-latest
    steps:
      - uses: ioBroker/testing-action-deploy@v1
        with:
          node-version: '20.x'
          npm-token: ${{ secrets.NPM_TOKEN }}
          github-token: ${{ secrets.GITHUB_TOKEN }}
";

fn checkout(dir: &Path) {
    write_files(
        dir,
        &[
            ("io-package.json", IO_PACKAGE),
            ("package.json", PACKAGE),
            ("README.md", README),
            ("LICENSE", LICENSE),
            (".gitignore", GITIGNORE),
            (".github/workflows/test-and-release.yml", WORKFLOW),
        ],
    );
}

fn snapshot(dir: &Path) -> BTreeMap<String, String> {
    let mut files = BTreeMap::new();
    for rel in [
        "io-package.json",
        "package.json",
        "README.md",
        "LICENSE",
        ".gitignore",
        ".github/workflows/test-and-release.yml",
    ] {
        files.insert(
            rel.to_string(),
            fs::read_to_string(dir.join(rel)).expect("read"),
        );
    }
    files
}

#[test]
fn every_template_changes_then_settles() {
    for template in templates::all() {
        let temp = tempfile::tempdir().expect("tempdir");
        checkout(temp.path());
        let inv = invocation(template.name());

        let first = run_template(*template, temp.path(), &inv)
            .unwrap_or_else(|err| panic!("{}: {err:#}", template.name()));
        assert!(first.result.changed, "{} changed nothing", template.name());
        assert_eq!(first.result.exit_code, 0);

        let settled = snapshot(temp.path());
        let second = run_template(*template, temp.path(), &inv)
            .unwrap_or_else(|err| panic!("{}: {err:#}", template.name()));
        assert!(!second.result.changed, "{} is not idempotent", template.name());
        assert!(second.written.is_empty());
        assert_eq!(snapshot(temp.path()), settled, "{}", template.name());
    }
}

#[test]
fn templates_leave_unrelated_formatting_alone() {
    let temp = tempfile::tempdir().expect("tempdir");
    checkout(temp.path());
    let template = templates::require("W1084-removeCommonMain").expect("template");
    run_template(template, temp.path(), &invocation(template.name())).expect("run");

    let text = fs::read_to_string(temp.path().join("io-package.json")).expect("read");
    assert_eq!(text, IO_PACKAGE.replace("    \"main\": \"main.js\",\n", ""));
}

#[test]
fn license_information_replaces_common_license() {
    let temp = tempfile::tempdir().expect("tempdir");
    checkout(temp.path());
    let template = templates::require("W1081-addLicenseInformation").expect("template");
    run_template(template, temp.path(), &invocation(template.name())).expect("run");

    let text = fs::read_to_string(temp.path().join("io-package.json")).expect("read");
    let value: serde_json::Value = serde_json::from_str(&text).expect("json");
    assert!(value["common"].get("license").is_none());
    assert_eq!(
        value["common"]["licenseInformation"],
        serde_json::json!({"type": "free", "license": "MIT"})
    );
}
