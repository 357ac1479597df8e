//! CLI tests: spawn the binary and check exit codes for the failure paths
//! that need no network access.

use std::process::Command;

use manage_prs::exit_codes;
use manage_prs::io::handoff::{BODY_FILE, TITLE_FILE};
use manage_prs::test_support::write_files;

fn manage_prs() -> Command {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_manage-prs"));
    cmd.env_remove("RUST_LOG");
    cmd
}

#[test]
fn list_templates_prints_every_template() {
    let output = manage_prs().arg("list-templates").output().expect("run");
    assert_eq!(output.status.code(), Some(exit_codes::OK));
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert_eq!(
        stdout.lines().count(),
        manage_prs::templates::all().len()
    );
    assert!(stdout.contains("S0000-blockCommitinfo\tAdd .commitinfo to .gitignore"));
}

#[test]
fn invalid_mode_fails_before_touching_the_network() {
    let temp = tempfile::tempdir().expect("tempdir");
    write_files(temp.path(), &[(TITLE_FILE, "t"), (BODY_FILE, "b")]);
    let output = manage_prs()
        .current_dir(temp.path())
        .args(["manage-pr", "sometimes", "acme/ioBroker.foo", "main", "bot/x"])
        .output()
        .expect("run");
    assert_eq!(output.status.code(), Some(exit_codes::FAILURE));
    assert!(String::from_utf8_lossy(&output.stderr).contains("invalid PR mode"));
}

#[test]
fn missing_handoff_files_fail() {
    let temp = tempfile::tempdir().expect("tempdir");
    let output = manage_prs()
        .current_dir(temp.path())
        .args(["manage-pr", "recreate", "acme/ioBroker.foo", "main", "bot/x"])
        .output()
        .expect("run");
    assert_eq!(output.status.code(), Some(exit_codes::FAILURE));
    assert!(String::from_utf8_lossy(&output.stderr).contains(TITLE_FILE));
}

#[test]
fn unknown_template_fails() {
    let temp = tempfile::tempdir().expect("tempdir");
    let output = manage_prs()
        .current_dir(temp.path())
        .args(["apply-template", "acme/ioBroker.foo", "W9999-nothing"])
        .output()
        .expect("run");
    assert_eq!(output.status.code(), Some(exit_codes::FAILURE));
    assert!(String::from_utf8_lossy(&output.stderr).contains("unknown template `W9999-nothing`"));
}

#[test]
fn invalid_config_fails() {
    let temp = tempfile::tempdir().expect("tempdir");
    write_files(temp.path(), &[("manage-prs.toml", "[walk]\ndelay_secs = 0\n")]);
    let output = manage_prs()
        .current_dir(temp.path())
        .args(["walk-fleet", "--template", "W1035-addTier", "--dry"])
        .output()
        .expect("run");
    assert_eq!(output.status.code(), Some(exit_codes::FAILURE));
}
