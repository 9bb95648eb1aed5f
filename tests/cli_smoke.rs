//! Behavioural smoke tests for the CLI entrypoint.

use assert_cmd::cargo::cargo_bin_cmd;
use predicates::prelude::*;
use tempfile::TempDir;

#[test]
fn help_lists_subcommands() {
    let mut cmd = cargo_bin_cmd!("boxlift");
    cmd.arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("up").and(predicate::str::contains("destroy")));
}

#[test]
fn destroy_without_token_names_the_env_var() {
    let home = TempDir::new().unwrap_or_else(|err| panic!("tempdir: {err}"));
    let mut cmd = cargo_bin_cmd!("boxlift");
    cmd.env_clear()
        .env("HOME", home.path())
        .env("XDG_CONFIG_HOME", home.path())
        .current_dir(home.path())
        .args(["destroy", "srv-lv426"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("BRIGHTBOX_ACCESS_TOKEN"));
}
