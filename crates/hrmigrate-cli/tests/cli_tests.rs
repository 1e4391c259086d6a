//! Binary-level tests for argument handling

use assert_cmd::Command;
use predicates::prelude::*;

fn hrmigrate() -> Command {
    Command::cargo_bin("hrmigrate").unwrap()
}

#[test]
fn test_help_lists_subcommands() {
    hrmigrate()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("dispatch"))
        .stdout(predicate::str::contains("backup"))
        .stdout(predicate::str::contains("restore"));
}

#[test]
fn test_no_arguments_prints_help() {
    hrmigrate()
        .assert()
        .failure()
        .stderr(predicate::str::contains("Usage"));
}

#[test]
fn test_dispatch_without_key_is_usage_error() {
    hrmigrate()
        .arg("dispatch")
        .assert()
        .code(2)
        .stderr(predicate::str::contains("--key"));
}

#[test]
fn test_dispatch_rejects_non_numeric_batch_size() {
    hrmigrate()
        .args(["dispatch", "--key", "data/jobs.csv", "--batch-size", "lots"])
        .assert()
        .code(2);
}
