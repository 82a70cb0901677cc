//! End-to-end CLI tests against the built binary.

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

fn cie() -> Command {
    Command::cargo_bin("cie").unwrap()
}

/// A repo plus an isolated HOME so `~/.cie` never touches the real one.
struct Sandbox {
    repo: TempDir,
    home: TempDir,
}

impl Sandbox {
    fn new() -> Self {
        Self {
            repo: TempDir::new().unwrap(),
            home: TempDir::new().unwrap(),
        }
    }

    fn cmd(&self) -> Command {
        let mut cmd = cie();
        cmd.current_dir(self.repo.path())
            .env("HOME", self.home.path());
        cmd
    }
}

#[test]
fn test_help_lists_commands() {
    cie()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("index"))
        .stdout(predicate::str::contains("query"))
        .stdout(predicate::str::contains("status"))
        .stdout(predicate::str::contains("reset"));
}

#[test]
fn test_version() {
    cie()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("cie"));
}

#[test]
fn test_missing_project_exits_not_found() {
    let sandbox = Sandbox::new();
    sandbox
        .cmd()
        .arg("status")
        .assert()
        .failure()
        .code(6)
        .stderr(predicate::str::contains("no CIE project found"))
        .stderr(predicate::str::contains("cie init"));
}

#[test]
fn test_init_then_index_then_status() {
    let sandbox = Sandbox::new();
    std::fs::write(
        sandbox.repo.path().join("lib.rs"),
        "fn alpha() { beta(); }\nfn beta() {}\n",
    )
    .unwrap();

    sandbox
        .cmd()
        .args(["init", "--project-id", "cli-test"])
        .assert()
        .success()
        .stdout(predicate::str::contains("project_id: cli-test"));

    // Double init refuses with the input exit code
    sandbox.cmd().arg("init").assert().failure().code(4);

    sandbox
        .cmd()
        .arg("index")
        .assert()
        .success()
        .stdout(predicate::str::contains("2 functions"));

    sandbox
        .cmd()
        .arg("status")
        .assert()
        .success()
        .stdout(predicate::str::contains("project: cli-test"))
        .stdout(predicate::str::contains("function: 2"));
}

#[test]
fn test_reset_requires_confirmation() {
    let sandbox = Sandbox::new();
    sandbox
        .cmd()
        .args(["init", "--project-id", "reset-test"])
        .assert()
        .success();

    sandbox.cmd().arg("reset").assert().failure().code(4);
    sandbox
        .cmd()
        .args(["reset", "--yes"])
        .assert()
        .success()
        .stdout(predicate::str::contains("reset complete"));
}
