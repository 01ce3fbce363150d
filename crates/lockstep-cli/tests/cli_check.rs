use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use std::path::PathBuf;
use tempfile::TempDir;

#[allow(deprecated)]
fn lockstep_cmd() -> Command {
    Command::cargo_bin("lockstep").unwrap()
}

fn fixture_project() -> TempDir {
    let fixture = PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("../../tests/fixtures/basic");
    let tmp = TempDir::new().unwrap();
    for file in ["Lockstep.toml", "Lockstep.index.toml"] {
        fs::copy(fixture.join(file), tmp.path().join(file)).unwrap();
    }
    tmp
}

#[test]
fn test_check_without_lockfile() {
    let tmp = fixture_project();

    lockstep_cmd()
        .current_dir(tmp.path())
        .arg("check")
        .assert()
        .failure()
        .stderr(predicate::str::contains("does not exist"));
}

#[test]
fn test_check_after_lock() {
    let tmp = fixture_project();
    lockstep_cmd().current_dir(tmp.path()).arg("lock").assert().success();

    lockstep_cmd()
        .current_dir(tmp.path())
        .arg("check")
        .assert()
        .success()
        .stderr(predicate::str::contains("Checked"));
}

#[test]
fn test_check_detects_removed_dependency() {
    let tmp = fixture_project();
    lockstep_cmd().current_dir(tmp.path()).arg("lock").assert().success();

    let manifest = tmp.path().join("Lockstep.toml");
    let content = fs::read_to_string(&manifest).unwrap();
    fs::write(
        &manifest,
        content.replace("[[dependency]]\nname = \"puma\"\nrequirement = \">= 6.0\"\n", ""),
    )
    .unwrap();

    lockstep_cmd()
        .current_dir(tmp.path())
        .arg("check")
        .assert()
        .failure()
        .stderr(predicate::str::contains("out of date"));
}
