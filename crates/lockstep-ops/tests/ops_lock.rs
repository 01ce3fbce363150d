use std::path::{Path, PathBuf};

use lockstep_core::lockfile::LockState;
use lockstep_ops::ops_check::check;
use lockstep_ops::ops_lock::{lock, LockOptions};
use lockstep_ops::ops_setup::ProjectPaths;
use lockstep_ops::ops_update::{update, UpdateOptions};

fn fixture() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .parent()
        .unwrap()
        .parent()
        .unwrap()
        .join("tests/fixtures/basic")
}

fn project() -> (tempfile::TempDir, ProjectPaths) {
    let dir = tempfile::tempdir().unwrap();
    for file in ["Lockstep.toml", "Lockstep.index.toml"] {
        std::fs::copy(fixture().join(file), dir.path().join(file)).unwrap();
    }
    let paths = ProjectPaths {
        manifest: Some(dir.path().join("Lockstep.toml")),
        index: None,
    };
    (dir, paths)
}

fn read_lock(dir: &Path) -> String {
    std::fs::read_to_string(dir.join("Lockstep.lock")).unwrap()
}

fn locked_version(dir: &Path, name: &str) -> String {
    LockState::from_str(&read_lock(dir))
        .unwrap()
        .locked_version(name)
        .unwrap()
        .to_string()
}

#[test]
fn lock_writes_a_canonical_lockfile() {
    let (dir, paths) = project();
    lock(&paths, &LockOptions::default()).unwrap();

    let text = read_lock(dir.path());
    assert!(text.starts_with("# This file is generated by lockstep"));
    let state = LockState::from_str(&text).unwrap();
    let names: Vec<&str> = state.packages.iter().map(|p| p.name.as_str()).collect();
    assert_eq!(names, ["activesupport", "nio4r", "puma", "rack", "rails"]);
    assert_eq!(locked_version(dir.path(), "rails"), "7.1.0");
    assert_eq!(state.dependencies.len(), 3);
}

#[test]
fn relocking_is_idempotent() {
    let (dir, paths) = project();
    lock(&paths, &LockOptions::default()).unwrap();
    let first = read_lock(dir.path());
    lock(&paths, &LockOptions::default()).unwrap();
    assert_eq!(read_lock(dir.path()), first);
    check(&paths).unwrap();
}

#[test]
fn frozen_drift_leaves_the_lockfile_alone() {
    let (dir, paths) = project();
    lock(&paths, &LockOptions::default()).unwrap();
    let before = read_lock(dir.path());

    let manifest = dir.path().join("Lockstep.toml");
    let mut content = std::fs::read_to_string(&manifest).unwrap();
    content.push_str("\n[[dependency]]\nname = \"rack\"\nrequirement = \"< 3\"\n");
    std::fs::write(&manifest, content).unwrap();

    let err = lock(
        &paths,
        &LockOptions {
            frozen: true,
            preserve_unknown: false,
        },
    )
    .unwrap_err();
    assert!(err.to_string().contains("frozen mode is enabled"));
    assert_eq!(read_lock(dir.path()), before);
    assert!(check(&paths).is_err());

    lock(&paths, &LockOptions::default()).unwrap();
    assert_eq!(locked_version(dir.path(), "rack"), "2.2.4");
    assert_eq!(locked_version(dir.path(), "rails"), "7.0.4");
    check(&paths).unwrap();
}

#[test]
fn unknown_sections_survive_when_preserved() {
    let (dir, paths) = project();
    lock(&paths, &LockOptions::default()).unwrap();
    let lockfile = dir.path().join("Lockstep.lock");
    let mut text = read_lock(dir.path());
    text.push_str("\n[plugins]\nnotes = \"kept\"\n");
    std::fs::write(&lockfile, &text).unwrap();

    let preserving = LockOptions {
        frozen: false,
        preserve_unknown: true,
    };
    lock(&paths, &preserving).unwrap();
    assert!(read_lock(dir.path()).contains("notes = \"kept\""));

    lock(&paths, &LockOptions::default()).unwrap();
    assert!(!read_lock(dir.path()).contains("[plugins]"));
}

#[test]
fn update_moves_only_the_named_package() {
    let (dir, paths) = project();
    let index = dir.path().join("Lockstep.index.toml");
    let full = std::fs::read_to_string(&index).unwrap();
    let trimmed = full.replace("version = \"2.7.0\"", "version = \"2.5.8\"");
    std::fs::write(&index, &trimmed).unwrap();
    lock(&paths, &LockOptions::default()).unwrap();
    assert_eq!(locked_version(dir.path(), "nio4r"), "2.5.9");

    std::fs::write(&index, &full).unwrap();
    lock(&paths, &LockOptions::default()).unwrap();
    assert_eq!(locked_version(dir.path(), "nio4r"), "2.5.9");

    update(
        &paths,
        &UpdateOptions {
            names: vec!["nio4r".to_string()],
            ..UpdateOptions::default()
        },
    )
    .unwrap();
    assert_eq!(locked_version(dir.path(), "nio4r"), "2.7.0");
    assert_eq!(locked_version(dir.path(), "rails"), "7.1.0");
}

#[test]
fn update_rejects_unknown_names() {
    let (_dir, paths) = project();
    lock(&paths, &LockOptions::default()).unwrap();
    let err = update(
        &paths,
        &UpdateOptions {
            names: vec!["ghost".to_string()],
            ..UpdateOptions::default()
        },
    )
    .unwrap_err();
    assert!(err.to_string().contains("ghost"));
}

#[test]
fn check_requires_a_lockfile() {
    let (_dir, paths) = project();
    let err = check(&paths).unwrap_err();
    assert!(err.to_string().contains("does not exist"));
}
