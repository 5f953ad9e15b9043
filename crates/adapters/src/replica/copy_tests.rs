// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use tempfile::tempdir;

fn write(path: &Path, content: &str) {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).unwrap();
    }
    std::fs::write(path, content).unwrap();
}

fn setup_project() -> (tempfile::TempDir, PathBuf, PathBuf) {
    let dir = tempdir().unwrap();
    let project = dir.path().join("project");
    let replicas = dir.path().join("replica");
    write(&project.join("src/main.rs"), "fn main() {}");
    write(&project.join("README.md"), "# hi");
    write(&project.join("node_modules/pkg/index.js"), "x");
    write(&project.join(".git/HEAD"), "ref: main");
    write(&project.join("target/debug/bin"), "elf");
    write(&project.join(".oms/oms.log"), "{}");
    (dir, project, replicas)
}

#[tokio::test]
async fn create_copies_sources_and_skips_excluded() {
    let (_dir, project, replicas) = setup_project();
    let store = CopyReplicaStore::new(project.clone(), replicas);
    let task = TaskId::new("T1");

    let work = store.create(&task).await.unwrap();
    assert!(work.join("src/main.rs").is_file());
    assert!(work.join("README.md").is_file());
    // Excluded prefixes are not copied; node_modules/.git become symlinks
    assert!(!work.join("target").exists());
    assert!(!work.join(".oms").exists());
    assert!(work.join("node_modules").is_symlink());
    assert!(work.join(".git").is_symlink());
    assert_eq!(
        std::fs::read_link(work.join("node_modules")).unwrap(),
        project.join("node_modules")
    );
}

#[tokio::test]
async fn create_is_idempotent() {
    let (_dir, project, replicas) = setup_project();
    let store = CopyReplicaStore::new(project, replicas);
    let task = TaskId::new("T1");

    let first = store.create(&task).await.unwrap();
    write(&first.join("src/new.rs"), "// agent work");
    let second = store.create(&task).await.unwrap();
    assert_eq!(first, second);
    // Existing replica content was not clobbered
    assert!(second.join("src/new.rs").is_file());
}

#[tokio::test]
async fn concurrent_creates_collapse() {
    let (_dir, project, replicas) = setup_project();
    let store = Arc::new(CopyReplicaStore::new(project, replicas));
    let task = TaskId::new("T1");

    let a = {
        let store = Arc::clone(&store);
        let task = task.clone();
        tokio::spawn(async move { store.create(&task).await })
    };
    let b = {
        let store = Arc::clone(&store);
        let task = task.clone();
        tokio::spawn(async move { store.create(&task).await })
    };
    let first = a.await.unwrap().unwrap();
    let second = b.await.unwrap().unwrap();
    assert_eq!(first, second);
}

#[tokio::test]
async fn destroy_removes_and_exists_reflects() {
    let (_dir, project, replicas) = setup_project();
    let store = CopyReplicaStore::new(project, replicas);
    let task = TaskId::new("feat/x");

    store.create(&task).await.unwrap();
    assert!(store.exists(&task));
    assert_eq!(store.list(), vec!["feat-x"]);

    store.destroy(&task).await.unwrap();
    assert!(!store.exists(&task));
    assert!(store.list().is_empty());

    // Destroying twice is fine
    store.destroy(&task).await.unwrap();
}
