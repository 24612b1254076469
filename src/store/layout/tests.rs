use super::*;
use tempfile::TempDir;

#[test]
fn missing_pointer_means_uninitialized() {
    let temp = TempDir::new().expect("Failed to create temp dir");
    let layout = CollectionLayout::new(temp.path().join("description"));

    assert_eq!(layout.read_current().expect("read should succeed"), None);
}

#[test]
fn commit_replaces_pointer() {
    let temp = TempDir::new().expect("Failed to create temp dir");
    let layout = CollectionLayout::new(temp.path().join("product"));

    layout.commit("first").expect("first commit should succeed");
    assert_eq!(
        layout.read_current().expect("read should succeed").as_deref(),
        Some("first")
    );

    layout.commit("second").expect("second commit should succeed");
    assert_eq!(
        layout.read_current().expect("read should succeed").as_deref(),
        Some("second")
    );

    let leftovers: Vec<_> = fs::read_dir(layout.root())
        .expect("root should be readable")
        .flatten()
        .map(|e| e.file_name())
        .collect();
    assert_eq!(leftovers.len(), 1, "only the pointer should remain: {:?}", leftovers);
}

#[test]
fn empty_pointer_is_corrupt() {
    let temp = TempDir::new().expect("Failed to create temp dir");
    let layout = CollectionLayout::new(temp.path());
    fs::write(layout.pointer_path(), "  \n").expect("pointer should be writable");

    let err = layout.read_current().expect_err("empty pointer should fail");
    assert_eq!(err.kind(), "storage_io");
}

#[test]
fn garbage_collection_keeps_live_generation() {
    let temp = TempDir::new().expect("Failed to create temp dir");
    let layout = CollectionLayout::new(temp.path());
    for generation in ["a", "b", "c"] {
        fs::create_dir_all(layout.generation_dir(generation)).expect("dir should be created");
    }
    fs::create_dir_all(temp.path().join("unrelated")).expect("dir should be created");

    let held = layout.try_lock().expect("lock should open").expect("lock should be free");
    let removed = layout.collect_garbage(&held, "b");

    assert_eq!(removed, 2);
    assert!(layout.generation_dir("b").exists());
    assert!(!layout.generation_dir("a").exists());
    assert!(!layout.generation_dir("c").exists());
    assert!(temp.path().join("unrelated").exists());
}

#[tokio::test]
async fn lock_excludes_other_handles_until_dropped() {
    let temp = TempDir::new().expect("Failed to create temp dir");
    let layout = CollectionLayout::new(temp.path().join("description"));
    let other = CollectionLayout::new(temp.path().join("description"));

    let held = layout.lock().await.expect("lock should be taken");
    assert!(layout.lock_path().exists());
    assert!(
        other.try_lock().expect("try_lock should not fail").is_none(),
        "a held lock should not be granted twice"
    );

    drop(held);
    assert!(
        other.try_lock().expect("try_lock should not fail").is_some(),
        "a released lock should be free"
    );
}

#[test]
fn discard_ignores_missing_generation() {
    let temp = TempDir::new().expect("Failed to create temp dir");
    let layout = CollectionLayout::new(temp.path());
    layout.discard("never-written");

    fs::create_dir_all(layout.generation_dir("orphan")).expect("dir should be created");
    layout.discard("orphan");
    assert!(!layout.generation_dir("orphan").exists());
}
