use runmesh_core::config::NodeConfig;
use runmesh_store::{build_storage_from_config, path, FsStorage, Storage, StoreError};

#[test]
fn test_file_storage_builder_write_read() {
    let dir = tempfile::tempdir().expect("tempdir");
    let cfg = NodeConfig {
        store_dir: dir.path().to_string_lossy().to_string(),
        ..NodeConfig::default()
    };

    let storage = build_storage_from_config(&cfg.storage_config()).expect("fs storage");
    storage.write("runs/r1/value", b"hello world").expect("write");
    assert_eq!(
        storage.read("runs/r1/value").expect("read"),
        Some(b"hello world".to_vec())
    );
    assert!(dir.path().join("runs/r1/value").exists());
}

#[test]
fn test_file_uri_selects_root() {
    let dir = tempfile::tempdir().expect("tempdir");
    let cfg = NodeConfig {
        store_uri: Some(format!("file://{}", dir.path().display())),
        store_dir: "/nonexistent/unused".into(),
        ..NodeConfig::default()
    };
    let storage = build_storage_from_config(&cfg.storage_config()).expect("fs storage");
    storage.write("k", b"v").expect("write");
    assert!(dir.path().join("k").exists());
}

#[test]
fn test_invalid_scheme_errors() {
    let cfg = NodeConfig {
        store_uri: Some("ftp://example.com/store".into()),
        ..NodeConfig::default()
    };
    let err = build_storage_from_config(&cfg.storage_config())
        .err()
        .expect("should fail");
    assert!(matches!(err, StoreError::Config(_)));
    assert!(err.to_string().contains("unsupported store scheme"));
}

#[test]
fn test_handles_on_one_directory_share_state() {
    let dir = tempfile::tempdir().expect("tempdir");
    let node_a = FsStorage::new(dir.path()).expect("open a");
    let node_b = FsStorage::new(dir.path()).expect("open b");

    node_a.write("exec/r1/Foo/crawl/s1", b"{}").expect("write");
    node_a.write("exec/r1/Foo/crawl/s2", b"{}").expect("write");
    node_a.write("exec/r1/Foo/rank/s1", b"{}").expect("write");

    let mut crawl = node_b.list("exec/r1/Foo/crawl/").expect("list");
    crawl.sort();
    assert_eq!(crawl, vec!["exec/r1/Foo/crawl/s1", "exec/r1/Foo/crawl/s2"]);

    assert_eq!(node_b.delete_prefix("exec/r1/Foo/crawl/").expect("delete"), 2);
    assert!(!node_a.exists("exec/r1/Foo/crawl/s1").expect("exists"));
    assert!(node_a.exists("exec/r1/Foo/rank/s1").expect("exists"));
}

#[test]
fn test_missing_key_reads_none_and_delete_is_idempotent() {
    let dir = tempfile::tempdir().expect("tempdir");
    let storage = FsStorage::new(dir.path()).expect("open");
    assert_eq!(storage.read("nope").expect("read"), None);
    storage.delete("nope").expect("delete missing");
    assert!(storage.list("nothing/").expect("list").is_empty());
}

#[test]
fn test_hostile_segments_stay_inside_their_directory() {
    let dir = tempfile::tempdir().expect("tempdir");
    let storage = FsStorage::new(dir.path().join("store")).expect("open");

    let key = path::key("exec", &["..", "a/b", ""]);
    assert_eq!(key.split('/').count(), 4);
    storage.write(&key, b"x").expect("write");
    assert!(!dir.path().join("exec").exists());
    assert_eq!(storage.list("exec/").expect("list"), vec![key]);
}
