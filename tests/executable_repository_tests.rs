//! Executable repository behavior against a filesystem store shared by
//! several handles, the way nodes of one cluster share it.

use std::sync::Arc;

use runmesh_core::id::RunId;
use runmesh_core::model::{System, SystemStatus, Systems};
use runmesh_repo::{ExecutableRepository, RepoError};
use runmesh_store::FsStorage;

fn node(dir: &std::path::Path) -> ExecutableRepository {
    ExecutableRepository::new(Arc::new(FsStorage::new(dir).expect("open store")))
}

fn systems(abstraction: &str, ids: &[&str]) -> Systems {
    Systems::new(abstraction).with_systems(ids.iter().map(|id| System::new(*id, "idx")).collect())
}

fn sorted_ids(s: &Systems) -> Vec<String> {
    let mut ids: Vec<String> = s.ids().into_iter().map(String::from).collect();
    ids.sort();
    ids
}

#[test]
fn test_put_on_one_node_is_visible_on_another() {
    let dir = tempfile::tempdir().unwrap();
    let (writer, reader) = (node(dir.path()), node(dir.path()));
    let run = RunId::new("R1");

    let mut written = systems("Foo", &["s1", "s2", "s3"]);
    written.action_instance_id = Some("crawl_1".into());
    writer.put(&run, "crawl", &written, false).unwrap();

    let got = reader.get(&run, "Foo", "crawl").unwrap();
    assert_eq!(sorted_ids(&got), vec!["s1", "s2", "s3"]);
    assert_eq!(got.action_instance_id.as_deref(), Some("crawl_1"));
    assert!(reader.get(&run, "Bar", "crawl").unwrap().is_empty());
    assert!(reader.get(&RunId::new("R2"), "Foo", "crawl").unwrap().is_empty());
}

#[test]
fn test_replacing_with_subset_removes_the_rest() {
    let dir = tempfile::tempdir().unwrap();
    let repo = node(dir.path());
    let run = RunId::new("R1");

    repo.put(&run, "crawl", &systems("Foo", &["s1", "s2", "s3"]), false).unwrap();
    repo.put(&run, "crawl", &systems("Foo", &["s2"]), true).unwrap();
    assert_eq!(sorted_ids(&repo.get(&run, "Foo", "crawl").unwrap()), vec!["s2"]);

    // other abstractions of the same action are untouched
    repo.put(&run, "crawl", &systems("Bar", &["b1"]), false).unwrap();
    repo.put(&run, "crawl", &systems("Foo", &[]), true).unwrap();
    assert!(repo.get(&run, "Foo", "crawl").unwrap().is_empty());
    assert_eq!(sorted_ids(&repo.get(&run, "Bar", "crawl").unwrap()), vec!["b1"]);
}

#[test]
fn test_merge_upserts_by_id() {
    let dir = tempfile::tempdir().unwrap();
    let repo = node(dir.path());
    let run = RunId::new("R1");

    repo.put(&run, "rank", &systems("Foo", &["s1", "s2"]), false).unwrap();
    let mut update = systems("Foo", &["s2", "s4"]);
    update.systems[0].status = SystemStatus::Failed;
    repo.put(&run, "rank", &update, false).unwrap();

    let got = repo.get(&run, "Foo", "rank").unwrap();
    assert_eq!(sorted_ids(&got), vec!["s1", "s2", "s4"]);
    assert_eq!(got.get("s2").unwrap().status, SystemStatus::Failed);
    assert_eq!(got.get("s1").unwrap().status, SystemStatus::Pending);
}

#[test]
fn test_actions_do_not_overwrite_each_other() {
    let dir = tempfile::tempdir().unwrap();
    let repo = node(dir.path());
    let run = RunId::new("R1");

    repo.put(&run, "crawl", &systems("Foo", &["s1", "s2"]), false).unwrap();
    repo.put(&run, "rank", &systems("Foo", &["s1"]), true).unwrap();

    assert_eq!(sorted_ids(&repo.get(&run, "Foo", "crawl").unwrap()), vec!["s1", "s2"]);
    assert_eq!(sorted_ids(&repo.get(&run, "Foo", "rank").unwrap()), vec!["s1"]);
}

#[test]
fn test_get_all_and_lookup_by_id() {
    let dir = tempfile::tempdir().unwrap();
    let repo = node(dir.path());
    let run = RunId::new("R1");

    repo.put(&run, "crawl", &systems("Foo", &["s1"]), false).unwrap();
    repo.put(&run, "crawl", &systems("Bar", &["b1", "b2"]), false).unwrap();

    let all = repo.get_all(&run, "crawl").unwrap();
    let mut abstractions = all.abstractions();
    abstractions.sort();
    assert_eq!(abstractions, vec!["Bar", "Foo"]);
    assert_eq!(all.get("Bar").map(|s| s.len()), Some(2));

    assert_eq!(repo.get_by_action_and_id(&run, "crawl", "b2").unwrap().id, "b2");
    assert!(matches!(
        repo.get_by_action_and_id(&run, "crawl", "zz"),
        Err(RepoError::NotFound(_))
    ));

    assert_eq!(repo.remove_action(&run, "crawl").unwrap(), 3);
    assert!(repo.get_all(&run, "crawl").unwrap().is_empty());
}
