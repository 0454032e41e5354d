//! Report repository behavior over a filesystem store shared by two handles.

use std::sync::Arc;

use runmesh_core::id::RunId;
use runmesh_core::keys::{ReportKey, ABSTRACTION, PERMID, SYSTEM};
use runmesh_core::model::Report;
use runmesh_core::schema::{DataType, Field, ReportSchema};
use runmesh_core::types::Scalar;
use runmesh_query::{parse_predicate, OrderBy};
use runmesh_repo::{RepoError, ReportRepository};
use runmesh_store::writers::ExportFormat;
use runmesh_store::{FsStorage, MemoryStorage, Storage};

fn node(dir: &std::path::Path) -> ReportRepository {
    ReportRepository::new(Arc::new(FsStorage::new(dir).expect("open store")))
}

fn metrics() -> ReportSchema {
    ReportSchema::new(
        "Metrics",
        vec![
            Field::new("score", DataType::Float64, false),
            Field::new("note", DataType::Utf8, true),
        ],
    )
}

fn key(action: &str, system: &str) -> ReportKey {
    ReportKey::new(action, "idx", "Foo", system)
}

fn score(v: f64) -> Report {
    Report::new().with("score", Scalar::F64(v))
}

#[test]
fn test_first_and_last_across_nodes() {
    let dir = tempfile::tempdir().unwrap();
    let (writer, reader) = (node(dir.path()), node(dir.path()));
    let run = RunId::new("R1");
    assert!(writer.register_kind(&run, metrics()).unwrap());
    // the other node sees the declaration and does not redeclare
    assert!(!reader.register_kind(&run, metrics()).unwrap());

    // versions written by different actions still share the subtree
    let t1 = writer.put(&run, &key("crawl", "s1"), "Metrics", &score(1.0)).unwrap();
    let t2 = writer.put(&run, &key("rank", "s1"), "Metrics", &score(2.0)).unwrap();
    let t3 = writer.put(&run, &key("rank", "s1"), "Metrics", &score(3.0)).unwrap();
    assert!(t1 <= t2 && t2 <= t3);

    let first = reader.get_first(&run, &key("any", "s1"), "Metrics").unwrap().unwrap();
    assert_eq!(first.last_modified, t1);
    assert_eq!(first.report.get("score"), Some(&Scalar::F64(1.0)));
    assert_eq!(first.key.action, "crawl");

    let last = reader.get_last(&run, &key("any", "s1"), "Metrics").unwrap().unwrap();
    assert_eq!(last.last_modified, t3);
    assert_eq!(last.report.get("score"), Some(&Scalar::F64(3.0)));
    assert_eq!(last.report.get("note"), Some(&Scalar::Null));

    assert!(reader.get_first(&run, &key("any", "s9"), "Metrics").unwrap().is_none());
    assert!(matches!(
        reader.get_last(&run, &key("any", "s1"), "Missing"),
        Err(RepoError::ReportKindNotFound { .. })
    ));
}

#[test]
fn test_two_handles_writing_one_key_keep_both_versions() {
    let store: Arc<dyn Storage> = Arc::new(MemoryStorage::new());
    let (a, b) = (
        ReportRepository::new(Arc::clone(&store)),
        ReportRepository::new(Arc::clone(&store)),
    );
    let run = RunId::new("R1");
    a.register_kind(&run, metrics()).unwrap();

    for i in 0..200 {
        let k = key("rank", &format!("s{i}"));
        a.put(&run, &k, "Metrics", &score(1.0)).unwrap();
        b.put(&run, &k, "Metrics", &score(2.0)).unwrap();

        let first = b.get_first(&run, &k, "Metrics").unwrap().unwrap();
        let last = a.get_last(&run, &k, "Metrics").unwrap().unwrap();
        assert_ne!(first.version, last.version);
        assert_eq!(first.report.get("score"), Some(&Scalar::F64(1.0)));
        assert_eq!(last.report.get("score"), Some(&Scalar::F64(2.0)));
        assert_eq!(a.get(&run, &k, "Metrics").unwrap().unwrap().version, last.version);
    }
    assert_eq!(a.remove(&run, &key("rank", "s7"), "Metrics").unwrap(), 2);
}

#[test]
fn test_write_burst_on_one_handle_does_not_reorder_another() {
    let store: Arc<dyn Storage> = Arc::new(MemoryStorage::new());
    let (a, b) = (
        ReportRepository::new(Arc::clone(&store)),
        ReportRepository::new(Arc::clone(&store)),
    );
    let run = RunId::new("R1");
    a.register_kind(&run, metrics()).unwrap();

    for i in 0..5000 {
        a.put(&run, &key("crawl", &format!("bulk{i}")), "Metrics", &score(0.0)).unwrap();
    }
    let k = key("rank", "s1");
    let first_stamp = a.put(&run, &k, "Metrics", &score(1.0)).unwrap();
    let second_stamp = b.put(&run, &k, "Metrics", &score(2.0)).unwrap();
    assert!(first_stamp <= second_stamp);

    let last = a.get_last(&run, &k, "Metrics").unwrap().unwrap();
    assert_eq!(last.report.get("score"), Some(&Scalar::F64(2.0)));
    assert_eq!(last.last_modified, second_stamp);
    let table = b.to_table_for_action(&run, "Metrics", "rank").unwrap();
    assert_eq!(table.value(0, "score"), Some(&Scalar::F64(2.0)));
}

#[test]
fn test_permutations_are_separate_subtrees() {
    let dir = tempfile::tempdir().unwrap();
    let repo = node(dir.path());
    let run = RunId::new("R1");
    repo.register_kind(&run, metrics()).unwrap();

    repo.put(&run, &key("rank", "s1").with_perm_id(0), "Metrics", &score(0.5)).unwrap();
    repo.put(&run, &key("rank", "s1").with_perm_id(1), "Metrics", &score(0.7)).unwrap();
    repo.put(&run, &key("rank", "s1"), "Metrics", &score(0.9)).unwrap();

    let p1 = repo
        .get_last(&run, &key("rank", "s1").with_perm_id(1), "Metrics")
        .unwrap()
        .unwrap();
    assert_eq!(p1.report.get("score"), Some(&Scalar::F64(0.7)));
    assert_eq!(
        repo.permutation_ids(&run, &key("rank", "s1"), "Metrics").unwrap(),
        vec![-1, 0, 1]
    );
}

#[test]
fn test_joined_table_fills_nulls() {
    let dir = tempfile::tempdir().unwrap();
    let repo = node(dir.path());
    let run = RunId::new("R1");
    repo.register_kind(
        &run,
        ReportSchema::new("A", vec![Field::new("x", DataType::Int64, true)]),
    )
    .unwrap();
    repo.register_kind(
        &run,
        ReportSchema::new("B", vec![Field::new("y", DataType::Utf8, true)]),
    )
    .unwrap();

    for (i, s) in ["s1", "s2", "s3"].iter().enumerate() {
        repo.put(&run, &key("crawl", s), "A", &Report::new().with("x", Scalar::I64(i as i64)))
            .unwrap();
    }
    for s in ["s1", "s3"] {
        repo.put(&run, &key("rank", s), "B", &Report::new().with("y", Scalar::Str(format!("y-{s}"))))
            .unwrap();
    }

    let joined = repo.to_joined_table(&run).unwrap();
    assert_eq!(joined.num_rows(), 3);
    assert_eq!(
        joined.column_names(),
        vec![ABSTRACTION, SYSTEM, PERMID, "A.x", "B.y"]
    );
    let s2 = (0..joined.num_rows())
        .find(|&i| joined.value(i, SYSTEM) == Some(&Scalar::Str("s2".into())))
        .expect("s2 row");
    assert_eq!(joined.value(s2, "A.x"), Some(&Scalar::I64(1)));
    assert_eq!(joined.value(s2, "B.y"), Some(&Scalar::Null));
}

#[test]
fn test_find_and_select_read_latest_versions() {
    let dir = tempfile::tempdir().unwrap();
    let repo = node(dir.path());
    let run = RunId::new("R1");
    repo.register_kind(&run, metrics()).unwrap();

    repo.put(&run, &key("rank", "s1"), "Metrics", &score(0.9)).unwrap();
    repo.put(&run, &key("rank", "s1"), "Metrics", &score(0.1)).unwrap();
    repo.put(&run, &key("rank", "s2"), "Metrics", &score(0.6)).unwrap();
    repo.put(&run, &key("rank", "s3"), "Metrics", &score(0.8)).unwrap();

    let found = repo
        .find(
            &run,
            "Metrics",
            &parse_predicate("score > 0.5").unwrap(),
            &[OrderBy::desc("score")],
            None,
        )
        .unwrap();
    let systems: Vec<_> = (0..found.num_rows())
        .map(|i| found.value(i, SYSTEM).cloned())
        .collect();
    assert_eq!(
        systems,
        vec![Some(Scalar::Str("s3".into())), Some(Scalar::Str("s2".into()))]
    );

    let top = repo
        .select(&run, "SELECT SYSTEM, score FROM Metrics ORDER BY score DESC LIMIT 1")
        .unwrap();
    assert_eq!(top.num_rows(), 1);
    assert_eq!(top.value(0, "score"), Some(&Scalar::F64(0.8)));

    assert!(matches!(
        repo.select(&run, "SELECT FROM"),
        Err(RepoError::Query(_))
    ));
}

#[test]
fn test_export_action_writes_one_file_per_kind() {
    let dir = tempfile::tempdir().unwrap();
    let out = tempfile::tempdir().unwrap();
    let repo = node(dir.path());
    let run = RunId::new("R1");
    repo.register_kind(&run, metrics()).unwrap();
    repo.put(&run, &key("rank", "s1"), "Metrics", &score(0.4)).unwrap();
    repo.put(&run, &key("crawl", "s2"), "Metrics", &score(0.2)).unwrap();

    let files = repo
        .export_action(&run, "rank", out.path(), ExportFormat::Csv)
        .unwrap();
    assert_eq!(files, vec![out.path().join("Metrics_rank.csv")]);

    let text = std::fs::read_to_string(&files[0]).unwrap();
    let mut lines = text.lines();
    assert!(lines.next().unwrap().starts_with("ACTION,ABSTRACTION,SYSTEM"));
    assert_eq!(lines.count(), 1);
}
