//! Chaos checks; only meaningful with `--features failpoints`.

#![cfg(feature = "failpoints")]

mod test_support;

use test_support::{engine, request, ScriptedAction};

#[tokio::test]
async fn test_panicking_collection_does_not_stop_the_action() {
    std::env::set_var("RUNMESH_FAILPOINTS", "collect");
    let dir = tempfile::tempdir().unwrap();
    let engine = engine(dir.path());
    ScriptedAction::producing(&["s1", "s2"]).register(&engine, "Crawl");

    let ctx = engine
        .execute(request("R1", "crawl", "Crawl", "Foo"))
        .await
        .unwrap();
    std::env::remove_var("RUNMESH_FAILPOINTS");

    let manifest = ctx.manifest();
    assert!(manifest.succeeded);
    // every collection died before recording a verdict
    assert_eq!(manifest.collected, 0);
    let stored = ctx
        .services()
        .executables
        .get(ctx.run_id(), "Foo", "crawl")
        .unwrap();
    assert_eq!(stored.len(), 2);
}
