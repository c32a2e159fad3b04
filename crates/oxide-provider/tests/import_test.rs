mod common;
use common::TestRack;

#[tokio::test]
async fn test_import_composite_key() {
    let rack = TestRack::new();
    let driver = rack.driver("oxide_subnet_pool_silo_link").await;

    let outcome = driver.import("P/S").await;
    assert!(outcome.diagnostics.is_empty());
    let state = outcome.state.unwrap();
    assert_eq!(state["id"], "P/S");
    assert_eq!(state["subnet_pool_id"], "P");
    assert_eq!(state["silo_id"], "S");
    assert!(state["is_default"].is_null());

    let outcome = driver.import("P").await;
    assert!(outcome.state.is_none());
    let diag = outcome.diagnostics.iter().next().unwrap();
    assert!(diag.is_error());
    assert_eq!(diag.summary, "Invalid Import ID");
    assert_eq!(rack.api.calls().await.len(), 0);
}

#[tokio::test]
async fn test_import_then_read_matches_create() {
    let rack = TestRack::new();
    let created = rack.project("imported").await;
    let from_create = rack.read("oxide_project", &created).await.unwrap();

    let imported = rack
        .driver("oxide_project")
        .await
        .import(created["id"].as_str().unwrap())
        .await
        .state
        .unwrap();
    assert_eq!(imported["id"], created["id"]);
    assert!(imported["name"].is_null());

    let from_import = rack.read("oxide_project", &imported).await.unwrap();
    assert_eq!(from_import, from_create);
}
