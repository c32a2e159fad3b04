mod common;
use common::TestRack;
use oxide_engine::PlannedAction;
use serde_json::{Value, json};

fn range(first: &str, last: &str) -> Value {
    json!({"first_address": first, "last_address": last})
}

fn pool_config(ranges: Vec<Value>) -> Value {
    json!({
        "name": "terraform-acc-ip-pool",
        "description": "a test IP pool",
        "ranges": ranges
    })
}

#[tokio::test]
async fn test_ip_pool_range_diff() {
    let rack = TestRack::new();
    let created = rack
        .create(
            "oxide_ip_pool",
            pool_config(vec![
                range("172.20.15.227", "172.20.15.230"),
                range("172.20.15.231", "172.20.15.233"),
            ]),
        )
        .await;
    assert_eq!(rack.api.call_count("ip_pool_range_add").await, 2);

    rack.api.clear_calls().await;
    let updated = rack
        .update(
            "oxide_ip_pool",
            &created,
            pool_config(vec![range("172.20.15.227", "172.20.15.230")]),
        )
        .await;
    assert_eq!(rack.api.call_count("ip_pool_range_remove").await, 1);
    assert_eq!(rack.api.call_count("ip_pool_range_add").await, 0);
    assert_eq!(rack.api.call_count("ip_pool_update").await, 1);
    assert_eq!(updated["id"], created["id"]);

    let refreshed = rack.read("oxide_ip_pool", &updated).await.unwrap();
    assert_eq!(
        refreshed["ranges"],
        json!([range("172.20.15.227", "172.20.15.230")])
    );
}

#[tokio::test]
async fn test_ip_pool_ranges_union_then_difference() {
    let rack = TestRack::new();
    let a = range("10.0.0.1", "10.0.0.10");
    let b = range("10.0.1.1", "10.0.1.10");
    let c = range("10.0.2.1", "10.0.2.10");

    let created = rack.create("oxide_ip_pool", pool_config(vec![a.clone()])).await;

    let grown = rack
        .update(
            "oxide_ip_pool",
            &created,
            pool_config(vec![a.clone(), b.clone(), c.clone()]),
        )
        .await;
    let refreshed = rack.read("oxide_ip_pool", &grown).await.unwrap();
    let mut ranges = refreshed["ranges"].as_array().unwrap().clone();
    ranges.sort_by_key(|r| r["first_address"].as_str().unwrap().to_string());
    assert_eq!(ranges, vec![a.clone(), b.clone(), c.clone()]);

    let shrunk = rack
        .update("oxide_ip_pool", &refreshed, pool_config(vec![b.clone()]))
        .await;
    let refreshed = rack.read("oxide_ip_pool", &shrunk).await.unwrap();
    assert_eq!(refreshed["ranges"], json!([b]));

    // The pool can only go once its ranges are gone
    let diags = rack.delete("oxide_ip_pool", &refreshed).await;
    assert!(diags.is_empty(), "{}", diags);
    assert!(rack.read("oxide_ip_pool", &refreshed).await.is_none());
}

#[tokio::test]
async fn test_ip_pool_empty_ranges_stay_empty() {
    let rack = TestRack::new();
    let config = pool_config(Vec::new());
    let created = rack.create("oxide_ip_pool", config.clone()).await;
    assert_eq!(created["ranges"], json!([]));

    let refreshed = rack.read("oxide_ip_pool", &created).await.unwrap();
    assert_eq!(refreshed["ranges"], json!([]));

    let change = rack.plan("oxide_ip_pool", &config, Some(&refreshed)).await;
    assert_eq!(change.action, PlannedAction::NoOp);
}

#[tokio::test]
async fn test_ip_pool_omitted_ranges_stay_null() {
    let rack = TestRack::new();
    let config = json!({"name": "bare", "description": "no ranges"});
    let created = rack.create("oxide_ip_pool", config.clone()).await;
    let refreshed = rack.read("oxide_ip_pool", &created).await.unwrap();
    assert!(refreshed["ranges"].is_null());

    let change = rack.plan("oxide_ip_pool", &config, Some(&refreshed)).await;
    assert_eq!(change.action, PlannedAction::NoOp);
}

#[tokio::test]
async fn test_ip_pool_range_reorder_is_noop() {
    let rack = TestRack::new();
    let a = range("10.1.0.1", "10.1.0.10");
    let b = range("10.1.1.1", "10.1.1.10");
    let created = rack
        .create("oxide_ip_pool", pool_config(vec![a.clone(), b.clone()]))
        .await;
    let refreshed = rack.read("oxide_ip_pool", &created).await.unwrap();

    let change = rack
        .plan("oxide_ip_pool", &pool_config(vec![b, a]), Some(&refreshed))
        .await;
    assert_eq!(change.action, PlannedAction::NoOp);
}

fn rules() -> Value {
    json!({
        "allow-icmp": {
            "action": "allow",
            "description": "ping from anywhere",
            "direction": "inbound",
            "priority": 60,
            "status": "enabled",
            "targets": [{"type": "vpc", "value": "default"}],
            "filters": {
                "protocols": [{"type": "icmp", "icmp_type": 0}]
            }
        },
        "allow-https": {
            "action": "allow",
            "description": "https from the edge",
            "direction": "inbound",
            "priority": 50,
            "status": "enabled",
            "targets": [
                {"type": "subnet", "value": "default"},
                {"type": "instance", "value": "web"}
            ],
            "filters": {
                "hosts": [{"type": "ip_net", "value": "0.0.0.0/0"}],
                "ports": ["443", "8000-8080"],
                "protocols": [{"type": "tcp"}]
            }
        }
    })
}

#[tokio::test]
async fn test_firewall_rules_idempotent() {
    let rack = TestRack::new();
    let project = rack.project("web").await;
    let vpc = rack
        .create(
            "oxide_vpc",
            json!({
                "project_id": project["id"],
                "name": "app",
                "description": "application network",
                "dns_name": "app"
            }),
        )
        .await;

    let config = json!({"vpc_id": vpc["id"], "rules": rules()});
    let created = rack.create("oxide_vpc_firewall_rules", config.clone()).await;
    assert!(created["id"].is_string());
    assert_eq!(created["rules"]["allow-https"]["name"], "allow-https");

    let refreshed = rack
        .read("oxide_vpc_firewall_rules", &created)
        .await
        .unwrap();
    assert_eq!(refreshed["id"], created["id"]);
    assert_eq!(
        refreshed["rules"]["allow-icmp"]["filters"]["protocols"][0]["icmp_type"],
        0
    );
    assert!(refreshed["rules"]["allow-icmp"]["filters"]["hosts"].is_null());

    let change = rack
        .plan("oxide_vpc_firewall_rules", &config, Some(&refreshed))
        .await;
    assert_eq!(change.action, PlannedAction::NoOp);

    // Delete empties the rule list
    let diags = rack.delete("oxide_vpc_firewall_rules", &refreshed).await;
    assert!(diags.is_empty(), "{}", diags);
    let emptied = rack
        .read("oxide_vpc_firewall_rules", &refreshed)
        .await
        .unwrap();
    assert!(emptied["rules"].as_object().unwrap().is_empty());
}
