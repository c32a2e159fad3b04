mod common;
use common::TestRack;
use oxide_api::OxideApi;
use oxide_engine::PlannedAction;
use serde_json::{Value, json};

#[tokio::test]
async fn test_project_lifecycle() {
    let rack = TestRack::new();

    // 1. Create
    let created = rack.project("terraform-acc-myproject").await;
    assert!(created["id"].is_string());
    assert!(created["time_created"].is_string());
    assert_eq!(created["description"], "a test project");

    // 2. Update the only in-place attribute
    let updated = rack
        .update(
            "oxide_project",
            &created,
            json!({"name": "terraform-acc-myproject", "description": "updated"}),
        )
        .await;
    assert_eq!(updated["id"], created["id"]);
    assert_eq!(updated["time_created"], created["time_created"]);
    assert_eq!(updated["description"], "updated");
    assert!(updated["time_modified"].as_str() > created["time_modified"].as_str());

    // 3. Delete removes the default network first
    rack.api.clear_calls().await;
    let diags = rack.delete("oxide_project", &updated).await;
    assert!(diags.is_empty(), "{}", diags);
    assert_eq!(
        rack.api.calls().await,
        vec!["vpc_subnet_delete", "vpc_delete", "project_delete"]
    );

    // Deleting twice is a success
    assert!(rack.delete("oxide_project", &updated).await.is_empty());

    // Refresh drops it from state
    assert!(rack.read("oxide_project", &updated).await.is_none());
}

#[tokio::test]
async fn test_project_delete_tolerates_missing_default_network() {
    let rack = TestRack::new();
    let project = rack.project("web").await;
    let id = project["id"].as_str().unwrap();

    rack.api
        .vpc_subnet_delete("default", Some("default"), Some(id))
        .await
        .unwrap();
    rack.api.vpc_delete("default", Some(id)).await.unwrap();

    let diags = rack.delete("oxide_project", &project).await;
    assert!(diags.is_empty(), "{}", diags);
    assert!(rack.read("oxide_project", &project).await.is_none());
}

#[tokio::test]
async fn test_create_then_read_is_stable() {
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

    let refreshed = rack.read("oxide_vpc", &vpc).await.unwrap();
    assert_eq!(refreshed, vpc);
}

async fn disk(rack: &TestRack, project: &Value, name: &str, source: Value) -> Value {
    let mut config = json!({
        "project_id": project["id"],
        "name": name,
        "description": "a test disk",
        "size": 1073741824
    });
    for (key, value) in source.as_object().unwrap() {
        config[key] = value.clone();
    }
    rack.create("oxide_disk", config).await
}

#[tokio::test]
async fn test_disk_source_variants() {
    let rack = TestRack::new();
    let project = rack.project("storage").await;

    let blank = disk(&rack, &project, "blank", json!({"block_size": 512})).await;
    assert_eq!(blank["block_size"], 512);
    assert!(blank["source_image_id"].is_null());
    assert!(blank["source_snapshot_id"].is_null());

    let snapshot = rack
        .create(
            "oxide_snapshot",
            json!({
                "project_id": project["id"],
                "name": "blank-snap",
                "description": "a test snapshot",
                "disk_id": blank["id"]
            }),
        )
        .await;
    let image = rack
        .create(
            "oxide_image",
            json!({
                "project_id": project["id"],
                "name": "base",
                "description": "a test image",
                "os": "alpine",
                "version": "3.20",
                "source_snapshot_id": snapshot["id"]
            }),
        )
        .await;

    let from_image = disk(
        &rack,
        &project,
        "from-image",
        json!({"source_image_id": image["id"]}),
    )
    .await;
    assert_eq!(from_image["source_image_id"], image["id"]);
    assert!(from_image["block_size"].is_i64());

    let from_snapshot = disk(
        &rack,
        &project,
        "from-snapshot",
        json!({"source_snapshot_id": snapshot["id"]}),
    )
    .await;
    assert_eq!(from_snapshot["source_snapshot_id"], snapshot["id"]);

    // Two sources are rejected before any remote call
    rack.api.clear_calls().await;
    let conflicting = json!({
        "project_id": project["id"],
        "name": "conflicting",
        "description": "a test disk",
        "size": 1073741824,
        "block_size": 512,
        "source_image_id": image["id"]
    });
    let driver = rack.driver("oxide_disk").await;
    assert!(driver.validate(&conflicting).has_error());
    let outcome = driver.plan(Some(&conflicting), None);
    assert!(outcome.change.is_none());
    assert!(outcome.diagnostics.has_error());
    assert_eq!(rack.api.call_count("disk_create").await, 0);
}

#[tokio::test]
async fn test_external_subnet_attachment_safe_detach() {
    let rack = TestRack::new();
    let project = rack.project("edge").await;
    let first = rack.instance(&project["id"], "first").await;
    let second = rack.instance(&project["id"], "second").await;

    let subnet = rack
        .create(
            "oxide_external_subnet",
            json!({
                "project_id": project["id"],
                "name": "edge-subnet",
                "description": "a test external subnet",
                "prefix_len": 28
            }),
        )
        .await;
    let attachment = rack
        .create(
            "oxide_external_subnet_attachment",
            json!({
                "external_subnet_id": subnet["id"],
                "instance_id": first["id"]
            }),
        )
        .await;
    assert_eq!(attachment["instance_id"], first["id"]);

    // Someone moves the subnet to another instance
    let subnet_id = subnet["id"].as_str().unwrap();
    rack.api.external_subnet_detach(subnet_id).await.unwrap();
    rack.api
        .external_subnet_attach(
            subnet_id,
            &oxide_api::ExternalSubnetAttach {
                instance: second["id"].as_str().unwrap().to_string(),
            },
        )
        .await
        .unwrap();

    rack.api.clear_calls().await;
    let diags = rack
        .delete("oxide_external_subnet_attachment", &attachment)
        .await;
    assert!(diags.is_empty(), "{}", diags);
    assert_eq!(rack.api.calls().await, vec!["external_subnet_view"]);

    let current = rack.api.external_subnet_view(subnet_id).await.unwrap();
    assert_eq!(current.instance_id.as_deref(), second["id"].as_str());
}

async fn vpc(rack: &TestRack, project: &Value) -> Value {
    rack.create(
        "oxide_vpc",
        json!({
            "project_id": project["id"],
            "name": "app",
            "description": "a test vpc",
            "dns_name": "app"
        }),
    )
    .await
}

async fn silo(rack: &TestRack, name: &str) -> Value {
    rack.create(
        "oxide_silo",
        json!({
            "name": name,
            "description": "a test silo",
            "quotas": {"cpus": 16, "memory": 68719476736_i64, "storage": 1099511627776_i64},
            "tls_certificates": [],
            "discoverable": true,
            "identity_mode": "saml_jit"
        }),
    )
    .await
}

async fn subnet_pool(rack: &TestRack) -> Value {
    rack.create(
        "oxide_subnet_pool",
        json!({"name": "tenant", "description": "a test subnet pool", "ip_version": "v4"}),
    )
    .await
}

async fn address_lot(rack: &TestRack) -> Value {
    rack.create(
        "oxide_address_lot",
        json!({
            "name": "uplinks",
            "description": "a test address lot",
            "kind": "infra",
            "blocks": [{"first_address": "198.51.100.1", "last_address": "198.51.100.10"}]
        }),
    )
    .await
}

/// Config for one object of `type_name`, creating whatever it hangs off
async fn config_for(rack: &TestRack, type_name: &str) -> Value {
    match type_name {
        "oxide_address_lot" => json!({
            "name": "lot",
            "description": "a test address lot",
            "kind": "pool",
            "blocks": [{"first_address": "203.0.113.1", "last_address": "203.0.113.20"}]
        }),
        "oxide_anti_affinity_group" => {
            let project = rack.project("lifecycle").await;
            json!({
                "project_id": project["id"],
                "name": "spread",
                "description": "a test group",
                "policy": "allow"
            })
        }
        "oxide_disk" => {
            let project = rack.project("lifecycle").await;
            json!({
                "project_id": project["id"],
                "name": "data",
                "description": "a test disk",
                "size": 1073741824,
                "block_size": 4096
            })
        }
        "oxide_external_subnet" => {
            let project = rack.project("lifecycle").await;
            json!({
                "project_id": project["id"],
                "name": "edge",
                "description": "a test external subnet",
                "prefix_len": 28
            })
        }
        "oxide_external_subnet_attachment" => {
            let project = rack.project("lifecycle").await;
            let instance = rack.instance(&project["id"], "web").await;
            let subnet = rack
                .create(
                    "oxide_external_subnet",
                    json!({
                        "project_id": project["id"],
                        "name": "edge",
                        "description": "a test external subnet",
                        "prefix_len": 28
                    }),
                )
                .await;
            json!({"external_subnet_id": subnet["id"], "instance_id": instance["id"]})
        }
        "oxide_floating_ip" => {
            let project = rack.project("lifecycle").await;
            json!({"project_id": project["id"], "name": "vip", "description": "a test floating IP"})
        }
        "oxide_image" => {
            let project = rack.project("lifecycle").await;
            let disk = disk(rack, &project, "boot", json!({"block_size": 512})).await;
            let snapshot = rack
                .create(
                    "oxide_snapshot",
                    json!({
                        "project_id": project["id"],
                        "name": "boot-snap",
                        "description": "a test snapshot",
                        "disk_id": disk["id"]
                    }),
                )
                .await;
            json!({
                "project_id": project["id"],
                "name": "base",
                "description": "a test image",
                "os": "alpine",
                "version": "3.20",
                "source_snapshot_id": snapshot["id"]
            })
        }
        "oxide_instance" => {
            let project = rack.project("lifecycle").await;
            json!({
                "project_id": project["id"],
                "name": "web",
                "description": "a test instance",
                "memory": 1073741824,
                "ncpus": 1,
                "start_on_create": false
            })
        }
        "oxide_ip_pool" => json!({"name": "public", "description": "a test IP pool"}),
        "oxide_ip_pool_silo_link" => {
            let pool = rack
                .create(
                    "oxide_ip_pool",
                    json!({"name": "public", "description": "a test IP pool"}),
                )
                .await;
            let silo = silo(rack, "tenant").await;
            json!({"ip_pool_id": pool["id"], "silo_id": silo["id"], "is_default": false})
        }
        "oxide_project" => json!({"name": "lifecycle", "description": "a test project"}),
        "oxide_silo" => json!({
            "name": "tenant",
            "description": "a test silo",
            "quotas": {"cpus": 16, "memory": 68719476736_i64, "storage": 1099511627776_i64},
            "tls_certificates": [],
            "discoverable": false
        }),
        "oxide_silo_saml_identity_provider" => {
            let silo = silo(rack, "tenant").await;
            json!({
                "silo": silo["id"],
                "name": "okta",
                "description": "a test identity provider",
                "acs_url": "https://tenant.sys.example.com/login/tenant/saml/okta",
                "idp_entity_id": "https://idp.example.com/entity",
                "idp_metadata_source": {"type": "url", "url": "https://idp.example.com/metadata"},
                "slo_url": "https://idp.example.com/logout",
                "sp_client_id": "oxide",
                "technical_contact_email": "ops@example.com"
            })
        }
        "oxide_snapshot" => {
            let project = rack.project("lifecycle").await;
            let disk = disk(rack, &project, "data", json!({"block_size": 512})).await;
            json!({
                "project_id": project["id"],
                "name": "data-snap",
                "description": "a test snapshot",
                "disk_id": disk["id"]
            })
        }
        "oxide_ssh_key" => json!({
            "name": "laptop",
            "description": "a test key",
            "public_key": "ssh-ed25519 AAAAC3NzaC1lZDI1NTE5AAAAIBZ laptop"
        }),
        "oxide_subnet_pool" => json!({
            "name": "tenant",
            "description": "a test subnet pool",
            "ip_version": "v6"
        }),
        "oxide_subnet_pool_member" => {
            let pool = subnet_pool(rack).await;
            json!({"subnet_pool_id": pool["id"], "subnet": "10.0.0.0/16"})
        }
        "oxide_subnet_pool_silo_link" => {
            let pool = subnet_pool(rack).await;
            let silo = silo(rack, "tenant").await;
            json!({"subnet_pool_id": pool["id"], "silo_id": silo["id"], "is_default": true})
        }
        "oxide_switch_port_settings" => {
            let lot = address_lot(rack).await;
            json!({
                "name": "uplink",
                "description": "a test port",
                "port_config": {"geometry": "qsfp28x1"},
                "addresses": [{
                    "link_name": "phy0",
                    "addresses": [{"address": "198.51.100.2/24", "address_lot_id": lot["id"]}]
                }],
                "links": [{
                    "link_name": "phy0",
                    "autoneg": false,
                    "fec": "none",
                    "lldp": {"enabled": false},
                    "mtu": 1500,
                    "speed": "speed100_g"
                }]
            })
        }
        "oxide_vpc" => {
            let project = rack.project("lifecycle").await;
            json!({
                "project_id": project["id"],
                "name": "app",
                "description": "a test vpc",
                "dns_name": "app"
            })
        }
        "oxide_vpc_firewall_rules" => {
            let project = rack.project("lifecycle").await;
            let vpc = vpc(rack, &project).await;
            json!({
                "vpc_id": vpc["id"],
                "rules": {
                    "allow-ssh": {
                        "action": "allow",
                        "description": "ssh from anywhere",
                        "direction": "inbound",
                        "priority": 100,
                        "status": "enabled",
                        "targets": [{"type": "vpc", "value": "app"}],
                        "filters": {"ports": ["22"], "protocols": [{"type": "tcp"}]}
                    }
                }
            })
        }
        "oxide_vpc_internet_gateway" => {
            let project = rack.project("lifecycle").await;
            let vpc = vpc(rack, &project).await;
            json!({"vpc_id": vpc["id"], "name": "outbound", "description": "a test gateway"})
        }
        "oxide_vpc_router" => {
            let project = rack.project("lifecycle").await;
            let vpc = vpc(rack, &project).await;
            json!({"vpc_id": vpc["id"], "name": "edge", "description": "a test router"})
        }
        "oxide_vpc_router_route" => {
            let project = rack.project("lifecycle").await;
            let vpc = vpc(rack, &project).await;
            let router = rack
                .create(
                    "oxide_vpc_router",
                    json!({"vpc_id": vpc["id"], "name": "edge", "description": "a test router"}),
                )
                .await;
            json!({
                "vpc_router_id": router["id"],
                "name": "blackhole",
                "description": "a test route",
                "destination": {"type": "ip_net", "value": "192.0.2.0/24"},
                "target": {"type": "drop"}
            })
        }
        "oxide_vpc_subnet" => {
            let project = rack.project("lifecycle").await;
            let vpc = vpc(rack, &project).await;
            json!({
                "vpc_id": vpc["id"],
                "name": "backend",
                "description": "a test subnet",
                "ipv4_block": "192.168.10.0/24"
            })
        }
        other => panic!("no lifecycle config for {}", other),
    }
}

#[tokio::test]
async fn test_every_resource_create_read_delete() {
    let types = TestRack::new().provider.resource_types().await;
    assert_eq!(types.len(), 25);

    for type_name in types {
        let rack = TestRack::new();
        let config = config_for(&rack, type_name).await;

        let created = rack.create(type_name, config).await;
        assert!(created["id"].is_string(), "{} has no id", type_name);

        let refreshed = rack.read(type_name, &created).await;
        let refreshed = refreshed.unwrap_or_else(|| panic!("{} missing after create", type_name));
        assert_eq!(refreshed["id"], created["id"], "{}", type_name);

        let first = rack.delete(type_name, &created).await;
        let second = rack.delete(type_name, &created).await;
        assert!(!first.has_error(), "{}: {}", type_name, first);
        assert!(!second.has_error(), "{}: {}", type_name, second);

        let after = rack.read(type_name, &created).await;
        match type_name {
            // Deletion only forgets the provider; the remote object stays
            "oxide_silo_saml_identity_provider" => {
                assert_eq!(first.len(), 1);
                assert!(first.iter().all(|d| !d.is_error()));
                assert!(after.is_some());
            }
            // The rule set lives as long as its VPC and is emptied instead
            "oxide_vpc_firewall_rules" => {
                assert!(first.is_empty(), "{}", first);
                let emptied = after.unwrap();
                assert!(emptied["rules"].as_object().is_none_or(|r| r.is_empty()));
            }
            _ => {
                assert!(first.is_empty(), "{}: {}", type_name, first);
                assert!(second.is_empty(), "{}: {}", type_name, second);
                assert!(after.is_none(), "{} still present after delete", type_name);
            }
        }
    }
}

#[tokio::test]
async fn test_subnet_pool_member_delete_when_member_gone() {
    let rack = TestRack::new();
    let pool = subnet_pool(&rack).await;
    let member = rack
        .create(
            "oxide_subnet_pool_member",
            json!({"subnet_pool_id": pool["id"], "subnet": "10.1.0.0/16"}),
        )
        .await;
    assert_eq!(member["min_prefix_length"], 16);
    assert_eq!(member["max_prefix_length"], 32);

    rack.api
        .fail_next(
            "subnet_pool_member_remove",
            400,
            "subnet 10.1.0.0/16 does not exist in subnet pool",
        )
        .await;
    let diags = rack.delete("oxide_subnet_pool_member", &member).await;
    assert!(diags.is_empty(), "{}", diags);

    // Any other bad request still fails
    rack.api
        .fail_next("subnet_pool_member_remove", 400, "subnet pool is in use")
        .await;
    let diags = rack.delete("oxide_subnet_pool_member", &member).await;
    assert!(diags.has_error());
    assert_eq!(
        diags.errors().next().unwrap().summary,
        "Error deleting subnet pool member:"
    );
}

#[tokio::test]
async fn test_removed_optional_computed_keeps_server_value() {
    let rack = TestRack::new();
    let project = rack.project("web").await;
    let vpc = vpc(&rack, &project).await;

    let mut config = json!({
        "vpc_id": vpc["id"],
        "name": "backend",
        "description": "a test subnet",
        "ipv4_block": "192.168.10.0/24",
        "ipv6_block": "fd00:1122:3344:10::/64"
    });
    let created = rack.create("oxide_vpc_subnet", config.clone()).await;
    assert_eq!(created["ipv6_block"], "fd00:1122:3344:10::/64");

    config.as_object_mut().unwrap().remove("ipv6_block");
    let change = rack.plan("oxide_vpc_subnet", &config, Some(&created)).await;
    assert_eq!(change.action, PlannedAction::NoOp);
    assert_eq!(change.planned_state["ipv6_block"], created["ipv6_block"]);
}

#[tokio::test]
async fn test_ssh_key_timeouts_only_update() {
    let rack = TestRack::new();
    let config = json!({
        "name": "laptop",
        "description": "a test key",
        "public_key": "ssh-ed25519 AAAAC3NzaC1lZDI1NTE5AAAAIBZ laptop"
    });
    let created = rack.create("oxide_ssh_key", config.clone()).await;

    let mut longer = config;
    longer["timeouts"] = json!({"delete": "20m"});
    rack.api.clear_calls().await;
    let updated = rack.update("oxide_ssh_key", &created, longer).await;
    assert_eq!(updated["id"], created["id"]);
    assert_eq!(updated["timeouts"]["delete"], "20m");
    assert!(rack.api.calls().await.is_empty());
}
