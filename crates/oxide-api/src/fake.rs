//! In-memory implementation of [`OxideApi`]
//!
//! Keeps remote objects as JSON documents keyed by kind and records every
//! call by operation name, so tests can assert call order and counts.
//! Lookups accept an id or a name, like the real API.

use crate::client::OxideApi;
use crate::error::{ApiError, Result};
use crate::types::*;
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use std::collections::HashMap;
use tokio::sync::{Mutex, MutexGuard};

/// Seconds since the epoch of the fake clock's first tick (2024-01-01)
const CLOCK_BASE: i64 = 1_704_067_200;
const SILO_USER_ID: &str = "001de000-05e4-4000-8000-000000004007";
const DEFAULT_IP_POOL_ID: &str = "00000000-0000-4000-8000-00000000f001";
const DEFAULT_SUBNET_POOL_ID: &str = "00000000-0000-4000-8000-00000000f002";

const PROJECT: &str = "project";
const SILO: &str = "silo";
const SILO_QUOTAS: &str = "silo_quotas";
const SAML_IDP: &str = "saml_identity_provider";
const VPC: &str = "vpc";
const VPC_SUBNET: &str = "vpc_subnet";
const VPC_ROUTER: &str = "vpc_router";
const ROUTER_ROUTE: &str = "router_route";
const INTERNET_GATEWAY: &str = "internet_gateway";
const FIREWALL_RULE: &str = "firewall_rule";
const IP_POOL: &str = "ip_pool";
const IP_POOL_RANGE: &str = "ip_pool_range";
const IP_POOL_SILO: &str = "ip_pool_silo";
const SUBNET_POOL: &str = "subnet_pool";
const SUBNET_POOL_MEMBER: &str = "subnet_pool_member";
const SUBNET_POOL_SILO: &str = "subnet_pool_silo";
const DISK: &str = "disk";
const IMAGE: &str = "image";
const SNAPSHOT: &str = "snapshot";
const INSTANCE: &str = "instance";
const NIC: &str = "network_interface";
const EPHEMERAL_IP: &str = "ephemeral_ip";
const INSTANCE_SSH_KEY: &str = "instance_ssh_key";
const FLOATING_IP: &str = "floating_ip";
const EXTERNAL_SUBNET: &str = "external_subnet";
const ANTI_AFFINITY_GROUP: &str = "anti_affinity_group";
const ANTI_AFFINITY_MEMBER: &str = "anti_affinity_member";
const SSH_KEY: &str = "ssh_key";
const ADDRESS_LOT: &str = "address_lot";
const SWITCH_PORT_SETTINGS: &str = "switch_port_settings";

/// In-memory Oxide control plane
#[derive(Default)]
pub struct FakeClient {
    state: Mutex<FakeState>,
}

#[derive(Default)]
struct FakeState {
    objects: HashMap<&'static str, Vec<Value>>,
    calls: Vec<String>,
    failures: HashMap<String, (u16, String)>,
    clock: i64,
    sequence: u32,
}

impl FakeClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Names of every operation invoked so far, in order
    pub async fn calls(&self) -> Vec<String> {
        self.state.lock().await.calls.clone()
    }

    /// Number of times `operation` was invoked
    pub async fn call_count(&self, operation: &str) -> usize {
        self.state
            .lock()
            .await
            .calls
            .iter()
            .filter(|c| c.as_str() == operation)
            .count()
    }

    pub async fn clear_calls(&self) {
        self.state.lock().await.calls.clear();
    }

    /// Make the next invocation of `operation` fail with an HTTP error
    pub async fn fail_next(&self, operation: &str, status: u16, message: &str) {
        self.state
            .lock()
            .await
            .failures
            .insert(operation.to_string(), (status, message.to_string()));
    }

    async fn begin(&self, operation: &str) -> Result<MutexGuard<'_, FakeState>> {
        let mut state = self.state.lock().await;
        state.calls.push(operation.to_string());
        if let Some((status, message)) = state.failures.remove(operation) {
            return Err(ApiError::Http {
                status,
                error_code: None,
                message,
            });
        }
        Ok(state)
    }
}

fn bad_request(message: impl Into<String>) -> ApiError {
    ApiError::Http {
        status: 400,
        error_code: Some("InvalidRequest".to_string()),
        message: message.into(),
    }
}

fn decode<T: DeserializeOwned>(value: Value) -> Result<T> {
    Ok(serde_json::from_value(value)?)
}

fn to_value<T: Serialize>(body: &T) -> Result<Value> {
    Ok(serde_json::to_value(body)?)
}

fn str_field<'a>(value: &'a Value, field: &str) -> &'a str {
    value.get(field).and_then(Value::as_str).unwrap_or_default()
}

fn matches_key(value: &Value, key: &str) -> bool {
    str_field(value, "id") == key || str_field(value, "name") == key
}

fn merge(target: &mut Value, patch: Value) {
    if let (Some(target), Value::Object(patch)) = (target.as_object_mut(), patch) {
        for (k, v) in patch {
            target.insert(k, v);
        }
    }
}

impl FakeState {
    fn now(&mut self) -> String {
        self.clock += 1;
        DateTime::from_timestamp(CLOCK_BASE + self.clock, 0)
            .unwrap_or_default()
            .to_rfc3339_opts(SecondsFormat::Secs, true)
    }

    fn next_sequence(&mut self) -> u32 {
        self.sequence += 1;
        self.sequence
    }

    fn identity(&mut self, name: &str, description: &str) -> Value {
        let now = self.now();
        json!({
            "id": uuid::Uuid::new_v4().to_string(),
            "name": name,
            "description": description,
            "time_created": now,
            "time_modified": now,
        })
    }

    fn insert(&mut self, kind: &'static str, value: Value) -> Value {
        self.objects.entry(kind).or_default().push(value.clone());
        value
    }

    fn create(
        &mut self,
        kind: &'static str,
        name: &str,
        description: &str,
        fields: Value,
    ) -> Value {
        let mut value = self.identity(name, description);
        merge(&mut value, fields);
        self.insert(kind, value)
    }

    fn all(&self, kind: &str) -> impl Iterator<Item = &Value> {
        self.objects.get(kind).into_iter().flatten()
    }

    fn filter(&self, kind: &str, pred: impl Fn(&Value) -> bool) -> Vec<Value> {
        self.all(kind).filter(|v| pred(v)).cloned().collect()
    }

    fn position(&self, kind: &str, pred: impl Fn(&Value) -> bool) -> Option<usize> {
        self.objects.get(kind)?.iter().position(pred)
    }

    /// Find by id, or by name within an optional parent scope
    fn find_in(
        &self,
        kind: &str,
        key: &str,
        parent_field: &str,
        parent_id: Option<&str>,
    ) -> Result<Value> {
        self.all(kind)
            .find(|v| {
                str_field(v, "id") == key
                    || (str_field(v, "name") == key
                        && parent_id.is_none_or(|p| str_field(v, parent_field) == p))
            })
            .cloned()
            .ok_or_else(|| ApiError::NotFound(format!("{} with name or id \"{}\"", kind, key)))
    }

    fn find(&self, kind: &str, key: &str) -> Result<Value> {
        self.find_in(kind, key, "", None)
    }

    fn resolve(&self, kind: &str, key: &str) -> Result<String> {
        Ok(str_field(&self.find(kind, key)?, "id").to_string())
    }

    fn update(&mut self, kind: &'static str, key: &str, patch: Value) -> Result<Value> {
        let now = self.now();
        let index = self
            .position(kind, |v| matches_key(v, key))
            .ok_or_else(|| ApiError::NotFound(format!("{} with name or id \"{}\"", kind, key)))?;
        let objects = self.objects.entry(kind).or_default();
        let object = &mut objects[index];
        merge(object, patch);
        if object.get("time_modified").is_some() {
            object["time_modified"] = json!(now);
        }
        Ok(object.clone())
    }

    fn remove_by(&mut self, kind: &str, pred: impl Fn(&Value) -> bool) -> Vec<Value> {
        let Some(objects) = self.objects.get_mut(kind) else {
            return Vec::new();
        };
        let (removed, kept): (Vec<Value>, Vec<Value>) =
            std::mem::take(objects).into_iter().partition(|v| pred(v));
        *objects = kept;
        removed
    }

    fn remove(&mut self, kind: &str, key: &str) -> Result<Value> {
        let id = self.resolve(kind, key)?;
        let mut removed = self.remove_by(kind, |v| str_field(v, "id") == id);
        removed
            .pop()
            .ok_or_else(|| ApiError::NotFound(format!("{} with id \"{}\"", kind, id)))
    }

    fn allocate_ip(&mut self) -> String {
        let n = self.next_sequence();
        format!("203.0.113.{}", n % 250 + 1)
    }

    fn pool_id(&self, selector: &PoolSelector) -> Result<String> {
        match selector {
            PoolSelector::Explicit { pool } => self.resolve(IP_POOL, pool),
            PoolSelector::Auto { .. } => Ok(DEFAULT_IP_POOL_ID.to_string()),
        }
    }

    fn instance(&self, key: &str) -> Result<Value> {
        self.find(INSTANCE, key)
    }

    fn require_stopped(&self, instance: &Value) -> Result<()> {
        match str_field(instance, "run_state") {
            "stopped" => Ok(()),
            other => Err(bad_request(format!(
                "instance must be stopped, current state is {}",
                other
            ))),
        }
    }

    fn attach_disk(&mut self, instance_id: &str, disk_key: &str, project: &str) -> Result<Value> {
        let disk = self.find_in(DISK, disk_key, "project_id", Some(project))?;
        if str_field(&disk["state"], "state") != "detached" {
            return Err(bad_request(format!(
                "disk {} is not detached",
                str_field(&disk, "name")
            )));
        }
        self.update(
            DISK,
            str_field(&disk, "id"),
            json!({"state": {"state": "attached", "instance": instance_id}}),
        )
    }

    fn create_nic(
        &mut self,
        instance: &Value,
        body: &InstanceNetworkInterfaceCreate,
    ) -> Result<Value> {
        let instance_id = str_field(instance, "id").to_string();
        let project_id = str_field(instance, "project_id").to_string();
        if self
            .all(NIC)
            .any(|n| str_field(n, "instance_id") == instance_id && str_field(n, "name") == body.name)
        {
            return Err(bad_request(format!(
                "already exists: network interface \"{}\"",
                body.name
            )));
        }
        let vpc = self.find_in(VPC, &body.vpc_name, "project_id", Some(&project_id))?;
        let vpc_id = str_field(&vpc, "id").to_string();
        let subnet = self.find_in(VPC_SUBNET, &body.subnet_name, "vpc_id", Some(&vpc_id))?;
        let ip = match &body.ip_config {
            PrivateIpStackCreate::V4 {
                ip: Ipv4Assignment::Explicit { value },
            } => value.clone(),
            PrivateIpStackCreate::V4 {
                ip: Ipv4Assignment::Auto,
            } => format!("172.30.0.{}", self.next_sequence() % 250 + 5),
        };
        let primary = !self
            .all(NIC)
            .any(|n| str_field(n, "instance_id") == instance_id);
        let n = self.next_sequence();
        Ok(self.create(
            NIC,
            &body.name,
            &body.description,
            json!({
                "instance_id": instance_id,
                "mac": format!("a8:40:25:ff:00:{:02x}", n % 256),
                "primary": primary,
                "subnet_id": subnet["id"],
                "vpc_id": vpc_id,
                "ip_stack": {"type": "v4", "value": {"ip": ip}},
            }),
        ))
    }

    fn attach_floating_ip(&mut self, floating_ip: &str, instance_id: &str) -> Result<Value> {
        let ip = self.find(FLOATING_IP, floating_ip)?;
        if !ip["instance_id"].is_null() {
            return Err(bad_request("floating IP is already attached"));
        }
        self.update(
            FLOATING_IP,
            str_field(&ip, "id"),
            json!({ "instance_id": instance_id }),
        )
    }

    fn add_anti_affinity_member(&mut self, group: &str, instance_id: &str) -> Result<()> {
        let group_id = self.resolve(ANTI_AFFINITY_GROUP, group)?;
        let exists = self.all(ANTI_AFFINITY_MEMBER).any(|m| {
            str_field(m, "group_id") == group_id && str_field(m, "instance_id") == instance_id
        });
        if !exists {
            self.insert(
                ANTI_AFFINITY_MEMBER,
                json!({"group_id": group_id, "instance_id": instance_id}),
            );
        }
        Ok(())
    }

    /// Id of the VPC named `vpc` inside `project`
    fn scoped_vpc(&self, vpc: &str, project: &str) -> Result<String> {
        let project_id = self.resolve(PROJECT, project)?;
        let vpc = self.find_in(VPC, vpc, "project_id", Some(&project_id))?;
        Ok(str_field(&vpc, "id").to_string())
    }

    fn silo_subnet_pool(&self, link: &Value) -> Result<Value> {
        let mut pool = self.find(SUBNET_POOL, str_field(link, "subnet_pool_id"))?;
        merge(&mut pool, json!({"is_default": link["is_default"]}));
        Ok(pool)
    }

    fn switch_port_settings_view(&self, create: &SwitchPortSettingsCreate) -> Result<Value> {
        let mut addresses = Vec::new();
        for (link, config) in &create.addresses {
            for address in &config.addresses {
                addresses.push(json!({
                    "interface_name": link,
                    "address": address.address,
                    "address_lot_id": self.resolve(ADDRESS_LOT, &address.address_lot)?,
                    "vlan_id": address.vlan_id,
                }));
            }
        }

        let mut bgp_peers = Vec::new();
        for (link, config) in &create.bgp_peers {
            for peer in &config.peers {
                let mut view = to_value(peer)?;
                merge(
                    &mut view,
                    json!({
                        "link_name": link,
                        "communities": peer.communities.iter().map(|c| c.to_string()).collect::<Vec<_>>(),
                    }),
                );
                bgp_peers.push(view);
            }
        }

        let interfaces: Vec<Value> = create
            .interfaces
            .iter()
            .map(|(link, config)| {
                json!({"interface_name": link, "kind": config.kind, "v6_enabled": config.v6_enabled})
            })
            .collect();

        let mut links = Vec::new();
        for (link, config) in &create.links {
            let mut view = to_value(config)?;
            merge(&mut view, json!({ "link_name": link }));
            links.push(view);
        }

        let mut routes = Vec::new();
        for (link, config) in &create.routes {
            for route in &config.routes {
                routes.push(json!({
                    "interface_name": link,
                    "dst": route.dst,
                    "gw": route.gw,
                    "rib_priority": route.rib_priority,
                    "vlan_id": route.vid,
                }));
            }
        }

        Ok(json!({
            "port": create.port_config,
            "addresses": addresses,
            "bgp_peers": bgp_peers,
            "groups": create.groups,
            "interfaces": interfaces,
            "links": links,
            "routes": routes,
        }))
    }
}

fn prefix_len(cidr: &str) -> i64 {
    cidr.rsplit_once('/')
        .and_then(|(_, p)| p.parse().ok())
        .unwrap_or_default()
}

#[async_trait]
impl OxideApi for FakeClient {
    // ============ Projects ============

    async fn project_create(&self, body: &ProjectCreate) -> Result<Project> {
        let mut s = self.begin("project_create").await?;
        if s.all(PROJECT).any(|p| str_field(p, "name") == body.name) {
            return Err(bad_request(format!(
                "already exists: project \"{}\"",
                body.name
            )));
        }
        let project = s.create(PROJECT, &body.name, &body.description, json!({}));
        let project_id = str_field(&project, "id").to_string();

        // Every project starts with a default VPC holding a default subnet
        let router = s.create(
            VPC_ROUTER,
            "system",
            "Routes are automatically added",
            json!({"kind": "system"}),
        );
        let vpc = s.create(
            VPC,
            "default",
            "Default VPC",
            json!({
                "project_id": project_id,
                "system_router_id": router["id"],
                "ipv6_prefix": "fd00:1122:3344::/48",
                "dns_name": "default",
            }),
        );
        let vpc_id = str_field(&vpc, "id").to_string();
        s.update(VPC_ROUTER, str_field(&router, "id"), json!({ "vpc_id": vpc_id }))?;
        s.create(
            VPC_SUBNET,
            "default",
            "Default subnet",
            json!({
                "vpc_id": vpc_id,
                "ipv4_block": "172.30.0.0/22",
                "ipv6_block": "fd00:1122:3344:100::/64",
            }),
        );
        decode(project)
    }

    async fn project_view(&self, project: &str) -> Result<Project> {
        let s = self.begin("project_view").await?;
        decode(s.find(PROJECT, project)?)
    }

    async fn project_update(&self, project: &str, body: &ProjectUpdate) -> Result<Project> {
        let mut s = self.begin("project_update").await?;
        decode(s.update(PROJECT, project, to_value(body)?)?)
    }

    async fn project_delete(&self, project: &str) -> Result<()> {
        let mut s = self.begin("project_delete").await?;
        let id = s.resolve(PROJECT, project)?;
        if s.all(VPC).any(|v| str_field(v, "project_id") == id) {
            return Err(bad_request("project to be deleted contains a VPC"));
        }
        s.remove(PROJECT, &id)?;
        Ok(())
    }

    // ============ Silos ============

    async fn silo_create(&self, body: &SiloCreate) -> Result<Silo> {
        let mut s = self.begin("silo_create").await?;
        let silo = s.create(
            SILO,
            &body.name,
            &body.description,
            json!({
                "discoverable": body.discoverable,
                "identity_mode": body.identity_mode,
                "mapped_fleet_roles": body.mapped_fleet_roles,
            }),
        );
        s.insert(
            SILO_QUOTAS,
            json!({
                "silo_id": silo["id"],
                "cpus": body.quotas.cpus,
                "memory": body.quotas.memory,
                "storage": body.quotas.storage,
            }),
        );
        decode(silo)
    }

    async fn silo_view(&self, silo: &str) -> Result<Silo> {
        let s = self.begin("silo_view").await?;
        decode(s.find(SILO, silo)?)
    }

    async fn silo_delete(&self, silo: &str) -> Result<()> {
        let mut s = self.begin("silo_delete").await?;
        let removed = s.remove(SILO, silo)?;
        let id = str_field(&removed, "id").to_string();
        s.remove_by(SILO_QUOTAS, |q| str_field(q, "silo_id") == id);
        Ok(())
    }

    async fn silo_quotas_view(&self, silo: &str) -> Result<SiloQuotas> {
        let s = self.begin("silo_quotas_view").await?;
        let id = s.resolve(SILO, silo)?;
        let quotas = s
            .all(SILO_QUOTAS)
            .find(|q| str_field(q, "silo_id") == id)
            .cloned()
            .ok_or_else(|| ApiError::NotFound(format!("quotas for silo \"{}\"", silo)))?;
        decode(quotas)
    }

    async fn silo_quotas_update(
        &self,
        silo: &str,
        body: &SiloQuotasUpdate,
    ) -> Result<SiloQuotas> {
        let mut s = self.begin("silo_quotas_update").await?;
        let id = s.resolve(SILO, silo)?;
        let index = s
            .position(SILO_QUOTAS, |q| str_field(q, "silo_id") == id)
            .ok_or_else(|| ApiError::NotFound(format!("quotas for silo \"{}\"", silo)))?;
        let quotas = &mut s.objects.entry(SILO_QUOTAS).or_default()[index];
        merge(quotas, serde_json::to_value(body)?);
        let quotas = quotas.clone();
        s.update(SILO, &id, json!({}))?;
        decode(quotas)
    }

    async fn saml_identity_provider_create(
        &self,
        silo: &str,
        body: &SamlIdentityProviderCreate,
    ) -> Result<SamlIdentityProvider> {
        let mut s = self.begin("saml_identity_provider_create").await?;
        let silo_id = s.resolve(SILO, silo)?;
        let provider = s.create(
            SAML_IDP,
            &body.name,
            &body.description,
            json!({
                "silo_id": silo_id,
                "acs_url": body.acs_url,
                "idp_entity_id": body.idp_entity_id,
                "slo_url": body.slo_url,
                "sp_client_id": body.sp_client_id,
                "technical_contact_email": body.technical_contact_email,
                "group_attribute_name": body.group_attribute_name,
                "public_cert": body.signing_keypair.as_ref().map(|k| k.public_cert.clone()),
            }),
        );
        decode(provider)
    }

    async fn saml_identity_provider_view(
        &self,
        provider: &str,
        silo: Option<&str>,
    ) -> Result<SamlIdentityProvider> {
        let s = self.begin("saml_identity_provider_view").await?;
        let silo_id = silo.map(|silo| s.resolve(SILO, silo)).transpose()?;
        decode(s.find_in(SAML_IDP, provider, "silo_id", silo_id.as_deref())?)
    }

    // ============ VPCs ============

    async fn vpc_create(&self, project: &str, body: &VpcCreate) -> Result<Vpc> {
        let mut s = self.begin("vpc_create").await?;
        let project_id = s.resolve(PROJECT, project)?;
        if s.all(VPC)
            .any(|v| str_field(v, "project_id") == project_id && str_field(v, "name") == body.name)
        {
            return Err(bad_request(format!("already exists: vpc \"{}\"", body.name)));
        }
        let n = s.next_sequence();
        let router = s.create(
            VPC_ROUTER,
            "system",
            "Routes are automatically added",
            json!({"kind": "system"}),
        );
        let vpc = s.create(
            VPC,
            &body.name,
            &body.description,
            json!({
                "project_id": project_id,
                "system_router_id": router["id"],
                "ipv6_prefix": body.ipv6_prefix.clone().unwrap_or_else(|| format!("fd00:1122:{:x}::/48", n)),
                "dns_name": body.dns_name,
            }),
        );
        s.update(VPC_ROUTER, str_field(&router, "id"), json!({"vpc_id": vpc["id"]}))?;
        decode(vpc)
    }

    async fn vpc_view(&self, vpc: &str, project: Option<&str>) -> Result<Vpc> {
        let s = self.begin("vpc_view").await?;
        let project_id = project.map(|p| s.resolve(PROJECT, p)).transpose()?;
        decode(s.find_in(VPC, vpc, "project_id", project_id.as_deref())?)
    }

    async fn vpc_update(&self, vpc: &str, body: &VpcUpdate) -> Result<Vpc> {
        let mut s = self.begin("vpc_update").await?;
        decode(s.update(VPC, vpc, to_value(body)?)?)
    }

    async fn vpc_delete(&self, vpc: &str, project: Option<&str>) -> Result<()> {
        let mut s = self.begin("vpc_delete").await?;
        let project_id = project.map(|p| s.resolve(PROJECT, p)).transpose()?;
        let found = s.find_in(VPC, vpc, "project_id", project_id.as_deref())?;
        let id = str_field(&found, "id").to_string();
        if s.all(VPC_SUBNET).any(|v| str_field(v, "vpc_id") == id) {
            return Err(bad_request("VPC cannot be deleted while it contains subnets"));
        }
        s.remove_by(VPC, |v| str_field(v, "id") == id);
        s.remove_by(VPC_ROUTER, |r| str_field(r, "vpc_id") == id);
        s.remove_by(FIREWALL_RULE, |r| str_field(r, "vpc_id") == id);
        Ok(())
    }

    async fn vpc_subnet_create(&self, vpc: &str, body: &VpcSubnetCreate) -> Result<VpcSubnet> {
        let mut s = self.begin("vpc_subnet_create").await?;
        let vpc_id = s.resolve(VPC, vpc)?;
        let n = s.next_sequence();
        let subnet = s.create(
            VPC_SUBNET,
            &body.name,
            &body.description,
            json!({
                "vpc_id": vpc_id,
                "ipv4_block": body.ipv4_block,
                "ipv6_block": body.ipv6_block.clone().unwrap_or_else(|| format!("fd00:1122:3344:{:x}::/64", n)),
            }),
        );
        decode(subnet)
    }

    async fn vpc_subnet_view(&self, subnet: &str) -> Result<VpcSubnet> {
        let s = self.begin("vpc_subnet_view").await?;
        decode(s.find(VPC_SUBNET, subnet)?)
    }

    async fn vpc_subnet_update(
        &self,
        subnet: &str,
        body: &VpcSubnetUpdate,
    ) -> Result<VpcSubnet> {
        let mut s = self.begin("vpc_subnet_update").await?;
        decode(s.update(VPC_SUBNET, subnet, to_value(body)?)?)
    }

    async fn vpc_subnet_delete(
        &self,
        subnet: &str,
        vpc: Option<&str>,
        project: Option<&str>,
    ) -> Result<()> {
        let mut s = self.begin("vpc_subnet_delete").await?;
        let project_id = project.map(|p| s.resolve(PROJECT, p)).transpose()?;
        let vpc_id = match vpc {
            Some(vpc) => Some(str_field(
                &s.find_in(VPC, vpc, "project_id", project_id.as_deref())?,
                "id",
            )
            .to_string()),
            None => None,
        };
        let found = s.find_in(VPC_SUBNET, subnet, "vpc_id", vpc_id.as_deref())?;
        let id = str_field(&found, "id").to_string();
        s.remove_by(VPC_SUBNET, |v| str_field(v, "id") == id);
        Ok(())
    }

    async fn vpc_router_create(&self, vpc: &str, body: &NameDescription) -> Result<VpcRouter> {
        let mut s = self.begin("vpc_router_create").await?;
        let vpc_id = s.resolve(VPC, vpc)?;
        decode(s.create(
            VPC_ROUTER,
            &body.name,
            &body.description,
            json!({"vpc_id": vpc_id, "kind": "custom"}),
        ))
    }

    async fn vpc_router_view(&self, router: &str) -> Result<VpcRouter> {
        let s = self.begin("vpc_router_view").await?;
        decode(s.find(VPC_ROUTER, router)?)
    }

    async fn vpc_router_update(
        &self,
        router: &str,
        body: &NameDescription,
    ) -> Result<VpcRouter> {
        let mut s = self.begin("vpc_router_update").await?;
        decode(s.update(VPC_ROUTER, router, to_value(body)?)?)
    }

    async fn vpc_router_delete(&self, router: &str) -> Result<()> {
        let mut s = self.begin("vpc_router_delete").await?;
        let removed = s.remove(VPC_ROUTER, router)?;
        let id = str_field(&removed, "id").to_string();
        s.remove_by(ROUTER_ROUTE, |r| str_field(r, "vpc_router_id") == id);
        Ok(())
    }

    async fn vpc_router_route_create(
        &self,
        router: &str,
        body: &RouterRouteCreate,
    ) -> Result<RouterRoute> {
        let mut s = self.begin("vpc_router_route_create").await?;
        let router_id = s.resolve(VPC_ROUTER, router)?;
        decode(s.create(
            ROUTER_ROUTE,
            &body.name,
            &body.description,
            json!({
                "vpc_router_id": router_id,
                "kind": "custom",
                "destination": body.destination,
                "target": body.target,
            }),
        ))
    }

    async fn vpc_router_route_view(&self, route: &str) -> Result<RouterRoute> {
        let s = self.begin("vpc_router_route_view").await?;
        decode(s.find(ROUTER_ROUTE, route)?)
    }

    async fn vpc_router_route_update(
        &self,
        route: &str,
        body: &RouterRouteCreate,
    ) -> Result<RouterRoute> {
        let mut s = self.begin("vpc_router_route_update").await?;
        decode(s.update(ROUTER_ROUTE, route, to_value(body)?)?)
    }

    async fn vpc_router_route_delete(&self, route: &str) -> Result<()> {
        let mut s = self.begin("vpc_router_route_delete").await?;
        s.remove(ROUTER_ROUTE, route)?;
        Ok(())
    }

    async fn internet_gateway_create(
        &self,
        vpc: &str,
        body: &NameDescription,
    ) -> Result<InternetGateway> {
        let mut s = self.begin("internet_gateway_create").await?;
        let vpc_id = s.resolve(VPC, vpc)?;
        decode(s.create(
            INTERNET_GATEWAY,
            &body.name,
            &body.description,
            json!({ "vpc_id": vpc_id }),
        ))
    }

    async fn internet_gateway_view(&self, gateway: &str) -> Result<InternetGateway> {
        let s = self.begin("internet_gateway_view").await?;
        decode(s.find(INTERNET_GATEWAY, gateway)?)
    }

    async fn internet_gateway_delete(&self, gateway: &str, _cascade: bool) -> Result<()> {
        let mut s = self.begin("internet_gateway_delete").await?;
        s.remove(INTERNET_GATEWAY, gateway)?;
        Ok(())
    }

    async fn vpc_firewall_rules_view(&self, vpc: &str) -> Result<VpcFirewallRules> {
        let s = self.begin("vpc_firewall_rules_view").await?;
        let vpc_id = s.resolve(VPC, vpc)?;
        let mut rules = s.filter(FIREWALL_RULE, |r| str_field(r, "vpc_id") == vpc_id);
        // The remote does not preserve the submitted order
        rules.reverse();
        decode(json!({ "rules": rules }))
    }

    async fn vpc_firewall_rules_update(
        &self,
        vpc: &str,
        body: &VpcFirewallRuleUpdateParams,
    ) -> Result<VpcFirewallRules> {
        let mut s = self.begin("vpc_firewall_rules_update").await?;
        let vpc_id = s.resolve(VPC, vpc)?;
        s.remove_by(FIREWALL_RULE, |r| str_field(r, "vpc_id") == vpc_id);
        let mut rules = Vec::new();
        for rule in &body.rules {
            let mut fields = to_value(rule)?;
            merge(&mut fields, json!({ "vpc_id": vpc_id }));
            rules.push(s.create(FIREWALL_RULE, &rule.name, &rule.description, fields));
        }
        rules.reverse();
        decode(json!({ "rules": rules }))
    }

    // ============ IP pools ============

    async fn ip_pool_create(&self, body: &IpPoolCreate) -> Result<IpPool> {
        let mut s = self.begin("ip_pool_create").await?;
        decode(s.create(IP_POOL, &body.name, &body.description, json!({})))
    }

    async fn ip_pool_view(&self, pool: &str) -> Result<IpPool> {
        let s = self.begin("ip_pool_view").await?;
        decode(s.find(IP_POOL, pool)?)
    }

    async fn ip_pool_update(&self, pool: &str, body: &NameDescription) -> Result<IpPool> {
        let mut s = self.begin("ip_pool_update").await?;
        decode(s.update(IP_POOL, pool, to_value(body)?)?)
    }

    async fn ip_pool_delete(&self, pool: &str) -> Result<()> {
        let mut s = self.begin("ip_pool_delete").await?;
        let id = s.resolve(IP_POOL, pool)?;
        if s.all(IP_POOL_RANGE).any(|r| str_field(r, "ip_pool_id") == id) {
            return Err(bad_request("IP Pool cannot be deleted while it contains IP ranges"));
        }
        s.remove(IP_POOL, &id)?;
        s.remove_by(IP_POOL_SILO, |l| str_field(l, "ip_pool_id") == id);
        Ok(())
    }

    async fn ip_pool_range_list(&self, pool: &str) -> Result<Vec<IpPoolRange>> {
        let s = self.begin("ip_pool_range_list").await?;
        let id = s.resolve(IP_POOL, pool)?;
        decode(json!(s.filter(IP_POOL_RANGE, |r| str_field(r, "ip_pool_id") == id)))
    }

    async fn ip_pool_range_add(&self, pool: &str, range: &IpRange) -> Result<IpPoolRange> {
        let mut s = self.begin("ip_pool_range_add").await?;
        let id = s.resolve(IP_POOL, pool)?;
        let range = to_value(range)?;
        if s.all(IP_POOL_RANGE)
            .any(|r| str_field(r, "ip_pool_id") == id && r["range"] == range)
        {
            return Err(bad_request("The provided IP range overlaps with an existing range"));
        }
        let now = s.now();
        decode(s.insert(
            IP_POOL_RANGE,
            json!({
                "id": uuid::Uuid::new_v4().to_string(),
                "ip_pool_id": id,
                "time_created": now,
                "range": range,
            }),
        ))
    }

    async fn ip_pool_range_remove(&self, pool: &str, range: &IpRange) -> Result<()> {
        let mut s = self.begin("ip_pool_range_remove").await?;
        let id = s.resolve(IP_POOL, pool)?;
        let range = to_value(range)?;
        let removed = s.remove_by(IP_POOL_RANGE, |r| {
            str_field(r, "ip_pool_id") == id && r["range"] == range
        });
        if removed.is_empty() {
            return Err(ApiError::NotFound(format!("range in ip pool \"{}\"", pool)));
        }
        Ok(())
    }

    async fn ip_pool_silo_link(
        &self,
        pool: &str,
        body: &IpPoolLinkSilo,
    ) -> Result<IpPoolSiloLink> {
        let mut s = self.begin("ip_pool_silo_link").await?;
        let pool_id = s.resolve(IP_POOL, pool)?;
        let silo_id = s.resolve(SILO, &body.silo)?;
        if s.all(IP_POOL_SILO)
            .any(|l| str_field(l, "ip_pool_id") == pool_id && str_field(l, "silo_id") == silo_id)
        {
            return Err(bad_request("IP pool is already linked to silo"));
        }
        decode(s.insert(
            IP_POOL_SILO,
            json!({"ip_pool_id": pool_id, "silo_id": silo_id, "is_default": body.is_default}),
        ))
    }

    async fn ip_pool_silo_list(&self, pool: &str) -> Result<Vec<IpPoolSiloLink>> {
        let s = self.begin("ip_pool_silo_list").await?;
        let id = s.resolve(IP_POOL, pool)?;
        decode(json!(s.filter(IP_POOL_SILO, |l| str_field(l, "ip_pool_id") == id)))
    }

    async fn ip_pool_silo_update(
        &self,
        pool: &str,
        silo: &str,
        body: &IsDefault,
    ) -> Result<IpPoolSiloLink> {
        let mut s = self.begin("ip_pool_silo_update").await?;
        let pool_id = s.resolve(IP_POOL, pool)?;
        let silo_id = s.resolve(SILO, silo)?;
        let index = s
            .position(IP_POOL_SILO, |l| {
                str_field(l, "ip_pool_id") == pool_id && str_field(l, "silo_id") == silo_id
            })
            .ok_or_else(|| ApiError::NotFound("ip pool silo link".to_string()))?;
        let link = &mut s.objects.entry(IP_POOL_SILO).or_default()[index];
        link["is_default"] = json!(body.is_default);
        decode(link.clone())
    }

    async fn ip_pool_silo_unlink(&self, pool: &str, silo: &str) -> Result<()> {
        let mut s = self.begin("ip_pool_silo_unlink").await?;
        let pool_id = s.resolve(IP_POOL, pool)?;
        let silo_id = s.resolve(SILO, silo)?;
        let removed = s.remove_by(IP_POOL_SILO, |l| {
            str_field(l, "ip_pool_id") == pool_id && str_field(l, "silo_id") == silo_id
        });
        if removed.is_empty() {
            return Err(ApiError::NotFound("ip pool silo link".to_string()));
        }
        Ok(())
    }

    // ============ Subnet pools ============

    async fn subnet_pool_create(&self, body: &SubnetPoolCreate) -> Result<SubnetPool> {
        let mut s = self.begin("subnet_pool_create").await?;
        decode(s.create(
            SUBNET_POOL,
            &body.name,
            &body.description,
            json!({ "ip_version": body.ip_version }),
        ))
    }

    async fn subnet_pool_view(&self, pool: &str) -> Result<SubnetPool> {
        let s = self.begin("subnet_pool_view").await?;
        decode(s.find(SUBNET_POOL, pool)?)
    }

    async fn subnet_pool_update(
        &self,
        pool: &str,
        body: &NameDescription,
    ) -> Result<SubnetPool> {
        let mut s = self.begin("subnet_pool_update").await?;
        decode(s.update(SUBNET_POOL, pool, to_value(body)?)?)
    }

    async fn subnet_pool_delete(&self, pool: &str) -> Result<()> {
        let mut s = self.begin("subnet_pool_delete").await?;
        let removed = s.remove(SUBNET_POOL, pool)?;
        let id = str_field(&removed, "id").to_string();
        s.remove_by(SUBNET_POOL_SILO, |l| str_field(l, "subnet_pool_id") == id);
        Ok(())
    }

    async fn subnet_pool_member_list(&self, pool: &str) -> Result<Vec<SubnetPoolMember>> {
        let s = self.begin("subnet_pool_member_list").await?;
        let id = s.resolve(SUBNET_POOL, pool)?;
        decode(json!(s.filter(SUBNET_POOL_MEMBER, |m| str_field(m, "subnet_pool_id") == id)))
    }

    async fn subnet_pool_member_add(
        &self,
        pool: &str,
        body: &SubnetPoolMemberAdd,
    ) -> Result<SubnetPoolMember> {
        let mut s = self.begin("subnet_pool_member_add").await?;
        let id = s.resolve(SUBNET_POOL, pool)?;
        let max_default = if body.subnet.contains(':') { 128 } else { 32 };
        let now = s.now();
        decode(s.insert(
            SUBNET_POOL_MEMBER,
            json!({
                "id": uuid::Uuid::new_v4().to_string(),
                "subnet_pool_id": id,
                "subnet": body.subnet,
                "min_prefix_length": body.min_prefix_length.unwrap_or_else(|| prefix_len(&body.subnet)),
                "max_prefix_length": body.max_prefix_length.unwrap_or(max_default),
                "time_created": now,
            }),
        ))
    }

    async fn subnet_pool_member_remove(
        &self,
        pool: &str,
        body: &SubnetPoolMemberRemove,
    ) -> Result<()> {
        let mut s = self.begin("subnet_pool_member_remove").await?;
        let id = s.resolve(SUBNET_POOL, pool)?;
        let removed = s.remove_by(SUBNET_POOL_MEMBER, |m| {
            str_field(m, "subnet_pool_id") == id && str_field(m, "subnet") == body.subnet
        });
        if removed.is_empty() {
            return Err(bad_request(format!(
                "subnet {} does not exist in subnet pool",
                body.subnet
            )));
        }
        Ok(())
    }

    async fn subnet_pool_silo_link(
        &self,
        pool: &str,
        body: &SubnetPoolLinkSilo,
    ) -> Result<SubnetPoolSiloLink> {
        let mut s = self.begin("subnet_pool_silo_link").await?;
        let pool_id = s.resolve(SUBNET_POOL, pool)?;
        let silo_id = s.resolve(SILO, &body.silo)?;
        decode(s.insert(
            SUBNET_POOL_SILO,
            json!({"subnet_pool_id": pool_id, "silo_id": silo_id, "is_default": body.is_default}),
        ))
    }

    async fn subnet_pool_silo_update(
        &self,
        pool: &str,
        silo: &str,
        body: &IsDefault,
    ) -> Result<SubnetPoolSiloLink> {
        let mut s = self.begin("subnet_pool_silo_update").await?;
        let pool_id = s.resolve(SUBNET_POOL, pool)?;
        let silo_id = s.resolve(SILO, silo)?;
        let index = s
            .position(SUBNET_POOL_SILO, |l| {
                str_field(l, "subnet_pool_id") == pool_id && str_field(l, "silo_id") == silo_id
            })
            .ok_or_else(|| ApiError::NotFound("subnet pool silo link".to_string()))?;
        let link = &mut s.objects.entry(SUBNET_POOL_SILO).or_default()[index];
        link["is_default"] = json!(body.is_default);
        decode(link.clone())
    }

    async fn subnet_pool_silo_unlink(&self, pool: &str, silo: &str) -> Result<()> {
        let mut s = self.begin("subnet_pool_silo_unlink").await?;
        let pool_id = s.resolve(SUBNET_POOL, pool)?;
        let silo_id = s.resolve(SILO, silo)?;
        let removed = s.remove_by(SUBNET_POOL_SILO, |l| {
            str_field(l, "subnet_pool_id") == pool_id && str_field(l, "silo_id") == silo_id
        });
        if removed.is_empty() {
            return Err(ApiError::NotFound("subnet pool silo link".to_string()));
        }
        Ok(())
    }

    async fn silo_subnet_pool_list(&self, silo: &str) -> Result<Vec<SiloSubnetPool>> {
        let s = self.begin("silo_subnet_pool_list").await?;
        let silo_id = s.resolve(SILO, silo)?;
        let mut pools = Vec::new();
        for link in s.filter(SUBNET_POOL_SILO, |l| str_field(l, "silo_id") == silo_id) {
            pools.push(s.silo_subnet_pool(&link)?);
        }
        decode(json!(pools))
    }

    // ============ Storage ============

    async fn disk_create(&self, project: &str, body: &DiskCreate) -> Result<Disk> {
        let mut s = self.begin("disk_create").await?;
        let project_id = s.resolve(PROJECT, project)?;
        let (block_size, image_id, snapshot_id) = match &body.disk_source {
            DiskSource::Blank { block_size } => (*block_size, None, None),
            DiskSource::Image { image_id } => {
                let image = s.find(IMAGE, image_id)?;
                (image["block_size"].as_i64().unwrap_or(512), Some(image_id.clone()), None)
            }
            DiskSource::Snapshot { snapshot_id } => {
                s.find(SNAPSHOT, snapshot_id)?;
                (512, None, Some(snapshot_id.clone()))
            }
        };
        decode(s.create(
            DISK,
            &body.name,
            &body.description,
            json!({
                "project_id": project_id,
                "size": body.size,
                "block_size": block_size,
                "image_id": image_id,
                "snapshot_id": snapshot_id,
                "device_path": format!("/mnt/{}", body.name),
                "state": {"state": "detached"},
            }),
        ))
    }

    async fn disk_view(&self, disk: &str, project: Option<&str>) -> Result<Disk> {
        let s = self.begin("disk_view").await?;
        let project_id = project.map(|p| s.resolve(PROJECT, p)).transpose()?;
        decode(s.find_in(DISK, disk, "project_id", project_id.as_deref())?)
    }

    async fn disk_delete(&self, disk: &str) -> Result<()> {
        let mut s = self.begin("disk_delete").await?;
        let found = s.find(DISK, disk)?;
        if str_field(&found["state"], "state") != "detached" {
            return Err(bad_request("disk cannot be deleted while attached"));
        }
        s.remove(DISK, str_field(&found, "id"))?;
        Ok(())
    }

    async fn image_create(&self, project: &str, body: &ImageCreate) -> Result<Image> {
        let mut s = self.begin("image_create").await?;
        let project_id = s.resolve(PROJECT, project)?;
        let ImageSource::Snapshot { id } = &body.source;
        let snapshot = s.find(SNAPSHOT, id)?;
        let digest = format!("{:064x}", s.next_sequence());
        decode(s.create(
            IMAGE,
            &body.name,
            &body.description,
            json!({
                "project_id": project_id,
                "os": body.os,
                "version": body.version,
                "digest": {"type": "sha256", "value": digest},
                "block_size": 512,
                "size": snapshot["size"],
            }),
        ))
    }

    async fn image_view(&self, image: &str) -> Result<Image> {
        let s = self.begin("image_view").await?;
        decode(s.find(IMAGE, image)?)
    }

    async fn image_delete(&self, image: &str) -> Result<()> {
        let mut s = self.begin("image_delete").await?;
        s.remove(IMAGE, image)?;
        Ok(())
    }

    async fn snapshot_create(&self, project: &str, body: &SnapshotCreate) -> Result<Snapshot> {
        let mut s = self.begin("snapshot_create").await?;
        let project_id = s.resolve(PROJECT, project)?;
        let disk = s.find_in(DISK, &body.disk, "project_id", Some(&project_id))?;
        decode(s.create(
            SNAPSHOT,
            &body.name,
            &body.description,
            json!({
                "project_id": project_id,
                "disk_id": disk["id"],
                "state": "ready",
                "size": disk["size"],
            }),
        ))
    }

    async fn snapshot_view(&self, snapshot: &str) -> Result<Snapshot> {
        let s = self.begin("snapshot_view").await?;
        decode(s.find(SNAPSHOT, snapshot)?)
    }

    async fn snapshot_delete(&self, snapshot: &str) -> Result<()> {
        let mut s = self.begin("snapshot_delete").await?;
        s.remove(SNAPSHOT, snapshot)?;
        Ok(())
    }

    // ============ Instances ============

    async fn instance_create(&self, project: &str, body: &InstanceCreate) -> Result<Instance> {
        let mut s = self.begin("instance_create").await?;
        let project_id = s.resolve(PROJECT, project)?;
        let instance = s.create(
            INSTANCE,
            &body.name,
            &body.description,
            json!({
                "project_id": project_id,
                "hostname": body.hostname,
                "memory": body.memory,
                "ncpus": body.ncpus,
                "run_state": if body.start { "running" } else { "stopped" },
                "auto_restart_policy": body.auto_restart_policy,
                "boot_disk_id": null,
            }),
        );
        let instance_id = str_field(&instance, "id").to_string();

        if let Some(InstanceDiskAttachment::Attach { name }) = &body.boot_disk {
            let disk = s.attach_disk(&instance_id, name, &project_id)?;
            s.update(INSTANCE, &instance_id, json!({"boot_disk_id": disk["id"]}))?;
        }
        for InstanceDiskAttachment::Attach { name } in &body.disks {
            s.attach_disk(&instance_id, name, &project_id)?;
        }

        let current = s.instance(&instance_id)?;
        match &body.network_interfaces {
            InstanceNetworkInterfaceAttachment::Create(nics) => {
                for nic in nics {
                    s.create_nic(&current, nic)?;
                }
            }
            InstanceNetworkInterfaceAttachment::Default => {
                let nic = InstanceNetworkInterfaceCreate {
                    name: "net0".to_string(),
                    description: "default primary interface".to_string(),
                    subnet_name: "default".to_string(),
                    vpc_name: "default".to_string(),
                    ip_config: PrivateIpStackCreate::V4 {
                        ip: Ipv4Assignment::Auto,
                    },
                };
                s.create_nic(&current, &nic)?;
            }
            InstanceNetworkInterfaceAttachment::None => {}
        }

        for external_ip in &body.external_ips {
            match external_ip {
                ExternalIpCreate::Ephemeral { pool_selector } => {
                    let pool_id = s.pool_id(pool_selector)?;
                    let ip = s.allocate_ip();
                    s.insert(
                        EPHEMERAL_IP,
                        json!({"kind": "ephemeral", "ip": ip, "ip_pool_id": pool_id, "instance_id": instance_id}),
                    );
                }
                ExternalIpCreate::Floating { floating_ip } => {
                    s.attach_floating_ip(floating_ip, &instance_id)?;
                }
            }
        }

        for key in body.ssh_public_keys.iter().flatten() {
            let key_id = s.resolve(SSH_KEY, key)?;
            s.insert(
                INSTANCE_SSH_KEY,
                json!({"instance_id": instance_id, "key_id": key_id}),
            );
        }

        for group in &body.anti_affinity_groups {
            s.add_anti_affinity_member(group, &instance_id)?;
        }

        decode(s.instance(&instance_id)?)
    }

    async fn instance_view(&self, instance: &str) -> Result<Instance> {
        let s = self.begin("instance_view").await?;
        decode(s.instance(instance)?)
    }

    async fn instance_update(&self, instance: &str, body: &InstanceUpdate) -> Result<Instance> {
        let mut s = self.begin("instance_update").await?;
        let current = s.instance(instance)?;
        s.require_stopped(&current)?;
        let instance_id = str_field(&current, "id").to_string();
        let boot_disk_id = match &body.boot_disk {
            Some(disk) => {
                let disk = s.find(DISK, disk)?;
                if disk["state"]["instance"] != json!(instance_id) {
                    return Err(bad_request("boot disk must be attached to the instance"));
                }
                Some(str_field(&disk, "id").to_string())
            }
            None => None,
        };
        decode(s.update(
            INSTANCE,
            &instance_id,
            json!({
                "memory": body.memory,
                "ncpus": body.ncpus,
                "auto_restart_policy": body.auto_restart_policy,
                "boot_disk_id": boot_disk_id,
            }),
        )?)
    }

    async fn instance_delete(&self, instance: &str) -> Result<()> {
        let mut s = self.begin("instance_delete").await?;
        let current = s.instance(instance)?;
        s.require_stopped(&current)?;
        let id = str_field(&current, "id").to_string();
        s.remove_by(INSTANCE, |i| str_field(i, "id") == id);
        s.remove_by(NIC, |n| str_field(n, "instance_id") == id);
        s.remove_by(EPHEMERAL_IP, |e| str_field(e, "instance_id") == id);
        s.remove_by(INSTANCE_SSH_KEY, |k| str_field(k, "instance_id") == id);
        s.remove_by(ANTI_AFFINITY_MEMBER, |m| str_field(m, "instance_id") == id);
        for disk in s.filter(DISK, |d| d["state"]["instance"] == json!(id)) {
            s.update(DISK, str_field(&disk, "id"), json!({"state": {"state": "detached"}}))?;
        }
        for ip in s.filter(FLOATING_IP, |f| f["instance_id"] == json!(id)) {
            s.update(FLOATING_IP, str_field(&ip, "id"), json!({"instance_id": null}))?;
        }
        Ok(())
    }

    async fn instance_start(&self, instance: &str) -> Result<Instance> {
        let mut s = self.begin("instance_start").await?;
        decode(s.update(INSTANCE, instance, json!({"run_state": "running"}))?)
    }

    async fn instance_stop(&self, instance: &str) -> Result<Instance> {
        let mut s = self.begin("instance_stop").await?;
        decode(s.update(INSTANCE, instance, json!({"run_state": "stopped"}))?)
    }

    async fn instance_disk_list(&self, instance: &str) -> Result<Vec<Disk>> {
        let s = self.begin("instance_disk_list").await?;
        let id = str_field(&s.instance(instance)?, "id").to_string();
        decode(json!(s.filter(DISK, |d| d["state"]["instance"] == json!(id))))
    }

    async fn instance_disk_attach(&self, instance: &str, disk: &str) -> Result<Disk> {
        let mut s = self.begin("instance_disk_attach").await?;
        let current = s.instance(instance)?;
        s.require_stopped(&current)?;
        let project_id = str_field(&current, "project_id").to_string();
        decode(s.attach_disk(str_field(&current, "id"), disk, &project_id)?)
    }

    async fn instance_disk_detach(&self, instance: &str, disk: &str) -> Result<Disk> {
        let mut s = self.begin("instance_disk_detach").await?;
        let current = s.instance(instance)?;
        s.require_stopped(&current)?;
        let found = s.find(DISK, disk)?;
        if found["state"]["instance"] != current["id"] {
            return Err(bad_request("disk is not attached to the instance"));
        }
        if current["boot_disk_id"] == found["id"] {
            return Err(bad_request("boot disk cannot be detached"));
        }
        decode(s.update(
            DISK,
            str_field(&found, "id"),
            json!({"state": {"state": "detached"}}),
        )?)
    }

    async fn instance_external_ip_list(&self, instance: &str) -> Result<Vec<ExternalIp>> {
        let s = self.begin("instance_external_ip_list").await?;
        let id = str_field(&s.instance(instance)?, "id").to_string();
        let mut ips = s.filter(EPHEMERAL_IP, |e| str_field(e, "instance_id") == id);
        for floating in s.filter(FLOATING_IP, |f| f["instance_id"] == json!(id)) {
            ips.push(json!({
                "kind": "floating",
                "ip": floating["ip"],
                "ip_pool_id": floating["ip_pool_id"],
                "id": floating["id"],
                "instance_id": id,
            }));
        }
        decode(json!(ips))
    }

    async fn instance_ephemeral_ip_attach(
        &self,
        instance: &str,
        body: &EphemeralIpCreate,
    ) -> Result<ExternalIp> {
        let mut s = self.begin("instance_ephemeral_ip_attach").await?;
        let id = str_field(&s.instance(instance)?, "id").to_string();
        let pool_id = s.pool_id(&body.pool_selector)?;
        let ip = s.allocate_ip();
        decode(s.insert(
            EPHEMERAL_IP,
            json!({"kind": "ephemeral", "ip": ip, "ip_pool_id": pool_id, "instance_id": id}),
        ))
    }

    async fn instance_ephemeral_ip_detach(
        &self,
        instance: &str,
        ip_version: Option<IpVersion>,
    ) -> Result<()> {
        let mut s = self.begin("instance_ephemeral_ip_detach").await?;
        let id = str_field(&s.instance(instance)?, "id").to_string();
        let removed = s.remove_by(EPHEMERAL_IP, |e| {
            let v6 = str_field(e, "ip").contains(':');
            str_field(e, "instance_id") == id
                && match ip_version {
                    Some(IpVersion::V4) => !v6,
                    Some(IpVersion::V6) => v6,
                    None => true,
                }
        });
        if removed.is_empty() {
            return Err(ApiError::NotFound("ephemeral IP".to_string()));
        }
        Ok(())
    }

    async fn instance_network_interface_list(
        &self,
        instance: &str,
    ) -> Result<Vec<InstanceNetworkInterface>> {
        let s = self.begin("instance_network_interface_list").await?;
        let id = str_field(&s.instance(instance)?, "id").to_string();
        decode(json!(s.filter(NIC, |n| str_field(n, "instance_id") == id)))
    }

    async fn instance_network_interface_create(
        &self,
        instance: &str,
        body: &InstanceNetworkInterfaceCreate,
    ) -> Result<InstanceNetworkInterface> {
        let mut s = self.begin("instance_network_interface_create").await?;
        let current = s.instance(instance)?;
        s.require_stopped(&current)?;
        decode(s.create_nic(&current, body)?)
    }

    async fn instance_network_interface_delete(&self, interface: &str) -> Result<()> {
        let mut s = self.begin("instance_network_interface_delete").await?;
        let nic = s.find(NIC, interface)?;
        let current = s.instance(str_field(&nic, "instance_id"))?;
        s.require_stopped(&current)?;
        let instance_id = str_field(&current, "id").to_string();
        let others = s
            .all(NIC)
            .filter(|n| str_field(n, "instance_id") == instance_id && n["id"] != nic["id"])
            .count();
        if nic["primary"] == json!(true) && others > 0 {
            return Err(bad_request(
                "The primary interface may not be deleted while secondary interfaces are attached",
            ));
        }
        s.remove(NIC, str_field(&nic, "id"))?;
        Ok(())
    }

    async fn instance_anti_affinity_group_list(
        &self,
        instance: &str,
    ) -> Result<Vec<AntiAffinityGroup>> {
        let s = self.begin("instance_anti_affinity_group_list").await?;
        let id = str_field(&s.instance(instance)?, "id").to_string();
        let mut groups = Vec::new();
        for member in s.filter(ANTI_AFFINITY_MEMBER, |m| str_field(m, "instance_id") == id) {
            groups.push(s.find(ANTI_AFFINITY_GROUP, str_field(&member, "group_id"))?);
        }
        decode(json!(groups))
    }

    async fn instance_ssh_public_key_list(&self, instance: &str) -> Result<Vec<SshKey>> {
        let s = self.begin("instance_ssh_public_key_list").await?;
        let id = str_field(&s.instance(instance)?, "id").to_string();
        let mut keys = Vec::new();
        for link in s.filter(INSTANCE_SSH_KEY, |k| str_field(k, "instance_id") == id) {
            keys.push(s.find(SSH_KEY, str_field(&link, "key_id"))?);
        }
        decode(json!(keys))
    }

    // ============ Addresses ============

    async fn floating_ip_create(
        &self,
        project: &str,
        body: &FloatingIpCreate,
    ) -> Result<FloatingIp> {
        let mut s = self.begin("floating_ip_create").await?;
        let project_id = s.resolve(PROJECT, project)?;
        let (ip, pool_id) = match &body.address_allocator {
            AddressAllocator::Explicit { ip, pool } => {
                let pool_id = match pool {
                    Some(pool) => s.resolve(IP_POOL, pool)?,
                    None => DEFAULT_IP_POOL_ID.to_string(),
                };
                (ip.clone(), pool_id)
            }
            AddressAllocator::Auto { pool_selector } => {
                let pool_id = s.pool_id(pool_selector)?;
                let ip = match pool_selector {
                    PoolSelector::Auto {
                        ip_version: Some(IpVersion::V6),
                    } => format!("fd00:99::{:x}", s.next_sequence()),
                    _ => s.allocate_ip(),
                };
                (ip, pool_id)
            }
        };
        decode(s.create(
            FLOATING_IP,
            &body.name,
            &body.description,
            json!({
                "ip": ip,
                "ip_pool_id": pool_id,
                "project_id": project_id,
                "instance_id": null,
            }),
        ))
    }

    async fn floating_ip_view(&self, floating_ip: &str) -> Result<FloatingIp> {
        let s = self.begin("floating_ip_view").await?;
        decode(s.find(FLOATING_IP, floating_ip)?)
    }

    async fn floating_ip_update(
        &self,
        floating_ip: &str,
        body: &NameDescription,
    ) -> Result<FloatingIp> {
        let mut s = self.begin("floating_ip_update").await?;
        decode(s.update(FLOATING_IP, floating_ip, to_value(body)?)?)
    }

    async fn floating_ip_delete(&self, floating_ip: &str) -> Result<()> {
        let mut s = self.begin("floating_ip_delete").await?;
        let found = s.find(FLOATING_IP, floating_ip)?;
        if !found["instance_id"].is_null() {
            return Err(bad_request("floating IP cannot be deleted while attached"));
        }
        s.remove(FLOATING_IP, str_field(&found, "id"))?;
        Ok(())
    }

    async fn floating_ip_attach(
        &self,
        floating_ip: &str,
        body: &FloatingIpAttach,
    ) -> Result<FloatingIp> {
        let mut s = self.begin("floating_ip_attach").await?;
        let instance_id = str_field(&s.instance(&body.parent)?, "id").to_string();
        decode(s.attach_floating_ip(floating_ip, &instance_id)?)
    }

    async fn floating_ip_detach(&self, floating_ip: &str) -> Result<FloatingIp> {
        let mut s = self.begin("floating_ip_detach").await?;
        decode(s.update(FLOATING_IP, floating_ip, json!({"instance_id": null}))?)
    }

    async fn external_subnet_create(
        &self,
        project: &str,
        body: &ExternalSubnetCreate,
    ) -> Result<ExternalSubnet> {
        let mut s = self.begin("external_subnet_create").await?;
        let project_id = s.resolve(PROJECT, project)?;
        let (subnet, pool_id) = match &body.allocator {
            ExternalSubnetAllocator::Explicit { subnet } => {
                (subnet.clone(), DEFAULT_SUBNET_POOL_ID.to_string())
            }
            ExternalSubnetAllocator::Auto {
                prefix_len,
                pool_selector,
            } => {
                let pool_id = match pool_selector {
                    PoolSelector::Explicit { pool } => s.resolve(SUBNET_POOL, pool)?,
                    PoolSelector::Auto { .. } => DEFAULT_SUBNET_POOL_ID.to_string(),
                };
                let n = s.next_sequence();
                (format!("198.18.{}.0/{}", n % 250, prefix_len), pool_id)
            }
        };
        let member_id = s
            .all(SUBNET_POOL_MEMBER)
            .find(|m| str_field(m, "subnet_pool_id") == pool_id)
            .map(|m| str_field(m, "id").to_string())
            .unwrap_or_else(|| "00000000-0000-4000-8000-00000000f003".to_string());
        decode(s.create(
            EXTERNAL_SUBNET,
            &body.name,
            &body.description,
            json!({
                "project_id": project_id,
                "subnet": subnet,
                "subnet_pool_id": pool_id,
                "subnet_pool_member_id": member_id,
                "instance_id": null,
            }),
        ))
    }

    async fn external_subnet_view(&self, subnet: &str) -> Result<ExternalSubnet> {
        let s = self.begin("external_subnet_view").await?;
        decode(s.find(EXTERNAL_SUBNET, subnet)?)
    }

    async fn external_subnet_update(
        &self,
        subnet: &str,
        body: &NameDescription,
    ) -> Result<ExternalSubnet> {
        let mut s = self.begin("external_subnet_update").await?;
        decode(s.update(EXTERNAL_SUBNET, subnet, to_value(body)?)?)
    }

    async fn external_subnet_delete(&self, subnet: &str) -> Result<()> {
        let mut s = self.begin("external_subnet_delete").await?;
        s.remove(EXTERNAL_SUBNET, subnet)?;
        Ok(())
    }

    async fn external_subnet_attach(
        &self,
        subnet: &str,
        body: &ExternalSubnetAttach,
    ) -> Result<ExternalSubnet> {
        let mut s = self.begin("external_subnet_attach").await?;
        let instance_id = str_field(&s.instance(&body.instance)?, "id").to_string();
        let found = s.find(EXTERNAL_SUBNET, subnet)?;
        if !found["instance_id"].is_null() {
            return Err(bad_request("external subnet is already attached"));
        }
        decode(s.update(
            EXTERNAL_SUBNET,
            str_field(&found, "id"),
            json!({ "instance_id": instance_id }),
        )?)
    }

    async fn external_subnet_detach(&self, subnet: &str) -> Result<ExternalSubnet> {
        let mut s = self.begin("external_subnet_detach").await?;
        decode(s.update(EXTERNAL_SUBNET, subnet, json!({"instance_id": null}))?)
    }

    // ============ Affinity ============

    async fn anti_affinity_group_create(
        &self,
        project: &str,
        body: &AntiAffinityGroupCreate,
    ) -> Result<AntiAffinityGroup> {
        let mut s = self.begin("anti_affinity_group_create").await?;
        let project_id = s.resolve(PROJECT, project)?;
        decode(s.create(
            ANTI_AFFINITY_GROUP,
            &body.name,
            &body.description,
            json!({
                "project_id": project_id,
                "policy": body.policy,
                "failure_domain": body.failure_domain,
            }),
        ))
    }

    async fn anti_affinity_group_view(&self, group: &str) -> Result<AntiAffinityGroup> {
        let s = self.begin("anti_affinity_group_view").await?;
        decode(s.find(ANTI_AFFINITY_GROUP, group)?)
    }

    async fn anti_affinity_group_update(
        &self,
        group: &str,
        body: &NameDescription,
    ) -> Result<AntiAffinityGroup> {
        let mut s = self.begin("anti_affinity_group_update").await?;
        decode(s.update(ANTI_AFFINITY_GROUP, group, to_value(body)?)?)
    }

    async fn anti_affinity_group_delete(&self, group: &str) -> Result<()> {
        let mut s = self.begin("anti_affinity_group_delete").await?;
        let removed = s.remove(ANTI_AFFINITY_GROUP, group)?;
        let id = str_field(&removed, "id").to_string();
        s.remove_by(ANTI_AFFINITY_MEMBER, |m| str_field(m, "group_id") == id);
        Ok(())
    }

    async fn anti_affinity_group_member_instance_add(
        &self,
        group: &str,
        instance: &str,
    ) -> Result<()> {
        let mut s = self.begin("anti_affinity_group_member_instance_add").await?;
        let instance_id = str_field(&s.instance(instance)?, "id").to_string();
        s.add_anti_affinity_member(group, &instance_id)
    }

    async fn anti_affinity_group_member_instance_delete(
        &self,
        group: &str,
        instance: &str,
    ) -> Result<()> {
        let mut s = self
            .begin("anti_affinity_group_member_instance_delete")
            .await?;
        let group_id = s.resolve(ANTI_AFFINITY_GROUP, group)?;
        let instance_id = str_field(&s.instance(instance)?, "id").to_string();
        let removed = s.remove_by(ANTI_AFFINITY_MEMBER, |m| {
            str_field(m, "group_id") == group_id && str_field(m, "instance_id") == instance_id
        });
        if removed.is_empty() {
            return Err(ApiError::NotFound("anti-affinity group member".to_string()));
        }
        Ok(())
    }

    // ============ SSH keys ============

    async fn current_user_ssh_key_create(&self, body: &SshKeyCreate) -> Result<SshKey> {
        let mut s = self.begin("current_user_ssh_key_create").await?;
        decode(s.create(
            SSH_KEY,
            &body.name,
            &body.description,
            json!({"public_key": body.public_key, "silo_user_id": SILO_USER_ID}),
        ))
    }

    async fn current_user_ssh_key_view(&self, key: &str) -> Result<SshKey> {
        let s = self.begin("current_user_ssh_key_view").await?;
        decode(s.find(SSH_KEY, key)?)
    }

    async fn current_user_ssh_key_delete(&self, key: &str) -> Result<()> {
        let mut s = self.begin("current_user_ssh_key_delete").await?;
        let removed = s.remove(SSH_KEY, key)?;
        let id = str_field(&removed, "id").to_string();
        s.remove_by(INSTANCE_SSH_KEY, |k| str_field(k, "key_id") == id);
        Ok(())
    }

    // ============ System networking ============

    async fn networking_address_lot_create(
        &self,
        body: &AddressLotCreate,
    ) -> Result<AddressLotWithBlocks> {
        let mut s = self.begin("networking_address_lot_create").await?;
        let blocks: Vec<Value> = body
            .blocks
            .iter()
            .map(|b| {
                json!({
                    "id": uuid::Uuid::new_v4().to_string(),
                    "first_address": b.first_address,
                    "last_address": b.last_address,
                })
            })
            .collect();
        let lot = s.create(
            ADDRESS_LOT,
            &body.name,
            &body.description,
            json!({"kind": body.kind, "blocks": blocks}),
        );
        decode(json!({"lot": lot, "blocks": blocks}))
    }

    async fn networking_address_lot_view(&self, lot: &str) -> Result<AddressLotWithBlocks> {
        let s = self.begin("networking_address_lot_view").await?;
        let mut lot = s.find(ADDRESS_LOT, lot)?;
        let blocks = lot
            .as_object_mut()
            .and_then(|o| o.remove("blocks"))
            .unwrap_or_else(|| json!([]));
        decode(json!({"lot": lot, "blocks": blocks}))
    }

    async fn networking_address_lot_delete(&self, lot: &str) -> Result<()> {
        let mut s = self.begin("networking_address_lot_delete").await?;
        s.remove(ADDRESS_LOT, lot)?;
        Ok(())
    }

    async fn networking_switch_port_settings_create(
        &self,
        body: &SwitchPortSettingsCreate,
    ) -> Result<SwitchPortSettings> {
        let mut s = self.begin("networking_switch_port_settings_create").await?;
        let view = s.switch_port_settings_view(body)?;
        let existing = s
            .all(SWITCH_PORT_SETTINGS)
            .find(|p| str_field(p, "name") == body.name)
            .cloned();
        let settings = match existing {
            Some(existing) => {
                let mut patch = view;
                merge(&mut patch, json!({"description": body.description}));
                s.update(SWITCH_PORT_SETTINGS, str_field(&existing, "id"), patch)?
            }
            None => s.create(SWITCH_PORT_SETTINGS, &body.name, &body.description, view),
        };
        decode(settings)
    }

    async fn networking_switch_port_settings_view(
        &self,
        port: &str,
    ) -> Result<SwitchPortSettings> {
        let s = self.begin("networking_switch_port_settings_view").await?;
        decode(s.find(SWITCH_PORT_SETTINGS, port)?)
    }

    async fn networking_switch_port_settings_delete(&self, port: &str) -> Result<()> {
        let mut s = self.begin("networking_switch_port_settings_delete").await?;
        s.remove(SWITCH_PORT_SETTINGS, port)?;
        Ok(())
    }

    // ============ Lookups ============

    async fn project_list(&self) -> Result<Vec<Project>> {
        let s = self.begin("project_list").await?;
        s.all(PROJECT).cloned().map(decode).collect()
    }

    async fn image_list(&self, project: Option<&str>) -> Result<Vec<Image>> {
        let s = self.begin("image_list").await?;
        let project_id = project.map(|p| s.resolve(PROJECT, p)).transpose()?;
        s.filter(IMAGE, |i| match &project_id {
            Some(id) => str_field(i, "project_id") == id,
            None => i["project_id"].is_null(),
        })
        .into_iter()
        .map(decode)
        .collect()
    }

    async fn image_lookup(&self, image: &str, project: Option<&str>) -> Result<Image> {
        let s = self.begin("image_lookup").await?;
        let project_id = project.map(|p| s.resolve(PROJECT, p)).transpose()?;
        decode(s.find_in(IMAGE, image, "project_id", project_id.as_deref())?)
    }

    async fn system_ip_pool_list(&self) -> Result<Vec<IpPool>> {
        let s = self.begin("system_ip_pool_list").await?;
        s.all(IP_POOL).cloned().map(decode).collect()
    }

    async fn project_ip_pool_view(&self, pool: &str) -> Result<SiloIpPool> {
        let s = self.begin("project_ip_pool_view").await?;
        let mut pool = s.find(IP_POOL, pool)?;
        let id = str_field(&pool, "id").to_string();
        let is_default = s
            .all(IP_POOL_SILO)
            .any(|l| str_field(l, "ip_pool_id") == id && l["is_default"] == json!(true));
        merge(&mut pool, json!({ "is_default": is_default }));
        decode(pool)
    }

    async fn networking_address_lot_list(&self) -> Result<Vec<AddressLot>> {
        let s = self.begin("networking_address_lot_list").await?;
        s.all(ADDRESS_LOT).cloned().map(decode).collect()
    }

    async fn vpc_subnet_lookup(
        &self,
        subnet: &str,
        vpc: &str,
        project: &str,
    ) -> Result<VpcSubnet> {
        let s = self.begin("vpc_subnet_lookup").await?;
        let vpc_id = s.scoped_vpc(vpc, project)?;
        decode(s.find_in(VPC_SUBNET, subnet, "vpc_id", Some(&vpc_id))?)
    }

    async fn vpc_router_lookup(
        &self,
        router: &str,
        vpc: &str,
        project: &str,
    ) -> Result<VpcRouter> {
        let s = self.begin("vpc_router_lookup").await?;
        let vpc_id = s.scoped_vpc(vpc, project)?;
        decode(s.find_in(VPC_ROUTER, router, "vpc_id", Some(&vpc_id))?)
    }

    async fn vpc_router_route_lookup(
        &self,
        route: &str,
        router: &str,
        vpc: &str,
        project: &str,
    ) -> Result<RouterRoute> {
        let s = self.begin("vpc_router_route_lookup").await?;
        let vpc_id = s.scoped_vpc(vpc, project)?;
        let router = s.find_in(VPC_ROUTER, router, "vpc_id", Some(&vpc_id))?;
        decode(s.find_in(
            ROUTER_ROUTE,
            route,
            "vpc_router_id",
            Some(str_field(&router, "id")),
        )?)
    }

    async fn internet_gateway_lookup(
        &self,
        gateway: &str,
        vpc: &str,
        project: &str,
    ) -> Result<InternetGateway> {
        let s = self.begin("internet_gateway_lookup").await?;
        let vpc_id = s.scoped_vpc(vpc, project)?;
        decode(s.find_in(INTERNET_GATEWAY, gateway, "vpc_id", Some(&vpc_id))?)
    }

    async fn floating_ip_lookup(&self, floating_ip: &str, project: &str) -> Result<FloatingIp> {
        let s = self.begin("floating_ip_lookup").await?;
        let project_id = s.resolve(PROJECT, project)?;
        decode(s.find_in(FLOATING_IP, floating_ip, "project_id", Some(&project_id))?)
    }

    async fn anti_affinity_group_lookup(
        &self,
        group: &str,
        project: &str,
    ) -> Result<AntiAffinityGroup> {
        let s = self.begin("anti_affinity_group_lookup").await?;
        let project_id = s.resolve(PROJECT, project)?;
        decode(s.find_in(
            ANTI_AFFINITY_GROUP,
            group,
            "project_id",
            Some(&project_id),
        )?)
    }
}
