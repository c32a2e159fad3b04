//! `oxide_instance`
//!
//! Every update runs against a stopped instance. The instance is stopped,
//! its attachments are converged in a fixed order, and it is started
//! again:
//!
//! 1. attach new disks (a new boot disk must be attached before it is set)
//! 2. primary update, when memory, ncpus, restart policy or boot disk moved
//! 3. detach removed disks
//! 4. detach removed external IPs, freeing the interfaces they use
//! 5. delete removed interfaces, secondaries before the primary
//! 6. create added interfaces
//! 7. attach added external IPs
//! 8. add, then remove, anti-affinity memberships

use super::{Client, Stamps, deleted, found, non_empty};
use async_trait::async_trait;
use oxide_api::{
    ApiError, EphemeralIpCreate, ExternalIp, ExternalIpCreate, FloatingIpAttach, Instance,
    InstanceCreate, InstanceDiskAttachment, InstanceNetworkInterface,
    InstanceNetworkInterfaceAttachment, InstanceNetworkInterfaceCreate, InstanceState,
    InstanceUpdate, IpVersion, Ipv4Assignment, PoolSelector, PrivateIpStackCreate, is_not_found,
};
use oxide_engine::resource::{decode, encode};
use oxide_engine::sequencer::{self, CollectionChanges, CompositeOps, StepFailure, StepKind};
use oxide_engine::{
    AttrPath, Attribute, AttributeType, DeleteOutcome, EngineError, Phase, ReadOutcome, Resource,
    Result, Schema, Validator, rfc3339, slice_diff_by,
};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::net::{Ipv4Addr, Ipv6Addr};
use std::time::Duration;

const POLL_INTERVAL: Duration = Duration::from_secs(1);

/// States an instance passes through on its way to `stopped`
const PENDING: [InstanceState; 7] = [
    InstanceState::Creating,
    InstanceState::Starting,
    InstanceState::Running,
    InstanceState::Stopping,
    InstanceState::Rebooting,
    InstanceState::Migrating,
    InstanceState::Repairing,
];

pub struct InstanceResource {
    client: Client,
}

impl InstanceResource {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
struct InstanceModel {
    #[serde(flatten)]
    stamps: Stamps,
    project_id: String,
    name: String,
    description: String,
    host_name: Option<String>,
    memory: i64,
    ncpus: i64,
    auto_restart_policy: Option<String>,
    boot_disk_id: Option<String>,
    start_on_create: Option<bool>,
    disk_attachments: Option<Vec<String>>,
    anti_affinity_groups: Option<Vec<String>>,
    ssh_public_keys: Option<Vec<String>>,
    network_interfaces: Option<Vec<NicModel>>,
    external_ips: Option<ExternalIpsModel>,
    user_data: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
struct NicModel {
    name: String,
    description: String,
    subnet_id: String,
    vpc_id: String,
    ip_address: Option<String>,
    id: Option<String>,
    mac_address: Option<String>,
    primary: Option<bool>,
    time_created: Option<String>,
    time_modified: Option<String>,
}

impl NicModel {
    /// Interfaces cannot be modified, so two entries describe the same
    /// interface only when every configurable field agrees. An address
    /// left to the server matches whatever it assigned.
    fn same_interface(&self, other: &NicModel) -> bool {
        self.name == other.name
            && self.description == other.description
            && self.subnet_id == other.subnet_id
            && self.vpc_id == other.vpc_id
            && match (&self.ip_address, &other.ip_address) {
                (Some(a), Some(b)) => a == b,
                _ => true,
            }
    }

    fn ip_config(&self) -> PrivateIpStackCreate {
        let ip = match &self.ip_address {
            Some(value) if !value.is_empty() => Ipv4Assignment::Explicit {
                value: value.clone(),
            },
            _ => Ipv4Assignment::Auto,
        };
        PrivateIpStackCreate::V4 { ip }
    }
}

impl From<&InstanceNetworkInterface> for NicModel {
    fn from(nic: &InstanceNetworkInterface) -> Self {
        Self {
            name: nic.identity.name.clone(),
            description: nic.identity.description.clone(),
            subnet_id: nic.subnet_id.clone(),
            vpc_id: nic.vpc_id.clone(),
            ip_address: Some(nic.ipv4().unwrap_or_default().to_string()),
            id: Some(nic.identity.id.clone()),
            mac_address: Some(nic.mac.clone()),
            primary: Some(nic.primary),
            time_created: Some(rfc3339(&nic.identity.time_created)),
            time_modified: Some(rfc3339(&nic.identity.time_modified)),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
struct ExternalIpsModel {
    ephemeral: Option<Vec<EphemeralIpModel>>,
    floating: Option<Vec<FloatingIpRef>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
struct EphemeralIpModel {
    pool_id: Option<String>,
    ip_version: Option<String>,
}

impl EphemeralIpModel {
    /// Fields the server filled in match anything left unset.
    fn same_address(&self, other: &EphemeralIpModel) -> bool {
        let agree = |a: &Option<String>, b: &Option<String>| match (a, b) {
            (Some(a), Some(b)) => a == b,
            _ => true,
        };
        agree(&self.pool_id, &other.pool_id) && agree(&self.ip_version, &other.ip_version)
    }

    fn pool_selector(&self) -> PoolSelector {
        match &self.pool_id {
            Some(pool) if !pool.is_empty() => PoolSelector::Explicit { pool: pool.clone() },
            _ => PoolSelector::Auto {
                ip_version: self.ip_version.as_deref().and_then(IpVersion::parse),
            },
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
struct FloatingIpRef {
    id: String,
}

/// External IP entry of the flat version 0 layout
#[derive(Debug, Deserialize)]
struct LegacyExternalIp {
    #[serde(default)]
    id: Option<String>,
    #[serde(rename = "type")]
    kind: String,
}

impl ExternalIpsModel {
    /// Split the flat layout by kind. An empty list has no block at all.
    fn from_legacy(ips: Vec<LegacyExternalIp>) -> Option<Self> {
        if ips.is_empty() {
            return None;
        }
        let mut model = Self::default();
        for ip in ips {
            let id = ip.id.filter(|id| !id.is_empty());
            match ip.kind.as_str() {
                "ephemeral" => model.ephemeral.get_or_insert_with(Vec::new).push(EphemeralIpModel {
                    pool_id: id,
                    ip_version: None,
                }),
                "floating" => model.floating.get_or_insert_with(Vec::new).push(FloatingIpRef {
                    id: id.unwrap_or_default(),
                }),
                other => tracing::debug!("dropping external IP of kind {} on upgrade", other),
            }
        }
        Some(model)
    }

    fn ephemeral(&self) -> &[EphemeralIpModel] {
        self.ephemeral.as_deref().unwrap_or_default()
    }

    fn floating(&self) -> &[FloatingIpRef] {
        self.floating.as_deref().unwrap_or_default()
    }

    fn to_create(&self) -> Vec<ExternalIpCreate> {
        let ephemeral = self.ephemeral().iter().map(|ip| ExternalIpCreate::Ephemeral {
            pool_selector: ip.pool_selector(),
        });
        let floating = self.floating().iter().map(|ip| ExternalIpCreate::Floating {
            floating_ip: ip.id.clone(),
        });
        ephemeral.chain(floating).collect()
    }

    fn observe(ips: &[ExternalIp]) -> Result<Option<Self>> {
        let mut ephemeral = Vec::new();
        let mut floating = Vec::new();
        for ip in ips {
            match ip.kind.as_str() {
                "ephemeral" => ephemeral.push(EphemeralIpModel {
                    pool_id: Some(ip.ip_pool_id.clone()),
                    ip_version: ip_version_of(&ip.ip).map(|v| v.as_str().to_string()),
                }),
                "floating" => floating.push(FloatingIpRef {
                    id: ip.id.clone().unwrap_or_default(),
                }),
                "snat" => continue,
                other => {
                    return Err(EngineError::internal(
                        "Invalid external IP kind:",
                        format!("Encountered unexpected external IP kind: {}", other),
                    ));
                }
            }
        }
        if ephemeral.is_empty() && floating.is_empty() {
            return Ok(None);
        }
        Ok(Some(Self {
            ephemeral: non_empty(ephemeral),
            floating: non_empty(floating),
        }))
    }
}

fn ip_version_of(ip: &str) -> Option<IpVersion> {
    if ip.parse::<Ipv4Addr>().is_ok() {
        Some(IpVersion::V4)
    } else if ip.parse::<Ipv6Addr>().is_ok() {
        Some(IpVersion::V6)
    } else {
        None
    }
}

impl InstanceModel {
    fn disks(&self) -> &[String] {
        self.disk_attachments.as_deref().unwrap_or_default()
    }

    fn groups(&self) -> &[String] {
        self.anti_affinity_groups.as_deref().unwrap_or_default()
    }

    fn nics(&self) -> &[NicModel] {
        self.network_interfaces.as_deref().unwrap_or_default()
    }

    fn external_ips(&self) -> ExternalIpsModel {
        self.external_ips.clone().unwrap_or_default()
    }

    fn check_boot_disk(&self) -> Result<()> {
        match &self.boot_disk_id {
            Some(boot) if !self.disks().contains(boot) => Err(EngineError::config(
                "Error creating instance",
                "Boot disk ID should be part of `disk_attachments`",
            )),
            _ => Ok(()),
        }
    }

    fn primary_changed(&self, prior: &InstanceModel) -> bool {
        self.memory != prior.memory
            || self.ncpus != prior.ncpus
            || self.auto_restart_policy != prior.auto_restart_policy
            || self.boot_disk_id != prior.boot_disk_id
    }
}

/// Disk attachment calls against one instance
struct DiskOps<'a> {
    client: &'a Client,
    instance: &'a str,
}

#[async_trait]
impl CompositeOps<String> for DiskOps<'_> {
    type Error = ApiError;

    async fn add(&self, disk: &String) -> std::result::Result<(), ApiError> {
        self.client.instance_disk_attach(self.instance, disk).await?;
        tracing::trace!("attached disk with ID: {}", disk);
        Ok(())
    }

    async fn remove(&self, disk: &String) -> std::result::Result<(), ApiError> {
        self.client.instance_disk_detach(self.instance, disk).await?;
        tracing::trace!("detached disk with ID: {}", disk);
        Ok(())
    }

    fn already_gone(&self, err: &ApiError) -> bool {
        is_not_found(err)
    }
}

fn disk_error(failure: StepFailure<ApiError>) -> EngineError {
    match failure.kind {
        StepKind::Add => EngineError::api("Error attaching disk", failure.error),
        StepKind::Remove => EngineError::api("Error detaching disk", failure.error),
    }
}

/// Anti-affinity memberships of one instance
struct GroupOps<'a> {
    client: &'a Client,
    instance: &'a str,
}

#[async_trait]
impl CompositeOps<String> for GroupOps<'_> {
    type Error = ApiError;

    async fn add(&self, group: &String) -> std::result::Result<(), ApiError> {
        self.client
            .anti_affinity_group_member_instance_add(group, self.instance)
            .await?;
        tracing::trace!(
            "added anti-affinity group with ID: {} to instance with ID: {}",
            group,
            self.instance
        );
        Ok(())
    }

    async fn remove(&self, group: &String) -> std::result::Result<(), ApiError> {
        self.client
            .anti_affinity_group_member_instance_delete(group, self.instance)
            .await?;
        tracing::trace!(
            "removed anti-affinity group with ID {} from instance with ID {}",
            group,
            self.instance
        );
        Ok(())
    }

    fn already_gone(&self, err: &ApiError) -> bool {
        is_not_found(err)
    }
}

fn group_error(failure: StepFailure<ApiError>) -> EngineError {
    match failure.kind {
        StepKind::Add => {
            EngineError::api("Error adding anti-affinity group to instance", failure.error)
        }
        StepKind::Remove => EngineError::api(
            "Error removing anti-affinity group from instance",
            failure.error,
        ),
    }
}

fn changes<T>(additions: Vec<T>, removals: Vec<T>) -> CollectionChanges<T> {
    CollectionChanges {
        additions,
        removals,
    }
}

impl InstanceResource {
    async fn disk_name(&self, disk: &str, summary: &str) -> Result<String> {
        let disk = self
            .client
            .disk_view(disk, None)
            .await
            .map_err(|e| EngineError::api(summary, e))?;
        Ok(disk.identity.name)
    }

    /// Interfaces are created by VPC and subnet name
    async fn nic_body(&self, nic: &NicModel) -> Result<InstanceNetworkInterfaceCreate> {
        let vpc = self
            .client
            .vpc_view(&nic.vpc_id, None)
            .await
            .map_err(|e| EngineError::api("Unable to read information about corresponding VPC:", e))?;
        tracing::trace!("read VPC with ID: {}", nic.vpc_id);
        let subnet = self.client.vpc_subnet_view(&nic.subnet_id).await.map_err(|e| {
            EngineError::api("Unable to read information about corresponding subnet:", e)
        })?;
        tracing::trace!("read subnet with ID: {}", nic.subnet_id);
        Ok(InstanceNetworkInterfaceCreate {
            name: nic.name.clone(),
            description: nic.description.clone(),
            subnet_name: subnet.identity.name,
            vpc_name: vpc.identity.name,
            ip_config: nic.ip_config(),
        })
    }

    async fn stop(&self, id: &str) -> Result<()> {
        match self.client.instance_stop(id).await {
            Ok(_) => {}
            Err(e) if is_not_found(&e) => {}
            Err(e) => return Err(EngineError::api("Unable to stop instance:", e)),
        }
        self.wait_for_stop(id).await?;
        tracing::trace!("stopped instance with ID: {}", id);
        Ok(())
    }

    /// Poll until the instance reports `stopped`. A vanished instance
    /// counts as stopped. The phase deadline bounds the loop.
    async fn wait_for_stop(&self, id: &str) -> Result<()> {
        loop {
            tracing::info!("checking on state of instance: {}", id);
            let instance = match self.client.instance_view(id).await {
                Ok(instance) => instance,
                Err(e) if is_not_found(&e) => return Ok(()),
                Err(e) => {
                    return Err(EngineError::Api {
                        summary: "Error stopping instance".to_string(),
                        detail: format!(
                            "API error: while polling for the status of instance {}: {}",
                            id, e
                        ),
                    });
                }
            };
            match instance.run_state {
                InstanceState::Stopped => return Ok(()),
                state if PENDING.contains(&state) => tokio::time::sleep(POLL_INTERVAL).await,
                state => {
                    return Err(EngineError::Api {
                        summary: "Error stopping instance".to_string(),
                        detail: format!(
                            "API error: unexpected state '{}', wanted target 'stopped'",
                            state.as_str()
                        ),
                    });
                }
            }
        }
    }

    async fn detach_external_ips(
        &self,
        id: &str,
        prior: &ExternalIpsModel,
        plan: &ExternalIpsModel,
    ) -> Result<()> {
        for ip in slice_diff_by(prior.ephemeral(), plan.ephemeral(), EphemeralIpModel::same_address) {
            let version = ip.ip_version.as_deref().and_then(IpVersion::parse);
            self.client
                .instance_ephemeral_ip_detach(id, version)
                .await
                .map_err(|e| {
                    EngineError::api(
                        format!(
                            "Error detaching ephemeral external IP{} from instance {}",
                            ip.ip_version.as_deref().unwrap_or_default(),
                            id
                        ),
                        e,
                    )
                })?;
            tracing::trace!("successfully detached ephemeral external IP from instance {}", id);
        }
        for ip in slice_diff_by(prior.floating(), plan.floating(), |a, b| a == b) {
            self.client.floating_ip_detach(&ip.id).await.map_err(|e| {
                EngineError::api(
                    format!("Error detaching floating external IP with ID {}", ip.id),
                    e,
                )
            })?;
            tracing::trace!("successfully detached floating external IP with ID {}", ip.id);
        }
        Ok(())
    }

    async fn attach_external_ips(
        &self,
        id: &str,
        prior: &ExternalIpsModel,
        plan: &ExternalIpsModel,
    ) -> Result<()> {
        for ip in slice_diff_by(plan.ephemeral(), prior.ephemeral(), EphemeralIpModel::same_address) {
            self.client
                .instance_ephemeral_ip_attach(
                    id,
                    &EphemeralIpCreate {
                        pool_selector: ip.pool_selector(),
                    },
                )
                .await
                .map_err(|e| {
                    EngineError::api(
                        format!("Error attaching ephemeral external IP to instance {}", id),
                        e,
                    )
                })?;
            tracing::trace!("successfully attached ephemeral external IP to instance {}", id);
        }
        for ip in slice_diff_by(plan.floating(), prior.floating(), |a, b| a == b) {
            self.client
                .floating_ip_attach(
                    &ip.id,
                    &FloatingIpAttach {
                        kind: "instance".to_string(),
                        parent: id.to_string(),
                    },
                )
                .await
                .map_err(|e| {
                    EngineError::api(
                        format!("Error attaching floating external IP with ID {}", ip.id),
                        e,
                    )
                })?;
            tracing::trace!("successfully attached floating external IP with ID {}", ip.id);
        }
        Ok(())
    }

    async fn delete_nics(&self, mut nics: Vec<NicModel>) -> Result<()> {
        // The primary interface can only go once it is the last one
        nics.sort_by_key(|nic| nic.primary.unwrap_or(false));
        for nic in nics {
            let Some(nic_id) = nic.id.as_deref() else {
                return Err(EngineError::internal(
                    "Error deleting instance network interface:",
                    format!("network interface {} has no recorded ID", nic.name),
                ));
            };
            match self.client.instance_network_interface_delete(nic_id).await {
                Ok(()) => {}
                Err(e) if is_not_found(&e) => {}
                Err(e) => {
                    return Err(EngineError::api(
                        "Error deleting instance network interface:",
                        e,
                    ));
                }
            }
            tracing::trace!("deleted instance network interface with ID: {}", nic_id);
        }
        Ok(())
    }

    async fn create_nics(&self, id: &str, nics: Vec<NicModel>) -> Result<()> {
        for nic in nics {
            let body = self.nic_body(&nic).await?;
            let created = self
                .client
                .instance_network_interface_create(id, &body)
                .await
                .map_err(|e| EngineError::api("Error creating instance network interface", e))?;
            tracing::trace!(
                "created instance network interface with ID: {}",
                created.identity.id
            );
        }
        Ok(())
    }

    /// Project the instance and its attachments. `known` supplies the
    /// attributes the remote does not report.
    async fn observe(&self, instance: &Instance, known: &InstanceModel) -> Result<InstanceModel> {
        let id = instance.identity.id.as_str();
        let disks = self
            .client
            .instance_disk_list(id)
            .await
            .map_err(|e| EngineError::api("Unable to list attached disks:", e))?;
        let keys = self
            .client
            .instance_ssh_public_key_list(id)
            .await
            .map_err(|e| EngineError::api("Unable to list associated SSH keys:", e))?;
        let groups = self
            .client
            .instance_anti_affinity_group_list(id)
            .await
            .map_err(|e| EngineError::api("Unable to list associated anti-affinity groups:", e))?;
        let nics = self
            .client
            .instance_network_interface_list(id)
            .await
            .map_err(|e| EngineError::api("Unable to read instance network interfaces:", e))?;
        let external_ips = self
            .client
            .instance_external_ip_list(id)
            .await
            .map_err(|e| EngineError::api("Unable to list instance external ips:", e))?;

        Ok(InstanceModel {
            stamps: Stamps::of(&instance.identity),
            project_id: instance.project_id.clone(),
            name: instance.identity.name.clone(),
            description: instance.identity.description.clone(),
            host_name: Some(instance.hostname.clone()),
            memory: instance.memory,
            ncpus: instance.ncpus,
            auto_restart_policy: instance
                .auto_restart_policy
                .clone()
                .filter(|p| !p.is_empty())
                .or_else(|| known.auto_restart_policy.clone()),
            boot_disk_id: instance
                .boot_disk_id
                .clone()
                .filter(|d| !d.is_empty())
                .or_else(|| known.boot_disk_id.clone()),
            start_on_create: Some(known.start_on_create.unwrap_or(true)),
            disk_attachments: non_empty(disks.into_iter().map(|d| d.identity.id).collect()),
            anti_affinity_groups: non_empty(groups.into_iter().map(|g| g.identity.id).collect()),
            ssh_public_keys: non_empty(keys.into_iter().map(|k| k.identity.id).collect()),
            network_interfaces: non_empty(nics.iter().map(NicModel::from).collect()),
            external_ips: ExternalIpsModel::observe(&external_ips)?,
            user_data: known.user_data.clone(),
        })
    }
}

#[async_trait]
impl Resource for InstanceResource {
    fn type_name(&self) -> &'static str {
        "oxide_instance"
    }

    fn schema(&self) -> Schema {
        let nic = AttributeType::object(vec![
            Attribute::required("name", AttributeType::String)
                .description("Name of the instance network interface."),
            Attribute::required("description", AttributeType::String)
                .description("Description for the instance network interface."),
            Attribute::required("subnet_id", AttributeType::String).description(
                "ID of the VPC subnet in which to create the instance network interface.",
            ),
            Attribute::required("vpc_id", AttributeType::String)
                .description("ID of the VPC in which to create the instance network interface."),
            Attribute::optional_computed("ip_address", AttributeType::String).description(
                "IP address for the instance network interface. One will be auto-assigned if not provided.",
            ),
            Attribute::computed("mac_address", AttributeType::String)
                .description("MAC address assigned to the instance network interface."),
            Attribute::computed("id", AttributeType::String).description(
                "Unique, immutable, system-controlled identifier of the instance network interface.",
            ),
            Attribute::computed("primary", AttributeType::Bool).description(
                "True if this is the primary network interface for the instance to which it's attached to.",
            ),
            Attribute::computed("time_created", AttributeType::Timestamp)
                .description("Timestamp of when this instance network interface was created."),
            Attribute::computed("time_modified", AttributeType::Timestamp)
                .description("Timestamp of when this instance network interface was last modified."),
        ]);

        let ephemeral = AttributeType::object(vec![
            Attribute::optional_computed("pool_id", AttributeType::String)
                .description("ID of the IP pool to allocate from. Conflicts with `ip_version`.")
                .validator(Validator::conflicts_with(vec![AttrPath::sibling(
                    "ip_version",
                )])),
            Attribute::optional_computed("ip_version", AttributeType::String)
                .description(
                    "IP version to use when multiple default pools exist. Conflicts with `pool_id`.",
                )
                .validator(Validator::conflicts_with(vec![AttrPath::sibling("pool_id")]))
                .validator(Validator::one_of(["v4", "v6"])),
        ]);

        let floating = AttributeType::object(vec![
            Attribute::required("id", AttributeType::String)
                .description("The external floating IP ID."),
        ]);

        Schema::new(
            "This resource manages instances. Updates will stop and start the instance. When setting a boot disk using `boot_disk_id`, the boot disk ID must also be present in `disk_attachments`.",
        )
        .version(1)
        .attribute(
            Attribute::required("project_id", AttributeType::String)
                .description("ID of the project that will contain the instance.")
                .requires_replace(),
        )
        .attribute(
            Attribute::required("name", AttributeType::String)
                .description("Name of the instance.")
                .requires_replace(),
        )
        .attribute(
            Attribute::required("description", AttributeType::String)
                .description("Description for the instance.")
                .requires_replace(),
        )
        .attribute(
            Attribute::optional_computed("host_name", AttributeType::String)
                .description("Hostname of the instance. Defaults to the instance name.")
                .requires_replace_if_configured(),
        )
        .attribute(
            Attribute::required("memory", AttributeType::Int64)
                .description("Instance memory in bytes."),
        )
        .attribute(
            Attribute::required("ncpus", AttributeType::Int64)
                .description("Number of CPUs allocated for this instance."),
        )
        .attribute(
            Attribute::optional("auto_restart_policy", AttributeType::String)
                .description("The auto-restart policy for this instance.")
                .validator(Validator::one_of(["best_effort", "never"])),
        )
        .attribute(
            Attribute::optional("anti_affinity_groups", AttributeType::set_of(AttributeType::String))
                .description("IDs of the anti-affinity groups this instance should belong to."),
        )
        .attribute(
            Attribute::optional("boot_disk_id", AttributeType::String)
                .description(
                    "ID of the disk the instance should be booted from. When provided, this ID must also be present in `disk_attachments`.",
                )
                .validator(Validator::also_requires(vec![AttrPath::root(
                    "disk_attachments",
                )])),
        )
        .attribute(
            Attribute::optional_computed("start_on_create", AttributeType::Bool)
                .description("Whether to start the instance on creation.")
                .default_value(json!(true))
                .requires_replace_if_configured(),
        )
        .attribute(
            Attribute::optional("disk_attachments", AttributeType::set_of(AttributeType::String))
                .description(
                    "IDs of the disks to be attached to the instance. When multiple disk IDs are provided, set `boot_disk_id` to specify the boot disk for the instance.",
                ),
        )
        .attribute(
            Attribute::optional("ssh_public_keys", AttributeType::set_of(AttributeType::String))
                .description(
                    "An allowlist of IDs of the SSH public keys to be transferred to the instance via cloud-init during instance creation.",
                )
                .validator(Validator::none_of([""]))
                .requires_replace(),
        )
        .attribute(
            Attribute::optional("network_interfaces", AttributeType::set_of(nic))
                .description("Network interface devices attached to the instance."),
        )
        .attribute(
            Attribute::optional(
                "external_ips",
                AttributeType::object(vec![
                    Attribute::optional("ephemeral", AttributeType::set_of(ephemeral))
                        .description(
                            "External ephemeral IPs to attach to the instance. Each instance can have at most one IPv4 and one IPv6 ephemeral IP.",
                        )
                        .validator(Validator::size_between(1, 2)),
                    Attribute::optional("floating", AttributeType::set_of(floating))
                        .description("External floating IPs to attach to the instance.")
                        .validator(Validator::size_at_least(1)),
                ]),
            )
            .description("External IP addresses provided to this instance.")
            .validator(Validator::also_requires(vec![AttrPath::root(
                "network_interfaces",
            )])),
        )
        .attribute(
            Attribute::optional("user_data", AttributeType::String)
                .description(
                    "User data for instance initialization systems (such as cloud-init). Must be a Base64-encoded string. Maximum 32 KiB unencoded data.",
                )
                .requires_replace(),
        )
        .attribute(Attribute::timeouts(&Phase::ALL))
        .attribute(
            Attribute::id()
                .description("Unique, immutable, system-controlled identifier of the instance."),
        )
        .attribute(Attribute::time_created())
        .attribute(Attribute::time_modified())
    }

    /// Version 0 kept external IPs as a flat `[{id, type}]` set, with the
    /// pool ID of ephemeral addresses stored as `id`.
    fn upgrade_state(&self, version: i64, mut state: Value) -> Result<Value> {
        if version != 0 {
            return Err(EngineError::unsupported(
                "Unable to Upgrade Resource State",
                format!("no upgrader for oxide_instance schema version {}", version),
            ));
        }
        let legacy: Vec<LegacyExternalIp> = match state.get_mut("external_ips").map(Value::take) {
            None | Some(Value::Null) => Vec::new(),
            Some(ips) => serde_json::from_value(ips).map_err(|e| {
                EngineError::config(
                    "Unable to Upgrade State From Version 0",
                    format!("failed to read external IPs: {}", e),
                )
            })?,
        };
        let external_ips = ExternalIpsModel::from_legacy(legacy);
        if let Some(obj) = state.as_object_mut() {
            obj.insert("external_ips".to_string(), encode(&external_ips)?);
        }
        Ok(state)
    }

    async fn create(&self, plan: Value) -> Result<Value> {
        let plan: InstanceModel = decode(plan)?;
        plan.check_boot_disk()?;

        let boot_disk = match &plan.boot_disk_id {
            Some(id) => Some(
                self.disk_name(id, "Error retrieving boot disk information")
                    .await?,
            ),
            None => None,
        };
        // The boot disk travels on its own and must not be attached twice
        let mut disks = Vec::new();
        for id in plan.disks() {
            let name = self
                .disk_name(id, "Error retrieving disk information")
                .await?;
            if boot_disk.as_ref() != Some(&name) {
                disks.push(InstanceDiskAttachment::Attach { name });
            }
        }

        let network_interfaces = if plan.nics().is_empty() {
            InstanceNetworkInterfaceAttachment::None
        } else {
            let mut bodies = Vec::with_capacity(plan.nics().len());
            for nic in plan.nics() {
                bodies.push(self.nic_body(nic).await?);
            }
            InstanceNetworkInterfaceAttachment::Create(bodies)
        };

        let body = InstanceCreate {
            name: plan.name.clone(),
            description: plan.description.clone(),
            hostname: plan.host_name.clone().unwrap_or_else(|| plan.name.clone()),
            memory: plan.memory,
            ncpus: plan.ncpus,
            start: plan.start_on_create.unwrap_or(true),
            boot_disk: boot_disk.map(|name| InstanceDiskAttachment::Attach { name }),
            disks,
            network_interfaces,
            external_ips: plan.external_ips().to_create(),
            ssh_public_keys: plan.ssh_public_keys.clone(),
            anti_affinity_groups: plan.groups().to_vec(),
            auto_restart_policy: plan.auto_restart_policy.clone(),
            user_data: plan.user_data.clone().unwrap_or_default(),
        };
        let instance = self
            .client
            .instance_create(&plan.project_id, &body)
            .await
            .map_err(|e| EngineError::api("Error creating instance", e))?;
        tracing::trace!("created instance with ID: {}", instance.identity.id);

        encode(&self.observe(&instance, &plan).await?)
    }

    async fn read(&self, state: Value) -> Result<ReadOutcome> {
        let state: InstanceModel = decode(state)?;
        let Some(instance) = found(
            self.client.instance_view(state.stamps.id()?).await,
            "Unable to read instance:",
        )?
        else {
            return Ok(ReadOutcome::Removed);
        };
        tracing::trace!("read instance with ID: {}", instance.identity.id);
        Ok(ReadOutcome::Found(encode(
            &self.observe(&instance, &state).await?,
        )?))
    }

    async fn update(&self, plan: Value, prior: Value) -> Result<Value> {
        let plan: InstanceModel = decode(plan)?;
        let prior: InstanceModel = decode(prior)?;
        plan.check_boot_disk()?;
        let id = prior.stamps.id()?;

        self.stop(id).await?;

        let disk_ops = DiskOps {
            client: &self.client,
            instance: id,
        };
        let disk_changes = CollectionChanges::between(prior.disks(), plan.disks());
        sequencer::apply(&disk_ops, changes(disk_changes.additions, Vec::new()))
            .await
            .map_err(disk_error)?;

        if plan.primary_changed(&prior) {
            let updated = self
                .client
                .instance_update(
                    id,
                    &InstanceUpdate {
                        memory: plan.memory,
                        ncpus: plan.ncpus,
                        auto_restart_policy: plan.auto_restart_policy.clone(),
                        boot_disk: plan.boot_disk_id.clone(),
                    },
                )
                .await
                .map_err(|e| EngineError::api("Unable to update instance:", e))?;
            tracing::trace!("updated instance with ID: {}", updated.identity.id);
        }

        // The previous boot disk can only be detached once it is replaced
        sequencer::apply(&disk_ops, changes(Vec::new(), disk_changes.removals))
            .await
            .map_err(disk_error)?;

        let (prior_ips, plan_ips) = (prior.external_ips(), plan.external_ips());
        self.detach_external_ips(id, &prior_ips, &plan_ips).await?;

        // Removing first frees the subnets a replacement interface may need
        let stale = slice_diff_by(prior.nics(), plan.nics(), NicModel::same_interface);
        self.delete_nics(stale).await?;
        let added = slice_diff_by(plan.nics(), prior.nics(), NicModel::same_interface);
        self.create_nics(id, added).await?;

        self.attach_external_ips(id, &prior_ips, &plan_ips).await?;

        let group_ops = GroupOps {
            client: &self.client,
            instance: id,
        };
        sequencer::apply(
            &group_ops,
            CollectionChanges::between(prior.groups(), plan.groups()),
        )
        .await
        .map_err(group_error)?;

        match self.client.instance_start(id).await {
            Ok(_) => {}
            Err(e) if is_not_found(&e) => {}
            Err(e) => return Err(EngineError::api("Unable to start instance:", e)),
        }

        let instance = self
            .client
            .instance_view(id)
            .await
            .map_err(|e| EngineError::api("Unable to read instance:", e))?;
        tracing::trace!("read instance with ID: {}", instance.identity.id);
        encode(&self.observe(&instance, &plan).await?)
    }

    async fn delete(&self, state: Value) -> Result<DeleteOutcome> {
        let state: InstanceModel = decode(state)?;
        let id = state.stamps.id()?;
        self.stop(id).await?;
        deleted(
            self.client.instance_delete(id).await,
            "Unable to delete instance:",
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use oxide_api::{
        AntiAffinityGroupCreate, DiskCreate, DiskSource, FakeClient, OxideApi, ProjectCreate,
    };
    use std::sync::Arc;

    const GIB: i64 = 1024 * 1024 * 1024;

    struct Fixture {
        fake: Arc<FakeClient>,
        resource: InstanceResource,
        project: String,
        vpc: String,
        subnet: String,
    }

    async fn fixture() -> Fixture {
        let fake = Arc::new(FakeClient::new());
        let project = fake
            .project_create(&ProjectCreate {
                name: "web".to_string(),
                description: "web tier".to_string(),
            })
            .await
            .unwrap();
        let vpc = fake.vpc_view("default", Some("web")).await.unwrap();
        let subnet = fake.vpc_subnet_view("default").await.unwrap();
        let resource = InstanceResource::new(fake.clone());
        Fixture {
            fake,
            resource,
            project: project.identity.id,
            vpc: vpc.identity.id,
            subnet: subnet.identity.id,
        }
    }

    async fn disk(fixture: &Fixture, name: &str) -> String {
        fixture
            .fake
            .disk_create(
                &fixture.project,
                &DiskCreate {
                    name: name.to_string(),
                    description: name.to_string(),
                    size: GIB,
                    disk_source: DiskSource::Blank { block_size: 512 },
                },
            )
            .await
            .unwrap()
            .identity
            .id
    }

    async fn group(fixture: &Fixture, name: &str) -> String {
        fixture
            .fake
            .anti_affinity_group_create(
                &fixture.project,
                &AntiAffinityGroupCreate {
                    name: name.to_string(),
                    description: name.to_string(),
                    policy: "allow".to_string(),
                    failure_domain: "sled".to_string(),
                },
            )
            .await
            .unwrap()
            .identity
            .id
    }

    fn sorted(value: &Value) -> Vec<String> {
        let mut ids: Vec<String> = serde_json::from_value(value.clone()).unwrap_or_default();
        ids.sort();
        ids
    }

    fn position(calls: &[String], op: &str) -> usize {
        calls.iter().position(|c| c == op).unwrap()
    }

    #[test]
    fn test_nic_identity_ignores_assigned_address() {
        let planned = NicModel {
            name: "net0".to_string(),
            description: "primary".to_string(),
            subnet_id: "s".to_string(),
            vpc_id: "v".to_string(),
            ..Default::default()
        };
        let recorded = NicModel {
            ip_address: Some("172.30.0.5".to_string()),
            id: Some("nic-1".to_string()),
            primary: Some(true),
            ..planned.clone()
        };
        assert!(planned.same_interface(&recorded));

        let renamed = NicModel {
            name: "net1".to_string(),
            ..planned.clone()
        };
        assert!(!renamed.same_interface(&recorded));
    }

    #[test]
    fn test_ephemeral_pool_selector() {
        let by_pool = EphemeralIpModel {
            pool_id: Some("pool-1".to_string()),
            ip_version: None,
        };
        assert_eq!(
            by_pool.pool_selector(),
            PoolSelector::Explicit {
                pool: "pool-1".to_string()
            }
        );

        let by_version = EphemeralIpModel {
            pool_id: None,
            ip_version: Some("v6".to_string()),
        };
        assert_eq!(
            by_version.pool_selector(),
            PoolSelector::Auto {
                ip_version: Some(IpVersion::V6)
            }
        );
    }

    #[test]
    fn test_external_ip_projection_skips_snat() {
        let ips = vec![
            ExternalIp {
                kind: "snat".to_string(),
                ip: "203.0.113.9".to_string(),
                ip_pool_id: "pool".to_string(),
                id: None,
                instance_id: None,
            },
            ExternalIp {
                kind: "ephemeral".to_string(),
                ip: "203.0.113.10".to_string(),
                ip_pool_id: "pool".to_string(),
                id: None,
                instance_id: None,
            },
        ];
        let observed = ExternalIpsModel::observe(&ips).unwrap().unwrap();
        assert_eq!(
            observed.ephemeral(),
            &[EphemeralIpModel {
                pool_id: Some("pool".to_string()),
                ip_version: Some("v4".to_string()),
            }]
        );
        assert!(observed.floating.is_none());

        assert!(ExternalIpsModel::observe(&ips[..1]).unwrap().is_none());
    }

    #[tokio::test]
    async fn test_boot_disk_must_be_attached() {
        let fixture = fixture().await;
        let err = fixture
            .resource
            .create(json!({
                "project_id": fixture.project,
                "name": "app",
                "description": "app",
                "memory": GIB,
                "ncpus": 1,
                "boot_disk_id": "disk-a",
                "disk_attachments": ["disk-b"],
            }))
            .await
            .unwrap_err();
        assert!(err.is_config());
        assert_eq!(err.detail(), "Boot disk ID should be part of `disk_attachments`");
        assert_eq!(fixture.fake.call_count("instance_create").await, 0);
    }

    #[tokio::test]
    async fn test_create_projects_attachments() {
        let fixture = fixture().await;
        let boot = disk(&fixture, "boot").await;
        let data = disk(&fixture, "data").await;

        let state = fixture
            .resource
            .create(json!({
                "project_id": fixture.project,
                "name": "app",
                "description": "app",
                "memory": GIB,
                "ncpus": 2,
                "boot_disk_id": boot,
                "disk_attachments": [boot, data],
                "network_interfaces": [{
                    "name": "net0",
                    "description": "primary",
                    "vpc_id": fixture.vpc,
                    "subnet_id": fixture.subnet,
                }],
                "external_ips": {"ephemeral": [{"ip_version": "v4"}]},
            }))
            .await
            .unwrap();

        assert_eq!(state["boot_disk_id"], json!(boot));
        assert_eq!(state["host_name"], json!("app"));
        assert_eq!(state["start_on_create"], json!(true));
        assert_eq!(state["disk_attachments"].as_array().unwrap().len(), 2);
        let nic = &state["network_interfaces"][0];
        assert_eq!(nic["primary"], json!(true));
        assert!(nic["id"].is_string());
        assert!(nic["ip_address"].is_string());
        assert!(state["external_ips"]["ephemeral"][0]["pool_id"].is_string());
        assert!(state["anti_affinity_groups"].is_null());
        assert!(state["ssh_public_keys"].is_null());
    }

    #[tokio::test]
    async fn test_update_runs_against_stopped_instance() {
        let fixture = fixture().await;
        let boot = disk(&fixture, "boot").await;
        let extra = disk(&fixture, "extra").await;
        let plan = json!({
            "project_id": fixture.project,
            "name": "app",
            "description": "app",
            "memory": GIB,
            "ncpus": 1,
            "boot_disk_id": boot,
            "disk_attachments": [boot],
        });
        let prior = fixture.resource.create(plan.clone()).await.unwrap();
        fixture.fake.clear_calls().await;

        let mut next = plan;
        next["memory"] = json!(2 * GIB);
        next["disk_attachments"] = json!([boot, extra]);
        let state = fixture.resource.update(next, prior).await.unwrap();

        let calls = fixture.fake.calls().await;
        let stop = position(&calls, "instance_stop");
        let attach = position(&calls, "instance_disk_attach");
        let update = position(&calls, "instance_update");
        let start = position(&calls, "instance_start");
        assert!(stop < attach && attach < update && update < start);
        assert_eq!(state["memory"], json!(2 * GIB));
        assert_eq!(state["disk_attachments"].as_array().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_update_skips_primary_update_when_unchanged() {
        let fixture = fixture().await;
        let plan = json!({
            "project_id": fixture.project,
            "name": "app",
            "description": "app",
            "memory": GIB,
            "ncpus": 1,
            "anti_affinity_groups": [],
        });
        let prior = fixture.resource.create(plan.clone()).await.unwrap();
        fixture.fake.clear_calls().await;

        fixture.resource.update(plan, prior).await.unwrap();
        assert_eq!(fixture.fake.call_count("instance_update").await, 0);
        assert_eq!(fixture.fake.call_count("instance_stop").await, 1);
        assert_eq!(fixture.fake.call_count("instance_start").await, 1);
    }

    #[tokio::test]
    async fn test_replaced_interface_is_deleted_before_create() {
        let fixture = fixture().await;
        let nic = |name: &str| {
            json!({
                "name": name,
                "description": "primary",
                "vpc_id": fixture.vpc,
                "subnet_id": fixture.subnet,
            })
        };
        let plan = json!({
            "project_id": fixture.project,
            "name": "app",
            "description": "app",
            "memory": GIB,
            "ncpus": 1,
            "network_interfaces": [nic("net0")],
        });
        let prior = fixture.resource.create(plan.clone()).await.unwrap();
        fixture.fake.clear_calls().await;

        let mut next = plan;
        next["network_interfaces"] = json!([nic("net1")]);
        let state = fixture.resource.update(next, prior).await.unwrap();

        let calls = fixture.fake.calls().await;
        assert!(
            position(&calls, "instance_network_interface_delete")
                < position(&calls, "instance_network_interface_create")
        );
        assert_eq!(state["network_interfaces"][0]["name"], json!("net1"));
    }

    #[tokio::test]
    async fn test_read_and_delete() {
        let fixture = fixture().await;
        let state = fixture
            .resource
            .create(json!({
                "project_id": fixture.project,
                "name": "app",
                "description": "app",
                "memory": GIB,
                "ncpus": 1,
                "start_on_create": false,
                "user_data": "I2Nsb3VkLWNvbmZpZw==",
            }))
            .await
            .unwrap();

        let ReadOutcome::Found(read) = fixture.resource.read(state.clone()).await.unwrap() else {
            panic!("instance should exist");
        };
        assert_eq!(read["start_on_create"], json!(false));
        assert_eq!(read["user_data"], json!("I2Nsb3VkLWNvbmZpZw=="));
        assert!(read["network_interfaces"].is_null());
        assert!(read["disk_attachments"].is_null());

        let outcome = fixture.resource.delete(state.clone()).await.unwrap();
        assert_eq!(outcome, DeleteOutcome::Deleted);
        assert_eq!(
            fixture.resource.read(state.clone()).await.unwrap(),
            ReadOutcome::Removed
        );
        // Stop, wait and delete all tolerate the missing instance
        assert_eq!(
            fixture.resource.delete(state).await.unwrap(),
            DeleteOutcome::Deleted
        );
    }

    #[tokio::test]
    async fn test_attachments_follow_additions_and_removals() {
        let fixture = fixture().await;
        let (a, b, c) = (
            disk(&fixture, "a").await,
            disk(&fixture, "b").await,
            disk(&fixture, "c").await,
        );
        let (g1, g2) = (group(&fixture, "g1").await, group(&fixture, "g2").await);
        let plan = json!({
            "project_id": fixture.project,
            "name": "app",
            "description": "app",
            "memory": GIB,
            "ncpus": 1,
            "disk_attachments": [a],
            "anti_affinity_groups": [g1],
        });
        let created = fixture.resource.create(plan.clone()).await.unwrap();

        let mut grown = plan.clone();
        grown["disk_attachments"] = json!([a, b, c]);
        grown["anti_affinity_groups"] = json!([g1, g2]);
        let updated = fixture.resource.update(grown.clone(), created).await.unwrap();
        let ReadOutcome::Found(read) = fixture.resource.read(updated.clone()).await.unwrap() else {
            panic!("instance should exist");
        };
        let mut union = vec![a.clone(), b.clone(), c.clone()];
        union.sort();
        assert_eq!(sorted(&read["disk_attachments"]), union);
        let mut groups = vec![g1.clone(), g2.clone()];
        groups.sort();
        assert_eq!(sorted(&read["anti_affinity_groups"]), groups);

        let mut shrunk = grown;
        shrunk["disk_attachments"] = json!([b]);
        shrunk["anti_affinity_groups"] = json!([g2]);
        let updated = fixture.resource.update(shrunk, read).await.unwrap();
        let ReadOutcome::Found(read) = fixture.resource.read(updated).await.unwrap() else {
            panic!("instance should exist");
        };
        assert_eq!(sorted(&read["disk_attachments"]), vec![b]);
        assert_eq!(sorted(&read["anti_affinity_groups"]), vec![g2]);
        assert_eq!(fixture.fake.call_count("instance_disk_detach").await, 2);
        assert_eq!(
            fixture
                .fake
                .call_count("anti_affinity_group_member_instance_delete")
                .await,
            1
        );
    }

    #[test]
    fn test_upgrade_splits_external_ips_by_kind() {
        let resource = InstanceResource::new(Arc::new(FakeClient::new()));
        let state = json!({
            "id": "i-1",
            "name": "app",
            "memory": GIB,
            "external_ips": [
                {"id": "", "type": "ephemeral"},
                {"id": "fip-1", "type": "floating"},
                {"id": "fip-2", "type": "floating"}
            ]
        });
        let upgraded = resource.upgrade_state(0, state).unwrap();
        assert_eq!(upgraded["name"], "app");
        assert_eq!(
            upgraded["external_ips"],
            json!({
                "ephemeral": [{"pool_id": null, "ip_version": null}],
                "floating": [{"id": "fip-1"}, {"id": "fip-2"}]
            })
        );

        let upgraded = resource
            .upgrade_state(0, json!({"id": "i-1", "external_ips": []}))
            .unwrap();
        assert!(upgraded["external_ips"].is_null());

        let err = resource.upgrade_state(1, json!({})).unwrap_err();
        assert_eq!(err.summary(), "Unable to Upgrade Resource State");
    }
}
