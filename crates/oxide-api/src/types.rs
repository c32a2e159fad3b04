//! Request and response types of the Oxide control-plane API
//!
//! Views carry the common identity metadata flattened into the object.
//! Sum-type payloads are tagged records with a `type` discriminant.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ============ Common ============

/// Identity metadata shared by every named object
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IdentityMetadata {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub time_created: DateTime<Utc>,
    pub time_modified: DateTime<Utc>,
}

/// One page of a paginated collection
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResultsPage<T> {
    pub items: Vec<T>,
    #[serde(default)]
    pub next_page: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IpVersion {
    V4,
    V6,
}

impl IpVersion {
    pub fn as_str(self) -> &'static str {
        match self {
            IpVersion::V4 => "v4",
            IpVersion::V6 => "v6",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "v4" => Some(IpVersion::V4),
            "v6" => Some(IpVersion::V6),
            _ => None,
        }
    }
}

/// Pool used when the server allocates an address or subnet
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PoolSelector {
    Explicit {
        pool: String,
    },
    Auto {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        ip_version: Option<IpVersion>,
    },
}

// ============ Projects ============

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Project {
    #[serde(flatten)]
    pub identity: IdentityMetadata,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectCreate {
    pub name: String,
    pub description: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectUpdate {
    pub name: String,
    pub description: String,
}

// ============ Silos ============

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Silo {
    #[serde(flatten)]
    pub identity: IdentityMetadata,
    pub discoverable: bool,
    pub identity_mode: String,
    #[serde(default)]
    pub mapped_fleet_roles: std::collections::BTreeMap<String, Vec<String>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CertificateCreate {
    pub name: String,
    pub description: String,
    pub cert: String,
    pub key: String,
    pub service: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SiloQuotasCreate {
    pub cpus: i64,
    pub memory: i64,
    pub storage: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SiloCreate {
    pub name: String,
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub admin_group_name: Option<String>,
    pub discoverable: bool,
    pub identity_mode: String,
    #[serde(default)]
    pub mapped_fleet_roles: std::collections::BTreeMap<String, Vec<String>>,
    pub quotas: SiloQuotasCreate,
    pub tls_certificates: Vec<CertificateCreate>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SiloQuotas {
    pub silo_id: String,
    pub cpus: i64,
    pub memory: i64,
    pub storage: i64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SiloQuotasUpdate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cpus: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memory: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub storage: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum IdpMetadataSource {
    Url { url: String },
    Base64EncodedXml { data: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DerEncodedKeyPair {
    pub private_key: String,
    pub public_cert: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SamlIdentityProviderCreate {
    pub name: String,
    pub description: String,
    pub acs_url: String,
    pub idp_entity_id: String,
    pub idp_metadata_source: IdpMetadataSource,
    pub slo_url: String,
    pub sp_client_id: String,
    pub technical_contact_email: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group_attribute_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signing_keypair: Option<DerEncodedKeyPair>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SamlIdentityProvider {
    #[serde(flatten)]
    pub identity: IdentityMetadata,
    pub acs_url: String,
    pub idp_entity_id: String,
    pub slo_url: String,
    pub sp_client_id: String,
    pub technical_contact_email: String,
    #[serde(default)]
    pub group_attribute_name: Option<String>,
    #[serde(default)]
    pub public_cert: Option<String>,
}

// ============ VPCs ============

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Vpc {
    #[serde(flatten)]
    pub identity: IdentityMetadata,
    pub project_id: String,
    pub system_router_id: String,
    pub ipv6_prefix: String,
    pub dns_name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VpcCreate {
    pub name: String,
    pub description: String,
    pub dns_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ipv6_prefix: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VpcUpdate {
    pub name: String,
    pub description: String,
    pub dns_name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VpcSubnet {
    #[serde(flatten)]
    pub identity: IdentityMetadata,
    pub vpc_id: String,
    pub ipv4_block: String,
    pub ipv6_block: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VpcSubnetCreate {
    pub name: String,
    pub description: String,
    pub ipv4_block: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ipv6_block: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VpcSubnetUpdate {
    pub name: String,
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VpcRouter {
    #[serde(flatten)]
    pub identity: IdentityMetadata,
    pub vpc_id: String,
    pub kind: String,
}

/// Name and description; shared by the create and update bodies of
/// routers, internet gateways and other plain named objects.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NameDescription {
    pub name: String,
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RouteDestination {
    #[serde(rename = "type")]
    pub kind: String,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RouteTarget {
    #[serde(rename = "type")]
    pub kind: String,
    /// Absent for `drop` targets
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RouterRoute {
    #[serde(flatten)]
    pub identity: IdentityMetadata,
    pub vpc_router_id: String,
    pub kind: String,
    pub destination: RouteDestination,
    pub target: RouteTarget,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouterRouteCreate {
    pub name: String,
    pub description: String,
    pub destination: RouteDestination,
    pub target: RouteTarget,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InternetGateway {
    #[serde(flatten)]
    pub identity: IdentityMetadata,
    pub vpc_id: String,
}

// ============ Firewall ============

/// `{type, value}` pair used by firewall targets and host filters
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TypedValue {
    #[serde(rename = "type")]
    pub kind: String,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VpcFirewallIcmpFilter {
    pub icmp_type: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum VpcFirewallRuleProtocol {
    Tcp,
    Udp,
    Icmp(Option<VpcFirewallIcmpFilter>),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VpcFirewallRuleFilter {
    #[serde(default)]
    pub hosts: Option<Vec<TypedValue>>,
    #[serde(default)]
    pub ports: Option<Vec<String>>,
    #[serde(default)]
    pub protocols: Option<Vec<VpcFirewallRuleProtocol>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VpcFirewallRuleUpdate {
    pub name: String,
    pub description: String,
    pub action: String,
    pub direction: String,
    pub filters: VpcFirewallRuleFilter,
    pub priority: i64,
    pub status: String,
    pub targets: Vec<TypedValue>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VpcFirewallRule {
    #[serde(flatten)]
    pub identity: IdentityMetadata,
    pub vpc_id: String,
    pub action: String,
    pub direction: String,
    pub filters: VpcFirewallRuleFilter,
    pub priority: i64,
    pub status: String,
    pub targets: Vec<TypedValue>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VpcFirewallRuleUpdateParams {
    pub rules: Vec<VpcFirewallRuleUpdate>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VpcFirewallRules {
    pub rules: Vec<VpcFirewallRule>,
}

// ============ IP pools ============

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IpPool {
    #[serde(flatten)]
    pub identity: IdentityMetadata,
    #[serde(default)]
    pub ip_version: Option<IpVersion>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IpPoolCreate {
    pub name: String,
    pub description: String,
}

/// Inclusive address range. The family follows from the addresses.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IpRange {
    pub first: String,
    pub last: String,
}

impl IpRange {
    pub fn new(first: impl Into<String>, last: impl Into<String>) -> Self {
        Self {
            first: first.into(),
            last: last.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IpPoolRange {
    pub id: String,
    pub ip_pool_id: String,
    pub time_created: DateTime<Utc>,
    pub range: IpRange,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IpPoolLinkSilo {
    pub silo: String,
    pub is_default: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IpPoolSiloLink {
    pub ip_pool_id: String,
    pub silo_id: String,
    pub is_default: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IsDefault {
    pub is_default: bool,
}

/// An IP pool as seen from the caller's silo
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SiloIpPool {
    #[serde(flatten)]
    pub identity: IdentityMetadata,
    pub is_default: bool,
}

// ============ Subnet pools ============

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubnetPool {
    #[serde(flatten)]
    pub identity: IdentityMetadata,
    pub ip_version: IpVersion,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubnetPoolCreate {
    pub name: String,
    pub description: String,
    pub ip_version: IpVersion,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubnetPoolMember {
    pub id: String,
    pub subnet_pool_id: String,
    pub subnet: String,
    pub min_prefix_length: i64,
    pub max_prefix_length: i64,
    pub time_created: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubnetPoolMemberAdd {
    pub subnet: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_prefix_length: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_prefix_length: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubnetPoolMemberRemove {
    pub subnet: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubnetPoolLinkSilo {
    pub silo: String,
    pub is_default: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubnetPoolSiloLink {
    pub subnet_pool_id: String,
    pub silo_id: String,
    pub is_default: bool,
}

/// A subnet pool as seen from a linked silo
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SiloSubnetPool {
    #[serde(flatten)]
    pub identity: IdentityMetadata,
    pub is_default: bool,
    pub ip_version: IpVersion,
}

// ============ Storage ============

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Disk {
    #[serde(flatten)]
    pub identity: IdentityMetadata,
    pub project_id: String,
    pub size: i64,
    pub block_size: i64,
    #[serde(default)]
    pub image_id: Option<String>,
    #[serde(default)]
    pub snapshot_id: Option<String>,
    #[serde(default)]
    pub device_path: String,
    pub state: DiskState,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "state", content = "instance", rename_all = "snake_case")]
pub enum DiskState {
    Creating,
    Detached,
    Attaching(String),
    Attached(String),
    Detaching(String),
    Destroyed,
    Faulted,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DiskSource {
    Blank { block_size: i64 },
    Snapshot { snapshot_id: String },
    Image { image_id: String },
}

impl DiskSource {
    pub fn kind(&self) -> &'static str {
        match self {
            DiskSource::Blank { .. } => "blank",
            DiskSource::Snapshot { .. } => "snapshot",
            DiskSource::Image { .. } => "image",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiskCreate {
    pub name: String,
    pub description: String,
    pub size: i64,
    pub disk_source: DiskSource,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Digest {
    #[serde(rename = "type")]
    pub kind: String,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Image {
    #[serde(flatten)]
    pub identity: IdentityMetadata,
    #[serde(default)]
    pub project_id: Option<String>,
    pub os: String,
    pub version: String,
    #[serde(default)]
    pub digest: Option<Digest>,
    pub block_size: i64,
    pub size: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ImageSource {
    Snapshot { id: String },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageCreate {
    pub name: String,
    pub description: String,
    pub os: String,
    pub version: String,
    pub source: ImageSource,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    #[serde(flatten)]
    pub identity: IdentityMetadata,
    pub project_id: String,
    pub disk_id: String,
    pub state: String,
    pub size: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotCreate {
    pub name: String,
    pub description: String,
    /// Name or id of the source disk
    pub disk: String,
}

// ============ Instances ============

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InstanceState {
    Creating,
    Starting,
    Running,
    Stopping,
    Stopped,
    Rebooting,
    Migrating,
    Repairing,
    Failed,
    Destroyed,
}

impl InstanceState {
    pub fn as_str(self) -> &'static str {
        match self {
            InstanceState::Creating => "creating",
            InstanceState::Starting => "starting",
            InstanceState::Running => "running",
            InstanceState::Stopping => "stopping",
            InstanceState::Stopped => "stopped",
            InstanceState::Rebooting => "rebooting",
            InstanceState::Migrating => "migrating",
            InstanceState::Repairing => "repairing",
            InstanceState::Failed => "failed",
            InstanceState::Destroyed => "destroyed",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Instance {
    #[serde(flatten)]
    pub identity: IdentityMetadata,
    pub project_id: String,
    pub hostname: String,
    pub memory: i64,
    pub ncpus: i64,
    pub run_state: InstanceState,
    #[serde(default)]
    pub boot_disk_id: Option<String>,
    #[serde(default)]
    pub auto_restart_policy: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InstanceDiskAttachment {
    /// Attach an existing disk by name
    Attach { name: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Ipv4Assignment {
    Auto,
    Explicit { value: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum PrivateIpStackCreate {
    V4 { ip: Ipv4Assignment },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstanceNetworkInterfaceCreate {
    pub name: String,
    pub description: String,
    pub subnet_name: String,
    pub vpc_name: String,
    pub ip_config: PrivateIpStackCreate,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "params", rename_all = "snake_case")]
pub enum InstanceNetworkInterfaceAttachment {
    Create(Vec<InstanceNetworkInterfaceCreate>),
    Default,
    None,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum PrivateIpStack {
    V4 { ip: String },
    V6 { ip: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstanceNetworkInterface {
    #[serde(flatten)]
    pub identity: IdentityMetadata,
    pub instance_id: String,
    pub mac: String,
    pub primary: bool,
    pub subnet_id: String,
    pub vpc_id: String,
    pub ip_stack: PrivateIpStack,
}

impl InstanceNetworkInterface {
    /// IPv4 address of the interface, if it has one
    pub fn ipv4(&self) -> Option<&str> {
        match &self.ip_stack {
            PrivateIpStack::V4 { ip } => Some(ip),
            PrivateIpStack::V6 { .. } => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ExternalIpCreate {
    Ephemeral { pool_selector: PoolSelector },
    Floating { floating_ip: String },
}

/// External address of an instance. `kind` is one of `snat`,
/// `ephemeral` or `floating`; only floating addresses carry an id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExternalIp {
    pub kind: String,
    pub ip: String,
    pub ip_pool_id: String,
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub instance_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EphemeralIpCreate {
    pub pool_selector: PoolSelector,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstanceCreate {
    pub name: String,
    pub description: String,
    pub hostname: String,
    pub memory: i64,
    pub ncpus: i64,
    pub start: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub boot_disk: Option<InstanceDiskAttachment>,
    pub disks: Vec<InstanceDiskAttachment>,
    pub network_interfaces: InstanceNetworkInterfaceAttachment,
    pub external_ips: Vec<ExternalIpCreate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ssh_public_keys: Option<Vec<String>>,
    pub anti_affinity_groups: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auto_restart_policy: Option<String>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub user_data: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstanceUpdate {
    pub memory: i64,
    pub ncpus: i64,
    pub auto_restart_policy: Option<String>,
    pub boot_disk: Option<String>,
}

// ============ Addresses ============

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AddressAllocator {
    Explicit {
        ip: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        pool: Option<String>,
    },
    Auto {
        pool_selector: PoolSelector,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FloatingIp {
    #[serde(flatten)]
    pub identity: IdentityMetadata,
    pub ip: String,
    pub ip_pool_id: String,
    pub project_id: String,
    #[serde(default)]
    pub instance_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FloatingIpCreate {
    pub name: String,
    pub description: String,
    pub address_allocator: AddressAllocator,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FloatingIpAttach {
    pub kind: String,
    pub parent: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ExternalSubnetAllocator {
    Explicit {
        subnet: String,
    },
    Auto {
        prefix_len: i64,
        pool_selector: PoolSelector,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExternalSubnet {
    #[serde(flatten)]
    pub identity: IdentityMetadata,
    pub project_id: String,
    pub subnet: String,
    pub subnet_pool_id: String,
    pub subnet_pool_member_id: String,
    #[serde(default)]
    pub instance_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExternalSubnetCreate {
    pub name: String,
    pub description: String,
    pub allocator: ExternalSubnetAllocator,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExternalSubnetAttach {
    pub instance: String,
}

// ============ Affinity ============

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AntiAffinityGroup {
    #[serde(flatten)]
    pub identity: IdentityMetadata,
    pub project_id: String,
    pub policy: String,
    pub failure_domain: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AntiAffinityGroupCreate {
    pub name: String,
    pub description: String,
    pub policy: String,
    pub failure_domain: String,
}

// ============ SSH keys ============

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SshKey {
    #[serde(flatten)]
    pub identity: IdentityMetadata,
    pub public_key: String,
    pub silo_user_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SshKeyCreate {
    pub name: String,
    pub description: String,
    pub public_key: String,
}

// ============ System networking ============

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AddressLot {
    #[serde(flatten)]
    pub identity: IdentityMetadata,
    pub kind: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AddressLotBlockCreate {
    pub first_address: String,
    pub last_address: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AddressLotBlock {
    pub id: String,
    pub first_address: String,
    pub last_address: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AddressLotCreate {
    pub name: String,
    pub description: String,
    pub kind: String,
    pub blocks: Vec<AddressLotBlockCreate>,
}

/// Lot together with its blocks; returned by both create and view
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AddressLotWithBlocks {
    pub lot: AddressLot,
    pub blocks: Vec<AddressLotBlock>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SwitchPortConfig {
    pub geometry: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SwitchAddress {
    pub address: String,
    pub address_lot: String,
    #[serde(default)]
    pub vlan_id: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AddressConfig {
    pub addresses: Vec<SwitchAddress>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum ImportExportPolicy {
    NoFiltering,
    Allow(Vec<String>),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BgpPeer {
    pub addr: String,
    pub allowed_export: ImportExportPolicy,
    pub allowed_import: ImportExportPolicy,
    pub bgp_config: String,
    pub communities: Vec<i64>,
    pub connect_retry: i64,
    pub delay_open: i64,
    pub enforce_first_as: bool,
    pub hold_time: i64,
    pub idle_hold_time: i64,
    pub interface_name: String,
    pub keepalive: i64,
    #[serde(default)]
    pub local_pref: Option<i64>,
    #[serde(default)]
    pub md5_auth_key: Option<String>,
    #[serde(default)]
    pub min_ttl: Option<i64>,
    #[serde(default)]
    pub multi_exit_discriminator: Option<i64>,
    #[serde(default)]
    pub remote_asn: Option<i64>,
    #[serde(default)]
    pub vlan_id: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BgpPeerConfig {
    pub peers: Vec<BgpPeer>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SwitchInterfaceKind {
    Primary,
    Vlan { vid: i64 },
    Loopback,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SwitchInterfaceConfig {
    pub kind: SwitchInterfaceKind,
    pub v6_enabled: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LldpLinkConfig {
    pub enabled: bool,
    #[serde(default)]
    pub chassis_id: Option<String>,
    #[serde(default)]
    pub link_description: Option<String>,
    #[serde(default)]
    pub link_name: Option<String>,
    #[serde(default)]
    pub management_ip: Option<String>,
    #[serde(default)]
    pub system_description: Option<String>,
    #[serde(default)]
    pub system_name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TxEqConfig {
    #[serde(default)]
    pub main: Option<i64>,
    #[serde(default)]
    pub post1: Option<i64>,
    #[serde(default)]
    pub post2: Option<i64>,
    #[serde(default)]
    pub pre1: Option<i64>,
    #[serde(default)]
    pub pre2: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinkConfig {
    pub autoneg: bool,
    #[serde(default)]
    pub fec: Option<String>,
    pub lldp: LldpLinkConfig,
    pub mtu: i64,
    pub speed: String,
    #[serde(default)]
    pub tx_eq: Option<TxEqConfig>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Route {
    pub dst: String,
    pub gw: String,
    #[serde(default)]
    pub rib_priority: Option<i64>,
    #[serde(default)]
    pub vid: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RouteConfig {
    pub routes: Vec<Route>,
}

/// Switch port settings payload. Maps are keyed by link or interface name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SwitchPortSettingsCreate {
    pub name: String,
    pub description: String,
    pub port_config: SwitchPortConfig,
    pub addresses: std::collections::BTreeMap<String, AddressConfig>,
    pub bgp_peers: std::collections::BTreeMap<String, BgpPeerConfig>,
    pub groups: Vec<String>,
    pub interfaces: std::collections::BTreeMap<String, SwitchInterfaceConfig>,
    pub links: std::collections::BTreeMap<String, LinkConfig>,
    pub routes: std::collections::BTreeMap<String, RouteConfig>,
}

/// Switch port settings as reported by the remote: flat lists, each entry
/// naming the link it belongs to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SwitchPortSettings {
    #[serde(flatten)]
    pub identity: IdentityMetadata,
    pub port: SwitchPortConfig,
    pub addresses: Vec<SwitchPortAddressView>,
    pub bgp_peers: Vec<SwitchPortBgpPeerView>,
    pub groups: Vec<String>,
    pub interfaces: Vec<SwitchInterfaceView>,
    pub links: Vec<SwitchPortLinkView>,
    pub routes: Vec<SwitchPortRouteView>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SwitchPortAddressView {
    pub interface_name: String,
    pub address: String,
    pub address_lot_id: String,
    #[serde(default)]
    pub vlan_id: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SwitchPortBgpPeerView {
    pub link_name: String,
    pub addr: String,
    pub allowed_export: ImportExportPolicy,
    pub allowed_import: ImportExportPolicy,
    pub bgp_config: String,
    /// Communities as reported by the remote; decimal strings
    pub communities: Vec<String>,
    pub connect_retry: i64,
    pub delay_open: i64,
    pub enforce_first_as: bool,
    pub hold_time: i64,
    pub idle_hold_time: i64,
    #[serde(default)]
    pub interface_name: String,
    pub keepalive: i64,
    #[serde(default)]
    pub local_pref: Option<i64>,
    #[serde(default)]
    pub md5_auth_key: Option<String>,
    #[serde(default)]
    pub min_ttl: Option<i64>,
    #[serde(default)]
    pub multi_exit_discriminator: Option<i64>,
    #[serde(default)]
    pub remote_asn: Option<i64>,
    #[serde(default)]
    pub vlan_id: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SwitchInterfaceView {
    pub interface_name: String,
    pub kind: SwitchInterfaceKind,
    pub v6_enabled: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SwitchPortLinkView {
    pub link_name: String,
    pub autoneg: bool,
    #[serde(default)]
    pub fec: Option<String>,
    pub lldp: LldpLinkConfig,
    pub mtu: i64,
    pub speed: String,
    #[serde(default)]
    pub tx_eq: Option<TxEqConfig>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SwitchPortRouteView {
    pub interface_name: String,
    pub dst: String,
    pub gw: String,
    #[serde(default)]
    pub rib_priority: Option<i64>,
    #[serde(default)]
    pub vlan_id: Option<i64>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_disk_source_tag() {
        let source = DiskSource::Blank { block_size: 512 };
        assert_eq!(
            serde_json::to_value(&source).unwrap(),
            json!({"type": "blank", "block_size": 512})
        );
        assert_eq!(source.kind(), "blank");
    }

    #[test]
    fn test_pool_selector_auto_omits_version() {
        let selector = PoolSelector::Auto { ip_version: None };
        assert_eq!(serde_json::to_value(&selector).unwrap(), json!({"type": "auto"}));
    }

    #[test]
    fn test_protocol_tagging() {
        let icmp = VpcFirewallRuleProtocol::Icmp(Some(VpcFirewallIcmpFilter {
            icmp_type: 8,
            code: Some("0".to_string()),
        }));
        assert_eq!(
            serde_json::to_value(&icmp).unwrap(),
            json!({"type": "icmp", "value": {"icmp_type": 8, "code": "0"}})
        );
    }

    #[test]
    fn test_identity_flatten() {
        let project: Project = serde_json::from_value(json!({
            "id": "p-1",
            "name": "myproject",
            "description": "a test project",
            "time_created": "2024-05-01T12:00:00Z",
            "time_modified": "2024-05-01T12:00:00Z"
        }))
        .unwrap();
        assert_eq!(project.identity.name, "myproject");
    }

    #[test]
    fn test_disk_state() {
        let state: DiskState =
            serde_json::from_value(json!({"state": "attached", "instance": "i-1"})).unwrap();
        assert_eq!(state, DiskState::Attached("i-1".to_string()));
        let state: DiskState = serde_json::from_value(json!({"state": "detached"})).unwrap();
        assert_eq!(state, DiskState::Detached);
    }
}
