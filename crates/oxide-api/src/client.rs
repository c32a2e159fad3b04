//! API Client Facade
//!
//! One typed operation per remote endpoint the provider uses. Identifiers
//! accept either a name or an id; name lookups need the parent scope
//! (`project`, `vpc`, `silo`), id lookups ignore it.

use crate::error::Result;
use crate::types::*;
use async_trait::async_trait;

#[async_trait]
pub trait OxideApi: Send + Sync {
    // ============ Projects ============

    async fn project_create(&self, body: &ProjectCreate) -> Result<Project>;
    async fn project_view(&self, project: &str) -> Result<Project>;
    async fn project_update(&self, project: &str, body: &ProjectUpdate) -> Result<Project>;
    async fn project_delete(&self, project: &str) -> Result<()>;

    // ============ Silos ============

    async fn silo_create(&self, body: &SiloCreate) -> Result<Silo>;
    async fn silo_view(&self, silo: &str) -> Result<Silo>;
    async fn silo_delete(&self, silo: &str) -> Result<()>;
    async fn silo_quotas_view(&self, silo: &str) -> Result<SiloQuotas>;
    async fn silo_quotas_update(&self, silo: &str, body: &SiloQuotasUpdate)
    -> Result<SiloQuotas>;
    async fn saml_identity_provider_create(
        &self,
        silo: &str,
        body: &SamlIdentityProviderCreate,
    ) -> Result<SamlIdentityProvider>;
    async fn saml_identity_provider_view(
        &self,
        provider: &str,
        silo: Option<&str>,
    ) -> Result<SamlIdentityProvider>;

    // ============ VPCs ============

    async fn vpc_create(&self, project: &str, body: &VpcCreate) -> Result<Vpc>;
    async fn vpc_view(&self, vpc: &str, project: Option<&str>) -> Result<Vpc>;
    async fn vpc_update(&self, vpc: &str, body: &VpcUpdate) -> Result<Vpc>;
    async fn vpc_delete(&self, vpc: &str, project: Option<&str>) -> Result<()>;

    async fn vpc_subnet_create(&self, vpc: &str, body: &VpcSubnetCreate) -> Result<VpcSubnet>;
    async fn vpc_subnet_view(&self, subnet: &str) -> Result<VpcSubnet>;
    async fn vpc_subnet_update(&self, subnet: &str, body: &VpcSubnetUpdate)
    -> Result<VpcSubnet>;
    /// `vpc` and `project` scope a subnet given by name
    async fn vpc_subnet_delete(
        &self,
        subnet: &str,
        vpc: Option<&str>,
        project: Option<&str>,
    ) -> Result<()>;

    async fn vpc_router_create(&self, vpc: &str, body: &NameDescription) -> Result<VpcRouter>;
    async fn vpc_router_view(&self, router: &str) -> Result<VpcRouter>;
    async fn vpc_router_update(&self, router: &str, body: &NameDescription)
    -> Result<VpcRouter>;
    async fn vpc_router_delete(&self, router: &str) -> Result<()>;

    async fn vpc_router_route_create(
        &self,
        router: &str,
        body: &RouterRouteCreate,
    ) -> Result<RouterRoute>;
    async fn vpc_router_route_view(&self, route: &str) -> Result<RouterRoute>;
    async fn vpc_router_route_update(
        &self,
        route: &str,
        body: &RouterRouteCreate,
    ) -> Result<RouterRoute>;
    async fn vpc_router_route_delete(&self, route: &str) -> Result<()>;

    async fn internet_gateway_create(
        &self,
        vpc: &str,
        body: &NameDescription,
    ) -> Result<InternetGateway>;
    async fn internet_gateway_view(&self, gateway: &str) -> Result<InternetGateway>;
    async fn internet_gateway_delete(&self, gateway: &str, cascade: bool) -> Result<()>;

    async fn vpc_firewall_rules_view(&self, vpc: &str) -> Result<VpcFirewallRules>;
    /// Replaces the whole rule set; an empty list clears it
    async fn vpc_firewall_rules_update(
        &self,
        vpc: &str,
        body: &VpcFirewallRuleUpdateParams,
    ) -> Result<VpcFirewallRules>;

    // ============ IP pools ============

    async fn ip_pool_create(&self, body: &IpPoolCreate) -> Result<IpPool>;
    async fn ip_pool_view(&self, pool: &str) -> Result<IpPool>;
    async fn ip_pool_update(&self, pool: &str, body: &NameDescription) -> Result<IpPool>;
    async fn ip_pool_delete(&self, pool: &str) -> Result<()>;
    async fn ip_pool_range_list(&self, pool: &str) -> Result<Vec<IpPoolRange>>;
    async fn ip_pool_range_add(&self, pool: &str, range: &IpRange) -> Result<IpPoolRange>;
    async fn ip_pool_range_remove(&self, pool: &str, range: &IpRange) -> Result<()>;

    async fn ip_pool_silo_link(&self, pool: &str, body: &IpPoolLinkSilo)
    -> Result<IpPoolSiloLink>;
    async fn ip_pool_silo_list(&self, pool: &str) -> Result<Vec<IpPoolSiloLink>>;
    async fn ip_pool_silo_update(
        &self,
        pool: &str,
        silo: &str,
        body: &IsDefault,
    ) -> Result<IpPoolSiloLink>;
    async fn ip_pool_silo_unlink(&self, pool: &str, silo: &str) -> Result<()>;

    // ============ Subnet pools ============

    async fn subnet_pool_create(&self, body: &SubnetPoolCreate) -> Result<SubnetPool>;
    async fn subnet_pool_view(&self, pool: &str) -> Result<SubnetPool>;
    async fn subnet_pool_update(&self, pool: &str, body: &NameDescription)
    -> Result<SubnetPool>;
    async fn subnet_pool_delete(&self, pool: &str) -> Result<()>;
    async fn subnet_pool_member_list(&self, pool: &str) -> Result<Vec<SubnetPoolMember>>;
    async fn subnet_pool_member_add(
        &self,
        pool: &str,
        body: &SubnetPoolMemberAdd,
    ) -> Result<SubnetPoolMember>;
    async fn subnet_pool_member_remove(
        &self,
        pool: &str,
        body: &SubnetPoolMemberRemove,
    ) -> Result<()>;

    async fn subnet_pool_silo_link(
        &self,
        pool: &str,
        body: &SubnetPoolLinkSilo,
    ) -> Result<SubnetPoolSiloLink>;
    async fn subnet_pool_silo_update(
        &self,
        pool: &str,
        silo: &str,
        body: &IsDefault,
    ) -> Result<SubnetPoolSiloLink>;
    async fn subnet_pool_silo_unlink(&self, pool: &str, silo: &str) -> Result<()>;
    /// Subnet pools linked to a silo
    async fn silo_subnet_pool_list(&self, silo: &str) -> Result<Vec<SiloSubnetPool>>;

    // ============ Storage ============

    async fn disk_create(&self, project: &str, body: &DiskCreate) -> Result<Disk>;
    async fn disk_view(&self, disk: &str, project: Option<&str>) -> Result<Disk>;
    async fn disk_delete(&self, disk: &str) -> Result<()>;

    async fn image_create(&self, project: &str, body: &ImageCreate) -> Result<Image>;
    async fn image_view(&self, image: &str) -> Result<Image>;
    async fn image_delete(&self, image: &str) -> Result<()>;

    async fn snapshot_create(&self, project: &str, body: &SnapshotCreate) -> Result<Snapshot>;
    async fn snapshot_view(&self, snapshot: &str) -> Result<Snapshot>;
    async fn snapshot_delete(&self, snapshot: &str) -> Result<()>;

    // ============ Instances ============

    async fn instance_create(&self, project: &str, body: &InstanceCreate) -> Result<Instance>;
    async fn instance_view(&self, instance: &str) -> Result<Instance>;
    async fn instance_update(&self, instance: &str, body: &InstanceUpdate) -> Result<Instance>;
    async fn instance_delete(&self, instance: &str) -> Result<()>;
    async fn instance_start(&self, instance: &str) -> Result<Instance>;
    async fn instance_stop(&self, instance: &str) -> Result<Instance>;

    async fn instance_disk_list(&self, instance: &str) -> Result<Vec<Disk>>;
    async fn instance_disk_attach(&self, instance: &str, disk: &str) -> Result<Disk>;
    async fn instance_disk_detach(&self, instance: &str, disk: &str) -> Result<Disk>;

    async fn instance_external_ip_list(&self, instance: &str) -> Result<Vec<ExternalIp>>;
    async fn instance_ephemeral_ip_attach(
        &self,
        instance: &str,
        body: &EphemeralIpCreate,
    ) -> Result<ExternalIp>;
    async fn instance_ephemeral_ip_detach(
        &self,
        instance: &str,
        ip_version: Option<IpVersion>,
    ) -> Result<()>;

    async fn instance_network_interface_list(
        &self,
        instance: &str,
    ) -> Result<Vec<InstanceNetworkInterface>>;
    async fn instance_network_interface_create(
        &self,
        instance: &str,
        body: &InstanceNetworkInterfaceCreate,
    ) -> Result<InstanceNetworkInterface>;
    async fn instance_network_interface_delete(&self, interface: &str) -> Result<()>;

    async fn instance_anti_affinity_group_list(
        &self,
        instance: &str,
    ) -> Result<Vec<AntiAffinityGroup>>;
    async fn instance_ssh_public_key_list(&self, instance: &str) -> Result<Vec<SshKey>>;

    // ============ Addresses ============

    async fn floating_ip_create(&self, project: &str, body: &FloatingIpCreate)
    -> Result<FloatingIp>;
    async fn floating_ip_view(&self, floating_ip: &str) -> Result<FloatingIp>;
    async fn floating_ip_update(
        &self,
        floating_ip: &str,
        body: &NameDescription,
    ) -> Result<FloatingIp>;
    async fn floating_ip_delete(&self, floating_ip: &str) -> Result<()>;
    async fn floating_ip_attach(
        &self,
        floating_ip: &str,
        body: &FloatingIpAttach,
    ) -> Result<FloatingIp>;
    async fn floating_ip_detach(&self, floating_ip: &str) -> Result<FloatingIp>;

    async fn external_subnet_create(
        &self,
        project: &str,
        body: &ExternalSubnetCreate,
    ) -> Result<ExternalSubnet>;
    async fn external_subnet_view(&self, subnet: &str) -> Result<ExternalSubnet>;
    async fn external_subnet_update(
        &self,
        subnet: &str,
        body: &NameDescription,
    ) -> Result<ExternalSubnet>;
    async fn external_subnet_delete(&self, subnet: &str) -> Result<()>;
    async fn external_subnet_attach(
        &self,
        subnet: &str,
        body: &ExternalSubnetAttach,
    ) -> Result<ExternalSubnet>;
    async fn external_subnet_detach(&self, subnet: &str) -> Result<ExternalSubnet>;

    // ============ Affinity ============

    async fn anti_affinity_group_create(
        &self,
        project: &str,
        body: &AntiAffinityGroupCreate,
    ) -> Result<AntiAffinityGroup>;
    async fn anti_affinity_group_view(&self, group: &str) -> Result<AntiAffinityGroup>;
    async fn anti_affinity_group_update(
        &self,
        group: &str,
        body: &NameDescription,
    ) -> Result<AntiAffinityGroup>;
    async fn anti_affinity_group_delete(&self, group: &str) -> Result<()>;
    async fn anti_affinity_group_member_instance_add(
        &self,
        group: &str,
        instance: &str,
    ) -> Result<()>;
    async fn anti_affinity_group_member_instance_delete(
        &self,
        group: &str,
        instance: &str,
    ) -> Result<()>;

    // ============ SSH keys ============

    async fn current_user_ssh_key_create(&self, body: &SshKeyCreate) -> Result<SshKey>;
    async fn current_user_ssh_key_view(&self, key: &str) -> Result<SshKey>;
    async fn current_user_ssh_key_delete(&self, key: &str) -> Result<()>;

    // ============ System networking ============

    async fn networking_address_lot_create(
        &self,
        body: &AddressLotCreate,
    ) -> Result<AddressLotWithBlocks>;
    async fn networking_address_lot_view(&self, lot: &str) -> Result<AddressLotWithBlocks>;
    async fn networking_address_lot_delete(&self, lot: &str) -> Result<()>;

    /// Creates or replaces the settings object of that name
    async fn networking_switch_port_settings_create(
        &self,
        body: &SwitchPortSettingsCreate,
    ) -> Result<SwitchPortSettings>;
    async fn networking_switch_port_settings_view(
        &self,
        port: &str,
    ) -> Result<SwitchPortSettings>;
    async fn networking_switch_port_settings_delete(&self, port: &str) -> Result<()>;

    // ============ Lookups ============

    async fn project_list(&self) -> Result<Vec<Project>>;
    /// Images of `project`, or the silo's images when no project is given
    async fn image_list(&self, project: Option<&str>) -> Result<Vec<Image>>;
    async fn image_lookup(&self, image: &str, project: Option<&str>) -> Result<Image>;
    async fn system_ip_pool_list(&self) -> Result<Vec<IpPool>>;
    async fn project_ip_pool_view(&self, pool: &str) -> Result<SiloIpPool>;
    async fn networking_address_lot_list(&self) -> Result<Vec<AddressLot>>;
    async fn vpc_subnet_lookup(&self, subnet: &str, vpc: &str, project: &str)
    -> Result<VpcSubnet>;
    async fn vpc_router_lookup(&self, router: &str, vpc: &str, project: &str)
    -> Result<VpcRouter>;
    async fn vpc_router_route_lookup(
        &self,
        route: &str,
        router: &str,
        vpc: &str,
        project: &str,
    ) -> Result<RouterRoute>;
    async fn internet_gateway_lookup(
        &self,
        gateway: &str,
        vpc: &str,
        project: &str,
    ) -> Result<InternetGateway>;
    async fn floating_ip_lookup(&self, floating_ip: &str, project: &str) -> Result<FloatingIp>;
    async fn anti_affinity_group_lookup(
        &self,
        group: &str,
        project: &str,
    ) -> Result<AntiAffinityGroup>;
}
