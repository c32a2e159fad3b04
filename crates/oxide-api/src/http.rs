//! HTTP implementation of [`OxideApi`]
//!
//! Talks to the control plane with Bearer token authentication. List
//! endpoints are paginated with `page_token` until `next_page` is empty.

use crate::client::OxideApi;
use crate::error::{ApiError, ErrorBody, Result};
use crate::types::*;
use async_trait::async_trait;
use reqwest::{Method, RequestBuilder};
use serde::Serialize;
use serde::de::DeserializeOwned;

const DEFAULT_USER_AGENT: &str = concat!("oxide-provider/", env!("CARGO_PKG_VERSION"));
const PAGE_LIMIT: &str = "100";

/// Oxide API client over HTTPS
pub struct HttpClient {
    client: reqwest::Client,
    host: String,
    token: String,
}

impl HttpClient {
    /// Create a client for `host` (scheme included) authenticated with `token`
    pub fn new(host: impl Into<String>, token: impl Into<String>) -> Result<Self> {
        Self::with_user_agent(host, token, DEFAULT_USER_AGENT)
    }

    pub fn with_user_agent(
        host: impl Into<String>,
        token: impl Into<String>,
        user_agent: &str,
    ) -> Result<Self> {
        let client = reqwest::Client::builder().user_agent(user_agent).build()?;
        Ok(Self {
            client,
            host: host.into().trim_end_matches('/').to_string(),
            token: token.into(),
        })
    }

    /// Base URL of the control plane
    pub fn host(&self) -> &str {
        &self.host
    }

    fn request(&self, method: Method, path: &str, query: &[(&str, &str)]) -> RequestBuilder {
        let url = format!("{}{}", self.host, path);
        tracing::trace!("{} {}", method, url);
        let builder = self.client.request(method, &url).bearer_auth(&self.token);
        if query.is_empty() {
            builder
        } else {
            builder.query(query)
        }
    }

    async fn execute(&self, builder: RequestBuilder) -> Result<reqwest::Response> {
        let response = builder.send().await?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let text = response.text().await.unwrap_or_default();
        let body = serde_json::from_str::<ErrorBody>(&text).unwrap_or_else(|_| ErrorBody {
            message: text,
            ..Default::default()
        });
        tracing::debug!(
            "request failed: status={}, request_id={}",
            status.as_u16(),
            body.request_id
        );
        Err(ApiError::http(status.as_u16(), body))
    }

    async fn get<T: DeserializeOwned>(&self, path: &str, query: &[(&str, &str)]) -> Result<T> {
        let response = self.execute(self.request(Method::GET, path, query)).await?;
        Ok(response.json().await?)
    }

    async fn send<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        query: &[(&str, &str)],
        body: &B,
    ) -> Result<T> {
        let response = self
            .execute(self.request(method, path, query).json(body))
            .await?;
        Ok(response.json().await?)
    }

    async fn post<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, &str)],
        body: &B,
    ) -> Result<T> {
        self.send(Method::POST, path, query, body).await
    }

    async fn put<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, &str)],
        body: &B,
    ) -> Result<T> {
        self.send(Method::PUT, path, query, body).await
    }

    /// POST whose response body is ignored
    async fn post_no_content<B: Serialize + ?Sized>(
        &self,
        path: &str,
        query: &[(&str, &str)],
        body: Option<&B>,
    ) -> Result<()> {
        let mut builder = self.request(Method::POST, path, query);
        if let Some(body) = body {
            builder = builder.json(body);
        }
        self.execute(builder).await?;
        Ok(())
    }

    async fn delete(&self, path: &str, query: &[(&str, &str)]) -> Result<()> {
        self.execute(self.request(Method::DELETE, path, query))
            .await?;
        Ok(())
    }

    /// Collect every page of a list endpoint
    async fn list_all<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, &str)],
    ) -> Result<Vec<T>> {
        let mut items = Vec::new();
        let mut token: Option<String> = None;

        loop {
            let page: ResultsPage<T> = {
                let mut params: Vec<(&str, &str)> = query.to_vec();
                params.push(("limit", PAGE_LIMIT));
                if let Some(token) = token.as_deref() {
                    params.push(("page_token", token));
                }
                self.get(path, &params).await?
            };
            items.extend(page.items);

            match page.next_page {
                Some(next) if !next.is_empty() => token = Some(next),
                _ => break,
            }
        }

        Ok(items)
    }
}

fn scope<'a>(pairs: &[(&'a str, Option<&'a str>)]) -> Vec<(&'a str, &'a str)> {
    pairs
        .iter()
        .filter_map(|(k, v)| v.map(|v| (*k, v)))
        .collect()
}

#[async_trait]
impl OxideApi for HttpClient {
    async fn project_create(&self, body: &ProjectCreate) -> Result<Project> {
        self.post("/v1/projects", &[], body).await
    }

    async fn project_view(&self, project: &str) -> Result<Project> {
        self.get(&format!("/v1/projects/{}", project), &[]).await
    }

    async fn project_update(&self, project: &str, body: &ProjectUpdate) -> Result<Project> {
        self.put(&format!("/v1/projects/{}", project), &[], body)
            .await
    }

    async fn project_delete(&self, project: &str) -> Result<()> {
        self.delete(&format!("/v1/projects/{}", project), &[]).await
    }

    async fn silo_create(&self, body: &SiloCreate) -> Result<Silo> {
        self.post("/v1/system/silos", &[], body).await
    }

    async fn silo_view(&self, silo: &str) -> Result<Silo> {
        self.get(&format!("/v1/system/silos/{}", silo), &[]).await
    }

    async fn silo_delete(&self, silo: &str) -> Result<()> {
        self.delete(&format!("/v1/system/silos/{}", silo), &[])
            .await
    }

    async fn silo_quotas_view(&self, silo: &str) -> Result<SiloQuotas> {
        self.get(&format!("/v1/system/silos/{}/quotas", silo), &[])
            .await
    }

    async fn silo_quotas_update(
        &self,
        silo: &str,
        body: &SiloQuotasUpdate,
    ) -> Result<SiloQuotas> {
        self.put(&format!("/v1/system/silos/{}/quotas", silo), &[], body)
            .await
    }

    async fn saml_identity_provider_create(
        &self,
        silo: &str,
        body: &SamlIdentityProviderCreate,
    ) -> Result<SamlIdentityProvider> {
        self.post(
            "/v1/system/identity-providers/saml",
            &[("silo", silo)],
            body,
        )
        .await
    }

    async fn saml_identity_provider_view(
        &self,
        provider: &str,
        silo: Option<&str>,
    ) -> Result<SamlIdentityProvider> {
        self.get(
            &format!("/v1/system/identity-providers/saml/{}", provider),
            &scope(&[("silo", silo)]),
        )
        .await
    }

    async fn vpc_create(&self, project: &str, body: &VpcCreate) -> Result<Vpc> {
        self.post("/v1/vpcs", &[("project", project)], body).await
    }

    async fn vpc_view(&self, vpc: &str, project: Option<&str>) -> Result<Vpc> {
        self.get(
            &format!("/v1/vpcs/{}", vpc),
            &scope(&[("project", project)]),
        )
        .await
    }

    async fn vpc_update(&self, vpc: &str, body: &VpcUpdate) -> Result<Vpc> {
        self.put(&format!("/v1/vpcs/{}", vpc), &[], body).await
    }

    async fn vpc_delete(&self, vpc: &str, project: Option<&str>) -> Result<()> {
        self.delete(
            &format!("/v1/vpcs/{}", vpc),
            &scope(&[("project", project)]),
        )
        .await
    }

    async fn vpc_subnet_create(&self, vpc: &str, body: &VpcSubnetCreate) -> Result<VpcSubnet> {
        self.post("/v1/vpc-subnets", &[("vpc", vpc)], body).await
    }

    async fn vpc_subnet_view(&self, subnet: &str) -> Result<VpcSubnet> {
        self.get(&format!("/v1/vpc-subnets/{}", subnet), &[]).await
    }

    async fn vpc_subnet_update(
        &self,
        subnet: &str,
        body: &VpcSubnetUpdate,
    ) -> Result<VpcSubnet> {
        self.put(&format!("/v1/vpc-subnets/{}", subnet), &[], body)
            .await
    }

    async fn vpc_subnet_delete(
        &self,
        subnet: &str,
        vpc: Option<&str>,
        project: Option<&str>,
    ) -> Result<()> {
        self.delete(
            &format!("/v1/vpc-subnets/{}", subnet),
            &scope(&[("vpc", vpc), ("project", project)]),
        )
        .await
    }

    async fn vpc_router_create(&self, vpc: &str, body: &NameDescription) -> Result<VpcRouter> {
        self.post("/v1/vpc-routers", &[("vpc", vpc)], body).await
    }

    async fn vpc_router_view(&self, router: &str) -> Result<VpcRouter> {
        self.get(&format!("/v1/vpc-routers/{}", router), &[]).await
    }

    async fn vpc_router_update(
        &self,
        router: &str,
        body: &NameDescription,
    ) -> Result<VpcRouter> {
        self.put(&format!("/v1/vpc-routers/{}", router), &[], body)
            .await
    }

    async fn vpc_router_delete(&self, router: &str) -> Result<()> {
        self.delete(&format!("/v1/vpc-routers/{}", router), &[])
            .await
    }

    async fn vpc_router_route_create(
        &self,
        router: &str,
        body: &RouterRouteCreate,
    ) -> Result<RouterRoute> {
        self.post("/v1/vpc-router-routes", &[("router", router)], body)
            .await
    }

    async fn vpc_router_route_view(&self, route: &str) -> Result<RouterRoute> {
        self.get(&format!("/v1/vpc-router-routes/{}", route), &[])
            .await
    }

    async fn vpc_router_route_update(
        &self,
        route: &str,
        body: &RouterRouteCreate,
    ) -> Result<RouterRoute> {
        self.put(&format!("/v1/vpc-router-routes/{}", route), &[], body)
            .await
    }

    async fn vpc_router_route_delete(&self, route: &str) -> Result<()> {
        self.delete(&format!("/v1/vpc-router-routes/{}", route), &[])
            .await
    }

    async fn internet_gateway_create(
        &self,
        vpc: &str,
        body: &NameDescription,
    ) -> Result<InternetGateway> {
        self.post("/v1/internet-gateways", &[("vpc", vpc)], body)
            .await
    }

    async fn internet_gateway_view(&self, gateway: &str) -> Result<InternetGateway> {
        self.get(&format!("/v1/internet-gateways/{}", gateway), &[])
            .await
    }

    async fn internet_gateway_delete(&self, gateway: &str, cascade: bool) -> Result<()> {
        let cascade = if cascade { "true" } else { "false" };
        self.delete(
            &format!("/v1/internet-gateways/{}", gateway),
            &[("cascade", cascade)],
        )
        .await
    }

    async fn vpc_firewall_rules_view(&self, vpc: &str) -> Result<VpcFirewallRules> {
        self.get("/v1/vpc-firewall-rules", &[("vpc", vpc)]).await
    }

    async fn vpc_firewall_rules_update(
        &self,
        vpc: &str,
        body: &VpcFirewallRuleUpdateParams,
    ) -> Result<VpcFirewallRules> {
        self.put("/v1/vpc-firewall-rules", &[("vpc", vpc)], body)
            .await
    }

    async fn ip_pool_create(&self, body: &IpPoolCreate) -> Result<IpPool> {
        self.post("/v1/system/ip-pools", &[], body).await
    }

    async fn ip_pool_view(&self, pool: &str) -> Result<IpPool> {
        self.get(&format!("/v1/system/ip-pools/{}", pool), &[])
            .await
    }

    async fn ip_pool_update(&self, pool: &str, body: &NameDescription) -> Result<IpPool> {
        self.put(&format!("/v1/system/ip-pools/{}", pool), &[], body)
            .await
    }

    async fn ip_pool_delete(&self, pool: &str) -> Result<()> {
        self.delete(&format!("/v1/system/ip-pools/{}", pool), &[])
            .await
    }

    async fn ip_pool_range_list(&self, pool: &str) -> Result<Vec<IpPoolRange>> {
        self.list_all(&format!("/v1/system/ip-pools/{}/ranges", pool), &[])
            .await
    }

    async fn ip_pool_range_add(&self, pool: &str, range: &IpRange) -> Result<IpPoolRange> {
        self.post(
            &format!("/v1/system/ip-pools/{}/ranges/add", pool),
            &[],
            range,
        )
        .await
    }

    async fn ip_pool_range_remove(&self, pool: &str, range: &IpRange) -> Result<()> {
        self.post_no_content(
            &format!("/v1/system/ip-pools/{}/ranges/remove", pool),
            &[],
            Some(range),
        )
        .await
    }

    async fn ip_pool_silo_link(
        &self,
        pool: &str,
        body: &IpPoolLinkSilo,
    ) -> Result<IpPoolSiloLink> {
        self.post(&format!("/v1/system/ip-pools/{}/silos", pool), &[], body)
            .await
    }

    async fn ip_pool_silo_list(&self, pool: &str) -> Result<Vec<IpPoolSiloLink>> {
        self.list_all(&format!("/v1/system/ip-pools/{}/silos", pool), &[])
            .await
    }

    async fn ip_pool_silo_update(
        &self,
        pool: &str,
        silo: &str,
        body: &IsDefault,
    ) -> Result<IpPoolSiloLink> {
        self.put(
            &format!("/v1/system/ip-pools/{}/silos/{}", pool, silo),
            &[],
            body,
        )
        .await
    }

    async fn ip_pool_silo_unlink(&self, pool: &str, silo: &str) -> Result<()> {
        self.delete(
            &format!("/v1/system/ip-pools/{}/silos/{}", pool, silo),
            &[],
        )
        .await
    }

    async fn subnet_pool_create(&self, body: &SubnetPoolCreate) -> Result<SubnetPool> {
        self.post("/v1/system/subnet-pools", &[], body).await
    }

    async fn subnet_pool_view(&self, pool: &str) -> Result<SubnetPool> {
        self.get(&format!("/v1/system/subnet-pools/{}", pool), &[])
            .await
    }

    async fn subnet_pool_update(
        &self,
        pool: &str,
        body: &NameDescription,
    ) -> Result<SubnetPool> {
        self.put(&format!("/v1/system/subnet-pools/{}", pool), &[], body)
            .await
    }

    async fn subnet_pool_delete(&self, pool: &str) -> Result<()> {
        self.delete(&format!("/v1/system/subnet-pools/{}", pool), &[])
            .await
    }

    async fn subnet_pool_member_list(&self, pool: &str) -> Result<Vec<SubnetPoolMember>> {
        self.list_all(&format!("/v1/system/subnet-pools/{}/members", pool), &[])
            .await
    }

    async fn subnet_pool_member_add(
        &self,
        pool: &str,
        body: &SubnetPoolMemberAdd,
    ) -> Result<SubnetPoolMember> {
        self.post(
            &format!("/v1/system/subnet-pools/{}/members/add", pool),
            &[],
            body,
        )
        .await
    }

    async fn subnet_pool_member_remove(
        &self,
        pool: &str,
        body: &SubnetPoolMemberRemove,
    ) -> Result<()> {
        self.post_no_content(
            &format!("/v1/system/subnet-pools/{}/members/remove", pool),
            &[],
            Some(body),
        )
        .await
    }

    async fn subnet_pool_silo_link(
        &self,
        pool: &str,
        body: &SubnetPoolLinkSilo,
    ) -> Result<SubnetPoolSiloLink> {
        self.post(
            &format!("/v1/system/subnet-pools/{}/silos", pool),
            &[],
            body,
        )
        .await
    }

    async fn subnet_pool_silo_update(
        &self,
        pool: &str,
        silo: &str,
        body: &IsDefault,
    ) -> Result<SubnetPoolSiloLink> {
        self.put(
            &format!("/v1/system/subnet-pools/{}/silos/{}", pool, silo),
            &[],
            body,
        )
        .await
    }

    async fn subnet_pool_silo_unlink(&self, pool: &str, silo: &str) -> Result<()> {
        self.delete(
            &format!("/v1/system/subnet-pools/{}/silos/{}", pool, silo),
            &[],
        )
        .await
    }

    async fn silo_subnet_pool_list(&self, silo: &str) -> Result<Vec<SiloSubnetPool>> {
        self.list_all(&format!("/v1/system/silos/{}/subnet-pools", silo), &[])
            .await
    }

    async fn disk_create(&self, project: &str, body: &DiskCreate) -> Result<Disk> {
        self.post("/v1/disks", &[("project", project)], body).await
    }

    async fn disk_view(&self, disk: &str, project: Option<&str>) -> Result<Disk> {
        self.get(
            &format!("/v1/disks/{}", disk),
            &scope(&[("project", project)]),
        )
        .await
    }

    async fn disk_delete(&self, disk: &str) -> Result<()> {
        self.delete(&format!("/v1/disks/{}", disk), &[]).await
    }

    async fn image_create(&self, project: &str, body: &ImageCreate) -> Result<Image> {
        self.post("/v1/images", &[("project", project)], body).await
    }

    async fn image_view(&self, image: &str) -> Result<Image> {
        self.get(&format!("/v1/images/{}", image), &[]).await
    }

    async fn image_delete(&self, image: &str) -> Result<()> {
        self.delete(&format!("/v1/images/{}", image), &[]).await
    }

    async fn snapshot_create(&self, project: &str, body: &SnapshotCreate) -> Result<Snapshot> {
        self.post("/v1/snapshots", &[("project", project)], body)
            .await
    }

    async fn snapshot_view(&self, snapshot: &str) -> Result<Snapshot> {
        self.get(&format!("/v1/snapshots/{}", snapshot), &[]).await
    }

    async fn snapshot_delete(&self, snapshot: &str) -> Result<()> {
        self.delete(&format!("/v1/snapshots/{}", snapshot), &[])
            .await
    }

    async fn instance_create(&self, project: &str, body: &InstanceCreate) -> Result<Instance> {
        self.post("/v1/instances", &[("project", project)], body)
            .await
    }

    async fn instance_view(&self, instance: &str) -> Result<Instance> {
        self.get(&format!("/v1/instances/{}", instance), &[]).await
    }

    async fn instance_update(&self, instance: &str, body: &InstanceUpdate) -> Result<Instance> {
        self.put(&format!("/v1/instances/{}", instance), &[], body)
            .await
    }

    async fn instance_delete(&self, instance: &str) -> Result<()> {
        self.delete(&format!("/v1/instances/{}", instance), &[])
            .await
    }

    async fn instance_start(&self, instance: &str) -> Result<Instance> {
        let response = self
            .execute(self.request(
                Method::POST,
                &format!("/v1/instances/{}/start", instance),
                &[],
            ))
            .await?;
        Ok(response.json().await?)
    }

    async fn instance_stop(&self, instance: &str) -> Result<Instance> {
        let response = self
            .execute(self.request(
                Method::POST,
                &format!("/v1/instances/{}/stop", instance),
                &[],
            ))
            .await?;
        Ok(response.json().await?)
    }

    async fn instance_disk_list(&self, instance: &str) -> Result<Vec<Disk>> {
        self.list_all(&format!("/v1/instances/{}/disks", instance), &[])
            .await
    }

    async fn instance_disk_attach(&self, instance: &str, disk: &str) -> Result<Disk> {
        self.post(
            &format!("/v1/instances/{}/disks/attach", instance),
            &[],
            &serde_json::json!({ "disk": disk }),
        )
        .await
    }

    async fn instance_disk_detach(&self, instance: &str, disk: &str) -> Result<Disk> {
        self.post(
            &format!("/v1/instances/{}/disks/detach", instance),
            &[],
            &serde_json::json!({ "disk": disk }),
        )
        .await
    }

    async fn instance_external_ip_list(&self, instance: &str) -> Result<Vec<ExternalIp>> {
        let page: ResultsPage<ExternalIp> = self
            .get(&format!("/v1/instances/{}/external-ips", instance), &[])
            .await?;
        Ok(page.items)
    }

    async fn instance_ephemeral_ip_attach(
        &self,
        instance: &str,
        body: &EphemeralIpCreate,
    ) -> Result<ExternalIp> {
        self.post(
            &format!("/v1/instances/{}/external-ips/ephemeral", instance),
            &[],
            body,
        )
        .await
    }

    async fn instance_ephemeral_ip_detach(
        &self,
        instance: &str,
        ip_version: Option<IpVersion>,
    ) -> Result<()> {
        self.delete(
            &format!("/v1/instances/{}/external-ips/ephemeral", instance),
            &scope(&[("ip_version", ip_version.map(IpVersion::as_str))]),
        )
        .await
    }

    async fn instance_network_interface_list(
        &self,
        instance: &str,
    ) -> Result<Vec<InstanceNetworkInterface>> {
        self.list_all("/v1/network-interfaces", &[("instance", instance)])
            .await
    }

    async fn instance_network_interface_create(
        &self,
        instance: &str,
        body: &InstanceNetworkInterfaceCreate,
    ) -> Result<InstanceNetworkInterface> {
        self.post("/v1/network-interfaces", &[("instance", instance)], body)
            .await
    }

    async fn instance_network_interface_delete(&self, interface: &str) -> Result<()> {
        self.delete(&format!("/v1/network-interfaces/{}", interface), &[])
            .await
    }

    async fn instance_anti_affinity_group_list(
        &self,
        instance: &str,
    ) -> Result<Vec<AntiAffinityGroup>> {
        self.list_all(
            &format!("/v1/instances/{}/anti-affinity-groups", instance),
            &[],
        )
        .await
    }

    async fn instance_ssh_public_key_list(&self, instance: &str) -> Result<Vec<SshKey>> {
        self.list_all(&format!("/v1/instances/{}/ssh-public-keys", instance), &[])
            .await
    }

    async fn floating_ip_create(
        &self,
        project: &str,
        body: &FloatingIpCreate,
    ) -> Result<FloatingIp> {
        self.post("/v1/floating-ips", &[("project", project)], body)
            .await
    }

    async fn floating_ip_view(&self, floating_ip: &str) -> Result<FloatingIp> {
        self.get(&format!("/v1/floating-ips/{}", floating_ip), &[])
            .await
    }

    async fn floating_ip_update(
        &self,
        floating_ip: &str,
        body: &NameDescription,
    ) -> Result<FloatingIp> {
        self.put(&format!("/v1/floating-ips/{}", floating_ip), &[], body)
            .await
    }

    async fn floating_ip_delete(&self, floating_ip: &str) -> Result<()> {
        self.delete(&format!("/v1/floating-ips/{}", floating_ip), &[])
            .await
    }

    async fn floating_ip_attach(
        &self,
        floating_ip: &str,
        body: &FloatingIpAttach,
    ) -> Result<FloatingIp> {
        self.post(
            &format!("/v1/floating-ips/{}/attach", floating_ip),
            &[],
            body,
        )
        .await
    }

    async fn floating_ip_detach(&self, floating_ip: &str) -> Result<FloatingIp> {
        let response = self
            .execute(self.request(
                Method::POST,
                &format!("/v1/floating-ips/{}/detach", floating_ip),
                &[],
            ))
            .await?;
        Ok(response.json().await?)
    }

    async fn external_subnet_create(
        &self,
        project: &str,
        body: &ExternalSubnetCreate,
    ) -> Result<ExternalSubnet> {
        self.post("/v1/external-subnets", &[("project", project)], body)
            .await
    }

    async fn external_subnet_view(&self, subnet: &str) -> Result<ExternalSubnet> {
        self.get(&format!("/v1/external-subnets/{}", subnet), &[])
            .await
    }

    async fn external_subnet_update(
        &self,
        subnet: &str,
        body: &NameDescription,
    ) -> Result<ExternalSubnet> {
        self.put(&format!("/v1/external-subnets/{}", subnet), &[], body)
            .await
    }

    async fn external_subnet_delete(&self, subnet: &str) -> Result<()> {
        self.delete(&format!("/v1/external-subnets/{}", subnet), &[])
            .await
    }

    async fn external_subnet_attach(
        &self,
        subnet: &str,
        body: &ExternalSubnetAttach,
    ) -> Result<ExternalSubnet> {
        self.post(
            &format!("/v1/external-subnets/{}/attach", subnet),
            &[],
            body,
        )
        .await
    }

    async fn external_subnet_detach(&self, subnet: &str) -> Result<ExternalSubnet> {
        let response = self
            .execute(self.request(
                Method::POST,
                &format!("/v1/external-subnets/{}/detach", subnet),
                &[],
            ))
            .await?;
        Ok(response.json().await?)
    }

    async fn anti_affinity_group_create(
        &self,
        project: &str,
        body: &AntiAffinityGroupCreate,
    ) -> Result<AntiAffinityGroup> {
        self.post("/v1/anti-affinity-groups", &[("project", project)], body)
            .await
    }

    async fn anti_affinity_group_view(&self, group: &str) -> Result<AntiAffinityGroup> {
        self.get(&format!("/v1/anti-affinity-groups/{}", group), &[])
            .await
    }

    async fn anti_affinity_group_update(
        &self,
        group: &str,
        body: &NameDescription,
    ) -> Result<AntiAffinityGroup> {
        self.put(&format!("/v1/anti-affinity-groups/{}", group), &[], body)
            .await
    }

    async fn anti_affinity_group_delete(&self, group: &str) -> Result<()> {
        self.delete(&format!("/v1/anti-affinity-groups/{}", group), &[])
            .await
    }

    async fn anti_affinity_group_member_instance_add(
        &self,
        group: &str,
        instance: &str,
    ) -> Result<()> {
        self.post_no_content::<()>(
            &format!(
                "/v1/anti-affinity-groups/{}/members/instance/{}",
                group, instance
            ),
            &[],
            None,
        )
        .await
    }

    async fn anti_affinity_group_member_instance_delete(
        &self,
        group: &str,
        instance: &str,
    ) -> Result<()> {
        self.delete(
            &format!(
                "/v1/anti-affinity-groups/{}/members/instance/{}",
                group, instance
            ),
            &[],
        )
        .await
    }

    async fn current_user_ssh_key_create(&self, body: &SshKeyCreate) -> Result<SshKey> {
        self.post("/v1/me/ssh-keys", &[], body).await
    }

    async fn current_user_ssh_key_view(&self, key: &str) -> Result<SshKey> {
        self.get(&format!("/v1/me/ssh-keys/{}", key), &[]).await
    }

    async fn current_user_ssh_key_delete(&self, key: &str) -> Result<()> {
        self.delete(&format!("/v1/me/ssh-keys/{}", key), &[]).await
    }

    async fn networking_address_lot_create(
        &self,
        body: &AddressLotCreate,
    ) -> Result<AddressLotWithBlocks> {
        self.post("/v1/system/networking/address-lot", &[], body)
            .await
    }

    async fn networking_address_lot_view(&self, lot: &str) -> Result<AddressLotWithBlocks> {
        self.get(&format!("/v1/system/networking/address-lot/{}", lot), &[])
            .await
    }

    async fn networking_address_lot_delete(&self, lot: &str) -> Result<()> {
        self.delete(&format!("/v1/system/networking/address-lot/{}", lot), &[])
            .await
    }

    async fn networking_switch_port_settings_create(
        &self,
        body: &SwitchPortSettingsCreate,
    ) -> Result<SwitchPortSettings> {
        self.post("/v1/system/networking/switch-port-settings", &[], body)
            .await
    }

    async fn networking_switch_port_settings_view(
        &self,
        port: &str,
    ) -> Result<SwitchPortSettings> {
        self.get(
            &format!("/v1/system/networking/switch-port-settings/{}", port),
            &[],
        )
        .await
    }

    async fn networking_switch_port_settings_delete(&self, port: &str) -> Result<()> {
        self.delete(
            "/v1/system/networking/switch-port-settings",
            &[("port_settings", port)],
        )
        .await
    }

    async fn project_list(&self) -> Result<Vec<Project>> {
        self.list_all("/v1/projects", &[]).await
    }

    async fn image_list(&self, project: Option<&str>) -> Result<Vec<Image>> {
        self.list_all("/v1/images", &scope(&[("project", project)]))
            .await
    }

    async fn image_lookup(&self, image: &str, project: Option<&str>) -> Result<Image> {
        self.get(
            &format!("/v1/images/{}", image),
            &scope(&[("project", project)]),
        )
        .await
    }

    async fn system_ip_pool_list(&self) -> Result<Vec<IpPool>> {
        self.list_all("/v1/system/ip-pools", &[]).await
    }

    async fn project_ip_pool_view(&self, pool: &str) -> Result<SiloIpPool> {
        self.get(&format!("/v1/ip-pools/{}", pool), &[]).await
    }

    async fn networking_address_lot_list(&self) -> Result<Vec<AddressLot>> {
        self.list_all("/v1/system/networking/address-lot", &[])
            .await
    }

    async fn vpc_subnet_lookup(
        &self,
        subnet: &str,
        vpc: &str,
        project: &str,
    ) -> Result<VpcSubnet> {
        self.get(
            &format!("/v1/vpc-subnets/{}", subnet),
            &[("project", project), ("vpc", vpc)],
        )
        .await
    }

    async fn vpc_router_lookup(
        &self,
        router: &str,
        vpc: &str,
        project: &str,
    ) -> Result<VpcRouter> {
        self.get(
            &format!("/v1/vpc-routers/{}", router),
            &[("project", project), ("vpc", vpc)],
        )
        .await
    }

    async fn vpc_router_route_lookup(
        &self,
        route: &str,
        router: &str,
        vpc: &str,
        project: &str,
    ) -> Result<RouterRoute> {
        self.get(
            &format!("/v1/vpc-router-routes/{}", route),
            &[("project", project), ("vpc", vpc), ("router", router)],
        )
        .await
    }

    async fn internet_gateway_lookup(
        &self,
        gateway: &str,
        vpc: &str,
        project: &str,
    ) -> Result<InternetGateway> {
        self.get(
            &format!("/v1/internet-gateways/{}", gateway),
            &[("project", project), ("vpc", vpc)],
        )
        .await
    }

    async fn floating_ip_lookup(&self, floating_ip: &str, project: &str) -> Result<FloatingIp> {
        self.get(
            &format!("/v1/floating-ips/{}", floating_ip),
            &[("project", project)],
        )
        .await
    }

    async fn anti_affinity_group_lookup(
        &self,
        group: &str,
        project: &str,
    ) -> Result<AntiAffinityGroup> {
        self.get(
            &format!("/v1/anti-affinity-groups/{}", group),
            &[("project", project)],
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_host_trailing_slash_trimmed() {
        let client = HttpClient::new("https://oxide.example.com/", "token").unwrap();
        assert_eq!(client.host(), "https://oxide.example.com");
    }

    #[test]
    fn test_scope_drops_missing_values() {
        assert_eq!(
            scope(&[("vpc", Some("v")), ("project", None)]),
            vec![("vpc", "v")]
        );
    }
}
