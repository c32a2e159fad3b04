//! `oxide_switch_port_settings`
//!
//! The create endpoint also replaces existing settings of the same name,
//! so update re-sends the full payload. The remote reports flat lists
//! tagged with their link; read groups them back by link name.

use super::{Client, Stamps, deleted, found, non_empty};
use async_trait::async_trait;
use oxide_api::{
    AddressConfig, BgpPeer, BgpPeerConfig, ImportExportPolicy, LinkConfig, LldpLinkConfig, Route,
    RouteConfig, SwitchAddress, SwitchInterfaceConfig, SwitchInterfaceKind, SwitchPortBgpPeerView,
    SwitchPortConfig, SwitchPortSettings, SwitchPortSettingsCreate, TxEqConfig,
};
use oxide_engine::resource::{decode, encode};
use oxide_engine::{
    Attribute, AttributeType, DeleteOutcome, EngineError, Phase, ReadOutcome, Resource, Result,
    Schema, Validator,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

const GEOMETRIES: [&str; 3] = ["qsfp28x1", "qsfp28x2", "sfp28x4"];
const FEC_TYPES: [&str; 3] = ["firecode", "none", "rs"];
const SPEEDS: [&str; 10] = [
    "speed0_g",
    "speed1_g",
    "speed10_g",
    "speed25_g",
    "speed40_g",
    "speed50_g",
    "speed100_g",
    "speed200_g",
    "speed400_g",
    "speed800_g",
];

pub struct SwitchPortSettingsResource {
    client: Client,
}

impl SwitchPortSettingsResource {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
struct SwitchPortSettingsModel {
    #[serde(flatten)]
    stamps: Stamps,
    name: String,
    description: String,
    port_config: PortConfigModel,
    addresses: Vec<LinkAddressesModel>,
    bgp_peers: Option<Vec<LinkPeersModel>>,
    groups: Option<Vec<String>>,
    interfaces: Option<Vec<InterfaceModel>>,
    links: Vec<LinkModel>,
    routes: Option<Vec<LinkRoutesModel>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
struct PortConfigModel {
    geometry: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
struct LinkAddressesModel {
    link_name: String,
    addresses: Vec<AddressModel>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
struct AddressModel {
    address: String,
    address_lot_id: String,
    vlan_id: Option<i64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
struct LinkPeersModel {
    link_name: String,
    peers: Vec<PeerModel>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
struct PolicyModel {
    #[serde(rename = "type")]
    kind: String,
    value: Option<Vec<String>>,
}

impl PolicyModel {
    fn to_api(&self) -> ImportExportPolicy {
        match self.kind.as_str() {
            "allow" => ImportExportPolicy::Allow(self.value.clone().unwrap_or_default()),
            _ => ImportExportPolicy::NoFiltering,
        }
    }

    fn from_api(policy: &ImportExportPolicy) -> Self {
        match policy {
            ImportExportPolicy::NoFiltering => Self {
                kind: "no_filtering".to_string(),
                value: None,
            },
            ImportExportPolicy::Allow(prefixes) => Self {
                kind: "allow".to_string(),
                value: Some(prefixes.clone()),
            },
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
struct PeerModel {
    address: String,
    allowed_export: PolicyModel,
    allowed_import: PolicyModel,
    bgp_config: String,
    communities: Vec<i64>,
    connect_retry: i64,
    delay_open: i64,
    enforce_first_as: bool,
    hold_time: i64,
    idle_hold_time: i64,
    interface_name: String,
    keepalive: i64,
    local_pref: Option<i64>,
    md5_auth_key: Option<String>,
    min_ttl: Option<i64>,
    multi_exit_discriminator: Option<i64>,
    remote_asn: Option<i64>,
    vlan_id: Option<i64>,
}

impl PeerModel {
    fn to_api(&self) -> BgpPeer {
        BgpPeer {
            addr: self.address.clone(),
            allowed_export: self.allowed_export.to_api(),
            allowed_import: self.allowed_import.to_api(),
            bgp_config: self.bgp_config.clone(),
            communities: self.communities.clone(),
            connect_retry: self.connect_retry,
            delay_open: self.delay_open,
            enforce_first_as: self.enforce_first_as,
            hold_time: self.hold_time,
            idle_hold_time: self.idle_hold_time,
            interface_name: self.interface_name.clone(),
            keepalive: self.keepalive,
            local_pref: self.local_pref,
            md5_auth_key: self.md5_auth_key.clone(),
            min_ttl: self.min_ttl,
            multi_exit_discriminator: self.multi_exit_discriminator,
            remote_asn: self.remote_asn,
            vlan_id: self.vlan_id,
        }
    }

    fn from_api(peer: &SwitchPortBgpPeerView) -> Result<Self> {
        let communities = peer
            .communities
            .iter()
            .map(|community| {
                community.parse::<i64>().map_err(|e| {
                    EngineError::internal(
                        "Error parsing community element",
                        format!("Could not parse {} as int64: {}", community, e),
                    )
                })
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self {
            address: peer.addr.clone(),
            allowed_export: PolicyModel::from_api(&peer.allowed_export),
            allowed_import: PolicyModel::from_api(&peer.allowed_import),
            bgp_config: peer.bgp_config.clone(),
            communities,
            connect_retry: peer.connect_retry,
            delay_open: peer.delay_open,
            enforce_first_as: peer.enforce_first_as,
            hold_time: peer.hold_time,
            idle_hold_time: peer.idle_hold_time,
            interface_name: peer.interface_name.clone(),
            keepalive: peer.keepalive,
            local_pref: peer.local_pref,
            md5_auth_key: peer.md5_auth_key.clone(),
            min_ttl: peer.min_ttl,
            multi_exit_discriminator: peer.multi_exit_discriminator,
            remote_asn: peer.remote_asn,
            vlan_id: peer.vlan_id,
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
struct InterfaceKindModel {
    #[serde(rename = "type")]
    kind: String,
    vid: Option<i64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
struct InterfaceModel {
    kind: InterfaceKindModel,
    link_name: String,
    v6_enabled: Option<bool>,
}

impl InterfaceKindModel {
    fn to_api(&self) -> Result<SwitchInterfaceKind> {
        match self.kind.as_str() {
            "primary" => Ok(SwitchInterfaceKind::Primary),
            "loopback" => Ok(SwitchInterfaceKind::Loopback),
            "vlan" => Ok(SwitchInterfaceKind::Vlan {
                vid: self.vid.ok_or_else(|| {
                    EngineError::config(
                        "Invalid interface kind",
                        "a vlan interface requires `vid`",
                    )
                })?,
            }),
            other => Err(EngineError::config(
                "Invalid interface kind",
                format!("unsupported interface type {:?}", other),
            )),
        }
    }

    fn from_api(kind: &SwitchInterfaceKind) -> Self {
        match kind {
            SwitchInterfaceKind::Primary => Self {
                kind: "primary".to_string(),
                vid: None,
            },
            SwitchInterfaceKind::Loopback => Self {
                kind: "loopback".to_string(),
                vid: None,
            },
            SwitchInterfaceKind::Vlan { vid } => Self {
                kind: "vlan".to_string(),
                vid: Some(*vid),
            },
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
struct LldpModel {
    chassis_id: Option<String>,
    enabled: bool,
    link_description: Option<String>,
    link_name: Option<String>,
    management_ip: Option<String>,
    system_description: Option<String>,
    system_name: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
struct TxEqModel {
    main: Option<i64>,
    post1: Option<i64>,
    post2: Option<i64>,
    pre1: Option<i64>,
    pre2: Option<i64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
struct LinkModel {
    autoneg: bool,
    fec: Option<String>,
    link_name: String,
    lldp: LldpModel,
    mtu: i64,
    speed: String,
    tx_eq: Option<TxEqModel>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
struct LinkRoutesModel {
    link_name: String,
    routes: Vec<RouteModel>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
struct RouteModel {
    dst: String,
    gw: String,
    rib_priority: Option<i64>,
    vid: Option<i64>,
}

impl SwitchPortSettingsModel {
    fn body(&self) -> Result<SwitchPortSettingsCreate> {
        let addresses = self
            .addresses
            .iter()
            .map(|link| {
                let addresses = link
                    .addresses
                    .iter()
                    .map(|a| SwitchAddress {
                        address: a.address.clone(),
                        address_lot: a.address_lot_id.clone(),
                        vlan_id: a.vlan_id,
                    })
                    .collect();
                (link.link_name.clone(), AddressConfig { addresses })
            })
            .collect();

        let bgp_peers = self
            .bgp_peers
            .iter()
            .flatten()
            .map(|link| {
                let peers = link.peers.iter().map(PeerModel::to_api).collect();
                (link.link_name.clone(), BgpPeerConfig { peers })
            })
            .collect();

        let interfaces = self
            .interfaces
            .iter()
            .flatten()
            .map(|interface| {
                Ok((
                    interface.link_name.clone(),
                    SwitchInterfaceConfig {
                        kind: interface.kind.to_api()?,
                        v6_enabled: interface.v6_enabled.unwrap_or(false),
                    },
                ))
            })
            .collect::<Result<BTreeMap<_, _>>>()?;

        let links = self
            .links
            .iter()
            .map(|link| {
                let lldp = &link.lldp;
                (
                    link.link_name.clone(),
                    LinkConfig {
                        autoneg: link.autoneg,
                        fec: link.fec.clone(),
                        lldp: LldpLinkConfig {
                            enabled: lldp.enabled,
                            chassis_id: lldp.chassis_id.clone(),
                            link_description: lldp.link_description.clone(),
                            link_name: lldp.link_name.clone(),
                            management_ip: lldp.management_ip.clone(),
                            system_description: lldp.system_description.clone(),
                            system_name: lldp.system_name.clone(),
                        },
                        mtu: link.mtu,
                        speed: link.speed.clone(),
                        tx_eq: link.tx_eq.as_ref().map(|tx| TxEqConfig {
                            main: tx.main,
                            post1: tx.post1,
                            post2: tx.post2,
                            pre1: tx.pre1,
                            pre2: tx.pre2,
                        }),
                    },
                )
            })
            .collect();

        let routes = self
            .routes
            .iter()
            .flatten()
            .map(|link| {
                let routes = link
                    .routes
                    .iter()
                    .map(|r| Route {
                        dst: r.dst.clone(),
                        gw: r.gw.clone(),
                        rib_priority: r.rib_priority,
                        vid: r.vid,
                    })
                    .collect();
                (link.link_name.clone(), RouteConfig { routes })
            })
            .collect();

        Ok(SwitchPortSettingsCreate {
            name: self.name.clone(),
            description: self.description.clone(),
            port_config: SwitchPortConfig {
                geometry: self.port_config.geometry.clone(),
            },
            addresses,
            bgp_peers,
            groups: self.groups.clone().unwrap_or_default(),
            interfaces,
            links,
            routes,
        })
    }

    fn observe(settings: &SwitchPortSettings) -> Result<Self> {
        let mut addresses: BTreeMap<String, Vec<AddressModel>> = BTreeMap::new();
        for a in &settings.addresses {
            addresses
                .entry(a.interface_name.clone())
                .or_default()
                .push(AddressModel {
                    address: a.address.clone(),
                    address_lot_id: a.address_lot_id.clone(),
                    vlan_id: a.vlan_id,
                });
        }

        let mut bgp_peers: BTreeMap<String, Vec<PeerModel>> = BTreeMap::new();
        for peer in &settings.bgp_peers {
            bgp_peers
                .entry(peer.link_name.clone())
                .or_default()
                .push(PeerModel::from_api(peer)?);
        }

        let mut routes: BTreeMap<String, Vec<RouteModel>> = BTreeMap::new();
        for r in &settings.routes {
            routes
                .entry(r.interface_name.clone())
                .or_default()
                .push(RouteModel {
                    dst: r.dst.clone(),
                    gw: r.gw.clone(),
                    rib_priority: r.rib_priority,
                    vid: r.vlan_id,
                });
        }

        let interfaces = settings
            .interfaces
            .iter()
            .map(|i| InterfaceModel {
                kind: InterfaceKindModel::from_api(&i.kind),
                link_name: i.interface_name.clone(),
                v6_enabled: Some(i.v6_enabled),
            })
            .collect();

        let links = settings
            .links
            .iter()
            .map(|l| LinkModel {
                autoneg: l.autoneg,
                fec: l.fec.clone(),
                link_name: l.link_name.clone(),
                lldp: LldpModel {
                    chassis_id: l.lldp.chassis_id.clone(),
                    enabled: l.lldp.enabled,
                    link_description: l.lldp.link_description.clone(),
                    link_name: l.lldp.link_name.clone(),
                    management_ip: l.lldp.management_ip.clone(),
                    system_description: l.lldp.system_description.clone(),
                    system_name: l.lldp.system_name.clone(),
                },
                mtu: l.mtu,
                speed: l.speed.clone(),
                tx_eq: l.tx_eq.as_ref().map(|tx| TxEqModel {
                    main: tx.main,
                    post1: tx.post1,
                    post2: tx.post2,
                    pre1: tx.pre1,
                    pre2: tx.pre2,
                }),
            })
            .collect();

        Ok(Self {
            stamps: Stamps::of(&settings.identity),
            name: settings.identity.name.clone(),
            description: settings.identity.description.clone(),
            port_config: PortConfigModel {
                geometry: settings.port.geometry.clone(),
            },
            addresses: addresses
                .into_iter()
                .map(|(link_name, addresses)| LinkAddressesModel {
                    link_name,
                    addresses,
                })
                .collect(),
            bgp_peers: non_empty(
                bgp_peers
                    .into_iter()
                    .map(|(link_name, peers)| LinkPeersModel { link_name, peers })
                    .collect(),
            ),
            groups: non_empty(settings.groups.clone()),
            interfaces: non_empty(interfaces),
            links,
            routes: non_empty(
                routes
                    .into_iter()
                    .map(|(link_name, routes)| LinkRoutesModel { link_name, routes })
                    .collect(),
            ),
        })
    }
}

fn policy_type() -> AttributeType {
    AttributeType::object(vec![
        Attribute::required("type", AttributeType::String)
            .description("Type of filter to apply.")
            .validator(Validator::one_of(["no_filtering", "allow"])),
        Attribute::optional("value", AttributeType::set_of(AttributeType::String)).description(
            "IPv4 or IPv6 address to apply the filter to, including the subnet mask.",
        ),
    ])
}

fn peer_type() -> AttributeType {
    AttributeType::object(vec![
        Attribute::required("address", AttributeType::String)
            .description("Address of the host to peer with."),
        Attribute::required("allowed_export", policy_type())
            .description("Export policy for the peer."),
        Attribute::required("allowed_import", policy_type())
            .description("Import policy for the peer."),
        Attribute::required("bgp_config", AttributeType::String).description(
            "Name or ID of the global BGP configuration used for establishing a session with this peer.",
        ),
        Attribute::required("communities", AttributeType::set_of(AttributeType::Int64))
            .description("BGP communities to apply to this peer's routes."),
        Attribute::required("connect_retry", AttributeType::Int64)
            .description("Number of seconds to wait before retrying a TCP connection."),
        Attribute::required("delay_open", AttributeType::Int64).description(
            "Number of seconds to delay sending an open request after establishing a TCP session.",
        ),
        Attribute::required("enforce_first_as", AttributeType::Bool).description(
            "Whether to enforce that the first autonomous system in paths received from this peer is the peer's autonomous system.",
        ),
        Attribute::required("hold_time", AttributeType::Int64)
            .description("Number of seconds to hold peer connections between keepalives."),
        Attribute::required("idle_hold_time", AttributeType::Int64).description(
            "Number of seconds to hold a peer in idle before attempting a new session.",
        ),
        Attribute::required("interface_name", AttributeType::String)
            .description("Name of the interface to use for this BGP peer session."),
        Attribute::required("keepalive", AttributeType::Int64)
            .description("Number of seconds between sending BGP keepalive requests."),
        Attribute::optional("local_pref", AttributeType::Int64)
            .description("BGP local preference value for routes received from this peer."),
        Attribute::optional("md5_auth_key", AttributeType::String)
            .description("MD5 authentication key for this BGP session.")
            .sensitive(),
        Attribute::optional("min_ttl", AttributeType::Int32)
            .description("Minimum acceptable TTL for BGP packets from this peer."),
        Attribute::optional("multi_exit_discriminator", AttributeType::Int64)
            .description("Multi-exit discriminator (MED) to advertise to this peer."),
        Attribute::optional("remote_asn", AttributeType::Int64)
            .description("Remote autonomous system number for this BGP peer."),
        Attribute::optional("vlan_id", AttributeType::Int32)
            .description("VLAN ID for this BGP peer session."),
    ])
}

fn link_type() -> AttributeType {
    AttributeType::object(vec![
        Attribute::required("autoneg", AttributeType::Bool)
            .description("Whether to enable auto-negotiation for this link."),
        Attribute::optional("fec", AttributeType::String)
            .description("Forward error correction (FEC) type.")
            .validator(Validator::one_of(FEC_TYPES)),
        Attribute::required("link_name", AttributeType::String).description("Name of the link."),
        Attribute::required(
            "lldp",
            AttributeType::object(vec![
                Attribute::optional("chassis_id", AttributeType::String)
                    .description("LLDP chassis ID."),
                Attribute::required("enabled", AttributeType::Bool)
                    .description("Whether to enable LLDP on this link."),
                Attribute::optional("link_description", AttributeType::String)
                    .description("LLDP link description."),
                Attribute::optional("link_name", AttributeType::String)
                    .description("LLDP link name."),
                Attribute::optional("management_ip", AttributeType::String)
                    .description("LLDP management IP address."),
                Attribute::optional("system_description", AttributeType::String)
                    .description("LLDP system description."),
                Attribute::optional("system_name", AttributeType::String)
                    .description("LLDP system name."),
            ]),
        )
        .description("Link Layer Discovery Protocol (LLDP) configuration."),
        Attribute::required("mtu", AttributeType::Int32)
            .description("Maximum Transmission Unit (MTU) for this link."),
        Attribute::required("speed", AttributeType::String)
            .description("Link speed.")
            .validator(Validator::one_of(SPEEDS)),
        Attribute::optional(
            "tx_eq",
            AttributeType::object(vec![
                Attribute::optional("main", AttributeType::Int32)
                    .description("Main tap equalization value."),
                Attribute::optional("post1", AttributeType::Int32)
                    .description("Post-cursor tap1 equalization value."),
                Attribute::optional("post2", AttributeType::Int32)
                    .description("Post-cursor tap2 equalization value."),
                Attribute::optional("pre1", AttributeType::Int32)
                    .description("Pre-cursor tap1 equalization value."),
                Attribute::optional("pre2", AttributeType::Int32)
                    .description("Pre-cursor tap2 equalization value."),
            ]),
        )
        .description("Transceiver equalization settings."),
    ])
}

#[async_trait]
impl Resource for SwitchPortSettingsResource {
    fn type_name(&self) -> &'static str {
        "oxide_switch_port_settings"
    }

    fn schema(&self) -> Schema {
        Schema::new("This resource manages switch port settings.")
            .attribute(Attribute::id().description(
                "Unique, immutable, system-controlled identifier of the switch port settings.",
            ))
            .attribute(
                Attribute::required(
                    "addresses",
                    AttributeType::set_of(AttributeType::object(vec![
                        Attribute::required("link_name", AttributeType::String)
                            .description("Name of the link for the address configuration."),
                        Attribute::required(
                            "addresses",
                            AttributeType::set_of(AttributeType::object(vec![
                                Attribute::required("address", AttributeType::String)
                                    .description("IPv4 or IPv6 address, including the subnet mask."),
                                Attribute::required("address_lot_id", AttributeType::String)
                                    .description("Address lot the address is allocated from."),
                                Attribute::optional("vlan_id", AttributeType::Int32)
                                    .description("VLAN ID for the address."),
                            ])),
                        )
                        .description("Set of addresses to assign to the link."),
                    ])),
                )
                .description("Address configuration for the switch port."),
            )
            .attribute(
                Attribute::optional(
                    "bgp_peers",
                    AttributeType::set_of(AttributeType::object(vec![
                        Attribute::required("link_name", AttributeType::String)
                            .description("Name of the link for the BGP peers configuration."),
                        Attribute::required("peers", AttributeType::set_of(peer_type()))
                            .description("Set of BGP peers configuration to assign to the link."),
                    ])),
                )
                .description("BGP peer configuration for the switch port."),
            )
            .attribute(
                Attribute::required("description", AttributeType::String)
                    .description("Human-readable description of the switch port settings."),
            )
            .attribute(
                Attribute::optional("groups", AttributeType::set_of(AttributeType::String))
                    .description("Set of port settings group IDs to include in these settings."),
            )
            .attribute(
                Attribute::optional(
                    "interfaces",
                    AttributeType::set_of(AttributeType::object(vec![
                        Attribute::required(
                            "kind",
                            AttributeType::object(vec![
                                Attribute::required("type", AttributeType::String)
                                    .description("Type of the interface.")
                                    .validator(Validator::one_of(["primary", "vlan", "loopback"])),
                                Attribute::optional("vid", AttributeType::Int32)
                                    .description("VLAN ID for the interfaces."),
                            ]),
                        )
                        .description("The kind of interface this configuration represents."),
                        Attribute::required("link_name", AttributeType::String)
                            .description("Name of the link this interface is associated with."),
                        Attribute::optional("v6_enabled", AttributeType::Bool)
                            .description("Enable IPv6 on this interface."),
                    ])),
                )
                .description("Interface configuration for the switch port."),
            )
            .attribute(
                Attribute::required("links", AttributeType::set_of(link_type()))
                    .description("Link configuration for the switch port."),
            )
            .attribute(
                Attribute::required("name", AttributeType::String)
                    .description("Name of the switch port settings."),
            )
            .attribute(
                Attribute::required(
                    "port_config",
                    AttributeType::object(vec![
                        Attribute::required("geometry", AttributeType::String)
                            .description("Port geometry.")
                            .validator(Validator::one_of(GEOMETRIES)),
                    ]),
                )
                .description("Physical port configuration."),
            )
            .attribute(
                Attribute::optional(
                    "routes",
                    AttributeType::set_of(AttributeType::object(vec![
                        Attribute::required("link_name", AttributeType::String)
                            .description("Name of the link for these routes."),
                        Attribute::required(
                            "routes",
                            AttributeType::set_of(AttributeType::object(vec![
                                Attribute::required("dst", AttributeType::String)
                                    .description("Destination network in CIDR notation."),
                                Attribute::required("gw", AttributeType::String)
                                    .description("Gateway IP address for this route."),
                                Attribute::optional("rib_priority", AttributeType::Int32)
                                    .description(
                                        "Routing Information Base (RIB) priority for this route.",
                                    ),
                                Attribute::optional("vid", AttributeType::Int32)
                                    .description("VLAN ID for this route."),
                            ])),
                        )
                        .description("Set of static routes for this link."),
                    ])),
                )
                .description("Static route configuration."),
            )
            .attribute(Attribute::timeouts(&Phase::ALL))
            .attribute(Attribute::time_created())
            .attribute(Attribute::time_modified())
    }

    async fn create(&self, plan: Value) -> Result<Value> {
        let plan: SwitchPortSettingsModel = decode(plan)?;
        let settings = self
            .client
            .networking_switch_port_settings_create(&plan.body()?)
            .await
            .map_err(|e| EngineError::api("Error creating switch port settings", e))?;
        tracing::trace!("created switch port settings with ID: {}", settings.identity.id);
        encode(&SwitchPortSettingsModel::observe(&settings)?)
    }

    async fn read(&self, state: Value) -> Result<ReadOutcome> {
        let state: SwitchPortSettingsModel = decode(state)?;
        let Some(settings) = found(
            self.client
                .networking_switch_port_settings_view(state.stamps.id()?)
                .await,
            "Unable to read Switch Port Settings:",
        )?
        else {
            return Ok(ReadOutcome::Removed);
        };
        Ok(ReadOutcome::Found(encode(
            &SwitchPortSettingsModel::observe(&settings)?,
        )?))
    }

    async fn update(&self, plan: Value, _prior: Value) -> Result<Value> {
        let plan: SwitchPortSettingsModel = decode(plan)?;
        let settings = self
            .client
            .networking_switch_port_settings_create(&plan.body()?)
            .await
            .map_err(|e| EngineError::api("Error updating switch port settings", e))?;
        tracing::trace!("updated switch port settings with ID: {}", settings.identity.id);
        encode(&SwitchPortSettingsModel::observe(&settings)?)
    }

    async fn delete(&self, state: Value) -> Result<DeleteOutcome> {
        let state: SwitchPortSettingsModel = decode(state)?;
        deleted(
            self.client
                .networking_switch_port_settings_delete(state.stamps.id()?)
                .await,
            "Error deleting Switch Port Settings:",
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use oxide_api::IdentityMetadata;

    fn peer_view(communities: &[&str]) -> SwitchPortBgpPeerView {
        SwitchPortBgpPeerView {
            link_name: "phy0".to_string(),
            addr: "192.0.2.1".to_string(),
            allowed_export: ImportExportPolicy::NoFiltering,
            allowed_import: ImportExportPolicy::Allow(vec!["10.0.0.0/8".to_string()]),
            bgp_config: "as65000".to_string(),
            communities: communities.iter().map(|c| c.to_string()).collect(),
            connect_retry: 3,
            delay_open: 0,
            enforce_first_as: false,
            hold_time: 6,
            idle_hold_time: 3,
            interface_name: "phy0".to_string(),
            keepalive: 2,
            local_pref: None,
            md5_auth_key: None,
            min_ttl: None,
            multi_exit_discriminator: None,
            remote_asn: None,
            vlan_id: None,
        }
    }

    fn settings(peers: Vec<SwitchPortBgpPeerView>) -> SwitchPortSettings {
        SwitchPortSettings {
            identity: IdentityMetadata {
                id: "sps-1".to_string(),
                name: "uplink".to_string(),
                description: String::new(),
                time_created: chrono::DateTime::UNIX_EPOCH,
                time_modified: chrono::DateTime::UNIX_EPOCH,
            },
            port: SwitchPortConfig {
                geometry: "qsfp28x1".to_string(),
            },
            addresses: Vec::new(),
            bgp_peers: peers,
            groups: Vec::new(),
            interfaces: Vec::new(),
            links: Vec::new(),
            routes: Vec::new(),
        }
    }

    #[test]
    fn test_communities_parsed_as_integers() {
        let model = SwitchPortSettingsModel::observe(&settings(vec![peer_view(&["100", "200"])]))
            .unwrap();
        let peers = model.bgp_peers.unwrap();
        assert_eq!(peers[0].link_name, "phy0");
        assert_eq!(peers[0].peers[0].communities, vec![100, 200]);
        assert_eq!(peers[0].peers[0].allowed_import.kind, "allow");
        assert!(model.routes.is_none());
    }

    #[test]
    fn test_bad_community_is_internal_error() {
        let err = SwitchPortSettingsModel::observe(&settings(vec![peer_view(&["no-export"])]))
            .unwrap_err();
        assert_eq!(err.summary(), "Error parsing community element");
    }

    #[test]
    fn test_vlan_interface_requires_vid() {
        let kind = InterfaceKindModel {
            kind: "vlan".to_string(),
            vid: None,
        };
        assert!(kind.to_api().unwrap_err().is_config());
        let kind = InterfaceKindModel {
            kind: "vlan".to_string(),
            vid: Some(300),
        };
        assert_eq!(kind.to_api().unwrap(), SwitchInterfaceKind::Vlan { vid: 300 });
    }
}
