//! JSON bodies exchanged with the OpenStack services and their conversion
//! into provider records.

use std::collections::BTreeMap;
use std::net::IpAddr;

use reqwest::Url;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::provider::{
    Flavor, FlavorRef, FloatingIp, Image, Network, Port, Router, SecurityGroup, SecurityGroupRule,
    Server, ServerStatus, Subnet, Volume, VolumeAttachment, VolumeStatus,
};

// Pagination

/// Pagination link attached to list responses as `<collection>_links`.
#[derive(Debug, Deserialize)]
pub(super) struct Link {
    rel: String,
    href: String,
}

/// List envelope that may carry a `next` link to the following page.
pub(super) trait Paged: DeserializeOwned {
    type Item;

    fn into_page(self) -> (Vec<Self::Item>, Vec<Link>);
}

/// Extracts the `marker` query value from the `next` link, if any.
pub(super) fn next_marker(links: &[Link]) -> Option<String> {
    let next = links.iter().find(|link| link.rel == "next")?;
    let url = Url::parse(&next.href).ok()?;
    url.query_pairs()
        .find(|(key, _)| key == "marker")
        .map(|(_, value)| value.into_owned())
}

// Compute

#[derive(Debug, Deserialize)]
pub(super) struct ServerEnvelope {
    pub(super) server: WireServer,
}

#[derive(Debug, Deserialize)]
pub(super) struct ServersEnvelope {
    pub(super) servers: Vec<WireServer>,
    #[serde(default)]
    servers_links: Vec<Link>,
}

impl Paged for ServersEnvelope {
    type Item = WireServer;

    fn into_page(self) -> (Vec<WireServer>, Vec<Link>) {
        (self.servers, self.servers_links)
    }
}

#[derive(Debug, Deserialize)]
pub(super) struct CreatedServerEnvelope {
    pub(super) server: CreatedServer,
}

#[derive(Debug, Deserialize)]
pub(super) struct CreatedServer {
    pub(super) id: String,
}

#[derive(Debug, Deserialize)]
pub(super) struct WireAddress {
    addr: String,
}

#[derive(Debug, Default, Deserialize)]
pub(super) struct WireFlavorRef {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    original_name: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(super) struct WireServer {
    id: String,
    #[serde(default)]
    name: String,
    #[serde(default)]
    status: String,
    #[serde(default)]
    addresses: BTreeMap<String, Vec<WireAddress>>,
    #[serde(default)]
    flavor: WireFlavorRef,
    /// Either `{"id": ...}` or an empty string for volume-backed servers.
    #[serde(default)]
    image: Value,
}

impl From<WireServer> for Server {
    fn from(value: WireServer) -> Self {
        let addresses = value
            .addresses
            .into_iter()
            .map(|(network, entries)| {
                let ips = entries
                    .iter()
                    .filter_map(|entry| entry.addr.parse::<IpAddr>().ok())
                    .collect();
                (network, ips)
            })
            .collect();
        let image_id = value
            .image
            .get("id")
            .and_then(Value::as_str)
            .map(ToOwned::to_owned);
        Self {
            id: value.id,
            name: value.name,
            status: ServerStatus::parse(&value.status),
            addresses,
            flavor: FlavorRef {
                id: value.flavor.id,
                original_name: value.flavor.original_name,
            },
            image_id,
        }
    }
}

#[derive(Debug, Serialize)]
pub(super) struct CreateServerBody<'a> {
    pub(super) server: CreateServer<'a>,
}

#[derive(Debug, Serialize)]
pub(super) struct CreateServer<'a> {
    pub(super) name: &'a str,
    #[serde(rename = "imageRef")]
    pub(super) image_ref: &'a str,
    #[serde(rename = "flavorRef")]
    pub(super) flavor_ref: &'a str,
    pub(super) networks: Value,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub(super) security_groups: Vec<NamedRef<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(super) key_name: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(super) user_data: Option<String>,
}

#[derive(Debug, Serialize)]
pub(super) struct NamedRef<'a> {
    pub(super) name: &'a str,
}

#[derive(Debug, Deserialize)]
pub(super) struct FlavorsEnvelope {
    pub(super) flavors: Vec<WireFlavor>,
}

#[derive(Debug, Deserialize)]
pub(super) struct WireFlavor {
    id: String,
    name: String,
}

impl From<WireFlavor> for Flavor {
    fn from(value: WireFlavor) -> Self {
        Self {
            id: value.id,
            name: value.name,
        }
    }
}

#[derive(Debug, Deserialize)]
pub(super) struct CreateImageResponse {
    pub(super) image_id: String,
}

#[derive(Debug, Deserialize)]
pub(super) struct AttachmentEnvelope {
    #[serde(rename = "volumeAttachment")]
    pub(super) attachment: WireAttachment,
}

#[derive(Debug, Deserialize)]
pub(super) struct WireAttachment {
    id: String,
    #[serde(rename = "serverId")]
    server_id: String,
    #[serde(rename = "volumeId")]
    volume_id: String,
    #[serde(default)]
    device: Option<String>,
}

impl From<WireAttachment> for VolumeAttachment {
    fn from(value: WireAttachment) -> Self {
        Self {
            id: value.id,
            server_id: value.server_id,
            volume_id: value.volume_id,
            device: value.device,
        }
    }
}

// Image

#[derive(Debug, Deserialize)]
pub(super) struct ImagesEnvelope {
    pub(super) images: Vec<WireImage>,
}

#[derive(Debug, Deserialize)]
pub(super) struct WireImage {
    id: String,
    #[serde(default)]
    name: Option<String>,
}

impl From<WireImage> for Image {
    fn from(value: WireImage) -> Self {
        Self {
            id: value.id,
            name: value.name.unwrap_or_default(),
        }
    }
}

// Network

#[derive(Debug, Deserialize)]
pub(super) struct NetworkEnvelope {
    pub(super) network: WireNetwork,
}

#[derive(Debug, Deserialize)]
pub(super) struct NetworksEnvelope {
    pub(super) networks: Vec<WireNetwork>,
    #[serde(default)]
    networks_links: Vec<Link>,
}

impl Paged for NetworksEnvelope {
    type Item = WireNetwork;

    fn into_page(self) -> (Vec<WireNetwork>, Vec<Link>) {
        (self.networks, self.networks_links)
    }
}

#[derive(Debug, Deserialize)]
pub(super) struct WireNetwork {
    id: String,
    #[serde(default)]
    name: String,
    #[serde(rename = "router:external", default)]
    router_external: bool,
}

impl From<WireNetwork> for Network {
    fn from(value: WireNetwork) -> Self {
        Self {
            id: value.id,
            name: value.name,
            is_router_external: value.router_external,
        }
    }
}

#[derive(Debug, Deserialize)]
pub(super) struct SubnetEnvelope {
    pub(super) subnet: WireSubnet,
}

#[derive(Debug, Deserialize)]
pub(super) struct WireSubnet {
    id: String,
    #[serde(default)]
    name: String,
    network_id: String,
    cidr: String,
}

impl From<WireSubnet> for Subnet {
    fn from(value: WireSubnet) -> Self {
        Self {
            id: value.id,
            name: value.name,
            network_id: value.network_id,
            cidr: value.cidr,
        }
    }
}

#[derive(Debug, Deserialize)]
pub(super) struct RouterEnvelope {
    pub(super) router: WireRouter,
}

#[derive(Debug, Deserialize)]
pub(super) struct RoutersEnvelope {
    pub(super) routers: Vec<WireRouter>,
    #[serde(default)]
    routers_links: Vec<Link>,
}

impl Paged for RoutersEnvelope {
    type Item = WireRouter;

    fn into_page(self) -> (Vec<WireRouter>, Vec<Link>) {
        (self.routers, self.routers_links)
    }
}

#[derive(Debug, Deserialize, Serialize)]
pub(super) struct GatewayInfo {
    pub(super) network_id: String,
}

#[derive(Debug, Deserialize)]
pub(super) struct WireRouter {
    id: String,
    #[serde(default)]
    name: String,
    #[serde(default)]
    external_gateway_info: Option<GatewayInfo>,
}

impl From<WireRouter> for Router {
    fn from(value: WireRouter) -> Self {
        Self {
            id: value.id,
            name: value.name,
            external_network_id: value.external_gateway_info.map(|info| info.network_id),
        }
    }
}

#[derive(Debug, Deserialize)]
pub(super) struct PortsEnvelope {
    pub(super) ports: Vec<WirePort>,
    #[serde(default)]
    ports_links: Vec<Link>,
}

impl Paged for PortsEnvelope {
    type Item = WirePort;

    fn into_page(self) -> (Vec<WirePort>, Vec<Link>) {
        (self.ports, self.ports_links)
    }
}

#[derive(Debug, Deserialize)]
pub(super) struct WirePort {
    id: String,
    network_id: String,
    #[serde(default)]
    device_id: String,
    #[serde(default)]
    device_owner: String,
}

impl From<WirePort> for Port {
    fn from(value: WirePort) -> Self {
        Self {
            id: value.id,
            network_id: value.network_id,
            device_id: value.device_id,
            device_owner: value.device_owner,
        }
    }
}

#[derive(Debug, Deserialize)]
pub(super) struct SecurityGroupEnvelope {
    pub(super) security_group: WireSecurityGroup,
}

#[derive(Debug, Deserialize)]
pub(super) struct SecurityGroupsEnvelope {
    pub(super) security_groups: Vec<WireSecurityGroup>,
    #[serde(default)]
    security_groups_links: Vec<Link>,
}

impl Paged for SecurityGroupsEnvelope {
    type Item = WireSecurityGroup;

    fn into_page(self) -> (Vec<WireSecurityGroup>, Vec<Link>) {
        (self.security_groups, self.security_groups_links)
    }
}

#[derive(Debug, Deserialize)]
pub(super) struct WireSecurityGroup {
    id: String,
    #[serde(default)]
    name: String,
    #[serde(default)]
    description: String,
}

impl From<WireSecurityGroup> for SecurityGroup {
    fn from(value: WireSecurityGroup) -> Self {
        Self {
            id: value.id,
            name: value.name,
            description: value.description,
        }
    }
}

#[derive(Debug, Deserialize)]
pub(super) struct SecurityGroupRuleEnvelope {
    pub(super) security_group_rule: WireSecurityGroupRule,
}

#[derive(Debug, Deserialize)]
pub(super) struct WireSecurityGroupRule {
    id: String,
    security_group_id: String,
    #[serde(default)]
    protocol: Option<String>,
    #[serde(default)]
    port_range_min: Option<u16>,
    #[serde(default)]
    port_range_max: Option<u16>,
}

impl From<WireSecurityGroupRule> for SecurityGroupRule {
    fn from(value: WireSecurityGroupRule) -> Self {
        Self {
            id: value.id,
            security_group_id: value.security_group_id,
            protocol: value.protocol,
            port_range_min: value.port_range_min,
            port_range_max: value.port_range_max,
        }
    }
}

#[derive(Debug, Deserialize)]
pub(super) struct FloatingIpEnvelope {
    pub(super) floatingip: WireFloatingIp,
}

#[derive(Debug, Deserialize)]
pub(super) struct FloatingIpsEnvelope {
    pub(super) floatingips: Vec<WireFloatingIp>,
    #[serde(default)]
    floatingips_links: Vec<Link>,
}

impl Paged for FloatingIpsEnvelope {
    type Item = WireFloatingIp;

    fn into_page(self) -> (Vec<WireFloatingIp>, Vec<Link>) {
        (self.floatingips, self.floatingips_links)
    }
}

#[derive(Debug, Deserialize)]
pub(super) struct WireFloatingIp {
    id: String,
    floating_ip_address: String,
    #[serde(default)]
    fixed_ip_address: Option<String>,
    #[serde(default)]
    port_id: Option<String>,
}

impl From<WireFloatingIp> for FloatingIp {
    fn from(value: WireFloatingIp) -> Self {
        Self {
            id: value.id,
            floating_ip_address: value.floating_ip_address,
            fixed_ip_address: value.fixed_ip_address,
            port_id: value.port_id,
        }
    }
}

// Block storage

#[derive(Debug, Deserialize)]
pub(super) struct VolumeEnvelope {
    pub(super) volume: WireVolume,
}

#[derive(Debug, Deserialize)]
pub(super) struct VolumesEnvelope {
    pub(super) volumes: Vec<WireVolume>,
    #[serde(default)]
    volumes_links: Vec<Link>,
}

impl Paged for VolumesEnvelope {
    type Item = WireVolume;

    fn into_page(self) -> (Vec<WireVolume>, Vec<Link>) {
        (self.volumes, self.volumes_links)
    }
}

#[derive(Debug, Deserialize)]
pub(super) struct WireVolume {
    id: String,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    size: u32,
    #[serde(default)]
    status: String,
}

impl From<WireVolume> for Volume {
    fn from(value: WireVolume) -> Self {
        Self {
            id: value.id,
            name: value.name.filter(|name| !name.is_empty()),
            size_gib: value.size,
            status: VolumeStatus::parse(&value.status),
        }
    }
}

/// Pulls a human readable message out of an OpenStack error body.
///
/// Services wrap errors differently (`{"itemNotFound": {"message": ..}}`,
/// `{"NeutronError": {"message": ..}}`, `{"error": {"message": ..}}`); the
/// first nested `message` string wins. Non-JSON bodies are returned as-is.
pub(super) fn error_message(body: &[u8]) -> String {
    let text = String::from_utf8_lossy(body);
    let Ok(value) = serde_json::from_slice::<Value>(body) else {
        return text.trim().to_owned();
    };
    find_message(&value).unwrap_or_else(|| text.trim().to_owned())
}

fn find_message(value: &Value) -> Option<String> {
    let object = value.as_object()?;
    if let Some(message) = object.get("message").and_then(Value::as_str) {
        return Some(message.to_owned());
    }
    object.values().find_map(find_message)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use serde_json::json;

    #[test]
    fn converts_nova_server() {
        let body = json!({
            "server": {
                "id": "3f1c",
                "name": "web-1",
                "status": "VERIFY_RESIZE",
                "addresses": {
                    "private": [
                        {"addr": "10.0.100.5", "version": 4},
                        {"addr": "fd00::5", "version": 6}
                    ]
                },
                "flavor": {"original_name": "m1.small", "vcpus": 1},
                "image": ""
            }
        });
        let envelope: ServerEnvelope = serde_json::from_value(body).expect("parse server");
        let server = Server::from(envelope.server);

        assert_eq!(server.status, ServerStatus::VerifyResize);
        assert_eq!(server.flavor.lookup_key(), Some("m1.small"));
        assert_eq!(server.image_id, None);
        assert_eq!(server.addresses.get("private").map(Vec::len), Some(2));
        assert!(server.has_address());
    }

    #[test]
    fn reads_external_flag_and_gateway() {
        let network: WireNetwork =
            serde_json::from_value(json!({"id": "n1", "name": "public", "router:external": true}))
                .expect("parse network");
        assert!(Network::from(network).is_router_external);

        let router: WireRouter = serde_json::from_value(
            json!({"id": "r1", "name": "auto-router", "external_gateway_info": null}),
        )
        .expect("parse router");
        assert_eq!(Router::from(router).external_network_id, None);
    }

    #[test]
    fn blank_volume_name_is_none() {
        let volume: WireVolume = serde_json::from_value(
            json!({"id": "v1", "name": "", "size": 10, "status": "in-use"}),
        )
        .expect("parse volume");
        let converted = Volume::from(volume);
        assert_eq!(converted.name, None);
        assert_eq!(converted.status, VolumeStatus::InUse);
    }

    #[test]
    fn create_body_omits_empty_optionals() {
        let body = CreateServerBody {
            server: CreateServer {
                name: "web-1",
                image_ref: "img-1",
                flavor_ref: "flv-1",
                networks: Value::String(String::from("auto")),
                security_groups: Vec::new(),
                key_name: None,
                user_data: None,
            },
        };
        let value = serde_json::to_value(&body).expect("serialise body");
        assert_eq!(
            value,
            json!({"server": {"name": "web-1", "imageRef": "img-1", "flavorRef": "flv-1", "networks": "auto"}})
        );
    }

    #[rstest]
    #[case(br#"{"itemNotFound": {"message": "Flavor m1.huge could not be found.", "code": 404}}"#.as_slice(), "Flavor m1.huge could not be found.")]
    #[case(br#"{"NeutronError": {"type": "NetworkInUse", "message": "Unable to complete operation"}}"#.as_slice(), "Unable to complete operation")]
    #[case(b"502 Bad Gateway\n".as_slice(), "502 Bad Gateway")]
    fn extracts_error_messages(#[case] body: &[u8], #[case] expected: &str) {
        assert_eq!(error_message(body), expected);
    }

    #[test]
    fn servers_page_exposes_next_marker() {
        let page: ServersEnvelope = serde_json::from_value(json!({
            "servers": [{"id": "s1", "name": "web-1", "status": "ACTIVE"}],
            "servers_links": [{
                "rel": "next",
                "href": "https://nova.example/v2.1/servers/detail?limit=1&marker=s1"
            }]
        }))
        .expect("parse page");
        let (servers, links) = page.into_page();

        assert_eq!(servers.len(), 1);
        assert_eq!(next_marker(&links).as_deref(), Some("s1"));
    }

    #[rstest]
    #[case::no_links(json!({"volumes": []}))]
    #[case::previous_only(json!({
        "volumes": [],
        "volumes_links": [{"rel": "previous", "href": "https://cinder.example/v3/volumes/detail?marker=v0"}]
    }))]
    #[case::next_without_marker(json!({
        "volumes": [],
        "volumes_links": [{"rel": "next", "href": "https://cinder.example/v3/volumes/detail?limit=5"}]
    }))]
    fn last_page_has_no_next_marker(#[case] body: Value) {
        let page: VolumesEnvelope = serde_json::from_value(body).expect("parse page");
        let (_, links) = page.into_page();
        assert_eq!(next_marker(&links), None);
    }

    #[test]
    fn neutron_links_use_collection_name() {
        let page: FloatingIpsEnvelope = serde_json::from_value(json!({
            "floatingips": [],
            "floatingips_links": [{
                "rel": "next",
                "href": "https://neutron.example/v2.0/floatingips?marker=fip%2D9"
            }]
        }))
        .expect("parse page");
        let (_, links) = page.into_page();
        assert_eq!(next_marker(&links).as_deref(), Some("fip-9"));
    }
}
