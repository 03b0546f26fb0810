//! Resource records and create requests exchanged with providers.

use std::collections::BTreeMap;
use std::fmt;
use std::net::IpAddr;

use serde::Serialize;

/// Lifecycle status reported for a compute instance.
#[derive(Clone, Debug, Eq, Hash, PartialEq, Serialize)]
#[serde(into = "String")]
pub enum ServerStatus {
    /// Running and reachable by the hypervisor.
    Active,
    /// Being scheduled or booted.
    Build,
    /// Powered off.
    Shutoff,
    /// Failed.
    Error,
    /// Resize or migration in progress.
    Resize,
    /// Resized and waiting for the caller to confirm or revert.
    VerifyResize,
    /// Deleted but still visible.
    Deleted,
    /// Any status not modelled above.
    Other(String),
}

impl ServerStatus {
    /// Parses the upper-case status string used by the compute API.
    #[must_use]
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_ascii_uppercase().as_str() {
            "ACTIVE" => Self::Active,
            "BUILD" => Self::Build,
            "SHUTOFF" => Self::Shutoff,
            "ERROR" => Self::Error,
            "RESIZE" => Self::Resize,
            "VERIFY_RESIZE" => Self::VerifyResize,
            "DELETED" => Self::Deleted,
            other => Self::Other(other.to_owned()),
        }
    }

    /// Returns the compute API spelling of the status.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Active => "ACTIVE",
            Self::Build => "BUILD",
            Self::Shutoff => "SHUTOFF",
            Self::Error => "ERROR",
            Self::Resize => "RESIZE",
            Self::VerifyResize => "VERIFY_RESIZE",
            Self::Deleted => "DELETED",
            Self::Other(raw) => raw.as_str(),
        }
    }
}

impl fmt::Display for ServerStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<ServerStatus> for String {
    fn from(value: ServerStatus) -> Self {
        value.as_str().to_owned()
    }
}

/// Flavor recorded on a server. Either field may be missing depending on
/// what the provider embeds in server records.
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize)]
pub struct FlavorRef {
    /// Flavor identifier.
    pub id: Option<String>,
    /// Flavor name at the time the server was created.
    pub original_name: Option<String>,
}

impl FlavorRef {
    /// Returns the best reference for looking the flavor up again.
    #[must_use]
    pub fn lookup_key(&self) -> Option<&str> {
        self.original_name.as_deref().or(self.id.as_deref())
    }
}

/// Compute instance as observed from the provider.
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct Server {
    /// Provider identifier.
    pub id: String,
    /// Display name.
    pub name: String,
    /// Current lifecycle status.
    pub status: ServerStatus,
    /// Assigned addresses keyed by network name.
    pub addresses: BTreeMap<String, Vec<IpAddr>>,
    /// Flavor the server runs with.
    pub flavor: FlavorRef,
    /// Image the server booted from, when known.
    pub image_id: Option<String>,
}

impl Server {
    /// Reports whether at least one address is assigned on any network.
    #[must_use]
    pub fn has_address(&self) -> bool {
        self.addresses.values().any(|ips| !ips.is_empty())
    }
}

/// Compute flavor.
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct Flavor {
    /// Provider identifier.
    pub id: String,
    /// Flavor name (for example `m1.small`).
    pub name: String,
}

/// Boot image or snapshot.
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct Image {
    /// Provider identifier.
    pub id: String,
    /// Image name.
    pub name: String,
}

/// Network attachment requested for a new server.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ServerNetwork {
    /// Network identifier.
    pub network_id: String,
}

/// Parameters for creating a server once every reference is resolved.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ServerCreate {
    /// Display name.
    pub name: String,
    /// Resolved image identifier.
    pub image_id: String,
    /// Resolved flavor identifier.
    pub flavor_id: String,
    /// Networks to attach.
    pub networks: Vec<ServerNetwork>,
    /// Security group names to apply.
    pub security_groups: Vec<String>,
    /// Key pair injected into the instance.
    pub key_name: Option<String>,
    /// Plain-text boot script; adapters encode it as the API requires.
    pub user_data: Option<String>,
}

/// Network.
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct Network {
    /// Provider identifier.
    pub id: String,
    /// Network name.
    pub name: String,
    /// Whether the network is usable as a router gateway.
    pub is_router_external: bool,
}

/// Parameters for creating a network.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct NetworkCreate {
    /// Network name.
    pub name: String,
    /// Administrative state.
    pub admin_state_up: bool,
}

/// Subnet.
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct Subnet {
    /// Provider identifier.
    pub id: String,
    /// Subnet name.
    pub name: String,
    /// Owning network.
    pub network_id: String,
    /// Address range in CIDR notation.
    pub cidr: String,
}

/// Parameters for creating a subnet.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct SubnetCreate {
    /// Subnet name.
    pub name: String,
    /// Owning network.
    pub network_id: String,
    /// Address range in CIDR notation.
    pub cidr: String,
    /// IP version (4 or 6).
    pub ip_version: u8,
    /// Whether DHCP is enabled.
    pub enable_dhcp: bool,
    /// DNS resolvers handed out by DHCP.
    pub dns_nameservers: Vec<String>,
}

/// Router.
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct Router {
    /// Provider identifier.
    pub id: String,
    /// Router name.
    pub name: String,
    /// Gateway network, when one is set.
    pub external_network_id: Option<String>,
}

/// Parameters for creating a router.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct RouterCreate {
    /// Router name.
    pub name: String,
    /// Gateway network.
    pub external_network_id: Option<String>,
}

/// Device owner reported for router interface ports.
pub const ROUTER_INTERFACE_OWNER: &str = "network:router_interface";

/// Network port.
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct Port {
    /// Provider identifier.
    pub id: String,
    /// Network the port belongs to.
    pub network_id: String,
    /// Device (server or router) the port is bound to.
    pub device_id: String,
    /// Owner label, for example [`ROUTER_INTERFACE_OWNER`].
    pub device_owner: String,
}

/// Security group.
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct SecurityGroup {
    /// Provider identifier.
    pub id: String,
    /// Group name.
    pub name: String,
    /// Free-form description.
    pub description: String,
}

/// Traffic direction of a security group rule.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    /// Inbound traffic.
    Ingress,
    /// Outbound traffic.
    Egress,
}

impl Direction {
    /// Returns the API spelling.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Ingress => "ingress",
            Self::Egress => "egress",
        }
    }
}

/// Parameters for creating a security group rule.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct SecurityGroupRuleCreate {
    /// Group the rule belongs to.
    pub security_group_id: String,
    /// Traffic direction.
    pub direction: Direction,
    /// Ethertype (`IPv4` or `IPv6`).
    pub ether_type: String,
    /// Protocol name (`tcp`, `udp`, `icmp`).
    pub protocol: String,
    /// Lowest port, `None` for protocols without ports.
    pub port_range_min: Option<u16>,
    /// Highest port, `None` for protocols without ports.
    pub port_range_max: Option<u16>,
    /// Source range in CIDR notation.
    pub remote_ip_prefix: String,
}

/// Security group rule.
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct SecurityGroupRule {
    /// Provider identifier.
    pub id: String,
    /// Group the rule belongs to.
    pub security_group_id: String,
    /// Protocol name.
    pub protocol: Option<String>,
    /// Lowest port.
    pub port_range_min: Option<u16>,
    /// Highest port.
    pub port_range_max: Option<u16>,
}

/// Floating IP allocation.
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct FloatingIp {
    /// Provider identifier.
    pub id: String,
    /// Public address.
    pub floating_ip_address: String,
    /// Private address the floating IP maps to, when bound.
    pub fixed_ip_address: Option<String>,
    /// Port the floating IP is bound to.
    pub port_id: Option<String>,
}

/// Lifecycle status of a block storage volume.
#[derive(Clone, Debug, Eq, Hash, PartialEq, Serialize)]
#[serde(into = "String")]
pub enum VolumeStatus {
    /// Being provisioned.
    Creating,
    /// Ready to attach.
    Available,
    /// Attached to a server.
    InUse,
    /// Failed.
    Error,
    /// Any status not modelled above.
    Other(String),
}

impl VolumeStatus {
    /// Parses the lower-case status string used by the volume API.
    #[must_use]
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "creating" => Self::Creating,
            "available" => Self::Available,
            "in-use" => Self::InUse,
            "error" => Self::Error,
            other => Self::Other(other.to_owned()),
        }
    }

    /// Returns the volume API spelling of the status.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Creating => "creating",
            Self::Available => "available",
            Self::InUse => "in-use",
            Self::Error => "error",
            Self::Other(raw) => raw.as_str(),
        }
    }
}

impl fmt::Display for VolumeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<VolumeStatus> for String {
    fn from(value: VolumeStatus) -> Self {
        value.as_str().to_owned()
    }
}

/// Block storage volume.
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct Volume {
    /// Provider identifier.
    pub id: String,
    /// Volume name, when set.
    pub name: Option<String>,
    /// Size in GiB.
    pub size_gib: u32,
    /// Current status.
    pub status: VolumeStatus,
}

/// Parameters for creating a volume.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct VolumeCreate {
    /// Volume name.
    pub name: String,
    /// Size in GiB.
    pub size_gib: u32,
    /// Free-form description.
    pub description: String,
}

/// Attachment of a volume to a server.
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct VolumeAttachment {
    /// Attachment identifier.
    pub id: String,
    /// Server the volume is attached to.
    pub server_id: String,
    /// Attached volume.
    pub volume_id: String,
    /// Device path reported by the hypervisor.
    pub device: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("ACTIVE", ServerStatus::Active)]
    #[case("verify_resize", ServerStatus::VerifyResize)]
    #[case(" shutoff ", ServerStatus::Shutoff)]
    #[case("MIGRATING", ServerStatus::Other(String::from("MIGRATING")))]
    fn parses_server_status(#[case] raw: &str, #[case] expected: ServerStatus) {
        assert_eq!(ServerStatus::parse(raw), expected);
    }

    #[rstest]
    #[case("in-use", VolumeStatus::InUse)]
    #[case("AVAILABLE", VolumeStatus::Available)]
    #[case("error", VolumeStatus::Error)]
    #[case("reserved", VolumeStatus::Other(String::from("reserved")))]
    fn parses_volume_status(#[case] raw: &str, #[case] expected: VolumeStatus) {
        assert_eq!(VolumeStatus::parse(raw), expected);
    }

    #[test]
    fn flavor_lookup_prefers_original_name() {
        let flavor = FlavorRef {
            id: Some(String::from("f-2")),
            original_name: Some(String::from("m1.small")),
        };
        assert_eq!(flavor.lookup_key(), Some("m1.small"));

        let id_only = FlavorRef {
            id: Some(String::from("f-2")),
            original_name: None,
        };
        assert_eq!(id_only.lookup_key(), Some("f-2"));
    }

    #[test]
    fn server_without_addresses_reports_none() {
        let server = Server {
            id: String::from("srv-1"),
            name: String::from("web-1"),
            status: ServerStatus::Active,
            addresses: BTreeMap::from([(String::from("private"), Vec::new())]),
            flavor: FlavorRef::default(),
            image_id: None,
        };
        assert!(!server.has_address());
    }
}
