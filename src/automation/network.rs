//! Network infrastructure, security groups and floating IPs.

use serde::Serialize;
use tracing::{info, warn};

use crate::provider::{
    Direction, FloatingIp, Network, NetworkCreate, Provider, ProviderError, ResourceKind, Router,
    RouterCreate, SecurityGroup, SecurityGroupRule, SecurityGroupRuleCreate, Subnet, SubnetCreate,
};

use super::Automation;

/// Network name used when the caller does not supply one.
pub const DEFAULT_NETWORK_NAME: &str = "auto-network";

/// Subnet range used when the caller does not supply one.
pub const DEFAULT_SUBNET_CIDR: &str = "10.0.100.0/24";

/// Security group name used when the caller does not supply one.
pub const DEFAULT_SECURITY_GROUP_NAME: &str = "auto-security-group";

const SECURITY_GROUP_DESCRIPTION: &str = "Automated security group";
const DNS_NAMESERVERS: [&str; 2] = ["8.8.8.8", "8.8.4.4"];
const ANY_IPV4: &str = "0.0.0.0/0";

/// (protocol, port) pairs opened by [`Automation::create_security_group`].
const DEFAULT_INGRESS: [(&str, Option<u16>); 4] = [
    ("tcp", Some(22)),
    ("tcp", Some(80)),
    ("tcp", Some(443)),
    ("icmp", None),
];

/// Resources created by [`Automation::create_network_infrastructure`].
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct NetworkInfrastructure {
    /// Tenant network.
    pub network: Network,
    /// IPv4 subnet on `network`.
    pub subnet: Subnet,
    /// Router to the external network; `None` when no external network
    /// exists.
    pub router: Option<Router>,
}

/// Security group together with the rules added to it.
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct SecurityGroupSetup {
    /// Created group.
    pub group: SecurityGroup,
    /// Ingress rules added to the group.
    pub rules: Vec<SecurityGroupRule>,
}

impl<P: Provider> Automation<P> {
    /// Creates a network, a DHCP-enabled IPv4 subnet named
    /// `<network>-subnet`, and, when an external network exists, a router
    /// named `<network>-router` gatewayed to it with the subnet attached.
    ///
    /// # Errors
    ///
    /// Returns the first [`ProviderError`] raised by a provider call. A
    /// missing external network is not an error.
    pub async fn create_network_infrastructure(
        &self,
        network_name: &str,
        cidr: &str,
    ) -> Result<NetworkInfrastructure, ProviderError> {
        let network = self
            .provider
            .create_network(&NetworkCreate {
                name: network_name.to_owned(),
                admin_state_up: true,
            })
            .await?;
        info!(network_id = %network.id, name = %network.name, "created network");

        let subnet = self
            .provider
            .create_subnet(&SubnetCreate {
                name: format!("{network_name}-subnet"),
                network_id: network.id.clone(),
                cidr: cidr.to_owned(),
                ip_version: 4,
                enable_dhcp: true,
                dns_nameservers: DNS_NAMESERVERS.iter().map(|ns| (*ns).to_owned()).collect(),
            })
            .await?;
        info!(subnet_id = %subnet.id, name = %subnet.name, cidr = %subnet.cidr, "created subnet");

        let Some(external) = self.find_external_network().await? else {
            warn!(network = network_name, "no external network found, skipping router creation");
            return Ok(NetworkInfrastructure {
                network,
                subnet,
                router: None,
            });
        };

        let router = self
            .provider
            .create_router(&RouterCreate {
                name: format!("{network_name}-router"),
                external_network_id: Some(external.id.clone()),
            })
            .await?;
        info!(router_id = %router.id, name = %router.name, gateway = %external.name, "created router");

        self.provider
            .add_router_interface(&router.id, &subnet.id)
            .await?;
        info!(router_id = %router.id, subnet_id = %subnet.id, "connected subnet to router");

        Ok(NetworkInfrastructure {
            network,
            subnet,
            router: Some(router),
        })
    }

    /// Returns the first network flagged as router-external.
    ///
    /// # Errors
    ///
    /// Propagates listing failures.
    pub async fn find_external_network(&self) -> Result<Option<Network>, ProviderError> {
        let networks = self.provider.list_networks().await?;
        Ok(networks.into_iter().find(|network| network.is_router_external))
    }

    /// Creates a security group opening SSH, HTTP, HTTPS and ICMP from any
    /// IPv4 source.
    ///
    /// # Errors
    ///
    /// Returns the first [`ProviderError`] raised by a provider call.
    pub async fn create_security_group(
        &self,
        name: &str,
    ) -> Result<SecurityGroupSetup, ProviderError> {
        let group = self
            .provider
            .create_security_group(name, SECURITY_GROUP_DESCRIPTION)
            .await?;
        info!(security_group_id = %group.id, name = %group.name, "created security group");

        let mut rules = Vec::with_capacity(DEFAULT_INGRESS.len());
        for (protocol, port) in DEFAULT_INGRESS {
            let rule = self
                .provider
                .create_security_group_rule(&SecurityGroupRuleCreate {
                    security_group_id: group.id.clone(),
                    direction: Direction::Ingress,
                    ether_type: String::from("IPv4"),
                    protocol: protocol.to_owned(),
                    port_range_min: port,
                    port_range_max: port,
                    remote_ip_prefix: ANY_IPV4.to_owned(),
                })
                .await?;
            rules.push(rule);
        }
        info!(security_group_id = %group.id, rules = rules.len(), "added security group rules");

        Ok(SecurityGroupSetup { group, rules })
    }

    /// Allocates a floating IP on the external network and binds it to the
    /// first port of `server_name`.
    ///
    /// # Errors
    ///
    /// Returns [`ProviderError::NotFound`] when the server, an external
    /// network or a server port is missing, or any provider failure.
    pub async fn assign_floating_ip(&self, server_name: &str) -> Result<FloatingIp, ProviderError> {
        let server = self
            .provider
            .find_server(server_name)
            .await?
            .ok_or_else(|| ProviderError::not_found(ResourceKind::Server, server_name))?;
        let external = self
            .find_external_network()
            .await?
            .ok_or_else(|| ProviderError::not_found(ResourceKind::ExternalNetwork, "router:external"))?;

        let floating_ip = self.provider.create_floating_ip(&external.id).await?;
        info!(
            floating_ip = %floating_ip.floating_ip_address,
            network = %external.name,
            "created floating IP"
        );

        let ports = self.provider.list_ports(&server.id).await?;
        let port = ports
            .first()
            .ok_or_else(|| ProviderError::not_found(ResourceKind::Port, &server.name))?;
        let bound = self
            .provider
            .associate_floating_ip(&floating_ip.id, &port.id)
            .await?;
        info!(
            floating_ip = %bound.floating_ip_address,
            server = %server.name,
            "assigned floating IP"
        );
        Ok(bound)
    }
}
