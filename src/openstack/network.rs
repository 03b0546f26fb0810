//! Neutron calls behind [`NetworkApi`].

use reqwest::Method;
use serde::de::DeserializeOwned;
use serde_json::json;

use crate::provider::{
    FloatingIp, Network, NetworkApi, NetworkCreate, Port, ProviderError, ProviderFuture, Router,
    RouterCreate, SecurityGroup, SecurityGroupRule, SecurityGroupRuleCreate, Subnet, SubnetCreate,
};

use super::http::looks_like_id;
use super::wire::{
    FloatingIpEnvelope, FloatingIpsEnvelope, GatewayInfo, NetworkEnvelope, NetworksEnvelope,
    PortsEnvelope, RouterEnvelope, RoutersEnvelope, SecurityGroupEnvelope, SecurityGroupRuleEnvelope,
    Paged, SecurityGroupsEnvelope, SubnetEnvelope,
};
use super::{OpenStackProvider, Service};

const PREFIX: &str = "/v2.0";

fn path(resource: &str) -> String {
    format!("{PREFIX}/{resource}")
}

impl OpenStackProvider {
    async fn neutron_get<T: DeserializeOwned>(
        &self,
        resource: &str,
        query: &[(&str, &str)],
    ) -> Result<T, ProviderError> {
        self.get_json(Service::Network, &path(resource), query)
            .await
    }

    async fn neutron_list<E: Paged>(
        &self,
        resource: &str,
        query: &[(&str, &str)],
    ) -> Result<Vec<E::Item>, ProviderError> {
        self.get_all::<E>(Service::Network, &path(resource), query)
            .await
    }

    async fn neutron_post<T: DeserializeOwned>(
        &self,
        resource: &str,
        body: &serde_json::Value,
    ) -> Result<T, ProviderError> {
        self.send_json(Service::Network, Method::POST, &path(resource), body)
            .await
    }

    async fn network_by_key(&self, key: &str) -> Result<Option<Network>, ProviderError> {
        if looks_like_id(key) {
            let found: Option<NetworkEnvelope> = self
                .get_optional(Service::Network, &path(&format!("networks/{key}")))
                .await?;
            if let Some(envelope) = found {
                return Ok(Some(Network::from(envelope.network)));
            }
        }
        let envelope: NetworksEnvelope = self.neutron_get("networks", &[("name", key)]).await?;
        Ok(envelope.networks.into_iter().map(Network::from).next())
    }

    async fn security_group_by_key(
        &self,
        key: &str,
    ) -> Result<Option<SecurityGroup>, ProviderError> {
        if looks_like_id(key) {
            let found: Option<SecurityGroupEnvelope> = self
                .get_optional(Service::Network, &path(&format!("security-groups/{key}")))
                .await?;
            if let Some(envelope) = found {
                return Ok(Some(SecurityGroup::from(envelope.security_group)));
            }
        }
        let envelope: SecurityGroupsEnvelope = self
            .neutron_get("security-groups", &[("name", key)])
            .await?;
        Ok(envelope
            .security_groups
            .into_iter()
            .map(SecurityGroup::from)
            .next())
    }

    async fn router_interface(
        &self,
        router_id: &str,
        action: &str,
        body: serde_json::Value,
    ) -> Result<(), ProviderError> {
        self.send_action(
            Service::Network,
            Method::PUT,
            &path(&format!("routers/{router_id}/{action}")),
            &body,
        )
        .await
    }
}

impl NetworkApi for OpenStackProvider {
    fn find_network<'a>(&'a self, name: &'a str) -> ProviderFuture<'a, Option<Network>> {
        Box::pin(self.network_by_key(name))
    }

    fn list_networks(&self) -> ProviderFuture<'_, Vec<Network>> {
        Box::pin(async move {
            let networks = self.neutron_list::<NetworksEnvelope>("networks", &[]).await?;
            Ok(networks.into_iter().map(Network::from).collect())
        })
    }

    fn create_network<'a>(&'a self, request: &'a NetworkCreate) -> ProviderFuture<'a, Network> {
        Box::pin(async move {
            let body = json!({
                "network": {
                    "name": request.name,
                    "admin_state_up": request.admin_state_up,
                }
            });
            let envelope: NetworkEnvelope = self.neutron_post("networks", &body).await?;
            Ok(Network::from(envelope.network))
        })
    }

    fn delete_network<'a>(&'a self, id: &'a str) -> ProviderFuture<'a, ()> {
        Box::pin(async move {
            self.delete(Service::Network, &path(&format!("networks/{id}")))
                .await
        })
    }

    fn create_subnet<'a>(&'a self, request: &'a SubnetCreate) -> ProviderFuture<'a, Subnet> {
        Box::pin(async move {
            let body = json!({
                "subnet": {
                    "name": request.name,
                    "network_id": request.network_id,
                    "cidr": request.cidr,
                    "ip_version": request.ip_version,
                    "enable_dhcp": request.enable_dhcp,
                    "dns_nameservers": request.dns_nameservers,
                }
            });
            let envelope: SubnetEnvelope = self.neutron_post("subnets", &body).await?;
            Ok(Subnet::from(envelope.subnet))
        })
    }

    fn list_routers(&self) -> ProviderFuture<'_, Vec<Router>> {
        Box::pin(async move {
            let routers = self.neutron_list::<RoutersEnvelope>("routers", &[]).await?;
            Ok(routers.into_iter().map(Router::from).collect())
        })
    }

    fn create_router<'a>(&'a self, request: &'a RouterCreate) -> ProviderFuture<'a, Router> {
        Box::pin(async move {
            let gateway = request.external_network_id.as_ref().map(|id| GatewayInfo {
                network_id: id.clone(),
            });
            let body = json!({
                "router": {
                    "name": request.name,
                    "external_gateway_info": gateway,
                }
            });
            let envelope: RouterEnvelope = self.neutron_post("routers", &body).await?;
            Ok(Router::from(envelope.router))
        })
    }

    fn add_router_interface<'a>(
        &'a self,
        router_id: &'a str,
        subnet_id: &'a str,
    ) -> ProviderFuture<'a, ()> {
        Box::pin(self.router_interface(
            router_id,
            "add_router_interface",
            json!({ "subnet_id": subnet_id }),
        ))
    }

    fn remove_router_interface<'a>(
        &'a self,
        router_id: &'a str,
        port_id: &'a str,
    ) -> ProviderFuture<'a, ()> {
        Box::pin(self.router_interface(
            router_id,
            "remove_router_interface",
            json!({ "port_id": port_id }),
        ))
    }

    fn delete_router<'a>(&'a self, id: &'a str) -> ProviderFuture<'a, ()> {
        Box::pin(async move {
            self.delete(Service::Network, &path(&format!("routers/{id}")))
                .await
        })
    }

    fn list_ports<'a>(&'a self, device_id: &'a str) -> ProviderFuture<'a, Vec<Port>> {
        Box::pin(async move {
            let ports = self
                .neutron_list::<PortsEnvelope>("ports", &[("device_id", device_id)])
                .await?;
            Ok(ports.into_iter().map(Port::from).collect())
        })
    }

    fn find_security_group<'a>(
        &'a self,
        name: &'a str,
    ) -> ProviderFuture<'a, Option<SecurityGroup>> {
        Box::pin(self.security_group_by_key(name))
    }

    fn list_security_groups(&self) -> ProviderFuture<'_, Vec<SecurityGroup>> {
        Box::pin(async move {
            let groups = self
                .neutron_list::<SecurityGroupsEnvelope>("security-groups", &[])
                .await?;
            Ok(groups
                .into_iter()
                .map(SecurityGroup::from)
                .collect())
        })
    }

    fn create_security_group<'a>(
        &'a self,
        name: &'a str,
        description: &'a str,
    ) -> ProviderFuture<'a, SecurityGroup> {
        Box::pin(async move {
            let body = json!({
                "security_group": { "name": name, "description": description }
            });
            let envelope: SecurityGroupEnvelope =
                self.neutron_post("security-groups", &body).await?;
            Ok(SecurityGroup::from(envelope.security_group))
        })
    }

    fn create_security_group_rule<'a>(
        &'a self,
        request: &'a SecurityGroupRuleCreate,
    ) -> ProviderFuture<'a, SecurityGroupRule> {
        Box::pin(async move {
            let body = json!({
                "security_group_rule": {
                    "security_group_id": request.security_group_id,
                    "direction": request.direction.as_str(),
                    "ethertype": request.ether_type,
                    "protocol": request.protocol,
                    "port_range_min": request.port_range_min,
                    "port_range_max": request.port_range_max,
                    "remote_ip_prefix": request.remote_ip_prefix,
                }
            });
            let envelope: SecurityGroupRuleEnvelope =
                self.neutron_post("security-group-rules", &body).await?;
            Ok(SecurityGroupRule::from(envelope.security_group_rule))
        })
    }

    fn delete_security_group<'a>(&'a self, id: &'a str) -> ProviderFuture<'a, ()> {
        Box::pin(async move {
            self.delete(Service::Network, &path(&format!("security-groups/{id}")))
                .await
        })
    }

    fn create_floating_ip<'a>(&'a self, network_id: &'a str) -> ProviderFuture<'a, FloatingIp> {
        Box::pin(async move {
            let body = json!({ "floatingip": { "floating_network_id": network_id } });
            let envelope: FloatingIpEnvelope = self.neutron_post("floatingips", &body).await?;
            Ok(FloatingIp::from(envelope.floatingip))
        })
    }

    fn associate_floating_ip<'a>(
        &'a self,
        floating_ip_id: &'a str,
        port_id: &'a str,
    ) -> ProviderFuture<'a, FloatingIp> {
        Box::pin(async move {
            let envelope: FloatingIpEnvelope = self
                .send_json(
                    Service::Network,
                    Method::PUT,
                    &path(&format!("floatingips/{floating_ip_id}")),
                    &json!({ "floatingip": { "port_id": port_id } }),
                )
                .await?;
            Ok(FloatingIp::from(envelope.floatingip))
        })
    }

    fn list_floating_ips(&self) -> ProviderFuture<'_, Vec<FloatingIp>> {
        Box::pin(async move {
            let floating_ips = self
                .neutron_list::<FloatingIpsEnvelope>("floatingips", &[])
                .await?;
            Ok(floating_ips
                .into_iter()
                .map(FloatingIp::from)
                .collect())
        })
    }

    fn delete_floating_ip<'a>(&'a self, id: &'a str) -> ProviderFuture<'a, ()> {
        Box::pin(async move {
            self.delete(Service::Network, &path(&format!("floatingips/{id}")))
                .await
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn neutron_paths_are_versioned() {
        assert_eq!(path("security-groups"), "/v2.0/security-groups");
        assert_eq!(
            path("routers/r1/add_router_interface"),
            "/v2.0/routers/r1/add_router_interface"
        );
    }
}
