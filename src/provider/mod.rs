//! Provider abstraction over the compute, network and volume services of a
//! cloud backend.
//!
//! Each trait method maps to one backend call. Polling, retries and
//! composition live in [`crate::automation`]; implementations only translate
//! requests and responses.

mod error;
mod types;

use std::future::Future;
use std::pin::Pin;

pub use error::{ErrorClass, ProviderError, ResourceKind};
pub use types::{
    Direction, Flavor, FlavorRef, FloatingIp, Image, Network, NetworkCreate, Port,
    ROUTER_INTERFACE_OWNER, Router, RouterCreate, SecurityGroup, SecurityGroupRule,
    SecurityGroupRuleCreate, Server, ServerCreate, ServerNetwork, ServerStatus, Subnet,
    SubnetCreate, Volume, VolumeAttachment, VolumeCreate, VolumeStatus,
};

/// Future returned by provider operations.
pub type ProviderFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, ProviderError>> + Send + 'a>>;

/// Compute service operations: servers, flavors and images.
pub trait ComputeApi: Send + Sync {
    /// Looks a server up by exact name.
    fn find_server<'a>(&'a self, name: &'a str) -> ProviderFuture<'a, Option<Server>>;

    /// Fetches a server by identifier.
    fn get_server<'a>(&'a self, id: &'a str) -> ProviderFuture<'a, Option<Server>>;

    /// Lists every server visible to the project.
    fn list_servers(&self) -> ProviderFuture<'_, Vec<Server>>;

    /// Requests a new server. The returned record may still be building.
    fn create_server<'a>(&'a self, request: &'a ServerCreate) -> ProviderFuture<'a, Server>;

    /// Requests deletion of a server.
    fn delete_server<'a>(&'a self, id: &'a str) -> ProviderFuture<'a, ()>;

    /// Requests a resize to `flavor_id`; the server moves to `VERIFY_RESIZE`
    /// once the backend finishes.
    fn resize_server<'a>(&'a self, id: &'a str, flavor_id: &'a str) -> ProviderFuture<'a, ()>;

    /// Confirms a pending resize.
    fn confirm_resize<'a>(&'a self, id: &'a str) -> ProviderFuture<'a, ()>;

    /// Snapshots a server into a new image and returns the image identifier.
    fn create_server_image<'a>(
        &'a self,
        id: &'a str,
        image_name: &'a str,
    ) -> ProviderFuture<'a, String>;

    /// Attaches a volume to a server.
    fn attach_volume<'a>(
        &'a self,
        server_id: &'a str,
        volume_id: &'a str,
    ) -> ProviderFuture<'a, VolumeAttachment>;

    /// Looks a flavor up by name or identifier.
    fn find_flavor<'a>(&'a self, name: &'a str) -> ProviderFuture<'a, Option<Flavor>>;

    /// Looks an image up by name or identifier.
    fn find_image<'a>(&'a self, name: &'a str) -> ProviderFuture<'a, Option<Image>>;
}

/// Network service operations.
pub trait NetworkApi: Send + Sync {
    /// Looks a network up by name or identifier.
    fn find_network<'a>(&'a self, name: &'a str) -> ProviderFuture<'a, Option<Network>>;

    /// Lists every network visible to the project.
    fn list_networks(&self) -> ProviderFuture<'_, Vec<Network>>;

    /// Creates a network.
    fn create_network<'a>(&'a self, request: &'a NetworkCreate) -> ProviderFuture<'a, Network>;

    /// Deletes a network.
    fn delete_network<'a>(&'a self, id: &'a str) -> ProviderFuture<'a, ()>;

    /// Creates a subnet.
    fn create_subnet<'a>(&'a self, request: &'a SubnetCreate) -> ProviderFuture<'a, Subnet>;

    /// Lists every router visible to the project.
    fn list_routers(&self) -> ProviderFuture<'_, Vec<Router>>;

    /// Creates a router.
    fn create_router<'a>(&'a self, request: &'a RouterCreate) -> ProviderFuture<'a, Router>;

    /// Plugs a subnet into a router.
    fn add_router_interface<'a>(
        &'a self,
        router_id: &'a str,
        subnet_id: &'a str,
    ) -> ProviderFuture<'a, ()>;

    /// Unplugs a router interface port.
    fn remove_router_interface<'a>(
        &'a self,
        router_id: &'a str,
        port_id: &'a str,
    ) -> ProviderFuture<'a, ()>;

    /// Deletes a router.
    fn delete_router<'a>(&'a self, id: &'a str) -> ProviderFuture<'a, ()>;

    /// Lists ports bound to a device (server or router).
    fn list_ports<'a>(&'a self, device_id: &'a str) -> ProviderFuture<'a, Vec<Port>>;

    /// Looks a security group up by name or identifier.
    fn find_security_group<'a>(
        &'a self,
        name: &'a str,
    ) -> ProviderFuture<'a, Option<SecurityGroup>>;

    /// Lists every security group visible to the project.
    fn list_security_groups(&self) -> ProviderFuture<'_, Vec<SecurityGroup>>;

    /// Creates a security group.
    fn create_security_group<'a>(
        &'a self,
        name: &'a str,
        description: &'a str,
    ) -> ProviderFuture<'a, SecurityGroup>;

    /// Adds a rule to a security group.
    fn create_security_group_rule<'a>(
        &'a self,
        request: &'a SecurityGroupRuleCreate,
    ) -> ProviderFuture<'a, SecurityGroupRule>;

    /// Deletes a security group.
    fn delete_security_group<'a>(&'a self, id: &'a str) -> ProviderFuture<'a, ()>;

    /// Allocates a floating IP from an external network.
    fn create_floating_ip<'a>(&'a self, network_id: &'a str) -> ProviderFuture<'a, FloatingIp>;

    /// Binds a floating IP to a port.
    fn associate_floating_ip<'a>(
        &'a self,
        floating_ip_id: &'a str,
        port_id: &'a str,
    ) -> ProviderFuture<'a, FloatingIp>;

    /// Lists every floating IP allocated to the project.
    fn list_floating_ips(&self) -> ProviderFuture<'_, Vec<FloatingIp>>;

    /// Releases a floating IP.
    fn delete_floating_ip<'a>(&'a self, id: &'a str) -> ProviderFuture<'a, ()>;
}

/// Block storage operations.
pub trait VolumeApi: Send + Sync {
    /// Creates a volume. The returned record may still be `creating`.
    fn create_volume<'a>(&'a self, request: &'a VolumeCreate) -> ProviderFuture<'a, Volume>;

    /// Fetches a volume by identifier.
    fn get_volume<'a>(&'a self, id: &'a str) -> ProviderFuture<'a, Option<Volume>>;

    /// Looks a volume up by name or identifier.
    fn find_volume<'a>(&'a self, name: &'a str) -> ProviderFuture<'a, Option<Volume>>;

    /// Lists every volume visible to the project.
    fn list_volumes(&self) -> ProviderFuture<'_, Vec<Volume>>;

    /// Deletes a volume.
    fn delete_volume<'a>(&'a self, id: &'a str) -> ProviderFuture<'a, ()>;
}

/// A complete cloud backend.
pub trait Provider: ComputeApi + NetworkApi + VolumeApi {}

impl<T> Provider for T where T: ComputeApi + NetworkApi + VolumeApi {}
