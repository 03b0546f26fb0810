//! Test support utilities shared across unit and integration tests.
//!
//! [`InMemoryCloud`] implements [`crate::provider::Provider`] over plain vectors with
//! injectable faults, so batch behaviour can be exercised without a real
//! cloud. Servers are created in `BUILD` and report their boot status on the
//! next read; resizes report `VERIFY_RESIZE` on the next read unless stalled.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::env;
use std::ffi::OsString;
use std::net::{IpAddr, Ipv4Addr};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::sync::{Mutex as AsyncMutex, MutexGuard as AsyncMutexGuard};
use tokio::time::{Instant, sleep};

use crate::provider::{
    ComputeApi, Flavor, FlavorRef, FloatingIp, Image, Network, NetworkApi, NetworkCreate, Port,
    ProviderError, ProviderFuture, ROUTER_INTERFACE_OWNER, ResourceKind, Router,
    RouterCreate, SecurityGroup, SecurityGroupRule, SecurityGroupRuleCreate, Server, ServerCreate,
    ServerStatus, Subnet, SubnetCreate, Volume, VolumeApi, VolumeAttachment, VolumeCreate,
    VolumeStatus,
};

/// Name of the seeded external network.
pub const PUBLIC_NETWORK: &str = "public";

/// Name of the seeded tenant network used when a server names none.
pub const PRIVATE_NETWORK: &str = "private";

const SEEDED_FLAVORS: [&str; 3] = ["m1.small", "m1.medium", "m1.large"];
const SEEDED_IMAGES: [&str; 2] = ["cirros-0.5.2-x86_64-disk", "ubuntu-22.04"];
const SERVER_PORT_OWNER: &str = "compute:nova";

/// One recorded provider call.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct CallRecord {
    /// Operation name, for example `create_server`.
    pub operation: &'static str,
    /// Name or identifier the call targeted.
    pub target: String,
    /// Time of the call on the tokio clock.
    pub at: Instant,
}

#[derive(Debug)]
struct ServerRecord {
    server: Server,
    next_status: Option<ServerStatus>,
}

#[derive(Debug)]
struct VolumeRecord {
    volume: Volume,
    next_status: Option<VolumeStatus>,
}

#[derive(Debug, Default)]
struct Faults {
    create: HashMap<String, ProviderError>,
    lookup: HashSet<String>,
    stalled_resize: HashSet<String>,
    stalled_delete: HashSet<String>,
    snapshot: HashSet<String>,
    panic_on_create: HashSet<String>,
    boot_status: HashMap<String, ServerStatus>,
    no_address: HashSet<String>,
    failing_volumes: HashSet<String>,
    create_latency: Duration,
}

#[derive(Debug, Default)]
struct CloudState {
    sequence: u64,
    servers: Vec<ServerRecord>,
    flavors: Vec<Flavor>,
    images: Vec<Image>,
    networks: Vec<Network>,
    subnets: Vec<Subnet>,
    routers: Vec<Router>,
    ports: Vec<Port>,
    security_groups: Vec<SecurityGroup>,
    rules: Vec<SecurityGroupRule>,
    floating_ips: Vec<FloatingIp>,
    volumes: Vec<VolumeRecord>,
    attachments: Vec<VolumeAttachment>,
    boot_scripts: HashMap<String, String>,
    faults: Faults,
    late_servers: Vec<(String, String)>,
    calls: Vec<CallRecord>,
}

impl CloudState {
    fn next_id(&mut self, prefix: &str) -> String {
        self.sequence += 1;
        format!("{prefix}-{}", self.sequence)
    }

    fn next_address(&mut self) -> IpAddr {
        self.sequence += 1;
        let host = u32::try_from(self.sequence).unwrap_or(u32::MAX);
        IpAddr::V4(Ipv4Addr::from(0x0a00_0000_u32.saturating_add(host)))
    }

    fn record(&mut self, operation: &'static str, target: &str) {
        self.calls.push(CallRecord {
            operation,
            target: target.to_owned(),
            at: Instant::now(),
        });
    }

    fn network_by_id(&self, id: &str) -> Option<&Network> {
        self.networks.iter().find(|network| network.id == id)
    }

    fn add_network(&mut self, name: &str, external: bool) -> Network {
        let network = Network {
            id: self.next_id("net"),
            name: name.to_owned(),
            is_router_external: external,
        };
        self.networks.push(network.clone());
        network
    }

    fn insert_server(
        &mut self,
        name: &str,
        flavor: &Flavor,
        image_id: Option<String>,
        network_ids: &[String],
        status: ServerStatus,
        next_status: Option<ServerStatus>,
    ) -> Server {
        let id = self.next_id("srv");
        let mut addresses = BTreeMap::new();
        for network_id in network_ids {
            let Some(network_name) = self.network_by_id(network_id).map(|net| net.name.clone())
            else {
                continue;
            };
            let port_id = self.next_id("port");
            self.ports.push(Port {
                id: port_id,
                network_id: network_id.clone(),
                device_id: id.clone(),
                device_owner: String::from(SERVER_PORT_OWNER),
            });
            let ips = if self.faults.no_address.contains(name) {
                Vec::new()
            } else {
                vec![self.next_address()]
            };
            addresses.insert(network_name, ips);
        }
        let server = Server {
            id,
            name: name.to_owned(),
            status,
            addresses,
            flavor: FlavorRef {
                id: Some(flavor.id.clone()),
                original_name: Some(flavor.name.clone()),
            },
            image_id,
        };
        self.servers.push(ServerRecord {
            server: server.clone(),
            next_status,
        });
        server
    }

    fn server_mut(&mut self, id: &str) -> Result<&mut ServerRecord, ProviderError> {
        self.servers
            .iter_mut()
            .find(|record| record.server.id == id)
            .ok_or_else(|| ProviderError::not_found(ResourceKind::Server, id))
    }
}

/// In-memory [`crate::provider::Provider`] with fault injection and call accounting.
///
/// Cloning shares the same state.
#[derive(Clone, Debug)]
pub struct InMemoryCloud {
    state: Arc<Mutex<CloudState>>,
    in_flight_creates: Arc<AtomicUsize>,
    peak_creates: Arc<AtomicUsize>,
}

impl Default for InMemoryCloud {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryCloud {
    /// Creates a cloud seeded with `m1.small`, `m1.medium` and `m1.large`
    /// flavors, the cirros and Ubuntu images, an external `public` network
    /// and a `private` tenant network.
    #[must_use]
    pub fn new() -> Self {
        let mut state = CloudState::default();
        for name in SEEDED_FLAVORS {
            let flavor = Flavor {
                id: state.next_id("flavor"),
                name: name.to_owned(),
            };
            state.flavors.push(flavor);
        }
        for name in SEEDED_IMAGES {
            let image = Image {
                id: state.next_id("img"),
                name: name.to_owned(),
            };
            state.images.push(image);
        }
        state.add_network(PUBLIC_NETWORK, true);
        state.add_network(PRIVATE_NETWORK, false);
        Self {
            state: Arc::new(Mutex::new(state)),
            in_flight_creates: Arc::new(AtomicUsize::new(0)),
            peak_creates: Arc::new(AtomicUsize::new(0)),
        }
    }

    fn with_state<R>(&self, apply: impl FnOnce(&mut CloudState) -> R) -> R {
        let mut guard = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        apply(&mut guard)
    }

    /// Adds an `ACTIVE` server on the `private` network using `flavor`.
    ///
    /// # Errors
    ///
    /// Returns [`ProviderError::NotFound`] when the flavor is not seeded.
    pub fn seed_server(&self, name: &str, flavor: &str) -> Result<Server, ProviderError> {
        self.seed_server_with_status(name, flavor, ServerStatus::Active)
    }

    /// Adds a server in `status` on the `private` network using `flavor`.
    ///
    /// # Errors
    ///
    /// Returns [`ProviderError::NotFound`] when the flavor is not seeded.
    pub fn seed_server_with_status(
        &self,
        name: &str,
        flavor: &str,
        status: ServerStatus,
    ) -> Result<Server, ProviderError> {
        self.with_state(|state| {
            let found = state
                .flavors
                .iter()
                .find(|candidate| matches_key(&candidate.id, &candidate.name, flavor))
                .cloned()
                .ok_or_else(|| ProviderError::not_found(ResourceKind::Flavor, flavor))?;
            let image_id = state.images.first().map(|image| image.id.clone());
            let private = state
                .networks
                .iter()
                .find(|network| network.name == PRIVATE_NETWORK)
                .map(|network| network.id.clone())
                .into_iter()
                .collect::<Vec<_>>();
            Ok(state.insert_server(name, &found, image_id, &private, status, None))
        })
    }

    /// Adds a network.
    #[must_use]
    pub fn seed_network(&self, name: &str, external: bool) -> Network {
        self.with_state(|state| state.add_network(name, external))
    }

    /// Removes every external network.
    pub fn remove_external_networks(&self) {
        self.with_state(|state| state.networks.retain(|network| !network.is_router_external));
    }

    /// Makes `create_server` fail for `name` with `error`.
    pub fn fail_create(&self, name: &str, error: ProviderError) {
        self.with_state(|state| state.faults.create.insert(name.to_owned(), error));
    }

    /// Makes `find_server` fail for `name` with a backend error.
    pub fn fail_lookup(&self, name: &str) {
        self.with_state(|state| state.faults.lookup.insert(name.to_owned()));
    }

    /// Keeps `name` in `RESIZE` forever once a resize is requested.
    pub fn stall_resize(&self, name: &str) {
        self.with_state(|state| state.faults.stalled_resize.insert(name.to_owned()));
    }

    /// Leaves `name` in `DELETING` forever once a delete is requested.
    pub fn stall_delete(&self, name: &str) {
        self.with_state(|state| state.faults.stalled_delete.insert(name.to_owned()));
    }

    /// Adds an `ACTIVE` server called `name` right after the next
    /// `list_servers` call returns, so that listing does not include it.
    pub fn seed_after_listing(&self, name: &str, flavor: &str) {
        self.with_state(|state| {
            state
                .late_servers
                .push((name.to_owned(), flavor.to_owned()));
        });
    }

    /// Makes `create_server_image` fail for the server called `name`.
    pub fn fail_snapshot(&self, name: &str) {
        self.with_state(|state| state.faults.snapshot.insert(name.to_owned()));
    }

    /// Makes `create_server` panic for `name`.
    pub fn panic_on_create(&self, name: &str) {
        self.with_state(|state| state.faults.panic_on_create.insert(name.to_owned()));
    }

    /// Makes a new server called `name` boot into `status` instead of
    /// `ACTIVE`.
    pub fn boot_status(&self, name: &str, status: ServerStatus) {
        self.with_state(|state| state.faults.boot_status.insert(name.to_owned(), status));
    }

    /// Creates future servers called `name` without addresses.
    pub fn without_address(&self, name: &str) {
        self.with_state(|state| state.faults.no_address.insert(name.to_owned()));
    }

    /// Makes new volumes called `name` end in `error`.
    pub fn fail_volume(&self, name: &str) {
        self.with_state(|state| state.faults.failing_volumes.insert(name.to_owned()));
    }

    /// Delays every `create_server` call by `latency` on the tokio clock.
    pub fn create_latency(&self, latency: Duration) {
        self.with_state(|state| state.faults.create_latency = latency);
    }

    /// Returns every server currently known.
    #[must_use]
    pub fn servers(&self) -> Vec<Server> {
        self.with_state(|state| {
            state
                .servers
                .iter()
                .map(|record| record.server.clone())
                .collect()
        })
    }

    /// Returns the server called `name`, if any.
    #[must_use]
    pub fn server(&self, name: &str) -> Option<Server> {
        self.with_state(|state| {
            state
                .servers
                .iter()
                .find(|record| record.server.name == name)
                .map(|record| record.server.clone())
        })
    }

    /// Returns the boot script sent when the server called `name` was
    /// created.
    #[must_use]
    pub fn boot_script(&self, name: &str) -> Option<String> {
        self.with_state(|state| state.boot_scripts.get(name).cloned())
    }

    /// Returns every image, seeded ones first.
    #[must_use]
    pub fn images(&self) -> Vec<Image> {
        self.with_state(|state| state.images.clone())
    }

    /// Returns every network.
    #[must_use]
    pub fn networks(&self) -> Vec<Network> {
        self.with_state(|state| state.networks.clone())
    }

    /// Returns every router.
    #[must_use]
    pub fn routers(&self) -> Vec<Router> {
        self.with_state(|state| state.routers.clone())
    }

    /// Returns every security group rule.
    #[must_use]
    pub fn security_group_rules(&self) -> Vec<SecurityGroupRule> {
        self.with_state(|state| state.rules.clone())
    }

    /// Returns every volume.
    #[must_use]
    pub fn volumes(&self) -> Vec<Volume> {
        self.with_state(|state| {
            state
                .volumes
                .iter()
                .map(|record| record.volume.clone())
                .collect()
        })
    }

    /// Returns every floating IP.
    #[must_use]
    pub fn floating_ips(&self) -> Vec<FloatingIp> {
        self.with_state(|state| state.floating_ips.clone())
    }

    /// Returns every recorded call in order.
    #[must_use]
    pub fn calls(&self) -> Vec<CallRecord> {
        self.with_state(|state| state.calls.clone())
    }

    /// Returns the recorded calls for `operation`.
    #[must_use]
    pub fn calls_to(&self, operation: &str) -> Vec<CallRecord> {
        self.with_state(|state| {
            state
                .calls
                .iter()
                .filter(|call| call.operation == operation)
                .cloned()
                .collect()
        })
    }

    /// Highest number of `create_server` calls observed in flight at once.
    #[must_use]
    pub fn peak_concurrent_creates(&self) -> usize {
        self.peak_creates.load(Ordering::SeqCst)
    }

    fn enter_create(&self) {
        let now = self.in_flight_creates.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_creates.fetch_max(now, Ordering::SeqCst);
    }

    fn leave_create(&self) {
        self.in_flight_creates.fetch_sub(1, Ordering::SeqCst);
    }

    fn find_by_name_or_id<T>(
        &self,
        operation: &'static str,
        key: &str,
        select: impl FnOnce(&CloudState) -> Option<T>,
    ) -> Option<T> {
        self.with_state(|state| {
            state.record(operation, key);
            select(state)
        })
    }

    fn create_server_now(&self, request: &ServerCreate) -> Result<Server, ProviderError> {
        self.with_state(|state| {
            if let Some(err) = state.faults.create.get(&request.name) {
                return Err(err.clone());
            }
            let flavor = state
                .flavors
                .iter()
                .find(|flavor| flavor.id == request.flavor_id)
                .cloned()
                .ok_or_else(|| ProviderError::not_found(ResourceKind::Flavor, &request.flavor_id))?;
            if !state.images.iter().any(|image| image.id == request.image_id) {
                return Err(ProviderError::not_found(ResourceKind::Image, &request.image_id));
            }
            let mut network_ids: Vec<String> = request
                .networks
                .iter()
                .map(|network| network.network_id.clone())
                .collect();
            if network_ids.is_empty()
                && let Some(private) = state
                    .networks
                    .iter()
                    .find(|network| network.name == PRIVATE_NETWORK)
            {
                network_ids.push(private.id.clone());
            }
            if let Some(script) = &request.user_data {
                state
                    .boot_scripts
                    .insert(request.name.clone(), script.clone());
            }
            let boot = state
                .faults
                .boot_status
                .get(&request.name)
                .cloned()
                .unwrap_or(ServerStatus::Active);
            Ok(state.insert_server(
                &request.name,
                &flavor,
                Some(request.image_id.clone()),
                &network_ids,
                ServerStatus::Build,
                Some(boot),
            ))
        })
    }
}

fn injected_panic(name: &str) -> ! {
    panic!("injected panic while creating {name}");
}

fn matches_key(id: &str, name: &str, key: &str) -> bool {
    id == key || name == key
}

impl ComputeApi for InMemoryCloud {
    fn find_server<'a>(&'a self, name: &'a str) -> ProviderFuture<'a, Option<Server>> {
        Box::pin(async move {
            self.with_state(|state| {
                state.record("find_server", name);
                if state.faults.lookup.contains(name) {
                    return Err(ProviderError::Backend {
                        status: Some(500),
                        message: format!("injected lookup failure for {name}"),
                    });
                }
                Ok(state
                    .servers
                    .iter()
                    .find(|record| matches_key(&record.server.id, &record.server.name, name))
                    .map(|record| record.server.clone()))
            })
        })
    }

    fn get_server<'a>(&'a self, id: &'a str) -> ProviderFuture<'a, Option<Server>> {
        Box::pin(async move {
            Ok(self.with_state(|state| {
                state.record("get_server", id);
                let record = state
                    .servers
                    .iter_mut()
                    .find(|record| record.server.id == id)?;
                if let Some(next) = record.next_status.take() {
                    record.server.status = next;
                }
                Some(record.server.clone())
            }))
        })
    }

    fn list_servers(&self) -> ProviderFuture<'_, Vec<Server>> {
        Box::pin(async move {
            let listed = self.servers();
            let late = self.with_state(|state| std::mem::take(&mut state.late_servers));
            for (name, flavor) in late {
                self.seed_server(&name, &flavor)?;
            }
            Ok(listed)
        })
    }

    fn create_server<'a>(&'a self, request: &'a ServerCreate) -> ProviderFuture<'a, Server> {
        Box::pin(async move {
            let (latency, panics) = self.with_state(|state| {
                state.record("create_server", &request.name);
                (
                    state.faults.create_latency,
                    state.faults.panic_on_create.contains(&request.name),
                )
            });
            if panics {
                injected_panic(&request.name);
            }
            self.enter_create();
            if !latency.is_zero() {
                sleep(latency).await;
            }
            let created = self.create_server_now(request);
            self.leave_create();
            created
        })
    }

    fn delete_server<'a>(&'a self, id: &'a str) -> ProviderFuture<'a, ()> {
        Box::pin(async move {
            self.with_state(|state| {
                state.record("delete_server", id);
                let stalled = &state.faults.stalled_delete;
                if let Some(record) = state.servers.iter_mut().find(|record| {
                    record.server.id == id && stalled.contains(&record.server.name)
                }) {
                    record.server.status = ServerStatus::Other(String::from("DELETING"));
                    record.next_status = None;
                    return Ok(());
                }
                let before = state.servers.len();
                state.servers.retain(|record| record.server.id != id);
                if state.servers.len() == before {
                    return Err(ProviderError::not_found(ResourceKind::Server, id));
                }
                state.ports.retain(|port| port.device_id != id);
                Ok(())
            })
        })
    }

    fn resize_server<'a>(&'a self, id: &'a str, flavor_id: &'a str) -> ProviderFuture<'a, ()> {
        Box::pin(async move {
            self.with_state(|state| {
                state.record("resize_server", id);
                let flavor = state
                    .flavors
                    .iter()
                    .find(|flavor| flavor.id == flavor_id)
                    .cloned()
                    .ok_or_else(|| ProviderError::not_found(ResourceKind::Flavor, flavor_id))?;
                let stalled = state
                    .servers
                    .iter()
                    .find(|record| record.server.id == id)
                    .is_some_and(|record| state.faults.stalled_resize.contains(&record.server.name));
                let record = state.server_mut(id)?;
                if record.server.status != ServerStatus::Active {
                    return Err(ProviderError::Backend {
                        status: Some(409),
                        message: format!("cannot resize server in status {}", record.server.status),
                    });
                }
                record.server.status = ServerStatus::Resize;
                record.server.flavor = FlavorRef {
                    id: Some(flavor.id),
                    original_name: Some(flavor.name),
                };
                record.next_status = if stalled {
                    None
                } else {
                    Some(ServerStatus::VerifyResize)
                };
                Ok(())
            })
        })
    }

    fn confirm_resize<'a>(&'a self, id: &'a str) -> ProviderFuture<'a, ()> {
        Box::pin(async move {
            self.with_state(|state| {
                state.record("confirm_resize", id);
                let record = state.server_mut(id)?;
                if record.server.status != ServerStatus::VerifyResize {
                    return Err(ProviderError::Backend {
                        status: Some(409),
                        message: format!("cannot confirm resize in status {}", record.server.status),
                    });
                }
                record.server.status = ServerStatus::Active;
                Ok(())
            })
        })
    }

    fn create_server_image<'a>(
        &'a self,
        id: &'a str,
        image_name: &'a str,
    ) -> ProviderFuture<'a, String> {
        Box::pin(async move {
            self.with_state(|state| {
                state.record("create_server_image", image_name);
                let server_name = state.server_mut(id)?.server.name.clone();
                if state.faults.snapshot.contains(&server_name) {
                    return Err(ProviderError::Backend {
                        status: Some(500),
                        message: format!("injected snapshot failure for {server_name}"),
                    });
                }
                let image = Image {
                    id: state.next_id("img"),
                    name: image_name.to_owned(),
                };
                state.images.push(image.clone());
                Ok(image.id)
            })
        })
    }

    fn attach_volume<'a>(
        &'a self,
        server_id: &'a str,
        volume_id: &'a str,
    ) -> ProviderFuture<'a, VolumeAttachment> {
        Box::pin(async move {
            self.with_state(|state| {
                state.record("attach_volume", volume_id);
                state.server_mut(server_id)?;
                let device_index = state.attachments.len();
                let volume = state
                    .volumes
                    .iter_mut()
                    .find(|record| record.volume.id == volume_id)
                    .ok_or_else(|| ProviderError::not_found(ResourceKind::Volume, volume_id))?;
                if volume.volume.status != VolumeStatus::Available {
                    return Err(ProviderError::Backend {
                        status: Some(400),
                        message: format!("volume {volume_id} is {}", volume.volume.status),
                    });
                }
                volume.volume.status = VolumeStatus::InUse;
                let letter = u8::try_from(device_index)
                    .ok()
                    .and_then(|offset| b'b'.checked_add(offset))
                    .filter(u8::is_ascii_lowercase)
                    .map_or('z', char::from);
                let device = format!("/dev/vd{letter}");
                let attachment = VolumeAttachment {
                    id: state.next_id("att"),
                    server_id: server_id.to_owned(),
                    volume_id: volume_id.to_owned(),
                    device: Some(device),
                };
                state.attachments.push(attachment.clone());
                Ok(attachment)
            })
        })
    }

    fn find_flavor<'a>(&'a self, name: &'a str) -> ProviderFuture<'a, Option<Flavor>> {
        Box::pin(async move {
            Ok(self.find_by_name_or_id("find_flavor", name, |state| {
                state
                    .flavors
                    .iter()
                    .find(|flavor| matches_key(&flavor.id, &flavor.name, name))
                    .cloned()
            }))
        })
    }

    fn find_image<'a>(&'a self, name: &'a str) -> ProviderFuture<'a, Option<Image>> {
        Box::pin(async move {
            Ok(self.find_by_name_or_id("find_image", name, |state| {
                state
                    .images
                    .iter()
                    .find(|image| matches_key(&image.id, &image.name, name))
                    .cloned()
            }))
        })
    }
}

impl NetworkApi for InMemoryCloud {
    fn find_network<'a>(&'a self, name: &'a str) -> ProviderFuture<'a, Option<Network>> {
        Box::pin(async move {
            Ok(self.find_by_name_or_id("find_network", name, |state| {
                state
                    .networks
                    .iter()
                    .find(|network| matches_key(&network.id, &network.name, name))
                    .cloned()
            }))
        })
    }

    fn list_networks(&self) -> ProviderFuture<'_, Vec<Network>> {
        Box::pin(async move { Ok(self.networks()) })
    }

    fn create_network<'a>(&'a self, request: &'a NetworkCreate) -> ProviderFuture<'a, Network> {
        Box::pin(async move {
            Ok(self.with_state(|state| {
                state.record("create_network", &request.name);
                state.add_network(&request.name, false)
            }))
        })
    }

    fn delete_network<'a>(&'a self, id: &'a str) -> ProviderFuture<'a, ()> {
        Box::pin(async move {
            self.with_state(|state| {
                state.record("delete_network", id);
                if state.ports.iter().any(|port| port.network_id == id) {
                    return Err(ProviderError::Backend {
                        status: Some(409),
                        message: format!("network {id} has ports in use"),
                    });
                }
                state.networks.retain(|network| network.id != id);
                state.subnets.retain(|subnet| subnet.network_id != id);
                Ok(())
            })
        })
    }

    fn create_subnet<'a>(&'a self, request: &'a SubnetCreate) -> ProviderFuture<'a, Subnet> {
        Box::pin(async move {
            self.with_state(|state| {
                state.record("create_subnet", &request.name);
                if state.network_by_id(&request.network_id).is_none() {
                    return Err(ProviderError::not_found(
                        ResourceKind::Network,
                        &request.network_id,
                    ));
                }
                let subnet = Subnet {
                    id: state.next_id("subnet"),
                    name: request.name.clone(),
                    network_id: request.network_id.clone(),
                    cidr: request.cidr.clone(),
                };
                state.subnets.push(subnet.clone());
                Ok(subnet)
            })
        })
    }

    fn list_routers(&self) -> ProviderFuture<'_, Vec<Router>> {
        Box::pin(async move { Ok(self.routers()) })
    }

    fn create_router<'a>(&'a self, request: &'a RouterCreate) -> ProviderFuture<'a, Router> {
        Box::pin(async move {
            Ok(self.with_state(|state| {
                state.record("create_router", &request.name);
                let router = Router {
                    id: state.next_id("router"),
                    name: request.name.clone(),
                    external_network_id: request.external_network_id.clone(),
                };
                state.routers.push(router.clone());
                router
            }))
        })
    }

    fn add_router_interface<'a>(
        &'a self,
        router_id: &'a str,
        subnet_id: &'a str,
    ) -> ProviderFuture<'a, ()> {
        Box::pin(async move {
            self.with_state(|state| {
                state.record("add_router_interface", router_id);
                let network_id = state
                    .subnets
                    .iter()
                    .find(|subnet| subnet.id == subnet_id)
                    .map(|subnet| subnet.network_id.clone())
                    .ok_or_else(|| ProviderError::not_found(ResourceKind::Subnet, subnet_id))?;
                let port = Port {
                    id: state.next_id("port"),
                    network_id,
                    device_id: router_id.to_owned(),
                    device_owner: String::from(ROUTER_INTERFACE_OWNER),
                };
                state.ports.push(port);
                Ok(())
            })
        })
    }

    fn remove_router_interface<'a>(
        &'a self,
        router_id: &'a str,
        port_id: &'a str,
    ) -> ProviderFuture<'a, ()> {
        Box::pin(async move {
            self.with_state(|state| {
                state.record("remove_router_interface", router_id);
                state
                    .ports
                    .retain(|port| !(port.id == port_id && port.device_id == router_id));
                Ok(())
            })
        })
    }

    fn delete_router<'a>(&'a self, id: &'a str) -> ProviderFuture<'a, ()> {
        Box::pin(async move {
            self.with_state(|state| {
                state.record("delete_router", id);
                if state.ports.iter().any(|port| port.device_id == id) {
                    return Err(ProviderError::Backend {
                        status: Some(409),
                        message: format!("router {id} still has interfaces"),
                    });
                }
                state.routers.retain(|router| router.id != id);
                Ok(())
            })
        })
    }

    fn list_ports<'a>(&'a self, device_id: &'a str) -> ProviderFuture<'a, Vec<Port>> {
        Box::pin(async move {
            Ok(self.with_state(|state| {
                state
                    .ports
                    .iter()
                    .filter(|port| port.device_id == device_id)
                    .cloned()
                    .collect()
            }))
        })
    }

    fn find_security_group<'a>(
        &'a self,
        name: &'a str,
    ) -> ProviderFuture<'a, Option<SecurityGroup>> {
        Box::pin(async move {
            Ok(self.find_by_name_or_id("find_security_group", name, |state| {
                state
                    .security_groups
                    .iter()
                    .find(|group| matches_key(&group.id, &group.name, name))
                    .cloned()
            }))
        })
    }

    fn list_security_groups(&self) -> ProviderFuture<'_, Vec<SecurityGroup>> {
        Box::pin(async move { Ok(self.with_state(|state| state.security_groups.clone())) })
    }

    fn create_security_group<'a>(
        &'a self,
        name: &'a str,
        description: &'a str,
    ) -> ProviderFuture<'a, SecurityGroup> {
        Box::pin(async move {
            Ok(self.with_state(|state| {
                state.record("create_security_group", name);
                let group = SecurityGroup {
                    id: state.next_id("sg"),
                    name: name.to_owned(),
                    description: description.to_owned(),
                };
                state.security_groups.push(group.clone());
                group
            }))
        })
    }

    fn create_security_group_rule<'a>(
        &'a self,
        request: &'a SecurityGroupRuleCreate,
    ) -> ProviderFuture<'a, SecurityGroupRule> {
        Box::pin(async move {
            self.with_state(|state| {
                state.record("create_security_group_rule", &request.security_group_id);
                if !state
                    .security_groups
                    .iter()
                    .any(|group| group.id == request.security_group_id)
                {
                    return Err(ProviderError::not_found(
                        ResourceKind::SecurityGroup,
                        &request.security_group_id,
                    ));
                }
                let rule = SecurityGroupRule {
                    id: state.next_id("rule"),
                    security_group_id: request.security_group_id.clone(),
                    protocol: Some(request.protocol.clone()),
                    port_range_min: request.port_range_min,
                    port_range_max: request.port_range_max,
                };
                state.rules.push(rule.clone());
                Ok(rule)
            })
        })
    }

    fn delete_security_group<'a>(&'a self, id: &'a str) -> ProviderFuture<'a, ()> {
        Box::pin(async move {
            self.with_state(|state| {
                state.record("delete_security_group", id);
                state.security_groups.retain(|group| group.id != id);
                state.rules.retain(|rule| rule.security_group_id != id);
                Ok(())
            })
        })
    }

    fn create_floating_ip<'a>(&'a self, network_id: &'a str) -> ProviderFuture<'a, FloatingIp> {
        Box::pin(async move {
            self.with_state(|state| {
                state.record("create_floating_ip", network_id);
                if !state
                    .network_by_id(network_id)
                    .is_some_and(|network| network.is_router_external)
                {
                    return Err(ProviderError::not_found(
                        ResourceKind::ExternalNetwork,
                        network_id,
                    ));
                }
                let address = state.next_address();
                let floating_ip = FloatingIp {
                    id: state.next_id("fip"),
                    floating_ip_address: address.to_string(),
                    fixed_ip_address: None,
                    port_id: None,
                };
                state.floating_ips.push(floating_ip.clone());
                Ok(floating_ip)
            })
        })
    }

    fn associate_floating_ip<'a>(
        &'a self,
        floating_ip_id: &'a str,
        port_id: &'a str,
    ) -> ProviderFuture<'a, FloatingIp> {
        Box::pin(async move {
            self.with_state(|state| {
                state.record("associate_floating_ip", floating_ip_id);
                let device_id = state
                    .ports
                    .iter()
                    .find(|port| port.id == port_id)
                    .map(|port| port.device_id.clone())
                    .ok_or_else(|| ProviderError::not_found(ResourceKind::Port, port_id))?;
                let fixed = state
                    .servers
                    .iter()
                    .find(|record| record.server.id == device_id)
                    .and_then(|record| record.server.addresses.values().flatten().next().copied());
                let floating_ip = state
                    .floating_ips
                    .iter_mut()
                    .find(|fip| fip.id == floating_ip_id)
                    .ok_or_else(|| {
                        ProviderError::not_found(ResourceKind::FloatingIp, floating_ip_id)
                    })?;
                floating_ip.port_id = Some(port_id.to_owned());
                floating_ip.fixed_ip_address = fixed.map(|ip| ip.to_string());
                Ok(floating_ip.clone())
            })
        })
    }

    fn list_floating_ips(&self) -> ProviderFuture<'_, Vec<FloatingIp>> {
        Box::pin(async move { Ok(self.floating_ips()) })
    }

    fn delete_floating_ip<'a>(&'a self, id: &'a str) -> ProviderFuture<'a, ()> {
        Box::pin(async move {
            self.with_state(|state| {
                state.record("delete_floating_ip", id);
                state.floating_ips.retain(|fip| fip.id != id);
                Ok(())
            })
        })
    }
}

impl VolumeApi for InMemoryCloud {
    fn create_volume<'a>(&'a self, request: &'a VolumeCreate) -> ProviderFuture<'a, Volume> {
        Box::pin(async move {
            Ok(self.with_state(|state| {
                state.record("create_volume", &request.name);
                let next = if state.faults.failing_volumes.contains(&request.name) {
                    VolumeStatus::Error
                } else {
                    VolumeStatus::Available
                };
                let volume = Volume {
                    id: state.next_id("vol"),
                    name: Some(request.name.clone()),
                    size_gib: request.size_gib,
                    status: VolumeStatus::Creating,
                };
                state.volumes.push(VolumeRecord {
                    volume: volume.clone(),
                    next_status: Some(next),
                });
                volume
            }))
        })
    }

    fn get_volume<'a>(&'a self, id: &'a str) -> ProviderFuture<'a, Option<Volume>> {
        Box::pin(async move {
            Ok(self.with_state(|state| {
                let record = state
                    .volumes
                    .iter_mut()
                    .find(|record| record.volume.id == id)?;
                if let Some(next) = record.next_status.take() {
                    record.volume.status = next;
                }
                Some(record.volume.clone())
            }))
        })
    }

    fn find_volume<'a>(&'a self, name: &'a str) -> ProviderFuture<'a, Option<Volume>> {
        Box::pin(async move {
            Ok(self.find_by_name_or_id("find_volume", name, |state| {
                state
                    .volumes
                    .iter()
                    .find(|record| {
                        record.volume.id == name || record.volume.name.as_deref() == Some(name)
                    })
                    .map(|record| record.volume.clone())
            }))
        })
    }

    fn list_volumes(&self) -> ProviderFuture<'_, Vec<Volume>> {
        Box::pin(async move { Ok(self.volumes()) })
    }

    fn delete_volume<'a>(&'a self, id: &'a str) -> ProviderFuture<'a, ()> {
        Box::pin(async move {
            self.with_state(|state| {
                state.record("delete_volume", id);
                state.volumes.retain(|record| record.volume.id != id);
                state.attachments.retain(|attachment| attachment.volume_id != id);
                Ok(())
            })
        })
    }
}

/// Builds an [`Arc`] around a fresh [`InMemoryCloud`] alongside a handle for
/// assertions.
#[must_use]
pub fn shared_cloud() -> (InMemoryCloud, Arc<InMemoryCloud>) {
    let cloud = InMemoryCloud::new();
    let provider = Arc::new(cloud.clone());
    (cloud, provider)
}

/// Global mutex used to serialise environment mutation in tests.
pub static ENV_LOCK: AsyncMutex<()> = AsyncMutex::const_new(());

/// Guard that holds the env mutex and restores variables on drop.
pub struct EnvGuard {
    previous: Vec<(String, Option<OsString>)>,
    _guard: AsyncMutexGuard<'static, ()>,
}

impl EnvGuard {
    /// Sets and removes environment variables while holding a global mutex.
    ///
    /// `None` values remove the variable for the lifetime of the guard.
    pub async fn set_vars(pairs: &[(&str, Option<&str>)]) -> Self {
        debug_assert!(
            {
                let mut seen = BTreeSet::new();
                pairs.iter().all(|(key, _)| seen.insert(*key))
            },
            "duplicate environment variable keys passed to EnvGuard::set_vars"
        );

        let guard = ENV_LOCK.lock().await;
        let mut previous = Vec::with_capacity(pairs.len());
        for (key, value) in pairs {
            let old = env::var_os(key);
            // SAFETY: Environment mutation is serialised by `ENV_LOCK`, preventing races.
            unsafe {
                match value {
                    Some(val) => env::set_var(key, val),
                    None => env::remove_var(key),
                }
            }
            previous.push(((*key).to_owned(), old));
        }

        Self {
            previous,
            _guard: guard,
        }
    }
}

impl Drop for EnvGuard {
    fn drop(&mut self) {
        for (key, old) in &self.previous {
            // SAFETY: Environment mutation is serialised by holding `_guard`.
            unsafe {
                match old {
                    Some(val) => env::set_var(key, val),
                    None => env::remove_var(key),
                }
            }
        }
    }
}
