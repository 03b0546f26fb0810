//! Prefix-based teardown.

use serde::Serialize;
use tracing::info;

use crate::provider::{Provider, ProviderError, ROUTER_INTERFACE_OWNER};

use super::Automation;

/// Prefix used when the caller does not supply one.
pub const DEFAULT_CLEANUP_PREFIX: &str = "auto-";

/// Number of resources deleted per family by
/// [`Automation::cleanup_resources`].
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Serialize)]
pub struct CleanupSummary {
    /// Servers deleted.
    pub servers: usize,
    /// Volumes deleted.
    pub volumes: usize,
    /// Unbound floating IPs released.
    pub floating_ips: usize,
    /// Routers deleted.
    pub routers: usize,
    /// Networks deleted.
    pub networks: usize,
    /// Security groups deleted.
    pub security_groups: usize,
}

impl CleanupSummary {
    /// Total number of deleted resources.
    #[must_use]
    pub const fn total(&self) -> usize {
        self.servers
            + self.volumes
            + self.floating_ips
            + self.routers
            + self.networks
            + self.security_groups
    }
}

impl<P: Provider> Automation<P> {
    /// Deletes resources whose name starts with `prefix`, plus every
    /// floating IP without a fixed address.
    ///
    /// Deletion runs in dependency order: servers, volumes, floating IPs,
    /// routers (interfaces first), networks, security groups. Server
    /// deletion is requested but not awaited.
    ///
    /// # Errors
    ///
    /// Returns the first [`ProviderError`]; resources deleted before the
    /// failure stay deleted.
    pub async fn cleanup_resources(&self, prefix: &str) -> Result<CleanupSummary, ProviderError> {
        let mut summary = CleanupSummary::default();

        for server in self.provider.list_servers().await? {
            if server.name.starts_with(prefix) {
                self.provider.delete_server(&server.id).await?;
                info!(server = %server.name, "deleted server");
                summary.servers += 1;
            }
        }

        for volume in self.provider.list_volumes().await? {
            if volume.name.as_deref().is_some_and(|name| name.starts_with(prefix)) {
                self.provider.delete_volume(&volume.id).await?;
                info!(volume = volume.name.as_deref().unwrap_or_default(), "deleted volume");
                summary.volumes += 1;
            }
        }

        for floating_ip in self.provider.list_floating_ips().await? {
            if floating_ip.fixed_ip_address.is_none() {
                self.provider.delete_floating_ip(&floating_ip.id).await?;
                info!(floating_ip = %floating_ip.floating_ip_address, "deleted floating IP");
                summary.floating_ips += 1;
            }
        }

        for router in self.provider.list_routers().await? {
            if !router.name.starts_with(prefix) {
                continue;
            }
            for port in self.provider.list_ports(&router.id).await? {
                if port.device_owner == ROUTER_INTERFACE_OWNER {
                    self.provider
                        .remove_router_interface(&router.id, &port.id)
                        .await?;
                }
            }
            self.provider.delete_router(&router.id).await?;
            info!(router = %router.name, "deleted router");
            summary.routers += 1;
        }

        for network in self.provider.list_networks().await? {
            if network.name.starts_with(prefix) {
                self.provider.delete_network(&network.id).await?;
                info!(network = %network.name, "deleted network");
                summary.networks += 1;
            }
        }

        for group in self.provider.list_security_groups().await? {
            if group.name.starts_with(prefix) {
                self.provider.delete_security_group(&group.id).await?;
                info!(security_group = %group.name, "deleted security group");
                summary.security_groups += 1;
            }
        }

        info!(prefix, total = summary.total(), "cleanup finished");
        Ok(summary)
    }
}
