//! Instance launch.

use tracing::{info, warn};

use crate::boot_script::collector_user_data;
use crate::instance::{InstanceSpec, NetworkRef};
use crate::provider::{
    Provider, ProviderError, ResourceKind, Server, ServerCreate, ServerNetwork, ServerStatus,
};

use super::Automation;

impl<P: Provider> Automation<P> {
    /// Launches a server from `spec` and waits until it is `ACTIVE`.
    ///
    /// Network names that do not resolve and a missing security group are
    /// skipped with a warning. When the spec carries no boot script, has
    /// telemetry enabled and a license key is configured, the telemetry
    /// collector script is injected.
    ///
    /// # Errors
    ///
    /// Returns [`ProviderError::NotFound`] for a missing image or flavor,
    /// or any error raised while creating or waiting on the server.
    pub async fn launch_instance(&self, spec: &InstanceSpec) -> Result<Server, ProviderError> {
        let image = self
            .provider
            .find_image(&spec.image)
            .await?
            .ok_or_else(|| ProviderError::not_found(ResourceKind::Image, &spec.image))?;
        let flavor = self
            .provider
            .find_flavor(&spec.flavor)
            .await?
            .ok_or_else(|| ProviderError::not_found(ResourceKind::Flavor, &spec.flavor))?;
        let networks = self.resolve_networks(&spec.name, &spec.networks).await?;
        let security_groups = self
            .resolve_security_group(&spec.name, spec.security_group.as_deref())
            .await?;

        let request = ServerCreate {
            name: spec.name.clone(),
            image_id: image.id,
            flavor_id: flavor.id,
            networks,
            security_groups,
            key_name: spec.key_name.clone(),
            user_data: self.boot_script_for(spec),
        };
        let created = self.provider.create_server(&request).await?;
        info!(server_id = %created.id, name = %created.name, "created server");

        let server = self
            .wait_for_server_status(&created.id, &ServerStatus::Active)
            .await?;
        info!(server_id = %server.id, name = %server.name, "server is active");
        Ok(server)
    }

    async fn resolve_networks(
        &self,
        server_name: &str,
        networks: &[NetworkRef],
    ) -> Result<Vec<ServerNetwork>, ProviderError> {
        let mut resolved = Vec::with_capacity(networks.len());
        for network in networks {
            match network {
                NetworkRef::Id(id) => resolved.push(ServerNetwork {
                    network_id: id.clone(),
                }),
                NetworkRef::Name(name) => match self.provider.find_network(name).await? {
                    Some(found) => resolved.push(ServerNetwork {
                        network_id: found.id,
                    }),
                    None => warn!(server = server_name, network = %name, "network not found, skipping"),
                },
            }
        }
        Ok(resolved)
    }

    async fn resolve_security_group(
        &self,
        server_name: &str,
        group: Option<&str>,
    ) -> Result<Vec<String>, ProviderError> {
        let Some(name) = group else {
            return Ok(Vec::new());
        };
        match self.provider.find_security_group(name).await? {
            Some(group) => Ok(vec![group.name]),
            None => {
                warn!(server = server_name, security_group = name, "security group not found, skipping");
                Ok(Vec::new())
            }
        }
    }

    fn boot_script_for(&self, spec: &InstanceSpec) -> Option<String> {
        if spec.user_data.is_some() {
            return spec.user_data.clone();
        }
        if !spec.telemetry {
            return None;
        }
        self.telemetry
            .license_key()
            .map(|key| collector_user_data(&spec.name, key, &self.telemetry))
    }
}
