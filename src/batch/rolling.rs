use tokio::time::sleep;
use tracing::{error, info, warn};

use crate::instance::InstanceSpec;
use crate::provider::{Provider, ProviderError, ResourceKind, Server};

use super::report::{RollingReport, RolloutPhase, RolloutWindow, ServerRollout, UnitError};
use super::{BatchOperations, unix_seconds};

impl<P: Provider + 'static> BatchOperations<P> {
    /// Replaces every server whose name starts with `prefix` by a new server
    /// booted from `image`, in windows of `window_size` servers separated by
    /// the window delay.
    ///
    /// The server list is read once before the first window; servers created
    /// or renamed while the update runs are not picked up. Each server is
    /// snapshotted as `<name>-pre-update-<unix seconds>`, deleted and
    /// recreated under the same name with its old flavor and networks. A
    /// failure stops only that server at its last completed phase.
    ///
    /// # Errors
    ///
    /// Returns the listing error when the initial server list cannot be read.
    pub async fn rolling_update(
        &self,
        prefix: &str,
        image: &str,
    ) -> Result<RollingReport, ProviderError> {
        let servers: Vec<Server> = self
            .automation
            .provider()
            .list_servers()
            .await?
            .into_iter()
            .filter(|server| server.name.starts_with(prefix))
            .collect();

        let mut report = RollingReport {
            prefix: prefix.to_owned(),
            image: image.to_owned(),
            windows: Vec::new(),
        };
        if servers.is_empty() {
            warn!(prefix, "no servers found with prefix");
            return Ok(report);
        }

        let window_size = self.config.window_size.max(1);
        let window_count = servers.len().div_ceil(window_size);
        for (index, window) in servers.chunks(window_size).enumerate() {
            let names: Vec<&str> = window.iter().map(|server| server.name.as_str()).collect();
            info!(window = index, servers = ?names, "processing window");

            let mut rollouts = Vec::with_capacity(window.len());
            for server in window {
                rollouts.push(self.replace_server(server, image).await);
            }
            report.windows.push(RolloutWindow {
                index,
                servers: rollouts,
            });

            if index + 1 < window_count {
                let delay = self.config.window_delay();
                info!(delay_secs = delay.as_secs(), "waiting before next window");
                sleep(delay).await;
            }
        }

        info!(
            prefix,
            replaced = report.replaced(),
            windows = report.windows.len(),
            "rolling update finished"
        );
        Ok(report)
    }

    async fn replace_server(&self, server: &Server, image: &str) -> ServerRollout {
        let mut rollout = ServerRollout {
            name: server.name.clone(),
            phase: RolloutPhase::Idle,
            snapshot_name: None,
            new_server_id: None,
            error: None,
        };
        if let Err(err) = self.advance(server, image, &mut rollout).await {
            error!(server = %server.name, phase = ?rollout.phase, error = %err, "failed to update");
            rollout.error = Some(UnitError::from(err));
        }
        rollout
    }

    async fn advance(
        &self,
        server: &Server,
        image: &str,
        rollout: &mut ServerRollout,
    ) -> Result<(), ProviderError> {
        let provider = self.automation.provider();
        let flavor = server
            .flavor
            .lookup_key()
            .ok_or_else(|| ProviderError::not_found(ResourceKind::Flavor, &server.name))?
            .to_owned();

        let snapshot_name = format!("{}-pre-update-{}", server.name, unix_seconds());
        provider
            .create_server_image(&server.id, &snapshot_name)
            .await?;
        info!(snapshot = %snapshot_name, "created pre-update snapshot");
        rollout.snapshot_name = Some(snapshot_name);
        rollout.phase = RolloutPhase::SnapshotTaken;

        let mut network_ids: Vec<String> = Vec::new();
        for port in provider.list_ports(&server.id).await? {
            if !network_ids.contains(&port.network_id) {
                network_ids.push(port.network_id);
            }
        }

        provider.delete_server(&server.id).await?;
        self.automation.wait_for_server_delete(&server.id).await?;
        info!(server = %server.name, "deleted old instance");
        rollout.phase = RolloutPhase::OldDeleted;

        let spec = network_ids
            .into_iter()
            .fold(
                InstanceSpec::builder(server.name.clone())
                    .image(image)
                    .flavor(flavor),
                |builder, network_id| builder.network_id(network_id),
            )
            .build()
            .map_err(|err| ProviderError::Validation {
                message: err.to_string(),
            })?;
        let replacement = self.automation.launch_instance(&spec).await?;
        info!(server = %replacement.name, server_id = %replacement.id, "created new instance");
        rollout.new_server_id = Some(replacement.id);
        rollout.phase = RolloutPhase::NewCreated;
        Ok(())
    }
}
