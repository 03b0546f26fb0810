//! Status polling helpers.
//!
//! Waits use `tokio::time` so paused-clock tests observe deadlines without
//! sleeping in real time.

use std::time::Duration;

use tokio::time::{Instant, sleep};
use tracing::debug;

use crate::provider::{
    Provider, ProviderError, ResourceKind, Server, ServerStatus, Volume, VolumeStatus,
};

use super::Automation;

impl<P: Provider> Automation<P> {
    /// Polls a server until it reports `target`, using the general wait
    /// timeout.
    ///
    /// # Errors
    ///
    /// Returns [`ProviderError::FailedStatus`] when the server enters
    /// `ERROR`, [`ProviderError::NotFound`] when it disappears and
    /// [`ProviderError::Timeout`] when the deadline passes.
    pub async fn wait_for_server_status(
        &self,
        server_id: &str,
        target: &ServerStatus,
    ) -> Result<Server, ProviderError> {
        self.wait_for_server_status_within(server_id, target, self.wait.timeout)
            .await
    }

    /// Polls a server until it reports `target` or `timeout` elapses.
    ///
    /// # Errors
    ///
    /// See [`Self::wait_for_server_status`].
    pub async fn wait_for_server_status_within(
        &self,
        server_id: &str,
        target: &ServerStatus,
        timeout: Duration,
    ) -> Result<Server, ProviderError> {
        let action = format!("status {target}");
        let deadline = Instant::now() + timeout;
        loop {
            let Some(server) = self.provider.get_server(server_id).await? else {
                return Err(ProviderError::not_found(ResourceKind::Server, server_id));
            };
            if &server.status == target {
                return Ok(server);
            }
            if server.status == ServerStatus::Error {
                return Err(ProviderError::FailedStatus {
                    action,
                    resource_id: server_id.to_owned(),
                    status: server.status.to_string(),
                });
            }
            debug!(server_id, status = %server.status, %target, "waiting for server status");
            if Instant::now() + self.wait.poll_interval > deadline {
                return Err(ProviderError::Timeout {
                    action,
                    resource_id: server_id.to_owned(),
                });
            }
            sleep(self.wait.poll_interval).await;
        }
    }

    /// Polls until the server is gone or reports `DELETED`.
    ///
    /// # Errors
    ///
    /// Returns [`ProviderError::Timeout`] when the server is still present at
    /// the deadline, or any lookup error.
    pub async fn wait_for_server_delete(&self, server_id: &str) -> Result<(), ProviderError> {
        let deadline = Instant::now() + self.wait.timeout;
        loop {
            match self.provider.get_server(server_id).await? {
                None => return Ok(()),
                Some(server) if server.status == ServerStatus::Deleted => return Ok(()),
                Some(server) => {
                    debug!(server_id, status = %server.status, "waiting for server deletion");
                }
            }
            if Instant::now() + self.wait.poll_interval > deadline {
                return Err(ProviderError::Timeout {
                    action: String::from("delete"),
                    resource_id: server_id.to_owned(),
                });
            }
            sleep(self.wait.poll_interval).await;
        }
    }

    /// Polls a volume until it reports `target`.
    ///
    /// # Errors
    ///
    /// Returns [`ProviderError::FailedStatus`] when the volume enters
    /// `error`, [`ProviderError::NotFound`] when it disappears and
    /// [`ProviderError::Timeout`] when the deadline passes.
    pub async fn wait_for_volume_status(
        &self,
        volume_id: &str,
        target: &VolumeStatus,
    ) -> Result<Volume, ProviderError> {
        let action = format!("status {target}");
        let deadline = Instant::now() + self.wait.timeout;
        loop {
            let Some(volume) = self.provider.get_volume(volume_id).await? else {
                return Err(ProviderError::not_found(ResourceKind::Volume, volume_id));
            };
            if &volume.status == target {
                return Ok(volume);
            }
            if volume.status == VolumeStatus::Error {
                return Err(ProviderError::FailedStatus {
                    action,
                    resource_id: volume_id.to_owned(),
                    status: volume.status.to_string(),
                });
            }
            if Instant::now() + self.wait.poll_interval > deadline {
                return Err(ProviderError::Timeout {
                    action,
                    resource_id: volume_id.to_owned(),
                });
            }
            sleep(self.wait.poll_interval).await;
        }
    }
}
