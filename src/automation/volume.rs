//! Block storage helpers.

use tracing::info;

use crate::provider::{
    Provider, ProviderError, ResourceKind, Volume, VolumeAttachment, VolumeCreate, VolumeStatus,
};

use super::Automation;

/// Volume size used when the caller does not supply one.
pub const DEFAULT_VOLUME_SIZE_GIB: u32 = 10;

impl<P: Provider> Automation<P> {
    /// Creates a volume and waits until it is `available`.
    ///
    /// # Errors
    ///
    /// Returns [`ProviderError::FailedStatus`] if the volume enters `error`,
    /// or any provider or timeout error.
    pub async fn create_volume(&self, name: &str, size_gib: u32) -> Result<Volume, ProviderError> {
        if size_gib == 0 {
            return Err(ProviderError::Validation {
                message: String::from("volume size must be at least 1 GiB"),
            });
        }
        let created = self
            .provider
            .create_volume(&VolumeCreate {
                name: name.to_owned(),
                size_gib,
                description: format!("Volume for {name}"),
            })
            .await?;
        let volume = self
            .wait_for_volume_status(&created.id, &VolumeStatus::Available)
            .await?;
        info!(volume_id = %volume.id, name, size_gib, "created volume");
        Ok(volume)
    }

    /// Attaches the volume called `volume_name` to the server called
    /// `server_name`.
    ///
    /// # Errors
    ///
    /// Returns [`ProviderError::NotFound`] when either resource is missing.
    pub async fn attach_volume(
        &self,
        server_name: &str,
        volume_name: &str,
    ) -> Result<VolumeAttachment, ProviderError> {
        let server = self
            .provider
            .find_server(server_name)
            .await?
            .ok_or_else(|| ProviderError::not_found(ResourceKind::Server, server_name))?;
        let volume = self
            .provider
            .find_volume(volume_name)
            .await?
            .ok_or_else(|| ProviderError::not_found(ResourceKind::Volume, volume_name))?;
        let attachment = self.provider.attach_volume(&server.id, &volume.id).await?;
        info!(
            server = server_name,
            volume = volume_name,
            device = attachment.device.as_deref().unwrap_or("auto"),
            "attached volume"
        );
        Ok(attachment)
    }
}
