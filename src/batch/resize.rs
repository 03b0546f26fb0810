use tracing::{error, info};

use crate::provider::{Flavor, Provider, ProviderError, ResourceKind, ServerStatus};

use super::BatchOperations;
use super::report::{ResizeReport, UnitFailure};

impl<P: Provider + 'static> BatchOperations<P> {
    /// Resizes servers one at a time: request the resize, wait for
    /// `VERIFY_RESIZE` within the resize timeout, then confirm.
    ///
    /// A failure at any step moves only that server to
    /// [`ResizeReport::failed`].
    ///
    /// # Errors
    ///
    /// Returns [`ProviderError::NotFound`] before touching any server when
    /// `flavor_name` does not exist, or the flavor lookup error itself.
    pub async fn resize(
        &self,
        server_names: &[String],
        flavor_name: &str,
    ) -> Result<ResizeReport, ProviderError> {
        let flavor = self
            .automation
            .provider()
            .find_flavor(flavor_name)
            .await?
            .ok_or_else(|| ProviderError::not_found(ResourceKind::Flavor, flavor_name))?;

        let mut report = ResizeReport {
            flavor: flavor.name.clone(),
            ..ResizeReport::default()
        };
        for name in server_names {
            match self.resize_one(name, &flavor).await {
                Ok(()) => {
                    info!(server = %name, flavor = %flavor.name, "resize confirmed");
                    report.resized.push(name.clone());
                }
                Err(err) => {
                    error!(server = %name, error = %err, "failed to resize");
                    report.failed.push(UnitFailure::new(name.clone(), err));
                }
            }
        }
        Ok(report)
    }

    async fn resize_one(&self, server_name: &str, flavor: &Flavor) -> Result<(), ProviderError> {
        let provider = self.automation.provider();
        let server = provider
            .find_server(server_name)
            .await?
            .ok_or_else(|| ProviderError::not_found(ResourceKind::Server, server_name))?;

        provider.resize_server(&server.id, &flavor.id).await?;
        info!(server = server_name, flavor = %flavor.name, "resizing");

        self.automation
            .wait_for_server_status_within(
                &server.id,
                &ServerStatus::VerifyResize,
                self.config.resize_timeout(),
            )
            .await?;
        provider.confirm_resize(&server.id).await
    }
}
