//! OpenStack REST implementation of the provider traits.
//!
//! Authenticates against Keystone v3 with password credentials, reads
//! endpoints from the service catalog, and talks to Nova, Neutron, Cinder
//! and Glance directly over `reqwest`. Tokens are fetched lazily and renewed
//! once when a service answers 401.

mod auth;
mod compute;
mod http;
mod network;
mod volume;
mod wire;

use std::sync::{Arc, LazyLock};
use std::time::Duration;

use tokio::sync::RwLock;

use crate::config::CloudConfig;
use crate::provider::ProviderError;

use auth::Session;

const HTTP_TIMEOUT: Duration = Duration::from_secs(30);

/// Compute API microversion requested on every Nova call. 2.47 embeds the
/// flavor name in server records and returns `image_id` from `createImage`.
pub const COMPUTE_MICROVERSION: &str = "2.47";

static HTTP_CLIENT: LazyLock<reqwest::Client> = LazyLock::new(|| {
    reqwest::Client::builder()
        .timeout(HTTP_TIMEOUT)
        .build()
        .unwrap_or_else(|_| reqwest::Client::new())
});

/// Services reached through the catalog.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub(crate) enum Service {
    Compute,
    Network,
    Volume,
    Image,
}

impl Service {
    const fn catalog_types(self) -> &'static [&'static str] {
        match self {
            Self::Compute => &["compute"],
            Self::Network => &["network"],
            Self::Volume => &["volumev3", "block-storage"],
            Self::Image => &["image"],
        }
    }

    const fn as_str(self) -> &'static str {
        match self {
            Self::Compute => "compute",
            Self::Network => "network",
            Self::Volume => "block-storage",
            Self::Image => "image",
        }
    }
}

/// Provider backed by an OpenStack cloud.
#[derive(Debug)]
pub struct OpenStackProvider {
    config: CloudConfig,
    session: RwLock<Option<Arc<Session>>>,
}

impl OpenStackProvider {
    /// Creates a provider that authenticates on first use.
    #[must_use]
    pub fn new(config: CloudConfig) -> Self {
        Self {
            config,
            session: RwLock::new(None),
        }
    }

    /// Creates a provider and authenticates immediately so credential and
    /// catalog problems surface before any work starts.
    ///
    /// # Errors
    ///
    /// Returns [`ProviderError::Auth`] when the identity service rejects the
    /// credentials or the catalog lacks a required service.
    pub async fn connect(config: CloudConfig) -> Result<Self, ProviderError> {
        let provider = Self::new(config);
        provider.refresh_session().await?;
        Ok(provider)
    }

    /// Returns the credentials in use.
    #[must_use]
    pub const fn config(&self) -> &CloudConfig {
        &self.config
    }

    async fn session(&self) -> Result<Arc<Session>, ProviderError> {
        if let Some(session) = self.session.read().await.as_ref() {
            return Ok(Arc::clone(session));
        }
        let mut slot = self.session.write().await;
        if let Some(session) = slot.as_ref() {
            return Ok(Arc::clone(session));
        }
        let session = Arc::new(auth::authenticate(&self.config).await?);
        *slot = Some(Arc::clone(&session));
        Ok(session)
    }

    async fn refresh_session(&self) -> Result<Arc<Session>, ProviderError> {
        let mut slot = self.session.write().await;
        let session = Arc::new(auth::authenticate(&self.config).await?);
        *slot = Some(Arc::clone(&session));
        Ok(session)
    }
}
