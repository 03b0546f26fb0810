//! Single-target cloud operations built on a [`Provider`].
//!
//! Every operation here fails fast: the first provider error is returned to
//! the caller. Batch flows in [`crate::batch`] wrap these operations and
//! absorb failures per unit instead.

mod cleanup;
mod compute;
mod network;
mod volume;
mod wait;

use std::sync::Arc;
use std::time::Duration;

use crate::config::{BatchConfig, TelemetryConfig};
use crate::provider::Provider;

pub use cleanup::{CleanupSummary, DEFAULT_CLEANUP_PREFIX};
pub use network::{
    DEFAULT_NETWORK_NAME, DEFAULT_SECURITY_GROUP_NAME, DEFAULT_SUBNET_CIDR, NetworkInfrastructure,
    SecurityGroupSetup,
};
pub use volume::DEFAULT_VOLUME_SIZE_GIB;

/// Deadline and cadence for status polling.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct WaitPolicy {
    /// Longest time a general wait may take.
    pub timeout: Duration,
    /// Delay between polls.
    pub poll_interval: Duration,
}

impl WaitPolicy {
    /// Builds a policy from explicit values.
    #[must_use]
    pub const fn new(timeout: Duration, poll_interval: Duration) -> Self {
        Self {
            timeout,
            poll_interval,
        }
    }

    /// Uses the general wait timeout and poll interval of `config`.
    #[must_use]
    pub const fn from_batch(config: &BatchConfig) -> Self {
        Self::new(config.wait_timeout(), config.poll_interval())
    }
}

/// Cloud automation bound to one provider.
///
/// Cloning is cheap: the provider is shared behind an [`Arc`].
#[derive(Debug)]
pub struct Automation<P> {
    provider: Arc<P>,
    wait: WaitPolicy,
    telemetry: TelemetryConfig,
}

impl<P> Clone for Automation<P> {
    fn clone(&self) -> Self {
        Self {
            provider: Arc::clone(&self.provider),
            wait: self.wait,
            telemetry: self.telemetry.clone(),
        }
    }
}

impl<P: Provider> Automation<P> {
    /// Wraps `provider` with the given wait policy and telemetry settings.
    #[must_use]
    pub const fn new(provider: Arc<P>, wait: WaitPolicy, telemetry: TelemetryConfig) -> Self {
        Self {
            provider,
            wait,
            telemetry,
        }
    }

    /// Returns the underlying provider.
    #[must_use]
    pub fn provider(&self) -> &P {
        &self.provider
    }

    /// Returns the active wait policy.
    #[must_use]
    pub const fn wait_policy(&self) -> WaitPolicy {
        self.wait
    }

    /// Returns the telemetry settings used for boot script injection.
    #[must_use]
    pub const fn telemetry(&self) -> &TelemetryConfig {
        &self.telemetry
    }
}
