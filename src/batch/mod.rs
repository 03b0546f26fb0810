//! Bulk operations over many servers.
//!
//! Fan-out operations (launch, snapshot, health) run on a bounded
//! [`WorkerPool`]; resize and rolling replacement run serially because each
//! step depends on the previous one. No operation lets a single unit's
//! failure abort the batch.

mod health;
mod launch;
mod pool;
mod report;
mod resize;
mod rolling;
mod snapshot;

use std::time::{SystemTime, UNIX_EPOCH};

use crate::automation::Automation;
use crate::config::BatchConfig;
use crate::provider::Provider;

pub use health::classify;
pub use pool::{Tagged, TaskError, WorkerPool};
pub use report::{
    HealthReport, HealthStatus, LaunchReport, ResizeReport, RollingReport, RolloutPhase,
    RolloutWindow, ServerRollout, SnapshotRecord, SnapshotReport, UnitError, UnitFailure,
};

/// How a batch launch schedules its units.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum ExecutionMode {
    /// Up to `max_workers` launches at once, collected in completion order.
    #[default]
    Parallel,
    /// One launch at a time, in input order.
    Serial,
}

/// Batch orchestrator wrapping an [`Automation`] with pool and window tuning.
#[derive(Debug)]
pub struct BatchOperations<P> {
    automation: Automation<P>,
    config: BatchConfig,
}

impl<P> Clone for BatchOperations<P> {
    fn clone(&self) -> Self {
        Self {
            automation: self.automation.clone(),
            config: self.config.clone(),
        }
    }
}

impl<P: Provider + 'static> BatchOperations<P> {
    /// Creates an orchestrator using `config` for pool width, windows and
    /// resize deadlines.
    #[must_use]
    pub const fn new(automation: Automation<P>, config: BatchConfig) -> Self {
        Self { automation, config }
    }

    /// Returns the wrapped single-target automation.
    #[must_use]
    pub const fn automation(&self) -> &Automation<P> {
        &self.automation
    }

    /// Returns the active tuning.
    #[must_use]
    pub const fn config(&self) -> &BatchConfig {
        &self.config
    }
}

/// Seconds since the Unix epoch, used to stamp image names.
pub(crate) fn unix_seconds() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_secs())
        .unwrap_or_default()
}
