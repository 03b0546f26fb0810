//! Aggregate outcomes returned by batch operations.
//!
//! Every report partitions its inputs into buckets; a unit that fails never
//! disappears from the report, it moves to a failure bucket with its typed
//! error.

use serde::Serialize;
use thiserror::Error;

use crate::provider::{ProviderError, Server};

use super::pool::TaskError;

/// Why a single unit of a batch failed.
#[derive(Clone, Debug, Error, Eq, PartialEq, Serialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum UnitError {
    /// The provider rejected a call or a wait failed.
    #[error(transparent)]
    Provider(#[from] ProviderError),
    /// The worker running the unit panicked or was cancelled.
    #[error("{0}")]
    Aborted(String),
}

impl From<TaskError> for UnitError {
    fn from(err: TaskError) -> Self {
        Self::Aborted(err.to_string())
    }
}

/// A named input that ended in a failure bucket.
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct UnitFailure {
    /// Instance or server name.
    pub name: String,
    /// Failure cause.
    pub error: UnitError,
}

impl UnitFailure {
    pub(crate) fn new(name: impl Into<String>, error: impl Into<UnitError>) -> Self {
        Self {
            name: name.into(),
            error: error.into(),
        }
    }
}

/// Outcome of a batch launch. `launched` is in completion order.
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize)]
pub struct LaunchReport {
    /// Servers that reached `ACTIVE`.
    pub launched: Vec<Server>,
    /// Specs that failed, with the cause.
    pub failed: Vec<UnitFailure>,
}

/// One snapshot created by a batch snapshot.
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct SnapshotRecord {
    /// Source server name.
    pub server: String,
    /// Name given to the image.
    pub snapshot_name: String,
    /// Identifier of the created image.
    pub image_id: String,
}

/// Outcome of a batch snapshot. Names that do not resolve to a server appear
/// in neither bucket.
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize)]
pub struct SnapshotReport {
    /// Snapshots created, in completion order.
    pub snapshots: Vec<SnapshotRecord>,
    /// Servers whose snapshot failed.
    pub failed: Vec<UnitFailure>,
}

/// Outcome of a serial resize.
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize)]
pub struct ResizeReport {
    /// Target flavor name.
    pub flavor: String,
    /// Servers resized and confirmed, in input order.
    pub resized: Vec<String>,
    /// Servers that could not be resized, in input order.
    pub failed: Vec<UnitFailure>,
}

/// Replacement progress of one server in a rolling update.
///
/// Phases only advance: a failure leaves the server at the last phase it
/// completed.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RolloutPhase {
    /// Nothing done yet.
    Idle,
    /// Pre-update snapshot requested.
    SnapshotTaken,
    /// Old instance deleted.
    OldDeleted,
    /// Replacement instance active.
    NewCreated,
}

/// Final state of one server in a rolling update.
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct ServerRollout {
    /// Server name, reused for the replacement.
    pub name: String,
    /// Last phase completed.
    pub phase: RolloutPhase,
    /// Pre-update snapshot name, once requested.
    pub snapshot_name: Option<String>,
    /// Identifier of the replacement, once created.
    pub new_server_id: Option<String>,
    /// Failure that stopped the server short of
    /// [`RolloutPhase::NewCreated`].
    pub error: Option<UnitError>,
}

/// Servers processed together before the inter-window delay.
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct RolloutWindow {
    /// Zero-based window index.
    pub index: usize,
    /// Servers in processing order.
    pub servers: Vec<ServerRollout>,
}

/// Outcome of a rolling update.
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize)]
pub struct RollingReport {
    /// Prefix used to match servers.
    pub prefix: String,
    /// Image the replacements boot from.
    pub image: String,
    /// Windows in processing order; empty when nothing matched.
    pub windows: Vec<RolloutWindow>,
}

impl RollingReport {
    /// Iterates over every server across windows.
    pub fn servers(&self) -> impl Iterator<Item = &ServerRollout> {
        self.windows.iter().flat_map(|window| window.servers.iter())
    }

    /// Number of servers fully replaced.
    #[must_use]
    pub fn replaced(&self) -> usize {
        self.servers()
            .filter(|server| server.phase == RolloutPhase::NewCreated)
            .count()
    }
}

/// Health bucket of one server.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthStatus {
    /// Active with at least one address.
    Healthy,
    /// Resolved but not active, or without an address.
    Unhealthy,
    /// Missing, or the check itself failed.
    Unknown,
}

/// Outcome of a health check. Each bucket keeps input order.
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize)]
pub struct HealthReport {
    /// Active servers with an address.
    pub healthy: Vec<String>,
    /// Servers failing a check.
    pub unhealthy: Vec<String>,
    /// Servers that could not be classified.
    pub unknown: Vec<String>,
}

impl HealthReport {
    pub(crate) fn push(&mut self, name: String, status: HealthStatus) {
        match status {
            HealthStatus::Healthy => self.healthy.push(name),
            HealthStatus::Unhealthy => self.unhealthy.push(name),
            HealthStatus::Unknown => self.unknown.push(name),
        }
    }

    /// Number of classified names across every bucket.
    #[must_use]
    pub fn total(&self) -> usize {
        self.healthy.len() + self.unhealthy.len() + self.unknown.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::ResourceKind;

    #[test]
    fn unit_error_serialises_with_kind_tag() {
        let failure = UnitFailure::new(
            "web-1",
            ProviderError::not_found(ResourceKind::Flavor, "m1.huge"),
        );
        let json = serde_json::to_value(&failure).expect("serialise failure");
        assert_eq!(json["name"], "web-1");
        assert_eq!(json["error"]["kind"], "provider");
        assert_eq!(json["error"]["detail"]["error"], "not_found");
        assert_eq!(json["error"]["detail"]["kind"], "flavor");
    }

    #[test]
    fn aborted_unit_keeps_panic_text() {
        let err = UnitError::from(TaskError::Panicked(String::from("boom")));
        assert_eq!(err.to_string(), "worker panicked: boom");
    }

    #[test]
    fn phases_are_ordered() {
        assert!(RolloutPhase::Idle < RolloutPhase::SnapshotTaken);
        assert!(RolloutPhase::OldDeleted < RolloutPhase::NewCreated);
    }
}
