//! Shared fixtures for rolling update scenarios.

use std::collections::BTreeMap;
use std::time::Duration;

use rstest::fixture;
use stackfleet::test_support::InMemoryCloud;
use stackfleet::{BatchConfig, ProviderError, RollingReport};

#[derive(Clone, Debug)]
pub struct RollingOutcome {
    pub report: Result<RollingReport, ProviderError>,
    pub elapsed: Duration,
}

#[derive(Clone, Debug)]
pub struct RollingContext {
    pub cloud: InMemoryCloud,
    pub config: BatchConfig,
    /// Server identifiers captured before the update, by name.
    pub original_ids: BTreeMap<String, String>,
    pub outcome: Option<RollingOutcome>,
}

#[fixture]
pub fn rolling_context() -> RollingContext {
    RollingContext {
        cloud: InMemoryCloud::new(),
        config: BatchConfig::defaults(),
        original_ids: BTreeMap::new(),
        outcome: None,
    }
}

impl RollingContext {
    pub fn report(&self) -> &RollingReport {
        match self.outcome.as_ref().map(|outcome| &outcome.report) {
            Some(Ok(report)) => report,
            Some(Err(err)) => panic!("rolling update failed: {err}"),
            None => panic!("rolling update has not run"),
        }
    }
}
