//! Orchestrator builders over the in-memory cloud.

use stackfleet::test_support::{InMemoryCloud, shared_cloud};
use stackfleet::{Automation, BatchConfig, BatchOperations, TelemetryConfig, WaitPolicy};

/// Default tuning with the given pool width and window size.
pub fn batch_config(max_workers: usize, window_size: usize) -> BatchConfig {
    BatchConfig {
        max_workers,
        window_size,
        ..BatchConfig::defaults()
    }
}

/// Builds an orchestrator with `telemetry`, returning the cloud handle for
/// seeding and assertions.
pub fn fleet_with(
    config: BatchConfig,
    telemetry: TelemetryConfig,
) -> (InMemoryCloud, BatchOperations<InMemoryCloud>) {
    let (cloud, provider) = shared_cloud();
    let automation = Automation::new(provider, WaitPolicy::from_batch(&config), telemetry);
    (cloud, BatchOperations::new(automation, config))
}

/// Builds an orchestrator without a telemetry license key.
pub fn fleet(config: BatchConfig) -> (InMemoryCloud, BatchOperations<InMemoryCloud>) {
    fleet_with(config, TelemetryConfig::defaults())
}

/// Seeds `count` active servers named `<prefix>1` to `<prefix><count>`.
pub fn seed_servers(cloud: &InMemoryCloud, prefix: &str, count: usize, flavor: &str) -> Vec<String> {
    (1..=count)
        .map(|index| {
            let name = format!("{prefix}{index}");
            cloud
                .seed_server(&name, flavor)
                .unwrap_or_else(|err| panic!("seed {name}: {err}"));
            name
        })
        .collect()
}
