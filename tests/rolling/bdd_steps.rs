//! BDD step definitions for rolling updates.

use std::sync::Arc;

use rstest_bdd_macros::{given, then, when};
use stackfleet::test_support::CallRecord;
use stackfleet::{
    Automation, BatchConfig, BatchOperations, ProviderError, TelemetryConfig, WaitPolicy,
};
use tokio::runtime::Builder;
use tokio::time::Instant;

use super::test_helpers::{RollingContext, RollingOutcome};

#[derive(Debug, thiserror::Error)]
pub enum StepError {
    #[error("assertion failed: {0}")]
    Assertion(String),
}

#[given("\"{count}\" servers named with prefix \"{prefix}\"")]
fn seeded_servers(rolling_context: RollingContext, count: usize, prefix: String) -> RollingContext {
    seed_fleet(rolling_context, count, &prefix, "m1.small")
}

#[given("\"{count}\" servers of flavor \"{flavor}\" named with prefix \"{prefix}\"")]
fn seeded_servers_of_flavor(
    rolling_context: RollingContext,
    count: usize,
    flavor: String,
    prefix: String,
) -> RollingContext {
    seed_fleet(rolling_context, count, &prefix, flavor.trim())
}

fn seed_fleet(
    mut rolling_context: RollingContext,
    count: usize,
    prefix: &str,
    flavor: &str,
) -> RollingContext {
    for index in 1..=count {
        let name = format!("{}{index}", prefix.trim());
        let server = rolling_context
            .cloud
            .seed_server(&name, flavor)
            .unwrap_or_else(|err| panic!("seed {name}: {err}"));
        rolling_context.original_ids.insert(name, server.id);
    }
    rolling_context
}

#[given("a window size of \"{size}\"")]
fn window_size(mut rolling_context: RollingContext, size: usize) -> RollingContext {
    rolling_context.config = BatchConfig {
        window_size: size,
        ..rolling_context.config
    };
    rolling_context
}

#[given("snapshots of \"{name}\" fail")]
fn failing_snapshot(rolling_context: RollingContext, name: String) -> RollingContext {
    rolling_context.cloud.fail_snapshot(name.trim());
    rolling_context
}

#[given("deletes of \"{name}\" never finish")]
fn stalled_delete(rolling_context: RollingContext, name: String) -> RollingContext {
    rolling_context.cloud.stall_delete(name.trim());
    rolling_context
}

#[given("launches of \"{name}\" fail")]
fn failing_launch(rolling_context: RollingContext, name: String) -> RollingContext {
    rolling_context.cloud.fail_create(
        name.trim(),
        ProviderError::Backend {
            status: Some(500),
            message: String::from("no valid host was found"),
        },
    );
    rolling_context
}

#[given("server \"{name}\" appears after the listing")]
fn late_server(rolling_context: RollingContext, name: String) -> RollingContext {
    rolling_context
        .cloud
        .seed_after_listing(name.trim(), "m1.small");
    rolling_context
}

#[when("a rolling update to \"{image}\" runs for prefix \"{prefix}\"")]
fn run_update(
    rolling_context: RollingContext,
    image: String,
    prefix: String,
) -> Result<RollingContext, StepError> {
    let runtime = Builder::new_current_thread()
        .enable_time()
        .start_paused(true)
        .build()
        .map_err(|err| StepError::Assertion(err.to_string()))?;
    let automation = Automation::new(
        Arc::new(rolling_context.cloud.clone()),
        WaitPolicy::from_batch(&rolling_context.config),
        TelemetryConfig::defaults(),
    );
    let ops = BatchOperations::new(automation, rolling_context.config.clone());

    let outcome = runtime.block_on(async move {
        let started = Instant::now();
        let report = ops.rolling_update(prefix.trim(), image.trim()).await;
        RollingOutcome {
            report,
            elapsed: started.elapsed(),
        }
    });

    Ok(RollingContext {
        outcome: Some(outcome),
        ..rolling_context
    })
}

#[then("the windows hold \"{sizes}\" servers")]
fn window_sizes(rolling_context: &RollingContext, sizes: String) -> Result<(), StepError> {
    let expected: Vec<usize> = sizes
        .split(',')
        .map(|size| {
            size.trim()
                .parse()
                .unwrap_or_else(|err| panic!("window size {size}: {err}"))
        })
        .collect();
    let actual: Vec<usize> = rolling_context
        .report()
        .windows
        .iter()
        .map(|window| window.servers.len())
        .collect();
    if actual == expected {
        Ok(())
    } else {
        Err(StepError::Assertion(format!(
            "expected window sizes {expected:?}, got {actual:?}"
        )))
    }
}

#[then("every server reached phase \"{phase}\"")]
fn every_phase(rolling_context: &RollingContext, phase: String) -> Result<(), StepError> {
    let lagging: Vec<&str> = rolling_context
        .report()
        .servers()
        .filter(|server| !phase_matches(server.phase, &phase))
        .map(|server| server.name.as_str())
        .collect();
    if lagging.is_empty() {
        Ok(())
    } else {
        Err(StepError::Assertion(format!(
            "servers not at {phase}: {lagging:?}"
        )))
    }
}

#[then("the update took \"{seconds}\" seconds")]
fn elapsed_seconds(rolling_context: &RollingContext, seconds: u64) -> Result<(), StepError> {
    let Some(outcome) = &rolling_context.outcome else {
        return Err(StepError::Assertion(String::from("missing outcome")));
    };
    if outcome.elapsed.as_secs() == seconds {
        Ok(())
    } else {
        Err(StepError::Assertion(format!(
            "expected {seconds}s, took {:?}",
            outcome.elapsed
        )))
    }
}

#[then("\"{count}\" servers were replaced")]
fn replaced_count(rolling_context: &RollingContext, count: usize) -> Result<(), StepError> {
    let replaced = rolling_context.report().replaced();
    if replaced == count {
        Ok(())
    } else {
        Err(StepError::Assertion(format!(
            "expected {count} replacements, got {replaced}"
        )))
    }
}

#[then("server \"{name}\" stayed in phase \"{phase}\"")]
fn server_phase(rolling_context: &RollingContext, name: String, phase: String) -> Result<(), StepError> {
    let Some(rollout) = rolling_context
        .report()
        .servers()
        .find(|server| server.name == name.trim())
    else {
        return Err(StepError::Assertion(format!("{name} missing from report")));
    };
    if !phase_matches(rollout.phase, &phase) {
        return Err(StepError::Assertion(format!(
            "{name} is at {:?}, expected {phase}",
            rollout.phase
        )));
    }
    if rollout.error.is_none() {
        return Err(StepError::Assertion(format!("{name} should carry its error")));
    }
    Ok(())
}

#[then("server \"{name}\" still runs its original instance")]
fn original_instance(rolling_context: &RollingContext, name: String) -> Result<(), StepError> {
    let current = rolling_context.cloud.server(name.trim()).map(|server| server.id);
    let original = rolling_context.original_ids.get(name.trim()).cloned();
    if current.is_some() && current == original {
        Ok(())
    } else {
        Err(StepError::Assertion(format!(
            "{name} was replaced: {original:?} -> {current:?}"
        )))
    }
}

#[then("server \"{name}\" runs flavor \"{flavor}\" from image \"{image}\" on network \"{network}\"")]
fn replacement_attributes(
    rolling_context: &RollingContext,
    name: String,
    flavor: String,
    image: String,
    network: String,
) -> Result<(), StepError> {
    let Some(server) = rolling_context.cloud.server(name.trim()) else {
        return Err(StepError::Assertion(format!("{name} does not exist")));
    };
    if rolling_context.original_ids.get(name.trim()) == Some(&server.id) {
        return Err(StepError::Assertion(format!("{name} was not replaced")));
    }
    let image_id = rolling_context
        .cloud
        .images()
        .into_iter()
        .find(|candidate| candidate.name == image.trim())
        .map(|candidate| candidate.id);
    let mut problems = Vec::new();
    if server.flavor.original_name.as_deref() != Some(flavor.trim()) {
        problems.push(format!("flavor {:?}", server.flavor.original_name));
    }
    if image_id.is_none() || server.image_id != image_id {
        problems.push(format!("image {:?}, wanted {image_id:?}", server.image_id));
    }
    let networks: Vec<&str> = server.addresses.keys().map(String::as_str).collect();
    if networks != [network.trim()] {
        problems.push(format!("networks {networks:?}"));
    }
    if problems.is_empty() {
        Ok(())
    } else {
        Err(StepError::Assertion(format!(
            "{name} replacement differs: {}",
            problems.join(", ")
        )))
    }
}

#[then("server \"{name}\" no longer exists")]
fn server_gone(rolling_context: &RollingContext, name: String) -> Result<(), StepError> {
    match rolling_context.cloud.server(name.trim()) {
        None => Ok(()),
        Some(server) => Err(StepError::Assertion(format!(
            "{name} still exists as {}",
            server.id
        ))),
    }
}

#[then("server \"{name}\" was left out of the update")]
fn left_out(rolling_context: &RollingContext, name: String) -> Result<(), StepError> {
    let Some(server) = rolling_context.cloud.server(name.trim()) else {
        return Err(StepError::Assertion(format!("{name} does not exist")));
    };
    if rolling_context
        .report()
        .servers()
        .any(|rollout| rollout.name == name.trim())
    {
        return Err(StepError::Assertion(format!("{name} appears in the report")));
    }
    let snapshot_prefix = format!("{}-pre-update-", name.trim());
    let touched: Vec<CallRecord> = rolling_context
        .cloud
        .calls()
        .into_iter()
        .filter(|call| match call.operation {
            "delete_server" => call.target == server.id,
            "create_server_image" => call.target.starts_with(&snapshot_prefix),
            _ => false,
        })
        .collect();
    if touched.is_empty() {
        Ok(())
    } else {
        Err(StepError::Assertion(format!("{name} was touched: {touched:?}")))
    }
}

#[then("no windows were processed")]
fn no_windows(rolling_context: &RollingContext) -> Result<(), StepError> {
    let windows = rolling_context.report().windows.len();
    if windows == 0 {
        Ok(())
    } else {
        Err(StepError::Assertion(format!("processed {windows} windows")))
    }
}

#[then("no servers were deleted")]
fn nothing_deleted(rolling_context: &RollingContext) -> Result<(), StepError> {
    let deletes = rolling_context.cloud.calls_to("delete_server");
    if deletes.is_empty() {
        Ok(())
    } else {
        Err(StepError::Assertion(format!("unexpected deletes: {deletes:?}")))
    }
}

fn phase_matches(phase: stackfleet::RolloutPhase, expected: &str) -> bool {
    serde_json::to_value(phase)
        .ok()
        .and_then(|value| value.as_str().map(|name| name == expected.trim()))
        .unwrap_or(false)
}
