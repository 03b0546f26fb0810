//! Two-phase resize behaviour.

#[path = "common/fleet.rs"]
mod fleet;
#[path = "common/test_constants.rs"]
mod test_constants;

use std::time::Duration;

use stackfleet::BatchConfig;
use stackfleet::UnitError;
use stackfleet::provider::{ProviderError, ResourceKind, ServerStatus};
use tokio::time::Instant;

use fleet::{batch_config, fleet, seed_servers};
use test_constants::{LARGE_FLAVOR, SMALL_FLAVOR};

#[tokio::test]
async fn resizes_and_confirms_each_server_in_order() {
    let (cloud, ops) = fleet(batch_config(5, 2));
    let names = seed_servers(&cloud, "web-", 3, SMALL_FLAVOR);

    let report = ops.resize(&names, LARGE_FLAVOR).await.expect("flavor exists");

    assert_eq!(report.flavor, LARGE_FLAVOR);
    assert_eq!(report.resized, names);
    assert!(report.failed.is_empty());
    for name in &names {
        let server = cloud.server(name).expect("server still exists");
        assert_eq!(server.status, ServerStatus::Active);
        assert_eq!(server.flavor.original_name.as_deref(), Some(LARGE_FLAVOR));
    }

    let sequence: Vec<&'static str> = cloud
        .calls()
        .into_iter()
        .map(|call| call.operation)
        .filter(|operation| matches!(*operation, "resize_server" | "confirm_resize"))
        .collect();
    assert_eq!(
        sequence,
        [
            "resize_server",
            "confirm_resize",
            "resize_server",
            "confirm_resize",
            "resize_server",
            "confirm_resize",
        ]
    );
}

#[tokio::test]
async fn missing_flavor_fails_before_touching_servers() {
    let (cloud, ops) = fleet(batch_config(5, 2));
    let names = seed_servers(&cloud, "web-", 2, SMALL_FLAVOR);

    let err = ops
        .resize(&names, "m1.huge")
        .await
        .expect_err("unknown flavor must fail");

    assert_eq!(err, ProviderError::not_found(ResourceKind::Flavor, "m1.huge"));
    assert!(cloud.calls_to("find_server").is_empty());
    assert!(cloud.calls_to("resize_server").is_empty());
}

#[tokio::test(start_paused = true)]
async fn stalled_resize_times_out_without_stopping_the_batch() {
    let config = BatchConfig {
        resize_timeout_secs: 10,
        poll_interval_secs: 2,
        ..batch_config(5, 2)
    };
    let (cloud, ops) = fleet(config);
    let names = seed_servers(&cloud, "web-", 2, SMALL_FLAVOR);
    cloud.stall_resize("web-1");

    let started = Instant::now();
    let report = ops.resize(&names, LARGE_FLAVOR).await.expect("flavor exists");

    assert!(started.elapsed() >= Duration::from_secs(10));
    assert_eq!(report.resized, ["web-2"]);
    let [failure] = report.failed.as_slice() else {
        panic!("expected one failure, got {:?}", report.failed);
    };
    assert_eq!(failure.name, "web-1");
    assert!(matches!(
        failure.error,
        UnitError::Provider(ProviderError::Timeout { .. })
    ));
    assert_eq!(
        cloud.server("web-1").map(|server| server.status),
        Some(ServerStatus::Resize)
    );
}

#[tokio::test]
async fn unresolved_and_inactive_servers_fail_individually() {
    let (cloud, ops) = fleet(batch_config(5, 2));
    seed_servers(&cloud, "web-", 1, SMALL_FLAVOR);
    cloud
        .seed_server_with_status("web-off", SMALL_FLAVOR, ServerStatus::Shutoff)
        .expect("seed stopped server");
    let names = vec![
        String::from("ghost"),
        String::from("web-off"),
        String::from("web-1"),
    ];

    let report = ops.resize(&names, LARGE_FLAVOR).await.expect("flavor exists");

    assert_eq!(report.resized, ["web-1"]);
    let failed: Vec<(&str, &UnitError)> = report
        .failed
        .iter()
        .map(|failure| (failure.name.as_str(), &failure.error))
        .collect();
    assert!(matches!(
        failed.as_slice(),
        [
            ("ghost", UnitError::Provider(ProviderError::NotFound { .. })),
            (
                "web-off",
                UnitError::Provider(ProviderError::Backend {
                    status: Some(409),
                    ..
                })
            ),
        ]
    ));
}
