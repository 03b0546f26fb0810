//! Parallel snapshot behaviour.

#[path = "common/fleet.rs"]
mod fleet;
#[path = "common/test_constants.rs"]
mod test_constants;

use stackfleet::UnitError;
use stackfleet::provider::ProviderError;

use fleet::{batch_config, fleet, seed_servers};
use test_constants::SMALL_FLAVOR;

#[tokio::test]
async fn snapshots_every_resolved_server() {
    let (cloud, ops) = fleet(batch_config(2, 2));
    let names = seed_servers(&cloud, "web-", 3, SMALL_FLAVOR);

    let report = ops.snapshot(&names).await;

    assert!(report.failed.is_empty());
    assert_eq!(report.snapshots.len(), 3);
    for record in &report.snapshots {
        assert!(
            record
                .snapshot_name
                .starts_with(&format!("{}-snapshot-", record.server)),
            "unexpected name {}",
            record.snapshot_name
        );
        assert!(
            cloud
                .images()
                .iter()
                .any(|image| image.id == record.image_id && image.name == record.snapshot_name),
            "image {} was not registered",
            record.image_id
        );
    }
}

#[tokio::test]
async fn unknown_servers_are_skipped_silently() {
    let (cloud, ops) = fleet(batch_config(2, 2));
    seed_servers(&cloud, "web-", 1, SMALL_FLAVOR);
    let names = vec![String::from("web-1"), String::from("ghost")];

    let report = ops.snapshot(&names).await;

    let servers: Vec<&str> = report
        .snapshots
        .iter()
        .map(|record| record.server.as_str())
        .collect();
    assert_eq!(servers, ["web-1"]);
    assert!(report.failed.is_empty(), "ghost must not be reported");
    assert_eq!(cloud.calls_to("create_server_image").len(), 1);
}

#[tokio::test]
async fn image_and_lookup_failures_are_bucketed() {
    let (cloud, ops) = fleet(batch_config(3, 2));
    let names = seed_servers(&cloud, "web-", 3, SMALL_FLAVOR);
    cloud.fail_snapshot("web-2");
    cloud.fail_lookup("web-3");

    let report = ops.snapshot(&names).await;

    assert_eq!(report.snapshots.len(), 1);
    let mut failed: Vec<&str> = report
        .failed
        .iter()
        .map(|failure| failure.name.as_str())
        .collect();
    failed.sort_unstable();
    assert_eq!(failed, ["web-2", "web-3"]);
    assert!(report.failed.iter().all(|failure| matches!(
        failure.error,
        UnitError::Provider(ProviderError::Backend {
            status: Some(500),
            ..
        })
    )));
}
