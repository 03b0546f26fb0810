use tracing::{debug, error, info};

use crate::automation::Automation;
use crate::provider::{Provider, ProviderError};

use super::report::{SnapshotRecord, SnapshotReport, UnitFailure};
use super::{BatchOperations, WorkerPool, unix_seconds};

impl<P: Provider + 'static> BatchOperations<P> {
    /// Snapshots each named server concurrently as
    /// `<name>-snapshot-<unix seconds>`.
    ///
    /// Names that do not resolve to a server are skipped without a report
    /// entry. Lookup and image creation failures land in
    /// [`SnapshotReport::failed`].
    pub async fn snapshot(&self, server_names: &[String]) -> SnapshotReport {
        let mut pool = WorkerPool::new(self.config.max_workers);
        for name in server_names {
            let automation = self.automation.clone();
            pool.spawn(name.clone(), snapshot_one(automation, name.clone()));
        }

        let mut report = SnapshotReport::default();
        while let Some((name, outcome)) = pool.join_next().await {
            match outcome {
                Ok(Ok(Some(record))) => {
                    info!(snapshot = %record.snapshot_name, image_id = %record.image_id, "created snapshot");
                    report.snapshots.push(record);
                }
                Ok(Ok(None)) => {}
                Ok(Err(err)) => {
                    error!(server = %name, error = %err, "failed to create snapshot");
                    report.failed.push(UnitFailure::new(name, err));
                }
                Err(err) => {
                    error!(server = %name, error = %err, "snapshot worker aborted");
                    report.failed.push(UnitFailure::new(name, err));
                }
            }
        }
        report
    }
}

async fn snapshot_one<P: Provider>(
    automation: Automation<P>,
    server_name: String,
) -> Result<Option<SnapshotRecord>, ProviderError> {
    let provider = automation.provider();
    let Some(server) = provider.find_server(&server_name).await? else {
        debug!(server = %server_name, "server not found, skipping snapshot");
        return Ok(None);
    };
    let snapshot_name = format!("{server_name}-snapshot-{}", unix_seconds());
    let image_id = provider
        .create_server_image(&server.id, &snapshot_name)
        .await?;
    Ok(Some(SnapshotRecord {
        server: server_name,
        snapshot_name,
        image_id,
    }))
}
