use tracing::{error, info};

use crate::instance::InstanceSpec;
use crate::provider::Provider;

use super::report::{LaunchReport, UnitFailure};
use super::{BatchOperations, ExecutionMode, WorkerPool};

impl<P: Provider + 'static> BatchOperations<P> {
    /// Launches every spec and reports which ones reached `ACTIVE`.
    ///
    /// Failures are logged and recorded in [`LaunchReport::failed`]; they
    /// never abort the batch. In [`ExecutionMode::Parallel`] the launched
    /// list is in completion order.
    pub async fn launch(&self, specs: Vec<InstanceSpec>, mode: ExecutionMode) -> LaunchReport {
        let total = specs.len();
        let report = match mode {
            ExecutionMode::Parallel => self.launch_parallel(specs).await,
            ExecutionMode::Serial => self.launch_serial(specs).await,
        };
        info!(
            total,
            launched = report.launched.len(),
            failed = report.failed.len(),
            ?mode,
            "batch launch finished"
        );
        report
    }

    async fn launch_parallel(&self, specs: Vec<InstanceSpec>) -> LaunchReport {
        let mut pool = WorkerPool::new(self.config.max_workers);
        for spec in specs {
            let automation = self.automation.clone();
            let name = spec.name.clone();
            pool.spawn(name, async move { automation.launch_instance(&spec).await });
        }

        let mut report = LaunchReport::default();
        while let Some((name, outcome)) = pool.join_next().await {
            match outcome {
                Ok(Ok(server)) => report.launched.push(server),
                Ok(Err(err)) => {
                    error!(instance = %name, error = %err, "failed to launch instance");
                    report.failed.push(UnitFailure::new(name, err));
                }
                Err(err) => {
                    error!(instance = %name, error = %err, "launch worker aborted");
                    report.failed.push(UnitFailure::new(name, err));
                }
            }
        }
        report
    }

    async fn launch_serial(&self, specs: Vec<InstanceSpec>) -> LaunchReport {
        let mut report = LaunchReport::default();
        for spec in specs {
            match self.automation.launch_instance(&spec).await {
                Ok(server) => report.launched.push(server),
                Err(err) => {
                    error!(instance = %spec.name, error = %err, "failed to launch instance");
                    report.failed.push(UnitFailure::new(spec.name, err));
                }
            }
        }
        report
    }
}
