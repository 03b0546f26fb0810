use std::collections::BTreeMap;

use tracing::{error, info};

use crate::provider::{Provider, Server, ServerStatus};

use super::report::{HealthReport, HealthStatus};
use super::{BatchOperations, WorkerPool};

/// Classifies a lookup result without touching the backend.
///
/// A missing server is [`HealthStatus::Unknown`]; a server that is not
/// `ACTIVE` or has no address is [`HealthStatus::Unhealthy`].
#[must_use]
pub fn classify(server: Option<&Server>) -> HealthStatus {
    match server {
        None => HealthStatus::Unknown,
        Some(server) if server.status != ServerStatus::Active => HealthStatus::Unhealthy,
        Some(server) if !server.has_address() => HealthStatus::Unhealthy,
        Some(_) => HealthStatus::Healthy,
    }
}

impl<P: Provider + 'static> BatchOperations<P> {
    /// Classifies each named server concurrently. Every input name lands in
    /// exactly one bucket, and buckets keep input order.
    pub async fn health_check(&self, server_names: &[String]) -> HealthReport {
        let mut pool = WorkerPool::new(self.config.max_workers);
        for (index, name) in server_names.iter().enumerate() {
            let automation = self.automation.clone();
            let server_name = name.clone();
            pool.spawn((index, name.clone()), async move {
                automation
                    .provider()
                    .find_server(&server_name)
                    .await
                    .map(|server| classify(server.as_ref()))
            });
        }

        let mut statuses = BTreeMap::new();
        while let Some(((index, name), outcome)) = pool.join_next().await {
            let status = match outcome {
                Ok(Ok(status)) => status,
                Ok(Err(err)) => {
                    error!(server = %name, error = %err, "failed to check health");
                    HealthStatus::Unknown
                }
                Err(err) => {
                    error!(server = %name, error = %err, "health worker aborted");
                    HealthStatus::Unknown
                }
            };
            statuses.insert(index, status);
        }

        let mut report = HealthReport::default();
        for (index, name) in server_names.iter().enumerate() {
            let status = statuses
                .get(&index)
                .copied()
                .unwrap_or(HealthStatus::Unknown);
            report.push(name.clone(), status);
        }
        info!(
            healthy = report.healthy.len(),
            unhealthy = report.unhealthy.len(),
            unknown = report.unknown.len(),
            "health check finished"
        );
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::FlavorRef;
    use rstest::rstest;
    use std::net::{IpAddr, Ipv4Addr};

    fn server(status: ServerStatus, addresses: &[IpAddr]) -> Server {
        Server {
            id: String::from("srv-1"),
            name: String::from("web-1"),
            status,
            addresses: BTreeMap::from([(String::from("private"), addresses.to_vec())]),
            flavor: FlavorRef::default(),
            image_id: None,
        }
    }

    const ADDR: IpAddr = IpAddr::V4(Ipv4Addr::new(10, 0, 100, 5));

    #[rstest]
    #[case(Some(server(ServerStatus::Active, &[ADDR])), HealthStatus::Healthy)]
    #[case(Some(server(ServerStatus::Active, &[])), HealthStatus::Unhealthy)]
    #[case(Some(server(ServerStatus::Shutoff, &[ADDR])), HealthStatus::Unhealthy)]
    #[case(Some(server(ServerStatus::Error, &[])), HealthStatus::Unhealthy)]
    #[case(None, HealthStatus::Unknown)]
    fn classifies_servers(#[case] server: Option<Server>, #[case] expected: HealthStatus) {
        assert_eq!(classify(server.as_ref()), expected);
    }
}
