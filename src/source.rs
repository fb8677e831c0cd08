use anyhow::{Context, Result};

use crate::proto::stats::stats_service_client::StatsServiceClient;
use crate::proto::stats::QueryStatsRequest;
use crate::stat::RawStat;

/// Wildcard prefix selecting every per-user/per-category counter.
pub const USER_PATTERN: &str = "user>>>";

/// Client for one stats query against a remote service.
pub trait StatFetcher {
    /// Fetch and reset all per-user counters from the service at `address`.
    fn fetch(
        &self,
        address: &str,
    ) -> impl std::future::Future<Output = Result<Vec<RawStat>>> + Send;
}

/// gRPC-based stat fetcher.
///
/// Each fetch dials a fresh channel, issues one `QueryStats` call with the
/// reset flag set, and drops the channel on return, success and failure paths
/// alike. Reading zeroes the matched counters on the service, so a fetch must
/// never overlap another read of the same source. No deadline is applied; an
/// unresponsive service blocks the cycle.
#[derive(Debug, Default, Clone, Copy)]
pub struct GrpcStatFetcher;

impl StatFetcher for GrpcStatFetcher {
    async fn fetch(&self, address: &str) -> Result<Vec<RawStat>> {
        let mut client = StatsServiceClient::connect(address.to_string())
            .await
            .with_context(|| format!("connecting to stats service at {address}"))?;

        let request = QueryStatsRequest {
            pattern: USER_PATTERN.to_string(),
            reset: true,
        };

        let response = client
            .query_stats(request)
            .await
            .with_context(|| format!("querying stats from {address}"))?;

        let stats = response
            .into_inner()
            .stat
            .into_iter()
            .map(|s| RawStat {
                name: s.name,
                value: s.value,
            })
            .collect();

        Ok(stats)
    }
}
