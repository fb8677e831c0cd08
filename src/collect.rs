use anyhow::Result;
use tracing::{debug, info, warn};

use crate::config::{Config, SourceConfig};
use crate::sink::influx;
use crate::source::StatFetcher;
use crate::stat::{self, DecodedStat, RawStat, ServerAggregate};

/// Decodes every raw stat from one source, skipping malformed names.
fn decode_stats(label: &str, raw: &[RawStat]) -> Vec<DecodedStat> {
    let mut decoded = Vec::with_capacity(raw.len());

    for stat in raw {
        match stat::decode(stat) {
            Ok(d) => decoded.push(d),
            Err(e) => warn!(source = label, error = %e, "skipping undecodable stat"),
        }
    }

    decoded
}

/// Folds one source's fetch outcome into the aggregate.
///
/// A failed fetch or a source with zero decodable stats contributes nothing;
/// a label is inserted only alongside a non-empty decoded sequence.
pub fn fold_source(aggregate: &mut ServerAggregate, label: &str, outcome: Result<Vec<RawStat>>) {
    match outcome {
        Ok(raw) => {
            let decoded = decode_stats(label, &raw);
            if decoded.is_empty() {
                debug!(source = label, "no decodable stats, omitting source");
            } else {
                aggregate.insert(label.to_string(), decoded);
            }
        }
        Err(e) => warn!(source = label, error = %e, "failed to query source"),
    }
}

/// Polls every source in order and builds the cycle's aggregate.
///
/// Sources are read strictly one at a time: the query resets remote counters,
/// so overlapping reads of one source would consume the same interval twice.
pub async fn collect<F: StatFetcher>(fetcher: &F, sources: &[SourceConfig]) -> ServerAggregate {
    let mut aggregate = ServerAggregate::new();

    for source in sources {
        debug!(source = %source.label, address = %source.address, "querying source");
        let outcome = fetcher.fetch(&source.address).await;
        fold_source(&mut aggregate, &source.label, outcome);
    }

    aggregate
}

/// Runs one full collection cycle: fetch, decode, aggregate, write.
///
/// Per-source failures are logged and isolated; only a store-side failure is
/// fatal to the cycle. An all-sources-failed cycle is a successful no-op.
pub async fn run_cycle<F: StatFetcher>(fetcher: &F, cfg: &Config) -> Result<()> {
    let aggregate = collect(fetcher, &cfg.sources).await;

    if aggregate.is_empty() {
        info!("no stats collected, skipping write");
        return Ok(());
    }

    let points: usize = aggregate.values().map(Vec::len).sum();

    influx::write_aggregate(&cfg.influxdb, &aggregate).await?;

    info!(
        servers = aggregate.len(),
        points,
        "collection cycle complete",
    );

    Ok(())
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use anyhow::anyhow;

    use super::*;
    use crate::config::InfluxConfig;

    fn raw(name: &str, value: i64) -> RawStat {
        RawStat {
            name: name.to_string(),
            value,
        }
    }

    /// Fetcher fixture serving canned outcomes keyed by address.
    struct FakeFetcher {
        responses: HashMap<String, Result<Vec<RawStat>, String>>,
    }

    impl FakeFetcher {
        fn new() -> Self {
            Self {
                responses: HashMap::new(),
            }
        }

        fn ok(mut self, address: &str, stats: Vec<RawStat>) -> Self {
            self.responses.insert(address.to_string(), Ok(stats));
            self
        }

        fn err(mut self, address: &str, message: &str) -> Self {
            self.responses
                .insert(address.to_string(), Err(message.to_string()));
            self
        }
    }

    impl StatFetcher for FakeFetcher {
        async fn fetch(&self, address: &str) -> Result<Vec<RawStat>> {
            match self.responses.get(address) {
                Some(Ok(stats)) => Ok(stats.clone()),
                Some(Err(message)) => Err(anyhow!("{message}")),
                None => Err(anyhow!("no fixture for {address}")),
            }
        }
    }

    fn source(label: &str, address: &str) -> SourceConfig {
        SourceConfig {
            label: label.to_string(),
            address: address.to_string(),
        }
    }

    #[test]
    fn test_fold_source_inserts_decoded_stats() {
        let mut aggregate = ServerAggregate::new();
        fold_source(
            &mut aggregate,
            "alpha",
            Ok(vec![
                raw("user>>>alice>>>traffic>>>uplink", 10),
                raw("user>>>bob>>>traffic>>>downlink", 20),
            ]),
        );

        let stats = aggregate.get("alpha").expect("alpha present");
        assert_eq!(stats.len(), 2);
        assert_eq!(stats[0].user, "alice");
        assert_eq!(stats[1].kind, "downlink");
    }

    #[test]
    fn test_fold_source_fetch_error_omits_source() {
        let mut aggregate = ServerAggregate::new();
        fold_source(&mut aggregate, "alpha", Err(anyhow!("connection refused")));
        assert!(aggregate.is_empty());
    }

    #[test]
    fn test_fold_source_empty_result_omits_source() {
        let mut aggregate = ServerAggregate::new();
        fold_source(&mut aggregate, "alpha", Ok(Vec::new()));
        assert!(!aggregate.contains_key("alpha"));
        assert!(aggregate.is_empty());
    }

    #[test]
    fn test_fold_source_skips_malformed_items() {
        let mut aggregate = ServerAggregate::new();
        fold_source(
            &mut aggregate,
            "alpha",
            Ok(vec![
                raw("user>>>alice>>>traffic>>>uplink", 10),
                raw("bad>>>onlythree", 999),
                raw("user>>>carol>>>traffic>>>downlink", 30),
            ]),
        );

        let stats = aggregate.get("alpha").expect("alpha present");
        assert_eq!(stats.len(), 2);
        assert_eq!(stats[0].user, "alice");
        assert_eq!(stats[1].user, "carol");
    }

    #[test]
    fn test_fold_source_all_malformed_omits_source() {
        let mut aggregate = ServerAggregate::new();
        fold_source(
            &mut aggregate,
            "alpha",
            Ok(vec![raw("bad>>>onlythree", 1), raw("nope", 2)]),
        );
        assert!(aggregate.is_empty());
    }

    #[tokio::test]
    async fn test_collect_isolates_failed_source() {
        let fetcher = FakeFetcher::new()
            .ok(
                "http://a:10085",
                vec![
                    raw("user>>>alice>>>traffic>>>uplink", 1),
                    raw("user>>>alice>>>traffic>>>downlink", 2),
                ],
            )
            .err("http://b:10085", "dial timeout")
            .ok(
                "http://c:10085",
                vec![raw("user>>>carol>>>traffic>>>uplink", 3)],
            );

        let sources = vec![
            source("alpha", "http://a:10085"),
            source("beta", "http://b:10085"),
            source("gamma", "http://c:10085"),
        ];

        let aggregate = collect(&fetcher, &sources).await;

        assert_eq!(aggregate.len(), 2);
        assert_eq!(aggregate.get("alpha").expect("alpha").len(), 2);
        assert!(!aggregate.contains_key("beta"));
        assert_eq!(aggregate.get("gamma").expect("gamma").len(), 1);
    }

    #[tokio::test]
    async fn test_collect_preserves_stat_order_within_source() {
        let fetcher = FakeFetcher::new().ok(
            "http://a:10085",
            vec![
                raw("user>>>alice>>>traffic>>>uplink", 1),
                raw("user>>>bob>>>traffic>>>uplink", 2),
                raw("user>>>carol>>>traffic>>>uplink", 3),
            ],
        );

        let aggregate = collect(&fetcher, &[source("alpha", "http://a:10085")]).await;
        let users: Vec<&str> = aggregate
            .get("alpha")
            .expect("alpha")
            .iter()
            .map(|s| s.user.as_str())
            .collect();
        assert_eq!(users, vec!["alice", "bob", "carol"]);
    }

    #[tokio::test]
    async fn test_collect_all_sources_fail() {
        let fetcher = FakeFetcher::new()
            .err("http://a:10085", "refused")
            .err("http://b:10085", "refused");

        let sources = vec![
            source("alpha", "http://a:10085"),
            source("beta", "http://b:10085"),
        ];

        let aggregate = collect(&fetcher, &sources).await;
        assert!(aggregate.is_empty());
    }

    #[tokio::test]
    async fn test_run_cycle_empty_aggregate_skips_write() {
        let fetcher = FakeFetcher::new().err("http://a:10085", "refused");

        // The influx address is unroutable; the cycle only succeeds because
        // an empty aggregate never reaches the writer.
        let cfg = Config {
            sources: vec![source("alpha", "http://a:10085")],
            influxdb: InfluxConfig {
                address: "http://127.0.0.1:1".to_string(),
                database: "traffic".to_string(),
            },
            ..Default::default()
        };

        run_cycle(&fetcher, &cfg).await.expect("no-op cycle succeeds");
    }
}
