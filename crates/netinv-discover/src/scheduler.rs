//! Probe scheduling engine.
//!
//! Keeps at most `workers` probe tasks in flight, refilling from the address
//! iterator as tasks finish. Each task probes one address and, when the host
//! answered, enriches it before returning. Results are aggregated here, on
//! the calling task, in completion order.

use std::net::IpAddr;
use std::sync::Arc;

use netinv_core::ProbeResult;
use tokio::task::JoinSet;

use crate::enrich::HostEnricher;
use crate::error::{DiscoverError, Result};
use crate::probe::Prober;

const MIN_WORKERS: usize = 16;
const MAX_WORKERS: usize = 256;

/// Pool size: the configured value, or four per CPU within 16..=256.
pub fn worker_count(configured: Option<usize>) -> usize {
    match configured {
        Some(n) if n > 0 => n,
        _ => (num_cpus::get() * 4).clamp(MIN_WORKERS, MAX_WORKERS),
    }
}

/// Aggregated results of one sweep.
#[derive(Debug, Default)]
pub struct ScanOutcome {
    /// Every probed address, in completion order.
    pub results: Vec<ProbeResult>,
    /// The reachable subset of `results`, same order.
    pub reachable: Vec<ProbeResult>,
}

impl ScanOutcome {
    fn record(&mut self, result: ProbeResult) {
        if result.reachable {
            tracing::debug!(
                ip = %result.ip,
                hostname = ?result.hostname,
                latency_ms = ?result.latency_ms,
                "Host reachable"
            );
            self.reachable.push(result.clone());
        }
        self.results.push(result);
    }

    /// Sort both lists by address.
    pub fn sort_by_address(&mut self) {
        self.results.sort_by_key(|r| r.ip);
        self.reachable.sort_by_key(|r| r.ip);
    }
}

/// Bounded-concurrency probe runner.
pub struct ProbeScheduler<P> {
    prober: Arc<P>,
    enricher: HostEnricher,
    workers: usize,
}

impl<P: Prober + 'static> ProbeScheduler<P> {
    pub fn new(prober: P, enricher: HostEnricher, workers: usize) -> Self {
        Self {
            prober: Arc::new(prober),
            enricher,
            workers: workers.max(1),
        }
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Probe every address. Either all addresses produce exactly one result
    /// or the sweep fails as a whole; a failing or panicking task aborts the
    /// tasks still in flight.
    pub async fn run<I>(&self, addresses: I) -> Result<ScanOutcome>
    where
        I: IntoIterator<Item = IpAddr>,
    {
        let mut pending = addresses.into_iter();
        let mut in_flight: JoinSet<Result<ProbeResult>> = JoinSet::new();
        let mut outcome = ScanOutcome::default();

        loop {
            while in_flight.len() < self.workers {
                let Some(ip) = pending.next() else { break };
                let prober = Arc::clone(&self.prober);
                let enricher = self.enricher.clone();
                in_flight.spawn(async move {
                    let mut result = prober.probe(ip).await?;
                    enricher.enrich(&mut result).await;
                    Ok(result)
                });
            }

            let Some(joined) = in_flight.join_next().await else {
                break;
            };
            let result = joined.map_err(|e| DiscoverError::Worker(e.to_string()))??;
            outcome.record(result);
        }

        Ok(outcome)
    }
}
