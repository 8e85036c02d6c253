//! One discovery run: enumerate → probe → report → register.

use std::future::Future;
use std::net::IpAddr;
use std::path::PathBuf;

use netinv_core::{DiscoveryReport, InventoryConfig};
use netinv_opsi::{register_reachable, RegistrationSummary};
use netinv_report::{FsReportStore, ReportStore};

use crate::enrich::HostEnricher;
use crate::enumerate::{enumerate, parse_exclusions};
use crate::error::{DiscoverError, Result};
use crate::probe::{PingCommand, PingProber, Prober};
use crate::scheduler::{worker_count, ProbeScheduler};

/// Command-line overrides for a run.
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    pub output_dir: Option<PathBuf>,
    pub extra_subnets: Vec<String>,
    pub max_workers: Option<usize>,
    /// Probe only; no report and no registration.
    pub dry_run: bool,
    pub skip_registration: bool,
    /// Run even when the configuration is disabled.
    pub force: bool,
}

/// What a run did.
#[derive(Debug, Default)]
pub struct RunSummary {
    /// The configuration was disabled and nothing ran.
    pub disabled: bool,
    pub probed: usize,
    pub reachable: usize,
    pub report_path: Option<PathBuf>,
    pub registration: Option<RegistrationSummary>,
}

/// Configured subnets followed by any given on the command line.
pub fn collect_subnets(config: &InventoryConfig, opts: &RunOptions) -> Result<Vec<String>> {
    let subnets: Vec<String> = config
        .subnets
        .iter()
        .chain(&opts.extra_subnets)
        .filter(|s| !s.trim().is_empty())
        .cloned()
        .collect();

    if subnets.is_empty() {
        return Err(DiscoverError::NoSubnets);
    }
    Ok(subnets)
}

/// Run discovery with the system ping, resolver and neighbor table.
///
/// Preconditions are checked before anything is probed: the subnet list
/// must be non-empty and the ping binary must exist.
pub async fn run_discovery(config: &InventoryConfig, opts: &RunOptions) -> Result<RunSummary> {
    if !config.enabled && !opts.force {
        tracing::info!("Automatic inventory discovery is disabled in configuration");
        return Ok(RunSummary {
            disabled: true,
            ..RunSummary::default()
        });
    }

    let subnets = collect_subnets(config, opts)?;
    let command = PingCommand::resolve(&config.ping)?;
    tracing::debug!(binary = %command.binary().display(), "Ping binary resolved");

    let prober = PingProber::new(command);
    let enricher = HostEnricher::system(&config.discovery);
    run_with(config, opts, &subnets, prober, enricher, ctrl_c()).await
}

/// Resolves on the first Ctrl-C. Never resolves if the handler cannot be
/// installed.
async fn ctrl_c() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "Failed to listen for Ctrl-C");
        std::future::pending::<()>().await;
    }
}

/// Run discovery over `subnets` with the given prober and enricher.
///
/// `shutdown` is watched for the whole run. When it resolves first, the run
/// stops where it is and returns [`DiscoverError::Interrupted`]; a sweep
/// cut short writes no report and registers nothing.
pub async fn run_with<P, S>(
    config: &InventoryConfig,
    opts: &RunOptions,
    subnets: &[String],
    prober: P,
    enricher: HostEnricher,
    shutdown: S,
) -> Result<RunSummary>
where
    P: Prober + 'static,
    S: Future<Output = ()>,
{
    tokio::select! {
        summary = pipeline(config, opts, subnets, prober, enricher) => summary,
        () = shutdown => {
            tracing::warn!("Discovery interrupted by user");
            Err(DiscoverError::Interrupted)
        }
    }
}

async fn pipeline<P: Prober + 'static>(
    config: &InventoryConfig,
    opts: &RunOptions,
    subnets: &[String],
    prober: P,
    enricher: HostEnricher,
) -> Result<RunSummary> {
    let workers = worker_count(
        opts.max_workers
            .filter(|n| *n > 0)
            .or(config.ping.workers),
    );
    tracing::info!(subnets = subnets.len(), workers, "Starting discovery");

    let exclude = parse_exclusions(&config.exclude_addresses);
    let addresses: Vec<IpAddr> = enumerate(subnets, &exclude).collect();
    if addresses.is_empty() {
        tracing::warn!("No IP addresses to scan after applying exclusions");
        return Ok(RunSummary::default());
    }
    tracing::info!(addresses = addresses.len(), "Probing addresses");

    let scheduler = ProbeScheduler::new(prober, enricher, workers);
    let mut outcome = scheduler.run(addresses).await?;

    if config.output.sort_by_address {
        outcome.sort_by_address();
    }

    tracing::info!(
        reachable = outcome.reachable.len(),
        probed = outcome.results.len(),
        "Discovery complete"
    );

    let mut summary = RunSummary {
        probed: outcome.results.len(),
        reachable: outcome.reachable.len(),
        ..RunSummary::default()
    };

    if opts.dry_run {
        tracing::info!("Dry-run enabled: skipping report generation and registration");
        return Ok(summary);
    }

    let output_dir = opts
        .output_dir
        .clone()
        .unwrap_or_else(|| config.output.directory.clone());
    let store = FsReportStore::new(output_dir, config.output.max_history);
    let report_path = store.write(&DiscoveryReport::new(outcome.results))?;
    tracing::info!(path = %report_path.display(), "Discovery report written");
    summary.report_path = Some(report_path);

    let auto_register = config.registration.auto_register && !opts.skip_registration;
    if !auto_register {
        return Ok(summary);
    }
    if outcome.reachable.is_empty() {
        tracing::info!("No reachable hosts detected; skipping registration");
        return Ok(summary);
    }

    tracing::info!(
        hosts = outcome.reachable.len(),
        "Registering reachable hosts with OPSI"
    );
    let registration =
        register_reachable(&config.opsi, &config.registration, &outcome.reachable).await;

    if !registration.registered.is_empty() {
        tracing::info!(
            count = registration.registered.len(),
            "Registered OPSI clients"
        );
    }
    for failure in &registration.failures {
        tracing::warn!(failure = %failure, "Registration failure");
    }

    summary.registration = Some(registration);
    Ok(summary)
}
