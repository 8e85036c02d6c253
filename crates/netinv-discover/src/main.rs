//! CLI entry point for the netinv-discover network sweep.

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Context;
use clap::Parser;
use tracing_subscriber::{fmt, EnvFilter};

use netinv_core::config::DEFAULT_CONFIG_PATH;
use netinv_core::InventoryConfig;

use netinv_discover::run::{run_discovery, RunOptions};

/// Filter used with `--verbose` when `RUST_LOG` is unset.
const VERBOSE_FILTER: &str =
    "info,netinv_core=debug,netinv_report=debug,netinv_opsi=debug,netinv_discover=debug";

#[derive(Parser)]
#[command(name = "netinv-discover")]
#[command(
    about = "Discover hosts on configured subnets and optionally register them with the OPSI server"
)]
struct Cli {
    /// Path to the inventory configuration (YAML, JSON or TOML).
    #[arg(short, long, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Override the output directory for discovery reports.
    #[arg(long)]
    output_dir: Option<PathBuf>,

    /// Additional subnet to scan (can be supplied multiple times).
    #[arg(long = "subnet", value_name = "CIDR")]
    subnets: Vec<String>,

    /// Override the worker pool size used for probing hosts.
    #[arg(long)]
    max_workers: Option<usize>,

    /// Collect results but skip writing reports or registering clients.
    #[arg(long)]
    dry_run: bool,

    /// Do not register discovered hosts with OPSI even if enabled in config.
    #[arg(long)]
    skip_registration: bool,

    /// Execute even if the configuration has enabled=false.
    #[arg(long)]
    force: bool,

    /// Enable debug logging.
    #[arg(short, long)]
    verbose: bool,

    /// Emit logs as JSON lines.
    #[arg(long)]
    json_logs: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.json_logs);

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %format!("{e:#}"), "Discovery failed");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let config = InventoryConfig::load(&cli.config)
        .with_context(|| format!("loading configuration {}", cli.config.display()))?;

    let opts = RunOptions {
        output_dir: cli.output_dir,
        extra_subnets: cli.subnets,
        max_workers: cli.max_workers,
        dry_run: cli.dry_run,
        skip_registration: cli.skip_registration,
        force: cli.force,
    };

    let summary = run_discovery(&config, &opts).await?;
    if summary.report_path.is_some() {
        tracing::info!("Automatic inventory discovery finished successfully");
    }

    Ok(())
}

fn init_tracing(verbose: bool, json: bool) {
    let default = if verbose { VERBOSE_FILTER } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    let builder = fmt().with_env_filter(filter).with_writer(std::io::stdout);

    if json {
        builder.json().init();
    } else {
        builder.with_target(false).init();
    }
}
