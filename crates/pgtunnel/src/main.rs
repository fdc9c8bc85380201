use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use pgtunnel::config::{CliOverrides, FileConfig, ResolvedConfig};
use pgtunnel::{
    parse_port, LocalhostListenerFactory, OsSignals, RusshConnector, StdoutTerminal,
    TunnelController, TunnelDiagnostic, TunnelOptions,
};
use pgtunnel_common::{AccessMode, DEFAULT_PG_PORT};
use pgtunnel_provision::{HttpProvisioner, ProvisionerConfig};

/// pgtunnel - secure tunnel to an isolated Postgres add-on
#[derive(Parser, Debug)]
#[command(name = "pgtunnel", version)]
#[command(about = "Open a secure tunnel from localhost to an isolated Postgres add-on")]
struct Cli {
    /// Name or ID of the Postgres add-on
    #[arg(short = 'o', long)]
    addon: String,

    /// Local port to listen on
    #[arg(short, long, default_value_t = DEFAULT_PG_PORT, value_parser = parse_port)]
    port: u16,

    /// Provision a database user that can write
    #[arg(short, long)]
    write_access: bool,

    /// Config file (default: <config dir>/pgtunnel/config.toml)
    #[arg(long)]
    config: Option<String>,

    /// Platform API base URL
    #[arg(long)]
    api_url: Option<String>,

    /// Add-on API base URL
    #[arg(long)]
    addon_api_url: Option<String>,

    /// Debug logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            let _ = e.print();
            return if e.use_stderr() {
                ExitCode::FAILURE
            } else {
                ExitCode::SUCCESS
            };
        }
    };

    if let Err(e) = init_logging(cli.verbose) {
        eprintln!("Failed to initialize logging: {:#}", e);
        return ExitCode::FAILURE;
    }

    let provisioner_config = match load_config(&cli) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Configuration error: {:#}", e);
            return ExitCode::FAILURE;
        }
    };

    let controller = TunnelController::new(
        Arc::new(HttpProvisioner::new(provisioner_config)),
        Arc::new(RusshConnector::new()),
        Arc::new(LocalhostListenerFactory),
        Arc::new(StdoutTerminal),
    );

    let options = TunnelOptions {
        addon: cli.addon,
        local_port: cli.port,
        access_mode: AccessMode::from_write_access(cli.write_access),
    };

    match controller.run(&options, OsSignals).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            TunnelDiagnostic::from(&e).report();
            ExitCode::FAILURE
        }
    }
}

/// Logs go to stderr; stdout is reserved for connection instructions
fn init_logging(verbose: bool) -> Result<()> {
    let level = if verbose { "debug" } else { "info" };

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::from_default_env()
                .add_directive(format!("pgtunnel={}", level).parse()?)
                .add_directive(format!("pgtunnel_provision={}", level).parse()?)
                .add_directive(format!("pgtunnel_common={}", level).parse()?),
        )
        .init();

    Ok(())
}

fn load_config(cli: &Cli) -> Result<ProvisionerConfig> {
    let file = FileConfig::discover(cli.config.as_deref())?;
    let overrides = CliOverrides {
        api_url: cli.api_url.clone(),
        addon_api_url: cli.addon_api_url.clone(),
    };

    ResolvedConfig::resolve(file, &overrides)?.provisioner_config()
}
