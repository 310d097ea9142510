use clap::Parser;
use std::error::Error;
use std::io::IsTerminal;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{error, info, warn};

use netcheck::config::load_settings;
use netcheck::loader::{self, Format};
use netcheck::logging::init_logging;
use netcheck::render::{render, OutputFormat};
use netcheck::version::VERSION;
use netcheck::{Dispatcher, NetworkProber};

/// Checks that network endpoints are reachable over TCP, UDP, TLS, DTLS,
/// ICMP and SSH.
#[derive(Parser, Debug)]
#[command(name = "netcheck", version = VERSION, about)]
struct Cli {
    /// Bundle files or http(s) URLs to run, in order.
    #[arg(required = true, value_name = "SOURCE")]
    sources: Vec<String>,

    /// Defaults file overriding the built-in timeout, retries, wait,
    /// concurrency and ping settings.
    #[arg(short, long, value_name = "PATH")]
    defaults: Option<PathBuf>,

    /// Format of the bundle documents, when it cannot be inferred.
    #[arg(short, long, value_enum)]
    format: Option<Format>,

    #[arg(short, long, value_enum, default_value_t = OutputFormat::Text)]
    output: OutputFormat,

    /// Tera template used with `--output template`.
    #[arg(short, long, value_name = "PATH")]
    template: Option<PathBuf>,

    /// Do not run the triggers attached to checks.
    #[arg(long)]
    no_triggers: bool,
}

/// Runs every bundle and renders the results; `Ok(true)` when all checks
/// passed.
async fn run(cli: Cli) -> Result<bool, Box<dyn Error>> {
    let settings = load_settings(cli.defaults.as_deref())?;
    info!(defaults = ?settings, "Settings resolved.");

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, cancelling remaining checks.");
            let _ = shutdown_tx.send(true);
        }
    });

    let dispatcher = Dispatcher::new(Arc::new(NetworkProber::new(settings.ping)))
        .with_triggers(!cli.no_triggers)
        .with_shutdown(shutdown_rx);

    let mut bundles = Vec::with_capacity(cli.sources.len());
    for source in &cli.sources {
        let mut bundle = loader::load(source, cli.format).await?;
        bundle.apply_defaults(&settings.execution);
        dispatcher.run_bundle(&mut bundle).await;
        bundles.push(bundle);
    }

    let colour = cli.output == OutputFormat::Text && std::io::stdout().is_terminal();
    let mut stdout = std::io::stdout().lock();
    render(&bundles, cli.output, cli.template.as_deref(), colour, &mut stdout)?;

    Ok(bundles.iter().all(|bundle| bundle.passed()))
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging();
    info!(version = VERSION, "Starting netcheck...");

    match run(cli).await {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::from(1),
        Err(e) => {
            error!(error = %e, "netcheck failed.");
            eprintln!("netcheck: {e}");
            ExitCode::from(2)
        }
    }
}
