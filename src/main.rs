use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{ArgAction, Parser};
use tracing::Level;
use tracing_subscriber::EnvFilter;

mod args;
mod config;
mod dialect;
mod error;
mod event;
mod metrics;
mod printer;
mod queryer;
mod random;
mod replacements;
mod runner;
mod value;
mod vu;

use config::load_config;
use printer::{PrintMode, Printer};
use queryer::{MysqlQueryer, PostgresQueryer, Queryer};
use runner::Runner;

const METRICS_PORT: u16 = 2112;
const PRINT_INTERVAL: Duration = Duration::from_secs(5);

#[derive(Parser, Debug)]
#[command(author, version, about = "YAML-driven database workload generator")]
struct Cli {
    /// Absolute or relative path to config file
    #[arg(long, default_value = "drk.yaml")]
    config: PathBuf,

    /// Database connection string
    #[arg(long, default_value = "")]
    url: String,

    /// Database driver to use [mysql, postgres, pgx, oracle]
    #[arg(long, default_value = "pgx")]
    driver: String,

    /// Total duration of the simulation
    #[arg(long, value_parser = humantime::parse_duration, default_value = "10m")]
    duration: Duration,

    /// Print config and exit without running any workflow
    #[arg(long)]
    dry_run: bool,

    /// Summary display style
    #[arg(long, value_enum, default_value_t = PrintMode::Log)]
    print_mode: PrintMode,

    /// Clear the terminal before each summary
    #[arg(long)]
    clear: bool,

    /// Enable verbose logging (-v debug, -vv trace)
    #[arg(short = 'v', long = "debug", action = ArgAction::Count)]
    verbose: u8,
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    if cli.url.is_empty() || cli.driver.is_empty() {
        eprintln!("error: --url and --driver are required");
        return Ok(ExitCode::from(2));
    }

    let config = load_config(&cli.config).with_context(|| format!("loading {}", cli.config.display()))?;
    let printer = Printer::new(cli.print_mode, cli.clear);
    printer.print_config(&config);

    if cli.dry_run {
        return Ok(ExitCode::SUCCESS);
    }

    let db: Arc<dyn Queryer> = match cli.driver.to_lowercase().as_str() {
        "mysql" => Arc::new(MysqlQueryer::new(&cli.url)?),
        "postgres" | "pgx" => Arc::new(PostgresQueryer::new(&cli.url).await?),
        other => anyhow::bail!("unsupported database driver: {other}"),
    };

    let (runner_tx, metrics_rx) = tokio::sync::mpsc::channel(1000);
    let (printer_tx, printer_rx) = tokio::sync::mpsc::channel(1000);

    let metrics = metrics::Metrics::new().context("registering metrics")?;
    tokio::spawn(metrics::run(metrics, metrics_rx, printer_tx));
    tokio::spawn(printer::run(printer, printer_rx, PRINT_INTERVAL));
    tokio::spawn(metrics::serve(METRICS_PORT));

    let runner = Runner::new(Arc::new(config), db, cli.duration, runner_tx);
    runner.run().await.context("running workflows")?;
    Ok(ExitCode::SUCCESS)
}

fn init_tracing(verbose: u8) {
    let level = match verbose {
        0 => Level::INFO,
        1 => Level::DEBUG,
        _ => Level::TRACE,
    };

    let filter = EnvFilter::builder().with_default_directive(level.into()).from_env_lossy();
    tracing_subscriber::fmt().with_env_filter(filter).init();
}
