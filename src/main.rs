mod aggregator;
mod classifier;
mod cli;
mod config;
mod dispatcher;
mod error;
mod fetcher;
mod kubernetes;
mod prioritizer;
mod sampler;
mod scanner;
mod snapshot;
mod types;
mod utils;

use chrono::Local;
use clap::Parser;
use crossterm::style::Stylize;
use std::io::IsTerminal;
use std::sync::Arc;
use tracing::{error, info};

use cli::Cli;
use config::Config;
use dispatcher::{Alert, AlertDispatcher, Severity};
use error::ScanError;
use kubernetes::KubeCluster;
use scanner::{ScanFailure, Scanner};
use snapshot::ClusterSnapshot;
use utils::line_color;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Logs go to stderr so the digest on stdout stays clean
    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let mut config = Config::load(cli.config.as_deref())?;
    cli.apply_to(&mut config)?;
    let settings = config.scan.settings()?;
    config.notifier.validate()?;
    let dispatcher = AlertDispatcher::new(&config.notifier)?;
    let color = !cli.no_color && std::io::stdout().is_terminal();

    let outcome = match KubeCluster::connect(cli.context.as_deref()).await {
        Ok(cluster) => Scanner::new(Arc::new(cluster), settings).run().await,
        Err(e) => Err(ScanFailure {
            error: ScanError::ClusterUnreachable(format!("{:#}", e)),
            time_range: settings.time_range.clone(),
            snapshot: ClusterSnapshot::default(),
            completed_at: Local::now(),
        }),
    };

    match outcome {
        Ok(report) => {
            print_digest(&report.digest, color);
            if cli.no_alert {
                return Ok(());
            }
            let severity = cli
                .severity
                .as_deref()
                .map(Severity::parse_lenient)
                .unwrap_or_else(|| report.summary.suggested_severity());
            info!(%severity, "Raising alert");
            let alert = Alert::for_summary(&report.summary, &cli.title(), severity);
            let delivery = dispatcher.dispatch(&alert).await;
            println!("{}", delivery.describe(&alert));
            Ok(())
        }
        Err(failure) => {
            print_digest(&failure.digest(), color);
            if !cli.no_alert {
                let alert = Alert::new(
                    format!("{} failed", cli.title()),
                    failure.error.to_string(),
                    Severity::Critical,
                );
                let delivery = dispatcher.dispatch(&alert).await;
                println!("{}", delivery.describe(&alert));
            }
            error!("{}", failure);
            std::process::exit(1);
        }
    }
}

fn print_digest(digest: &str, color: bool) {
    for line in digest.lines() {
        match line_color(line).filter(|_| color) {
            Some(c) => println!("{}", line.with(c)),
            None => println!("{}", line),
        }
    }
}
