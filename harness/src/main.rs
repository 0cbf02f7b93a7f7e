use anyhow::Context;
use clap::Parser;
use sseload::cli::{Cli, Commands};
use sseload::status::{self, StatusLine};
use sseload::telemetry;
use sseload::{ChurnDriver, Config, LivenessProbe, SseClient, ThroughputBenchmark};
use std::sync::Arc;
use tokio::signal;
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = Config::from_env();
    cli.apply(&mut config);
    cli.validate(&config).context("invalid configuration")?;

    telemetry::init_tracing(cli.json_logs);

    if let Some(addr) = config.metrics_addr {
        telemetry::install_metrics_exporter(addr)?;
        info!("Prometheus metrics on http://{}/metrics", addr);
    }

    let client = SseClient::from_config(&config)?;
    let mut status_line = StatusLine::stdout();

    match cli.command {
        Commands::Drain(_) => {
            let driver = Arc::new(ChurnDriver::new(client.clone(), config.churn.clone()));
            let probe = LivenessProbe::new(client, config.probe.clone(), driver.counters());

            let churn_task = {
                let driver = driver.clone();
                tokio::spawn(async move { driver.run().await })
            };
            let probe_task = tokio::spawn(async move { probe.run().await });

            let render = {
                let driver = driver.clone();
                move || status::churn_status_line(&driver.snapshot())
            };
            tokio::select! {
                _ = status::report_forever(&mut status_line, config.status_interval, render) => {}
                _ = signal::ctrl_c() => {}
            }

            churn_task.abort();
            probe_task.abort();
            let _ = status_line.redraw(&status::churn_status_line(&driver.snapshot()));
            let _ = status_line.finish();
            info!(
                "Churn stopped: {}",
                serde_json::to_string(&driver.snapshot())?
            );
        }
        Commands::Bench(_) => {
            let bench = Arc::new(ThroughputBenchmark::new(client, config.bench.clone()));

            let bench_task = {
                let bench = bench.clone();
                tokio::spawn(async move { bench.run().await })
            };

            let render = {
                let bench = bench.clone();
                move || status::bench_status_line(&bench.snapshot())
            };
            tokio::select! {
                _ = status::report_forever(&mut status_line, config.status_interval, render) => {}
                _ = signal::ctrl_c() => {}
            }

            bench_task.abort();
            let _ = status_line.redraw(&status::bench_status_line(&bench.snapshot()));
            let _ = status_line.finish();
            info!(
                "Benchmark stopped: {}",
                serde_json::to_string(&bench.snapshot())?
            );
        }
    }

    Ok(())
}
