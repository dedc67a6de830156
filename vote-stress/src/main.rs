use anyhow::{Context, Result};
use clap::Parser;
use metrics_exporter_prometheus::PrometheusBuilder;
use stampede::prelude::*;
use std::net::SocketAddr;
use std::num::NonZeroU32;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::OnceLock;
use std::time::Duration;
use tracing::{error, info};
use tracing_subscriber::FmtSubscriber;
use vote_stress::{vote_workload, VoteClient, DEFAULT_TARGET};

#[derive(Parser, Debug)]
#[command(version, about = "Ramps virtual users casting votes against the voting API.")]
struct Cli {
    /// Vote endpoint.
    #[arg(long, env = "VOTE_TARGET_URL", default_value = DEFAULT_TARGET)]
    target: String,

    /// Options file (JSON) replacing the built-in workload.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Replace the stages, e.g. `-s 30s:10 -s 1m:10 -s 10s:0`.
    #[arg(short = 's', long = "stage", value_name = "DURATION:TARGET")]
    stages: Vec<Stage>,

    /// Run a constant number of VUs instead of stages. Requires `--duration`.
    #[arg(long, requires = "duration")]
    vus: Option<usize>,

    #[arg(long, value_parser = humantime::parse_duration, conflicts_with = "stages")]
    duration: Option<Duration>,

    /// Cap on requests per second across all VUs.
    #[arg(long)]
    rps: Option<NonZeroU32>,

    /// Per-request timeout.
    #[arg(long, value_parser = humantime::parse_duration, default_value = "60s")]
    timeout: Duration,

    /// Write the run summary as JSON to this file.
    #[arg(long)]
    summary_export: Option<PathBuf>,

    /// Serve Prometheus metrics on this address while running.
    #[arg(long)]
    prometheus: Option<SocketAddr>,

    #[arg(long, env = "RUST_LOG", default_value = "stampede=info,vote_stress=info")]
    log: String,
}

impl Cli {
    fn options(&self) -> Result<Options> {
        let mut options = match &self.config {
            Some(path) => Options::from_path(path)
                .with_context(|| format!("Unable to load options from {}", path.display()))?,
            None => vote_workload(),
        };

        if !self.stages.is_empty() {
            options.stages = self.stages.clone();
        }
        if let Some(duration) = self.duration {
            options.stages.clear();
            options.duration = Some(duration);
            options.vus = self.vus.or(options.vus);
        }
        if self.rps.is_some() {
            options.rps = self.rps;
        }

        Ok(options)
    }
}

static VOTER: OnceLock<VoteClient> = OnceLock::new();

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    FmtSubscriber::builder()
        .with_env_filter(cli.log.as_str())
        .init();

    if let Some(addr) = cli.prometheus {
        PrometheusBuilder::new()
            .with_http_listener(addr)
            .install()
            .context("Unable to start the Prometheus exporter")?;
        info!("Serving metrics on {addr}");
    }

    let options = cli.options()?;
    let client = VoteClient::new(&cli.target, cli.timeout)?;
    let voter = VOTER.get_or_init(|| client);
    info!("Voting against {}", voter.url());

    let summary = vote().options(&options)?.await;
    println!("{summary}");

    if let Some(path) = &cli.summary_export {
        std::fs::write(path, summary.to_json()?)
            .with_context(|| format!("Unable to write the summary to {}", path.display()))?;
    }

    Ok(ExitCode::from(summary.exit_code()))
}

#[scenario]
async fn vote(iteration: Iteration) {
    match VOTER.get() {
        Some(voter) => {
            voter.cast(iteration).await;
        }
        None => error!("Vote client used before it was set up"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    #[tracing_test::traced_test]
    async fn vote_without_client_logs_an_error() {
        assert!(VOTER.get().is_none());
        __stampede_vote(Iteration::new(1, 0)).await;
        assert!(logs_contain("Vote client used before it was set up"));
    }
}
