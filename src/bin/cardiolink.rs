// src/bin/cardiolink.rs
//! Local front end for the HRV pipeline.
//!
//! Loads a JSON array of heart rate samples into the simulated health store
//! and runs the gateway over it, or runs the estimators directly on RR values.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use chrono::Utc;
use clap::{Parser, Subcommand};

use cardiolink::health::{HealthPermission, SimHealthStore, TimeRange};
use cardiolink::{
    CardiolinkConfig, HealthGateway, HeartRateSample, HrvMetrics, OperationResult,
};

#[derive(Parser)]
#[command(name = "cardiolink", version, about = "Heart rate variability from heart rate samples")]
struct Cli {
    /// JSON config file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Compute RMSSD, SDNN and PNN50 from a sample file
    Metrics {
        /// JSON array of {beats_per_minute, timestamp, source}
        #[arg(long)]
        samples: PathBuf,
        /// Trailing window in hours (default: the whole file)
        #[arg(long)]
        hours: Option<u32>,
        /// Simulate a user who has not granted read access
        #[arg(long)]
        deny_permissions: bool,
    },
    /// Print the gated, time-ordered samples from a sample file
    Samples {
        #[arg(long)]
        samples: PathBuf,
        #[arg(long)]
        hours: Option<u32>,
    },
    /// Run the estimators on RR intervals given in milliseconds
    Estimate {
        #[arg(required = true)]
        rr: Vec<f64>,
    },
}

fn load_samples(path: &Path) -> Result<Vec<HeartRateSample>> {
    let data = std::fs::read(path).with_context(|| format!("reading {}", path.display()))?;
    let samples: Vec<HeartRateSample> =
        serde_json::from_slice(&data).with_context(|| format!("parsing {}", path.display()))?;
    Ok(samples)
}

/// The trailing window if given, otherwise the span of the samples.
fn window(samples: &[HeartRateSample], hours: Option<u32>) -> Result<TimeRange> {
    match hours {
        Some(h) => match TimeRange::trailing_hours(h) {
            Some(range) => Ok(range),
            None => bail!("--hours {} reaches outside the supported time range", h),
        },
        None => {
            let now = Utc::now();
            let start = samples.iter().map(|s| s.timestamp).min().unwrap_or(now);
            let end = samples.iter().map(|s| s.timestamp).max().unwrap_or(now);
            Ok(TimeRange::between(start, end))
        }
    }
}

fn gateway_for(
    samples: Vec<HeartRateSample>,
    config: &CardiolinkConfig,
    deny: bool,
) -> HealthGateway {
    let store = SimHealthStore::from_samples(samples);
    if !deny {
        store.grant(HealthPermission::ReadHeartRate);
        store.grant(HealthPermission::ReadHrvRmssd);
    }
    HealthGateway::with_config(Arc::new(store), config.gateway.clone())
}

fn unwrap_result<T>(result: OperationResult<T>) -> Result<T> {
    match result {
        OperationResult::Success(value) => Ok(value),
        OperationResult::PermissionDenied => {
            bail!("permission denied: heart rate read access not granted")
        }
        OperationResult::NotAvailable => bail!("health store not available"),
        OperationResult::Error { message, cause } => match cause {
            Some(cause) => bail!("{}: {}", message, cause),
            None => bail!("{}", message),
        },
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => CardiolinkConfig::load(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => CardiolinkConfig::default(),
    };

    match cli.command {
        Command::Metrics {
            samples,
            hours,
            deny_permissions,
        } => {
            let samples = load_samples(&samples)?;
            let range = window(&samples, hours)?;
            let gateway = gateway_for(samples, &config, deny_permissions);
            let metrics =
                unwrap_result(gateway.calculate_hrv_metrics(range.start, range.end).await)?;
            if !metrics.is_valid() {
                log::warn!("Metrics computed from fewer than two intervals");
            }
            println!("{}", serde_json::to_string_pretty(&metrics)?);
        }
        Command::Samples { samples, hours } => {
            let samples = load_samples(&samples)?;
            let range = window(&samples, hours)?;
            let gateway = gateway_for(samples, &config, false);
            let ordered =
                unwrap_result(gateway.read_heart_rate_data(range.start, range.end).await)?;
            println!("{}", serde_json::to_string_pretty(&ordered)?);
        }
        Command::Estimate { rr } => {
            if rr.iter().any(|v| !v.is_finite() || *v <= 0.0) {
                bail!("RR intervals must be positive, finite milliseconds");
            }
            let metrics = HrvMetrics::compute(&rr, Utc::now());
            println!("{}", serde_json::to_string_pretty(&metrics)?);
        }
    }

    Ok(())
}
