//! Bar construction commands.

use anyhow::Result;
use clap::{Args, Subcommand};
use tracing::info;

use arcana_common::bars::{builder_for, BarSpec, BarSpecError};

use crate::config::Settings;
use crate::pipeline::{
    build_bars, calibrate_dollar_threshold, calibrate_initial_expected, calibrate_tick_threshold,
    calibrate_volume_threshold, AdaptiveFamily, ShutdownSignal,
};
use crate::storage::TradeStore;

use super::{InputError, DEFAULT_SOURCE};

/// Bar subcommands.
#[derive(Subcommand)]
pub enum BarsCommands {
    /// Build bars of one spec from the stored trade log
    Build(BuildArgs),
    /// Calibrate thresholds from historical averages
    Calibrate(CalibrateArgs),
}

/// Arguments for the build command.
#[derive(Args)]
pub struct BuildArgs {
    /// Bar spec, e.g. tick_500, volume_10.5, time_5m, tib_10
    pub spec: String,

    /// Trading pair, e.g. ETH-USD
    pub pair: String,

    /// Delete existing bars of this spec and rebuild from scratch
    #[arg(long)]
    pub rebuild: bool,

    /// Initial EWMA expected value for adaptive families (skips the
    /// cold-start bootstrap; ignored by fixed-threshold families)
    #[arg(long)]
    pub initial_expected: Option<f64>,
}

/// Arguments for the calibrate command.
#[derive(Args)]
pub struct CalibrateArgs {
    /// Bar family: tick, volume, dollar, tib, vib, dib, trb, vrb, drb
    pub family: String,

    /// Trading pair, e.g. ETH-USD
    pub pair: String,

    /// Target bar count per day
    #[arg(long, default_value_t = 50)]
    pub bars_per_day: u32,
}

pub async fn execute(cmd: BarsCommands) -> Result<()> {
    match cmd {
        BarsCommands::Build(args) => execute_build(args).await,
        BarsCommands::Calibrate(args) => execute_calibrate(args).await,
    }
}

async fn execute_build(args: BuildArgs) -> Result<()> {
    let spec: BarSpec = args.spec.parse().map_err(|e: BarSpecError| InputError(e.to_string()))?;

    let settings = Settings::load()?;
    let shutdown = ShutdownSignal::install();
    let store = TradeStore::connect(&settings.database, settings.ingest.batch_size).await?;

    let mut builder = builder_for(&spec, DEFAULT_SOURCE, &args.pair, args.initial_expected);
    info!("building {} bars for {}...", builder.bar_type(), args.pair);

    let total = build_bars(
        builder.as_mut(),
        &store,
        DEFAULT_SOURCE,
        &args.pair,
        args.rebuild,
        &shutdown,
    )
    .await?;

    println!("Built {total} {} bars for {}.", spec.label(), args.pair);
    Ok(())
}

async fn execute_calibrate(args: CalibrateArgs) -> Result<()> {
    let settings = Settings::load()?;
    let store = TradeStore::connect(&settings.database, settings.ingest.batch_size).await?;
    let pair = &args.pair;
    let bpd = args.bars_per_day;

    match args.family.as_str() {
        "tick" => {
            let threshold =
                calibrate_tick_threshold(&store, DEFAULT_SOURCE, pair, bpd).await?;
            println!("Calibrated tick threshold for {pair} at {bpd} bars/day: {threshold}");
            println!("  Suggested spec: tick_{threshold}");
        }
        "volume" => {
            let threshold =
                calibrate_volume_threshold(&store, DEFAULT_SOURCE, pair, bpd).await?;
            println!("Calibrated volume threshold for {pair} at {bpd} bars/day: {threshold}");
            println!("  Suggested spec: volume_{threshold}");
        }
        "dollar" => {
            let threshold =
                calibrate_dollar_threshold(&store, DEFAULT_SOURCE, pair, bpd).await?;
            println!("Calibrated dollar threshold for {pair} at {bpd} bars/day: {threshold}");
            println!("  Suggested spec: dollar_{threshold}");
        }
        other => {
            let family: AdaptiveFamily = other
                .parse()
                .map_err(|e: String| InputError(e))?;
            let expected =
                calibrate_initial_expected(&store, DEFAULT_SOURCE, pair, family, bpd).await?;
            println!(
                "Calibrated initial expected value for {other} {pair} at {bpd} bars/day: {expected:.6}"
            );
            println!("  Pass it via: arcana bars build {other}_<window> {pair} --initial-expected {expected:.6}");
        }
    }

    Ok(())
}
