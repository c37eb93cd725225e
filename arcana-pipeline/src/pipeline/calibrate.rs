//! Threshold calibration from historical averages.
//!
//! Fixed-threshold families get a threshold targeting a bar count per
//! day; adaptive families get an initial expected value so their EWMA
//! skips the cold-start bootstrap. All of this is float arithmetic on
//! aggregates — statistical estimates, outside the exact trade→bar path.

use std::str::FromStr;

use crate::pipeline::PipelineError;
use crate::storage::{ImbalanceStats, TradeStore, TradeVolumeStats};

use arcana_common::bars::FlowKind;

/// Direction-bias floor: at P[buy] = 0.5 exactly the imbalance formula
/// would degenerate to zero.
const MIN_DIRECTION_BIAS: f64 = 0.1;

/// Clamp bounds for the run-length probability, keeping the geometric
/// expected run finite and nonzero.
const P_SAME_MIN: f64 = 0.55;
const P_SAME_MAX: f64 = 0.95;

/// One of the six adaptive bar families, for calibration dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdaptiveFamily {
    Imbalance(FlowKind),
    Run(FlowKind),
}

impl FromStr for AdaptiveFamily {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "tib" => Ok(AdaptiveFamily::Imbalance(FlowKind::Tick)),
            "vib" => Ok(AdaptiveFamily::Imbalance(FlowKind::Volume)),
            "dib" => Ok(AdaptiveFamily::Imbalance(FlowKind::Dollar)),
            "trb" => Ok(AdaptiveFamily::Run(FlowKind::Tick)),
            "vrb" => Ok(AdaptiveFamily::Run(FlowKind::Volume)),
            "drb" => Ok(AdaptiveFamily::Run(FlowKind::Dollar)),
            _ => Err(format!("unknown adaptive bar family '{s}'")),
        }
    }
}

/// Round to two significant digits, giving operators clean thresholds.
pub fn round_to_two_significant(value: f64) -> f64 {
    if value <= 0.0 {
        return value;
    }
    let magnitude = 10f64.powf(value.log10().floor() - 1.0);
    (value / magnitude).round() * magnitude
}

fn expected_ticks_per_bar(stats: &TradeVolumeStats, bars_per_day: u32) -> f64 {
    stats.total_trades / (stats.span_days * bars_per_day as f64)
}

fn check_span(stats: &TradeVolumeStats) -> Result<(), PipelineError> {
    if stats.span_days <= 0.0 || stats.total_trades <= 0.0 {
        return Err(PipelineError::Precondition(
            "insufficient trade data to calibrate (need more than one trade over time)".into(),
        ));
    }
    Ok(())
}

/// `tick_N` threshold targeting `bars_per_day`.
pub fn tick_threshold_from(
    stats: &TradeVolumeStats,
    bars_per_day: u32,
) -> Result<u64, PipelineError> {
    check_span(stats)?;
    Ok(expected_ticks_per_bar(stats, bars_per_day).round().max(1.0) as u64)
}

/// `volume_V` threshold targeting `bars_per_day`.
pub fn volume_threshold_from(
    stats: &TradeVolumeStats,
    bars_per_day: u32,
) -> Result<f64, PipelineError> {
    check_span(stats)?;
    Ok(round_to_two_significant(
        stats.total_volume / (stats.span_days * bars_per_day as f64),
    ))
}

/// `dollar_D` threshold targeting `bars_per_day`.
pub fn dollar_threshold_from(
    stats: &TradeVolumeStats,
    bars_per_day: u32,
) -> Result<f64, PipelineError> {
    check_span(stats)?;
    Ok(round_to_two_significant(
        stats.total_dollar_volume / (stats.span_days * bars_per_day as f64),
    ))
}

/// Initial EWMA expected value for an adaptive family.
///
/// Imbalance: `E[T] * max(|2P - 1|, 0.1) * contribution`, with `E[T]`
/// the expected ticks per bar and P the buy fraction. Run: geometric
/// expected run `p/(1-p) * contribution`, with p clamped to
/// `[0.55, 0.95]`.
pub fn initial_expected_from(
    family: AdaptiveFamily,
    trade_stats: &TradeVolumeStats,
    imbalance_stats: &ImbalanceStats,
    bars_per_day: u32,
) -> Result<f64, PipelineError> {
    check_span(trade_stats)?;

    let contribution = |kind: FlowKind| match kind {
        FlowKind::Tick => 1.0,
        FlowKind::Volume => imbalance_stats.avg_size,
        FlowKind::Dollar => imbalance_stats.avg_dollar,
    };

    match family {
        AdaptiveFamily::Imbalance(kind) => {
            let bias = (2.0 * imbalance_stats.buy_fraction - 1.0)
                .abs()
                .max(MIN_DIRECTION_BIAS);
            Ok(expected_ticks_per_bar(trade_stats, bars_per_day) * bias * contribution(kind))
        }
        AdaptiveFamily::Run(kind) => {
            let p = imbalance_stats
                .buy_fraction
                .max(1.0 - imbalance_stats.buy_fraction)
                .clamp(P_SAME_MIN, P_SAME_MAX);
            Ok(p / (1.0 - p) * contribution(kind))
        }
    }
}

async fn fetch_trade_stats(
    store: &TradeStore,
    source: &str,
    pair: &str,
) -> Result<TradeVolumeStats, PipelineError> {
    store
        .trade_volume_stats(source, pair)
        .await?
        .ok_or_else(|| PipelineError::Precondition(format!("no trade data for {source} {pair}")))
}

/// Calibrate a tick bar threshold against the stored log.
pub async fn calibrate_tick_threshold(
    store: &TradeStore,
    source: &str,
    pair: &str,
    bars_per_day: u32,
) -> Result<u64, PipelineError> {
    tick_threshold_from(&fetch_trade_stats(store, source, pair).await?, bars_per_day)
}

/// Calibrate a volume bar threshold against the stored log.
pub async fn calibrate_volume_threshold(
    store: &TradeStore,
    source: &str,
    pair: &str,
    bars_per_day: u32,
) -> Result<f64, PipelineError> {
    volume_threshold_from(&fetch_trade_stats(store, source, pair).await?, bars_per_day)
}

/// Calibrate a dollar bar threshold against the stored log.
pub async fn calibrate_dollar_threshold(
    store: &TradeStore,
    source: &str,
    pair: &str,
    bars_per_day: u32,
) -> Result<f64, PipelineError> {
    dollar_threshold_from(&fetch_trade_stats(store, source, pair).await?, bars_per_day)
}

/// Calibrate an adaptive family's initial EWMA expected value.
pub async fn calibrate_initial_expected(
    store: &TradeStore,
    source: &str,
    pair: &str,
    family: AdaptiveFamily,
    bars_per_day: u32,
) -> Result<f64, PipelineError> {
    let trade_stats = fetch_trade_stats(store, source, pair).await?;
    let imbalance_stats = store.imbalance_stats(source, pair).await?.ok_or_else(|| {
        PipelineError::Precondition(format!("insufficient trade data for {source} {pair}"))
    })?;
    initial_expected_from(family, &trade_stats, &imbalance_stats, bars_per_day)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tstats(total_trades: f64, total_volume: f64, span_days: f64) -> TradeVolumeStats {
        TradeVolumeStats {
            total_trades,
            total_volume,
            total_dollar_volume: 0.0,
            span_days,
        }
    }

    fn istats(avg_size: f64, avg_dollar: f64, buy_fraction: f64) -> ImbalanceStats {
        ImbalanceStats {
            avg_size,
            avg_dollar,
            buy_fraction,
        }
    }

    fn approx(a: f64, b: f64) {
        assert!((a - b).abs() < 1e-9, "{a} != {b}");
    }

    #[test]
    fn tick_threshold_basic() {
        // 500k trades over 100 days at 50 bars/day -> 100 ticks per bar.
        let stats = tstats(500_000.0, 50_000.0, 100.0);
        assert_eq!(tick_threshold_from(&stats, 50).unwrap(), 100);
    }

    #[test]
    fn tick_threshold_rounds_and_floors() {
        let stats = tstats(501_000.0, 50_000.0, 100.0);
        assert_eq!(tick_threshold_from(&stats, 50).unwrap(), 100);

        let tiny = tstats(10.0, 1.0, 100.0);
        assert_eq!(tick_threshold_from(&tiny, 50).unwrap(), 1);
    }

    #[test]
    fn volume_threshold_basic() {
        let stats = tstats(500_000.0, 100_000.0, 100.0);
        approx(volume_threshold_from(&stats, 50).unwrap(), 20.0);
    }

    #[test]
    fn dollar_threshold_rounds_to_clean_values() {
        let mut stats = tstats(1.0, 0.0, 10.0);
        stats.total_dollar_volume = 10_000_000.0;
        approx(dollar_threshold_from(&stats, 50).unwrap(), 20_000.0);

        let mut big = tstats(1.0, 0.0, 94.7);
        big.total_dollar_volume = 50_900_000_000.0;
        let threshold = dollar_threshold_from(&big, 50).unwrap();
        assert!(threshold >= 10_000_000.0 && threshold <= 11_000_000.0);
    }

    #[test]
    fn more_bars_per_day_means_smaller_threshold() {
        let mut stats = tstats(1.0, 0.0, 10.0);
        stats.total_dollar_volume = 10_000_000.0;
        let t50 = dollar_threshold_from(&stats, 50).unwrap();
        let t100 = dollar_threshold_from(&stats, 100).unwrap();
        assert!(t100 < t50);
    }

    #[test]
    fn imbalance_initial_balanced_market_uses_bias_floor() {
        let t = tstats(500_000.0, 50_000.0, 100.0);
        let i = istats(0.1, 285.0, 0.50);
        // E[T] = 100, bias floored at 0.1, tick contribution 1.
        approx(
            initial_expected_from(AdaptiveFamily::Imbalance(FlowKind::Tick), &t, &i, 50).unwrap(),
            100.0 * 0.1,
        );
    }

    #[test]
    fn imbalance_initial_directional_market() {
        let t = tstats(500_000.0, 50_000.0, 100.0);
        let i = istats(0.1, 285.0, 0.60);
        approx(
            initial_expected_from(AdaptiveFamily::Imbalance(FlowKind::Tick), &t, &i, 50).unwrap(),
            100.0 * 0.2,
        );
    }

    #[test]
    fn imbalance_initial_scales_by_contribution() {
        let t = tstats(500_000.0, 50_000.0, 100.0);
        let i = istats(0.1, 285.0, 0.55);
        let bias = (2.0 * 0.55f64 - 1.0).abs().max(0.1);
        approx(
            initial_expected_from(AdaptiveFamily::Imbalance(FlowKind::Volume), &t, &i, 50)
                .unwrap(),
            100.0 * bias * 0.1,
        );
        approx(
            initial_expected_from(AdaptiveFamily::Imbalance(FlowKind::Dollar), &t, &i, 50)
                .unwrap(),
            100.0 * bias * 285.0,
        );
    }

    #[test]
    fn run_initial_uses_geometric_run_length() {
        let t = tstats(500_000.0, 50_000.0, 100.0);
        let i = istats(0.1, 285.0, 0.60);
        // p = 0.60 -> expected run 0.6/0.4 = 1.5, tick contribution 1.
        approx(
            initial_expected_from(AdaptiveFamily::Run(FlowKind::Tick), &t, &i, 50).unwrap(),
            1.5,
        );
        approx(
            initial_expected_from(AdaptiveFamily::Run(FlowKind::Volume), &t, &i, 50).unwrap(),
            1.5 * 0.1,
        );
    }

    #[test]
    fn run_probability_is_clamped() {
        let t = tstats(500_000.0, 50_000.0, 100.0);

        // Balanced market floors at 0.55.
        let low = istats(0.1, 285.0, 0.50);
        approx(
            initial_expected_from(AdaptiveFamily::Run(FlowKind::Tick), &t, &low, 50).unwrap(),
            0.55 / 0.45,
        );

        // Extreme market caps at 0.95.
        let high = istats(0.1, 285.0, 0.99);
        approx(
            initial_expected_from(AdaptiveFamily::Run(FlowKind::Tick), &t, &high, 50).unwrap(),
            19.0,
        );
    }

    #[test]
    fn no_data_is_a_precondition_error() {
        let empty = tstats(0.0, 0.0, 0.0);
        assert!(matches!(
            tick_threshold_from(&empty, 50),
            Err(PipelineError::Precondition(_))
        ));
    }

    #[test]
    fn adaptive_family_parsing() {
        assert_eq!(
            "tib".parse::<AdaptiveFamily>().unwrap(),
            AdaptiveFamily::Imbalance(FlowKind::Tick)
        );
        assert_eq!(
            "drb".parse::<AdaptiveFamily>().unwrap(),
            AdaptiveFamily::Run(FlowKind::Dollar)
        );
        assert!("tick".parse::<AdaptiveFamily>().is_err());
    }

    #[test]
    fn two_significant_digits() {
        approx(round_to_two_significant(20_000.0), 20_000.0);
        approx(round_to_two_significant(10_749_736.0), 11_000_000.0);
        approx(round_to_two_significant(20.0), 20.0);
        approx(round_to_two_significant(0.0), 0.0);
    }
}
