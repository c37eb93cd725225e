//! Bar-spec grammar: `<family>_<param>`.
//!
//! Families: `tick`, `volume`, `dollar`, `time` (fixed threshold) and
//! `tib`/`vib`/`dib`, `trb`/`vrb`/`drb` (adaptive, parameterized by EWMA
//! window). Time params take an `s`/`m`/`h`/`d` suffix, e.g. `time_30s`,
//! `time_5m`. Unparseable specs are input errors.

use std::fmt;
use std::str::FromStr;

use rust_decimal::Decimal;
use thiserror::Error;

use crate::data::Trade;

/// How a trade contributes to an imbalance or run: by count, by size, or
/// by quote value. Shared by both adaptive bar groups.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlowKind {
    Tick,
    Volume,
    Dollar,
}

impl FlowKind {
    /// Unsigned contribution of a trade under this weighting.
    pub fn unit(&self, trade: &Trade) -> Decimal {
        match self {
            FlowKind::Tick => Decimal::ONE,
            FlowKind::Volume => trade.size,
            FlowKind::Dollar => trade.dollar_volume(),
        }
    }

    pub fn imbalance_code(&self) -> &'static str {
        match self {
            FlowKind::Tick => "tib",
            FlowKind::Volume => "vib",
            FlowKind::Dollar => "dib",
        }
    }

    pub fn run_code(&self) -> &'static str {
        match self {
            FlowKind::Tick => "trb",
            FlowKind::Volume => "vrb",
            FlowKind::Dollar => "drb",
        }
    }
}

/// A parsed bar specification.
#[derive(Debug, Clone, PartialEq)]
pub enum BarSpec {
    Tick { threshold: u64 },
    Volume { threshold: Decimal },
    Dollar { threshold: Decimal },
    Time { interval_secs: i64 },
    Imbalance { kind: FlowKind, window: u32 },
    Run { kind: FlowKind, window: u32 },
}

/// Error produced by bar-spec parsing. Always an input error: reject
/// before any I/O happens.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("invalid bar spec '{spec}': {reason}")]
pub struct BarSpecError {
    pub spec: String,
    pub reason: String,
}

impl BarSpecError {
    fn new(spec: &str, reason: impl Into<String>) -> Self {
        Self {
            spec: spec.to_string(),
            reason: reason.into(),
        }
    }
}

impl BarSpec {
    /// The bar-type label, e.g. `tick_500`, `time_5m`, `dib_20`.
    pub fn label(&self) -> String {
        match self {
            BarSpec::Tick { threshold } => format!("tick_{threshold}"),
            BarSpec::Volume { threshold } => format!("volume_{}", threshold.normalize()),
            BarSpec::Dollar { threshold } => format!("dollar_{}", threshold.normalize()),
            BarSpec::Time { interval_secs } => format!("time_{}", format_interval(*interval_secs)),
            BarSpec::Imbalance { kind, window } => format!("{}_{window}", kind.imbalance_code()),
            BarSpec::Run { kind, window } => format!("{}_{window}", kind.run_code()),
        }
    }

    /// True for the six EWMA-thresholded families.
    pub fn is_adaptive(&self) -> bool {
        matches!(self, BarSpec::Imbalance { .. } | BarSpec::Run { .. })
    }
}

impl fmt::Display for BarSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.label())
    }
}

/// Shortest `s`/`m`/`h`/`d` rendering of an interval, shared with the
/// time bar builder so labels and table names agree.
pub(crate) fn format_interval(secs: i64) -> String {
    if secs < 60 {
        format!("{secs}s")
    } else if secs < 3600 {
        format!("{}m", secs / 60)
    } else if secs < 86400 {
        format!("{}h", secs / 3600)
    } else {
        format!("{}d", secs / 86400)
    }
}

fn parse_time_param(spec: &str, param: &str) -> Result<i64, BarSpecError> {
    let suffix_err = || BarSpecError::new(spec, "time param needs an s/m/h/d suffix (e.g. time_5m)");
    let suffix = param.chars().last().ok_or_else(suffix_err)?;
    let digits = &param[..param.len() - suffix.len_utf8()];
    let multiplier = match suffix {
        's' => 1,
        'm' => 60,
        'h' => 3600,
        'd' => 86400,
        _ => return Err(suffix_err()),
    };
    let n: i64 = digits
        .parse()
        .map_err(|_| BarSpecError::new(spec, "time param must be a positive integer"))?;
    if n <= 0 {
        return Err(BarSpecError::new(spec, "time interval must be positive"));
    }
    Ok(n * multiplier)
}

fn parse_window(spec: &str, param: &str) -> Result<u32, BarSpecError> {
    let window: u32 = param
        .parse()
        .map_err(|_| BarSpecError::new(spec, "EWMA window must be a positive integer"))?;
    if window == 0 {
        return Err(BarSpecError::new(spec, "EWMA window must be >= 1"));
    }
    Ok(window)
}

fn parse_decimal_threshold(spec: &str, param: &str) -> Result<Decimal, BarSpecError> {
    let threshold = Decimal::from_str(param)
        .map_err(|_| BarSpecError::new(spec, "threshold must be a decimal number"))?;
    if threshold <= Decimal::ZERO {
        return Err(BarSpecError::new(spec, "threshold must be positive"));
    }
    Ok(threshold)
}

impl FromStr for BarSpec {
    type Err = BarSpecError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (family, param) = s
            .split_once('_')
            .ok_or_else(|| BarSpecError::new(s, "expected <family>_<param>"))?;
        if param.is_empty() {
            return Err(BarSpecError::new(s, "missing parameter"));
        }

        match family {
            "tick" => {
                let threshold: u64 = param.parse().map_err(|_| {
                    BarSpecError::new(s, "tick threshold must be a positive integer")
                })?;
                if threshold == 0 {
                    return Err(BarSpecError::new(s, "tick threshold must be >= 1"));
                }
                Ok(BarSpec::Tick { threshold })
            }
            "volume" => Ok(BarSpec::Volume {
                threshold: parse_decimal_threshold(s, param)?,
            }),
            "dollar" => Ok(BarSpec::Dollar {
                threshold: parse_decimal_threshold(s, param)?,
            }),
            "time" => Ok(BarSpec::Time {
                interval_secs: parse_time_param(s, param)?,
            }),
            "tib" => Ok(BarSpec::Imbalance {
                kind: FlowKind::Tick,
                window: parse_window(s, param)?,
            }),
            "vib" => Ok(BarSpec::Imbalance {
                kind: FlowKind::Volume,
                window: parse_window(s, param)?,
            }),
            "dib" => Ok(BarSpec::Imbalance {
                kind: FlowKind::Dollar,
                window: parse_window(s, param)?,
            }),
            "trb" => Ok(BarSpec::Run {
                kind: FlowKind::Tick,
                window: parse_window(s, param)?,
            }),
            "vrb" => Ok(BarSpec::Run {
                kind: FlowKind::Volume,
                window: parse_window(s, param)?,
            }),
            "drb" => Ok(BarSpec::Run {
                kind: FlowKind::Dollar,
                window: parse_window(s, param)?,
            }),
            _ => Err(BarSpecError::new(s, "unknown bar family")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn parses_fixed_threshold_families() {
        assert_eq!(
            "tick_500".parse::<BarSpec>().unwrap(),
            BarSpec::Tick { threshold: 500 }
        );
        assert_eq!(
            "volume_10.5".parse::<BarSpec>().unwrap(),
            BarSpec::Volume {
                threshold: dec!(10.5)
            }
        );
        assert_eq!(
            "dollar_50000".parse::<BarSpec>().unwrap(),
            BarSpec::Dollar {
                threshold: dec!(50000)
            }
        );
    }

    #[test]
    fn parses_time_suffixes() {
        for (raw, secs) in [
            ("time_30s", 30),
            ("time_5m", 300),
            ("time_1h", 3600),
            ("time_1d", 86400),
        ] {
            assert_eq!(
                raw.parse::<BarSpec>().unwrap(),
                BarSpec::Time {
                    interval_secs: secs
                }
            );
        }
    }

    #[test]
    fn parses_adaptive_families() {
        assert_eq!(
            "tib_10".parse::<BarSpec>().unwrap(),
            BarSpec::Imbalance {
                kind: FlowKind::Tick,
                window: 10
            }
        );
        assert_eq!(
            "drb_20".parse::<BarSpec>().unwrap(),
            BarSpec::Run {
                kind: FlowKind::Dollar,
                window: 20
            }
        );
        assert!("tib_10".parse::<BarSpec>().unwrap().is_adaptive());
        assert!(!"tick_10".parse::<BarSpec>().unwrap().is_adaptive());
    }

    #[test]
    fn label_round_trips() {
        for raw in [
            "tick_500", "volume_100", "dollar_50000", "time_30s", "time_5m", "time_1h",
            "time_1d", "tib_10", "vib_10", "dib_10", "trb_10", "vrb_10", "drb_10",
        ] {
            assert_eq!(raw.parse::<BarSpec>().unwrap().label(), raw);
        }
    }

    #[test]
    fn rejects_malformed_specs() {
        for raw in [
            "tick", "tick_", "tick_0", "tick_-5", "tick_abc", "volume_0", "time_5",
            "time_5x", "time_0m", "tib_0", "xyz_10", "",
        ] {
            assert!(raw.parse::<BarSpec>().is_err(), "should reject {raw:?}");
        }
    }
}
