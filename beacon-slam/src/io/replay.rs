//! Offline replay of a measurement log through the engine.

use serde::{Deserialize, Serialize};

use crate::engine::{EngineStats, LocalizationEngine};
use crate::error::{LocalizeError, Result};

use super::csv_log::{EstimateWriter, Measurement, MeasurementLog};

/// Preprocessing applied to logged radio measurements.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReplayConfig {
    /// Constant subtracted from every logged range (meters).
    pub range_bias: f64,

    /// Ranges at or above this (after bias) are skipped (meters).
    pub max_range: f64,

    /// Range std used when a row does not carry one (meters).
    pub default_std_range: f64,
}

impl Default for ReplayConfig {
    fn default() -> Self {
        Self {
            range_bias: 0.0,
            max_range: 30.0,
            default_std_range: 0.1,
        }
    }
}

impl ReplayConfig {
    /// Reject non-finite or non-positive limits.
    pub fn validate(&self) -> Result<()> {
        if !self.range_bias.is_finite() {
            return Err(LocalizeError::Config(format!(
                "replay.range_bias must be finite, got {}",
                self.range_bias
            )));
        }
        if !(self.max_range.is_finite() && self.max_range > 0.0) {
            return Err(LocalizeError::Config(format!(
                "replay.max_range must be finite and positive, got {}",
                self.max_range
            )));
        }
        if !(self.default_std_range.is_finite() && self.default_std_range > 0.0) {
            return Err(LocalizeError::Config(format!(
                "replay.default_std_range must be finite and positive, got {}",
                self.default_std_range
            )));
        }
        Ok(())
    }
}

/// What happened during a replay.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplaySummary {
    /// Rows read from the log.
    pub measurements: usize,
    /// Ranges outside `(0, max_range)` after bias correction.
    pub skipped_ranges: usize,
    /// Rows the engine rejected as invalid.
    pub rejected: usize,
    /// Updates that hit a weight collapse (recovered).
    pub degenerate: usize,
    /// Tag rows written.
    pub tag_rows: usize,
    /// Engine counters at the end of the run.
    pub stats: EngineStats,
}

/// Feed every measurement of `log` to `engine` in order.
///
/// Invalid rows and degenerate updates are counted and skipped; only I/O
/// failures abort the replay. A tag row is written after every accepted
/// motion sample, and the final beacon estimates when the log is done.
pub fn replay(
    engine: &mut LocalizationEngine,
    log: &MeasurementLog,
    config: &ReplayConfig,
    mut writer: Option<EstimateWriter>,
) -> Result<ReplaySummary> {
    config.validate()?;
    let mut summary = ReplaySummary {
        measurements: log.len(),
        ..Default::default()
    };

    for measurement in log.iter() {
        let result = match measurement {
            Measurement::Motion(m) => {
                let result = engine.deposit_motion(m.t, m.x, m.y, m.z);
                if result.is_ok()
                    && let Some(w) = writer.as_mut()
                {
                    w.write_tag(&engine.tag_estimate())?;
                    summary.tag_rows += 1;
                }
                result
            }
            Measurement::Range(r) => {
                let range = r.range - config.range_bias;
                if !(range > 0.0 && range < config.max_range) {
                    summary.skipped_ranges += 1;
                    continue;
                }
                let std_range = r.std_range.unwrap_or(config.default_std_range);
                engine.deposit_range(&r.beacon, range, std_range)
            }
            Measurement::Rssi(r) => engine.deposit_rssi(&r.beacon, r.rssi),
        };

        match result {
            Ok(()) => {}
            Err(LocalizeError::InvalidMeasurement { reason }) => {
                log::debug!("Skipping row at t={:.3}: {}", measurement.t(), reason);
                summary.rejected += 1;
            }
            Err(LocalizeError::FilterDegenerate { .. }) => summary.degenerate += 1,
            Err(e) => return Err(e),
        }
    }

    if let Some(w) = writer {
        let estimates: Vec<(String, _)> = engine
            .beacon_names()
            .into_iter()
            .filter_map(|name| {
                let est = engine.beacon_estimate(&name).ok()?;
                Some((name, est))
            })
            .collect();
        w.finish(estimates.iter().map(|(n, e)| (n.as_str(), *e)))?;
    }

    summary.stats = *engine.stats();
    log::info!(
        "Replay done: {} rows, {} beacons, {} skipped ranges, {} rejected, {} degenerate",
        summary.measurements,
        engine.beacon_names().len(),
        summary.skipped_ranges,
        summary.rejected,
        summary.degenerate
    );
    Ok(summary)
}
