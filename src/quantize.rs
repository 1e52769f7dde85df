//! Time quantization ("compression") of streams onto a coarse grid.
//!
//! The grid step is derived from the notes themselves: a typical gap between
//! consecutive onsets (`difference_stat`) and a typical note length (`length_stat`).
//! Onsets are rescaled by the gap, lengths by the length statistic, and the
//! integer ratio between the two keeps them on a shared grid.

use std::collections::HashMap;

use clap::ValueEnum;
use serde::Deserialize;
use tracing::debug;

use crate::error::ConvertError;
use crate::streams::Stream;

/// How note timings are mapped onto grid steps.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, ValueEnum, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CompressionPolicy {
    /// One grid step per tick
    None,
    /// Smallest onset gap and note length
    MinDiff,
    /// Most frequent onset gap and note length
    Mode,
}

impl CompressionPolicy {
    pub const ALL: [CompressionPolicy; 3] = [Self::None, Self::MinDiff, Self::Mode];

    /// Numeric code used in output directories and log names.
    pub fn code(self) -> u8 {
        match self {
            Self::None => 0,
            Self::MinDiff => 1,
            Self::Mode => 2,
        }
    }
}

/// The statistics a quantization pass settled on.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Quantized {
    pub difference_stat: f64,
    pub length_stat: f64,
    pub ratio_int: f64,
    /// Microseconds per grid step
    pub speed: u64,
}

/// Round `x` to the nearest multiple of `base`, halves away from zero.
fn round_to(base: f64, x: f64) -> f64 {
    base * (x / base).round()
}

fn min_above_one(values: &[i64]) -> Option<i64> {
    values.iter().copied().filter(|&v| v > 1).min()
}

/// Most frequent value above one. Ties go to the value seen first.
fn mode_above_one(values: &[i64]) -> Option<i64> {
    let mut counts: HashMap<i64, usize> = HashMap::new();
    for &v in values.iter().filter(|&&v| v > 1) {
        *counts.entry(v).or_default() += 1;
    }
    let mut best: Option<(i64, usize)> = None;
    for &v in values.iter().filter(|&&v| v > 1) {
        let c = counts[&v];
        if best.is_none_or(|(_, bc)| c > bc) {
            best = Some((v, c));
        }
    }
    best.map(|(v, _)| v)
}

/// Rewrite every note of every stream into grid steps and derive the playback speed.
///
/// With [`CompressionPolicy::None`] timings stay in ticks. Otherwise onsets go
/// through a double rounding (to 0.1, then to a whole step) and lengths are kept
/// to 0.1 of a step.
pub fn quantize(
    streams: &mut [Stream],
    policy: CompressionPolicy,
    tempo: u32,
    ticks_per_beat: u16,
) -> Result<Quantized, ConvertError> {
    let (difference_stat, length_stat, ratio_int) = match policy {
        CompressionPolicy::None => {
            for note in streams.iter_mut().flatten() {
                note.length = note.end - note.start;
            }
            (1.0, 1.0, 1.0)
        }
        CompressionPolicy::MinDiff | CompressionPolicy::Mode => {
            let starts: Vec<i64> = streams.iter().flatten().map(|n| n.start as i64).collect();
            let differences: Vec<i64> = starts.windows(2).map(|w| w[1] - w[0]).collect();
            let lengths: Vec<i64> = streams
                .iter()
                .flatten()
                .map(|n| (n.end - n.start) as i64)
                .collect();

            let pick: fn(&[i64]) -> Option<i64> = match policy {
                CompressionPolicy::Mode => mode_above_one,
                _ => min_above_one,
            };
            let difference_stat = pick(&differences)
                .ok_or(ConvertError::InsufficientVariation("start difference"))?
                as f64;
            let length_stat =
                pick(&lengths).ok_or(ConvertError::InsufficientVariation("length"))? as f64;

            let mode_ratio = difference_stat.max(length_stat) / difference_stat.min(length_stat);
            let ratio_int = mode_ratio.floor();
            // not applied: rounding error is allowed to accumulate
            let ratio_correction = mode_ratio / ratio_int;
            debug!(
                ?policy,
                difference_stat, length_stat, mode_ratio, ratio_int, ratio_correction,
                "quantization statistics"
            );

            for note in streams.iter_mut().flatten() {
                note.length = round_to(0.1, (note.end - note.start) / length_stat);
                note.start = round_to(1.0, round_to(0.1, note.start / difference_stat * ratio_int));
                note.end = note.start + note.length;
            }
            (difference_stat, length_stat, ratio_int)
        }
    };

    let speed = (60_000_000.0 / f64::from(tempo) * f64::from(ticks_per_beat)
        * (ratio_int / difference_stat))
        .round() as u64;

    Ok(Quantized { difference_stat, length_stat, ratio_int, speed })
}
