// THEORY:
// The `snr` module scores validated flickers against the *raw* frame
// stack, before 8-bit normalization, so the ratio reflects the recorded data
// rather than the rescaled copy used for detection.
//
// For one flicker, the masked pixels of every frame in
// [start_frame, end_frame] are pooled:
//   SNR = max(pooled) / std_dev(pooled)      (population std-dev)
// A perfectly flat region has zero spread and scores +inf.
//
// The run-level aggregate is 0 when nothing was validated. How +inf members
// enter the mean is an explicit `InfinityPolicy`, never an accident of float
// arithmetic. Since no flicker can score -inf, neither policy yields NaN.

use crate::core_modules::flicker::Flicker;
use crate::core_modules::frame_stack::FrameStack;
use serde::{Deserialize, Serialize};

/// How infinite per-flicker SNRs enter the run aggregate.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InfinityPolicy {
    /// Plain mean; any +inf member makes the aggregate +inf.
    #[default]
    Propagate,
    /// Mean over finite members only; +inf when every member is infinite.
    ExcludeInfinite,
}

/// Per-flicker SNRs plus their aggregate.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SnrReport {
    pub individual_snr: Vec<f64>,
    /// 0 when `individual_snr` is empty.
    #[serde(skip)]
    pub average_snr: f64,
}

/// Peak over standard deviation of the flicker's masked pixels across its lifetime.
pub fn flicker_snr(raw: &FrameStack<f64>, flicker: &Flicker) -> f64 {
    let positions: Vec<_> = flicker.mask().positions().collect();
    let mut pooled = Vec::with_capacity(positions.len() * flicker.duration);
    let lifetime = (flicker.start_frame()..=flicker.end_frame()).take_while(|&i| i < raw.len());
    for frame_index in lifetime {
        pooled.extend(positions.iter().map(|p| raw.sample(frame_index, p.x, p.y)));
    }
    if pooled.is_empty() {
        return 0.0;
    }

    let max_intensity = pooled.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let count = pooled.len() as f64;
    let mean = pooled.iter().sum::<f64>() / count;
    let variance = pooled.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / count;
    let std_dev = variance.sqrt();

    if std_dev == 0.0 {
        tracing::warn!(
            "flicker {} has a uniform masked region; SNR is infinite",
            flicker.id()
        );
        return f64::INFINITY;
    }
    max_intensity / std_dev
}

/// Aggregates per-flicker SNRs according to `policy`.
pub fn average_snr(snrs: &[f64], policy: InfinityPolicy) -> f64 {
    if snrs.is_empty() {
        return 0.0;
    }
    match policy {
        InfinityPolicy::Propagate => snrs.iter().sum::<f64>() / snrs.len() as f64,
        InfinityPolicy::ExcludeInfinite => {
            let finite: Vec<f64> = snrs.iter().copied().filter(|v| v.is_finite()).collect();
            if finite.is_empty() {
                f64::INFINITY
            } else {
                finite.iter().sum::<f64>() / finite.len() as f64
            }
        }
    }
}

/// Scores every flicker against the raw stack.
pub fn score_flickers(raw: &FrameStack<f64>, flickers: &[Flicker], policy: InfinityPolicy) -> SnrReport {
    let individual_snr: Vec<f64> = flickers.iter().map(|f| flicker_snr(raw, f)).collect();
    let average_snr = average_snr(&individual_snr, policy);
    SnrReport {
        individual_snr,
        average_snr,
    }
}
