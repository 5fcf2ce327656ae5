// THEORY:
// The `pipeline` module is the top-level API for analyzing one video. It
// encapsulates the full stack (normalization, background estimation,
// segmentation, tracking, overlap resolution, validation and SNR scoring)
// behind a single `FlickerPipeline::generate_report` call.
//
// Key architectural principles:
// 1.  **Attempts Are Independent**: every threshold attempt rebuilds the
//     tracker, and with it the track id counter, from scratch. Nothing leaks
//     from one attempt into the next.
// 2.  **Adaptive Threshold**: when fewer than `min_flickers` tracks validate,
//     the cutoff is lowered by `threshold_step` and the whole chain reruns,
//     until enough flickers are found or the cutoff reaches 0. The outcome of
//     the final attempt is what gets reported, even if it is empty.
// 3.  **Two Stacks**: detection runs on the normalized 8-bit copy, scoring on
//     the raw samples.

use crate::core_modules::annotator::annotate_frames;
use crate::core_modules::blob_detector::Connectivity;
use crate::core_modules::blob_detector::blob_detector::{self, SegmentParams};
use crate::core_modules::flicker::{self, DurationBounds, Flicker, FlickerSummary};
use crate::core_modules::frame_stack::{FrameStack, RawStack, estimate_background, normalize_to_8bit};
use crate::core_modules::overlap::remove_overlapping;
use crate::core_modules::snr::{InfinityPolicy, SnrReport, score_flickers};
use crate::core_modules::tracker::{GAP_LIMIT, PROXIMITY_LIMIT, Tracker};
use crate::error::{FlickerError, Result};
use image::RgbImage;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Configuration for the FlickerPipeline, allowing for tunable behavior.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Initial foreground cutoff on `|frame - background|`.
    pub threshold: u8,
    /// Inclusive blob area bounds, in pixels.
    pub min_size: usize,
    pub max_size: usize,
    /// Inclusive track duration bounds, in frames.
    pub min_duration: usize,
    pub max_duration: usize,
    /// When false, only the initial threshold is tried.
    pub adaptive: bool,
    /// The controller stops lowering the threshold once this many flickers validate.
    pub min_flickers: usize,
    pub threshold_step: u8,
    pub connectivity: Connectivity,
    pub snr_policy: InfinityPolicy,
    pub gap_limit: usize,
    pub proximity_limit: f64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            threshold: 50,
            min_size: 20,
            max_size: 1000,
            min_duration: 1,
            max_duration: 400,
            adaptive: true,
            min_flickers: 3,
            threshold_step: 2,
            connectivity: Connectivity::Eight,
            snr_policy: InfinityPolicy::Propagate,
            gap_limit: GAP_LIMIT,
            proximity_limit: PROXIMITY_LIMIT,
        }
    }
}

impl PipelineConfig {
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_toml_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    pub fn validate(&self) -> Result<()> {
        if self.threshold_step == 0 {
            return Err(FlickerError::InvalidParameter(
                "threshold_step must be at least 1".to_string(),
            ));
        }
        if self.min_size > self.max_size {
            return Err(FlickerError::InvalidParameter(format!(
                "min_size {} exceeds max_size {}",
                self.min_size, self.max_size
            )));
        }
        if self.min_duration > self.max_duration {
            return Err(FlickerError::InvalidParameter(format!(
                "min_duration {} exceeds max_duration {}",
                self.min_duration, self.max_duration
            )));
        }
        if !(self.proximity_limit.is_finite() && self.proximity_limit > 0.0) {
            return Err(FlickerError::InvalidParameter(format!(
                "proximity_limit must be a positive distance, got {}",
                self.proximity_limit
            )));
        }
        Ok(())
    }

    fn segment_params(&self, cutoff: u8) -> SegmentParams {
        SegmentParams {
            cutoff,
            min_size: self.min_size,
            max_size: self.max_size,
            connectivity: self.connectivity,
        }
    }

    fn duration_bounds(&self) -> DurationBounds {
        DurationBounds {
            min: self.min_duration,
            max: self.max_duration,
        }
    }
}

/// Everything one threshold attempt produced.
#[derive(Debug, Clone)]
pub struct DetectionAttempt {
    pub threshold: u8,
    pub flickers: Vec<Flicker>,
    /// One 0/255 mask per frame.
    pub binary_masks: FrameStack<u8>,
}

/// The final attempt of the adaptive controller, plus its annotated frames.
#[derive(Debug, Clone)]
pub struct DetectionOutcome {
    pub threshold: u8,
    pub attempts: usize,
    pub flickers: Vec<Flicker>,
    pub binary_masks: FrameStack<u8>,
    pub annotated_frames: Vec<RgbImage>,
}

/// Runs segmentation, tracking, overlap resolution and validation at one cutoff.
pub fn detect_at_threshold(
    frames: &FrameStack<u8>,
    background: &[u8],
    threshold: u8,
    config: &PipelineConfig,
) -> Result<DetectionAttempt> {
    let params = config.segment_params(threshold);
    let mut tracker = Tracker::with_limits(config.gap_limit, config.proximity_limit);
    let mut masks = Vec::with_capacity(frames.as_slice().len());

    // Stage 1: Per-frame segmentation, fed to the tracker in index order.
    for (frame_index, frame) in frames.frames().enumerate() {
        let segmentation = blob_detector::segment_frame(
            frame_index,
            frame,
            background,
            frames.width(),
            frames.height(),
            &params,
        )?;
        tracker.update(frame_index, &segmentation.blobs)?;
        masks.extend(segmentation.binary_mask);
    }

    // Stage 2: Deduplication and validation over the complete track set.
    let tracks = tracker.finish();
    let track_count = tracks.len();
    let tracks = remove_overlapping(tracks);
    let flickers = flicker::validate(tracks, &config.duration_bounds());
    tracing::debug!(
        "threshold {threshold}: {track_count} tracks, {} validated",
        flickers.len()
    );

    Ok(DetectionAttempt {
        threshold,
        flickers,
        binary_masks: FrameStack::new(frames.width(), frames.height(), masks)?,
    })
}

/// Lowers the threshold until enough flickers validate or it reaches 0.
pub fn detect_adaptive(
    frames: &FrameStack<u8>,
    background: &[u8],
    config: &PipelineConfig,
) -> Result<DetectionOutcome> {
    let mut threshold = config.threshold;
    let mut attempt = detect_at_threshold(frames, background, threshold, config)?;
    let mut attempts = 1;

    if config.adaptive {
        while attempt.flickers.len() < config.min_flickers && threshold > 0 {
            threshold = threshold.saturating_sub(config.threshold_step);
            attempt = detect_at_threshold(frames, background, threshold, config)?;
            attempts += 1;
        }
    }

    let annotated_frames = annotate_frames(frames, &attempt.flickers);
    Ok(DetectionOutcome {
        threshold: attempt.threshold,
        attempts,
        flickers: attempt.flickers,
        binary_masks: attempt.binary_masks,
        annotated_frames,
    })
}

/// The full analysis of one video.
#[derive(Debug, Clone)]
pub struct VideoReport {
    pub detection: DetectionOutcome,
    pub snr: SnrReport,
}

impl VideoReport {
    /// False when even the last threshold attempt validated nothing.
    pub fn has_flickers(&self) -> bool {
        !self.detection.flickers.is_empty()
    }

    /// The run aggregate, or `None` when there is nothing to average.
    pub fn average_snr(&self) -> Option<f64> {
        self.has_flickers().then_some(self.snr.average_snr)
    }

    pub fn summaries(&self) -> Vec<FlickerSummary> {
        self.detection.flickers.iter().map(Flicker::summary).collect()
    }
}

/// The main, top-level struct for the flicker analysis engine.
#[derive(Debug, Clone)]
pub struct FlickerPipeline {
    config: PipelineConfig,
}

impl FlickerPipeline {
    pub fn new(config: PipelineConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn generate_report(&self, raw: &RawStack) -> Result<VideoReport> {
        // Stage 1: Normalization and background estimation.
        let normalized = normalize_to_8bit(raw)?;
        let background = estimate_background(&normalized)?.to_luma8();

        // Stage 2: Detection under the adaptive threshold controller.
        let detection = detect_adaptive(&normalized, &background, &self.config)?;
        tracing::debug!(
            "detection settled at threshold {} after {} attempts",
            detection.threshold,
            detection.attempts
        );

        // Stage 3: Scoring against the raw samples.
        let snr = score_flickers(raw, &detection.flickers, self.config.snr_policy);

        Ok(VideoReport { detection, snr })
    }
}
